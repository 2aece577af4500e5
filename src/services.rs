pub mod availability;
pub mod catalog_service;
pub mod invalidation;
pub mod lookup;
pub mod movement_service;
pub mod orchestrator;
pub mod purchase_service;
pub mod sale_service;
pub mod stock_service;
pub mod tenancy_service;

#[cfg(test)]
pub mod testing;
