pub mod catalog;
pub mod context;
pub mod movements;
pub mod purchases;
pub mod sales;
pub mod stock;
