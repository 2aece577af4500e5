pub mod auth;
pub mod catalog;
pub mod inventory;
pub mod purchasing;
pub mod sales;
pub mod tenancy;
