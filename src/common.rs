pub mod error;
pub mod response;
pub mod scope;
pub mod validation;
