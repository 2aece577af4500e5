pub mod memory_store;
pub use memory_store::{FailPoint, MemoryStore};
pub mod pg_store;
pub use pg_store::PgStore;
pub mod store;
pub use store::{Store, StoreError, StoreTransaction};
