//! SQLite persistence via sqlx.
//!
//! - `pool` -- split reader/writer pools in WAL mode
//! - `scheduler_store` -- `SchedulerStore` + `ExecutionLifecycle`
//! - `resource_store` -- `ResourceStore` batch reads

pub mod pool;
pub mod resource_store;
pub mod scheduler_store;

pub use pool::DatabasePool;
pub use scheduler_store::SqliteSchedulerStore;
