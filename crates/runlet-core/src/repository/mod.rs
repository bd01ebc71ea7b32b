//! Port trait definitions.
//!
//! These traits define the storage, decryption, and file-access interfaces
//! the scheduler consumes. The infrastructure layer (runlet-infra)
//! implements them; tests substitute in-memory versions. The facade takes
//! them as constructor parameters -- there is no global registry.

pub mod store;

pub use store::{ExecutionLifecycle, ResourceStore, SchedulerStore, SecretCipher, WorkspaceFiles};
