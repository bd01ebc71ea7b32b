//! Infrastructure implementations for Runlet.
//!
//! Implements the port traits from `runlet-core`:
//! - `sqlite` -- sqlx-backed scheduler and resource stores with split
//!   reader/writer pools in WAL mode
//! - `crypto` -- AES-256-GCM vault for secret decryption
//! - `storage` -- workspace file storage on the local filesystem
//! - `config` -- TOML configuration loading from the data directory

pub mod config;
pub mod crypto;
pub mod sqlite;
pub mod storage;
