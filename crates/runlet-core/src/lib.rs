//! Scheduling and parameter-resolution engine for Runlet.
//!
//! This crate defines the "ports" (storage, cipher, and file traits) that
//! the infrastructure layer implements, plus the algorithmic core:
//! - `reference` -- reference parsing, nested path walking, type coercion,
//!   and the batched per-kind reference resolver
//! - `scheduler` -- graph validation and seeding, dependency propagation,
//!   the readiness/aging policy, completion detection, and the facade
//!
//! It depends only on `runlet-types` -- never on `runlet-infra` or any
//! database/IO crate.

pub mod reference;
pub mod repository;
pub mod scheduler;
