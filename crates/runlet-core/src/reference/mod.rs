//! Reference engine: parsing, path walking, coercion, and resolution.
//!
//! - `parser` -- `${kind:identifier[.path]}` parsing into typed references
//! - `path` -- dotted/bracketed path walking over JSON values
//! - `coerce` -- conversion of resolved values to declared parameter types
//! - `resolver` -- batched, per-kind resolution of a node's parameter map

pub mod coerce;
pub mod parser;
pub mod path;
pub mod resolver;
