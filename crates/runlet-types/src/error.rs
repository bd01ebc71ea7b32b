//! Error taxonomy for Runlet.
//!
//! One thiserror enum per domain. Resolution failures are fully typed so
//! the scheduler facade can surface them without string matching; the
//! graph-walking and coercion routines return `Result` internally rather
//! than using errors for control flow.

use thiserror::Error;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Repository errors
// ---------------------------------------------------------------------------

/// Errors from repository operations (used by trait definitions in
/// runlet-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

// ---------------------------------------------------------------------------
// Secret errors
// ---------------------------------------------------------------------------

/// Errors from the decrypt capability.
///
/// IMPORTANT: these never include plaintext, key material, or ciphertext in
/// their Display/Debug output.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("invalid ciphertext encoding")]
    InvalidCiphertext,

    #[error("invalid ciphertext: too short")]
    CiphertextTooShort,

    #[error("key derivation failed")]
    KeyDerivationFailed,
}

// ---------------------------------------------------------------------------
// Reference parsing
// ---------------------------------------------------------------------------

/// An unknown reference kind tag.
#[derive(Debug, Error)]
#[error("unknown reference kind '{0}'")]
pub struct InvalidReferenceKind(pub String);

// ---------------------------------------------------------------------------
// Path resolution
// ---------------------------------------------------------------------------

/// Errors walking a dotted/bracketed path through a JSON value. One variant
/// per failure condition, each naming the offending segment.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("cannot apply index '[{segment}]' to a non-array value")]
    IndexOnNonArray { segment: String },

    #[error("index {index} out of range (array length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("non-integer array index '[{segment}]'")]
    NonIntegerIndex { segment: String },

    #[error("cannot access key '{segment}' on a non-object value")]
    KeyOnNonObject { segment: String },

    #[error("missing key '{segment}'")]
    MissingKey { segment: String },

    #[error("malformed path '{path}'")]
    Malformed { path: String },
}

// ---------------------------------------------------------------------------
// Type coercion
// ---------------------------------------------------------------------------

/// Errors coercing a resolved value to its declared parameter type.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoercionError {
    #[error(
        "parameter '{param}': unknown target type '{target}' (valid types: string, integer, float, boolean, array, object)"
    )]
    UnknownTarget { param: String, target: String },

    #[error("parameter '{param}': cannot coerce {received} value `{preview}` to {expected}")]
    Incompatible {
        param: String,
        expected: String,
        received: &'static str,
        preview: String,
    },
}

// ---------------------------------------------------------------------------
// Reference resolution
// ---------------------------------------------------------------------------

/// Errors resolving one node invocation's parameter references. Any of
/// these aborts the whole resolution -- there is no partial parameter set.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("parameter '{param}': path '{path}' failed: {source}")]
    Path {
        param: String,
        path: String,
        source: PathError,
    },

    #[error(transparent)]
    Coercion(#[from] CoercionError),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} '{id}' belongs to a different workspace")]
    CrossTenant { entity: &'static str, id: String },

    #[error("file '{id}' is not valid UTF-8 text")]
    NonUtf8File { id: String },

    #[error("storage error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
}

impl From<InvalidReferenceKind> for ResolutionError {
    fn from(e: InvalidReferenceKind) -> Self {
        ResolutionError::InvalidReference(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Scheduler errors
// ---------------------------------------------------------------------------

/// Errors from the scheduler facade operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("execution {0} not found")]
    ExecutionNotFound(Uuid),

    #[error("workflow {0} not found")]
    WorkflowNotFound(Uuid),

    #[error("execution input {0} not found")]
    InputNotFound(Uuid),

    #[error("execution {0} already finished")]
    AlreadyFinished(Uuid),

    #[error("invalid workflow graph: {0}")]
    InvalidGraph(String),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("storage error: {0}")]
    Repository(#[from] RepositoryError),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
