//! Workspace resource entities referenced by node parameters.
//!
//! Variables, credentials, database connections, and files are all scoped
//! to a workspace; a reference resolving across workspaces is an input
//! error, never silently honored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Variable
// ---------------------------------------------------------------------------

/// A workspace variable. When `is_secret`, `value` is vault ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    /// User-defined variable id (e.g. "api_url").
    pub id: String,
    pub workspace_id: Uuid,
    /// Plain value, or base64 vault ciphertext when `is_secret`.
    pub value: String,
    #[serde(default)]
    pub is_secret: bool,
}

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// A workspace credential. The decrypted plaintext is typically a JSON
/// structure (token, username/password pair, service account blob).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    pub workspace_id: Uuid,
    pub name: String,
    /// Base64 vault ciphertext.
    pub ciphertext: String,
}

// ---------------------------------------------------------------------------
// DatabaseConnection
// ---------------------------------------------------------------------------

/// A workspace database connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConnection {
    pub id: String,
    pub workspace_id: Uuid,
    pub name: String,
    pub connection_string: String,
    pub host: String,
    pub port: u16,
    pub database_name: String,
    pub username: String,
}

impl DatabaseConnection {
    /// The projection exposed to parameter resolution. Nothing beyond these
    /// four fields ever reaches a node's resolved parameters.
    pub fn summary(&self) -> serde_json::Value {
        json!({
            "connection_string": self.connection_string,
            "host": self.host,
            "port": self.port,
            "database_name": self.database_name,
        })
    }
}

// ---------------------------------------------------------------------------
// StoredFile
// ---------------------------------------------------------------------------

/// Metadata for a file stored in workspace storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: String,
    pub workspace_id: Uuid,
    pub filename: String,
    /// Path relative to the workspace's storage root.
    pub relative_path: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
