//! Configuration loader for Runlet.
//!
//! Reads `config.toml` from the data directory (`~/.runlet/` by default)
//! and deserializes it into [`RunletConfig`]. Falls back to sensible
//! defaults when the file is missing or malformed.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the scheduler daemon and its storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunletConfig {
    /// SQLite database URL.
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// Root directory for workspace file storage.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,
    /// How many inputs one ready-batch poll hands out.
    #[serde(default = "default_ready_batch_size")]
    pub ready_batch_size: usize,
}

impl Default for RunletConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            storage_dir: default_storage_dir(),
            ready_batch_size: default_ready_batch_size(),
        }
    }
}

/// The data directory: `RUNLET_DATA_DIR`, else `~/.runlet`.
pub fn default_data_dir() -> String {
    std::env::var("RUNLET_DATA_DIR").unwrap_or_else(|_| {
        let home = dirs::home_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ".".to_string());
        format!("{home}/.runlet")
    })
}

fn default_database_url() -> String {
    format!("sqlite://{}/runlet.db", default_data_dir())
}

fn default_storage_dir() -> String {
    format!("{}/storage", default_data_dir())
}

fn default_ready_batch_size() -> usize {
    10
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - Missing file: returns [`RunletConfig::default()`].
/// - Unparseable file: logs a warning and returns the default.
pub async fn load_config(data_dir: &Path) -> RunletConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(
                "no config.toml at {}, using defaults",
                config_path.display()
            );
            return RunletConfig::default();
        }
        Err(err) => {
            tracing::warn!(
                "failed to read {}: {err}, using defaults",
                config_path.display()
            );
            return RunletConfig::default();
        }
    };

    match toml::from_str::<RunletConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            RunletConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).await;
        assert_eq!(config.ready_batch_size, 10);
        assert!(config.database_url.ends_with("runlet.db"));
    }

    #[tokio::test]
    async fn load_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
database_url = "sqlite:///var/lib/runlet/runlet.db"
ready_batch_size = 32
"#,
        )
        .await
        .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.database_url, "sqlite:///var/lib/runlet/runlet.db");
        assert_eq!(config.ready_batch_size, 32);
        // Unset fields keep their defaults.
        assert!(config.storage_dir.ends_with("storage"));
    }

    #[tokio::test]
    async fn load_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml")
            .await
            .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.ready_batch_size, 10);
    }
}
