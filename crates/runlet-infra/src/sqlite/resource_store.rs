//! SQLite resource store: the batch reads parameter references resolve
//! against, plus the upsert methods that populate them.
//!
//! Batch reads use dynamic `IN (...)` placeholder lists over the reader
//! pool; missing ids simply don't appear in the result, and the resolver
//! turns the gap into a typed not-found error.

use runlet_core::repository::ResourceStore;
use runlet_types::error::RepositoryError;
use runlet_types::resource::{Credential, DatabaseConnection, StoredFile, Variable};
use sqlx::Row;

use super::pool::DatabasePool;
use super::scheduler_store::{format_datetime, parse_datetime, parse_uuid, query_err, SqliteSchedulerStore};

/// Fetch rows by id list with a dynamic placeholder set.
async fn rows_by_ids(
    pool: &DatabasePool,
    table: &str,
    ids: &[String],
) -> Result<Vec<sqlx::sqlite::SqliteRow>, RepositoryError> {
    if ids.is_empty() {
        return Ok(vec![]);
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!("SELECT * FROM {table} WHERE id IN ({placeholders})");

    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(id);
    }

    query.fetch_all(&pool.reader).await.map_err(query_err)
}

// ---------------------------------------------------------------------------
// ResourceStore impl
// ---------------------------------------------------------------------------

impl ResourceStore for SqliteSchedulerStore {
    async fn variables_by_ids(&self, ids: &[String]) -> Result<Vec<Variable>, RepositoryError> {
        let rows = rows_by_ids(&self.pool, "variables", ids).await?;
        let mut variables = Vec::with_capacity(rows.len());
        for row in &rows {
            let workspace_id: String = row.try_get("workspace_id").map_err(query_err)?;
            variables.push(Variable {
                id: row.try_get("id").map_err(query_err)?,
                workspace_id: parse_uuid(&workspace_id)?,
                value: row.try_get("value").map_err(query_err)?,
                is_secret: row.try_get("is_secret").map_err(query_err)?,
            });
        }
        Ok(variables)
    }

    async fn credentials_by_ids(
        &self,
        ids: &[String],
    ) -> Result<Vec<Credential>, RepositoryError> {
        let rows = rows_by_ids(&self.pool, "credentials", ids).await?;
        let mut credentials = Vec::with_capacity(rows.len());
        for row in &rows {
            let workspace_id: String = row.try_get("workspace_id").map_err(query_err)?;
            credentials.push(Credential {
                id: row.try_get("id").map_err(query_err)?,
                workspace_id: parse_uuid(&workspace_id)?,
                name: row.try_get("name").map_err(query_err)?,
                ciphertext: row.try_get("ciphertext").map_err(query_err)?,
            });
        }
        Ok(credentials)
    }

    async fn databases_by_ids(
        &self,
        ids: &[String],
    ) -> Result<Vec<DatabaseConnection>, RepositoryError> {
        let rows = rows_by_ids(&self.pool, "database_connections", ids).await?;
        let mut databases = Vec::with_capacity(rows.len());
        for row in &rows {
            let workspace_id: String = row.try_get("workspace_id").map_err(query_err)?;
            let port: i64 = row.try_get("port").map_err(query_err)?;
            databases.push(DatabaseConnection {
                id: row.try_get("id").map_err(query_err)?,
                workspace_id: parse_uuid(&workspace_id)?,
                name: row.try_get("name").map_err(query_err)?,
                connection_string: row.try_get("connection_string").map_err(query_err)?,
                host: row.try_get("host").map_err(query_err)?,
                port: port as u16,
                database_name: row.try_get("database_name").map_err(query_err)?,
                username: row.try_get("username").map_err(query_err)?,
            });
        }
        Ok(databases)
    }

    async fn files_by_ids(&self, ids: &[String]) -> Result<Vec<StoredFile>, RepositoryError> {
        let rows = rows_by_ids(&self.pool, "files", ids).await?;
        let mut files = Vec::with_capacity(rows.len());
        for row in &rows {
            let workspace_id: String = row.try_get("workspace_id").map_err(query_err)?;
            let size_bytes: i64 = row.try_get("size_bytes").map_err(query_err)?;
            let created_at: String = row.try_get("created_at").map_err(query_err)?;
            files.push(StoredFile {
                id: row.try_get("id").map_err(query_err)?,
                workspace_id: parse_uuid(&workspace_id)?,
                filename: row.try_get("filename").map_err(query_err)?,
                relative_path: row.try_get("relative_path").map_err(query_err)?,
                content_type: row.try_get("content_type").map_err(query_err)?,
                size_bytes: size_bytes as u64,
                created_at: parse_datetime(&created_at)?,
            });
        }
        Ok(files)
    }
}

// ---------------------------------------------------------------------------
// Upserts
// ---------------------------------------------------------------------------

impl SqliteSchedulerStore {
    /// Upsert a workspace variable.
    pub async fn save_variable(&self, variable: &Variable) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO variables (id, workspace_id, value, is_secret)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 workspace_id = excluded.workspace_id,
                 value = excluded.value,
                 is_secret = excluded.is_secret"#,
        )
        .bind(&variable.id)
        .bind(variable.workspace_id.to_string())
        .bind(&variable.value)
        .bind(variable.is_secret)
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    /// Upsert a workspace credential.
    pub async fn save_credential(&self, credential: &Credential) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO credentials (id, workspace_id, name, ciphertext)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 workspace_id = excluded.workspace_id,
                 name = excluded.name,
                 ciphertext = excluded.ciphertext"#,
        )
        .bind(&credential.id)
        .bind(credential.workspace_id.to_string())
        .bind(&credential.name)
        .bind(&credential.ciphertext)
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    /// Upsert a workspace database connection.
    pub async fn save_database(
        &self,
        database: &DatabaseConnection,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO database_connections
               (id, workspace_id, name, connection_string, host, port, database_name, username)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 workspace_id = excluded.workspace_id,
                 name = excluded.name,
                 connection_string = excluded.connection_string,
                 host = excluded.host,
                 port = excluded.port,
                 database_name = excluded.database_name,
                 username = excluded.username"#,
        )
        .bind(&database.id)
        .bind(database.workspace_id.to_string())
        .bind(&database.name)
        .bind(&database.connection_string)
        .bind(&database.host)
        .bind(database.port as i64)
        .bind(&database.database_name)
        .bind(&database.username)
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;
        Ok(())
    }

    /// Upsert a workspace file record.
    pub async fn save_file(&self, file: &StoredFile) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO files
               (id, workspace_id, filename, relative_path, content_type, size_bytes, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 workspace_id = excluded.workspace_id,
                 filename = excluded.filename,
                 relative_path = excluded.relative_path,
                 content_type = excluded.content_type,
                 size_bytes = excluded.size_bytes"#,
        )
        .bind(&file.id)
        .bind(file.workspace_id.to_string())
        .bind(&file.filename)
        .bind(&file.relative_path)
        .bind(&file.content_type)
        .bind(file.size_bytes as i64)
        .bind(format_datetime(&file.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
