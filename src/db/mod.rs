//! Credential storage: the store contract, its errors, and the SQLite backend.
pub mod permission_repo;
pub mod sqlite_store;
pub mod token_repo;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::crypto::CryptoError;
use crate::permissions::{KeyInfo, NewPermission, Permission};
use crate::validation::ValidationError;

pub use sqlite_store::SqliteStore;

/// Name given to the row created by bootstrap.
pub const MASTER_TOKEN_NAME: &str = "master";

/// Path value selecting a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    Duplicate,
    #[error("store is closed")]
    Closed,
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("stored data is corrupt: {0}")]
    Corrupt(String),
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl StoreError {
    /// True for failures of the store itself rather than of the caller's input.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            StoreError::Closed
                | StoreError::Timeout(_)
                | StoreError::Crypto(_)
                | StoreError::Corrupt(_)
                | StoreError::Migration(_)
                | StoreError::Database(_)
        )
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolClosed => StoreError::Closed,
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Decode(e) => StoreError::Corrupt(e.to_string()),
            sqlx::Error::ColumnDecode { index, source } => {
                StoreError::Corrupt(format!("column {index}: {source}"))
            }
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => StoreError::Duplicate,
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                StoreError::NotFound
            }
            sqlx::Error::Database(db_err) if db_err.is_check_violation() => {
                StoreError::Invalid(db_err.message().to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

impl From<ValidationError> for StoreError {
    fn from(err: ValidationError) -> Self {
        StoreError::Invalid(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// SQLite file path, or `:memory:`.
    pub path: PathBuf,
    /// Upper bound for every store operation.
    pub op_timeout: Duration,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/zonegate.db"),
            op_timeout: Duration::from_secs(5),
            max_connections: 8,
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::from(MEMORY_PATH),
            ..Self::default()
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn is_memory(&self) -> bool {
        self.path.as_os_str() == MEMORY_PATH
    }
}

/// A stored API token. Never carries the secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub id: i64,
    pub name: String,
    pub is_admin: bool,
    pub is_master: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MasterRecord {
    pub token: Token,
    /// This call inserted the row.
    pub created: bool,
    /// The stored row was created from the credential passed to this call.
    pub matches_credential: bool,
}

/// Everything the authentication layer and the admin CLI need from storage.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Resolve a presented key into its identity and permission set.
    async fn lookup_key(&self, presented: &str) -> Result<KeyInfo, StoreError>;

    async fn create_token(
        &self,
        name: &str,
        secret: &str,
        is_admin: bool,
    ) -> Result<Token, StoreError>;
    async fn get_token(&self, id: i64) -> Result<Token, StoreError>;
    async fn list_tokens(&self) -> Result<Vec<Token>, StoreError>;
    /// Removes the token and, by cascade, its permissions.
    async fn delete_token(&self, id: i64) -> Result<(), StoreError>;

    async fn add_permission(
        &self,
        token_id: i64,
        permission: NewPermission,
    ) -> Result<Permission, StoreError>;
    async fn list_permissions(&self, token_id: i64) -> Result<Vec<Permission>, StoreError>;
    async fn remove_permission(&self, id: i64) -> Result<(), StoreError>;

    async fn has_admin_token(&self) -> Result<bool, StoreError>;

    /// Atomically create the master row unless one exists.
    async fn create_master_if_absent(&self, credential: &str)
    -> Result<MasterRecord, StoreError>;
    /// The decrypted upstream credential; `NotFound` before bootstrap.
    async fn get_master_api_key(&self) -> Result<String, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
    fn is_closed(&self) -> bool;
    async fn close(&self) -> Result<(), StoreError>;
}
