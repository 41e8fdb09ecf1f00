use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::{debug, info};

use super::{
    CredentialStore, MASTER_TOKEN_NAME, MasterRecord, StoreConfig, StoreError, Token,
    permission_repo, token_repo,
};
use crate::crypto::{MasterKey, constant_time_eq};
use crate::permissions::{KeyInfo, NewPermission, Permission};
use crate::validation;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed [`CredentialStore`].
///
/// Several handles may point at the same database file; the master row is
/// guarded by a partial unique index rather than by in-process locking.
pub struct SqliteStore {
    pool: SqlitePool,
    master_key: MasterKey,
    op_timeout: Duration,
    closed: AtomicBool,
}

impl SqliteStore {
    pub async fn open(config: &StoreConfig, master_key: MasterKey) -> Result<Self, StoreError> {
        let pool = if config.is_memory() {
            let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
            // one connection, kept forever: each connection is its own database
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Invalid(format!(
                        "failed to create db directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
            let options = SqliteConnectOptions::new()
                .filename(&config.path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(BUSY_TIMEOUT)
                .foreign_keys(true);
            SqlitePoolOptions::new()
                .max_connections(config.max_connections.max(1))
                .connect_with(options)
                .await?
        };

        sqlx::migrate!().run(&pool).await?;
        info!(path = %config.path.display(), "credential store opened");

        Ok(Self {
            pool,
            master_key,
            op_timeout: config.op_timeout,
            closed: AtomicBool::new(false),
        })
    }

    /// Underlying pool, for inspection in tests and maintenance tooling.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(res) => res,
            Err(_) => Err(StoreError::Timeout(self.op_timeout)),
        }
    }

    async fn require_token(&self, id: i64) -> Result<token_repo::TokenRow, StoreError> {
        token_repo::find_by_id(&self.pool, id)
            .await?
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn lookup_key(&self, presented: &str) -> Result<KeyInfo, StoreError> {
        let presented = presented.trim();
        if presented.is_empty() {
            return Err(StoreError::NotFound);
        }
        let hash = self.master_key.lookup_hash(presented)?;

        self.run(async {
            let row = token_repo::find_by_hash(&self.pool, &hash)
                .await?
                .ok_or(StoreError::NotFound)?;
            if !constant_time_eq(&row.key_hash, &hash) {
                return Err(StoreError::NotFound);
            }

            if row.is_master || row.is_admin {
                return Ok(KeyInfo::privileged(row.id, row.name, row.is_master));
            }
            let permissions = permission_repo::list_for_token(&self.pool, row.id).await?;
            Ok(KeyInfo::scoped(row.id, row.name, permissions))
        })
        .await
    }

    async fn create_token(
        &self,
        name: &str,
        secret: &str,
        is_admin: bool,
    ) -> Result<Token, StoreError> {
        validation::validate_token_name(name)?;
        validation::validate_secret(secret)?;
        let hash = self.master_key.lookup_hash(secret)?;

        self.run(async {
            let id = token_repo::insert(&self.pool, &hash, name, is_admin).await?;
            debug!(token_id = id, is_admin, "token created");
            Ok(self.require_token(id).await?.into())
        })
        .await
    }

    async fn get_token(&self, id: i64) -> Result<Token, StoreError> {
        self.run(async { Ok(self.require_token(id).await?.into()) }).await
    }

    async fn list_tokens(&self) -> Result<Vec<Token>, StoreError> {
        self.run(async {
            let rows = token_repo::list(&self.pool).await?;
            Ok(rows.into_iter().map(Token::from).collect())
        })
        .await
    }

    async fn delete_token(&self, id: i64) -> Result<(), StoreError> {
        self.run(async {
            let row = self.require_token(id).await?;
            if row.is_master {
                return Err(StoreError::Invalid(
                    "the master token cannot be deleted".into(),
                ));
            }
            if token_repo::delete(&self.pool, id).await? == 0 {
                return Err(StoreError::NotFound);
            }
            debug!(token_id = id, "token deleted");
            Ok(())
        })
        .await
    }

    async fn add_permission(
        &self,
        token_id: i64,
        permission: NewPermission,
    ) -> Result<Permission, StoreError> {
        validation::validate_permission(&permission)?;

        self.run(async {
            let row = self.require_token(token_id).await?;
            if row.is_master || row.is_admin {
                return Err(StoreError::Invalid(
                    "master and admin tokens already have full access".into(),
                ));
            }
            let perm = permission_repo::insert(&self.pool, token_id, &permission).await?;
            debug!(token_id, permission_id = perm.id, zone_id = perm.zone_id, "permission added");
            Ok(perm)
        })
        .await
    }

    async fn list_permissions(&self, token_id: i64) -> Result<Vec<Permission>, StoreError> {
        self.run(async {
            self.require_token(token_id).await?;
            Ok(permission_repo::list_for_token(&self.pool, token_id).await?)
        })
        .await
    }

    async fn remove_permission(&self, id: i64) -> Result<(), StoreError> {
        self.run(async {
            if permission_repo::delete(&self.pool, id).await? == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await
    }

    async fn has_admin_token(&self) -> Result<bool, StoreError> {
        self.run(async { Ok(token_repo::admin_exists(&self.pool).await?) }).await
    }

    async fn create_master_if_absent(
        &self,
        credential: &str,
    ) -> Result<MasterRecord, StoreError> {
        validation::validate_secret(credential)?;
        let hash = self.master_key.lookup_hash(credential)?;
        let sealed = self.master_key.seal(credential)?;

        self.run(async {
            let mut tx = self.pool.begin().await?;
            let created =
                token_repo::insert_master_if_absent(&mut *tx, &hash, MASTER_TOKEN_NAME, &sealed)
                    .await?;
            // a non-master token already using this secret also blocks the insert
            let row = token_repo::find_master(&mut *tx)
                .await?
                .ok_or(StoreError::Duplicate)?;
            tx.commit().await?;

            let matches_credential = constant_time_eq(&row.key_hash, &hash);
            Ok(MasterRecord {
                token: row.into(),
                created,
                matches_credential,
            })
        })
        .await
    }

    async fn get_master_api_key(&self) -> Result<String, StoreError> {
        self.run(async {
            let row = token_repo::find_master(&self.pool)
                .await?
                .ok_or(StoreError::NotFound)?;
            let sealed = row
                .secret_ciphertext
                .ok_or_else(|| StoreError::Corrupt("master row has no sealed credential".into()))?;
            Ok(self.master_key.open(&sealed)?)
        })
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.run(async {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
        .await
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.pool.is_closed()
    }

    async fn close(&self) -> Result<(), StoreError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.pool.close().await;
            info!("credential store closed");
        }
        Ok(())
    }
}
