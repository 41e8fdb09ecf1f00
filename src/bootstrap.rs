//! One-time creation of the master identity from the upstream credential.
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::{CredentialStore, StoreError};
use crate::permissions::KeyInfo;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("upstream credential is empty")]
    EmptyCredential,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BootstrapState {
    /// Only the master credential exists; no admin token has been issued.
    Unconfigured,
    Configured,
}

#[derive(Clone)]
pub struct BootstrapService {
    store: Arc<dyn CredentialStore>,
}

impl BootstrapService {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Create the master identity if absent and return it.
    ///
    /// Idempotent. An existing master is never rotated, even when called with
    /// a different credential.
    pub async fn ensure_bootstrapped(&self, credential: &str) -> Result<KeyInfo, BootstrapError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(BootstrapError::EmptyCredential);
        }

        let record = self.store.create_master_if_absent(credential).await?;
        if record.created {
            info!(token_id = record.token.id, "master identity created");
        } else if !record.matches_credential {
            warn!(
                token_id = record.token.id,
                "master identity already exists with a different upstream credential; keeping the stored one"
            );
        }

        Ok(KeyInfo::privileged(record.token.id, record.token.name, true))
    }

    pub async fn state(&self) -> Result<BootstrapState, StoreError> {
        if self.store.has_admin_token().await? {
            Ok(BootstrapState::Configured)
        } else {
            Ok(BootstrapState::Unconfigured)
        }
    }

    /// Whether the master credential may still authenticate requests.
    ///
    /// With `lockout` set, it stops working once an admin token exists.
    pub async fn master_key_allowed(&self, lockout: bool) -> Result<bool, StoreError> {
        if !lockout {
            return Ok(true);
        }
        Ok(self.state().await? == BootstrapState::Unconfigured)
    }
}
