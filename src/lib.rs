//! Crate entrypoint wiring together configuration, the credential store, the
//! authorization engine and the upstream proxy.

pub mod actions;
pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod evaluator;
pub mod metrics;
pub mod permissions;
pub mod upstream;
pub mod validation;

use std::sync::Arc;

use auth::Authenticator;
use config::AppConfig;
use db::CredentialStore;
use metrics::AuthMetrics;
use upstream::UpstreamClient;

/// Complete application dependencies shared across handlers.
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn CredentialStore>,
    pub auth: Arc<Authenticator>,
    pub upstream: UpstreamClient,
}

/// Arc-wrapped version of `AppState` passed into Axum extensions.
pub type SharedState = Arc<AppState>;

impl AppState {
    /// `upstream_api_key` is the decrypted master credential.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn CredentialStore>,
        metrics: Arc<dyn AuthMetrics>,
        upstream_api_key: &str,
    ) -> SharedState {
        let auth = Authenticator::new(store.clone(), config.auth.clone()).with_metrics(metrics);
        let upstream = UpstreamClient::new(&config.upstream, upstream_api_key);
        Arc::new(Self {
            config,
            store,
            auth: Arc::new(auth),
            upstream,
        })
    }
}
