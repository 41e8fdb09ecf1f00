//! Liveness and readiness checks. Unauthenticated.
use std::time::Duration;

use axum::{Extension, Json, http::StatusCode};
use serde::Serialize;
use tracing::warn;

use crate::SharedState;
use crate::bootstrap::{BootstrapService, BootstrapState};
use crate::db::StoreError;

const READY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ReadyBody {
    pub status: &'static str,
    pub bootstrapped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap_state: Option<BootstrapState>,
}

// GET /health
pub async fn health(Extension(state): Extension<SharedState>) -> (StatusCode, Json<HealthBody>) {
    if state.store.is_closed() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthBody { status: "unhealthy" }),
        );
    }
    (StatusCode::OK, Json(HealthBody { status: "ok" }))
}

// GET /ready
pub async fn ready(Extension(state): Extension<SharedState>) -> (StatusCode, Json<ReadyBody>) {
    let not_ready = |reason: &str| {
        warn!(reason, "readiness check failed");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyBody {
                status: "not_ready",
                bootstrapped: false,
                bootstrap_state: None,
            }),
        )
    };

    let checks = async {
        state.store.ping().await?;
        let bootstrapped = match state.store.get_master_api_key().await {
            Ok(_) => true,
            Err(StoreError::NotFound) => false,
            Err(e) => return Err(e),
        };
        let bootstrap_state = BootstrapService::new(state.store.clone()).state().await?;
        Ok::<_, StoreError>((bootstrapped, bootstrap_state))
    };

    match tokio::time::timeout(READY_TIMEOUT, checks).await {
        Ok(Ok((bootstrapped, bootstrap_state))) => (
            StatusCode::OK,
            Json(ReadyBody {
                status: "ready",
                bootstrapped,
                bootstrap_state: Some(bootstrap_state),
            }),
        ),
        Ok(Err(e)) => not_ready(&e.to_string()),
        Err(_) => not_ready("timed out"),
    }
}
