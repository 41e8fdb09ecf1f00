pub mod health;
pub mod proxy;

use axum::{Extension, Router, middleware::from_fn_with_state, routing::get};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use crate::SharedState;
use crate::auth;

/// Health checks at `/health` and `/ready`; everything else goes through
/// `authenticate` then `check_permissions` before being proxied.
pub fn create_router(state: SharedState) -> Router {
    let proxied = Router::new()
        .fallback(proxy::forward)
        .layer(from_fn_with_state(state.auth.clone(), auth::check_permissions))
        .layer(from_fn_with_state(state.auth.clone(), auth::authenticate));

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .merge(proxied)
        .layer(Extension(state))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}
