//! Access-key authentication and permission middleware plus request extractors.
use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::LengthLimitError;
use tracing::{debug, warn};

use crate::actions::{ActionParser, ParsedRequest, ZONE_COLLECTION_ROOT};
use crate::bootstrap::BootstrapService;
use crate::db::{CredentialStore, StoreError};
use crate::error::AppError;
use crate::evaluator;
use crate::metrics::{AuthFailureReason, AuthMetrics, NoopMetrics};
use crate::permissions::KeyInfo;

pub const DEFAULT_ACCESS_KEY_HEADER: &str = "AccessKey";
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Header carrying the caller's API key.
    pub access_key_header: String,
    /// Bodies above this size are rejected before parsing.
    pub max_body_bytes: usize,
    /// Stop accepting the master credential once an admin token exists.
    pub master_key_lockout: bool,
    /// Path prefix of the zone collection.
    pub zone_root: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_key_header: DEFAULT_ACCESS_KEY_HEADER.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            master_key_lockout: false,
            zone_root: ZONE_COLLECTION_ROOT.to_string(),
        }
    }
}

/// A rejected request: the response to send and the metric reason to record.
#[derive(Debug)]
pub struct AuthFailure {
    pub reason: AuthFailureReason,
    pub error: AppError,
}

impl AuthFailure {
    fn new(reason: AuthFailureReason, error: AppError) -> Self {
        Self { reason, error }
    }
}

pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
    bootstrap: BootstrapService,
    metrics: Arc<dyn AuthMetrics>,
    parser: ActionParser,
    config: AuthConfig,
}

impl Authenticator {
    pub fn new(store: Arc<dyn CredentialStore>, config: AuthConfig) -> Self {
        Self {
            bootstrap: BootstrapService::new(store.clone()),
            store,
            metrics: Arc::new(NoopMetrics),
            parser: ActionParser::new(config.zone_root.as_str()),
            config,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn AuthMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn parser(&self) -> &ActionParser {
        &self.parser
    }

    /// Resolve the caller from the access key header.
    pub async fn identify(&self, headers: &HeaderMap) -> Result<KeyInfo, AuthFailure> {
        let presented = headers
            .get(self.config.access_key_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .unwrap_or_default();

        if presented.is_empty() {
            return Err(AuthFailure::new(
                AuthFailureReason::MissingKey,
                AppError::unauthorized("missing API key"),
            ));
        }

        let key = match self.store.lookup_key(presented).await {
            Ok(key) => key,
            Err(e) if e.is_unavailable() => {
                warn!(error = %e, "credential store unavailable during key lookup");
                return Err(store_unavailable());
            }
            Err(_) => {
                debug!(key = %mask_key(presented), "rejected unknown API key");
                return Err(invalid_key());
            }
        };

        if key.is_master && self.config.master_key_lockout {
            match self.bootstrap.master_key_allowed(true).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(key = %mask_key(presented), "master key used after admin token issued");
                    return Err(invalid_key());
                }
                Err(e) => {
                    warn!(error = %e, "credential store unavailable during lockout check");
                    return Err(store_unavailable());
                }
            }
        }

        Ok(key)
    }

    /// Classify the request and check it against the caller's permissions.
    pub fn authorize(
        &self,
        key: &KeyInfo,
        method: &axum::http::Method,
        path: &str,
        body: &[u8],
    ) -> Result<ParsedRequest, AuthFailure> {
        let parsed = self.parser.parse(method, path, body).map_err(|e| {
            debug!(error = %e, "request could not be classified");
            let reason = if e.is_routing() {
                AuthFailureReason::UnsupportedRoute
            } else {
                AuthFailureReason::MalformedBody
            };
            AuthFailure::new(reason, AppError::bad_request(e.to_string()))
        })?;

        evaluator::check_permission(Some(key), &parsed).map_err(|denial| {
            debug!(
                key_id = key.key_id,
                action = %parsed.action,
                zone_id = parsed.zone_id,
                %denial,
                "permission denied"
            );
            AuthFailure::new(
                AuthFailureReason::PermissionDenied,
                AppError::forbidden("permission denied"),
            )
        })?;

        Ok(parsed)
    }

    fn reject(&self, failure: AuthFailure) -> Response {
        self.metrics.record_auth_failure(failure.reason);
        failure.error.into_response()
    }
}

fn invalid_key() -> AuthFailure {
    AuthFailure::new(
        AuthFailureReason::InvalidKey,
        AppError::unauthorized("invalid API key"),
    )
}

fn store_unavailable() -> AuthFailure {
    AuthFailure::new(
        AuthFailureReason::StoreUnavailable,
        AppError::from(StoreError::Closed),
    )
}

fn exceeds_length_limit(err: &axum::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

/// Mask a key for logging: `****` plus its last four characters.
pub fn mask_key(key: &str) -> String {
    let count = key.chars().count();
    if count <= 4 {
        return "****".to_string();
    }
    let tail: String = key.chars().skip(count - 4).collect();
    format!("****{tail}")
}

/// First stage: resolve the access key and attach its [`KeyInfo`].
pub async fn authenticate(
    State(auth): State<Arc<Authenticator>>,
    mut req: Request,
    next: Next,
) -> Response {
    match auth.identify(req.headers()).await {
        Ok(key) => {
            req.extensions_mut().insert(key);
            next.run(req).await
        }
        Err(failure) => auth.reject(failure),
    }
}

/// Second stage: buffer the body, classify, evaluate, then pass the same bytes on.
pub async fn check_permissions(
    State(auth): State<Arc<Authenticator>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(key) = req.extensions().get::<KeyInfo>().cloned() else {
        return auth.reject(AuthFailure::new(
            AuthFailureReason::MissingKey,
            AppError::unauthorized("missing API key"),
        ));
    };

    let (mut parts, body) = req.into_parts();
    let bytes = match axum::body::to_bytes(body, auth.config.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) if exceeds_length_limit(&e) => {
            debug!(limit = auth.config.max_body_bytes, "request body too large");
            return auth.reject(AuthFailure::new(
                AuthFailureReason::MalformedBody,
                AppError::PayloadTooLarge,
            ));
        }
        Err(e) => {
            debug!(error = %e, "failed to buffer request body");
            return auth.reject(AuthFailure::new(
                AuthFailureReason::MalformedBody,
                AppError::bad_request("failed to read request body"),
            ));
        }
    };

    match auth.authorize(&key, &parts.method, parts.uri.path(), &bytes) {
        Ok(parsed) => {
            parts.extensions.insert(parsed);
            next.run(Request::from_parts(parts, Body::from(bytes))).await
        }
        Err(failure) => auth.reject(failure),
    }
}

/// Extractor for the identity attached by [`authenticate`].
pub struct Authenticated(pub KeyInfo);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> {
        let key = parts.extensions.get::<KeyInfo>().cloned();
        async move {
            key.map(Authenticated)
                .ok_or_else(|| AppError::unauthorized("missing API key"))
        }
    }
}

/// Extractor for the classification attached by [`check_permissions`].
pub struct Authorized(pub ParsedRequest);

impl<S> FromRequestParts<S> for Authorized
where
    S: Send + Sync,
{
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> {
        let parsed = parts.extensions.get::<ParsedRequest>().cloned();
        async move {
            parsed
                .map(Authorized)
                .ok_or_else(|| AppError::forbidden("request was not authorized"))
        }
    }
}
