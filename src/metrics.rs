//! Injected sink for authentication and authorization failures.
use std::fmt;

/// Why a request was turned away before reaching upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthFailureReason {
    MissingKey,
    InvalidKey,
    PermissionDenied,
    UnsupportedRoute,
    MalformedBody,
    StoreUnavailable,
}

impl AuthFailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthFailureReason::MissingKey => "missing_key",
            AuthFailureReason::InvalidKey => "invalid_key",
            AuthFailureReason::PermissionDenied => "permission_denied",
            AuthFailureReason::UnsupportedRoute => "unsupported_route",
            AuthFailureReason::MalformedBody => "malformed_body",
            AuthFailureReason::StoreUnavailable => "store_unavailable",
        }
    }
}

impl fmt::Display for AuthFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implementations must not block; they run inline on the request path.
pub trait AuthMetrics: Send + Sync {
    fn record_auth_failure(&self, reason: AuthFailureReason);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl AuthMetrics for NoopMetrics {
    fn record_auth_failure(&self, _reason: AuthFailureReason) {}
}

/// Emits one structured event per failure under the `zonegate::metrics` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetrics;

impl AuthMetrics for TracingMetrics {
    fn record_auth_failure(&self, reason: AuthFailureReason) {
        tracing::info!(
            target: "zonegate::metrics",
            counter = "auth_failures_total",
            reason = reason.as_str(),
            "auth failure"
        );
    }
}
