use std::net::SocketAddr;

use crate::auth::AuthConfig;
use crate::db::StoreConfig;
use crate::upstream::UpstreamConfig;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

/// Everything the server needs besides the two secrets.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen: SocketAddr,
    pub store: StoreConfig,
    pub upstream: UpstreamConfig,
    pub auth: AuthConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            store: StoreConfig::default(),
            upstream: UpstreamConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl AppConfig {
    /// Largest request body accepted anywhere in the stack.
    pub fn body_limit(&self) -> usize {
        self.auth.max_body_bytes
    }
}
