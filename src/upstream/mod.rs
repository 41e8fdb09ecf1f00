//! Forwarding to the DNS management API behind the proxy.
pub mod client;

use std::time::Duration;

pub use client::{UpstreamClient, UpstreamResponse};

pub const DEFAULT_BASE_URL: &str = "https://api.bunny.net";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// e.g. "https://api.bunny.net"; request paths are appended as-is.
    pub base_url: String,
    /// Preconfigured client; a default one is built when absent.
    pub http_client: Option<reqwest::Client>,
    pub timeout: Duration,
    /// Header the upstream expects its API key in.
    pub api_key_header: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            http_client: None,
            timeout: DEFAULT_TIMEOUT,
            api_key_header: "AccessKey".to_string(),
        }
    }
}
