use axum::body::Bytes;
use axum::http::{Method, StatusCode};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;

use super::UpstreamConfig;

/// Response relayed back to the caller.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("application/json"))
    }
}

#[derive(Clone)]
pub struct UpstreamClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_key_header: String,
    timeout: std::time::Duration,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig, api_key: impl Into<String>) -> Self {
        Self {
            http: config.http_client.clone().unwrap_or_default(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            api_key_header: config.api_key_header.clone(),
            timeout: config.timeout,
        }
    }

    fn url(&self, path_and_query: &str) -> String {
        format!(
            "{}/{}",
            self.base_url,
            path_and_query.trim_start_matches('/')
        )
    }

    /// Send the request upstream with the real credential substituted in.
    pub async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        content_type: Option<&str>,
        body: Bytes,
    ) -> anyhow::Result<UpstreamResponse> {
        let mut req = self
            .http
            .request(method, self.url(path_and_query))
            .header(self.api_key_header.as_str(), &self.api_key)
            .timeout(self.timeout);
        if let Some(ct) = content_type {
            req = req.header(CONTENT_TYPE, ct);
        }
        if !body.is_empty() {
            req = req.body(body);
        }

        let res = req.send().await?;
        let status = res.status();
        let content_type = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = res.bytes().await?;

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}
