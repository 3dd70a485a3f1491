//! HTTP request gateway for the chat REST API.
//!
//! SYSTEM CONTEXT
//! ==============
//! The conversation store issues every CRUD call through [`RestApi`]; the
//! realtime channel never does. Paths are relative to the API base URL
//! (`chats/`, `messages/42/user/7`) and bodies are JSON both ways.
//!
//! ERROR HANDLING
//! ==============
//! Transport failures and non-2xx statuses are returned as `GatewayError`.
//! A 2xx response with an empty or non-JSON body decodes to `Value::Null`.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ClientConfig;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("HTTP client build failed: {0}")]
    ClientBuild(String),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{method} {path} returned HTTP {status}: {body}")]
    Status {
        method: String,
        path: String,
        status: u16,
        body: String,
    },
}

/// The three REST operations consumers need.
#[async_trait]
pub trait RestApi: Send + Sync {
    async fn get(&self, path: &str) -> Result<Value, GatewayError>;
    async fn post(&self, path: &str, body: &Value) -> Result<Value, GatewayError>;
    async fn delete(&self, path: &str) -> Result<Value, GatewayError>;
}

/// `reqwest`-backed gateway.
#[derive(Clone)]
pub struct Gateway {
    http: reqwest::Client,
    base_url: String,
}

impl Gateway {
    /// Build a gateway from client config.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is not http(s) or the HTTP client
    /// cannot be constructed.
    pub fn new(config: &ClientConfig) -> Result<Self, GatewayError> {
        let base_url = config.api_base_url.trim_end_matches('/').to_owned();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(GatewayError::InvalidBaseUrl(config.api_base_url.clone()));
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| GatewayError::ClientBuild(e.to_string()))?;
        Ok(Self { http, base_url })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn request(&self, method: reqwest::Method, path: &str, body: Option<&Value>) -> Result<Value, GatewayError> {
        let url = self.url(path);
        debug!(%method, %url, "gateway: request");

        let request = self.http.request(method.clone(), &url);
        let request = if let Some(json) = body { request.json(json) } else { request };

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            warn!(%method, %url, status = status.as_u16(), "gateway: request failed");
            return Err(GatewayError::Status {
                method: method.to_string(),
                path: path.to_owned(),
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(serde_json::from_str::<Value>(&text).unwrap_or(Value::Null))
    }
}

#[async_trait]
impl RestApi for Gateway {
    async fn get(&self, path: &str) -> Result<Value, GatewayError> {
        self.request(reqwest::Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, GatewayError> {
        self.request(reqwest::Method::POST, path, Some(body)).await
    }

    async fn delete(&self, path: &str) -> Result<Value, GatewayError> {
        self.request(reqwest::Method::DELETE, path, None).await
    }
}

#[cfg(test)]
#[path = "gateway_test.rs"]
mod tests;
