//! Request/response contract with the marketplace API.
//!
//! The sync engine only ever branches on [`TransportResponse::success`];
//! headers, auth and timeouts stay inside the transport implementation.

use std::time::Duration;

use anyhow::Context;
use serde_json::Value;

use crate::config::SyncConfig;
use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    /// Endpoint path relative to the API base URL (e.g. `/sync/profile`).
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl TransportRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }
}

/// Structured result of one request. Transports never return errors.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub success: bool,
    pub data: Option<Value>,
    pub message: Option<String>,
    /// HTTP status; `0` when no response was received.
    pub status_code: u16,
}

impl TransportResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            status_code: 200,
        }
    }

    pub fn failure(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
            status_code,
        }
    }

    /// No response at all (unreachable host, timeout, TLS failure).
    pub fn network_error(message: impl Into<String>) -> Self {
        Self::failure(0, message)
    }

    /// Payload of a successful response, or the failure as a `SyncError`.
    pub fn into_data(self) -> Result<Value, SyncError> {
        if !self.success {
            let message = self
                .message
                .unwrap_or_else(|| "request failed".to_string());
            return Err(SyncError::transport(self.status_code, message));
        }
        self.data
            .ok_or_else(|| SyncError::Decode("response carried no payload".to_string()))
    }
}

/// Authenticated request execution (consumed by the sync engine).
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, request: TransportRequest) -> TransportResponse;
}

/// `reqwest`-backed transport for the marketplace REST API.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(api_url: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn with_token(api_url: String, token: String, timeout: Duration) -> anyhow::Result<Self> {
        let mut transport = Self::new(api_url, timeout)?;
        transport.token = Some(token);
        Ok(transport)
    }

    pub fn from_config(config: &SyncConfig) -> anyhow::Result<Self> {
        let mut transport = Self::new(config.api_url.clone(), config.request_timeout)?;
        transport.token = config.auth_token.clone();
        Ok(transport)
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.api_url, path)
        } else {
            format!("{}/{}", self.api_url, path)
        }
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn request(&self, request: TransportRequest) -> TransportResponse {
        let url = self.url(&request.path);
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut req = self.client.request(method, &url);
        if !request.query.is_empty() {
            req = req.query(&request.query);
        }
        if let Some(body) = &request.body {
            req = req.json(body);
        }
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        tracing::debug!("{} {}", request.method.as_str(), url);

        let resp = match req.send().await {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => {
                return TransportResponse::network_error(format!("request to {url} timed out"));
            }
            Err(e) => return TransportResponse::network_error(e.to_string()),
        };

        let status = resp.status();
        let text = match resp.text().await {
            Ok(text) => text,
            Err(e) => {
                return TransportResponse::failure(
                    status.as_u16(),
                    format!("failed to read response body: {e}"),
                );
            }
        };
        let data: Option<Value> = if text.trim().is_empty() {
            None
        } else {
            serde_json::from_str(&text).ok()
        };

        if status.is_success() {
            return TransportResponse {
                success: true,
                data,
                message: None,
                status_code: status.as_u16(),
            };
        }

        let message = data
            .as_ref()
            .and_then(error_message)
            .or_else(|| (!text.trim().is_empty()).then(|| truncate(&text, 200)))
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());

        TransportResponse {
            success: false,
            data,
            message: Some(message),
            status_code: status.as_u16(),
        }
    }
}

/// Error text of a JSON error body (`detail`, `message` or `error`).
fn error_message(body: &Value) -> Option<String> {
    ["detail", "message", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn truncate(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push('…');
    }
    out
}
