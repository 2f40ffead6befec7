//! JSON-RPC transport to the filesystem service.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dmboot_common::{BootConfig, RpcError};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

/// Sends one request and returns the raw `result` value.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Issue a single call. No retries.
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError>;
}

#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorObject {
    #[serde(default)]
    code: i64,
    message: String,
}

/// JSON-RPC code used when the server's error object is not well-formed.
const E_SERVER: i64 = -32000;

/// HTTP POST transport with basic authentication.
pub struct HttpTransport {
    client: Client,
    url: String,
    user: String,
    api_key: String,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// Create a transport for an explicit endpoint URL.
    ///
    /// The service always listens on the node itself, so proxy settings from
    /// the environment are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Transport`] if the HTTP client cannot be built.
    pub fn new(
        url: impl Into<String>,
        user: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, RpcError> {
        let client = Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| RpcError::Transport {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            url: url.into(),
            user: user.into(),
            api_key: api_key.into(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Create a transport for the local service as the admin user.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Transport`] if the HTTP client cannot be built.
    pub fn local_admin(config: &BootConfig, api_key: impl Into<String>) -> Result<Self, RpcError> {
        Self::new(config.rpc_url(), config.admin_user.clone(), api_key)
    }

    /// Endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });

        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.user, Some(&self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcError::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| RpcError::Transport {
            message: format!("Error reading body: {e}"),
        })?;

        decode_response(status.as_u16(), status.is_success(), &text)
    }
}

/// Decode a response body into the call result.
///
/// A JSON-RPC error object wins over the HTTP status so that server
/// messages are never lost.
fn decode_response(status: u16, success: bool, body: &str) -> Result<Value, RpcError> {
    let envelope: ResponseEnvelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(_) if !success => {
            return Err(RpcError::HttpStatus {
                status,
                body: body.to_string(),
            });
        }
        Err(e) => {
            return Err(RpcError::Decode {
                message: e.to_string(),
                body: body.to_string(),
            });
        }
    };

    if let Some(error) = envelope.error.filter(|e| !e.is_null()) {
        return Err(match serde_json::from_value::<ErrorObject>(error.clone()) {
            Ok(obj) => RpcError::Remote {
                code: obj.code,
                message: obj.message,
            },
            Err(_) => RpcError::Remote {
                code: E_SERVER,
                message: error.to_string(),
            },
        });
    }

    if !success {
        return Err(RpcError::HttpStatus {
            status,
            body: body.to_string(),
        });
    }

    match envelope.result {
        Some(result) if !result.is_null() => Ok(result),
        _ => Err(RpcError::NullResult),
    }
}
