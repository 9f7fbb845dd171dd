// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Transport abstraction and the bundled HTTP implementation.
//!
//! A [`Transport`] carries one request/reply exchange and owns the opaque
//! session token handed out by the server's authentication layer. The
//! numeric instance identifier of client-driven services is not its
//! business; that travels in the call URI.

use std::str::FromStr;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::config::HttpTransportConfig;

/// Header carrying the opaque session token.
pub const SESSION_HEADER: &str = "x-mitto-session";

/// Header hinting that the caller does not wait for an answer body.
pub const NO_ANSWER_HEADER: &str = "x-mitto-no-answer";

/// Header on negotiation replies advertising the server's routing
/// preference (`plain` or `mangled`).
pub const ROUTING_HEADER: &str = "x-mitto-routing";

/// Errors raised below the HTTP status layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The remote endpoint could not be reached at all (connect failure,
    /// DNS, timeout).
    #[error("server unreachable: {0}")]
    Unreachable(String),

    /// The request was sent but no usable reply came back.
    #[error("transport failure: {0}")]
    Failed(String),

    /// This transport cannot host callback interfaces.
    #[error("callback interfaces require a bidirectional transport")]
    CallbacksUnsupported,
}

/// One outgoing service request.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub uri: String,
    pub verb: String,
    pub body: String,
    pub headers: Vec<(String, String)>,
    /// The caller will not read an answer body; transports may translate
    /// this into a fire-and-forget hint for the server.
    pub no_answer: bool,
}

impl TransportRequest {
    /// A POST request with a JSON body, the shape every service call uses.
    pub fn post(uri: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            verb: "POST".to_string(),
            body: body.into(),
            headers: Vec::new(),
            no_answer: false,
        }
    }

    /// Mark the request as fire-and-forget.
    pub fn with_no_answer(mut self) -> Self {
        self.no_answer = true;
        self
    }
}

/// One received reply.
#[derive(Debug, Clone)]
pub struct TransportReply {
    pub status: u16,
    /// Reason phrase, if the transport knows one.
    pub reason: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl TransportReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Request/reply carrier for service calls.
///
/// Implementations must be shareable across tasks; the notification worker
/// and interactive callers use the same transport concurrently.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one exchange.
    async fn call(&self, request: TransportRequest) -> Result<TransportReply, TransportError>;

    /// Replace the opaque session token attached to subsequent requests.
    fn set_session_token(&self, token: Option<String>);

    /// Register a client-side callback interface and return its numeric
    /// handle for the wire.
    ///
    /// The default implementation refuses: plain request/reply transports
    /// have no channel for the server to invoke the callback on.
    async fn register_callback(&self, interface: &str) -> Result<u64, TransportError> {
        let _ = interface;
        Err(TransportError::CallbacksUnsupported)
    }
}

/// reqwest-backed [`Transport`].
pub struct HttpTransport {
    client: reqwest::Client,
    session_token: RwLock<Option<String>>,
}

impl HttpTransport {
    /// Build a transport with the given timeouts.
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| TransportError::Failed(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            session_token: RwLock::new(None),
        })
    }

    /// Build a transport with default timeouts.
    pub fn with_defaults() -> Result<Self, TransportError> {
        Self::new(HttpTransportConfig::default())
    }

    fn current_token(&self) -> Option<String> {
        self.session_token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("has_session_token", &self.current_token().is_some())
            .finish()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, request: TransportRequest) -> Result<TransportReply, TransportError> {
        let method = reqwest::Method::from_str(&request.verb)
            .map_err(|_| TransportError::Failed(format!("invalid HTTP verb: {}", request.verb)))?;

        let mut builder = self
            .client
            .request(method, &request.uri)
            .header("Content-Type", "application/json");

        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(token) = self.current_token() {
            builder = builder.header(SESSION_HEADER, token);
        }
        if request.no_answer {
            builder = builder.header(NO_ANSWER_HEADER, "1");
        }

        let response = builder.body(request.body).send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                TransportError::Unreachable(e.to_string())
            } else {
                TransportError::Failed(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let reason = response
            .status()
            .canonical_reason()
            .unwrap_or_default()
            .to_string();

        let mut headers = Vec::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.push((name.to_string(), v.to_string()));
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Failed(format!("failed to read reply body: {e}")))?;

        debug!(uri = %request.uri, status, body_len = body.len(), "http exchange complete");

        Ok(TransportReply {
            status,
            reason,
            headers,
            body,
        })
    }

    fn set_session_token(&self, token: Option<String>) {
        let mut guard = self
            .session_token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = token;
    }
}
