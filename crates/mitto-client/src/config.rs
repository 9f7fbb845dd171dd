// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Proxy configuration.

use std::env;

use crate::error::{ClientError, Result};

/// How the interface segment of a service URI is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Routing {
    /// Plain interface name, e.g. `root/Calculator.Add`.
    #[default]
    InterfaceName,
    /// Obfuscated name derived from the interface name, for servers that
    /// advertise mangled routing.
    Mangled,
}

/// Contract verification policy applied at proxy construction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ContractCheck {
    /// Fetch the remote fingerprint and compare it with the locally
    /// computed one.
    #[default]
    Verify,
    /// Compare the remote fingerprint against this pinned value instead of
    /// computing one locally.
    Expected(String),
    /// Skip negotiation entirely. For servers that do not expose the
    /// negotiation pseudo-method.
    Skip,
}

/// Configuration for one service proxy registration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Server root URI the interface name is appended to
    /// (default: "http://127.0.0.1:8080/root")
    pub root_uri: String,
    /// Interface segment style (default: plain interface name)
    pub routing: Routing,
    /// Full replacement for the `root/interface` part of call URIs
    pub uri_override: Option<String>,
    /// Send input parameters as a name-keyed JSON object instead of a
    /// positional array (default: false)
    pub params_as_object: bool,
    /// The server replies with a plain JSON object instead of the
    /// `{"result":...}` envelope (default: false)
    pub result_as_object: bool,
    /// Contract verification policy (default: verify)
    pub contract_check: ContractCheck,
    /// For client-driven services, defer instance allocation until the
    /// first call instead of allocating at construction (default: false)
    pub delayed_instance: bool,
    /// Longest payload excerpt written to the log, in bytes (default: 2048)
    pub payload_log_limit: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            root_uri: "http://127.0.0.1:8080/root".to_string(),
            routing: Routing::default(),
            uri_override: None,
            params_as_object: false,
            result_as_object: false,
            contract_check: ContractCheck::default(),
            delayed_instance: false,
            payload_log_limit: 2048,
        }
    }
}

impl ProxyConfig {
    /// Create a configuration pointing at the given server root.
    pub fn new(root_uri: impl Into<String>) -> Self {
        Self {
            root_uri: root_uri.into(),
            ..Self::default()
        }
    }

    /// Create a configuration for local development.
    pub fn localhost() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    ///
    /// # Required Environment Variables
    /// - `MITTO_ROOT_URI` - Server root URI
    ///
    /// # Optional Environment Variables
    /// - `MITTO_ROUTING` - "plain" or "mangled" (default: "plain")
    /// - `MITTO_URI_OVERRIDE` - Full service URI replacing root + interface
    /// - `MITTO_PARAMS_AS_OBJECT` - Send name-keyed parameters (default: false)
    /// - `MITTO_RESULT_AS_OBJECT` - Expect envelope-less replies (default: false)
    /// - `MITTO_CONTRACT_CHECK` - "verify", "skip", or a pinned fingerprint
    /// - `MITTO_DELAYED_INSTANCE` - Defer instance allocation (default: false)
    /// - `MITTO_PAYLOAD_LOG_LIMIT` - Log excerpt cap in bytes (default: 2048)
    pub fn from_env() -> Result<Self> {
        let root_uri = env::var("MITTO_ROOT_URI")
            .map_err(|_| ClientError::Config("MITTO_ROOT_URI is required".to_string()))?;

        let routing = match env::var("MITTO_ROUTING").as_deref() {
            Ok("mangled") => Routing::Mangled,
            Ok("plain") | Err(_) => Routing::InterfaceName,
            Ok(other) => {
                return Err(ClientError::Config(format!(
                    "invalid MITTO_ROUTING: {other} (expected \"plain\" or \"mangled\")"
                )));
            }
        };

        let uri_override = env::var("MITTO_URI_OVERRIDE").ok();

        let params_as_object = env::var("MITTO_PARAMS_AS_OBJECT")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let result_as_object = env::var("MITTO_RESULT_AS_OBJECT")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let contract_check = match env::var("MITTO_CONTRACT_CHECK").as_deref() {
            Ok("verify") | Err(_) => ContractCheck::Verify,
            Ok("skip") => ContractCheck::Skip,
            Ok(pinned) => ContractCheck::Expected(pinned.to_string()),
        };

        let delayed_instance = env::var("MITTO_DELAYED_INSTANCE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let payload_log_limit = env::var("MITTO_PAYLOAD_LOG_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(2048);

        Ok(Self {
            root_uri,
            routing,
            uri_override,
            params_as_object,
            result_as_object,
            contract_check,
            delayed_instance,
            payload_log_limit,
        })
    }

    /// Set the interface routing style.
    pub fn with_routing(mut self, routing: Routing) -> Self {
        self.routing = routing;
        self
    }

    /// Replace the `root/interface` part of call URIs entirely.
    pub fn with_uri_override(mut self, uri: impl Into<String>) -> Self {
        self.uri_override = Some(uri.into());
        self
    }

    /// Send input parameters as a name-keyed JSON object.
    pub fn with_params_as_object(mut self, enabled: bool) -> Self {
        self.params_as_object = enabled;
        self
    }

    /// Expect plain-object replies instead of the result envelope.
    pub fn with_result_as_object(mut self, enabled: bool) -> Self {
        self.result_as_object = enabled;
        self
    }

    /// Set the contract verification policy.
    pub fn with_contract_check(mut self, check: ContractCheck) -> Self {
        self.contract_check = check;
        self
    }

    /// Defer client-driven instance allocation to the first call.
    pub fn with_delayed_instance(mut self, delayed: bool) -> Self {
        self.delayed_instance = delayed;
        self
    }

    /// Cap the payload excerpt written to the log.
    pub fn with_payload_log_limit(mut self, bytes: usize) -> Self {
        self.payload_log_limit = bytes;
        self
    }
}

/// Configuration for the bundled HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Connection timeout in milliseconds (default: 5_000)
    pub connect_timeout_ms: u64,
    /// Whole-request timeout in milliseconds (default: 30_000)
    pub request_timeout_ms: u64,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
        }
    }
}

impl HttpTransportConfig {
    /// Load configuration from environment variables.
    ///
    /// # Optional Environment Variables
    /// - `MITTO_CONNECT_TIMEOUT_MS` - Connection timeout (default: 5000)
    /// - `MITTO_REQUEST_TIMEOUT_MS` - Whole-request timeout (default: 30000)
    pub fn from_env() -> Self {
        let connect_timeout_ms = env::var("MITTO_CONNECT_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5_000);

        let request_timeout_ms = env::var("MITTO_REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30_000);

        Self {
            connect_timeout_ms,
            request_timeout_ms,
        }
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = timeout_ms;
        self
    }

    /// Set the whole-request timeout.
    pub fn with_request_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = timeout_ms;
        self
    }
}
