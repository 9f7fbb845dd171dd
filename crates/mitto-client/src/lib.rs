// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mitto client - contract-checked RPC proxies over pluggable transports.
//!
//! This crate turns a [`mitto_wire::ServiceContract`] into a live
//! [`ServiceProxy`]: a handle that routes method calls to one remote
//! interface, negotiates the contract fingerprint up front, manages
//! per-client server instances, and can divert fire-and-forget methods
//! into a durable, SQLite-backed notification queue.
//!
//! # Features
//!
//! - **Contract Negotiation**: Fingerprints are compared once, at
//!   registration; a mismatch means no proxy is ever constructed
//! - **Dynamic Dispatch**: Calls by wire name with JSON arguments, plus a
//!   raw entry point for methods that return custom payloads
//! - **Instance Lifecycle**: Single, client-driven and shared instancing,
//!   with automatic allocation, URI-suffixed routing and release
//! - **Session Recovery**: One transparent retry with a fresh instance
//!   after the server forgets a client-driven session
//! - **Durable Notifications**: Zero-output methods persist locally and a
//!   background worker delivers them oldest first, surviving restarts
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use mitto_client::{
//!     HttpTransport, InstancingMode, ProxyConfig, ServiceProxy, SharedScope,
//! };
//! use mitto_wire::{MethodDescriptor, ParamSpec, ServiceContract};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> mitto_client::Result<()> {
//!     let contract = ServiceContract::builder("Calculator")
//!         .method(MethodDescriptor::new(
//!             "Add",
//!             vec![ParamSpec::input("n1"), ParamSpec::input("n2")],
//!             true,
//!         ))
//!         .build()?;
//!
//!     let transport = Arc::new(HttpTransport::with_defaults()?);
//!     let proxy = ServiceProxy::register(
//!         contract,
//!         InstancingMode::Shared(SharedScope::PerSession),
//!         transport,
//!         ProxyConfig::new("http://127.0.0.1:8080/root"),
//!     )
//!     .await?;
//!
//!     // Results arrive as the positional array of output values.
//!     let sum = proxy
//!         .invoke("Add", vec![json!(2).into(), json!(3).into()])
//!         .await?;
//!     assert_eq!(sum, json!([5]));
//!     Ok(())
//! }
//! ```
//!
//! # Durable Notifications
//!
//! Methods that produce no output can be queued instead of sent. Once a
//! store is registered, such calls return immediately after a local
//! write; delivery order is the enqueue order, and failed sends are
//! retried forever on a fixed period:
//!
//! ```ignore
//! use mitto_client::{QueueOptions, SqliteNotificationStore};
//!
//! let store = Arc::new(SqliteNotificationStore::from_path("notifications.db").await?);
//! proxy
//!     .register_notification_queue(store, QueueOptions::default())
//!     .await?;
//!
//! // Persisted locally, delivered in the background.
//! proxy.invoke("LogEvent", vec![json!("audit").into()]).await?;
//! ```
//!
//! # Configuration
//!
//! Proxies can be configured via environment variables or programmatically:
//!
//! ## Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `MITTO_ROOT_URI` | Yes | - | Base URI of the service root |
//! | `MITTO_ROUTING` | No | `plain` | `plain` or `mangled` interface routing |
//! | `MITTO_URI_OVERRIDE` | No | - | Full URI replacing root and interface |
//! | `MITTO_PARAMS_AS_OBJECT` | No | `false` | Encode parameters as a JSON object |
//! | `MITTO_RESULT_AS_OBJECT` | No | `false` | Whole reply body is the result |
//! | `MITTO_DELAYED_INSTANCE` | No | `false` | Defer client-driven allocation |
//! | `MITTO_CONTRACT_CHECK` | No | `verify` | `verify`, `skip` or a pinned fingerprint |
//! | `MITTO_PAYLOAD_LOG_LIMIT` | No | `2048` | Max payload bytes in debug logs |
//! | `MITTO_CONNECT_TIMEOUT_MS` | No | `5000` | HTTP connect timeout |
//! | `MITTO_REQUEST_TIMEOUT_MS` | No | `30000` | HTTP request timeout |
//!
//! ## Programmatic Configuration
//!
//! ```ignore
//! use mitto_client::{ContractCheck, ProxyConfig, Routing};
//!
//! let config = ProxyConfig::new("https://api.example.com/root")
//!     .with_routing(Routing::Mangled)
//!     .with_contract_check(ContractCheck::Expected("9f86d081884c7d65".into()))
//!     .with_params_as_object(true);
//! ```

mod config;
mod error;
mod instancing;
mod invoker;
mod outbox;
mod proxy;
mod transport;

// Main types
pub use error::{ClientError, Result};
pub use proxy::{CallArg, ServiceProxy};

// Configuration
pub use config::{ContractCheck, HttpTransportConfig, ProxyConfig, Routing};
pub use instancing::{InstancingMode, SharedScope};

// Transport layer
pub use transport::{
    HttpTransport, NO_ANSWER_HEADER, ROUTING_HEADER, SESSION_HEADER, Transport, TransportError,
    TransportReply, TransportRequest,
};

// Raw answers for custom-result methods
pub use invoker::RawAnswer;

// Durable notification queue
pub use outbox::{
    DEFAULT_RETRY_PERIOD, MIN_RETRY_PERIOD, NewNotification, NotificationQueue, NotificationStore,
    PendingNotification, QueueOptions, SqliteNotificationStore, StoreError,
};

// Re-export contract-building types for call sites
pub use mitto_wire::{
    ContractBuilder, MethodDescriptor, MethodOptions, ParamDirection, ParamSpec, ServiceContract,
};
