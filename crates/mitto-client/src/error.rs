// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client error types.

use mitto_wire::WireError;
use thiserror::Error;

use crate::outbox::StoreError;
use crate::transport::TransportError;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by service proxies and the notification queue.
///
/// Delivery failures of queued notifications are deliberately absent: they
/// are recorded in the durable store and retried by the background worker,
/// never returned to the caller that enqueued them.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Local and remote contract fingerprints disagree. Raised during proxy
    /// construction; no proxy exists afterwards.
    #[error("contract mismatch for {interface}: expected {expected}, server has {actual}")]
    ContractMismatch {
        interface: String,
        expected: String,
        actual: String,
    },

    /// The request never produced an HTTP reply.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The remote answered with a non-success status.
    #[error("service call failed with status {status}: {message}")]
    Call { status: u16, message: String },

    /// The reply arrived but could not be decoded. Never retried.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Caller-side misuse: unknown method, wrong argument count, duplicate
    /// queue registration, releasing a shared proxy with outstanding
    /// references.
    #[error("configuration error: {0}")]
    Config(String),

    /// The durable notification store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ClientError {
    /// Build a [`ClientError::Call`] from a status code and reason phrase,
    /// appending the well-known hint for statuses that have one.
    pub(crate) fn call(status: u16, reason: &str) -> Self {
        let message = match (status_hint(status), reason.is_empty()) {
            (Some(hint), true) => hint.to_string(),
            (Some(hint), false) => format!("{reason} ({hint})"),
            (None, true) => format!("status {status}"),
            (None, false) => reason.to_string(),
        };
        ClientError::Call { status, message }
    }
}

impl From<WireError> for ClientError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Envelope { .. } | WireError::ContractBody(_) | WireError::Json(_) => {
                ClientError::InvalidResponse(err.to_string())
            }
            other => ClientError::Config(other.to_string()),
        }
    }
}

/// Troubleshooting hints attached to well-known HTTP statuses.
fn status_hint(status: u16) -> Option<&'static str> {
    match status {
        401 => Some("no active session"),
        403 | 405 => Some("method forbidden for this user group"),
        404 => Some("network problem or request timeout"),
        406 => Some("invalid input parameters"),
        501 => Some("server not reachable or broken connection"),
        503 => Some("check the communication parameters and network configuration"),
        _ => None,
    }
}
