// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mitto wire layer - service contracts and the JSON call envelope.
//!
//! This crate holds everything both ends of a mitto connection must agree
//! on before a call can travel:
//!
//! - **Contracts** (`contract`): ordered method descriptors for one service
//!   interface, with per-parameter directions and per-method options.
//! - **Fingerprints** (`fingerprint`): the deterministic digest a client
//!   compares against the remote's during negotiation, plus the mangled
//!   routing name derived from an interface name.
//! - **Envelopes** (`envelope`): encoding of call parameters (positional
//!   array or name-keyed object) and decoding of the `{"result":...,"id":...}`
//!   reply envelope.
//!
//! The crate is transport-agnostic: it never performs I/O and carries no
//! async machinery. `mitto-client` builds the proxy, invoker and durable
//! notification queue on top of it.

pub mod contract;
pub mod envelope;
pub mod fingerprint;

pub use contract::{
    ContractBuilder, MethodDescriptor, MethodOptions, ParamDirection, ParamSpec, ServiceContract,
    CONTRACT_PSEUDO_METHOD, FREE_PSEUDO_METHOD, INSTANCE_PSEUDO_METHOD, SIGNATURE_PSEUDO_METHOD,
    is_pseudo_method,
};
pub use envelope::{
    ResultEnvelope, decode_result, encode_params_array, encode_params_object, encode_result,
};
pub use fingerprint::{FINGERPRINT_LEN, decode_contract_reply, encode_contract_body, mangled_uri};

use thiserror::Error;

/// Errors produced while building contracts or coding wire bodies.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("duplicate method name: {0}")]
    DuplicateMethod(String),

    #[error("reserved method name: {0}")]
    ReservedMethod(String),

    #[error("interface name must not be empty")]
    EmptyInterfaceName,

    #[error("method name must not be empty")]
    EmptyMethodName,

    #[error("parameter count mismatch for {method}: expected {expected}, got {actual}")]
    ParamCount {
        method: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid result envelope: expected {{\"result\":...}}, got {body}")]
    Envelope { body: String },

    #[error("malformed contract body: {0}")]
    ContractBody(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
