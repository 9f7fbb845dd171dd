// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Contract fingerprints and mangled routing names.
//!
//! The fingerprint is the value both sides exchange during negotiation: a
//! SHA-256 digest of the canonical signature text, truncated to 16 bytes and
//! rendered as lowercase hex. Any drift in method names, order, parameters
//! or result presence changes it.
//!
//! Negotiation replies arrive in two wire forms, both accepted here:
//! a bare one-element array `["<fingerprint>"]` (result-envelope servers)
//! and an object `{"contract":"<fingerprint>"}` (REST-routed servers). The
//! canonical encoding produced by this module is the object form.

use base64::Engine;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::WireError;

/// Hex characters in a fingerprint (16 digest bytes).
pub const FINGERPRINT_LEN: usize = 32;

/// Digest bytes encoded into a mangled routing name.
const MANGLED_DIGEST_LEN: usize = 12;

/// Longest reply excerpt quoted in a decode error.
const ERROR_EXCERPT_LEN: usize = 200;

/// Fingerprint of a canonical signature text.
pub(crate) fn signature_fingerprint(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut hex = format!("{digest:x}");
    hex.truncate(FINGERPRINT_LEN);
    hex
}

/// Obfuscated routing name for an interface.
///
/// URL-safe base64 (no padding) over the leading bytes of the interface
/// name's SHA-256. Used in place of the plain interface name when the
/// remote advertises mangled routing.
pub fn mangled_uri(interface: &str) -> String {
    let digest = Sha256::digest(interface.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&digest[..MANGLED_DIGEST_LEN])
}

/// Canonical wire form of a fingerprint: `{"contract":"<fingerprint>"}`.
pub fn encode_contract_body(fingerprint: &str) -> String {
    serde_json::json!({ "contract": fingerprint }).to_string()
}

/// Extract the remote fingerprint from a decoded negotiation reply.
///
/// Accepts a bare string, a one-element string array, or an object with a
/// string `contract` member.
///
/// # Errors
///
/// Returns [`WireError::ContractBody`] with a reply excerpt for any other
/// shape.
pub fn decode_contract_reply(result: &Value) -> Result<String, WireError> {
    match result {
        Value::String(s) => Ok(s.clone()),
        Value::Array(items) => match items.as_slice() {
            [Value::String(s)] => Ok(s.clone()),
            _ => Err(contract_body_error(result)),
        },
        Value::Object(map) => match map.get("contract") {
            Some(Value::String(s)) => Ok(s.clone()),
            _ => Err(contract_body_error(result)),
        },
        _ => Err(contract_body_error(result)),
    }
}

fn contract_body_error(result: &Value) -> WireError {
    let rendered = result.to_string();
    let mut end = ERROR_EXCERPT_LEN.min(rendered.len());
    while !rendered.is_char_boundary(end) {
        end -= 1;
    }
    WireError::ContractBody(rendered[..end].to_string())
}
