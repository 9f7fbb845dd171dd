// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! JSON call bodies and the `{"result":...,"id":...}` reply envelope.
//!
//! Requests carry input parameters either positionally (a JSON array, the
//! default) or keyed by parameter name (a JSON object). Replies wrap the
//! method output in a `result` member, optionally accompanied by `id`, the
//! server-assigned instance identifier for client-driven services.

use serde_json::{Map, Value};

use crate::WireError;
use crate::contract::MethodDescriptor;

/// Longest reply excerpt quoted in a decode error.
const ERROR_EXCERPT_LEN: usize = 200;

/// A decoded reply envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultEnvelope {
    /// The method output. For multi-output methods this is the JSON array
    /// of `Out` parameters followed by the function result.
    pub result: Value,
    /// Instance identifier attached by the server, if any.
    pub instance_id: Option<u64>,
}

/// Encode input parameters positionally.
pub fn encode_params_array(args: &[Value]) -> String {
    Value::Array(args.to_vec()).to_string()
}

/// Encode input parameters keyed by their declared names.
///
/// # Errors
///
/// Returns [`WireError::ParamCount`] when the argument count does not match
/// the method's declared inputs.
pub fn encode_params_object(method: &MethodDescriptor, args: &[Value]) -> Result<String, WireError> {
    let names: Vec<&str> = method.input_params().map(|p| p.name.as_str()).collect();
    if names.len() != args.len() {
        return Err(WireError::ParamCount {
            method: method.name.clone(),
            expected: names.len(),
            actual: args.len(),
        });
    }
    let mut map = Map::with_capacity(args.len());
    for (name, arg) in names.into_iter().zip(args) {
        map.insert(name.to_string(), arg.clone());
    }
    Ok(Value::Object(map).to_string())
}

/// Encode a reply envelope. Used by tests and in-process servers.
pub fn encode_result(result: &Value, instance_id: Option<u64>) -> String {
    match instance_id {
        Some(id) => serde_json::json!({ "result": result, "id": id }).to_string(),
        None => serde_json::json!({ "result": result }).to_string(),
    }
}

/// Decode a reply body.
///
/// When `require_envelope` is false (no instance identifier in play) a body
/// that is not an envelope object is taken verbatim as the result; this is
/// how pseudo-method replies and envelope-less servers are handled. When it
/// is true the `result` member must be present.
///
/// # Errors
///
/// Returns [`WireError::Json`] for unparseable bodies and
/// [`WireError::Envelope`] when a required `result` member is missing.
pub fn decode_result(body: &str, require_envelope: bool) -> Result<ResultEnvelope, WireError> {
    let value: Value = serde_json::from_str(body)?;
    match value {
        Value::Object(mut map) if map.contains_key("result") => {
            let instance_id = map.get("id").and_then(Value::as_u64);
            // contains_key above guarantees the member exists
            let result = map.remove("result").unwrap_or(Value::Null);
            Ok(ResultEnvelope {
                result,
                instance_id,
            })
        }
        other if !require_envelope => Ok(ResultEnvelope {
            result: other,
            instance_id: None,
        }),
        _ => Err(WireError::Envelope {
            body: excerpt(body.trim()),
        }),
    }
}

/// First [`ERROR_EXCERPT_LEN`] bytes, cut back to a char boundary.
fn excerpt(body: &str) -> String {
    let mut end = ERROR_EXCERPT_LEN.min(body.len());
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ParamSpec;

    fn divide() -> MethodDescriptor {
        MethodDescriptor::new(
            "Divide",
            vec![
                ParamSpec::input("n1"),
                ParamSpec::input("n2"),
                ParamSpec::output("remainder"),
            ],
            true,
        )
    }

    #[test]
    fn test_encode_params_array_positional() {
        let body = encode_params_array(&[serde_json::json!(7), serde_json::json!(2)]);
        assert_eq!(body, "[7,2]");
        assert_eq!(encode_params_array(&[]), "[]");
    }

    #[test]
    fn test_encode_params_object_uses_input_names_only() {
        let body =
            encode_params_object(&divide(), &[serde_json::json!(7), serde_json::json!(2)]).unwrap();
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["n1"], 7);
        assert_eq!(value["n2"], 2);
        assert!(
            value.get("remainder").is_none(),
            "out params never travel with the request"
        );
    }

    #[test]
    fn test_encode_params_object_count_mismatch() {
        let err = encode_params_object(&divide(), &[serde_json::json!(7)]).unwrap_err();
        assert!(matches!(
            err,
            WireError::ParamCount {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_decode_result_envelope_with_id() {
        let envelope = decode_result(r#"{"result":[3,1],"id":268435457}"#, true).unwrap();
        assert_eq!(envelope.result, serde_json::json!([3, 1]));
        assert_eq!(envelope.instance_id, Some(268435457));
    }

    #[test]
    fn test_decode_result_envelope_without_id() {
        let envelope = decode_result(r#"{"result":[9]}"#, true).unwrap();
        assert_eq!(envelope.result, serde_json::json!([9]));
        assert_eq!(envelope.instance_id, None);
    }

    #[test]
    fn test_decode_bare_body_when_envelope_not_required() {
        let envelope = decode_result(r#"["abc123"]"#, false).unwrap();
        assert_eq!(envelope.result, serde_json::json!(["abc123"]));
        assert_eq!(envelope.instance_id, None);

        // An object without "result" is still a bare result here.
        let envelope = decode_result(r#"{"contract":"abc123"}"#, false).unwrap();
        assert_eq!(envelope.result["contract"], "abc123");
    }

    #[test]
    fn test_decode_requires_result_member_when_enveloped() {
        let err = decode_result(r#"{"id":5}"#, true).unwrap_err();
        match err {
            WireError::Envelope { body } => assert!(body.contains("\"id\":5")),
            other => panic!("expected Envelope error, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_non_json() {
        assert!(matches!(
            decode_result("<html>504</html>", false),
            Err(WireError::Json(_))
        ));
    }

    #[test]
    fn test_encode_result_round_trip() {
        let body = encode_result(&serde_json::json!([42]), Some(7));
        let envelope = decode_result(&body, true).unwrap();
        assert_eq!(envelope.result, serde_json::json!([42]));
        assert_eq!(envelope.instance_id, Some(7));

        let body = encode_result(&serde_json::json!([42]), None);
        assert_eq!(body, r#"{"result":[42]}"#);
    }

    #[test]
    fn test_error_excerpt_is_capped() {
        let long_body = format!(r#"{{"noresult":"{}"}}"#, "x".repeat(2000));
        let err = decode_result(&long_body, true).unwrap_err();
        match err {
            WireError::Envelope { body } => assert!(body.len() <= ERROR_EXCERPT_LEN),
            other => panic!("expected Envelope error, got {other:?}"),
        }

        // Cutting must respect char boundaries in multibyte bodies.
        let multibyte = format!(r#"{{"noresult":"{}"}}"#, "ü".repeat(2000));
        let err = decode_result(&multibyte, true).unwrap_err();
        match err {
            WireError::Envelope { body } => assert!(body.len() <= ERROR_EXCERPT_LEN),
            other => panic!("expected Envelope error, got {other:?}"),
        }
    }
}
