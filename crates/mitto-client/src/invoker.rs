// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The call pipeline shared by proxies and the notification worker.
//!
//! An [`Invoker`] turns one method invocation into a transport exchange:
//! it selects the call URI (override, plain or mangled interface name,
//! instance suffix), encodes the parameter body, performs the POST, applies
//! the one-shot retry for expired sessions, maps non-success statuses to
//! errors with their troubleshooting hints, and decodes the result
//! envelope.

use std::sync::Arc;

use mitto_wire::{
    CONTRACT_PSEUDO_METHOD, FREE_PSEUDO_METHOD, INSTANCE_PSEUDO_METHOD, MethodDescriptor,
    MethodOptions, SIGNATURE_PSEUDO_METHOD, encode_params_array, encode_params_object,
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{ProxyConfig, Routing};
use crate::error::{ClientError, Result};
use crate::instancing::InstanceLifecycle;
use crate::transport::{ROUTING_HEADER, Transport, TransportReply, TransportRequest};

/// A reply returned verbatim for methods declared with `custom_result`.
#[derive(Debug, Clone)]
pub struct RawAnswer {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Stateless call pipeline bound to one interface and one transport.
///
/// Lifecycle state (instance identifier, released flag) lives in the
/// proxy's [`InstanceLifecycle`] and is passed into each call.
pub(crate) struct Invoker {
    transport: Arc<dyn Transport>,
    config: ProxyConfig,
    interface: String,
    mangled_name: String,
    routing: Routing,
}

impl Invoker {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        config: ProxyConfig,
        interface: &str,
    ) -> Self {
        let mangled_name = mitto_wire::mangled_uri(interface);
        let routing = config.routing;
        Self {
            transport,
            config,
            interface: interface.to_string(),
            mangled_name,
            routing,
        }
    }

    /// Same pipeline, different remote. Used by notification queues that
    /// target another server.
    pub(crate) fn with_transport(&self, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config: self.config.clone(),
            interface: self.interface.clone(),
            mangled_name: self.mangled_name.clone(),
            routing: self.routing,
        }
    }

    pub(crate) fn interface(&self) -> &str {
        &self.interface
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Switch the interface segment style. Called once, during
    /// registration, when the server advertises a preference.
    pub(crate) fn set_routing(&mut self, routing: Routing) {
        self.routing = routing;
    }

    // ========================================================================
    // High-level entry points
    // ========================================================================

    /// Call a contract method and decode its result.
    pub(crate) async fn invoke(
        &self,
        method: &MethodDescriptor,
        args: &[Value],
        lifecycle: &InstanceLifecycle,
    ) -> Result<Value> {
        if method.options.custom_result {
            return Err(ClientError::Config(format!(
                "method {} returns a custom answer; use invoke_raw",
                method.name
            )));
        }
        let body = self.encode_body(method, args)?;
        let reply = self
            .call_service(&method.name, body, lifecycle, method.options, false)
            .await?;
        self.decode_reply(&method.name, &reply, lifecycle)
    }

    /// Call a method and return the reply verbatim, whatever its status.
    pub(crate) async fn invoke_raw(
        &self,
        method: &MethodDescriptor,
        args: &[Value],
        lifecycle: &InstanceLifecycle,
    ) -> Result<RawAnswer> {
        let body = self.encode_body(method, args)?;
        let reply = self
            .call_service(&method.name, body, lifecycle, method.options, true)
            .await?;
        Ok(RawAnswer {
            status: reply.status,
            headers: reply.headers,
            body: reply.body,
        })
    }

    /// Fire one queued notification at the remote. The stored input is
    /// already a positional JSON array.
    pub(crate) async fn deliver_notification(
        &self,
        method: &str,
        input: &str,
        session: u64,
    ) -> Result<()> {
        let uri = self.call_uri(method, session);
        let request = TransportRequest::post(uri, input).with_no_answer();
        let reply = self.transport.call(request).await?;
        if reply.is_success() {
            Ok(())
        } else {
            Err(ClientError::call(reply.status, &reply.reason))
        }
    }

    // ========================================================================
    // Pseudo-methods
    // ========================================================================

    /// Fetch the remote contract fingerprint, plus the routing preference
    /// if the server advertises one.
    pub(crate) async fn retrieve_contract(
        &self,
        lifecycle: &InstanceLifecycle,
    ) -> Result<(String, Option<Routing>)> {
        let reply = self
            .call_service(
                CONTRACT_PSEUDO_METHOD,
                "[]".to_string(),
                lifecycle,
                MethodOptions::default(),
                false,
            )
            .await?;
        let advertised = reply.header(ROUTING_HEADER).and_then(|v| match v {
            "mangled" => Some(Routing::Mangled),
            "plain" => Some(Routing::InterfaceName),
            _ => None,
        });
        let envelope = mitto_wire::decode_result(&reply.body, false)?;
        let fingerprint = mitto_wire::decode_contract_reply(&envelope.result)?;
        Ok((fingerprint, advertised))
    }

    /// Fetch the remote's human-readable signature. Debug helper; servers
    /// may disable it.
    pub(crate) async fn retrieve_signature(&self, lifecycle: &InstanceLifecycle) -> Result<Value> {
        let reply = self
            .call_service(
                SIGNATURE_PSEUDO_METHOD,
                "[]".to_string(),
                lifecycle,
                MethodOptions::default(),
                false,
            )
            .await?;
        let envelope = mitto_wire::decode_result(&reply.body, false)?;
        Ok(envelope.result)
    }

    /// Allocate a client-driven instance and return its identifier.
    pub(crate) async fn acquire_instance(&self) -> Result<u64> {
        let uri = self.call_uri(INSTANCE_PSEUDO_METHOD, 0);
        let reply = self.transport.call(TransportRequest::post(uri, "[]")).await?;
        if !reply.is_success() {
            return Err(ClientError::call(reply.status, &reply.reason));
        }
        let envelope = mitto_wire::decode_result(&reply.body, false)?;
        if let Some(id) = envelope.instance_id.filter(|&id| id != 0) {
            return Ok(id);
        }
        // Some servers return the identifier as the result value instead.
        let id = match &envelope.result {
            Value::Number(n) => n.as_u64(),
            Value::Array(items) => items.first().and_then(Value::as_u64),
            _ => None,
        };
        id.filter(|&id| id != 0).ok_or_else(|| {
            ClientError::InvalidResponse(format!(
                "no instance identifier in reply: {}",
                excerpt(&reply.body, 200)
            ))
        })
    }

    /// Release a client-driven instance on the server.
    pub(crate) async fn free_instance(&self, instance_id: u64) -> Result<()> {
        let uri = self.call_uri(FREE_PSEUDO_METHOD, instance_id);
        let reply = self.transport.call(TransportRequest::post(uri, "[]")).await?;
        if reply.is_success() {
            Ok(())
        } else {
            Err(ClientError::call(reply.status, &reply.reason))
        }
    }

    // ========================================================================
    // Pipeline internals
    // ========================================================================

    /// Encode the input parameters per the configured body shape.
    fn encode_body(&self, method: &MethodDescriptor, args: &[Value]) -> Result<String> {
        let expected = method.input_params().count();
        if args.len() != expected {
            return Err(ClientError::Config(format!(
                "method {} expects {expected} input parameters, got {}",
                method.name,
                args.len()
            )));
        }
        if self.config.params_as_object {
            Ok(encode_params_object(method, args)?)
        } else {
            Ok(encode_params_array(args))
        }
    }

    /// POST the call and map the status. When `verbatim` is set the reply
    /// is returned whatever its status; otherwise a non-success status
    /// becomes a [`ClientError::Call`] with its troubleshooting hint.
    async fn call_service(
        &self,
        method: &str,
        body: String,
        lifecycle: &InstanceLifecycle,
        options: MethodOptions,
        verbatim: bool,
    ) -> Result<TransportReply> {
        let instance_id = lifecycle.instance_id();
        self.log_request(method, &body, options.suppress_input_log);

        let mut reply = self.post(method, body.clone(), instance_id).await?;

        // The server dropped the instance behind our identifier. Retry
        // exactly once without it; a second 401 surfaces.
        if reply.status == 401 && instance_id != 0 && lifecycle.mode().tracks_instance() {
            warn!(
                method,
                instance_id, "session rejected with 401, retrying once without it"
            );
            lifecycle.take_instance_id();
            reply = self.post(method, body, 0).await?;
        }

        self.log_reply(method, &reply, options.suppress_output_log);

        if verbatim || reply.is_success() {
            Ok(reply)
        } else {
            warn!(method, status = reply.status, "service call rejected");
            Err(ClientError::call(reply.status, &reply.reason))
        }
    }

    async fn post(&self, method: &str, body: String, instance_id: u64) -> Result<TransportReply> {
        let uri = self.call_uri(method, instance_id);
        Ok(self.transport.call(TransportRequest::post(uri, body)).await?)
    }

    /// Decode a successful reply into the method result, picking up any
    /// instance identifier the server attached.
    fn decode_reply(
        &self,
        method: &str,
        reply: &TransportReply,
        lifecycle: &InstanceLifecycle,
    ) -> Result<Value> {
        if self.config.result_as_object {
            // Envelope-less servers: the whole body is the result object.
            return serde_json::from_str(&reply.body).map_err(|e| {
                ClientError::InvalidResponse(format!("unparseable reply for {method}: {e}"))
            });
        }
        let envelope = mitto_wire::decode_result(&reply.body, lifecycle.instance_id() != 0)?;
        if lifecycle.mode().tracks_instance() {
            if let Some(id) = envelope.instance_id.filter(|&id| id != 0) {
                lifecycle.set_instance_id(id);
            }
        }
        Ok(envelope.result)
    }

    /// URI for one call: `{root}/{interface}.{method}` with the instance
    /// identifier appended when one is attached.
    fn call_uri(&self, method: &str, instance_id: u64) -> String {
        let base = match &self.config.uri_override {
            Some(uri) => uri.trim_end_matches('/').to_string(),
            None => {
                let name = match self.routing {
                    Routing::InterfaceName => self.interface.as_str(),
                    Routing::Mangled => self.mangled_name.as_str(),
                };
                format!("{}/{}", self.config.root_uri.trim_end_matches('/'), name)
            }
        };
        if instance_id == 0 {
            format!("{base}.{method}")
        } else {
            format!("{base}.{method}/{instance_id}")
        }
    }

    fn log_request(&self, method: &str, body: &str, suppress: bool) {
        if suppress {
            debug!(interface = %self.interface, method, "sending service call (payload suppressed)");
        } else {
            debug!(
                interface = %self.interface,
                method,
                body = %excerpt(body, self.config.payload_log_limit),
                "sending service call"
            );
        }
    }

    fn log_reply(&self, method: &str, reply: &TransportReply, suppress: bool) {
        if suppress {
            debug!(
                interface = %self.interface,
                method,
                status = reply.status,
                "service reply received (payload suppressed)"
            );
        } else {
            debug!(
                interface = %self.interface,
                method,
                status = reply.status,
                body = %excerpt(&reply.body, self.config.payload_log_limit),
                "service reply received"
            );
        }
    }
}

impl std::fmt::Debug for Invoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invoker")
            .field("interface", &self.interface)
            .field("routing", &self.routing)
            .field("root_uri", &self.config.root_uri)
            .finish()
    }
}

/// Longest prefix of `text` within `limit` bytes, respecting char
/// boundaries.
fn excerpt(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
