// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Service contract metadata.
//!
//! A [`ServiceContract`] is the client-side description of one remote
//! interface: an ordered list of [`MethodDescriptor`]s plus a name-to-index
//! map so dispatch resolves method names once, at registration time.
//! Contracts are immutable after [`ContractBuilder::build`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::WireError;

// ============================================================================
// Reserved pseudo-methods
// ============================================================================

/// Wire name of the contract negotiation pseudo-method.
pub const CONTRACT_PSEUDO_METHOD: &str = "_contract_";

/// Wire name of the human-readable signature pseudo-method.
pub const SIGNATURE_PSEUDO_METHOD: &str = "_signature_";

/// Wire name of the pseudo-method that allocates a client-driven instance.
pub const INSTANCE_PSEUDO_METHOD: &str = "_instance_";

/// Wire name of the pseudo-method that releases a client-driven instance.
pub const FREE_PSEUDO_METHOD: &str = "_free_";

/// Returns true for wire names reserved by the protocol.
///
/// Reserved names never appear in a user contract; [`ContractBuilder::build`]
/// rejects them.
pub fn is_pseudo_method(name: &str) -> bool {
    matches!(
        name,
        CONTRACT_PSEUDO_METHOD
            | SIGNATURE_PSEUDO_METHOD
            | INSTANCE_PSEUDO_METHOD
            | FREE_PSEUDO_METHOD
    )
}

// ============================================================================
// Parameters
// ============================================================================

/// Direction of one method parameter as seen from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamDirection {
    /// Sent with the request.
    In,
    /// Returned inside the result array.
    Out,
}

/// One declared method parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub direction: ParamDirection,
    /// Marks a parameter that carries a callback interface rather than a
    /// value. Callback arguments are registered with the transport and
    /// replaced by their numeric handle on the wire.
    #[serde(default)]
    pub callback: bool,
}

impl ParamSpec {
    /// Declare an input parameter.
    pub fn input(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: ParamDirection::In,
            callback: false,
        }
    }

    /// Declare an output parameter.
    pub fn output(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: ParamDirection::Out,
            callback: false,
        }
    }

    /// Declare an input parameter that carries a callback interface.
    pub fn callback(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: ParamDirection::In,
            callback: true,
        }
    }
}

// ============================================================================
// Methods
// ============================================================================

/// Per-method behavior switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodOptions {
    /// Never log the request payload (credentials, PII).
    #[serde(default)]
    pub suppress_input_log: bool,
    /// Never log the reply payload.
    #[serde(default)]
    pub suppress_output_log: bool,
    /// The reply is a raw custom answer: status, headers and body are
    /// returned verbatim instead of being decoded as a result envelope.
    #[serde(default)]
    pub custom_result: bool,
}

/// One method of a service contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    pub name: String,
    pub params: Vec<ParamSpec>,
    /// Whether the method has a function result in addition to any `Out`
    /// parameters.
    pub returns: bool,
    #[serde(default)]
    pub options: MethodOptions,
}

impl MethodDescriptor {
    /// Describe a method with the given parameters.
    pub fn new(name: impl Into<String>, params: Vec<ParamSpec>, returns: bool) -> Self {
        Self {
            name: name.into(),
            params,
            returns,
            options: MethodOptions::default(),
        }
    }

    /// Replace the method options.
    pub fn with_options(mut self, options: MethodOptions) -> Self {
        self.options = options;
        self
    }

    /// Input parameters, in declaration order.
    pub fn input_params(&self) -> impl Iterator<Item = &ParamSpec> {
        self.params
            .iter()
            .filter(|p| p.direction == ParamDirection::In)
    }

    /// Number of values the method sends back: `Out` parameters plus the
    /// function result.
    pub fn output_count(&self) -> usize {
        let outs = self
            .params
            .iter()
            .filter(|p| p.direction == ParamDirection::Out)
            .count();
        outs + usize::from(self.returns)
    }

    /// A method that produces no output can be delivered asynchronously
    /// through a notification queue.
    pub fn is_notification(&self) -> bool {
        self.output_count() == 0 && !self.options.custom_result
    }

    /// Whether any declared parameter is a callback interface.
    pub fn has_callback_params(&self) -> bool {
        self.params.iter().any(|p| p.callback)
    }

    /// Canonical one-line form used by the contract fingerprint, e.g.
    /// `Add(n1:in,n2:in)>1`.
    pub(crate) fn signature_fragment(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| {
                let dir = match p.direction {
                    ParamDirection::In => "in",
                    ParamDirection::Out => "out",
                };
                format!("{}:{}", p.name, dir)
            })
            .collect();
        format!(
            "{}({})>{}",
            self.name,
            params.join(","),
            u8::from(self.returns)
        )
    }
}

// ============================================================================
// Contract
// ============================================================================

/// Immutable description of one remote service interface.
#[derive(Debug, Clone)]
pub struct ServiceContract {
    name: String,
    methods: Vec<MethodDescriptor>,
    index: HashMap<String, usize>,
}

impl ServiceContract {
    /// Start building a contract for the named interface.
    pub fn builder(name: impl Into<String>) -> ContractBuilder {
        ContractBuilder {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    /// Interface name, e.g. `Calculator`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared methods, in contract order.
    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    /// Look up a method by wire name.
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.index.get(name).map(|&i| &self.methods[i])
    }

    /// Position of a method in contract order.
    pub fn method_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Canonical signature text the fingerprint is computed over.
    ///
    /// One line per method, prefixed by the interface name. Any change to a
    /// method name, parameter list, direction or result presence changes
    /// this text and therefore the fingerprint.
    pub fn signature_text(&self) -> String {
        let mut text = String::with_capacity(64 + self.methods.len() * 32);
        text.push_str(&self.name);
        for method in &self.methods {
            text.push('\n');
            text.push_str(&method.signature_fragment());
        }
        text
    }

    /// Deterministic contract fingerprint (lowercase hex).
    pub fn fingerprint(&self) -> String {
        crate::fingerprint::signature_fingerprint(&self.signature_text())
    }
}

/// Builder for [`ServiceContract`]. Validation happens in [`build`].
///
/// [`build`]: ContractBuilder::build
#[derive(Debug)]
pub struct ContractBuilder {
    name: String,
    methods: Vec<MethodDescriptor>,
}

impl ContractBuilder {
    /// Append a method to the contract.
    pub fn method(mut self, descriptor: MethodDescriptor) -> Self {
        self.methods.push(descriptor);
        self
    }

    /// Validate and freeze the contract.
    ///
    /// # Errors
    ///
    /// Fails on an empty interface or method name, a reserved pseudo-method
    /// name, or a duplicate method name.
    pub fn build(self) -> Result<ServiceContract, WireError> {
        if self.name.is_empty() {
            return Err(WireError::EmptyInterfaceName);
        }
        let mut index = HashMap::with_capacity(self.methods.len());
        for (i, method) in self.methods.iter().enumerate() {
            if method.name.is_empty() {
                return Err(WireError::EmptyMethodName);
            }
            if is_pseudo_method(&method.name) {
                return Err(WireError::ReservedMethod(method.name.clone()));
            }
            if index.insert(method.name.clone(), i).is_some() {
                return Err(WireError::DuplicateMethod(method.name.clone()));
            }
        }
        Ok(ServiceContract {
            name: self.name,
            methods: self.methods,
            index,
        })
    }
}
