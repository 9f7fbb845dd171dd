// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Calculator Example - Demonstrates the fundamental mitto-client lifecycle.
//!
//! This example shows:
//! - Declaring a service contract
//! - Registering a proxy (contract negotiation happens here)
//! - A typed facade over dynamic invocation
//! - Client-driven instance allocation and release
//!
//! Run with: cargo run -p mitto-example --bin calculator_example

use std::sync::Arc;

use mitto_client::{
    ClientError, HttpTransport, InstancingMode, MethodDescriptor, ParamSpec, ProxyConfig,
    ServiceContract, ServiceProxy,
};
use serde_json::json;
use tracing::{info, warn};

/// Typed facade over the dynamic proxy, the shape real call sites use.
struct Calculator {
    proxy: ServiceProxy,
}

impl Calculator {
    fn contract() -> ServiceContract {
        ServiceContract::builder("Calculator")
            .method(MethodDescriptor::new(
                "Add",
                vec![ParamSpec::input("n1"), ParamSpec::input("n2")],
                true,
            ))
            .method(MethodDescriptor::new(
                "Multiply",
                vec![ParamSpec::input("n1"), ParamSpec::input("n2")],
                true,
            ))
            .build()
            .expect("static contract")
    }

    async fn register(config: ProxyConfig) -> mitto_client::Result<Self> {
        let transport = Arc::new(HttpTransport::with_defaults()?);
        let proxy = ServiceProxy::register(
            Self::contract(),
            InstancingMode::ClientDriven,
            transport,
            config,
        )
        .await?;
        Ok(Self { proxy })
    }

    async fn add(&self, n1: i64, n2: i64) -> mitto_client::Result<i64> {
        let result = self
            .proxy
            .invoke("Add", vec![json!(n1).into(), json!(n2).into()])
            .await?;
        first_number(&result)
    }

    async fn multiply(&self, n1: i64, n2: i64) -> mitto_client::Result<i64> {
        let result = self
            .proxy
            .invoke("Multiply", vec![json!(n1).into(), json!(n2).into()])
            .await?;
        first_number(&result)
    }

    async fn release(self) -> mitto_client::Result<()> {
        self.proxy.release().await
    }
}

/// Results arrive as the positional array of output values.
fn first_number(result: &serde_json::Value) -> mitto_client::Result<i64> {
    result
        .as_array()
        .and_then(|items| items.first())
        .and_then(serde_json::Value::as_i64)
        .ok_or_else(|| ClientError::InvalidResponse(format!("expected [number], got {result}")))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("=== Calculator Example: Service Proxy Lifecycle ===");

    // MITTO_* variables when set; local development defaults otherwise
    let config = ProxyConfig::from_env().unwrap_or_else(|_| ProxyConfig::localhost());
    info!(root_uri = %config.root_uri, "Registering Calculator proxy");

    let calculator = match Calculator::register(config).await {
        Ok(calculator) => calculator,
        Err(e) => {
            warn!("Failed to register Calculator: {e}. Is a service host running?");
            return Ok(());
        }
    };
    info!(
        fingerprint = %Calculator::contract().fingerprint(),
        instance_id = calculator.proxy.instance_id(),
        "Contract negotiated, instance allocated"
    );

    let sum = calculator.add(2, 3).await?;
    info!(sum, "2 + 3");

    let product = calculator.multiply(6, 7).await?;
    info!(product, "6 * 7");

    // Frees the server-side instance and refuses further calls.
    calculator.release().await?;

    info!("=== Calculator Example Complete ===");
    Ok(())
}
