// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Notification Example - Durable fire-and-forget delivery.
//!
//! This example shows:
//! - Registering a SQLite-backed notification queue on a proxy
//! - Diverting zero-output methods into the queue
//! - Background delivery with ordering and retry
//! - Backlog resume: rows left by a failed run go out on the next one
//!
//! Run it twice with the service host down, then up, to watch the
//! backlog drain. Run with: cargo run -p mitto-example --bin notification_example

use std::sync::Arc;
use std::time::Duration;

use mitto_client::{
    ContractCheck, HttpTransport, InstancingMode, MethodDescriptor, ParamSpec, ProxyConfig,
    QueueOptions, ServiceContract, ServiceProxy, SqliteNotificationStore,
};
use serde_json::json;
use tracing::{info, warn};

fn audit_contract() -> ServiceContract {
    ServiceContract::builder("AuditTrail")
        .method(MethodDescriptor::new(
            "RecordEvent",
            vec![ParamSpec::input("event")],
            false,
        ))
        .build()
        .expect("static contract")
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

    info!("=== Notification Example: Durable Queue ===");

    // Skip negotiation so recording works even while the host is down;
    // that is the whole point of a durable queue.
    let config = ProxyConfig::from_env()
        .unwrap_or_else(|_| ProxyConfig::localhost())
        .with_contract_check(ContractCheck::Skip);

    let transport = Arc::new(HttpTransport::with_defaults()?);
    let proxy = ServiceProxy::register(
        audit_contract(),
        InstancingMode::Single,
        transport,
        config,
    )
    .await?;

    let store = Arc::new(SqliteNotificationStore::from_path("mitto-notifications.db").await?);
    let queue = proxy
        .register_notification_queue(
            store,
            QueueOptions::default().with_retry_period(Duration::from_secs(5)),
        )
        .await?;
    info!(
        backlog = queue.pending(),
        "Queue registered; rows from previous runs are already in flight"
    );

    for event in ["login", "export-report", "logout"] {
        proxy
            .invoke(
                "RecordEvent",
                vec![json!({ "kind": event, "source": "notification_example" }).into()],
            )
            .await?;
        info!(event, "Recorded locally");
    }
    info!(pending = queue.pending(), "Rows persisted, delivery runs in the background");

    if queue.drain(Duration::from_secs(10)).await {
        info!("All notifications delivered");
    } else {
        warn!(
            pending = queue.pending(),
            "Host unreachable; rows stay in mitto-notifications.db for the next run"
        );
    }

    proxy.release().await?;

    info!("=== Notification Example Complete ===");
    Ok(())
}
