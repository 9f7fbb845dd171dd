// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Durable notification queue tests: diversion, ordered background
//! delivery, retry after failure, backlog resume and shutdown.

mod common;

use std::sync::Arc;
use std::time::Duration;

use mitto_client::{
    ClientError, ContractCheck, InstancingMode, NewNotification, NotificationStore, ProxyConfig,
    QueueOptions, ServiceProxy,
};
use serde_json::{Value, json};

use common::ScriptedTransport;

fn skip_checks() -> ProxyConfig {
    ProxyConfig::new("http://srv/root").with_contract_check(ContractCheck::Skip)
}

const DRAIN_WINDOW: Duration = Duration::from_secs(10);

#[tokio::test]
async fn test_notification_diverts_to_store_and_delivers() {
    let transport = ScriptedTransport::new();
    transport.set_default(common::ok(""));
    let (store, pool) = common::memory_store().await;

    let proxy = ServiceProxy::register(
        common::calculator(),
        InstancingMode::Single,
        transport.clone(),
        skip_checks(),
    )
    .await
    .unwrap();
    let queue = proxy
        .register_notification_queue(store.clone(), QueueOptions::default())
        .await
        .unwrap();

    let result = proxy
        .invoke("LogOperation", vec![json!("2 + 3 = 5").into()])
        .await
        .unwrap();
    assert_eq!(result, Value::Null, "diverted calls report nothing");

    assert!(queue.drain(DRAIN_WINDOW).await, "the worker should deliver");
    assert_eq!(store.count_pending().await.unwrap(), 0);

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].uri.ends_with("Calculator.LogOperation"));
    assert!(requests[0].no_answer, "deliveries do not wait for a body");
    assert_eq!(requests[0].body, r#"["2 + 3 = 5"]"#);

    // Delivered rows are stamped, never deleted.
    let (total, sent): (i64, i64) =
        sqlx::query_as("SELECT COUNT(*), COUNT(sent) FROM pending_notification")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(total, 1);
    assert_eq!(sent, 1);
}

#[tokio::test]
async fn test_synchronous_methods_bypass_the_queue() {
    let transport = ScriptedTransport::new();
    transport.push_ok(r#"{"result":[5]}"#);
    let (store, _pool) = common::memory_store().await;

    let proxy = ServiceProxy::register(
        common::calculator(),
        InstancingMode::Single,
        transport.clone(),
        skip_checks(),
    )
    .await
    .unwrap();
    proxy
        .register_notification_queue(store.clone(), QueueOptions::default())
        .await
        .unwrap();

    let sum = proxy
        .invoke("Add", vec![json!(2).into(), json!(3).into()])
        .await
        .unwrap();

    assert_eq!(sum, json!([5]));
    assert_eq!(store.count_pending().await.unwrap(), 0);
    assert!(transport.uris()[0].ends_with("Calculator.Add"));
}

#[tokio::test]
async fn test_failed_delivery_blocks_and_retries_in_order() {
    let transport = ScriptedTransport::new();
    transport.push_status(503, "Service Unavailable");
    transport.set_default(common::ok(""));
    let (store, pool) = common::memory_store().await;

    let proxy = ServiceProxy::register(
        common::calculator(),
        InstancingMode::Single,
        transport.clone(),
        skip_checks(),
    )
    .await
    .unwrap();
    let queue = proxy
        .register_notification_queue(
            store.clone(),
            QueueOptions::default().with_retry_period(Duration::from_secs(1)),
        )
        .await
        .unwrap();

    proxy
        .invoke("LogOperation", vec![json!("first").into()])
        .await
        .unwrap();
    proxy
        .invoke("LogOperation", vec![json!("second").into()])
        .await
        .unwrap();

    assert!(queue.drain(DRAIN_WINDOW).await, "retry should recover");

    let bodies: Vec<String> = transport.requests().iter().map(|r| r.body.clone()).collect();
    assert_eq!(
        bodies,
        vec![
            r#"["first"]"#.to_string(),
            r#"["first"]"#.to_string(),
            r#"["second"]"#.to_string(),
        ],
        "the failed head is retried before anything newer goes out"
    );

    let (error_count, last_error): (i64, Option<String>) =
        sqlx::query_as("SELECT error_count, last_error FROM pending_notification WHERE id = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(error_count, 1);
    assert!(last_error.unwrap().contains("503"));

    let (error_count,): (i64,) =
        sqlx::query_as("SELECT error_count FROM pending_notification WHERE id = 2")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(error_count, 0, "the second row never failed");
}

#[tokio::test]
async fn test_backlog_resumes_after_restart() {
    let transport = ScriptedTransport::new();
    transport.set_default(common::ok(""));
    let (store, _pool) = common::memory_store().await;

    // Rows left behind by a previous process.
    for line in ["old-1", "old-2"] {
        store
            .insert(NewNotification {
                method: "LogOperation".to_string(),
                input: format!(r#"["{line}"]"#),
                session: 0,
            })
            .await
            .unwrap();
    }

    let proxy = ServiceProxy::register(
        common::calculator(),
        InstancingMode::Single,
        transport.clone(),
        skip_checks(),
    )
    .await
    .unwrap();
    let queue = proxy
        .register_notification_queue(store.clone(), QueueOptions::default())
        .await
        .unwrap();

    assert!(queue.drain(DRAIN_WINDOW).await);
    assert_eq!(store.count_pending().await.unwrap(), 0);

    let bodies: Vec<String> = transport.requests().iter().map(|r| r.body.clone()).collect();
    assert_eq!(
        bodies,
        vec![r#"["old-1"]"#.to_string(), r#"["old-2"]"#.to_string()],
        "backlog is delivered oldest first, without any new enqueue"
    );
}

#[tokio::test]
async fn test_concurrent_enqueues_through_clones_all_deliver() {
    let transport = ScriptedTransport::new();
    transport.set_default(common::ok(""));
    let (store, _pool) = common::memory_store().await;

    let proxy = ServiceProxy::register(
        common::calculator(),
        InstancingMode::Single,
        transport.clone(),
        skip_checks(),
    )
    .await
    .unwrap();
    let queue = proxy
        .register_notification_queue(store.clone(), QueueOptions::default())
        .await
        .unwrap();

    // Clones share the queue registration, so every call diverts.
    let calls = (0..16).map(|i| {
        let proxy = proxy.clone();
        async move {
            proxy
                .invoke("LogOperation", vec![json!(format!("op-{i}")).into()])
                .await
        }
    });
    for result in futures::future::join_all(calls).await {
        result.unwrap();
    }

    assert!(queue.drain(DRAIN_WINDOW).await);
    assert_eq!(transport.requests().len(), 16);
    assert_eq!(store.count_pending().await.unwrap(), 0);
}

#[tokio::test]
async fn test_duplicate_queue_registration_returns_same_queue() {
    let transport = ScriptedTransport::new();
    transport.set_default(common::ok(""));
    let (store, _pool) = common::memory_store().await;

    let proxy = ServiceProxy::register(
        common::calculator(),
        InstancingMode::Single,
        transport,
        skip_checks(),
    )
    .await
    .unwrap();

    let options = QueueOptions::default().with_retry_period(Duration::from_secs(5));
    let first = proxy
        .register_notification_queue(store.clone(), options.clone())
        .await
        .unwrap();
    let second = proxy
        .register_notification_queue(store.clone(), options)
        .await
        .unwrap();
    assert!(
        Arc::ptr_eq(&first, &second),
        "identical registration is idempotent"
    );

    let err = proxy
        .register_notification_queue(
            store.clone(),
            QueueOptions::default().with_retry_period(Duration::from_secs(60)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Config(_)), "got {err:?}");

    first.shutdown().await;
}

#[tokio::test]
async fn test_release_stops_worker_and_frees_instance() {
    let transport = ScriptedTransport::new();
    let contract = common::calculator();
    transport.push(common::contract_reply(&contract));
    transport.push_ok(r#"{"result":[42]}"#);
    transport.set_default(common::ok(""));
    let (store, _pool) = common::memory_store().await;

    let proxy = ServiceProxy::register(
        contract,
        InstancingMode::ClientDriven,
        transport.clone(),
        ProxyConfig::new("http://srv/root"),
    )
    .await
    .unwrap();
    let queue = proxy
        .register_notification_queue(store.clone(), QueueOptions::default())
        .await
        .unwrap();

    proxy
        .invoke("LogOperation", vec![json!("bye").into()])
        .await
        .unwrap();
    assert!(queue.drain(DRAIN_WINDOW).await);

    proxy.release().await.unwrap();

    let uris = transport.uris();
    assert!(
        uris.iter().any(|u| u.ends_with("Calculator.LogOperation/42")),
        "the delivery carries the instance identifier: {uris:?}"
    );
    assert!(
        uris.last().unwrap().ends_with("Calculator._free_/42"),
        "release frees the server instance last: {uris:?}"
    );

    let err = proxy
        .invoke("LogOperation", vec![json!("after").into()])
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Config(_)));
}

#[tokio::test]
async fn test_drain_times_out_while_remote_is_down() {
    let transport = ScriptedTransport::new(); // never reachable
    let (store, _pool) = common::memory_store().await;

    let proxy = ServiceProxy::register(
        common::calculator(),
        InstancingMode::Single,
        transport,
        skip_checks(),
    )
    .await
    .unwrap();
    let queue = proxy
        .register_notification_queue(store.clone(), QueueOptions::default())
        .await
        .unwrap();

    proxy
        .invoke("LogOperation", vec![json!("stuck").into()])
        .await
        .unwrap();

    assert!(!queue.drain(Duration::from_millis(300)).await);
    assert_eq!(queue.pending(), 1);
    assert_eq!(store.count_pending().await.unwrap(), 1, "the row survives");

    // Shutdown must not wait out the 30 s retry backoff.
    tokio::time::timeout(Duration::from_secs(2), queue.shutdown())
        .await
        .expect("cancellation should interrupt the retry backoff");
}
