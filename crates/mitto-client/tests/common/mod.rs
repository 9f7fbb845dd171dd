// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for mitto-client integration tests.
//!
//! Provides a scripted transport standing in for the remote service host,
//! plus contract and store constructors shared across the test files.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mitto_client::{
    MethodDescriptor, ParamSpec, ServiceContract, SqliteNotificationStore, Transport,
    TransportError, TransportReply, TransportRequest,
};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

/// Replays scripted replies in order and records every request it sees.
/// Once the script runs dry it serves the default reply, or fails the
/// exchange as unreachable when none was set.
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<TransportReply>>,
    requests: Mutex<Vec<TransportRequest>>,
    default_reply: Mutex<Option<TransportReply>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            default_reply: Mutex::new(None),
        })
    }

    pub fn push(&self, reply: TransportReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn push_ok(&self, body: &str) {
        self.push(ok(body));
    }

    pub fn push_status(&self, status: u16, reason: &str) {
        self.push(status_reply(status, reason));
    }

    /// Serve this reply whenever the script is exhausted.
    pub fn set_default(&self, reply: TransportReply) {
        *self.default_reply.lock().unwrap() = Some(reply);
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// URIs of every request seen so far, in order.
    pub fn uris(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.uri.clone())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn call(&self, request: TransportRequest) -> Result<TransportReply, TransportError> {
        self.requests.lock().unwrap().push(request);
        if let Some(reply) = self.replies.lock().unwrap().pop_front() {
            return Ok(reply);
        }
        match self.default_reply.lock().unwrap().clone() {
            Some(reply) => Ok(reply),
            None => Err(TransportError::Unreachable("script exhausted".to_string())),
        }
    }

    fn set_session_token(&self, _token: Option<String>) {}
}

/// 200 OK with the given body.
pub fn ok(body: &str) -> TransportReply {
    TransportReply {
        status: 200,
        reason: "OK".to_string(),
        headers: Vec::new(),
        body: body.to_string(),
    }
}

pub fn status_reply(status: u16, reason: &str) -> TransportReply {
    TransportReply {
        status,
        reason: reason.to_string(),
        headers: Vec::new(),
        body: String::new(),
    }
}

/// The reply a server sends for a fingerprint request.
pub fn contract_reply(contract: &ServiceContract) -> TransportReply {
    ok(&format!(r#"{{"result":["{}"]}}"#, contract.fingerprint()))
}

/// Calculator with one value-returning method and one notification method.
pub fn calculator() -> ServiceContract {
    ServiceContract::builder("Calculator")
        .method(MethodDescriptor::new(
            "Add",
            vec![ParamSpec::input("n1"), ParamSpec::input("n2")],
            true,
        ))
        .method(MethodDescriptor::new(
            "LogOperation",
            vec![ParamSpec::input("line")],
            false,
        ))
        .build()
        .expect("contract should build")
}

/// Fresh in-memory notification store, plus its pool for direct row
/// inspection.
pub async fn memory_store() -> (Arc<SqliteNotificationStore>, SqlitePool) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite should connect");
    let store = SqliteNotificationStore::from_pool(pool.clone());
    store.ensure_schema().await.expect("schema should apply");
    (Arc::new(store), pool)
}
