// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Durable fire-and-forget notifications.
//!
//! Once a queue is registered on a proxy, calls to methods that produce no
//! output stop traveling synchronously: they are written to a durable store
//! and a background worker delivers them oldest-first, retrying failures
//! forever. The caller gets local persistence latency instead of a network
//! round trip, and an unreachable server no longer makes it fail.

mod queue;
mod store;
mod worker;

pub use queue::{DEFAULT_RETRY_PERIOD, MIN_RETRY_PERIOD, NotificationQueue, QueueOptions};
pub use store::{
    NewNotification, NotificationStore, PendingNotification, SqliteNotificationStore, StoreError,
};
