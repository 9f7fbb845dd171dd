// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client-facing handle of one durable notification queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::invoker::Invoker;
use crate::outbox::store::{NewNotification, NotificationStore};
use crate::outbox::worker::{self, WorkerContext};
use crate::transport::Transport;

/// Floor for the retry period.
pub const MIN_RETRY_PERIOD: Duration = Duration::from_secs(1);

/// Default pause before a failed row is retried.
pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_secs(30);

/// How often `drain` re-checks the pending counter.
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Options for registering a notification queue.
#[derive(Clone)]
pub struct QueueOptions {
    /// Pause after a failed delivery before the same row is retried
    /// (default: 30 s; values below one second are raised to it).
    pub retry_period: Duration,
    /// Deliver through this transport instead of the proxy's, e.g. to ship
    /// notifications to a different collector host.
    pub transport: Option<Arc<dyn Transport>>,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            retry_period: DEFAULT_RETRY_PERIOD,
            transport: None,
        }
    }
}

impl QueueOptions {
    /// Set the retry period.
    pub fn with_retry_period(mut self, period: Duration) -> Self {
        self.retry_period = period;
        self
    }

    /// Deliver through a dedicated transport.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Retry period with the floor applied.
    pub(crate) fn effective_retry_period(&self) -> Duration {
        self.retry_period.max(MIN_RETRY_PERIOD)
    }
}

impl std::fmt::Debug for QueueOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueOptions")
            .field("retry_period", &self.retry_period)
            .field("has_transport_override", &self.transport.is_some())
            .finish()
    }
}

/// Handle to one durable notification queue.
///
/// Enqueueing is local-only: the notification is persisted, the pending
/// counter bumped and the background worker nudged; the caller's path never
/// touches the network. Delivery failures stay inside the store's error
/// accumulator and are retried until they succeed.
pub struct NotificationQueue {
    store: Arc<dyn NotificationStore>,
    pending: Arc<AtomicI64>,
    nudge: Arc<Notify>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationQueue {
    /// Seed the pending counter from the store and start the worker.
    pub(crate) async fn start(
        store: Arc<dyn NotificationStore>,
        invoker: Arc<Invoker>,
        retry_period: Duration,
    ) -> Result<Arc<Self>> {
        let backlog = store.count_pending().await?;
        let pending = Arc::new(AtomicI64::new(backlog));
        let nudge = Arc::new(Notify::new());
        let cancel = CancellationToken::new();

        if backlog > 0 {
            info!(
                interface = %invoker.interface(),
                backlog, "resuming notification queue with a backlog"
            );
        }

        let handle = worker::spawn_worker(WorkerContext {
            store: store.clone(),
            invoker,
            pending: pending.clone(),
            nudge: nudge.clone(),
            cancel: cancel.clone(),
            retry_period,
        });

        Ok(Arc::new(Self {
            store,
            pending,
            nudge,
            cancel,
            worker: Mutex::new(Some(handle)),
        }))
    }

    /// Persist one notification for background delivery and return its
    /// durable row id.
    pub(crate) async fn enqueue(&self, method: &str, args: &[Value], session: u64) -> Result<i64> {
        let input = mitto_wire::encode_params_array(args);
        let id = self
            .store
            .insert(NewNotification {
                method: method.to_string(),
                input,
                session: session as i64,
            })
            .await?;
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.nudge.notify_one();
        debug!(id, method, "notification queued");
        Ok(id)
    }

    /// Notifications still waiting for delivery.
    pub fn pending(&self) -> i64 {
        self.pending.load(Ordering::Acquire)
    }

    /// Wait until the queue is empty or the timeout elapses. Returns true
    /// when the queue drained.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.pending() > 0 {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(DRAIN_POLL).await;
        }
        true
    }

    /// Stop the worker and wait for it to exit. Pending rows stay in the
    /// store and are picked up by the next registration.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle
            && handle.await.is_err()
        {
            warn!("notification worker ended abnormally");
        }
    }

    /// Signal the worker to stop without waiting. For drop paths that
    /// cannot await.
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for NotificationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationQueue")
            .field("pending", &self.pending())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
