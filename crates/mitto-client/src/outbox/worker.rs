// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background delivery loop for queued notifications.
//!
//! One worker task per queue. Rows are delivered strictly oldest-first: a
//! failing row blocks the queue and is retried after the configured period,
//! so notifications reach the server in enqueue order. When the queue is
//! empty the worker polls with a small growing delay, reset the moment an
//! enqueue nudges it.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::invoker::Invoker;
use crate::outbox::store::NotificationStore;

/// Idle poll growth per empty pass.
const IDLE_STEP: Duration = Duration::from_millis(2);

/// Idle poll ceiling.
const IDLE_MAX: Duration = Duration::from_millis(50);

pub(crate) struct WorkerContext {
    pub store: Arc<dyn NotificationStore>,
    pub invoker: Arc<Invoker>,
    pub pending: Arc<AtomicI64>,
    pub nudge: Arc<Notify>,
    pub cancel: CancellationToken,
    pub retry_period: Duration,
}

pub(crate) fn spawn_worker(ctx: WorkerContext) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(
            interface = %ctx.invoker.interface(),
            retry_period_ms = ctx.retry_period.as_millis() as u64,
            "notification worker started"
        );

        let mut idle_delay = Duration::ZERO;
        loop {
            if ctx.cancel.is_cancelled() {
                break;
            }

            if ctx.pending.load(Ordering::Acquire) > 0 {
                idle_delay = Duration::ZERO;
                if !deliver_next(&ctx).await {
                    // Hold the line: the same row is retried after the
                    // period, nothing overtakes it.
                    tokio::select! {
                        biased;

                        _ = ctx.cancel.cancelled() => break,

                        _ = tokio::time::sleep(ctx.retry_period) => {}
                    }
                }
            } else {
                idle_delay = (idle_delay + IDLE_STEP).min(IDLE_MAX);
                tokio::select! {
                    biased;

                    _ = ctx.cancel.cancelled() => break,

                    _ = ctx.nudge.notified() => {
                        idle_delay = Duration::ZERO;
                    }

                    _ = tokio::time::sleep(idle_delay) => {}
                }
            }
        }

        debug!(interface = %ctx.invoker.interface(), "notification worker stopped");
    })
}

/// Deliver the oldest pending row. Returns false when the pass failed and
/// the worker should back off.
async fn deliver_next(ctx: &WorkerContext) -> bool {
    let row = match ctx.store.oldest_unsent().await {
        Ok(Some(row)) => row,
        Ok(None) => {
            // Counter said there was work but the store disagrees. Trust
            // the store.
            let stale = ctx.pending.load(Ordering::Acquire);
            error!(
                stale_pending = stale,
                "pending counter out of sync with store, resynchronizing"
            );
            match ctx.store.count_pending().await {
                Ok(n) => ctx.pending.store(n, Ordering::Release),
                Err(e) => error!(error = %e, "failed to resynchronize pending counter"),
            }
            return false;
        }
        Err(e) => {
            error!(error = %e, "failed to fetch the oldest pending notification");
            return false;
        }
    };

    let started = Instant::now();
    let outcome = ctx
        .invoker
        .deliver_notification(&row.method, &row.input, row.session as u64)
        .await;
    let elapsed_us = started.elapsed().as_micros().min(i64::MAX as u128) as i64;

    match outcome {
        Ok(()) => {
            if let Err(e) = ctx.store.mark_sent(row.id, Utc::now(), elapsed_us).await {
                // The unstamped row will be delivered again; the queue is
                // at-least-once.
                error!(id = row.id, error = %e, "delivered notification could not be stamped");
                return false;
            }
            ctx.pending.fetch_sub(1, Ordering::AcqRel);
            debug!(id = row.id, method = %row.method, elapsed_us, "notification delivered");
            true
        }
        Err(e) => {
            warn!(
                id = row.id,
                method = %row.method,
                error_count = row.error_count + 1,
                error = %e,
                "notification delivery failed, will retry"
            );
            if let Err(e2) = ctx
                .store
                .record_failure(row.id, &e.to_string(), Utc::now(), elapsed_us)
                .await
            {
                error!(id = row.id, error = %e2, "failed to record delivery failure");
            }
            false
        }
    }
}
