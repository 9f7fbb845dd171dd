// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Service proxies: contract-checked dynamic dispatch to one remote
//! interface.
//!
//! [`ServiceProxy::register`] negotiates the contract fingerprint before
//! returning; a mismatch or an unreachable remote means no proxy exists at
//! all. The returned proxy is a cheap clone handle: clones share the
//! lifecycle state, the instance identifier and the registered notification
//! queue. Typed stubs are thin wrappers over [`ServiceProxy::invoke`]; the
//! method dispatch table is resolved once, at registration.

use std::sync::Arc;

use mitto_wire::{MethodDescriptor, ServiceContract};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::{ContractCheck, ProxyConfig};
use crate::error::{ClientError, Result};
use crate::instancing::{InstanceLifecycle, InstancingMode, LifecycleState};
use crate::invoker::{Invoker, RawAnswer};
use crate::outbox::{NotificationQueue, NotificationStore, QueueOptions};
use crate::transport::Transport;

/// One argument of a dynamic invocation.
#[derive(Debug, Clone)]
pub enum CallArg {
    /// A plain JSON value.
    Value(Value),
    /// A client-side callback interface. Registered with the transport and
    /// replaced by its numeric handle on the wire.
    Callback(String),
}

impl CallArg {
    /// Shorthand for a callback argument.
    pub fn callback(interface: impl Into<String>) -> Self {
        Self::Callback(interface.into())
    }
}

impl From<Value> for CallArg {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

struct RegisteredQueue {
    store: Arc<dyn NotificationStore>,
    options: QueueOptions,
    queue: Arc<NotificationQueue>,
}

impl RegisteredQueue {
    /// Same store, same effective parameters.
    fn matches(&self, store: &Arc<dyn NotificationStore>, options: &QueueOptions) -> bool {
        Arc::ptr_eq(&self.store, store)
            && self.options.effective_retry_period() == options.effective_retry_period()
            && match (&self.options.transport, &options.transport) {
                (None, None) => true,
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                _ => false,
            }
    }
}

struct ProxyState {
    contract: ServiceContract,
    invoker: Arc<Invoker>,
    lifecycle: InstanceLifecycle,
    queue: Mutex<Option<RegisteredQueue>>,
}

/// Client-side handle to one remote service interface.
pub struct ServiceProxy {
    state: Arc<ProxyState>,
}

impl ServiceProxy {
    /// Register an interface with the remote and return a verified proxy.
    ///
    /// Unless the configured [`ContractCheck`] says otherwise, this fetches
    /// the remote's contract fingerprint and compares it with the local
    /// one; the comparison happens exactly once, here, before anything else
    /// may run. Client-driven services also allocate their server-side
    /// instance now unless `delayed_instance` is set.
    ///
    /// # Errors
    ///
    /// [`ClientError::ContractMismatch`] when the fingerprints disagree,
    /// and any transport or call error from the negotiation exchange. No
    /// proxy value exists after a failure.
    #[instrument(skip(contract, transport, config), fields(interface = %contract.name()))]
    pub async fn register(
        contract: ServiceContract,
        mode: InstancingMode,
        transport: Arc<dyn Transport>,
        config: ProxyConfig,
    ) -> Result<Self> {
        let interface = contract.name().to_string();
        let mut invoker = Invoker::new(transport, config.clone(), &interface);
        let lifecycle = InstanceLifecycle::new(mode);

        match &config.contract_check {
            ContractCheck::Skip => {
                debug!("contract check skipped");
            }
            check => {
                let expected = match check {
                    ContractCheck::Expected(pinned) => pinned.clone(),
                    _ => contract.fingerprint(),
                };
                let (actual, advertised) = invoker.retrieve_contract(&lifecycle).await?;
                if actual != expected {
                    warn!(expected = %expected, actual = %actual, "contract mismatch");
                    return Err(ClientError::ContractMismatch {
                        interface,
                        expected,
                        actual,
                    });
                }
                if let Some(routing) = advertised {
                    debug!(?routing, "server advertised routing preference");
                    invoker.set_routing(routing);
                }
                info!(fingerprint = %actual, "contract negotiated");
            }
        }

        let invoker = Arc::new(invoker);

        if mode.tracks_instance() && !config.delayed_instance {
            let id = invoker.acquire_instance().await?;
            lifecycle.set_instance_id(id);
            debug!(instance_id = id, "instance allocated");
        }

        lifecycle.activate();
        Ok(Self {
            state: Arc::new(ProxyState {
                contract,
                invoker,
                lifecycle,
                queue: Mutex::new(None),
            }),
        })
    }

    /// Interface name this proxy serves.
    pub fn interface(&self) -> &str {
        self.state.contract.name()
    }

    /// The negotiated contract.
    pub fn contract(&self) -> &ServiceContract {
        &self.state.contract
    }

    /// Instancing mode chosen at registration.
    pub fn instancing_mode(&self) -> InstancingMode {
        self.state.lifecycle.mode()
    }

    /// Current instance identifier; zero while none is allocated.
    pub fn instance_id(&self) -> u64 {
        self.state.lifecycle.instance_id()
    }

    /// Call a method by wire name and decode its result.
    ///
    /// Methods that produce no output are written to the durable
    /// notification queue instead of being sent, once a queue is
    /// registered; the returned value is then `Null`.
    ///
    /// # Errors
    ///
    /// [`ClientError::Config`] for unknown methods, wrong argument counts
    /// or a released proxy; transport, call and decode errors otherwise.
    #[instrument(skip(self, args), fields(interface = %self.interface()))]
    pub async fn invoke(&self, method: &str, args: Vec<CallArg>) -> Result<Value> {
        self.state.lifecycle.ensure_active()?;
        let descriptor = self.descriptor(method)?;
        let values = self.resolve_args(args).await?;

        if descriptor.is_notification() {
            let guard = self.state.queue.lock().await;
            if let Some(registered) = guard.as_ref() {
                let expected = descriptor.input_params().count();
                if values.len() != expected {
                    return Err(ClientError::Config(format!(
                        "method {} expects {expected} input parameters, got {}",
                        descriptor.name,
                        values.len()
                    )));
                }
                let id = registered
                    .queue
                    .enqueue(
                        &descriptor.name,
                        &values,
                        self.state.lifecycle.instance_id(),
                    )
                    .await?;
                debug!(method, row_id = id, "call diverted to notification queue");
                return Ok(Value::Null);
            }
        }

        self.state
            .invoker
            .invoke(descriptor, &values, &self.state.lifecycle)
            .await
    }

    /// Call a method and return status, headers and body verbatim. The
    /// entry point for methods declared with `custom_result`.
    #[instrument(skip(self, args), fields(interface = %self.interface()))]
    pub async fn invoke_raw(&self, method: &str, args: Vec<CallArg>) -> Result<RawAnswer> {
        self.state.lifecycle.ensure_active()?;
        let descriptor = self.descriptor(method)?;
        let values = self.resolve_args(args).await?;
        self.state
            .invoker
            .invoke_raw(descriptor, &values, &self.state.lifecycle)
            .await
    }

    /// Fetch the remote's human-readable signature. Debug helper; servers
    /// may have it disabled.
    pub async fn retrieve_signature(&self) -> Result<Value> {
        self.state.lifecycle.ensure_active()?;
        self.state
            .invoker
            .retrieve_signature(&self.state.lifecycle)
            .await
    }

    /// Register a durable notification queue for this proxy.
    ///
    /// From here on, methods without output are persisted to `store` and
    /// delivered by a background worker in enqueue order. Registering the
    /// same store with the same options again returns the existing queue;
    /// different parameters are refused.
    #[instrument(skip(self, store, options), fields(interface = %self.interface()))]
    pub async fn register_notification_queue(
        &self,
        store: Arc<dyn NotificationStore>,
        options: QueueOptions,
    ) -> Result<Arc<NotificationQueue>> {
        self.state.lifecycle.ensure_active()?;

        let mut slot = self.state.queue.lock().await;
        if let Some(existing) = slot.as_ref() {
            if existing.matches(&store, &options) {
                return Ok(existing.queue.clone());
            }
            return Err(ClientError::Config(format!(
                "a notification queue with different parameters is already registered for {}",
                self.interface()
            )));
        }

        let invoker = match &options.transport {
            Some(transport) => Arc::new(self.state.invoker.with_transport(transport.clone())),
            None => self.state.invoker.clone(),
        };
        let queue =
            NotificationQueue::start(store.clone(), invoker, options.effective_retry_period())
                .await?;
        info!(
            retry_period_ms = options.effective_retry_period().as_millis() as u64,
            "notification queue registered"
        );
        *slot = Some(RegisteredQueue {
            store,
            options,
            queue: queue.clone(),
        });
        Ok(queue)
    }

    /// Release the proxy: stop its notification worker, free the
    /// client-driven instance on the server, and refuse further calls.
    ///
    /// # Errors
    ///
    /// [`ClientError::Config`] when other proxy handles are still alive or
    /// the proxy was already released. Failures of the server-side free are
    /// logged, not surfaced; the server reaps orphaned instances anyway.
    #[instrument(skip(self), fields(interface = %self.interface()))]
    pub async fn release(&self) -> Result<()> {
        // Releasing under a live clone would pull the instance out from
        // under it.
        let others = Arc::strong_count(&self.state) - 1;
        if others > 0 {
            return Err(ClientError::Config(format!(
                "cannot release {}: {others} other proxy handles still alive",
                self.interface()
            )));
        }
        self.state.lifecycle.mark_released()?;

        // Stop the worker before the instance disappears.
        if let Some(registered) = self.state.queue.lock().await.take() {
            registered.queue.shutdown().await;
        }

        let instance_id = self.state.lifecycle.take_instance_id();
        if instance_id != 0 {
            match self.state.invoker.free_instance(instance_id).await {
                Ok(()) => debug!(instance_id, "instance freed"),
                Err(e) => {
                    warn!(instance_id, error = %e, "failed to free instance on release");
                }
            }
        }
        info!("proxy released");
        Ok(())
    }

    fn descriptor(&self, method: &str) -> Result<&MethodDescriptor> {
        self.state.contract.method(method).ok_or_else(|| {
            ClientError::Config(format!("unknown method {}.{method}", self.interface()))
        })
    }

    /// Substitute callback arguments with their transport handles.
    async fn resolve_args(&self, args: Vec<CallArg>) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                CallArg::Value(value) => values.push(value),
                CallArg::Callback(interface) => {
                    let handle = self
                        .state
                        .invoker
                        .transport()
                        .register_callback(&interface)
                        .await?;
                    debug!(callback = %interface, handle, "callback registered");
                    values.push(Value::from(handle));
                }
            }
        }
        Ok(values)
    }
}

impl Clone for ServiceProxy {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl std::fmt::Debug for ServiceProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProxy")
            .field("interface", &self.interface())
            .field("mode", &self.instancing_mode())
            .field("instance_id", &self.instance_id())
            .finish()
    }
}

impl Drop for ServiceProxy {
    fn drop(&mut self) {
        // Only the last handle cleans up.
        if Arc::strong_count(&self.state) != 1 {
            return;
        }
        if self.state.lifecycle.state() != LifecycleState::Active {
            return;
        }

        // Stop an orphaned worker; rows stay durable for the next start.
        if let Ok(mut slot) = self.state.queue.try_lock()
            && let Some(registered) = slot.take()
        {
            registered.queue.cancel();
        }

        let instance_id = self.state.lifecycle.take_instance_id();
        if instance_id == 0 {
            return;
        }
        warn!(
            interface = %self.interface(),
            instance_id, "proxy dropped without release, freeing instance in background"
        );
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let invoker = self.state.invoker.clone();
            handle.spawn(async move {
                if let Err(e) = invoker.free_instance(instance_id).await {
                    debug!(instance_id, error = %e, "background instance free failed");
                }
            });
        }
    }
}
