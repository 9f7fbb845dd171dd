// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance lifecycle tracking for service proxies.
//!
//! Every proxy owns one [`InstanceLifecycle`]: the instancing mode chosen
//! at registration, the current lifecycle state, and the numeric instance
//! identifier for client-driven services (zero while none is allocated).

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{ClientError, Result};

/// Scope an instance is shared across when the server manages it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharedScope {
    /// One instance for every caller of the service.
    Connection,
    /// One instance per authenticated session.
    PerSession,
    /// One instance per user.
    PerUser,
    /// One instance per user group.
    PerGroup,
    /// One instance per server-side execution thread.
    PerThread,
}

/// Who controls the server-side instance a proxy talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstancingMode {
    /// Stateless: a fresh instance services every call. Nothing to track,
    /// nothing to release.
    Single,
    /// The client owns the instance: allocated for this proxy, addressed by
    /// a numeric identifier on every call, released with the proxy.
    ClientDriven,
    /// The server pins one instance per scope; the client tracks only its
    /// local reference count.
    Shared(SharedScope),
}

impl InstancingMode {
    /// Whether calls carry a numeric instance identifier.
    pub fn tracks_instance(&self) -> bool {
        matches!(self, InstancingMode::ClientDriven)
    }
}

/// Proxy lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Created, negotiation not finished yet.
    Uninitialized,
    /// Negotiated and usable.
    Active,
    /// Released; every further call fails.
    Released,
}

/// Shared lifecycle state of one proxy registration.
#[derive(Debug)]
pub struct InstanceLifecycle {
    mode: InstancingMode,
    state: Mutex<LifecycleState>,
    /// Server-assigned instance identifier; zero means none.
    instance_id: AtomicU64,
}

impl InstanceLifecycle {
    pub(crate) fn new(mode: InstancingMode) -> Self {
        Self {
            mode,
            state: Mutex::new(LifecycleState::Uninitialized),
            instance_id: AtomicU64::new(0),
        }
    }

    pub(crate) fn mode(&self) -> InstancingMode {
        self.mode
    }

    pub(crate) fn state(&self) -> LifecycleState {
        *self.lock_state()
    }

    /// Negotiation succeeded; the proxy may serve calls.
    pub(crate) fn activate(&self) {
        *self.lock_state() = LifecycleState::Active;
    }

    /// Fail fast when the proxy has been released.
    pub(crate) fn ensure_active(&self) -> Result<()> {
        match *self.lock_state() {
            LifecycleState::Released => Err(ClientError::Config(
                "service proxy already released".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Transition to released.
    ///
    /// # Errors
    ///
    /// Fails when the proxy was already released.
    pub(crate) fn mark_released(&self) -> Result<()> {
        let mut state = self.lock_state();
        if *state == LifecycleState::Released {
            return Err(ClientError::Config(
                "service proxy already released".to_string(),
            ));
        }
        *state = LifecycleState::Released;
        Ok(())
    }

    pub(crate) fn instance_id(&self) -> u64 {
        self.instance_id.load(Ordering::Acquire)
    }

    pub(crate) fn set_instance_id(&self, id: u64) {
        self.instance_id.store(id, Ordering::Release);
    }

    /// Clear the identifier and return the previous value.
    pub(crate) fn take_instance_id(&self) -> u64 {
        self.instance_id.swap(0, Ordering::AcqRel)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, LifecycleState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
