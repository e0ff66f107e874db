// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Level-triggered change notification.
//!
//! Replaces the raw condition variable between the link auditor and the
//! connection manager. The signal is a single slot: multiple `notify`
//! calls before a wake-up coalesce into one, and a waiter never learns
//! *what* changed - it re-reads the shared liveness map after waking.
//!
//! # Architecture
//! - Atomic flag so a pending notification is never lost, even when
//!   nobody is waiting yet
//! - Condvar for the blocking wait

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Coalescing single-slot notification between worker threads.
#[derive(Debug, Default)]
pub struct ChangeSignal {
    pending: AtomicBool,
    sleeping: Mutex<bool>,
    condvar: Condvar,
}

impl ChangeSignal {
    /// Create a signal with no pending notification.
    pub fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
            sleeping: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Shared handle, ready to hand to another worker.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Raise the signal. Coalesces with any notification still pending.
    pub fn notify(&self) {
        self.pending.store(true, Ordering::Release);

        // Racy check is fine: worst case is a spurious condvar signal.
        if *self.sleeping.lock() {
            self.condvar.notify_one();
        }
    }

    /// Consume a pending notification without blocking.
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::Acquire)
    }

    /// Block until notified or until `timeout` elapses.
    ///
    /// Returns true when a notification was consumed. A notification
    /// raised before the call returns immediately. The timeout exists so
    /// waiters can periodically observe a cooperative stop flag.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.pending.swap(false, Ordering::Acquire) {
            return true;
        }

        let mut sleeping = self.sleeping.lock();

        // Re-check under the lock: notify may have fired in between.
        if self.pending.swap(false, Ordering::Acquire) {
            return true;
        }

        *sleeping = true;
        let _ = self.condvar.wait_for(&mut sleeping, timeout);
        *sleeping = false;

        // Timed out, woke spuriously, or got notified: the flag decides.
        self.pending.swap(false, Ordering::Acquire)
    }
}
