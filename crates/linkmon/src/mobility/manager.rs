// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection manager: active-pair selection and dataplane retargeting.
//!
//! Watches a liveness map through its change signal. When the active
//! control-plane source goes down, the handler scans the map in iteration
//! order for the first up entry that is also a key of the IP mapping and
//! retargets the application through the [`TargetSink`] callback. With no
//! up candidate the active pair is retained - no link means no choice -
//! and a later notification retries.
//!
//! An optional switching delay between selection and callback emulates
//! the handover latency of classical break-before-make mobility, for
//! benchmarking against it.

use super::IpMap;
use crate::config::DATAPLANE_PORT;
use crate::core::{ChangeSignal, SharedMap};
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// How often the handler re-checks the stop flag while waiting.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Narrow capability through which the manager retargets the
/// application's dataplane.
///
/// Implementations must be non-blocking and thread-safe; the manager
/// invokes it from its handler worker. Any `Fn(&str, u16)` closure
/// qualifies.
pub trait TargetSink: Send + Sync {
    /// Point the dataplane at `ip:port`.
    fn set_target(&self, ip: &str, port: u16);
}

impl<F: Fn(&str, u16) + Send + Sync> TargetSink for F {
    fn set_target(&self, ip: &str, port: u16) {
        self(ip, port)
    }
}

/// The `(control-plane source, dataplane target)` tuple currently in use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivePair {
    pub source: String,
    pub target: String,
}

/// Initialization error of the connection manager.
#[derive(Debug)]
pub enum ManagerError {
    /// The bootstrap link is not a key of the IP mapping.
    UnknownLink(String),
    /// The manager was stopped; instances are not reusable.
    AlreadyStopped,
}

impl fmt::Display for ManagerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerError::UnknownLink(link) => {
                write!(f, "{} not available in ip map, active pair could not be set", link)
            }
            ManagerError::AlreadyStopped => write!(f, "connection manager already stopped"),
        }
    }
}

impl std::error::Error for ManagerError {}

struct ManagerInner {
    map: IpMap,
    callback: Box<dyn TargetSink>,
    link_change: Arc<ChangeSignal>,
    link_status: Arc<SharedMap<String, bool>>,
    active_pair: ArcSwapOption<ActivePair>,
    switching_delay: Option<Duration>,
    active: AtomicBool,
    stopped: AtomicBool,
}

/// Handover controller driven by a liveness map.
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Create a manager without switching delay.
    pub fn new(
        map: IpMap,
        callback: impl TargetSink + 'static,
        link_change: Arc<ChangeSignal>,
        link_status: Arc<SharedMap<String, bool>>,
    ) -> Self {
        Self::build(map, Box::new(callback), link_change, link_status, None)
    }

    /// Create a manager with the stock switching delay
    /// ([`crate::config::DEFAULT_SWITCHING_DELAY`], 1 s).
    pub fn with_default_switching_delay(
        map: IpMap,
        callback: impl TargetSink + 'static,
        link_change: Arc<ChangeSignal>,
        link_status: Arc<SharedMap<String, bool>>,
    ) -> Self {
        Self::with_switching_delay(
            map,
            callback,
            link_change,
            link_status,
            crate::config::DEFAULT_SWITCHING_DELAY,
        )
    }

    /// Create a manager that sleeps `delay` between selecting a new pair
    /// and invoking the callback.
    pub fn with_switching_delay(
        map: IpMap,
        callback: impl TargetSink + 'static,
        link_change: Arc<ChangeSignal>,
        link_status: Arc<SharedMap<String, bool>>,
        delay: Duration,
    ) -> Self {
        Self::build(map, Box::new(callback), link_change, link_status, Some(delay))
    }

    fn build(
        map: IpMap,
        callback: Box<dyn TargetSink>,
        link_change: Arc<ChangeSignal>,
        link_status: Arc<SharedMap<String, bool>>,
        switching_delay: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                map,
                callback,
                link_change,
                link_status,
                active_pair: ArcSwapOption::empty(),
                switching_delay,
                active: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Set the initial active pair from the bootstrap link, prime the
    /// application with its dataplane target and spawn the handler.
    ///
    /// Fails (and spawns nothing) when the bootstrap link is not a key of
    /// the IP mapping.
    pub fn init(&self, link_id: &str) -> Result<(), ManagerError> {
        if self.inner.stopped.load(Ordering::Acquire) {
            return Err(ManagerError::AlreadyStopped);
        }
        let Some(target) = self.inner.map.get(link_id) else {
            log::error!(
                "[MOB] manager: {} not available in ip map, active pair could not be set",
                link_id
            );
            return Err(ManagerError::UnknownLink(link_id.to_string()));
        };

        let pair = ActivePair {
            source: link_id.to_string(),
            target: target.clone(),
        };
        log::info!(
            "[MOB] manager: active pair {} -> {}:{}",
            pair.source,
            pair.target,
            DATAPLANE_PORT
        );
        self.inner.active_pair.store(Some(Arc::new(pair)));
        self.inner.callback.set_target(target, DATAPLANE_PORT);

        if !self.inner.active.swap(true, Ordering::AcqRel) {
            let inner = Arc::clone(&self.inner);
            match std::thread::Builder::new()
                .name("linkmon-con-handler".into())
                .spawn(move || inner.handle_connections())
            {
                Ok(handle) => *self.worker.lock() = Some(handle),
                Err(e) => {
                    log::error!("[MOB] connection handler spawn failed: {}", e);
                    self.inner.active.store(false, Ordering::Release);
                }
            }
        }

        Ok(())
    }

    /// Currently selected pair, if `init` succeeded.
    pub fn active_pair(&self) -> Option<ActivePair> {
        self.inner
            .active_pair
            .load_full()
            .map(|pair| (*pair).clone())
    }

    /// Request termination and wait for the handler to return. A stopped
    /// manager is not reusable.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        self.inner.active.store(false, Ordering::Release);
        self.join();
    }

    /// Wait for the handler to return.
    pub fn join(&self) {
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.stop();
    }
}

impl ManagerInner {
    /// Handler worker: wake on liveness transitions and retarget the
    /// dataplane when the active source is down.
    fn handle_connections(&self) {
        while self.active.load(Ordering::Acquire) {
            if !self.link_change.wait_timeout(WAIT_POLL_INTERVAL) {
                continue;
            }

            // The signal carries no payload. Re-read the map: a coalesced
            // notification may cover several transitions.
            let Some(pair) = self.active_pair.load_full() else {
                continue;
            };
            if self.link_status.get(&pair.source) == Some(true) {
                continue;
            }

            log::info!("[MOB] dataplane connection lost: {}, reconfiguring", pair.source);

            let mut reconfigured: Option<ActivePair> = None;
            for (link, up) in self.link_status.snapshot() {
                if !up {
                    continue;
                }
                match self.map.get(&link) {
                    Some(target) => {
                        reconfigured = Some(ActivePair {
                            source: link,
                            target: target.clone(),
                        });
                        break;
                    }
                    None => log::error!("[MOB] missing ip map entry for: {}", link),
                }
            }

            match reconfigured {
                Some(pair) => {
                    self.active_pair.store(Some(Arc::new(pair.clone())));
                    if let Some(delay) = self.switching_delay {
                        std::thread::sleep(delay);
                    }
                    self.callback.set_target(&pair.target, DATAPLANE_PORT);
                    log::info!(
                        "[MOB] new dataplane connection: {}:{}",
                        pair.target,
                        DATAPLANE_PORT
                    );
                }
                None => log::info!(
                    "[MOB] no other link available, dataplane connection unchanged: {}:{}",
                    pair.target,
                    DATAPLANE_PORT
                ),
            }
        }
    }
}
