// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Passive heartbeat logger.
//!
//! Binds a heartbeat endpoint and records every arrival without liveness
//! tracking. Used for measurement runs where the reception pattern is the
//! experiment's raw data.

use crate::core::NodeId;
use crate::protocol::{Heartbeat, MsgBuffer};
use crate::transport;
use parking_lot::Mutex;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const RECV_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration of a heartbeat logger.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Endpoint the logger binds.
    pub socket: SocketAddr,
    /// Multicast group to opt into, if any.
    pub multicast_group: Option<Ipv4Addr>,
}

impl LoggerConfig {
    pub fn unicast(socket: SocketAddr) -> Self {
        Self {
            socket,
            multicast_group: None,
        }
    }

    pub fn multicast(socket: SocketAddr, group: Ipv4Addr) -> Self {
        Self {
            socket,
            multicast_group: Some(group),
        }
    }
}

struct LoggerInner {
    node_id: NodeId,
    socket: UdpSocket,
    active: AtomicBool,
    received: AtomicU64,
}

/// Arrival logger for heartbeat traffic.
pub struct HeartbeatLogger {
    inner: Arc<LoggerInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatLogger {
    /// Create a logger and bind its endpoint.
    pub fn new(node_id: NodeId, config: LoggerConfig) -> io::Result<Self> {
        let socket = match config.multicast_group {
            Some(group) => transport::bind_multicast(config.socket, group)?,
            None => transport::bind_udp(config.socket)?,
        };
        transport::set_recv_poll_interval(&socket, RECV_POLL_INTERVAL)?;

        Ok(Self {
            inner: Arc::new(LoggerInner {
                node_id,
                socket,
                active: AtomicBool::new(false),
                received: AtomicU64::new(0),
            }),
            worker: Mutex::new(None),
        })
    }

    /// Start the logging worker. Idempotent.
    pub fn init_heartbeat(&self) {
        if self.inner.active.swap(true, Ordering::AcqRel) {
            log::info!("[MON] heartbeat logger id={} already active", self.inner.node_id);
            return;
        }

        log::info!("[MON] heartbeat logger id={} running", self.inner.node_id);
        let inner = Arc::clone(&self.inner);
        match std::thread::Builder::new()
            .name("linkmon-hb-logger".into())
            .spawn(move || inner.listen_for_heartbeat())
        {
            Ok(handle) => *self.worker.lock() = Some(handle),
            Err(e) => {
                log::error!("[MON] logger worker spawn failed: {}", e);
                self.inner.active.store(false, Ordering::Release);
            }
        }
    }

    /// Heartbeats observed so far.
    pub fn received(&self) -> u64 {
        self.inner.received.load(Ordering::Relaxed)
    }

    /// Request termination and wait for the worker to return.
    pub fn stop(&self) {
        self.inner.active.store(false, Ordering::Release);
        self.join();
    }

    /// Wait for the worker to return.
    pub fn join(&self) {
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for HeartbeatLogger {
    fn drop(&mut self) {
        self.stop();
    }
}

impl LoggerInner {
    fn listen_for_heartbeat(&self) {
        let mut buf = [0u8; crate::config::MAX_MSG_LEN];

        while self.active.load(Ordering::Acquire) {
            let (len, peer) = match self.socket.recv_from(&mut buf) {
                Ok(recv) => recv,
                Err(e) if transport::is_recv_timeout(&e) => continue,
                Err(e) => {
                    log::warn!("[MON] logger receive failed: {}", e);
                    continue;
                }
            };

            match Heartbeat::decode(&mut MsgBuffer::from_wire(&buf[..len])) {
                Ok(msg) => {
                    self.received.fetch_add(1, Ordering::Relaxed);
                    log::info!("[MON] {}, {}, {}", peer.ip(), msg.sender, msg.count);
                }
                Err(e) => {
                    log::warn!("[MON] discarding malformed heartbeat from {}: {}", peer, e);
                }
            }
        }
    }
}
