// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Heartbeat reader: per-peer freshness tracking and liveness audit.
//!
//! One reader serves any number of peers on a single bound endpoint. The
//! receive worker stamps arrivals into the reception log (keyed by the
//! peer's IP in textual form); the audit worker runs every half period
//! and compares each entry against the loss threshold
//!
//! ```text
//! loss_threshold = loss x period + slack
//! ```
//!
//! A peer whose last heartbeat is older than the threshold (strictly
//! greater) is marked down in the liveness map, reported once through the
//! change signal, and evicted from the reception log. The liveness map
//! keeps the down entry: it is the externally visible truth. A peer that
//! resumes heartbeating reinstates itself through the next arrival, which
//! re-enters the reception log and flips the liveness entry back to up at
//! the following audit. Reinstatements are signalled too, so a manager
//! stranded without candidates re-evaluates.

use crate::core::{ChangeSignal, NodeId, SharedMap};
use crate::protocol::{Heartbeat, MsgBuffer};
use crate::transport;
use parking_lot::Mutex;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Upper bound on how long a blocking receive runs before the worker
/// re-checks the stop flag.
const RECV_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration of a heartbeat reader.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Endpoint the reader binds.
    pub socket: SocketAddr,
    /// Expected heartbeat period of the monitored writers.
    pub period: Duration,
    /// Tolerance added to the loss threshold for jitter.
    pub slack: Duration,
    /// Permitted consecutive heartbeat losses before fallback.
    pub loss: u32,
}

impl ReaderConfig {
    pub fn new(socket: SocketAddr, period: Duration, slack: Duration, loss: u32) -> Self {
        Self {
            socket,
            period,
            slack,
            loss,
        }
    }

    /// Inter-arrival duration beyond which a peer is declared down.
    pub fn loss_threshold(&self) -> Duration {
        self.loss * self.period + self.slack
    }
}

struct ReaderInner {
    node_id: NodeId,
    socket: UdpSocket,
    period: Duration,
    slack: Duration,
    loss: u32,
    active: AtomicBool,
    stopped: AtomicBool,
    /// peer IP (textual) -> last heartbeat arrival.
    reception_log: SharedMap<String, Instant>,
    /// peer IP (textual) -> link up.
    link_status: Arc<SharedMap<String, bool>>,
    link_change: Arc<ChangeSignal>,
}

/// Heartbeat reader for the stationary side of the monitored links.
pub struct LinkReader {
    inner: Arc<ReaderInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl LinkReader {
    /// Create a reader and bind its endpoint.
    pub fn new(node_id: NodeId, config: ReaderConfig) -> io::Result<Self> {
        let socket = transport::bind_udp(config.socket)?;
        log::info!("[MON] reader id={} listening on {}", node_id, config.socket);

        Ok(Self {
            inner: Arc::new(ReaderInner {
                node_id,
                socket,
                period: config.period,
                slack: config.slack,
                loss: config.loss,
                active: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                reception_log: SharedMap::new(),
                link_status: Arc::new(SharedMap::new()),
                link_change: ChangeSignal::shared(),
            }),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Block until the first heartbeat arrives, seed the reception log
    /// and liveness map with that peer marked up, then spawn the receive
    /// and audit workers.
    ///
    /// Returns the parsed bootstrap message and the observed peer
    /// endpoint, which downstream components use as the bootstrap link.
    pub fn init_heartbeat(&self, logging: bool) -> io::Result<(Heartbeat, SocketAddr)> {
        if self.inner.stopped.load(Ordering::Acquire) {
            return Err(io::Error::other("reader already stopped"));
        }
        log::info!("[MON] waiting for initial heartbeat...");

        let mut buf = [0u8; crate::config::MAX_MSG_LEN];
        let (msg, peer) = loop {
            let (len, peer) = self.inner.socket.recv_from(&mut buf)?;
            match Heartbeat::decode(&mut MsgBuffer::from_wire(&buf[..len])) {
                Ok(msg) => break (msg, peer),
                Err(e) => log::warn!("[MON] discarding malformed heartbeat from {}: {}", peer, e),
            }
        };
        let recv_time = Instant::now();

        let key = peer.ip().to_string();
        self.inner.reception_log.insert(key.clone(), recv_time);
        self.inner.link_status.insert(key, true);

        log::info!(
            "[MON] initial heartbeat from {} id={} count={}",
            peer,
            msg.sender,
            msg.count
        );

        if !self.inner.active.swap(true, Ordering::AcqRel) {
            transport::set_recv_poll_interval(&self.inner.socket, RECV_POLL_INTERVAL)?;

            let recv_inner = Arc::clone(&self.inner);
            let audit_inner = Arc::clone(&self.inner);
            let mut workers = self.workers.lock();
            workers.push(
                std::thread::Builder::new()
                    .name("linkmon-hb-recv".into())
                    .spawn(move || recv_inner.listen_for_heartbeat(logging))?,
            );
            workers.push(
                std::thread::Builder::new()
                    .name("linkmon-hb-audit".into())
                    .spawn(move || audit_inner.link_check())?,
            );
        }

        Ok((msg, peer))
    }

    /// Change signal fired by the audit worker on liveness transitions.
    pub fn link_change(&self) -> Arc<ChangeSignal> {
        Arc::clone(&self.inner.link_change)
    }

    /// Shared liveness map (`link key -> up`).
    pub fn link_status(&self) -> Arc<SharedMap<String, bool>> {
        Arc::clone(&self.inner.link_status)
    }

    /// Peers currently present in the reception log.
    pub fn active_links(&self) -> Vec<String> {
        self.inner.reception_log.keys()
    }

    /// Identifier of the reader node.
    pub fn node_id(&self) -> NodeId {
        self.inner.node_id
    }

    /// Address the reader is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.socket.local_addr()
    }

    /// Request termination and wait for both workers to return. A stopped
    /// reader is not reusable.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        self.inner.active.store(false, Ordering::Release);
        self.join();
    }

    /// Wait for the workers to return.
    pub fn join(&self) {
        for handle in self.workers.lock().drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for LinkReader {
    fn drop(&mut self) {
        self.stop();
    }
}

impl ReaderInner {
    /// Receive worker: stamp arrivals and upsert the reception log.
    fn listen_for_heartbeat(&self, logging: bool) {
        let mut buf = [0u8; crate::config::MAX_MSG_LEN];

        while self.active.load(Ordering::Acquire) {
            let (len, peer) = match self.socket.recv_from(&mut buf) {
                Ok(recv) => recv,
                Err(e) if transport::is_recv_timeout(&e) => continue,
                Err(e) => {
                    log::warn!("[MON] heartbeat receive failed: {}", e);
                    continue;
                }
            };
            let recv_time = Instant::now();

            let msg = match Heartbeat::decode(&mut MsgBuffer::from_wire(&buf[..len])) {
                Ok(msg) => msg,
                Err(e) => {
                    log::warn!("[MON] discarding malformed heartbeat from {}: {}", peer, e);
                    continue;
                }
            };

            if logging {
                log::debug!(
                    "[MON] recv hb peer={} count={} size={}",
                    peer.ip(),
                    msg.count,
                    len
                );
            }

            self.reception_log.insert(peer.ip().to_string(), recv_time);
        }
    }

    /// Audit worker: periodic freshness check of all logged peers.
    fn link_check(&self) {
        let loss_threshold = self.loss * self.period + self.slack;
        let cycle = self.period / 2;

        while self.active.load(Ordering::Acquire) {
            let checkpoint = Instant::now();
            self.audit_pass(checkpoint, loss_threshold);

            if let Some(rest) = cycle.checked_sub(checkpoint.elapsed()) {
                std::thread::sleep(rest);
            }
        }
    }

    /// One audit pass: mark peers beyond the threshold down (strictly
    /// greater - a peer exactly at the threshold is still up), signal
    /// once after all transitions, then evict the lost peers from the
    /// reception log so a resumed sender re-enters cleanly.
    fn audit_pass(&self, checkpoint: Instant, loss_threshold: Duration) {
        let mut lost_links: Vec<String> = Vec::new();
        let mut reinstated = false;

        for (peer, last_hb) in self.reception_log.snapshot() {
            if checkpoint.duration_since(last_hb) > loss_threshold {
                self.link_status.insert(peer.clone(), false);
                lost_links.push(peer);
            } else {
                if self.link_status.get(&peer) == Some(false) {
                    reinstated = true;
                    log::info!("[MON] link reinstated: {}", peer);
                }
                self.link_status.insert(peer, true);
            }
        }

        // One notification per audit pass, after all transitions are in
        // the map. Waiters re-read the map, they get no payload.
        if !lost_links.is_empty() || reinstated {
            for peer in &lost_links {
                log::info!("[MON] connection loss: {}", peer);
            }
            self.link_change.notify();
        }

        for peer in &lost_links {
            self.reception_log.remove(peer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::writer::{LinkWriter, WriterConfig};

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    fn reader_config(socket: SocketAddr) -> ReaderConfig {
        ReaderConfig::new(
            socket,
            Duration::from_millis(10),
            Duration::from_millis(10),
            2,
        )
    }

    #[test]
    fn test_loss_threshold_formula() {
        let config = ReaderConfig::new(
            loopback(),
            Duration::from_millis(3),
            Duration::from_millis(2),
            2,
        );
        assert_eq!(config.loss_threshold(), Duration::from_millis(8));
    }

    #[test]
    fn test_audit_boundary_exactly_at_threshold_is_up() {
        let reader = LinkReader::new(NodeId::from_suffix(15), reader_config(loopback())).unwrap();
        let threshold = Duration::from_millis(30);
        let checkpoint = Instant::now();

        reader
            .inner
            .reception_log
            .insert("10.0.0.1".into(), checkpoint - threshold);
        reader.inner.audit_pass(checkpoint, threshold);

        // Exactly at the threshold: strict greater-than keeps the peer up.
        assert_eq!(reader.link_status().get(&"10.0.0.1".to_string()), Some(true));
        assert_eq!(reader.active_links(), vec!["10.0.0.1".to_string()]);
        assert!(!reader.link_change().take());
    }

    #[test]
    fn test_audit_past_threshold_marks_down_and_evicts() {
        let reader = LinkReader::new(NodeId::from_suffix(16), reader_config(loopback())).unwrap();
        let threshold = Duration::from_millis(30);
        let checkpoint = Instant::now();

        reader
            .inner
            .reception_log
            .insert("10.0.0.1".into(), checkpoint - threshold - Duration::from_millis(1));
        reader
            .inner
            .reception_log
            .insert("10.0.0.2".into(), checkpoint);
        reader.inner.audit_pass(checkpoint, threshold);

        assert_eq!(
            reader.link_status().get(&"10.0.0.1".to_string()),
            Some(false)
        );
        assert_eq!(reader.link_status().get(&"10.0.0.2".to_string()), Some(true));
        assert_eq!(reader.active_links(), vec!["10.0.0.2".to_string()]);
        assert!(reader.link_change().take());
    }

    #[test]
    fn test_init_returns_bootstrap_peer() {
        let reader = LinkReader::new(NodeId::from_suffix(10), reader_config(loopback())).unwrap();
        let reader_addr = reader.inner.socket.local_addr().unwrap();

        let writer = LinkWriter::new(
            NodeId::from_suffix(11),
            WriterConfig::unicast(loopback(), reader_addr, Duration::from_millis(10)),
        )
        .unwrap();
        writer.run();

        let (msg, peer) = reader.init_heartbeat(false).unwrap();
        assert_eq!(msg.sender, NodeId::from_suffix(11));
        assert_eq!(peer.ip(), writer.local_addr().unwrap().ip());

        let key = peer.ip().to_string();
        assert_eq!(reader.link_status().get(&key), Some(true));
        assert_eq!(reader.active_links(), vec![key]);

        writer.stop();
        reader.stop();
    }

    #[test]
    fn test_stale_peer_marked_down_and_evicted() {
        let reader = LinkReader::new(NodeId::from_suffix(20), reader_config(loopback())).unwrap();
        let reader_addr = reader.inner.socket.local_addr().unwrap();

        let writer = LinkWriter::new(
            NodeId::from_suffix(21),
            WriterConfig::unicast(loopback(), reader_addr, Duration::from_millis(10)),
        )
        .unwrap();
        writer.run();

        let (_, peer) = reader.init_heartbeat(false).unwrap();
        let key = peer.ip().to_string();

        writer.stop();

        // loss_threshold = 2 x 10ms + 10ms = 30ms; give the audit margin.
        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(reader.link_status().get(&key), Some(false));
        assert!(reader.active_links().is_empty());
        assert!(reader.link_change().take());

        reader.stop();
    }

    #[test]
    fn test_resumed_peer_reinstates_and_signals() {
        let reader = LinkReader::new(NodeId::from_suffix(30), reader_config(loopback())).unwrap();
        let reader_addr = reader.inner.socket.local_addr().unwrap();

        let writer = LinkWriter::new(
            NodeId::from_suffix(31),
            WriterConfig::unicast(loopback(), reader_addr, Duration::from_millis(10)),
        )
        .unwrap();
        writer.run();
        let (_, peer) = reader.init_heartbeat(false).unwrap();
        let key = peer.ip().to_string();

        writer.stop();
        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(reader.link_status().get(&key), Some(false));
        let _ = reader.link_change().take();

        // Resume from the same source address.
        let writer2 = LinkWriter::new(
            NodeId::from_suffix(31),
            WriterConfig::unicast(loopback(), reader_addr, Duration::from_millis(10)),
        )
        .unwrap();
        writer2.run();

        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(reader.link_status().get(&key), Some(true));
        assert!(reader.link_change().take());

        writer2.stop();
        reader.stop();
    }
}
