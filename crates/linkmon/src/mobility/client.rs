// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Mobility client: mirrors RM-pushed link status on the mobile node.
//!
//! The receive worker parses status datagrams and enqueues them; the
//! audit worker dequeues, drops duplicates (redundant paths may deliver
//! the same status twice), diffs the incoming vector against the local
//! liveness map and fires the change signal when a link was lost. A link
//! counts as lost iff the local value was up and the incoming value is
//! down, which makes reprocessing idempotent.

use crate::core::{ChangeSignal, NodeId, SharedMap};
use crate::protocol::{LinkStatus, MsgBuffer, StatusList};
use crate::transport;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const RECV_POLL_INTERVAL: Duration = Duration::from_millis(100);

struct ClientInner {
    node_id: NodeId,
    socket: UdpSocket,
    active: AtomicBool,
    stopped: AtomicBool,
    queue_tx: Sender<LinkStatus>,
    link_status: Arc<SharedMap<String, bool>>,
    link_change: Arc<ChangeSignal>,
}

/// Status receiver for the mobile side of the monitored links.
pub struct MobilityClient {
    inner: Arc<ClientInner>,
    queue_rx: Mutex<Option<Receiver<LinkStatus>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl MobilityClient {
    /// Create a client and bind its endpoint.
    ///
    /// The bound port must match the mobility server's port - the server
    /// sends to every target on its own port.
    pub fn new(node_id: NodeId, socket: SocketAddr) -> io::Result<Self> {
        let udp = transport::bind_udp(socket)?;
        log::info!("[MOB] client id={} listening on {}", node_id, socket);

        let (queue_tx, queue_rx) = channel::unbounded();
        Ok(Self {
            inner: Arc::new(ClientInner {
                node_id,
                socket: udp,
                active: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                queue_tx,
                link_status: Arc::new(SharedMap::new()),
                link_change: ChangeSignal::shared(),
            }),
            queue_rx: Mutex::new(Some(queue_rx)),
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Block until the first status message arrives, seed the local
    /// liveness map from it and spawn the receive and audit workers.
    ///
    /// Returns the first key of the status list, which defines the
    /// bootstrap active link.
    pub fn init(&self) -> io::Result<String> {
        if self.inner.stopped.load(Ordering::Acquire) {
            return Err(io::Error::other("client already stopped"));
        }
        let mut buf = [0u8; crate::config::MAX_MSG_LEN];
        let msg = loop {
            let (len, peer) = self.inner.socket.recv_from(&mut buf)?;
            match LinkStatus::decode(&mut MsgBuffer::from_wire(&buf[..len])) {
                Ok(msg) if !msg.status.is_empty() => break msg,
                Ok(_) => log::warn!("[MOB] empty status list from {}, still waiting", peer),
                Err(e) => log::warn!("[MOB] discarding malformed status from {}: {}", peer, e),
            }
        };

        let first_link = self.init_status(&msg.status);
        log::info!(
            "[MOB] initial status from id={} count={} first_link={}",
            msg.sender,
            msg.count,
            first_link
        );

        if !self.inner.active.swap(true, Ordering::AcqRel) {
            transport::set_recv_poll_interval(&self.inner.socket, RECV_POLL_INTERVAL)?;

            let Some(queue_rx) = self.queue_rx.lock().take() else {
                return Err(io::Error::other("status queue already taken"));
            };
            let recv_inner = Arc::clone(&self.inner);
            let audit_inner = Arc::clone(&self.inner);
            let last_count = msg.count;

            let mut workers = self.workers.lock();
            workers.push(
                std::thread::Builder::new()
                    .name("linkmon-mob-recv".into())
                    .spawn(move || recv_inner.listen_for_status())?,
            );
            workers.push(
                std::thread::Builder::new()
                    .name("linkmon-mob-audit".into())
                    .spawn(move || audit_inner.link_check(queue_rx, last_count))?,
            );
        }

        Ok(first_link)
    }

    /// Change signal fired when a link is reported lost.
    pub fn link_change(&self) -> Arc<ChangeSignal> {
        Arc::clone(&self.inner.link_change)
    }

    /// Shared liveness map (`link key -> up`).
    pub fn link_status(&self) -> Arc<SharedMap<String, bool>> {
        Arc::clone(&self.inner.link_status)
    }

    /// Identifier of the client node.
    pub fn node_id(&self) -> NodeId {
        self.inner.node_id
    }

    /// Address the client is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.socket.local_addr()
    }

    /// Request termination and wait for both workers to return. A
    /// stopped client is not reusable.
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

    fn init_status(&self, status: &StatusList) -> String {
        let mut first_link = String::new();
        for (key, up) in status {
            log::info!("[MOB] link {}: {}", key, up);
            if first_link.is_empty() {
                first_link = key.clone();
            }
            self.inner.link_status.insert(key.clone(), *up);
        }
        first_link
    }
}

impl Drop for MobilityClient {
    fn drop(&mut self) {
        self.stop();
    }
}

impl ClientInner {
    /// Receive worker: parse status datagrams and enqueue them.
    fn listen_for_status(&self) {
        let mut buf = [0u8; crate::config::MAX_MSG_LEN];

        while self.active.load(Ordering::Acquire) {
            let (len, peer) = match self.socket.recv_from(&mut buf) {
                Ok(recv) => recv,
                Err(e) if transport::is_recv_timeout(&e) => continue,
                Err(e) => {
                    log::warn!("[MOB] status receive failed: {}", e);
                    continue;
                }
            };

            match LinkStatus::decode(&mut MsgBuffer::from_wire(&buf[..len])) {
                Ok(msg) => {
                    // Enqueue never blocks; the audit worker drains.
                    let _ = self.queue_tx.send(msg);
                }
                Err(e) => {
                    log::warn!("[MOB] discarding malformed status from {}: {}", peer, e);
                }
            }
        }
    }

    /// Audit worker: dequeue, dedupe, diff and signal.
    fn link_check(&self, queue_rx: Receiver<LinkStatus>, mut last_count: u32) {
        while self.active.load(Ordering::Acquire) {
            let msg = match queue_rx.recv_timeout(RECV_POLL_INTERVAL) {
                Ok(msg) => msg,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            // Redundant paths replicate datagrams; only a strictly newer
            // sequence number gets processed.
            if msg.count <= last_count {
                log::debug!("[MOB] duplicate status #{} dropped", msg.count);
                continue;
            }
            last_count = msg.count;

            if self.update_status(&msg.status) > 0 {
                self.link_change.notify();
            }
        }
    }

    /// Diff the incoming vector against the local map, overwrite, and
    /// return the number of lost links.
    fn update_status(&self, status: &StatusList) -> usize {
        let mut lost_links = 0;
        for (key, up) in status {
            log::debug!("[MOB] link {}: {}", key, up);
            if self.link_status.get(key) == Some(true) && !up {
                lost_links += 1;
                log::info!("[MOB] link lost: {}", key);
            }
            self.link_status.insert(key.clone(), *up);
        }
        lost_links
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> MobilityClient {
        MobilityClient::new(NodeId::from_suffix(60), "127.0.0.1:0".parse().unwrap()).unwrap()
    }

    #[test]
    fn test_update_status_counts_up_to_down_only() {
        let c = client();
        c.inner.link_status.insert("a".into(), true);
        c.inner.link_status.insert("b".into(), false);

        let incoming = vec![
            ("a".to_string(), false), // up -> down: lost
            ("b".to_string(), false), // down -> down: not lost
            ("c".to_string(), false), // unknown -> down: not lost
        ];
        assert_eq!(c.inner.update_status(&incoming), 1);
        assert_eq!(c.inner.link_status.get(&"a".to_string()), Some(false));
        assert_eq!(c.inner.link_status.get(&"c".to_string()), Some(false));
    }

    #[test]
    fn test_update_status_is_idempotent() {
        let c = client();
        c.inner.link_status.insert("a".into(), true);

        let incoming = vec![("a".to_string(), false), ("b".to_string(), true)];
        assert_eq!(c.inner.update_status(&incoming), 1);
        let after_first = c.inner.link_status.snapshot();

        // Replaying the same vector changes nothing and loses nothing.
        assert_eq!(c.inner.update_status(&incoming), 0);
        assert_eq!(c.inner.link_status.snapshot(), after_first);
    }

    #[test]
    fn test_init_status_returns_first_key() {
        let c = client();
        let status = vec![
            ("zulu".to_string(), true),
            ("alpha".to_string(), true),
        ];
        // Sender order wins, not key order.
        assert_eq!(c.init_status(&status), "zulu");
        assert_eq!(c.link_status().len(), 2);
    }
}
