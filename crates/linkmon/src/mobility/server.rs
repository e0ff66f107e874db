// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Mobility server: status distribution to mobile endpoints.
//!
//! Runs co-located with the heartbeat reader. Every report snapshots the
//! liveness map into an ordered status list and emits one `LinkStatus`
//! datagram per dataplane target in the IP mapping. The server's own port
//! doubles as the destination port on every target - clients bind the
//! port the server sends from.

use super::IpMap;
use crate::core::{NodeId, SharedMap};
use crate::protocol::LinkStatus;
use crate::transport;
use std::io;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

struct ServerInner {
    node_id: NodeId,
    socket: UdpSocket,
    /// Destination port on every target (the server's own bound port).
    port: u16,
    map: IpMap,
    link_status: Arc<SharedMap<String, bool>>,
    /// Status sequence counter; lets clients drop duplicates injected by
    /// redundant paths.
    count: AtomicU32,
}

/// Status push server for the stationary side.
pub struct MobilityServer {
    inner: Arc<ServerInner>,
}

impl MobilityServer {
    /// Create a server bound to `socket`, reporting over `map` targets.
    pub fn new(
        node_id: NodeId,
        socket: SocketAddr,
        map: IpMap,
        link_status: Arc<SharedMap<String, bool>>,
    ) -> io::Result<Self> {
        let udp = transport::bind_udp(socket)?;
        let port = udp.local_addr()?.port();

        Ok(Self {
            inner: Arc::new(ServerInner {
                node_id,
                socket: udp,
                port,
                map,
                link_status,
                count: AtomicU32::new(0),
            }),
        })
    }

    /// Push the initial status vector to all targets.
    pub fn init(&self) {
        self.inner.report_status();
    }

    /// Snapshot the liveness map and push it to all targets.
    pub fn report_status(&self) {
        self.inner.report_status();
    }

    /// Callback handed to the connection manager: every handover (and the
    /// bootstrap prime) triggers a status push. The target the manager
    /// selected is irrelevant here - clients get the full vector.
    pub fn status_callback(&self) -> impl Fn(&str, u16) + Send + Sync + 'static {
        let inner = Arc::clone(&self.inner);
        move |_endpoint: &str, _port: u16| inner.report_status()
    }

    /// Status messages emitted so far.
    pub fn status_count(&self) -> u32 {
        self.inner.count.load(Ordering::Relaxed)
    }

    /// Identifier of the server node.
    pub fn node_id(&self) -> NodeId {
        self.inner.node_id
    }

    /// Address the server is bound to (its port is also the destination
    /// port on every target).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.socket.local_addr()
    }
}

impl ServerInner {
    fn report_status(&self) {
        let status = self.link_status.snapshot();
        let count = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        let msg = LinkStatus::new(self.node_id, count, status);

        let buf = match msg.encode() {
            Ok(buf) => buf,
            Err(e) => {
                log::error!("[MOB] status message dropped: {}", e);
                return;
            }
        };
        log::debug!("[MOB] status #{} len={}", count, buf.len());

        for target in self.map.values() {
            let ip: IpAddr = match target.parse() {
                Ok(ip) => ip,
                Err(_) => {
                    log::warn!("[MOB] invalid status target address: {}", target);
                    continue;
                }
            };
            let dst = SocketAddr::new(ip, self.port);
            if let Err(e) = self.socket.send_to(buf.as_bytes(), dst) {
                // Per-target, no retry: a dead path must not block the rest.
                log::warn!("[MOB] status send to {} failed: {}", dst, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MsgBuffer;
    use std::time::Duration;

    #[test]
    fn test_report_snapshots_map_and_increments_count() {
        let link_status: Arc<SharedMap<String, bool>> = Arc::new(SharedMap::new());
        link_status.insert("10.0.0.1".into(), true);
        link_status.insert("10.0.0.2".into(), false);

        // Target a second loopback address: the client side must bind the
        // same port the server sends from, so the IPs have to differ.
        let mut map = IpMap::new();
        map.insert("10.0.0.1".into(), "127.0.0.2".into());

        let server = MobilityServer::new(
            NodeId::from_suffix(50),
            "127.0.0.1:0".parse().unwrap(),
            map,
            Arc::clone(&link_status),
        )
        .unwrap();
        let port = server.local_addr().unwrap().port();

        let rx = transport::bind_udp(format!("127.0.0.2:{}", port).parse().unwrap()).unwrap();
        rx.set_read_timeout(Some(Duration::from_millis(500))).unwrap();

        server.init();
        server.report_status();
        assert_eq!(server.status_count(), 2);

        let mut buf = [0u8; 1472];
        let (n, _) = rx.recv_from(&mut buf).unwrap();
        let msg = LinkStatus::decode(&mut MsgBuffer::from_wire(&buf[..n])).unwrap();
        assert_eq!(msg.sender, NodeId::from_suffix(50));
        assert_eq!(msg.count, 1);
        assert_eq!(
            msg.status,
            vec![
                ("10.0.0.1".to_string(), true),
                ("10.0.0.2".to_string(), false)
            ]
        );
    }

    #[test]
    fn test_callback_triggers_report() {
        let link_status: Arc<SharedMap<String, bool>> = Arc::new(SharedMap::new());
        let server = MobilityServer::new(
            NodeId::from_suffix(51),
            "127.0.0.1:0".parse().unwrap(),
            IpMap::new(),
            link_status,
        )
        .unwrap();

        let callback = server.status_callback();
        callback("10.0.0.9", 55000);
        callback("10.0.0.9", 55000);
        assert_eq!(server.status_count(), 2);
    }
}
