// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP socket construction for heartbeat and status traffic.
//!
//! Sockets are created through `socket2` so bind-time options
//! (`SO_REUSEADDR`, multicast membership, hop limit) are applied before
//! conversion into a plain `std::net::UdpSocket`. Each socket is owned
//! exclusively by the component that opens it.

use crate::config::MULTICAST_HOPS;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;

/// Bind a unicast UDP socket with `SO_REUSEADDR`.
pub fn bind_udp(addr: SocketAddr) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    log::debug!("[NET] bound udp socket addr={}", addr);
    Ok(socket.into())
}

/// Bind a UDP socket that participates in a multicast group.
///
/// The socket joins `group` on the default interface and gets the
/// protocol hop limit for outgoing multicast datagrams.
pub fn bind_multicast(addr: SocketAddr, group: Ipv4Addr) -> io::Result<UdpSocket> {
    if !group.is_multicast() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a multicast address", group),
        ));
    }

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;

    let socket: UdpSocket = socket.into();
    socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
    socket.set_multicast_ttl_v4(MULTICAST_HOPS)?;
    log::debug!("[NET] bound multicast socket addr={} group={}", addr, group);
    Ok(socket)
}

/// Make blocking receives interruptible.
///
/// Workers poll a stop flag between receive attempts; the timeout bounds
/// how long a `stop()` call waits for the worker to notice.
pub fn set_recv_poll_interval(socket: &UdpSocket, interval: Duration) -> io::Result<()> {
    socket.set_read_timeout(Some(interval))
}

/// True when a receive error is just the poll interval expiring.
pub fn is_recv_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
