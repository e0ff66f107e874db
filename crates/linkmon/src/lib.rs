// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # linkmon - heartbeat-based multipath link monitoring
//!
//! Mobility management core for a mobile node that reaches a stationary
//! resource manager over several parallel wireless uplinks. Each uplink
//! carries a periodic heartbeat stream; the stationary side derives a
//! per-link up/down signal from the arrival pattern and retargets the
//! application's dataplane when the active link dies.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use linkmon::monitor::{LinkReader, ReaderConfig};
//! use linkmon::mobility::{ConnectionManager, IpMap};
//! use linkmon::NodeId;
//! use std::time::Duration;
//!
//! fn main() -> std::io::Result<()> {
//!     let mut map = IpMap::new();
//!     map.insert("192.168.2.102".into(), "192.168.20.6".into());
//!     map.insert("192.168.2.103".into(), "192.168.30.6".into());
//!
//!     let reader = LinkReader::new(
//!         NodeId::from_suffix(1),
//!         ReaderConfig::new(
//!             "192.168.2.100:50000".parse().unwrap(),
//!             Duration::from_millis(3),
//!             Duration::from_millis(2),
//!             2,
//!         ),
//!     )?;
//!
//!     let manager = ConnectionManager::new(
//!         map,
//!         |ip: &str, port: u16| println!("dataplane -> {}:{}", ip, port),
//!         reader.link_change(),
//!         reader.link_status(),
//!     );
//!
//!     let (_msg, bootstrap) = reader.init_heartbeat(true)?;
//!     manager.init(&bootstrap.ip().to_string()).expect("bootstrap in map");
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------- mobile node ----------------------+
//! |  LinkWriter (iface A)   LinkWriter (iface B)            |
//! +-----------|---------------------|-----------------------+
//!             | UDP heartbeats      |
//! +-----------v---------------------v--- resource manager --+
//! |  LinkReader -> liveness map + change signal             |
//! |       |                  |                              |
//! |  MobilityServer    ConnectionManager -> app callback    |
//! +-------|-------------------------------------------------+
//!         | UDP status
//! +-------v--------------- mobile node ---------------------+
//! |  MobilityClient -> liveness map -> ConnectionManager    |
//! +---------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`monitor::LinkWriter`] | Drift-compensated periodic heartbeat emitter |
//! | [`monitor::LinkReader`] | Per-peer freshness tracking and liveness audit |
//! | [`mobility::MobilityServer`] | Pushes the multi-link status vector to mobile endpoints |
//! | [`mobility::MobilityClient`] | Mirrors pushed status into a local liveness map |
//! | [`mobility::ConnectionManager`] | Selects the active pair and retargets the dataplane |
//! | [`NodeId`] | Opaque 16-byte endpoint identifier |

/// Protocol constants (ports, sizes, default timings).
pub mod config;
/// Shared building blocks (identifier, shared map, change signal).
pub mod core;
/// Mobility management (status distribution, handover control).
pub mod mobility;
/// Heartbeat emission and link supervision.
pub mod monitor;
/// Wire protocol (serialization buffer, message codecs).
pub mod protocol;
/// UDP socket construction.
pub mod transport;

pub use crate::core::{ChangeSignal, NodeId, SharedMap};
pub use crate::protocol::{Heartbeat, LinkStatus, MsgBuffer};
