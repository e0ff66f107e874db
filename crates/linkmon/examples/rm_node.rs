// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Resource-manager node of the roaming demonstrator.
//!
//! Runs the heartbeat reader, the mobility server and a connection
//! manager. The dataplane callback only logs here; a real deployment
//! hands it to the application middleware.
//!
//! ```bash
//! cargo run --example rm_node -- [node-suffix] [hb-period-us]
//! ```

use linkmon::config::{DEFAULT_HB_LOSS, DEFAULT_HB_SLACK, HEARTBEAT_PORT, MOBILITY_PORT};
use linkmon::mobility::{ConnectionManager, IpMap, MobilityServer};
use linkmon::monitor::{LinkReader, ReaderConfig};
use linkmon::NodeId;
use std::time::Duration;

fn main() -> std::io::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let node_suffix: u8 = args.next().and_then(|a| a.parse().ok()).unwrap_or(1);
    let hb_period_us: u64 = args.next().and_then(|a| a.parse().ok()).unwrap_or(3000);

    let node_id = NodeId::from_suffix(node_suffix);

    // AP ethernet interface -> mobile node wifi interface, in operator
    // preference order.
    let mut map = IpMap::new();
    map.insert("192.168.2.102".into(), "192.168.20.6".into());
    map.insert("192.168.2.103".into(), "192.168.30.6".into());

    let reader = LinkReader::new(
        node_id,
        ReaderConfig::new(
            format!("192.168.2.100:{}", HEARTBEAT_PORT).parse().unwrap(),
            Duration::from_micros(hb_period_us),
            DEFAULT_HB_SLACK,
            DEFAULT_HB_LOSS,
        ),
    )?;

    let server = MobilityServer::new(
        node_id,
        format!("0.0.0.0:{}", MOBILITY_PORT).parse().unwrap(),
        map.clone(),
        reader.link_status(),
    )?;

    // Retarget the demo dataplane and push the new status vector to the
    // mobile endpoints in one go.
    let report = server.status_callback();
    let callback = move |ip: &str, port: u16| {
        log::info!("dataplane target -> {}:{}", ip, port);
        report(ip, port);
    };

    let manager = ConnectionManager::new(map, callback, reader.link_change(), reader.link_status());

    let (msg, bootstrap) = reader.init_heartbeat(true)?;
    log::info!("bootstrap peer {} id={} count={}", bootstrap, msg.sender, msg.count);

    if manager.init(&bootstrap.ip().to_string()).is_err() {
        reader.stop();
        std::process::exit(1);
    }

    loop {
        std::thread::sleep(Duration::from_secs(1));
    }
}
