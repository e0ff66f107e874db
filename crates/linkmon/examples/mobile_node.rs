// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Mobile node of the roaming demonstrator: one heartbeat writer per
//! wifi interface streaming to the resource manager, plus a mobility
//! client mirroring the RM's link status and a connection manager
//! retargeting the local dataplane.
//!
//! ```bash
//! cargo run --example mobile_node -- [node-suffix] [hb-period-us]
//! ```

use linkmon::config::{HEARTBEAT_PORT, MOBILITY_PORT};
use linkmon::mobility::{ConnectionManager, IpMap, MobilityClient};
use linkmon::monitor::{LinkWriter, WriterConfig};
use linkmon::NodeId;
use std::time::Duration;

fn main() -> std::io::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let node_suffix: u8 = args.next().and_then(|a| a.parse().ok()).unwrap_or(6);
    let hb_period_us: u64 = args.next().and_then(|a| a.parse().ok()).unwrap_or(3000);

    let node_id = NodeId::from_suffix(node_suffix);
    let period = Duration::from_micros(hb_period_us);

    let writer_a = LinkWriter::new(
        node_id,
        WriterConfig::unicast(
            format!("192.168.20.{}:{}", node_suffix, HEARTBEAT_PORT).parse().unwrap(),
            format!("192.168.20.4:{}", HEARTBEAT_PORT).parse().unwrap(),
            period,
        ),
    )
    .map_err(|e| std::io::Error::other(e.to_string()))?;

    let writer_b = LinkWriter::new(
        node_id,
        WriterConfig::unicast(
            format!("192.168.30.{}:{}", node_suffix, HEARTBEAT_PORT).parse().unwrap(),
            format!("192.168.30.5:{}", HEARTBEAT_PORT).parse().unwrap(),
            period,
        ),
    )
    .map_err(|e| std::io::Error::other(e.to_string()))?;

    writer_a.run();
    writer_b.run();

    // Mirror the RM's view of the links and retarget the local dataplane
    // on loss. Keys match the status list pushed by the RM server.
    let mut map = IpMap::new();
    map.insert("192.168.2.102".into(), "192.168.20.4".into());
    map.insert("192.168.2.103".into(), "192.168.30.5".into());

    let client = MobilityClient::new(
        node_id,
        format!("0.0.0.0:{}", MOBILITY_PORT).parse().unwrap(),
    )?;

    let manager = ConnectionManager::new(
        map,
        |ip: &str, port: u16| log::info!("dataplane target -> {}:{}", ip, port),
        client.link_change(),
        client.link_status(),
    );

    let first_link = client.init()?;
    log::info!("bootstrap link {}", first_link);
    if manager.init(&first_link).is_err() {
        client.stop();
        writer_a.stop();
        writer_b.stop();
        std::process::exit(1);
    }

    loop {
        std::thread::sleep(Duration::from_secs(1));
    }
}
