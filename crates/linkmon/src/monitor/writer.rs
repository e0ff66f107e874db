// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Heartbeat writer: drift-compensated periodic emission.
//!
//! The pacing loop keeps a signed offset budget. After every send the
//! deviation between nominal and actual period is accumulated into the
//! budget and subtracted from the next deadline, so cumulative skew is
//! absorbed symmetrically and the long-run cadence matches the configured
//! period even under scheduling jitter.
//!
//! Periods below [`SPIN_THRESHOLD`] busy-wait for sub-millisecond
//! accuracy; longer periods sleep the bulk of the interval and spin only
//! the remainder.
//!
//! # State machine
//!
//! ```text
//! created --run()--> running --stop()--> stopping --worker exit--> terminated
//! ```
//!
//! `run()` is idempotent; a stopped writer is not reusable.

use crate::config::SPIN_THRESHOLD;
use crate::core::NodeId;
use crate::protocol::Heartbeat;
use crate::transport;
use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Margin kept out of the coarse sleep and burned in the spin loop
/// instead, to absorb sleep overshoot.
const SLEEP_SPIN_MARGIN: Duration = Duration::from_micros(200);

/// Construction error of a [`LinkWriter`].
#[derive(Debug)]
pub enum WriterError {
    /// A zero heartbeat period is an error configuration.
    ZeroPeriod,
    /// Socket setup failed.
    Io(io::Error),
}

impl fmt::Display for WriterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriterError::ZeroPeriod => write!(f, "heartbeat period must be non-zero"),
            WriterError::Io(e) => write!(f, "socket setup failed: {}", e),
        }
    }
}

impl std::error::Error for WriterError {}

impl From<io::Error> for WriterError {
    fn from(e: io::Error) -> Self {
        WriterError::Io(e)
    }
}

/// Configuration of a heartbeat writer.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Source endpoint the writer binds.
    pub socket: SocketAddr,
    /// Destination endpoint heartbeats are sent to.
    pub reader: SocketAddr,
    /// Multicast group to opt into, if any.
    pub multicast_group: Option<Ipv4Addr>,
    /// Emission period.
    pub period: Duration,
    /// Pacing threshold: periods below this spin, others sleep.
    pub spin_threshold: Duration,
}

impl WriterConfig {
    /// Unicast writer configuration.
    pub fn unicast(socket: SocketAddr, reader: SocketAddr, period: Duration) -> Self {
        Self {
            socket,
            reader,
            multicast_group: None,
            period,
            spin_threshold: SPIN_THRESHOLD,
        }
    }

    /// Multicast writer configuration. Heartbeats go to `group` on the
    /// writer's own port.
    pub fn multicast(socket: SocketAddr, group: Ipv4Addr, period: Duration) -> Self {
        Self {
            socket,
            reader: SocketAddr::new(group.into(), socket.port()),
            multicast_group: Some(group),
            period,
            spin_threshold: SPIN_THRESHOLD,
        }
    }
}

struct WriterInner {
    id: NodeId,
    socket: UdpSocket,
    destination: SocketAddr,
    period: Duration,
    spin_threshold: Duration,
    active: AtomicBool,
    stopped: AtomicBool,
    msg: Mutex<Heartbeat>,
    epoch: Instant,
}

/// Periodic heartbeat emitter bound to one uplink interface.
pub struct LinkWriter {
    inner: Arc<WriterInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LinkWriter {
    /// Create a writer. Binds the source socket; rejects a zero period.
    pub fn new(id: NodeId, config: WriterConfig) -> Result<Self, WriterError> {
        if config.period.is_zero() {
            return Err(WriterError::ZeroPeriod);
        }

        let socket = match config.multicast_group {
            Some(group) => transport::bind_multicast(config.socket, group)?,
            None => transport::bind_udp(config.socket)?,
        };

        log::info!("[HB] writer id={} dst={}", id, config.reader);

        Ok(Self {
            inner: Arc::new(WriterInner {
                id,
                socket,
                destination: config.reader,
                period: config.period,
                spin_threshold: config.spin_threshold,
                active: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                msg: Mutex::new(Heartbeat::new(id)),
                epoch: Instant::now(),
            }),
            worker: Mutex::new(None),
        })
    }

    /// Start the emission worker. Idempotent; a no-op after `stop()`.
    pub fn run(&self) {
        if self.inner.stopped.load(Ordering::Acquire) {
            log::warn!("[HB] writer id={} already stopped", self.inner.id);
            return;
        }
        if self.inner.active.swap(true, Ordering::AcqRel) {
            log::info!("[HB] writer id={} already running", self.inner.id);
            return;
        }

        log::info!("[HB] writer id={} running", self.inner.id);
        let inner = Arc::clone(&self.inner);
        match std::thread::Builder::new()
            .name("linkmon-hb-writer".into())
            .spawn(move || inner.schedule_heartbeat())
        {
            Ok(handle) => *self.worker.lock() = Some(handle),
            Err(e) => {
                log::error!("[HB] writer worker spawn failed: {}", e);
                self.inner.active.store(false, Ordering::Release);
            }
        }
    }

    /// Serialize and transmit a heartbeat to the configured destination.
    /// Returns the number of bytes sent.
    pub fn send(&self, msg: &Heartbeat) -> io::Result<usize> {
        self.inner.send_to(msg, self.inner.destination)
    }

    /// Serialize and transmit a heartbeat to an explicit peer.
    pub fn send_to(&self, msg: &Heartbeat, peer: SocketAddr) -> io::Result<usize> {
        self.inner.send_to(msg, peer)
    }

    /// Configured emission period.
    pub fn period(&self) -> Duration {
        self.inner.period
    }

    /// Heartbeats emitted so far.
    pub fn heartbeat_count(&self) -> u32 {
        self.inner.msg.lock().count
    }

    /// Source address the writer is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.socket.local_addr()
    }

    /// Request termination and wait for the worker to return.
    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        self.inner.active.store(false, Ordering::Release);
        self.join();
    }

    /// Wait for the emission worker to return.
    pub fn join(&self) {
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LinkWriter {
    fn drop(&mut self) {
        self.stop();
    }
}

impl WriterInner {
    fn send_to(&self, msg: &Heartbeat, peer: SocketAddr) -> io::Result<usize> {
        let buf = msg
            .encode()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        self.socket.send_to(buf.as_bytes(), peer)
    }

    /// Emission loop with offset-budget drift compensation.
    fn schedule_heartbeat(&self) {
        let period = self.period;
        let period_ns = period.as_nanos() as i64;

        let mut timestamp = Instant::now();
        let mut start = timestamp - period;
        let mut offset_budget: i64 = 0;

        while self.active.load(Ordering::Acquire) {
            let msg = {
                let mut msg = self.msg.lock();
                msg.update(self.epoch.elapsed().as_nanos() as u64);
                *msg
            };

            if let Err(e) = self.send_to(&msg, self.destination) {
                // Non-fatal: skip this tick, the next one continues.
                log::warn!("[HB] send failed dst={}: {}", self.destination, e);
            }

            // Accumulate the deviation of the last cycle into the budget;
            // the next deadline is pulled in (or pushed out) by it.
            offset_budget += (timestamp - start).as_nanos() as i64 - period_ns;
            start = timestamp;

            let target_ns = period_ns - offset_budget;
            loop {
                timestamp = Instant::now();
                let elapsed_ns = (timestamp - start).as_nanos() as i64;
                if elapsed_ns >= target_ns || !self.active.load(Ordering::Acquire) {
                    break;
                }

                if period < self.spin_threshold {
                    std::hint::spin_loop();
                } else {
                    let remaining = Duration::from_nanos((target_ns - elapsed_ns) as u64);
                    if remaining > SLEEP_SPIN_MARGIN {
                        std::thread::sleep(remaining - SLEEP_SPIN_MARGIN);
                    } else {
                        std::hint::spin_loop();
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MsgBuffer;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn test_zero_period_rejected() {
        let config = WriterConfig::unicast(loopback(), loopback(), Duration::ZERO);
        match LinkWriter::new(NodeId::from_suffix(1), config) {
            Err(WriterError::ZeroPeriod) => {}
            other => panic!("expected ZeroPeriod, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_send_returns_wire_length() {
        let rx = transport::bind_udp(loopback()).unwrap();
        let config = WriterConfig::unicast(
            loopback(),
            rx.local_addr().unwrap(),
            Duration::from_millis(5),
        );
        let writer = LinkWriter::new(NodeId::from_suffix(1), config).unwrap();

        let mut hb = Heartbeat::new(NodeId::from_suffix(1));
        hb.update(42);
        let sent = writer.send(&hb).unwrap();
        assert_eq!(sent, Heartbeat::WIRE_LEN);

        let mut buf = [0u8; 64];
        let (n, _) = rx.recv_from(&mut buf).unwrap();
        let decoded = Heartbeat::decode(&mut MsgBuffer::from_wire(&buf[..n])).unwrap();
        assert_eq!(decoded, hb);
    }

    #[test]
    fn test_counter_strictly_increasing_across_ticks() {
        let rx = transport::bind_udp(loopback()).unwrap();
        let config = WriterConfig::unicast(
            loopback(),
            rx.local_addr().unwrap(),
            Duration::from_millis(2),
        );
        let writer = LinkWriter::new(NodeId::from_suffix(3), config).unwrap();
        writer.run();

        let mut buf = [0u8; 64];
        let mut last = None;
        for _ in 0..5 {
            let (n, _) = rx.recv_from(&mut buf).unwrap();
            let hb = Heartbeat::decode(&mut MsgBuffer::from_wire(&buf[..n])).unwrap();
            if let Some(prev) = last {
                assert!(hb.count > prev, "count {} not above {}", hb.count, prev);
            }
            last = Some(hb.count);
        }

        writer.stop();
        assert!(writer.heartbeat_count() >= 5);
    }

    #[test]
    fn test_run_is_idempotent_and_stop_latches() {
        let rx = transport::bind_udp(loopback()).unwrap();
        let config = WriterConfig::unicast(
            loopback(),
            rx.local_addr().unwrap(),
            Duration::from_millis(2),
        );
        let writer = LinkWriter::new(NodeId::from_suffix(4), config).unwrap();
        writer.run();
        writer.run();

        writer.stop();
        let count = writer.heartbeat_count();

        // A stopped writer may not be restarted.
        writer.run();
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(writer.heartbeat_count(), count);
    }

    #[test]
    fn test_long_run_cadence_matches_period() {
        let rx = transport::bind_udp(loopback()).unwrap();
        let period = Duration::from_millis(5);
        let config = WriterConfig::unicast(loopback(), rx.local_addr().unwrap(), period);
        let writer = LinkWriter::new(NodeId::from_suffix(5), config).unwrap();

        writer.run();
        std::thread::sleep(Duration::from_millis(200));
        writer.stop();

        // 200 ms / 5 ms = 40 nominal ticks; allow wide scheduling margins.
        let count = u64::from(writer.heartbeat_count());
        assert!(count >= 20, "only {} heartbeats in 200ms", count);
        assert!(count <= 80, "{} heartbeats in 200ms", count);
    }
}
