// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Heartbeat and link status message codecs.
//!
//! # Heartbeat wire format (28 bytes, little-endian)
//!
//! ```text
//! offset  size  field
//! 0       16    sender NodeId       (raw bytes)
//! 16      8     timestamp           (monotonic nanoseconds, sender clock)
//! 24      4     hb_count            (u32, wraps)
//! ```
//!
//! # Link status wire format (variable, little-endian)
//!
//! ```text
//! offset  size  field
//! 0       16    sender NodeId
//! 16      8     wall timestamp      (nanoseconds since UNIX epoch)
//! 24      4     count               (u32 sequence, duplicate detection)
//! 28      4     status list length  (u32, number of entries N)
//! ...     per entry: 4 bytes key length L, L bytes key, 1 byte bool
//! ```
//!
//! The status list preserves sender insertion order; the first entry
//! defines the bootstrap link on the client side.

use super::buffer::{BufResult, MsgBuffer};
use crate::core::NodeId;
use std::time::{SystemTime, UNIX_EPOCH};

/// Periodic liveness probe sent by a link writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    /// Identifier of the sending node. Set at construction, never changes.
    pub sender: NodeId,
    /// Monotonic send timestamp in nanoseconds (sender clock).
    pub timestamp: u64,
    /// Strictly increasing counter; wraps only at 32 bits.
    pub count: u32,
}

impl Heartbeat {
    /// Serialized size in bytes.
    pub const WIRE_LEN: usize = NodeId::SIZE + 8 + 4;

    /// Create a heartbeat with zeroed timestamp and counter.
    pub fn new(sender: NodeId) -> Self {
        Self {
            sender,
            timestamp: 0,
            count: 0,
        }
    }

    /// Stamp the message for the next emission: sets the timestamp and
    /// increments the counter.
    pub fn update(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
        self.count = self.count.wrapping_add(1);
    }

    /// Serialize into the given buffer.
    pub fn encode_into(&self, buf: &mut MsgBuffer) -> BufResult<()> {
        buf.add(self.sender.as_bytes())?;
        buf.add_u64(self.timestamp)?;
        buf.add_u32(self.count)?;
        Ok(())
    }

    /// Serialize into a fresh datagram buffer.
    pub fn encode(&self) -> BufResult<MsgBuffer> {
        let mut buf = MsgBuffer::new();
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Deserialize from the buffer's read cursor.
    pub fn decode(buf: &mut MsgBuffer) -> BufResult<Self> {
        let mut id = [0u8; NodeId::SIZE];
        id.copy_from_slice(buf.read(NodeId::SIZE)?);
        let timestamp = buf.read_u64()?;
        let count = buf.read_u32()?;
        Ok(Self {
            sender: NodeId::new(id),
            timestamp,
            count,
        })
    }
}

/// Per-link status list, ordered as sent.
pub type StatusList = Vec<(String, bool)>;

/// Full multi-link status vector pushed by the mobility server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStatus {
    /// Identifier of the sending server.
    pub sender: NodeId,
    /// Wall-clock timestamp, nanoseconds since the UNIX epoch.
    pub timestamp: u64,
    /// Sequence counter for duplicate detection on redundant paths.
    pub count: u32,
    /// Ordered `(link_key, up)` entries.
    pub status: StatusList,
}

impl LinkStatus {
    /// Build a status message stamped with the current wall-clock time.
    pub fn new(sender: NodeId, count: u32, status: StatusList) -> Self {
        Self {
            sender,
            timestamp: wall_clock_ns(),
            count,
            status,
        }
    }

    /// Serialize into the given buffer.
    ///
    /// Fails with a write overflow when the status list does not fit in
    /// one datagram; the caller logs and discards the message.
    pub fn encode_into(&self, buf: &mut MsgBuffer) -> BufResult<()> {
        buf.add(self.sender.as_bytes())?;
        buf.add_u64(self.timestamp)?;
        buf.add_u32(self.count)?;
        buf.add_u32(self.status.len() as u32)?;
        for (key, up) in &self.status {
            buf.add_u32(key.len() as u32)?;
            buf.add(key.as_bytes())?;
            buf.add_u8(u8::from(*up))?;
        }
        Ok(())
    }

    /// Serialize into a fresh datagram buffer.
    pub fn encode(&self) -> BufResult<MsgBuffer> {
        let mut buf = MsgBuffer::new();
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Deserialize from the buffer's read cursor.
    pub fn decode(buf: &mut MsgBuffer) -> BufResult<Self> {
        let mut id = [0u8; NodeId::SIZE];
        id.copy_from_slice(buf.read(NodeId::SIZE)?);
        let timestamp = buf.read_u64()?;
        let count = buf.read_u32()?;

        let entries = buf.read_u32()?;
        // Length comes off the wire: do not preallocate from it.
        let mut status = StatusList::new();
        for _ in 0..entries {
            let key_len = buf.read_u32()? as usize;
            let key = String::from_utf8_lossy(buf.read(key_len)?).into_owned();
            let up = buf.read_u8()? != 0;
            status.push((key, up));
        }

        Ok(Self {
            sender: NodeId::new(id),
            timestamp,
            count,
            status,
        })
    }
}

/// Current wall-clock time as nanoseconds since the UNIX epoch.
fn wall_clock_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_roundtrip_bit_for_bit() {
        let mut hb = Heartbeat::new(NodeId::from_suffix(7));
        hb.update(123_456_789);
        hb.update(987_654_321);

        let mut buf = hb.encode().unwrap();
        assert_eq!(buf.len(), Heartbeat::WIRE_LEN);

        let decoded = Heartbeat::decode(&mut buf).unwrap();
        assert_eq!(decoded, hb);
        assert_eq!(decoded.count, 2);
        assert_eq!(decoded.timestamp, 987_654_321);
    }

    #[test]
    fn test_heartbeat_counter_wraps_at_32_bits() {
        let mut hb = Heartbeat::new(NodeId::from_suffix(1));
        hb.count = u32::MAX;
        hb.update(1);
        assert_eq!(hb.count, 0);
    }

    #[test]
    fn test_heartbeat_decode_truncated_fails() {
        let hb = Heartbeat::new(NodeId::from_suffix(2));
        let buf = hb.encode().unwrap();

        let mut short = MsgBuffer::from_wire(&buf.as_bytes()[..Heartbeat::WIRE_LEN - 1]);
        assert!(Heartbeat::decode(&mut short).is_err());
    }

    #[test]
    fn test_status_roundtrip() {
        let status = vec![
            ("192.168.2.102".to_string(), true),
            ("192.168.2.103".to_string(), false),
        ];
        let msg = LinkStatus::new(NodeId::from_suffix(9), 41, status);

        let mut buf = msg.encode().unwrap();
        let decoded = LinkStatus::decode(&mut buf).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.status[0].0, "192.168.2.102");
        assert!(decoded.status[0].1);
        assert!(!decoded.status[1].1);
    }

    #[test]
    fn test_status_preserves_insertion_order() {
        let status = vec![
            ("zebra".to_string(), true),
            ("alpha".to_string(), true),
            ("mango".to_string(), false),
        ];
        let msg = LinkStatus::new(NodeId::DEFAULT, 1, status.clone());

        let mut buf = msg.encode().unwrap();
        let decoded = LinkStatus::decode(&mut buf).unwrap();
        assert_eq!(decoded.status, status);
    }

    #[test]
    fn test_status_empty_list() {
        let msg = LinkStatus::new(NodeId::DEFAULT, 0, Vec::new());
        let mut buf = msg.encode().unwrap();
        assert_eq!(buf.len(), NodeId::SIZE + 8 + 4 + 4);

        let decoded = LinkStatus::decode(&mut buf).unwrap();
        assert!(decoded.status.is_empty());
    }

    #[test]
    fn test_status_decode_bogus_key_length_fails() {
        let msg = LinkStatus::new(NodeId::DEFAULT, 1, vec![("a".into(), true)]);
        let buf = msg.encode().unwrap();

        // Corrupt the first key length field (offset 32) to a huge value.
        let mut bytes = buf.as_bytes().to_vec();
        bytes[32..36].copy_from_slice(&u32::MAX.to_le_bytes());
        let mut corrupted = MsgBuffer::from_wire(&bytes);
        assert!(LinkStatus::decode(&mut corrupted).is_err());
    }

    #[test]
    fn test_status_overflow_surfaces_as_encode_error() {
        // A key larger than one datagram cannot be serialized.
        let status = vec![("x".repeat(2000), true)];
        let msg = LinkStatus::new(NodeId::DEFAULT, 1, status);
        assert!(msg.encode().is_err());
    }
}
