// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded serialization buffer with independent read and write cursors.
//!
//! One [`MsgBuffer`] holds at most one datagram payload. Appends fail when
//! the remaining capacity is insufficient; reads fail when fewer bytes
//! remain than requested. An append that exactly fills the buffer
//! succeeds.

use crate::config::MAX_MSG_LEN;
use std::fmt;

/// Serialization error carrying the cursor position at the failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufError {
    /// Append would exceed the buffer capacity.
    WriteOverflow { offset: usize, requested: usize },
    /// Read would pass the end of the written payload.
    ReadOverflow { offset: usize, requested: usize },
}

impl fmt::Display for BufError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufError::WriteOverflow { offset, requested } => {
                write!(f, "write of {} bytes overflows buffer at offset {}", requested, offset)
            }
            BufError::ReadOverflow { offset, requested } => {
                write!(f, "read of {} bytes passes end of payload at offset {}", requested, offset)
            }
        }
    }
}

impl std::error::Error for BufError {}

pub type BufResult<T> = std::result::Result<T, BufError>;

/// Generate little-endian append methods for primitive types.
macro_rules! impl_add_le {
    ($name:ident, $type:ty) => {
        pub fn $name(&mut self, value: $type) -> BufResult<()> {
            self.add(&value.to_le_bytes())
        }
    };
}

/// Generate little-endian read methods for primitive types.
macro_rules! impl_read_le {
    ($name:ident, $type:ty, $size:expr) => {
        pub fn $name(&mut self) -> BufResult<$type> {
            let mut bytes = [0u8; $size];
            bytes.copy_from_slice(self.read($size)?);
            Ok(<$type>::from_le_bytes(bytes))
        }
    };
}

/// Bounded byte buffer for one serialized message.
///
/// The write cursor tracks the payload length; the read cursor walks the
/// payload independently. Default capacity is [`MAX_MSG_LEN`] (1472
/// octets, one Ethernet UDP MTU payload).
#[derive(Debug, Clone)]
pub struct MsgBuffer {
    data: Vec<u8>,
    capacity: usize,
    read_pos: usize,
}

impl MsgBuffer {
    /// Create an empty buffer with the default datagram capacity.
    pub fn new() -> Self {
        Self::with_capacity(MAX_MSG_LEN)
    }

    /// Create an empty buffer with an explicit capacity.
    ///
    /// A zero capacity is legal but every append and read on it fails.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
            read_pos: 0,
        }
    }

    /// Wrap a received datagram payload for reading.
    pub fn from_wire(payload: &[u8]) -> Self {
        Self {
            data: payload.to_vec(),
            capacity: payload.len().max(MAX_MSG_LEN),
            read_pos: 0,
        }
    }

    /// Append raw bytes. Fails when the remainder is insufficient; an
    /// exactly-filling append succeeds.
    pub fn add(&mut self, bytes: &[u8]) -> BufResult<()> {
        if self.data.len() + bytes.len() > self.capacity {
            return Err(BufError::WriteOverflow {
                offset: self.data.len(),
                requested: bytes.len(),
            });
        }
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    impl_add_le!(add_u8, u8);
    impl_add_le!(add_u32, u32);
    impl_add_le!(add_u64, u64);

    /// Read `len` bytes from the current read position.
    pub fn read(&mut self, len: usize) -> BufResult<&[u8]> {
        if self.read_pos + len > self.data.len() {
            return Err(BufError::ReadOverflow {
                offset: self.read_pos,
                requested: len,
            });
        }
        let slice = &self.data[self.read_pos..self.read_pos + len];
        self.read_pos += len;
        Ok(slice)
    }

    impl_read_le!(read_u8, u8, 1);
    impl_read_le!(read_u32, u32, 4);
    impl_read_le!(read_u64, u64, 8);

    /// Payload written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Length of the written payload.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Unread bytes remaining behind the read cursor.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.read_pos)
    }

    /// Rewind the read cursor to the start of the payload.
    pub fn rewind(&mut self) {
        self.read_pos = 0;
    }

    /// Drop the payload and reset both cursors.
    pub fn clear(&mut self) {
        self.data.clear();
        self.read_pos = 0;
    }
}

impl Default for MsgBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_read_roundtrip() {
        let mut buf = MsgBuffer::new();
        buf.add_u32(0x1234_5678).unwrap();
        buf.add_u64(0xAABB_CCDD_EEFF_0011).unwrap();
        buf.add(&[1, 2, 3]).unwrap();
        assert_eq!(buf.len(), 15);

        assert_eq!(buf.read_u32().unwrap(), 0x1234_5678);
        assert_eq!(buf.read_u64().unwrap(), 0xAABB_CCDD_EEFF_0011);
        assert_eq!(buf.read(3).unwrap(), &[1, 2, 3]);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn test_encoding_is_little_endian() {
        let mut buf = MsgBuffer::new();
        buf.add_u32(0x0102_0304).unwrap();
        assert_eq!(buf.as_bytes(), &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_exactly_filling_write_succeeds() {
        let mut buf = MsgBuffer::with_capacity(4);
        buf.add_u32(7).unwrap();
        assert_eq!(buf.len(), 4);

        let err = buf.add_u8(0).unwrap_err();
        assert_eq!(
            err,
            BufError::WriteOverflow {
                offset: 4,
                requested: 1
            }
        );
    }

    #[test]
    fn test_read_past_payload_fails() {
        let mut buf = MsgBuffer::with_capacity(16);
        buf.add(&[1, 2]).unwrap();
        assert_eq!(buf.read(2).unwrap(), &[1, 2]);

        let err = buf.read(1).unwrap_err();
        assert_eq!(
            err,
            BufError::ReadOverflow {
                offset: 2,
                requested: 1
            }
        );
    }

    #[test]
    fn test_zero_capacity_fails_every_operation() {
        let mut buf = MsgBuffer::with_capacity(0);
        assert!(buf.add_u8(1).is_err());
        assert!(buf.read(1).is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_rewind_and_clear() {
        let mut buf = MsgBuffer::new();
        buf.add_u32(42).unwrap();
        assert_eq!(buf.read_u32().unwrap(), 42);

        buf.rewind();
        assert_eq!(buf.read_u32().unwrap(), 42);

        buf.clear();
        assert!(buf.is_empty());
        assert!(buf.read_u8().is_err());
    }

    #[test]
    fn test_from_wire_reads_received_payload() {
        let mut tx = MsgBuffer::new();
        tx.add_u32(99).unwrap();

        let mut rx = MsgBuffer::from_wire(tx.as_bytes());
        assert_eq!(rx.read_u32().unwrap(), 99);
    }
}
