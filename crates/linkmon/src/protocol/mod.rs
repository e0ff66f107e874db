// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire protocol: bounded serialization buffer and message codecs.
//!
//! All multi-byte fields are encoded canonical little-endian with fixed
//! widths, so datagrams are portable across architectures.

pub mod buffer;
pub mod messages;

pub use buffer::{BufError, BufResult, MsgBuffer};
pub use messages::{Heartbeat, LinkStatus, StatusList};
