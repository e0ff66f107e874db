// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Core building blocks shared by the monitoring and mobility layers.

pub mod node_id;
pub mod shared_map;
pub mod signal;

pub use node_id::NodeId;
pub use shared_map::SharedMap;
pub use signal::ChangeSignal;
