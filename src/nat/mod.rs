// Copyright (c) 2024-present, flow-core contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The NAT element pair: forward masquerades outbound traffic, reverse
//! undoes it for the matching inbound traffic, and both share one port
//! allocator and mapping table.

mod forward;
mod reverse;
mod state;
mod teardown;

pub use forward::{ForwardNat, ForwardNatConfig};
pub use reverse::ReverseNat;
pub use state::NatState;
