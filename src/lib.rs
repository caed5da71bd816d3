// Copyright (c) 2024-present, flow-core contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A hierarchical per-flow classification tree, paired with a stateful
//! forward/reverse NAT element built on top of it.
//!
//! ##### About
//!
//! The classification tree (see [`ClassificationTree`]) descends a chain
//! of [`Level`] extractors, materializing interior nodes and leaves on
//! demand from a template so a flow's storage is only ever paid for once
//! it is actually seen. Node storage picks an array, an open-addressed
//! hash table, or a fixed two/three-way branch depending on how wide the
//! level's key space is.
//!
//! [`ForwardNat`] and [`ReverseNat`] each classify traffic with their own
//! tree (5-tuple keyed outbound, destination-port keyed inbound), sharing
//! one [`NatState`]: a port allocator and a table the reverse side
//! consults once per flow to recover what the forward side rewrote.
//!
//! # Example usage
//!
//! ```
//! use std::net::Ipv4Addr;
//! use flow_core::config::NatPairConfig;
//! use flow_core::level::{FlowLevelKind, Level};
//! use flow_core::tree::TreeBuilder;
//!
//! let forward_tree = TreeBuilder::new()
//!     .level(Level::new(FlowLevelKind::Generic32 { offset: 12, mask: u32::MAX }, true, true))
//!     .level(Level::new(FlowLevelKind::Generic16 { offset: 20, mask: u16::MAX }, true, true));
//! let reverse_tree = TreeBuilder::new()
//!     .level(Level::new(FlowLevelKind::Generic16 { offset: 22, mask: u16::MAX }, true, true));
//!
//! let (forward, reverse) = NatPairConfig::new(Ipv4Addr::new(203, 0, 113, 1))
//!     .build(forward_tree, reverse_tree)?;
//! # let _ = (forward, reverse);
//! # Ok::<(), flow_core::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod fcb;
pub mod ids;
pub mod level;
pub mod metrics;
pub mod nat;
pub mod node;
pub mod node_data;
pub mod packet;
pub mod port;
pub mod tree;
pub mod worker;

pub use config::NatPairConfig;
pub use error::{Error, Result};
pub use metrics::Metrics;
pub use nat::{ForwardNat, ForwardNatConfig, NatState, ReverseNat};
pub use packet::{Packet, Protocol, TcpFlags};
pub use tree::{ClassificationTree, TreeBuilder};
