// Copyright (c) 2024-present, flow-core contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Top-level configuration for wiring a forward/reverse NAT pair together.
//!
//! The classification tree each direction walks is deployment-specific (a
//! 5-tuple chain for forward traffic, a destination-port chain for
//! reverse), so it is supplied by the caller as a [`TreeBuilder`]; this
//! module only owns the parts a pair of elements must share: the port
//! allocator and the reverse mapping table.

use std::net::Ipv4Addr;
use std::ops::Range;
use std::sync::Arc;

use crate::error::Result;
use crate::nat::{ForwardNat, ForwardNatConfig, NatState, ReverseNat};
use crate::port::PortAllocator;
use crate::tree::TreeBuilder;
use crate::worker::TouchingWorkers;

/// Port range and per-worker partitioning for the shared port allocator.
#[derive(Clone, Debug)]
pub struct PortAllocatorConfig {
    /// Number of workers the partition is split across.
    pub worker_count: u8,

    /// The full ephemeral range to divide; the conventional Linux
    /// ephemeral range by default.
    pub range: Range<u16>,
}

impl Default for PortAllocatorConfig {
    fn default() -> Self {
        Self {
            worker_count: 1,
            range: 1024..65536,
        }
    }
}

/// Everything needed to construct one forward/reverse NAT element pair
/// sharing a single port allocator and reverse mapping table.
pub struct NatPairConfig {
    /// Address outbound traffic is masqueraded behind.
    pub sip: Ipv4Addr,
    pub ports: PortAllocatorConfig,
    /// How many distinct workers may call into either element of the
    /// pair; see [`NatState::new`].
    pub touching_workers: TouchingWorkers,
}

impl NatPairConfig {
    #[must_use]
    pub fn new(sip: Ipv4Addr) -> Self {
        Self {
            sip,
            ports: PortAllocatorConfig::default(),
            touching_workers: 1,
        }
    }

    #[must_use]
    pub fn ports(mut self, ports: PortAllocatorConfig) -> Self {
        self.ports = ports;
        self
    }

    #[must_use]
    pub fn touching_workers(mut self, touching_workers: TouchingWorkers) -> Self {
        self.touching_workers = touching_workers;
        self
    }

    /// Construct the shared state, then the forward and reverse elements
    /// around it. `forward_tree` and `reverse_tree` describe each
    /// direction's own classification chain.
    pub fn build(
        self,
        forward_tree: TreeBuilder,
        reverse_tree: TreeBuilder,
    ) -> Result<(ForwardNat, ReverseNat)> {
        let allocator = PortAllocator::new(self.ports.worker_count, self.ports.range)?;
        let state = NatState::new(allocator, self.touching_workers);

        let forward_state = state.clone();
        let forward_tree =
            forward_tree.on_hash_resize(Arc::new(move || forward_state.record_hash_resize()));
        let reverse_state = state.clone();
        let reverse_tree =
            reverse_tree.on_hash_resize(Arc::new(move || reverse_state.record_hash_resize()));

        let forward = ForwardNat::new(
            ForwardNatConfig { sip: self.sip },
            state.clone(),
            forward_tree,
        );
        let reverse = ReverseNat::new(state, reverse_tree);

        Ok((forward, reverse))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::{FlowLevelKind, Level};

    fn dest_port_tree() -> TreeBuilder {
        TreeBuilder::new().level(Level::new(
            FlowLevelKind::Generic16 {
                offset: 10,
                mask: u16::MAX,
            },
            true,
            true,
        ))
    }

    fn five_tuple_tree() -> TreeBuilder {
        TreeBuilder::new()
            .level(Level::new(
                FlowLevelKind::Generic32 {
                    offset: 0,
                    mask: u32::MAX,
                },
                true,
                true,
            ))
            .level(Level::new(
                FlowLevelKind::Generic16 {
                    offset: 10,
                    mask: u16::MAX,
                },
                true,
                true,
            ))
    }

    #[test]
    fn build_wires_a_forward_reverse_pair_sharing_one_state() {
        let config = NatPairConfig::new(Ipv4Addr::new(203, 0, 113, 1));
        assert!(config.build(five_tuple_tree(), dest_port_tree()).is_ok());
    }

    #[test]
    fn zero_workers_fails_at_build_time() {
        let config = NatPairConfig::new(Ipv4Addr::new(203, 0, 113, 1)).ports(PortAllocatorConfig {
            worker_count: 0,
            range: 1024..65536,
        });
        assert!(config.build(five_tuple_tree(), dest_port_tree()).is_err());
    }
}
