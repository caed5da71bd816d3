// Copyright (c) 2024-present, flow-core contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The forward half of the NAT pair: masquerades outbound traffic behind
//! one shared address and a per-flow ephemeral port.

use std::net::Ipv4Addr;
use std::sync::Arc;

use log::debug;

use crate::error::Result;
use crate::fcb::ReleaseFn;
use crate::nat::state::{NatState, ReverseEntry};
use crate::nat::teardown::should_tear_down;
use crate::packet::Packet;
use crate::tree::{ClassificationTree, TreeBuilder};
use crate::worker::WorkerId;

/// Configuration for the forward NAT element.
pub struct ForwardNatConfig {
    /// The shared address outbound traffic is rewritten to appear from.
    pub sip: Ipv4Addr,
}

/// Per-5-tuple state: `None` until this flow's first packet claims a port.
#[derive(Clone, Copy, Debug, Default)]
struct ForwardLeaf {
    port: Option<crate::port::PortHandle>,
}

pub struct ForwardNat {
    sip: Ipv4Addr,
    state: NatState,
    tree: ClassificationTree<ForwardLeaf>,
}

impl ForwardNat {
    #[must_use]
    pub fn new(config: ForwardNatConfig, state: NatState, tree_builder: TreeBuilder) -> Self {
        let release_fnt: ReleaseFn<ForwardLeaf> = Arc::new(|_| {});
        Self {
            sip: config.sip,
            state,
            tree: tree_builder.build(ForwardLeaf::default(), release_fnt),
        }
    }

    /// Classify `packet`, assigning it a fresh ephemeral port on first
    /// sight, then rewrite its source to `sip`:port. Detects TCP teardown
    /// and releases the flow's port and tree leaf when it fires.
    pub fn on_packet(&mut self, packet: &mut dyn Packet, worker: WorkerId) -> Result<()> {
        let original_ip = packet.src_ip();
        let original_port = packet.src_port();

        let id = self.tree.match_packet(packet, worker)?;

        let port_handle = match self.tree.leaf(id).port {
            Some(handle) => handle,
            None => {
                let handle = self.state.pick_port(worker)?;
                self.tree.leaf_mut(id).port = Some(handle);
                self.state.register_reverse(
                    self.state.port_value(handle),
                    ReverseEntry {
                        original_ip,
                        original_port,
                        port_handle: handle,
                    },
                );
                self.state.record_flow_admitted();
                debug!(
                    "flow-core: forward NAT opened flow on port {}",
                    self.state.port_value(handle)
                );
                handle
            }
        };

        packet.rewrite_ipport(self.sip, self.state.port_value(port_handle), false);

        if should_tear_down(packet) {
            self.state.release_port(port_handle);
            self.tree.close_flow(id);
            debug!("flow-core: forward NAT closed flow on teardown");
        }

        Ok(())
    }

    #[must_use]
    pub fn reverse_match(
        &self,
        id: crate::ids::FcbId,
        packet: &dyn Packet,
        worker: WorkerId,
    ) -> bool {
        self.tree.reverse_match(id, packet, worker)
    }
}
