// Copyright (c) 2024-present, flow-core contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The reverse half of the NAT pair: undoes the forward rewrite for
//! inbound traffic addressed to a NAT'd port.

use std::net::Ipv4Addr;
use std::sync::Arc;

use log::debug;

use crate::error::{Error, Result};
use crate::fcb::ReleaseFn;
use crate::ids::FcbId;
use crate::nat::state::NatState;
use crate::nat::teardown::should_tear_down;
use crate::packet::Packet;
use crate::port::PortHandle;
use crate::tree::{ClassificationTree, TreeBuilder};
use crate::worker::WorkerId;

#[derive(Clone, Copy, Debug, Default)]
struct ReverseLeaf {
    resolved: Option<(Ipv4Addr, u16, PortHandle)>,
}

pub struct ReverseNat {
    state: NatState,
    tree: ClassificationTree<ReverseLeaf>,
}

impl ReverseNat {
    #[must_use]
    pub fn new(state: NatState, tree_builder: TreeBuilder) -> Self {
        let release_fnt: ReleaseFn<ReverseLeaf> = Arc::new(|_| {});
        Self {
            state,
            tree: tree_builder.build(ReverseLeaf::default(), release_fnt),
        }
    }

    /// Classify `packet` by destination port, recover the original source
    /// from the forward side's mapping table on first sight, then rewrite
    /// the destination back to it. Detects TCP teardown the same way the
    /// forward side does and releases the shared port.
    ///
    /// Placed so the teardown check always runs, unlike a version that
    /// returns before reaching it.
    pub fn on_packet(&mut self, packet: &mut dyn Packet, worker: WorkerId) -> Result<()> {
        let dst_port = packet.dst_port();
        let id = self.tree.match_packet(packet, worker)?;

        let (ip, port, port_handle) = match self.tree.leaf(id).resolved {
            Some(resolved) => resolved,
            None => {
                let entry = self
                    .state
                    .take_reverse(dst_port)
                    .ok_or(Error::ReverseLookupMiss)?;
                let resolved = (entry.original_ip, entry.original_port, entry.port_handle);
                self.tree.leaf_mut(id).resolved = Some(resolved);
                debug!("flow-core: reverse NAT resolved port {dst_port}");
                resolved
            }
        };

        packet.rewrite_ipport(ip, port, true);
        packet.set_dst_annotation(ip);

        if should_tear_down(packet) {
            self.state.release_port(port_handle);
            self.tree.close_flow(id);
            debug!("flow-core: reverse NAT closed flow on teardown");
        }

        Ok(())
    }

    #[must_use]
    pub fn reverse_match(&self, id: FcbId, packet: &dyn Packet, worker: WorkerId) -> bool {
        self.tree.reverse_match(id, packet, worker)
    }
}
