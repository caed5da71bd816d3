// Copyright (c) 2024-present, flow-core contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Flow Control Blocks and the pool that owns them.
//!
//! An arena of fixed-size leaf slots with a free list, so a closed flow's
//! slot is reused by the next one materialized rather than reallocated.
//! The payload type `T` fixes the FCB's size at pool construction; there's
//! no variable-width blob to size separately.

use std::sync::Arc;

use crate::ids::{FcbId, NodeId};
use crate::node_data::FlowNodeData;

/// Invoked when a flow is closed, to let the application finalize the
/// payload (e.g. release any resources the element itself doesn't know
/// about) before the FCB returns to the free list.
pub type ReleaseFn<T> = Arc<dyn Fn(&mut T) + Send + Sync>;

/// A leaf: the payload plus the bookkeeping every FCB carries.
pub struct FlowControlBlock<T> {
    /// The key that indexed this leaf from its parent (`node_data[0]`).
    pub node_data0: FlowNodeData,

    /// Back-reference to the parent node, for O(depth) reverse match.
    pub release_ptr: NodeId,

    /// Application state.
    pub payload: T,
}

struct Slot<T> {
    fcb: FlowControlBlock<T>,
    live: bool,
}

/// A bump allocator over a free list of fixed-size leaf blocks.
pub struct Pool<T: Clone> {
    slots: Vec<Slot<T>>,
    free: Vec<FcbId>,
    template: T,
    release_fnt: ReleaseFn<T>,
}

impl<T: Clone> Pool<T> {
    /// `template` is the default payload dynamically materialized leaves
    /// are copied from. `release_fnt` is the callback every leaf created
    /// dynamically inherits.
    #[must_use]
    pub fn new(template: T, release_fnt: ReleaseFn<T>) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            template,
            release_fnt,
        }
    }

    /// Duplicate the default leaf template into a fresh FCB indexed by
    /// `node_data0` under `parent`.
    pub fn allocate(&mut self, node_data0: FlowNodeData, parent: NodeId) -> FcbId {
        let fcb = FlowControlBlock {
            node_data0,
            release_ptr: parent,
            payload: self.template.clone(),
        };

        if let Some(id) = self.free.pop() {
            self.slots[id.0] = Slot { fcb, live: true };
            id
        } else {
            let id = FcbId(self.slots.len());
            self.slots.push(Slot { fcb, live: true });
            id
        }
    }

    /// Clone an existing leaf's full payload into a new slot under a new
    /// parent and key, as opposed to [`Pool::allocate`] which always copies
    /// from the pool's template. Used when a node subtree is duplicated
    /// recursively and its leaves need to come along.
    pub fn duplicate(&mut self, id: FcbId, node_data0: FlowNodeData, release_ptr: NodeId) -> FcbId {
        let payload = self.get(id).payload.clone();
        let fcb = FlowControlBlock {
            node_data0,
            release_ptr,
            payload,
        };
        if let Some(new_id) = self.free.pop() {
            self.slots[new_id.0] = Slot { fcb, live: true };
            new_id
        } else {
            let new_id = FcbId(self.slots.len());
            self.slots.push(Slot { fcb, live: true });
            new_id
        }
    }

    #[must_use]
    pub fn get(&self, id: FcbId) -> &FlowControlBlock<T> {
        debug_assert!(self.slots[id.0].live, "use of a freed FCB id");
        &self.slots[id.0].fcb
    }

    pub fn get_mut(&mut self, id: FcbId) -> &mut FlowControlBlock<T> {
        debug_assert!(self.slots[id.0].live, "use of a freed FCB id");
        &mut self.slots[id.0].fcb
    }

    /// Invoke the release callback and return this leaf to the free list.
    pub fn free(&mut self, id: FcbId) {
        let slot = &mut self.slots[id.0];
        if !slot.live {
            return;
        }
        (self.release_fnt)(&mut slot.fcb.payload);
        slot.live = false;
        self.free.push(id);
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn allocate_copies_template_and_free_invokes_callback() {
        let released = Arc::new(AtomicUsize::new(0));
        let released_clone = Arc::clone(&released);
        let release_fnt: ReleaseFn<u32> = Arc::new(move |payload| {
            *payload = 0;
            released_clone.fetch_add(1, Ordering::SeqCst);
        });
        let mut pool = Pool::new(42u32, release_fnt);

        let id = pool.allocate(FlowNodeData::from_u32(7), NodeId(0));
        assert_eq!(pool.get(id).payload, 42);
        assert_eq!(pool.live_count(), 1);

        pool.free(id);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(pool.live_count(), 0);
    }

    #[test]
    fn freed_slots_are_reused() {
        let release_fnt: ReleaseFn<u32> = Arc::new(|_| {});
        let mut pool = Pool::new(0u32, release_fnt);
        let a = pool.allocate(FlowNodeData::from_u32(1), NodeId(0));
        pool.free(a);
        let b = pool.allocate(FlowNodeData::from_u32(2), NodeId(0));
        assert_eq!(a, b);
    }
}
