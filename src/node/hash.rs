// Copyright (c) 2024-present, flow-core contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::sync::Arc;

use log::{debug, warn};

use super::{IsReleased, NodeStorage};
use crate::ids::{Child, FlowNodePtr};
use crate::node_data::FlowNodeData;

/// Sizes this storage progresses through before falling back to doubling.
const HASH_SIZES: &[usize] = &[128, 256, 512, 1024, 2048, 4096];

const COLLISION_WARN_THRESHOLD: usize = 50;

/// Observer invoked once per table resize, so an owner that tracks metrics
/// can count resizes without this storage depending on any metrics type.
pub type ResizeHook = Arc<dyn Fn() + Send + Sync>;

/// Open-addressed, linear-probing hash storage. Chosen when a level's
/// `max_value > 256`.
pub struct HashStorage {
    slots: Vec<Option<Child>>,
    size_n: usize,
    capacity: usize,
    mask: u32,
    /// ⅓-capacity threshold: above this, opportunistically sweep released
    /// non-leaf children out of the table without growing it.
    highwater: usize,
    /// ½-capacity threshold: above this, double the table.
    max_highwater: usize,
    num: usize,
    is_long: bool,
    resize_hook: ResizeHook,
}

impl std::fmt::Debug for HashStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashStorage")
            .field("capacity", &self.capacity)
            .field("num", &self.num)
            .field("is_long", &self.is_long)
            .finish()
    }
}

impl HashStorage {
    #[must_use]
    pub fn new(is_long: bool) -> Self {
        Self::with_resize_hook(is_long, Arc::new(|| {}))
    }

    #[must_use]
    pub fn with_resize_hook(is_long: bool, resize_hook: ResizeHook) -> Self {
        let capacity = HASH_SIZES[0];
        Self {
            slots: vec![None; capacity],
            size_n: 1,
            capacity,
            mask: (capacity - 1) as u32,
            highwater: capacity / 3,
            max_highwater: capacity / 2,
            num: 0,
            is_long,
            resize_hook,
        }
    }

    fn hash(&self, key: FlowNodeData) -> usize {
        let raw = if self.is_long {
            let v = key.as_u64();
            (v as u32) ^ ((v >> 32) as u32)
        } else {
            key.as_u32()
        };
        let folded = raw
            .wrapping_add(raw >> 8)
            .wrapping_add(raw >> 16)
            .wrapping_add(raw >> 24);
        (folded & self.mask) as usize
    }

    fn next_idx(&self, idx: usize) -> usize {
        (idx + 1) % self.capacity
    }

    /// Resolve the slot index for `key`: first empty slot or the slot
    /// already holding this exact key, probing linearly past collisions.
    ///
    /// Exceeding the collision threshold is logged but does not stop the
    /// probe early: the resize-at-half-load invariant guarantees an empty
    /// slot or the true match is reached within `capacity` steps, and
    /// returning a truncated index here would silently alias this key onto
    /// an unrelated occupant.
    fn resolve_idx(&self, key: FlowNodeData) -> usize {
        let mut idx = self.hash(key);
        let mut probes = 0usize;
        let mut warned = false;
        while let Some(occupant) = self.slots[idx] {
            if occupant.data == key {
                break;
            }
            idx = self.next_idx(idx);
            probes += 1;
            if probes > COLLISION_WARN_THRESHOLD && !warned {
                warn!("flow-core: hash node probe exceeded {COLLISION_WARN_THRESHOLD} collisions");
                warned = true;
            }
        }
        idx
    }

    fn resize(&mut self, is_released: IsReleased<'_>) {
        let old_slots = std::mem::take(&mut self.slots);

        self.capacity = if self.size_n < HASH_SIZES.len() {
            HASH_SIZES[self.size_n]
        } else {
            self.capacity * 2
        };
        self.size_n += 1;
        self.mask = (self.capacity - 1) as u32;
        self.highwater = self.capacity / 3;
        self.max_highwater = self.capacity / 2;
        self.slots = vec![None; self.capacity];
        self.num = 0;

        debug!("flow-core: hash node resized to {} slots", self.capacity);
        (self.resize_hook)();

        for occupant in old_slots.into_iter().flatten() {
            if let FlowNodePtr::Node(id) = occupant.ptr {
                if is_released(id) {
                    // Orphaned: dropped from the table. The arena slot
                    // itself is only freed at tree teardown.
                    continue;
                }
            }
            let idx = self.resolve_idx(occupant.data);
            self.slots[idx] = Some(occupant);
            self.num += 1;
        }
    }

    /// Opportunistically drop released, non-leaf children without growing
    /// the table.
    fn compact_released(&mut self, is_released: IsReleased<'_>) {
        let mut removed = 0usize;
        for slot in &mut self.slots {
            if let Some(occupant) = slot {
                if let FlowNodePtr::Node(id) = occupant.ptr {
                    if is_released(id) {
                        *slot = None;
                        removed += 1;
                    }
                }
            }
        }
        self.num -= removed;
    }
}

impl NodeStorage for HashStorage {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn len(&self) -> usize {
        self.num
    }

    fn find(&mut self, key: FlowNodeData, is_released: IsReleased<'_>) -> Option<Child> {
        let idx = self.resolve_idx(key);
        let occupant = self.slots[idx]?;

        if let FlowNodePtr::Node(id) = occupant.ptr {
            if is_released(id) {
                self.num += 1;
                if self.num > self.max_highwater {
                    self.resize(is_released);
                    // Re-fetch: resize invalidated `idx`.
                    return self.find_after_resize(key);
                }
            }
        }
        Some(occupant)
    }

    fn inc_num(&mut self, is_released: IsReleased<'_>) {
        self.num += 1;
        if self.num > self.max_highwater {
            self.resize(is_released);
        } else if self.num > self.highwater {
            self.compact_released(is_released);
        }
    }

    fn insert(&mut self, key: FlowNodeData, child: Child) {
        let idx = self.resolve_idx(key);
        self.slots[idx] = Some(child);
    }

    fn iterate(&self) -> Vec<Child> {
        self.slots.iter().filter_map(|s| *s).collect()
    }

    fn release_child(&mut self, key: FlowNodeData) {
        let idx = self.resolve_idx(key);
        if self.slots[idx].take().is_some() {
            self.num -= 1;
        }
    }

    fn renew(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.num = 0;
    }

    fn empty_like(&self) -> super::NodeStorageImpl {
        super::NodeStorageImpl::Hash(Self::with_resize_hook(
            self.is_long,
            Arc::clone(&self.resize_hook),
        ))
    }
}

impl HashStorage {
    fn find_after_resize(&self, key: FlowNodeData) -> Option<Child> {
        let idx = self.resolve_idx(key);
        self.slots[idx]
    }
}
