// Copyright (c) 2024-present, flow-core contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{IsReleased, NodeStorage};
use crate::ids::Child;
use crate::node_data::FlowNodeData;

/// Dense, preallocated storage indexed directly by key. Chosen when a
/// level's `max_value <= 256`.
#[derive(Debug)]
pub struct ArrayStorage {
    slots: Vec<Option<Child>>,
    num: usize,
}

impl ArrayStorage {
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            slots: vec![None; size],
            num: 0,
        }
    }
}

impl NodeStorage for ArrayStorage {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn len(&self) -> usize {
        self.num
    }

    fn find(&mut self, key: FlowNodeData, _is_released: IsReleased<'_>) -> Option<Child> {
        self.slots[key.as_u32() as usize]
    }

    fn inc_num(&mut self, _is_released: IsReleased<'_>) {
        self.num += 1;
    }

    fn insert(&mut self, key: FlowNodeData, child: Child) {
        self.slots[key.as_u32() as usize] = Some(child);
    }

    fn iterate(&self) -> Vec<Child> {
        self.slots.iter().filter_map(|s| *s).collect()
    }

    fn release_child(&mut self, key: FlowNodeData) {
        let idx = key.as_u32() as usize;
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
        super::NodeStorageImpl::Array(Self::new(self.slots.len()))
    }
}
