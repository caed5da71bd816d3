// Copyright (c) 2024-present, flow-core contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{IsReleased, NodeStorage};
use crate::ids::Child;
use crate::node_data::FlowNodeData;

/// Fixed one-slot storage for a level optimized down to a single preset
/// key. A lookup that matches neither preset key falls back to the node's
/// default path, same as every other variant returning `None`.
#[derive(Debug, Default)]
pub struct TwoCaseStorage {
    slots: [Option<Child>; 1],
}

impl NodeStorage for TwoCaseStorage {
    fn capacity(&self) -> usize {
        1
    }

    fn len(&self) -> usize {
        usize::from(self.slots[0].is_some())
    }

    fn find(&mut self, key: FlowNodeData, _is_released: IsReleased<'_>) -> Option<Child> {
        self.slots[0].filter(|c| c.data == key)
    }

    fn inc_num(&mut self, _is_released: IsReleased<'_>) {}

    fn insert(&mut self, _key: FlowNodeData, child: Child) {
        self.slots[0] = Some(child);
    }

    fn iterate(&self) -> Vec<Child> {
        self.slots.iter().filter_map(|s| *s).collect()
    }

    fn release_child(&mut self, key: FlowNodeData) {
        if self.slots[0].is_some_and(|c| c.data == key) {
            self.slots[0] = None;
        }
    }

    fn renew(&mut self) {
        self.slots[0] = None;
    }

    fn empty_like(&self) -> super::NodeStorageImpl {
        super::NodeStorageImpl::TwoCase(Self::default())
    }
}

/// Fixed two-slot storage for a level optimized down to two explicit
/// branches plus the default path.
#[derive(Debug, Default)]
pub struct ThreeCaseStorage {
    slots: [Option<Child>; 2],
}

impl NodeStorage for ThreeCaseStorage {
    fn capacity(&self) -> usize {
        2
    }

    fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    fn find(&mut self, key: FlowNodeData, _is_released: IsReleased<'_>) -> Option<Child> {
        self.slots.iter().flatten().find(|c| c.data == key).copied()
    }

    fn inc_num(&mut self, _is_released: IsReleased<'_>) {}

    fn insert(&mut self, key: FlowNodeData, child: Child) {
        if let Some(slot) = self.slots.iter_mut().find(|s| {
            s.map_or(true, |c| c.data == key)
        }) {
            *slot = Some(child);
        }
    }

    fn iterate(&self) -> Vec<Child> {
        self.slots.iter().filter_map(|s| *s).collect()
    }

    fn release_child(&mut self, key: FlowNodeData) {
        for slot in &mut self.slots {
            if slot.is_some_and(|c| c.data == key) {
                *slot = None;
            }
        }
    }

    fn renew(&mut self) {
        self.slots = [None, None];
    }

    fn empty_like(&self) -> super::NodeStorageImpl {
        super::NodeStorageImpl::ThreeCase(Self::default())
    }
}
