// Copyright (c) 2024-present, flow-core contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{IsReleased, NodeStorage};
use crate::ids::Child;
use crate::node_data::FlowNodeData;

/// Storage for `Dummy`/zero-width levels: holds no keyed children at all.
/// Lookups always miss, sending the classifier down the node's default
/// path.
#[derive(Debug, Default)]
pub struct DummyStorage;

impl NodeStorage for DummyStorage {
    fn capacity(&self) -> usize {
        0
    }

    fn len(&self) -> usize {
        0
    }

    fn find(&mut self, _key: FlowNodeData, _is_released: IsReleased<'_>) -> Option<Child> {
        None
    }

    fn inc_num(&mut self, _is_released: IsReleased<'_>) {}

    fn insert(&mut self, _key: FlowNodeData, _child: Child) {
        // A Dummy level has max_value == 0: there is no keyed fan-out to
        // install into, only the node's default path is ever consulted.
    }

    fn iterate(&self) -> Vec<Child> {
        Vec::new()
    }

    fn release_child(&mut self, _key: FlowNodeData) {}

    fn renew(&mut self) {}

    fn empty_like(&self) -> super::NodeStorageImpl {
        super::NodeStorageImpl::Dummy(Self::default())
    }
}
