// Copyright (c) 2024-present, flow-core contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The Classification Tree: the arena of interior nodes plus the walk that
//! descends it to a leaf.
//!
//! Node storage dispatch lives in [`crate::node`], leaves in
//! [`crate::fcb`]; this module ties the two together into a shared,
//! index-addressed arena.

use std::sync::Arc;

use log::{debug, error};

use crate::error::{Error, Result};
use crate::fcb::{Pool, ReleaseFn};
use crate::ids::{Child, FcbId, FlowNodePtr, NodeId};
use crate::level::Level;
use crate::node::{
    storage_for_max_value, NodeStorage, NodeStorageImpl, ResizeHook, ThreeCaseStorage, TwoCaseStorage,
};
use crate::node_data::FlowNodeData;
use crate::packet::Packet;
use crate::worker::WorkerId;

/// What an interior node falls back to when `find()` comes up empty
/// (the node's default child template).
#[derive(Clone, Copy, Debug)]
pub enum NodeDefault {
    /// No default: an unmatched key is a classification failure.
    None,
    /// Materialize a fresh leaf from the pool's template on every miss
    /// (level is dynamic).
    DynamicLeaf,
    /// Always route to this one leaf; never materializes (level is not
    /// dynamic).
    StaticLeaf(FcbId),
    /// Duplicate this template node on every miss (level is dynamic).
    DynamicNode(NodeId),
    /// Always route directly into this node; never duplicates (level is
    /// not dynamic).
    StaticNode(NodeId),
}

/// An interior node of the classification tree.
pub struct FlowNode {
    pub parent: Option<NodeId>,
    pub level: Arc<Level>,
    pub storage: NodeStorageImpl,
    pub default: NodeDefault,
    /// Set when this node's subtree has been logically torn down but the
    /// arena slot kept for reuse.
    pub released: bool,
    pub child_deletable: bool,
    /// The key by which this node was indexed from its parent. Meaningless
    /// for the root.
    pub data: FlowNodeData,
}

/// A single shared classification tree plus the FCB pool its leaves live
/// in.
///
/// Mutation (`match_packet`) requires `&mut self`. Correctness under
/// concurrent mutation of the tree's shape is not handled here; a tree
/// shared across workers is the caller's to synchronize.
pub struct ClassificationTree<T: Clone> {
    nodes: Vec<FlowNode>,
    pool: Pool<T>,
    root: NodeId,
}

impl<T: Clone> ClassificationTree<T> {
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.pool.live_count()
    }

    pub fn leaf(&self, id: FcbId) -> &T {
        &self.pool.get(id).payload
    }

    pub fn leaf_mut(&mut self, id: FcbId) -> &mut T {
        &mut self.pool.get_mut(id).payload
    }

    /// Walk the tree, materializing dynamic children as needed, until a
    /// leaf is reached.
    pub fn match_packet(&mut self, packet: &dyn Packet, worker: WorkerId) -> Result<FcbId> {
        let mut parent_id = self.root;

        loop {
            let level = Arc::clone(&self.nodes[parent_id.0].level);
            let key = level.get_data(packet, worker);

            let mut storage = std::mem::take(&mut self.nodes[parent_id.0].storage);
            let found = storage.find(key, &|id| self.nodes[id.0].released);
            self.nodes[parent_id.0].storage = storage;

            match found {
                Some(child) => match child.ptr {
                    FlowNodePtr::Leaf(id) => return Ok(id),
                    FlowNodePtr::Node(id) => {
                        if self.nodes[id.0].released {
                            self.renew_node(id);
                        }
                        parent_id = id;
                    }
                },
                None => match self.nodes[parent_id.0].default {
                    NodeDefault::None => {
                        error!("flow-core: packet did not match any node and has no default");
                        return Err(Error::UnclassifiedPacket);
                    }
                    NodeDefault::StaticLeaf(id) => return Ok(id),
                    NodeDefault::StaticNode(id) => parent_id = id,
                    NodeDefault::DynamicLeaf => {
                        let mut storage = std::mem::take(&mut self.nodes[parent_id.0].storage);
                        storage.inc_num(&|id| self.nodes[id.0].released);
                        let leaf_id = self.pool.allocate(key, parent_id);
                        storage.insert(
                            key,
                            Child {
                                ptr: FlowNodePtr::Leaf(leaf_id),
                                data: key,
                            },
                        );
                        self.nodes[parent_id.0].storage = storage;
                        return Ok(leaf_id);
                    }
                    NodeDefault::DynamicNode(template_id) => {
                        let mut storage = std::mem::take(&mut self.nodes[parent_id.0].storage);
                        storage.inc_num(&|id| self.nodes[id.0].released);
                        let new_id = self.duplicate_node(template_id, parent_id, key, false);
                        storage.insert(
                            key,
                            Child {
                                ptr: FlowNodePtr::Node(new_id),
                                data: key,
                            },
                        );
                        self.nodes[parent_id.0].storage = storage;
                        parent_id = new_id;
                    }
                },
            }
        }
    }

    /// Validate that a held leaf still matches `packet` without a full
    /// tree walk, by re-extracting each ancestor's key and comparing it
    /// against the recorded child-data along the path from `fcb_id`'s
    /// `release_ptr` up to the root.
    ///
    /// Deliberately does not consult `released`: a leaf matched this way is
    /// treated as fresh regardless. Leaves here are freed eagerly on close
    /// (no lazy "released leaf" state), so the distinction never arises in
    /// practice.
    #[must_use]
    pub fn reverse_match(&self, fcb_id: FcbId, packet: &dyn Packet, worker: WorkerId) -> bool {
        let fcb = self.pool.get(fcb_id);
        let mut current = fcb.release_ptr;
        let mut expected = fcb.node_data0;

        loop {
            let node = &self.nodes[current.0];
            if node.level.get_data(packet, worker) != expected {
                return false;
            }
            match node.parent {
                None => return true,
                Some(parent) => {
                    expected = node.data;
                    current = parent;
                }
            }
        }
    }

    /// Close a flow: remove its leaf from the parent's storage and return
    /// the FCB to the pool, invoking the release callback.
    pub fn close_flow(&mut self, id: FcbId) {
        let (parent, key) = {
            let fcb = self.pool.get(id);
            (fcb.release_ptr, fcb.node_data0)
        };
        let mut storage = std::mem::take(&mut self.nodes[parent.0].storage);
        storage.release_child(key);
        self.nodes[parent.0].storage = storage;
        self.pool.free(id);
        debug!("flow-core: closed flow (fcb {:?})", id);
    }

    fn renew_node(&mut self, id: NodeId) {
        let mut storage = std::mem::take(&mut self.nodes[id.0].storage);
        storage.renew();
        self.nodes[id.0].storage = storage;
        self.nodes[id.0].released = false;
    }

    /// A copy of `template`: level, default and `child_deletable` carried
    /// over, storage reset to a fresh empty instance of the same variant.
    /// When `recursive`, every existing child is duplicated too (nodes
    /// recurse, leaves are cloned via the pool).
    fn duplicate_node(
        &mut self,
        template: NodeId,
        parent: NodeId,
        data: FlowNodeData,
        recursive: bool,
    ) -> NodeId {
        let (level, default, child_deletable, storage) = {
            let t = &self.nodes[template.0];
            (
                Arc::clone(&t.level),
                t.default,
                t.child_deletable,
                t.storage.empty_like(),
            )
        };

        let new_id = NodeId(self.nodes.len());
        self.nodes.push(FlowNode {
            parent: Some(parent),
            level,
            storage,
            default,
            released: false,
            child_deletable,
            data,
        });

        if recursive {
            let children = self.nodes[template.0].storage.iterate();
            let mut storage = std::mem::take(&mut self.nodes[new_id.0].storage);
            for child in children {
                let new_ptr = match child.ptr {
                    FlowNodePtr::Leaf(leaf_id) => {
                        let duplicated = self.pool.duplicate(leaf_id, child.data, new_id);
                        FlowNodePtr::Leaf(duplicated)
                    }
                    FlowNodePtr::Node(node_id) => {
                        let duplicated = self.duplicate_node(node_id, new_id, child.data, true);
                        FlowNodePtr::Node(duplicated)
                    }
                };
                storage.insert(
                    child.data,
                    Child {
                        ptr: new_ptr,
                        data: child.data,
                    },
                );
            }
            self.nodes[new_id.0].storage = storage;
        }

        new_id
    }
}

/// Builds a linear chain of levels into a [`ClassificationTree`], composing
/// a per-element level sequence into one shared root.
pub struct TreeBuilder {
    levels: Vec<Level>,
    leaf_default: bool,
    branch_leaves: Option<Vec<FlowNodeData>>,
    hash_resize_hook: ResizeHook,
}

impl TreeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            levels: Vec::new(),
            leaf_default: true,
            branch_leaves: None,
            hash_resize_hook: Arc::new(|| {}),
        }
    }

    /// Observe every hash node storage resize in this tree (see
    /// [`crate::metrics::Metrics::hash_resizes`]). Levels that don't end up
    /// as [`crate::node::HashStorage`] never call it.
    #[must_use]
    pub fn on_hash_resize(mut self, hook: ResizeHook) -> Self {
        self.hash_resize_hook = hook;
        self
    }

    #[must_use]
    pub fn level(mut self, level: Level) -> Self {
        self.levels.push(level);
        self
    }

    /// Leave the deepest level without a default: an unmatched key at the
    /// bottom of the chain is a classification failure rather than a
    /// materialized leaf.
    #[must_use]
    pub fn without_leaf_default(mut self) -> Self {
        self.leaf_default = false;
        self
    }

    /// Give the deepest level one or two explicit branch keys, each carved
    /// into the node's own storage ahead of time instead of going through
    /// the level's usual default/materialization path. The storage is sized
    /// exactly to the branch count — [`TwoCaseStorage`] for one key,
    /// [`ThreeCaseStorage`] for two — since the branch set is fixed here at
    /// build time and never grows afterward, unlike the per-flow
    /// materialization other levels do. Keys outside `branches` still fall
    /// through to the level's ordinary default.
    ///
    /// # Panics
    /// Panics if `branches` is empty, has more than two entries, contains a
    /// duplicate key, or the deepest level configured so far is dynamic (a
    /// dynamic default would keep inserting newly-materialized keys into
    /// this fixed-capacity storage once both branch slots are already
    /// taken, silently dropping them).
    #[must_use]
    pub fn branch_leaves(mut self, branches: Vec<FlowNodeData>) -> Self {
        assert!(
            !branches.is_empty() && branches.len() <= 2,
            "branch_leaves supports exactly one or two explicit keys"
        );
        for (i, a) in branches.iter().enumerate() {
            assert!(
                branches[i + 1..].iter().all(|b| b != a),
                "branch_leaves keys must be distinct"
            );
        }
        assert!(
            !self
                .levels
                .last()
                .expect("add a level before calling branch_leaves")
                .is_dynamic(),
            "branch_leaves requires the deepest level to be non-dynamic"
        );
        self.branch_leaves = Some(branches);
        self
    }

    /// Build the tree. `leaf_template` and `release_fnt` seed the FCB pool
    /// leaves not backed by a static default are copied from.
    ///
    /// # Panics
    /// Panics if no levels were configured; an empty chain has no root.
    #[must_use]
    pub fn build<T: Clone>(
        self,
        leaf_template: T,
        release_fnt: ReleaseFn<T>,
    ) -> ClassificationTree<T> {
        assert!(!self.levels.is_empty(), "a tree needs at least one level");
        let depth = self.levels.len();
        let mut pool = Pool::new(leaf_template, release_fnt);
        let mut nodes = Vec::with_capacity(depth);

        for (i, level) in self.levels.iter().enumerate() {
            let storage = storage_for_max_value(
                level.max_value(),
                level.is_long(),
                Arc::clone(&self.hash_resize_hook),
            );
            nodes.push(FlowNode {
                parent: if i == 0 { None } else { Some(NodeId(i - 1)) },
                level: Arc::new(level.clone()),
                storage,
                default: NodeDefault::None,
                released: false,
                child_deletable: level.deletable(),
                data: FlowNodeData::default(),
            });
        }

        for i in 0..depth {
            let dynamic = nodes[i].level.is_dynamic();
            nodes[i].default = if i + 1 < depth {
                if dynamic {
                    NodeDefault::DynamicNode(NodeId(i + 1))
                } else {
                    NodeDefault::StaticNode(NodeId(i + 1))
                }
            } else if !self.leaf_default {
                NodeDefault::None
            } else if dynamic {
                NodeDefault::DynamicLeaf
            } else {
                let id = pool.allocate(FlowNodeData::default(), NodeId(i));
                NodeDefault::StaticLeaf(id)
            };
        }

        if let Some(branches) = self.branch_leaves {
            let last = depth - 1;
            let mut storage = if branches.len() == 1 {
                NodeStorageImpl::TwoCase(TwoCaseStorage::default())
            } else {
                NodeStorageImpl::ThreeCase(ThreeCaseStorage::default())
            };
            for key in branches {
                let leaf_id = pool.allocate(key, NodeId(last));
                storage.insert(
                    key,
                    Child {
                        ptr: FlowNodePtr::Leaf(leaf_id),
                        data: key,
                    },
                );
            }
            nodes[last].storage = storage;
        }

        ClassificationTree {
            nodes,
            pool,
            root: NodeId(0),
        }
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
