// Copyright (c) 2024-present, flow-core contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! State shared between a forward/reverse NAT pair: the port allocator and
//! the table that lets the reverse side recover a port's original source.
//!
//! Traffic for one connection can arrive on different workers in each
//! direction (asymmetric RSS), so this state needs real cross-worker
//! synchronization unless the whole element is known to sit on a single
//! worker's path, in which case the lock is pure overhead. Picked once at
//! construction, not re-checked per packet.

use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use log::warn;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::port::{PortAllocator, PortHandle};
use crate::worker::{TouchingWorkers, WorkerId};

/// What a forward flow stashes under its allocated port so the reverse
/// side can undo the rewrite without its own classification state.
#[derive(Clone, Copy, Debug)]
pub struct ReverseEntry {
    pub original_ip: Ipv4Addr,
    pub original_port: u16,
    pub port_handle: PortHandle,
}

pub(crate) struct NatStateInner {
    pub ports: PortAllocator,
    pub reverse: FxHashMap<u16, ReverseEntry>,
}

enum Shared {
    Sync(Arc<Mutex<NatStateInner>>),
    Unsync(Rc<RefCell<NatStateInner>>),
}

/// Handle to the state shared by a forward/reverse NAT pair.
///
/// Clone is cheap (an `Arc`/`Rc` bump); both elements hold one.
#[derive(Clone)]
pub struct NatState {
    shared: Arc<SharedInner>,
}

struct SharedInner {
    inner: Shared,
    metrics: Metrics,
}

impl NatState {
    /// `touching_workers <= 1` disables locking, same as a single-threaded
    /// element has no contention to guard against.
    #[must_use]
    pub fn new(ports: PortAllocator, touching_workers: TouchingWorkers) -> Self {
        let inner = NatStateInner {
            ports,
            reverse: FxHashMap::default(),
        };
        let shared = if touching_workers <= 1 {
            Shared::Unsync(Rc::new(RefCell::new(inner)))
        } else {
            Shared::Sync(Arc::new(Mutex::new(inner)))
        };
        Self {
            shared: Arc::new(SharedInner {
                inner: shared,
                metrics: Metrics::default(),
            }),
        }
    }

    fn with_mut<R>(&self, f: impl FnOnce(&mut NatStateInner) -> R) -> R {
        match &self.shared.inner {
            Shared::Sync(lock) => {
                let mut guard = lock.lock().expect("nat state mutex poisoned");
                f(&mut guard)
            }
            Shared::Unsync(cell) => f(&mut cell.borrow_mut()),
        }
    }

    pub fn pick_port(&self, worker: WorkerId) -> Result<PortHandle> {
        let result = self.with_mut(|s| s.ports.pick_port(worker));
        if matches!(result, Err(Error::NoPorts)) {
            warn!("flow-core: no ports left for worker {worker}");
            self.shared.metrics.record_port_exhaustion();
        }
        result
    }

    /// Record that a new flow was admitted (a fresh port claimed).
    pub(crate) fn record_flow_admitted(&self) {
        self.shared.metrics.record_flow_admitted();
    }

    /// Record that a hash node storage resized its table.
    pub(crate) fn record_hash_resize(&self) {
        self.shared.metrics.record_hash_resize();
    }

    #[must_use]
    pub fn port_value(&self, handle: PortHandle) -> u16 {
        self.with_mut(|s| s.ports.port(handle))
    }

    pub fn release_port(&self, handle: PortHandle) {
        self.with_mut(|s| s.ports.release(handle));
        self.shared.metrics.record_flow_closed();
    }

    pub fn register_reverse(&self, port: u16, entry: ReverseEntry) {
        self.with_mut(|s| {
            s.reverse.insert(port, entry);
        });
    }

    /// Consume the reverse entry for `port`. Removed on first lookup: once
    /// the reverse side has materialized its own flow, it caches the
    /// mapping in its own leaf and never needs to consult this table again
    /// for that flow.
    #[must_use]
    pub fn take_reverse(&self, port: u16) -> Option<ReverseEntry> {
        let entry = self.with_mut(|s| s.reverse.remove(&port));
        if entry.is_none() {
            warn!("flow-core: reverse lookup miss for port {port}");
            self.shared.metrics.record_reverse_miss();
        }
        entry
    }

    /// Counters for this NAT pair's shared port/reverse-table activity.
    #[cfg(feature = "metrics")]
    #[must_use]
    pub fn metrics(&self) -> &Metrics {
        &self.shared.metrics
    }
}
