// Copyright (c) 2024-present, flow-core contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Per-worker ephemeral port allocation for the forward NAT element.
//!
//! Each worker owns a disjoint slice of the port range, handed out and
//! reclaimed without any cross-worker locking: a flow is always opened and
//! closed on the worker that owns its port.

use std::collections::VecDeque;
use std::ops::Range;

use crate::error::{Error, Result};
use crate::worker::WorkerId;

/// A port is shared by a forward NAT entry and its paired reverse entry;
/// it becomes available again only once both have released it.
const REFS_PER_PORT: u32 = 2;

struct PortSlot {
    port: u16,
    refcount: u32,
}

struct WorkerPorts {
    slots: Vec<PortSlot>,
    /// Indices into `slots`. Only ever holds slots at refcount 0.
    free: VecDeque<usize>,
}

/// A handle to a picked port. Opaque so callers can't fabricate one out of
/// a raw port number and bypass the refcount.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortHandle {
    worker: WorkerId,
    index: usize,
}

/// Partitions a port range evenly across workers and hands out/reclaims
/// ports within a worker's own partition.
pub struct PortAllocator {
    workers: Vec<WorkerPorts>,
}

impl PortAllocator {
    /// Splits `range` into `worker_count` contiguous, equal-sized slices
    /// (any remainder from uneven division goes unused, same as leaving a
    /// few ports idle at the top of the range).
    pub fn new(worker_count: u8, range: Range<u16>) -> Result<Self> {
        if worker_count == 0 {
            return Err(Error::NoWorkers);
        }
        let total_ports = usize::from(range.end) - usize::from(range.start);
        let per_worker = total_ports / usize::from(worker_count);

        let workers = (0..u16::from(worker_count))
            .map(|i| {
                let min_port = range.start + i * per_worker as u16;
                let max_port = min_port + per_worker as u16;
                let slots = (min_port..max_port)
                    .map(|port| PortSlot { port, refcount: 0 })
                    .collect::<Vec<_>>();
                let free = (0..slots.len()).collect();
                WorkerPorts { slots, free }
            })
            .collect();

        Ok(Self { workers })
    }

    /// Hand out a port from `worker`'s own partition, starting it at
    /// [`REFS_PER_PORT`] references.
    pub fn pick_port(&mut self, worker: WorkerId) -> Result<PortHandle> {
        let partition = &mut self.workers[usize::from(worker)];
        let index = partition.free.pop_front().ok_or(Error::NoPorts)?;
        partition.slots[index].refcount = REFS_PER_PORT;
        Ok(PortHandle { worker, index })
    }

    #[must_use]
    pub fn port(&self, handle: PortHandle) -> u16 {
        self.workers[usize::from(handle.worker)].slots[handle.index].port
    }

    /// Drop one reference. Once both the forward and reverse sides have
    /// released it, the port returns to the free queue.
    pub fn release(&mut self, handle: PortHandle) {
        let partition = &mut self.workers[usize::from(handle.worker)];
        let slot = &mut partition.slots[handle.index];
        slot.refcount = slot.refcount.saturating_sub(1);
        if slot.refcount == 0 {
            partition.free.push_back(handle.index);
        }
    }
}
