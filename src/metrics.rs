// Copyright (c) 2024-present, flow-core contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::Relaxed;

#[derive(Debug, Default)]
pub struct Metrics {
    /// Number of flows admitted (a fresh port claimed for a new 5-tuple)
    pub(crate) flows_admitted: AtomicUsize,

    /// Number of flows closed via TCP teardown detection, either direction
    pub(crate) flows_closed: AtomicUsize,

    /// Number of `pick_port` calls that found the partition exhausted
    pub(crate) port_exhaustions: AtomicUsize,

    /// Number of reverse lookups that found no mapping
    pub(crate) reverse_misses: AtomicUsize,

    /// Number of times a hash node storage doubled its table
    pub(crate) hash_resizes: AtomicUsize,
}

impl Metrics {
    pub(crate) fn record_flow_admitted(&self) {
        self.flows_admitted.fetch_add(1, Relaxed);
    }

    pub(crate) fn record_flow_closed(&self) {
        self.flows_closed.fetch_add(1, Relaxed);
    }

    pub(crate) fn record_port_exhaustion(&self) {
        self.port_exhaustions.fetch_add(1, Relaxed);
    }

    pub(crate) fn record_reverse_miss(&self) {
        self.reverse_misses.fetch_add(1, Relaxed);
    }

    pub(crate) fn record_hash_resize(&self) {
        self.hash_resizes.fetch_add(1, Relaxed);
    }

    /// Number of flows admitted since construction.
    pub fn flows_admitted(&self) -> usize {
        self.flows_admitted.load(Relaxed)
    }

    /// Number of flows closed via teardown detection since construction.
    pub fn flows_closed(&self) -> usize {
        self.flows_closed.load(Relaxed)
    }

    /// Number of port allocation failures since construction.
    pub fn port_exhaustions(&self) -> usize {
        self.port_exhaustions.load(Relaxed)
    }

    /// Number of reverse lookup misses since construction.
    pub fn reverse_misses(&self) -> usize {
        self.reverse_misses.load(Relaxed)
    }

    /// Number of hash node table resizes since construction.
    pub fn hash_resizes(&self) -> usize {
        self.hash_resizes.load(Relaxed)
    }
}
