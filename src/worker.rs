// Copyright (c) 2024-present, flow-core contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The framework's worker/CPU model, as far as the core needs to know about it.
//!
//! Worker count and CPU pinning are provided by the dataflow graph runtime
//! this core plugs into. This module only defines the small surface the
//! classifier's `Worker` level and the port allocator consume.

/// Identifier of a worker thread, stable for the lifetime of the process.
pub type WorkerId = u8;

/// Number of worker threads that may touch a given element.
///
/// An element is only ever installed once `touching_workers >= 1`; zero
/// means the element has no thread passing through it (a configuration
/// warning, see [`crate::error::Error::NoWorkers`]).
pub type TouchingWorkers = u8;
