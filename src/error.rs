// Copyright (c) 2024-present, flow-core contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::fmt;

/// Errors raised by the classification tree and the NAT element pair.
///
/// Per-flow errors (`NoPorts`, `ReverseLookupMiss`) are meant to be absorbed
/// locally by the caller and must never abort a whole packet batch.
/// Structural errors (`Configuration`, `NoWorkers`, `UnclassifiedPacket`) are
/// fatal and are expected to prevent element startup or indicate a
/// programming error in tree construction.
#[derive(Debug)]
pub enum Error {
    /// Missing or invalid element configuration (e.g. no `SIP`, no `NAT` reference).
    Configuration(String),

    /// No worker thread passes through this element.
    NoWorkers,

    /// The per-worker port free list is exhausted.
    NoPorts,

    /// A packet reached a node with no matching child and no default.
    UnclassifiedPacket,

    /// A reverse lookup by destination port found no entry.
    ReverseLookupMiss,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "configuration error: {msg}"),
            Self::NoWorkers => write!(f, "no thread passes through this element"),
            Self::NoPorts => write!(f, "no ports available"),
            Self::UnclassifiedPacket => {
                write!(f, "packet did not match any classification tree leaf")
            }
            Self::ReverseLookupMiss => write!(f, "no reverse mapping for destination port"),
        }
    }
}

impl std::error::Error for Error {}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
