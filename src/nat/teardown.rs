// Copyright (c) 2024-present, flow-core contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Shared TCP teardown detection for both NAT directions.

use crate::packet::{Packet, Protocol, TcpFlags};

/// A TCP connection is torn down by an RST in either direction, or a
/// FIN+ACK. UDP flows have no such signal and are never torn down here.
#[must_use]
pub fn should_tear_down(packet: &dyn Packet) -> bool {
    if packet.protocol() != Protocol::Tcp {
        return false;
    }
    let flags = packet.tcp_flags();
    flags.contains(TcpFlags::RST) || (flags.contains(TcpFlags::FIN) && flags.contains(TcpFlags::ACK))
}
