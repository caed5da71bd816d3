use std::net::Ipv4Addr;

use flow_core::config::{NatPairConfig, PortAllocatorConfig};
use flow_core::ids::FcbId;
use flow_core::level::{FlowLevelKind, Level};
use flow_core::packet::{Packet, Protocol, TcpFlags};
use flow_core::tree::TreeBuilder;
use flow_core::Result;

struct FakePacket {
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    protocol: Protocol,
    flags: TcpFlags,
    headers: Vec<u8>,
}

impl FakePacket {
    fn new_tcp(src_ip: Ipv4Addr, src_port: u16, dst_ip: Ipv4Addr, dst_port: u16) -> Self {
        let mut headers = vec![0u8; 20];
        headers[0..4].copy_from_slice(&src_ip.octets());
        headers[4..8].copy_from_slice(&dst_ip.octets());
        headers[8..10].copy_from_slice(&src_port.to_be_bytes());
        headers[10..12].copy_from_slice(&dst_port.to_be_bytes());
        Self {
            src_ip,
            dst_ip,
            src_port,
            dst_port,
            protocol: Protocol::Tcp,
            flags: TcpFlags::default(),
            headers,
        }
    }
}

impl Packet for FakePacket {
    fn src_ip(&self) -> Ipv4Addr {
        self.src_ip
    }
    fn dst_ip(&self) -> Ipv4Addr {
        self.dst_ip
    }
    fn protocol(&self) -> Protocol {
        self.protocol
    }
    fn src_port(&self) -> u16 {
        self.src_port
    }
    fn dst_port(&self) -> u16 {
        self.dst_port
    }
    fn tcp_flags(&self) -> TcpFlags {
        self.flags
    }
    fn aggregate_annotation(&self) -> u32 {
        0
    }
    fn header_bytes(&self) -> &[u8] {
        &self.headers
    }
    fn rewrite_ipport(&mut self, ip: Ipv4Addr, port: u16, is_dst: bool) {
        if is_dst {
            self.dst_ip = ip;
            self.dst_port = port;
        } else {
            self.src_ip = ip;
            self.src_port = port;
        }
    }
    fn set_dst_annotation(&mut self, _ip: Ipv4Addr) {}
}

fn five_tuple_tree() -> TreeBuilder {
    TreeBuilder::new()
        .level(Level::new(
            FlowLevelKind::Generic32 {
                offset: 0,
                mask: u32::MAX,
            },
            true,
            true,
        ))
        .level(Level::new(
            FlowLevelKind::Generic32 {
                offset: 4,
                mask: u32::MAX,
            },
            true,
            true,
        ))
        .level(Level::new(
            FlowLevelKind::Generic16 {
                offset: 8,
                mask: u16::MAX,
            },
            true,
            true,
        ))
        .level(Level::new(
            FlowLevelKind::Generic16 {
                offset: 10,
                mask: u16::MAX,
            },
            true,
            true,
        ))
}

fn dest_port_tree() -> TreeBuilder {
    TreeBuilder::new().level(Level::new(
        FlowLevelKind::Generic16 {
            offset: 10,
            mask: u16::MAX,
        },
        true,
        true,
    ))
}

/// A full round trip: an outbound packet is masqueraded by the forward
/// element, and the reply the peer would send back to that rewritten
/// address/port is correctly un-masqueraded by the reverse element using
/// only the shared state, with no tree of its own to consult.
#[test_log::test]
fn forward_then_reverse_round_trip() -> Result<()> {
    let (mut forward, mut reverse) =
        NatPairConfig::new(Ipv4Addr::new(203, 0, 113, 1)).build(five_tuple_tree(), dest_port_tree())?;

    let client = Ipv4Addr::new(10, 0, 0, 1);
    let server = Ipv4Addr::new(8, 8, 8, 8);

    let mut outbound = FakePacket::new_tcp(client, 4000, server, 80);
    forward.on_packet(&mut outbound, 0)?;
    assert_eq!(outbound.src_ip, Ipv4Addr::new(203, 0, 113, 1));
    let nat_port = outbound.src_port;

    let mut inbound = FakePacket::new_tcp(server, 80, Ipv4Addr::new(203, 0, 113, 1), nat_port);
    reverse.on_packet(&mut inbound, 0)?;
    assert_eq!(inbound.dst_ip, client);
    assert_eq!(inbound.dst_port, 4000);

    Ok(())
}

/// Tearing down the flow on either side releases the shared port; a new
/// flow can then claim the exact same port number.
#[test_log::test]
fn teardown_on_either_side_frees_the_shared_port() -> Result<()> {
    let (mut forward, mut reverse) = NatPairConfig::new(Ipv4Addr::new(203, 0, 113, 1))
        .ports(PortAllocatorConfig {
            worker_count: 1,
            range: 1024..1025,
        })
        .build(five_tuple_tree(), dest_port_tree())?;

    let client = Ipv4Addr::new(10, 0, 0, 1);
    let server = Ipv4Addr::new(8, 8, 8, 8);

    let mut outbound = FakePacket::new_tcp(client, 4000, server, 80);
    forward.on_packet(&mut outbound, 0)?;
    let nat_port = outbound.src_port;
    assert_eq!(nat_port, 1024);

    let mut inbound = FakePacket::new_tcp(server, 80, Ipv4Addr::new(203, 0, 113, 1), nat_port);
    reverse.on_packet(&mut inbound, 0)?;

    let mut inbound_fin = FakePacket::new_tcp(server, 80, Ipv4Addr::new(203, 0, 113, 1), nat_port);
    inbound_fin.flags = TcpFlags::FIN | TcpFlags::ACK;
    reverse.on_packet(&mut inbound_fin, 0)?;

    let mut outbound_rst = FakePacket::new_tcp(client, 4000, server, 80);
    outbound_rst.flags = TcpFlags::RST;
    forward.on_packet(&mut outbound_rst, 0)?;

    let mut next_flow = FakePacket::new_tcp(Ipv4Addr::new(10, 0, 0, 2), 4001, server, 80);
    forward.on_packet(&mut next_flow, 0)?;
    assert_eq!(next_flow.src_port, 1024);

    Ok(())
}

/// Exhausting the single-worker port partition surfaces as an error on the
/// forward side rather than silently dropping the packet.
#[test_log::test]
fn port_exhaustion_is_reported() -> Result<()> {
    let (mut forward, _reverse) = NatPairConfig::new(Ipv4Addr::new(203, 0, 113, 1))
        .ports(PortAllocatorConfig {
            worker_count: 1,
            range: 1024..1025,
        })
        .build(five_tuple_tree(), dest_port_tree())?;

    let server = Ipv4Addr::new(8, 8, 8, 8);
    let mut first = FakePacket::new_tcp(Ipv4Addr::new(10, 0, 0, 1), 4000, server, 80);
    forward.on_packet(&mut first, 0)?;

    let mut second = FakePacket::new_tcp(Ipv4Addr::new(10, 0, 0, 2), 4001, server, 80);
    assert!(forward.on_packet(&mut second, 0).is_err());

    Ok(())
}

/// A reverse packet that arrives for a port the forward side never
/// registered (no matching flow ever opened) is a reverse-lookup miss, not
/// a silently accepted rewrite.
#[test_log::test]
fn reverse_lookup_miss_is_reported() -> Result<()> {
    let (_forward, mut reverse) =
        NatPairConfig::new(Ipv4Addr::new(203, 0, 113, 1)).build(five_tuple_tree(), dest_port_tree())?;

    let mut inbound = FakePacket::new_tcp(
        Ipv4Addr::new(8, 8, 8, 8),
        80,
        Ipv4Addr::new(203, 0, 113, 1),
        50_000,
    );
    assert!(reverse.on_packet(&mut inbound, 0).is_err());

    Ok(())
}

/// Enough distinct flows for the forward side's 5-tuple classifier (a
/// hash-backed level past the 256-key threshold) to resize its table
/// several times over; every flow admitted before the growth must still
/// round-trip correctly afterward.
#[test_log::test]
fn hash_classifier_growth_keeps_every_flow_addressable() -> Result<()> {
    let (mut forward, mut reverse) =
        NatPairConfig::new(Ipv4Addr::new(203, 0, 113, 1)).build(five_tuple_tree(), dest_port_tree())?;

    let server = Ipv4Addr::new(8, 8, 8, 8);
    let mut opened = Vec::new();

    for i in 0..300u32 {
        let client = Ipv4Addr::from(0x0A00_0000u32 + i);
        let mut outbound = FakePacket::new_tcp(client, 4000, server, 80);
        forward.on_packet(&mut outbound, 0)?;
        assert_eq!(outbound.src_ip, Ipv4Addr::new(203, 0, 113, 1));
        opened.push((client, outbound.src_port));
    }

    for (client, nat_port) in opened {
        let mut inbound = FakePacket::new_tcp(server, 80, Ipv4Addr::new(203, 0, 113, 1), nat_port);
        reverse.on_packet(&mut inbound, 0)?;
        assert_eq!(inbound.dst_ip, client);
        assert_eq!(inbound.dst_port, 4000);
    }

    Ok(())
}

/// A flow's FCB slot and its NAT port are both reclaimed once it tears down;
/// a second flow that reuses both must not let a late packet replaying the
/// original flow reverse_match against the recycled FCB.
#[test_log::test]
fn reverse_match_rejects_a_stale_flow_after_its_fcb_and_port_are_recycled() -> Result<()> {
    let (mut forward, _reverse) = NatPairConfig::new(Ipv4Addr::new(203, 0, 113, 1))
        .ports(PortAllocatorConfig {
            worker_count: 1,
            range: 1024..1025,
        })
        .build(five_tuple_tree(), dest_port_tree())?;

    let server = Ipv4Addr::new(8, 8, 8, 8);
    let client_a = Ipv4Addr::new(10, 0, 0, 1);

    let mut outbound_a = FakePacket::new_tcp(client_a, 4000, server, 80);
    forward.on_packet(&mut outbound_a, 0)?;
    assert_eq!(outbound_a.src_port, 1024);
    // The pool is empty before this flow, so its leaf is the first ever
    // allocated.
    let flow_a_id = FcbId(0);

    let mut rst_a = FakePacket::new_tcp(client_a, 4000, server, 80);
    rst_a.flags = TcpFlags::RST;
    forward.on_packet(&mut rst_a, 0)?;

    // A second flow claims both the freed port and (since the pool's free
    // list is LIFO and this is the only freed slot) flow A's freed FCB slot.
    let client_b = Ipv4Addr::new(10, 0, 0, 2);
    let mut outbound_b = FakePacket::new_tcp(client_b, 4001, server, 80);
    forward.on_packet(&mut outbound_b, 0)?;
    assert_eq!(outbound_b.src_port, 1024);
    assert!(forward.reverse_match(flow_a_id, &outbound_b, 0));

    // A late packet replaying flow A's own traffic must not reverse_match
    // against the FCB slot flow B now occupies.
    assert!(!forward.reverse_match(flow_a_id, &outbound_a, 0));

    Ok(())
}
