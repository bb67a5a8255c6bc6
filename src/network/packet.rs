//! Packet crafting and parsing
//!
//! IPv4 and TCP headers are packed by hand so the checksum code path is the
//! one under test. Ethernet framing goes through pnet.

use crate::network::PortState;
use crate::{Result, ScanError};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::packet::Packet;
use pnet::util::MacAddr;
use std::net::Ipv4Addr;
use std::ops::BitOr;

pub const ETHERNET_HEADER_LEN: usize = 14;
pub const IPV4_HEADER_LEN: usize = 20;
pub const TCP_HEADER_LEN: usize = 20;
pub const IPPROTO_TCP: u8 = 6;

/// Internet checksum (RFC 1071)
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u32::from(u16::from_be_bytes([chunk[0], chunk[1]]));
    }
    if let [last] = chunks.remainder() {
        sum += u32::from(*last) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum >> 16) + (sum & 0xFFFF);
    }
    !(sum as u16)
}

/// TCP control bits as they sit in the low 9 bits of the offset word
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags(u16);

impl TcpFlags {
    pub const FIN: TcpFlags = TcpFlags(0x001);
    pub const SYN: TcpFlags = TcpFlags(0x002);
    pub const RST: TcpFlags = TcpFlags(0x004);
    pub const PSH: TcpFlags = TcpFlags(0x008);
    pub const ACK: TcpFlags = TcpFlags(0x010);
    pub const URG: TcpFlags = TcpFlags(0x020);
    pub const ECE: TcpFlags = TcpFlags(0x040);
    pub const CWR: TcpFlags = TcpFlags(0x080);
    pub const NS: TcpFlags = TcpFlags(0x100);

    pub fn from_bits(bits: u16) -> Self {
        TcpFlags(bits & 0x01FF)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn contains(self, other: TcpFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for TcpFlags {
    type Output = TcpFlags;

    fn bitor(self, rhs: TcpFlags) -> TcpFlags {
        TcpFlags(self.0 | rhs.0)
    }
}

/// Data offset in the top nibble, control bits in the low nine
pub fn pack_offset_flags(data_offset: u8, flags: TcpFlags) -> u16 {
    (u16::from(data_offset & 0x0F) << 12) | flags.bits()
}

/// IPv4 header without options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Header {
    pub version: u8,
    pub ihl: u8,
    pub type_of_service: u8,
    pub total_length: u16,
    pub identification: u16,
    /// 3-bit flags field (0b010 = don't fragment)
    pub flags: u8,
    pub fragment_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
}

impl Ipv4Header {
    /// Header for a TCP segment of `segment_len` bytes
    pub fn for_tcp(
        source: Ipv4Addr,
        destination: Ipv4Addr,
        segment_len: usize,
        identification: u16,
    ) -> Self {
        Self {
            version: 4,
            ihl: 5,
            type_of_service: 0,
            total_length: (IPV4_HEADER_LEN + segment_len) as u16,
            identification,
            flags: 0b010,
            fragment_offset: 0,
            ttl: 64,
            protocol: IPPROTO_TCP,
            source,
            destination,
        }
    }

    /// Serialize with the header checksum filled in
    pub fn to_bytes(&self) -> [u8; IPV4_HEADER_LEN] {
        let mut buf = [0u8; IPV4_HEADER_LEN];
        buf[0] = (self.version << 4) | (self.ihl & 0x0F);
        buf[1] = self.type_of_service;
        buf[2..4].copy_from_slice(&self.total_length.to_be_bytes());
        buf[4..6].copy_from_slice(&self.identification.to_be_bytes());
        let flags_frag = (u16::from(self.flags & 0x07) << 13) | (self.fragment_offset & 0x1FFF);
        buf[6..8].copy_from_slice(&flags_frag.to_be_bytes());
        buf[8] = self.ttl;
        buf[9] = self.protocol;
        buf[12..16].copy_from_slice(&self.source.octets());
        buf[16..20].copy_from_slice(&self.destination.octets());

        let sum = checksum(&buf);
        buf[10..12].copy_from_slice(&sum.to_be_bytes());
        buf
    }
}

/// Pseudo-header followed by the segment, used only for the TCP checksum
pub fn pseudo_header(source: Ipv4Addr, destination: Ipv4Addr, segment: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12 + segment.len());
    buf.extend_from_slice(&source.octets());
    buf.extend_from_slice(&destination.octets());
    buf.push(0);
    buf.push(IPPROTO_TCP);
    buf.extend_from_slice(&(segment.len() as u16).to_be_bytes());
    buf.extend_from_slice(segment);
    buf
}

/// TCP header without options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpHeader {
    pub source_port: u16,
    pub destination_port: u16,
    pub sequence: u32,
    pub acknowledgement: u32,
    pub data_offset: u8,
    pub flags: TcpFlags,
    pub window: u16,
    pub urgent_pointer: u16,
}

impl TcpHeader {
    pub fn syn(source_port: u16, destination_port: u16, sequence: u32) -> Self {
        Self {
            source_port,
            destination_port,
            sequence,
            acknowledgement: 0,
            data_offset: 5,
            flags: TcpFlags::SYN,
            window: 14600,
            urgent_pointer: 0,
        }
    }

    /// Segment that tears down a half-open connection
    pub fn rst_ack(
        source_port: u16,
        destination_port: u16,
        sequence: u32,
        acknowledgement: u32,
    ) -> Self {
        Self {
            source_port,
            destination_port,
            sequence,
            acknowledgement,
            data_offset: 5,
            flags: TcpFlags::RST | TcpFlags::ACK,
            window: 0,
            urgent_pointer: 0,
        }
    }

    /// Serialize with the checksum computed over the pseudo-header
    pub fn to_bytes(&self, source: Ipv4Addr, destination: Ipv4Addr) -> [u8; TCP_HEADER_LEN] {
        let mut buf = [0u8; TCP_HEADER_LEN];
        buf[0..2].copy_from_slice(&self.source_port.to_be_bytes());
        buf[2..4].copy_from_slice(&self.destination_port.to_be_bytes());
        buf[4..8].copy_from_slice(&self.sequence.to_be_bytes());
        buf[8..12].copy_from_slice(&self.acknowledgement.to_be_bytes());
        buf[12..14].copy_from_slice(&pack_offset_flags(self.data_offset, self.flags).to_be_bytes());
        buf[14..16].copy_from_slice(&self.window.to_be_bytes());
        buf[18..20].copy_from_slice(&self.urgent_pointer.to_be_bytes());

        let sum = checksum(&pseudo_header(source, destination, &buf));
        buf[16..18].copy_from_slice(&sum.to_be_bytes());
        buf
    }
}

/// IPv4 + TCP bytes for one segment
pub fn build_ipv4_tcp(
    source: Ipv4Addr,
    destination: Ipv4Addr,
    tcp: &TcpHeader,
    identification: u16,
) -> Vec<u8> {
    let ip = Ipv4Header::for_tcp(source, destination, TCP_HEADER_LEN, identification);
    let mut packet = Vec::with_capacity(IPV4_HEADER_LEN + TCP_HEADER_LEN);
    packet.extend_from_slice(&ip.to_bytes());
    packet.extend_from_slice(&tcp.to_bytes(source, destination));
    packet
}

/// Wrap an IPv4 packet in an Ethernet II header
pub fn ethernet_frame(src_mac: MacAddr, dst_mac: MacAddr, ipv4_packet: &[u8]) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; ETHERNET_HEADER_LEN + ipv4_packet.len()];
    let mut frame = MutableEthernetPacket::new(&mut buffer)
        .ok_or_else(|| ScanError::ParseError("ethernet buffer too small".to_string()))?;
    frame.set_source(src_mac);
    frame.set_destination(dst_mac);
    frame.set_ethertype(EtherTypes::Ipv4);
    buffer[ETHERNET_HEADER_LEN..].copy_from_slice(ipv4_packet);
    Ok(buffer)
}

/// TCP segment seen in a captured frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpResponse {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub source_port: u16,
    pub destination_port: u16,
    pub sequence: u32,
    pub acknowledgement: u32,
    pub flags: TcpFlags,
}

impl TcpResponse {
    /// SYN+ACK means open, RST means closed, anything else says nothing
    pub fn classify(&self) -> Option<PortState> {
        if self.flags.contains(TcpFlags::SYN | TcpFlags::ACK) {
            Some(PortState::Open)
        } else if self.flags.contains(TcpFlags::RST) {
            Some(PortState::Closed)
        } else {
            None
        }
    }
}

/// Parse an Ethernet frame carrying IPv4/TCP
pub fn parse_tcp_frame(frame: &[u8]) -> Option<TcpResponse> {
    let ethernet = EthernetPacket::new(frame)?;
    if ethernet.get_ethertype() != EtherTypes::Ipv4 {
        return None;
    }
    parse_ipv4_tcp(ethernet.payload())
}

/// Parse a bare IPv4 packet carrying TCP
pub fn parse_ipv4_tcp(packet: &[u8]) -> Option<TcpResponse> {
    if packet.len() < IPV4_HEADER_LEN || packet[0] >> 4 != 4 || packet[9] != IPPROTO_TCP {
        return None;
    }
    let ihl = usize::from(packet[0] & 0x0F) * 4;
    if ihl < IPV4_HEADER_LEN || packet.len() < ihl + TCP_HEADER_LEN {
        return None;
    }
    let tcp = &packet[ihl..];

    Some(TcpResponse {
        source: Ipv4Addr::new(packet[12], packet[13], packet[14], packet[15]),
        destination: Ipv4Addr::new(packet[16], packet[17], packet[18], packet[19]),
        source_port: u16::from_be_bytes([tcp[0], tcp[1]]),
        destination_port: u16::from_be_bytes([tcp[2], tcp[3]]),
        sequence: u32::from_be_bytes([tcp[4], tcp[5], tcp[6], tcp[7]]),
        acknowledgement: u32::from_be_bytes([tcp[8], tcp[9], tcp[10], tcp[11]]),
        flags: TcpFlags::from_bits(u16::from_be_bytes([tcp[12], tcp[13]])),
    })
}
