//! ARP resolution of the next hop's hardware address

use crate::network::link::LinkLayer;
use crate::network::packet::ETHERNET_HEADER_LEN;
use crate::{Result, ScanError};
use pnet::packet::arp::{ArpHardwareTypes, ArpOperations, ArpPacket, MutableArpPacket};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::packet::Packet;
use pnet::util::MacAddr;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

pub const ARP_PACKET_LEN: usize = 28;
/// Minimum Ethernet frame without FCS; ARP requests are padded to it
pub const MIN_ETH_FRAME_NO_FCS: usize = 60;

/// Protocol-to-hardware address pair learned from a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpBinding {
    pub ip: Ipv4Addr,
    pub mac: MacAddr,
}

/// Broadcast who-has request for `target_ip`
pub fn build_request(src_mac: MacAddr, src_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; MIN_ETH_FRAME_NO_FCS];
    {
        let mut ethernet = MutableEthernetPacket::new(&mut buffer)
            .ok_or_else(|| ScanError::ParseError("ethernet buffer too small".to_string()))?;
        ethernet.set_destination(MacAddr::broadcast());
        ethernet.set_source(src_mac);
        ethernet.set_ethertype(EtherTypes::Arp);
    }

    let arp_bytes = &mut buffer[ETHERNET_HEADER_LEN..ETHERNET_HEADER_LEN + ARP_PACKET_LEN];
    let mut arp = MutableArpPacket::new(arp_bytes)
        .ok_or_else(|| ScanError::ParseError("ARP buffer too small".to_string()))?;
    arp.set_hardware_type(ArpHardwareTypes::Ethernet);
    arp.set_protocol_type(EtherTypes::Ipv4);
    arp.set_hw_addr_len(6);
    arp.set_proto_addr_len(4);
    arp.set_operation(ArpOperations::Request);
    arp.set_sender_hw_addr(src_mac);
    arp.set_sender_proto_addr(src_ip);
    arp.set_target_hw_addr(MacAddr::zero());
    arp.set_target_proto_addr(target_ip);
    Ok(buffer)
}

/// Sender binding of an ARP reply frame, if the frame is one
pub fn parse_reply(frame: &[u8]) -> Option<ArpBinding> {
    let ethernet = EthernetPacket::new(frame)?;
    if ethernet.get_ethertype() != EtherTypes::Arp {
        return None;
    }
    let arp = ArpPacket::new(ethernet.payload())?;
    if arp.get_operation() != ArpOperations::Reply {
        return None;
    }
    Some(ArpBinding {
        ip: arp.get_sender_proto_addr(),
        mac: arp.get_sender_hw_addr(),
    })
}

/// Broadcast a request and wait for the matching reply
pub fn resolve(
    link: &mut dyn LinkLayer,
    src_mac: MacAddr,
    src_ip: Ipv4Addr,
    target_ip: Ipv4Addr,
    timeout: Duration,
) -> Result<MacAddr> {
    link.send(&build_request(src_mac, src_ip, target_ip)?)?;

    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        let Some(frame) = link.recv()? else {
            continue;
        };
        match parse_reply(&frame) {
            Some(binding) if binding.ip == target_ip => {
                log::debug!("{} is at {}", binding.ip, binding.mac);
                return Ok(binding.mac);
            }
            _ => continue,
        }
    }
    Err(ScanError::ArpTimeout(target_ip))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    const SRC_MAC: MacAddr = MacAddr(0x01, 0x02, 0x03, 0x04, 0x05, 0x06);
    const GW_MAC: MacAddr = MacAddr(0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF);
    const SRC_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 10);
    const GW_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);

    struct QueueLink {
        sent: Vec<Vec<u8>>,
        incoming: VecDeque<Vec<u8>>,
    }

    impl LinkLayer for QueueLink {
        fn send(&mut self, frame: &[u8]) -> Result<()> {
            self.sent.push(frame.to_vec());
            Ok(())
        }

        fn recv(&mut self) -> Result<Option<Vec<u8>>> {
            if self.incoming.is_empty() {
                std::thread::sleep(Duration::from_millis(2));
            }
            Ok(self.incoming.pop_front())
        }
    }

    fn reply_frame(sender_ip: Ipv4Addr, sender_mac: MacAddr) -> Vec<u8> {
        let mut buffer = vec![0u8; ETHERNET_HEADER_LEN + ARP_PACKET_LEN];
        {
            let mut eth = MutableEthernetPacket::new(&mut buffer).unwrap();
            eth.set_destination(SRC_MAC);
            eth.set_source(sender_mac);
            eth.set_ethertype(EtherTypes::Arp);
        }
        let mut arp = MutableArpPacket::new(&mut buffer[ETHERNET_HEADER_LEN..]).unwrap();
        arp.set_hardware_type(ArpHardwareTypes::Ethernet);
        arp.set_protocol_type(EtherTypes::Ipv4);
        arp.set_hw_addr_len(6);
        arp.set_proto_addr_len(4);
        arp.set_operation(ArpOperations::Reply);
        arp.set_sender_hw_addr(sender_mac);
        arp.set_sender_proto_addr(sender_ip);
        arp.set_target_hw_addr(SRC_MAC);
        arp.set_target_proto_addr(SRC_IP);
        buffer
    }

    #[test]
    fn test_build_request() {
        let frame = build_request(SRC_MAC, SRC_IP, GW_IP).unwrap();
        assert_eq!(frame.len(), MIN_ETH_FRAME_NO_FCS);
        let eth = EthernetPacket::new(&frame).unwrap();
        assert_eq!(eth.get_destination(), MacAddr::broadcast());
        assert_eq!(eth.get_source(), SRC_MAC);
        assert_eq!(eth.get_ethertype(), EtherTypes::Arp);
        let arp = ArpPacket::new(eth.payload()).unwrap();
        assert_eq!(arp.get_operation(), ArpOperations::Request);
        assert_eq!(arp.get_sender_proto_addr(), SRC_IP);
        assert_eq!(arp.get_target_proto_addr(), GW_IP);
        assert_eq!(arp.get_target_hw_addr(), MacAddr::zero());
    }

    #[test]
    fn test_parse_reply_ignores_requests() {
        let request = build_request(SRC_MAC, SRC_IP, GW_IP).unwrap();
        assert!(parse_reply(&request).is_none());
        let reply = reply_frame(GW_IP, GW_MAC);
        assert_eq!(parse_reply(&reply), Some(ArpBinding { ip: GW_IP, mac: GW_MAC }));
    }

    #[test]
    fn test_resolve_skips_unrelated_replies() {
        let mut link = QueueLink {
            sent: Vec::new(),
            incoming: VecDeque::from(vec![
                vec![0u8; 10],
                reply_frame(Ipv4Addr::new(192, 168, 1, 77), SRC_MAC),
                reply_frame(GW_IP, GW_MAC),
            ]),
        };
        let mac = resolve(&mut link, SRC_MAC, SRC_IP, GW_IP, Duration::from_secs(1)).unwrap();
        assert_eq!(mac, GW_MAC);
        assert_eq!(link.sent.len(), 1);
    }

    #[test]
    fn test_resolve_times_out() {
        let mut link = QueueLink {
            sent: Vec::new(),
            incoming: VecDeque::new(),
        };
        let result = resolve(&mut link, SRC_MAC, SRC_IP, GW_IP, Duration::from_millis(30));
        assert!(matches!(result, Err(ScanError::ArpTimeout(ip)) if ip == GW_IP));
    }
}
