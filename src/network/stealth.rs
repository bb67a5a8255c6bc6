//! Raw SYN ("stealth") probing over the link layer
//!
//! Per target: resolve the route, open a link on that interface, ARP the
//! next hop, then send one SYN per port and read frames until the per-port
//! deadline. SYN+ACK is open (and answered with RST), RST is closed.
//! Silence yields no result for that port.

use crate::network::link::{LinkLayer, LinkOpener};
use crate::network::packet::{self, TcpHeader};
use crate::network::route::{RouteInfo, RouteResolver};
use crate::network::{arp, PortResult, PortState};
use crate::Result;
use pnet::util::MacAddr;
use rand::Rng;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

/// Source ports are drawn from this range, one per prober
const SOURCE_PORT_RANGE: std::ops::Range<u16> = 40000..60000;

/// Timeouts for one stealth run
#[derive(Debug, Clone, Copy)]
pub struct StealthOptions {
    pub arp_timeout: Duration,
    pub port_timeout: Duration,
}

impl Default for StealthOptions {
    fn default() -> Self {
        Self {
            arp_timeout: Duration::from_secs(3),
            port_timeout: Duration::from_secs(1),
        }
    }
}

/// SYN prober bound to one target's route and link
pub struct SynProber {
    link: Box<dyn LinkLayer>,
    route: RouteInfo,
    next_hop_mac: MacAddr,
    source_port: u16,
    port_timeout: Duration,
}

impl SynProber {
    /// Route, link and ARP setup; any failure here is fatal for the target
    pub fn connect(
        target: Ipv4Addr,
        resolver: &dyn RouteResolver,
        opener: &LinkOpener,
        options: StealthOptions,
    ) -> Result<Self> {
        let route = resolver.resolve(target)?;
        let mut link = opener(&route.interface)?;

        if !route.is_direct(target) {
            log::debug!("{} is off-link, resolving gateway {}", target, route.next_hop);
        }
        let next_hop_mac = arp::resolve(
            link.as_mut(),
            route.source_mac,
            route.source,
            route.next_hop,
            options.arp_timeout,
        )?;

        Ok(Self {
            link,
            route,
            next_hop_mac,
            source_port: rand::thread_rng().gen_range(SOURCE_PORT_RANGE),
            port_timeout: options.port_timeout,
        })
    }

    pub fn source_port(&self) -> u16 {
        self.source_port
    }

    pub fn next_hop_mac(&self) -> MacAddr {
        self.next_hop_mac
    }

    fn send_segment(&mut self, target: Ipv4Addr, tcp: &TcpHeader) -> Result<()> {
        let ip_id = rand::thread_rng().gen::<u16>();
        let ipv4 = packet::build_ipv4_tcp(self.route.source, target, tcp, ip_id);
        let frame = packet::ethernet_frame(self.route.source_mac, self.next_hop_mac, &ipv4)?;
        self.link.send(&frame)
    }

    /// Send one SYN and classify the first conclusive answer.
    ///
    /// A read error other than a timeout fails the whole target.
    pub fn probe_port(&mut self, target: Ipv4Addr, port: u16) -> Result<Option<PortState>> {
        let sequence = rand::thread_rng().gen::<u32>();
        self.send_segment(target, &TcpHeader::syn(self.source_port, port, sequence))?;

        let deadline = Instant::now() + self.port_timeout;
        while Instant::now() < deadline {
            let frame = match self.link.recv() {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(e) => {
                    log::debug!("read while probing {}:{}: {}", target, port, e);
                    return Err(e);
                }
            };
            let Some(response) = packet::parse_tcp_frame(&frame) else {
                continue;
            };
            if response.destination_port != self.source_port
                || response.source != target
                || response.source_port != port
            {
                continue;
            }

            match response.classify() {
                Some(PortState::Open) => {
                    let rst = TcpHeader::rst_ack(
                        self.source_port,
                        port,
                        response.acknowledgement,
                        response.sequence.wrapping_add(1),
                    );
                    if let Err(e) = self.send_segment(target, &rst) {
                        log::debug!("RST to {}:{} failed: {}", target, port, e);
                    }
                    return Ok(Some(PortState::Open));
                }
                Some(state) => return Ok(Some(state)),
                None => log::debug!(
                    "inconclusive flags {:#05x} from {}:{}",
                    response.flags.bits(),
                    target,
                    port
                ),
            }
        }
        Ok(None)
    }

    /// Probe every port; ports that never answer produce no result
    pub fn scan(&mut self, target: Ipv4Addr, ports: &[u16]) -> Result<Vec<PortResult>> {
        let mut results = Vec::new();
        for &port in ports {
            if let Some(state) = self.probe_port(target, port)? {
                results.push(PortResult::new(target, port, state));
            }
        }
        Ok(results)
    }
}

/// Full stealth run against one target; the link closes when the prober drops
pub fn scan_target(
    target: Ipv4Addr,
    ports: &[u16],
    resolver: &dyn RouteResolver,
    opener: &LinkOpener,
    options: StealthOptions,
) -> Result<Vec<PortResult>> {
    let mut prober = SynProber::connect(target, resolver, opener, options)?;
    log::info!(
        "SYN probing {} ({} ports) from source port {}",
        target,
        ports.len(),
        prober.source_port()
    );
    prober.scan(target, ports)
}
