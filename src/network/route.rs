//! Route resolution: which interface, source address and next hop reach a target

use crate::{Result, ScanError};
use anyhow::{anyhow, Context};
use ipnetwork::IpNetwork;
use pnet::datalink::{self, NetworkInterface};
use pnet::util::MacAddr;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

/// Everything the SYN prober needs to frame packets toward one target
#[derive(Debug, Clone)]
pub struct RouteInfo {
    pub interface: NetworkInterface,
    pub source: Ipv4Addr,
    pub source_mac: MacAddr,
    /// The target itself when on-link, otherwise the default gateway
    pub next_hop: Ipv4Addr,
}

impl RouteInfo {
    pub fn is_direct(&self, target: Ipv4Addr) -> bool {
        self.next_hop == target
    }
}

/// "Resolve route" capability
pub trait RouteResolver: Send + Sync {
    fn resolve(&self, target: Ipv4Addr) -> Result<RouteInfo>;
}

/// Resolver backed by the host's interfaces and routing table
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRoutes;

impl RouteResolver for SystemRoutes {
    fn resolve(&self, target: Ipv4Addr) -> Result<RouteInfo> {
        resolve_system_route(target).map_err(|e| ScanError::RouteError(format!("{:#}", e)))
    }
}

fn resolve_system_route(target: Ipv4Addr) -> anyhow::Result<RouteInfo> {
    let source = local_source_for(target)?;
    let interfaces = datalink::interfaces();
    let interface = find_interface(&interfaces, source)
        .ok_or_else(|| anyhow!("no interface carries source address {}", source))?;
    let source_mac = interface
        .mac
        .ok_or_else(|| anyhow!("interface {} has no hardware address", interface.name))?;

    let next_hop = if is_on_link(&interface, target) {
        target
    } else {
        default_gateway(&interface.name)
            .with_context(|| format!("{} is off-link from {}", target, interface.name))?
    };

    log::debug!(
        "route to {}: via {} on {} (source {})",
        target,
        next_hop,
        interface.name,
        source
    );
    Ok(RouteInfo {
        interface,
        source,
        source_mac,
        next_hop,
    })
}

/// Source address the kernel would pick, found by connecting a UDP socket
pub fn local_source_for(target: Ipv4Addr) -> anyhow::Result<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0").context("binding probe socket")?;
    socket
        .connect(SocketAddr::new(IpAddr::V4(target), 53))
        .with_context(|| format!("no route to {}", target))?;
    match socket.local_addr().context("reading bound address")?.ip() {
        IpAddr::V4(addr) => Ok(addr),
        IpAddr::V6(addr) => Err(anyhow!("kernel picked IPv6 source {}", addr)),
    }
}

/// Interface that owns `source`
pub fn find_interface(
    interfaces: &[NetworkInterface],
    source: Ipv4Addr,
) -> Option<NetworkInterface> {
    interfaces
        .iter()
        .find(|iface| iface.ips.iter().any(|net| net.ip() == IpAddr::V4(source)))
        .cloned()
}

/// Whether `target` sits inside one of the interface's IPv4 subnets
pub fn is_on_link(interface: &NetworkInterface, target: Ipv4Addr) -> bool {
    interface.ips.iter().any(|net| match net {
        IpNetwork::V4(v4) => v4.contains(target),
        IpNetwork::V6(_) => false,
    })
}

/// Default gateway for `interface` from `/proc/net/route` text.
///
/// Destination `00000000` marks the default route. The gateway column is
/// the address in host (little-endian) byte order.
pub fn parse_route_table(table: &str, interface: &str) -> Option<Ipv4Addr> {
    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 || fields[0] != interface || fields[1] != "00000000" {
            return None;
        }
        let raw = u32::from_str_radix(fields[2], 16).ok()?;
        Some(Ipv4Addr::from(raw.to_le_bytes()))
    })
}

/// Gateway line from `route -n get default`
pub fn parse_route_get(output: &str) -> Option<Ipv4Addr> {
    output.lines().find_map(|line| {
        let value = line.trim().strip_prefix("gateway:")?;
        value.trim().parse().ok()
    })
}

#[cfg(target_os = "linux")]
fn default_gateway(interface: &str) -> anyhow::Result<Ipv4Addr> {
    let table = std::fs::read_to_string("/proc/net/route").context("reading /proc/net/route")?;
    parse_route_table(&table, interface).ok_or_else(|| anyhow!("no default route on {}", interface))
}

#[cfg(target_os = "macos")]
fn default_gateway(interface: &str) -> anyhow::Result<Ipv4Addr> {
    let output = std::process::Command::new("route")
        .args(["-n", "get", "default"])
        .output()
        .context("running route -n get default")?;
    let text = String::from_utf8_lossy(&output.stdout);
    parse_route_get(&text).ok_or_else(|| anyhow!("no default route on {}", interface))
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn default_gateway(interface: &str) -> anyhow::Result<Ipv4Addr> {
    Err(anyhow!("gateway lookup unsupported on this platform ({})", interface))
}
