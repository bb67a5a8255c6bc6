//! ICMP echo probing for host discovery
//!
//! Each probe opens its own socket, so a reply arriving on it belongs to
//! that probe. Unprivileged datagram ICMP sockets are tried first. A raw
//! socket is the fallback; it sees every ICMP packet on the host, so replies
//! must then also come from the probed address and carry our identifier.

use crate::network::packet::{checksum, IPV4_HEADER_LEN};
use crate::ScanError;
use async_trait::async_trait;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{self, Read};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

pub const ECHO_REQUEST: u8 = 8;
pub const ECHO_REPLY: u8 = 0;
pub const ECHO_PAYLOAD: &[u8] = b"HELLO-R-U-THERE";
const ICMP_HEADER_LEN: usize = 8;

/// Liveness check used by the discovery engine
#[async_trait]
pub trait Pinger: Send + Sync {
    async fn is_alive(&self, target: Ipv4Addr) -> bool;
}

/// Identifier derived from the process id, as ping(8) does
pub fn echo_identifier() -> u16 {
    (std::process::id() & 0xffff) as u16
}

/// Echo request message with checksum
pub fn build_echo_request(identifier: u16, sequence: u16, payload: &[u8]) -> Vec<u8> {
    let mut message = vec![0u8; ICMP_HEADER_LEN + payload.len()];
    message[0] = ECHO_REQUEST;
    message[4..6].copy_from_slice(&identifier.to_be_bytes());
    message[6..8].copy_from_slice(&sequence.to_be_bytes());
    message[ICMP_HEADER_LEN..].copy_from_slice(payload);
    let sum = checksum(&message);
    message[2..4].copy_from_slice(&sum.to_be_bytes());
    message
}

/// What a received packet must satisfy to answer one probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyFilter {
    /// Datagram sockets only deliver replies to their own requests
    Any,
    /// Raw sockets: IPv4 source and echo identifier must both match
    From { source: Ipv4Addr, identifier: u16 },
}

/// Whether `buf` holds an echo reply accepted by `filter`.
///
/// A leading IPv4 header is stripped when present; `ReplyFilter::From`
/// requires one, since the source address is read from it.
pub fn is_echo_reply(buf: &[u8], filter: ReplyFilter) -> bool {
    let (source, message) = match buf.first() {
        Some(&first) if first >> 4 == 4 && buf.len() >= IPV4_HEADER_LEN => {
            let ihl = usize::from(first & 0x0F) * 4;
            let Some(rest) = buf.get(ihl..) else {
                return false;
            };
            let source = Ipv4Addr::new(buf[12], buf[13], buf[14], buf[15]);
            (Some(source), rest)
        }
        _ => (None, buf),
    };

    if message.len() < ICMP_HEADER_LEN || message[0] != ECHO_REPLY {
        return false;
    }
    match filter {
        ReplyFilter::Any => true,
        ReplyFilter::From { source: expected, identifier } => {
            source == Some(expected) && u16::from_be_bytes([message[4], message[5]]) == identifier
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketKind {
    Datagram,
    Raw,
}

/// ICMP pinger, one socket per probe
#[derive(Debug, Clone)]
pub struct IcmpPinger {
    timeout: Duration,
    identifier: u16,
}

impl IcmpPinger {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            identifier: echo_identifier(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn open_socket() -> crate::Result<(Socket, SocketKind)> {
        match Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::ICMPV4)) {
            Ok(socket) => Ok((socket, SocketKind::Datagram)),
            Err(e) => {
                log::debug!("datagram ICMP socket unavailable ({}), trying raw", e);
                let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))
                    .map_err(|e| ScanError::from_socket_error(e, "ICMP socket"))?;
                Ok((socket, SocketKind::Raw))
            }
        }
    }

    /// Send one echo request and wait for the reply (blocking)
    pub fn ping(&self, target: Ipv4Addr) -> crate::Result<bool> {
        let (mut socket, kind) = Self::open_socket()?;
        let request = build_echo_request(self.identifier, 1, ECHO_PAYLOAD);
        let dest = SockAddr::from(SocketAddr::new(IpAddr::V4(target), 0));
        socket
            .send_to(&request, &dest)
            .map_err(|e| ScanError::NetworkError(format!("echo to {}: {}", target, e)))?;

        let filter = match kind {
            SocketKind::Raw => ReplyFilter::From {
                source: target,
                identifier: self.identifier,
            },
            SocketKind::Datagram => ReplyFilter::Any,
        };

        let deadline = Instant::now() + self.timeout;
        let mut buf = [0u8; 1500];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(false);
            }
            socket.set_read_timeout(Some(remaining))?;
            match socket.read(&mut buf) {
                Ok(n) if is_echo_reply(&buf[..n], filter) => return Ok(true),
                Ok(_) => continue,
                Err(e)
                    if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    return Ok(false)
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[async_trait]
impl Pinger for IcmpPinger {
    async fn is_alive(&self, target: Ipv4Addr) -> bool {
        let pinger = self.clone();
        match tokio::task::spawn_blocking(move || pinger.ping(target)).await {
            Ok(Ok(alive)) => alive,
            Ok(Err(e)) => {
                log::debug!("ping {} failed: {}", target, e);
                false
            }
            Err(e) => {
                log::error!("ping task for {} aborted: {}", target, e);
                false
            }
        }
    }
}
