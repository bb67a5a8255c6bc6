//! TCP connect probing and dial outcome classification

use crate::network::{PortResult, PortState};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;

/// Raw outcome of one connection attempt
#[derive(Debug)]
pub enum DialOutcome {
    Connected,
    TimedOut,
    Failed(io::Error),
}

/// Map a dial outcome to a port state plus the error text behind it.
///
/// | outcome | state |
/// |---|---|
/// | connected | Open |
/// | timeout | Filtered |
/// | host or network unreachable | Unreachable |
/// | anything else | Closed |
pub fn classify(outcome: &DialOutcome) -> (PortState, Option<String>) {
    match outcome {
        DialOutcome::Connected => (PortState::Open, None),
        DialOutcome::TimedOut => (PortState::Filtered, Some("connection timed out".to_string())),
        DialOutcome::Failed(err) if err.kind() == io::ErrorKind::TimedOut => {
            (PortState::Filtered, Some(err.to_string()))
        }
        DialOutcome::Failed(err) if is_unreachable(err) => {
            (PortState::Unreachable, Some(err.to_string()))
        }
        DialOutcome::Failed(err) => (PortState::Closed, Some(err.to_string())),
    }
}

/// Host/network unreachable, by errno or by message
pub fn is_unreachable(err: &io::Error) -> bool {
    if let Some(code) = err.raw_os_error() {
        if code == libc::EHOSTUNREACH || code == libc::ENETUNREACH {
            return true;
        }
    }
    let msg = err.to_string().to_lowercase();
    msg.contains("unreachable") || msg.contains("no route")
}

/// TCP connect scanner for non-raw socket scanning
#[derive(Debug, Clone)]
pub struct TcpConnectScanner {
    timeout: Duration,
}

impl TcpConnectScanner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Attempt one connection; a successful stream is closed immediately
    pub async fn dial(&self, target: Ipv4Addr, port: u16) -> DialOutcome {
        let addr = SocketAddr::new(IpAddr::V4(target), port);
        match tokio::time::timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                drop(stream);
                DialOutcome::Connected
            }
            Ok(Err(e)) => DialOutcome::Failed(e),
            Err(_) => DialOutcome::TimedOut,
        }
    }

    /// Dial and classify a single port
    pub async fn scan_port(&self, target: Ipv4Addr, port: u16) -> PortResult {
        let outcome = self.dial(target, port).await;
        let (state, error) = classify(&outcome);
        log::debug!("{}:{} -> {}", target, port, state);
        PortResult {
            target,
            port,
            state,
            error,
        }
    }
}
