//! Network module: probes, packet codec and link-layer plumbing

pub mod arp;
pub mod icmp;
pub mod link;
pub mod packet;
pub mod route;
pub mod socket;
pub mod stealth;

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Port state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortState {
    Open,
    Closed,
    Filtered,
    Unreachable,
}

impl std::fmt::Display for PortState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortState::Open => write!(f, "open"),
            PortState::Closed => write!(f, "closed"),
            PortState::Filtered => write!(f, "filtered"),
            PortState::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// A single (host, port) probe, consumed by exactly one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTask {
    pub target: Ipv4Addr,
    pub port: u16,
}

impl ScanTask {
    pub fn new(target: Ipv4Addr, port: u16) -> Self {
        Self { target, port }
    }
}

/// Classified outcome of one probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortResult {
    pub target: Ipv4Addr,
    pub port: u16,
    pub state: PortState,
    /// Error text behind a non-open classification, if any
    pub error: Option<String>,
}

impl PortResult {
    pub fn new(target: Ipv4Addr, port: u16, state: PortState) -> Self {
        Self {
            target,
            port,
            state,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn is_open(&self) -> bool {
        self.state == PortState::Open
    }
}
