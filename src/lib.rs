//! portsweep - IPv4 host discovery and TCP port scanning
//!
//! ICMP discovery, a bounded TCP connect scanner and a raw SYN prober that
//! builds its own Ethernet, IPv4 and TCP frames.

pub mod config;
pub mod error;
pub mod network;
pub mod scanner;
pub mod stats;
pub mod utils;

// Re-export commonly used types
pub use config::{ScanConfig, ScanMode};
pub use error::{ScanError, ScanResult};
pub use network::{PortResult, PortState, ScanTask};
pub use scanner::engine::{ScanEngine, ScanOutcome, StatsRecorder, TargetFailure};
pub use stats::StatsStore;
pub use utils::{parse_port_spec, parse_targets, PortSpec};

pub type Result<T> = std::result::Result<T, ScanError>;
