//! Error handling for portsweep
//!
//! Input errors abort a run before any probing starts. Per-port socket
//! failures never surface here: they are classified into a `PortState`
//! by the connect prober instead.

use std::net::Ipv4Addr;
use thiserror::Error;

/// Main error type for scanning operations
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Permission denied: {0}")]
    PermissionError(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Port range error: {0}")]
    PortRangeError(String),

    #[error("Timeout error")]
    TimeoutError,

    #[error("Route lookup failed: {0}")]
    RouteError(String),

    #[error("No ARP reply from {0}")]
    ArpTimeout(Ipv4Addr),

    #[error("Raw socket error: {0}")]
    RawSocketError(String),

    #[error("Stats store error: {0}")]
    StatsError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Result type alias for scan operations
pub type ScanResult<T> = Result<T, ScanError>;

impl ScanError {
    /// Map a socket creation failure, keeping privilege problems distinct
    pub fn from_socket_error(err: std::io::Error, what: &str) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => {
                ScanError::PermissionError(format!("{}: {}", what, err))
            }
            _ => ScanError::NetworkError(format!("{}: {}", what, err)),
        }
    }

    /// Errors that mean the caller supplied bad input
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            ScanError::InvalidTarget(_)
                | ScanError::PortRangeError(_)
                | ScanError::ConfigError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_permission_denied_is_mapped() {
        let err = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        let mapped = ScanError::from_socket_error(err, "raw socket");
        assert!(matches!(mapped, ScanError::PermissionError(_)));
        assert!(mapped.to_string().contains("raw socket"));
    }

    #[test]
    fn test_other_socket_errors_are_network_errors() {
        let err = io::Error::new(io::ErrorKind::AddrInUse, "busy");
        let mapped = ScanError::from_socket_error(err, "icmp socket");
        assert!(matches!(mapped, ScanError::NetworkError(_)));
    }

    #[test]
    fn test_input_error_classification() {
        assert!(ScanError::InvalidTarget("x".into()).is_input_error());
        assert!(ScanError::PortRangeError("x".into()).is_input_error());
        assert!(!ScanError::TimeoutError.is_input_error());
        assert!(!ScanError::ArpTimeout(Ipv4Addr::LOCALHOST).is_input_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let err: ScanError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, ScanError::IoError(_)));
    }
}
