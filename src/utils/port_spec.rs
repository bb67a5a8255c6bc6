//! Port specification parsing
//!
//! Rules are checked in order: a comma makes a selection, a hyphen makes a
//! series, anything else is a single port. A series `low-high` scans
//! `[low, high)`, so its task count is `high - low`.

use crate::{Result, ScanError};
use std::fmt;
use std::str::FromStr;

/// How the ports of a scan are enumerated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSpec {
    Single(u16),
    Selection(Vec<u16>),
    /// Half-open interval: `high` is not scanned
    Series { low: u16, high: u16 },
}

impl PortSpec {
    /// Number of probes one host needs for this spec
    pub fn task_count(&self) -> usize {
        match self {
            PortSpec::Single(_) => 1,
            PortSpec::Selection(ports) => ports.len(),
            PortSpec::Series { low, high } => usize::from(high - low),
        }
    }

    /// Ports in scan order
    pub fn ports(&self) -> Vec<u16> {
        match self {
            PortSpec::Single(port) => vec![*port],
            PortSpec::Selection(ports) => ports.clone(),
            PortSpec::Series { low, high } => (*low..*high).collect(),
        }
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSpec::Single(port) => write!(f, "{}", port),
            PortSpec::Selection(ports) => {
                let joined: Vec<String> = ports.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", joined.join(","))
            }
            PortSpec::Series { low, high } => write!(f, "{}-{}", low, high),
        }
    }
}

impl FromStr for PortSpec {
    type Err = ScanError;

    fn from_str(raw: &str) -> Result<Self> {
        parse_port_spec(raw).map(|(spec, _)| spec)
    }
}

/// Parse a port specification into its enumeration mode and task count
pub fn parse_port_spec(raw: &str) -> Result<(PortSpec, usize)> {
    let raw = raw.trim();

    let spec = if raw.contains(',') {
        let ports = raw
            .split(',')
            .map(|token| parse_port(token.trim()))
            .collect::<Result<Vec<u16>>>()?;
        PortSpec::Selection(ports)
    } else if let Some((low, high)) = raw.split_once('-') {
        let low = parse_port(low.trim())?;
        let high = parse_port(high.trim())?;
        if low >= high {
            return Err(ScanError::PortRangeError(format!(
                "range '{}' must have its low port below its high port",
                raw
            )));
        }
        PortSpec::Series { low, high }
    } else {
        PortSpec::Single(parse_port(raw)?)
    };

    let count = spec.task_count();
    Ok((spec, count))
}

fn parse_port(token: &str) -> Result<u16> {
    token
        .parse::<u16>()
        .map_err(|_| ScanError::PortRangeError(format!("'{}' is not a valid port", token)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection() {
        let (spec, count) = parse_port_spec("22,54,80").unwrap();
        assert_eq!(spec, PortSpec::Selection(vec![22, 54, 80]));
        assert_eq!(count, 3);
    }

    #[test]
    fn test_selection_trims_whitespace() {
        let (spec, _) = parse_port_spec("22, 443 ,8080").unwrap();
        assert_eq!(spec.ports(), vec![22, 443, 8080]);
    }

    #[test]
    fn test_series_is_half_open() {
        let (spec, count) = parse_port_spec("1-500").unwrap();
        assert_eq!(spec, PortSpec::Series { low: 1, high: 500 });
        assert_eq!(count, 499);
        let ports = spec.ports();
        assert_eq!(ports.first(), Some(&1));
        assert_eq!(ports.last(), Some(&499));
    }

    #[test]
    fn test_single() {
        let (spec, count) = parse_port_spec("80").unwrap();
        assert_eq!(spec, PortSpec::Single(80));
        assert_eq!(count, 1);
    }

    #[test]
    fn test_bad_tokens_fail_whole_parse() {
        assert!(parse_port_spec("22,http,80").is_err());
        assert!(parse_port_spec("22,").is_err());
        assert!(parse_port_spec("a-b").is_err());
        assert!(parse_port_spec("70000").is_err());
        assert!(parse_port_spec("").is_err());
    }

    #[test]
    fn test_inverted_series_rejected() {
        assert!(parse_port_spec("500-1").is_err());
        assert!(parse_port_spec("80-80").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for raw in ["80", "22,80,443", "1-1023"] {
            let spec: PortSpec = raw.parse().unwrap();
            assert_eq!(spec.to_string(), raw);
        }
    }
}
