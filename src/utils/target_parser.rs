//! Target parsing for IPv4 addresses, ranges and CIDR blocks
//!
//! A target specification is a comma separated list. Each entry is one of:
//! - a single address (`10.0.0.1`)
//! - a CIDR block (`10.0.0.0/24`), network and broadcast included
//! - a range (`10.0.0.1-10.0.0.9`)
//! - a last-octet range (`192.168.0.15-25`)
//! - a trailing hyphen (`10.0.0.1-`), meaning the single address
//!
//! Entries expand in the order given and are concatenated without
//! de-duplication.

use crate::{Result, ScanError};
use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Upper bound on addresses produced by one specification (a /8)
pub const DEFAULT_MAX_ADDRESSES: u64 = 1 << 24;

/// Inclusive boundaries of one specification entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    pub start: Ipv4Addr,
    pub end: Ipv4Addr,
}

impl AddressRange {
    pub fn single(addr: Ipv4Addr) -> Self {
        Self { start: addr, end: addr }
    }

    /// Number of addresses in the range
    pub fn count(&self) -> u64 {
        u64::from(u32::from(self.end)) - u64::from(u32::from(self.start)) + 1
    }
}

/// Target parser with a cap on expansion size
pub struct TargetParser {
    max_addresses: u64,
}

impl Default for TargetParser {
    fn default() -> Self {
        Self {
            max_addresses: DEFAULT_MAX_ADDRESSES,
        }
    }
}

impl TargetParser {
    pub fn new(max_addresses: u64) -> Self {
        Self { max_addresses }
    }

    /// Expand a full target specification into scan order
    pub fn parse(&self, input: &str) -> Result<Vec<Ipv4Addr>> {
        let mut ranges = Vec::new();
        let mut total: u64 = 0;

        for entry in input.split(',') {
            let range = parse_entry(entry.trim()).map_err(|e| match e {
                ScanError::InvalidTarget(msg) => {
                    ScanError::InvalidTarget(format!("unable to parse '{}': {}", input, msg))
                }
                other => other,
            })?;
            total += range.count();
            if total > self.max_addresses {
                return Err(ScanError::InvalidTarget(format!(
                    "'{}' expands to more than {} addresses",
                    input, self.max_addresses
                )));
            }
            ranges.push(range);
        }

        let mut addresses = Vec::with_capacity(total as usize);
        for range in ranges {
            addresses.extend(generate_ip_range(range.start, range.end)?);
        }

        log::debug!("target '{}' expanded to {} addresses", input, addresses.len());
        Ok(addresses)
    }
}

/// Expand a target specification with the default parser
pub fn parse_targets(input: &str) -> Result<Vec<Ipv4Addr>> {
    TargetParser::default().parse(input)
}

/// Parse one entry: CIDR first, range syntax as the fallback
pub fn parse_entry(entry: &str) -> Result<AddressRange> {
    if entry.contains('/') {
        if let Ok(network) = Ipv4Network::from_str(entry) {
            return Ok(AddressRange {
                start: network.network(),
                end: network.broadcast(),
            });
        }
    }
    parse_ip_range(entry)
}

/// Parse the hyphenated range forms, or a bare address
pub fn parse_ip_range(entry: &str) -> Result<AddressRange> {
    let Some((left, right)) = entry.split_once('-') else {
        return parse_addr(entry).map(AddressRange::single);
    };

    let left = left.trim();
    let right = right.trim();
    let start = parse_addr(left)?;

    if right.is_empty() {
        return Ok(AddressRange::single(start));
    }

    let end = if right.contains('.') {
        parse_addr(right)?
    } else {
        let last = right.parse::<u8>().map_err(|_| {
            ScanError::InvalidTarget(format!("'{}' is not a valid last octet", right))
        })?;
        let [a, b, c, _] = start.octets();
        Ipv4Addr::new(a, b, c, last)
    };

    if u32::from(start) > u32::from(end) {
        return Err(ScanError::InvalidTarget(format!(
            "start address {} is after end address {}",
            start, end
        )));
    }

    Ok(AddressRange { start, end })
}

fn parse_addr(text: &str) -> Result<Ipv4Addr> {
    Ipv4Addr::from_str(text.trim())
        .map_err(|_| ScanError::InvalidTarget(format!("'{}' is an invalid IP", text)))
}

/// Every address from `start` to `end`, inclusive
pub fn generate_ip_range(start: Ipv4Addr, end: Ipv4Addr) -> Result<Vec<Ipv4Addr>> {
    if u32::from(start) > u32::from(end) {
        return Err(ScanError::InvalidTarget(format!(
            "start address {} is after end address {}",
            start, end
        )));
    }

    let mut addresses = vec![start];
    let mut current = start;
    while current != end {
        current = increment_ip(current)?;
        addresses.push(current);
    }
    Ok(addresses)
}

/// The next address, or an error past 255.255.255.255
pub fn increment_ip(addr: Ipv4Addr) -> Result<Ipv4Addr> {
    u32::from(addr)
        .checked_add(1)
        .map(Ipv4Addr::from)
        .ok_or_else(|| ScanError::InvalidTarget(format!("address overflow incrementing {}", addr)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_address() {
        let result = parse_targets("192.168.1.1").unwrap();
        assert_eq!(result, vec![Ipv4Addr::new(192, 168, 1, 1)]);
    }

    #[test]
    fn test_trailing_hyphen_is_single() {
        let result = parse_targets("10.1.1.7-").unwrap();
        assert_eq!(result, vec![Ipv4Addr::new(10, 1, 1, 7)]);
    }

    #[test]
    fn test_last_octet_shorthand() {
        let range = parse_ip_range("192.168.0.15-25").unwrap();
        assert_eq!(range.start, Ipv4Addr::new(192, 168, 0, 15));
        assert_eq!(range.end, Ipv4Addr::new(192, 168, 0, 25));
        assert_eq!(range.count(), 11);
    }

    #[test]
    fn test_last_octet_out_of_bounds() {
        assert!(parse_ip_range("192.168.0.15-256").is_err());
    }

    #[test]
    fn test_cidr_block_bounds() {
        let range = parse_entry("192.168.1.77/30").unwrap();
        assert_eq!(range.start, Ipv4Addr::new(192, 168, 1, 76));
        assert_eq!(range.end, Ipv4Addr::new(192, 168, 1, 79));
    }

    #[test]
    fn test_range_across_octet_boundary() {
        let result = parse_targets("10.0.0.254-10.0.1.1").unwrap();
        assert_eq!(result.len(), 4);
        assert_eq!(result[1], Ipv4Addr::new(10, 0, 0, 255));
        assert_eq!(result[2], Ipv4Addr::new(10, 0, 1, 0));
    }

    #[test]
    fn test_numeric_not_lexicographic_ordering() {
        // "10.0.0.9" > "10.0.0.10" as strings, but not as addresses
        let result = parse_targets("10.0.0.9-10.0.0.10").unwrap();
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_increment_overflow() {
        assert!(increment_ip(Ipv4Addr::new(255, 255, 255, 255)).is_err());
        assert_eq!(
            increment_ip(Ipv4Addr::new(1, 2, 3, 255)).unwrap(),
            Ipv4Addr::new(1, 2, 4, 0)
        );
    }

    #[test]
    fn test_range_ending_at_broadcast_does_not_overflow() {
        let result = parse_targets("255.255.255.254-255.255.255.255").unwrap();
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_invalid_target() {
        assert!(parse_targets("invalid..target").is_err());
        assert!(parse_targets("10.0.0.1,").is_err());
        assert!(parse_targets("10.0.0.300").is_err());
    }

    #[test]
    fn test_expansion_cap() {
        let parser = TargetParser::new(100);
        assert!(parser.parse("192.168.0.0/24").is_err());
        assert_eq!(parser.parse("192.168.0.0/26").unwrap().len(), 64);
    }
}
