//! Target and port specification parsing

use portsweep::utils::port_spec::{parse_port_spec, PortSpec};
use portsweep::utils::target_parser::{parse_targets, TargetParser};
use portsweep::ScanError;
use proptest::prelude::*;
use std::net::Ipv4Addr;

proptest! {
    #[test]
    fn test_single_address_is_itself(raw in any::<u32>()) {
        let addr = Ipv4Addr::from(raw);
        prop_assert_eq!(parse_targets(&addr.to_string()).unwrap(), vec![addr]);
    }

    #[test]
    fn test_range_is_contiguous(base in any::<[u8; 3]>(), a in 0u8..=255, b in 0u8..=255) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let start = Ipv4Addr::new(base[0], base[1], base[2], lo);
        let end = Ipv4Addr::new(base[0], base[1], base[2], hi);
        let addrs = parse_targets(&format!("{}-{}", start, end)).unwrap();

        prop_assert_eq!(addrs.len(), usize::from(hi - lo) + 1);
        prop_assert_eq!(addrs[0], start);
        prop_assert_eq!(*addrs.last().unwrap(), end);
        for pair in addrs.windows(2) {
            prop_assert_eq!(u32::from(pair[1]), u32::from(pair[0]) + 1);
        }
    }
}

#[test]
fn test_reversed_range_fails() {
    let err = parse_targets("192.168.0.100-192.168.0.50").unwrap_err();
    assert!(matches!(err, ScanError::InvalidTarget(_)));
    assert!(err.is_input_error());
}

#[test]
fn test_slash_24_includes_network_and_broadcast() {
    let addrs = parse_targets("172.16.5.77/24").unwrap();
    assert_eq!(addrs.len(), 256);
    assert_eq!(addrs[0], Ipv4Addr::new(172, 16, 5, 0));
    assert_eq!(addrs[255], Ipv4Addr::new(172, 16, 5, 255));
}

#[test]
fn test_entries_concatenate_in_order() {
    let addrs = parse_targets("10.0.0.1, 10.0.0.5-10.0.0.7").unwrap();
    assert_eq!(addrs.len(), 4);
    assert_eq!(addrs[0], Ipv4Addr::new(10, 0, 0, 1));
    assert_eq!(addrs[3], Ipv4Addr::new(10, 0, 0, 7));
}

#[test]
fn test_overlapping_entries_keep_duplicates() {
    let addrs = parse_targets("10.0.0.1-3,10.0.0.2").unwrap();
    assert_eq!(
        addrs,
        vec![
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            Ipv4Addr::new(10, 0, 0, 3),
            Ipv4Addr::new(10, 0, 0, 2),
        ]
    );
}

#[test]
fn test_range_across_octets_is_numeric() {
    let addrs = parse_targets("10.0.0.250-10.0.1.5").unwrap();
    assert_eq!(addrs.len(), 12);
    assert_eq!(addrs[6], Ipv4Addr::new(10, 0, 1, 0));
}

#[test]
fn test_expansion_cap() {
    let parser = TargetParser::new(100);
    assert!(parser.parse("10.0.0.0/25").is_err());
    assert_eq!(parser.parse("10.0.0.0/26").unwrap().len(), 64);
}

#[test]
fn test_garbage_entry_fails_whole_parse() {
    assert!(parse_targets("10.0.0.1,not-an-address").is_err());
    assert!(parse_targets("").is_err());
}

#[test]
fn test_port_spec_forms() {
    let (spec, count) = parse_port_spec("22,54,80").unwrap();
    assert_eq!(spec, PortSpec::Selection(vec![22, 54, 80]));
    assert_eq!(count, 3);

    let (spec, count) = parse_port_spec("1-500").unwrap();
    assert_eq!(spec, PortSpec::Series { low: 1, high: 500 });
    assert_eq!(count, 499);
    assert_eq!(spec.ports().first(), Some(&1));
    assert_eq!(spec.ports().last(), Some(&499));

    let (spec, count) = parse_port_spec("80").unwrap();
    assert_eq!(spec, PortSpec::Single(80));
    assert_eq!(count, 1);
}

#[test]
fn test_port_spec_rejects_bad_tokens() {
    for raw in ["22,ssh", "80-http", "eighty", "", "70000", "500-1"] {
        assert!(
            matches!(parse_port_spec(raw), Err(ScanError::PortRangeError(_))),
            "{:?} should fail",
            raw
        );
    }
}
