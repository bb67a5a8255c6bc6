//! Parsing utilities for target and port specifications

pub mod port_spec;
pub mod target_parser;

pub use port_spec::{parse_port_spec, PortSpec};
pub use target_parser::{parse_targets, TargetParser};
