//! Configuration module for portsweep

use crate::network::stealth::StealthOptions;
use crate::ScanError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What a run does with its targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Discovery, then TCP connect probes against live hosts
    PortScan,
    /// ICMP discovery only
    Discovery,
    /// Raw SYN probes, no discovery
    Stealth,
}

impl ScanMode {
    pub fn name(&self) -> &'static str {
        match self {
            ScanMode::PortScan => "connect",
            ScanMode::Discovery => "discovery",
            ScanMode::Stealth => "stealth",
        }
    }
}

/// Main configuration structure for scanning operations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Target specification (addresses, ranges, CIDR blocks)
    pub target: String,

    /// Port specification (single, comma list or low-high)
    pub ports: String,

    pub mode: ScanMode,

    /// Workers per probing pool
    pub workers: usize,

    pub connect_timeout_ms: u64,
    pub icmp_timeout_ms: u64,
    pub arp_timeout_ms: u64,

    /// How long to listen for an answer to each SYN
    pub syn_timeout_ms: u64,

    /// Show filtered ports next to open ones
    pub show_filtered: bool,

    /// Feed open ports to the stats store
    pub record_stats: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            target: "127.0.0.1".to_string(),
            ports: "1-1023".to_string(),
            mode: ScanMode::PortScan,
            workers: 100,
            connect_timeout_ms: 1000,
            icmp_timeout_ms: 1000,
            arp_timeout_ms: 3000,
            syn_timeout_ms: 1000,
            show_filtered: false,
            record_stats: true,
        }
    }
}

impl ScanConfig {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn with_ports(mut self, ports: impl Into<String>) -> Self {
        self.ports = ports.into();
        self
    }

    pub fn with_mode(mut self, mode: ScanMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the connect timeout in milliseconds
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = timeout_ms;
        self
    }

    pub fn with_show_filtered(mut self, show: bool) -> Self {
        self.show_filtered = show;
        self
    }

    pub fn with_record_stats(mut self, record: bool) -> Self {
        self.record_stats = record;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn icmp_timeout(&self) -> Duration {
        Duration::from_millis(self.icmp_timeout_ms)
    }

    pub fn stealth_options(&self) -> StealthOptions {
        StealthOptions {
            arp_timeout: Duration::from_millis(self.arp_timeout_ms),
            port_timeout: Duration::from_millis(self.syn_timeout_ms),
        }
    }

    /// Load configuration from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ScanError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        toml::from_str(&content).map_err(|e| {
            ScanError::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// `<config dir>/portsweep/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("portsweep").join("config.toml"))
    }

    /// Load from the default location, falling back to defaults
    pub fn load_default_config() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::from_toml_file(&path) {
            Ok(config) => {
                log::info!("loaded config from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("ignoring config file: {}", e);
                Self::default()
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.target.trim().is_empty() {
            return Err(ScanError::InvalidTarget("Target cannot be empty".to_string()));
        }

        if self.mode != ScanMode::Discovery && self.ports.trim().is_empty() {
            return Err(ScanError::PortRangeError("No ports specified".to_string()));
        }

        if self.workers == 0 {
            return Err(ScanError::ConfigError("Worker count must be greater than 0".to_string()));
        }

        let timeouts = [
            ("connect", self.connect_timeout_ms),
            ("icmp", self.icmp_timeout_ms),
            ("arp", self.arp_timeout_ms),
            ("syn", self.syn_timeout_ms),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, ms)| *ms == 0) {
            return Err(ScanError::ConfigError(format!("{} timeout must be greater than 0", name)));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ScanConfig::default();
        assert_eq!(config.workers, 100);
        assert_eq!(config.ports, "1-1023");
        assert_eq!(config.stealth_options().arp_timeout, Duration::from_secs(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = ScanConfig::new("10.0.0.1").with_workers(0);
        assert!(matches!(config.validate(), Err(ScanError::ConfigError(_))));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = ScanConfig::new("10.0.0.1").with_timeout(0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("connect timeout"));
    }

    #[test]
    fn test_discovery_needs_no_ports() {
        let config = ScanConfig::new("10.0.0.0/30")
            .with_ports("")
            .with_mode(ScanMode::Discovery);
        assert!(config.validate().is_ok());
        assert!(config.with_mode(ScanMode::PortScan).validate().is_err());
    }

    #[test]
    fn test_partial_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "target = \"192.168.1.0/24\"\nmode = \"stealth\"\nworkers = 8").unwrap();
        let config = ScanConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.target, "192.168.1.0/24");
        assert_eq!(config.mode, ScanMode::Stealth);
        assert_eq!(config.workers, 8);
        assert_eq!(config.ports, "1-1023");
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "workers = \"many\"").unwrap();
        assert!(matches!(
            ScanConfig::from_toml_file(file.path()),
            Err(ScanError::ConfigError(_))
        ));
    }
}
