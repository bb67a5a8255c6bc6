//! Scan orchestration
//!
//! Expands the target and port specifications, runs discovery ahead of
//! connect scanning (or goes straight to SYN probing in stealth mode) and
//! hands the open ports of each host to the stats recorder.

use crate::config::{ScanConfig, ScanMode};
use crate::network::icmp::{IcmpPinger, Pinger};
use crate::network::link::{system_opener, LinkOpener};
use crate::network::route::{RouteResolver, SystemRoutes};
use crate::network::{PortResult, ScanTask};
use crate::scanner::{ConnectEngine, DiscoveryEngine, StealthEngine, StealthReport};
use crate::utils::port_spec::{parse_port_spec, PortSpec};
use crate::utils::target_parser::parse_targets;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Read timeout on raw link handles, short so per-port deadlines stay accurate
const LINK_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Sink for the ports found open on one host
pub trait StatsRecorder: Send + Sync {
    fn record_open_ports(&self, ports: &[u16]) -> crate::Result<()>;
}

/// A stealth target whose setup or probing failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFailure {
    pub target: Ipv4Addr,
    pub reason: String,
}

/// What a run produced
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    Discovery {
        live: Vec<Ipv4Addr>,
    },
    Ports {
        /// Hosts that answered discovery, or in stealth mode every target
        /// scanned to completion
        live: Vec<Ipv4Addr>,
        results: Vec<PortResult>,
        failures: Vec<TargetFailure>,
        /// Set when the stats recorder failed; results are still complete
        stats_warning: Option<String>,
    },
}

impl ScanOutcome {
    pub fn live_hosts(&self) -> &[Ipv4Addr] {
        match self {
            ScanOutcome::Discovery { live } => live,
            ScanOutcome::Ports { live, .. } => live,
        }
    }

    pub fn results(&self) -> &[PortResult] {
        match self {
            ScanOutcome::Discovery { .. } => &[],
            ScanOutcome::Ports { results, .. } => results,
        }
    }
}

/// Main scanning engine
pub struct ScanEngine {
    config: ScanConfig,
    pinger: Arc<dyn Pinger>,
    stats: Option<Arc<dyn StatsRecorder>>,
    resolver: Arc<dyn RouteResolver>,
    opener: LinkOpener,
}

impl ScanEngine {
    /// Create a new scan engine with the given configuration
    pub fn new(config: ScanConfig) -> crate::Result<Self> {
        config.validate()?;
        let pinger = Arc::new(IcmpPinger::new(config.icmp_timeout()));
        Ok(Self {
            config,
            pinger,
            stats: None,
            resolver: Arc::new(SystemRoutes),
            opener: system_opener(LINK_READ_TIMEOUT),
        })
    }

    pub fn with_pinger(mut self, pinger: Arc<dyn Pinger>) -> Self {
        self.pinger = pinger;
        self
    }

    pub fn with_stats(mut self, stats: Arc<dyn StatsRecorder>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn RouteResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_link_opener(mut self, opener: LinkOpener) -> Self {
        self.opener = opener;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Run the configured scan. Only input errors fail the whole run.
    pub async fn run(&self) -> crate::Result<ScanOutcome> {
        let start = Instant::now();
        let targets = parse_targets(&self.config.target)?;
        log::info!(
            "{} scan of {} address(es)",
            self.config.mode.name(),
            targets.len()
        );

        if self.config.mode == ScanMode::Discovery {
            let live = self.discover(targets).await;
            return Ok(ScanOutcome::Discovery { live });
        }

        let (spec, port_count) = parse_port_spec(&self.config.ports)?;

        let (live, results, failures) = match self.config.mode {
            ScanMode::Stealth => {
                let report = self.run_stealth(targets, &spec).await;
                (report.scanned, report.results, report.failures)
            }
            _ => {
                let live = self.discover(targets).await;
                let tasks = build_tasks(&live, &spec);
                log::info!(
                    "{} live host(s) x {} port(s) = {} tasks",
                    live.len(),
                    port_count,
                    tasks.len()
                );
                let engine = ConnectEngine::new(self.config.connect_timeout(), self.config.workers);
                (live, engine.probe(tasks).await, Vec::new())
            }
        };

        let stats_warning = self.record_stats(&results);
        log::info!("scan finished in {:.2}s", start.elapsed().as_secs_f64());

        Ok(ScanOutcome::Ports {
            live,
            results,
            failures,
            stats_warning,
        })
    }

    async fn discover(&self, targets: Vec<Ipv4Addr>) -> Vec<Ipv4Addr> {
        DiscoveryEngine::with_pinger(Arc::clone(&self.pinger), self.config.workers)
            .discover(targets)
            .await
    }

    /// One blocking SYN scan per target on the shared pool
    async fn run_stealth(&self, targets: Vec<Ipv4Addr>, spec: &PortSpec) -> StealthReport {
        StealthEngine::new(
            spec.ports(),
            Arc::clone(&self.resolver),
            Arc::clone(&self.opener),
            self.config.stealth_options(),
            self.config.workers,
        )
        .scan(targets)
        .await
    }

    /// Hand each host's open ports to the recorder; the first failure becomes a warning
    fn record_stats(&self, results: &[PortResult]) -> Option<String> {
        if !self.config.record_stats {
            return None;
        }
        let stats = self.stats.as_ref()?;

        for (host, ports) in open_ports_by_host(results) {
            if let Err(e) = stats.record_open_ports(&ports) {
                log::warn!("could not record open ports of {}: {}", host, e);
                return Some(format!("stats not updated: {}", e));
            }
        }
        None
    }
}

/// Cross hosts with ports, host-major
pub fn build_tasks(hosts: &[Ipv4Addr], spec: &PortSpec) -> Vec<ScanTask> {
    let ports = spec.ports();
    let mut tasks = Vec::with_capacity(hosts.len() * ports.len());
    for &host in hosts {
        tasks.extend(ports.iter().map(|&port| ScanTask::new(host, port)));
    }
    tasks
}

/// Open ports grouped per host, hosts and ports ascending
pub fn open_ports_by_host(results: &[PortResult]) -> BTreeMap<Ipv4Addr, Vec<u16>> {
    let mut grouped: BTreeMap<Ipv4Addr, Vec<u16>> = BTreeMap::new();
    for result in results.iter().filter(|r| r.is_open()) {
        grouped.entry(result.target).or_default().push(result.port);
    }
    for ports in grouped.values_mut() {
        ports.sort_unstable();
    }
    grouped
}
