//! Stealth engine: one blocking SYN scan per target on the bounded pool

use crate::network::link::LinkOpener;
use crate::network::route::RouteResolver;
use crate::network::stealth::{self, StealthOptions};
use crate::network::PortResult;
use crate::scanner::engine::TargetFailure;
use crate::scanner::{run_pool, Probe};
use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::sync::Arc;

type TargetOutcome = std::result::Result<(Ipv4Addr, Vec<PortResult>), TargetFailure>;

struct SynTarget {
    ports: Arc<Vec<u16>>,
    resolver: Arc<dyn RouteResolver>,
    opener: LinkOpener,
    options: StealthOptions,
}

#[async_trait]
impl Probe for SynTarget {
    type Task = Ipv4Addr;
    type Output = TargetOutcome;

    async fn probe(&self, target: Ipv4Addr) -> Option<TargetOutcome> {
        let ports = Arc::clone(&self.ports);
        let resolver = Arc::clone(&self.resolver);
        let opener = Arc::clone(&self.opener);
        let options = self.options;

        let joined = tokio::task::spawn_blocking(move || {
            stealth::scan_target(target, &ports, resolver.as_ref(), &opener, options)
        })
        .await;

        let reason = match joined {
            Ok(Ok(found)) => return Some(Ok((target, found))),
            Ok(Err(e)) => e.to_string(),
            Err(e) => format!("scan thread failed: {}", e),
        };
        log::warn!("stealth scan of {} failed: {}", target, reason);
        Some(Err(TargetFailure { target, reason }))
    }
}

/// Per-target results of a stealth run
#[derive(Debug, Default)]
pub struct StealthReport {
    /// Targets scanned to completion, silent or not
    pub scanned: Vec<Ipv4Addr>,
    pub results: Vec<PortResult>,
    pub failures: Vec<TargetFailure>,
}

pub struct StealthEngine {
    probe: Arc<SynTarget>,
    workers: usize,
}

impl StealthEngine {
    pub fn new(
        ports: Vec<u16>,
        resolver: Arc<dyn RouteResolver>,
        opener: LinkOpener,
        options: StealthOptions,
        workers: usize,
    ) -> Self {
        Self {
            probe: Arc::new(SynTarget {
                ports: Arc::new(ports),
                resolver,
                opener,
                options,
            }),
            workers,
        }
    }

    /// Probe every target. A failed target is reported and never stops the others.
    pub async fn scan(&self, targets: Vec<Ipv4Addr>) -> StealthReport {
        let (outcomes, stats) = run_pool(Arc::clone(&self.probe), targets, self.workers).await;

        let mut report = StealthReport::default();
        for outcome in outcomes {
            match outcome {
                Ok((target, found)) => {
                    report.scanned.push(target);
                    report.results.extend(found);
                }
                Err(failure) => report.failures.push(failure),
            }
        }
        log::info!(
            "stealth scan: {} target(s), {} failed, on {} workers in {:.2}s",
            stats.tasks,
            report.failures.len(),
            stats.workers,
            stats.duration.as_secs_f64()
        );
        report
    }
}
