//! Host discovery: one ICMP echo per target on a bounded pool

use crate::network::icmp::{IcmpPinger, Pinger};
use crate::scanner::{run_pool, Probe};
use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

struct EchoProbe {
    pinger: Arc<dyn Pinger>,
}

#[async_trait]
impl Probe for EchoProbe {
    type Task = Ipv4Addr;
    type Output = Ipv4Addr;

    async fn probe(&self, target: Ipv4Addr) -> Option<Ipv4Addr> {
        self.pinger.is_alive(target).await.then_some(target)
    }
}

/// Concurrent ICMP prober returning the hosts that answered
pub struct DiscoveryEngine {
    pinger: Arc<dyn Pinger>,
    workers: usize,
}

impl DiscoveryEngine {
    pub fn new(timeout: Duration, workers: usize) -> Self {
        Self::with_pinger(Arc::new(IcmpPinger::new(timeout)), workers)
    }

    pub fn with_pinger(pinger: Arc<dyn Pinger>, workers: usize) -> Self {
        Self { pinger, workers }
    }

    /// Live hosts in arrival order. Silent and unreachable hosts are
    /// indistinguishable and both left out.
    pub async fn discover(&self, targets: Vec<Ipv4Addr>) -> Vec<Ipv4Addr> {
        let probe = Arc::new(EchoProbe {
            pinger: Arc::clone(&self.pinger),
        });
        let requested = targets.len();
        let (live, stats) = run_pool(probe, targets, self.workers).await;
        log::info!(
            "discovery: {} of {} hosts up in {:.2}s",
            live.len(),
            requested,
            stats.duration.as_secs_f64()
        );
        live
    }
}
