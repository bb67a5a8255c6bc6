//! TCP connect probe engine

use crate::network::socket::TcpConnectScanner;
use crate::network::{PortResult, ScanTask};
use crate::scanner::{run_pool, Probe};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
impl Probe for TcpConnectScanner {
    type Task = ScanTask;
    type Output = PortResult;

    async fn probe(&self, task: ScanTask) -> Option<PortResult> {
        Some(self.scan_port(task.target, task.port).await)
    }
}

/// Fixed-size pool of connect workers; every task yields one result
pub struct ConnectEngine {
    scanner: Arc<TcpConnectScanner>,
    workers: usize,
}

impl ConnectEngine {
    pub fn new(timeout: Duration, workers: usize) -> Self {
        Self {
            scanner: Arc::new(TcpConnectScanner::new(timeout)),
            workers,
        }
    }

    pub async fn probe(&self, tasks: Vec<ScanTask>) -> Vec<PortResult> {
        let expected = tasks.len();
        let (results, stats) = run_pool(Arc::clone(&self.scanner), tasks, self.workers).await;
        if results.len() != expected {
            log::warn!("expected {} results, drained {}", expected, results.len());
        }
        log::info!(
            "connect scan: {} probes on {} workers in {:.2}s",
            stats.tasks,
            stats.workers,
            stats.duration.as_secs_f64()
        );
        results
    }
}
