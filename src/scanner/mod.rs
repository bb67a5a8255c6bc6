//! Scanner module: the bounded worker pool and the engines built on it

pub mod connect;
pub mod discovery;
pub mod engine;
pub mod syn;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};

pub use connect::ConnectEngine;
pub use discovery::DiscoveryEngine;
pub use engine::{ScanEngine, ScanOutcome};
pub use syn::{StealthEngine, StealthReport};

/// Per-task probe run by pool workers.
///
/// Returning `None` drops the task from the output; discovery uses this to
/// leave silent hosts out.
#[async_trait]
pub trait Probe: Send + Sync + 'static {
    type Task: Send + 'static;
    type Output: Send + 'static;

    async fn probe(&self, task: Self::Task) -> Option<Self::Output>;
}

/// Counters for one pool run
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    pub tasks: usize,
    pub outputs: usize,
    pub workers: usize,
    pub duration: Duration,
}

/// Run every task through `probe` on at most `workers` concurrent workers.
///
/// Tasks flow through one shared channel, so each is taken by exactly one
/// worker. The result channel is sized to the task count and closed only
/// after all workers have been joined. Output order is arrival order.
pub async fn run_pool<P: Probe>(
    probe: Arc<P>,
    tasks: Vec<P::Task>,
    workers: usize,
) -> (Vec<P::Output>, PoolStats) {
    let start = Instant::now();
    let total = tasks.len();
    if total == 0 {
        return (Vec::new(), PoolStats::default());
    }
    let worker_count = workers.clamp(1, total);
    log::info!("starting {} workers for {} tasks", worker_count, total);

    let (task_tx, task_rx) = mpsc::channel::<P::Task>(worker_count);
    let task_rx = Arc::new(Mutex::new(task_rx));
    let (result_tx, mut result_rx) = mpsc::channel::<P::Output>(total);

    let producer = tokio::spawn(async move {
        for task in tasks {
            if task_tx.send(task).await.is_err() {
                break;
            }
        }
    });

    let mut handles = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let probe = Arc::clone(&probe);
        let task_rx = Arc::clone(&task_rx);
        let result_tx = result_tx.clone();
        handles.push(tokio::spawn(async move {
            loop {
                let next = task_rx.lock().await.recv().await;
                let Some(task) = next else {
                    break;
                };
                if let Some(output) = probe.probe(task).await {
                    if result_tx.send(output).await.is_err() {
                        break;
                    }
                }
            }
        }));
    }

    // join-then-close: the last sender drops only after every worker exits
    let coordinator = tokio::spawn(async move {
        for joined in futures::future::join_all(handles).await {
            if let Err(e) = joined {
                log::error!("scan worker failed: {}", e);
            }
        }
        drop(result_tx);
    });

    let mut outputs = Vec::with_capacity(total);
    while let Some(output) = result_rx.recv().await {
        outputs.push(output);
    }

    if let Err(e) = producer.await {
        log::error!("task producer failed: {}", e);
    }
    if let Err(e) = coordinator.await {
        log::error!("pool coordinator failed: {}", e);
    }

    let stats = PoolStats {
        tasks: total,
        outputs: outputs.len(),
        workers: worker_count,
        duration: start.elapsed(),
    };
    log::debug!("pool finished: {:?}", stats);
    (outputs, stats)
}
