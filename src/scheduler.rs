// Cycle scheduler - triggers discovery on a long fixed interval and
// reconciliation on a short one. Reconciliation and reclaim run as
// sequential phases of one cycle, never as concurrent tasks, so a single
// logical writer touches any given address. Shutdown is cooperative: the
// flag is checked between cycles and an in-flight cycle runs to completion.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::discovery::DiscoveryEngine;
use crate::monitor::ReconcileEngine;
use crate::reclaim::ReclaimExecutor;

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub discovery_interval: Duration,
    pub reconcile_interval: Duration,
    /// Run the batch reclaim as the second phase of each reconciliation
    /// cycle.
    pub auto_reclaim: bool,
    pub dry_run: bool,
}

pub struct ReclaimScheduler {
    config: ScheduleConfig,
    discovery: Arc<DiscoveryEngine>,
    monitor: Arc<ReconcileEngine>,
    executor: Arc<ReclaimExecutor>,
}

impl ReclaimScheduler {
    pub fn new(
        config: ScheduleConfig,
        discovery: Arc<DiscoveryEngine>,
        monitor: Arc<ReconcileEngine>,
        executor: Arc<ReclaimExecutor>,
    ) -> Self {
        Self {
            config,
            discovery,
            monitor,
            executor,
        }
    }

    /// Start the scheduler (runs in background until the shutdown flag flips).
    pub fn start(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut discovery_tick = interval(self.config.discovery_interval);
            let mut reconcile_tick = interval(self.config.reconcile_interval);

            info!(
                "⏰ Scheduler started: discovery every {:?}, reconciliation every {:?}",
                self.config.discovery_interval, self.config.reconcile_interval
            );

            loop {
                tokio::select! {
                    _ = discovery_tick.tick() => self.run_discovery_cycle().await,
                    _ = reconcile_tick.tick() => self.run_reconciliation_cycle().await,
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("🛑 Scheduler stopping: no further cycles will start");
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Manual trigger hook: one discovery cycle.
    pub async fn run_discovery_cycle(&self) {
        match self.discovery.run().await {
            Ok(report) => {
                if !report.errors.is_empty() {
                    error!(
                        "Discovery finished with {} errors: {:?}",
                        report.errors.len(),
                        report.errors
                    );
                }
            }
            Err(e) if e.is_transient() => {
                warn!("⚠️ Discovery cycle failed, retrying next cycle: {e}")
            }
            Err(e) => error!("❌ Discovery cycle failed: {e}"),
        }
    }

    /// Manual trigger hook: one reconciliation cycle, then (when enabled)
    /// the batch reclaim phase.
    pub async fn run_reconciliation_cycle(&self) {
        match self.monitor.run().await {
            Ok(report) => {
                for change in &report.changes {
                    info!(
                        "📌 {}: {} -> {} ({})",
                        change.address, change.previous, change.new, change.reason
                    );
                }
            }
            Err(e) => {
                if e.is_transient() {
                    warn!("⚠️ Reconciliation cycle failed, retrying next cycle: {e}");
                } else {
                    error!("❌ Reconciliation cycle failed: {e}");
                }
                return;
            }
        }

        if self.config.auto_reclaim {
            if let Err(e) = self.executor.reclaim_all(self.config.dry_run).await {
                error!("❌ Batch reclaim phase failed: {e}");
            }
        }
    }
}
