//! Periodic reconciliation of every known owner.

use std::time::Duration;

use orchestrator::Reconciler;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

/// Background scan task; aborted when dropped.
pub struct ReconcileScheduler {
    handle: JoinHandle<()>,
}

impl ReconcileScheduler {
    /// Start scanning every `period`, first tick one period from now.
    pub fn spawn(reconciler: Reconciler, period: Duration) -> Self {
        info!("Periodic reconciliation every {:?}", period);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                run_once(&reconciler).await;
            }
        });

        Self { handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn stop(self) {}
}

impl Drop for ReconcileScheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run_once(reconciler: &Reconciler) {
    let reports = match reconciler.scan_known_owners().await {
        Ok(reports) => reports,
        Err(e) => {
            warn!("Periodic reconciliation could not list owners: {}", e);
            return;
        }
    };

    for (owner_id, report) in reports {
        match report {
            Ok(report) if report.success() => {}
            Ok(report) => warn!(
                owner_id = %owner_id,
                failed = report.failed.len(),
                "Periodic scan had failed queries"
            ),
            Err(e) => warn!(owner_id = %owner_id, error = %e, "Periodic scan failed"),
        }
    }
}
