use std::{sync::Arc, time::Duration};

use log::*;
use paygate_tools::PaygateApi;
use settlement_engine::{settlement_objects::ReconciliationReport, SettlementApi, SqliteDatabase};
use tokio::task::JoinHandle;

/// Starts the reconciliation worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Each pass re-grants entitlements that completed orders are missing, and asks the gateway about orders that have
/// been pending for too long.
pub fn start_reconciliation_worker(
    api: Arc<SettlementApi<SqliteDatabase, PaygateApi>>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        info!("🕰️ Reconciliation worker started. Running every {}s", interval.as_secs());
        loop {
            timer.tick().await;
            debug!("🕰️ Running reconciliation job");
            match api.reconcile().await {
                Ok(report) => log_report(&report),
                Err(e) => {
                    error!("🕰️ Error running reconciliation job: {e}");
                },
            }
        }
    })
}

fn log_report(report: &ReconciliationReport) {
    if report == &ReconciliationReport::default() {
        debug!("🕰️ Reconciliation found nothing to do");
        return;
    }
    info!(
        "🕰️ Reconciliation: {} order(s) re-granted, {} stale order(s) inquired, {} settled, {} error(s)",
        report.regranted, report.inquired, report.settled, report.errors
    );
}
