use super::reconciler::Reconciler;
use std::{sync::Arc, time::Duration};
use tokio::{
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Run a reconciliation scan every `period` until `shutdown` is cancelled.
///
/// The first scan starts immediately. A scan that overruns its slot delays
/// the next one instead of stacking runs; an in-flight scan is allowed to
/// finish after shutdown is requested.
pub fn spawn_reconciliation(
    reconciler: Arc<Reconciler>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period_secs = period.as_secs_f64(), "reconciliation scheduler started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let report = reconciler.run().await;
                    if !report.is_clean() {
                        warn!(
                            failed = report.failed,
                            enumeration_error = report.enumeration_error.as_deref(),
                            "reconciliation scan finished with errors"
                        );
                    }
                }
            }
        }

        info!("reconciliation scheduler stopped");
    })
}
