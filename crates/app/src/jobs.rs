//! Background jobs of the `bankfeed` process.

use std::{sync::Arc, time::Duration};

use engine::{Engine, HistoryPolicy, Integration, SyncCmd};
use tokio::time::MissedTickBehavior;

use crate::settings;

/// Build the sync command a periodic run issues.
pub fn sync_command(sync: &settings::Sync, incremental_days: u32) -> SyncCmd {
    let history = if sync.history {
        HistoryPolicy::FullHistory
    } else {
        HistoryPolicy::FixedWindow(incremental_days)
    };
    SyncCmd {
        transactions: sync.transactions,
        ..SyncCmd::all(chrono::Duration::seconds(sync.max_age_secs.max(0)), history)
    }
}

/// Sync every requisition on a fixed interval.
///
/// A failed run is logged; the next tick runs again.
pub async fn sync_periodically(
    engine: Arc<Engine>,
    integration: Integration,
    sync: settings::Sync,
) {
    let cmd = sync_command(&sync, engine.settings().incremental_days);
    // The first tick fires immediately.
    let mut interval = tokio::time::interval(Duration::from_secs(sync.interval_secs.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        tracing::info!("starting periodic sync");
        match engine.sync(&integration, &cmd).await {
            Ok(report) => tracing::info!(
                requisitions = report.requisitions,
                accounts = report.accounts_synced,
                skipped = report.accounts_skipped,
                transactions = report.transactions,
                "periodic sync done"
            ),
            Err(err) if err.is_transient() => {
                tracing::warn!("periodic sync failed, will retry next tick: {err}")
            }
            Err(err) => tracing::error!("periodic sync failed: {err}"),
        }
    }
}
