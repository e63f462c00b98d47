//! Periodic removal of expired correlations.

use std::{sync::Arc, time::Duration};

use {
    tokio::{task::JoinHandle, time::MissedTickBehavior},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{Result, store::CorrelationStore};

/// Delete every correlation whose timestamp is at or before `now - retention`.
pub async fn sweep_once(
    store: &dyn CorrelationStore,
    retention: Duration,
    now: i64,
) -> Result<u64> {
    let retention_secs = i64::try_from(retention.as_secs()).unwrap_or(i64::MAX);
    let threshold = now.saturating_sub(retention_secs);
    let removed = store.delete_older_than(threshold).await?;
    if removed > 0 {
        info!(removed, threshold, "expired correlations removed");
    } else {
        debug!(threshold, "no expired correlations");
    }
    Ok(removed)
}

/// Run [`sweep_once`] every `interval` until `cancel` fires. The first sweep
/// runs immediately.
pub fn spawn_retention_sweep(
    store: Arc<dyn CorrelationStore>,
    interval: Duration,
    retention: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_secs = interval.as_secs(),
            retention_secs = retention.as_secs(),
            "retention sweep started"
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let now = ferry_common::time::unix_now();
                    if let Err(e) = sweep_once(store.as_ref(), retention, now).await {
                        warn!(error = %e, "retention sweep failed");
                    }
                },
            }
        }
        debug!("retention sweep stopped");
    })
}
