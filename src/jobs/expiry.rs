//! Background job: delete notifications whose `expires_at` has passed.
//!
//! Reads already hide expired rows; this sweep keeps the table from growing
//! with them.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time;

use crate::store::NotificationStore;

/// Spawn the background expiry sweep. Call this once at startup.
pub fn spawn(store: Arc<dyn NotificationStore>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = time::interval(every);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(e) = sweep(store.as_ref()).await {
                tracing::error!("expiry job failed: {}", e);
            }
        }
    });
}

/// Run one sweep and return how many notifications were removed.
pub async fn sweep(store: &dyn NotificationStore) -> anyhow::Result<u64> {
    let removed = store.purge_expired(Utc::now()).await?;
    if removed > 0 {
        tracing::info!(rows = removed, "purged expired notifications");
    }
    Ok(removed)
}
