use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use meridian_storage::Storage;

const SWEEP_INTERVAL_SECS: u64 = 60;

/// Background sweeper: drops expired dedup records and flips expired
/// sessions to EXPIRED. Aborted on shutdown.
pub fn spawn_cleaner(storage: Arc<Storage>, dedupe_ttl_seconds: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
        // The immediate first tick is fine; sweeps are idempotent.
        loop {
            interval.tick().await;
            match storage.sweep_expired_dedupe(dedupe_ttl_seconds) {
                Ok(removed) if removed > 0 => debug!(removed, "dedupe records swept"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "dedupe sweep failed"),
            }
            match storage.sweep_expired_sessions() {
                Ok(expired) if expired > 0 => debug!(expired, "sessions expired"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "session sweep failed"),
            }
        }
    })
}
