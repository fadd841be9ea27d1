use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, warn};

use meridian_core::config::DedupeConfig;
use meridian_core::types::{DedupEvent, Platform};
use meridian_storage::Storage;

/// Event deduplication (persistent) plus per-chat response throttling
/// (in-memory).
pub struct DedupeManager {
    storage: Arc<Storage>,
    config: DedupeConfig,
    /// (platform:chat_id) → time of our last response in that chat.
    throttle: DashMap<String, Instant>,
}

impl DedupeManager {
    pub fn new(storage: Arc<Storage>, config: DedupeConfig) -> Self {
        Self {
            storage,
            config,
            throttle: DashMap::new(),
        }
    }

    /// True if this event was already admitted past the gate.
    ///
    /// A storage read failure degrades to "not a duplicate": an occasional
    /// double response beats going silent.
    pub fn is_duplicate(&self, platform: Platform, event_id: &str) -> bool {
        match self
            .storage
            .check_dedupe_event(platform, event_id, self.config.ttl_seconds)
        {
            Ok(seen) => seen,
            Err(e) => {
                warn!(error = %e, %platform, event_id, "dedupe read failed");
                false
            }
        }
    }

    /// Record that a user-visible action was decided for this event.
    ///
    /// Write failures propagate: the caller must drop the response rather
    /// than risk a double send on retry.
    pub fn mark_processed(
        &self,
        platform: Platform,
        event_id: &str,
        chat_id: &str,
    ) -> meridian_storage::Result<()> {
        let event = DedupEvent {
            platform,
            event_id: event_id.to_string(),
            chat_id: chat_id.to_string(),
            created_at: Utc::now(),
        };
        self.storage.insert_dedupe_event(&event)?;
        Ok(())
    }

    /// True if we responded to this chat too recently.
    pub fn is_throttled(&self, platform: Platform, chat_id: &str) -> bool {
        let key = throttle_key(platform, chat_id);
        match self.throttle.get(&key) {
            Some(last) => last.elapsed() < Duration::from_secs(self.config.throttle_seconds),
            None => false,
        }
    }

    /// Stamp a response for throttling; lazily sweeps stale entries when the
    /// cache size crosses a multiple of the cleanup multiplier.
    pub fn record_response(&self, platform: Platform, chat_id: &str) {
        let key = throttle_key(platform, chat_id);
        self.throttle.insert(key, Instant::now());

        let multiplier = self.config.cache_cleanup_multiplier as usize;
        if multiplier > 0 && self.throttle.len() % multiplier == 0 {
            self.cleanup_throttle_cache();
        }
    }

    /// Drop entries older than `throttle_seconds × cleanup_multiplier`.
    pub fn cleanup_throttle_cache(&self) {
        let cutoff =
            Duration::from_secs(self.config.throttle_seconds * self.config.cache_cleanup_multiplier);
        let before = self.throttle.len();
        self.throttle.retain(|_, last| last.elapsed() < cutoff);
        let removed = before - self.throttle.len();
        if removed > 0 {
            debug!(removed, "throttle cache swept");
        }
    }
}

fn throttle_key(platform: Platform, chat_id: &str) -> String {
    format!("{}:{}", platform, chat_id)
}
