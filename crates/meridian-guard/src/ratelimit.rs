use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::info;

use meridian_core::config::{RateLimitConfig, RateLimitsConfig};

/// Which limit rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    User,
    Chat,
}

impl LimitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitKind::User => "user",
            LimitKind::Chat => "chat",
        }
    }
}

/// Sliding-window limiter: per key, keep the request instants inside the
/// window and reject once the count reaches the cap.
struct SlidingWindow {
    requests: usize,
    window: Duration,
    entries: Mutex<HashMap<String, Vec<Instant>>>,
}

impl SlidingWindow {
    fn new(config: &RateLimitConfig) -> Self {
        Self {
            requests: config.requests,
            window: Duration::from_secs(config.window_seconds),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Admit (and record) or reject the request.
    fn is_allowed(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        let bucket = entries.entry(key.to_string()).or_default();
        bucket.retain(|t| now.duration_since(*t) < self.window);

        if bucket.len() >= self.requests {
            return false;
        }
        bucket.push(now);
        true
    }

    /// Seconds until the oldest in-window request falls out.
    fn retry_after(&self, key: &str) -> u64 {
        let now = Instant::now();
        let entries = self.entries.lock().unwrap();
        let Some(bucket) = entries.get(key) else {
            return 0;
        };
        let in_window: Vec<&Instant> = bucket
            .iter()
            .filter(|t| now.duration_since(**t) < self.window)
            .collect();
        if in_window.len() < self.requests {
            return 0;
        }
        match in_window.iter().min() {
            Some(oldest) => {
                let age = now.duration_since(**oldest);
                self.window.saturating_sub(age).as_secs()
            }
            None => 0,
        }
    }

    fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

/// Per-user and per-chat sliding-window rate limits with a lifetime-capped
/// notification budget per user.
pub struct RateLimitManager {
    enabled: bool,
    user_limiter: SlidingWindow,
    chat_limiter: SlidingWindow,
    max_notifications: u32,
    /// (platform:user_id) → notices already sent.
    notices_sent: DashMap<String, u32>,
}

impl RateLimitManager {
    pub fn new(config: &RateLimitsConfig) -> Self {
        Self {
            enabled: config.enabled,
            user_limiter: SlidingWindow::new(&config.per_user),
            chat_limiter: SlidingWindow::new(&config.per_chat),
            max_notifications: config.max_notifications,
            notices_sent: DashMap::new(),
        }
    }

    /// Check both limits; the user limit is checked first and the first
    /// breached limit names the reason.
    pub fn check_rate_limit(
        &self,
        platform: &str,
        user_id: &str,
        chat_id: &str,
    ) -> (bool, Option<LimitKind>) {
        if !self.enabled {
            return (true, None);
        }

        let user_key = format!("{}:{}", platform, user_id);
        let chat_key = format!("{}:{}", platform, chat_id);

        if !self.user_limiter.is_allowed(&user_key) {
            info!(
                key = %user_key,
                retry_after = self.user_limiter.retry_after(&user_key),
                "rate limited: user"
            );
            return (false, Some(LimitKind::User));
        }
        if !self.chat_limiter.is_allowed(&chat_key) {
            info!(
                key = %chat_key,
                retry_after = self.chat_limiter.retry_after(&chat_key),
                "rate limited: chat"
            );
            return (false, Some(LimitKind::Chat));
        }
        (true, None)
    }

    pub fn user_retry_after(&self, platform: &str, user_id: &str) -> u64 {
        self.user_limiter
            .retry_after(&format!("{}:{}", platform, user_id))
    }

    pub fn chat_retry_after(&self, platform: &str, chat_id: &str) -> u64 {
        self.chat_limiter
            .retry_after(&format!("{}:{}", platform, chat_id))
    }

    /// Spend one unit of the user's lifetime notice budget. Returns whether
    /// a "rate limited" notice may be sent.
    pub fn take_notice_budget(&self, platform: &str, user_id: &str) -> bool {
        let key = format!("{}:{}", platform, user_id);
        let mut count = self.notices_sent.entry(key).or_insert(0);
        if *count >= self.max_notifications {
            return false;
        }
        *count += 1;
        true
    }

    pub fn clear(&self) {
        self.user_limiter.clear();
        self.chat_limiter.clear();
        self.notices_sent.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(user_requests: usize, chat_requests: usize) -> RateLimitsConfig {
        RateLimitsConfig {
            enabled: true,
            per_user: RateLimitConfig {
                requests: user_requests,
                window_seconds: 60,
            },
            per_chat: RateLimitConfig {
                requests: chat_requests,
                window_seconds: 60,
            },
            max_notifications: 3,
        }
    }

    #[test]
    fn user_limit_breached_first() {
        let m = RateLimitManager::new(&config(2, 100));
        assert_eq!(m.check_rate_limit("telegram", "u1", "c1"), (true, None));
        assert_eq!(m.check_rate_limit("telegram", "u1", "c1"), (true, None));
        assert_eq!(
            m.check_rate_limit("telegram", "u1", "c1"),
            (false, Some(LimitKind::User))
        );
        // Another user in the same chat is unaffected.
        assert_eq!(m.check_rate_limit("telegram", "u2", "c1"), (true, None));
    }

    #[test]
    fn chat_limit_names_chat() {
        let m = RateLimitManager::new(&config(100, 2));
        m.check_rate_limit("telegram", "u1", "c1");
        m.check_rate_limit("telegram", "u2", "c1");
        assert_eq!(
            m.check_rate_limit("telegram", "u3", "c1"),
            (false, Some(LimitKind::Chat))
        );
    }

    #[test]
    fn retry_after_positive_when_limited() {
        let m = RateLimitManager::new(&config(1, 100));
        m.check_rate_limit("telegram", "u1", "c1");
        m.check_rate_limit("telegram", "u1", "c1");
        let retry = m.user_retry_after("telegram", "u1");
        assert!(retry > 0 && retry <= 60);
    }

    #[test]
    fn retry_after_zero_when_not_limited() {
        let m = RateLimitManager::new(&config(10, 10));
        m.check_rate_limit("telegram", "u1", "c1");
        assert_eq!(m.user_retry_after("telegram", "u1"), 0);
    }

    #[test]
    fn disabled_limits_admit_everything() {
        let mut cfg = config(0, 0);
        cfg.enabled = false;
        let m = RateLimitManager::new(&cfg);
        for _ in 0..100 {
            assert_eq!(m.check_rate_limit("telegram", "u1", "c1"), (true, None));
        }
    }

    #[test]
    fn notice_budget_is_lifetime_capped() {
        let m = RateLimitManager::new(&config(1, 100));
        assert!(m.take_notice_budget("telegram", "u1"));
        assert!(m.take_notice_budget("telegram", "u1"));
        assert!(m.take_notice_budget("telegram", "u1"));
        assert!(!m.take_notice_budget("telegram", "u1"));
        // Other users have their own budget.
        assert!(m.take_notice_budget("telegram", "u2"));
    }

    #[test]
    fn platforms_are_separate_buckets() {
        let m = RateLimitManager::new(&config(1, 100));
        assert_eq!(m.check_rate_limit("telegram", "u1", "c1"), (true, None));
        assert_eq!(m.check_rate_limit("slack", "u1", "c1"), (true, None));
    }
}
