use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use meridian_core::config::ConfidenceConfig;
use meridian_core::types::{Platform, TimezoneSource, UserTzState};
use meridian_storage::Storage;

/// Stored confidence minus per-day decay since the last update, floored at 0.
///
/// Fractional days count: a half-day-old record has lost half a day of
/// confidence. This is what pushes stale identities back through
/// re-verification.
pub fn effective_confidence(state: &UserTzState, config: &ConfidenceConfig) -> f64 {
    if config.decay_per_day <= 0.0 {
        return state.confidence;
    }
    let elapsed = Utc::now() - state.updated_at;
    let days = elapsed.num_seconds() as f64 / 86_400.0;
    (state.confidence - config.decay_per_day * days).max(0.0)
}

/// Outcome of the effective-timezone disambiguation policy.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveTz {
    pub tz: Option<String>,
    pub confidence: f64,
    pub source: TimezoneSource,
}

impl EffectiveTz {
    fn unknown() -> Self {
        Self {
            tz: None,
            confidence: 0.0,
            source: TimezoneSource::Default,
        }
    }
}

/// Manages user timezone identity and confidence.
pub struct TimezoneIdentity {
    storage: Arc<Storage>,
    config: ConfidenceConfig,
}

impl TimezoneIdentity {
    pub fn new(storage: Arc<Storage>, config: ConfidenceConfig) -> Self {
        Self { storage, config }
    }

    /// The user's stored state. Storage read failures degrade to "not found".
    pub fn get_user_timezone(&self, platform: Platform, user_id: &str) -> Option<UserTzState> {
        match self.storage.get_user_tz_state(platform, user_id) {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, %platform, user_id, "user state read failed; treating as absent");
                None
            }
        }
    }

    /// Resolve the effective timezone for a message, in policy order:
    ///
    /// 1. explicit timezone from the message,
    /// 2. the user's stored timezone when effective confidence clears the
    ///    threshold,
    /// 3. the chat's default timezone,
    /// 4. unknown.
    pub fn get_effective_timezone(
        &self,
        platform: Platform,
        user_id: &str,
        chat_id: &str,
        explicit_tz: Option<&str>,
    ) -> EffectiveTz {
        if let Some(tz) = explicit_tz {
            return EffectiveTz {
                tz: Some(tz.to_string()),
                confidence: 1.0,
                source: TimezoneSource::MessageExplicit,
            };
        }

        if let Some(state) = self.get_user_timezone(platform, user_id) {
            if let Some(tz) = &state.tz_iana {
                let conf = effective_confidence(&state, &self.config);
                if conf >= self.config.threshold {
                    return EffectiveTz {
                        tz: Some(tz.clone()),
                        confidence: conf,
                        source: state.source,
                    };
                }
                debug!(
                    %platform, user_id, confidence = conf,
                    "stored timezone below threshold"
                );
            }
        }

        match self.storage.get_chat_state(platform, chat_id) {
            Ok(Some(chat)) if chat.default_tz.is_some() => EffectiveTz {
                tz: chat.default_tz,
                confidence: self.config.chat_default,
                source: TimezoneSource::ChatDefault,
            },
            Ok(_) => EffectiveTz::unknown(),
            Err(e) => {
                warn!(error = %e, %platform, chat_id, "chat state read failed");
                EffectiveTz::unknown()
            }
        }
    }

    /// Write a new timezone for the user. The source determines the initial
    /// confidence unless an override is given; `last_verified_at` is stamped
    /// only for web verification.
    pub fn update_user_timezone(
        &self,
        platform: Platform,
        user_id: &str,
        tz_iana: &str,
        source: TimezoneSource,
        confidence: Option<f64>,
    ) -> meridian_storage::Result<UserTzState> {
        let confidence = confidence.unwrap_or_else(|| self.initial_confidence(source));
        let now = Utc::now();
        let state = UserTzState {
            platform,
            user_id: user_id.to_string(),
            tz_iana: Some(tz_iana.to_string()),
            confidence,
            source,
            created_at: now,
            updated_at: now,
            last_verified_at: (source == TimezoneSource::WebVerified).then_some(now),
        };
        self.storage.upsert_user_tz_state(&state)?;
        debug!(%platform, user_id, tz = tz_iana, source = source.as_str(), confidence,
            "user timezone updated");
        Ok(state)
    }

    /// Relocation invalidation: confidence drops to the reset value but the
    /// old timezone stays for historical reference. The next time-bearing
    /// message from this user forces re-verification.
    pub fn reset_confidence(
        &self,
        platform: Platform,
        user_id: &str,
    ) -> meridian_storage::Result<()> {
        if let Some(mut state) = self.get_user_timezone(platform, user_id) {
            state.confidence = self.config.relocation_reset;
            state.updated_at = Utc::now();
            self.storage.upsert_user_tz_state(&state)?;
            debug!(%platform, user_id, "confidence reset for relocation");
        }
        Ok(())
    }

    /// Should this user be sent through verification?
    pub fn should_prompt_verification(&self, state: Option<&UserTzState>) -> bool {
        match state {
            None => true,
            Some(s) if s.tz_iana.is_none() => true,
            Some(s) => effective_confidence(s, &self.config) < self.config.threshold,
        }
    }

    fn initial_confidence(&self, source: TimezoneSource) -> f64 {
        match source {
            TimezoneSource::WebVerified => self.config.verified,
            TimezoneSource::CityPick => self.config.city_pick,
            TimezoneSource::RelocationConfirmed => self.config.relocation_confirmed,
            TimezoneSource::MessageExplicit => self.config.message_explicit,
            TimezoneSource::Inferred => self.config.inferred,
            TimezoneSource::ChatDefault => self.config.chat_default,
            TimezoneSource::Default => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn manager() -> TimezoneIdentity {
        TimezoneIdentity::new(
            Arc::new(Storage::open_in_memory().unwrap()),
            ConfidenceConfig::default(),
        )
    }

    fn state_updated_days_ago(confidence: f64, days: i64) -> UserTzState {
        let now = Utc::now();
        UserTzState {
            platform: Platform::Telegram,
            user_id: "u1".to_string(),
            tz_iana: Some("Europe/Moscow".to_string()),
            confidence,
            source: TimezoneSource::CityPick,
            created_at: now - Duration::days(days),
            updated_at: now - Duration::days(days),
            last_verified_at: None,
        }
    }

    #[test]
    fn decay_is_monotone_and_floored() {
        let config = ConfidenceConfig::default();
        let fresh = effective_confidence(&state_updated_days_ago(1.0, 0), &config);
        let month = effective_confidence(&state_updated_days_ago(1.0, 30), &config);
        let ancient = effective_confidence(&state_updated_days_ago(1.0, 10_000), &config);
        assert!(fresh > month);
        assert!(month > ancient || month == 0.0);
        assert_eq!(ancient, 0.0);
        assert!((fresh - 1.0).abs() < 0.001);
    }

    #[test]
    fn zero_decay_returns_stored_confidence() {
        let config = ConfidenceConfig {
            decay_per_day: 0.0,
            ..Default::default()
        };
        let old = state_updated_days_ago(0.8, 365);
        assert_eq!(effective_confidence(&old, &config), 0.8);
    }

    #[test]
    fn explicit_hint_wins() {
        let m = manager();
        let eff = m.get_effective_timezone(Platform::Telegram, "u1", "c1", Some("Asia/Tokyo"));
        assert_eq!(eff.tz.as_deref(), Some("Asia/Tokyo"));
        assert_eq!(eff.confidence, 1.0);
        assert_eq!(eff.source, TimezoneSource::MessageExplicit);
    }

    #[test]
    fn stored_tz_used_when_confident() {
        let m = manager();
        m.update_user_timezone(
            Platform::Telegram,
            "u1",
            "Europe/Moscow",
            TimezoneSource::CityPick,
            None,
        )
        .unwrap();
        let eff = m.get_effective_timezone(Platform::Telegram, "u1", "c1", None);
        assert_eq!(eff.tz.as_deref(), Some("Europe/Moscow"));
        assert!(eff.confidence >= 0.99);
    }

    #[test]
    fn low_confidence_falls_through_to_chat_default() {
        let m = manager();
        m.update_user_timezone(
            Platform::Telegram,
            "u1",
            "Europe/Moscow",
            TimezoneSource::CityPick,
            Some(0.2),
        )
        .unwrap();
        m.storage
            .set_chat_default_tz(Platform::Telegram, "c1", "Europe/Berlin")
            .unwrap();

        let eff = m.get_effective_timezone(Platform::Telegram, "u1", "c1", None);
        assert_eq!(eff.tz.as_deref(), Some("Europe/Berlin"));
        assert_eq!(eff.source, TimezoneSource::ChatDefault);
        assert_eq!(eff.confidence, 0.5);
    }

    #[test]
    fn unknown_when_nothing_resolves() {
        let m = manager();
        let eff = m.get_effective_timezone(Platform::Telegram, "nobody", "nochat", None);
        assert!(eff.tz.is_none());
        assert_eq!(eff.confidence, 0.0);
    }

    #[test]
    fn source_table_confidences() {
        let m = manager();
        for (source, want) in [
            (TimezoneSource::WebVerified, 1.0),
            (TimezoneSource::CityPick, 1.0),
            (TimezoneSource::RelocationConfirmed, 1.0),
            (TimezoneSource::MessageExplicit, 0.9),
            (TimezoneSource::Inferred, 0.6),
        ] {
            let state = m
                .update_user_timezone(Platform::Slack, "u2", "UTC", source, None)
                .unwrap();
            assert_eq!(state.confidence, want, "source {:?}", source);
        }
    }

    #[test]
    fn web_verified_stamps_last_verified_at() {
        let m = manager();
        let state = m
            .update_user_timezone(
                Platform::Telegram,
                "u1",
                "UTC",
                TimezoneSource::WebVerified,
                None,
            )
            .unwrap();
        assert!(state.last_verified_at.is_some());

        let state = m
            .update_user_timezone(
                Platform::Telegram,
                "u1",
                "UTC",
                TimezoneSource::CityPick,
                None,
            )
            .unwrap();
        assert!(state.last_verified_at.is_none());
    }

    #[test]
    fn relocation_reset_keeps_tz_drops_confidence() {
        let m = manager();
        m.update_user_timezone(
            Platform::Telegram,
            "u1",
            "Europe/Berlin",
            TimezoneSource::WebVerified,
            None,
        )
        .unwrap();
        m.reset_confidence(Platform::Telegram, "u1").unwrap();

        let state = m.get_user_timezone(Platform::Telegram, "u1").unwrap();
        assert_eq!(state.tz_iana.as_deref(), Some("Europe/Berlin"));
        assert_eq!(state.confidence, 0.0);
        assert!(m.should_prompt_verification(Some(&state)));
    }

    #[test]
    fn should_prompt_for_missing_or_stale() {
        let m = manager();
        assert!(m.should_prompt_verification(None));
        let confident = state_updated_days_ago(1.0, 0);
        assert!(!m.should_prompt_verification(Some(&confident)));
        let stale = state_updated_days_ago(0.71, 30); // 0.71 - 0.3 < 0.7
        assert!(m.should_prompt_verification(Some(&stale)));
    }
}
