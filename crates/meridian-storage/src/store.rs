use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, warn};

use meridian_core::types::{
    ChatState, DedupEvent, Platform, Session, SessionContext, SessionStatus, TimezoneSource,
    UserTzState,
};

use crate::db::init_db;
use crate::error::{Result, StorageError};

/// Thread-safe storage over a single SQLite connection.
///
/// Wraps the connection in a `Mutex`; callers hold the lock only for the
/// duration of one statement or one small transaction.
pub struct Storage {
    db: Mutex<Connection>,
}

/// Timestamps are stored as RFC3339 with fixed microsecond precision and a
/// `Z` suffix so string comparison in SQL matches chronological order.
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::CorruptRow(format!("bad timestamp {:?}: {}", s, e)))
}

impl Storage {
    /// Open (creating if needed) the database at `path` and initialise tables.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Cheap connectivity probe for the /ready endpoint.
    pub fn ping(&self) -> bool {
        let db = self.db.lock().unwrap();
        db.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map(|v| v == 1)
            .unwrap_or(false)
    }

    // ── users ─────────────────────────────────────────────────────────────────

    pub fn get_user_tz_state(
        &self,
        platform: Platform,
        user_id: &str,
    ) -> Result<Option<UserTzState>> {
        let db = self.db.lock().unwrap();
        let row = db
            .query_row(
                "SELECT platform, user_id, tz_iana, confidence, source,
                        created_at, updated_at, last_verified_at
                 FROM users WHERE platform = ?1 AND user_id = ?2",
                rusqlite::params![platform.as_str(), user_id],
                row_to_user_state,
            )
            .optional()?;
        row.transpose()
    }

    pub fn upsert_user_tz_state(&self, state: &UserTzState) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO users
                 (platform, user_id, tz_iana, confidence, source,
                  created_at, updated_at, last_verified_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (platform, user_id) DO UPDATE SET
                 tz_iana          = excluded.tz_iana,
                 confidence       = excluded.confidence,
                 source           = excluded.source,
                 updated_at       = excluded.updated_at,
                 last_verified_at = excluded.last_verified_at",
            rusqlite::params![
                state.platform.as_str(),
                state.user_id,
                state.tz_iana,
                state.confidence,
                state.source.as_str(),
                ts(state.created_at),
                ts(state.updated_at),
                state.last_verified_at.map(ts),
            ],
        )?;
        Ok(())
    }

    // ── chats ─────────────────────────────────────────────────────────────────

    pub fn get_chat_state(&self, platform: Platform, chat_id: &str) -> Result<Option<ChatState>> {
        let db = self.db.lock().unwrap();
        let row = db
            .query_row(
                "SELECT platform, chat_id, default_tz, user_timezones,
                        active_timezones, created_at, updated_at
                 FROM chats WHERE platform = ?1 AND chat_id = ?2",
                rusqlite::params![platform.as_str(), chat_id],
                row_to_chat_state,
            )
            .optional()?;
        row.transpose()
    }

    /// Set one user's timezone in a chat and recompute the active set.
    ///
    /// The only supported mutation path for `active_timezones`: both writes
    /// happen inside a single transaction so the projection invariant
    /// (`active == sorted(set(user_timezones.values()))`) always holds.
    pub fn update_user_timezone_in_chat(
        &self,
        platform: Platform,
        chat_id: &str,
        user_id: &str,
        tz_iana: &str,
    ) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        let now = ts(Utc::now());

        tx.execute(
            "INSERT INTO chats (platform, chat_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT (platform, chat_id) DO NOTHING",
            rusqlite::params![platform.as_str(), chat_id, now],
        )?;

        let raw: String = tx.query_row(
            "SELECT user_timezones FROM chats WHERE platform = ?1 AND chat_id = ?2",
            rusqlite::params![platform.as_str(), chat_id],
            |row| row.get(0),
        )?;
        let mut user_timezones: BTreeMap<String, String> = serde_json::from_str(&raw)?;
        user_timezones.insert(user_id.to_string(), tz_iana.to_string());

        let mut active: Vec<String> = user_timezones.values().cloned().collect();
        active.sort();
        active.dedup();

        tx.execute(
            "UPDATE chats
             SET user_timezones = ?3, active_timezones = ?4, updated_at = ?5
             WHERE platform = ?1 AND chat_id = ?2",
            rusqlite::params![
                platform.as_str(),
                chat_id,
                serde_json::to_string(&user_timezones)?,
                serde_json::to_string(&active)?,
                now,
            ],
        )?;

        tx.commit()?;
        debug!(platform = %platform, chat_id, user_id, tz = tz_iana, "chat projection updated");
        Ok(())
    }

    pub fn set_chat_default_tz(
        &self,
        platform: Platform,
        chat_id: &str,
        tz_iana: &str,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = ts(Utc::now());
        db.execute(
            "INSERT INTO chats (platform, chat_id, default_tz, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT (platform, chat_id) DO UPDATE SET
                 default_tz = excluded.default_tz,
                 updated_at = excluded.updated_at",
            rusqlite::params![platform.as_str(), chat_id, tz_iana, now],
        )?;
        Ok(())
    }

    // ── dedupe ────────────────────────────────────────────────────────────────

    /// True if the event exists within the TTL window.
    pub fn check_dedupe_event(
        &self,
        platform: Platform,
        event_id: &str,
        ttl_seconds: u64,
    ) -> Result<bool> {
        let cutoff = ts(Utc::now() - chrono::Duration::seconds(ttl_seconds as i64));
        let db = self.db.lock().unwrap();
        let found: Option<String> = db
            .query_row(
                "SELECT created_at FROM dedupe_events
                 WHERE platform = ?1 AND event_id = ?2 AND created_at >= ?3",
                rusqlite::params![platform.as_str(), event_id, cutoff],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Insert a dedup record. Returns false on duplicate (lost race).
    pub fn insert_dedupe_event(&self, event: &DedupEvent) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let inserted = db.execute(
            "INSERT OR IGNORE INTO dedupe_events (platform, event_id, chat_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                event.platform.as_str(),
                event.event_id,
                event.chat_id,
                ts(event.created_at),
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Drop dedup records older than the TTL. Returns rows removed.
    pub fn sweep_expired_dedupe(&self, ttl_seconds: u64) -> Result<usize> {
        let cutoff = ts(Utc::now() - chrono::Duration::seconds(ttl_seconds as i64));
        let db = self.db.lock().unwrap();
        let removed = db.execute(
            "DELETE FROM dedupe_events WHERE created_at < ?1",
            rusqlite::params![cutoff],
        )?;
        Ok(removed)
    }

    // ── sessions ──────────────────────────────────────────────────────────────

    /// Active, unexpired session for (platform, chat_id, user_id).
    ///
    /// A row past its `expires_at` is flipped to EXPIRED and treated as absent.
    pub fn get_active_session(
        &self,
        platform: Platform,
        chat_id: &str,
        user_id: &str,
    ) -> Result<Option<Session>> {
        let session = {
            let db = self.db.lock().unwrap();
            db.query_row(
                "SELECT session_id, platform, chat_id, user_id, goal, status,
                        context, created_at, updated_at, expires_at
                 FROM sessions
                 WHERE platform = ?1 AND chat_id = ?2 AND user_id = ?3
                   AND status = 'ACTIVE'",
                rusqlite::params![platform.as_str(), chat_id, user_id],
                row_to_session,
            )
            .optional()?
            .transpose()?
        };

        match session {
            Some(s) if s.expires_at <= Utc::now() => {
                warn!(session_id = %s.session_id, "session expired; closing");
                self.close_session(&s.session_id, SessionStatus::Expired)?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Create a session. The partial unique index on ACTIVE rows rejects a
    /// second concurrent creation; the loser gets `DuplicateKey` and should
    /// re-read the winner.
    pub fn create_session(&self, session: &Session) -> Result<()> {
        let db = self.db.lock().unwrap();
        let result = db.execute(
            "INSERT INTO sessions
                 (session_id, platform, chat_id, user_id, goal, status,
                  context, created_at, updated_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                session.session_id,
                session.platform.as_str(),
                session.chat_id,
                session.user_id,
                session.goal.as_str(),
                session.status.as_str(),
                serde_json::to_string(&session.context)?,
                ts(session.created_at),
                ts(session.updated_at),
                ts(session.expires_at),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::DuplicateKey(format!(
                    "active session exists for {}/{}/{}",
                    session.platform, session.chat_id, session.user_id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn update_session(&self, session: &Session) -> Result<()> {
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE sessions
             SET status = ?2, context = ?3, updated_at = ?4
             WHERE session_id = ?1",
            rusqlite::params![
                session.session_id,
                session.status.as_str(),
                serde_json::to_string(&session.context)?,
                ts(Utc::now()),
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(session.session_id.clone()));
        }
        Ok(())
    }

    pub fn close_session(&self, session_id: &str, status: SessionStatus) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE sessions SET status = ?2, updated_at = ?3 WHERE session_id = ?1",
            rusqlite::params![session_id, status.as_str(), ts(Utc::now())],
        )?;
        Ok(())
    }

    /// Flip ACTIVE sessions past their deadline to EXPIRED. Returns rows changed.
    pub fn sweep_expired_sessions(&self) -> Result<usize> {
        let now = ts(Utc::now());
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE sessions SET status = 'EXPIRED', updated_at = ?1
             WHERE status = 'ACTIVE' AND expires_at < ?1",
            rusqlite::params![now],
        )?;
        Ok(changed)
    }
}

// ── row mappers ───────────────────────────────────────────────────────────────

fn row_to_user_state(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<UserTzState>> {
    let platform: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let tz_iana: Option<String> = row.get(2)?;
    let confidence: f64 = row.get(3)?;
    let source: String = row.get(4)?;
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;
    let last_verified_at: Option<String> = row.get(7)?;

    Ok((|| {
        Ok(UserTzState {
            platform: Platform::from_str(&platform).map_err(StorageError::CorruptRow)?,
            user_id,
            tz_iana,
            confidence,
            source: TimezoneSource::from_str(&source).unwrap_or_default(),
            created_at: parse_ts(&created_at)?,
            updated_at: parse_ts(&updated_at)?,
            last_verified_at: last_verified_at.as_deref().map(parse_ts).transpose()?,
        })
    })())
}

fn row_to_chat_state(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<ChatState>> {
    let platform: String = row.get(0)?;
    let chat_id: String = row.get(1)?;
    let default_tz: Option<String> = row.get(2)?;
    let user_timezones: String = row.get(3)?;
    let active_timezones: String = row.get(4)?;
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;

    Ok((|| {
        Ok(ChatState {
            platform: Platform::from_str(&platform).map_err(StorageError::CorruptRow)?,
            chat_id,
            default_tz,
            user_timezones: serde_json::from_str(&user_timezones)?,
            active_timezones: serde_json::from_str(&active_timezones)?,
            created_at: parse_ts(&created_at)?,
            updated_at: parse_ts(&updated_at)?,
        })
    })())
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<Session>> {
    let session_id: String = row.get(0)?;
    let platform: String = row.get(1)?;
    let chat_id: String = row.get(2)?;
    let user_id: String = row.get(3)?;
    let goal: String = row.get(4)?;
    let status: String = row.get(5)?;
    let context: String = row.get(6)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;
    let expires_at: String = row.get(9)?;

    Ok((|| {
        Ok(Session {
            session_id,
            platform: Platform::from_str(&platform).map_err(StorageError::CorruptRow)?,
            chat_id,
            user_id,
            goal: goal.parse().map_err(StorageError::CorruptRow)?,
            status: status.parse().map_err(StorageError::CorruptRow)?,
            context: serde_json::from_str::<SessionContext>(&context)?,
            created_at: parse_ts(&created_at)?,
            updated_at: parse_ts(&updated_at)?,
            expires_at: parse_ts(&expires_at)?,
        })
    })())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use meridian_core::types::SessionGoal;

    fn user_state(tz: Option<&str>, conf: f64) -> UserTzState {
        let now = Utc::now();
        UserTzState {
            platform: Platform::Telegram,
            user_id: "u1".to_string(),
            tz_iana: tz.map(String::from),
            confidence: conf,
            source: TimezoneSource::CityPick,
            created_at: now,
            updated_at: now,
            last_verified_at: None,
        }
    }

    fn session(goal: SessionGoal, expires_in: Duration) -> Session {
        let now = Utc::now();
        Session {
            session_id: format!("s-{}", uuid_like()),
            platform: Platform::Telegram,
            chat_id: "c1".to_string(),
            user_id: "u1".to_string(),
            goal,
            status: SessionStatus::Active,
            context: SessionContext::default(),
            created_at: now,
            updated_at: now,
            expires_at: now + expires_in,
        }
    }

    fn uuid_like() -> u128 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    }

    #[test]
    fn user_state_upsert_and_get() {
        let storage = Storage::open_in_memory().unwrap();
        assert!(storage
            .get_user_tz_state(Platform::Telegram, "u1")
            .unwrap()
            .is_none());

        storage
            .upsert_user_tz_state(&user_state(Some("Europe/Moscow"), 1.0))
            .unwrap();
        let got = storage
            .get_user_tz_state(Platform::Telegram, "u1")
            .unwrap()
            .unwrap();
        assert_eq!(got.tz_iana.as_deref(), Some("Europe/Moscow"));
        assert_eq!(got.confidence, 1.0);

        // Second upsert overwrites mutable fields.
        storage
            .upsert_user_tz_state(&user_state(Some("Europe/London"), 0.5))
            .unwrap();
        let got = storage
            .get_user_tz_state(Platform::Telegram, "u1")
            .unwrap()
            .unwrap();
        assert_eq!(got.tz_iana.as_deref(), Some("Europe/London"));
        assert_eq!(got.confidence, 0.5);
    }

    #[test]
    fn chat_projection_recomputes_active_set() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .update_user_timezone_in_chat(Platform::Slack, "c1", "alice", "Europe/Moscow")
            .unwrap();
        storage
            .update_user_timezone_in_chat(Platform::Slack, "c1", "bob", "Asia/Tokyo")
            .unwrap();
        storage
            .update_user_timezone_in_chat(Platform::Slack, "c1", "carol", "Asia/Tokyo")
            .unwrap();

        let chat = storage
            .get_chat_state(Platform::Slack, "c1")
            .unwrap()
            .unwrap();
        assert_eq!(chat.active_timezones, vec!["Asia/Tokyo", "Europe/Moscow"]);

        // Relocation: alice moves, her old tz leaves the active set.
        storage
            .update_user_timezone_in_chat(Platform::Slack, "c1", "alice", "Asia/Tokyo")
            .unwrap();
        let chat = storage
            .get_chat_state(Platform::Slack, "c1")
            .unwrap()
            .unwrap();
        assert_eq!(chat.active_timezones, vec!["Asia/Tokyo"]);
    }

    #[test]
    fn dedupe_insert_is_idempotent() {
        let storage = Storage::open_in_memory().unwrap();
        let event = DedupEvent {
            platform: Platform::Telegram,
            event_id: "e1".to_string(),
            chat_id: "c1".to_string(),
            created_at: Utc::now(),
        };
        assert!(storage.insert_dedupe_event(&event).unwrap());
        assert!(!storage.insert_dedupe_event(&event).unwrap());
        assert!(storage
            .check_dedupe_event(Platform::Telegram, "e1", 3600)
            .unwrap());
        assert!(!storage
            .check_dedupe_event(Platform::Slack, "e1", 3600)
            .unwrap());
    }

    #[test]
    fn dedupe_expired_entries_are_invisible_and_swept() {
        let storage = Storage::open_in_memory().unwrap();
        let event = DedupEvent {
            platform: Platform::Telegram,
            event_id: "old".to_string(),
            chat_id: "c1".to_string(),
            created_at: Utc::now() - Duration::days(8),
        };
        storage.insert_dedupe_event(&event).unwrap();
        // Within a 7-day TTL the 8-day-old record does not count.
        assert!(!storage
            .check_dedupe_event(Platform::Telegram, "old", 604_800)
            .unwrap());
        assert_eq!(storage.sweep_expired_dedupe(604_800).unwrap(), 1);
    }

    #[test]
    fn only_one_active_session_per_user_per_chat() {
        let storage = Storage::open_in_memory().unwrap();
        let first = session(SessionGoal::AwaitingTimezone, Duration::minutes(30));
        storage.create_session(&first).unwrap();

        let second = session(SessionGoal::ConfirmRelocation, Duration::minutes(30));
        let err = storage.create_session(&second).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey(_)));

        // Closing the first frees the slot.
        storage
            .close_session(&first.session_id, SessionStatus::Completed)
            .unwrap();
        storage.create_session(&second).unwrap();
    }

    #[test]
    fn expired_session_is_treated_as_absent() {
        let storage = Storage::open_in_memory().unwrap();
        let s = session(SessionGoal::AwaitingTimezone, Duration::seconds(-5));
        storage.create_session(&s).unwrap();
        assert!(storage
            .get_active_session(Platform::Telegram, "c1", "u1")
            .unwrap()
            .is_none());
        // And a fresh one can now be created.
        let fresh = session(SessionGoal::AwaitingTimezone, Duration::minutes(30));
        storage.create_session(&fresh).unwrap();
    }

    #[test]
    fn session_context_roundtrips_through_json_column() {
        let storage = Storage::open_in_memory().unwrap();
        let mut s = session(SessionGoal::ConfirmRelocation, Duration::minutes(10));
        s.context.attempts = 2;
        s.context.resolved_city = Some("London".to_string());
        s.context.resolved_tz = Some("Europe/London".to_string());
        storage.create_session(&s).unwrap();

        let got = storage
            .get_active_session(Platform::Telegram, "c1", "u1")
            .unwrap()
            .unwrap();
        assert_eq!(got.context.attempts, 2);
        assert_eq!(got.context.resolved_tz.as_deref(), Some("Europe/London"));
    }

    #[test]
    fn sweep_marks_expired_active_sessions() {
        let storage = Storage::open_in_memory().unwrap();
        let s = session(SessionGoal::AwaitingTimezone, Duration::seconds(-1));
        storage.create_session(&s).unwrap();
        assert_eq!(storage.sweep_expired_sessions().unwrap(), 1);
        assert_eq!(storage.sweep_expired_sessions().unwrap(), 0);
    }
}
