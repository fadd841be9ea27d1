use rusqlite::{Connection, Result};

/// Initialise all Meridian tables. Safe to call on every startup —
/// CREATE IF NOT EXISTS means it's idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_users_table(conn)?;
    create_chats_table(conn)?;
    create_dedupe_table(conn)?;
    create_sessions_table(conn)?;
    Ok(())
}

fn create_users_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            platform         TEXT NOT NULL,
            user_id          TEXT NOT NULL,
            tz_iana          TEXT,
            confidence       REAL NOT NULL DEFAULT 0,
            source           TEXT NOT NULL DEFAULT 'default',
            created_at       TEXT NOT NULL,
            updated_at       TEXT NOT NULL,
            last_verified_at TEXT,
            PRIMARY KEY (platform, user_id)
        );",
    )
}

fn create_chats_table(conn: &Connection) -> Result<()> {
    // user_timezones and active_timezones are JSON columns; active_timezones
    // is always recomputed from user_timezones inside one transaction.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chats (
            platform         TEXT NOT NULL,
            chat_id          TEXT NOT NULL,
            default_tz       TEXT,
            user_timezones   TEXT NOT NULL DEFAULT '{}',
            active_timezones TEXT NOT NULL DEFAULT '[]',
            created_at       TEXT NOT NULL,
            updated_at       TEXT NOT NULL,
            PRIMARY KEY (platform, chat_id)
        );",
    )
}

fn create_dedupe_table(conn: &Connection) -> Result<()> {
    // The UNIQUE primary key is the at-most-once gate. Expired rows are
    // ignored on read and removed by the background sweep.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS dedupe_events (
            platform   TEXT NOT NULL,
            event_id   TEXT NOT NULL,
            chat_id    TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (platform, event_id)
        );
        CREATE INDEX IF NOT EXISTS idx_dedupe_created
            ON dedupe_events (created_at);",
    )
}

fn create_sessions_table(conn: &Connection) -> Result<()> {
    // The partial unique index linearizes session turns: two concurrent
    // webhooks racing to create a session resolve to exactly one ACTIVE row.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            session_id TEXT PRIMARY KEY NOT NULL,
            platform   TEXT NOT NULL,
            chat_id    TEXT NOT NULL,
            user_id    TEXT NOT NULL,
            goal       TEXT NOT NULL,
            status     TEXT NOT NULL,
            context    TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_lookup
            ON sessions (platform, chat_id, user_id, status);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_one_active
            ON sessions (platform, chat_id, user_id)
            WHERE status = 'ACTIVE';
        CREATE INDEX IF NOT EXISTS idx_sessions_expiry
            ON sessions (expires_at);",
    )
}
