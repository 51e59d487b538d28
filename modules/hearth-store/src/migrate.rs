//! Idempotent schema migration. Run at startup by every binary that touches
//! the store; all statements are CREATE .. IF NOT EXISTS.

use anyhow::Result;
use sqlx::PgPool;
use tracing::info;

const STATEMENTS: &[&str] = &[
    // Canonical events
    r#"
    CREATE TABLE IF NOT EXISTS events (
        id          TEXT        PRIMARY KEY,
        start_time  TIMESTAMPTZ NOT NULL,
        tags        TEXT[]      NOT NULL DEFAULT '{}',
        doc         JSONB       NOT NULL,
        raw         JSONB
    )
    "#,
    "CREATE INDEX IF NOT EXISTS events_start_time_idx ON events (start_time, id)",
    "CREATE INDEX IF NOT EXISTS events_tags_idx ON events USING GIN (tags)",
    // Series
    r#"
    CREATE TABLE IF NOT EXISTS event_series (
        id              TEXT        PRIMARY KEY,
        host_id         TEXT        NOT NULL,
        category_id     TEXT,
        next_start_time TIMESTAMPTZ,
        tags            TEXT[]      NOT NULL DEFAULT '{}',
        doc             JSONB       NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS event_series_next_start_idx ON event_series (next_start_time)",
    "CREATE INDEX IF NOT EXISTS event_series_tags_idx ON event_series USING GIN (tags)",
    "CREATE INDEX IF NOT EXISTS event_series_host_idx ON event_series (host_id)",
    // Categories
    r#"
    CREATE TABLE IF NOT EXISTS event_categories (
        id       TEXT  PRIMARY KEY,
        host_id  TEXT  NOT NULL,
        name_key TEXT  NOT NULL,
        doc      JSONB NOT NULL,
        UNIQUE (host_id, name_key)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS event_categories_host_idx ON event_categories (host_id)",
    // Tag proposals
    r#"
    CREATE TABLE IF NOT EXISTS tag_proposals (
        slug             TEXT        PRIMARY KEY,
        status           TEXT        NOT NULL,
        occurrence_count BIGINT      NOT NULL,
        last_seen_at     TIMESTAMPTZ NOT NULL,
        doc              JSONB       NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS tag_proposals_rank_idx
     ON tag_proposals (status, occurrence_count DESC, last_seen_at DESC)",
    // Interactions
    r#"
    CREATE TABLE IF NOT EXISTS interactions (
        id      TEXT        PRIMARY KEY,
        user_id TEXT        NOT NULL,
        ts      TIMESTAMPTZ NOT NULL,
        doc     JSONB       NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS interactions_user_ts_idx ON interactions (user_id, ts DESC)",
    // Pinned events (direct pins)
    r#"
    CREATE TABLE IF NOT EXISTS pinned_events (
        user_id          TEXT        NOT NULL,
        event_id         TEXT        NOT NULL,
        event_start_time TIMESTAMPTZ NOT NULL,
        doc              JSONB       NOT NULL,
        PRIMARY KEY (user_id, event_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS pinned_events_window_idx
     ON pinned_events (user_id, event_start_time, event_id)",
    // Pinned series
    r#"
    CREATE TABLE IF NOT EXISTS pinned_series (
        user_id   TEXT  NOT NULL,
        series_id TEXT  NOT NULL,
        doc       JSONB NOT NULL,
        PRIMARY KEY (user_id, series_id)
    )
    "#,
    // Per-user bundle state
    r#"
    CREATE TABLE IF NOT EXISTS category_bundle_state (
        user_id           TEXT        NOT NULL,
        category_id       TEXT        NOT NULL,
        last_seen_version BIGINT      NOT NULL,
        last_seen_at      TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (user_id, category_id)
    )
    "#,
];

pub async fn migrate(pool: &PgPool) -> Result<()> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    info!(statements = STATEMENTS.len(), "store schema up to date");
    Ok(())
}
