use anyhow::Context;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Create the trace tables. Returns whether the FTS5 index is usable; when
/// `want_full_text` is false, or FTS5 cannot be created, searches fall back
/// to a keyword scan.
pub(super) async fn init_schema(pool: &SqlitePool, want_full_text: bool) -> anyhow::Result<bool> {
    sqlx::raw_sql(
        "CREATE TABLE IF NOT EXISTS trace_events (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id     TEXT NOT NULL,
            session_id   TEXT NOT NULL,
            event_type   TEXT NOT NULL,
            role         TEXT,
            tool_name    TEXT,
            text_content TEXT NOT NULL,
            timestamp    TEXT NOT NULL,
            turn_id      INTEGER NOT NULL,
            UNIQUE(session_id, event_id)
        );
        CREATE INDEX IF NOT EXISTS idx_trace_events_session_ts
            ON trace_events(session_id, timestamp);
        CREATE INDEX IF NOT EXISTS idx_trace_events_type ON trace_events(event_type);

        CREATE TABLE IF NOT EXISTS trace_watermarks (
            session_id   TEXT PRIMARY KEY,
            byte_offset  INTEGER NOT NULL,
            event_count  INTEGER NOT NULL,
            last_indexed TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS trace_manifests (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id      TEXT NOT NULL,
            marker_event_id TEXT,
            manifest_json   TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            UNIQUE(session_id, marker_event_id)
        );",
    )
    .execute(pool)
    .await
    .context("initialize trace schema")?;

    if !want_full_text {
        info!("full-text search disabled; using keyword scan");
        return Ok(false);
    }

    match init_fts(pool).await {
        Ok(()) => Ok(true),
        Err(e) => {
            warn!(error = %e, "FTS5 unavailable; falling back to keyword scan");
            Ok(false)
        }
    }
}

async fn init_fts(pool: &SqlitePool) -> anyhow::Result<()> {
    let (existing,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'trace_fts'",
    )
    .fetch_one(pool)
    .await
    .context("check FTS table")?;

    sqlx::raw_sql(
        "CREATE VIRTUAL TABLE IF NOT EXISTS trace_fts USING fts5(
            text_content, content=trace_events, content_rowid=id, tokenize='porter unicode61'
        );
        CREATE TRIGGER IF NOT EXISTS trace_events_ai AFTER INSERT ON trace_events BEGIN
            INSERT INTO trace_fts(rowid, text_content) VALUES (new.id, new.text_content);
        END;
        CREATE TRIGGER IF NOT EXISTS trace_events_ad AFTER DELETE ON trace_events BEGIN
            INSERT INTO trace_fts(trace_fts, rowid, text_content)
            VALUES ('delete', old.id, old.text_content);
        END;
        CREATE TRIGGER IF NOT EXISTS trace_events_au AFTER UPDATE ON trace_events BEGIN
            INSERT INTO trace_fts(trace_fts, rowid, text_content)
            VALUES ('delete', old.id, old.text_content);
            INSERT INTO trace_fts(rowid, text_content) VALUES (new.id, new.text_content);
        END;",
    )
    .execute(pool)
    .await
    .context("create FTS5 index")?;

    if existing == 0 {
        // Rows written while FTS was off are not in the index yet.
        sqlx::query("INSERT INTO trace_fts(trace_fts) VALUES ('rebuild')")
            .execute(pool)
            .await
            .context("rebuild FTS5 index")?;
    }
    Ok(())
}
