/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Minimal local schema (§3.1). Intentionally thin — a host application
//! owns its real schema; this exists so the crate is self-contained and
//! testable on its own.

use rusqlite::Connection;

const CREATE_SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    content_session_id  TEXT PRIMARY KEY,
    memory_session_id   TEXT UNIQUE,
    project             TEXT NOT NULL,
    user_prompt         TEXT NOT NULL,
    custom_title        TEXT,
    started_at          TEXT NOT NULL,
    started_at_epoch    INTEGER NOT NULL,
    completed_at        TEXT,
    completed_at_epoch  INTEGER,
    status              TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_started_at_epoch ON sessions(started_at_epoch);

CREATE TABLE IF NOT EXISTS user_prompts (
    content_session_id  TEXT NOT NULL,
    prompt_number       INTEGER NOT NULL,
    project             TEXT NOT NULL,
    prompt_text         TEXT NOT NULL,
    created_at          TEXT NOT NULL,
    created_at_epoch    INTEGER NOT NULL,
    PRIMARY KEY (content_session_id, prompt_number)
);
CREATE INDEX IF NOT EXISTS idx_user_prompts_created_at_epoch ON user_prompts(created_at_epoch);

CREATE TABLE IF NOT EXISTS observations (
    memory_session_id   TEXT NOT NULL,
    project             TEXT NOT NULL,
    text                TEXT NOT NULL,
    type                TEXT NOT NULL,
    title               TEXT,
    subtitle            TEXT,
    facts               TEXT,
    narrative           TEXT,
    concepts            TEXT,
    files_read          TEXT,
    files_modified      TEXT,
    prompt_number       INTEGER,
    discovery_tokens    INTEGER,
    created_at          TEXT NOT NULL,
    created_at_epoch    INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_observations_created_at_epoch ON observations(created_at_epoch);
CREATE INDEX IF NOT EXISTS idx_observations_memory_session_id ON observations(memory_session_id);

CREATE TABLE IF NOT EXISTS summaries (
    memory_session_id   TEXT NOT NULL,
    project             TEXT NOT NULL,
    title               TEXT,
    narrative           TEXT,
    facts               TEXT,
    concepts            TEXT,
    prompt_number       INTEGER,
    discovery_tokens    INTEGER,
    created_at          TEXT NOT NULL,
    created_at_epoch    INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_summaries_created_at_epoch ON summaries(created_at_epoch);
CREATE INDEX IF NOT EXISTS idx_summaries_memory_session_id ON summaries(memory_session_id);
";

/// Idempotent: safe to call against an existing, already-initialized
/// connection, matching the teacher's migration `init()` treating an
/// up-to-date schema as success rather than an error.
pub fn init(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;
    conn.execute_batch(CREATE_SCHEMA_SQL)?;
    Ok(())
}
