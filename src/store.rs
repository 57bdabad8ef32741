/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Read-only queries over the local store plus the write paths the
//! importer needs (spec.md §4.4). One `rusqlite::Connection` per
//! `LocalStore`, matching the teacher's `Mutex<Connection>`-per-store
//! shape in `tabs`' storage layer, generalized to this crate's four
//! record kinds.

use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::Result;
use crate::model::{ObservationRow, SessionRow, SessionStatus, SummaryRow, UserPromptRow};

pub struct LocalStore {
    conn: Mutex<Connection>,
}

fn session_from_row(row: &Row) -> rusqlite::Result<SessionRow> {
    let status: String = row.get("status")?;
    Ok(SessionRow {
        content_session_id: row.get("content_session_id")?,
        memory_session_id: row.get("memory_session_id")?,
        project: row.get("project")?,
        user_prompt: row.get("user_prompt")?,
        custom_title: row.get("custom_title")?,
        started_at: row.get("started_at")?,
        started_at_epoch: row.get("started_at_epoch")?,
        completed_at: row.get("completed_at")?,
        completed_at_epoch: row.get("completed_at_epoch")?,
        status: SessionStatus::parse(&status).unwrap_or(SessionStatus::Active),
    })
}

fn prompt_from_row(row: &Row) -> rusqlite::Result<UserPromptRow> {
    Ok(UserPromptRow {
        content_session_id: row.get("content_session_id")?,
        prompt_number: row.get("prompt_number")?,
        project: row.get("project")?,
        prompt_text: row.get("prompt_text")?,
        created_at: row.get("created_at")?,
        created_at_epoch: row.get("created_at_epoch")?,
    })
}

fn observation_from_row(row: &Row) -> rusqlite::Result<ObservationRow> {
    Ok(ObservationRow {
        memory_session_id: row.get("memory_session_id")?,
        project: row.get("project")?,
        text: row.get("text")?,
        kind: row.get("type")?,
        title: row.get("title")?,
        subtitle: row.get("subtitle")?,
        facts: row.get("facts")?,
        narrative: row.get("narrative")?,
        concepts: row.get("concepts")?,
        files_read: row.get("files_read")?,
        files_modified: row.get("files_modified")?,
        prompt_number: row.get("prompt_number")?,
        discovery_tokens: row.get("discovery_tokens")?,
        created_at: row.get("created_at")?,
        created_at_epoch: row.get("created_at_epoch")?,
    })
}

fn summary_from_row(row: &Row) -> rusqlite::Result<SummaryRow> {
    Ok(SummaryRow {
        memory_session_id: row.get("memory_session_id")?,
        project: row.get("project")?,
        title: row.get("title")?,
        narrative: row.get("narrative")?,
        facts: row.get("facts")?,
        concepts: row.get("concepts")?,
        prompt_number: row.get("prompt_number")?,
        discovery_tokens: row.get("discovery_tokens")?,
        created_at: row.get("created_at")?,
        created_at_epoch: row.get("created_at_epoch")?,
    })
}

impl LocalStore {
    pub fn new(conn: Connection) -> Result<Self> {
        crate::schema::init(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock().unwrap();
        f(&conn)
    }

    // -- sessions --------------------------------------------------------

    pub fn all_sessions(&self) -> Result<Vec<SessionRow>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM sessions ORDER BY started_at_epoch ASC")?;
            let rows = stmt.query_map([], session_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    pub fn sessions_since(&self, since_epoch: i64) -> Result<Vec<SessionRow>> {
        self.with_connection(|conn| {
            let mut stmt =
                conn.prepare("SELECT * FROM sessions WHERE started_at_epoch >= ?1 ORDER BY started_at_epoch ASC")?;
            let rows = stmt.query_map(params![since_epoch], session_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    pub fn session_by_content_id(&self, content_session_id: &str) -> Result<Option<SessionRow>> {
        self.with_connection(|conn| {
            let row = conn
                .query_row(
                    "SELECT * FROM sessions WHERE content_session_id = ?1",
                    params![content_session_id],
                    session_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn session_by_memory_id(&self, memory_session_id: &str) -> Result<Option<SessionRow>> {
        self.with_connection(|conn| {
            let row = conn
                .query_row(
                    "SELECT * FROM sessions WHERE memory_session_id = ?1",
                    params![memory_session_id],
                    session_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// A session row for document-building purposes, left-filling `project`
    /// with `""` when no local session is found (spec.md §4.4).
    pub fn session_or_blank(&self, content_session_id: &str) -> Result<SessionRow> {
        Ok(self.session_by_content_id(content_session_id)?.unwrap_or(SessionRow {
            content_session_id: content_session_id.to_string(),
            memory_session_id: None,
            project: String::new(),
            user_prompt: String::new(),
            custom_title: None,
            started_at: String::new(),
            started_at_epoch: 0,
            completed_at: None,
            completed_at_epoch: None,
            status: SessionStatus::Active,
        }))
    }

    // -- prompts -----------------------------------------------------------

    pub fn all_prompts(&self) -> Result<Vec<UserPromptRow>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM user_prompts ORDER BY created_at_epoch ASC")?;
            let rows = stmt.query_map([], prompt_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    pub fn prompts_since(&self, since_epoch: i64) -> Result<Vec<UserPromptRow>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare("SELECT * FROM user_prompts WHERE created_at_epoch >= ?1 ORDER BY created_at_epoch ASC")?;
            let rows = stmt.query_map(params![since_epoch], prompt_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    pub fn prompt_by_id(&self, content_session_id: &str, prompt_number: i64) -> Result<Option<UserPromptRow>> {
        self.with_connection(|conn| {
            let row = conn
                .query_row(
                    "SELECT * FROM user_prompts WHERE content_session_id = ?1 AND prompt_number = ?2",
                    params![content_session_id, prompt_number],
                    prompt_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- observations --------------------------------------------------

    pub fn all_observations(&self) -> Result<Vec<ObservationRow>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM observations ORDER BY created_at_epoch ASC")?;
            let rows = stmt.query_map([], observation_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    pub fn observations_since(&self, since_epoch: i64) -> Result<Vec<ObservationRow>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare("SELECT * FROM observations WHERE created_at_epoch >= ?1 ORDER BY created_at_epoch ASC")?;
            let rows = stmt.query_map(params![since_epoch], observation_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    // -- summaries -------------------------------------------------------

    pub fn all_summaries(&self) -> Result<Vec<SummaryRow>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM summaries ORDER BY created_at_epoch ASC")?;
            let rows = stmt.query_map([], summary_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    pub fn summaries_since(&self, since_epoch: i64) -> Result<Vec<SummaryRow>> {
        self.with_connection(|conn| {
            let mut stmt =
                conn.prepare("SELECT * FROM summaries WHERE created_at_epoch >= ?1 ORDER BY created_at_epoch ASC")?;
            let rows = stmt.query_map(params![since_epoch], summary_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    // -- writes used by the host application, not by sync itself ---------

    pub fn upsert_local_session(&self, row: &SessionRow) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO sessions (content_session_id, memory_session_id, project, user_prompt, custom_title,
                    started_at, started_at_epoch, completed_at, completed_at_epoch, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(content_session_id) DO UPDATE SET
                    memory_session_id = excluded.memory_session_id,
                    project = excluded.project,
                    user_prompt = excluded.user_prompt,
                    custom_title = excluded.custom_title,
                    started_at = excluded.started_at,
                    started_at_epoch = excluded.started_at_epoch,
                    completed_at = excluded.completed_at,
                    completed_at_epoch = excluded.completed_at_epoch,
                    status = excluded.status",
                params![
                    row.content_session_id,
                    row.memory_session_id,
                    row.project,
                    row.user_prompt,
                    row.custom_title,
                    row.started_at,
                    row.started_at_epoch,
                    row.completed_at,
                    row.completed_at_epoch,
                    row.status.as_str(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn insert_local_prompt(&self, row: &UserPromptRow) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO user_prompts
                    (content_session_id, prompt_number, project, prompt_text, created_at, created_at_epoch)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    row.content_session_id,
                    row.prompt_number,
                    row.project,
                    row.prompt_text,
                    row.created_at,
                    row.created_at_epoch,
                ],
            )?;
            Ok(())
        })
    }

    pub fn insert_local_observation(&self, row: &ObservationRow) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO observations
                    (memory_session_id, project, text, type, title, subtitle, facts, narrative, concepts,
                     files_read, files_modified, prompt_number, discovery_tokens, created_at, created_at_epoch)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    row.memory_session_id,
                    row.project,
                    row.text,
                    row.kind,
                    row.title,
                    row.subtitle,
                    row.facts,
                    row.narrative,
                    row.concepts,
                    row.files_read,
                    row.files_modified,
                    row.prompt_number,
                    row.discovery_tokens,
                    row.created_at,
                    row.created_at_epoch,
                ],
            )?;
            Ok(())
        })
    }

    pub fn insert_local_summary(&self, row: &SummaryRow) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO summaries
                    (memory_session_id, project, title, narrative, facts, concepts, prompt_number,
                     discovery_tokens, created_at, created_at_epoch)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    row.memory_session_id,
                    row.project,
                    row.title,
                    row.narrative,
                    row.facts,
                    row.concepts,
                    row.prompt_number,
                    row.discovery_tokens,
                    row.created_at,
                    row.created_at_epoch,
                ],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> LocalStore {
        LocalStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    fn sample_session(content_session_id: &str) -> SessionRow {
        SessionRow {
            content_session_id: content_session_id.to_string(),
            memory_session_id: None,
            project: "proj".into(),
            user_prompt: "hi".into(),
            custom_title: None,
            started_at: "t".into(),
            started_at_epoch: 1,
            completed_at: None,
            completed_at_epoch: None,
            status: SessionStatus::Active,
        }
    }

    #[test]
    fn session_round_trips() {
        let store = store();
        store.upsert_local_session(&sample_session("c1")).unwrap();
        let found = store.session_by_content_id("c1").unwrap().unwrap();
        assert_eq!(found.project, "proj");
        assert!(store.session_by_content_id("nope").unwrap().is_none());
    }

    #[test]
    fn session_or_blank_left_fills_project() {
        let store = store();
        let blank = store.session_or_blank("missing").unwrap();
        assert_eq!(blank.project, "");
        assert_eq!(blank.content_session_id, "missing");
    }

    #[test]
    fn prompt_insert_is_idempotent_by_natural_key() {
        let store = store();
        store.upsert_local_session(&sample_session("c1")).unwrap();
        let prompt = UserPromptRow {
            content_session_id: "c1".into(),
            prompt_number: 1,
            project: "proj".into(),
            prompt_text: "hi".into(),
            created_at: "t".into(),
            created_at_epoch: 10,
        };
        store.insert_local_prompt(&prompt).unwrap();
        store.insert_local_prompt(&prompt).unwrap();
        assert_eq!(store.all_prompts().unwrap().len(), 1);
    }

    #[test]
    fn since_scans_are_ascending_and_inclusive() {
        let store = store();
        store.upsert_local_session(&sample_session("c1")).unwrap();
        for (n, epoch) in [(1, 10), (2, 20), (3, 30)] {
            store
                .insert_local_prompt(&UserPromptRow {
                    content_session_id: "c1".into(),
                    prompt_number: n,
                    project: "proj".into(),
                    prompt_text: "x".into(),
                    created_at: "t".into(),
                    created_at_epoch: epoch,
                })
                .unwrap();
        }
        let since = store.prompts_since(20).unwrap();
        assert_eq!(
            since.iter().map(|p| p.prompt_number).collect::<Vec<_>>(),
            vec![2, 3]
        );
    }
}
