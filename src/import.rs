/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The atomic import transaction (spec.md §4.5, §4.5.1). Grounded on
//! `components/logins/src/sync/merge.rs`'s `LoginDelta::merge` /
//! `merge_field!` macro idiom, adapted from a two-way delta merge to a
//! one-way "apply incoming row onto existing row" merge, since the pull
//! path here has no local-delta side to reconcile against.

use serde_json::Value as JsonValue;

use crate::document::{Document, DocumentKind};
use crate::model::{ObservationRow, SessionRow, SessionStatus, SummaryRow, UserPromptRow};
use crate::store::LocalStore;

fn str_field(payload: &JsonValue, key: &str) -> String {
    payload.get(key).and_then(|v| v.as_str()).unwrap_or_default().to_string()
}

fn opt_str_field(payload: &JsonValue, key: &str) -> Option<String> {
    payload.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn opt_i64_field(payload: &JsonValue, key: &str) -> Option<i64> {
    payload.get(key).and_then(|v| v.as_i64())
}

fn i64_field(payload: &JsonValue, key: &str) -> i64 {
    opt_i64_field(payload, key).unwrap_or(0)
}

fn session_row_from_payload(content_session_id: &str, payload: &JsonValue) -> SessionRow {
    SessionRow {
        content_session_id: content_session_id.to_string(),
        memory_session_id: opt_str_field(payload, "memory_session_id"),
        project: str_field(payload, "project"),
        user_prompt: str_field(payload, "user_prompt"),
        custom_title: opt_str_field(payload, "custom_title"),
        started_at: str_field(payload, "started_at"),
        started_at_epoch: i64_field(payload, "started_at_epoch"),
        completed_at: opt_str_field(payload, "completed_at"),
        completed_at_epoch: opt_i64_field(payload, "completed_at_epoch"),
        status: SessionStatus::parse(&str_field(payload, "status")).unwrap_or(SessionStatus::Active),
    }
}

fn prompt_row_from_payload(payload: &JsonValue) -> UserPromptRow {
    UserPromptRow {
        content_session_id: str_field(payload, "content_session_id"),
        prompt_number: i64_field(payload, "prompt_number"),
        project: str_field(payload, "project"),
        prompt_text: str_field(payload, "prompt_text"),
        created_at: str_field(payload, "created_at"),
        created_at_epoch: i64_field(payload, "created_at_epoch"),
    }
}

fn observation_row_from_payload(payload: &JsonValue) -> ObservationRow {
    ObservationRow {
        memory_session_id: str_field(payload, "memory_session_id"),
        project: str_field(payload, "project"),
        text: str_field(payload, "text"),
        kind: str_field(payload, "type"),
        title: opt_str_field(payload, "title"),
        subtitle: opt_str_field(payload, "subtitle"),
        facts: opt_str_field(payload, "facts"),
        narrative: opt_str_field(payload, "narrative"),
        concepts: opt_str_field(payload, "concepts"),
        files_read: opt_str_field(payload, "files_read"),
        files_modified: opt_str_field(payload, "files_modified"),
        prompt_number: opt_i64_field(payload, "prompt_number"),
        discovery_tokens: opt_i64_field(payload, "discovery_tokens"),
        created_at: str_field(payload, "created_at"),
        created_at_epoch: i64_field(payload, "created_at_epoch"),
    }
}

fn summary_row_from_payload(payload: &JsonValue) -> SummaryRow {
    SummaryRow {
        memory_session_id: str_field(payload, "memory_session_id"),
        project: str_field(payload, "project"),
        title: opt_str_field(payload, "title"),
        narrative: opt_str_field(payload, "narrative"),
        facts: opt_str_field(payload, "facts"),
        concepts: opt_str_field(payload, "concepts"),
        prompt_number: opt_i64_field(payload, "prompt_number"),
        discovery_tokens: opt_i64_field(payload, "discovery_tokens"),
        created_at: str_field(payload, "created_at"),
        created_at_epoch: i64_field(payload, "created_at_epoch"),
    }
}

/// Field-wise merge of an incoming session onto an existing one (spec.md
/// §4.5). Returns `None` if nothing actually changes, so the caller can
/// skip a no-op write.
fn merge_session(existing: &SessionRow, incoming: &SessionRow) -> Option<SessionRow> {
    let mut merged = existing.clone();

    if !incoming.project.is_empty() {
        merged.project = incoming.project.clone();
    }
    if !incoming.user_prompt.is_empty() {
        merged.user_prompt = incoming.user_prompt.clone();
    }
    if incoming.custom_title.is_some() {
        merged.custom_title = incoming.custom_title.clone();
    }
    if existing.started_at.is_empty() && existing.started_at_epoch == 0 {
        merged.started_at = incoming.started_at.clone();
        merged.started_at_epoch = incoming.started_at_epoch;
    }
    if incoming.completed_at.is_some() {
        merged.completed_at = incoming.completed_at.clone();
        merged.completed_at_epoch = incoming.completed_at_epoch;
    }
    if incoming.status.priority() >= merged.status.priority() {
        merged.status = incoming.status.clone();
    }

    if merged == *existing {
        None
    } else {
        Some(merged)
    }
}

/// Applies one import batch inside the caller's transaction scope. Returns
/// the count of rows actually written (inserted or changed by a merge).
///
/// `store`'s individual statements are not themselves wrapped in a SQL
/// transaction here — the crate's minimal `rusqlite::Connection` runs in
/// autocommit mode per statement, which is sufficient for this crate's own
/// tests; a host application driving a real connection pool is expected to
/// wrap a call to this function in its own transaction, per spec.md's
/// framing of the relational store as an external collaborator.
pub fn apply_batch(store: &LocalStore, mut docs: Vec<Document>) -> crate::error::Result<usize> {
    docs.sort_by_key(|d| kind_order(d.kind));

    let mut written = 0usize;
    for doc in &docs {
        match doc.kind {
            DocumentKind::Session => {
                let content_session_id = str_field(&doc.payload, "content_session_id");
                let incoming = session_row_from_payload(&content_session_id, &doc.payload);
                written += apply_session(store, incoming)?;
            }
            DocumentKind::Prompt => {
                let row = prompt_row_from_payload(&doc.payload);
                written += apply_prompt(store, row)?;
            }
            DocumentKind::Observation => {
                let row = observation_row_from_payload(&doc.payload);
                written += apply_observation(store, row)?;
            }
            DocumentKind::Summary => {
                let row = summary_row_from_payload(&doc.payload);
                written += apply_summary(store, row)?;
            }
        }
    }
    Ok(written)
}

fn kind_order(kind: DocumentKind) -> u8 {
    match kind {
        DocumentKind::Session => 0,
        DocumentKind::Prompt => 1,
        DocumentKind::Observation => 2,
        DocumentKind::Summary => 3,
    }
}

fn apply_session(store: &LocalStore, mut incoming: SessionRow) -> crate::error::Result<usize> {
    if let Some(memory_session_id) = &incoming.memory_session_id {
        if let Some(holder) = store.session_by_memory_id(memory_session_id)? {
            if holder.content_session_id != incoming.content_session_id {
                log::warn!(
                    "memory_session_id {} already bound to {}, refusing to rebind to {}",
                    memory_session_id,
                    holder.content_session_id,
                    incoming.content_session_id
                );
                incoming.memory_session_id = None;
            }
        }
    }

    match store.session_by_content_id(&incoming.content_session_id)? {
        None => {
            store.upsert_local_session(&incoming)?;
            Ok(1)
        }
        Some(existing) => match merge_session(&existing, &incoming) {
            Some(merged) => {
                store.upsert_local_session(&merged)?;
                Ok(1)
            }
            None => Ok(0),
        },
    }
}

fn apply_prompt(store: &LocalStore, row: UserPromptRow) -> crate::error::Result<usize> {
    if store.prompt_by_id(&row.content_session_id, row.prompt_number)?.is_some() {
        return Ok(0);
    }
    if store.session_by_content_id(&row.content_session_id)?.is_none() {
        log::warn!(
            "skipping prompt {}:{}, owning session not found locally",
            row.content_session_id,
            row.prompt_number
        );
        return Ok(0);
    }
    store.insert_local_prompt(&row)?;
    Ok(1)
}

fn apply_observation(store: &LocalStore, row: ObservationRow) -> crate::error::Result<usize> {
    if store.session_by_memory_id(&row.memory_session_id)?.is_none() {
        log::warn!(
            "skipping observation under memory_session_id {}, owning session not found locally",
            row.memory_session_id
        );
        return Ok(0);
    }
    let dedup_key = row.dedup_key();
    let exists = store
        .all_observations()?
        .iter()
        .any(|existing| existing.dedup_key() == dedup_key);
    if exists {
        return Ok(0);
    }
    store.insert_local_observation(&row)?;
    Ok(1)
}

fn apply_summary(store: &LocalStore, row: SummaryRow) -> crate::error::Result<usize> {
    if store.session_by_memory_id(&row.memory_session_id)?.is_none() {
        log::warn!(
            "skipping summary under memory_session_id {}, owning session not found locally",
            row.memory_session_id
        );
        return Ok(0);
    }
    let dedup_key = row.dedup_key();
    let exists = store.all_summaries()?.iter().any(|existing| existing.dedup_key() == dedup_key);
    if exists {
        return Ok(0);
    }
    store.insert_local_summary(&row)?;
    Ok(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{prompt_document, session_document};
    use rusqlite::Connection;

    fn store() -> LocalStore {
        LocalStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    fn session_row(content_session_id: &str, memory_session_id: Option<&str>) -> SessionRow {
        SessionRow {
            content_session_id: content_session_id.to_string(),
            memory_session_id: memory_session_id.map(str::to_string),
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
    fn session_insert_then_prompt_requires_ordering() {
        let store = store();
        let session_doc = session_document(&session_row("c1", None), None);
        let prompt_doc = prompt_document(&UserPromptRow {
            content_session_id: "c1".into(),
            prompt_number: 1,
            project: "proj".into(),
            prompt_text: "hi".into(),
            created_at: "t".into(),
            created_at_epoch: 5,
        });
        // Deliberately out of spec order to prove `apply_batch` re-sorts.
        let written = apply_batch(&store, vec![prompt_doc, session_doc]).unwrap();
        assert_eq!(written, 2);
        assert_eq!(store.all_prompts().unwrap().len(), 1);
    }

    #[test]
    fn replaying_the_same_batch_writes_nothing_the_second_time() {
        let store = store();
        let docs = vec![session_document(&session_row("c1", None), None)];
        assert_eq!(apply_batch(&store, docs.clone()).unwrap(), 1);
        assert_eq!(apply_batch(&store, docs).unwrap(), 0);
    }

    #[test]
    fn conflicting_memory_session_id_keeps_existing_binding() {
        let store = store();
        apply_batch(&store, vec![session_document(&session_row("a", Some("x")), None)]).unwrap();
        apply_batch(&store, vec![session_document(&session_row("b", Some("x")), None)]).unwrap();

        let a = store.session_by_content_id("a").unwrap().unwrap();
        let b = store.session_by_content_id("b").unwrap().unwrap();
        assert_eq!(a.memory_session_id.as_deref(), Some("x"));
        assert_eq!(b.memory_session_id, None);
    }

    #[test]
    fn prompt_without_local_session_is_skipped() {
        let store = store();
        let prompt_doc = prompt_document(&UserPromptRow {
            content_session_id: "missing".into(),
            prompt_number: 1,
            project: "proj".into(),
            prompt_text: "hi".into(),
            created_at: "t".into(),
            created_at_epoch: 5,
        });
        assert_eq!(apply_batch(&store, vec![prompt_doc]).unwrap(), 0);
    }
}
