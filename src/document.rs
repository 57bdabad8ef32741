/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The on-the-wire document shape and the pure builders that translate
//! local rows into it (spec.md §3, §4.3).

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use sha2::{Digest, Sha256};

use crate::model::{ObservationRow, SessionRow, SummaryRow, UserPromptRow};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Session,
    Prompt,
    Observation,
    Summary,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Session => "session",
            DocumentKind::Prompt => "prompt",
            DocumentKind::Observation => "observation",
            DocumentKind::Summary => "summary",
        }
    }
}

/// The wire unit synced between replicas (spec.md §3, §6). `payload` is
/// kept as an opaque `serde_json::Value` at this layer per spec.md §9 —
/// sync never parses or rewrites it beyond what building the id requires.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub kind: DocumentKind,
    pub sort_epoch: i64,
    pub updated_at_epoch: i64,
    pub payload: JsonValue,
}

/// Content-addressed id for kinds with no natural key (spec.md §4.3, §9).
/// `serde_json::Map` is a `BTreeMap` in this crate's configuration (the
/// `preserve_order` feature is not enabled), so `serde_json::to_vec` already
/// serializes keys in a fixed, deterministic (alphabetical) order — two
/// builders given the same field values always produce the same bytes,
/// which is everything the dedup/idempotence invariants in spec.md §8
/// require.
fn content_hash_id(kind: DocumentKind, canonical: &JsonValue) -> String {
    let bytes = serde_json::to_vec(canonical).expect("canonical payload is always serializable");
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    format!("{}:{}", kind.as_str(), hex::encode(hasher.finalize()))
}

pub fn session_document(row: &SessionRow, updated_at_override: Option<i64>) -> Document {
    let updated_at_epoch =
        updated_at_override.unwrap_or_else(|| row.started_at_epoch.max(row.completed_at_epoch.unwrap_or(0)));
    let payload = json!({
        "content_session_id": row.content_session_id,
        "memory_session_id": row.memory_session_id,
        "project": row.project,
        "user_prompt": row.user_prompt,
        "custom_title": row.custom_title,
        "started_at": row.started_at,
        "started_at_epoch": row.started_at_epoch,
        "completed_at": row.completed_at,
        "completed_at_epoch": row.completed_at_epoch,
        "status": row.status.as_str(),
    });
    Document {
        id: format!("session:{}", row.content_session_id),
        kind: DocumentKind::Session,
        sort_epoch: row.started_at_epoch,
        updated_at_epoch,
        payload,
    }
}

pub fn prompt_document(row: &UserPromptRow) -> Document {
    let payload = json!({
        "content_session_id": row.content_session_id,
        "prompt_number": row.prompt_number,
        "project": row.project,
        "prompt_text": row.prompt_text,
        "created_at": row.created_at,
        "created_at_epoch": row.created_at_epoch,
    });
    Document {
        id: format!("prompt:{}:{}", row.content_session_id, row.prompt_number),
        kind: DocumentKind::Prompt,
        sort_epoch: row.created_at_epoch,
        updated_at_epoch: row.created_at_epoch,
        payload,
    }
}

fn observation_canonical_payload(row: &ObservationRow) -> JsonValue {
    let mut map = Map::new();
    map.insert("memory_session_id".into(), json!(row.memory_session_id));
    map.insert("project".into(), json!(row.project));
    map.insert("text".into(), json!(row.text));
    map.insert("type".into(), json!(row.kind));
    map.insert("title".into(), json!(row.title));
    map.insert("subtitle".into(), json!(row.subtitle));
    map.insert("facts".into(), json!(row.facts));
    map.insert("narrative".into(), json!(row.narrative));
    map.insert("concepts".into(), json!(row.concepts));
    map.insert("files_read".into(), json!(row.files_read));
    map.insert("files_modified".into(), json!(row.files_modified));
    map.insert("prompt_number".into(), json!(row.prompt_number));
    // discovery_tokens is normalized to an integer (missing -> 0) before
    // hashing, per spec.md §4.3.
    map.insert(
        "discovery_tokens".into(),
        json!(row.discovery_tokens.unwrap_or(0)),
    );
    map.insert("created_at".into(), json!(row.created_at));
    JsonValue::Object(map)
}

pub fn observation_document(row: &ObservationRow) -> Document {
    let payload = observation_canonical_payload(row);
    Document {
        id: content_hash_id(DocumentKind::Observation, &payload),
        kind: DocumentKind::Observation,
        sort_epoch: row.created_at_epoch,
        updated_at_epoch: row.created_at_epoch,
        payload,
    }
}

fn summary_canonical_payload(row: &SummaryRow) -> JsonValue {
    let mut map = Map::new();
    map.insert("memory_session_id".into(), json!(row.memory_session_id));
    map.insert("project".into(), json!(row.project));
    map.insert("title".into(), json!(row.title));
    map.insert("narrative".into(), json!(row.narrative));
    map.insert("facts".into(), json!(row.facts));
    map.insert("concepts".into(), json!(row.concepts));
    map.insert("prompt_number".into(), json!(row.prompt_number));
    map.insert(
        "discovery_tokens".into(),
        json!(row.discovery_tokens.unwrap_or(0)),
    );
    map.insert("created_at".into(), json!(row.created_at));
    JsonValue::Object(map)
}

pub fn summary_document(row: &SummaryRow) -> Document {
    let payload = summary_canonical_payload(row);
    Document {
        id: content_hash_id(DocumentKind::Summary, &payload),
        kind: DocumentKind::Summary,
        sort_epoch: row.created_at_epoch,
        updated_at_epoch: row.created_at_epoch,
        payload,
    }
}

/// Deduplicates by `id`, keeping the document with the highest
/// `updatedAtEpoch`, then sorts ascending by `(updatedAtEpoch, id)` — the
/// batching rule bootstrap and every push use (spec.md §4.6).
pub fn dedup_and_sort_for_push(mut docs: Vec<Document>) -> Vec<Document> {
    use std::collections::HashMap;
    let mut by_id: HashMap<String, Document> = HashMap::with_capacity(docs.len());
    for doc in docs.drain(..) {
        match by_id.get(&doc.id) {
            Some(existing) if existing.updated_at_epoch >= doc.updated_at_epoch => {}
            _ => {
                by_id.insert(doc.id.clone(), doc);
            }
        }
    }
    let mut out: Vec<Document> = by_id.into_values().collect();
    out.sort_by(|a, b| (a.updated_at_epoch, &a.id).cmp(&(b.updated_at_epoch, &b.id)));
    out
}
