/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Row shapes returned by the local store's queries (§3, §4.4).

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Failed,
    Completed,
}

impl SessionStatus {
    /// Lower is "weaker"; an incoming status wins a merge when its
    /// priority is >= the current status's priority (spec.md §4.5).
    pub fn priority(&self) -> u8 {
        match self {
            SessionStatus::Active => 0,
            SessionStatus::Failed => 1,
            SessionStatus::Completed => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Failed => "failed",
            SessionStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SessionStatus::Active),
            "failed" => Some(SessionStatus::Failed),
            "completed" => Some(SessionStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionRow {
    pub content_session_id: String,
    pub memory_session_id: Option<String>,
    pub project: String,
    pub user_prompt: String,
    pub custom_title: Option<String>,
    pub started_at: String,
    pub started_at_epoch: i64,
    pub completed_at: Option<String>,
    pub completed_at_epoch: Option<i64>,
    pub status: SessionStatus,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UserPromptRow {
    pub content_session_id: String,
    pub prompt_number: i64,
    pub project: String,
    pub prompt_text: String,
    pub created_at: String,
    pub created_at_epoch: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ObservationRow {
    pub memory_session_id: String,
    pub project: String,
    pub text: String,
    pub kind: String, // `type` in spec.md; `kind` to avoid the Rust keyword
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub facts: Option<String>,
    pub narrative: Option<String>,
    pub concepts: Option<String>,
    pub files_read: Option<String>,
    pub files_modified: Option<String>,
    pub prompt_number: Option<i64>,
    pub discovery_tokens: Option<i64>,
    pub created_at: String,
    pub created_at_epoch: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SummaryRow {
    pub memory_session_id: String,
    pub project: String,
    pub title: Option<String>,
    pub narrative: Option<String>,
    pub facts: Option<String>,
    pub concepts: Option<String>,
    pub prompt_number: Option<i64>,
    pub discovery_tokens: Option<i64>,
    pub created_at: String,
    pub created_at_epoch: i64,
}

impl ObservationRow {
    /// Dedup key per spec.md §3: `(memory_session_id, created_at_epoch, type,
    /// title.unwrap_or(""), narrative.unwrap_or(""))`.
    pub fn dedup_key(&self) -> (String, i64, String, String, String) {
        (
            self.memory_session_id.clone(),
            self.created_at_epoch,
            self.kind.clone(),
            self.title.clone().unwrap_or_default(),
            self.narrative.clone().unwrap_or_default(),
        )
    }
}

impl SummaryRow {
    /// Dedup key per spec.md §3: `(memory_session_id, created_at_epoch,
    /// prompt_number.unwrap_or(-1))`.
    pub fn dedup_key(&self) -> (String, i64, i64) {
        (
            self.memory_session_id.clone(),
            self.created_at_epoch,
            self.prompt_number.unwrap_or(-1),
        )
    }
}
