/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned an error: {status} {body}")]
    Remote { status: u16, body: String },

    #[error("error (de)serializing a backend document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("backend error: {0}")]
    Other(String),
}

impl BackendError {
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("local store error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("error (de)serializing JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("error reading or writing state file: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
