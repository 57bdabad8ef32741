/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Bidirectional sync between a local relational store of conversational
//! memory records and a shared remote document store.

pub mod backend;
pub mod backends;
pub mod config;
pub mod document;
pub mod error;
pub mod import;
pub mod model;
pub mod orchestrator;
pub mod queue;
pub mod schema;
pub mod state;
pub mod store;

pub use backend::Backend;
pub use config::{build_engine, Settings};
pub use document::{Document, DocumentKind};
pub use error::{BackendError, EngineError, Result};
pub use model::{ObservationRow, SessionRow, SessionStatus, SummaryRow, UserPromptRow};
pub use orchestrator::SyncEngine;
pub use state::{StateStore, TargetState};
pub use store::LocalStore;
