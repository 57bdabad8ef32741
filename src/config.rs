/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Constructs the engine from settings, or decides "disabled" (spec.md
//! §4.8). Grounded on `sync_manager::manager::check_engine_list`'s
//! rejection style (unknown name logs and disables rather than panics) and
//! `fairy-bridge`'s feature-selected backend construction.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::backends::CosmosBackend;
use crate::orchestrator::SyncEngine;
use crate::state::StateStore;
use crate::store::LocalStore;

const DEFAULT_DATABASE: &str = "claude-mem";
const DEFAULT_CONTAINER: &str = "memory-records";
const DEFAULT_SYNC_INTERVAL_MS: u64 = 30_000;

/// Opaque settings source. A real host application is expected to hand the
/// engine a view over its own config system; this crate only reads the
/// keys enumerated in spec.md §6.
pub type Settings = HashMap<String, String>;

/// Builds a [`SyncEngine`] from settings, or returns `None` ("disabled")
/// without ever propagating an error — spec.md §4.8's "the engine must
/// never prevent the host process from running on local store alone."
pub fn build_engine(settings: &Settings, local: Arc<LocalStore>, state_path: impl Into<std::path::PathBuf>) -> Option<Arc<SyncEngine>> {
    let remote_enabled = settings.get("remote_enabled").map(String::as_str) == Some("true");
    if !remote_enabled {
        return None;
    }

    let provider = settings.get("provider").map(String::as_str).unwrap_or("");
    let endpoint = settings.get("endpoint").cloned().unwrap_or_default();
    let database = settings.get("database").cloned().unwrap_or_else(|| DEFAULT_DATABASE.to_string());
    let container = settings.get("container").cloned().unwrap_or_else(|| DEFAULT_CONTAINER.to_string());

    let backend: Arc<dyn crate::backend::Backend> = match provider {
        "azure-cosmos" => {
            if endpoint.is_empty() {
                log::error!("azure-cosmos backend requires a non-empty endpoint; sync disabled");
                return None;
            }
            let credential = settings.get("credential").cloned().unwrap_or_default();
            Arc::new(CosmosBackend::new(endpoint, database, container, credential))
        }
        other => {
            log::warn!("unknown sync provider {:?}; sync disabled", other);
            return None;
        }
    };

    let sync_interval_ms = match settings.get("sync_interval_ms") {
        Some(raw) => match raw.parse::<u64>() {
            Ok(value) if value > 0 => value,
            _ => {
                log::warn!("sync_interval_ms {:?} is not a positive integer; using default {}", raw, DEFAULT_SYNC_INTERVAL_MS);
                DEFAULT_SYNC_INTERVAL_MS
            }
        },
        None => DEFAULT_SYNC_INTERVAL_MS,
    };

    let state = Arc::new(StateStore::new(state_path.into()));
    Some(Arc::new(SyncEngine::new(backend, local, state, Duration::from_millis(sync_interval_ms))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn local() -> Arc<LocalStore> {
        Arc::new(LocalStore::new(Connection::open_in_memory().unwrap()).unwrap())
    }

    #[test]
    fn disabled_when_remote_enabled_is_not_true() {
        let settings = Settings::new();
        assert!(build_engine(&settings, local(), "state.json").is_none());
    }

    #[test]
    fn disabled_on_unknown_provider() {
        let mut settings = Settings::new();
        settings.insert("remote_enabled".into(), "true".into());
        settings.insert("provider".into(), "unknown-thing".into());
        assert!(build_engine(&settings, local(), "state.json").is_none());
    }

    #[test]
    fn disabled_when_cosmos_endpoint_missing() {
        let mut settings = Settings::new();
        settings.insert("remote_enabled".into(), "true".into());
        settings.insert("provider".into(), "azure-cosmos".into());
        assert!(build_engine(&settings, local(), "state.json").is_none());
    }

    #[tokio::test]
    async fn enabled_with_valid_cosmos_settings() {
        let mut settings = Settings::new();
        settings.insert("remote_enabled".into(), "true".into());
        settings.insert("provider".into(), "azure-cosmos".into());
        settings.insert("endpoint".into(), "https://example.documents.azure.com".into());
        assert!(build_engine(&settings, local(), "state.json").is_some());
    }

    #[tokio::test]
    async fn bad_sync_interval_falls_back_to_default() {
        let mut settings = Settings::new();
        settings.insert("remote_enabled".into(), "true".into());
        settings.insert("provider".into(), "azure-cosmos".into());
        settings.insert("endpoint".into(), "https://example.documents.azure.com".into());
        settings.insert("sync_interval_ms".into(), "not-a-number".into());
        assert!(build_engine(&settings, local(), "state.json").is_some());
    }
}
