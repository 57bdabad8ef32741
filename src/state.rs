/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Durable per-target sync cursors (spec.md §3, §4.2).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const CURRENT_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetState {
    #[serde(default)]
    pub bootstrap_complete: bool,
    #[serde(default)]
    pub last_local_push_epoch: i64,
    #[serde(default)]
    pub last_pull_epoch: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedState {
    version: u32,
    targets: HashMap<String, TargetState>,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            targets: HashMap::new(),
        }
    }
}

/// Reads and writes the whole-file JSON state document. A missing file,
/// unparsable JSON, or a version other than [`CURRENT_VERSION`] are all
/// treated as "no prior state" rather than an error (`log::warn!` marks the
/// last two, since they mean something overwrote or predates this format).
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> HashMap<String, TargetState> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(err) => {
                log::warn!("state file {:?} unreadable, starting fresh: {}", self.path, err);
                return HashMap::new();
            }
        };
        let parsed: PersistedState = match serde_json::from_slice(&bytes) {
            Ok(parsed) => parsed,
            Err(err) => {
                log::warn!("state file {:?} is not valid JSON, starting fresh: {}", self.path, err);
                return HashMap::new();
            }
        };
        if parsed.version != CURRENT_VERSION {
            log::warn!(
                "state file {:?} has version {}, expected {}; starting fresh",
                self.path,
                parsed.version,
                CURRENT_VERSION
            );
            return HashMap::new();
        }
        parsed.targets
    }

    pub fn save(&self, targets: &HashMap<String, TargetState>) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let persisted = PersistedState {
            version: CURRENT_VERSION,
            targets: targets.clone(),
        };
        let mut bytes = serde_json::to_vec_pretty(&persisted).expect("state is always serializable");
        bytes.push(b'\n');
        std::fs::write(&self.path, bytes)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nope").join("state.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn round_trips_through_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        let mut targets = HashMap::new();
        targets.insert(
            "fp-1".to_string(),
            TargetState {
                bootstrap_complete: true,
                last_local_push_epoch: 10,
                last_pull_epoch: 20,
            },
        );
        store.save(&targets).unwrap();
        assert_eq!(store.load(), targets);
    }

    #[test]
    fn corrupt_json_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"not json").unwrap();
        let store = StateStore::new(path);
        assert!(store.load().is_empty());
    }

    #[test]
    fn wrong_version_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, br#"{"version":99,"targets":{}}"#).unwrap();
        let store = StateStore::new(path);
        assert!(store.load().is_empty());
    }
}
