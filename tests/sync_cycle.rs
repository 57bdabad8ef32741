/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The six literal end-to-end scenarios of spec.md §8, run against
//! `InMemoryBackend` and an in-memory `rusqlite` connection, mirroring the
//! teacher's own style of standing up a real (in-memory) store per test
//! rather than mocking the connection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mem_sync_engine::backend::Backend;
use mem_sync_engine::backends::memory::InMemoryBackend;
use mem_sync_engine::document::{observation_document, prompt_document, session_document, summary_document, Document};
use mem_sync_engine::error::BackendError;
use mem_sync_engine::model::{ObservationRow, SessionRow, SessionStatus, SummaryRow, UserPromptRow};
use mem_sync_engine::orchestrator::SyncEngine;
use mem_sync_engine::state::StateStore;
use mem_sync_engine::store::LocalStore;
use rusqlite::Connection;

fn local_store() -> Arc<LocalStore> {
    Arc::new(LocalStore::new(Connection::open_in_memory().unwrap()).unwrap())
}

fn state_store() -> (tempfile::TempDir, Arc<StateStore>, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    (dir, Arc::new(StateStore::new(path.clone())), path)
}

fn session_row(content_session_id: &str, memory_session_id: Option<&str>, project: &str, started_at_epoch: i64) -> SessionRow {
    SessionRow {
        content_session_id: content_session_id.to_string(),
        memory_session_id: memory_session_id.map(str::to_string),
        project: project.to_string(),
        user_prompt: "hi".into(),
        custom_title: None,
        started_at: "t".into(),
        started_at_epoch,
        completed_at: None,
        completed_at_epoch: None,
        status: SessionStatus::Active,
    }
}

#[tokio::test]
async fn bootstrap_plus_import() {
    let local = local_store();
    local.upsert_local_session(&session_row("local-c", Some("local-m"), "P", 10)).unwrap();
    local
        .insert_local_prompt(&UserPromptRow {
            content_session_id: "local-c".into(),
            prompt_number: 1,
            project: "P".into(),
            prompt_text: "hi".into(),
            created_at: "t".into(),
            created_at_epoch: 10,
        })
        .unwrap();
    local
        .insert_local_observation(&ObservationRow {
            memory_session_id: "local-m".into(),
            project: "P".into(),
            text: "did a thing".into(),
            kind: "discovery".into(),
            title: None,
            subtitle: None,
            facts: None,
            narrative: None,
            concepts: None,
            files_read: None,
            files_modified: None,
            prompt_number: Some(1),
            discovery_tokens: None,
            created_at: "t".into(),
            created_at_epoch: 11,
        })
        .unwrap();
    local
        .insert_local_summary(&SummaryRow {
            memory_session_id: "local-m".into(),
            project: "P".into(),
            title: None,
            narrative: None,
            facts: None,
            concepts: None,
            prompt_number: Some(1),
            discovery_tokens: None,
            created_at: "t".into(),
            created_at_epoch: 12,
        })
        .unwrap();

    let backend = Arc::new(InMemoryBackend::new("remote", "fp-1"));
    let remote_session = session_row("remote-c", Some("remote-m"), "Q", 20);
    backend.upsert_documents(&[session_document(&remote_session, None)]).await.unwrap();
    backend
        .upsert_documents(&[prompt_document(&UserPromptRow {
            content_session_id: "remote-c".into(),
            prompt_number: 1,
            project: "Q".into(),
            prompt_text: "yo".into(),
            created_at: "t".into(),
            created_at_epoch: 20,
        })])
        .await
        .unwrap();
    backend
        .upsert_documents(&[observation_document(&ObservationRow {
            memory_session_id: "remote-m".into(),
            project: "Q".into(),
            text: "remote thing".into(),
            kind: "discovery".into(),
            title: None,
            subtitle: None,
            facts: None,
            narrative: None,
            concepts: None,
            files_read: None,
            files_modified: None,
            prompt_number: Some(1),
            discovery_tokens: None,
            created_at: "t".into(),
            created_at_epoch: 21,
        })])
        .await
        .unwrap();
    backend
        .upsert_documents(&[summary_document(&SummaryRow {
            memory_session_id: "remote-m".into(),
            project: "Q".into(),
            title: None,
            narrative: None,
            facts: None,
            concepts: None,
            prompt_number: Some(1),
            discovery_tokens: None,
            created_at: "t".into(),
            created_at_epoch: 22,
        })])
        .await
        .unwrap();

    let (_dir, state, state_path) = state_store();
    let engine = Arc::new(SyncEngine::new(backend.clone(), local.clone(), state, Duration::from_secs(3600)));
    engine.schedule_full_sync("bootstrap", true).await;
    engine.flush().await;

    let remote_ids: Vec<String> = backend.snapshot().iter().map(|d| d.id.clone()).collect();
    assert!(remote_ids.contains(&"session:local-c".to_string()));
    assert!(remote_ids.contains(&"prompt:local-c:1".to_string()));

    assert!(local.session_by_content_id("remote-c").unwrap().is_some());
    assert!(local.prompt_by_id("remote-c", 1).unwrap().is_some());
    assert_eq!(local.all_observations().unwrap().len(), 2);
    assert_eq!(local.all_summaries().unwrap().len(), 2);

    let targets = StateStore::new(state_path).load();
    let target = targets.get("fp-1").unwrap();
    assert!(target.bootstrap_complete);
}

#[tokio::test]
async fn piggyback_of_memory_session_id() {
    let local = local_store();
    local.upsert_local_session(&session_row("pc", None, "P", 10)).unwrap();
    local
        .insert_local_prompt(&UserPromptRow {
            content_session_id: "pc".into(),
            prompt_number: 1,
            project: "P".into(),
            prompt_text: "hi".into(),
            created_at: "t".into(),
            created_at_epoch: 10,
        })
        .unwrap();

    let backend = Arc::new(InMemoryBackend::new("remote", "fp-2"));
    let (_dir, state, _path) = state_store();
    let engine = Arc::new(SyncEngine::new(backend.clone(), local.clone(), state, Duration::from_secs(3600)));

    engine.schedule_user_prompt_sync("pc".to_string(), 1).await;
    engine.flush().await;

    let pushed = find(&backend, "session:pc").unwrap();
    assert_eq!(pushed.payload.get("memory_session_id").and_then(|v| v.as_str()), None);

    let mut with_memory_id = local.session_by_content_id("pc").unwrap().unwrap();
    with_memory_id.memory_session_id = Some("pm".to_string());
    local.upsert_local_session(&with_memory_id).unwrap();
    local
        .insert_local_observation(&ObservationRow {
            memory_session_id: "pm".into(),
            project: "P".into(),
            text: "observed".into(),
            kind: "discovery".into(),
            title: None,
            subtitle: None,
            facts: None,
            narrative: None,
            concepts: None,
            files_read: None,
            files_modified: None,
            prompt_number: Some(1),
            discovery_tokens: None,
            created_at: "t".into(),
            created_at_epoch: 99,
        })
        .unwrap();

    engine.schedule_observation_sync("pm".to_string(), 99).await;
    engine.flush().await;

    let pushed = find(&backend, "session:pc").unwrap();
    assert_eq!(pushed.payload.get("memory_session_id").and_then(|v| v.as_str()), Some("pm"));
    assert_eq!(pushed.updated_at_epoch, 99);
}

#[tokio::test]
async fn duplicate_prompt_by_replay() {
    let local = local_store();
    local.upsert_local_session(&session_row("c1", None, "P", 1)).unwrap();

    let prompt_doc = prompt_document(&UserPromptRow {
        content_session_id: "c1".into(),
        prompt_number: 1,
        project: "P".into(),
        prompt_text: "hi".into(),
        created_at: "t".into(),
        created_at_epoch: 5,
    });

    let written = mem_sync_engine::import::apply_batch(&local, vec![prompt_doc.clone(), prompt_doc]).unwrap();
    assert_eq!(written, 1);
    assert_eq!(local.all_prompts().unwrap().len(), 1);
}

#[tokio::test]
async fn conflicting_memory_session_id() {
    let local = local_store();
    let a = session_document(&session_row("a", Some("x"), "P", 1), None);
    let b = session_document(&session_row("b", Some("x"), "Q", 2), None);

    mem_sync_engine::import::apply_batch(&local, vec![a]).unwrap();
    let written = mem_sync_engine::import::apply_batch(&local, vec![b]).unwrap();
    assert_eq!(written, 1);

    let row_a = local.session_by_content_id("a").unwrap().unwrap();
    let row_b = local.session_by_content_id("b").unwrap().unwrap();
    assert_eq!(row_a.memory_session_id.as_deref(), Some("x"));
    assert_eq!(row_b.memory_session_id, None);
}

/// A backend that fails its first `upsert_documents` call, then behaves
/// like a normal in-memory store. Grounded on spec.md §8 scenario 5.
struct FlakyBackend {
    inner: InMemoryBackend,
    failures_remaining: AtomicUsize,
}

impl FlakyBackend {
    fn new(failures: usize) -> Self {
        Self {
            inner: InMemoryBackend::new("flaky", "fp-flaky"),
            failures_remaining: AtomicUsize::new(failures),
        }
    }
}

#[async_trait::async_trait]
impl Backend for FlakyBackend {
    async fn initialize(&self) -> Result<(), BackendError> {
        self.inner.initialize().await
    }

    async fn upsert_documents(&self, docs: &[Document]) -> Result<(), BackendError> {
        if self.failures_remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| if n > 0 { Some(n - 1) } else { None }).is_ok() {
            return Err(BackendError::other("simulated transient failure"));
        }
        self.inner.upsert_documents(docs).await
    }

    async fn fetch_documents_updated_since(&self, since_epoch: i64) -> Result<Vec<Document>, BackendError> {
        self.inner.fetch_documents_updated_since(since_epoch).await
    }

    fn label(&self) -> &str {
        self.inner.label()
    }

    fn target_fingerprint(&self) -> &str {
        self.inner.target_fingerprint()
    }
}

#[tokio::test]
async fn backend_transient_failure_leaves_cursors_unchanged() {
    let local = local_store();
    local.upsert_local_session(&session_row("c1", None, "P", 1)).unwrap();
    local
        .insert_local_prompt(&UserPromptRow {
            content_session_id: "c1".into(),
            prompt_number: 1,
            project: "P".into(),
            prompt_text: "hi".into(),
            created_at: "t".into(),
            created_at_epoch: 5,
        })
        .unwrap();

    let backend = Arc::new(FlakyBackend::new(1));
    let (_dir, state, state_path) = state_store();
    let engine = Arc::new(SyncEngine::new(backend, local, state, Duration::from_secs(3600)));

    engine.schedule_full_sync("bootstrap", true).await;
    engine.flush().await;
    let after_failure = StateStore::new(state_path.clone()).load();
    assert!(!after_failure.get("fp-flaky").map(|t| t.bootstrap_complete).unwrap_or(false));

    engine.schedule_full_sync("bootstrap", true).await;
    engine.flush().await;
    let after_recovery = StateStore::new(state_path).load();
    assert!(after_recovery.get("fp-flaky").unwrap().bootstrap_complete);
}

#[tokio::test(flavor = "multi_thread")]
async fn interval_timer_runs_a_cycle_without_explicit_schedule() {
    let local = local_store();
    local.upsert_local_session(&session_row("c1", None, "P", 1)).unwrap();

    let backend = Arc::new(InMemoryBackend::new("remote", "fp-timer"));
    let (_dir, state, _path) = state_store();
    let engine = Arc::new(SyncEngine::new(backend.clone(), local, state, Duration::from_millis(50)));
    let timer = engine.start();

    tokio::time::sleep(Duration::from_millis(200)).await;
    engine.flush().await;

    assert!(!backend.is_empty());
    timer.abort();
}

fn find(backend: &InMemoryBackend, id: &str) -> Option<Document> {
    backend.snapshot().into_iter().find(|d| d.id == id)
}
