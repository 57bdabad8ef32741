/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! Bootstrap / incremental push / pull cycle (spec.md §4.6). Grounded on
//! the teacher's `TabsSyncImpl`'s state-machine-method shape (one method
//! per phase, called in sequence by a top-level `sync` entry point), with
//! phases made `async` and run one at a time by the `TaskQueue` worker
//! rather than inline on the caller's thread.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::Backend;
use crate::document::{dedup_and_sort_for_push, observation_document, prompt_document, session_document, summary_document, Document};
use crate::import;
use crate::queue::TaskQueue;
use crate::state::{StateStore, TargetState};
use crate::store::LocalStore;

/// Clock skew / out-of-order epoch assignment tolerance (spec.md §4.6).
const LOCAL_OVERLAP_MS: i64 = 5_000;
const REMOTE_OVERLAP_MS: i64 = 5_000;

pub struct SyncEngine {
    backend: Arc<dyn Backend>,
    local: Arc<LocalStore>,
    state: Arc<StateStore>,
    queue: TaskQueue,
    sync_interval: Duration,
}

impl SyncEngine {
    pub fn new(backend: Arc<dyn Backend>, local: Arc<LocalStore>, state: Arc<StateStore>, sync_interval: Duration) -> Self {
        Self {
            backend,
            local,
            state,
            queue: TaskQueue::start(256),
            sync_interval,
        }
    }

    fn load_target_state(&self) -> TargetState {
        self.state
            .load()
            .get(self.backend.target_fingerprint())
            .copied()
            .unwrap_or_default()
    }

    fn save_target_state(&self, target: TargetState) {
        let mut all = self.state.load();
        all.insert(self.backend.target_fingerprint().to_string(), target);
        if let Err(err) = self.state.save(&all) {
            log::warn!("failed to persist sync state for {}: {}", self.backend.label(), err);
        }
    }

    /// Runs one full cycle: init, conditional bootstrap, incremental push,
    /// pull, persist. Any backend failure aborts the cycle leaving cursors
    /// untouched; the next scheduled cycle retries from the last good state.
    async fn perform_synchronization(&self, reason: &str, bootstrap_local: bool) -> anyhow::Result<()> {
        log::debug!("sync cycle starting ({}) for {}", reason, self.backend.label());
        self.backend.initialize().await?;
        let mut target = self.load_target_state();

        if !target.bootstrap_complete && bootstrap_local {
            let mut docs = Vec::new();
            docs.extend(self.local.all_sessions()?.iter().map(|row| session_document(row, None)));
            docs.extend(self.local.all_prompts()?.iter().map(prompt_document));
            docs.extend(self.local.all_observations()?.iter().map(observation_document));
            docs.extend(self.local.all_summaries()?.iter().map(summary_document));
            let docs = dedup_and_sort_for_push(docs);
            if !docs.is_empty() {
                self.backend.upsert_documents(&docs).await?;
                let max_epoch = docs.iter().map(|d| d.updated_at_epoch).max().unwrap_or(0);
                target.last_local_push_epoch = target.last_local_push_epoch.max(max_epoch);
            }
            target.bootstrap_complete = true;
            self.save_target_state(target);
        }

        let since = (target.last_local_push_epoch - LOCAL_OVERLAP_MS).max(0);
        let mut push_docs = Vec::new();
        push_docs.extend(self.local.prompts_since(since)?.iter().map(prompt_document));
        push_docs.extend(self.local.observations_since(since)?.iter().map(observation_document));
        push_docs.extend(self.local.summaries_since(since)?.iter().map(summary_document));
        for row in self.local.sessions_since(since)? {
            push_docs.push(session_document(&row, None));
        }
        let push_docs = dedup_and_sort_for_push(push_docs);
        if !push_docs.is_empty() {
            self.backend.upsert_documents(&push_docs).await?;
            let max_epoch = push_docs.iter().map(|d| d.updated_at_epoch).max().unwrap_or(0);
            target.last_local_push_epoch = target.last_local_push_epoch.max(max_epoch);
            self.save_target_state(target);
        }

        let pull_since = (target.last_pull_epoch - REMOTE_OVERLAP_MS).max(0);
        let pulled = self.backend.fetch_documents_updated_since(pull_since).await?;
        if !pulled.is_empty() {
            let max_epoch = pulled.iter().map(|d| d.updated_at_epoch).max().unwrap_or(target.last_pull_epoch);
            import::apply_batch(&self.local, pulled)?;
            target.last_pull_epoch = target.last_pull_epoch.max(max_epoch);
        }

        self.save_target_state(target);
        Ok(())
    }

    /// Pushes a single row's document plus its piggybacked session document
    /// (spec.md §4.6 "Piggybacking"). Does not run a pull.
    async fn push_one(&self, mut docs: Vec<Document>) -> anyhow::Result<()> {
        docs = dedup_and_sort_for_push(docs);
        if docs.is_empty() {
            return Ok(());
        }
        self.backend.upsert_documents(&docs).await?;
        let max_epoch = docs.iter().map(|d| d.updated_at_epoch).max().unwrap_or(0);
        let mut target = self.load_target_state();
        target.last_local_push_epoch = target.last_local_push_epoch.max(max_epoch);
        self.save_target_state(target);
        Ok(())
    }

    /// Schedules a full cycle. `bootstrap_local` requests the one-time full
    /// upload if the target has never completed it.
    pub async fn schedule_full_sync(self: &Arc<Self>, reason: &'static str, bootstrap_local: bool) {
        let this = Arc::clone(self);
        self.queue
            .submit(async move { this.perform_synchronization(reason, bootstrap_local).await })
            .await;
    }

    pub async fn schedule_user_prompt_sync(self: &Arc<Self>, content_session_id: String, prompt_number: i64) {
        let this = Arc::clone(self);
        self.queue
            .submit(async move {
                let Some(row) = this.local.prompt_by_id(&content_session_id, prompt_number)? else {
                    return Ok(());
                };
                let mut docs = vec![prompt_document(&row)];
                let session = this.local.session_or_blank(&content_session_id)?;
                docs.push(session_document(&session, Some(row.created_at_epoch)));
                this.push_one(docs).await
            })
            .await;
    }

    pub async fn schedule_observation_sync(self: &Arc<Self>, memory_session_id: String, created_at_epoch: i64) {
        let this = Arc::clone(self);
        self.queue
            .submit(async move {
                let rows = this.local.observations_since(created_at_epoch)?;
                let Some(row) = rows
                    .into_iter()
                    .find(|r| r.memory_session_id == memory_session_id && r.created_at_epoch == created_at_epoch)
                else {
                    return Ok(());
                };
                let mut docs = vec![observation_document(&row)];
                if let Some(session) = this.local.session_by_memory_id(&memory_session_id)? {
                    docs.push(session_document(&session, Some(row.created_at_epoch)));
                }
                this.push_one(docs).await
            })
            .await;
    }

    pub async fn schedule_summary_sync(self: &Arc<Self>, memory_session_id: String, created_at_epoch: i64) {
        let this = Arc::clone(self);
        self.queue
            .submit(async move {
                let rows = this.local.summaries_since(created_at_epoch)?;
                let Some(row) = rows
                    .into_iter()
                    .find(|r| r.memory_session_id == memory_session_id && r.created_at_epoch == created_at_epoch)
                else {
                    return Ok(());
                };
                let mut docs = vec![summary_document(&row)];
                if let Some(session) = this.local.session_by_memory_id(&memory_session_id)? {
                    docs.push(session_document(&session, Some(row.created_at_epoch)));
                }
                this.push_one(docs).await
            })
            .await;
    }

    /// Spawns the periodic timer. Each tick enqueues a non-bootstrapping
    /// full cycle (spec.md §4.6 "Periodic").
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        let interval = this.sync_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                this.schedule_full_sync("interval", false).await;
            }
        })
    }

    /// Stops the timer, drains the queue, and closes the backend. `timer` is
    /// the handle returned by [`SyncEngine::start`]. Callers share a
    /// `SyncEngine` as an `Arc`, so this takes one; if other clones are
    /// still alive when this is called, the queue's worker task is left
    /// running rather than forcibly torn down out from under them.
    pub async fn shutdown(self: Arc<Self>, timer: tokio::task::JoinHandle<()>) {
        timer.abort();
        self.queue.flush().await;
        if let Err(err) = self.backend.close().await {
            log::warn!("error closing backend {}: {}", self.backend.label(), err);
        }
        match Arc::try_unwrap(self) {
            Ok(inner) => inner.queue.shutdown().await,
            Err(_) => log::warn!("sync engine still shared at shutdown; queue worker left running"),
        }
    }

    pub async fn flush(&self) {
        self.queue.flush().await;
    }
}
