/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The narrow contract the remote document store must satisfy (spec.md §4.1).

use crate::document::Document;
use crate::error::BackendError;

/// Identity of a (provider, endpoint, database, container) tuple. Namespaces
/// a target's entry in the state file (spec.md §3, §4.2).
pub fn compute_target_fingerprint(provider: &str, endpoint: &str, database: &str, container: &str) -> String {
    use serde_json::json;
    use sha2::{Digest, Sha256};
    // Field order is fixed here (not alphabetical, unlike document ids) so
    // the fingerprint function reads as "the tuple, in the order callers
    // name it" -- it only needs to be stable across calls made by this
    // binary and its replicas, which a BTreeMap-backed object already is.
    let value = json!({
        "provider": provider,
        "endpoint": endpoint,
        "database": database,
        "container": container,
    });
    let bytes = serde_json::to_vec(&value).expect("fingerprint tuple is always serializable");
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
}

/// Everything the sync engine requires from a remote document store.
///
/// Error policy (spec.md §4.1): every operation fails with a single
/// transport/availability error; the engine does not distinguish
/// provider-specific codes and aborts the current cycle on any `Err`.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// Idempotent: ensures the remote container exists and is ready to
    /// receive upserts partitioned by document `kind`.
    async fn initialize(&self) -> Result<(), BackendError>;

    /// Writes each document by its `id`; last writer wins. Safe to call
    /// with ids that already exist remotely.
    async fn upsert_documents(&self, docs: &[Document]) -> Result<(), BackendError>;

    /// Returns all documents with `updatedAtEpoch > since_epoch`, ascending
    /// by `updatedAtEpoch`. May return more than strictly new documents;
    /// the importer's dedup keys make over-fetching harmless.
    async fn fetch_documents_updated_since(&self, since_epoch: i64) -> Result<Vec<Document>, BackendError>;

    /// Releases remote resources. Optional — the default is a no-op.
    async fn close(&self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Human-readable identity used in logs.
    fn label(&self) -> &str;

    /// Stable identifier for this (provider, endpoint, database, container)
    /// tuple; used as the state file's key for this target.
    fn target_fingerprint(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic_and_sensitive_to_every_field() {
        let base = compute_target_fingerprint("azure-cosmos", "https://a", "db", "ctr");
        assert_eq!(base, compute_target_fingerprint("azure-cosmos", "https://a", "db", "ctr"));
        assert_ne!(base, compute_target_fingerprint("azure-cosmos", "https://b", "db", "ctr"));
        assert_ne!(base, compute_target_fingerprint("azure-cosmos", "https://a", "db2", "ctr"));
        assert_ne!(base, compute_target_fingerprint("azure-cosmos", "https://a", "db", "ctr2"));
    }
}
