/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! A non-persistent `Backend` used by this crate's own tests and available
//! to host-application tests. Grounded on `sync15::MemoryCachedState`'s role
//! as the teacher's non-persistent sync test double.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::backend::Backend;
use crate::document::Document;
use crate::error::BackendError;

pub struct InMemoryBackend {
    label: String,
    fingerprint: String,
    docs: Mutex<HashMap<String, Document>>,
}

impl InMemoryBackend {
    pub fn new(label: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            fingerprint: fingerprint.into(),
            docs: Mutex::new(HashMap::new()),
        }
    }

    /// Test helper: snapshot of everything currently upserted, for
    /// assertions.
    pub fn snapshot(&self) -> Vec<Document> {
        let mut docs: Vec<Document> = self.docs.lock().unwrap().values().cloned().collect();
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        docs
    }

    pub fn len(&self) -> usize {
        self.docs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl Backend for InMemoryBackend {
    async fn initialize(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn upsert_documents(&self, docs: &[Document]) -> Result<(), BackendError> {
        let mut store = self.docs.lock().unwrap();
        for doc in docs {
            store.insert(doc.id.clone(), doc.clone());
        }
        Ok(())
    }

    async fn fetch_documents_updated_since(&self, since_epoch: i64) -> Result<Vec<Document>, BackendError> {
        let store = self.docs.lock().unwrap();
        let mut out: Vec<Document> = store
            .values()
            .filter(|d| d.updated_at_epoch > since_epoch)
            .cloned()
            .collect();
        out.sort_by_key(|d| d.updated_at_epoch);
        Ok(out)
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn target_fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentKind;
    use serde_json::json;

    fn doc(id: &str, updated_at_epoch: i64) -> Document {
        Document {
            id: id.to_string(),
            kind: DocumentKind::Session,
            sort_epoch: updated_at_epoch,
            updated_at_epoch,
            payload: json!({}),
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_id() {
        let backend = InMemoryBackend::new("mem", "fp");
        backend.upsert_documents(&[doc("a", 1)]).await.unwrap();
        backend.upsert_documents(&[doc("a", 1)]).await.unwrap();
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn fetch_since_is_strictly_greater_than_and_ascending() {
        let backend = InMemoryBackend::new("mem", "fp");
        backend
            .upsert_documents(&[doc("a", 10), doc("b", 20), doc("c", 5)])
            .await
            .unwrap();
        let fetched = backend.fetch_documents_updated_since(10).await.unwrap();
        assert_eq!(fetched.iter().map(|d| d.id.clone()).collect::<Vec<_>>(), vec!["b"]);
    }
}
