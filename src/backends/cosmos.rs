/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

//! The one remote `Backend` spec.md §6 names: Azure Cosmos DB's SQL API,
//! driven over its REST surface (no Cosmos SDK dependency, matching the
//! teacher's preference for a thin `reqwest` client over a provider SDK
//! wherever one of its components talks to a cloud HTTP API).
//!
//! Credential handling is deliberately minimal (spec.md §1 Non-goals:
//! "backend authentication mechanics"). `credential` is forwarded verbatim
//! as the bearer of a Cosmos *resource token* — a pre-scoped, pre-signed
//! token Cosmos accepts directly in the `Authorization` header, unlike a
//! master key, which this backend does not implement support for since
//! doing so would mean owning per-request HMAC signing the crate has no
//! business owning.

use reqwest::{Client, StatusCode};
use serde_json::{json, Value as JsonValue};

use crate::backend::{compute_target_fingerprint, Backend};
use crate::document::Document;
use crate::error::BackendError;

const API_VERSION: &str = "2018-12-31";

pub struct CosmosBackend {
    client: Client,
    endpoint: String,
    database: String,
    container: String,
    credential: String,
    label: String,
    fingerprint: String,
}

impl CosmosBackend {
    pub fn new(endpoint: impl Into<String>, database: impl Into<String>, container: impl Into<String>, credential: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        let database = database.into();
        let container = container.into();
        let fingerprint = compute_target_fingerprint("azure-cosmos", &endpoint, &database, &container);
        let label = format!("azure-cosmos:{}/{}", database, container);
        Self {
            client: Client::new(),
            endpoint,
            database,
            container,
            credential: credential.into(),
            label,
            fingerprint,
        }
    }

    fn containers_url(&self) -> String {
        format!("{}/dbs/{}/colls", self.endpoint.trim_end_matches('/'), self.database)
    }

    fn docs_url(&self) -> String {
        format!(
            "{}/dbs/{}/colls/{}/docs",
            self.endpoint.trim_end_matches('/'),
            self.database,
            self.container
        )
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("Authorization", &self.credential)
            .header("x-ms-version", API_VERSION)
    }

    async fn read_error_body(resp: reqwest::Response) -> BackendError {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        BackendError::Remote { status, body }
    }
}

#[async_trait::async_trait]
impl Backend for CosmosBackend {
    async fn initialize(&self) -> Result<(), BackendError> {
        let body = json!({
            "id": self.container,
            "partitionKey": { "paths": ["/kind"], "kind": "Hash" },
        });
        let resp = self
            .authed(self.client.post(self.containers_url()).json(&body))
            .send()
            .await?;
        match resp.status() {
            StatusCode::OK | StatusCode::CREATED | StatusCode::CONFLICT => Ok(()),
            _ => Err(Self::read_error_body(resp).await),
        }
    }

    async fn upsert_documents(&self, docs: &[Document]) -> Result<(), BackendError> {
        let mut first_failure: Option<BackendError> = None;
        for doc in docs {
            let resp = self
                .authed(self.client.post(self.docs_url()).json(doc))
                .header("x-ms-documentdb-is-upsert", "true")
                .header("x-ms-documentdb-partitionkey", format!("[\"{}\"]", doc.kind.as_str()))
                .send()
                .await;
            let outcome = match resp {
                Ok(resp) if resp.status().is_success() => Ok(()),
                Ok(resp) => Err(Self::read_error_body(resp).await),
                Err(err) => Err(BackendError::from(err)),
            };
            if let Err(err) = outcome {
                if first_failure.is_none() {
                    first_failure = Some(err);
                }
            }
        }
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn fetch_documents_updated_since(&self, since_epoch: i64) -> Result<Vec<Document>, BackendError> {
        let query = json!({
            "query": "SELECT * FROM c WHERE c.updatedAtEpoch > @since ORDER BY c.updatedAtEpoch ASC",
            "parameters": [{ "name": "@since", "value": since_epoch }],
        });
        let resp = self
            .authed(self.client.post(self.docs_url()).json(&query))
            .header("x-ms-documentdb-isquery", "true")
            .header("x-ms-documentdb-query-enablecrosspartition", "true")
            .header("Content-Type", "application/query+json")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::read_error_body(resp).await);
        }
        let body: JsonValue = resp.json().await?;
        let docs = body
            .get("Documents")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        docs.into_iter()
            .map(|v| Ok(serde_json::from_value::<Document>(v)?))
            .collect::<Result<Vec<_>, BackendError>>()
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn target_fingerprint(&self) -> &str {
        &self.fingerprint
    }
}
