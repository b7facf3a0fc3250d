//! Firestore REST client.
//!
//! Thin typed wrapper over three endpoints (document get, `:batchWrite`,
//! `:runQuery`). Every call is traced, timed and counted; a 401 caused by an
//! expired token is retried once with a fresh lease.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info_span, Instrument};

use crate::auth::BearerTokens;
use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::{record_call, record_query_documents};
use crate::retry::RetryPolicy;
use crate::wire::{
    BatchWriteRequest, BatchWriteResponse, Document, RunQueryItem, RunQueryRequest,
    StructuredQuery, Write, WriteResult,
};

/// Server-side cap on writes per batch.
const MAX_BATCH_WRITES: usize = 500;

const PRODUCTION_HOST: &str = "https://firestore.googleapis.com";

#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    pub project_id: String,
    /// Usually `(default)`.
    pub database_id: String,
    /// `host:port` of an emulator. Disables OAuth.
    pub emulator_host: Option<String>,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryPolicy,
}

impl FirestoreConfig {
    /// Project from `GCP_PROJECT_ID`, falling back to `FIREBASE_PROJECT_ID`.
    pub fn from_env() -> FirestoreResult<Self> {
        let project_id = ["GCP_PROJECT_ID", "FIREBASE_PROJECT_ID"]
            .iter()
            .find_map(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| {
                FirestoreError::credentials("GCP_PROJECT_ID or FIREBASE_PROJECT_ID must be set")
            })?;

        let connect_timeout = std::env::var("FIRESTORE_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(5));

        Ok(Self {
            project_id,
            database_id: std::env::var("FIRESTORE_DATABASE_ID")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "(default)".to_string()),
            emulator_host: std::env::var("FIRESTORE_EMULATOR_HOST")
                .ok()
                .filter(|v| !v.is_empty()),
            timeout: Duration::from_secs(30),
            connect_timeout,
            retry: RetryPolicy::from_env(),
        })
    }

    /// Resource name prefix shared by every document in the database.
    pub fn documents_root(&self) -> String {
        format!(
            "projects/{}/databases/{}/documents",
            self.project_id, self.database_id
        )
    }

    fn endpoint(&self) -> String {
        let host = match &self.emulator_host {
            Some(emulator) => format!("http://{}", emulator),
            None => PRODUCTION_HOST.to_string(),
        };
        format!("{}/v1/{}", host, self.documents_root())
    }
}

#[derive(Clone)]
pub struct FirestoreClient {
    http: Client,
    config: Arc<FirestoreConfig>,
    endpoint: String,
    tokens: Arc<BearerTokens>,
}

impl FirestoreClient {
    pub fn new(config: FirestoreConfig) -> FirestoreResult<Self> {
        let tokens = if config.emulator_host.is_some() {
            BearerTokens::emulator()
        } else {
            BearerTokens::from_env()?
        };

        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("obsclip-firestore/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            endpoint: config.endpoint(),
            config: Arc::new(config),
            tokens: Arc::new(tokens),
        })
    }

    pub fn from_env() -> FirestoreResult<Self> {
        Self::new(FirestoreConfig::from_env()?)
    }

    pub fn config(&self) -> &FirestoreConfig {
        &self.config
    }

    /// `projects/{p}/databases/{d}/documents/{collection}/{id}`
    pub fn full_document_name(&self, collection: &str, doc_id: &str) -> String {
        format!("{}/{}/{}", self.config.documents_root(), collection, doc_id)
    }

    /// Run `op` under the configured retry policy.
    pub async fn with_retry<T, F, Fut>(&self, operation: &str, op: F) -> FirestoreResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = FirestoreResult<T>>,
    {
        self.config.retry.run(operation, op).await
    }

    /// Fetch one document; a missing document is `Ok(None)`.
    pub async fn get_document(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> FirestoreResult<Option<Document>> {
        let url = format!("{}/{}/{}", self.endpoint, collection, doc_id);
        let span = info_span!("firestore_request", operation = "get_document", collection, doc_id);

        self.observe("get_document", async {
            let response = self.send(|| self.http.get(&url)).await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            Self::decode(response).await.map(Some)
        }
        .instrument(span))
        .await
    }

    /// Apply writes independently; any per-write failure fails the call.
    pub async fn batch_write(&self, writes: &[Write]) -> FirestoreResult<Vec<WriteResult>> {
        if writes.is_empty() {
            return Ok(Vec::new());
        }
        if writes.len() > MAX_BATCH_WRITES {
            return Err(FirestoreError::Rejected {
                status: 400,
                message: format!("{} writes exceed the batch limit of {}", writes.len(), MAX_BATCH_WRITES),
            });
        }

        let url = format!("{}:batchWrite", self.endpoint);
        let body = BatchWriteRequest { writes };
        let span = info_span!("firestore_request", operation = "batch_write", writes = writes.len());

        self.observe("batch_write", async {
            let response = self.send(|| self.http.post(&url).json(&body)).await?;
            Self::decode::<BatchWriteResponse>(response)
                .await?
                .into_results()
        }
        .instrument(span))
        .await
    }

    /// Documents matching `query`, in the order Firestore lists them.
    pub async fn run_query(&self, query: &StructuredQuery) -> FirestoreResult<Vec<Document>> {
        let url = format!("{}:runQuery", self.endpoint);
        let collection = query.collection_id();
        let body = RunQueryRequest {
            structured_query: query,
        };
        let span = info_span!("firestore_request", operation = "run_query", collection);

        self.observe("run_query", async {
            let response = self.send(|| self.http.post(&url).json(&body)).await?;
            let items: Vec<RunQueryItem> = Self::decode(response).await?;
            let documents: Vec<Document> = items.into_iter().filter_map(|i| i.document).collect();
            record_query_documents(collection, documents.len());
            Ok(documents)
        }
        .instrument(span))
        .await
    }

    /// Send with a bearer token. An expired-token 401 is retried once.
    async fn send<F>(&self, build: F) -> FirestoreResult<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let token = self.tokens.bearer().await?;
        let response = build().bearer_auth(token).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if !body.contains("ACCESS_TOKEN_EXPIRED") && !body.contains("\"UNAUTHENTICATED\"") {
            return Err(FirestoreError::from_response(401, &body, None));
        }

        debug!("Firestore token expired mid-lease, renewing");
        self.tokens.forget().await;
        let token = self.tokens.bearer().await?;
        Ok(build().bearer_auth(token).send().await?)
    }

    /// Parse a 2xx body, or classify the failure.
    async fn decode<T: DeserializeOwned>(response: Response) -> FirestoreResult<T> {
        let status = response.status();
        if status.is_success() {
            let bytes = response.bytes().await?;
            return serde_json::from_slice(&bytes).map_err(|e| {
                FirestoreError::invalid_response(format!(
                    "{} (body starts {:?})",
                    e,
                    String::from_utf8_lossy(&bytes[..bytes.len().min(160)])
                ))
            });
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();
        Err(FirestoreError::from_response(status.as_u16(), &body, retry_after))
    }

    async fn observe<T>(
        &self,
        operation: &'static str,
        call: impl std::future::Future<Output = FirestoreResult<T>>,
    ) -> FirestoreResult<T> {
        let started = Instant::now();
        let result = call.await;
        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.status_code().unwrap_or(599),
        };
        record_call(operation, status, started.elapsed());
        result
    }
}
