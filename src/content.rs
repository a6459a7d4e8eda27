//! Content gateway in front of the Sanity query API.
//!
//! Four document collections are served, each with one fixed query. The
//! gateway is the only writer of the [`TtlCache`]; the `GET` endpoints are its
//! only readers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::cache::TtlCache;
use crate::config::SanityConfig;
use crate::error::AppError;
use crate::response::Response;

/// The cached document collections.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ContentType {
    Alerts,
    Faq,
    Channels,
    Themes,
}

impl ContentType {
    pub const ALL: [ContentType; 4] = [Self::Alerts, Self::Faq, Self::Channels, Self::Themes];

    /// Cache key and route segment.
    pub fn key(self) -> &'static str {
        match self {
            Self::Alerts   => "alerts",
            Self::Faq      => "faq",
            Self::Channels => "channels",
            Self::Themes   => "themes",
        }
    }

    /// Sanity `_type` of the documents in this collection.
    pub fn document_type(self) -> &'static str {
        match self {
            Self::Alerts   => "alert",
            Self::Faq      => "faq",
            Self::Channels => "channel",
            Self::Themes   => "theme",
        }
    }

    /// Published documents of this type; drafts are excluded.
    pub fn query(self) -> String {
        format!(
            "*[_type == '{}' && !(_id in path('drafts.**'))] {{...}}",
            self.document_type()
        )
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// The content backend as seen by the gateway.
#[async_trait]
pub trait ContentBackend: Send + Sync {
    /// Runs a GROQ query and returns its `result`.
    async fn fetch(&self, query: &str) -> Result<Value, AppError>;

    /// Resets dataset access permissions.
    async fn sync_permissions(&self) -> Result<(), AppError>;
}

// ── Sanity HTTP client ────────────────────────────────────────────────────────

/// [`ContentBackend`] over the Sanity HTTP API. Never uses the CDN.
pub struct SanityClient {
    http: reqwest::Client,
    config: SanityConfig,
}

#[derive(Deserialize)]
struct QueryResponse {
    result: Value,
}

impl SanityClient {
    pub fn new(config: SanityConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, config })
    }

    fn query_url(&self) -> String {
        let SanityConfig { api_host, api_version, dataset, .. } = &self.config;
        format!("{}/{api_version}/data/query/{dataset}", api_host.trim_end_matches('/'))
    }

    fn dataset_url(&self) -> String {
        let SanityConfig { management_host, api_version, project_id, dataset, .. } = &self.config;
        format!(
            "{}/{api_version}/projects/{project_id}/datasets/{dataset}",
            management_host.trim_end_matches('/')
        )
    }
}

async fn error_for_status(res: reqwest::Response) -> Result<reqwest::Response, AppError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_else(|e| format!("<unreadable body: {e}>"));
    Err(AppError::UpstreamUnavailable(format!("sanity responded {status}: {body}")))
}

#[async_trait]
impl ContentBackend for SanityClient {
    async fn fetch(&self, query: &str) -> Result<Value, AppError> {
        let res = self
            .http
            .get(self.query_url())
            .bearer_auth(&self.config.token)
            .query(&[("query", query)])
            .send()
            .await
            .map_err(AppError::upstream)?;

        let body: QueryResponse = error_for_status(res)
            .await?
            .json()
            .await
            .map_err(AppError::upstream)?;
        Ok(body.result)
    }

    async fn sync_permissions(&self) -> Result<(), AppError> {
        let res = self
            .http
            .patch(self.dataset_url())
            .bearer_auth(&self.config.token)
            .json(&json!({ "aclMode": "public" }))
            .send()
            .await
            .map_err(AppError::upstream)?;
        error_for_status(res).await?;
        Ok(())
    }
}

// ── Gateway ───────────────────────────────────────────────────────────────────

pub struct ContentGateway {
    backend: Arc<dyn ContentBackend>,
    cache: Arc<TtlCache<ContentType>>,
}

impl ContentGateway {
    pub fn new(backend: Arc<dyn ContentBackend>, cache: Arc<TtlCache<ContentType>>) -> Self {
        Self { backend, cache }
    }

    pub fn cache(&self) -> &Arc<TtlCache<ContentType>> {
        &self.cache
    }

    /// Cached collection for `kind`, fetched on miss. Failures are not cached.
    pub async fn get(&self, kind: ContentType) -> Result<Arc<Value>, AppError> {
        if let Some(hit) = self.cache.get(&kind) {
            debug!(%kind, "cache hit");
            return Ok(hit);
        }

        let result = self.backend.fetch(&kind.query()).await.inspect_err(|e| {
            warn!(%kind, "content fetch failed: {e}");
        })?;
        let result = Arc::new(result);
        self.cache.set(kind, Arc::clone(&result));
        Ok(result)
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Awaits the permission reset but reports nothing about its outcome
    /// beyond the log.
    pub async fn sync_permissions(&self) {
        match self.backend.sync_permissions().await {
            Ok(()) => info!("content permissions updated"),
            Err(e) => warn!("content permission update failed: {e}"),
        }
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// `GET /alerts | /faq | /channels | /themes`
pub async fn list(gateway: &ContentGateway, kind: ContentType) -> Result<Response, AppError> {
    let docs = gateway.get(kind).await?;
    Ok(Response::json_value(&*docs))
}

/// `POST /clear-cache`
pub fn clear_cache(gateway: &ContentGateway) -> Response {
    gateway.clear();
    Response::json_value(&json!({ "result": "Cache cleared" }))
}

/// `GET /update-permissions`
pub async fn update_permissions(gateway: &ContentGateway) -> Response {
    gateway.sync_permissions().await;
    Response::json_value(&json!({ "result": "Updated Sanity permissions" }))
}
