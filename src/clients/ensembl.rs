//! Ensembl REST client.
//!
//! Each Ensembl release is served from its own archive host, so every
//! lookup names the snapshot it targets.

use super::{send_with_retry, RateLimiter, RetryPolicy};
use crate::config::EnsemblConfig;
use crate::error::{PanelCheckError, Result};
use crate::models::Snapshot;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const SERVICE: &str = "Ensembl";

/// How a gene is looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneQuery {
    /// HGNC symbol, resolved within the configured species.
    Symbol(String),
    /// Ensembl stable gene id.
    Id(String),
}

impl fmt::Display for GeneQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneQuery::Symbol(symbol) => write!(f, "symbol {}", symbol),
            GeneQuery::Id(id) => write!(f, "id {}", id),
        }
    }
}

/// Gene record as returned by `/lookup`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EnsemblGene {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub seq_region_name: String,
    pub start: u64,
    pub end: u64,
    pub strand: i64,
    #[serde(default)]
    pub assembly_name: Option<String>,
}

/// A snapshot-addressed gene annotation service.
///
/// `Ok(None)` means the service answered that the gene does not exist in
/// that snapshot. Transport and server failures are errors.
#[async_trait]
pub trait AnnotationSource: Send + Sync {
    async fn lookup_by_symbol(&self, symbol: &str, snapshot: Snapshot)
        -> Result<Option<EnsemblGene>>;

    async fn lookup_by_id(&self, id: &str, snapshot: Snapshot) -> Result<Option<EnsemblGene>>;

    async fn lookup(&self, query: &GeneQuery, snapshot: Snapshot) -> Result<Option<EnsemblGene>> {
        match query {
            GeneQuery::Symbol(symbol) => self.lookup_by_symbol(symbol, snapshot).await,
            GeneQuery::Id(id) => self.lookup_by_id(id, snapshot).await,
        }
    }
}

/// Client for the Ensembl REST archives.
pub struct EnsemblClient {
    http: reqwest::Client,
    url_template: String,
    species: String,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl EnsemblClient {
    /// Create a client sharing `limiter` with every other Ensembl caller.
    pub fn new(config: &EnsemblConfig, limiter: Arc<RateLimiter>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| PanelCheckError::upstream(SERVICE, format!("client setup: {}", e)))?;

        Ok(Self {
            http,
            url_template: config.url_template.trim_end_matches('/').to_string(),
            species: config.species.clone(),
            limiter,
            retry: RetryPolicy::new(config.retries, config.backoff_ms),
        })
    }

    /// Base URL of the archive serving `snapshot`.
    pub fn base_url(&self, snapshot: Snapshot) -> String {
        self.url_template.replace("{release}", &snapshot.to_string())
    }

    /// Lookup URL under the `snapshot` archive, one path segment per item.
    ///
    /// Segments are percent-encoded, so a `/`, `?` or `#` in a symbol
    /// stays inside its segment.
    pub fn lookup_url(&self, snapshot: Snapshot, segments: &[&str]) -> Result<reqwest::Url> {
        let base = self.base_url(snapshot);
        let mut url = reqwest::Url::parse(&base).map_err(|e| {
            PanelCheckError::InvalidRequest(format!("bad Ensembl URL {}: {}", base, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                PanelCheckError::InvalidRequest(format!("Ensembl URL {} cannot take a path", base))
            })?
            .pop_if_empty()
            .push("lookup")
            .extend(segments);
        Ok(url)
    }

    async fn get_gene(&self, url: reqwest::Url) -> Result<Option<EnsemblGene>> {
        let response = send_with_retry(SERVICE, &self.limiter, &self.retry, || {
            self.http
                .get(url.clone())
                .header("Content-Type", "application/json")
                .header("Accept", "application/json")
        })
        .await?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!("Ensembl 404 for {}", url);
                Ok(None)
            }
            status if status.is_success() => {
                let gene = response.json::<EnsemblGene>().await.map_err(|e| {
                    PanelCheckError::upstream(SERVICE, format!("invalid lookup response: {}", e))
                })?;
                Ok(Some(gene))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(PanelCheckError::upstream(
                    SERVICE,
                    format!("HTTP {}: {}", status, body.trim()),
                ))
            }
        }
    }
}

#[async_trait]
impl AnnotationSource for EnsemblClient {
    async fn lookup_by_symbol(
        &self,
        symbol: &str,
        snapshot: Snapshot,
    ) -> Result<Option<EnsemblGene>> {
        let mut url = self.lookup_url(snapshot, &["symbol", self.species.as_str(), symbol])?;
        url.query_pairs_mut().append_pair("expand", "0");
        self.get_gene(url).await
    }

    async fn lookup_by_id(&self, id: &str, snapshot: Snapshot) -> Result<Option<EnsemblGene>> {
        let url = self.lookup_url(snapshot, &["id", id])?;
        self.get_gene(url).await
    }
}
