//! PanelApp registry client.

use super::{send_with_retry, RateLimiter, RetryPolicy};
use crate::config::PanelAppConfig;
use crate::error::{PanelCheckError, Result};
use crate::models::{Confidence, GeneReference, PanelInfo, PanelMetadata};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const SERVICE: &str = "PanelApp";

/// Guard against a registry that keeps returning `next` links.
const MAX_LIST_PAGES: usize = 100;

/// A registry of curated gene panels.
#[async_trait]
pub trait PanelSource: Send + Sync {
    /// All panels, optionally narrowed by a registry-side search term.
    async fn list_panels(&self, search: Option<&str>) -> Result<Vec<PanelInfo>>;

    async fn get_metadata(&self, panel_id: &str, version: Option<&str>) -> Result<PanelMetadata>;

    /// Genes of a panel in registry order.
    async fn get_genes(&self, panel_id: &str, version: Option<&str>)
        -> Result<Vec<GeneReference>>;

    /// Metadata and genes together. Sources that serve both from one
    /// document should override this to read it once.
    async fn get_panel(
        &self,
        panel_id: &str,
        version: Option<&str>,
    ) -> Result<(PanelMetadata, Vec<GeneReference>)> {
        futures::try_join!(
            self.get_metadata(panel_id, version),
            self.get_genes(panel_id, version)
        )
    }
}

#[derive(Debug, Deserialize)]
struct PanelPage {
    #[serde(default)]
    next: Option<String>,
    #[serde(default)]
    results: Vec<PanelSummary>,
}

#[derive(Debug, Deserialize)]
struct PanelStats {
    #[serde(default)]
    number_of_genes: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct PanelSummary {
    id: Value,
    name: String,
    version: Value,
    #[serde(default)]
    version_signed_off: Value,
    #[serde(default)]
    stats: Option<PanelStats>,
}

#[derive(Debug, Deserialize)]
struct PanelDetail {
    id: Value,
    name: String,
    version: Value,
    #[serde(default)]
    stats: Option<PanelStats>,
    #[serde(default)]
    genes: Vec<PanelGene>,
}

#[derive(Debug, Deserialize)]
struct PanelGene {
    #[serde(default)]
    gene_data: Option<GeneData>,
    #[serde(default)]
    entity_name: Option<String>,
    #[serde(default)]
    confidence_level: Value,
}

#[derive(Debug, Deserialize)]
struct GeneData {
    #[serde(default)]
    gene_symbol: Option<String>,
}

/// PanelApp identifiers and versions arrive as either strings or numbers.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn is_signed_off(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

impl PanelSummary {
    fn into_info(self) -> PanelInfo {
        PanelInfo {
            id: value_to_string(&self.id),
            name: self.name,
            version: value_to_string(&self.version),
            gene_count: self.stats.and_then(|s| s.number_of_genes).unwrap_or(0),
            signed_off: is_signed_off(&self.version_signed_off),
        }
    }
}

impl PanelDetail {
    fn metadata(&self) -> PanelMetadata {
        PanelMetadata {
            id: value_to_string(&self.id),
            name: self.name.clone(),
            version: value_to_string(&self.version),
            gene_count: self
                .stats
                .as_ref()
                .and_then(|s| s.number_of_genes)
                .unwrap_or(self.genes.len()),
        }
    }

    fn into_genes(self, panel_id: &str) -> Vec<GeneReference> {
        let listed = self.genes.len();
        let genes: Vec<GeneReference> = self
            .genes
            .into_iter()
            .filter_map(PanelGene::into_reference)
            .collect();

        if genes.len() < listed {
            warn!(
                "Skipped {} panel entries without a gene symbol",
                listed - genes.len()
            );
        }
        debug!("Panel {} has {} genes", panel_id, genes.len());
        genes
    }
}

impl PanelGene {
    fn into_reference(self) -> Option<GeneReference> {
        let symbol = self
            .gene_data
            .and_then(|d| d.gene_symbol)
            .or(self.entity_name)
            .filter(|s| !s.trim().is_empty())?;
        let confidence = Confidence::from_level(&value_to_string(&self.confidence_level));
        Some(GeneReference::new(symbol.trim(), confidence))
    }
}

/// Client for the PanelApp REST API.
pub struct PanelAppClient {
    http: reqwest::Client,
    base_url: String,
    user_agent: String,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl PanelAppClient {
    pub fn new(config: &PanelAppConfig, limiter: Arc<RateLimiter>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| PanelCheckError::upstream(SERVICE, format!("client setup: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
            limiter,
            retry: RetryPolicy::new(config.retries, config.backoff_ms),
        })
    }

    /// GET `url` and decode it. A 404 becomes `NotFound(what)`.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        what: &str,
    ) -> Result<T> {
        let response = send_with_retry(SERVICE, &self.limiter, &self.retry, || {
            self.http
                .get(url)
                .query(query)
                .header("User-Agent", &self.user_agent)
                .header("Accept", "application/json")
        })
        .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(PanelCheckError::NotFound(what.to_string())),
            status if status.is_success() => response.json::<T>().await.map_err(|e| {
                PanelCheckError::upstream(SERVICE, format!("invalid response for {}: {}", what, e))
            }),
            status => Err(PanelCheckError::upstream(
                SERVICE,
                format!("HTTP {} for {}", status, what),
            )),
        }
    }

    async fn fetch_panel(&self, panel_id: &str, version: Option<&str>) -> Result<PanelDetail> {
        let url = format!("{}/panels/{}/", self.base_url, panel_id);
        let query: Vec<(&str, &str)> = version.map(|v| ("version", v)).into_iter().collect();
        let what = match version {
            Some(v) => format!("panel {} v{}", panel_id, v),
            None => format!("panel {}", panel_id),
        };
        self.get_json(&url, &query, &what).await
    }
}

#[async_trait]
impl PanelSource for PanelAppClient {
    async fn list_panels(&self, search: Option<&str>) -> Result<Vec<PanelInfo>> {
        let mut panels = Vec::new();
        let mut url = format!("{}/panels/", self.base_url);
        let first_query: Vec<(&str, &str)> = search
            .filter(|s| !s.trim().is_empty())
            .map(|s| ("search", s))
            .into_iter()
            .collect();

        for page_number in 0..MAX_LIST_PAGES {
            // `next` links already carry the query string.
            let query: &[(&str, &str)] = if page_number == 0 {
                first_query.as_slice()
            } else {
                &[]
            };
            let page: PanelPage = self.get_json(&url, query, "panel list").await?;
            panels.extend(page.results.into_iter().map(PanelSummary::into_info));

            match page.next {
                Some(next) if !next.is_empty() => {
                    debug!("Following panel list page {}", page_number + 2);
                    url = next;
                }
                _ => {
                    info!("Listed {} panels from PanelApp", panels.len());
                    return Ok(panels);
                }
            }
        }

        warn!("Panel list exceeded {} pages, truncating", MAX_LIST_PAGES);
        Ok(panels)
    }

    async fn get_metadata(&self, panel_id: &str, version: Option<&str>) -> Result<PanelMetadata> {
        Ok(self.fetch_panel(panel_id, version).await?.metadata())
    }

    async fn get_genes(
        &self,
        panel_id: &str,
        version: Option<&str>,
    ) -> Result<Vec<GeneReference>> {
        Ok(self.fetch_panel(panel_id, version).await?.into_genes(panel_id))
    }

    async fn get_panel(
        &self,
        panel_id: &str,
        version: Option<&str>,
    ) -> Result<(PanelMetadata, Vec<GeneReference>)> {
        let panel = self.fetch_panel(panel_id, version).await?;
        let metadata = panel.metadata();
        Ok((metadata, panel.into_genes(panel_id)))
    }
}
