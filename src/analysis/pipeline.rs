//! End-to-end panel comparison.
//!
//! Stages run in a fixed sequence: panel resolution, optional current
//! release detection, concurrent per-gene fetches, comparison, aggregation.

use super::aggregator::aggregate;
use super::comparator::{diff, GeneDiff};
use super::fetcher::AnnotationFetcher;
use super::resolver::VersionResolver;
use crate::clients::{
    AnnotationSource, EnsemblClient, GeneQuery, PanelAppClient, PanelSource, RateLimiter,
};
use crate::config::Config;
use crate::error::{PanelCheckError, Result};
use crate::models::{
    Annotation, GeneReference, PanelInfo, PanelReport, Snapshot, SnapshotDetection,
};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Tunables for a [`Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Maximum genes in flight at once.
    pub concurrency: usize,
    /// Deadline for a whole analysis run.
    pub run_timeout: Duration,
    /// Releases tried by detection, newest first.
    pub candidate_snapshots: Vec<Snapshot>,
    /// Release assumed when detection finds nothing.
    pub default_snapshot: Snapshot,
    /// Drop panels without a signed-off version from listings.
    pub signed_off_only: bool,
    /// Render a progress bar while fetching.
    pub show_progress: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let config = Config::default();
        Self::from(&config)
    }
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            concurrency: config.general.concurrency,
            run_timeout: Duration::from_secs(config.general.run_timeout_seconds),
            candidate_snapshots: config.ensembl.candidate_snapshots.clone(),
            default_snapshot: config.ensembl.fallback_snapshot(),
            signed_off_only: config.panelapp.signed_off_only,
            show_progress: false,
        }
    }
}

/// What to compare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub panel_id: String,
    /// Pinned panel version; latest when absent.
    pub panel_version: Option<String>,
    pub target_snapshot: Snapshot,
    /// Skip detection and use this release as the baseline.
    pub current_snapshot: Option<Snapshot>,
}

impl AnalysisRequest {
    pub fn new(panel_id: impl Into<String>, target_snapshot: Snapshot) -> Self {
        Self {
            panel_id: panel_id.into(),
            panel_version: None,
            target_snapshot,
            current_snapshot: None,
        }
    }
}

/// The panel comparison core.
pub struct Pipeline {
    panels: Arc<dyn PanelSource>,
    fetcher: AnnotationFetcher,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        panels: Arc<dyn PanelSource>,
        annotations: Arc<dyn AnnotationSource>,
        assembly: impl Into<String>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            panels,
            fetcher: AnnotationFetcher::new(annotations, assembly),
            settings,
        }
    }

    /// Build the live pipeline: one rate limiter per service, shared by
    /// every request this pipeline makes.
    pub fn from_config(config: &Config) -> Result<Self> {
        let panel_limiter = Arc::new(RateLimiter::per_seconds(
            "panelapp",
            config.panelapp.max_calls,
            config.panelapp.window_seconds,
        ));
        let ensembl_limiter = Arc::new(RateLimiter::per_seconds(
            "ensembl",
            config.ensembl.max_calls,
            config.ensembl.window_seconds,
        ));

        let panels = PanelAppClient::new(&config.panelapp, panel_limiter)?;
        let annotations = EnsemblClient::new(&config.ensembl, ensembl_limiter)?;

        Ok(Self::new(
            Arc::new(panels),
            Arc::new(annotations),
            config.ensembl.assembly.clone(),
            PipelineSettings::from(config),
        ))
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.settings.show_progress = show;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// List panels, optionally narrowed by a search term.
    pub async fn list_panels(&self, search: Option<&str>) -> Result<Vec<PanelInfo>> {
        let panels = self.panels.list_panels(search).await?;
        if !self.settings.signed_off_only {
            return Ok(panels);
        }

        let listed = panels.len();
        let signed_off: Vec<PanelInfo> = panels.into_iter().filter(|p| p.signed_off).collect();
        debug!(
            "Kept {} of {} panels with a signed-off version",
            signed_off.len(),
            listed
        );
        Ok(signed_off)
    }

    /// Detect which release a panel's genes currently correspond to.
    pub async fn detect_current_snapshot(
        &self,
        panel_id: &str,
        panel_version: Option<&str>,
    ) -> Result<SnapshotDetection> {
        let genes = self.panels.get_genes(panel_id, panel_version).await?;
        Ok(self.detect(&genes).await)
    }

    /// Look up a single gene in one release.
    pub async fn lookup(&self, query: &GeneQuery, snapshot: Snapshot) -> Result<Option<Annotation>> {
        self.fetcher.fetch(query, snapshot).await
    }

    /// Compare a panel between its current release and the target release.
    ///
    /// Either the full report is produced or an error is returned; a run
    /// that exceeds the deadline is cancelled with all in-flight lookups.
    pub async fn run_analysis(&self, request: &AnalysisRequest) -> Result<PanelReport> {
        let timeout = self.settings.run_timeout;
        tokio::time::timeout(timeout, self.run(request))
            .await
            .map_err(|_| PanelCheckError::TimedOut(timeout.as_secs()))?
    }

    async fn run(&self, request: &AnalysisRequest) -> Result<PanelReport> {
        let started = Instant::now();
        validate_snapshot(request.target_snapshot)?;
        if let Some(current) = request.current_snapshot {
            validate_snapshot(current)?;
        }

        let version = request.panel_version.as_deref();
        let (metadata, genes) = self.panels.get_panel(&request.panel_id, version).await?;
        info!(
            "Panel {} ({} v{}): {} genes",
            metadata.id,
            metadata.name,
            metadata.version,
            genes.len()
        );

        let detection = match request.current_snapshot {
            Some(_) => None,
            None => Some(self.detect(&genes).await),
        };
        let current_snapshot = request
            .current_snapshot
            .or(detection.as_ref().map(|d| d.snapshot))
            .unwrap_or(self.settings.default_snapshot);

        info!(
            "Comparing release {} against {}",
            current_snapshot, request.target_snapshot
        );

        let total_genes = genes.len();
        let indexed = self
            .compare_genes(genes, current_snapshot, request.target_snapshot)
            .await;
        let (genes, summary) = aggregate(indexed);

        Ok(PanelReport {
            panel_id: metadata.id,
            panel_name: metadata.name,
            panel_version: metadata.version,
            current_snapshot,
            target_snapshot: request.target_snapshot,
            detection,
            total_genes,
            summary,
            genes,
            generated_at: Utc::now(),
            duration_seconds: started.elapsed().as_secs_f64(),
        })
    }

    async fn detect(&self, genes: &[GeneReference]) -> SnapshotDetection {
        VersionResolver::new(&self.fetcher)
            .detect(
                genes,
                &self.settings.candidate_snapshots,
                self.settings.default_snapshot,
            )
            .await
    }

    /// Fetch both releases for every gene and diff them.
    ///
    /// Results come back in completion order, tagged with panel position.
    async fn compare_genes(
        &self,
        genes: Vec<GeneReference>,
        current: Snapshot,
        target: Snapshot,
    ) -> Vec<(usize, GeneDiff)> {
        let progress = self.progress_bar(genes.len() as u64);

        let indexed: Vec<(usize, GeneDiff)> = stream::iter(genes.into_iter().enumerate())
            .map(|(index, gene)| {
                let progress = progress.clone();
                async move {
                    let query = GeneQuery::Symbol(gene.symbol.clone());
                    let (current, target) = futures::join!(
                        self.fetcher.fetch_or_absent(&query, current),
                        self.fetcher.fetch_or_absent(&query, target),
                    );
                    if let Some(ref bar) = progress {
                        bar.set_message(gene.symbol.clone());
                        bar.inc(1);
                    }
                    (index, diff(gene, current, target))
                }
            })
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        if let Some(bar) = progress {
            bar.finish_and_clear();
        }

        indexed
    }

    fn progress_bar(&self, len: u64) -> Option<ProgressBar> {
        if !self.settings.show_progress {
            return None;
        }

        let bar = ProgressBar::new(len);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("   {bar:40.cyan/blue} {pos}/{len} genes {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        Some(bar)
    }
}

fn validate_snapshot(snapshot: Snapshot) -> Result<()> {
    if snapshot.is_supported() {
        Ok(())
    } else {
        Err(PanelCheckError::InvalidRequest(format!(
            "Ensembl release {} outside supported range {}-{}",
            snapshot,
            Snapshot::OLDEST_SUPPORTED,
            Snapshot::NEWEST_SUPPORTED
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::comparator::DiffStatus;
    use crate::analysis::testing::{ensembl_gene, FakeAnnotations, FakePanels};
    use crate::models::{Confidence, DetectionMethod};

    fn settings() -> PipelineSettings {
        PipelineSettings {
            concurrency: 4,
            run_timeout: Duration::from_secs(5),
            candidate_snapshots: [111, 110, 109, 107].into_iter().map(Snapshot).collect(),
            default_snapshot: Snapshot(107),
            signed_off_only: true,
            show_progress: false,
        }
    }

    fn three_gene_panel() -> FakePanels {
        FakePanels::default().with_panel(
            "245",
            "Test panel",
            vec![
                GeneReference::new("GENEA", Confidence::Green),
                GeneReference::new("GENEB", Confidence::Green),
                GeneReference::new("GENEC", Confidence::Green),
            ],
        )
    }

    /// GENEA identical, GENEB end shifted by 8000bp, GENEC gone in 111.
    fn three_gene_annotations() -> FakeAnnotations {
        FakeAnnotations::default()
            .with(109, ensembl_gene("ENSGA", "GENEA", 1000, 2000))
            .with(111, ensembl_gene("ENSGA", "GENEA", 1000, 2000))
            .with(109, ensembl_gene("ENSGB", "GENEB", 1, 36471))
            .with(111, ensembl_gene("ENSGB", "GENEB", 1, 44471))
            .with(109, ensembl_gene("ENSGC", "GENEC", 500, 900))
    }

    fn pipeline(panels: FakePanels, annotations: FakeAnnotations) -> Pipeline {
        Pipeline::new(Arc::new(panels), Arc::new(annotations), "GRCh38", settings())
    }

    #[tokio::test]
    async fn test_three_gene_scenario() {
        let pipeline = pipeline(three_gene_panel(), three_gene_annotations());
        let mut request = AnalysisRequest::new("245", Snapshot(111));
        request.current_snapshot = Some(Snapshot(109));

        let report = pipeline.run_analysis(&request).await.unwrap();

        assert_eq!(report.panel_name, "Test panel");
        assert_eq!(report.total_genes, 3);
        assert_eq!(report.current_snapshot, Snapshot(109));
        assert!(report.detection.is_none());

        let a = &report.genes[0];
        assert_eq!(a.status(), DiffStatus::Retained);
        assert_eq!(a.size_change_percent(), Some(0.0));

        let b = &report.genes[1];
        assert!(b.location_changed());
        let pct = b.size_change_percent().unwrap();
        assert!((pct - 21.93).abs() < 0.01);

        let c = &report.genes[2];
        assert_eq!(c.status(), DiffStatus::Missing);
        assert_eq!(c.size_change_percent(), None);

        assert_eq!(report.summary.symbols_retained, 2);
        assert_eq!(report.summary.symbols_changed, 0);
        assert_eq!(report.summary.locations_changed, 1);
        assert_eq!(report.summary.genes_missing, 1);
    }

    #[tokio::test]
    async fn test_detects_current_release_when_not_given() {
        let pipeline = pipeline(three_gene_panel(), three_gene_annotations());
        let request = AnalysisRequest::new("245", Snapshot(111));

        let report = pipeline.run_analysis(&request).await.unwrap();
        let detection = report.detection.unwrap();

        // GENEA exists in 111, the newest candidate.
        assert_eq!(detection.snapshot, Snapshot(111));
        assert_eq!(detection.method, DetectionMethod::Symbol);
        assert_eq!(report.current_snapshot, Snapshot(111));
    }

    #[tokio::test]
    async fn test_sorts_by_confidence_preserving_panel_order() {
        let panels = FakePanels::default().with_panel(
            "1",
            "Mixed",
            vec![
                GeneReference::new("R1", Confidence::Red),
                GeneReference::new("G1", Confidence::Green),
                GeneReference::new("A1", Confidence::Amber),
                GeneReference::new("R2", Confidence::Red),
                GeneReference::new("G2", Confidence::Green),
            ],
        );
        let pipeline = pipeline(panels, FakeAnnotations::default());
        let mut request = AnalysisRequest::new("1", Snapshot(111));
        request.current_snapshot = Some(Snapshot(109));

        let report = pipeline.run_analysis(&request).await.unwrap();
        let order: Vec<&str> = report.genes.iter().map(|g| g.gene().symbol.as_str()).collect();

        assert_eq!(order, vec!["G1", "G2", "A1", "R1", "R2"]);
        assert_eq!(report.summary.genes_missing, 5);
    }

    #[tokio::test]
    async fn test_flaky_gene_degrades_instead_of_failing() {
        let annotations = three_gene_annotations().failing(111, "GENEA");
        let pipeline = pipeline(three_gene_panel(), annotations);
        let mut request = AnalysisRequest::new("245", Snapshot(111));
        request.current_snapshot = Some(Snapshot(109));

        let report = pipeline.run_analysis(&request).await.unwrap();

        assert_eq!(report.total_genes, 3);
        assert_eq!(report.genes[0].status(), DiffStatus::Missing);
        assert_eq!(report.summary.genes_missing, 2);
    }

    #[tokio::test]
    async fn test_unknown_panel_is_fatal() {
        let pipeline = pipeline(three_gene_panel(), three_gene_annotations());
        let request = AnalysisRequest::new("999", Snapshot(111));

        let result = pipeline.run_analysis(&request).await;
        assert!(matches!(result, Err(PanelCheckError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_registry_outage_is_fatal() {
        let pipeline = pipeline(three_gene_panel().unavailable(), three_gene_annotations());
        let request = AnalysisRequest::new("245", Snapshot(111));

        let result = pipeline.run_analysis(&request).await;
        assert!(matches!(
            result,
            Err(PanelCheckError::UpstreamUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_unsupported_target_is_rejected() {
        let pipeline = pipeline(three_gene_panel(), three_gene_annotations());
        let request = AnalysisRequest::new("245", Snapshot(42));

        let result = pipeline.run_analysis(&request).await;
        assert!(matches!(result, Err(PanelCheckError::InvalidRequest(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_times_out_without_partial_report() {
        let annotations = three_gene_annotations().with_delay(Duration::from_secs(60));
        let pipeline = pipeline(three_gene_panel(), annotations);
        let mut request = AnalysisRequest::new("245", Snapshot(111));
        request.current_snapshot = Some(Snapshot(109));

        let result = pipeline.run_analysis(&request).await;
        assert!(matches!(result, Err(PanelCheckError::TimedOut(5))));
    }

    #[tokio::test]
    async fn test_detect_current_snapshot() {
        let annotations = FakeAnnotations::default().with(109, ensembl_gene("ENSGA", "GENEA", 1, 10));
        let pipeline = pipeline(three_gene_panel(), annotations);

        let detection = pipeline.detect_current_snapshot("245", None).await.unwrap();
        assert_eq!(detection.snapshot, Snapshot(109));
        assert_eq!(detection.gene.as_deref(), Some("GENEA"));
    }

    #[tokio::test]
    async fn test_list_panels_filters_unsigned() {
        let panels = FakePanels::default()
            .with_listing("1", "Signed", true)
            .with_listing("2", "Draft", false);
        let pipeline = pipeline(panels, FakeAnnotations::default());

        let listed = pipeline.list_panels(None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Signed");
    }

    #[tokio::test]
    async fn test_list_panels_passes_search_through() {
        let panels = FakePanels::default()
            .with_listing("1", "Breast cancer", true)
            .with_listing("2", "Cardiomyopathy", true);
        let pipeline = pipeline(panels, FakeAnnotations::default());

        let listed = pipeline.list_panels(Some("cancer")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "1");
    }

    #[tokio::test]
    async fn test_run_reads_panel_once() {
        let panels = Arc::new(three_gene_panel());
        let pipeline = Pipeline::new(
            panels.clone(),
            Arc::new(three_gene_annotations()),
            "GRCh38",
            settings(),
        );
        let mut request = AnalysisRequest::new("245", Snapshot(111));
        request.current_snapshot = Some(Snapshot(109));

        pipeline.run_analysis(&request).await.unwrap();
        assert_eq!(panels.reads(), 1);
    }

    /// Each service gets its own limiter: a spent PanelApp window never
    /// holds up Ensembl, and Ensembl calls are paced by their own budget.
    #[tokio::test]
    async fn test_from_config_gives_each_service_its_own_limiter() {
        use mockito::{Matcher, Server};
        use serde_json::json;

        let mut server = Server::new_async().await;
        let panel = server
            .mock("GET", "/panels/245/")
            .with_status(200)
            .with_body(
                json!({
                    "id": 245,
                    "name": "Test panel",
                    "version": "1.0",
                    "genes": [{"gene_data": {"gene_symbol": "GENEA"}, "confidence_level": "3"}]
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;
        let gene_body = json!({
            "id": "ENSGA",
            "display_name": "GENEA",
            "seq_region_name": "1",
            "start": 1000,
            "end": 2000,
            "strand": 1,
            "assembly_name": "GRCh38"
        })
        .to_string();
        let current = server
            .mock("GET", "/e109/lookup/symbol/homo_sapiens/GENEA")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(gene_body.clone())
            .expect(1)
            .create_async()
            .await;
        let target = server
            .mock("GET", "/e111/lookup/symbol/homo_sapiens/GENEA")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(gene_body)
            .expect(2)
            .create_async()
            .await;

        let mut config = Config::default();
        config.panelapp.base_url = server.url();
        config.panelapp.max_calls = 1;
        config.panelapp.window_seconds = 60;
        config.ensembl.url_template = format!("{}/e{{release}}", server.url());
        config.ensembl.max_calls = 2;
        config.ensembl.window_seconds = 1;
        let pipeline = Pipeline::from_config(&config).unwrap();

        let started = Instant::now();
        let mut request = AnalysisRequest::new("245", Snapshot(111));
        request.current_snapshot = Some(Snapshot(109));
        let report = pipeline.run_analysis(&request).await.unwrap();
        assert_eq!(report.genes[0].status(), DiffStatus::Retained);

        // PanelApp's single call is spent for a minute; Ensembl's two calls
        // fill its one-second window, so a third lookup waits for that window.
        let annotation = pipeline
            .lookup(&GeneQuery::Symbol("GENEA".to_string()), Snapshot(111))
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert!(annotation.is_some());
        assert!(elapsed >= Duration::from_millis(900), "not throttled: {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(10), "held by PanelApp: {:?}", elapsed);
        panel.assert_async().await;
        current.assert_async().await;
        target.assert_async().await;
    }
}
