//! Detection of the Ensembl release a panel currently corresponds to.
//!
//! Detection uses the panel's first gene, looked up by symbol in each
//! candidate release from newest to oldest. This is a heuristic: a gene
//! whose symbol is stable across many releases matches the newest one.

use super::fetcher::AnnotationFetcher;
use crate::clients::GeneQuery;
use crate::models::{DetectionMethod, GeneReference, Snapshot, SnapshotDetection};
use tracing::{debug, info};

pub struct VersionResolver<'a> {
    fetcher: &'a AnnotationFetcher,
}

impl<'a> VersionResolver<'a> {
    pub fn new(fetcher: &'a AnnotationFetcher) -> Self {
        Self { fetcher }
    }

    /// Detect the current snapshot; falls back to `default` rather than failing.
    pub async fn detect(
        &self,
        genes: &[GeneReference],
        candidates_newest_first: &[Snapshot],
        default: Snapshot,
    ) -> SnapshotDetection {
        let Some(first) = genes.first() else {
            info!("Panel has no genes, assuming release {}", default);
            return SnapshotDetection {
                snapshot: default,
                method: DetectionMethod::Default,
                gene: None,
            };
        };

        let query = GeneQuery::Symbol(first.symbol.clone());
        for &snapshot in candidates_newest_first {
            debug!("Trying release {} with {}", snapshot, first.symbol);
            if self.fetcher.fetch_or_absent(&query, snapshot).await.is_some() {
                info!("Detected release {} via {}", snapshot, first.symbol);
                return SnapshotDetection {
                    snapshot,
                    method: DetectionMethod::Symbol,
                    gene: Some(first.symbol.clone()),
                };
            }
        }

        info!(
            "{} not found in any candidate release, assuming {}",
            first.symbol, default
        );
        SnapshotDetection {
            snapshot: default,
            method: DetectionMethod::Default,
            gene: Some(first.symbol.clone()),
        }
    }
}
