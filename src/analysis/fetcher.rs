//! Single-gene annotation retrieval with the assembly integrity gate.

use crate::clients::{AnnotationSource, EnsemblGene, GeneQuery};
use crate::error::{PanelCheckError, Result};
use crate::models::{Annotation, Snapshot, Strand};
use std::sync::Arc;
use tracing::{debug, warn};

/// Fetches one gene from one snapshot.
pub struct AnnotationFetcher {
    source: Arc<dyn AnnotationSource>,
    assembly: String,
}

impl AnnotationFetcher {
    pub fn new(source: Arc<dyn AnnotationSource>, assembly: impl Into<String>) -> Self {
        Self {
            source,
            assembly: assembly.into(),
        }
    }

    /// The only assembly accepted from the service.
    pub fn assembly(&self) -> &str {
        &self.assembly
    }

    /// Look up `query` in `snapshot`.
    ///
    /// Returns `Ok(None)` when the gene is unknown to the snapshot or the
    /// record fails the integrity gate; transport failures are errors.
    pub async fn fetch(&self, query: &GeneQuery, snapshot: Snapshot) -> Result<Option<Annotation>> {
        if !snapshot.is_supported() {
            return Err(PanelCheckError::InvalidRequest(format!(
                "Ensembl release {} outside supported range {}-{}",
                snapshot,
                Snapshot::OLDEST_SUPPORTED,
                Snapshot::NEWEST_SUPPORTED
            )));
        }

        let gene = self.source.lookup(query, snapshot).await?;
        Ok(gene.and_then(|g| self.accept(g, query, snapshot)))
    }

    /// Like [`fetch`](Self::fetch), but any failure degrades to absent.
    pub async fn fetch_or_absent(&self, query: &GeneQuery, snapshot: Snapshot) -> Option<Annotation> {
        match self.fetch(query, snapshot).await {
            Ok(annotation) => annotation,
            Err(e) => {
                warn!("Lookup of {} in release {} failed: {}", query, snapshot, e);
                None
            }
        }
    }

    /// Convert a raw record, rejecting anything that is not clean data.
    fn accept(&self, gene: EnsemblGene, query: &GeneQuery, snapshot: Snapshot) -> Option<Annotation> {
        let assembly = gene.assembly_name.unwrap_or_default();
        if assembly != self.assembly {
            debug!(
                "Discarding {} in release {}: assembly {:?}, expected {}",
                query, snapshot, assembly, self.assembly
            );
            return None;
        }

        let strand = match i8::try_from(gene.strand).ok().map(Strand::try_from) {
            Some(Ok(strand)) => strand,
            _ => {
                debug!("Discarding {} in release {}: strand {}", query, snapshot, gene.strand);
                return None;
            }
        };

        if gene.end < gene.start {
            debug!(
                "Discarding {} in release {}: end {} before start {}",
                query, snapshot, gene.end, gene.start
            );
            return None;
        }

        let symbol = match (gene.display_name, query) {
            (Some(name), _) if !name.is_empty() => name,
            (_, GeneQuery::Symbol(symbol)) => symbol.clone(),
            (_, GeneQuery::Id(_)) => String::new(),
        };

        Some(Annotation {
            external_id: gene.id,
            symbol,
            chromosome: gene.seq_region_name,
            start: gene.start,
            end: gene.end,
            strand,
            assembly,
        })
    }
}
