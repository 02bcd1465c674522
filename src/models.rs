//! Data models for the panel checker.
//!
//! This module contains the core data structures shared by the clients,
//! the comparison pipeline and the report generators.

use crate::analysis::GeneDiff;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Diagnostic-grade confidence of a gene within a panel.
///
/// The declaration order is the canonical report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Green - diagnostic-grade evidence
    Green,
    /// Amber - moderate evidence
    Amber,
    /// Red - low evidence
    Red,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Green => write!(f, "Green"),
            Confidence::Amber => write!(f, "Amber"),
            Confidence::Red => write!(f, "Red"),
        }
    }
}

impl Confidence {
    /// Map a PanelApp `confidence_level` onto the three tiers.
    pub fn from_level(level: &str) -> Self {
        match level.trim() {
            "3" | "4" => Confidence::Green,
            "2" => Confidence::Amber,
            _ => Confidence::Red,
        }
    }

    /// Returns an emoji representation of the tier.
    pub fn emoji(&self) -> &'static str {
        match self {
            Confidence::Green => "🟢",
            Confidence::Amber => "🟡",
            Confidence::Red => "🔴",
        }
    }
}

/// A gene as listed in a panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneReference {
    /// HGNC symbol as recorded by the panel.
    pub symbol: String,
    /// Confidence tier assigned by the panel.
    pub confidence: Confidence,
}

impl GeneReference {
    pub fn new(symbol: impl Into<String>, confidence: Confidence) -> Self {
        Self {
            symbol: symbol.into(),
            confidence,
        }
    }
}

/// One Ensembl release ("snapshot") of the annotation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(pub u32);

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Snapshot {
    /// Oldest release with a GRCh38 REST archive we accept.
    pub const OLDEST_SUPPORTED: u32 = 100;
    pub const NEWEST_SUPPORTED: u32 = 120;

    pub fn is_supported(&self) -> bool {
        (Self::OLDEST_SUPPORTED..=Self::NEWEST_SUPPORTED).contains(&self.0)
    }
}

/// Strand of a gene on its chromosome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum Strand {
    Forward,
    Reverse,
}

impl TryFrom<i8> for Strand {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Strand::Forward),
            -1 => Ok(Strand::Reverse),
            other => Err(format!("invalid strand: {}", other)),
        }
    }
}

impl From<Strand> for i8 {
    fn from(strand: Strand) -> Self {
        match strand {
            Strand::Forward => 1,
            Strand::Reverse => -1,
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strand::Forward => write!(f, "+"),
            Strand::Reverse => write!(f, "-"),
        }
    }
}

/// Coordinates of one gene in one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    /// Ensembl stable gene id (e.g. ENSG00000139618).
    pub external_id: String,
    /// Display symbol in this snapshot.
    pub symbol: String,
    pub chromosome: String,
    /// 1-based inclusive start.
    pub start: u64,
    /// 1-based inclusive end, never below `start`.
    pub end: u64,
    pub strand: Strand,
    pub assembly: String,
}

impl Annotation {
    /// Length in base pairs (inclusive coordinates).
    pub fn size(&self) -> u64 {
        self.end.saturating_sub(self.start) + 1
    }

    /// Location formatted as `chr:start-end(strand)`.
    pub fn location(&self) -> String {
        format!(
            "{}:{}-{}({})",
            self.chromosome, self.start, self.end, self.strand
        )
    }

    /// Whether chromosome, start, end and strand all match.
    pub fn same_location(&self, other: &Annotation) -> bool {
        self.chromosome == other.chromosome
            && self.start == other.start
            && self.end == other.end
            && self.strand == other.strand
    }
}

/// A panel as listed by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub gene_count: usize,
    pub signed_off: bool,
}

/// Metadata of a single panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelMetadata {
    pub id: String,
    pub name: String,
    pub version: String,
    pub gene_count: usize,
}

/// How the current snapshot of a panel was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    /// The detection gene was found by symbol in this snapshot.
    Symbol,
    /// No candidate matched; the configured fallback was used.
    Default,
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionMethod::Symbol => write!(f, "symbol"),
            DetectionMethod::Default => write!(f, "default"),
        }
    }
}

/// Result of current-snapshot detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDetection {
    pub snapshot: Snapshot,
    pub method: DetectionMethod,
    /// Symbol of the gene used for detection, absent only when the panel has no genes.
    pub gene: Option<String>,
}

/// Summary counters of a panel comparison.
///
/// These are counts, not categories: a gene with a retained symbol and a
/// moved location contributes to two counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub symbols_retained: usize,
    /// Present in both snapshots under a different symbol.
    pub symbols_changed: usize,
    pub locations_changed: usize,
    pub genes_missing: usize,
}

impl AnalysisSummary {
    /// Creates a summary by scanning all diffs once.
    pub fn from_diffs(diffs: &[GeneDiff]) -> Self {
        let mut summary = Self::default();

        for diff in diffs {
            if diff.symbol_retained() {
                summary.symbols_retained += 1;
            } else if !diff.is_missing() {
                summary.symbols_changed += 1;
            }
            if diff.location_changed() {
                summary.locations_changed += 1;
            }
            if diff.is_missing() {
                summary.genes_missing += 1;
            }
        }

        summary
    }
}

/// The complete comparison of one panel between two snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct PanelReport {
    pub panel_id: String,
    pub panel_name: String,
    pub panel_version: String,
    pub current_snapshot: Snapshot,
    pub target_snapshot: Snapshot,
    /// How `current_snapshot` was chosen; absent when given explicitly.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection: Option<SnapshotDetection>,
    pub total_genes: usize,
    pub summary: AnalysisSummary,
    /// Ordered by confidence tier, then panel order.
    pub genes: Vec<GeneDiff>,
    pub generated_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_ordering() {
        assert!(Confidence::Green < Confidence::Amber);
        assert!(Confidence::Amber < Confidence::Red);
    }

    #[test]
    fn test_confidence_from_level() {
        assert_eq!(Confidence::from_level("3"), Confidence::Green);
        assert_eq!(Confidence::from_level("4"), Confidence::Green);
        assert_eq!(Confidence::from_level("2"), Confidence::Amber);
        assert_eq!(Confidence::from_level("1"), Confidence::Red);
        assert_eq!(Confidence::from_level("0"), Confidence::Red);
        assert_eq!(Confidence::from_level(""), Confidence::Red);
    }

    #[test]
    fn test_confidence_emoji() {
        assert_eq!(Confidence::Green.emoji(), "🟢");
        assert_eq!(Confidence::Amber.emoji(), "🟡");
        assert_eq!(Confidence::Red.emoji(), "🔴");
    }

    #[test]
    fn test_snapshot_supported_range() {
        assert!(Snapshot(100).is_supported());
        assert!(Snapshot(120).is_supported());
        assert!(!Snapshot(99).is_supported());
        assert!(!Snapshot(121).is_supported());
    }

    #[test]
    fn test_strand_serde() {
        assert_eq!(serde_json::to_string(&Strand::Reverse).unwrap(), "-1");
        let strand: Strand = serde_json::from_str("1").unwrap();
        assert_eq!(strand, Strand::Forward);
        assert!(serde_json::from_str::<Strand>("0").is_err());
    }

    #[test]
    fn test_annotation_size_and_location() {
        let annotation = Annotation {
            external_id: "ENSG00000139618".to_string(),
            symbol: "BRCA2".to_string(),
            chromosome: "13".to_string(),
            start: 100,
            end: 199,
            strand: Strand::Forward,
            assembly: "GRCh38".to_string(),
        };
        assert_eq!(annotation.size(), 100);
        assert_eq!(annotation.location(), "13:100-199(+)");
    }
}
