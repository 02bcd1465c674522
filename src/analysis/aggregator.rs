//! Ordering and statistics over per-gene diffs.
//!
//! This module turns the unordered output of the concurrent fetch stage
//! into the canonical report order and computes summary figures.

use super::comparator::{DiffStatus, GeneDiff};
use crate::models::{AnalysisSummary, Confidence};
use std::collections::BTreeMap;

/// Restore canonical order: confidence tier, then original panel position.
pub fn order_by_confidence(mut indexed: Vec<(usize, GeneDiff)>) -> Vec<GeneDiff> {
    indexed.sort_by_key(|(index, diff)| (diff.gene().confidence, *index));
    indexed.into_iter().map(|(_, diff)| diff).collect()
}

/// Order diffs and compute their summary in one pass over the result.
pub fn aggregate(indexed: Vec<(usize, GeneDiff)>) -> (Vec<GeneDiff>, AnalysisSummary) {
    let genes = order_by_confidence(indexed);
    let summary = AnalysisSummary::from_diffs(&genes);
    (genes, summary)
}

/// Group diffs by confidence tier, keeping their order within a tier.
pub fn group_by_confidence(diffs: &[GeneDiff]) -> BTreeMap<Confidence, Vec<&GeneDiff>> {
    let mut grouped: BTreeMap<Confidence, Vec<&GeneDiff>> = BTreeMap::new();

    for diff in diffs {
        grouped.entry(diff.gene().confidence).or_default().push(diff);
    }

    grouped
}

/// Count diffs per status.
pub fn count_by_status<'a>(
    diffs: impl IntoIterator<Item = &'a GeneDiff>,
) -> BTreeMap<DiffStatus, usize> {
    let mut counts: BTreeMap<DiffStatus, usize> = BTreeMap::new();

    for diff in diffs {
        *counts.entry(diff.status()).or_default() += 1;
    }

    counts
}

/// The `n` genes whose size changed the most, in either direction.
pub fn largest_size_changes(diffs: &[GeneDiff], n: usize) -> Vec<(&GeneDiff, f64)> {
    let mut changes: Vec<_> = diffs
        .iter()
        .filter_map(|d| d.size_change_percent().map(|pct| (d, pct)))
        .filter(|(_, pct)| *pct != 0.0)
        .collect();

    changes.sort_by(|a, b| {
        b.1.abs()
            .partial_cmp(&a.1.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    changes.truncate(n);

    changes
}

/// Generate a text summary of the counters.
pub fn generate_summary_text(summary: &AnalysisSummary, total_genes: usize) -> String {
    let lines = [
        format!("Total Genes: {}", total_genes),
        format!("- Symbols retained: {}", summary.symbols_retained),
        format!("- Symbols changed: {}", summary.symbols_changed),
        format!("- Locations changed: {}", summary.locations_changed),
        format!("- Genes missing: {}", summary.genes_missing),
    ];

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::comparator::diff;
    use crate::models::{Annotation, GeneReference, Strand};

    fn annotation(symbol: &str, end: u64) -> Annotation {
        Annotation {
            external_id: format!("ENSG_{}", symbol),
            symbol: symbol.to_string(),
            chromosome: "1".to_string(),
            start: 1,
            end,
            strand: Strand::Forward,
            assembly: "GRCh38".to_string(),
        }
    }

    fn retained(symbol: &str, confidence: Confidence) -> GeneDiff {
        let a = annotation(symbol, 1000);
        diff(GeneReference::new(symbol, confidence), Some(a.clone()), Some(a))
    }

    fn missing(symbol: &str, confidence: Confidence) -> GeneDiff {
        diff(
            GeneReference::new(symbol, confidence),
            Some(annotation(symbol, 1000)),
            None,
        )
    }

    fn resized(symbol: &str, confidence: Confidence, end: u64) -> GeneDiff {
        diff(
            GeneReference::new(symbol, confidence),
            Some(annotation(symbol, 1000)),
            Some(annotation(symbol, end)),
        )
    }

    fn symbols(diffs: &[GeneDiff]) -> Vec<&str> {
        diffs.iter().map(|d| d.gene().symbol.as_str()).collect()
    }

    #[test]
    fn test_order_by_confidence_is_stable() {
        // Completion order scrambled relative to panel order.
        let indexed = vec![
            (3, retained("D", Confidence::Green)),
            (0, retained("A", Confidence::Red)),
            (4, retained("E", Confidence::Amber)),
            (1, retained("B", Confidence::Green)),
            (2, retained("C", Confidence::Red)),
        ];

        let ordered = order_by_confidence(indexed);
        assert_eq!(symbols(&ordered), vec!["B", "D", "E", "A", "C"]);
    }

    #[test]
    fn test_aggregate_summary_invariants() {
        let indexed = vec![
            (0, retained("A", Confidence::Green)),
            (1, resized("B", Confidence::Amber, 1500)),
            (2, missing("C", Confidence::Red)),
        ];

        let (genes, summary) = aggregate(indexed);
        assert_eq!(genes.len(), 3);
        assert_eq!(summary.symbols_retained, 2);
        assert_eq!(summary.symbols_changed, 0);
        assert_eq!(summary.locations_changed, 1);
        assert_eq!(summary.genes_missing, 1);
        assert_eq!(
            summary.symbols_retained + summary.symbols_changed,
            genes.len() - summary.genes_missing
        );
    }

    #[test]
    fn test_group_by_confidence() {
        let diffs = vec![
            retained("A", Confidence::Green),
            retained("B", Confidence::Red),
            retained("C", Confidence::Green),
        ];

        let grouped = group_by_confidence(&diffs);
        assert_eq!(grouped.get(&Confidence::Green).map(|v| v.len()), Some(2));
        assert_eq!(grouped.get(&Confidence::Red).map(|v| v.len()), Some(1));
        assert!(grouped.get(&Confidence::Amber).is_none());
    }

    #[test]
    fn test_count_by_status() {
        let diffs = vec![
            retained("A", Confidence::Green),
            missing("B", Confidence::Green),
            missing("C", Confidence::Amber),
            resized("D", Confidence::Red, 900),
        ];

        let counts = count_by_status(&diffs);
        assert_eq!(counts.get(&DiffStatus::Retained), Some(&1));
        assert_eq!(counts.get(&DiffStatus::Changed), Some(&1));
        assert_eq!(counts.get(&DiffStatus::Missing), Some(&2));
    }

    #[test]
    fn test_largest_size_changes() {
        let diffs = vec![
            retained("A", Confidence::Green),
            resized("B", Confidence::Green, 1100),
            resized("C", Confidence::Green, 500),
            missing("D", Confidence::Green),
        ];

        let top = largest_size_changes(&diffs, 5);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].0.gene().symbol, "C");
        assert!((top[0].1 + 50.0).abs() < 1e-9);
        assert_eq!(top[1].0.gene().symbol, "B");
    }

    #[test]
    fn test_generate_summary_text() {
        let summary = AnalysisSummary {
            symbols_retained: 2,
            symbols_changed: 1,
            locations_changed: 1,
            genes_missing: 0,
        };
        let text = generate_summary_text(&summary, 3);
        assert!(text.contains("Total Genes: 3"));
        assert!(text.contains("Symbols changed: 1"));
    }
}
