//! Field-level comparison of one gene across two snapshots.

use crate::models::{Annotation, GeneReference};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Overall outcome for one gene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffStatus {
    /// Symbol, id and location are identical.
    Retained,
    /// Present in both snapshots with at least one difference.
    Changed,
    /// Not resolvable in the target (or current) snapshot.
    Missing,
}

impl fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffStatus::Retained => write!(f, "retained"),
            DiffStatus::Changed => write!(f, "changed"),
            DiffStatus::Missing => write!(f, "missing"),
        }
    }
}

/// Independent observations about a diff. Several may hold at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Callouts {
    pub not_found: bool,
    pub symbol_changed: bool,
    pub id_changed: bool,
    pub location_changed: bool,
    pub all_retained: bool,
}

impl Callouts {
    /// Short labels of every callout that holds, in a fixed order.
    pub fn labels(&self) -> Vec<&'static str> {
        [
            (self.not_found, "not found"),
            (self.symbol_changed, "symbol changed"),
            (self.id_changed, "id changed"),
            (self.location_changed, "location changed"),
            (self.all_retained, "all retained"),
        ]
        .into_iter()
        .filter_map(|(set, label)| set.then_some(label))
        .collect()
    }
}

/// Comparison of one panel gene between the current and target snapshot.
///
/// Only [`diff`] builds this type, so the derived fields always agree
/// with the two annotations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneDiff {
    gene: GeneReference,
    current: Option<Annotation>,
    target: Option<Annotation>,
    symbol_retained: bool,
    id_retained: bool,
    location_changed: bool,
    status: DiffStatus,
    size_change_percent: Option<f64>,
    callouts: Callouts,
}

impl GeneDiff {
    pub fn gene(&self) -> &GeneReference {
        &self.gene
    }

    pub fn current(&self) -> Option<&Annotation> {
        self.current.as_ref()
    }

    pub fn target(&self) -> Option<&Annotation> {
        self.target.as_ref()
    }

    pub fn symbol_retained(&self) -> bool {
        self.symbol_retained
    }

    pub fn id_retained(&self) -> bool {
        self.id_retained
    }

    pub fn location_changed(&self) -> bool {
        self.location_changed
    }

    pub fn status(&self) -> DiffStatus {
        self.status
    }

    pub fn is_missing(&self) -> bool {
        self.status == DiffStatus::Missing
    }

    /// Relative size change in percent, when both sides are present.
    pub fn size_change_percent(&self) -> Option<f64> {
        self.size_change_percent
    }

    pub fn callouts(&self) -> Callouts {
        self.callouts
    }
}

/// Compare `gene` between its `current` and `target` annotations.
///
/// An absent `current` only happens when the current-snapshot fetch
/// degraded; such a gene is reported as missing.
pub fn diff(
    gene: GeneReference,
    current: Option<Annotation>,
    target: Option<Annotation>,
) -> GeneDiff {
    let (symbol_retained, id_retained, location_changed, size_change_percent) =
        match (&current, &target) {
            (Some(cur), Some(tgt)) => (
                cur.symbol == tgt.symbol,
                cur.external_id == tgt.external_id,
                !cur.same_location(tgt),
                size_change_percent(cur, tgt),
            ),
            _ => (false, false, false, None),
        };

    let status = match (&current, &target) {
        (Some(_), Some(_)) if symbol_retained && id_retained && !location_changed => {
            DiffStatus::Retained
        }
        (Some(_), Some(_)) => DiffStatus::Changed,
        _ => DiffStatus::Missing,
    };

    let both_present = status != DiffStatus::Missing;
    let callouts = Callouts {
        not_found: !both_present,
        symbol_changed: both_present && !symbol_retained,
        id_changed: both_present && !id_retained,
        location_changed,
        all_retained: status == DiffStatus::Retained,
    };

    GeneDiff {
        gene,
        current,
        target,
        symbol_retained,
        id_retained,
        location_changed,
        status,
        size_change_percent,
        callouts,
    }
}

fn size_change_percent(current: &Annotation, target: &Annotation) -> Option<f64> {
    let current_size = current.size() as f64;
    if current_size <= 0.0 {
        return None;
    }
    let target_size = target.size() as f64;
    Some((target_size - current_size) / current_size * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, Strand};

    fn annotation(id: &str, symbol: &str, start: u64, end: u64) -> Annotation {
        Annotation {
            external_id: id.to_string(),
            symbol: symbol.to_string(),
            chromosome: "17".to_string(),
            start,
            end,
            strand: Strand::Reverse,
            assembly: "GRCh38".to_string(),
        }
    }

    fn gene(symbol: &str) -> GeneReference {
        GeneReference::new(symbol, Confidence::Green)
    }

    #[test]
    fn test_identical_annotations_are_retained() {
        let current = annotation("ENSG00000012048", "BRCA1", 43044295, 43125483);
        let result = diff(gene("BRCA1"), Some(current.clone()), Some(current));

        assert_eq!(result.status(), DiffStatus::Retained);
        assert!(result.symbol_retained());
        assert!(result.id_retained());
        assert!(!result.location_changed());
        assert_eq!(result.size_change_percent(), Some(0.0));
        assert_eq!(result.callouts().labels(), vec!["all retained"]);
    }

    #[test]
    fn test_shifted_end_changes_location_and_size() {
        let current = annotation("ENSG00000141510", "TP53", 1, 36471);
        let target = annotation("ENSG00000141510", "TP53", 1, 44471);
        let result = diff(gene("TP53"), Some(current), Some(target));

        assert_eq!(result.status(), DiffStatus::Changed);
        assert!(result.symbol_retained());
        assert!(result.location_changed());
        let pct = result.size_change_percent().unwrap();
        assert!((pct - 21.935).abs() < 0.01, "got {}", pct);
        assert_eq!(result.callouts().labels(), vec!["location changed"]);
    }

    #[test]
    fn test_missing_target_is_missing_regardless_of_current() {
        let current = annotation("ENSG00000139618", "BRCA2", 100, 200);
        let result = diff(gene("BRCA2"), Some(current), None);

        assert_eq!(result.status(), DiffStatus::Missing);
        assert!(!result.symbol_retained());
        assert!(!result.id_retained());
        assert!(!result.location_changed());
        assert_eq!(result.size_change_percent(), None);
        assert_eq!(result.callouts().labels(), vec!["not found"]);
    }

    #[test]
    fn test_degraded_current_is_missing() {
        let target = annotation("ENSG00000139618", "BRCA2", 100, 200);
        let result = diff(gene("BRCA2"), None, Some(target));

        assert!(result.is_missing());
        assert_eq!(result.size_change_percent(), None);
        assert!(result.callouts().not_found);
    }

    #[test]
    fn test_renamed_gene_with_new_id() {
        let current = annotation("ENSG00000000001", "OLDNAME", 100, 200);
        let target = annotation("ENSG00000000002", "NEWNAME", 100, 200);
        let result = diff(gene("OLDNAME"), Some(current), Some(target));

        assert_eq!(result.status(), DiffStatus::Changed);
        assert!(!result.symbol_retained());
        assert!(!result.id_retained());
        assert!(!result.location_changed());
        assert_eq!(
            result.callouts().labels(),
            vec!["symbol changed", "id changed"]
        );
    }

    #[test]
    fn test_id_change_alone_is_changed() {
        let current = annotation("ENSG00000000001", "ABC1", 100, 200);
        let target = annotation("ENSG00000000009", "ABC1", 100, 200);
        let result = diff(gene("ABC1"), Some(current), Some(target));

        assert_eq!(result.status(), DiffStatus::Changed);
        assert!(result.symbol_retained());
        assert!(!result.id_retained());
    }

    #[test]
    fn test_strand_flip_is_location_change() {
        let current = annotation("ENSG00000000001", "ABC1", 100, 200);
        let mut target = current.clone();
        target.strand = Strand::Forward;
        let result = diff(gene("ABC1"), Some(current), Some(target));

        assert!(result.location_changed());
        assert_eq!(result.size_change_percent(), Some(0.0));
    }

    #[test]
    fn test_diff_is_deterministic() {
        let current = annotation("ENSG00000000001", "ABC1", 100, 200);
        let target = annotation("ENSG00000000001", "ABC1", 150, 260);

        let first = diff(gene("ABC1"), Some(current.clone()), Some(target.clone()));
        let second = diff(gene("ABC1"), Some(current), Some(target));
        assert_eq!(first, second);
    }
}
