//! Markdown and JSON report generation.
//!
//! Renders a [`PanelReport`] for humans (Markdown) or other tools (JSON).

use crate::analysis::aggregator::{count_by_status, group_by_confidence, largest_size_changes};
use crate::analysis::{DiffStatus, GeneDiff};
use crate::models::{AnalysisSummary, Annotation, Confidence, PanelReport};
use anyhow::{Context, Result};
use std::path::Path;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &PanelReport) -> String {
    let mut output = String::new();

    output.push_str(&format!("# Panel Check: {}\n\n", report.panel_name));

    output.push_str(&generate_metadata_section(report));
    output.push_str(&generate_summary_section(&report.summary, report.total_genes));
    output.push_str(&generate_breakdown_section(&report.genes));
    output.push_str(&generate_genes_section(&report.genes));
    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(report: &PanelReport) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Panel:** {} (id {})\n",
        report.panel_name, report.panel_id
    ));
    section.push_str(&format!("- **Panel Version:** {}\n", report.panel_version));
    section.push_str(&format!(
        "- **Current Release:** Ensembl {}\n",
        report.current_snapshot
    ));
    section.push_str(&format!(
        "- **Target Release:** Ensembl {}\n",
        report.target_snapshot
    ));

    match &report.detection {
        Some(detection) => {
            let via = detection
                .gene
                .as_deref()
                .map(|g| format!(" via `{}`", g))
                .unwrap_or_default();
            section.push_str(&format!(
                "- **Release Detection:** {}{}\n",
                detection.method, via
            ));
        }
        None => section.push_str("- **Release Detection:** given explicitly\n"),
    }

    section.push_str(&format!(
        "- **Generated:** {}\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n\n",
        report.duration_seconds
    ));

    section
}

fn generate_summary_section(summary: &AnalysisSummary, total_genes: usize) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str(
        "| Genes | Symbols Retained | Symbols Changed | Locations Changed | Missing |\n",
    );
    section.push_str("|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| **{}** | {} | {} | {} | {} |\n\n",
        total_genes,
        summary.symbols_retained,
        summary.symbols_changed,
        summary.locations_changed,
        summary.genes_missing
    ));

    section
}

/// Per-tier status counts and the largest size changes.
fn generate_breakdown_section(genes: &[GeneDiff]) -> String {
    if genes.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Confidence Breakdown\n\n");
    section.push_str("| Tier | Genes | Retained | Changed | Missing |\n");
    section.push_str("|:---|:---:|:---:|:---:|:---:|\n");

    for (tier, diffs) in group_by_confidence(genes) {
        let counts = count_by_status(diffs.iter().copied());
        let count = |status: DiffStatus| counts.get(&status).copied().unwrap_or(0);
        section.push_str(&format!(
            "| {} {} | {} | {} | {} | {} |\n",
            tier.emoji(),
            tier,
            diffs.len(),
            count(DiffStatus::Retained),
            count(DiffStatus::Changed),
            count(DiffStatus::Missing)
        ));
    }
    section.push('\n');

    let resized = largest_size_changes(genes, 5);
    if !resized.is_empty() {
        section.push_str("### Largest Size Changes\n\n");
        section.push_str("| Gene | Change |\n");
        section.push_str("|:---|---:|\n");
        for (diff, pct) in resized {
            section.push_str(&format!("| `{}` | {:+.2}% |\n", diff.gene().symbol, pct));
        }
        section.push('\n');
    }

    section
}

fn generate_genes_section(genes: &[GeneDiff]) -> String {
    let mut section = String::new();

    section.push_str("## Genes\n\n");

    if genes.is_empty() {
        section.push_str("The panel lists no genes.\n\n");
        return section;
    }

    section.push_str(
        "| Gene | Tier | Status | Current | Target | Size Change | Notes |\n",
    );
    section.push_str("|:---|:---:|:---:|:---|:---|---:|:---|\n");

    for diff in genes {
        section.push_str(&generate_gene_row(diff));
    }
    section.push('\n');

    section
}

fn generate_gene_row(diff: &GeneDiff) -> String {
    let size = diff
        .size_change_percent()
        .map(|pct| format!("{:+.2}%", pct))
        .unwrap_or_else(|| "-".to_string());

    format!(
        "| `{}` | {} | {} | {} | {} | {} | {} |\n",
        diff.gene().symbol,
        tier_badge(diff.gene().confidence),
        status_badge(diff.status()),
        describe(diff.current()),
        describe(diff.target()),
        size,
        diff.callouts().labels().join(", ")
    )
}

fn describe(annotation: Option<&Annotation>) -> String {
    match annotation {
        Some(a) if a.symbol.is_empty() => format!("{} {}", a.external_id, a.location()),
        Some(a) => format!("{} ({}) {}", a.external_id, a.symbol, a.location()),
        None => "-".to_string(),
    }
}

fn tier_badge(confidence: Confidence) -> String {
    format!("{} {}", confidence.emoji(), confidence)
}

fn status_badge(status: DiffStatus) -> &'static str {
    match status {
        DiffStatus::Retained => "✅ retained",
        DiffStatus::Changed => "⚠️ changed",
        DiffStatus::Missing => "❌ missing",
    }
}

fn generate_footer() -> String {
    "---\n\n*Report generated by panelchecker*\n".to_string()
}

/// Generate a JSON report.
pub fn generate_json_report(report: &PanelReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("Failed to serialize report")
}

/// Write rendered report content to a file.
pub fn save_report(content: &str, path: &Path) -> Result<()> {
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}
