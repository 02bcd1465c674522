//! panelchecker - gene panel comparison across Ensembl releases
//!
//! Fetches a curated panel from PanelApp, looks up every gene in the
//! current and a target Ensembl release, and reports which genes keep
//! their symbol, stable id and coordinates.
//!
//! The [`analysis::Pipeline`] is the entry point for collaborators; the
//! binary in `main.rs` is a thin CLI over it.

pub mod analysis;
pub mod cli;
pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod report;

pub use analysis::{AnalysisRequest, Pipeline, PipelineSettings};
pub use error::{PanelCheckError, Result};
