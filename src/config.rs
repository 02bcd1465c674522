//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.panelchecker.toml` files.

use crate::models::Snapshot;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = ".panelchecker.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Panel registry settings.
    #[serde(default)]
    pub panelapp: PanelAppConfig,

    /// Annotation service settings.
    #[serde(default)]
    pub ensembl: EnsemblConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Maximum number of genes fetched concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Deadline for one complete analysis run.
    #[serde(default = "default_run_timeout")]
    pub run_timeout_seconds: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
            concurrency: default_concurrency(),
            run_timeout_seconds: default_run_timeout(),
        }
    }
}

fn default_output() -> String {
    "panelcheck_report.md".to_string()
}

fn default_concurrency() -> usize {
    8
}

fn default_run_timeout() -> u64 {
    900 // large panels at 15 req/s need several minutes
}

/// PanelApp registry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelAppConfig {
    /// API base URL.
    #[serde(default = "default_panelapp_url")]
    pub base_url: String,

    /// Client identifier sent as the User-Agent header.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Calls allowed per window.
    #[serde(default = "default_panelapp_max_calls")]
    pub max_calls: usize,

    /// Window length in seconds.
    #[serde(default = "default_panelapp_window")]
    pub window_seconds: u64,

    /// Request timeout in seconds.
    #[serde(default = "default_panelapp_timeout")]
    pub timeout_seconds: u64,

    /// Number of retries on transient failure.
    #[serde(default = "default_retries")]
    pub retries: usize,

    /// Initial retry backoff in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Only list panels with a signed-off version.
    #[serde(default = "default_true")]
    pub signed_off_only: bool,
}

impl Default for PanelAppConfig {
    fn default() -> Self {
        Self {
            base_url: default_panelapp_url(),
            user_agent: default_user_agent(),
            max_calls: default_panelapp_max_calls(),
            window_seconds: default_panelapp_window(),
            timeout_seconds: default_panelapp_timeout(),
            retries: default_retries(),
            backoff_ms: default_backoff_ms(),
            signed_off_only: true,
        }
    }
}

fn default_panelapp_url() -> String {
    "https://panelapp.genomicsengland.co.uk/api/v1".to_string()
}

fn default_user_agent() -> String {
    "KMDS-PdM".to_string()
}

fn default_panelapp_max_calls() -> usize {
    60
}

fn default_panelapp_window() -> u64 {
    60
}

fn default_panelapp_timeout() -> u64 {
    30
}

fn default_retries() -> usize {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

/// Ensembl REST settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsemblConfig {
    /// Per-release base URL; `{release}` is replaced by the release number.
    #[serde(default = "default_url_template")]
    pub url_template: String,

    /// Species used for symbol lookups.
    #[serde(default = "default_species")]
    pub species: String,

    /// The only assembly accepted in lookup results.
    #[serde(default = "default_assembly")]
    pub assembly: String,

    /// Calls allowed per window.
    #[serde(default = "default_ensembl_max_calls")]
    pub max_calls: usize,

    /// Window length in seconds.
    #[serde(default = "default_ensembl_window")]
    pub window_seconds: u64,

    /// Request timeout in seconds.
    #[serde(default = "default_ensembl_timeout")]
    pub timeout_seconds: u64,

    /// Number of retries on transient failure.
    #[serde(default = "default_retries")]
    pub retries: usize,

    /// Initial retry backoff in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Releases tried by current-snapshot detection, newest first.
    #[serde(default = "default_candidates")]
    pub candidate_snapshots: Vec<Snapshot>,

    /// Fallback when detection finds nothing; defaults to the oldest candidate.
    #[serde(default)]
    pub default_snapshot: Option<Snapshot>,
}

impl Default for EnsemblConfig {
    fn default() -> Self {
        Self {
            url_template: default_url_template(),
            species: default_species(),
            assembly: default_assembly(),
            max_calls: default_ensembl_max_calls(),
            window_seconds: default_ensembl_window(),
            timeout_seconds: default_ensembl_timeout(),
            retries: default_retries(),
            backoff_ms: default_backoff_ms(),
            candidate_snapshots: default_candidates(),
            default_snapshot: None,
        }
    }
}

fn default_url_template() -> String {
    "https://e{release}.rest.ensembl.org".to_string()
}

fn default_species() -> String {
    "homo_sapiens".to_string()
}

fn default_assembly() -> String {
    "GRCh38".to_string()
}

fn default_ensembl_max_calls() -> usize {
    15
}

fn default_ensembl_window() -> u64 {
    1
}

fn default_ensembl_timeout() -> u64 {
    10
}

fn default_candidates() -> Vec<Snapshot> {
    (Snapshot::OLDEST_SUPPORTED..=115).rev().map(Snapshot).collect()
}

impl EnsemblConfig {
    /// The snapshot assumed when detection fails.
    pub fn fallback_snapshot(&self) -> Snapshot {
        self.default_snapshot
            .or_else(|| self.candidate_snapshots.iter().min().copied())
            .unwrap_or(Snapshot(Snapshot::OLDEST_SUPPORTED))
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when explicitly provided.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref url) = args.panelapp_url {
            self.panelapp.base_url = url.clone();
        }
        if let Some(ref template) = args.ensembl_url_template {
            self.ensembl.url_template = template.clone();
        }
        if let Some(concurrency) = args.concurrency {
            self.general.concurrency = concurrency;
        }
        if let Some(timeout) = args.timeout {
            self.general.run_timeout_seconds = timeout;
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
