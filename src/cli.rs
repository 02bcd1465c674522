//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::Snapshot;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// panelchecker - compare gene panels across Ensembl releases
///
/// Reports which genes of a PanelApp panel keep their symbol, id and
/// coordinates when moving to a newer Ensembl release.
///
/// Examples:
///   panelchecker panels --search cancer
///   panelchecker detect 245
///   panelchecker analyze 245 --target 111
///   panelchecker analyze 245 --target 111 --current 109 --format json -o report.json
///   panelchecker lookup BRCA1 --snapshot 110
///   panelchecker init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    ///
    /// If not specified, looks for .panelchecker.toml in the current directory
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// PanelApp API base URL
    #[arg(long, global = true, value_name = "URL", env = "PANELCHECKER_PANELAPP_URL")]
    pub panelapp_url: Option<String>,

    /// Ensembl REST URL with a `{release}` placeholder
    #[arg(
        long,
        global = true,
        value_name = "TEMPLATE",
        env = "PANELCHECKER_ENSEMBL_URL"
    )]
    pub ensembl_url_template: Option<String>,

    /// Number of genes fetched concurrently
    #[arg(long, global = true, value_name = "NUM", env = "PANELCHECKER_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Deadline for a whole analysis run in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List panels in the registry
    Panels {
        /// Only panels whose name matches this term
        #[arg(short, long, value_name = "TERM")]
        search: Option<String>,

        /// Include panels without a signed-off version
        #[arg(long)]
        all: bool,
    },

    /// Detect the Ensembl release a panel currently corresponds to
    Detect {
        /// PanelApp panel id
        panel_id: String,

        /// Pin a panel version instead of the latest
        #[arg(long, value_name = "VERSION")]
        panel_version: Option<String>,
    },

    /// Compare a panel between its current release and a target release
    Analyze {
        /// PanelApp panel id
        panel_id: String,

        /// Target Ensembl release
        #[arg(short, long, value_name = "RELEASE")]
        target: u32,

        /// Current Ensembl release; detected when omitted
        #[arg(long, value_name = "RELEASE")]
        current: Option<u32>,

        /// Pin a panel version instead of the latest
        #[arg(long, value_name = "VERSION")]
        panel_version: Option<String>,

        /// Output format (markdown, json)
        #[arg(long, default_value = "markdown", value_name = "FORMAT")]
        format: OutputFormat,

        /// Output file path for the report
        ///
        /// Defaults to `output` from the config file.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Exit with code 2 when genes reach this status
        ///
        /// Values: missing (any gene missing), changed (any gene not retained)
        #[arg(long, value_name = "STATUS")]
        fail_on: Option<FailOn>,
    },

    /// Look up a single gene in one release
    Lookup {
        /// HGNC symbol, or Ensembl stable id with --by-id
        query: String,

        /// Ensembl release to query
        #[arg(short, long, value_name = "RELEASE")]
        snapshot: u32,

        /// Treat the query as an Ensembl stable id
        #[arg(long)]
        by_id: bool,
    },

    /// Generate a default .panelchecker.toml configuration file
    InitConfig,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Gene status threshold for --fail-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum FailOn {
    /// Any gene missing from the target release
    Missing,
    /// Any gene not fully retained
    Changed,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.concurrency == Some(0) {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if let Some(ref url) = self.panelapp_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("PanelApp URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(ref template) = self.ensembl_url_template {
            if !template.contains("{release}") {
                return Err("Ensembl URL template must contain '{release}'".to_string());
            }
        }

        match &self.command {
            Command::Analyze {
                panel_id,
                target,
                current,
                ..
            } => {
                validate_panel_id(panel_id)?;
                validate_release(*target)?;
                if let Some(current) = current {
                    validate_release(*current)?;
                }
            }
            Command::Detect { panel_id, .. } => validate_panel_id(panel_id)?,
            Command::Lookup {
                query, snapshot, ..
            } => {
                if query.trim().is_empty() {
                    return Err("Lookup query must not be empty".to_string());
                }
                validate_release(*snapshot)?;
            }
            Command::Panels { .. } | Command::InitConfig => {}
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `config_verbose` is the config file's `verbose`; `--quiet` overrides it.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

fn validate_panel_id(panel_id: &str) -> Result<(), String> {
    if panel_id.trim().is_empty() {
        return Err("Panel id must not be empty".to_string());
    }
    Ok(())
}

fn validate_release(release: u32) -> Result<(), String> {
    if !Snapshot(release).is_supported() {
        return Err(format!(
            "Ensembl release must be between {} and {}, got {}",
            Snapshot::OLDEST_SUPPORTED,
            Snapshot::NEWEST_SUPPORTED,
            release
        ));
    }
    Ok(())
}
