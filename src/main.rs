//! panelchecker - gene panel comparison across Ensembl releases
//!
//! A CLI over the panel comparison core: lists PanelApp panels, detects
//! the release a panel corresponds to, and reports how its genes change
//! in a target Ensembl release.
//!
//! Exit codes:
//!   0 - Success (no genes at the --fail-on threshold, or no --fail-on set)
//!   1 - Runtime error (network, config, unknown panel, timeout, Ctrl-C)
//!   2 - Genes found at the --fail-on threshold

use anyhow::{Context, Result};
use panelchecker::analysis::aggregator::generate_summary_text;
use panelchecker::analysis::DiffStatus;
use panelchecker::cli::{Args, Command, FailOn, OutputFormat};
use panelchecker::clients::GeneQuery;
use panelchecker::config::{Config, CONFIG_FILE_NAME};
use panelchecker::models::{PanelReport, Snapshot};
use panelchecker::{report, AnalysisRequest, Pipeline};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // No logging needed to write the defaults
    if args.command == Command::InitConfig {
        return handle_init_config();
    }

    let (mut config, source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(args.log_level(config.general.verbose));

    info!("panelchecker v{}", env!("CARGO_PKG_VERSION"));
    source.log();
    debug!("Arguments: {:?}", args);

    let outcome = tokio::select! {
        result = run(args, config) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling in-flight requests");
            Err(anyhow::anyhow!("interrupted"))
        }
    };

    match outcome {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle `init-config`: generate a default .panelchecker.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to change endpoints, rate limits and candidate releases.");
    Ok(())
}

/// Initialize logging at `level`.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Dispatch a subcommand. Returns the process exit code.
async fn run(args: Args, mut config: Config) -> Result<i32> {
    if let Command::Panels { all: true, .. } = args.command {
        config.panelapp.signed_off_only = false;
    }

    let pipeline = Pipeline::from_config(&config)?.with_progress(!args.quiet);

    match args.command.clone() {
        Command::Panels { search, .. } => {
            list_panels(&pipeline, search.as_deref()).await?;
            Ok(0)
        }
        Command::Detect {
            panel_id,
            panel_version,
        } => {
            println!("🔍 Detecting current release of panel {}...", panel_id);
            let detection = pipeline
                .detect_current_snapshot(&panel_id, panel_version.as_deref())
                .await?;
            println!("   Release: Ensembl {}", detection.snapshot);
            println!("   Method: {}", detection.method);
            if let Some(gene) = detection.gene {
                println!("   Detected via gene: {}", gene);
            }
            Ok(0)
        }
        Command::Analyze {
            panel_id,
            target,
            current,
            panel_version,
            format,
            output,
            fail_on,
        } => {
            let request = AnalysisRequest {
                panel_id,
                panel_version,
                target_snapshot: Snapshot(target),
                current_snapshot: current.map(Snapshot),
            };
            let output = output.unwrap_or_else(|| default_output(&config, format));
            analyze(&pipeline, &request, format, &output, fail_on).await
        }
        Command::Lookup {
            query,
            snapshot,
            by_id,
        } => {
            let query = if by_id {
                GeneQuery::Id(query)
            } else {
                GeneQuery::Symbol(query)
            };
            lookup(&pipeline, &query, Snapshot(snapshot)).await?;
            Ok(0)
        }
        Command::InitConfig => {
            handle_init_config()?;
            Ok(0)
        }
    }
}

async fn list_panels(pipeline: &Pipeline, search: Option<&str>) -> Result<()> {
    let panels = pipeline.list_panels(search).await?;

    if panels.is_empty() {
        println!("   No matching panels found.");
        return Ok(());
    }

    for panel in &panels {
        let marker = if panel.signed_off { "✅" } else { "📝" };
        println!(
            "   {} {:>5}  {} (v{}, {} genes)",
            marker, panel.id, panel.name, panel.version, panel.gene_count
        );
    }
    println!("\n   Total: {} panels", panels.len());
    Ok(())
}

async fn analyze(
    pipeline: &Pipeline,
    request: &AnalysisRequest,
    format: OutputFormat,
    output: &Path,
    fail_on: Option<FailOn>,
) -> Result<i32> {
    println!(
        "🧬 Analyzing panel {} against Ensembl {}...",
        request.panel_id, request.target_snapshot
    );

    let report = pipeline.run_analysis(request).await?;

    println!("\n📝 Generating report...");
    let content = match format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };
    report::save_report(&content, output)?;

    print_summary(&report);
    println!("\n✅ Analysis complete! Report saved to: {}", output.display());

    if let Some(threshold) = fail_on {
        if threshold_reached(&report, threshold) {
            eprintln!(
                "\n⛔ Genes found at the {:?} threshold. Failing (exit code 2).",
                threshold
            );
            return Ok(2);
        }
    }

    Ok(0)
}

fn print_summary(report: &PanelReport) {
    println!("\n📊 Analysis Summary:");
    println!("   Panel: {} v{}", report.panel_name, report.panel_version);
    println!(
        "   Releases: {} → {}",
        report.current_snapshot, report.target_snapshot
    );
    for line in generate_summary_text(&report.summary, report.total_genes).lines() {
        println!("   {}", line);
    }
    println!("   Duration: {:.1}s", report.duration_seconds);
}

fn threshold_reached(report: &PanelReport, threshold: FailOn) -> bool {
    match threshold {
        FailOn::Missing => report.summary.genes_missing > 0,
        FailOn::Changed => report
            .genes
            .iter()
            .any(|g| g.status() != DiffStatus::Retained),
    }
}

async fn lookup(pipeline: &Pipeline, query: &GeneQuery, snapshot: Snapshot) -> Result<()> {
    match pipeline.lookup(query, snapshot).await? {
        Some(annotation) => {
            println!("🧬 {} in Ensembl {}", annotation.symbol, snapshot);
            println!("   Id: {}", annotation.external_id);
            println!("   Location: {}", annotation.location());
            println!("   Size: {} bp", annotation.size());
            println!("   Assembly: {}", annotation.assembly);
        }
        None => println!("   No {} in Ensembl {}", query, snapshot),
    }
    Ok(())
}

/// The config's output path, with the extension matching the format.
fn default_output(config: &Config, format: OutputFormat) -> PathBuf {
    let path = PathBuf::from(&config.general.output);
    match format {
        OutputFormat::Json => path.with_extension("json"),
        OutputFormat::Markdown => path,
    }
}

/// Where the effective configuration came from.
enum ConfigSource {
    Explicit(PathBuf),
    Default,
    Builtin,
    Unreadable(String),
}

impl ConfigSource {
    /// Report the source once logging is up.
    fn log(&self) {
        match self {
            ConfigSource::Explicit(path) => info!("Loaded config from: {}", path.display()),
            ConfigSource::Default => info!("Loaded default config from {}", CONFIG_FILE_NAME),
            ConfigSource::Builtin => debug!("No config file found, using defaults"),
            ConfigSource::Unreadable(e) => warn!("Failed to load config: {}", e),
        }
    }
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is initialized, so the source is returned for
/// reporting instead of being logged here.
fn load_config(args: &Args) -> Result<(Config, ConfigSource)> {
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigSource::Explicit(config_path.clone())));
    }

    match Config::load_default() {
        Ok(Some(config)) => Ok((config, ConfigSource::Default)),
        Ok(None) => Ok((Config::default(), ConfigSource::Builtin)),
        Err(e) => Ok((Config::default(), ConfigSource::Unreadable(format!("{:#}", e)))),
    }
}
