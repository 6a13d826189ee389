//! RQI - Release Quality Index gate
//!
//! The `rqi` command scores a build's release pillars, prints the quality
//! dashboard and exits non-zero when the build must not be promoted.
//!
//! ## Commands
//!
//! - `evaluate`: Score all pillars and decide the release gate
//! - `catalog`: List the pillars and the artifacts they read

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn, Level};

use rqi_core::{
    cancel_pair, record_history, render_console, write_report_json, ArtifactReader,
    EvaluationInput, Evaluator, GateConfig, HistoryLog, PillarCatalog, PillarKind,
    DEFAULT_CONFIG_FILE,
};

#[derive(Parser)]
#[command(name = "rqi")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Release Quality Index gate", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Project configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every pillar and decide whether the build may be promoted
    Evaluate {
        /// Version of the build being gated
        #[arg(long = "app-version", env = "APP_VERSION", default_value = "0.0.0-unknown")]
        app_version: String,

        /// Force promotion regardless of RQI, with a recorded justification
        #[arg(long, env = "OVERRIDE_REASON")]
        override_reason: Option<String>,

        /// RQI required to pass (0-100)
        #[arg(long)]
        threshold: Option<f64>,

        /// Directory holding `<key>_results.json` artifacts
        #[arg(long)]
        results_dir: Option<PathBuf>,

        /// Unit-test coverage report
        #[arg(long)]
        coverage_path: Option<PathBuf>,

        /// Project key at the analysis service
        #[arg(long)]
        project_key: Option<String>,

        /// Analysis service base URL
        #[arg(long)]
        analysis_url: Option<String>,

        /// Append-only history log
        #[arg(long, default_value = "quality_history.csv")]
        history: PathBuf,

        /// Skip writing the history log
        #[arg(long)]
        no_history: bool,

        /// Also write the full report as JSON
        #[arg(long)]
        report_json: Option<PathBuf>,

        /// Abort analysis polling after this many seconds
        #[arg(long)]
        deadline_secs: Option<u64>,
    },

    /// List the pillar catalog
    Catalog,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    rqi_core::init_tracing(cli.json_logs, level);

    let config = GateConfig::load(&cli.config);
    debug!(
        app = %config.app_name,
        project_key = %config.project_key,
        results_dir = %config.results_dir.display(),
        threshold = config.threshold,
        "Loaded gate configuration"
    );

    match cli.command {
        Commands::Evaluate {
            app_version,
            override_reason,
            threshold,
            results_dir,
            coverage_path,
            project_key,
            analysis_url,
            history,
            no_history,
            report_json,
            deadline_secs,
        } => {
            let overrides = Overrides {
                threshold,
                results_dir,
                coverage_path,
                project_key,
                analysis_url,
            };
            let input = EvaluationInput {
                version: app_version,
                override_reason,
            };
            let history = (!no_history).then_some(history);
            let code = cmd_evaluate(
                overrides.apply(config),
                input,
                history,
                report_json,
                deadline_secs.map(Duration::from_secs),
            )
            .await?;
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Commands::Catalog => cmd_catalog(&config),
    }
}

/// Command-line values that win over file and environment configuration.
struct Overrides {
    threshold: Option<f64>,
    results_dir: Option<PathBuf>,
    coverage_path: Option<PathBuf>,
    project_key: Option<String>,
    analysis_url: Option<String>,
}

impl Overrides {
    fn apply(self, mut config: GateConfig) -> GateConfig {
        if let Some(t) = self.threshold {
            config.set_threshold(t);
        }
        if let Some(dir) = self.results_dir {
            config.results_dir = dir;
        }
        if let Some(path) = self.coverage_path {
            config.coverage_path = path;
        }
        if let Some(key) = self.project_key {
            config.project_key = key;
        }
        if let Some(url) = self.analysis_url {
            config.analysis.base_url = url.trim_end_matches('/').to_string();
        }
        config
    }
}

async fn cmd_evaluate(
    config: GateConfig,
    input: EvaluationInput,
    history: Option<PathBuf>,
    report_json: Option<PathBuf>,
    deadline: Option<Duration>,
) -> Result<i32> {
    let evaluator =
        Evaluator::from_config(&config).context("Failed to create analysis service client")?;

    let (cancel, signal) = cancel_pair();
    let watchdog = tokio::spawn(async move {
        let timer = async {
            match deadline {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => warn!("Interrupted, cancelling evaluation"),
            _ = timer => warn!("Deadline reached, cancelling evaluation"),
        }
        cancel.cancel();
    });

    let report = evaluator
        .evaluate(&PillarCatalog::standard(), &input, signal)
        .await;
    watchdog.abort();

    let dashboard = render_console(&report, &config.app_name);
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(dashboard.as_bytes())
        .and_then(|_| stdout.flush())
        .context("Failed to write gate verdict")?;

    if let Some(path) = history {
        record_history(&HistoryLog::new(path), &report);
    }

    if let Some(path) = report_json {
        match write_report_json(&path, &report) {
            Ok(()) => info!(path = %path.display(), "Report written"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to write report"),
        }
    }

    Ok(report.verdict.exit_code())
}

fn cmd_catalog(config: &GateConfig) -> Result<()> {
    println!("Pillars for {} (threshold {:.1}%)", config.app_name, config.threshold);
    println!();
    for spec in PillarCatalog::standard().iter() {
        let source = match spec.kind {
            PillarKind::UnitTests => config.coverage_path.display().to_string(),
            PillarKind::CodeQuality => format!(
                "{} (project {})",
                config.analysis.base_url, config.project_key
            ),
            _ => config
                .results_dir
                .join(ArtifactReader::file_name(&spec.source_key))
                .display()
                .to_string(),
        };
        let index = if spec.kind.is_development() {
            "CQI+RQI"
        } else {
            "RQI"
        };
        println!("  {:<18} {:<8} {}", spec.name, index, source);
    }
    Ok(())
}
