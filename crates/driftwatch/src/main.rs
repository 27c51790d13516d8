//! driftwatch CLI
//!
//! Summarise, filter, and acknowledge drift alerts across every DriftGuard
//! project, or keep a live summary refreshing in the terminal.

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use driftwatch::{
    extract_facets, AckTracker, AggregateSnapshot, Aggregator, AlertFilter, ApiClient, Config,
    FilterInput, Notice, NoticeLevel, RefreshScheduler, Refresher, Severity,
};

/// Cross-project drift alert aggregation
#[derive(Parser)]
#[command(name = "driftwatch")]
#[command(about = "Aggregate, filter, and acknowledge drift alerts across projects")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Base URL of the DriftGuard API
    #[arg(long, env = "DRIFTWATCH_BASE_URL", global = true)]
    base_url: Option<String>,

    /// Per-query timeout in seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Maximum concurrent project queries (0 = unbounded)
    #[arg(long, global = true)]
    max_in_flight: Option<usize>,

    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format (json or text)
    #[arg(long, default_value = "text", global = true)]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    Json,
    #[default]
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// One refresh cycle over every project
    Summary,
    /// List alerts matching a filter, newest first
    Alerts {
        /// Restrict to one project
        #[arg(long)]
        project: Option<String>,
        /// OPEN or ACK
        #[arg(long)]
        status: Option<String>,
        /// WARN or CRITICAL
        #[arg(long)]
        severity: Option<String>,
        /// Feature name
        #[arg(long)]
        feature: Option<String>,
        /// FEATURE_DRIFT, PREDICTION_SHIFT or SCHEMA
        #[arg(long)]
        alert_type: Option<String>,
        /// Earliest creation time (inclusive); local times use this machine's timezone
        #[arg(long)]
        start: Option<String>,
        /// Latest creation time (inclusive)
        #[arg(long)]
        end: Option<String>,
    },
    /// Alert types and feature names available for filtering
    Facets {
        /// Restrict to one project
        #[arg(long)]
        project: Option<String>,
    },
    /// Acknowledge one alert
    Ack {
        #[arg(long)]
        project: String,
        #[arg(long)]
        alert: String,
    },
    /// Keep refreshing the summary until Ctrl-C
    Watch {
        /// Refresh interval in seconds
        #[arg(long)]
        interval: Option<u64>,
    },
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env(),
    };
    if let Some(url) = &cli.base_url {
        config.base_url.clone_from(url);
    }
    if let Some(secs) = cli.timeout_secs {
        config.query_timeout_secs = secs;
    }
    if let Some(cap) = cli.max_in_flight {
        config.max_in_flight = Some(cap);
    }
    Ok(config)
}

fn print_notice(notice: &Notice) {
    let line = match notice.level {
        NoticeLevel::Success => notice.message.green(),
        NoticeLevel::Info => notice.message.normal(),
        NoticeLevel::Warning => notice.message.yellow(),
        NoticeLevel::Error => notice.message.red().bold(),
    };
    println!("{line}");
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

fn print_snapshot(snapshot: &AggregateSnapshot, format: OutputFormat, list: bool) -> Result<()> {
    if let OutputFormat::Json = format {
        return print_json(snapshot);
    }

    if list {
        for alert in &snapshot.alerts {
            let severity = match alert.severity {
                Severity::Critical => alert.severity.as_str().red().bold(),
                Severity::Warn => alert.severity.as_str().yellow(),
            };
            println!(
                "{}  {:<8} {:<16} {:<12} {:<5} {}  {}",
                alert.created_at.format("%Y-%m-%d %H:%M:%S"),
                severity,
                alert.alert_type.as_str(),
                alert.feature_name.as_deref().unwrap_or("-"),
                alert.status.as_str(),
                snapshot.project_name(&alert.project_id).dimmed(),
                alert.message
            );
        }
    }

    println!("{}", snapshot.summary_line().bold());
    for failure in &snapshot.failed_projects {
        println!(
            "  {} {} ({})",
            "unreachable:".yellow(),
            snapshot.project_name(&failure.project_id),
            failure.kind
        );
    }
    print_notice(&Notice::for_snapshot(snapshot));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("driftwatch=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("driftwatch=info,warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = load_config(&cli)?;
    debug!(?config, "Loaded configuration");

    let client = Arc::new(
        ApiClient::new(config.base_url.clone(), config.query_timeout())
            .context("Failed to create HTTP client")?,
    );
    let aggregator = Aggregator::new(client.clone(), config.aggregator());

    match cli.command {
        Commands::Summary => {
            let refresher = Refresher::new(client, aggregator, AlertFilter::all());
            match refresher.run_cycle().await {
                Ok(snapshot) => print_snapshot(&snapshot, cli.format, false)?,
                Err(e) => {
                    print_notice(&Notice::for_error(&e));
                    return Err(e).context("Refresh failed");
                }
            }
        }

        Commands::Alerts {
            project,
            status,
            severity,
            feature,
            alert_type,
            start,
            end,
        } => {
            let input = FilterInput {
                status,
                severity,
                feature_name: feature,
                alert_type,
                start_time: start,
                end_time: end,
            };
            let filter = input.resolve(&Local).context("Invalid filter")?;
            let mut refresher = Refresher::new(client, aggregator, filter);
            if let Some(project) = project {
                refresher = refresher.scoped_to(project);
            }
            let snapshot = refresher.run_cycle().await.context("Failed to load alerts")?;
            print_snapshot(&snapshot, cli.format, true)?;
        }

        Commands::Facets { project } => {
            let mut refresher = Refresher::new(client, aggregator, AlertFilter::all());
            if let Some(project) = project {
                refresher = refresher.scoped_to(project);
            }
            let snapshot = refresher.run_cycle().await.context("Failed to load alerts")?;
            let facets = extract_facets(&snapshot.alerts);
            match cli.format {
                OutputFormat::Json => print_json(&facets)?,
                OutputFormat::Text => {
                    println!("{} {}", "alert types:".bold(), facets.alert_types.join(", "));
                    println!("{} {}", "features:".bold(), facets.feature_names.join(", "));
                    if snapshot.is_partial() {
                        print_notice(&Notice::for_snapshot(&snapshot));
                    }
                }
            }
        }

        Commands::Ack { project, alert } => {
            let tracker = AckTracker::new(client);
            let outcome = tracker
                .acknowledge(&project, &alert)
                .await
                .context("Failed to acknowledge alert")?;
            match cli.format {
                OutputFormat::Json => print_json(&outcome)?,
                OutputFormat::Text => print_notice(&Notice::for_ack(&alert, outcome)),
            }
        }

        Commands::Watch { interval } => {
            let interval = interval
                .map(std::time::Duration::from_secs)
                .unwrap_or_else(|| config.refresh_interval());
            let scheduler =
                RefreshScheduler::new(Refresher::new(client, aggregator, AlertFilter::all()));
            let mut updates = scheduler.subscribe();
            scheduler.start(interval).await?;
            info!("Watching alerts, press Ctrl-C to stop");

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = updates.borrow_and_update().clone();
                        if let Some(snapshot) = snapshot {
                            print_snapshot(&snapshot, cli.format, false)?;
                        }
                    }
                }
            }

            scheduler.stop().await;
            if let Some(err) = scheduler.last_error().await {
                print_notice(&Notice::for_error(&err));
            }
            info!(stats = ?scheduler.stats(), "Stopped watching");
        }
    }

    Ok(())
}
