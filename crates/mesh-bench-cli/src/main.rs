use anyhow::Result;
use clap::{Parser, Subcommand};
use mesh_bench_runner::config::DEFAULT_CAMPAIGN_YAML;
use mesh_bench_runner::report::{format_table, ReportRow};
use mesh_bench_runner::{
    build_trial_groups, parse_log_file, run_campaign, CampaignConfig, CampaignReport,
    LatencySummary, ShellCluster,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "mesh-bench",
    version,
    about = "Gossip vs. mesh broadcast latency campaign driver"
)]
struct Cli {
    /// Debug-level logging (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every trial and write the CSV report
    Run {
        #[arg(long)]
        campaign: Option<PathBuf>,
        /// Skip the settle and subscriber warm-up waits
        #[arg(long)]
        fast: bool,
        #[arg(long)]
        json: bool,
    },
    /// Show the resolved configuration and trial matrix without running it
    Describe {
        #[arg(long)]
        campaign: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Summarize latencies from one subscriber log
    Parse {
        log: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Write a starter campaign file
    Init {
        #[arg(long, default_value = "campaign.yaml")]
        path: PathBuf,
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let json_mode = command_json_mode(&cli.command);
    match run_command(cli.command) {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                emit_json(&json_error("command_failed", err.to_string(), json!({})));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_campaign(path: Option<&Path>) -> Result<CampaignConfig> {
    match path {
        Some(path) => Ok(CampaignConfig::load(path)?),
        None => {
            let config = CampaignConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Run {
            campaign,
            fast,
            json,
        } => {
            let mut config = load_campaign(campaign.as_deref())?;
            if fast {
                config.timings = config.timings.without_sleeps();
            }
            let mut cluster = ShellCluster::from_config(&config);
            let report = run_campaign(&config, &mut cluster)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "run",
                    "report_path": config.report_path.display().to_string(),
                    "campaign": report_to_json(&report),
                })));
            }
            println!();
            println!(
                "--- All experiments complete! Results saved to {} ---",
                config.report_path.display()
            );
            print!("{}", format_table(&report.results));
            if !report.skipped.is_empty() {
                println!("skipped: {}", report.skipped.len());
                for spec in &report.skipped {
                    println!("  {}", spec.label());
                }
            }
        }
        Commands::Describe { campaign, json } => {
            let config = load_campaign(campaign.as_deref())?;
            let groups = build_trial_groups(&config);
            let total: usize = groups.iter().map(|g| g.rates.len()).sum();
            if json {
                let group_values: Vec<Value> = groups
                    .iter()
                    .map(|g| {
                        json!({
                            "protocol": g.protocol.as_str(),
                            "mesh_profile": g.mesh_profile,
                            "rates": g.rates,
                        })
                    })
                    .collect();
                return Ok(Some(json!({
                    "ok": true,
                    "command": "describe",
                    "config_file": config.config_file_path().display().to_string(),
                    "cluster": config.cluster_id(),
                    "results_dir": config.results_dir.display().to_string(),
                    "report_path": config.report_path.display().to_string(),
                    "timings": config.timings,
                    "groups": group_values,
                    "max_trials": total,
                })));
            }
            println!("config_file: {}", config.config_file_path().display());
            println!("cluster: {}", config.cluster_id());
            println!("results_dir: {}", config.results_dir.display());
            println!("report_path: {}", config.report_path.display());
            println!(
                "timings: settle={}s warmup={}s publish={}s",
                config.timings.settle_secs,
                config.timings.subscriber_warmup_secs,
                config.timings.publish_duration_secs
            );
            for group in &groups {
                match &group.mesh_profile {
                    Some(p) => println!(
                        "group: {} (target={} min={} max={}) rates={:?}",
                        group.label(),
                        p.target,
                        p.min,
                        p.max,
                        group.rates
                    ),
                    None => println!("group: {} rates={:?}", group.label(), group.rates),
                }
            }
            println!("max_trials: {}", total);
        }
        Commands::Parse { log, json } => {
            let samples = parse_log_file(&log)?;
            let summary = LatencySummary::from_samples(&samples);
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "parse",
                    "log": log.display().to_string(),
                    "summary": summary,
                })));
            }
            println!("log: {}", log.display());
            match summary {
                Some(s) => {
                    println!("messages_received: {}", s.messages_received);
                    println!("avg_latency_ms: {:.3}", s.avg_latency_ms);
                    println!("p99_latency_ms: {:.3}", s.p99_latency_ms);
                }
                None => println!("p99_latency_ms: inf (no valid samples)"),
            }
        }
        Commands::Init { path, force } => {
            if !force && path.exists() {
                return Err(anyhow::anyhow!(
                    "campaign file already exists (use --force): {}",
                    path.display()
                ));
            }
            std::fs::write(&path, DEFAULT_CAMPAIGN_YAML)?;
            println!("wrote: {}", path.display());
            println!("next: mesh-bench describe --campaign {}", path.display());
        }
    }
    Ok(None)
}

fn report_to_json(report: &CampaignReport) -> Value {
    let rows: Vec<Value> = report
        .results
        .iter()
        .map(|r| {
            let row = ReportRow::from(r);
            json!({
                "protocol": row.protocol,
                "config": row.config,
                "rate_rps": row.rate_rps,
                "avg_latency_ms": row.avg_latency_ms,
                "p99_latency_ms": p99_to_json(row.p99_latency_ms),
                "messages_received": row.messages_received,
            })
        })
        .collect();
    let skipped: Vec<Value> = report
        .skipped
        .iter()
        .map(|s| {
            json!({
                "protocol": s.protocol.as_str(),
                "config": s.config_label(),
                "rate_rps": s.rate,
            })
        })
        .collect();
    json!({
        "started_at": report.started_at.to_rfc3339(),
        "finished_at": report.finished_at.to_rfc3339(),
        "trials": report.results.len(),
        "failures": report.failures(),
        "results": rows,
        "skipped": skipped,
    })
}

// JSON has no infinity.
fn p99_to_json(value: f64) -> Value {
    if value.is_finite() {
        json!(value)
    } else {
        json!("inf")
    }
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Run { json, .. }
        | Commands::Describe { json, .. }
        | Commands::Parse { json, .. } => *json,
        Commands::Init { .. } => false,
    }
}
