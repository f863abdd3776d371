//! Benchmark campaign driver comparing gossip and mesh broadcast protocols.
//!
//! A campaign walks a matrix of (protocol, mesh profile, rate) trials. Each
//! trial patches the cluster configuration, redeploys, runs a timed
//! publish/subscribe workload and turns the subscriber log into latency
//! statistics. Results are collected into a CSV report.

use anyhow::Result;
use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::Path;

pub mod artifact;
pub mod campaign;
pub mod cluster;
pub mod command;
pub mod config;
pub mod error;
pub mod log_parser;
pub mod report;
pub mod stats;
pub mod trial;

pub use campaign::{build_trial_groups, run_campaign, CampaignReport, TrialGroup};
pub use cluster::{Cluster, ShellCluster, SubscriberHandle};
pub use command::{BackgroundProcess, CommandOutput, CommandRunner};
pub use config::{CampaignConfig, CommandTemplates, MeshProfile, Timings};
pub use error::CampaignConfigError;
pub use log_parser::{parse_log_file, LatencySamples};
pub use stats::LatencySummary;
pub use trial::{Protocol, TrialExecutor, TrialOutcome, TrialResult, TrialSpec};

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

/// Writes `bytes` to a sibling temp file, fsyncs it and renames it over
/// `path`, so readers only ever observe the old or the new content.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_dir(parent)?;
        }
    }
    let ts = Utc::now().timestamp_micros();
    let pid = std::process::id();
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("tmpfile");
    let tmp = path.with_file_name(format!(".{}.tmp.{}.{}", name, pid, ts));
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    if let Some(parent) = path.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_dir(tag: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "mesh_bench_{}_{}_{}",
        tag,
        std::process::id(),
        Utc::now().timestamp_micros()
    ));
    ensure_dir(&dir).expect("temp dir");
    dir
}
