//! Single trial execution: configure, redeploy, measure, parse.

use crate::artifact::apply_trial_settings;
use crate::cluster::{Cluster, SubscriberHandle};
use crate::config::{CampaignConfig, MeshProfile, Timings};
use crate::ensure_dir;
use crate::log_parser::parse_log_file;
use crate::stats::LatencySummary;
use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Config label for trials without a mesh profile.
pub const NO_PROFILE_LABEL: &str = "n/a";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Protocol {
    #[serde(rename = "gossipsub")]
    Gossip,
    #[serde(rename = "optimum-p2p")]
    Mesh,
}

impl Protocol {
    /// Name written to the cluster config and the report.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Gossip => "gossipsub",
            Protocol::Mesh => "optimum-p2p",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialSpec {
    pub protocol: Protocol,
    pub rate: u32,
    pub mesh_profile: Option<MeshProfile>,
}

impl TrialSpec {
    pub fn new(protocol: Protocol, rate: u32, mesh_profile: Option<MeshProfile>) -> Self {
        Self {
            protocol,
            rate,
            mesh_profile,
        }
    }

    /// `{protocol}` or `{protocol}_{profile}`.
    pub fn config_name(&self) -> String {
        match &self.mesh_profile {
            Some(profile) => format!("{}_{}", self.protocol, profile.name),
            None => self.protocol.to_string(),
        }
    }

    /// Value of the report's `config` column.
    pub fn config_label(&self) -> &str {
        self.mesh_profile
            .as_ref()
            .map(|p| p.name.as_str())
            .unwrap_or(NO_PROFILE_LABEL)
    }

    pub fn log_file_name(&self) -> String {
        format!("{}_{}rps.log", self.config_name(), self.rate)
    }

    pub fn label(&self) -> String {
        format!("{} at {} msg/s", self.config_name(), self.rate)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrialOutcome {
    Measured(LatencySummary),
    /// No valid samples; reported as p99 = +inf
    NoSamples,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrialResult {
    pub protocol: Protocol,
    pub config: String,
    pub rate: u32,
    pub outcome: TrialOutcome,
}

impl TrialResult {
    pub fn from_samples(spec: &TrialSpec, samples: &[f64]) -> Self {
        let outcome = match LatencySummary::from_samples(samples) {
            Some(summary) => TrialOutcome::Measured(summary),
            None => TrialOutcome::NoSamples,
        };
        Self {
            protocol: spec.protocol,
            config: spec.config_label().to_string(),
            rate: spec.rate,
            outcome,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, TrialOutcome::NoSamples)
    }

    pub fn p99_latency_ms(&self) -> f64 {
        match &self.outcome {
            TrialOutcome::Measured(s) => s.p99_latency_ms,
            TrialOutcome::NoSamples => f64::INFINITY,
        }
    }

    pub fn avg_latency_ms(&self) -> Option<f64> {
        match &self.outcome {
            TrialOutcome::Measured(s) => Some(s.avg_latency_ms),
            TrialOutcome::NoSamples => None,
        }
    }

    pub fn messages_received(&self) -> Option<usize> {
        match &self.outcome {
            TrialOutcome::Measured(s) => Some(s.messages_received),
            TrialOutcome::NoSamples => None,
        }
    }
}

/// Runs trials one at a time against a [`Cluster`].
///
/// Collaborator failures are logged and the trial carries on; a broken
/// deployment shows up as a trial without samples.
pub struct TrialExecutor<'a, C: Cluster + ?Sized> {
    cluster: &'a mut C,
    config_path: PathBuf,
    cluster_id: String,
    results_dir: PathBuf,
    timings: Timings,
}

impl<'a, C: Cluster + ?Sized> TrialExecutor<'a, C> {
    pub fn new(cluster: &'a mut C, config: &CampaignConfig) -> Self {
        Self {
            cluster,
            config_path: config.config_file_path(),
            cluster_id: config.cluster_id(),
            results_dir: config.results_dir.clone(),
            timings: config.timings.clone(),
        }
    }

    pub fn log_path(&self, spec: &TrialSpec) -> PathBuf {
        self.results_dir.join(spec.log_file_name())
    }

    pub fn run(&mut self, spec: &TrialSpec) -> Result<TrialResult> {
        info!(trial = %spec.label(), "Configuring trial");

        if let Err(e) = apply_trial_settings(&self.config_path, spec) {
            warn!(trial = %spec.label(), error = %e, "Failed to update cluster config");
        }

        self.redeploy();

        info!(
            secs = self.timings.settle_secs,
            "Waiting for network to stabilize"
        );
        pause(self.timings.settle());

        let log_path = self.log_path(spec);
        let mut subscriber = match self.start_subscriber(&log_path) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(log = %log_path.display(), error = %e, "Failed to start subscriber");
                None
            }
        };
        pause(self.timings.subscriber_warmup());

        info!(rate = spec.rate, secs = self.timings.publish_duration_secs, "Starting publisher");
        report_step(
            "publish",
            self.cluster
                .run_publisher(spec.rate, self.timings.publish_duration()),
        );

        if let Some(handle) = subscriber.as_mut() {
            if let Err(e) = handle.stop() {
                warn!(error = %e, "Failed to stop subscriber");
            }
        }
        info!(trial = %spec.label(), "Trial finished");

        let samples = parse_log_file(&log_path)?;
        let result = TrialResult::from_samples(spec, &samples);
        if result.is_failure() {
            warn!(trial = %spec.label(), "No latency samples collected");
        } else {
            info!(
                trial = %spec.label(),
                messages = samples.len(),
                p99_ms = result.p99_latency_ms(),
                "Collected latency samples"
            );
        }
        Ok(result)
    }

    fn redeploy(&mut self) {
        let cluster_id = self.cluster_id.clone();
        report_step("stop_and_remove", self.cluster.stop_and_remove(&cluster_id));
        report_step("upload_config", self.cluster.upload_config(&cluster_id));
        report_step("deploy", self.cluster.deploy(&cluster_id));
    }

    fn start_subscriber(
        &mut self,
        log_path: &Path,
    ) -> Result<Box<dyn SubscriberHandle>> {
        if let Some(parent) = log_path.parent() {
            if !parent.as_os_str().is_empty() {
                ensure_dir(parent)?;
            }
        }
        self.cluster.start_subscriber(log_path)
    }
}

fn report_step(step: &str, outcome: Result<bool>) {
    match outcome {
        Ok(true) => {}
        Ok(false) => warn!(step, "Step failed, continuing"),
        Err(e) => warn!(step, error = %e, "Step could not run, continuing"),
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}
