//! Campaign configuration
//!
//! Team number, derived config/cluster identifiers, rates, mesh profiles,
//! waits and collaborator command lines, handed to the campaign runner.

use crate::error::CampaignConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Named target/min/max peer-connection counts for the mesh protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeshProfile {
    pub name: String,
    pub target: u32,
    pub min: u32,
    pub max: u32,
}

impl MeshProfile {
    pub fn new(name: impl Into<String>, target: u32, min: u32, max: u32) -> Self {
        Self {
            name: name.into(),
            target,
            min,
            max,
        }
    }
}

/// Fixed waits that stand in for readiness checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timings {
    /// Wait after deploy before the subscriber starts
    pub settle_secs: u64,
    /// Wait after subscriber start before publishing
    pub subscriber_warmup_secs: u64,
    /// Publisher run length
    pub publish_duration_secs: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            settle_secs: 30,
            subscriber_warmup_secs: 5,
            publish_duration_secs: 60,
        }
    }
}

impl Timings {
    /// Drops the settle and warm-up waits. The publisher is still asked to
    /// run for `publish_duration_secs`.
    pub fn without_sleeps(self) -> Self {
        Self {
            settle_secs: 0,
            subscriber_warmup_secs: 0,
            ..self
        }
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    pub fn subscriber_warmup(&self) -> Duration {
        Duration::from_secs(self.subscriber_warmup_secs)
    }

    pub fn publish_duration(&self) -> Duration {
        Duration::from_secs(self.publish_duration_secs)
    }
}

/// Shell command templates for the external collaborators.
///
/// Placeholders: `{cluster}` in the deployment commands, `{rate}` and
/// `{duration}` (seconds) in the publisher command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommandTemplates {
    pub stop_and_remove: String,
    pub upload_config: String,
    pub deploy: String,
    pub subscribe: String,
    pub publish: String,
}

impl Default for CommandTemplates {
    fn default() -> Self {
        Self {
            stop_and_remove: "make stop_and_remove_containers CLUSTER={cluster}".to_string(),
            upload_config: "make upload_configs CLUSTER={cluster}".to_string(),
            deploy: "make deploy_clusters CLUSTER={cluster}".to_string(),
            subscribe: ". scripts/subscribe.sh".to_string(),
            publish: ". scripts/publish.sh --rate {rate} --duration {duration}".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CampaignConfig {
    pub team: u32,
    /// Overrides the team-derived `config_p2p/config_p2p_{letter}.yml`
    pub config_file: Option<PathBuf>,
    /// Overrides the team-derived `p2p_nodes_cluster_{letter}`
    pub cluster: Option<String>,
    pub results_dir: PathBuf,
    pub report_path: PathBuf,
    pub rates: Vec<u32>,
    pub mesh_profiles: Vec<MeshProfile>,
    pub timings: Timings,
    pub shell: String,
    pub commands: CommandTemplates,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            team: 4,
            config_file: None,
            cluster: None,
            results_dir: PathBuf::from("results"),
            report_path: PathBuf::from("mesh_experiment_results.csv"),
            rates: vec![10, 50, 100, 200, 400],
            mesh_profiles: vec![
                MeshProfile::new("low_density", 3, 2, 5),
                MeshProfile::new("default_density", 6, 3, 12),
                MeshProfile::new("high_density", 10, 8, 18),
            ],
            timings: Timings::default(),
            shell: "bash".to_string(),
            commands: CommandTemplates::default(),
        }
    }
}

impl CampaignConfig {
    pub fn load(path: &Path) -> Result<Self, CampaignConfigError> {
        let raw = fs::read_to_string(path)
            .map_err(|e| CampaignConfigError::io(path.display().to_string(), e))?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, CampaignConfigError> {
        let config: CampaignConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CampaignConfigError> {
        if !(1..=26).contains(&self.team) {
            return Err(CampaignConfigError::InvalidTeam(self.team));
        }
        if self.rates.is_empty() {
            return Err(CampaignConfigError::EmptyRates);
        }
        if self.rates.contains(&0) {
            return Err(CampaignConfigError::ZeroRate);
        }
        if self.shell.trim().is_empty() {
            return Err(CampaignConfigError::EmptyShell);
        }
        let mut seen = BTreeSet::new();
        for profile in &self.mesh_profiles {
            if profile.name.trim().is_empty() {
                return Err(CampaignConfigError::EmptyProfileName);
            }
            if !seen.insert(profile.name.as_str()) {
                return Err(CampaignConfigError::DuplicateProfile(profile.name.clone()));
            }
            if !(profile.min <= profile.target && profile.target <= profile.max) {
                return Err(CampaignConfigError::InvalidMeshBounds {
                    name: profile.name.clone(),
                    target: profile.target,
                    min: profile.min,
                    max: profile.max,
                });
            }
        }
        Ok(())
    }

    fn team_letter(&self) -> char {
        let offset = self.team.saturating_sub(1).min(25) as u8;
        char::from(b'a' + offset)
    }

    pub fn config_file_path(&self) -> PathBuf {
        self.config_file.clone().unwrap_or_else(|| {
            PathBuf::from(format!("config_p2p/config_p2p_{}.yml", self.team_letter()))
        })
    }

    pub fn cluster_id(&self) -> String {
        self.cluster
            .clone()
            .unwrap_or_else(|| format!("p2p_nodes_cluster_{}", self.team_letter()))
    }

    /// Ascending, de-duplicated rates.
    pub fn sorted_rates(&self) -> Vec<u32> {
        let mut rates = self.rates.clone();
        rates.sort_unstable();
        rates.dedup();
        rates
    }
}

/// Starter file written by `mesh-bench init`. Mirrors `CampaignConfig::default()`.
pub const DEFAULT_CAMPAIGN_YAML: &str = "\
# Team number; derives config_p2p/config_p2p_<letter>.yml and p2p_nodes_cluster_<letter>
team: 4
# config_file: config_p2p/config_p2p_d.yml
# cluster: p2p_nodes_cluster_d
results_dir: results
report_path: mesh_experiment_results.csv
rates: [10, 50, 100, 200, 400]
mesh_profiles:
  - { name: low_density, target: 3, min: 2, max: 5 }
  - { name: default_density, target: 6, min: 3, max: 12 }
  - { name: high_density, target: 10, min: 8, max: 18 }
timings:
  settle_secs: 30
  subscriber_warmup_secs: 5
  publish_duration_secs: 60
shell: bash
commands:
  stop_and_remove: make stop_and_remove_containers CLUSTER={cluster}
  upload_config: make upload_configs CLUSTER={cluster}
  deploy: make deploy_clusters CLUSTER={cluster}
  subscribe: . scripts/subscribe.sh
  publish: . scripts/publish.sh --rate {rate} --duration {duration}
";
