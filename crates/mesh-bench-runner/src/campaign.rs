//! Campaign matrix and sequential execution with early stop.

use crate::cluster::Cluster;
use crate::config::{CampaignConfig, MeshProfile};
use crate::report::write_report;
use crate::trial::{Protocol, TrialExecutor, TrialResult, TrialSpec};
use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Trials sharing (protocol, mesh profile), ordered by ascending rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialGroup {
    pub protocol: Protocol,
    pub mesh_profile: Option<MeshProfile>,
    pub rates: Vec<u32>,
}

impl TrialGroup {
    pub fn specs(&self) -> impl Iterator<Item = TrialSpec> + '_ {
        self.rates
            .iter()
            .map(move |&rate| TrialSpec::new(self.protocol, rate, self.mesh_profile.clone()))
    }

    pub fn label(&self) -> String {
        match &self.mesh_profile {
            Some(profile) => format!("{}/{}", self.protocol, profile.name),
            None => self.protocol.to_string(),
        }
    }
}

/// Gossip first with no profile, then mesh once per configured profile.
pub fn build_trial_groups(config: &CampaignConfig) -> Vec<TrialGroup> {
    let rates = config.sorted_rates();
    let mut groups = vec![TrialGroup {
        protocol: Protocol::Gossip,
        mesh_profile: None,
        rates: rates.clone(),
    }];
    groups.extend(config.mesh_profiles.iter().map(|profile| TrialGroup {
        protocol: Protocol::Mesh,
        mesh_profile: Some(profile.clone()),
        rates: rates.clone(),
    }));
    groups
}

#[derive(Debug, Clone)]
pub struct CampaignReport {
    pub results: Vec<TrialResult>,
    /// Trials never run because a lower rate in their group failed
    pub skipped: Vec<TrialSpec>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl CampaignReport {
    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| r.is_failure()).count()
    }
}

/// Runs every group in order and writes the CSV report at the end.
///
/// Within a group the first trial without samples ends the group: larger
/// rates are assumed to fail as well and are skipped.
pub fn run_campaign<C: Cluster + ?Sized>(
    config: &CampaignConfig,
    cluster: &mut C,
) -> Result<CampaignReport> {
    config.validate()?;
    let started_at = Utc::now();
    let groups = build_trial_groups(config);
    info!(
        groups = groups.len(),
        cluster = %config.cluster_id(),
        config_file = %config.config_file_path().display(),
        "Starting campaign"
    );

    let mut executor = TrialExecutor::new(cluster, config);
    let mut results = Vec::new();
    let mut skipped = Vec::new();
    for group in &groups {
        let mut specs = group.specs();
        for spec in specs.by_ref() {
            let result = match executor.run(&spec) {
                Ok(result) => result,
                Err(e) => {
                    warn!(trial = %spec.label(), error = %e, "Failed to read trial log");
                    TrialResult::from_samples(&spec, &[])
                }
            };
            let failed = result.is_failure();
            results.push(result);
            if failed {
                break;
            }
        }
        let rest: Vec<TrialSpec> = specs.collect();
        if !rest.is_empty() {
            info!(
                group = %group.label(),
                skipped_rates = ?rest.iter().map(|s| s.rate).collect::<Vec<_>>(),
                "Early stop, skipping higher rates"
            );
            skipped.extend(rest);
        }
    }

    let report = CampaignReport {
        results,
        skipped,
        started_at,
        finished_at: Utc::now(),
    };
    write_report(&config.report_path, &report.results)?;
    info!(
        trials = report.results.len(),
        failures = report.failures(),
        skipped = report.skipped.len(),
        report = %config.report_path.display(),
        "Campaign complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_dir;
    use crate::trial::tests::{record_ms, test_config, FakeCluster};
    use std::collections::{BTreeMap, BTreeSet};
    use std::fs;

    fn ok_log() -> Vec<String> {
        (1..=5).map(|i| record_ms(i * 2)).collect()
    }

    #[test]
    fn matrix_is_gossip_then_profiles_in_order() {
        let config = CampaignConfig::default();
        let groups = build_trial_groups(&config);
        let labels: Vec<String> = groups.iter().map(|g| g.label()).collect();
        assert_eq!(
            labels,
            vec![
                "gossipsub",
                "optimum-p2p/low_density",
                "optimum-p2p/default_density",
                "optimum-p2p/high_density",
            ]
        );
        assert!(groups.iter().all(|g| g.rates == vec![10, 50, 100, 200, 400]));
    }

    #[test]
    fn failure_skips_higher_rates_in_group_only() {
        let root = test_dir("campaign_early_stop");
        let mut config = test_config(&root);
        config.rates = vec![100, 10, 50];
        config.mesh_profiles = vec![MeshProfile::new("low_density", 3, 2, 5)];

        let mut logs = BTreeMap::new();
        logs.insert("gossipsub_10rps.log".to_string(), ok_log());
        // gossipsub at 50 produces nothing
        for rate in [10, 50, 100] {
            logs.insert(format!("optimum-p2p_low_density_{}rps.log", rate), ok_log());
        }
        let mut cluster = FakeCluster {
            logs,
            ..FakeCluster::default()
        };
        let calls = cluster.calls.clone();

        let report = run_campaign(&config, &mut cluster).expect("campaign");

        let rows: Vec<(String, String, u32, bool)> = report
            .results
            .iter()
            .map(|r| (r.protocol.to_string(), r.config.clone(), r.rate, r.is_failure()))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("gossipsub".to_string(), "n/a".to_string(), 10, false),
                ("gossipsub".to_string(), "n/a".to_string(), 50, true),
                ("optimum-p2p".to_string(), "low_density".to_string(), 10, false),
                ("optimum-p2p".to_string(), "low_density".to_string(), 50, false),
                ("optimum-p2p".to_string(), "low_density".to_string(), 100, false),
            ]
        );
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].rate, 100);
        assert_eq!(report.skipped[0].protocol, Protocol::Gossip);
        let publishes: Vec<String> = calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with("publish"))
            .cloned()
            .collect();
        assert_eq!(publishes.len(), 5, "gossip at 100 must never run");

        let csv = fs::read_to_string(&config.report_path).expect("report");
        assert_eq!(csv.lines().count(), 1 + report.results.len());
        assert!(!csv.contains("gossipsub,n/a,100,"));
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn report_rows_are_unique_per_trial() {
        let root = test_dir("campaign_unique");
        let mut config = test_config(&root);
        config.rates = vec![10, 10, 20];
        let mut logs = BTreeMap::new();
        for name in [
            "gossipsub_10rps.log",
            "gossipsub_20rps.log",
            "optimum-p2p_low_density_10rps.log",
            "optimum-p2p_default_density_10rps.log",
            "optimum-p2p_default_density_20rps.log",
        ] {
            logs.insert(name.to_string(), ok_log());
        }
        let mut cluster = FakeCluster {
            logs,
            ..FakeCluster::default()
        };
        let report = run_campaign(&config, &mut cluster).expect("campaign");

        // low_density fails at 20, high_density fails at 10
        assert_eq!(report.results.len(), 2 + 2 + 2 + 1);
        assert_eq!(report.failures(), 2);
        assert_eq!(report.skipped.len(), 1);
        let keys: BTreeSet<(String, String, u32)> = report
            .results
            .iter()
            .map(|r| (r.protocol.to_string(), r.config.clone(), r.rate))
            .collect();
        assert_eq!(keys.len(), report.results.len());
        let _ = fs::remove_dir_all(root);
    }
}
