//! Deployment and workload collaborators
//!
//! The trial executor only talks to a [`Cluster`]. [`ShellCluster`] backs it
//! with the configured shell command lines.

use crate::command::{BackgroundProcess, CommandRunner};
use crate::config::{CampaignConfig, CommandTemplates};
use anyhow::Result;
use std::path::Path;
use std::time::Duration;

/// A running subscriber that can be stopped once measurement ends.
pub trait SubscriberHandle {
    /// Must be safe to call on a subscriber that already stopped.
    fn stop(&mut self) -> Result<()>;
}

/// External infrastructure used by a trial.
///
/// Blocking methods return `Ok(true)` on success, `Ok(false)` when the
/// command ran but failed, and `Err` when it could not be run at all.
pub trait Cluster {
    fn stop_and_remove(&mut self, cluster_id: &str) -> Result<bool>;
    fn upload_config(&mut self, cluster_id: &str) -> Result<bool>;
    fn deploy(&mut self, cluster_id: &str) -> Result<bool>;
    /// Blocks until the publisher has run for `duration`.
    fn run_publisher(&mut self, rate: u32, duration: Duration) -> Result<bool>;
    /// Starts the subscriber with its stdout written to `log_path`.
    fn start_subscriber(&mut self, log_path: &Path) -> Result<Box<dyn SubscriberHandle>>;
}

impl SubscriberHandle for BackgroundProcess {
    fn stop(&mut self) -> Result<()> {
        BackgroundProcess::stop(self)
    }
}

#[derive(Debug, Clone)]
pub struct ShellCluster {
    runner: CommandRunner,
    templates: CommandTemplates,
}

impl ShellCluster {
    pub fn new(runner: CommandRunner, templates: CommandTemplates) -> Self {
        Self { runner, templates }
    }

    pub fn from_config(config: &CampaignConfig) -> Self {
        Self::new(
            CommandRunner::new(config.shell.clone()),
            config.commands.clone(),
        )
    }

    fn run_for_cluster(&self, template: &str, cluster_id: &str) -> Result<bool> {
        let command = template.replace("{cluster}", cluster_id);
        Ok(self.runner.run(&command)?.success())
    }
}

impl Cluster for ShellCluster {
    fn stop_and_remove(&mut self, cluster_id: &str) -> Result<bool> {
        self.run_for_cluster(&self.templates.stop_and_remove, cluster_id)
    }

    fn upload_config(&mut self, cluster_id: &str) -> Result<bool> {
        self.run_for_cluster(&self.templates.upload_config, cluster_id)
    }

    fn deploy(&mut self, cluster_id: &str) -> Result<bool> {
        self.run_for_cluster(&self.templates.deploy, cluster_id)
    }

    fn run_publisher(&mut self, rate: u32, duration: Duration) -> Result<bool> {
        let command = render_publish(&self.templates.publish, rate, duration);
        Ok(self.runner.run(&command)?.success())
    }

    fn start_subscriber(&mut self, log_path: &Path) -> Result<Box<dyn SubscriberHandle>> {
        let process = self
            .runner
            .spawn_background(&self.templates.subscribe, log_path)?;
        Ok(Box::new(process))
    }
}

fn render_publish(template: &str, rate: u32, duration: Duration) -> String {
    template
        .replace("{rate}", &rate.to_string())
        .replace("{duration}", &duration.as_secs().to_string())
}
