use anyhow::Result;
use std::time::Duration;

use super::print_json;
use crate::app;
use crate::config::SentinelConfig;
use crate::git::{MergeProbe, ProbeRequest};
use crate::retry::Deadline;

pub struct ProbeCommand {
    pub base: String,
    pub head: String,
    pub pull_request_id: u64,
}

impl ProbeCommand {
    pub async fn execute(&self, config: &SentinelConfig) -> Result<()> {
        let prober = app::merge_prober(config);
        let request = ProbeRequest {
            repository: config.repository_ref(),
            pull_request_id: self.pull_request_id,
            base_branch: self.base.clone(),
            head_branch: self.head.clone(),
        };
        let deadline = Deadline::after(Duration::from_secs(config.pipeline.event_deadline_secs));

        let outcome = prober.probe(&request, deadline).await?;

        print_json(&outcome)
    }
}
