use anyhow::{Context, Result};
use std::io::Read;

use super::print_json;
use crate::app;
use crate::config::SentinelConfig;
use crate::events::PullRequestEvent;

pub struct HandleEventCommand {
    /// File path, or `-` for stdin
    pub payload: String,
}

impl HandleEventCommand {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    async fn read_payload(&self) -> Result<String> {
        if self.payload == "-" {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read payload from stdin")?;
            Ok(buffer)
        } else {
            tokio::fs::read_to_string(&self.payload)
                .await
                .with_context(|| format!("Failed to read payload {}", self.payload))
        }
    }

    pub async fn execute(&self, config: &SentinelConfig) -> Result<()> {
        let payload = self.read_payload().await?;
        let event = PullRequestEvent::from_webhook_json(&payload)
            .context("Payload is not a pull_request webhook")?;

        let pipeline = app::build_pipeline(config).await?;
        let outcome = pipeline.handle(&event).await;

        print_json(&outcome)
    }
}
