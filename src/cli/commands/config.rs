use anyhow::Result;

use crate::config::SentinelConfig;

pub struct ConfigCommand;

impl ConfigCommand {
    pub fn execute(&self, config: &SentinelConfig) -> Result<()> {
        print!("{}", config.to_redacted_toml()?);
        Ok(())
    }
}
