use anyhow::Result;

use super::print_json;
use crate::app;
use crate::config::SentinelConfig;

pub struct SearchCommand {
    pub text: String,
    pub k: Option<usize>,
}

impl SearchCommand {
    pub async fn execute(&self, config: &SentinelConfig) -> Result<()> {
        let index = app::open_knowledge_index(config).await?;
        // Shell arguments carry a literal "\n" between the File and Diff lines
        let text = self.text.replace("\\n", "\n");
        let matches = index.query(&text, self.k).await?;

        print_json(&matches)
    }
}
