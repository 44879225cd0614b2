use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::index::ConflictKnowledgeIndex;
use crate::github::{DiffSource, MergedPullRequest};
use crate::types::ConflictRecord;

/// Counters reported at the end of a batch ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionSummary {
    pub pull_requests_seen: usize,
    pub pull_requests_failed: usize,
    pub records_ingested: usize,
    pub records_failed: usize,
    /// Page listings that failed; a failed listing ends enumeration
    pub pages_failed: usize,
}

/// Batch job that loads merged pull requests into the knowledge index.
///
/// Failures are per item: a pull request whose file list cannot be fetched,
/// or a record that cannot be stored, is logged and counted and the batch
/// moves on.
pub struct KnowledgeIngestor {
    source: Arc<dyn DiffSource>,
    index: Arc<ConflictKnowledgeIndex>,
    page_size: u8,
    max_pull_requests: usize,
}

impl KnowledgeIngestor {
    pub fn new(
        source: Arc<dyn DiffSource>,
        index: Arc<ConflictKnowledgeIndex>,
        page_size: u8,
        max_pull_requests: usize,
    ) -> Self {
        Self {
            source,
            index,
            page_size: page_size.clamp(1, 100),
            max_pull_requests,
        }
    }

    pub async fn run(&self) -> IngestionSummary {
        let mut summary = IngestionSummary::default();
        let mut page = 1;

        'pages: while summary.pull_requests_seen < self.max_pull_requests {
            let listing = match self
                .source
                .list_merged_pull_requests(self.page_size, page)
                .await
            {
                Ok(listing) => listing,
                Err(e) => {
                    warn!(page, error = %e, "Failed to list merged pull requests");
                    summary.pages_failed += 1;
                    break;
                }
            };

            for pull_request in listing.items {
                if summary.pull_requests_seen >= self.max_pull_requests {
                    break 'pages;
                }
                summary.pull_requests_seen += 1;
                self.ingest_pull_request(&pull_request, &mut summary).await;
            }

            match listing.next_page {
                Some(next) => page = next,
                None => break,
            }
        }

        info!(
            pull_requests = summary.pull_requests_seen,
            records = summary.records_ingested,
            failures = summary.pull_requests_failed + summary.records_failed,
            "Knowledge ingestion finished"
        );
        summary
    }

    async fn ingest_pull_request(
        &self,
        pull_request: &MergedPullRequest,
        summary: &mut IngestionSummary,
    ) {
        let files = match self.source.get_pull_request_files(pull_request.id).await {
            Ok(files) => files,
            Err(e) => {
                warn!(pr = pull_request.id, error = %e, "Failed to fetch pull request files");
                summary.pull_requests_failed += 1;
                return;
            }
        };

        for file in files {
            let record = ConflictRecord {
                source_pull_request_id: pull_request.id,
                file_path: file.filename,
                diff_patch_text: file.patch.unwrap_or_default(),
                merged_at: pull_request.merged_at,
            };

            match self.index.ingest(record).await {
                Ok(_) => summary.records_ingested += 1,
                Err(e) => {
                    warn!(pr = pull_request.id, error = %e, "Failed to ingest conflict record");
                    summary.records_failed += 1;
                }
            }
        }
    }
}
