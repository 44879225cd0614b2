//! Conflict event pipeline
//!
//! One code path per event: resolve mergeability, probe locally when the
//! remote answer is conflicting or inconclusive, then annotate each
//! conflicting file with similar historical conflicts. Every stage failure
//! has a fallback, so an event always yields an answer.

use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Instrument};

use crate::config::SentinelConfig;
use crate::error::SentinelError;
use crate::events::PullRequestEvent;
use crate::git::{MergeProbe, ProbeOutcome, ProbeRequest, RepositoryRef};
use crate::github::{ChangedFile, DiffSource};
use crate::knowledge::ConflictLookup;
use crate::resolver::MergeabilityCheck;
use crate::retry::Deadline;
use crate::telemetry::{create_event_span, generate_correlation_id};
use crate::types::{
    diff_query_text, ConflictSet, ConflictSource, ConflictedFile, MergeabilityReport,
    MergeabilityStatus, SimilarConflict,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Budget for handling one event end to end
    pub event_deadline: Duration,
    /// Matches requested per conflicting file
    pub top_k: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            event_deadline: Duration::from_secs(300),
            top_k: 3,
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &SentinelConfig) -> Self {
        Self {
            event_deadline: Duration::from_secs(config.pipeline.event_deadline_secs),
            top_k: config.index.top_k,
        }
    }
}

/// Conflicts found for one pull request, with historical matches per file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictReport {
    pub pull_request_id: u64,
    pub mergeability: MergeabilityReport,
    pub source: ConflictSource,
    pub conflict_set: ConflictSet,
    /// Ranked matches keyed by conflicting file path
    pub matches: BTreeMap<String, Vec<SimilarConflict>>,
    /// Degradations that happened while building the report
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EventOutcome {
    Ignored {
        pull_request_id: u64,
        action: String,
    },
    Mergeable {
        pull_request_id: u64,
        mergeability: MergeabilityReport,
        /// True when the local probe overrode a conflicting or
        /// inconclusive remote answer
        verified_locally: bool,
    },
    Conflicts(ConflictReport),
}

impl EventOutcome {
    /// Conflicting files, empty unless the outcome is `Conflicts`.
    pub fn conflicting_files(&self) -> &[ConflictedFile] {
        match self {
            Self::Conflicts(report) => &report.conflict_set.files,
            _ => &[],
        }
    }
}

pub struct ConflictEventPipeline {
    resolver: Arc<dyn MergeabilityCheck>,
    prober: Arc<dyn MergeProbe>,
    lookup: Arc<dyn ConflictLookup>,
    source: Arc<dyn DiffSource>,
    repository: RepositoryRef,
    settings: PipelineSettings,
}

impl ConflictEventPipeline {
    pub fn new(
        resolver: Arc<dyn MergeabilityCheck>,
        prober: Arc<dyn MergeProbe>,
        lookup: Arc<dyn ConflictLookup>,
        source: Arc<dyn DiffSource>,
        repository: RepositoryRef,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            resolver,
            prober,
            lookup,
            source,
            repository,
            settings,
        }
    }

    /// Handle one event inside its own correlation span.
    pub async fn handle(&self, event: &PullRequestEvent) -> EventOutcome {
        let correlation_id = generate_correlation_id();
        let span = create_event_span(event.id, event.action.as_str(), &correlation_id);
        self.run(event).instrument(span).await
    }

    async fn run(&self, event: &PullRequestEvent) -> EventOutcome {
        if !event.action.triggers_analysis() {
            info!(action = %event.action, "Ignoring pull request event");
            return EventOutcome::Ignored {
                pull_request_id: event.id,
                action: event.action.to_string(),
            };
        }

        let deadline = Deadline::after(self.settings.event_deadline);
        let mut warnings = Vec::new();

        let resolved = within(
            deadline,
            "resolving mergeability",
            self.resolver.resolve(event.id, deadline),
        )
        .await
        .unwrap_or(Err(SentinelError::ResolutionTimeout {
            pull_request_id: event.id,
            attempts: 0,
        }));

        let mergeability = match resolved {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Treating unresolved mergeability as indeterminate");
                let attempts = match &e {
                    SentinelError::ResolutionTimeout { attempts, .. } => *attempts,
                    _ => 0,
                };
                warnings.push(e.to_string());
                MergeabilityReport::new(MergeabilityStatus::Indeterminate, Utc::now(), attempts)
            }
        };

        if !mergeability.status.requires_local_probe() {
            return EventOutcome::Mergeable {
                pull_request_id: event.id,
                mergeability,
                verified_locally: false,
            };
        }

        let request = ProbeRequest {
            repository: self.repository.clone(),
            pull_request_id: event.id,
            base_branch: event.base_ref.clone(),
            head_branch: event.head_ref.clone(),
        };

        let (source, conflict_set, files) = match self.prober.probe(&request, deadline).await {
            Ok(ProbeOutcome::NoConflict) => {
                info!(remote_status = %mergeability.status, "Local merge is clean; reporting mergeable");
                return EventOutcome::Mergeable {
                    pull_request_id: event.id,
                    mergeability,
                    verified_locally: true,
                };
            }
            Ok(ProbeOutcome::Conflicts(set)) => {
                let files = match self.changed_files(event.id, deadline).await {
                    Ok(files) => files,
                    Err(e) => {
                        warn!(error = %e, "Patches unavailable; querying by path only");
                        warnings.push(format!("patches unavailable: {e}"));
                        Vec::new()
                    }
                };
                (ConflictSource::LocalProbe, set, files)
            }
            Err(e) => {
                warn!(error = %e, "Falling back to remote conflict heuristic");
                warnings.push(e.to_string());
                match self.changed_files(event.id, deadline).await {
                    Ok(files) => {
                        let set = heuristic_conflict_set(event.id, &files);
                        (ConflictSource::RemoteHeuristic, set, files)
                    }
                    Err(e) => {
                        warn!(error = %e, "Changed files unavailable; reporting empty conflict set");
                        warnings.push(e.to_string());
                        (
                            ConflictSource::RemoteHeuristic,
                            ConflictSet::empty(event.id),
                            Vec::new(),
                        )
                    }
                }
            }
        };

        let matches = self
            .annotate(&conflict_set, &files, deadline, &mut warnings)
            .await;

        info!(
            source = ?source,
            files = conflict_set.len(),
            warnings = warnings.len(),
            "Conflict report ready"
        );

        EventOutcome::Conflicts(ConflictReport {
            pull_request_id: event.id,
            mergeability,
            source,
            conflict_set,
            matches,
            warnings,
        })
    }

    async fn changed_files(
        &self,
        pull_request_id: u64,
        deadline: Deadline,
    ) -> Result<Vec<ChangedFile>, SentinelError> {
        within(
            deadline,
            "fetching changed files",
            self.source.get_pull_request_files(pull_request_id),
        )
        .await
        .unwrap_or_else(|| Err(SentinelError::remote("event deadline reached while fetching changed files")))
    }

    async fn annotate(
        &self,
        conflict_set: &ConflictSet,
        files: &[ChangedFile],
        deadline: Deadline,
        warnings: &mut Vec<String>,
    ) -> BTreeMap<String, Vec<SimilarConflict>> {
        let patches: HashMap<&str, &str> = files
            .iter()
            .filter_map(|file| file.patch.as_deref().map(|patch| (file.filename.as_str(), patch)))
            .collect();

        let mut matches = BTreeMap::new();
        for file in &conflict_set.files {
            let text = diff_query_text(&file.path, patches.get(file.path.as_str()).copied());
            let query = self.lookup.similar_conflicts(&text, Some(self.settings.top_k));

            let found = match within(deadline, "querying the knowledge index", query).await {
                Some(Ok(found)) => found,
                Some(Err(e)) => {
                    warn!(path = %file.path, error = %e, "Knowledge index query failed");
                    warnings.push(format!("{}: {e}", file.path));
                    Vec::new()
                }
                None => {
                    warn!(path = %file.path, "Event deadline reached before knowledge index answered");
                    warnings.push(format!("{}: knowledge index query timed out", file.path));
                    Vec::new()
                }
            };
            matches.insert(file.path.clone(), found);
        }
        matches
    }
}

/// Run `future` within what is left of the deadline; `None` on expiry.
async fn within<T, F>(deadline: Deadline, stage: &str, future: F) -> Option<T>
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(deadline.remaining(), future).await {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(stage, "Stage cut short by event deadline");
            None
        }
    }
}

/// Remote over-approximation used when the local probe is unavailable:
/// every modified, renamed or removed file.
pub fn heuristic_conflict_set(pull_request_id: u64, files: &[ChangedFile]) -> ConflictSet {
    ConflictSet::new(
        pull_request_id,
        files
            .iter()
            .filter(|file| file.is_conflict_candidate())
            .map(ChangedFile::to_conflicted_file)
            .collect(),
    )
}
