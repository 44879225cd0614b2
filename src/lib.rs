// Merge Sentinel Library - merge conflict detection and conflict history search
// This exposes the core components for testing and integration

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod git;
pub mod github;
pub mod knowledge;
pub mod pipeline;
pub mod resolver;
pub mod retry;
pub mod telemetry;
pub mod types;

// Re-export key types for easy access
pub use config::SentinelConfig;
pub use error::SentinelError;
pub use events::{PullRequestAction, PullRequestEvent};
pub use git::{Git2MergeEngine, LocalMergeProber, MergeEngine, MergeProbe, ProbeOutcome, ProbeRequest, RepositoryRef};
pub use github::{DiffSource, GitHubClient, GitHubError};
pub use knowledge::{
    ConflictKnowledgeIndex, ConflictLookup, Embedder, HashingEmbedder, InMemoryVectorStore,
    IngestionSummary, KnowledgeIngestor, UnavailableIndex, VectorStore,
};
pub use pipeline::{ConflictEventPipeline, ConflictReport, EventOutcome, PipelineSettings};
pub use resolver::{MergeabilityCheck, MergeabilityResolver};
pub use retry::{Clock, Deadline, FakeClock, RetryPolicy, TokioClock};
pub use telemetry::{create_event_span, generate_correlation_id, init_telemetry};
pub use types::{
    ChangeKind, ConflictRecord, ConflictSet, ConflictSource, ConflictedFile, MergeabilityReport,
    MergeabilityStatus, SimilarConflict, VectorId,
};
