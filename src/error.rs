use thiserror::Error;

/// Failure taxonomy shared by every stage of conflict analysis.
///
/// Each variant has a degraded fallback in the pipeline, so none of them
/// stops an event from producing a mergeability answer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SentinelError {
    #[error("Remote code host unavailable: {message}")]
    RemoteUnavailable { message: String },

    #[error("Mergeability of PR #{pull_request_id} unresolved after {attempts} attempts")]
    ResolutionTimeout { pull_request_id: u64, attempts: u32 },

    #[error("Local merge probe unavailable: {message}")]
    ProbeUnavailable { message: String },

    #[error("Conflict knowledge index unavailable: {message}")]
    IndexUnavailable { message: String },
}

impl SentinelError {
    pub fn remote(message: impl Into<String>) -> Self {
        Self::RemoteUnavailable {
            message: message.into(),
        }
    }

    pub fn probe(message: impl Into<String>) -> Self {
        Self::ProbeUnavailable {
            message: message.into(),
        }
    }

    pub fn index(message: impl Into<String>) -> Self {
        Self::IndexUnavailable {
            message: message.into(),
        }
    }
}
