//! Inbound pull-request events.
//!
//! Events arrive as GitHub `pull_request` webhook payloads. Only the fields
//! the pipeline needs are read; everything else in the payload is ignored.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PullRequestAction {
    Opened,
    Synchronized,
    /// Any other webhook action; accepted and ignored
    Other(String),
}

impl PullRequestAction {
    pub fn triggers_analysis(&self) -> bool {
        matches!(self, Self::Opened | Self::Synchronized)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Opened => "opened",
            Self::Synchronized => "synchronized",
            Self::Other(action) => action,
        }
    }
}

impl From<&str> for PullRequestAction {
    fn from(action: &str) -> Self {
        match action {
            "opened" => Self::Opened,
            // GitHub sends "synchronize"
            "synchronize" | "synchronized" => Self::Synchronized,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for PullRequestAction {
    fn from(action: String) -> Self {
        Self::from(action.as_str())
    }
}

impl From<PullRequestAction> for String {
    fn from(action: PullRequestAction) -> Self {
        action.as_str().to_string()
    }
}

impl fmt::Display for PullRequestAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestEvent {
    pub id: u64,
    pub base_ref: String,
    pub head_ref: String,
    pub action: PullRequestAction,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    action: String,
    pull_request: WebhookPullRequest,
}

#[derive(Debug, Deserialize)]
struct WebhookPullRequest {
    number: u64,
    base: WebhookRef,
    head: WebhookRef,
}

#[derive(Debug, Deserialize)]
struct WebhookRef {
    #[serde(rename = "ref")]
    ref_name: String,
}

impl PullRequestEvent {
    pub fn new(
        id: u64,
        base_ref: impl Into<String>,
        head_ref: impl Into<String>,
        action: impl Into<PullRequestAction>,
    ) -> Self {
        Self {
            id,
            base_ref: base_ref.into(),
            head_ref: head_ref.into(),
            action: action.into(),
        }
    }

    /// Parse a GitHub `pull_request` webhook body.
    pub fn from_webhook_json(payload: &str) -> Result<Self, serde_json::Error> {
        let payload: WebhookPayload = serde_json::from_str(payload)?;
        Ok(Self {
            id: payload.pull_request.number,
            base_ref: payload.pull_request.base.ref_name,
            head_ref: payload.pull_request.head.ref_name,
            action: PullRequestAction::from(payload.action),
        })
    }
}
