//! Mergeability resolution against GitHub's asynchronous computation.
//!
//! GitHub computes `mergeable` lazily after a branch update and answers
//! `null` until it is done. The resolver polls under an injected
//! [`RetryPolicy`] and never waits past the event deadline. An unresolved
//! signal becomes `Indeterminate`, which callers treat as "assume conflicting,
//! verify locally". A query still running at the deadline counts as a failed
//! attempt and ends polling.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::SentinelError;
use crate::github::DiffSource;
use crate::retry::{Clock, Deadline, RetryPolicy};
use crate::types::{MergeabilityReport, MergeabilityStatus};

#[async_trait]
pub trait MergeabilityCheck: Send + Sync {
    async fn resolve(
        &self,
        pull_request_id: u64,
        deadline: Deadline,
    ) -> Result<MergeabilityReport, SentinelError>;
}

pub struct MergeabilityResolver {
    source: Arc<dyn DiffSource>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl MergeabilityResolver {
    pub fn new(source: Arc<dyn DiffSource>, policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl MergeabilityCheck for MergeabilityResolver {
    async fn resolve(
        &self,
        pull_request_id: u64,
        deadline: Deadline,
    ) -> Result<MergeabilityReport, SentinelError> {
        let max_attempts = self.policy.attempts();
        let mut attempts = 0;
        // Whether the remote ever gave a valid (if Unknown) answer
        let mut answered = false;

        while attempts < max_attempts {
            attempts += 1;

            let query = self.source.get_pull_request(pull_request_id);
            let answer = match tokio::time::timeout(deadline.remaining(), query).await {
                Ok(answer) => answer,
                Err(_) => {
                    warn!(
                        pr = pull_request_id,
                        attempts, "Event deadline reached during mergeability query"
                    );
                    break;
                }
            };

            match answer {
                Ok(mergeability) => {
                    let status = mergeability.status();
                    if status != MergeabilityStatus::Unknown {
                        info!(
                            pr = pull_request_id,
                            %status,
                            attempts,
                            "Mergeability resolved"
                        );
                        return Ok(MergeabilityReport::new(status, self.clock.now(), attempts));
                    }
                    answered = true;
                    debug!(
                        pr = pull_request_id,
                        "Waiting for GitHub to determine mergeability... (attempt {}/{})",
                        attempts,
                        max_attempts
                    );
                }
                Err(err) => {
                    warn!(
                        pr = pull_request_id,
                        error = %err,
                        "Mergeability query failed (attempt {}/{})",
                        attempts,
                        max_attempts
                    );
                }
            }

            if attempts == max_attempts {
                break;
            }

            let delay = self.policy.delay_after(attempts);
            if delay >= deadline.remaining() {
                warn!(
                    pr = pull_request_id,
                    attempts, "Event deadline reached before mergeability resolved"
                );
                break;
            }
            self.clock.sleep(delay).await;
        }

        if answered {
            warn!(
                pr = pull_request_id,
                attempts, "Mergeability still unknown; reporting indeterminate"
            );
            Ok(MergeabilityReport::new(
                MergeabilityStatus::Indeterminate,
                self.clock.now(),
                attempts,
            ))
        } else {
            Err(SentinelError::ResolutionTimeout {
                pull_request_id,
                attempts,
            })
        }
    }
}
