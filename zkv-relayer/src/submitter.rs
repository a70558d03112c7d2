//! Submission coordinator.
//!
//! One attempt runs on one fresh session: submit, wait for inclusion, wait
//! for the aggregation, fetch the Merkle path. Only failures before the
//! statement is included are candidates for another attempt. Once the network
//! has handed back tracking identifiers the proof is on chain, and
//! resubmitting it would create a duplicate.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use zkv_common::{
    InclusionReceipt, MerklePathRecord, ProofBundle, ProofSystemConfig, SubmissionOutcome,
};

use crate::{
    aggregation::{get_statement_path, wait_for_aggregation},
    error::RelayerError,
    session::{Connector, Credential, Session, SessionError},
};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(5);
pub const DEFAULT_AGGREGATION_TIMEOUT: Duration = Duration::from_millis(900_000);

/// Bounded retry with a fixed pause between attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first. Always at least 1.
    pub max_attempts: u32,
    /// Pause before every attempt after the first.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Whether another attempt is allowed after `attempt` (1-based) failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_BACKOFF)
    }
}

/// Everything a run needs besides the connection itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionSettings {
    pub domain_id: u32,
    pub proof_system: ProofSystemConfig,
    pub retry: RetryPolicy,
    pub aggregation_timeout: Duration,
}

impl Default for SubmissionSettings {
    fn default() -> Self {
        Self {
            domain_id: 0,
            proof_system: ProofSystemConfig::default(),
            retry: RetryPolicy::default(),
            aggregation_timeout: DEFAULT_AGGREGATION_TIMEOUT,
        }
    }
}

/// How one attempt ended, before the retry decision.
enum AttemptError {
    /// Failed before inclusion; may be retried.
    Submission(SessionError),
    /// Failed after inclusion or with a protocol violation; never retried.
    Fatal(RelayerError),
}

/// Drives a proof through the network, retrying transient submission faults.
pub struct SubmissionCoordinator<'a, C> {
    connector: &'a C,
    credential: &'a Credential,
    settings: &'a SubmissionSettings,
}

impl<'a, C: Connector> SubmissionCoordinator<'a, C> {
    pub fn new(
        connector: &'a C,
        credential: &'a Credential,
        settings: &'a SubmissionSettings,
    ) -> Self {
        Self {
            connector,
            credential,
            settings,
        }
    }

    /// Run attempts until one yields a Merkle path record or a failure is
    /// final. Every session opened here is closed before this returns.
    pub async fn run(&self, bundle: &ProofBundle) -> Result<MerklePathRecord, RelayerError> {
        let policy = self.settings.retry;
        let mut attempt = 0;

        loop {
            attempt += 1;
            if attempt > 1 {
                debug!("Waiting {:?} before attempt {}", policy.backoff, attempt);
                sleep(policy.backoff).await;
            }
            info!(
                "Submission attempt {}/{} (domain {})",
                attempt, policy.max_attempts, self.settings.domain_id
            );

            let outcome = match self.connector.open(self.credential).await {
                Ok(mut session) => {
                    let outcome = self.attempt(&mut session, bundle).await;
                    session.close().await;
                    outcome
                }
                Err(e) => Err(AttemptError::Submission(e)),
            };

            let source = match outcome {
                Ok(record) => return Ok(record),
                Err(AttemptError::Fatal(e)) => {
                    error!("Attempt {} failed after submission: {}", attempt, e);
                    return Err(e);
                }
                Err(AttemptError::Submission(source)) => source,
            };

            let err = RelayerError::Submission { attempt, source };
            if err.is_retryable() && policy.should_retry(attempt) {
                warn!("{}; retrying", err);
                continue;
            }
            error!("{}", err);
            return Err(err);
        }
    }

    async fn attempt(
        &self,
        session: &mut C::Session,
        bundle: &ProofBundle,
    ) -> Result<MerklePathRecord, AttemptError> {
        let receipt = self.submit(session, bundle).await?;
        info!(
            "Statement {} included (aggregation {}, domain {})",
            receipt.statement, receipt.aggregation_id, receipt.domain_id
        );

        let aggregation = wait_for_aggregation(session, &receipt, self.settings.aggregation_timeout)
            .await
            .map_err(AttemptError::Fatal)?;
        info!(
            "Aggregation {} published in block {}",
            aggregation.aggregation_id, aggregation.block_hash
        );

        get_statement_path(session, &aggregation, &receipt)
            .await
            .map_err(AttemptError::Fatal)
    }

    /// Submit the bundle and extract its tracking identifiers.
    async fn submit(
        &self,
        session: &mut C::Session,
        bundle: &ProofBundle,
    ) -> Result<InclusionReceipt, AttemptError> {
        let outcome = session
            .submit_proof(bundle, self.settings.proof_system, self.settings.domain_id)
            .await
            .map_err(AttemptError::Submission)?;
        if let Some(tx) = &outcome.tx_hash {
            debug!("Submission transaction {}", tx);
        }

        let receipt = extract_receipt(outcome).map_err(AttemptError::Fatal)?;
        if receipt.domain_id != self.settings.domain_id {
            warn!(
                "Statement landed in domain {} instead of {}",
                receipt.domain_id, self.settings.domain_id
            );
        }
        Ok(receipt)
    }
}

/// Require the three identifiers needed to track an included statement.
///
/// The transaction has landed even when the receipt is incomplete, so the
/// error names whatever identifiers the network did send.
pub fn extract_receipt(outcome: SubmissionOutcome) -> Result<InclusionReceipt, RelayerError> {
    let landed = landed_identifiers(&outcome);
    let missing = |field: &str| {
        RelayerError::Protocol(format!(
            "inclusion receipt is missing {} (included as: {})",
            field, landed
        ))
    };

    let statement = outcome
        .statement
        .filter(|s| !s.is_empty())
        .ok_or_else(|| missing("statement"))?;
    let aggregation_id = outcome.aggregation_id.ok_or_else(|| missing("aggregationId"))?;
    let domain_id = outcome.domain_id.ok_or_else(|| missing("domainId"))?;

    Ok(InclusionReceipt {
        statement,
        aggregation_id,
        domain_id,
    })
}

fn landed_identifiers(outcome: &SubmissionOutcome) -> String {
    let mut parts = Vec::new();
    if let Some(tx) = &outcome.tx_hash {
        parts.push(format!("tx {}", tx));
    }
    if let Some(block) = &outcome.block_hash {
        parts.push(format!("block {}", block));
    }
    if let Some(statement) = outcome.statement.as_deref().filter(|s| !s.is_empty()) {
        parts.push(format!("statement {}", statement));
    }
    if let Some(id) = outcome.aggregation_id {
        parts.push(format!("aggregation {}", id));
    }
    if let Some(id) = outcome.domain_id {
        parts.push(format!("domain {}", id));
    }
    if parts.is_empty() {
        "no identifiers reported".to_string()
    } else {
        parts.join(", ")
    }
}
