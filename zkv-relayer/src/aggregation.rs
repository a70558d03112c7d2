//! Aggregation poller and statement path fetcher.

use std::time::Duration;

use tokio::time;
use tracing::debug;
use zkv_common::{AggregationReceipt, InclusionReceipt, MerklePathRecord, StatementPath};

use crate::{
    error::RelayerError,
    session::{Session, SessionError},
};

/// Block until the aggregation carrying `receipt` is published, or fail with
/// [`RelayerError::AggregationTimeout`] once `timeout` elapses. Receipts for
/// other aggregations are skipped.
pub async fn wait_for_aggregation<S: Session + ?Sized>(
    session: &mut S,
    receipt: &InclusionReceipt,
    timeout: Duration,
) -> Result<AggregationReceipt, RelayerError> {
    debug!(
        "Waiting up to {:?} for aggregation {} in domain {}",
        timeout, receipt.aggregation_id, receipt.domain_id
    );

    let wait = next_matching_receipt(session, receipt.domain_id, receipt.aggregation_id);
    match time::timeout(timeout, wait).await {
        Ok(Ok(aggregation)) => Ok(aggregation),
        Ok(Err(source)) => Err(RelayerError::Aggregation {
            statement: receipt.statement.clone(),
            domain_id: receipt.domain_id,
            aggregation_id: receipt.aggregation_id,
            source,
        }),
        Err(_) => Err(RelayerError::AggregationTimeout {
            statement: receipt.statement.clone(),
            domain_id: receipt.domain_id,
            aggregation_id: receipt.aggregation_id,
            timeout,
        }),
    }
}

async fn next_matching_receipt<S: Session + ?Sized>(
    session: &mut S,
    domain_id: u32,
    aggregation_id: u64,
) -> Result<AggregationReceipt, SessionError> {
    loop {
        let candidate = session.next_aggregation_receipt(domain_id).await?;
        if candidate.matches(domain_id, aggregation_id) {
            return Ok(candidate);
        }
        debug!(
            "Skipping aggregation {} in domain {}",
            candidate.aggregation_id, candidate.domain_id
        );
    }
}

/// Fetch and validate the Merkle path of the included statement.
pub async fn get_statement_path<S: Session + ?Sized>(
    session: &mut S,
    aggregation: &AggregationReceipt,
    receipt: &InclusionReceipt,
) -> Result<MerklePathRecord, RelayerError> {
    let path = session
        .statement_path(
            &aggregation.block_hash,
            receipt.domain_id,
            receipt.aggregation_id,
            &receipt.statement,
        )
        .await
        .map_err(|source| RelayerError::StatementPath {
            statement: receipt.statement.clone(),
            domain_id: receipt.domain_id,
            aggregation_id: receipt.aggregation_id,
            block_hash: aggregation.block_hash.clone(),
            source,
        })?;

    validate_path(&path).map_err(|reason| RelayerError::InvalidPath {
        statement: receipt.statement.clone(),
        domain_id: receipt.domain_id,
        aggregation_id: receipt.aggregation_id,
        block_hash: aggregation.block_hash.clone(),
        reason,
    })?;
    debug!(
        "Statement is leaf {} of {} ({} siblings)",
        path.leaf_index,
        path.number_of_leaves,
        path.proof.len()
    );
    Ok(MerklePathRecord::new(path, receipt.domain_id, receipt.aggregation_id))
}

/// Structural checks on a Merkle path. The hashes themselves are checked by
/// the verifier contract.
pub fn validate_path(path: &StatementPath) -> Result<(), String> {
    if path.number_of_leaves == 0 {
        return Err("statement path reports an empty aggregation".into());
    }
    if path.leaf_index >= path.number_of_leaves {
        return Err(format!(
            "leaf index {} out of range for {} leaves",
            path.leaf_index, path.number_of_leaves
        ));
    }
    let depth = tree_depth(path.number_of_leaves);
    if path.proof.len() as u64 > depth {
        return Err(format!(
            "path of {} hashes exceeds tree depth {} for {} leaves",
            path.proof.len(),
            depth,
            path.number_of_leaves
        ));
    }
    Ok(())
}

/// `ceil(log2(leaves))` for `leaves >= 1`.
fn tree_depth(leaves: u64) -> u64 {
    u64::from(u64::BITS - (leaves - 1).leading_zeros())
}
