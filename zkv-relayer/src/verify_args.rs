//! Arguments for the on-chain `verifyProof` call.
//!
//! The verifier contract checks
//! `verifyProof(statementHash, aggregationId, domainId, merklePath, numberOfLeaves, leafIndex)`.
//! Everything it needs is in `aggregation.json` plus the first public signal.

use serde::Serialize;
use serde_json::{json, Value};
use zkv_common::{statement_hash, ArtifactRole, ArtifactStore, MerklePathRecord};

use crate::error::RelayerError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyArgs {
    /// Verifier contract address, when configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,
    pub statement_hash: String,
    pub aggregation_id: u64,
    pub domain_id: u32,
    pub merkle_path: Vec<String>,
    pub number_of_leaves: u64,
    pub leaf_index: u64,
}

impl VerifyArgs {
    pub fn new(
        record: MerklePathRecord,
        public_signals: &Value,
        contract: Option<String>,
    ) -> Result<Self, RelayerError> {
        let statement_hash = statement_hash(public_signals).ok_or_else(|| {
            RelayerError::InvalidArtifact("public signals carry no statement hash".into())
        })?;

        Ok(Self {
            contract,
            statement_hash,
            aggregation_id: record.aggregation_id,
            domain_id: record.domain_id,
            merkle_path: record.proof,
            number_of_leaves: record.number_of_leaves,
            leaf_index: record.leaf_index,
        })
    }

    /// Build from the artifacts a completed run left behind.
    pub fn load(store: &ArtifactStore, contract: Option<String>) -> Result<Self, RelayerError> {
        let record = store.load_record()?;
        let public_signals = store.load(ArtifactRole::PublicSignals)?;
        Self::new(record, &public_signals, contract)
    }

    /// Positional arguments in contract order.
    pub fn call_args(&self) -> Value {
        json!([
            self.statement_hash,
            self.aggregation_id,
            self.domain_id,
            self.merkle_path,
            self.number_of_leaves,
            self.leaf_index,
        ])
    }
}
