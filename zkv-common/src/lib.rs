//! Shared types for the zkVerify relay pipeline.
//!
//! Everything in here is plain data: the proof bundle read from disk, the
//! identifiers the aggregation network hands back while a proof travels
//! through it, and the Merkle path record that the on-chain verifier consumes.

pub mod artifacts;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use artifacts::{ArtifactError, ArtifactRole, ArtifactStore};

/// Proof, public signals and verification key as produced by the proving
/// toolchain. The schema of each value is opaque to the relay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofBundle {
    pub verification_key: Value,
    pub proof: Value,
    pub public_signals: Value,
}

impl ProofBundle {
    /// First public signal, which the verifier contract treats as the
    /// statement hash.
    pub fn statement_hash(&self) -> Option<String> {
        statement_hash(&self.public_signals)
    }
}

/// First entry of a public signals array, as a string.
pub fn statement_hash(public_signals: &Value) -> Option<String> {
    match public_signals.get(0)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Proof system accepted by the aggregation network.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofType {
    #[default]
    Groth16,
}

/// Library that produced the proof encoding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofLibrary {
    #[default]
    Snarkjs,
    Gnark,
}

/// Curve the proof is defined over.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurveType {
    #[default]
    Bn128,
    Bn254,
    Bls12381,
}

/// Selects the verifier on the remote network.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofSystemConfig {
    pub proof_type: ProofType,
    pub library: ProofLibrary,
    pub curve: CurveType,
}

/// Transaction info reported once a submitted proof lands in a block.
///
/// Every field is optional because this is what the network actually sent;
/// the submitter decides whether it is complete enough to track.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionOutcome {
    #[serde(default)]
    pub statement: Option<String>,
    #[serde(default)]
    pub aggregation_id: Option<u64>,
    #[serde(default)]
    pub domain_id: Option<u32>,
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default)]
    pub tx_hash: Option<String>,
}

/// Tracking identifiers of a statement accepted by the network.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InclusionReceipt {
    pub statement: String,
    pub aggregation_id: u64,
    pub domain_id: u32,
}

/// Notification that an aggregation has been finalized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationReceipt {
    pub domain_id: u32,
    pub aggregation_id: u64,
    /// Block in which the aggregation was published.
    pub block_hash: String,
    /// Aggregated root, when the network includes it.
    #[serde(default)]
    pub receipt: Option<String>,
}

impl AggregationReceipt {
    pub fn matches(&self, domain_id: u32, aggregation_id: u64) -> bool {
        self.domain_id == domain_id && self.aggregation_id == aggregation_id
    }
}

/// Merkle path of a statement inside an aggregation, as returned by the
/// network.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementPath {
    #[serde(default)]
    pub root: Option<String>,
    pub proof: Vec<String>,
    pub number_of_leaves: u64,
    pub leaf_index: u64,
    #[serde(default)]
    pub leaf: Option<String>,
}

/// The persisted aggregation record.
///
/// `proof`, `numberOfLeaves` and `leafIndex` are passed verbatim to the
/// verifier contract as the Merkle path, leaf count and leaf index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerklePathRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    pub proof: Vec<String>,
    pub number_of_leaves: u64,
    pub leaf_index: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaf: Option<String>,
    pub domain_id: u32,
    pub aggregation_id: u64,
}

impl MerklePathRecord {
    pub fn new(path: StatementPath, domain_id: u32, aggregation_id: u64) -> Self {
        Self {
            root: path.root,
            proof: path.proof,
            number_of_leaves: path.number_of_leaves,
            leaf_index: path.leaf_index,
            leaf: path.leaf,
            domain_id,
            aggregation_id,
        }
    }
}

/// Persisted verification key hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VkeyHashRecord {
    pub hash: String,
}
