//! Sessions with the aggregation network.
//!
//! A [`Connector`] opens authenticated [`Session`]s. A session is single-use:
//! once any call on it fails it is closed and dropped, and the next attempt
//! opens a fresh one. `close` must be called exactly once per opened session,
//! on every exit path.

mod auth;
mod ws;

pub use auth::Credential;
pub use ws::{WsConnector, WsSession};

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use url::Url;
use zkv_common::{
    AggregationReceipt, ProofBundle, ProofSystemConfig, StatementPath, SubmissionOutcome,
};

/// Error messages that mark a fault as transient even when the session layer
/// could not type it as a transport failure.
pub const TRANSIENT_MARKERS: [&str; 4] = [
    "Abnormal Closure",
    "No response received",
    "Timeout exceeded",
    "disconnected",
];

/// Session-level errors.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("submission rejected: {0}")]
    Rejected(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("session already closed")]
    Closed,
}

impl SessionError {
    /// Transport-level failure: the request may not have been processed and a
    /// fresh connection can succeed.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SessionError::Connect(_) | SessionError::Transport(_) | SessionError::Timeout(_)
        )
    }

    /// Whether a submission failing with this error may be attempted again on
    /// a new session.
    pub fn is_retryable(&self) -> bool {
        self.is_transport() || message_indicates_transient(&self.to_string())
    }
}

/// Fallback classification for errors reported as plain messages.
pub fn message_indicates_transient(message: &str) -> bool {
    TRANSIENT_MARKERS.iter().any(|marker| message.contains(marker))
}

/// Endpoint parameters shared by every session of a run.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// WebSocket endpoint of the network node.
    pub ws_url: Url,
    /// HTTP RPC endpoint of the same node.
    pub rpc_url: Url,
    /// Network name presented during authentication.
    pub network: String,
    /// Deadline for a response to any single request.
    pub request_timeout: Duration,
    /// Deadline for a submitted proof to be included in a block.
    pub inclusion_timeout: Duration,
}

/// Opens authenticated sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: Session;

    async fn open(&self, credential: &Credential) -> Result<Self::Session, SessionError>;
}

/// Capabilities of an open session.
#[async_trait]
pub trait Session: Send {
    /// Submit a proof and wait until it is included in a block.
    async fn submit_proof(
        &mut self,
        bundle: &ProofBundle,
        system: ProofSystemConfig,
        domain_id: u32,
    ) -> Result<SubmissionOutcome, SessionError>;

    /// Next aggregation published in `domain_id`. Receipts arrive in network
    /// order and may belong to any aggregation of the domain.
    async fn next_aggregation_receipt(
        &mut self,
        domain_id: u32,
    ) -> Result<AggregationReceipt, SessionError>;

    /// Merkle path of `statement` inside an aggregation published at
    /// `block_hash`.
    async fn statement_path(
        &mut self,
        block_hash: &str,
        domain_id: u32,
        aggregation_id: u64,
        statement: &str,
    ) -> Result<StatementPath, SessionError>;

    /// Hash identifying a verification key on the network.
    async fn vk_hash(
        &mut self,
        verification_key: &Value,
        system: ProofSystemConfig,
    ) -> Result<String, SessionError>;

    /// Release the connection. Idempotent and infallible.
    async fn close(&mut self);
}
