//! zkv-relayer
//!
//! Submits a Groth16 proof to the zkVerify aggregation network, waits for the
//! aggregation that includes it and persists the Merkle path an on-chain
//! verifier needs.
//!
//! Phases of a run:
//! 1. Load the proof bundle from the artifact directory
//! 2. Submit on a fresh session, retrying transient faults
//! 3. Wait for the aggregation receipt
//! 4. Fetch the statement path and write `aggregation.json`

pub mod aggregation;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod submitter;
pub mod verify_args;
pub mod vkey;

pub use config::RelayerConfig;
pub use error::RelayerError;
pub use pipeline::Relayer;
pub use session::{Connector, Credential, Session, SessionConfig, SessionError, WsConnector};
pub use submitter::{RetryPolicy, SubmissionCoordinator, SubmissionSettings};
pub use verify_args::VerifyArgs;
