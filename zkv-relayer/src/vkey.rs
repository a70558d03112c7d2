//! Verification key hash resolution.

use serde_json::Value;
use tracing::debug;
use zkv_common::ProofSystemConfig;

use crate::{
    error::RelayerError,
    session::{Connector, Credential, Session},
};

/// Ask the network for the hash it uses to identify `verification_key`.
///
/// Single shot on a dedicated session, which is closed whether or not the
/// call succeeds.
pub async fn resolve_vkey_hash<C: Connector>(
    connector: &C,
    credential: &Credential,
    verification_key: &Value,
    system: ProofSystemConfig,
) -> Result<String, RelayerError> {
    let mut session = connector
        .open(credential)
        .await
        .map_err(RelayerError::Session)?;
    let result = session.vk_hash(verification_key, system).await;
    session.close().await;

    let hash = result.map_err(RelayerError::VkHash)?;
    let hash = hash.trim();
    if hash.is_empty() {
        return Err(RelayerError::Protocol("network returned an empty vkey hash".into()));
    }
    debug!("Resolved vkey hash {}", hash);
    Ok(hash.to_string())
}
