//! Pipeline driver.
//!
//! Loads the artifacts, runs the network phases and persists the result.
//! Outputs are only written once every phase has succeeded.

use tracing::info;
use zkv_common::{ArtifactRole, ArtifactStore, MerklePathRecord, VkeyHashRecord};

use crate::{
    config::RelayerConfig,
    error::RelayerError,
    session::{Connector, Credential, WsConnector},
    submitter::{SubmissionCoordinator, SubmissionSettings},
    vkey,
};

/// A configured relay run against one network.
pub struct Relayer<C> {
    connector: C,
    credential: Credential,
    settings: SubmissionSettings,
    store: ArtifactStore,
}

impl Relayer<WsConnector> {
    /// Relayer talking to the node described by `config`.
    pub fn from_config(config: RelayerConfig) -> Result<Self, RelayerError> {
        Relayer::new(
            WsConnector::new(config.session),
            config.credential,
            config.submission,
            ArtifactStore::new(config.artifact_dir),
        )
    }
}

impl<C: Connector> Relayer<C> {
    pub fn new(
        connector: C,
        credential: Credential,
        settings: SubmissionSettings,
        store: ArtifactStore,
    ) -> Result<Self, RelayerError> {
        if credential.is_empty() {
            return Err(RelayerError::Config("session credential is empty".into()));
        }
        Ok(Self {
            connector,
            credential,
            settings,
            store,
        })
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn settings(&self) -> &SubmissionSettings {
        &self.settings
    }

    /// Submit the proof bundle and write `aggregation.json`.
    ///
    /// The bundle is loaded before any session is opened, so a missing or
    /// malformed artifact costs no network round trip.
    pub async fn submit(&self) -> Result<MerklePathRecord, RelayerError> {
        let bundle = self.store.load_bundle()?;
        info!("Loaded proof bundle from {}", self.store.dir().display());

        let record = SubmissionCoordinator::new(&self.connector, &self.credential, &self.settings)
            .run(&bundle)
            .await?;

        let path = self.store.save_record(&record)?;
        info!(
            "Aggregation record for aggregation {} (domain {}) written to {}",
            record.aggregation_id,
            record.domain_id,
            path.display()
        );
        Ok(record)
    }

    /// Resolve the verification key hash and write `vkey.json`.
    pub async fn resolve_vkey_hash(&self) -> Result<String, RelayerError> {
        let verification_key = self.store.load(ArtifactRole::VerificationKey)?;
        let hash = vkey::resolve_vkey_hash(
            &self.connector,
            &self.credential,
            &verification_key,
            self.settings.proof_system,
        )
        .await?;

        let path = self.store.save_vkey_hash(&VkeyHashRecord { hash: hash.clone() })?;
        info!("Vkey hash written to {}", path.display());
        info!("Add to .env: ZKVERIFY_VKEY_HASH={}", hash);
        Ok(hash)
    }
}
