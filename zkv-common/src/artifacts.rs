//! JSON artifact storage.
//!
//! Artifacts live in one directory under fixed file names, one per role.
//! The pipeline is the only reader and writer, so there is no locking; writes
//! go through a temporary file and a rename so a reader never observes a
//! half-written artifact.

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::{MerklePathRecord, ProofBundle, VkeyHashRecord};

/// The fixed set of artifacts the pipeline reads or writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArtifactRole {
    VerificationKey,
    Proof,
    PublicSignals,
    AggregationRecord,
    VkeyHash,
}

impl ArtifactRole {
    pub const ALL: [ArtifactRole; 5] = [
        ArtifactRole::VerificationKey,
        ArtifactRole::Proof,
        ArtifactRole::PublicSignals,
        ArtifactRole::AggregationRecord,
        ArtifactRole::VkeyHash,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            ArtifactRole::VerificationKey => "verification_key.json",
            ArtifactRole::Proof => "proof.json",
            ArtifactRole::PublicSignals => "public.json",
            ArtifactRole::AggregationRecord => "aggregation.json",
            ArtifactRole::VkeyHash => "vkey.json",
        }
    }

    fn label(self) -> &'static str {
        match self {
            ArtifactRole::VerificationKey => "verification key",
            ArtifactRole::Proof => "proof",
            ArtifactRole::PublicSignals => "public signals",
            ArtifactRole::AggregationRecord => "aggregation record",
            ArtifactRole::VkeyHash => "vkey hash",
        }
    }
}

impl fmt::Display for ArtifactRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Artifact storage errors.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("{role} artifact not found at {}", .path.display())]
    NotFound { role: ArtifactRole, path: PathBuf },

    #[error("failed to read {role} artifact at {}: {source}", .path.display())]
    Read {
        role: ArtifactRole,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {role} artifact at {}: {source}", .path.display())]
    Parse {
        role: ArtifactRole,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode {role} artifact: {source}")]
    Encode {
        role: ArtifactRole,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write {role} artifact at {}: {source}", .path.display())]
    Write {
        role: ArtifactRole,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ArtifactError {
    pub fn role(&self) -> ArtifactRole {
        match self {
            ArtifactError::NotFound { role, .. }
            | ArtifactError::Read { role, .. }
            | ArtifactError::Parse { role, .. }
            | ArtifactError::Encode { role, .. }
            | ArtifactError::Write { role, .. } => *role,
        }
    }
}

/// Directory-backed artifact store.
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, role: ArtifactRole) -> PathBuf {
        self.dir.join(role.file_name())
    }

    pub fn exists(&self, role: ArtifactRole) -> bool {
        self.path(role).is_file()
    }

    /// Read an artifact as raw JSON.
    pub fn load(&self, role: ArtifactRole) -> Result<Value, ArtifactError> {
        self.load_as(role)
    }

    /// Read an artifact and deserialize it into `T`.
    pub fn load_as<T: DeserializeOwned>(&self, role: ArtifactRole) -> Result<T, ArtifactError> {
        let path = self.path(role);
        let bytes = fs::read(&path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ArtifactError::NotFound {
                    role,
                    path: path.clone(),
                }
            } else {
                ArtifactError::Read {
                    role,
                    path: path.clone(),
                    source,
                }
            }
        })?;
        serde_json::from_slice(&bytes).map_err(|source| ArtifactError::Parse {
            role,
            path,
            source,
        })
    }

    /// Write an artifact as pretty-printed JSON.
    pub fn save<T: Serialize + ?Sized>(
        &self,
        role: ArtifactRole,
        value: &T,
    ) -> Result<PathBuf, ArtifactError> {
        let json = serde_json::to_vec_pretty(value)
            .map_err(|source| ArtifactError::Encode { role, source })?;

        let path = self.path(role);
        let write_err = |source| ArtifactError::Write {
            role,
            path: path.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(write_err)?;
        let tmp = self.dir.join(format!(".{}.tmp", role.file_name()));
        fs::write(&tmp, json).map_err(write_err)?;
        if let Err(source) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(write_err(source));
        }

        debug!("wrote {} to {}", role, path.display());
        Ok(path)
    }

    /// Load the three proving artifacts. Fails on the first missing or
    /// malformed one.
    pub fn load_bundle(&self) -> Result<ProofBundle, ArtifactError> {
        Ok(ProofBundle {
            verification_key: self.load(ArtifactRole::VerificationKey)?,
            proof: self.load(ArtifactRole::Proof)?,
            public_signals: self.load(ArtifactRole::PublicSignals)?,
        })
    }

    pub fn load_record(&self) -> Result<MerklePathRecord, ArtifactError> {
        self.load_as(ArtifactRole::AggregationRecord)
    }

    pub fn save_record(&self, record: &MerklePathRecord) -> Result<PathBuf, ArtifactError> {
        self.save(ArtifactRole::AggregationRecord, record)
    }

    pub fn save_vkey_hash(&self, record: &VkeyHashRecord) -> Result<PathBuf, ArtifactError> {
        self.save(ArtifactRole::VkeyHash, record)
    }
}
