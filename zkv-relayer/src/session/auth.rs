//! Session credential and challenge signing.

use std::fmt;

use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest, Sha256};

/// Secret seed used to authenticate sessions.
///
/// The ed25519 session key is `SHA-256(seed)`; the seed itself never leaves
/// the process.
#[derive(Clone)]
pub struct Credential {
    seed: String,
}

impl Credential {
    pub fn new(seed: impl Into<String>) -> Self {
        Self { seed: seed.into() }
    }

    pub fn is_empty(&self) -> bool {
        self.seed.trim().is_empty()
    }

    fn signing_key(&self) -> SigningKey {
        let secret: [u8; 32] = Sha256::digest(self.seed.trim().as_bytes()).into();
        SigningKey::from_bytes(&secret)
    }

    /// Hex-encoded public key presented as the account id.
    pub fn account_id(&self) -> String {
        hex::encode(self.signing_key().verifying_key().to_bytes())
    }

    /// Hex-encoded signature over a server challenge.
    pub fn sign_challenge(&self, challenge: &[u8]) -> String {
        hex::encode(self.signing_key().sign(challenge).to_bytes())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}
