//! Ed25519 identities of pool members
//!
//! Verkeys and signatures travel base58-encoded, the form they take inside
//! pool transactions and signed requests.

use crate::{Error, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

/// Signing identity: an ed25519 secret key and its verkey
#[derive(Debug, Clone)]
pub struct KeyPair {
    secret: SigningKey,
    verkey: VerifyingKey,
}

impl KeyPair {
    /// Fresh random identity
    pub fn generate() -> Self {
        Self::from_seed(&rand::random::<[u8; 32]>())
    }

    /// Deterministic identity from a 32 byte seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let secret = SigningKey::from_bytes(seed);
        Self {
            verkey: secret.verifying_key(),
            secret,
        }
    }

    /// Raw verkey bytes
    pub fn public_key(&self) -> [u8; 32] {
        self.verkey.to_bytes()
    }

    /// Base58 verkey
    pub fn verkey(&self) -> String {
        bs58::encode(self.public_key()).into_string()
    }

    /// Base58 signature over `message`
    pub fn sign(&self, message: &[u8]) -> String {
        bs58::encode(self.secret.sign(message).to_bytes()).into_string()
    }

    /// Check a base58 signature made by this identity
    pub fn verify(&self, message: &[u8], signature: &str) -> Result<()> {
        verify_signature(message, signature, &self.public_key())
    }
}

/// Check a base58 signature against raw verkey bytes
pub fn verify_signature(message: &[u8], signature: &str, verkey: &[u8; 32]) -> Result<()> {
    let raw: [u8; 64] = bs58::decode(signature)
        .into_vec()?
        .try_into()
        .map_err(|_| Error::SignatureError("Signature must be 64 bytes".to_string()))?;

    VerifyingKey::from_bytes(verkey)
        .map_err(|e| Error::SignatureError(format!("Invalid verkey: {}", e)))?
        .verify(message, &Signature::from_bytes(&raw))
        .map_err(|e| Error::SignatureError(format!("Verification failed: {}", e)))
}
