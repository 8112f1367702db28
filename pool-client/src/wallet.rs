//! Signers and the wallet holding them

use crate::{
    types::{Identifier, Request},
    Error, Result,
};
use pool_ledger::crypto::KeyPair;
use std::{collections::BTreeMap, fmt, sync::Arc};

/// Signs requests for one identity
pub trait Signer: Send + Sync + fmt::Debug {
    /// Identity the signer signs as
    fn identifier(&self) -> &Identifier;

    /// Verification key (base58)
    fn verkey(&self) -> String;

    /// Sign bytes, returning a base58 signature
    fn sign(&self, message: &[u8]) -> String;

    /// Sign a request in place unless it already carries a signature
    fn sign_request(&self, request: &mut Request) -> Result<()> {
        if !request.is_signed() {
            let bytes = request.signing_bytes()?;
            request.signature = Some(self.sign(&bytes));
        }
        Ok(())
    }
}

/// Signer backed by an in-memory ed25519 key pair
#[derive(Debug)]
pub struct SimpleSigner {
    identifier: Identifier,
    keys: KeyPair,
}

impl SimpleSigner {
    /// Signer with a fresh random key
    pub fn new(identifier: impl Into<Identifier>) -> Self {
        Self {
            identifier: identifier.into(),
            keys: KeyPair::generate(),
        }
    }

    /// Signer with a deterministic key
    pub fn from_seed(identifier: impl Into<Identifier>, seed: &[u8; 32]) -> Self {
        Self {
            identifier: identifier.into(),
            keys: KeyPair::from_seed(seed),
        }
    }

    /// Signer whose identifier is its own verkey
    pub fn generate() -> Self {
        let keys = KeyPair::generate();
        Self {
            identifier: Identifier::new(keys.verkey()),
            keys,
        }
    }

    /// Check a signature made by this signer
    pub fn verify(&self, message: &[u8], signature: &str) -> Result<()> {
        Ok(self.keys.verify(message, signature)?)
    }
}

impl Signer for SimpleSigner {
    fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    fn verkey(&self) -> String {
        self.keys.verkey()
    }

    fn sign(&self, message: &[u8]) -> String {
        self.keys.sign(message)
    }
}

/// Named collection of signers
#[derive(Debug, Clone)]
pub struct Wallet {
    name: String,
    signers: BTreeMap<Identifier, Arc<dyn Signer>>,
    default_identifier: Option<Identifier>,
}

impl Wallet {
    /// Create empty wallet
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signers: BTreeMap::new(),
            default_identifier: None,
        }
    }

    /// Wallet name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a signer under its identifier
    pub fn add_signer(&mut self, signer: Arc<dyn Signer>) {
        let identifier = signer.identifier().clone();
        tracing::debug!("Wallet {} adding signer {}", self.name, identifier);
        self.signers.insert(identifier, signer);
    }

    /// Number of signers
    pub fn len(&self) -> usize {
        self.signers.len()
    }

    /// Check if wallet has no signers
    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }

    /// Identifier used when a caller does not name one
    pub fn default_identifier(&self) -> Option<&Identifier> {
        self.default_identifier.as_ref()
    }

    /// Set the default identifier
    pub fn set_default_identifier(&mut self, identifier: Identifier) {
        self.default_identifier = Some(identifier);
    }

    /// Identifiers in order
    pub fn identifiers(&self) -> impl Iterator<Item = &Identifier> {
        self.signers.keys()
    }

    /// Find the signer for an identifier (the default one when `None`)
    pub fn lookup_signer(&self, identifier: Option<&Identifier>) -> Result<Arc<dyn Signer>> {
        let identifier = identifier
            .or(self.default_identifier.as_ref())
            .ok_or_else(|| Error::NoSuchIdentity("<no default identifier>".to_string()))?;
        self.signers
            .get(identifier)
            .cloned()
            .ok_or_else(|| Error::NoSuchIdentity(identifier.to_string()))
    }
}

/// Convert a hex encoded verification key to its base58 cryptonym
pub fn hex_to_cryptonym(hex_verkey: &str) -> Result<String> {
    let bytes = hex::decode(hex_verkey)
        .map_err(|e| Error::InvalidArgument(format!("Invalid hex verkey: {}", e)))?;
    Ok(bs58::encode(bytes).into_string())
}
