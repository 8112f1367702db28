//! Core types for the pool client

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of one configured replica
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaId(String);

impl ReplicaId {
    /// Create new replica ID
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReplicaId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Signer identity key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Create new identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identifier {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Identifier {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// Per-client request number; strictly increasing, never reused
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl RequestId {
    /// The id following this one
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Host and port of a replica stack
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostAddress {
    /// Host name or IP
    pub host: String,
    /// Port
    pub port: u16,
}

impl HostAddress {
    /// Create new address
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Client request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Identity the request is signed by
    pub identifier: Identifier,

    /// Request number
    #[serde(rename = "reqId")]
    pub req_id: RequestId,

    /// Operation payload
    pub operation: serde_json::Value,

    /// Base58 signature over the unsigned request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Request {
    /// Create unsigned request
    pub fn new(identifier: Identifier, req_id: RequestId, operation: serde_json::Value) -> Self {
        Self {
            identifier,
            req_id,
            operation,
            signature: None,
        }
    }

    /// Bytes covered by the signature (the request without its signature)
    pub fn signing_bytes(&self) -> crate::Result<Vec<u8>> {
        let unsigned = Request {
            signature: None,
            ..self.clone()
        };
        // Value maps are key-ordered, so this is deterministic
        let value = serde_json::to_value(&unsigned)?;
        Ok(serde_json::to_vec(&value)?)
    }

    /// Whether a signature is present
    pub fn is_signed(&self) -> bool {
        self.signature.as_deref().map_or(false, |s| !s.is_empty())
    }
}

/// Role of a new identity registered through the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Steward: may add nodes
    #[serde(rename = "STEWARD")]
    Steward,
    /// Ordinary user
    #[serde(rename = "USER")]
    User,
}

impl Role {
    /// Wire code
    pub fn code(&self) -> &'static str {
        match self {
            Role::Steward => "STEWARD",
            Role::User => "USER",
        }
    }
}
