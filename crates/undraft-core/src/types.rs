//! Strong type definitions for Undraft.
//!
//! Identifiers are newtypes so a package id is never confused with a file
//! name or a site id.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

use crate::error::CoreError;

/// A package identifier (the host's mod id).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageId(String);

impl PackageId {
    /// Create a package id, rejecting empty strings.
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        if id.is_empty() {
            return Err(CoreError::EmptyPackageId);
        }
        Ok(Self(id))
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PackageId({})", self.0)
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for PackageId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PackageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for PackageId {
    type Error = CoreError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl TryFrom<String> for PackageId {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<PackageId> for String {
    fn from(id: PackageId) -> Self {
        id.0
    }
}

/// Identifies one connecting session (or a transport endpoint).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub [u8; 8]);

impl SessionId {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Generate a random session id.
    pub fn random() -> Self {
        use rand::Rng;
        Self(rand::thread_rng().gen())
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(s).map_err(|e| CoreError::InvalidSessionId(e.to_string()))?;
        let arr: [u8; 8] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidSessionId(format!("expected 8 bytes: {s}")))?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.to_hex())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Which side of the connection needs a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackageSide {
    /// Runs on the server only.
    Server,
    /// Runs on the client only.
    Client,
    /// Runs on both sides; advertised in the identification.
    Universal,
}

impl PackageSide {
    pub fn is_universal(&self) -> bool {
        matches!(self, PackageSide::Universal)
    }
}

/// A package as reported by the host's package list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub id: PackageId,
    pub display_name: String,
    pub network_version: String,
    pub version: String,
    pub required_on_client: bool,
    pub side: PackageSide,
}

impl PackageDescriptor {
    /// A universal, client-required package with matching versions.
    pub fn universal(id: PackageId, version: impl Into<String>) -> Self {
        let version = version.into();
        Self {
            display_name: id.to_string(),
            id,
            network_version: version.clone(),
            version,
            required_on_client: true,
            side: PackageSide::Universal,
        }
    }

    /// Whether this package takes part in drafting (probed at startup).
    pub fn is_draft_candidate(&self, own_id: &str) -> bool {
        self.required_on_client && self.id.as_str() != own_id
    }
}

/// The host's identification packet, as far as the splice is concerned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identification {
    /// Human-readable server name.
    pub server_name: String,
    /// Advertised packages, in host order.
    pub packages: Vec<PackageDescriptor>,
}

impl Identification {
    /// Ids of the advertised packages, in order.
    pub fn package_ids(&self) -> Vec<&str> {
        self.packages.iter().map(|p| p.id.as_str()).collect()
    }

    /// Whether the identification advertises `id`.
    pub fn advertises(&self, id: &str) -> bool {
        self.packages.iter().any(|p| p.id.as_str() == id)
    }
}
