//! Identity types for ARMSYNC
//!
//! Peer identifiers are opaque strings handed out by the peer directory.
//! Session identifiers are 128-bit and derived deterministically from a
//! human-readable session name, so every peer that agrees on the name
//! lands in the same session.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Peer identity - stable for the lifetime of a participant's session
///
/// Ordering is byte-wise lexicographic on the underlying string. That
/// ordering carries no meaning beyond authority tie-breaking.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(Arc<str>);

impl PeerId {
    #[inline]
    pub fn new(id: impl AsRef<str>) -> Self {
        PeerId(Arc::from(id.as_ref()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl Default for PeerId {
    fn default() -> Self {
        PeerId(Arc::from(""))
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        PeerId::new(s)
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        PeerId(Arc::from(s))
    }
}

impl AsRef<str> for PeerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Peer({})", self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session identity - a shared broadcast scope
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SessionId(pub [u8; 16]);

impl SessionId {
    pub const ZERO: SessionId = SessionId([0u8; 16]);

    #[inline]
    pub fn new(bytes: [u8; 16]) -> Self {
        SessionId(bytes)
    }

    /// Derive a stable session id from a session name
    ///
    /// Uses the first 16 bytes of SHA-256 over the UTF-8 name.
    pub fn from_name(name: &str) -> Self {
        let digest = Sha256::digest(name.as_bytes());
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        SessionId(bytes)
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; 16] {
        self.0
    }

    /// Short join code shown to operators (first four bytes, hex)
    pub fn join_code(&self) -> String {
        self.0[..4].iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Session({})", self)
    }
}

impl fmt::Display for SessionId {
    /// Formats as a GUID: 8-4-4-4-12 hex groups
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        for (i, byte) in b.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
