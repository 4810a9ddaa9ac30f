use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::fmt;

/// A 32-byte cryptographic digest, used as the identity for both blocks
/// and transactions. Opaque beyond its byte content.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn hash(data: impl AsRef<[u8]>) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(data.as_ref());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Hash256(bytes)
    }

    /// Combines this hash with another, used to derive a block hash from
    /// its header fields without pulling in a full Merkle-tree crate.
    pub fn aggregate(&self, other: &Hash256) -> Hash256 {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(&self.0);
        buf.extend_from_slice(&other.0);
        Hash256::hash(buf)
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// A block's identity. May be absent — a "nil target" vote abstains
/// from any block. Absence is modeled as `Option<BlockHash>`, never as
/// a sentinel value.
pub type BlockHash = Hash256;

/// A transaction's identity.
pub type TxHash = Hash256;

/// An opaque validator identifier, unique per validator.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PubKey(pub Vec<u8>);

impl PubKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        PubKey(bytes.into())
    }
}

impl fmt::Debug for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

impl fmt::Display for PubKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}
