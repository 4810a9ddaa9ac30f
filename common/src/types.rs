use crate::hash::{BlockHash, Hash256, PubKey, TxHash};
use serde::{Deserialize, Serialize};

/// A block height, monotonically increasing; the genesis block is at 0.
pub type Height = u64;
/// A round within a height; 0, 1, 2, ... until commit.
pub type Round = u64;
/// A UNIX timestamp measured in milliseconds.
pub type Timestamp = i64;
/// A validator's voting power.
pub type VotingPower = u64;

/// An opaque transaction payload plus its derivable identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub payload: Vec<u8>,
}

impl Transaction {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Transaction {
            payload: payload.into(),
        }
    }

    pub fn tx_hash(&self) -> TxHash {
        Hash256::hash(&self.payload)
    }
}

/// A block header. `hash` is content-derivable; it is recomputed by
/// `Block::compute_hash` and is the identity used throughout voting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub height: Height,
    pub proposer: PubKey,
    pub prev_hash: BlockHash,
    pub timestamp: Timestamp,
}

/// A proposed or finalized block: a header plus an ordered transaction
/// list. `header.hash` (computed, not stored, to keep the header/body
/// pair from going out of sync) is the identity used by `MessageLog`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Block {
            header,
            transactions,
        }
    }

    /// Derives this block's content hash; used as its identity in
    /// `MessageLog::proposals` and in every vote target.
    pub fn hash(&self) -> BlockHash {
        let mut h = Hash256::hash(format!(
            "{}:{}:{}",
            self.header.height, self.header.proposer, self.header.timestamp
        ));
        h = h.aggregate(&self.header.prev_hash);
        for tx in &self.transactions {
            h = h.aggregate(&tx.tx_hash());
        }
        h
    }

    pub fn tx_hashes(&self) -> impl Iterator<Item = TxHash> + '_ {
        self.transactions.iter().map(Transaction::tx_hash)
    }
}
