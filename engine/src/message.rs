use std::collections::BTreeSet;
use tallychain_common::{Block, BlockHash, Height, PubKey, Round, TxHash};

/// The proposer's broadcast block for a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalMsg {
    pub round: Round,
    pub block: Block,
}

/// A prevote, optionally carrying the voter's opinion on which
/// transactions in the target block are invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrevoteMsg {
    pub height: Height,
    pub round: Round,
    pub pubkey: PubKey,
    pub hash: Option<BlockHash>,
    pub invalid_txs: BTreeSet<TxHash>,
}

/// A precommit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecommitMsg {
    pub height: Height,
    pub round: Round,
    pub pubkey: PubKey,
    pub hash: Option<BlockHash>,
}

/// The tagged sum of the three wire message kinds that flow through a
/// single dispatch point: modeled as an enum, matched in the consumer,
/// no virtual dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Proposal(ProposalMsg),
    Prevote(PrevoteMsg),
    Precommit(PrecommitMsg),
}

impl Message {
    pub fn round(&self) -> Round {
        match self {
            Message::Proposal(p) => p.round,
            Message::Prevote(p) => p.round,
            Message::Precommit(p) => p.round,
        }
    }

    /// The height this message belongs to, if known. A `Proposal`
    /// carries no explicit height on the wire; the caller (the queue)
    /// is expected to know the height out-of-band, e.g. from the
    /// channel it arrived on.
    pub fn height(&self) -> Option<Height> {
        match self {
            Message::Proposal(_) => None,
            Message::Prevote(p) => Some(p.height),
            Message::Precommit(p) => Some(p.height),
        }
    }
}
