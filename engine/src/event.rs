use std::collections::BTreeSet;
use tallychain_common::{Block, BlockHash, PubKey, Round, Timestamp, TxHash};

/// An event that (potentially) triggers a state transition of
/// [`crate::StateMachine`].
///
/// There is no cryptography here, and no call out to `Validation` or
/// `Mempool` — it is the runtime's job to verify and refine raw wire
/// messages into this abstracted form before handing them to the
/// engine, which only ever sees already-validated inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusEvent {
    /// Starts the round-0 propose step for this height.
    Start { time: Timestamp },
    /// A round-R proposal was received and already checked by
    /// `Validation::validate_block`/`validate_tx` upstream.
    ProposalReceived {
        round: Round,
        block: Block,
        valid: bool,
        invalid_txs: BTreeSet<TxHash>,
        time: Timestamp,
    },
    /// The runtime finished assembling the block this node asked for
    /// via [`crate::ConsensusResponse::RequestProposal`].
    ProposalCandidateReady {
        round: Round,
        block: Block,
        time: Timestamp,
    },
    PrevoteReceived {
        round: Round,
        pubkey: PubKey,
        hash: Option<BlockHash>,
        invalid_txs: BTreeSet<TxHash>,
        time: Timestamp,
    },
    PrecommitReceived {
        round: Round,
        pubkey: PubKey,
        hash: Option<BlockHash>,
        time: Timestamp,
    },
    /// Time has passed; the state machine re-checks every armed timeout.
    Timer { time: Timestamp },
}

impl ConsensusEvent {
    pub fn time(&self) -> Timestamp {
        match self {
            ConsensusEvent::Start { time } => *time,
            ConsensusEvent::ProposalReceived { time, .. } => *time,
            ConsensusEvent::ProposalCandidateReady { time, .. } => *time,
            ConsensusEvent::PrevoteReceived { time, .. } => *time,
            ConsensusEvent::PrecommitReceived { time, .. } => *time,
            ConsensusEvent::Timer { time } => *time,
        }
    }
}

/// A response the engine emits for a given event, which the runtime
/// must act on (sign+broadcast, query the mempool, finalize, etc).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusResponse {
    /// This node is the proposer for `round` and has no ready value;
    /// asks the runtime to assemble one from the mempool, excluding
    /// `exclude_txs` and preferring `prefer_txs`.
    RequestProposal {
        round: Round,
        exclude_txs: Vec<TxHash>,
        prefer_txs: Vec<TxHash>,
    },
    BroadcastProposal { round: Round, block: Block },
    BroadcastPrevote {
        round: Round,
        hash: Option<BlockHash>,
        invalid_txs: BTreeSet<TxHash>,
    },
    BroadcastPrecommit {
        round: Round,
        hash: Option<BlockHash>,
    },
    FinalizeBlock { block_hash: BlockHash },
    ViolationReport { violator: PubKey, description: String },
}
