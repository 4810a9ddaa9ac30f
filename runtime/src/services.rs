//! The five capability traits the driver depends on. Each is a thin
//! `async_trait` seam so tests can substitute a deterministic fake (see
//! `tallychain-test-support`) instead of a real signer, transport,
//! chain, mempool, or validator.

use crate::error::Error;
use async_trait::async_trait;
use tallychain_common::{Block, Height, PubKey, Signature, Transaction};
use tallychain_engine::{PrecommitMsg, PrevoteMsg, ProposalMsg};

/// A signed envelope. The engine and the journal never look inside the
/// signature; only `Crypto::verify` (via `Validation`, upstream of the
/// queue) and the wire format care about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signed<T> {
    pub message: T,
    pub signer: PubKey,
    pub signature: Signature,
}

/// Signs this node's own outgoing messages. Never verifies anyone
/// else's signature — that is upstream of the queue, folded into
/// [`Validation`] or the network layer itself.
#[async_trait]
pub trait Crypto: Send + Sync {
    fn pubkey(&self) -> PubKey;
    fn sign_proposal(&self, msg: ProposalMsg) -> Signed<ProposalMsg>;
    fn sign_prevote(&self, msg: PrevoteMsg) -> Signed<PrevoteMsg>;
    fn sign_precommit(&self, msg: PrecommitMsg) -> Signed<PrecommitMsg>;
}

/// Broadcast primitives plus the current peer set.
/// A `broadcast_*` call only has to signal submission to the transport,
/// not delivery to any peer — delivery is the job of the gossip layer
/// underneath, and this node's own broadcasts loop back through the
/// same inbound path as everyone else's.
#[async_trait]
pub trait Network: Send + Sync {
    async fn broadcast_proposal(&self, msg: Signed<ProposalMsg>) -> Result<(), Error>;
    async fn broadcast_prevote(&self, msg: Signed<PrevoteMsg>) -> Result<(), Error>;
    async fn broadcast_precommit(&self, msg: Signed<PrecommitMsg>) -> Result<(), Error>;
    fn peers(&self) -> Vec<PubKey>;
}

/// The finalized chain this node is extending.
#[async_trait]
pub trait Chain: Send + Sync {
    async fn height(&self) -> Height;
    async fn threshold(&self) -> usize;
    async fn update(&self, block: Block) -> Result<(), Error>;
    async fn get_validators(&self) -> Vec<PubKey>;
    async fn is_validator(&self, pubkey: &PubKey) -> bool;
}

/// The pool of candidate transactions a proposer draws from. `get`
/// with `quantity = None` means "as many as fit"; callers that need a
/// cap pass `Some(n)`.
#[async_trait]
pub trait Mempool: Send + Sync {
    async fn get(&self, quantity: Option<usize>) -> Vec<Transaction>;
    async fn add(&self, tx: Transaction) -> bool;
    async fn rm(&self, tx: &Transaction) -> bool;
}

/// Stateless validity checks. Both methods are pure predicates over
/// their argument — no side effects, no access to chain state beyond
/// what the caller already resolved.
#[async_trait]
pub trait Validation: Send + Sync {
    async fn validate_tx(&self, tx: &Transaction) -> bool;
    async fn validate_block(&self, block: &Block) -> bool;
}
