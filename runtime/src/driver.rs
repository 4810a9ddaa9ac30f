//! Wires a [`StateMachine`] to the five external services: every
//! [`ConsensusResponse`] it emits becomes a concrete sign/broadcast/
//! mempool/chain call here, and every inbound wire message is resolved
//! into a [`ConsensusEvent`] before being handed back in.

use crate::error::Error;
use crate::queue::{InboundMessage, ProposalEnvelope, QueueHandle};
use crate::services::{Chain, Crypto, Mempool, Network, Validation};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use tallychain_common::{Block, BlockHash, BlockHeader, Height, Timestamp, TxHash};
use tallychain_engine::{ConsensusEvent, ConsensusResponse, HeightInfo, PrecommitMsg, PrevoteMsg, ProposalMsg, StateMachine};

/// Drives a single height's [`StateMachine`] to completion. One
/// `Driver` is discarded and a fresh one built for height + 1 once
/// [`Self::dispatch`] (or [`Self::start`]/[`Self::on_timer`]) returns
/// `Some(_)` — there is no in-place "advance height" path, mirroring
/// the state machine's own full-discard reset on commit.
pub struct Driver {
    state: StateMachine,
    prev_hash: BlockHash,
    crypto: Arc<dyn Crypto>,
    network: Arc<dyn Network>,
    chain: Arc<dyn Chain>,
    mempool: Arc<dyn Mempool>,
    validation: Arc<dyn Validation>,
    queue_handle: QueueHandle,
    finalized: Option<BlockHash>,
}

impl Driver {
    pub fn new(
        height_info: HeightInfo,
        prev_hash: BlockHash,
        crypto: Arc<dyn Crypto>,
        network: Arc<dyn Network>,
        chain: Arc<dyn Chain>,
        mempool: Arc<dyn Mempool>,
        validation: Arc<dyn Validation>,
        queue_handle: QueueHandle,
    ) -> Self {
        Driver {
            state: StateMachine::new(height_info),
            prev_hash,
            crypto,
            network,
            chain,
            mempool,
            validation,
            queue_handle,
            finalized: None,
        }
    }

    pub fn height(&self) -> Height {
        self.state.height()
    }

    pub fn decision(&self) -> Option<BlockHash> {
        self.state.decision()
    }

    pub fn finalized_block(&self) -> Option<&Block> {
        self.finalized
            .and_then(|hash| self.state.message_log().get_candidate(&hash))
    }

    /// Kicks off round 0. Must be called exactly once per height before
    /// any message is dispatched.
    pub async fn start(&mut self, time: Timestamp) -> Result<Option<BlockHash>, Error> {
        let responses = self.state.progress(ConsensusEvent::Start { time });
        self.process(responses, time).await
    }

    /// Re-checks every armed timeout, driven by the timeout scheduler.
    pub async fn on_timer(&mut self, time: Timestamp) -> Result<Option<BlockHash>, Error> {
        let responses = self.state.progress(ConsensusEvent::Timer { time });
        self.process(responses, time).await
    }

    /// Resolves a raw wire message into a [`ConsensusEvent`] — checking
    /// the sender is a known validator and, for proposals, that it is
    /// the expected proposer for that round — then feeds the engine.
    /// Returns `Ok(None)` both for "processed, no decision yet" and for
    /// "dropped before reaching the engine".
    pub async fn dispatch(
        &mut self,
        message: InboundMessage,
        time: Timestamp,
    ) -> Result<Option<BlockHash>, Error> {
        let event = match message {
            InboundMessage::Proposal(envelope) => match self.resolve_proposal(envelope, time).await {
                Some(event) => event,
                None => return Ok(None),
            },
            InboundMessage::Prevote(vote) => {
                if !self.chain.is_validator(&vote.pubkey).await {
                    log::debug!("dropping prevote from non-validator {}", vote.pubkey);
                    return Ok(None);
                }
                ConsensusEvent::PrevoteReceived {
                    round: vote.round,
                    pubkey: vote.pubkey,
                    hash: vote.hash,
                    invalid_txs: vote.invalid_txs,
                    time,
                }
            }
            InboundMessage::Precommit(vote) => {
                if !self.chain.is_validator(&vote.pubkey).await {
                    log::debug!("dropping precommit from non-validator {}", vote.pubkey);
                    return Ok(None);
                }
                ConsensusEvent::PrecommitReceived {
                    round: vote.round,
                    pubkey: vote.pubkey,
                    hash: vote.hash,
                    time,
                }
            }
        };
        let responses = self.state.progress(event);
        self.process(responses, time).await
    }

    async fn resolve_proposal(
        &self,
        envelope: ProposalEnvelope,
        time: Timestamp,
    ) -> Option<ConsensusEvent> {
        if !self.chain.is_validator(&envelope.proposer).await {
            log::debug!("dropping proposal from non-validator {}", envelope.proposer);
            return None;
        }
        if &envelope.proposer != self.state.proposer(envelope.round) {
            log::debug!(
                "dropping proposal from {}, not the expected proposer for round {}",
                envelope.proposer,
                envelope.round
            );
            return None;
        }
        let valid = self.validation.validate_block(&envelope.block).await;
        let mut invalid_txs = BTreeSet::new();
        for tx in &envelope.block.transactions {
            if !self.validation.validate_tx(tx).await {
                invalid_txs.insert(tx.tx_hash());
            }
        }
        Some(ConsensusEvent::ProposalReceived {
            round: envelope.round,
            block: envelope.block,
            valid,
            invalid_txs,
            time,
        })
    }

    /// Executes every response the engine emitted, in order, feeding any
    /// further responses produced along the way (e.g. a freshly
    /// assembled proposal) back through the same loop instead of
    /// recursing. Returns the finalized block hash once `FinalizeBlock`
    /// is processed.
    async fn process(
        &mut self,
        responses: Vec<ConsensusResponse>,
        time: Timestamp,
    ) -> Result<Option<BlockHash>, Error> {
        let mut work: VecDeque<ConsensusResponse> = responses.into();
        let mut finalized = None;

        while let Some(response) = work.pop_front() {
            match response {
                ConsensusResponse::RequestProposal {
                    round,
                    exclude_txs,
                    prefer_txs,
                } => {
                    let block = self.assemble_block(&exclude_txs, &prefer_txs, time).await;
                    let more = self
                        .state
                        .progress(ConsensusEvent::ProposalCandidateReady { round, block, time });
                    work.extend(more);
                }
                ConsensusResponse::BroadcastProposal { round, block } => {
                    let msg = ProposalMsg { round, block: block.clone() };
                    let signed = self.crypto.sign_proposal(msg);
                    if let Err(e) = self.network.broadcast_proposal(signed).await {
                        log::warn!("proposal broadcast failed: {e}");
                    }
                    self.queue_handle.push(InboundMessage::Proposal(ProposalEnvelope {
                        height: self.state.height(),
                        round,
                        block,
                        proposer: self.crypto.pubkey(),
                    }));
                }
                ConsensusResponse::BroadcastPrevote { round, hash, invalid_txs } => {
                    let msg = PrevoteMsg {
                        height: self.state.height(),
                        round,
                        pubkey: self.crypto.pubkey(),
                        hash,
                        invalid_txs,
                    };
                    let signed = self.crypto.sign_prevote(msg.clone());
                    if let Err(e) = self.network.broadcast_prevote(signed).await {
                        log::warn!("prevote broadcast failed: {e}");
                    }
                    self.queue_handle.push(InboundMessage::Prevote(msg));
                }
                ConsensusResponse::BroadcastPrecommit { round, hash } => {
                    let msg = PrecommitMsg {
                        height: self.state.height(),
                        round,
                        pubkey: self.crypto.pubkey(),
                        hash,
                    };
                    let signed = self.crypto.sign_precommit(msg.clone());
                    if let Err(e) = self.network.broadcast_precommit(signed).await {
                        log::warn!("precommit broadcast failed: {e}");
                    }
                    self.queue_handle.push(InboundMessage::Precommit(msg));
                }
                ConsensusResponse::FinalizeBlock { block_hash } => {
                    if let Some(prev) = self.finalized {
                        if prev != block_hash {
                            return Err(Error::FatalInvariantViolation(format!(
                                "height {} decided both {prev} and {block_hash}",
                                self.state.height()
                            )));
                        }
                    } else {
                        self.finalized = Some(block_hash);
                        if let Some(block) = self.state.message_log().get_candidate(&block_hash).cloned() {
                            self.chain.update(block).await?;
                        }
                    }
                    finalized = Some(block_hash);
                }
                ConsensusResponse::ViolationReport { violator, description } => {
                    log::warn!("byzantine behavior reported against {violator}: {description}");
                }
            }
        }

        Ok(finalized)
    }

    /// Assembles a block from the mempool, excluding and preferring the
    /// transaction hashes the engine named in `exclude_txs`/
    /// `prefer_txs`, derived from the previous round's reputation
    /// tally. Preferred transactions are placed first; this is an
    /// implementation choice — anything consistent satisfies the
    /// engine, which only reads hashes back out of whichever block it
    /// is handed.
    async fn assemble_block(
        &self,
        exclude_txs: &[TxHash],
        prefer_txs: &[TxHash],
        time: Timestamp,
    ) -> Block {
        let exclude: BTreeSet<TxHash> = exclude_txs.iter().copied().collect();
        let prefer: BTreeSet<TxHash> = prefer_txs.iter().copied().collect();

        let candidates = self.mempool.get(None).await;
        let mut preferred = Vec::new();
        let mut rest = Vec::new();
        for tx in candidates {
            let hash = tx.tx_hash();
            if exclude.contains(&hash) {
                continue;
            }
            if prefer.contains(&hash) {
                preferred.push(tx);
            } else {
                rest.push(tx);
            }
        }
        preferred.extend(rest);

        let header = BlockHeader {
            height: self.state.height(),
            proposer: self.crypto.pubkey(),
            prev_hash: self.prev_hash,
            timestamp: time,
        };
        Block::new(header, preferred)
    }
}
