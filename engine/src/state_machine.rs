//! The Tendermint-style round protocol: propose, prevote, precommit,
//! repeated each round until a block is decided.

use crate::event::{ConsensusEvent, ConsensusResponse};
use crate::message::{Message, PrecommitMsg, PrevoteMsg, ProposalMsg};
use crate::message_log::MessageLog;
use crate::misbehavior::{check_double_vote, describe, Misbehavior};
use crate::params::ConsensusParams;
use std::collections::BTreeSet;
use tallychain_common::{Block, BlockHash, Height, PubKey, Round, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Propose,
    Prevote,
    Precommit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Lock {
    round: Round,
    hash: BlockHash,
}

/// The immutable parameters of a single height's consensus instance:
/// the validator set (in proposer-selection order) and this node's
/// identity within it, if it participates.
#[derive(Debug, Clone)]
pub struct HeightInfo {
    pub height: Height,
    pub validators: Vec<PubKey>,
    pub this_node: Option<PubKey>,
    pub threshold: usize,
    pub params: ConsensusParams,
}

impl HeightInfo {
    fn proposer(&self, round: Round) -> &PubKey {
        let n = self.validators.len();
        &self.validators[(round as usize) % n]
    }

    fn is_proposer(&self, round: Round) -> bool {
        self.this_node.as_ref() == Some(self.proposer(round))
    }
}

/// The round-based voting state machine for a single height. Owns its
/// [`MessageLog`] exclusively; nothing outside this module mutates it.
pub struct StateMachine {
    height_info: HeightInfo,
    log: MessageLog,
    round: Round,
    step: Step,
    locked: Option<Lock>,
    valid: Option<Lock>,
    decision: Option<BlockHash>,
    waiting_for_proposal: bool,
    already_prevoted: BTreeSet<Round>,
    already_precommitted: BTreeSet<Round>,
    timeout_propose: Option<Timestamp>,
    timeout_prevote: Option<Timestamp>,
    timeout_precommit: Option<Timestamp>,
}

impl StateMachine {
    pub fn new(height_info: HeightInfo) -> Self {
        StateMachine {
            height_info,
            log: MessageLog::new(),
            round: 0,
            step: Step::Propose,
            locked: None,
            valid: None,
            decision: None,
            waiting_for_proposal: false,
            already_prevoted: BTreeSet::new(),
            already_precommitted: BTreeSet::new(),
            timeout_propose: None,
            timeout_prevote: None,
            timeout_precommit: None,
        }
    }

    pub fn height(&self) -> Height {
        self.height_info.height
    }

    pub fn round(&self) -> Round {
        self.round
    }

    pub fn decision(&self) -> Option<BlockHash> {
        self.decision
    }

    /// Read-only access to the journal, e.g. for diagnostics.
    pub fn message_log(&self) -> &MessageLog {
        &self.log
    }

    pub fn locked_round(&self) -> Option<Round> {
        self.locked.map(|l| l.round)
    }

    /// The round of the latest prevote quorum seen for a known block,
    /// regardless of whether it was this node's own current round when
    /// the quorum formed.
    pub fn valid_round(&self) -> Option<Round> {
        self.valid.map(|l| l.round)
    }

    /// The validator expected to propose `round`, per round-robin
    /// selection over the height's validator set. Used by the runtime
    /// to drop a proposal arriving from the wrong signer before it ever
    /// reaches [`Self::progress`].
    pub fn proposer(&self, round: Round) -> &PubKey {
        self.height_info.proposer(round)
    }

    pub fn is_proposer(&self, round: Round) -> bool {
        self.height_info.is_proposer(round)
    }

    /// Advances the state machine with the given event, returning the
    /// responses the runtime must act on. An empty vector means the
    /// event was processed but produced no side effect (e.g. a stale
    /// vote after the decision has already been made).
    pub fn progress(&mut self, event: ConsensusEvent) -> Vec<ConsensusResponse> {
        if self.decision.is_some() {
            return Vec::new();
        }
        match event {
            ConsensusEvent::Start { time } => self.start_round(0, time),
            ConsensusEvent::ProposalReceived {
                round,
                block,
                valid,
                invalid_txs,
                time,
            } => self.on_proposal_received(round, block, valid, invalid_txs, time),
            ConsensusEvent::ProposalCandidateReady { round, block, time } => {
                self.on_proposal_candidate_ready(round, block, time)
            }
            ConsensusEvent::PrevoteReceived {
                round,
                pubkey,
                hash,
                invalid_txs,
                time,
            } => self.on_prevote_received(round, pubkey, hash, invalid_txs, time),
            ConsensusEvent::PrecommitReceived {
                round,
                pubkey,
                hash,
                time,
            } => self.on_precommit_received(round, pubkey, hash, time),
            ConsensusEvent::Timer { time } => self.on_timer(time),
        }
    }

    fn start_round(&mut self, round: Round, time: Timestamp) -> Vec<ConsensusResponse> {
        self.round = round;
        self.step = Step::Propose;
        self.timeout_propose = None;
        self.timeout_prevote = None;
        self.timeout_precommit = None;

        if self.height_info.is_proposer(round) {
            if let Some(valid) = self.valid {
                if let Some(block) = self.log.get_candidate(&valid.hash).cloned() {
                    return vec![ConsensusResponse::BroadcastProposal { round, block }];
                }
            }
            self.waiting_for_proposal = true;
            let (exclude_txs, prefer_txs) = if round == 0 {
                (Vec::new(), Vec::new())
            } else {
                (
                    self.log.get_invalid_txs(round - 1, self.height_info.threshold),
                    self.log.get_valid_txs(round - 1, self.height_info.threshold),
                )
            };
            vec![ConsensusResponse::RequestProposal {
                round,
                exclude_txs,
                prefer_txs,
            }]
        } else {
            self.timeout_propose = Some(time + self.height_info.params.timeout_propose(round));
            Vec::new()
        }
    }

    fn on_proposal_candidate_ready(
        &mut self,
        round: Round,
        block: Block,
        _time: Timestamp,
    ) -> Vec<ConsensusResponse> {
        if !self.waiting_for_proposal || round != self.round {
            return Vec::new();
        }
        self.waiting_for_proposal = false;
        self.log.add_message(Message::Proposal(ProposalMsg {
            round,
            block: block.clone(),
        }));
        vec![ConsensusResponse::BroadcastProposal { round, block }]
    }

    fn on_proposal_received(
        &mut self,
        round: Round,
        block: Block,
        valid: bool,
        invalid_txs: BTreeSet<tallychain_common::TxHash>,
        time: Timestamp,
    ) -> Vec<ConsensusResponse> {
        let hash = block.hash();
        self.log.add_message(Message::Proposal(ProposalMsg {
            round,
            block: block.clone(),
        }));

        if round != self.round
            || !matches!(self.step, Step::Propose | Step::Prevote)
            || self.already_prevoted.contains(&round)
        {
            return Vec::new();
        }

        let justified = valid && self.proposal_is_justified(round, hash);
        self.already_prevoted.insert(round);
        self.step = Step::Prevote;
        self.timeout_propose = None;

        let (vote_hash, vote_invalid_txs) = if justified {
            (Some(hash), invalid_txs)
        } else {
            (None, BTreeSet::new())
        };
        let mut responses = vec![ConsensusResponse::BroadcastPrevote {
            round,
            hash: vote_hash,
            invalid_txs: vote_invalid_txs,
        }];
        responses.extend(self.arm_prevote_timeout(round, time));
        responses
    }

    /// The prevote justification rule: a node may prevote for `hash` if
    /// it holds no lock, holds a lock on the same value, or holds an
    /// older lock that a later-round prevote quorum justifies
    /// abandoning.
    fn proposal_is_justified(&self, round: Round, hash: BlockHash) -> bool {
        match self.locked {
            None => true,
            Some(l) if l.hash == hash => true,
            Some(l) if l.round < round => (l.round..round)
                .any(|r| self.log.has_prevote_quorum(r, Some(hash), self.height_info.threshold)),
            Some(_) => false,
        }
    }

    fn on_prevote_received(
        &mut self,
        round: Round,
        pubkey: PubKey,
        hash: Option<BlockHash>,
        invalid_txs: BTreeSet<tallychain_common::TxHash>,
        time: Timestamp,
    ) -> Vec<ConsensusResponse> {
        let mut responses = Vec::new();
        if let Some((first, second)) =
            check_double_vote(self.log.prevote_of(round, &pubkey), hash)
        {
            let misbehavior = Misbehavior::DoublePrevote {
                round,
                first,
                second,
            };
            log::warn!("{}", describe(&pubkey, &misbehavior));
            responses.push(ConsensusResponse::ViolationReport {
                violator: pubkey.clone(),
                description: describe(&pubkey, &misbehavior),
            });
        }
        self.log.add_message(Message::Prevote(PrevoteMsg {
            height: self.height_info.height,
            round,
            pubkey,
            hash,
            invalid_txs,
        }));

        // `valid` is the latest block (by round number) for which a
        // prevote quorum has been seen — not restricted to this node's
        // own current round, so a quorum this node only learns about
        // after its own round has moved on still gets recorded. Kept
        // monotonic in round, mirroring the canonical validRound
        // update rule, so an earlier round's quorum can never clobber
        // a later one already on file.
        if let Some(h) = hash {
            if self.log.get_candidate(&h).is_some()
                && self
                    .log
                    .has_prevote_quorum(round, Some(h), self.height_info.threshold)
                && self.valid.map_or(true, |v| v.round < round)
            {
                self.valid = Some(Lock { round, hash: h });
            }
        }

        if round != self.round {
            return responses;
        }

        responses.extend(self.arm_prevote_timeout(round, time));

        if let Some(h) = hash {
            if self.step == Step::Prevote
                && self.log.get_candidate(&h).is_some()
                && self
                    .log
                    .has_prevote_quorum(round, Some(h), self.height_info.threshold)
            {
                self.locked = Some(Lock { round, hash: h });
                responses.extend(self.enter_precommit(round, Some(h), time));
            }
        } else if self.step == Step::Prevote
            && self
                .log
                .has_prevote_quorum(round, None, self.height_info.threshold)
        {
            responses.extend(self.enter_precommit(round, None, time));
        }

        responses
    }

    fn arm_prevote_timeout(&mut self, round: Round, time: Timestamp) -> Vec<ConsensusResponse> {
        if self.step == Step::Prevote
            && self.timeout_prevote.is_none()
            && self.log.total_prevotes(round) >= self.height_info.threshold
        {
            self.timeout_prevote = Some(time + self.height_info.params.timeout_prevote(round));
        }
        Vec::new()
    }

    fn enter_precommit(
        &mut self,
        round: Round,
        hash: Option<BlockHash>,
        time: Timestamp,
    ) -> Vec<ConsensusResponse> {
        if self.already_precommitted.contains(&round) {
            return Vec::new();
        }
        self.already_precommitted.insert(round);
        self.step = Step::Precommit;
        self.timeout_prevote = None;
        self.timeout_precommit = Some(time + self.height_info.params.timeout_precommit(round));
        vec![ConsensusResponse::BroadcastPrecommit { round, hash }]
    }

    fn on_precommit_received(
        &mut self,
        round: Round,
        pubkey: PubKey,
        hash: Option<BlockHash>,
        time: Timestamp,
    ) -> Vec<ConsensusResponse> {
        let mut responses = Vec::new();
        if let Some((first, second)) =
            check_double_vote(self.log.precommit_of(round, &pubkey), hash)
        {
            let misbehavior = Misbehavior::DoublePrecommit {
                round,
                first,
                second,
            };
            log::warn!("{}", describe(&pubkey, &misbehavior));
            responses.push(ConsensusResponse::ViolationReport {
                violator: pubkey.clone(),
                description: describe(&pubkey, &misbehavior),
            });
        }
        self.log.add_message(Message::Precommit(PrecommitMsg {
            height: self.height_info.height,
            round,
            pubkey,
            hash,
        }));

        if self.decision.is_some() {
            return responses;
        }

        // A precommit quorum for a known block decides the height at
        // whatever round it forms — not gated on this node's own
        // current round. A node that is merely slow (e.g. it already
        // hit T_precommit and advanced past `round` before the quorum
        // was recorded) must still decide once the quorum is on file,
        // or it can get stuck forever once its honest peers move on to
        // the next height (spec §4.4 Ordering & tie-breaks: "A
        // precommit quorum for one block hash at round R is final for
        // the height").
        if let Some(h) = hash {
            if self.log.get_candidate(&h).is_some()
                && self
                    .log
                    .has_precommit_quorum(round, Some(h), self.height_info.threshold)
            {
                self.decision = Some(h);
                responses.push(ConsensusResponse::FinalizeBlock { block_hash: h });
                return responses;
            }
        } else if round == self.round
            && self
                .log
                .has_precommit_quorum(round, None, self.height_info.threshold)
        {
            responses.extend(self.advance_round(round + 1, time));
        }

        responses
    }

    fn on_timer(&mut self, time: Timestamp) -> Vec<ConsensusResponse> {
        let round = self.round;
        let mut responses = Vec::new();

        if self.step == Step::Propose {
            if let Some(deadline) = self.timeout_propose {
                if time >= deadline && !self.already_prevoted.contains(&round) {
                    self.timeout_propose = None;
                    self.already_prevoted.insert(round);
                    self.step = Step::Prevote;
                    responses.push(ConsensusResponse::BroadcastPrevote {
                        round,
                        hash: None,
                        invalid_txs: BTreeSet::new(),
                    });
                    responses.extend(self.arm_prevote_timeout(round, time));
                    return responses;
                }
            }
        }

        if self.step == Step::Prevote {
            if let Some(deadline) = self.timeout_prevote {
                if time >= deadline {
                    self.timeout_prevote = None;
                    responses.extend(self.enter_precommit(round, None, time));
                    return responses;
                }
            }
        }

        if self.step == Step::Precommit {
            if let Some(deadline) = self.timeout_precommit {
                if time >= deadline {
                    self.timeout_precommit = None;
                    responses.extend(self.advance_round(round + 1, time));
                }
            }
        }

        responses
    }

    fn advance_round(&mut self, next_round: Round, time: Timestamp) -> Vec<ConsensusResponse> {
        if next_round <= self.round {
            return Vec::new();
        }
        self.start_round(next_round, time)
    }
}
