//! The per-height journal of votes and proposals, plus the transaction
//! reputation tally that lets a later round's proposer build a
//! cleaned-up block body.

use crate::message::{Message, PrecommitMsg, PrevoteMsg, ProposalMsg};
use std::collections::BTreeMap;
use tallychain_common::{Block, BlockHash, PubKey, Round, TxHash};

/// Vote/commit identity is the pubkey alone: a validator contributes at
/// most one prevote and one precommit per round, regardless of target.
/// Keying the round's votes by `PubKey` directly — rather than a
/// custom-hashed set of `(pubkey, target)` pairs — gets this for free
/// and makes "duplicate pubkey" a plain `BTreeMap::insert` check.
type VotesAtRound = BTreeMap<PubKey, Option<BlockHash>>;
type TxTally = BTreeMap<TxHash, usize>;

/// Per-height accumulator of prevotes, precommits, and proposals, plus
/// the per-round transaction whitelist/blacklist tallies that let a
/// later round's proposer assemble a cleaned-up block body.
#[derive(Debug, Default, Clone)]
pub struct MessageLog {
    prevotes: BTreeMap<Round, VotesAtRound>,
    precommits: BTreeMap<Round, VotesAtRound>,
    proposals: BTreeMap<BlockHash, Block>,
    tx_whitelist: BTreeMap<Round, TxTally>,
    tx_blacklist: BTreeMap<Round, TxTally>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatches by message kind. Returns `true` when the message was
    /// newly recorded, `false` on duplicate.
    pub fn add_message(&mut self, message: Message) -> bool {
        match message {
            Message::Proposal(p) => self.add_proposal(p),
            Message::Prevote(p) => self.add_prevote(p),
            Message::Precommit(p) => self.add_precommit(p),
        }
    }

    /// Keyed by `block.hash()`; first-writer-wins.
    pub fn add_proposal(&mut self, proposal: ProposalMsg) -> bool {
        let hash = proposal.block.hash();
        if self.proposals.contains_key(&hash) {
            log::debug!("duplicate proposal for block {hash}");
            return false;
        }
        self.proposals.insert(hash, proposal.block);
        log::trace!("recorded proposal for block {hash}");
        true
    }

    /// Inserts into `precommits[round]`; duplicate pubkey is a no-op
    /// returning `false`.
    pub fn add_precommit(&mut self, precommit: PrecommitMsg) -> bool {
        let round_votes = self.precommits.entry(precommit.round).or_default();
        if round_votes.contains_key(&precommit.pubkey) {
            log::debug!(
                "duplicate precommit from {} at round {}",
                precommit.pubkey,
                precommit.round
            );
            return false;
        }
        round_votes.insert(precommit.pubkey, precommit.hash);
        true
    }

    /// Inserts into `prevotes[round]` and updates the per-round
    /// transaction reputation tallies.
    ///
    /// The five steps below are load-bearing and must run in this
    /// order: duplicate rejection happens before any tally update, so a
    /// rejected duplicate never perturbs the whitelist/blacklist.
    pub fn add_prevote(&mut self, prevote: PrevoteMsg) -> bool {
        // Step 1: lazily create the round's maps together — prevotes,
        // whitelist, and blacklist share the same round-key lifecycle.
        let round_votes = self.prevotes.entry(prevote.round).or_default();
        self.tx_whitelist.entry(prevote.round).or_default();
        self.tx_blacklist.entry(prevote.round).or_default();

        // Step 2: reject duplicate pubkeys without touching tallies.
        if round_votes.contains_key(&prevote.pubkey) {
            log::debug!(
                "duplicate prevote from {} at round {}",
                prevote.pubkey,
                prevote.round
            );
            return false;
        }

        // Step 3: blacklist every tx the voter flagged, whether or not
        // the vote targets a known block — nil prevotes still carry
        // opinions on a proposal's transactions.
        let blacklist = self.tx_blacklist.get_mut(&prevote.round).unwrap();
        for tx in &prevote.invalid_txs {
            *blacklist.entry(*tx).or_insert(0) += 1;
        }

        // Step 4: whitelist the target block's non-flagged transactions
        // only if we already know that block. A prevote arriving before
        // its proposal permanently loses its whitelist contribution —
        // we do not revisit this prevote once the proposal shows up.
        if let Some(hash) = prevote.hash {
            if let Some(block) = self.proposals.get(&hash) {
                let whitelist = self.tx_whitelist.get_mut(&prevote.round).unwrap();
                for tx in block.tx_hashes() {
                    if !prevote.invalid_txs.contains(&tx) {
                        *whitelist.entry(tx).or_insert(0) += 1;
                    }
                }
            }
        }

        // Step 5: record the vote.
        round_votes.insert(prevote.pubkey, prevote.hash);
        true
    }

    /// Total prevotes recorded at `round`, regardless of target. Used to
    /// arm the prevote timeout once enough prevotes of any mix have
    /// arrived to guarantee a quorum will eventually be reachable.
    pub fn total_prevotes(&self, round: Round) -> usize {
        self.prevotes.get(&round).map(|v| v.len()).unwrap_or(0)
    }

    pub fn count_prevotes_for(&self, round: Round, target: Option<BlockHash>) -> usize {
        self.prevotes
            .get(&round)
            .map(|votes| votes.values().filter(|t| **t == target).count())
            .unwrap_or(0)
    }

    pub fn count_precommits_for(&self, round: Round, target: Option<BlockHash>) -> usize {
        self.precommits
            .get(&round)
            .map(|votes| votes.values().filter(|t| **t == target).count())
            .unwrap_or(0)
    }

    pub fn has_prevote_quorum(&self, round: Round, target: Option<BlockHash>, threshold: usize) -> bool {
        self.count_prevotes_for(round, target) >= threshold
    }

    pub fn has_precommit_quorum(&self, round: Round, target: Option<BlockHash>, threshold: usize) -> bool {
        self.count_precommits_for(round, target) >= threshold
    }

    pub fn get_candidate(&self, hash: &BlockHash) -> Option<&Block> {
        self.proposals.get(hash)
    }

    /// The vote already on file for `pubkey` at `round`, if any. Used by
    /// the state machine to detect double-voting *before* handing the
    /// (rejected) duplicate to [`Self::add_prevote`].
    pub fn prevote_of(&self, round: Round, pubkey: &PubKey) -> Option<Option<BlockHash>> {
        self.prevotes.get(&round).and_then(|v| v.get(pubkey)).copied()
    }

    pub fn precommit_of(&self, round: Round, pubkey: &PubKey) -> Option<Option<BlockHash>> {
        self.precommits.get(&round).and_then(|v| v.get(pubkey)).copied()
    }

    /// Tx hashes whose blacklist count at `round` is `>= threshold`.
    pub fn get_invalid_txs(&self, round: Round, threshold: usize) -> Vec<TxHash> {
        self.tx_blacklist
            .get(&round)
            .map(|tally| {
                tally
                    .iter()
                    .filter(|(_, count)| **count >= threshold)
                    .map(|(tx, _)| *tx)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Tx hashes whose whitelist count at `round` is `>= threshold`.
    pub fn get_valid_txs(&self, round: Round, threshold: usize) -> Vec<TxHash> {
        self.tx_whitelist
            .get(&round)
            .map(|tally| {
                tally
                    .iter()
                    .filter(|(_, count)| **count >= threshold)
                    .map(|(tx, _)| *tx)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Discards every per-height map. Implemented as a fresh
    /// `MessageLog` rather than iterating-and-clearing each map, so no
    /// stale round entry from the previous height can survive.
    pub fn reset(&mut self) {
        *self = MessageLog::new();
    }
}
