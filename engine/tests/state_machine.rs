//! Scenario tests for `StateMachine`, run from a single honest node's
//! perspective with the other validators' messages injected directly
//! (mirrors the upstream crate's inject-then-observe test style).

use std::collections::BTreeSet;
use tallychain_common::{Block, BlockHeader, PubKey, Transaction};
use tallychain_engine::{ConsensusEvent, ConsensusParams, ConsensusResponse, HeightInfo, StateMachine};

fn pubkey(i: u8) -> PubKey {
    PubKey::new(vec![i])
}

fn validators() -> Vec<PubKey> {
    vec![pubkey(0), pubkey(1), pubkey(2), pubkey(3)]
}

fn height_info(this_node: Option<PubKey>) -> HeightInfo {
    HeightInfo {
        height: 1,
        validators: validators(),
        this_node,
        threshold: 3,
        params: ConsensusParams::default(),
    }
}

fn block(proposer: PubKey, txs: Vec<Transaction>) -> Block {
    Block::new(
        BlockHeader {
            height: 1,
            proposer,
            prev_hash: tallychain_common::Hash256::hash(b"genesis"),
            timestamp: 0,
        },
        txs,
    )
}

/// Happy path: a valid proposal, a clean prevote quorum, a clean
/// precommit quorum, and a decision, observed from a non-proposer.
#[test]
fn happy_path_commits_when_precommit_quorum_forms() {
    let a = pubkey(0);
    let b = pubkey(1);
    let c = pubkey(2);
    let d = pubkey(3);
    let mut sm = StateMachine::new(height_info(Some(d.clone())));

    assert!(sm.progress(ConsensusEvent::Start { time: 0 }).is_empty());

    let tx1 = Transaction::new(b"tx1".to_vec());
    let tx2 = Transaction::new(b"tx2".to_vec());
    let b1 = block(a, vec![tx1, tx2]);
    let hash = b1.hash();

    let resp = sm.progress(ConsensusEvent::ProposalReceived {
        round: 0,
        block: b1,
        valid: true,
        invalid_txs: BTreeSet::new(),
        time: 10,
    });
    assert_eq!(
        resp,
        vec![ConsensusResponse::BroadcastPrevote {
            round: 0,
            hash: Some(hash),
            invalid_txs: BTreeSet::new(),
        }]
    );

    let mut saw_precommit_broadcast = false;
    for voter in [d.clone(), b.clone(), c.clone()] {
        let responses = sm.progress(ConsensusEvent::PrevoteReceived {
            round: 0,
            pubkey: voter,
            hash: Some(hash),
            invalid_txs: BTreeSet::new(),
            time: 11,
        });
        if responses.contains(&ConsensusResponse::BroadcastPrecommit {
            round: 0,
            hash: Some(hash),
        }) {
            saw_precommit_broadcast = true;
        }
    }
    assert!(saw_precommit_broadcast);
    assert_eq!(sm.locked_round(), Some(0));

    let mut decided = false;
    for voter in [d, b, c] {
        let responses = sm.progress(ConsensusEvent::PrecommitReceived {
            round: 0,
            pubkey: voter,
            hash: Some(hash),
            time: 12,
        });
        if responses.contains(&ConsensusResponse::FinalizeBlock { block_hash: hash }) {
            decided = true;
        }
    }
    assert!(decided);
    assert_eq!(sm.decision(), Some(hash));
}

/// A transaction flagged invalid by a quorum of prevotes in round
/// 0 is excluded from the block the round-1 proposer assembles, per
/// the tx-reputation tally. No prevote quorum forms on an actual block
/// hash in round 0 (every honest vote is nil but still carries an
/// opinion on the transaction), so `valid` stays nil and the round-1
/// proposer assembles a fresh block instead of re-proposing.
#[test]
fn tx_blacklist_carries_into_next_round_proposal() {
    let b = pubkey(1);
    let c = pubkey(2);
    let d = pubkey(3);
    let bad = Transaction::new(b"bad".to_vec());
    let bad_hash = bad.tx_hash();
    let mut sm = StateMachine::new(height_info(Some(b.clone())));

    assert!(sm.progress(ConsensusEvent::Start { time: 0 }).is_empty());
    // Nobody proposes before T_propose; the node moves itself to
    // Prevote and broadcasts nil, same as every other honest node.
    sm.progress(ConsensusEvent::Timer { time: 100_000 });

    let mut saw_nil_precommit = false;
    for voter in [b.clone(), c.clone(), d.clone()] {
        let responses = sm.progress(ConsensusEvent::PrevoteReceived {
            round: 0,
            pubkey: voter,
            hash: None,
            invalid_txs: BTreeSet::from([bad_hash]),
            time: 5,
        });
        if responses.contains(&ConsensusResponse::BroadcastPrecommit { round: 0, hash: None }) {
            saw_nil_precommit = true;
        }
    }
    assert!(saw_nil_precommit);
    assert_eq!(sm.message_log().get_invalid_txs(0, 3), vec![bad_hash]);

    let mut request_proposal = None;
    for voter in [b.clone(), c, d] {
        let responses = sm.progress(ConsensusEvent::PrecommitReceived {
            round: 0,
            pubkey: voter,
            hash: None,
            time: 6,
        });
        for r in responses {
            if let ConsensusResponse::RequestProposal { round, .. } = &r {
                if *round == 1 {
                    request_proposal = Some(r);
                }
            }
        }
    }

    match request_proposal.expect("b is the round-1 proposer and should request a block") {
        ConsensusResponse::RequestProposal { round, exclude_txs, .. } => {
            assert_eq!(round, 1);
            assert_eq!(exclude_txs, vec![bad_hash]);
        }
        _ => unreachable!(),
    }
    assert!(sm.locked_round().is_none());
}

/// The proposer fails to propose within `T_propose`; a nil
/// prevote quorum follows and the round advances with `locked`/`valid`
/// still nil.
#[test]
fn propose_timeout_then_nil_quorum_advances_round() {
    let b = pubkey(1);
    let c = pubkey(2);
    let d = pubkey(3);
    let mut sm = StateMachine::new(height_info(Some(d.clone())));

    sm.progress(ConsensusEvent::Start { time: 0 });
    let timeout_responses = sm.progress(ConsensusEvent::Timer { time: 100_000 });
    assert_eq!(
        timeout_responses,
        vec![ConsensusResponse::BroadcastPrevote {
            round: 0,
            hash: None,
            invalid_txs: BTreeSet::new(),
        }]
    );

    for voter in [d.clone(), b.clone(), c.clone()] {
        sm.progress(ConsensusEvent::PrevoteReceived {
            round: 0,
            pubkey: voter,
            hash: None,
            invalid_txs: BTreeSet::new(),
            time: 100_100,
        });
    }

    for voter in [d, b, c] {
        sm.progress(ConsensusEvent::PrecommitReceived {
            round: 0,
            pubkey: voter,
            hash: None,
            time: 100_200,
        });
    }

    assert_eq!(sm.round(), 1);
    assert!(sm.locked_round().is_none());
    assert!(sm.decision().is_none());
}

/// A locked node refuses a conflicting proposal that carries no
/// later-round quorum justification, and prevotes nil instead.
#[test]
fn locked_node_refuses_unjustified_conflicting_proposal() {
    let a = pubkey(0);
    let b = pubkey(1);
    let c = pubkey(2);
    let d = pubkey(3);
    let mut sm = StateMachine::new(height_info(Some(d.clone())));

    sm.progress(ConsensusEvent::Start { time: 0 });
    let tx = Transaction::new(b"tx1".to_vec());
    let b1 = block(a.clone(), vec![tx]);
    let hash_aa = b1.hash();
    sm.progress(ConsensusEvent::ProposalReceived {
        round: 0,
        block: b1,
        valid: true,
        invalid_txs: BTreeSet::new(),
        time: 1,
    });
    for voter in [d.clone(), b.clone(), c.clone()] {
        sm.progress(ConsensusEvent::PrevoteReceived {
            round: 0,
            pubkey: voter,
            hash: Some(hash_aa),
            invalid_txs: BTreeSet::new(),
            time: 2,
        });
    }
    assert_eq!(sm.locked_round(), Some(0));

    // Precommit quorum never forms: only 2 land, then T_precommit fires.
    for voter in [d.clone(), b.clone()] {
        sm.progress(ConsensusEvent::PrecommitReceived {
            round: 0,
            pubkey: voter,
            hash: Some(hash_aa),
            time: 3,
        });
    }
    sm.progress(ConsensusEvent::Timer { time: 1_000_000 });
    assert_eq!(sm.round(), 1);
    assert_eq!(sm.locked_round(), Some(0)); // P6: locked round survives the advance.

    let bb = block(b, vec![Transaction::new(b"other".to_vec())]);
    let resp = sm.progress(ConsensusEvent::ProposalReceived {
        round: 1,
        block: bb,
        valid: true,
        invalid_txs: BTreeSet::new(),
        time: 1_000_001,
    });
    assert_eq!(
        resp[0],
        ConsensusResponse::BroadcastPrevote {
            round: 1,
            hash: None,
            invalid_txs: BTreeSet::new(),
        }
    );
}

/// Safety across nodes: two honest state machines, differing only
/// in which validator they are, reach the identical decision when fed
/// the identical message sequence. Decision logic never reads
/// `this_node`, so this mostly guards against that staying true.
#[test]
fn two_nodes_fed_the_same_messages_decide_the_same_block() {
    let a = pubkey(0);
    let b = pubkey(1);
    let c = pubkey(2);
    let d = pubkey(3);

    let mut sm_c = StateMachine::new(height_info(Some(c.clone())));
    let mut sm_d = StateMachine::new(height_info(Some(d.clone())));

    for sm in [&mut sm_c, &mut sm_d] {
        sm.progress(ConsensusEvent::Start { time: 0 });
    }

    let b1 = block(a, vec![Transaction::new(b"tx1".to_vec())]);
    let hash = b1.hash();
    for sm in [&mut sm_c, &mut sm_d] {
        sm.progress(ConsensusEvent::ProposalReceived {
            round: 0,
            block: b1.clone(),
            valid: true,
            invalid_txs: BTreeSet::new(),
            time: 1,
        });
    }

    for voter in [a.clone(), b.clone(), c.clone(), d.clone()] {
        for sm in [&mut sm_c, &mut sm_d] {
            sm.progress(ConsensusEvent::PrevoteReceived {
                round: 0,
                pubkey: voter.clone(),
                hash: Some(hash),
                invalid_txs: BTreeSet::new(),
                time: 2,
            });
        }
    }
    for voter in [a, b, c, d] {
        for sm in [&mut sm_c, &mut sm_d] {
            sm.progress(ConsensusEvent::PrecommitReceived {
                round: 0,
                pubkey: voter.clone(),
                hash: Some(hash),
                time: 3,
            });
        }
    }

    assert_eq!(sm_c.decision(), Some(hash));
    assert_eq!(sm_c.decision(), sm_d.decision());
}

/// `locked.round` never decreases across a height, tracked
/// through two separate round advances.
#[test]
fn locked_round_never_decreases_across_round_advances() {
    let a = pubkey(0);
    let b = pubkey(1);
    let c = pubkey(2);
    let d = pubkey(3);
    let mut sm = StateMachine::new(height_info(Some(d.clone())));
    sm.progress(ConsensusEvent::Start { time: 0 });

    assert_eq!(sm.locked_round(), None);

    let b1 = block(a, vec![Transaction::new(b"tx1".to_vec())]);
    let hash = b1.hash();
    sm.progress(ConsensusEvent::ProposalReceived {
        round: 0,
        block: b1,
        valid: true,
        invalid_txs: BTreeSet::new(),
        time: 1,
    });
    for voter in [d.clone(), b.clone(), c.clone()] {
        sm.progress(ConsensusEvent::PrevoteReceived {
            round: 0,
            pubkey: voter,
            hash: Some(hash),
            invalid_txs: BTreeSet::new(),
            time: 2,
        });
    }
    let first_lock = sm.locked_round();
    assert_eq!(first_lock, Some(0));

    // Round advances without a second lock being set (no new quorum).
    for voter in [d, b] {
        sm.progress(ConsensusEvent::PrecommitReceived {
            round: 0,
            pubkey: voter,
            hash: Some(hash),
            time: 3,
        });
    }
    sm.progress(ConsensusEvent::Timer { time: 1_000_000 });
    assert!(sm.locked_round() >= first_lock);
}

/// A node that times out waiting for the third precommit and advances
/// to the next round still decides once that precommit finally
/// arrives: a precommit quorum is final for the height at whatever
/// round it completes, independent of this node's own current round.
#[test]
fn late_precommit_decides_even_after_this_node_advanced_past_its_round() {
    let a = pubkey(0);
    let b = pubkey(1);
    let c = pubkey(2);
    let d = pubkey(3);
    let mut sm = StateMachine::new(height_info(Some(d.clone())));

    sm.progress(ConsensusEvent::Start { time: 0 });
    let b1 = block(a, vec![Transaction::new(b"tx1".to_vec())]);
    let hash = b1.hash();
    sm.progress(ConsensusEvent::ProposalReceived {
        round: 0,
        block: b1,
        valid: true,
        invalid_txs: BTreeSet::new(),
        time: 1,
    });
    for voter in [d.clone(), b.clone(), c.clone()] {
        sm.progress(ConsensusEvent::PrevoteReceived {
            round: 0,
            pubkey: voter,
            hash: Some(hash),
            invalid_txs: BTreeSet::new(),
            time: 2,
        });
    }
    assert_eq!(sm.locked_round(), Some(0));

    // Only two of the three precommits needed for quorum land before
    // this node gives up on round 0 and moves to round 1.
    for voter in [d, b] {
        sm.progress(ConsensusEvent::PrecommitReceived {
            round: 0,
            pubkey: voter,
            hash: Some(hash),
            time: 3,
        });
    }
    sm.progress(ConsensusEvent::Timer { time: 1_000_000 });
    assert_eq!(sm.round(), 1);
    assert!(sm.decision().is_none());

    // The third precommit for round 0 shows up late, after this node
    // has already moved on — it must still complete the quorum and
    // decide, rather than being silently recorded and ignored.
    let resp = sm.progress(ConsensusEvent::PrecommitReceived {
        round: 0,
        pubkey: c,
        hash: Some(hash),
        time: 1_000_001,
    });
    assert!(resp.contains(&ConsensusResponse::FinalizeBlock { block_hash: hash }));
    assert_eq!(sm.decision(), Some(hash));
}

/// A round-0 prevote quorum that this node only learns about after its
/// own round has advanced past 0 still updates `valid`: the glossary
/// defines valid value as "the latest block for which the validator
/// has seen a prevote quorum", with no restriction to the current
/// round.
#[test]
fn late_prevote_quorum_updates_valid_value_after_round_advanced() {
    let a = pubkey(0);
    let b = pubkey(1); // this node; proposer for round 1.
    let c = pubkey(2);
    let d = pubkey(3);
    let mut sm = StateMachine::new(height_info(Some(b.clone())));

    sm.progress(ConsensusEvent::Start { time: 0 });
    let b1 = block(a.clone(), vec![Transaction::new(b"tx1".to_vec())]);
    let hash = b1.hash();
    sm.progress(ConsensusEvent::ProposalReceived {
        round: 0,
        block: b1,
        valid: true,
        invalid_txs: BTreeSet::new(),
        time: 1,
    });
    assert_eq!(sm.valid_round(), None);

    // c and d prevote the block; a prevotes nil. Three total prevotes
    // arms T_prevote, but no single target reaches the threshold-3
    // quorum yet (2 for the hash, 1 nil) — this node's own prevote
    // (for the hash, per the proposal it just validated) is not
    // injected here, simulating the driver not having echoed it back
    // into the log before the timeout fires.
    for (voter, target) in [(c.clone(), Some(hash)), (d, Some(hash)), (a, None)] {
        sm.progress(ConsensusEvent::PrevoteReceived {
            round: 0,
            pubkey: voter,
            hash: target,
            invalid_txs: BTreeSet::new(),
            time: 2,
        });
    }

    // T_prevote elapses: no quorum yet, so this node broadcasts a nil
    // precommit and moves to the Precommit step.
    sm.progress(ConsensusEvent::Timer { time: 10_000 });
    // T_precommit then elapses with no precommit quorum either,
    // advancing the round.
    sm.progress(ConsensusEvent::Timer { time: 1_000_000 });
    assert_eq!(sm.round(), 1);
    assert_eq!(sm.valid_round(), None);

    // The third and final round-0 prevote — this node's own, for the
    // hash — arrives late, after the round has already moved on. It
    // completes a round-0 hash quorum (c, d, and this node) that this
    // node must still recognize as a valid value even though it is no
    // longer in round 0.
    sm.progress(ConsensusEvent::PrevoteReceived {
        round: 0,
        pubkey: b,
        hash: Some(hash),
        invalid_txs: BTreeSet::new(),
        time: 1_000_001,
    });

    assert_eq!(sm.valid_round(), Some(0));
}
