//! Detects the one byzantine pattern `MessageLog`'s pubkey-keyed storage
//! can no longer see once a duplicate has been rejected: a validator
//! signing two *different* targets for the same (round, step). The
//! journal itself stays a dumb accumulator; this check runs in the
//! state machine just before a vote is handed to the journal.

use tallychain_common::{BlockHash, PubKey, Round};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Misbehavior {
    DoublePrevote {
        round: Round,
        first: Option<BlockHash>,
        second: Option<BlockHash>,
    },
    DoublePrecommit {
        round: Round,
        first: Option<BlockHash>,
        second: Option<BlockHash>,
    },
}

/// Returns `Some` if `existing` (the vote already on file for `pubkey`
/// at this round) conflicts with `incoming`. `existing` is `None` when
/// no prior vote exists — the ordinary, non-byzantine case.
pub(crate) fn check_double_vote(
    existing: Option<Option<BlockHash>>,
    incoming: Option<BlockHash>,
) -> Option<(Option<BlockHash>, Option<BlockHash>)> {
    match existing {
        Some(prior) if prior != incoming => Some((prior, incoming)),
        _ => None,
    }
}

pub(crate) fn describe(violator: &PubKey, m: &Misbehavior) -> String {
    match m {
        Misbehavior::DoublePrevote {
            round,
            first,
            second,
        } => format!(
            "{violator} double-prevoted at round {round}: {first:?} and {second:?}"
        ),
        Misbehavior::DoublePrecommit {
            round,
            first,
            second,
        } => format!(
            "{violator} double-precommitted at round {round}: {first:?} and {second:?}"
        ),
    }
}
