use serde::{Deserialize, Serialize};

/// Timeout schedule and other tunables for the round protocol.
///
/// Linear in the round number within a height, with the three steps
/// given distinct base/delta pairs since they play different liveness
/// roles: a slow-to-propose round shouldn't necessarily stretch out
/// prevote/precommit as much.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    pub timeout_propose_base_ms: u64,
    pub timeout_propose_delta_ms: u64,
    pub timeout_prevote_base_ms: u64,
    pub timeout_prevote_delta_ms: u64,
    pub timeout_precommit_base_ms: u64,
    pub timeout_precommit_delta_ms: u64,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        ConsensusParams {
            timeout_propose_base_ms: 3_000,
            timeout_propose_delta_ms: 1_000,
            timeout_prevote_base_ms: 1_000,
            timeout_prevote_delta_ms: 500,
            timeout_precommit_base_ms: 1_000,
            timeout_precommit_delta_ms: 500,
        }
    }
}

impl ConsensusParams {
    pub fn timeout_propose(&self, round: u64) -> i64 {
        (self.timeout_propose_base_ms + round * self.timeout_propose_delta_ms) as i64
    }

    pub fn timeout_prevote(&self, round: u64) -> i64 {
        (self.timeout_prevote_base_ms + round * self.timeout_prevote_delta_ms) as i64
    }

    pub fn timeout_precommit(&self, round: u64) -> i64 {
        (self.timeout_precommit_base_ms + round * self.timeout_precommit_delta_ms) as i64
    }
}
