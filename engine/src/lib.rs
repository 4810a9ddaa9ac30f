//! The synchronous algorithmic core of the consensus engine: the
//! message journal (`MessageLog`) and the round-based voting state
//! machine (`StateMachine`). No I/O and no async runtime live here —
//! see `tallychain-runtime` for the async orchestration layer that
//! drives this crate from real network/mempool/chain/crypto services.

mod event;
mod message;
mod message_log;
mod misbehavior;
mod params;
mod state_machine;

pub use event::{ConsensusEvent, ConsensusResponse};
pub use message::{Message, PrecommitMsg, PrevoteMsg, ProposalMsg};
pub use message_log::MessageLog;
pub use misbehavior::Misbehavior;
pub use params::ConsensusParams;
pub use state_machine::{HeightInfo, StateMachine};
