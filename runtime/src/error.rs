use tallychain_common::BlockHash;
use thiserror::Error;

/// The runtime's error taxonomy.
///
/// Everything except [`Error::FatalInvariantViolation`] is recoverable:
/// the caller logs it and keeps driving consensus, since liveness does
/// not depend on any single message or broadcast succeeding. A fatal
/// invariant violation (deciding two different blocks at one height) is
/// the one case that must abort the engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error("this node is not a validator for the current height")]
    NotAValidator,
    #[error("block {0} has not been verified yet")]
    BlockUnverified(BlockHash),
    #[error("transport failure: {0}")]
    TransportFailure(String),
    #[error("fatal invariant violation: {0}")]
    FatalInvariantViolation(String),
}
