use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque signature over a wire message. The engine and this crate
/// never inspect its bytes; verification is the `Crypto` service's job.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(pub Vec<u8>);

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}
