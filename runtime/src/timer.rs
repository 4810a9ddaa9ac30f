//! The timeout scheduler: a second task that periodically wakes the
//! driver up with [`tallychain_engine::ConsensusEvent::Timer`] so armed
//! propose/prevote/precommit deadlines get checked even when no
//! message arrives to do it implicitly.

use crate::driver::Driver;
use crate::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tallychain_common::{BlockHash, Timestamp};
use tokio::sync::Mutex;

/// How often the scheduler wakes the driver. Finer than this buys
/// nothing — the round timeouts themselves are on the order of a
/// second (see `ConsensusParams`) — and coarser risks a noticeably
/// late round advance.
pub const DEFAULT_TICK: Duration = Duration::from_millis(50);

pub async fn run(
    driver: Arc<Mutex<Driver>>,
    stop: Arc<AtomicBool>,
    tick: Duration,
    now: impl Fn() -> Timestamp,
) -> Result<Option<BlockHash>, Error> {
    let mut interval = tokio::time::interval(tick);
    while !stop.load(Ordering::Relaxed) {
        interval.tick().await;
        let mut guard = driver.lock().await;
        if let Some(hash) = guard.on_timer(now()).await? {
            stop.store(true, Ordering::Relaxed);
            return Ok(Some(hash));
        }
    }
    Ok(None)
}
