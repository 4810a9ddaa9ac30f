//! The message-consumption loop: pulls from the [`HeightAwareQueue`]
//! for the driver's current height and dispatches whatever arrives.
//! Runs until told to stop; an empty poll is not a stopping condition,
//! only a reason to check the flag again.
//!
//! Shares the [`Driver`] with the timeout scheduler (`crate::timer`)
//! behind a `tokio::sync::Mutex` — acceptable here precisely because
//! every critical section is a single `dispatch`/`on_timer` call with
//! no further awaiting inside it once the lock is held.

use crate::driver::Driver;
use crate::error::Error;
use crate::queue::{HeightAwareQueue, QueueItem};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tallychain_common::{BlockHash, Timestamp};
use tokio::sync::Mutex;

/// Bound on a single wait for the next message of the right height.
/// Short enough that the stop flag is rechecked often, long enough not
/// to busy-loop.
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_millis(200);

/// Runs the consumption loop for a single height, returning once the
/// driver finalizes a block (`Ok(Some(hash))`) or the stop flag is
/// raised (`Ok(None)`).
///
/// `now` supplies the current timestamp on each poll; in production
/// this is `SystemTime::now`-backed, in tests a fake clock under the
/// caller's control.
pub async fn run(
    driver: Arc<Mutex<Driver>>,
    mut queue: HeightAwareQueue,
    stop: Arc<AtomicBool>,
    recv_timeout: Duration,
    now: impl Fn() -> Timestamp,
) -> Result<Option<BlockHash>, Error> {
    while !stop.load(Ordering::Relaxed) {
        let height = driver.lock().await.height();
        match queue.get(height, recv_timeout).await {
            QueueItem::Empty => continue,
            QueueItem::Message(message) => {
                let mut guard = driver.lock().await;
                if let Some(hash) = guard.dispatch(message, now()).await? {
                    stop.store(true, Ordering::Relaxed);
                    return Ok(Some(hash));
                }
            }
        }
    }
    Ok(None)
}
