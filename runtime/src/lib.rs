//! Async orchestration for the tallychain consensus engine.
//!
//! `tallychain-engine` is a synchronous, I/O-free state machine; this
//! crate is the layer that actually runs it against a network, a
//! mempool, a chain, and a signer — the height-aware inbound queue,
//! the message-consumption loop and timeout scheduler, the five
//! external service traits, and the [`Driver`] that ties a
//! [`tallychain_engine::StateMachine`] to all of it for a single
//! height.

mod consumer;
mod driver;
mod error;
mod queue;
mod services;
mod timer;

pub use consumer::DEFAULT_RECV_TIMEOUT;
pub use driver::Driver;
pub use error::Error;
pub use queue::{HeightAwareQueue, InboundMessage, ProposalEnvelope, QueueHandle, QueueItem};
pub use services::{Chain, Crypto, Mempool, Network, Signed, Validation};
pub use timer::DEFAULT_TICK;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tallychain_common::{BlockHash, Timestamp};
use tallychain_engine::HeightInfo;

/// Runs a single height to completion: spawns the consumer and timer
/// tasks, feeds `Start`, and waits for either a decision or the stop
/// flag. A convenience wrapper around [`consumer::run`]/[`timer::run`]
/// for callers that don't need finer control over task lifetimes.
#[allow(clippy::too_many_arguments)]
pub async fn run_height(
    height_info: HeightInfo,
    prev_hash: BlockHash,
    crypto: Arc<dyn Crypto>,
    network: Arc<dyn Network>,
    chain: Arc<dyn Chain>,
    mempool: Arc<dyn Mempool>,
    validation: Arc<dyn Validation>,
    queue_handle: QueueHandle,
    queue: HeightAwareQueue,
    stop: Arc<AtomicBool>,
    start_time: Timestamp,
    now: impl Fn() -> Timestamp + Clone + Send + 'static,
) -> Result<Option<BlockHash>, Error> {
    let mut driver = Driver::new(
        height_info,
        prev_hash,
        crypto,
        network,
        chain,
        mempool,
        validation,
        queue_handle,
    );
    driver.start(start_time).await?;
    let driver = Arc::new(tokio::sync::Mutex::new(driver));

    let consumer_handle = tokio::spawn(consumer::run(
        driver.clone(),
        queue,
        stop.clone(),
        DEFAULT_RECV_TIMEOUT,
        now.clone(),
    ));
    let timer_handle = tokio::spawn(timer::run(driver.clone(), stop.clone(), DEFAULT_TICK, now));

    let consumer_result = consumer_handle
        .await
        .map_err(|e| Error::TransportFailure(format!("consumer task panicked: {e}")))??;
    stop.store(true, std::sync::atomic::Ordering::Relaxed);
    let timer_result = timer_handle
        .await
        .map_err(|e| Error::TransportFailure(format!("timer task panicked: {e}")))??;

    Ok(consumer_result.or(timer_result))
}
