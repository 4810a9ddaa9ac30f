//! Deterministic fakes and fixture builders for exercising
//! `tallychain-engine`/`tallychain-runtime` without a real signer,
//! transport, chain, or mempool. Mirrors the upstream crate's
//! `setup_test`/fixture-builder shape, scaled down to what a
//! round-protocol test actually needs.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::{Mutex, Once};
use tallychain_common::{Block, BlockHash, BlockHeader, Height, PubKey, Timestamp, Transaction, TxHash};
use tallychain_engine::{ConsensusParams, HeightInfo};
use tallychain_runtime::{Chain, Crypto, Error, Mempool, Network, Signed, Validation};

/// Initializes `env_logger` exactly once per test binary.
pub fn setup_test() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// A deterministic validator set: pubkeys `[0], [1], ..., [n-1]`, so
/// proposer selection and test assertions don't depend on any RNG.
pub fn generate_validators(n: usize) -> Vec<PubKey> {
    (0..n as u8).map(|i| PubKey::new(vec![i])).collect()
}

pub fn make_height_info(
    height: Height,
    validators: Vec<PubKey>,
    this_node: Option<PubKey>,
) -> HeightInfo {
    let threshold = 2 * validators.len() / 3 + 1;
    HeightInfo {
        height,
        validators,
        this_node,
        threshold,
        params: ConsensusParams::default(),
    }
}

pub fn sample_block(
    height: Height,
    proposer: PubKey,
    prev_hash: BlockHash,
    transactions: Vec<Transaction>,
    timestamp: Timestamp,
) -> Block {
    Block::new(
        BlockHeader {
            height,
            proposer,
            prev_hash,
            timestamp,
        },
        transactions,
    )
}

/// Signs nothing: wraps the message with an empty signature and the
/// configured pubkey. Fine for tests, which never actually verify a
/// signature's bytes — only that the signer field lines up.
pub struct FakeCrypto {
    pubkey: PubKey,
}

impl FakeCrypto {
    pub fn new(pubkey: PubKey) -> Self {
        FakeCrypto { pubkey }
    }
}

impl Crypto for FakeCrypto {
    fn pubkey(&self) -> PubKey {
        self.pubkey.clone()
    }

    fn sign_proposal(&self, msg: tallychain_engine::ProposalMsg) -> Signed<tallychain_engine::ProposalMsg> {
        Signed {
            message: msg,
            signer: self.pubkey.clone(),
            signature: tallychain_common::Signature(Vec::new()),
        }
    }

    fn sign_prevote(&self, msg: tallychain_engine::PrevoteMsg) -> Signed<tallychain_engine::PrevoteMsg> {
        Signed {
            message: msg,
            signer: self.pubkey.clone(),
            signature: tallychain_common::Signature(Vec::new()),
        }
    }

    fn sign_precommit(&self, msg: tallychain_engine::PrecommitMsg) -> Signed<tallychain_engine::PrecommitMsg> {
        Signed {
            message: msg,
            signer: self.pubkey.clone(),
            signature: tallychain_common::Signature(Vec::new()),
        }
    }
}

/// A transport that never actually delivers anything: it just records
/// every broadcast so a test can assert on what was sent. Wiring a
/// broadcast to another node's inbound queue is the test's job (via
/// `tallychain_runtime::QueueHandle`), not this fake's.
#[derive(Default)]
pub struct FakeNetwork {
    peers: Vec<PubKey>,
    proposals: Mutex<Vec<Signed<tallychain_engine::ProposalMsg>>>,
    prevotes: Mutex<Vec<Signed<tallychain_engine::PrevoteMsg>>>,
    precommits: Mutex<Vec<Signed<tallychain_engine::PrecommitMsg>>>,
}

impl FakeNetwork {
    pub fn new(peers: Vec<PubKey>) -> Self {
        FakeNetwork {
            peers,
            ..Default::default()
        }
    }

    pub fn sent_proposals(&self) -> Vec<Signed<tallychain_engine::ProposalMsg>> {
        self.proposals.lock().unwrap().clone()
    }

    pub fn sent_prevotes(&self) -> Vec<Signed<tallychain_engine::PrevoteMsg>> {
        self.prevotes.lock().unwrap().clone()
    }

    pub fn sent_precommits(&self) -> Vec<Signed<tallychain_engine::PrecommitMsg>> {
        self.precommits.lock().unwrap().clone()
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn broadcast_proposal(&self, msg: Signed<tallychain_engine::ProposalMsg>) -> Result<(), Error> {
        self.proposals.lock().unwrap().push(msg);
        Ok(())
    }

    async fn broadcast_prevote(&self, msg: Signed<tallychain_engine::PrevoteMsg>) -> Result<(), Error> {
        self.prevotes.lock().unwrap().push(msg);
        Ok(())
    }

    async fn broadcast_precommit(&self, msg: Signed<tallychain_engine::PrecommitMsg>) -> Result<(), Error> {
        self.precommits.lock().unwrap().push(msg);
        Ok(())
    }

    fn peers(&self) -> Vec<PubKey> {
        self.peers.clone()
    }
}

/// A chain fixed at one height, with an in-memory record of whatever
/// block was last handed to `update`.
pub struct FakeChain {
    height: Height,
    threshold: usize,
    validators: Vec<PubKey>,
    finalized: Mutex<Vec<Block>>,
}

impl FakeChain {
    pub fn new(height: Height, validators: Vec<PubKey>) -> Self {
        let threshold = 2 * validators.len() / 3 + 1;
        FakeChain {
            height,
            threshold,
            validators,
            finalized: Mutex::new(Vec::new()),
        }
    }

    pub fn finalized_blocks(&self) -> Vec<Block> {
        self.finalized.lock().unwrap().clone()
    }
}

#[async_trait]
impl Chain for FakeChain {
    async fn height(&self) -> Height {
        self.height
    }

    async fn threshold(&self) -> usize {
        self.threshold
    }

    async fn update(&self, block: Block) -> Result<(), Error> {
        self.finalized.lock().unwrap().push(block);
        Ok(())
    }

    async fn get_validators(&self) -> Vec<PubKey> {
        self.validators.clone()
    }

    async fn is_validator(&self, pubkey: &PubKey) -> bool {
        self.validators.contains(pubkey)
    }
}

/// A mempool seeded with a fixed transaction list; `add`/`rm` mutate it
/// so a test can observe a proposer's exclude/prefer lists taking
/// effect across rounds.
pub struct FakeMempool {
    transactions: Mutex<Vec<Transaction>>,
}

impl FakeMempool {
    pub fn new(transactions: Vec<Transaction>) -> Self {
        FakeMempool {
            transactions: Mutex::new(transactions),
        }
    }
}

#[async_trait]
impl Mempool for FakeMempool {
    async fn get(&self, quantity: Option<usize>) -> Vec<Transaction> {
        let txs = self.transactions.lock().unwrap();
        match quantity {
            Some(n) => txs.iter().take(n).cloned().collect(),
            None => txs.clone(),
        }
    }

    async fn add(&self, tx: Transaction) -> bool {
        let mut txs = self.transactions.lock().unwrap();
        if txs.contains(&tx) {
            return false;
        }
        txs.push(tx);
        true
    }

    async fn rm(&self, tx: &Transaction) -> bool {
        let mut txs = self.transactions.lock().unwrap();
        let before = txs.len();
        txs.retain(|t| t != tx);
        txs.len() != before
    }
}

/// Accepts everything except the txs/blocks explicitly marked invalid,
/// so a test can target exactly one bad transaction or one malformed
/// block without hand-rolling a whole `Validation` impl.
#[derive(Default)]
pub struct FakeValidation {
    invalid_txs: BTreeSet<TxHash>,
    invalid_blocks: BTreeSet<BlockHash>,
}

impl FakeValidation {
    pub fn new() -> Self {
        FakeValidation::default()
    }

    pub fn reject_tx(mut self, hash: TxHash) -> Self {
        self.invalid_txs.insert(hash);
        self
    }

    pub fn reject_block(mut self, hash: BlockHash) -> Self {
        self.invalid_blocks.insert(hash);
        self
    }
}

#[async_trait]
impl Validation for FakeValidation {
    async fn validate_tx(&self, tx: &Transaction) -> bool {
        !self.invalid_txs.contains(&tx.tx_hash())
    }

    async fn validate_block(&self, block: &Block) -> bool {
        !self.invalid_blocks.contains(&block.hash())
    }
}
