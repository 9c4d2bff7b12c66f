//! The ledger: authoritative chain, world state, and mempool behind a
//! single mutex.
//!
//! Every mutation and every read snapshot takes the one lock for its full
//! critical section, so block append is totally ordered and `index`
//! increases by exactly one. No await point ever occurs under the lock.

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info};

use crate::block::{Block, EMPTY_TX_ROOT, GENESIS_PREV_HASH};
use crate::crypto::keccak256_hex;
use crate::mempool::Mempool;
use crate::proof::{ZkProver, ZkVerifier};
use crate::receipt::{Bloom, Receipt};
use crate::state::WorldState;
use crate::trie::MptTrie;
use crate::tx::Transaction;
use crate::types::Address;
use crate::vm::VmRegistry;

/// Boot-time chain parameters; never hot-reloaded.
#[derive(Debug, Clone)]
pub struct GenesisConfig {
    pub chain_id: u64,
    pub premine: Vec<(Address, u64)>,
}

/// Transaction admission failures, with the reason strings the RPC
/// surfaces verbatim under code -32000.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid chainId")]
    InvalidChainId,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Invalid nonce")]
    InvalidNonce,
    #[error("Gas cost overflow")]
    GasCostOverflow,
    #[error("Total cost overflow")]
    TotalCostOverflow,
    #[error("Insufficient funds")]
    InsufficientFunds,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlockRejected {
    #[error("block index {found} does not extend chain of length {expected}")]
    WrongIndex { expected: u64, found: u64 },
    #[error("block parent hash does not match the chain tip")]
    WrongParent,
    #[error("proof commitment verification failed")]
    InvalidProof,
    #[error("transaction replay failed: {0}")]
    TxApplyFailed(String),
    #[error("state root after replay does not match the block header")]
    StateMismatch,
}

/// Where a transaction was found when queried by hash.
#[derive(Debug, Clone)]
pub struct TxLocation {
    pub tx: Transaction,
    pub block_hash: Option<String>,
    pub block_index: Option<u64>,
}

struct ChainInner {
    chain: Vec<Block>,
    state: WorldState,
    mempool: Mempool,
}

pub struct Blockchain {
    chain_id: u64,
    vms: VmRegistry,
    inner: Mutex<ChainInner>,
}

fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

impl Blockchain {
    pub fn new(genesis: GenesisConfig) -> Self {
        let state = WorldState::with_premine(&genesis.premine);
        let root = state.root();

        // Pinned timestamp: the genesis hash must be a pure function of
        // the chain configuration or peers could never link block 1.
        let genesis_block = Block::new(
            0,
            GENESIS_PREV_HASH.to_string(),
            root.clone(),
            root.clone(),
            EMPTY_TX_ROOT.to_string(),
            String::new(),
            ZkProver::generate(&root, &root, EMPTY_TX_ROOT),
        )
        .with_timestamp(0);

        info!(
            chain_id = genesis.chain_id,
            genesis_hash = %genesis_block.hash,
            state_root = %root,
            "genesis block created"
        );

        Blockchain {
            chain_id: genesis.chain_id,
            vms: VmRegistry::with_builtin(),
            inner: Mutex::new(ChainInner {
                chain: vec![genesis_block],
                state,
                mempool: Mempool::new(),
            }),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Semantic admission checks, in fixed order so the first failing
    /// predicate names the rejection.
    pub fn validate_transaction(&self, tx: &Transaction) -> Result<(), ValidationError> {
        if tx.chain_id != self.chain_id {
            return Err(ValidationError::InvalidChainId);
        }
        if tx.from.is_zero() || !tx.verify_signature() {
            return Err(ValidationError::InvalidSignature);
        }

        let inner = self.inner.lock();

        let expected_nonce = inner.state.nonce(&tx.from);
        if tx.nonce != expected_nonce {
            return Err(ValidationError::InvalidNonce);
        }

        let gas_cost = tx
            .gas_price
            .checked_mul(tx.gas_limit)
            .ok_or(ValidationError::GasCostOverflow)?;
        let needed = gas_cost
            .checked_add(tx.value)
            .ok_or(ValidationError::TotalCostOverflow)?;

        if inner.state.balance(&tx.from) < needed {
            return Err(ValidationError::InsufficientFunds);
        }

        Ok(())
    }

    /// Append to the mempool; admission dedup may reject. Returns the
    /// transaction hash.
    pub fn add_transaction(&self, tx: Transaction) -> Result<String> {
        let mut inner = self.inner.lock();
        let hash = inner.mempool.add(tx).map_err(|e| anyhow!(e))?;
        debug!(tx_hash = %hash, pending = inner.mempool.len(), "transaction admitted");
        Ok(hash)
    }

    /// Commitment over the ordered transaction list: keccak of the
    /// concatenated broadcast-hex forms, `|`-separated. Empty list has the
    /// fixed root `0x00`.
    pub fn compute_tx_root(txs: &[Transaction]) -> String {
        if txs.is_empty() {
            return EMPTY_TX_ROOT.to_string();
        }
        let mut concat = String::new();
        for tx in txs {
            concat.push_str(&tx.to_hex());
            concat.push('|');
        }
        keccak256_hex(concat.as_bytes())
    }

    fn build_receipts(txs: &[Transaction]) -> (Vec<Receipt>, String, Bloom) {
        let mut receipts = Vec::with_capacity(txs.len());
        let mut cumulative_gas = 0u64;
        let mut bloom = Bloom::default();

        for tx in txs {
            cumulative_gas = cumulative_gas.saturating_add(tx.gas_limit);
            receipts.push(Receipt {
                status: true,
                cumulative_gas_used: cumulative_gas,
                logs: Vec::new(),
            });
        }
        for rc in &receipts {
            for log in &rc.logs {
                bloom.accrue(log);
            }
        }

        let mut trie = MptTrie::new();
        for (i, rc) in receipts.iter().enumerate() {
            trie.insert(&[i as u8], rc.rlp_encode());
        }

        (receipts, trie.root_hash(), bloom)
    }

    /// Seal the current mempool into a block: apply in admission order,
    /// commit the new root, append, clear the pool.
    pub fn mine_block(&self) -> Result<Block> {
        let mut inner = self.inner.lock();

        let before = inner.state.root();

        let mut scratch = inner.state.clone();
        for tx in inner.mempool.pending() {
            self.vms
                .execute(tx, &mut scratch)
                .map_err(|e| anyhow!("mempool transaction failed to apply: {e}"))?;
        }
        let after = scratch.root();

        let txs = inner.mempool.drain();
        let tx_root = Self::compute_tx_root(&txs);
        let (receipts, receipts_root, bloom) = Self::build_receipts(&txs);
        let proof = ZkProver::generate(&before, &after, &tx_root);

        let tip_hash = inner.chain.last().map(|b| b.hash.clone()).unwrap_or_default();
        let mut block = Block::new(
            inner.chain.len() as u64,
            tip_hash,
            before,
            after,
            tx_root,
            receipts_root,
            proof,
        );
        block.transactions = txs;
        block.receipts = receipts;
        block.logs_bloom = bloom;

        inner.state = scratch;
        inner.chain.push(block.clone());

        info!(
            index = block.index,
            hash = %block.hash,
            txs = block.transactions.len(),
            "mined block"
        );
        Ok(block)
    }

    /// Validate and append a block produced elsewhere (a peer or the
    /// template miner). Linkage and proof checks first, then the
    /// authoritative state walk: the block's transactions are replayed on
    /// a scratch state and the resulting root must equal `state_after`.
    pub fn add_block(&self, block: Block) -> Result<(), BlockRejected> {
        let mut inner = self.inner.lock();

        let expected = inner.chain.len() as u64;
        if block.index != expected {
            return Err(BlockRejected::WrongIndex {
                expected,
                found: block.index,
            });
        }

        let tip_hash = inner.chain.last().map(|b| b.hash.as_str()).unwrap_or("");
        if block.prev_hash != tip_hash {
            return Err(BlockRejected::WrongParent);
        }

        if !ZkVerifier::verify(&block.proof) {
            return Err(BlockRejected::InvalidProof);
        }

        let mut scratch = inner.state.clone();
        for tx in &block.transactions {
            self.vms
                .execute(tx, &mut scratch)
                .map_err(|e| BlockRejected::TxApplyFailed(e.to_string()))?;
        }
        if scratch.root() != block.state_after {
            return Err(BlockRejected::StateMismatch);
        }

        inner.state = scratch;
        inner.mempool.remove_committed(&block.transactions);
        inner.chain.push(block);

        let tip = inner.chain.last().expect("chain never empty");
        info!(index = tip.index, hash = %tip.hash, "appended block");
        Ok(())
    }

    // ---- read snapshots (all under the same lock) ----

    /// Index of the chain tip.
    pub fn height(&self) -> u64 {
        let inner = self.inner.lock();
        inner.chain.last().map(|b| b.index).unwrap_or(0)
    }

    pub fn chain_len(&self) -> u64 {
        self.inner.lock().chain.len() as u64
    }

    pub fn tip_hash(&self) -> String {
        let inner = self.inner.lock();
        inner.chain.last().map(|b| b.hash.clone()).unwrap_or_default()
    }

    pub fn balance(&self, addr: &Address) -> u64 {
        self.inner.lock().state.balance(addr)
    }

    pub fn nonce_of(&self, addr: &Address) -> u64 {
        self.inner.lock().state.nonce(addr)
    }

    pub fn state_root(&self) -> String {
        self.inner.lock().state.root()
    }

    pub fn mempool_len(&self) -> usize {
        self.inner.lock().mempool.len()
    }

    pub fn block_by_index(&self, index: u64) -> Option<Block> {
        self.inner.lock().chain.get(index as usize).cloned()
    }

    /// Hash comparison tolerates a `0x` prefix on either side.
    pub fn block_by_hash(&self, hash: &str) -> Option<Block> {
        let needle = strip_0x(hash);
        let inner = self.inner.lock();
        inner
            .chain
            .iter()
            .find(|b| strip_0x(&b.hash) == needle)
            .cloned()
    }

    /// Search the mempool first, then every block's transactions.
    pub fn tx_by_hash(&self, hash: &str) -> Option<TxLocation> {
        let needle = strip_0x(hash);
        let inner = self.inner.lock();

        if let Some(tx) = inner
            .mempool
            .pending()
            .iter()
            .find(|tx| strip_0x(&tx.hash) == needle)
        {
            return Some(TxLocation {
                tx: tx.clone(),
                block_hash: None,
                block_index: None,
            });
        }

        for block in &inner.chain {
            if let Some(tx) = block
                .transactions
                .iter()
                .find(|tx| strip_0x(&tx.hash) == needle)
            {
                return Some(TxLocation {
                    tx: tx.clone(),
                    block_hash: Some(block.hash.clone()),
                    block_index: Some(block.index),
                });
            }
        }
        None
    }

    /// Consistent snapshot for template building: next index, tip hash,
    /// state copy, pending transactions.
    pub fn snapshot_for_mining(&self) -> (u64, String, WorldState, Vec<Transaction>) {
        let inner = self.inner.lock();
        (
            inner.chain.len() as u64,
            inner.chain.last().map(|b| b.hash.clone()).unwrap_or_default(),
            inner.state.clone(),
            inner.mempool.pending().to_vec(),
        )
    }
}
