//! Pending-transaction queue.
//!
//! Admission order is block order, so the queue is a plain vector with
//! two dedup indexes: one on the transaction hash and one on
//! (sender, nonce). Double-submitting a signed transaction, or racing two
//! transactions for the same nonce slot, is rejected at admission instead
//! of corrupting nonce arithmetic at apply time.
//!
//! Not internally locked; the ledger mutex guards every call.

use std::collections::HashSet;

use thiserror::Error;

use crate::tx::Transaction;
use crate::types::Address;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MempoolError {
    #[error("transaction already pending")]
    DuplicateHash,
    #[error("a pending transaction already uses this sender nonce")]
    DuplicateNonce,
}

#[derive(Debug, Default)]
pub struct Mempool {
    queue: Vec<Transaction>,
    seen: HashSet<String>,
    nonces: HashSet<(Address, u64)>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a transaction; returns its cached hash.
    pub fn add(&mut self, tx: Transaction) -> Result<String, MempoolError> {
        if self.seen.contains(&tx.hash) {
            return Err(MempoolError::DuplicateHash);
        }
        if self.nonces.contains(&(tx.from, tx.nonce)) {
            return Err(MempoolError::DuplicateNonce);
        }

        let hash = tx.hash.clone();
        self.seen.insert(hash.clone());
        self.nonces.insert((tx.from, tx.nonce));
        self.queue.push(tx);
        Ok(hash)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Pending transactions in admission order.
    pub fn pending(&self) -> &[Transaction] {
        &self.queue
    }

    pub fn find(&self, hash: &str) -> Option<&Transaction> {
        if !self.seen.contains(hash) {
            return None;
        }
        self.queue.iter().find(|tx| tx.hash == hash)
    }

    /// Take everything, clearing the indexes.
    pub fn drain(&mut self) -> Vec<Transaction> {
        self.seen.clear();
        self.nonces.clear();
        std::mem::take(&mut self.queue)
    }

    /// Drop transactions that were committed in a block someone else
    /// produced.
    pub fn remove_committed(&mut self, committed: &[Transaction]) {
        let hashes: HashSet<&str> = committed.iter().map(|tx| tx.hash.as_str()).collect();
        if hashes.is_empty() {
            return;
        }
        let seen = &mut self.seen;
        let nonces = &mut self.nonces;
        self.queue.retain(|tx| {
            if hashes.contains(tx.hash.as_str()) {
                seen.remove(&tx.hash);
                nonces.remove(&(tx.from, tx.nonce));
                false
            } else {
                true
            }
        });
    }
}
