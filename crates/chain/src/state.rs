//! World state: the address → account map and its trie root commitment.
//!
//! Not independently thread-safe; the ledger lock guards every use.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::rlp;
use crate::trie::MptTrie;
use crate::tx::Transaction;
use crate::types::Address;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Insufficient balance")]
    InsufficientBalance,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Account {
    pub balance: u64,
    pub nonce: u64,
    // Future: code hash, storage root.
}

/// In-memory account map. BTreeMap keeps iteration (and therefore root
/// computation) deterministic.
#[derive(Debug, Clone, Default)]
pub struct WorldState {
    accounts: BTreeMap<Address, Account>,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_premine(premine: &[(Address, u64)]) -> Self {
        let mut state = Self::new();
        for (addr, balance) in premine {
            state.accounts.insert(
                *addr,
                Account {
                    balance: *balance,
                    nonce: 0,
                },
            );
        }
        state
    }

    pub fn get(&self, addr: &Address) -> Option<&Account> {
        self.accounts.get(addr)
    }

    /// Accounts are created on first touch and never destroyed.
    pub fn get_or_create(&mut self, addr: Address) -> &mut Account {
        self.accounts.entry(addr).or_default()
    }

    pub fn balance(&self, addr: &Address) -> u64 {
        self.accounts.get(addr).map_or(0, |a| a.balance)
    }

    pub fn nonce(&self, addr: &Address) -> u64 {
        self.accounts.get(addr).map_or(0, |a| a.nonce)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Move `tx.value` from sender to recipient and bump the sender nonce.
    /// Gas is checked at validation time but not deducted here.
    pub fn apply_transaction(&mut self, from: Address, tx: &Transaction) -> Result<(), StateError> {
        if self.balance(&from) < tx.value {
            return Err(StateError::InsufficientBalance);
        }

        {
            let sender = self.get_or_create(from);
            sender.balance -= tx.value;
            sender.nonce += 1;
        }
        let recipient = self.get_or_create(tx.to);
        recipient.balance += tx.value;
        Ok(())
    }

    /// State root: trie keyed by the raw 20-byte address, valued with
    /// `RLP([balance, nonce])`.
    pub fn root(&self) -> String {
        let mut trie = MptTrie::new();
        for (addr, acc) in &self.accounts {
            let value = rlp::encode_list(&[
                rlp::encode_uint(acc.balance),
                rlp::encode_uint(acc.nonce),
            ]);
            trie.insert(addr.as_bytes(), value);
        }
        trie.root_hash()
    }
}
