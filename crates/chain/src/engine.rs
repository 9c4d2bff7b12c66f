//! Pure block-template builder.
//!
//! Builds a candidate block from a ledger snapshot without mutating the
//! ledger: the world state is cloned, the pending transactions are applied
//! to the clone, and the proof is generated over the resulting roots. The
//! caller owns the authoritative `add_block`, which replays the template
//! against the live state. The split lets off-process miners fetch work
//! and submit it back.

use anyhow::{anyhow, Result};

use crate::block::Block;
use crate::ledger::Blockchain;
use crate::proof::{ZkProver, ZkVerifier};

pub struct ZkMiningEngine;

impl ZkMiningEngine {
    pub fn build_template(chain: &Blockchain) -> Result<Block> {
        let (next_index, tip_hash, state, pending) = chain.snapshot_for_mining();

        let before = state.root();
        let mut scratch = state;
        for tx in &pending {
            scratch
                .apply_transaction(tx.from, tx)
                .map_err(|e| anyhow!("pending transaction failed to apply: {e}"))?;
        }
        let after = scratch.root();

        let tx_root = Blockchain::compute_tx_root(&pending);
        let proof = ZkProver::generate(&before, &after, &tx_root);

        let mut block = Block::new(
            next_index,
            tip_hash,
            before,
            after,
            tx_root,
            String::new(),
            proof,
        );
        block.transactions = pending;
        Ok(block)
    }

    pub fn validate_mined_block(block: &Block) -> bool {
        ZkVerifier::verify(&block.proof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::ledger::GenesisConfig;
    use crate::tx::Transaction;
    use crate::types::Address;

    #[test]
    fn template_does_not_mutate_the_ledger() {
        let key = KeyPair::random();
        let chain = Blockchain::new(GenesisConfig {
            chain_id: 1,
            premine: vec![(key.address(), 1000)],
        });

        let mut tx = Transaction {
            gas_price: 1,
            gas_limit: 21_000,
            to: Address::from_bytes([0x02; 20]),
            value: 10,
            chain_id: 1,
            ..Default::default()
        };
        tx.sign_with(&key).unwrap();
        chain.add_transaction(tx).unwrap();

        let root_before = chain.state_root();
        let template = ZkMiningEngine::build_template(&chain).unwrap();

        assert_eq!(chain.state_root(), root_before);
        assert_eq!(chain.mempool_len(), 1);
        assert_eq!(template.index, 1);
        assert_eq!(template.transactions.len(), 1);
        assert_eq!(template.state_before, root_before);
        assert_ne!(template.state_after, template.state_before);
        assert!(ZkMiningEngine::validate_mined_block(&template));
    }

    #[test]
    fn template_is_accepted_by_the_ledger() {
        let chain = Blockchain::new(GenesisConfig {
            chain_id: 1,
            premine: vec![],
        });

        let template = ZkMiningEngine::build_template(&chain).unwrap();
        chain.add_block(template).unwrap();
        assert_eq!(chain.height(), 1);
    }

    #[test]
    fn tampered_template_fails_engine_validation() {
        let chain = Blockchain::new(GenesisConfig {
            chain_id: 1,
            premine: vec![],
        });
        let mut template = ZkMiningEngine::build_template(&chain).unwrap();
        template.proof.tx_root = "0xff".into();
        assert!(!ZkMiningEngine::validate_mined_block(&template));
    }
}
