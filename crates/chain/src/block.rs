//! Blocks: header commitments, the 12-field RLP gossip form, and the
//! header digest.

use chrono::Utc;
use thiserror::Error;

use crate::crypto::keccak256_hex;
use crate::proof::ZkProof;
use crate::receipt::{Bloom, Receipt};
use crate::rlp::{self, RlpError};
use crate::tx::{Transaction, TxError};
use crate::types::{from_hex, to_hex, HexError};

/// Sentinel parent hash of the genesis block.
pub const GENESIS_PREV_HASH: &str = "0x00";
/// Transaction root of an empty block.
pub const EMPTY_TX_ROOT: &str = "0x00";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error(transparent)]
    Hex(#[from] HexError),
    #[error(transparent)]
    Rlp(#[from] RlpError),
    #[error("invalid transaction in block: {0}")]
    Tx(#[from] TxError),
    #[error("logs bloom must be {expected} bytes, found {found}")]
    InvalidBloom { expected: usize, found: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    pub index: u64,
    pub prev_hash: String,
    pub state_before: String,
    pub state_after: String,
    pub tx_root: String,
    pub receipts_root: String,
    pub proof: ZkProof,
    /// Unix seconds.
    pub timestamp: u64,
    /// Header digest, hex without prefix.
    pub hash: String,

    pub transactions: Vec<Transaction>,
    pub receipts: Vec<Receipt>,
    pub logs_bloom: Bloom,
}

impl Block {
    /// Build a block and seal its header hash. All commitment fields must
    /// already be final; the hash is recomputed here and nowhere else.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: u64,
        prev_hash: String,
        state_before: String,
        state_after: String,
        tx_root: String,
        receipts_root: String,
        proof: ZkProof,
    ) -> Self {
        let mut block = Block {
            index,
            prev_hash,
            state_before,
            state_after,
            tx_root,
            receipts_root,
            proof,
            timestamp: Utc::now().timestamp() as u64,
            ..Default::default()
        };
        block.hash = block.compute_hash();
        block
    }

    /// Override the timestamp and reseal. The genesis block pins its
    /// timestamp so every node configured alike produces the same hash.
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self.hash = self.compute_hash();
        self
    }

    /// keccak over the `|`-joined header fields, hex without prefix.
    pub fn compute_hash(&self) -> String {
        let concat = format!(
            "{}|{}|{}|{}|{}|{}|{}|{}",
            self.index,
            self.prev_hash,
            self.state_before,
            self.state_after,
            self.tx_root,
            self.receipts_root,
            self.proof.commitment,
            self.timestamp
        );
        keccak256_hex(concat.as_bytes())
    }

    /// 12-field wire order: `[index, prevHash, stateBefore, stateAfter,
    /// txRoot, proof, commitment, timestamp, hash, txs, bloom, receipts]`.
    /// Hex-string fields travel verbatim as ASCII byte strings.
    pub fn rlp_encode(&self) -> Vec<u8> {
        let mut fields = Vec::with_capacity(12);
        fields.push(rlp::encode_uint(self.index));
        fields.push(rlp::encode_str(&self.prev_hash));
        fields.push(rlp::encode_str(&self.state_before));
        fields.push(rlp::encode_str(&self.state_after));
        fields.push(rlp::encode_str(&self.tx_root));
        fields.push(rlp::encode_str(&self.proof.proof));
        fields.push(rlp::encode_str(&self.proof.commitment));
        fields.push(rlp::encode_uint(self.timestamp));
        fields.push(rlp::encode_str(&self.hash));

        let tx_items: Vec<Vec<u8>> = self
            .transactions
            .iter()
            .map(Transaction::rlp_encode_signed)
            .collect();
        fields.push(rlp::encode_list(&tx_items));

        fields.push(rlp::encode_bytes(&self.logs_bloom.bits));

        let receipt_items: Vec<Vec<u8>> = self.receipts.iter().map(Receipt::rlp_encode).collect();
        fields.push(rlp::encode_list(&receipt_items));

        rlp::encode_list(&fields)
    }

    pub fn rlp_decode(raw: &[u8]) -> Result<Self, BlockError> {
        let root = rlp::decode(raw)?;
        let items = root.as_list()?;
        if items.len() < 10 {
            return Err(RlpError::ShortList {
                expected: 10,
                found: items.len(),
            }
            .into());
        }

        let mut block = Block {
            index: items[0].as_uint()?,
            prev_hash: items[1].as_str_lossy()?,
            state_before: items[2].as_str_lossy()?,
            state_after: items[3].as_str_lossy()?,
            tx_root: items[4].as_str_lossy()?,
            timestamp: items[7].as_uint()?,
            hash: items[8].as_str_lossy()?,
            ..Default::default()
        };

        // The wire form carries only the proof blob and commitment; the
        // verifier inputs are the block's own commitment fields.
        block.proof = ZkProof {
            proof: items[5].as_str_lossy()?,
            state_before: block.state_before.clone(),
            state_after: block.state_after.clone(),
            tx_root: block.tx_root.clone(),
            commitment: items[6].as_str_lossy()?,
        };

        for item in items[9].as_list()? {
            block.transactions.push(Transaction::from_item(item)?);
        }

        if let Some(bloom_item) = items.get(10) {
            let bytes = bloom_item.as_bytes()?;
            if bytes.len() != Bloom::BYTES {
                return Err(BlockError::InvalidBloom {
                    expected: Bloom::BYTES,
                    found: bytes.len(),
                });
            }
            block.logs_bloom.bits.copy_from_slice(bytes);
        }

        if let Some(receipts_item) = items.get(11) {
            for item in receipts_item.as_list()? {
                block.receipts.push(Receipt::from_item(item)?);
            }
        }

        Ok(block)
    }

    /// Gossip form: `0x`-prefixed hex of the RLP encoding.
    pub fn to_hex(&self) -> String {
        format!("0x{}", to_hex(&self.rlp_encode()))
    }

    pub fn from_hex(input: &str) -> Result<Self, BlockError> {
        let raw = from_hex(input)?;
        Self::rlp_decode(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::proof::{ZkProver, ZkVerifier};
    use crate::types::Address;

    fn sample_block(txs: Vec<Transaction>) -> Block {
        let proof = ZkProver::generate("0xaa", "0xbb", "0xcc");
        let mut block = Block::new(
            1,
            "deadbeef".into(),
            "0xaa".into(),
            "0xbb".into(),
            "0xcc".into(),
            "0xdd".into(),
            proof,
        );
        block.transactions = txs;
        block
    }

    fn signed_tx(nonce: u64) -> Transaction {
        let key = KeyPair::random();
        let mut tx = Transaction {
            nonce,
            gas_price: 1,
            gas_limit: 21_000,
            to: Address::from_bytes([0x33; 20]),
            value: 5,
            chain_id: 1337,
            ..Default::default()
        };
        tx.sign_with(&key).unwrap();
        tx
    }

    #[test]
    fn hash_covers_header_fields() {
        let a = sample_block(vec![]);
        let mut b = a.clone();
        assert_eq!(a.hash, a.compute_hash());

        b.index += 1;
        assert_ne!(a.compute_hash(), b.compute_hash());

        let mut c = a.clone();
        c.receipts_root = "0xee".into();
        assert_ne!(a.compute_hash(), c.compute_hash());
    }

    #[test]
    fn hex_roundtrip_with_transactions() {
        let block = sample_block(vec![signed_tx(0), signed_tx(1)]);
        let decoded = Block::from_hex(&block.to_hex()).unwrap();

        assert_eq!(decoded.index, block.index);
        assert_eq!(decoded.prev_hash, block.prev_hash);
        assert_eq!(decoded.state_before, block.state_before);
        assert_eq!(decoded.state_after, block.state_after);
        assert_eq!(decoded.tx_root, block.tx_root);
        assert_eq!(decoded.timestamp, block.timestamp);
        assert_eq!(decoded.hash, block.hash);
        assert_eq!(decoded.transactions.len(), 2);
        assert_eq!(decoded.transactions[0].nonce, 0);
        assert_eq!(decoded.transactions[1].nonce, 1);
        assert_eq!(
            decoded.transactions[0].from,
            block.transactions[0].from
        );
    }

    #[test]
    fn decoded_proof_still_verifies() {
        let root = "0xab12cd34";
        let proof = ZkProver::generate(root, root, EMPTY_TX_ROOT);
        let mut block = Block::new(
            0,
            GENESIS_PREV_HASH.into(),
            root.into(),
            root.into(),
            EMPTY_TX_ROOT.into(),
            String::new(),
            proof,
        );
        block.receipts.push(Receipt {
            status: true,
            cumulative_gas_used: 21_000,
            logs: vec![],
        });

        let decoded = Block::from_hex(&block.to_hex()).unwrap();
        assert!(ZkVerifier::verify(&decoded.proof));
        assert_eq!(decoded.receipts, block.receipts);
        assert_eq!(decoded.logs_bloom, block.logs_bloom);
    }

    #[test]
    fn malformed_block_is_rejected() {
        assert!(Block::from_hex("0x00").is_err());
        let short = rlp::encode_list(&[rlp::encode_uint(1)]);
        assert!(matches!(
            Block::rlp_decode(&short),
            Err(BlockError::Rlp(RlpError::ShortList { .. }))
        ));
    }
}
