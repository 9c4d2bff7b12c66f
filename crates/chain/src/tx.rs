//! Signed value-transfer transactions.
//!
//! Two canonical RLP forms exist. The signing form is the EIP-155 9-tuple
//! `[nonce, gasPrice, gasLimit, to, value, data, chainId, 0, 0]`; the
//! broadcast form replaces the trailing `chainId, 0, 0` with
//! `[v, r, s]` where `v = rec_id + 35 + 2 * chainId`. The cached `hash`
//! is the keccak digest of the broadcast form.

use thiserror::Error;

use crate::crypto::{keccak256, recover_address, CryptoError, KeyPair, Signature};
use crate::rlp::{self, RlpError};
use crate::types::{from_hex, to_hex, Address, AddressError, HexError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TxError {
    #[error(transparent)]
    Hex(#[from] HexError),
    #[error(transparent)]
    Rlp(#[from] RlpError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error("signature r/s must be 32 bytes")]
    InvalidSignatureLength,
}

/// A signed transfer. `to == Address::ZERO` marks the contract-creation
/// placeholder; the core only moves value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    pub nonce: u64,
    pub gas_price: u64,
    pub gas_limit: u64,
    pub to: Address,
    pub value: u64,
    pub data: Vec<u8>,
    pub chain_id: u64,

    /// Sender; derived from signature recovery.
    pub from: Address,
    pub sig: Signature,
    /// `0x`-prefixed keccak of the broadcast RLP, cached at sign/decode.
    pub hash: String,
}

impl Transaction {
    fn encode_common_fields(&self) -> Vec<Vec<u8>> {
        let mut fields = Vec::with_capacity(9);
        fields.push(rlp::encode_uint(self.nonce));
        fields.push(rlp::encode_uint(self.gas_price));
        fields.push(rlp::encode_uint(self.gas_limit));
        if self.to.is_zero() {
            fields.push(rlp::encode_bytes(&[])); // contract creation
        } else {
            fields.push(rlp::encode_bytes(self.to.as_bytes()));
        }
        fields.push(rlp::encode_uint(self.value));
        fields.push(rlp::encode_bytes(&self.data));
        fields
    }

    /// EIP-155 signing form: `[.., chainId, 0, 0]`.
    pub fn rlp_encode_for_signing(&self) -> Vec<u8> {
        let mut fields = self.encode_common_fields();
        fields.push(rlp::encode_uint(self.chain_id));
        fields.push(rlp::encode_uint(0));
        fields.push(rlp::encode_uint(0));
        rlp::encode_list(&fields)
    }

    /// Broadcast form: `[.., v, r, s]`.
    pub fn rlp_encode_signed(&self) -> Vec<u8> {
        let mut fields = self.encode_common_fields();

        // A freshly signed tx carries the raw recovery id; a decoded one
        // already carries the full EIP-155 value.
        let v = if self.sig.v >= 35 {
            self.sig.v
        } else {
            self.sig.v + 35 + 2 * self.chain_id
        };

        fields.push(rlp::encode_uint(v));
        fields.push(rlp::encode_bytes(&self.sig.r));
        fields.push(rlp::encode_bytes(&self.sig.s));
        rlp::encode_list(&fields)
    }

    pub fn signing_hash(&self) -> [u8; 32] {
        keccak256(&self.rlp_encode_for_signing())
    }

    pub fn compute_hash(&self) -> String {
        format!("0x{}", to_hex(&keccak256(&self.rlp_encode_signed())))
    }

    /// Sign, populate `from` from the key, and cache the hash.
    pub fn sign_with(&mut self, key: &KeyPair) -> Result<(), TxError> {
        let digest = self.signing_hash();
        self.sig = key.sign(&digest)?;
        self.from = key.address();
        self.hash = self.compute_hash();
        Ok(())
    }

    /// A signature is good iff recovery succeeds, yields a non-zero
    /// sender, and matches a pre-populated `from`.
    pub fn verify_signature(&self) -> bool {
        let digest = self.signing_hash();
        match recover_address(&digest, &self.sig, self.chain_id) {
            Ok(recovered) => {
                !recovered.is_zero() && (self.from.is_zero() || recovered == self.from)
            }
            Err(_) => false,
        }
    }

    /// `0x`-prefixed broadcast encoding, the gossip and RPC wire form.
    pub fn to_hex(&self) -> String {
        format!("0x{}", to_hex(&self.rlp_encode_signed()))
    }

    /// Decode a broadcast transaction, derive its chain id from `v`, and
    /// recover the sender.
    pub fn from_hex(input: &str) -> Result<Self, TxError> {
        let raw = from_hex(input)?;
        Self::rlp_decode(&raw)
    }

    pub fn rlp_decode(raw: &[u8]) -> Result<Self, TxError> {
        let root = rlp::decode(raw)?;
        Self::from_item(&root)
    }

    /// Build from an already-decoded 9-item list (used by block decoding,
    /// where transactions arrive nested).
    pub fn from_item(root: &rlp::Item) -> Result<Self, TxError> {
        let items = root.as_list()?;
        if items.len() < 9 {
            return Err(RlpError::ShortList {
                expected: 9,
                found: items.len(),
            }
            .into());
        }

        let mut tx = Transaction {
            nonce: items[0].as_uint()?,
            gas_price: items[1].as_uint()?,
            gas_limit: items[2].as_uint()?,
            ..Default::default()
        };

        let to_bytes = items[3].as_bytes()?;
        tx.to = if to_bytes.is_empty() {
            Address::ZERO
        } else {
            Address::from_slice(to_bytes)?
        };

        tx.value = items[4].as_uint()?;
        tx.data = items[5].as_bytes()?.to_vec();

        let v = items[6].as_uint()?;
        let r = items[7].as_bytes()?;
        let s = items[8].as_bytes()?;
        if r.len() != 32 || s.len() != 32 {
            return Err(TxError::InvalidSignatureLength);
        }
        tx.sig.r.copy_from_slice(r);
        tx.sig.s.copy_from_slice(s);
        tx.sig.v = v;

        tx.chain_id = if v >= 35 { (v - 35) / 2 } else { 0 };
        tx.hash = tx.compute_hash();

        let digest = tx.signing_hash();
        tx.from = recover_address(&digest, &tx.sig, tx.chain_id)?;

        Ok(tx)
    }
}
