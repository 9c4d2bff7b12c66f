//! Cryptographic primitives: keccak-256 hashing and secp256k1 signing with
//! public-key recovery.
//!
//! The k256 dependency is isolated here; the rest of the crate only sees
//! [`KeyPair`], [`Signature`] and [`recover_address`].
//!
//! ## Recovery discriminant
//!
//! A freshly produced [`Signature`] carries `v` as the raw recovery id
//! (0 or 1). A signature decoded from a broadcast transaction carries the
//! EIP-155 encoded value `rec_id + 35 + 2 * chain_id`; [`recover_address`]
//! accepts both forms and rejects a mismatched chain id.

use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sha3::{Digest, Keccak256};
use thiserror::Error;

use crate::types::{to_hex, Address};

/// Keccak-256 (legacy 0x01 padding, not the SHA-3 variant) over arbitrary
/// input.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Keccak-256 rendered as lowercase hex without prefix.
pub fn keccak256_hex(data: &[u8]) -> String {
    to_hex(&keccak256(data))
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid private key scalar")]
    InvalidPrivateKey,
    #[error("invalid public key encoding")]
    InvalidPublicKey,
    #[error("malformed signature r/s")]
    MalformedSignature,
    #[error("unsupported recovery discriminant v={0}")]
    UnsupportedV(u64),
    #[error("signature chainId mismatch: signed for {found}, expected {expected}")]
    ChainIdMismatch { expected: u64, found: u64 },
    #[error("public key recovery failed")]
    RecoveryFailed,
}

/// Compact ECDSA signature plus recovery discriminant.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Signature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub v: u64,
}

impl Signature {
    fn compact(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.r);
        out[32..].copy_from_slice(&self.s);
        out
    }
}

/// A secp256k1 keypair. The public key is cached in its 64-byte
/// uncompressed form (x||y, SEC1 prefix stripped).
#[derive(Clone)]
pub struct KeyPair {
    signing: SigningKey,
    public: [u8; 64],
}

impl KeyPair {
    /// Generate a fresh keypair. Scalar sampling retries internally until
    /// the value lands in `[1, n-1]`.
    pub fn random() -> Self {
        let signing = SigningKey::random(&mut OsRng);
        Self::from_signing_key(signing)
    }

    pub fn from_private_key(bytes: &[u8]) -> Result<Self, CryptoError> {
        let signing = SigningKey::from_slice(bytes).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self::from_signing_key(signing))
    }

    fn from_signing_key(signing: SigningKey) -> Self {
        let point = signing.verifying_key().to_encoded_point(false);
        let mut public = [0u8; 64];
        public.copy_from_slice(&point.as_bytes()[1..]);
        KeyPair { signing, public }
    }

    /// 64-byte uncompressed public key (x||y).
    pub fn public_key(&self) -> &[u8; 64] {
        &self.public
    }

    pub fn private_key_bytes(&self) -> [u8; 32] {
        self.signing.to_bytes().into()
    }

    pub fn address(&self) -> Address {
        // The cached key is always a valid 64-byte encoding.
        Address::from_pubkey(&self.public).expect("64-byte public key")
    }

    /// Sign a 32-byte digest. The returned `v` is the raw recovery id;
    /// EIP-155 encoding happens at serialisation time.
    pub fn sign(&self, digest: &[u8; 32]) -> Result<Signature, CryptoError> {
        let (sig, recid) = self
            .signing
            .sign_prehash_recoverable(digest)
            .map_err(|_| CryptoError::MalformedSignature)?;
        let (r, s) = sig.split_bytes();
        let mut out = Signature::default();
        out.r.copy_from_slice(&r);
        out.s.copy_from_slice(&s);
        out.v = u64::from(recid.to_byte());
        Ok(out)
    }

    /// Verify a signature against an explicit 64-byte public key. The
    /// signature is normalised to low-s form before verification.
    pub fn verify(digest: &[u8; 32], sig: &Signature, pubkey: &[u8]) -> bool {
        let key = match parse_pubkey(pubkey) {
            Ok(k) => k,
            Err(_) => return false,
        };
        let parsed = match EcdsaSignature::from_slice(&sig.compact()) {
            Ok(p) => p,
            Err(_) => return false,
        };
        let normalized = parsed.normalize_s().unwrap_or(parsed);
        key.verify_prehash(digest, &normalized).is_ok()
    }
}

fn parse_pubkey(pubkey: &[u8]) -> Result<VerifyingKey, CryptoError> {
    if pubkey.len() != 64 {
        return Err(CryptoError::InvalidPublicKey);
    }
    let mut sec1 = [0u8; 65];
    sec1[0] = 0x04;
    sec1[1..].copy_from_slice(pubkey);
    VerifyingKey::from_sec1_bytes(&sec1).map_err(|_| CryptoError::InvalidPublicKey)
}

/// Recover the signer address from a digest and signature.
///
/// `v` in {0, 1} is a raw recovery id; otherwise `v >= 35` is required and
/// must encode the expected chain id.
pub fn recover_address(
    digest: &[u8; 32],
    sig: &Signature,
    chain_id: u64,
) -> Result<Address, CryptoError> {
    let rec_id = match sig.v {
        0 | 1 => sig.v as u8,
        v if v >= 35 => {
            let found = (v - 35) / 2;
            if found != chain_id {
                return Err(CryptoError::ChainIdMismatch {
                    expected: chain_id,
                    found,
                });
            }
            (v - 35 - 2 * chain_id) as u8
        }
        v => return Err(CryptoError::UnsupportedV(v)),
    };

    let recid = RecoveryId::from_byte(rec_id).ok_or(CryptoError::UnsupportedV(sig.v))?;
    let parsed =
        EcdsaSignature::from_slice(&sig.compact()).map_err(|_| CryptoError::MalformedSignature)?;

    let key = VerifyingKey::recover_from_prehash(digest, &parsed, recid)
        .map_err(|_| CryptoError::RecoveryFailed)?;

    let point = key.to_encoded_point(false);
    Address::from_pubkey(point.as_bytes()).map_err(|_| CryptoError::RecoveryFailed)
}
