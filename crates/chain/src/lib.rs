//! # ferrite-chain
//!
//! Core library for a minimal Ethereum-inspired blockchain node: a
//! replicated, verifiable ledger with deterministic state transition,
//! block production, gossip, and a JSON-RPC query surface.
//!
//! ## Module overview
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | `types` | `Address`, hex codec |
//! | `crypto` | keccak-256, secp256k1 keys, signature recovery |
//! | `rlp` | canonical recursive-length-prefix encoding |
//! | `trie` | simplified Merkle-Patricia trie, root digests |
//! | `state` | accounts, world state, state root |
//! | `tx` | signed transactions, EIP-155 forms |
//! | `receipt` | execution receipts, logs, 2048-bit bloom |
//! | `proof` | zero-knowledge proof stub (commitment scheme) |
//! | `block` | block structure, header hash, 12-field RLP |
//! | `mempool` | pending queue with hash/(sender,nonce) dedup |
//! | `ledger` | the chain: validation, mining, append, queries |
//! | `engine` | pure block-template builder |
//! | `miner` | periodic mining driver, external-work hooks |
//! | `vm` | placeholder contract-VM dispatch |
//! | `p2p` | framed TCP gossip: peers, broadcast, dispatch |
//! | `rpc` | JSON-RPC 2.0 server (axum) |
//!
//! ## Concurrency
//!
//! One mutex inside [`ledger::Blockchain`] guards chain, state, and
//! mempool; every mutation takes it for its full critical section and no
//! await point ever runs under it. Long-running activities (accept loop,
//! per-peer receive loops, miner loop, RPC connections) are tokio tasks
//! stopped through watch channels.

pub mod block;
pub mod crypto;
pub mod engine;
pub mod ledger;
pub mod mempool;
pub mod miner;
pub mod p2p;
pub mod proof;
pub mod receipt;
pub mod rlp;
pub mod rpc;
pub mod state;
pub mod trie;
pub mod tx;
pub mod types;
pub mod vm;

pub use block::Block;
pub use crypto::{KeyPair, Signature};
pub use engine::ZkMiningEngine;
pub use ledger::{Blockchain, GenesisConfig, ValidationError};
pub use miner::Miner;
pub use p2p::P2pNode;
pub use proof::{ZkProof, ZkProver, ZkVerifier};
pub use rpc::RpcServer;
pub use state::{Account, WorldState};
pub use tx::Transaction;
pub use types::Address;
