//! Node configuration, supplied once at boot and never hot-reloaded.

use anyhow::{anyhow, bail, Context, Result};

use ferrite_chain::Address;

/// Well-known development key (the standard Hardhat/Foundry dev key).
/// Funds the default premine when none is configured. Never use outside
/// local development.
pub const DEV_PRIVATE_KEY: [u8; 32] = [
    0xac, 0x09, 0x74, 0xbe, 0xc3, 0x9a, 0x17, 0xe3, 0x6b, 0xa4, 0xa6, 0xb4, 0xd2, 0x38, 0xff,
    0x94, 0x4b, 0xac, 0xb4, 0x78, 0xcb, 0xed, 0x5e, 0xfc, 0xae, 0x78, 0x4d, 0x7b, 0xf4, 0xf2,
    0xff, 0x80,
];

pub const DEFAULT_PREMINE_AMOUNT: u64 = 1_000_000;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub chain_id: u64,
    pub premine: Vec<(Address, u64)>,
    pub p2p_port: u16,
    pub rpc_port: u16,
    pub enable_p2p: bool,
    pub enable_rpc: bool,
    pub enable_mining: bool,
    /// One-shot mode: mine N blocks at boot, pausing between them.
    pub mine_blocks: u32,
    pub miner_interval_ms: u64,
    /// Bootstrap peers as `host:port` strings. Discovery is reduced to
    /// this plain list; there is no seeder protocol in the core.
    pub peers: Vec<(String, u16)>,
}

/// `0xaddress:amount`, e.g. `0xaaaa…aaaa:1000`.
pub fn parse_premine_entry(entry: &str) -> Result<(Address, u64)> {
    let (addr, amount) = entry
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("premine entry must be 0xaddress:amount, got {entry:?}"))?;
    let addr = Address::from_hex(addr).with_context(|| format!("premine address {addr:?}"))?;
    let amount: u64 = amount
        .parse()
        .with_context(|| format!("premine amount {amount:?}"))?;
    Ok((addr, amount))
}

/// `host:port`.
pub fn parse_peer_entry(entry: &str) -> Result<(String, u16)> {
    let (host, port) = entry
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("peer must be host:port, got {entry:?}"))?;
    if host.is_empty() {
        bail!("peer host is empty in {entry:?}");
    }
    let port: u16 = port.parse().with_context(|| format!("peer port {port:?}"))?;
    Ok((host.to_string(), port))
}
