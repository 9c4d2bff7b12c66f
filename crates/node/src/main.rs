//! # ferrite-node
//!
//! Standalone node entry point. Wires the core components per the boot
//! configuration and runs until interrupted:
//!
//! 1. Parse CLI flags.
//! 2. Initialise genesis (dev-key premine when none is given).
//! 3. Start P2P and dial the bootstrap peers.
//! 4. Start the RPC server.
//! 5. Start (or one-shot run) the miner.
//! 6. Wait for ctrl-c, then stop miner → RPC → P2P.

mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ferrite_chain::{Blockchain, GenesisConfig, KeyPair, Miner, P2pNode, RpcServer};

use config::{
    parse_peer_entry, parse_premine_entry, NodeConfig, DEFAULT_PREMINE_AMOUNT, DEV_PRIVATE_KEY,
};

#[derive(Debug, Parser)]
#[command(name = "ferrite-node", about = "Minimal Ethereum-inspired blockchain node")]
struct Cli {
    /// Network chain identifier mixed into transaction signatures.
    #[arg(long, default_value_t = 1337)]
    chain_id: u64,

    /// Genesis allocation, repeatable: 0xaddress:amount.
    #[arg(long = "premine", value_name = "ADDR:AMOUNT")]
    premine: Vec<String>,

    /// P2P listen port (binds all interfaces).
    #[arg(long, default_value_t = 30303)]
    p2p_port: u16,

    /// RPC listen port (binds all interfaces).
    #[arg(long, default_value_t = 8545)]
    rpc_port: u16,

    /// Disable the P2P subsystem.
    #[arg(long)]
    no_p2p: bool,

    /// Enable the JSON-RPC server.
    #[arg(long)]
    rpc: bool,

    /// Enable periodic mining.
    #[arg(long)]
    mine: bool,

    /// Mine exactly N blocks at boot, then keep running.
    #[arg(long, default_value_t = 0)]
    mine_blocks: u32,

    /// Delay between mining attempts.
    #[arg(long, default_value_t = 5000)]
    miner_interval_ms: u64,

    /// Bootstrap peer, repeatable: host:port.
    #[arg(long = "peer", value_name = "HOST:PORT")]
    peers: Vec<String>,
}

impl Cli {
    fn into_config(self) -> Result<NodeConfig> {
        let premine = self
            .premine
            .iter()
            .map(|e| parse_premine_entry(e))
            .collect::<Result<Vec<_>>>()?;
        let peers = self
            .peers
            .iter()
            .map(|e| parse_peer_entry(e))
            .collect::<Result<Vec<_>>>()?;

        Ok(NodeConfig {
            chain_id: self.chain_id,
            premine,
            p2p_port: self.p2p_port,
            rpc_port: self.rpc_port,
            enable_p2p: !self.no_p2p,
            enable_rpc: self.rpc,
            enable_mining: self.mine,
            mine_blocks: self.mine_blocks,
            miner_interval_ms: self.miner_interval_ms,
            peers,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_config()?;
    run(config).await
}

async fn run(config: NodeConfig) -> Result<()> {
    let premine = if config.premine.is_empty() {
        let dev_key = KeyPair::from_private_key(&DEV_PRIVATE_KEY).context("dev key")?;
        let coinbase = dev_key.address();
        warn!(address = %coinbase, "no premine configured, funding the dev key");
        vec![(coinbase, DEFAULT_PREMINE_AMOUNT)]
    } else {
        config.premine.clone()
    };

    let chain = Arc::new(Blockchain::new(GenesisConfig {
        chain_id: config.chain_id,
        premine,
    }));
    let genesis = chain
        .block_by_index(0)
        .expect("genesis exists after construction");
    info!(
        chain_id = config.chain_id,
        genesis_hash = %genesis.hash,
        state_root = %genesis.state_after,
        "chain initialised"
    );

    let p2p = if config.enable_p2p {
        let node = P2pNode::new(Arc::clone(&chain));
        node.start(config.p2p_port).await?;
        for (host, port) in &config.peers {
            node.connect_to(host, *port).await;
        }
        Some(node)
    } else {
        info!("p2p networking disabled");
        None
    };

    let miner = match &p2p {
        Some(p2p) => {
            let miner = Miner::new(Arc::clone(&chain), Arc::clone(p2p));
            miner.set_interval(Duration::from_millis(config.miner_interval_ms));
            if config.enable_mining {
                miner.start();
            }
            Some(miner)
        }
        None => {
            if config.enable_mining {
                warn!("mining requires the p2p subsystem, skipping");
            }
            None
        }
    };

    let rpc = if config.enable_rpc {
        let server = RpcServer::new(Arc::clone(&chain), miner.clone());
        server.start(config.rpc_port).await?;
        Some(server)
    } else {
        info!("rpc server disabled");
        None
    };

    if config.mine_blocks > 0 {
        info!(count = config.mine_blocks, "one-shot mining requested");
        for i in 0..config.mine_blocks {
            let block = chain.mine_block()?;
            info!(index = block.index, hash = %block.hash, "mined block");
            if let Some(p2p) = &p2p {
                p2p.broadcast_block(&block).await;
            }
            if i + 1 < config.mine_blocks {
                tokio::time::sleep(Duration::from_millis(config.miner_interval_ms)).await;
            }
        }
    }

    info!("node running, ctrl-c to stop");
    tokio::signal::ctrl_c().await.context("ctrl-c handler")?;
    info!("shutting down");

    if let Some(miner) = &miner {
        miner.stop().await;
    }
    if let Some(rpc) = &rpc {
        rpc.stop().await;
    }
    if let Some(p2p) = &p2p {
        p2p.stop().await;
    }

    info!("node stopped");
    Ok(())
}
