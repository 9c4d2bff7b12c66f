//! Periodic mining driver.
//!
//! Wraps the template engine in a timer task: build a candidate, append
//! it through the authoritative ledger path, broadcast, sleep. `get_work`
//! and `submit_work` expose the same engine to off-process miners.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::block::Block;
use crate::engine::ZkMiningEngine;
use crate::ledger::Blockchain;
use crate::p2p::P2pNode;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

struct Worker {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct Miner {
    chain: Arc<Blockchain>,
    p2p: Arc<P2pNode>,
    interval: parking_lot::Mutex<Duration>,
    worker: parking_lot::Mutex<Option<Worker>>,
}

impl Miner {
    pub fn new(chain: Arc<Blockchain>, p2p: Arc<P2pNode>) -> Arc<Self> {
        Arc::new(Miner {
            chain,
            p2p,
            interval: parking_lot::Mutex::new(DEFAULT_INTERVAL),
            worker: parking_lot::Mutex::new(None),
        })
    }

    pub fn set_interval(&self, interval: Duration) {
        *self.interval.lock() = interval;
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Spawn the mining loop. A second start while running is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }

        let (stop, mut stop_rx) = watch::channel(false);
        let miner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                let delay = *miner.interval.lock();
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = tokio::time::sleep(delay) => {
                        miner.mine_once().await;
                    }
                }
            }
        });

        *worker = Some(Worker { stop, handle });
        info!("miner started");
    }

    /// Signal the loop and join it. Idempotent.
    pub async fn stop(&self) {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.stop.send(true);
            let _ = worker.handle.await;
            info!("miner stopped");
        }
    }

    async fn mine_once(&self) {
        let block = match ZkMiningEngine::build_template(&self.chain) {
            Ok(block) => block,
            Err(e) => {
                debug!(error = %e, "template build failed");
                return;
            }
        };

        let index = block.index;
        match self.chain.add_block(block.clone()) {
            Ok(()) => {
                info!(index, txs = block.transactions.len(), "mined block");
                self.p2p.broadcast_block(&block).await;
            }
            // A gossiped block can win the slot between template and
            // append; the index precondition drops ours.
            Err(e) => debug!(index, reason = %e, "mined block not appended"),
        }
    }

    /// Fresh template without appending.
    pub fn get_work(&self) -> anyhow::Result<Block> {
        ZkMiningEngine::build_template(&self.chain)
    }

    /// Validate externally mined work, append it, and broadcast. Returns
    /// whether the block made it onto the chain.
    pub async fn submit_work(&self, block: Block) -> bool {
        if !ZkMiningEngine::validate_mined_block(&block) {
            return false;
        }
        match self.chain.add_block(block.clone()) {
            Ok(()) => {
                self.p2p.broadcast_block(&block).await;
                true
            }
            Err(e) => {
                debug!(reason = %e, "submitted work rejected");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::GenesisConfig;

    fn empty_chain() -> Arc<Blockchain> {
        Arc::new(Blockchain::new(GenesisConfig {
            chain_id: 1,
            premine: vec![],
        }))
    }

    #[tokio::test]
    async fn loop_extends_the_chain() {
        let chain = empty_chain();
        let p2p = P2pNode::new(Arc::clone(&chain));
        let miner = Miner::new(Arc::clone(&chain), p2p);
        miner.set_interval(Duration::from_millis(20));

        miner.start();
        assert!(miner.is_running());
        // Starting twice is harmless.
        miner.start();

        tokio::time::sleep(Duration::from_millis(200)).await;
        miner.stop().await;
        miner.stop().await;
        assert!(!miner.is_running());

        assert!(chain.height() >= 1);
    }

    #[tokio::test]
    async fn get_work_and_submit_work_roundtrip() {
        let chain = empty_chain();
        let p2p = P2pNode::new(Arc::clone(&chain));
        let miner = Miner::new(Arc::clone(&chain), p2p);

        let work = miner.get_work().unwrap();
        assert_eq!(work.index, 1);
        assert_eq!(chain.height(), 0); // nothing appended yet

        assert!(miner.submit_work(work.clone()).await);
        assert_eq!(chain.height(), 1);

        // Stale or corrupted work is refused.
        assert!(!miner.submit_work(work).await);
        let mut forged = miner.get_work().unwrap();
        forged.proof.commitment.push('0');
        assert!(!miner.submit_work(forged).await);
    }
}
