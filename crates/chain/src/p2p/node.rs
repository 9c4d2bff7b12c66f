//! The gossip node: TCP listener, outbound connector, peer registry, and
//! the inbound message dispatcher.
//!
//! Inbound NEW_TX and NEW_BLOCK payloads are parsed and fed to the
//! ledger; anything malformed or invalid is logged and dropped, so a peer
//! can never take down more than its own connection. Inbound messages are
//! not re-broadcast; flooding stops at first-hop neighbours.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::block::Block;
use crate::crypto::KeyPair;
use crate::ledger::Blockchain;
use crate::tx::Transaction;

use super::message::{Message, MessageType};
use super::peer::Peer;

struct ListenState {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

pub struct P2pNode {
    chain: Arc<Blockchain>,
    /// Node identity; advertised in HELLO once the handshake grows one.
    identity: KeyPair,
    peers: Arc<parking_lot::Mutex<Vec<Arc<Peer>>>>,
    listen: parking_lot::Mutex<Option<ListenState>>,
}

impl P2pNode {
    pub fn new(chain: Arc<Blockchain>) -> Arc<Self> {
        Arc::new(P2pNode {
            chain,
            identity: KeyPair::random(),
            peers: Arc::new(parking_lot::Mutex::new(Vec::new())),
            listen: parking_lot::Mutex::new(None),
        })
    }

    pub fn node_id(&self) -> String {
        self.identity.address().to_hex()
    }

    /// Bind and start accepting. Port 0 binds an ephemeral port; the
    /// bound address is returned either way.
    pub async fn start(self: &Arc<Self>, port: u16) -> Result<SocketAddr> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("p2p bind on port {port}"))?;
        let local_addr = listener.local_addr().context("p2p local addr")?;

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let node = Arc::clone(self);
        let accept_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, addr)) => {
                            debug!(peer = %addr, "inbound peer connected");
                            node.adopt_peer(stream, addr.to_string());
                        }
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                        }
                    }
                }
            }
        });

        *self.listen.lock() = Some(ListenState {
            local_addr,
            shutdown,
            accept_task,
        });

        info!(addr = %local_addr, node_id = %self.node_id(), "p2p node listening");
        Ok(local_addr)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listen.lock().as_ref().map(|l| l.local_addr)
    }

    /// Outbound dial. Failure is logged and dropped; gossip tolerates an
    /// incomplete peer set.
    pub async fn connect_to(self: &Arc<Self>, host: &str, port: u16) -> bool {
        let remote = format!("{host}:{port}");
        match TcpStream::connect((host, port)).await {
            Ok(stream) => {
                info!(peer = %remote, "outbound peer connected");
                self.adopt_peer(stream, remote);
                true
            }
            Err(e) => {
                debug!(peer = %remote, error = %e, "connect failed");
                false
            }
        }
    }

    fn adopt_peer(self: &Arc<Self>, stream: TcpStream, remote: String) {
        let (peer, reader) = Peer::new(stream, remote);
        self.peers.lock().push(Arc::clone(&peer));

        let chain = Arc::clone(&self.chain);
        peer.start(reader, move |msg| dispatch(&chain, msg));
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().iter().filter(|p| p.is_alive()).count()
    }

    async fn broadcast(&self, msg: Message) {
        // Snapshot under the lock, send outside it.
        let peers: Vec<Arc<Peer>> = self.peers.lock().iter().cloned().collect();
        for peer in peers {
            peer.send(&msg).await;
        }
    }

    pub async fn broadcast_tx(&self, tx: &Transaction) {
        self.broadcast(Message::from_str_payload(MessageType::NewTx, &tx.to_hex()))
            .await;
    }

    pub async fn broadcast_block(&self, block: &Block) {
        self.broadcast(Message::from_str_payload(
            MessageType::NewBlock,
            &block.to_hex(),
        ))
        .await;
    }

    /// Stop accepting, then stop every peer. Idempotent.
    pub async fn stop(&self) {
        let listen = self.listen.lock().take();
        if let Some(listen) = listen {
            let _ = listen.shutdown.send(true);
            let _ = listen.accept_task.await;
        }

        let peers: Vec<Arc<Peer>> = self.peers.lock().drain(..).collect();
        for peer in peers {
            peer.stop().await;
        }
        info!("p2p node stopped");
    }
}

/// Inbound message handling. Parsers raise typed failures; this layer
/// decides drop-vs-report.
fn dispatch(chain: &Arc<Blockchain>, msg: Message) {
    match msg.kind {
        MessageType::NewTx => {
            let hex = String::from_utf8_lossy(&msg.payload);
            match Transaction::from_hex(&hex) {
                Ok(tx) => {
                    if let Err(e) = chain.validate_transaction(&tx) {
                        debug!(reason = %e, "gossiped transaction rejected");
                        return;
                    }
                    match chain.add_transaction(tx) {
                        Ok(hash) => debug!(tx_hash = %hash, "gossiped transaction admitted"),
                        Err(e) => debug!(reason = %e, "gossiped transaction dropped"),
                    }
                }
                Err(e) => debug!(error = %e, "malformed NEW_TX payload ignored"),
            }
        }
        MessageType::NewBlock => {
            let hex = String::from_utf8_lossy(&msg.payload);
            match Block::from_hex(&hex) {
                Ok(block) => match chain.add_block(block) {
                    Ok(()) => debug!("gossiped block appended"),
                    Err(e) => debug!(reason = %e, "gossiped block dropped"),
                },
                Err(e) => debug!(error = %e, "malformed NEW_BLOCK payload ignored"),
            }
        }
        // HELLO / GET_BLOCKS / BLOCKS_RESPONSE / PING / PONG are ignored
        // in this core.
        _ => {}
    }
}
