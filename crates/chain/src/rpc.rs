//! JSON-RPC 2.0 query surface over HTTP.
//!
//! One POST route; the body is a single JSON-RPC request object. The id
//! token is echoed verbatim (or `null` when absent). Error codes follow
//! the usual convention: -32700 parse error, -32601 unknown method,
//! -32602 invalid params, -32000 validation failures with the ledger's
//! reason string as the message.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::block::Block;
use crate::ledger::Blockchain;
use crate::miner::Miner;
use crate::tx::Transaction;
use crate::types::Address;

pub const PARSE_ERROR: i64 = -32700;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const SERVER_ERROR: i64 = -32000;

/// Shared handles the dispatcher works against.
pub struct RpcContext {
    pub chain: Arc<Blockchain>,
    pub miner: Option<Arc<Miner>>,
}

fn rpc_result(id: &Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "result": result, "id": id })
}

fn rpc_error(id: &Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": { "code": code, "message": message },
        "id": id,
    })
}

fn hex_u64(v: u64) -> String {
    format!("0x{v:x}")
}

fn param_str<'a>(params: &'a [Value], index: usize) -> Option<&'a str> {
    params.get(index).and_then(Value::as_str)
}

/// Accepts `"1500"`, `1500`, or `"0x5dc"`.
fn param_u64(params: &[Value], index: usize) -> Option<u64> {
    match params.get(index)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                u64::from_str_radix(hex, 16).ok()
            } else {
                s.parse().ok()
            }
        }
        _ => None,
    }
}

fn block_json(block: &Block) -> Value {
    json!({
        "number": hex_u64(block.index),
        "hash": block.hash,
        "parentHash": block.prev_hash,
        "stateRoot": block.state_after,
        "txRoot": block.tx_root,
        "receiptsRoot": block.receipts_root,
        "timestamp": hex_u64(block.timestamp),
    })
}

fn tx_json(tx: &Transaction, block_hash: Option<&str>, block_index: Option<u64>) -> Value {
    let mut out = json!({
        "hash": tx.hash,
        "from": tx.from.to_hex(),
        "to": tx.to.to_hex(),
        "value": hex_u64(tx.value),
        "nonce": hex_u64(tx.nonce),
        "gasPrice": hex_u64(tx.gas_price),
        "gas": hex_u64(tx.gas_limit),
    });
    if let (Some(hash), Some(index)) = (block_hash, block_index) {
        out["blockHash"] = json!(hash);
        out["blockNumber"] = json!(hex_u64(index));
    }
    out
}

/// Dispatch one request body to a response value. Pure aside from the
/// ledger/miner effects, so tests can skip HTTP entirely.
pub async fn handle_request(ctx: &RpcContext, body: &str) -> Value {
    let req: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return rpc_error(&Value::Null, PARSE_ERROR, "Parse error"),
    };

    let id = req.get("id").cloned().unwrap_or(Value::Null);
    let Some(method) = req.get("method").and_then(Value::as_str) else {
        return rpc_error(&id, METHOD_NOT_FOUND, "Method not found");
    };
    let empty = Vec::new();
    let params = req
        .get("params")
        .and_then(Value::as_array)
        .unwrap_or(&empty);

    debug!(method, "rpc request");
    let chain = &ctx.chain;

    match method {
        "eth_blockNumber" => rpc_result(&id, json!(hex_u64(chain.height()))),

        "eth_chainId" => rpc_result(&id, json!(hex_u64(chain.chain_id()))),

        // Always the configured chain id, rendered decimal.
        "net_version" => rpc_result(&id, json!(chain.chain_id().to_string())),

        "eth_getBalance" => match param_str(params, 0).map(Address::from_hex) {
            Some(Ok(addr)) => rpc_result(&id, json!(hex_u64(chain.balance(&addr)))),
            _ => rpc_error(&id, INVALID_PARAMS, "Invalid address"),
        },

        "eth_getTransactionCount" => match param_str(params, 0).map(Address::from_hex) {
            Some(Ok(addr)) => rpc_result(&id, json!(hex_u64(chain.nonce_of(&addr)))),
            _ => rpc_error(&id, INVALID_PARAMS, "Invalid address"),
        },

        "eth_sendRawTransaction" => {
            let Some(raw) = param_str(params, 0) else {
                return rpc_error(&id, INVALID_PARAMS, "Invalid params");
            };
            let tx = match Transaction::from_hex(raw) {
                Ok(tx) => tx,
                Err(e) => return rpc_error(&id, INVALID_PARAMS, &e.to_string()),
            };
            if let Err(e) = chain.validate_transaction(&tx) {
                return rpc_error(&id, SERVER_ERROR, &e.to_string());
            }
            let hash = tx.hash.clone();
            match chain.add_transaction(tx) {
                Ok(_) => rpc_result(&id, json!(hash)),
                Err(e) => rpc_error(&id, SERVER_ERROR, &e.to_string()),
            }
        }

        "eth_getBlockByNumber" => {
            let Some(index) = param_u64(params, 0) else {
                return rpc_error(&id, INVALID_PARAMS, "Invalid block number");
            };
            match chain.block_by_index(index) {
                Some(block) => rpc_result(&id, block_json(&block)),
                None => rpc_result(&id, Value::Null),
            }
        }

        "eth_getBlockByHash" => {
            let Some(hash) = param_str(params, 0) else {
                return rpc_error(&id, INVALID_PARAMS, "Invalid block hash");
            };
            match chain.block_by_hash(hash) {
                Some(block) => rpc_result(&id, block_json(&block)),
                None => rpc_result(&id, Value::Null),
            }
        }

        "eth_getTransactionByHash" => {
            let Some(hash) = param_str(params, 0) else {
                return rpc_error(&id, INVALID_PARAMS, "Invalid transaction hash");
            };
            match chain.tx_by_hash(hash) {
                Some(loc) => rpc_result(
                    &id,
                    tx_json(&loc.tx, loc.block_hash.as_deref(), loc.block_index),
                ),
                None => rpc_result(&id, Value::Null),
            }
        }

        "eth_getWork" => match &ctx.miner {
            Some(miner) => match miner.get_work() {
                Ok(block) => rpc_result(&id, json!(block.to_hex())),
                Err(e) => rpc_error(&id, SERVER_ERROR, &e.to_string()),
            },
            None => rpc_error(&id, SERVER_ERROR, "Mining is not enabled"),
        },

        "eth_submitWork" => {
            let Some(miner) = &ctx.miner else {
                return rpc_error(&id, SERVER_ERROR, "Mining is not enabled");
            };
            let Some(raw) = param_str(params, 0) else {
                return rpc_error(&id, INVALID_PARAMS, "Invalid params");
            };
            match Block::from_hex(raw) {
                Ok(block) => {
                    let accepted = miner.submit_work(block).await;
                    rpc_result(&id, json!(if accepted { "ok" } else { "invalid" }))
                }
                Err(e) => rpc_error(&id, INVALID_PARAMS, &e.to_string()),
            }
        }

        "miner_start" => match &ctx.miner {
            Some(miner) => {
                miner.start();
                rpc_result(&id, json!("ok"))
            }
            None => rpc_error(&id, SERVER_ERROR, "Mining is not enabled"),
        },

        "miner_stop" => match &ctx.miner {
            Some(miner) => {
                miner.stop().await;
                rpc_result(&id, json!("ok"))
            }
            None => rpc_error(&id, SERVER_ERROR, "Mining is not enabled"),
        },

        "miner_setInterval" => {
            let Some(miner) = &ctx.miner else {
                return rpc_error(&id, SERVER_ERROR, "Mining is not enabled");
            };
            match param_u64(params, 0) {
                Some(ms) => {
                    miner.set_interval(Duration::from_millis(ms));
                    rpc_result(&id, json!("ok"))
                }
                None => rpc_error(&id, INVALID_PARAMS, "Invalid interval"),
            }
        }

        _ => rpc_error(&id, METHOD_NOT_FOUND, "Method not found"),
    }
}

async fn rpc_endpoint(State(ctx): State<Arc<RpcContext>>, body: String) -> Json<Value> {
    Json(handle_request(&ctx, &body).await)
}

struct ServeState {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct RpcServer {
    ctx: Arc<RpcContext>,
    state: parking_lot::Mutex<Option<ServeState>>,
}

impl RpcServer {
    pub fn new(chain: Arc<Blockchain>, miner: Option<Arc<Miner>>) -> Self {
        RpcServer {
            ctx: Arc::new(RpcContext { chain, miner }),
            state: parking_lot::Mutex::new(None),
        }
    }

    /// Bind and serve. Port 0 binds an ephemeral port; the bound address
    /// is returned.
    pub async fn start(&self, port: u16) -> Result<SocketAddr> {
        let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("rpc bind on port {port}"))?;
        let local_addr = listener.local_addr().context("rpc local addr")?;

        let app = Router::new()
            .route("/", post(rpc_endpoint))
            .with_state(Arc::clone(&self.ctx));

        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });
            if let Err(e) = serve.await {
                tracing::warn!(error = %e, "rpc server exited with error");
            }
        });

        *self.state.lock() = Some(ServeState {
            local_addr,
            shutdown,
            task,
        });

        info!(addr = %local_addr, "rpc server listening");
        Ok(local_addr)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.state.lock().as_ref().map(|s| s.local_addr)
    }

    pub async fn stop(&self) {
        let state = self.state.lock().take();
        if let Some(state) = state {
            let _ = state.shutdown.send(true);
            let _ = state.task.await;
            info!("rpc server stopped");
        }
    }
}
