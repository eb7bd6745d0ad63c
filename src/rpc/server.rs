// JSON-RPC-over-HTTP server exposing the P2P surface: Ping, BroadcastBlock,
// BroadcastTransaction, QueryLevel, QueryByHash.

use std::collections::HashSet;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::broadcast::BroadcastQueue;
use crate::crypto::keys::Curve;
use crate::pool::TransactionPool;
use crate::primitives::block::Block;
use crate::primitives::transaction::Transaction;
use crate::storage::Storage;

pub struct RpcState {
    pub storage: Arc<Storage>,
    pub pool: Arc<TransactionPool>,
    pub broadcast: Arc<BroadcastQueue>,
    pub curve: Curve,
}

async fn handle_rpc(state: &RpcState, method: &str, params: &Value) -> Result<Value, (i32, String)> {
    match method {
        "ping" => {
            let echoed = params.get(0).and_then(|v| v.as_str()).unwrap_or("").to_string();
            Ok(json!(echoed))
        }

        "broadcastBlock" => {
            let block: Block = serde_json::from_value(params.get(0).cloned().unwrap_or(Value::Null))
                .map_err(|e| (-32602, format!("invalid block: {e}")))?;
            let hop = params.get(1).and_then(|v| v.as_u64()).unwrap_or(0) as u32;
            let seen: HashSet<String> = params
                .get(2)
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default();

            let hash = crate::crypto::hash::to_hex(&block.hash());
            let accepted = state.storage.add(block.clone());
            if accepted {
                state.broadcast.add_block(block, hop, seen);
            } else {
                eprintln!("rejected block {hash}");
            }
            Ok(json!({ "accepted": accepted }))
        }

        "broadcastTransaction" => {
            let tx: Transaction = serde_json::from_value(params.get(0).cloned().unwrap_or(Value::Null))
                .map_err(|e| (-32602, format!("invalid transaction: {e}")))?;
            let hop = params.get(1).and_then(|v| v.as_u64()).unwrap_or(0) as u32;
            let seen: HashSet<String> = params
                .get(2)
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .unwrap_or_default();

            if !tx.check_without_balance(state.curve) {
                eprintln!("rejected transaction: failed signature/shape check");
                return Ok(json!({ "accepted": false }));
            }
            let accepted = state.pool.push(tx.clone());
            if accepted {
                state.broadcast.add_transaction(tx, hop, seen);
            }
            Ok(json!({ "accepted": accepted }))
        }

        "queryLevel" => {
            let level0 = params.get(0).and_then(|v| v.as_u64()).ok_or((-32602, "level0 required".to_string()))?;
            let level1 = params.get(1).and_then(|v| v.as_u64()).unwrap_or(level0);
            Ok(json!(state.storage.get_blocks_level_hash(level0, level1)))
        }

        "queryByHash" => {
            let hash = params.get(0).and_then(|v| v.as_str()).ok_or((-32602, "hash required".to_string()))?;
            match state.storage.get_by_hash(hash) {
                Some(block) => Ok(json!(block)),
                None => Err((-32602, "block not found".to_string())),
            }
        }

        other => Err((-32601, format!("unknown method: {other}"))),
    }
}

fn rpc_error_response(id: Value, code: i32, message: String) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
}

fn rpc_ok_response(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

async fn service(
    state: Arc<RpcState>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => return Ok(json_response(rpc_error_response(Value::Null, -32700, "body read error".to_string()))),
    };

    let envelope: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return Ok(json_response(rpc_error_response(Value::Null, -32700, "parse error".to_string()))),
    };

    let id = envelope.get("id").cloned().unwrap_or(Value::Null);
    let method = envelope.get("method").and_then(|v| v.as_str()).unwrap_or("");
    let params = envelope.get("params").cloned().unwrap_or(Value::Array(Vec::new()));

    let response = match handle_rpc(&state, method, &params).await {
        Ok(result) => rpc_ok_response(id, result),
        Err((code, message)) => rpc_error_response(id, code, message),
    };
    Ok(json_response(response))
}

fn json_response(body: Value) -> Response<Full<Bytes>> {
    Response::builder()
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

/// Binds `addr` and serves RPC connections until the process exits.
pub async fn serve(addr: SocketAddr, state: Arc<RpcState>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let state = state.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| service(state.clone(), req));
            if let Err(err) = hyper::server::conn::http1::Builder::new().serve_connection(io, service).await {
                eprintln!("rpc connection error: {err}");
            }
        });
    }
}
