// Outbound JSON-RPC calls to peers and the central peer-registry: Ping for
// liveness (with RTT measurement), registry registration/discovery, the
// per-peer block sync protocol, and the periodic loops that drive both.

use std::sync::Arc;
use std::time::{Duration, Instant};

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::Request;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde_json::{json, Value};

use crate::net::pool::PeerPool;
use crate::primitives::block::Block;
use crate::storage::Storage;

pub type HttpClient = Client<hyper_util::client::legacy::connect::HttpConnector, Full<Bytes>>;

/// Ping and RPC calls run under this deadline; a peer that misses it is
/// treated the same as a transport failure.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// Block-level window width for `sync_blocks`' `QueryLevel` sweep.
const SYNC_WINDOW: u64 = 5;

pub fn http_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build_http()
}

/// POSTs a JSON-RPC 2.0 envelope to `addr` over `client` and returns the
/// `result` field, or an error string on any transport, parse, or RPC-level
/// failure.
pub async fn call_rpc_with(client: &HttpClient, addr: &str, method: &str, params: Value) -> Result<Value, String> {
    let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params }).to_string();
    let request = Request::builder()
        .method("POST")
        .uri(format!("http://{addr}/"))
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .map_err(|e| e.to_string())?;

    let call = async {
        let response = client.request(request).await.map_err(|e| e.to_string())?;
        let bytes = response.into_body().collect().await.map_err(|e| e.to_string())?.to_bytes();
        let envelope: Value = serde_json::from_slice(&bytes).map_err(|e| e.to_string())?;
        if let Some(error) = envelope.get("error") {
            return Err(error.to_string());
        }
        Ok(envelope.get("result").cloned().unwrap_or(Value::Null))
    };

    match tokio::time::timeout(DEFAULT_RPC_TIMEOUT, call).await {
        Ok(result) => result,
        Err(_) => Err("rpc call timed out".to_string()),
    }
}

/// Convenience wrapper for one-off calls with no pooled connection to reuse
/// (registry traffic; the registry is a single fixed address, not a gossip peer).
pub async fn call_rpc(addr: &str, method: &str, params: Value) -> Result<Value, String> {
    call_rpc_with(&http_client(), addr, method, params).await
}

/// Pings `addr` over `client` and returns the round-trip time on success.
pub async fn ping_with_rtt(client: &HttpClient, addr: &str) -> Option<Duration> {
    let started = Instant::now();
    call_rpc_with(client, addr, "ping", json!([addr])).await.ok()?;
    Some(started.elapsed())
}

pub async fn register_with_registry(registry_addr: &str, self_address: &str) -> Result<(), String> {
    call_rpc(registry_addr, "register", json!([self_address])).await.map(|_| ())
}

pub async fn fetch_peers_from_registry(registry_addr: &str) -> Vec<String> {
    match call_rpc(registry_addr, "peers", json!([])).await {
        Ok(Value::Array(addrs)) => addrs.into_iter().filter_map(|v| v.as_str().map(String::from)).collect(),
        _ => Vec::new(),
    }
}

/// Periodically re-registers with the registry, pulls its current peer list,
/// pings every known peer to refresh RTT, and evicts both dead peers and,
/// once the pool exceeds its configured capacity, the slowest-RTT tail.
pub async fn peer_sync_loop(registry_addr: String, self_address: String, peers: Arc<PeerPool>, interval: Duration) {
    loop {
        if let Err(err) = register_with_registry(&registry_addr, &self_address).await {
            eprintln!("registry {registry_addr} unreachable: {err}");
        }
        for addr in fetch_peers_from_registry(&registry_addr).await {
            if addr != self_address {
                peers.add(addr);
            }
        }
        peers.probe_all().await;
        peers.evict_excess();
        tokio::time::sleep(interval).await;
    }
}

/// Walks a single peer's chain in 5-level windows starting from level 0,
/// filtering to hashes not already in local storage, fetching each by hash,
/// and adding whatever decodes. Stops once a window yields no unseen hashes
/// or no block actually gets fetched.
pub async fn sync_blocks(client: &HttpClient, addr: &str, storage: &Arc<Storage>) {
    let mut level0: u64 = 0;
    let mut level1: u64 = SYNC_WINDOW - 1;
    loop {
        let hashes = match call_rpc_with(client, addr, "queryLevel", json!([level0, level1])).await {
            Ok(Value::Array(arr)) => arr.into_iter().filter_map(|v| v.as_str().map(String::from)).collect::<Vec<_>>(),
            _ => return,
        };
        let unseen = storage.filter_new_hashes(&hashes);
        if unseen.is_empty() {
            return;
        }

        let mut fetched = 0;
        for hash in &unseen {
            if let Ok(value) = call_rpc_with(client, addr, "queryByHash", json!([hash])).await {
                if let Ok(block) = serde_json::from_value::<Block>(value) {
                    storage.add(block);
                    fetched += 1;
                }
            }
        }
        if fetched == 0 {
            return;
        }
        level0 = level1 + 1;
        level1 += SYNC_WINDOW;
    }
}

/// Periodically runs `sync_blocks` against every known peer, concurrently.
pub async fn chain_sync_loop(peers: Arc<PeerPool>, storage: Arc<Storage>, interval: Duration) {
    loop {
        for addr in peers.addresses() {
            let client = peers.get_client(&addr);
            let storage = storage.clone();
            tokio::spawn(async move {
                sync_blocks(&client, &addr, &storage).await;
            });
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::Curve;

    #[tokio::test]
    async fn test_call_rpc_against_unreachable_address_fails() {
        let result = call_rpc("127.0.0.1:1", "ping", json!(["x"])).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_sync_blocks_against_unreachable_peer_returns_without_blocking() {
        let storage = Arc::new(Storage::new(Curve::P224));
        let client = http_client();
        sync_blocks(&client, "127.0.0.1:1", &storage).await;
        assert_eq!(storage.max_level(), None);
    }
}
