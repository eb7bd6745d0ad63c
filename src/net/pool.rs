// Connection pool: caches a dialed RPC client per peer address alongside its
// most recently measured RTT, and is also the BroadcastTransport adapter that
// lets the gossip queue reach peers over those cached connections.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use crate::broadcast::BroadcastTransport;
use crate::net::client::{self, HttpClient};
use crate::primitives::block::Block;
use crate::primitives::transaction::Transaction;

struct PeerEntry {
    client: HttpClient,
    rtt: Duration,
}

pub struct PeerPool {
    entries: Mutex<HashMap<String, PeerEntry>>,
    max_neighbors: usize,
}

impl PeerPool {
    pub fn new(max_neighbors: usize) -> Self {
        PeerPool { entries: Mutex::new(HashMap::new()), max_neighbors }
    }

    /// `Get`: returns the cached client for `addr`, dialing and caching one on miss.
    pub fn get_client(&self, addr: &str) -> HttpClient {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get(addr) {
            return entry.client.clone();
        }
        let new_client = client::http_client();
        entries.insert(addr.to_string(), PeerEntry { client: new_client.clone(), rtt: Duration::MAX });
        new_client
    }

    /// `Update`: drops the cached client for `addr`, if any, and dials a fresh one.
    pub fn update_client(&self, addr: &str) -> HttpClient {
        let new_client = client::http_client();
        let mut entries = self.entries.lock().unwrap();
        let rtt = entries.get(addr).map(|e| e.rtt).unwrap_or(Duration::MAX);
        entries.insert(addr.to_string(), PeerEntry { client: new_client.clone(), rtt });
        new_client
    }

    /// `Reset`: drops every cached client.
    pub fn reset(&self) {
        self.entries.lock().unwrap().clear();
    }

    /// Adds `addr` with no RTT recorded yet, if not already known.
    pub fn add(&self, addr: String) {
        let mut entries = self.entries.lock().unwrap();
        entries
            .entry(addr)
            .or_insert_with(|| PeerEntry { client: client::http_client(), rtt: Duration::MAX });
    }

    pub fn remove(&self, addr: &str) {
        self.entries.lock().unwrap().remove(addr);
    }

    pub fn addresses(&self) -> Vec<String> {
        self.entries.lock().unwrap().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn rtt(&self, addr: &str) -> Option<Duration> {
        self.entries.lock().unwrap().get(addr).map(|e| e.rtt)
    }

    /// Pings every known peer; successes update their RTT, failures evict them.
    pub async fn probe_all(&self) {
        for addr in self.addresses() {
            let probe_client = self.get_client(&addr);
            match client::ping_with_rtt(&probe_client, &addr).await {
                Some(rtt) => {
                    if let Some(entry) = self.entries.lock().unwrap().get_mut(&addr) {
                        entry.rtt = rtt;
                    }
                }
                None => self.remove(&addr),
            }
        }
    }

    /// When the pool exceeds `max_neighbors`, sorts by RTT ascending and drops
    /// the tail (the slowest peers).
    pub fn evict_excess(&self) {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() <= self.max_neighbors {
            return;
        }
        let mut by_rtt: Vec<(String, Duration)> = entries.iter().map(|(addr, e)| (addr.clone(), e.rtt)).collect();
        by_rtt.sort_by_key(|(_, rtt)| *rtt);
        for (addr, _) in by_rtt.into_iter().skip(self.max_neighbors) {
            entries.remove(&addr);
        }
    }
}

impl BroadcastTransport for PeerPool {
    fn peer_addresses(&self) -> Vec<String> {
        self.addresses()
    }

    fn send_block(&self, peer: &str, block: Block, hop: u32, seen: HashSet<String>) {
        let peer = peer.to_string();
        let rpc_client = self.get_client(&peer);
        tokio::spawn(async move {
            let seen: Vec<String> = seen.into_iter().collect();
            let _ = client::call_rpc_with(&rpc_client, &peer, "broadcastBlock", serde_json::json!([block, hop, seen])).await;
        });
    }

    fn send_transaction(&self, peer: &str, tx: Transaction, hop: u32, seen: HashSet<String>) {
        let peer = peer.to_string();
        let rpc_client = self.get_client(&peer);
        tokio::spawn(async move {
            let seen: Vec<String> = seen.into_iter().collect();
            let _ = client::call_rpc_with(&rpc_client, &peer, "broadcastTransaction", serde_json::json!([tx, hop, seen])).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_remove() {
        let pool = PeerPool::new(12);
        pool.add("127.0.0.1:9000".to_string());
        pool.add("127.0.0.1:9001".to_string());
        assert_eq!(pool.len(), 2);

        pool.remove("127.0.0.1:9000");
        assert_eq!(pool.addresses(), vec!["127.0.0.1:9001".to_string()]);
    }

    #[test]
    fn test_duplicate_add_is_idempotent() {
        let pool = PeerPool::new(12);
        pool.add("127.0.0.1:9000".to_string());
        pool.add("127.0.0.1:9000".to_string());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_get_client_caches_across_calls() {
        let pool = PeerPool::new(12);
        let a = pool.get_client("127.0.0.1:9000");
        let b = pool.get_client("127.0.0.1:9000");
        // hyper_util's legacy Client is a cheap Arc-backed handle; cloning it
        // from the same cached entry should not create a second pool entry.
        drop((a, b));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_evict_excess_drops_slowest_rtt_tail() {
        let pool = PeerPool::new(2);
        for (addr, rtt_ms) in [("a", 10u64), ("b", 20), ("c", 5)] {
            pool.add(addr.to_string());
            pool.entries.lock().unwrap().get_mut(addr).unwrap().rtt = Duration::from_millis(rtt_ms);
        }

        pool.evict_excess();

        assert_eq!(pool.len(), 2);
        let remaining: HashSet<String> = pool.addresses().into_iter().collect();
        assert!(remaining.contains("c"));
        assert!(remaining.contains("a"));
        assert!(!remaining.contains("b"));
    }

    #[test]
    fn test_evict_excess_is_noop_under_capacity() {
        let pool = PeerPool::new(5);
        pool.add("a".to_string());
        pool.add("b".to_string());
        pool.evict_excess();
        assert_eq!(pool.len(), 2);
    }
}
