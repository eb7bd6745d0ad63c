// Gossip relay: forwards blocks and transactions to peers that have not already
// seen them, stamping each hop with an accumulating set of addresses and a
// hop counter, until the hop limit is reached.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::primitives::block::Block;
use crate::primitives::transaction::Transaction;

/// Above this many hops an item is dropped rather than relayed further.
/// Five to fifteen is typical for small peer populations; ten is a reasonable default.
pub const DEFAULT_MAX_BROADCAST_LEVEL: u32 = 10;

/// Delivery side, implemented by the networking layer. Send methods are expected
/// to be fire-and-forget (the implementor spawns its own task per peer) so the
/// dispatch loop never blocks on a slow or unreachable peer.
pub trait BroadcastTransport: Send + Sync {
    fn peer_addresses(&self) -> Vec<String>;
    fn send_block(&self, peer: &str, block: Block, hop: u32, seen: HashSet<String>);
    fn send_transaction(&self, peer: &str, tx: Transaction, hop: u32, seen: HashSet<String>);
}

struct BlockItem {
    block: Block,
    hop: u32,
    seen: HashSet<String>,
}

struct TransactionItem {
    tx: Transaction,
    hop: u32,
    seen: HashSet<String>,
}

pub struct BroadcastQueue {
    block_tx: mpsc::Sender<BlockItem>,
    transaction_tx: mpsc::Sender<TransactionItem>,
}

impl BroadcastQueue {
    pub fn new(transport: Arc<dyn BroadcastTransport>, max_broadcast_level: u32) -> Self {
        let (block_tx, mut block_rx) = mpsc::channel::<BlockItem>(256);
        let (transaction_tx, mut transaction_rx) = mpsc::channel::<TransactionItem>(256);

        let transport_blocks = transport.clone();
        tokio::spawn(async move {
            while let Some(item) = block_rx.recv().await {
                if item.hop >= max_broadcast_level {
                    continue;
                }
                let targets: Vec<String> =
                    transport_blocks.peer_addresses().into_iter().filter(|p| !item.seen.contains(p)).collect();
                let mut next_seen = item.seen.clone();
                next_seen.extend(targets.iter().cloned());
                for peer in targets {
                    transport_blocks.send_block(&peer, item.block.clone(), item.hop + 1, next_seen.clone());
                }
            }
        });

        let transport_transactions = transport;
        tokio::spawn(async move {
            while let Some(item) = transaction_rx.recv().await {
                if item.hop >= max_broadcast_level {
                    continue;
                }
                let targets: Vec<String> =
                    transport_transactions.peer_addresses().into_iter().filter(|p| !item.seen.contains(p)).collect();
                let mut next_seen = item.seen.clone();
                next_seen.extend(targets.iter().cloned());
                for peer in targets {
                    transport_transactions.send_transaction(&peer, item.tx.clone(), item.hop + 1, next_seen.clone());
                }
            }
        });

        BroadcastQueue { block_tx, transaction_tx }
    }

    pub fn add_block(&self, block: Block, hop: u32, seen: HashSet<String>) {
        let _ = self.block_tx.try_send(BlockItem { block, hop, seen });
    }

    pub fn add_transaction(&self, tx: Transaction, hop: u32, seen: HashSet<String>) {
        let _ = self.transaction_tx.try_send(TransactionItem { tx, hop, seen });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::{Curve, Key};
    use std::sync::Mutex;
    use std::time::Duration;

    struct RecordingTransport {
        peers: Vec<String>,
        sent_blocks: Mutex<Vec<(String, u32, HashSet<String>)>>,
    }

    impl BroadcastTransport for RecordingTransport {
        fn peer_addresses(&self) -> Vec<String> {
            self.peers.clone()
        }
        fn send_block(&self, peer: &str, _block: Block, hop: u32, seen: HashSet<String>) {
            self.sent_blocks.lock().unwrap().push((peer.to_string(), hop, seen));
        }
        fn send_transaction(&self, _peer: &str, _tx: Transaction, _hop: u32, _seen: HashSet<String>) {}
    }

    fn mock_block() -> Block {
        let key = Key::generate(Curve::P224);
        let mut block = Block::new(String::new(), 233, 0);
        block.set_transactions(vec![]);
        block.sign(&key);
        block
    }

    #[tokio::test]
    async fn test_relays_to_unseen_peers_only() {
        let transport = Arc::new(RecordingTransport {
            peers: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            sent_blocks: Mutex::new(Vec::new()),
        });
        let queue = BroadcastQueue::new(transport.clone(), DEFAULT_MAX_BROADCAST_LEVEL);

        let mut seen = HashSet::new();
        seen.insert("a".to_string());
        queue.add_block(mock_block(), 0, seen);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let sent = transport.sent_blocks.lock().unwrap();
        let peers_sent: HashSet<&String> = sent.iter().map(|(p, _, _)| p).collect();
        assert_eq!(peers_sent, HashSet::from([&"b".to_string(), &"c".to_string()]));
        assert!(sent.iter().all(|(_, hop, _)| *hop == 1));
    }

    #[tokio::test]
    async fn test_drops_item_past_hop_limit() {
        let transport = Arc::new(RecordingTransport {
            peers: vec!["a".to_string()],
            sent_blocks: Mutex::new(Vec::new()),
        });
        let queue = BroadcastQueue::new(transport.clone(), 3);

        queue.add_block(mock_block(), 3, HashSet::new());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(transport.sent_blocks.lock().unwrap().is_empty());
    }
}
