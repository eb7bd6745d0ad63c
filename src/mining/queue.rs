// Single-flight nonce search: at most one candidate block is being mined at a
// time. A new candidate preempts whatever search is in flight.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::broadcast::BroadcastQueue;
use crate::mining::functions::{self, MiningFunction};
use crate::primitives::block::Block;
use crate::storage::Storage;

pub struct MiningQueue {
    submit_tx: mpsc::Sender<Block>,
}

impl MiningQueue {
    /// `finished_rx` emits once per search, whether or not it found a nonce —
    /// the mining controller uses it to decide when to build the next candidate.
    pub fn new(
        storage: Arc<Storage>,
        broadcast: Arc<BroadcastQueue>,
        function: MiningFunction,
    ) -> (Self, mpsc::Receiver<()>) {
        let (submit_tx, mut submit_rx) = mpsc::channel::<Block>(1);
        let (finished_tx, finished_rx) = mpsc::channel::<()>(8);

        tokio::spawn(async move {
            let mut current: Option<(Arc<AtomicBool>, JoinHandle<()>)> = None;

            while let Some(block) = submit_rx.recv().await {
                if let Some((cancel, handle)) = current.take() {
                    cancel.store(true, Ordering::SeqCst);
                    let _ = handle.await;
                }

                let cancel = Arc::new(AtomicBool::new(false));
                let cancel_for_search = cancel.clone();
                let storage = storage.clone();
                let broadcast = broadcast.clone();
                let finished_tx = finished_tx.clone();

                let handle = tokio::task::spawn_blocking(move || {
                    let signed_hash = block.signed_hash();
                    let (found, nonce) =
                        functions::mine(function, &signed_hash, block.num_bytes, &cancel_for_search);
                    if found {
                        let mut mined = block;
                        mined.set_nonce(nonce);
                        storage.add(mined.clone());
                        broadcast.add_block(mined, 0, HashSet::new());
                    }
                    let _ = finished_tx.try_send(());
                });

                current = Some((cancel, handle));
            }
        });

        (MiningQueue { submit_tx }, finished_rx)
    }

    /// Submit a new candidate, preempting any search currently in flight.
    pub async fn submit(&self, block: Block) {
        let _ = self.submit_tx.send(block).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::{Curve, Key};

    struct NullTransport;
    impl crate::broadcast::BroadcastTransport for NullTransport {
        fn peer_addresses(&self) -> Vec<String> {
            Vec::new()
        }
        fn send_block(&self, _: &str, _: Block, _: u32, _: HashSet<String>) {}
        fn send_transaction(&self, _: &str, _: crate::primitives::transaction::Transaction, _: u32, _: HashSet<String>) {}
    }

    #[tokio::test]
    async fn test_mines_and_stores_block() {
        let storage = Arc::new(Storage::new(Curve::P224));
        let broadcast = Arc::new(BroadcastQueue::new(Arc::new(NullTransport), 10));
        let (queue, mut finished_rx) = MiningQueue::new(storage.clone(), broadcast, MiningFunction::Single);

        let key = Key::generate(Curve::P224);
        let mut block = Block::new(String::new(), 233, 0);
        block.set_transactions(vec![]);
        block.sign(&key);

        queue.submit(block).await;
        finished_rx.recv().await.expect("search completes");

        assert_eq!(storage.max_level(), Some(0));
    }

    #[tokio::test]
    async fn test_second_submit_preempts_first() {
        let storage = Arc::new(Storage::new(Curve::P224));
        let broadcast = Arc::new(BroadcastQueue::new(Arc::new(NullTransport), 10));
        // Difficulty unreachable within the test window, so the first search is
        // still running when the second candidate arrives.
        let (queue, mut finished_rx) = MiningQueue::new(storage.clone(), broadcast, MiningFunction::Single);

        let key = Key::generate(Curve::P224);
        let mut hard_block = Block::new(String::new(), 256, 0);
        hard_block.set_transactions(vec![]);
        hard_block.sign(&key);

        let mut easy_block = Block::new(String::new(), 233, 0);
        easy_block.set_transactions(vec![]);
        easy_block.sign(&key);

        queue.submit(hard_block).await;
        queue.submit(easy_block).await;

        finished_rx.recv().await.expect("the preempted search reports finished");
        finished_rx.recv().await.expect("the easy search completes and is stored");
        assert_eq!(storage.max_level(), Some(0));
    }
}
