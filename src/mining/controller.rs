// Builds the next candidate block on top of whatever the storage layer currently
// considers the winning chain, and resubmits it to the mining queue whenever a
// search finishes or a taller block preempts the one in flight.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;

use crate::crypto::hash;
use crate::crypto::keys::Key;
use crate::mining::queue::MiningQueue;
use crate::pool::TransactionPool;
use crate::primitives::block::Block;
use crate::storage::Storage;

/// A transaction older than this is dropped from candidate blocks rather than
/// carried forward indefinitely.
pub const TRANSACTION_TTL_SECS: u64 = 3600;

/// Two real strategies: a fixed difficulty, or one byte added/removed per block
/// depending on whether the previous interval undershot or overshot the target.
#[derive(Debug, Clone, Copy)]
pub enum DifficultyFunction {
    Static,
    Basic { target_interval_secs: i64 },
}

impl DifficultyFunction {
    /// `Basic`: if the previous interval ran past half the target and there's
    /// still headroom below the 255-byte ceiling, add a byte. Otherwise, if it
    /// ran under twice the target and there's still a byte to give up, drop one.
    /// Unchanged in every other case, including when no interval is available yet.
    pub fn adjust(&self, current_num_bytes: u32, last_interval: i64) -> u32 {
        match self {
            DifficultyFunction::Static => current_num_bytes,
            DifficultyFunction::Basic { target_interval_secs } => {
                if last_interval < 0 {
                    current_num_bytes
                } else if last_interval > *target_interval_secs / 2 && current_num_bytes < 255 {
                    current_num_bytes + 1
                } else if last_interval < *target_interval_secs * 2 && current_num_bytes > 0 {
                    current_num_bytes - 1
                } else {
                    current_num_bytes
                }
            }
        }
    }
}

pub struct MiningController {
    storage: Arc<Storage>,
    pool: Arc<TransactionPool>,
    mining_queue: Arc<MiningQueue>,
    key: Key,
    difficulty: DifficultyFunction,
    num_bytes: AtomicU32,
    capacity: usize,
    preempt_rx: Mutex<Option<mpsc::Receiver<()>>>,
}

impl MiningController {
    /// Returns the controller and a sender the host wires into
    /// `Storage::set_mining_cancel` to trigger an out-of-band rebuild.
    pub fn new(
        storage: Arc<Storage>,
        pool: Arc<TransactionPool>,
        mining_queue: Arc<MiningQueue>,
        key: Key,
        difficulty: DifficultyFunction,
        initial_num_bytes: u32,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Sender<()>) {
        let (preempt_tx, preempt_rx) = mpsc::channel(1);
        let controller = Arc::new(MiningController {
            storage,
            pool,
            mining_queue,
            key,
            difficulty,
            num_bytes: AtomicU32::new(initial_num_bytes),
            capacity,
            preempt_rx: Mutex::new(Some(preempt_rx)),
        });
        (controller, preempt_tx)
    }

    fn build_candidate(&self) -> Block {
        let top = self.storage.top_block();
        let previous_hash = top.as_ref().map(|b| hash::to_hex(&b.hash())).unwrap_or_default();
        let level = self.storage.max_level().map(|l| l + 1).unwrap_or(0);

        let last_interval = self.storage.get_last_interval();
        let num_bytes = self.difficulty.adjust(self.num_bytes.load(Ordering::Relaxed), last_interval);
        self.num_bytes.store(num_bytes, Ordering::Relaxed);

        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
        let balance = self.storage.balance();
        let transactions = self
            .pool
            .fetch(self.capacity, |tx| now.saturating_sub(tx.timestamp) < TRANSACTION_TTL_SECS)
            .into_iter()
            .filter(|tx| tx.check_balance(balance))
            .collect();

        let mut block = Block::new(previous_hash, num_bytes, level);
        block.set_transactions(transactions);
        block.sign(&self.key);
        block
    }

    /// Runs until both `finished_rx` and the preempt channel are closed: submits
    /// an initial candidate, then rebuilds and resubmits each time either fires.
    pub async fn run(self: Arc<Self>, mut finished_rx: mpsc::Receiver<()>) {
        let mut preempt_rx = self.preempt_rx.lock().unwrap().take().expect("run() called once");
        self.mining_queue.submit(self.build_candidate()).await;
        loop {
            tokio::select! {
                msg = finished_rx.recv() => {
                    match msg {
                        Some(()) => self.mining_queue.submit(self.build_candidate()).await,
                        None => break,
                    }
                }
                msg = preempt_rx.recv() => {
                    match msg {
                        Some(()) => self.mining_queue.submit(self.build_candidate()).await,
                        None => break,
                    }
                }
            }
        }
    }
}
