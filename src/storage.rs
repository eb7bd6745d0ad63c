// Block DAG: atomic insertion, ancestry-verification propagation, max-level
// bookkeeping, balance replay over the main chain, mining-preemption signaling.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::balance::Balance;
use crate::crypto::hash;
use crate::crypto::keys::Curve;
use crate::primitives::block::Block;

pub struct Storage {
    blocks: Mutex<HashMap<String, Block>>,
    levels: Mutex<HashMap<u64, HashSet<String>>>,
    children: Mutex<HashMap<String, Vec<String>>>,
    verified: Mutex<HashSet<String>>,
    max_level: Mutex<Option<u64>>,
    balance: Arc<Balance>,
    curve: Curve,
    preempt: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Storage {
    pub fn new(curve: Curve) -> Self {
        Storage {
            blocks: Mutex::new(HashMap::new()),
            levels: Mutex::new(HashMap::new()),
            children: Mutex::new(HashMap::new()),
            verified: Mutex::new(HashSet::new()),
            max_level: Mutex::new(None),
            balance: Arc::new(Balance::new()),
            curve,
            preempt: Mutex::new(None),
        }
    }

    pub fn balance(&self) -> &Balance {
        &self.balance
    }

    /// A shared handle to the same balance table, for components (e.g. the
    /// transaction pool) that need to read live balance without going through
    /// `Storage` itself.
    pub fn balance_handle(&self) -> Arc<Balance> {
        Arc::clone(&self.balance)
    }

    /// Install a one-shot callback invoked the next time a taller block arrives,
    /// to cancel an in-flight mining search. Cleared once invoked.
    pub fn set_mining_cancel(&self, cb: impl FnOnce() + Send + 'static) {
        *self.preempt.lock().unwrap() = Some(Box::new(cb));
    }

    /// Returns true if the block was accepted (or was already present — idempotent),
    /// false if it failed `Block::check`.
    pub fn add(&self, block: Block) -> bool {
        if !block.check(&self.balance, self.curve) {
            return false;
        }
        let hash = hash::to_hex(&block.hash());

        {
            let mut blocks = self.blocks.lock().unwrap();
            if blocks.contains_key(&hash) {
                return true;
            }
            blocks.insert(hash.clone(), block.clone());
        }

        {
            let current_max = *self.max_level.lock().unwrap();
            if current_max.map_or(true, |m| block.level > m) {
                if let Some(cb) = self.preempt.lock().unwrap().take() {
                    cb();
                }
            }
        }

        self.levels
            .lock()
            .unwrap()
            .entry(block.level)
            .or_default()
            .insert(hash.clone());

        self.children
            .lock()
            .unwrap()
            .entry(block.previous_hash.clone())
            .or_default()
            .push(hash.clone());

        let parent_verified = (block.level == 0 && block.previous_hash.is_empty())
            || (!block.previous_hash.is_empty() && self.verified.lock().unwrap().contains(&block.previous_hash));
        if parent_verified {
            self.mark_verified_and_descend(&hash);
        }

        self.replay_balance();
        true
    }

    fn mark_verified_and_descend(&self, hash: &str) {
        self.verified.lock().unwrap().insert(hash.to_string());

        let level = self.blocks.lock().unwrap().get(hash).map(|b| b.level);
        let children = self.children.lock().unwrap().get(hash).cloned().unwrap_or_default();

        if children.is_empty() {
            if let Some(level) = level {
                let mut max_level = self.max_level.lock().unwrap();
                if max_level.map_or(true, |m| level > m) {
                    *max_level = Some(level);
                }
            }
        } else {
            for child in children {
                self.mark_verified_and_descend(&child);
            }
        }
    }

    /// Any one verified block at `maxLevel` — ties broken by lowest hex hash.
    pub fn top_block(&self) -> Option<Block> {
        let max_level = (*self.max_level.lock().unwrap())?;
        let level_hashes = self.levels.lock().unwrap().get(&max_level).cloned().unwrap_or_default();
        let verified = self.verified.lock().unwrap();
        let blocks = self.blocks.lock().unwrap();
        level_hashes
            .iter()
            .filter(|h| verified.contains(*h))
            .min()
            .and_then(|h| blocks.get(h).cloned())
    }

    pub fn max_level(&self) -> Option<u64> {
        *self.max_level.lock().unwrap()
    }

    /// Genesis-to-top path along the winning branch.
    pub fn main_chain(&self) -> Vec<Block> {
        let top = match self.top_block() {
            Some(b) => b,
            None => return Vec::new(),
        };
        let mut chain = vec![top.clone()];
        let mut current = top;
        while !current.previous_hash.is_empty() {
            let parent = match self.blocks.lock().unwrap().get(&current.previous_hash).cloned() {
                Some(p) => p,
                None => break,
            };
            chain.push(parent.clone());
            current = parent;
        }
        chain.reverse();
        chain
    }

    fn replay_balance(&self) {
        self.balance.clear();
        for block in self.main_chain() {
            for (addr, delta) in block.get_balance_change() {
                self.balance.update(&addr, delta);
            }
        }
    }

    pub fn get_blocks_level(&self, level0: u64, level1: u64) -> Vec<Block> {
        let levels = self.levels.lock().unwrap();
        let blocks = self.blocks.lock().unwrap();
        (level0..=level1)
            .filter_map(|l| levels.get(&l))
            .flatten()
            .filter_map(|h| blocks.get(h).cloned())
            .collect()
    }

    pub fn get_blocks_level_hash(&self, level0: u64, level1: u64) -> Vec<String> {
        self.get_blocks_level(level0, level1)
            .iter()
            .map(|b| hash::to_hex(&b.hash()))
            .collect()
    }

    pub fn filter_new_hashes(&self, hashes: &[String]) -> Vec<String> {
        let blocks = self.blocks.lock().unwrap();
        hashes.iter().filter(|h| !blocks.contains_key(*h)).cloned().collect()
    }

    pub fn get_by_hash(&self, hash: &str) -> Option<Block> {
        self.blocks.lock().unwrap().get(hash).cloned()
    }

    /// Timestamp delta between the top block and its parent, or -1 if unavailable.
    pub fn get_last_interval(&self) -> i64 {
        let top = match self.top_block() {
            Some(b) => b,
            None => return -1,
        };
        if top.previous_hash.is_empty() {
            return -1;
        }
        match self.blocks.lock().unwrap().get(&top.previous_hash) {
            Some(parent) => top.timestamp as i64 - parent.timestamp as i64,
            None => -1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::Key;
    use crate::mining::functions::mine_single_threaded;
    use std::sync::atomic::AtomicBool;

    fn mined_block(key: &Key, previous_hash: String, level: u64) -> Block {
        let mut block = Block::new(previous_hash, 233, level);
        block.set_transactions(vec![]);
        block.sign(key);
        let stop = AtomicBool::new(false);
        let (found, nonce) = mine_single_threaded(&block.signed_hash(), block.num_bytes, &stop);
        assert!(found);
        block.set_nonce(nonce);
        block
    }

    #[test]
    fn test_mine_genesis_and_child() {
        let k0 = Key::generate(Curve::P224);
        let storage = Storage::new(Curve::P224);

        let genesis = mined_block(&k0, String::new(), 0);
        assert!(storage.add(genesis.clone()));
        assert_eq!(storage.max_level(), Some(0));

        let genesis_hash = hash::to_hex(&genesis.hash());
        let child = mined_block(&k0, genesis_hash, 1);
        assert!(storage.add(child));
        assert_eq!(storage.max_level(), Some(1));

        assert_eq!(storage.balance().get(&k0.to_address()), 20_000_000_000);
    }

    #[test]
    fn test_fork_resolution() {
        let k0 = Key::generate(Curve::P224);
        let storage = Storage::new(Curve::P224);

        let genesis = mined_block(&k0, String::new(), 0);
        storage.add(genesis.clone());
        let genesis_hash = hash::to_hex(&genesis.hash());

        let block1a = mined_block(&k0, genesis_hash.clone(), 1);
        let block1b = mined_block(&k0, genesis_hash, 1);
        storage.add(block1a.clone());
        storage.add(block1b);

        let block1a_hash = hash::to_hex(&block1a.hash());
        let block2 = mined_block(&k0, block1a_hash, 2);
        storage.add(block2);

        assert_eq!(storage.max_level(), Some(2));
        assert_eq!(storage.main_chain().len(), 3);
    }

    #[test]
    fn test_invalid_block_rejected() {
        let k0 = Key::generate(Curve::P224);
        let storage = Storage::new(Curve::P224);
        let mut block = mined_block(&k0, String::new(), 0);

        let mut sig_bytes = hex::decode(&block.miner_signature).unwrap();
        sig_bytes[0] ^= 0xFF;
        block.miner_signature = hex::encode(sig_bytes);

        assert!(!storage.add(block));
        assert_eq!(storage.max_level(), None);
    }

    #[test]
    fn test_balance_replay_determinism_regardless_of_insertion_order() {
        let k0 = Key::generate(Curve::P224);
        let genesis = mined_block(&k0, String::new(), 0);
        let genesis_hash = hash::to_hex(&genesis.hash());
        let child = mined_block(&k0, genesis_hash, 1);

        let storage_a = Storage::new(Curve::P224);
        storage_a.add(genesis.clone());
        storage_a.add(child.clone());

        let storage_b = Storage::new(Curve::P224);
        storage_b.add(child);
        storage_b.add(genesis);

        assert_eq!(storage_a.balance().all(), storage_b.balance().all());
    }

    #[test]
    fn test_main_chain_length_equals_max_level_plus_one() {
        let k0 = Key::generate(Curve::P224);
        let storage = Storage::new(Curve::P224);
        let genesis = mined_block(&k0, String::new(), 0);
        storage.add(genesis.clone());
        let child = mined_block(&k0, hash::to_hex(&genesis.hash()), 1);
        storage.add(child);

        assert_eq!(storage.main_chain().len() as u64, storage.max_level().unwrap() + 1);
    }

    #[test]
    fn test_mining_preemption_invokes_callback_on_taller_block() {
        let k0 = Key::generate(Curve::P224);
        let storage = Storage::new(Curve::P224);
        let genesis = mined_block(&k0, String::new(), 0);
        storage.add(genesis.clone());

        let invoked = std::sync::Arc::new(AtomicBool::new(false));
        let invoked_clone = invoked.clone();
        storage.set_mining_cancel(move || invoked_clone.store(true, std::sync::atomic::Ordering::SeqCst));

        let child = mined_block(&k0, hash::to_hex(&genesis.hash()), 1);
        storage.add(child);

        assert!(invoked.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn test_nonzero_level_with_empty_previous_hash_is_never_verified() {
        let k0 = Key::generate(Curve::P224);
        let storage = Storage::new(Curve::P224);

        let orphan = mined_block(&k0, String::new(), 50);
        assert!(storage.add(orphan));

        assert_eq!(storage.max_level(), None);
        assert!(storage.top_block().is_none());
        assert!(storage.main_chain().is_empty());
    }
}
