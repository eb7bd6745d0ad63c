// Pending-transaction pool: fee-priority collection, deduplicated by hash,
// validated against the live balance table at insertion time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::balance::Balance;
use crate::crypto::hash;
use crate::primitives::transaction::Transaction;

struct Pool {
    order: Vec<String>,
    by_hash: HashMap<String, Transaction>,
}

pub struct TransactionPool {
    inner: Mutex<Pool>,
    balance: Arc<Balance>,
}

impl TransactionPool {
    pub fn new(balance: Arc<Balance>) -> Self {
        TransactionPool {
            inner: Mutex::new(Pool { order: Vec::new(), by_hash: HashMap::new() }),
            balance,
        }
    }

    /// Inserts unless a transaction with the same hash is already queued or its
    /// senders can't cover the declared amounts against the current balance.
    pub fn push(&self, tx: Transaction) -> bool {
        if !tx.check_balance(&self.balance) {
            return false;
        }
        let key = hash::to_hex(&tx.hash());
        let mut pool = self.inner.lock().unwrap();
        if pool.by_hash.contains_key(&key) {
            return false;
        }
        pool.order.push(key.clone());
        pool.by_hash.insert(key, tx);
        true
    }

    /// Up to `n` transactions satisfying `predicate`, ordered by descending fee.
    /// Does not remove anything from the pool.
    pub fn fetch(&self, n: usize, predicate: impl Fn(&Transaction) -> bool) -> Vec<Transaction> {
        let pool = self.inner.lock().unwrap();
        let mut candidates: Vec<&Transaction> =
            pool.order.iter().filter_map(|h| pool.by_hash.get(h)).filter(|tx| predicate(tx)).collect();
        candidates.sort_by(|a, b| b.fee.cmp(&a.fee));
        candidates.into_iter().take(n).cloned().collect()
    }

    /// Remove a transaction by hash. Returns whether it was present.
    pub fn pop(&self, tx_hash: &str) -> bool {
        let mut pool = self.inner.lock().unwrap();
        if pool.by_hash.remove(tx_hash).is_some() {
            pool.order.retain(|h| h != tx_hash);
            true
        } else {
            false
        }
    }

    pub fn pop_many(&self, hashes: &[String]) {
        for h in hashes {
            self.pop(h);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::{Curve, Key};

    fn mock_tx(sender: &Key, amount: u64, fee: u64, receiver: &Key) -> Transaction {
        let mut tx = Transaction::new();
        tx.set_sender(vec![sender.to_address()], vec![amount]);
        tx.set_receiver(vec![receiver.to_address()], vec![amount - fee]);
        tx.fee = fee;
        tx.sign(sender);
        tx
    }

    fn funded_pool(funded: &[(&Key, u64)]) -> TransactionPool {
        let balance = Arc::new(Balance::new());
        for (key, amount) in funded {
            balance.store(&key.to_address(), *amount);
        }
        TransactionPool::new(balance)
    }

    #[test]
    fn test_push_rejects_duplicate_hash() {
        let k0 = Key::generate(Curve::P224);
        let k1 = Key::generate(Curve::P224);
        let pool = funded_pool(&[(&k0, 100)]);
        let tx = mock_tx(&k0, 10, 1, &k1);

        assert!(pool.push(tx.clone()));
        assert!(!pool.push(tx));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_push_rejects_insufficient_balance() {
        let k0 = Key::generate(Curve::P224);
        let k1 = Key::generate(Curve::P224);
        let pool = funded_pool(&[(&k0, 5)]);
        let tx = mock_tx(&k0, 10, 1, &k1);

        assert!(!pool.push(tx));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_fetch_orders_by_descending_fee() {
        let k0 = Key::generate(Curve::P224);
        let k1 = Key::generate(Curve::P224);
        let pool = funded_pool(&[(&k0, 1000)]);

        pool.push(mock_tx(&k0, 10, 1, &k1));
        pool.push(mock_tx(&k0, 20, 5, &k1));
        pool.push(mock_tx(&k0, 30, 3, &k1));

        let fetched = pool.fetch(10, |_| true);
        let fees: Vec<u64> = fetched.iter().map(|tx| tx.fee).collect();
        assert_eq!(fees, vec![5, 3, 1]);
    }

    #[test]
    fn test_fetch_respects_predicate_and_limit() {
        let k0 = Key::generate(Curve::P224);
        let k1 = Key::generate(Curve::P224);
        let pool = funded_pool(&[(&k0, 1000)]);
        for fee in [1, 2, 3, 4] {
            pool.push(mock_tx(&k0, 10 + fee, fee, &k1));
        }

        let fetched = pool.fetch(2, |tx| tx.fee > 1);
        assert_eq!(fetched.len(), 2);
        assert!(fetched.iter().all(|tx| tx.fee > 1));
    }

    #[test]
    fn test_pop_removes_entry() {
        let k0 = Key::generate(Curve::P224);
        let k1 = Key::generate(Curve::P224);
        let pool = funded_pool(&[(&k0, 100)]);
        let tx = mock_tx(&k0, 10, 1, &k1);
        let tx_hash = hash::to_hex(&tx.hash());
        pool.push(tx);

        assert!(pool.pop(&tx_hash));
        assert!(pool.is_empty());
        assert!(!pool.pop(&tx_hash));
    }
}
