// Block: container of transactions with parent hash, level, miner identity,
// difficulty and nonce.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use super::transaction::Transaction;
use crate::balance::Balance;
use crate::crypto::hash;
use crate::crypto::keys::{verify, Curve, Key};
use crate::mining::functions::verify_pow;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "previousHash")]
    pub previous_hash: String,
    #[serde(rename = "numBytes")]
    pub num_bytes: u32,
    pub nonce: u32,
    pub level: u64,
    pub timestamp: u64,
    #[serde(rename = "minerAddress")]
    pub miner_address: String,
    #[serde(rename = "minerSignature")]
    pub miner_signature: String,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(previous_hash: String, num_bytes: u32, level: u64) -> Self {
        Block {
            previous_hash,
            num_bytes,
            nonce: 0,
            level,
            timestamp: SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs(),
            miner_address: String::new(),
            miner_signature: String::new(),
            transactions: Vec::new(),
        }
    }

    pub fn set_transactions(&mut self, transactions: Vec<Transaction>) {
        self.transactions = transactions;
    }

    pub fn set_nonce(&mut self, nonce: u32) {
        self.nonce = nonce;
    }

    /// `"<timestamp>|<level>||<tx1.hash>|<tx2.hash>|…|"`.
    pub fn digest(&self) -> String {
        let mut d = format!("{}|{}||", self.timestamp, self.level);
        for tx in &self.transactions {
            d.push_str(&hash::to_hex(&tx.hash()));
            d.push('|');
        }
        d
    }

    pub fn hash(&self) -> [u8; 32] {
        hash::hash(self.digest().as_bytes())
    }

    /// `digest() || minerSignature`, hashed. Input to the PoW predicate.
    pub fn signed_hash(&self) -> [u8; 32] {
        let mut d = self.digest();
        d.push_str(&self.miner_signature);
        hash::hash(d.as_bytes())
    }

    /// Signs `Hash(digest())` and records the miner's address.
    pub fn sign(&mut self, key: &Key) {
        let block_hash = self.hash();
        self.miner_signature = key.sign(&block_hash);
        self.miner_address = key.to_address();
    }

    pub fn check_signature(&self, curve: Curve) -> bool {
        verify(&self.miner_address, curve, &self.hash(), &self.miner_signature)
    }

    pub fn check_transactions(&self, balance: &Balance, curve: Curve) -> bool {
        self.transactions.iter().all(|tx| tx.check(balance, curve))
    }

    pub fn check_nonce(&self) -> bool {
        verify_pow(&self.signed_hash(), self.nonce, self.num_bytes)
    }

    pub fn check(&self, balance: &Balance, curve: Curve) -> bool {
        self.check_signature(curve) && self.check_transactions(balance, curve) && self.check_nonce()
    }

    /// `reward(level) = 10^max(0, 10 - floor(level/1000))`, tapering to 1 after level 10 000.
    pub fn reward(level: u64) -> u64 {
        let exponent = (10i64 - (level / 1000) as i64).max(0) as u32;
        10u64.pow(exponent)
    }

    /// Per-transaction deltas, with every `"fee"` bucket reassigned to the miner,
    /// plus the miner's block reward.
    pub fn get_balance_change(&self) -> std::collections::HashMap<String, i64> {
        let mut change: std::collections::HashMap<String, i64> = std::collections::HashMap::new();
        for tx in &self.transactions {
            for (addr, delta) in tx.get_balance_change() {
                if addr == "fee" {
                    *change.entry(self.miner_address.clone()).or_insert(0) += delta;
                } else {
                    *change.entry(addr).or_insert(0) += delta;
                }
            }
        }
        *change.entry(self.miner_address.clone()).or_insert(0) += Self::reward(self.level) as i64;
        change
    }
}
