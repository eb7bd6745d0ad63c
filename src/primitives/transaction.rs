// Multi-sender/multi-receiver signed value transfer.
//
// Digest layout: the sender section (each pair as `|addr|amt`), a `||` separator,
// the receiver section (same shape), another `||`, then the timestamp. Section
// order is significant — permuting either list changes the digest.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::balance::Balance;
use crate::crypto::hash;
use crate::crypto::keys::{verify, Curve, Key};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "senderAddresses")]
    pub sender_addresses: Vec<String>,
    #[serde(rename = "senderAmounts")]
    pub sender_amounts: Vec<u64>,
    #[serde(rename = "receiverAddresses")]
    pub receiver_addresses: Vec<String>,
    #[serde(rename = "receiverAmounts")]
    pub receiver_amounts: Vec<u64>,
    pub fee: u64,
    pub timestamp: u64,
    #[serde(rename = "senderSignatures")]
    pub sender_signatures: Vec<String>,
}

impl Transaction {
    pub fn new() -> Self {
        Transaction {
            sender_addresses: Vec::new(),
            sender_amounts: Vec::new(),
            receiver_addresses: Vec::new(),
            receiver_amounts: Vec::new(),
            fee: 0,
            timestamp: SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs(),
            sender_signatures: Vec::new(),
        }
    }

    /// Equal-length, non-empty, unique addresses. Resets the signature array.
    pub fn set_sender(&mut self, addresses: Vec<String>, amounts: Vec<u64>) -> bool {
        if addresses.is_empty() || addresses.len() != amounts.len() {
            return false;
        }
        let mut seen = std::collections::HashSet::new();
        if !addresses.iter().all(|a| seen.insert(a.clone())) {
            return false;
        }
        self.sender_signatures = vec![String::new(); addresses.len()];
        self.sender_addresses = addresses;
        self.sender_amounts = amounts;
        true
    }

    pub fn set_receiver(&mut self, addresses: Vec<String>, amounts: Vec<u64>) -> bool {
        if addresses.len() != amounts.len() {
            return false;
        }
        self.receiver_addresses = addresses;
        self.receiver_amounts = amounts;
        true
    }

    pub fn sender_sum(&self) -> u64 {
        self.sender_amounts.iter().sum()
    }

    pub fn receiver_sum(&self) -> u64 {
        self.receiver_amounts.iter().sum()
    }

    /// `fee = senderSum - receiverSum`; false (fee left unchanged) if that would be negative.
    pub fn update_fee(&mut self) -> bool {
        let sender_sum = self.sender_sum();
        let receiver_sum = self.receiver_sum();
        if sender_sum < receiver_sum {
            return false;
        }
        self.fee = sender_sum - receiver_sum;
        true
    }

    pub fn digest(&self) -> String {
        let mut d = String::new();
        for (addr, amt) in self.sender_addresses.iter().zip(&self.sender_amounts) {
            d.push('|');
            d.push_str(addr);
            d.push('|');
            d.push_str(&amt.to_string());
        }
        d.push_str("||");
        for (addr, amt) in self.receiver_addresses.iter().zip(&self.receiver_amounts) {
            d.push('|');
            d.push_str(addr);
            d.push('|');
            d.push_str(&amt.to_string());
        }
        d.push_str("||");
        d.push_str(&self.timestamp.to_string());
        d
    }

    pub fn hash(&self) -> [u8; 32] {
        hash::hash(self.digest().as_bytes())
    }

    /// Write the signature at the sender's position. False if `key`'s address is
    /// not among the senders.
    pub fn sign(&mut self, key: &Key) -> bool {
        let address = key.to_address();
        match self.sender_addresses.iter().position(|a| a == &address) {
            Some(idx) => {
                self.sender_signatures[idx] = key.sign(&self.hash());
                true
            }
            None => false,
        }
    }

    pub fn check_fee(&self) -> bool {
        self.sender_sum() == self.receiver_sum() + self.fee
    }

    /// Every sender's current balance must be at least its declared amount.
    pub fn check_balance(&self, balance: &Balance) -> bool {
        self.sender_addresses
            .iter()
            .zip(&self.sender_amounts)
            .all(|(addr, amt)| balance.get(addr) >= *amt)
    }

    /// Every signature verifies against its sender address over the transaction hash.
    /// Curve is deserialization context, not a serialized field — see module docs.
    pub fn check_signatures(&self, curve: Curve) -> bool {
        if self.sender_addresses.len() != self.sender_signatures.len() {
            return false;
        }
        let hash = self.hash();
        self.sender_addresses
            .iter()
            .zip(&self.sender_signatures)
            .all(|(addr, sig)| verify(addr, curve, &hash, sig))
    }

    fn is_structurally_valid(&self) -> bool {
        self.sender_addresses.len() == self.sender_amounts.len()
            && self.sender_addresses.len() == self.sender_signatures.len()
            && !self.sender_addresses.is_empty()
            && self.receiver_addresses.len() == self.receiver_amounts.len()
    }

    pub fn check(&self, balance: &Balance, curve: Curve) -> bool {
        self.is_structurally_valid()
            && self.check_fee()
            && self.check_balance(balance)
            && self.check_signatures(curve)
    }

    /// Used when validating a transaction received from the network: balance is
    /// recomputed at add-time and is not authoritative on the wire.
    pub fn check_without_balance(&self, curve: Curve) -> bool {
        self.is_structurally_valid() && self.check_fee() && self.check_signatures(curve)
    }

    /// Sender debits, receiver credits (by the receiver's own amount — the
    /// natural, non-buggy reading), plus a synthetic `"fee"` bucket.
    pub fn get_balance_change(&self) -> HashMap<String, i64> {
        let mut change: HashMap<String, i64> = HashMap::new();
        for (addr, amt) in self.sender_addresses.iter().zip(&self.sender_amounts) {
            *change.entry(addr.clone()).or_insert(0) -= *amt as i64;
        }
        for (addr, amt) in self.receiver_addresses.iter().zip(&self.receiver_amounts) {
            *change.entry(addr.clone()).or_insert(0) += *amt as i64;
        }
        *change.entry("fee".to_string()).or_insert(0) += self.fee as i64;
        change
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}
