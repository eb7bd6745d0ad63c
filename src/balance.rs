// Address -> amount map, single mutex, signed-delta updates.

use std::collections::HashMap;
use std::sync::Mutex;

pub struct Balance {
    inner: Mutex<HashMap<String, u64>>,
}

impl Balance {
    pub fn new() -> Self {
        Balance { inner: Mutex::new(HashMap::new()) }
    }

    pub fn store(&self, address: &str, amount: u64) {
        self.inner.lock().unwrap().insert(address.to_string(), amount);
    }

    /// Returns the current amount, inserting 0 on first sight of the address.
    pub fn get(&self, address: &str) -> u64 {
        *self.inner.lock().unwrap().entry(address.to_string()).or_insert(0)
    }

    /// Apply a signed delta. Returns `(new_value, allowed)`; allowed iff the
    /// resulting value is strictly positive. Rejected updates leave the map unchanged.
    pub fn update(&self, address: &str, delta: i64) -> (u64, bool) {
        let mut map = self.inner.lock().unwrap();
        let current = *map.entry(address.to_string()).or_insert(0);
        let new_value = current as i64 + delta;
        if new_value > 0 {
            map.insert(address.to_string(), new_value as u64);
            (new_value as u64, true)
        } else {
            (current, false)
        }
    }

    /// Clear the whole map. Used before a balance replay.
    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }

    pub fn all(&self) -> HashMap<String, u64> {
        self.inner.lock().unwrap().clone()
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_inserts_zero_on_miss() {
        let balance = Balance::new();
        assert_eq!(balance.get("addr"), 0);
        assert_eq!(balance.all().get("addr"), Some(&0));
    }

    #[test]
    fn test_store_and_get() {
        let balance = Balance::new();
        balance.store("addr", 100);
        assert_eq!(balance.get("addr"), 100);
    }

    #[test]
    fn test_update_allowed() {
        let balance = Balance::new();
        balance.store("addr", 100);
        let (value, allowed) = balance.update("addr", -50);
        assert!(allowed);
        assert_eq!(value, 50);
    }

    #[test]
    fn test_update_rejected_when_result_not_positive() {
        let balance = Balance::new();
        balance.store("addr", 100);
        let (value, allowed) = balance.update("addr", -100);
        assert!(!allowed);
        assert_eq!(value, 100, "rejected update leaves the map unchanged");
    }

    #[test]
    fn test_update_negative_delta_on_fresh_address() {
        let balance = Balance::new();
        let (value, allowed) = balance.update("new-addr", -1);
        assert!(!allowed);
        assert_eq!(value, 0);
    }

    #[test]
    fn test_clear() {
        let balance = Balance::new();
        balance.store("addr", 100);
        balance.clear();
        assert_eq!(balance.get("addr"), 0);
    }
}
