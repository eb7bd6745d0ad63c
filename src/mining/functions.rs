// Nonce search: the proof-of-work predicate and its single/multi-threaded search.
//
// Both variants poll a cancellation flag roughly every 1000 attempts and return
// promptly once it is set, regardless of search progress.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::crypto::hash;

const POLL_INTERVAL: u32 = 1000;

/// Two real variants: a single search loop, or N cooperating worker threads.
/// No trait object — there are exactly two concrete shapes.
#[derive(Debug, Clone, Copy)]
pub enum MiningFunction {
    Single,
    Multi { threads: usize },
}

/// Position of `x`'s most significant 1-bit, counted from 1 (0 for an all-zero buffer).
fn bit_length(bytes: &[u8]) -> u32 {
    for (i, &b) in bytes.iter().enumerate() {
        if b != 0 {
            let bit_pos_in_byte = 8 - b.leading_zeros();
            let remaining_bytes = (bytes.len() - i - 1) as u32;
            return bit_pos_in_byte + 8 * remaining_bytes;
        }
    }
    0
}

/// `inner = Hash(signedHash || nonce)`, `outer = SHA256(inner || nonce)`, valid iff
/// `b(outer) < numBytes`. The source double-appends the nonce bytes; preserved here.
pub fn verify_pow(signed_hash: &[u8], nonce: u32, num_bytes: u32) -> bool {
    let nonce_bytes = nonce.to_le_bytes();
    let inner = hash::hash_concat(signed_hash, &nonce_bytes);
    let outer = hash::hash_concat(&inner, &nonce_bytes);
    bit_length(&outer) < num_bytes
}

fn seed_from_clock(salt: u64) -> u64 {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos() as u64;
    nanos ^ salt
}

/// Loop generating random nonces from a clock-seeded generator until one satisfies
/// the PoW predicate or `cancel` is set.
pub fn mine_single_threaded(signed_hash: &[u8], num_bytes: u32, cancel: &AtomicBool) -> (bool, u32) {
    let mut rng = StdRng::seed_from_u64(seed_from_clock(0));
    loop {
        for _ in 0..POLL_INTERVAL {
            let nonce: u32 = rng.gen();
            if verify_pow(signed_hash, nonce, num_bytes) {
                return (true, nonce);
            }
        }
        if cancel.load(Ordering::Relaxed) {
            return (false, 0);
        }
    }
}

/// `threads` cooperating workers with distinct seeds; the first to find a nonce
/// captures it (first-writer-wins) and the rest exit at their next poll.
pub fn mine_multi_threaded(
    signed_hash: &[u8],
    num_bytes: u32,
    threads: usize,
    cancel: &AtomicBool,
) -> (bool, u32) {
    let found = AtomicBool::new(false);
    let result = std::sync::Mutex::new(None);

    std::thread::scope(|scope| {
        for worker in 0..threads {
            let found = &found;
            let result = &result;
            scope.spawn(move || {
                let mut rng = StdRng::seed_from_u64(seed_from_clock(worker as u64));
                loop {
                    for _ in 0..POLL_INTERVAL {
                        let nonce: u32 = rng.gen();
                        if verify_pow(signed_hash, nonce, num_bytes) {
                            if !found.swap(true, Ordering::SeqCst) {
                                *result.lock().unwrap() = Some(nonce);
                            }
                            return;
                        }
                    }
                    if cancel.load(Ordering::Relaxed) || found.load(Ordering::Relaxed) {
                        return;
                    }
                }
            });
        }
    });

    match *result.lock().unwrap() {
        Some(nonce) => (true, nonce),
        None => (false, 0),
    }
}

pub fn mine(
    function: MiningFunction,
    signed_hash: &[u8],
    num_bytes: u32,
    cancel: &AtomicBool,
) -> (bool, u32) {
    match function {
        MiningFunction::Single => mine_single_threaded(signed_hash, num_bytes, cancel),
        MiningFunction::Multi { threads } => {
            mine_multi_threaded(signed_hash, num_bytes, threads, cancel)
        }
    }
}
