//! Key digests for partition placement.
//!
//! Partition placement hashes a key's major path with SHA-256 and reduces the
//! digest, read as an unsigned big-endian integer, modulo the partition count.
//!
//! Creating a hasher per call is cheap with `sha2`, but the placement path is
//! hot. [`DigestSlot`] keeps one reusable hasher behind a non-blocking lock:
//! a caller that finds it busy allocates a fresh hasher instead of waiting.

use std::sync::{
    OnceLock,
    atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

/// SHA-256 hash output (32 bytes).
pub type Hash = [u8; 32];

/// Compute SHA-256 hash of arbitrary data.
#[inline]
pub fn sha256(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Reduces `digest`, read as an unsigned big-endian integer, modulo `modulus`.
///
/// Horner's rule over the bytes keeps every intermediate below `2^40`, so the
/// result is exact for digests of any length. A zero modulus is treated as 1.
#[inline]
pub fn reduce_mod(digest: &[u8], modulus: u32) -> u32 {
    let m = u64::from(modulus.max(1));
    let rem = digest.iter().fold(0u64, |acc, &byte| ((acc << 8) | u64::from(byte)) % m);
    rem as u32
}

/// Single reusable SHA-256 hasher with allocate-on-contention fallback.
#[derive(Debug, Default)]
pub struct DigestSlot {
    hasher: Mutex<Sha256>,
    reused: AtomicU64,
    allocated: AtomicU64,
}

impl DigestSlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hashes `data`, borrowing the slot's hasher if it is free.
    pub fn digest(&self, data: &[u8]) -> Hash {
        if let Some(mut hasher) = self.hasher.try_lock() {
            self.reused.fetch_add(1, Ordering::Relaxed);
            hasher.update(data);
            return hasher.finalize_reset().into();
        }
        self.allocated.fetch_add(1, Ordering::Relaxed);
        sha256(data)
    }

    /// Number of digests computed with the reusable hasher.
    pub fn reused(&self) -> u64 {
        self.reused.load(Ordering::Relaxed)
    }

    /// Number of digests that fell back to a fresh hasher.
    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }
}

/// Returns the process-wide digest slot.
pub fn shared_digest_slot() -> &'static DigestSlot {
    static SLOT: OnceLock<DigestSlot> = OnceLock::new();
    SLOT.get_or_init(DigestSlot::new)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::{sync::Arc, thread};

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        let h = sha256(b"abc");
        assert_eq!(h[0], 0xba);
        assert_eq!(h[31], 0xad);
    }

    #[test]
    fn test_reduce_mod_small_values() {
        assert_eq!(reduce_mod(&[0x01, 0x00], 10), 256 % 10);
        assert_eq!(reduce_mod(&[0xff, 0xff, 0xff, 0xff], 7), (u32::MAX % 7));
        assert_eq!(reduce_mod(&[], 10), 0);
    }

    #[test]
    fn test_slot_reuses_when_free() {
        let slot = DigestSlot::new();
        let first = slot.digest(b"key");
        let second = slot.digest(b"key");
        assert_eq!(first, second, "finalize_reset must leave a clean hasher");
        assert_eq!(first, sha256(b"key"));
        assert_eq!(slot.reused(), 2);
        assert_eq!(slot.allocated(), 0);
    }

    #[test]
    fn test_slot_allocates_when_busy() {
        let slot = DigestSlot::new();
        let guard = slot.hasher.lock();
        let digest = slot.digest(b"key");
        drop(guard);
        assert_eq!(digest, sha256(b"key"));
        assert_eq!(slot.allocated(), 1);
        assert_eq!(slot.reused(), 0);
    }

    #[test]
    fn test_slot_concurrent_digests_agree() {
        let slot = Arc::new(DigestSlot::new());
        let expected = sha256(b"major/path");
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let slot = Arc::clone(&slot);
                thread::spawn(move || (0..200).map(|_| slot.digest(b"major/path")).collect::<Vec<_>>())
            })
            .collect();
        for handle in handles {
            for digest in handle.join().expect("thread") {
                assert_eq!(digest, expected);
            }
        }
        assert_eq!(slot.reused() + slot.allocated(), 1600);
    }

    #[test]
    fn test_shared_slot_is_singleton() {
        assert!(std::ptr::eq(shared_digest_slot(), shared_digest_slot()));
    }

    proptest! {
        #[test]
        fn prop_reduce_mod_matches_u128(bytes in proptest::collection::vec(any::<u8>(), 0..16), m in 1u32..) {
            let as_int = bytes.iter().fold(0u128, |acc, &b| (acc << 8) | u128::from(b));
            prop_assert_eq!(u128::from(reduce_mod(&bytes, m)), as_int % u128::from(m));
        }
    }
}
