//! 32-bit mixing hash used by the consistent-hash ring and by request-hash
//! computation for key-bearing request parameters.
//!
//! The reference implementation this system is modeled on delegates to an
//! external mixing primitive (`ff_hash_uint32`) whose source is not available
//! here. This module provides a drop-in replacement with the same shape —
//! `hash32(seed, words) -> u32` — built from the public-domain xxHash-style
//! avalanche used throughout the Rust ecosystem's fast-hash crates. It does
//! not reproduce the original's exact output values; see `DESIGN.md` for the
//! rationale. What it does preserve exactly is the *protocol* built on top of
//! it: iterated replica-key hashing for the ring, and folding only `is_key`
//! request parameters into a request hash.

const PRIME_1: u32 = 0x9E37_79B1;
const PRIME_2: u32 = 0x85EB_CA6B;
const PRIME_3: u32 = 0xC2B2_AE35;

#[inline]
const fn avalanche(mut h: u32) -> u32 {
    h ^= h >> 15;
    h = h.wrapping_mul(PRIME_2);
    h ^= h >> 13;
    h = h.wrapping_mul(PRIME_3);
    h ^= h >> 16;
    h
}

/// Mixes `seed` with every word in `words`, producing a well-avalanched
/// 32-bit digest. Deterministic: the same `(seed, words)` always yields the
/// same output, and changing any word changes the output.
#[must_use]
pub fn hash32(seed: u32, words: &[u32]) -> u32 {
    let mut h = seed ^ PRIME_1;
    for &w in words {
        h = h.wrapping_add(w.wrapping_mul(PRIME_2));
        h = h.rotate_left(13);
        h = h.wrapping_mul(PRIME_1);
    }
    h = h.wrapping_add((words.len() as u32).wrapping_mul(PRIME_3));
    avalanche(h)
}

/// Hashes a `u64` key by splitting it into its low/high 32-bit words and
/// feeding both to [`hash32`], mirroring how the distributed client hashes
/// its backend-selection keys.
#[must_use]
pub fn hash_u64(seed: u32, key: u64) -> u32 {
    let words = [key as u32, (key >> 32) as u32];
    hash32(seed, &words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        assert_eq!(hash32(1, &[2, 3]), hash32(1, &[2, 3]));
    }

    #[test]
    fn sensitive_to_each_word() {
        let base = hash32(0, &[1, 2, 3]);
        assert_ne!(base, hash32(0, &[9, 2, 3]));
        assert_ne!(base, hash32(0, &[1, 9, 3]));
        assert_ne!(base, hash32(0, &[1, 2, 9]));
        assert_ne!(base, hash32(1, &[1, 2, 3]));
    }

    #[test]
    fn reasonably_uniform_distribution() {
        let mut buckets = [0u32; 16];
        for i in 0..100_000u32 {
            let h = hash32(0, &[i]);
            buckets[(h >> 28) as usize] += 1;
        }
        let expected = 100_000 / 16;
        for count in buckets {
            let delta = (count as i64 - expected as i64).unsigned_abs();
            assert!(delta < expected as u64 / 2, "bucket count {count} too skewed from {expected}");
        }
    }

    #[test]
    fn hash_u64_uses_both_words() {
        let low = hash_u64(0, 0x0000_0000_ABCD_1234);
        let high = hash_u64(0, 0xABCD_1234_0000_0000);
        assert_ne!(low, high);
    }
}
