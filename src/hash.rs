//! Key hashing: the 32-bit bucket-placement mixer and the 128-bit
//! fingerprint used to disambiguate truncated keys.
//!
//! Two independent hashes are needed: a 32-bit MurmurHash3 for bucket
//! placement (deterministic and stable across implementations so
//! persisted regions remain portable), and a 128-bit MD5 digest for keys
//! longer than `KEYMAX`, whose inline prefix and length alone cannot
//! reliably distinguish two keys. The mixer is hand-rolled so it stays
//! bit-exact and independent of any particular crate's internal tuning.

use md5::{Digest, Md5};

const C1: u32 = 0xcc9e2d51;
const C2: u32 = 0x1b873593;

/// MurmurHash3 x86_32, seeded with 0. Deterministic, stable across
/// implementations, and matches the reference's `qhashmurmur3_32`.
pub fn mix32(data: &[u8]) -> u32 {
    let mut h1: u32 = 0;
    let nblocks = data.len() / 4;

    for i in 0..nblocks {
        let off = i * 4;
        let mut k1 = u32::from_le_bytes([
            data[off],
            data[off + 1],
            data[off + 2],
            data[off + 3],
        ]);

        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(15);
        k1 = k1.wrapping_mul(C2);

        h1 ^= k1;
        h1 = h1.rotate_left(13);
        h1 = h1.wrapping_mul(5).wrapping_add(0xe6546b64);
    }

    let tail = &data[nblocks * 4..];
    let mut k1: u32 = 0;
    if tail.len() >= 3 {
        k1 ^= (tail[2] as u32) << 16;
    }
    if tail.len() >= 2 {
        k1 ^= (tail[1] as u32) << 8;
    }
    if !tail.is_empty() {
        k1 ^= tail[0] as u32;
        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(15);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;
    }

    h1 ^= data.len() as u32;
    h1 = fmix32(h1);
    h1
}

/// The finalizer mix applied to `mix32`'s running hash.
fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;
    h
}

/// Compute the home index for `key` modulo `capacity`.
///
/// `capacity` must be nonzero; callers are expected to have already
/// rejected an empty table via `Error::InvalidArgument`.
pub fn home_index(key: &[u8], capacity: u32) -> u32 {
    mix32(key) % capacity
}

/// 128-bit MD5 fingerprint used to disambiguate keys longer than
/// `KEYMAX` whose first `KEYMAX` bytes and length collide.
pub fn fingerprint(key: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(key);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mix32_is_deterministic() {
        let a = mix32(b"hello world");
        let b = mix32(b"hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn mix32_distinguishes_keys() {
        assert_ne!(mix32(b"alpha"), mix32(b"beta"));
    }

    #[test]
    fn mix32_empty_key() {
        // must not panic on zero-length input
        let _ = mix32(b"");
    }

    #[test]
    fn fingerprint_is_deterministic_and_16_bytes() {
        let a = fingerprint(b"a reasonably long key that exceeds keymax");
        let b = fingerprint(b"a reasonably long key that exceeds keymax");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn fingerprint_distinguishes_keys() {
        assert_ne!(fingerprint(b"key one"), fingerprint(b"key two"));
    }
}
