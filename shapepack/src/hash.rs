//! Hashing support for the converter cache and property tables.

use core::hash::{BuildHasherDefault, Hash, Hasher};
use core::ops::BitXor as _;

/// The hasher builder used by every table in this crate.
pub type FxBuildHasher = BuildHasherDefault<FxHasher64>;

/// A cross-platform 64-bit implementation of fxhash.
#[derive(Default)]
pub struct FxHasher64 {
    hash: u64,
}

#[inline]
fn hash_word(hash: u64, word: u64) -> u64 {
    const ROTATE: u32 = 5;
    const SEED: u64 = 0x51_7c_c1_b7_27_22_0a_95;

    hash.rotate_left(ROTATE).bitxor(word).wrapping_mul(SEED)
}

#[inline]
fn hash_bytes(mut hash: u64, bytes: &[u8]) -> u64 {
    let mut chunks = bytes.chunks_exact(8);
    for chunk in &mut chunks {
        let mut word = [0; 8];
        word.copy_from_slice(chunk);
        hash = hash_word(hash, u64::from_le_bytes(word));
    }

    let rest = chunks.remainder();
    if !rest.is_empty() {
        let mut word = [0; 8];
        word[..rest.len()].copy_from_slice(rest);
        hash = hash_word(hash, u64::from_le_bytes(word));
    }

    hash
}

impl Hasher for FxHasher64 {
    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        self.hash = hash_bytes(self.hash, bytes);
    }

    #[inline]
    fn finish(&self) -> u64 {
        self.hash
    }

    #[inline]
    fn write_u8(&mut self, i: u8) {
        self.hash = hash_word(self.hash, i as u64);
    }

    #[inline]
    fn write_u16(&mut self, i: u16) {
        self.hash = hash_word(self.hash, i as u64);
    }

    #[inline]
    fn write_u32(&mut self, i: u32) {
        self.hash = hash_word(self.hash, i as u64);
    }

    #[inline]
    fn write_u64(&mut self, i: u64) {
        self.hash = hash_word(self.hash, i);
    }

    #[inline]
    fn write_usize(&mut self, i: usize) {
        self.hash = hash_word(self.hash, i as u64);
    }
}

/// Hashes the given value with the default value of the specified `Hasher`.
pub fn hash_value<Q, H: Hasher + Default>(value: &Q) -> u64
where
    Q: Hash + ?Sized,
{
    let mut state = H::default();
    value.hash(&mut state);
    state.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_byte_strings_hash_equal() {
        let a = hash_value::<_, FxHasher64>(&b"remaining_depth"[..]);
        let b = hash_value::<_, FxHasher64>(&b"remaining_depth"[..]);
        assert_eq!(a, b);
        let c = hash_value::<_, FxHasher64>(&b"remaining_width"[..]);
        assert_ne!(a, c);
    }
}
