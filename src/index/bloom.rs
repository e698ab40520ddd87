//! Bloom filter over normalized titles.
//!
//! Hashing uses xxh3 with two fixed seeds combined by double hashing
//! (`h1 + i * h2`), so a filter built in one process answers identically in
//! another.

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::error::{Result, StoreError};

const SEED_1: u64 = 0;
const SEED_2: u64 = 1;
const MAX_HASHES: u32 = 16;

/// Probabilistic set membership: no false negatives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloomFilter {
    bits: Vec<u64>,
    bit_count: u64,
    hash_count: u32,
}

impl BloomFilter {
    /// Size a filter for `expected_items` at false-positive rate `fp_rate`.
    ///
    /// `m = ceil(-n ln p / ln²2)`, `k = round(m/n · ln 2)` clamped to `[1, 16]`.
    pub fn with_rate(expected_items: usize, fp_rate: f64) -> Result<Self> {
        if !(fp_rate > 0.0 && fp_rate < 1.0) {
            return Err(StoreError::validation(format!(
                "bloom false-positive rate must be in (0, 1), got {}",
                fp_rate
            )));
        }
        let n = expected_items.max(1) as f64;
        let ln2 = std::f64::consts::LN_2;
        let m = (-(n * fp_rate.ln()) / (ln2 * ln2)).ceil().max(64.0) as u64;
        let k = ((m as f64 / n) * ln2).round().clamp(1.0, MAX_HASHES as f64) as u32;
        Ok(Self::with_params(m, k))
    }

    /// Explicit bit and hash counts.
    pub fn with_params(bit_count: u64, hash_count: u32) -> Self {
        let bit_count = bit_count.max(1);
        let words = bit_count.div_ceil(64) as usize;
        Self {
            bits: vec![0; words],
            bit_count,
            hash_count: hash_count.clamp(1, MAX_HASHES),
        }
    }

    pub fn bit_count(&self) -> u64 {
        self.bit_count
    }

    pub fn hash_count(&self) -> u32 {
        self.hash_count
    }

    fn positions(&self, key: &str) -> impl Iterator<Item = u64> {
        let h1 = xxh3_64_with_seed(key.as_bytes(), SEED_1);
        let h2 = xxh3_64_with_seed(key.as_bytes(), SEED_2) | 1;
        let m = self.bit_count;
        (0..self.hash_count as u64).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % m)
    }

    pub fn insert(&mut self, key: &str) {
        let positions: Vec<u64> = self.positions(key).collect();
        for pos in positions {
            self.bits[(pos / 64) as usize] |= 1u64 << (pos % 64);
        }
    }

    /// `false` means definitely absent.
    pub fn contains(&self, key: &str) -> bool {
        self.positions(key)
            .all(|pos| self.bits[(pos / 64) as usize] & (1u64 << (pos % 64)) != 0)
    }

    /// Fraction of bits set.
    pub fn fill_ratio(&self) -> f64 {
        let set: u64 = self.bits.iter().map(|w| w.count_ones() as u64).sum();
        set as f64 / self.bit_count as f64
    }

    /// Structural check after deserialization.
    pub fn validate(&self) -> Result<()> {
        if self.bit_count == 0 || self.bits.len() as u64 != self.bit_count.div_ceil(64) {
            return Err(StoreError::encoding(format!(
                "bloom filter has {} words for {} bits",
                self.bits.len(),
                self.bit_count
            )));
        }
        if self.hash_count == 0 || self.hash_count > MAX_HASHES {
            return Err(StoreError::encoding(format!(
                "bloom filter hash count {} out of range",
                self.hash_count
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizing() {
        let bloom = BloomFilter::with_rate(1_000_000, 0.01).unwrap();
        // ~9.59 bits per item, 7 hashes
        assert_eq!(bloom.bit_count(), 9_585_059);
        assert_eq!(bloom.hash_count(), 7);
        assert!(BloomFilter::with_rate(10, 0.0).is_err());
        assert!(BloomFilter::with_rate(10, 1.0).is_err());
    }

    #[test]
    fn test_no_false_negatives_and_bounded_fpr() {
        let n = 10_000;
        let mut bloom = BloomFilter::with_rate(n, 0.01).unwrap();
        for i in 0..n {
            bloom.insert(&format!("title {}", i));
        }
        for i in 0..n {
            assert!(bloom.contains(&format!("title {}", i)));
        }

        let samples = 20_000;
        let false_positives = (0..samples)
            .filter(|i| bloom.contains(&format!("absent {}", i)))
            .count();
        let rate = false_positives as f64 / samples as f64;
        assert!(rate < 0.02, "false-positive rate {} too high", rate);
    }

    #[test]
    fn test_deterministic_across_instances() {
        let mut a = BloomFilter::with_rate(100, 0.01).unwrap();
        let mut b = BloomFilter::with_rate(100, 0.01).unwrap();
        a.insert("ulm");
        b.insert("ulm");
        assert_eq!(a, b);
        assert!(a.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_truncated_bits() {
        let mut bloom = BloomFilter::with_params(1024, 3);
        bloom.bits.pop();
        assert!(bloom.validate().is_err());
    }
}
