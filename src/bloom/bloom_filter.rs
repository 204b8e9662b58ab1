use std::{
    f64::consts::LN_2,
    sync::atomic::{AtomicU64, Ordering},
};

use ahash::RandomState;

use crate::{ExpectedItems, FalsePositiveRate};

// Fixed seeds keep positions stable for the lifetime of a filter and across filters.
// They must not coincide with ahash's internal constants, which degenerate the hash.
const PRIMARY_SEEDS: [u64; 4] = [
    0x5be0_cd19_137e_2179,
    0x1f83_d9ab_fb41_bd6b,
    0x9b05_688c_2b3e_6c1f,
    0x510e_527f_ade6_82d1,
];
const SECONDARY_SEEDS: [u64; 4] = [
    0xcbbb_9d5d_c105_9ed8,
    0x629a_292a_367c_d507,
    0x9159_015a_3070_dd17,
    0x152f_ecd8_f70e_5939,
];

/// Configuration for [`BloomFilter`].
#[derive(Clone, Debug)]
pub struct BloomFilterOptions {
    /// Number of distinct items the filter is sized for.
    pub expected_items: ExpectedItems,
    /// Target false positive probability once `expected_items` have been inserted.
    pub false_positive_rate: FalsePositiveRate,
}

/// Probabilistic set membership.
///
/// [`BloomFilter::contains`] never returns `false` for an inserted item; it may return
/// `true` for an item that was never inserted, with a probability close to the
/// configured rate while the filter holds at most `expected_items` items.
///
/// # Sizing
///
/// - **Bits:** `m = ceil(-n × ln(p) / ln(2)²)`
/// - **Hash functions:** `k = ceil(m / n × ln(2))`
///
/// # Thread Safety
///
/// Bits are stored in atomic words, so every method takes `&self` and the filter can
/// be shared through an `Arc` without a lock.
pub struct BloomFilter {
    words: Box<[AtomicU64]>,
    bit_len: u64,
    hash_count: u32,
    primary: RandomState,
    secondary: RandomState,
}

impl BloomFilter {
    /// Create an empty filter sized from `options`.
    pub fn new(options: BloomFilterOptions) -> Self {
        let bit_len = optimal_bit_len(*options.expected_items, *options.false_positive_rate);
        let hash_count = optimal_hash_count(*options.expected_items, bit_len);
        let word_count = bit_len.div_ceil(64) as usize;

        Self {
            words: (0..word_count).map(|_| AtomicU64::new(0)).collect(),
            bit_len,
            hash_count,
            primary: RandomState::with_seeds(
                PRIMARY_SEEDS[0],
                PRIMARY_SEEDS[1],
                PRIMARY_SEEDS[2],
                PRIMARY_SEEDS[3],
            ),
            secondary: RandomState::with_seeds(
                SECONDARY_SEEDS[0],
                SECONDARY_SEEDS[1],
                SECONDARY_SEEDS[2],
                SECONDARY_SEEDS[3],
            ),
        }
    } // end constructor

    /// Add `item` to the set.
    pub fn insert(&self, item: &[u8]) {
        for position in self.positions(item) {
            let (word, mask) = Self::locate(position);
            self.words[word].fetch_or(mask, Ordering::Relaxed);
        }
    }

    /// `false` if `item` was definitely never inserted, `true` if it may have been.
    pub fn contains(&self, item: &[u8]) -> bool {
        self.positions(item).all(|position| {
            let (word, mask) = Self::locate(position);
            self.words[word].load(Ordering::Relaxed) & mask != 0
        })
    }

    /// Reset every bit.
    pub fn clear(&self) {
        for word in self.words.iter() {
            word.store(0, Ordering::Relaxed);
        }
    }

    /// Number of bits in the filter.
    pub fn bit_len(&self) -> u64 {
        self.bit_len
    }

    /// Number of hash functions applied per item.
    pub fn hash_count(&self) -> u32 {
        self.hash_count
    }

    // Double hashing: position_i = h1 + i * h2 (mod m).
    fn positions(&self, item: &[u8]) -> impl Iterator<Item = u64> {
        let (h1, h2) = self.hashes(item);
        let bit_len = self.bit_len;

        (0..u64::from(self.hash_count)).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % bit_len)
    }

    // h2 is forced odd so the stride is never zero.
    fn hashes(&self, item: &[u8]) -> (u64, u64) {
        (
            self.primary.hash_one(item),
            self.secondary.hash_one(item) | 1,
        )
    }

    #[inline]
    fn locate(position: u64) -> (usize, u64) {
        ((position / 64) as usize, 1u64 << (position % 64))
    }
} // end of impl

fn optimal_bit_len(expected_items: u64, false_positive_rate: f64) -> u64 {
    let bits = -(expected_items as f64) * false_positive_rate.ln() / (LN_2 * LN_2);
    (bits.ceil() as u64).max(1)
}

fn optimal_hash_count(expected_items: u64, bit_len: u64) -> u32 {
    let count = bit_len as f64 / expected_items as f64 * LN_2;
    (count.ceil() as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizing_matches_closed_form() {
        // n = 1000, p = 0.01 -> m = 9586, k = 7
        assert_eq!(optimal_bit_len(1000, 0.01), 9586);
        assert_eq!(optimal_hash_count(1000, 9586), 7);
    }

    fn filter() -> BloomFilter {
        BloomFilter::new(BloomFilterOptions {
            expected_items: ExpectedItems::try_from(1_000).unwrap(),
            false_positive_rate: FalsePositiveRate::default(),
        })
    }

    #[test]
    fn stride_varies_across_items() {
        let filter = filter();

        let strides: std::collections::HashSet<u64> = (0..100)
            .map(|i| filter.hashes(format!("item{i}").as_bytes()).1)
            .collect();

        assert!(strides.len() > 90, "distinct strides: {}", strides.len());
        assert!(!strides.contains(&1));
    }

    #[test]
    fn positions_of_one_item_are_spread_out() {
        let filter = filter();

        let positions: Vec<u64> = filter.positions(b"item7").collect();
        let adjacent = positions.windows(2).filter(|w| w[1] == w[0] + 1).count();

        assert_eq!(positions.len(), filter.hash_count() as usize);
        assert!(adjacent < positions.len() - 1, "positions: {positions:?}");
    }

    #[test]
    fn sizing_never_returns_zero() {
        assert!(optimal_bit_len(1, 0.999) >= 1);
        assert!(optimal_hash_count(1_000_000, 1) >= 1);
    }
}
