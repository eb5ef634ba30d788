//! # Partitioner
//!
//! Routes keys to stream partitions, so every message for one key lands in the same
//! task.

use ahash::RandomState;

use crate::functions::GroupKey;

pub trait Partitioner<T: ?Sized>: Send + Sync {
    /// Partition in `0..num_partitions` for `value`.
    fn partition(&self, value: &T, num_partitions: u32) -> u32;
}

/// Fixed ahash keys. `RandomState::default()` draws its keys once per process.
const PARTITION_HASH: RandomState = RandomState::with_seeds(
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
);

/// Hashes serialized key bytes with ahash under fixed keys.
///
/// The mapping is the same in every task and every process of one build on one
/// target. ahash output may differ between targets and ahash versions.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashPartitioner;

impl Partitioner<[u8]> for HashPartitioner {
    fn partition(&self, value: &[u8], num_partitions: u32) -> u32 {
        if num_partitions <= 1 {
            return 0;
        }
        (PARTITION_HASH.hash_one(value) % u64::from(num_partitions)) as u32
    }
}

impl Partitioner<GroupKey> for HashPartitioner {
    fn partition(&self, value: &GroupKey, num_partitions: u32) -> u32 {
        <Self as Partitioner<[u8]>>::partition(self, value.bytes(), num_partitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_key_same_partition() {
        let p = HashPartitioner;
        let a = GroupKey::of("user_1".to_string()).unwrap();
        let b = GroupKey::of("user_1".to_string()).unwrap();
        assert_eq!(p.partition(&a, 4), p.partition(&b, 4));
    }

    #[test]
    fn test_mapping_uses_fixed_keys() {
        let seeded = RandomState::with_seeds(
            0x243f_6a88_85a3_08d3,
            0x1319_8a2e_0370_7344,
            0xa409_3822_299f_31d0,
            0x082e_fa98_ec4e_6c89,
        );
        for i in 0..100 {
            let key = GroupKey::of(format!("user_{i}")).unwrap();
            let expected = (seeded.hash_one(key.bytes()) % 8) as u32;
            assert_eq!(HashPartitioner.partition(&key, 8), expected);
        }
    }

    #[test]
    fn test_distribution() {
        let p = HashPartitioner;
        let mut counts = [0u32; 4];
        for i in 0..1000 {
            let key = GroupKey::of(format!("user_{i}")).unwrap();
            counts[p.partition(&key, 4) as usize] += 1;
        }
        for count in counts {
            assert!(count > 200 && count < 300, "Unbalanced distribution: {count}");
        }
    }

    #[test]
    fn test_single_partition() {
        let p = HashPartitioner;
        assert_eq!(p.partition(&b"anything"[..], 1), 0);
        assert_eq!(p.partition(&b"anything"[..], 0), 0);
    }
}
