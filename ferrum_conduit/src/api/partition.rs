use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Picks the reduce partition of a map output record. The result must be in
/// `0..num_partitions`, map tasks fail on anything else.
///
/// Records that share a partition share a reducer. Which reducer that is
/// stays up to the host.
pub trait Partitioner: Send {
    fn partition(&mut self, key: &str, value: &str, num_partitions: u32) -> anyhow::Result<u32>;
}

#[derive(Debug, Default)]
pub struct HashPartitioner;

impl Partitioner for HashPartitioner {
    fn partition(&mut self, key: &str, _value: &str, num_partitions: u32) -> anyhow::Result<u32> {
        if num_partitions == 0 {
            anyhow::bail!("cannot partition into zero partitions");
        }
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        Ok((hasher.finish() % num_partitions as u64) as u32)
    }
}
