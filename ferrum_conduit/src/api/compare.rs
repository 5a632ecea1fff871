use std::cmp::Ordering;

/// Compares serialized keys without deserializing them.
///
/// Both the sort and the grouping comparator bindings use this trait. The
/// byte ranges are handed over exactly as the host stores them, decoding any
/// length prefix is up to the implementation.
pub trait RawComparator: Send {
    fn compare_raw(
        &mut self,
        b1: &[u8],
        s1: usize,
        l1: usize,
        b2: &[u8],
        s2: usize,
        l2: usize,
    ) -> anyhow::Result<Ordering>;

    fn compare(&mut self, a: &[u8], b: &[u8]) -> anyhow::Result<Ordering> {
        self.compare_raw(a, 0, a.len(), b, 0, b.len())
    }
}

/// Plain lexicographic byte order.
#[derive(Debug, Default)]
pub struct BytesComparator;

impl RawComparator for BytesComparator {
    fn compare_raw(
        &mut self,
        b1: &[u8],
        s1: usize,
        l1: usize,
        b2: &[u8],
        s2: usize,
        l2: usize,
    ) -> anyhow::Result<Ordering> {
        let left = s1
            .checked_add(l1)
            .and_then(|end| b1.get(s1..end))
            .ok_or_else(|| anyhow::anyhow!("range {}+{} outside left buffer", s1, l1))?;
        let right = s2
            .checked_add(l2)
            .and_then(|end| b2.get(s2..end))
            .ok_or_else(|| anyhow::anyhow!("range {}+{} outside right buffer", s2, l2))?;
        Ok(left.cmp(right))
    }
}
