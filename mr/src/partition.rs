use crate::record::Key;

/// Returns the index of the reduce worker that owns `key`.
///
/// djb2 over the key bytes, so the result depends on nothing but the key and
/// the worker count. Every rank computes the same owner without coordination.
pub fn partition(key: &Key, reduce_workers: usize) -> usize {
    debug_assert!(reduce_workers > 0, "partition over zero reduce workers");
    let hash = key
        .as_bytes()
        .iter()
        .fold(5381u64, |h, &b| h.wrapping_mul(33).wrapping_add(u64::from(b)));
    (hash % reduce_workers as u64) as usize
}
