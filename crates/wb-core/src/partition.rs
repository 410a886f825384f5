use std::num::NonZeroUsize;

/// Splits `items` into at most `max_groups` contiguous groups whose sizes
/// differ by at most one. The first `len % max_groups` groups hold the extra
/// element. Groups that would be empty are not emitted, so an empty input
/// yields no groups.
pub fn split_balanced<T: Clone>(items: &[T], max_groups: NonZeroUsize) -> Vec<Vec<T>> {
    let groups = max_groups.get();
    let base = items.len() / groups;
    let extra = items.len() % groups;

    let mut chunks = Vec::with_capacity(groups.min(items.len()));
    let mut start = 0usize;
    for index in 0..groups {
        let size = base + usize::from(index < extra);
        // sizes are non-increasing, so every later group is empty too
        if size == 0 {
            break;
        }
        chunks.push(items[start..start + size].to_vec());
        start += size;
    }

    chunks
}

pub fn partition_uids(uids: &[String], max_groups: NonZeroUsize) -> Vec<Vec<String>> {
    split_balanced(uids, max_groups)
}
