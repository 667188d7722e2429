/// A contiguous slice of the input sent as one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a, T> {
    pub index: usize,
    pub items: &'a [T],
}

/// Number of batches needed for `total_items` at `batch_size` per batch.
/// A zero batch size is treated as one.
pub fn batch_count(total_items: usize, batch_size: usize) -> usize {
    total_items.div_ceil(batch_size.max(1))
}

/// Split `items` into order-preserving chunks of `batch_size`; the last one
/// may be shorter. Chunk `i` covers `[i * batch_size, min((i + 1) * batch_size, n))`.
pub fn partition<T>(items: &[T], batch_size: usize) -> impl Iterator<Item = Chunk<'_, T>> {
    let batch_size = batch_size.max(1);
    items
        .chunks(batch_size)
        .enumerate()
        .map(|(index, items)| Chunk { index, items })
}
