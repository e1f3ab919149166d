/// Splits `items` into consecutive blocks of at most `block_size` elements.
///
/// An exact multiple of `block_size` yields no trailing empty block, and an
/// empty input yields no blocks at all. A `block_size` of zero is treated as
/// one so no item is ever dropped.
pub fn partition<T>(items: &[T], block_size: usize) -> Vec<&[T]> {
    items.chunks(block_size.max(1)).collect()
}

/// Number of blocks `partition` produces for `len` items.
pub fn block_count(len: usize, block_size: usize) -> usize {
    len.div_ceil(block_size.max(1))
}
