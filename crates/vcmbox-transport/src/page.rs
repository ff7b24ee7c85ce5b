/// Page size used for mapping and for firmware allocations.
pub const PAGE_SIZE: usize = 0x1000;

/// Round `n` up to the next page boundary; `None` on overflow.
pub const fn page_roundup(n: usize) -> Option<usize> {
    match n.checked_add(PAGE_SIZE - 1) {
        Some(padded) => Some(padded & !(PAGE_SIZE - 1)),
        None => None,
    }
}
