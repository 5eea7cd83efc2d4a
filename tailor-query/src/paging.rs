/// Offset of the first item on a 1-based `page`. `None` for page 0, page size
/// 0 or on overflow.
pub fn page_offset(page: u32, page_size: u32) -> Option<usize> {
    if page == 0 || page_size == 0 {
        return None;
    }
    (page as usize - 1).checked_mul(page_size as usize)
}

/// `ceil(total / page_size)`; zero when there is nothing to page through.
pub fn total_pages(total: u64, page_size: u32) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size as u64)
}
