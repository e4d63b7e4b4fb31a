//! Linear byte-pattern search over memory regions.

/// Offset of the first occurrence of `pattern` in `region`, or `None`.
///
/// Empty patterns and patterns longer than the region are "not found", not
/// errors. Deterministic single pass, no wraparound; worst case
/// O(region × pattern), acceptable because callers bound the region
/// (a function prologue, a known table).
pub fn find_pattern(region: &[u8], pattern: &[u8]) -> Option<usize> {
    if pattern.is_empty() || pattern.len() > region.len() {
        return None;
    }
    region
        .windows(pattern.len())
        .position(|window| window == pattern)
}

/// Every offset at which `pattern` occurs in `region`, in ascending order.
/// Overlapping occurrences are all reported.
pub fn find_pattern_all(region: &[u8], pattern: &[u8]) -> Vec<usize> {
    if pattern.is_empty() || pattern.len() > region.len() {
        return Vec::new();
    }
    region
        .windows(pattern.len())
        .enumerate()
        .filter(|(_, window)| *window == pattern)
        .map(|(i, _)| i)
        .collect()
}

/// Scan `len` bytes of raw memory starting at `base`. Returns the absolute
/// address of the first match.
///
/// # Safety
/// `[base, base + len)` must be mapped and readable for the duration of the
/// scan; an out-of-range window supplied here faults in hardware, it is not
/// guarded against.
pub unsafe fn scan_at(base: *const u8, len: usize, pattern: &[u8]) -> Option<usize> {
    let region = unsafe { core::slice::from_raw_parts(base, len) };
    find_pattern(region, pattern).map(|off| base as usize + off)
}
