//! Non-elidable memory access primitives and page arithmetic.
//!
//! Everything here may touch memory that an instruction fetch unit or
//! another process observes concurrently, so the byte loops go through
//! `read_volatile`/`write_volatile`: the optimizer may not coalesce,
//! reorder, or elide them into a differently-shaped bulk operation.

use std::sync::OnceLock;

static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

/// Process page granularity, queried once from the kernel on first use.
pub fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(|| {
        // SAFETY: sysconf(_SC_PAGESIZE) cannot fail on Linux.
        unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
    })
}

/// Round `addr` down to the containing page boundary.
pub fn align_down(addr: usize) -> usize {
    addr & !(page_size() - 1)
}

/// Round `addr` up to the next page boundary (identity if already aligned).
pub fn align_up(addr: usize) -> usize {
    let page = page_size();
    (addr + page - 1) & !(page - 1)
}

/// Copy `len` bytes, one volatile byte at a time, in ascending order.
///
/// # Safety
/// `src` must be readable and `dst` writable for `len` bytes; the ranges
/// must not overlap.
pub unsafe fn volatile_copy(dst: *mut u8, src: *const u8, len: usize) {
    for i in 0..len {
        unsafe { dst.add(i).write_volatile(src.add(i).read_volatile()) };
    }
}

/// Fill `len` bytes at `dst` with `byte`, one volatile store at a time.
///
/// # Safety
/// `dst` must be writable for `len` bytes.
pub unsafe fn volatile_fill(dst: *mut u8, byte: u8, len: usize) {
    for i in 0..len {
        unsafe { dst.add(i).write_volatile(byte) };
    }
}

/// Byte-wise compare observing every byte. Returns the difference of the
/// first mismatching pair (as `a[i] - b[i]`), or 0 if the ranges are equal.
///
/// # Safety
/// Both pointers must be readable for `len` bytes.
pub unsafe fn volatile_compare(a: *const u8, b: *const u8, len: usize) -> i32 {
    for i in 0..len {
        let x = unsafe { a.add(i).read_volatile() };
        let y = unsafe { b.add(i).read_volatile() };
        if x != y {
            return x as i32 - y as i32;
        }
    }
    0
}

/// Volatile word load from a naturally aligned slot.
///
/// # Safety
/// `addr` must be word-aligned and mapped readable.
pub unsafe fn read_word(addr: usize) -> usize {
    unsafe { (addr as *const usize).read_volatile() }
}

/// Volatile word store to a naturally aligned slot. A single store of the
/// architecture's natural width, atomic without a CAS on every supported
/// target.
///
/// # Safety
/// `addr` must be word-aligned and mapped writable.
pub unsafe fn write_word(addr: usize, value: usize) {
    unsafe { (addr as *mut usize).write_volatile(value) };
}
