//! Scoped page-protection changes with guaranteed restoration.

use crate::error::{PatchError, Result};
use crate::mem;
use crate::sys;

/// Relaxed page protection over an address range, restored on every exit
/// path. The range is rounded outward to whole pages; the protection in
/// force beforehand is recorded best-effort and reinstated exactly once,
/// either through [`release`](Self::release) or on drop.
///
/// Guards are not shareable across threads: two guards over overlapping
/// pages race on the kernel-level protection state, so callers must
/// serialize overlapping-range changes externally.
#[derive(Debug)]
pub struct ProtectionGuard {
    page_base: usize,
    page_span: usize,
    previous: i32,
    active: bool,
}

impl ProtectionGuard {
    /// Change protection over the pages containing `[addr, addr + len)`.
    ///
    /// On failure nothing was changed and no guard exists, so the protected
    /// operation must be skipped entirely.
    pub fn acquire(addr: usize, len: usize, prot: i32) -> Result<Self> {
        if len == 0 {
            return Err(PatchError::AddressInvalid { address: addr });
        }
        let page_base = mem::align_down(addr);
        let page_span = mem::align_up(addr + len) - page_base;
        let previous = query_protection(page_base).unwrap_or_else(|| {
            log::debug!(
                "no maps entry for {page_base:#x}; assuming r-x for restore"
            );
            libc::PROT_READ | libc::PROT_EXEC
        });

        // SAFETY: page_base/page_span are page-rounded; an unmapped range is
        // rejected by the kernel, not dereferenced here.
        if let Err(e) = unsafe { sys::mprotect(page_base, page_span, prot) } {
            let errno = match e {
                PatchError::Kernel { errno, .. } => errno,
                _ => 0,
            };
            return Err(PatchError::ProtectionChangeFailed {
                address: page_base,
                size: page_span,
                errno,
            });
        }

        Ok(Self {
            page_base,
            page_span,
            previous,
            active: true,
        })
    }

    /// Page-aligned base of the span actually re-protected.
    pub fn page_base(&self) -> usize {
        self.page_base
    }

    /// Whole-page byte length of the span actually re-protected.
    pub fn page_span(&self) -> usize {
        self.page_span
    }

    /// Restore the previous protection. Idempotent; also runs on drop.
    pub fn release(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        // SAFETY: same page-rounded range the acquire changed.
        if let Err(e) = unsafe { sys::mprotect(self.page_base, self.page_span, self.previous) } {
            log::warn!(
                "failed to restore protection {:#x} over {:#x}+{:#x}: {e}",
                self.previous,
                self.page_base,
                self.page_span
            );
        }
    }
}

impl Drop for ProtectionGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Best-effort lookup of the protection currently covering `addr`, from
/// /proc/self/maps.
fn query_protection(addr: usize) -> Option<i32> {
    let maps = std::fs::read_to_string("/proc/self/maps").ok()?;
    for line in maps.lines() {
        let mut fields = line.split_whitespace();
        let (Some(range), Some(perms)) = (fields.next(), fields.next()) else {
            continue;
        };
        let Some((start_s, end_s)) = range.split_once('-') else {
            continue;
        };
        let (Ok(start), Ok(end)) = (
            usize::from_str_radix(start_s, 16),
            usize::from_str_radix(end_s, 16),
        ) else {
            continue;
        };
        if addr < start || addr >= end {
            continue;
        }
        let perms = perms.as_bytes();
        let mut prot = libc::PROT_NONE;
        if perms.first() == Some(&b'r') {
            prot |= libc::PROT_READ;
        }
        if perms.get(1) == Some(&b'w') {
            prot |= libc::PROT_WRITE;
        }
        if perms.get(2) == Some(&b'x') {
            prot |= libc::PROT_EXEC;
        }
        return Some(prot);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_pages(count: usize, prot: i32) -> (*mut u8, usize) {
        let len = count * mem::page_size();
        let p = unsafe {
            sys::mmap(
                core::ptr::null_mut(),
                len,
                prot,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        }
        .expect("mmap");
        (p, len)
    }

    #[test]
    fn unaligned_range_rounds_outward_to_whole_pages() {
        let page = mem::page_size();
        let (base, len) = map_pages(5, libc::PROT_READ);
        // Two pages of payload starting mid-page straddle three pages.
        let addr = base as usize + page + 16;
        let span_len = 2 * page;
        let mut guard = ProtectionGuard::acquire(
            addr,
            span_len,
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
        )
        .expect("acquire");
        assert_eq!(guard.page_base(), base as usize + page);
        assert_eq!(guard.page_span(), 3 * page);
        guard.release();
        unsafe { sys::munmap(base, len).unwrap() };
    }

    #[test]
    fn write_allowed_only_while_guard_is_active() {
        let (base, len) = map_pages(1, libc::PROT_READ);
        let addr = base as usize;
        {
            let _guard =
                ProtectionGuard::acquire(addr, 8, libc::PROT_READ | libc::PROT_WRITE)
                    .expect("acquire");
            unsafe { base.write_volatile(0x7F) };
        }
        // Guard dropped: the page is read-only again. Verify through the
        // kernel rather than by faulting.
        assert_eq!(super::query_protection(addr), Some(libc::PROT_READ));
        unsafe { sys::munmap(base, len).unwrap() };
    }

    #[test]
    fn release_is_idempotent() {
        let (base, len) = map_pages(1, libc::PROT_READ | libc::PROT_WRITE);
        let mut guard = ProtectionGuard::acquire(
            base as usize,
            8,
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
        )
        .expect("acquire");
        guard.release();
        guard.release();
        drop(guard);
        assert_eq!(
            super::query_protection(base as usize),
            Some(libc::PROT_READ | libc::PROT_WRITE)
        );
        unsafe { sys::munmap(base, len).unwrap() };
    }

    #[test]
    fn acquire_on_unmapped_range_fails_cleanly() {
        // Map then unmap to get an address that is definitely not ours.
        let (base, len) = map_pages(1, libc::PROT_READ);
        unsafe { sys::munmap(base, len).unwrap() };
        match ProtectionGuard::acquire(base as usize, 8, libc::PROT_READ | libc::PROT_WRITE) {
            Err(PatchError::ProtectionChangeFailed { errno, .. }) => {
                assert_eq!(errno, libc::ENOMEM);
            }
            other => panic!("expected ProtectionChangeFailed, got {other:?}"),
        }
    }

    #[test]
    fn zero_length_range_is_rejected() {
        let x = 0u8;
        let addr = &x as *const u8 as usize;
        assert!(matches!(
            ProtectionGuard::acquire(addr, 0, libc::PROT_READ),
            Err(PatchError::AddressInvalid { .. })
        ));
    }
}
