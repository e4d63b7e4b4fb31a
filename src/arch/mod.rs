//! Per-CPU-family primitives behind one capability surface.
//!
//! The concrete instruction sequences live in the family modules below; the
//! build target picks exactly one as [`Native`]. Calling code goes through
//! the free functions and stays architecture-oblivious. The trait boundary
//! exists so tests (and future families) can substitute an implementation
//! without touching callers.

use core::sync::atomic::{
    compiler_fence, AtomicPtr, AtomicU32, AtomicUsize, Ordering,
};

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "arm")]
mod arm;
#[cfg(any(target_arch = "riscv64", target_arch = "riscv32"))]
mod riscv;
#[cfg(target_arch = "x86")]
mod x86;
#[cfg(target_arch = "x86_64")]
mod x86_64;

#[cfg(target_arch = "aarch64")]
pub use aarch64::Aarch64 as Native;
#[cfg(target_arch = "arm")]
pub use arm::Arm as Native;
#[cfg(any(target_arch = "riscv64", target_arch = "riscv32"))]
pub use riscv::RiscV as Native;
#[cfg(target_arch = "x86")]
pub use x86::X86 as Native;
#[cfg(target_arch = "x86_64")]
pub use x86_64::X86_64 as Native;

/// Conservative data/instruction cache line stride for the maintenance
/// sweeps. 64 bytes covers every supported core.
pub const CACHE_LINE: usize = 64;

/// One logical operation per architectural need. Semantics are identical
/// across families; only the instruction selection differs.
pub trait ArchOps {
    /// Current stack pointer.
    fn stack_pointer() -> usize;

    /// An address near the call site. On families without a direct PC read
    /// this comes from a local control-transfer trick and is approximate by
    /// nature; treat it as "somewhere in the calling code", never as an
    /// exact return address.
    fn program_counter() -> usize;

    /// Link/return-address register. 0 on x86/x86_64, where the return
    /// address lives on the stack and no such register exists.
    fn link_register() -> usize;

    /// Compiler reordering barrier plus a CPU memory-ordering fence strong
    /// enough that all prior stores are globally visible before any
    /// subsequent instruction executes.
    fn full_barrier();

    /// Make instruction fetch coherent with data writes over
    /// `[addr, addr + len)`. On families with a coherent I-cache this is a
    /// compiler barrier only.
    fn cache_maintain(addr: usize, len: usize);

    /// Software breakpoint trap. Debug instrumentation only.
    fn breakpoint();
}

/// Point-in-time register snapshot. Immutable once captured.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext {
    pub stack_pointer: usize,
    /// Approximate; see [`ArchOps::program_counter`].
    pub program_counter: usize,
    /// 0 on families without a link register.
    pub link_register: usize,
}

/// Snapshot the current stack pointer, approximate program counter, and
/// link register in one call.
#[inline(always)]
pub fn capture_context() -> ExecutionContext {
    ExecutionContext {
        stack_pointer: Native::stack_pointer(),
        program_counter: Native::program_counter(),
        link_register: Native::link_register(),
    }
}

#[inline(always)]
pub fn full_barrier() {
    Native::full_barrier();
}

/// Reordering barrier only: stops the optimizer from moving memory accesses
/// across it, with no CPU fence. Use when cross-core visibility is not the
/// concern.
#[inline(always)]
pub fn compiler_barrier() {
    compiler_fence(Ordering::SeqCst);
}

#[inline]
pub fn cache_maintain(addr: usize, len: usize) {
    Native::cache_maintain(addr, len);
}

#[inline(always)]
pub fn breakpoint() {
    Native::breakpoint();
}

// Atomic primitives over raw slot addresses. All SeqCst, all linearizable
// at single-word granularity via the target's native lock-free instruction.

/// Word-width compare-and-swap. On success the slot now holds `desired`;
/// on failure the observed word is returned untouched.
///
/// # Safety
/// `addr` must be word-aligned and mapped readable+writable.
pub unsafe fn compare_exchange_word(
    addr: usize,
    expected: usize,
    desired: usize,
) -> core::result::Result<usize, usize> {
    let slot = unsafe { AtomicUsize::from_ptr(addr as *mut usize) };
    slot.compare_exchange(expected, desired, Ordering::SeqCst, Ordering::SeqCst)
}

/// # Safety
/// See [`compare_exchange_word`].
pub unsafe fn cas_word(addr: usize, expected: usize, desired: usize) -> bool {
    unsafe { compare_exchange_word(addr, expected, desired) }.is_ok()
}

/// # Safety
/// `addr` must be 4-byte aligned and mapped readable+writable.
pub unsafe fn cas_u32(addr: usize, expected: u32, desired: u32) -> bool {
    let slot = unsafe { AtomicU32::from_ptr(addr as *mut u32) };
    slot.compare_exchange(expected, desired, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}

/// # Safety
/// `addr` must be 8-byte aligned and mapped readable+writable.
#[cfg(target_has_atomic = "64")]
pub unsafe fn cas_u64(addr: usize, expected: u64, desired: u64) -> bool {
    let slot = unsafe { core::sync::atomic::AtomicU64::from_ptr(addr as *mut u64) };
    slot.compare_exchange(expected, desired, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}

/// # Safety
/// `addr` must be pointer-aligned and mapped readable+writable.
pub unsafe fn cas_ptr(
    addr: usize,
    expected: *mut core::ffi::c_void,
    desired: *mut core::ffi::c_void,
) -> bool {
    let slot = unsafe { AtomicPtr::from_ptr(addr as *mut *mut core::ffi::c_void) };
    slot.compare_exchange(expected, desired, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}

/// Returns the value before the addition.
///
/// # Safety
/// `addr` must be 4-byte aligned and mapped readable+writable.
pub unsafe fn fetch_add_u32(addr: usize, value: u32) -> u32 {
    let slot = unsafe { AtomicU32::from_ptr(addr as *mut u32) };
    slot.fetch_add(value, Ordering::SeqCst)
}

/// Returns the value after the addition.
///
/// # Safety
/// `addr` must be 4-byte aligned and mapped readable+writable.
pub unsafe fn add_fetch_u32(addr: usize, value: u32) -> u32 {
    unsafe { fetch_add_u32(addr, value) }.wrapping_add(value)
}

/// Atomically store `value`, returning the displaced word.
///
/// # Safety
/// `addr` must be word-aligned and mapped readable+writable.
pub unsafe fn exchange_word(addr: usize, value: usize) -> usize {
    let slot = unsafe { AtomicUsize::from_ptr(addr as *mut usize) };
    slot.swap(value, Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_snapshot_points_into_the_stack() {
        let probe = 0u8;
        let ctx = capture_context();
        assert_ne!(ctx.stack_pointer, 0);
        // The captured SP should be within a few pages of a local.
        let local = &probe as *const u8 as usize;
        let distance = local.abs_diff(ctx.stack_pointer);
        assert!(distance < 1 << 20, "sp {:#x} too far from local {:#x}", ctx.stack_pointer, local);
        assert_ne!(ctx.program_counter, 0);
    }

    #[test]
    fn program_counter_lands_near_the_caller() {
        let here = program_counter_lands_near_the_caller as usize;
        let pc = Native::program_counter();
        // Approximate by design; it should still land within this
        // function's neighborhood, not in another mapping.
        assert!(pc.abs_diff(here) < 1 << 24, "pc {pc:#x} vs fn {here:#x}");
    }

    #[test]
    fn barriers_and_cache_maintenance_complete() {
        full_barrier();
        compiler_barrier();
        let code = [0u8; 128];
        cache_maintain(code.as_ptr() as usize, code.len());
        cache_maintain(code.as_ptr() as usize, 0);
    }

    #[test]
    fn word_cas_succeeds_then_detects_mismatch() {
        let mut slot: usize = 10;
        let addr = &mut slot as *mut usize as usize;
        unsafe {
            assert!(cas_word(addr, 10, 20));
            assert_eq!(slot, 20);
            assert!(!cas_word(addr, 10, 30));
            assert_eq!(slot, 20);
            assert_eq!(compare_exchange_word(addr, 99, 1), Err(20));
        }
    }

    #[test]
    fn fetch_add_and_add_fetch_agree() {
        let mut counter: u32 = 5;
        let addr = &mut counter as *mut u32 as usize;
        unsafe {
            assert_eq!(fetch_add_u32(addr, 3), 5);
            assert_eq!(add_fetch_u32(addr, 2), 10);
        }
        assert_eq!(counter, 10);
    }

    #[test]
    fn narrow_and_pointer_cas_operate_on_their_width() {
        let mut narrow: u32 = 1;
        let addr = &mut narrow as *mut u32 as usize;
        unsafe {
            assert!(cas_u32(addr, 1, 2));
            assert!(!cas_u32(addr, 1, 3));
        }
        assert_eq!(narrow, 2);

        let mut cell: *mut core::ffi::c_void = core::ptr::null_mut();
        let marker = 0x1000 as *mut core::ffi::c_void;
        let addr = &mut cell as *mut *mut core::ffi::c_void as usize;
        unsafe {
            assert!(cas_ptr(addr, core::ptr::null_mut(), marker));
            assert!(!cas_ptr(addr, core::ptr::null_mut(), marker));
        }
        assert_eq!(cell, marker);
    }

    #[test]
    fn exchange_returns_displaced_word() {
        let mut slot: usize = 0xAA;
        let addr = &mut slot as *mut usize as usize;
        unsafe {
            assert_eq!(exchange_word(addr, 0xBB), 0xAA);
        }
        assert_eq!(slot, 0xBB);
    }
}
