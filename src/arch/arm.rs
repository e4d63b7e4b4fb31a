use super::ArchOps;
use core::arch::asm;

pub struct Arm;

impl ArchOps for Arm {
    #[inline(always)]
    fn stack_pointer() -> usize {
        let sp: u32;
        unsafe {
            asm!("mov {}, sp", out(reg) sp, options(nomem, nostack, preserves_flags));
        }
        sp as usize
    }

    #[inline(always)]
    fn program_counter() -> usize {
        // Reads PC + 8 in ARM state (pipeline offset); approximate by design.
        let pc: u32;
        unsafe {
            asm!("mov {}, pc", out(reg) pc, options(nomem, nostack, preserves_flags));
        }
        pc as usize
    }

    #[inline(always)]
    fn link_register() -> usize {
        let lr: u32;
        unsafe {
            asm!("mov {}, lr", out(reg) lr, options(nomem, nostack, preserves_flags));
        }
        lr as usize
    }

    #[inline(always)]
    fn full_barrier() {
        unsafe {
            asm!("dmb", options(nostack, preserves_flags));
        }
    }

    fn cache_maintain(addr: usize, len: usize) {
        if len == 0 {
            return;
        }
        // Cache maintenance by VA is privileged on arm32; the kernel sweeps
        // both caches for us.
        if let Err(e) = unsafe { crate::sys::cacheflush(addr, addr + len) } {
            log::warn!("arm cacheflush over {addr:#x}+{len:#x} failed: {e}");
        }
    }

    #[inline(always)]
    fn breakpoint() {
        unsafe {
            asm!("bkpt #0", options(nomem, nostack, preserves_flags));
        }
    }
}
