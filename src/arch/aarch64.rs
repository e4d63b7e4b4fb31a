use super::{ArchOps, CACHE_LINE};
use core::arch::asm;

pub struct Aarch64;

impl ArchOps for Aarch64 {
    #[inline(always)]
    fn stack_pointer() -> usize {
        let sp: u64;
        unsafe {
            asm!("mov {}, sp", out(reg) sp, options(nomem, nostack, preserves_flags));
        }
        sp as usize
    }

    #[inline(always)]
    fn program_counter() -> usize {
        let pc: u64;
        unsafe {
            asm!("adr {}, .", out(reg) pc, options(nomem, nostack, preserves_flags));
        }
        pc as usize
    }

    #[inline(always)]
    fn link_register() -> usize {
        let lr: u64;
        unsafe {
            asm!("mov {}, x30", out(reg) lr, options(nomem, nostack, preserves_flags));
        }
        lr as usize
    }

    #[inline(always)]
    fn full_barrier() {
        unsafe {
            asm!("dmb sy", options(nostack, preserves_flags));
        }
    }

    fn cache_maintain(addr: usize, len: usize) {
        if len == 0 {
            return;
        }
        let start = addr & !(CACHE_LINE - 1);
        let end = addr + len;
        unsafe {
            // Clean D-cache to the point of unification so the new bytes
            // reach the level the I-cache refills from.
            let mut line = start;
            while line < end {
                asm!("dc cvau, {}", in(reg) line, options(nostack, preserves_flags));
                line += CACHE_LINE;
            }
            // The clean must be globally complete before any invalidate.
            asm!("dsb ish", options(nostack, preserves_flags));

            let mut line = start;
            while line < end {
                asm!("ic ivau, {}", in(reg) line, options(nostack, preserves_flags));
                line += CACHE_LINE;
            }
            asm!("dsb ish", options(nostack, preserves_flags));
            // Refetch the instruction stream.
            asm!("isb", options(nostack, preserves_flags));
        }
    }

    #[inline(always)]
    fn breakpoint() {
        unsafe {
            asm!("brk #0", options(nomem, nostack, preserves_flags));
        }
    }
}
