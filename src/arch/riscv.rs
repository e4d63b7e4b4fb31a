use super::ArchOps;
use core::arch::asm;

pub struct RiscV;

impl ArchOps for RiscV {
    #[inline(always)]
    fn stack_pointer() -> usize {
        let sp: usize;
        unsafe {
            asm!("mv {}, sp", out(reg) sp, options(nomem, nostack, preserves_flags));
        }
        sp
    }

    #[inline(always)]
    fn program_counter() -> usize {
        let pc: usize;
        unsafe {
            asm!("auipc {}, 0", out(reg) pc, options(nomem, nostack, preserves_flags));
        }
        pc
    }

    #[inline(always)]
    fn link_register() -> usize {
        let ra: usize;
        unsafe {
            asm!("mv {}, ra", out(reg) ra, options(nomem, nostack, preserves_flags));
        }
        ra
    }

    #[inline(always)]
    fn full_barrier() {
        unsafe {
            asm!("fence rw, rw", options(nostack, preserves_flags));
        }
    }

    #[inline]
    fn cache_maintain(_addr: usize, _len: usize) {
        // fence.i resynchronizes the local hart's instruction stream with
        // all prior data writes; no per-line sweep exists in user mode.
        unsafe {
            asm!("fence.i", options(nostack, preserves_flags));
        }
    }

    #[inline(always)]
    fn breakpoint() {
        unsafe {
            asm!("ebreak", options(nomem, nostack, preserves_flags));
        }
    }
}
