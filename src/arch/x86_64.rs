use super::ArchOps;
use core::arch::asm;

pub struct X86_64;

impl ArchOps for X86_64 {
    #[inline(always)]
    fn stack_pointer() -> usize {
        let sp: u64;
        unsafe {
            asm!("mov {}, rsp", out(reg) sp, options(nomem, nostack, preserves_flags));
        }
        sp as usize
    }

    #[inline(always)]
    fn program_counter() -> usize {
        let pc: u64;
        unsafe {
            asm!("lea {}, [rip]", out(reg) pc, options(nomem, nostack, preserves_flags));
        }
        pc as usize
    }

    #[inline(always)]
    fn link_register() -> usize {
        // Return address lives on the stack; there is no link register.
        0
    }

    #[inline(always)]
    fn full_barrier() {
        unsafe {
            asm!("mfence", options(nostack, preserves_flags));
        }
    }

    #[inline]
    fn cache_maintain(_addr: usize, _len: usize) {
        // Coherent I-cache; only the optimizer needs restraining.
        super::compiler_barrier();
    }

    #[inline(always)]
    fn breakpoint() {
        unsafe {
            asm!("int3", options(nomem, nostack, preserves_flags));
        }
    }
}
