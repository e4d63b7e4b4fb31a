use super::ArchOps;
use core::arch::asm;

pub struct X86;

impl ArchOps for X86 {
    #[inline(always)]
    fn stack_pointer() -> usize {
        let sp: u32;
        unsafe {
            asm!("mov {}, esp", out(reg) sp, options(nomem, nostack, preserves_flags));
        }
        sp as usize
    }

    #[inline(always)]
    fn program_counter() -> usize {
        // No PC-relative addressing on i686; a call/pop pair recovers the
        // address of the pop. Approximate by design.
        let pc: u32;
        unsafe {
            asm!(
                "call 2f",
                "2: pop {}",
                out(reg) pc,
                options(nomem, preserves_flags),
            );
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
