//! Pointer-slot patching: backup, atomic install, rollback.
//!
//! A hook target is a word-sized slot (typically a GOT/PLT entry or a
//! vtable cell). Installation relaxes page protection only for the duration
//! of the single store, brackets the store with full barriers, and runs the
//! cache-maintenance sequence so no core keeps executing through a stale
//! view of the slot.

use crate::arch;
use crate::error::{PatchError, Result};
use crate::mem;
use crate::protect::ProtectionGuard;

const WORD: usize = core::mem::size_of::<usize>();
const SLOT_PROT: i32 = libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatchState {
    BackedUp,
    Installed,
    Restored,
}

/// One hook target: the slot address, the word it held before installation,
/// and where in the backup/install/restore cycle it stands.
///
/// Not shareable across threads without external synchronization; the slot
/// itself is process-wide state this type mutates destructively.
#[derive(Debug)]
pub struct SlotPatch {
    target: usize,
    original: usize,
    state: PatchState,
}

impl SlotPatch {
    /// Read and remember the word currently at `target` without modifying
    /// it. Rejects null and misaligned targets up front; the single-store
    /// atomicity guarantee only holds for naturally aligned slots.
    ///
    /// # Safety
    /// `target` must be a mapped, readable, word-sized slot.
    pub unsafe fn backup(target: usize) -> Result<Self> {
        if target == 0 || target % WORD != 0 {
            return Err(PatchError::AddressInvalid { address: target });
        }
        let original = unsafe { mem::read_word(target) };
        Ok(Self {
            target,
            original,
            state: PatchState::BackedUp,
        })
    }

    pub fn target(&self) -> usize {
        self.target
    }

    /// The word the slot held when it was backed up.
    pub fn original(&self) -> usize {
        self.original
    }

    pub fn is_installed(&self) -> bool {
        self.state == PatchState::Installed
    }

    /// Install `value` with a plain word store. Callers that may race with
    /// another writer on the same slot should use
    /// [`install_checked`](Self::install_checked) instead.
    ///
    /// # Safety
    /// `target` must still be the mapped slot captured at backup; `value`
    /// must be a sensible word for whatever consumes the slot.
    pub unsafe fn install(&mut self, value: usize) -> Result<()> {
        let mut guard = ProtectionGuard::acquire(self.target, WORD, SLOT_PROT)?;
        arch::full_barrier();
        unsafe { mem::write_word(self.target, value) };
        arch::full_barrier();
        arch::cache_maintain(self.target, WORD);
        guard.release();
        self.state = PatchState::Installed;
        Ok(())
    }

    /// CAS-based install: succeeds only if the slot still holds the
    /// backed-up word. A mismatch reports [`PatchError::InstallConflict`]
    /// and leaves the slot untouched, so the caller can decide whether to
    /// re-backup and retry or abandon.
    ///
    /// # Safety
    /// Same contract as [`install`](Self::install).
    pub unsafe fn install_checked(&mut self, value: usize) -> Result<()> {
        let mut guard = ProtectionGuard::acquire(self.target, WORD, SLOT_PROT)?;
        arch::full_barrier();
        match unsafe { arch::compare_exchange_word(self.target, self.original, value) } {
            Ok(_) => {}
            Err(found) => {
                return Err(PatchError::InstallConflict {
                    address: self.target,
                    expected: self.original,
                    found,
                });
            }
        }
        arch::full_barrier();
        arch::cache_maintain(self.target, WORD);
        guard.release();
        self.state = PatchState::Installed;
        Ok(())
    }

    /// Write the backed-up word back. A no-op unless currently installed;
    /// after restoration the patch is reusable as if freshly backed up.
    ///
    /// # Safety
    /// Same contract as [`install`](Self::install).
    pub unsafe fn restore(&mut self) -> Result<()> {
        if self.state != PatchState::Installed {
            return Ok(());
        }
        let mut guard = ProtectionGuard::acquire(self.target, WORD, SLOT_PROT)?;
        arch::full_barrier();
        unsafe { mem::write_word(self.target, self.original) };
        arch::full_barrier();
        arch::cache_maintain(self.target, WORD);
        guard.release();
        self.state = PatchState::Restored;
        Ok(())
    }
}

/// RAII wrapper over [`SlotPatch`]: installs on construction, restores the
/// original word when dropped unless [`leak`](Self::leak)ed.
#[derive(Debug)]
pub struct HookGuard {
    patch: SlotPatch,
    auto_restore: bool,
}

impl HookGuard {
    /// Backup and install in one step.
    ///
    /// # Safety
    /// See [`SlotPatch::backup`] and [`SlotPatch::install`].
    pub unsafe fn install(target: usize, replacement: usize) -> Result<Self> {
        let mut patch = unsafe { SlotPatch::backup(target) }?;
        unsafe { patch.install(replacement) }?;
        Ok(Self {
            patch,
            auto_restore: true,
        })
    }

    /// Backup and CAS-install in one step; a racing writer surfaces as
    /// [`PatchError::InstallConflict`].
    ///
    /// # Safety
    /// See [`SlotPatch::backup`] and [`SlotPatch::install_checked`].
    pub unsafe fn install_checked(target: usize, replacement: usize) -> Result<Self> {
        let mut patch = unsafe { SlotPatch::backup(target) }?;
        unsafe { patch.install_checked(replacement) }?;
        Ok(Self {
            patch,
            auto_restore: true,
        })
    }

    pub fn target(&self) -> usize {
        self.patch.target()
    }

    /// The displaced original word (e.g. the real function the hooked slot
    /// used to point at).
    pub fn original(&self) -> usize {
        self.patch.original()
    }

    /// Keep the hook installed permanently; the guard is consumed without
    /// restoring.
    pub fn leak(mut self) {
        self.auto_restore = false;
    }

    /// Restore the original word now, consuming the guard.
    ///
    /// # Safety
    /// See [`SlotPatch::restore`].
    pub unsafe fn restore(mut self) -> Result<()> {
        self.auto_restore = false;
        unsafe { self.patch.restore() }
    }
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        if self.auto_restore && self.patch.is_installed() {
            // SAFETY: the slot was valid at install time; restore failure is
            // reported, not escalated, during drop.
            if let Err(e) = unsafe { self.patch.restore() } {
                log::warn!("failed to restore hook at {:#x}: {e}", self.patch.target());
            }
        }
    }
}

/// One-shot pointer hook: back up the word at `target`, install
/// `replacement`, and hand the displaced original back to the caller. The
/// hook stays installed.
///
/// # Safety
/// See [`SlotPatch::backup`] and [`SlotPatch::install`].
pub unsafe fn hook_pointer(target: usize, replacement: usize) -> Result<usize> {
    let mut patch = unsafe { SlotPatch::backup(target) }?;
    unsafe { patch.install(replacement) }?;
    Ok(patch.original())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys;

    /// One word-sized slot on its own fresh page, so protection changes in
    /// the tests never touch unrelated mappings.
    struct Slot {
        base: *mut u8,
        len: usize,
    }

    impl Slot {
        fn new(value: usize) -> Self {
            let len = mem::page_size();
            let base = unsafe {
                sys::mmap(
                    core::ptr::null_mut(),
                    len,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                )
            }
            .expect("mmap");
            unsafe { (base as *mut usize).write(value) };
            Self { base, len }
        }

        fn addr(&self) -> usize {
            self.base as usize
        }

        fn value(&self) -> usize {
            unsafe { (self.base as *const usize).read_volatile() }
        }
    }

    impl Drop for Slot {
        fn drop(&mut self) {
            unsafe { sys::munmap(self.base, self.len).unwrap() };
        }
    }

    #[test]
    fn backup_install_restore_round_trip() {
        let slot = Slot::new(0xAAAA_BBBB);
        unsafe {
            let mut patch = SlotPatch::backup(slot.addr()).expect("backup");
            assert_eq!(patch.original(), 0xAAAA_BBBB);

            patch.install(0xCCCC_DDDD).expect("install");
            assert!(patch.is_installed());
            assert_eq!(slot.value(), 0xCCCC_DDDD);

            patch.restore().expect("restore");
            assert!(!patch.is_installed());
            assert_eq!(slot.value(), 0xAAAA_BBBB);
        }
    }

    #[test]
    fn restore_before_install_is_a_no_op() {
        let slot = Slot::new(7);
        unsafe {
            let mut patch = SlotPatch::backup(slot.addr()).expect("backup");
            patch.restore().expect("restore");
        }
        assert_eq!(slot.value(), 7);
    }

    #[test]
    fn checked_install_detects_racing_modification() {
        let slot = Slot::new(0x1111);
        unsafe {
            let mut patch = SlotPatch::backup(slot.addr()).expect("backup");
            // Simulate another writer getting there first.
            (slot.base as *mut usize).write_volatile(0x2222);

            match patch.install_checked(0x3333) {
                Err(PatchError::InstallConflict {
                    expected, found, ..
                }) => {
                    assert_eq!(expected, 0x1111);
                    assert_eq!(found, 0x2222);
                }
                other => panic!("expected InstallConflict, got {other:?}"),
            }
            // Conflict must leave the slot untouched.
            assert_eq!(slot.value(), 0x2222);
            assert!(!patch.is_installed());
        }
    }

    #[test]
    fn checked_install_succeeds_without_interference() {
        let slot = Slot::new(0x1111);
        unsafe {
            let mut patch = SlotPatch::backup(slot.addr()).expect("backup");
            patch.install_checked(0x9999).expect("install_checked");
        }
        assert_eq!(slot.value(), 0x9999);
    }

    #[test]
    fn misaligned_and_null_targets_are_rejected() {
        let slot = Slot::new(0);
        unsafe {
            assert!(matches!(
                SlotPatch::backup(slot.addr() + 1),
                Err(PatchError::AddressInvalid { .. })
            ));
            assert!(matches!(
                SlotPatch::backup(0),
                Err(PatchError::AddressInvalid { .. })
            ));
        }
    }

    #[test]
    fn hook_pointer_returns_displaced_word() {
        let slot = Slot::new(0xFEED);
        let original = unsafe { hook_pointer(slot.addr(), 0xBEEF) }.expect("hook");
        assert_eq!(original, 0xFEED);
        assert_eq!(slot.value(), 0xBEEF);
    }

    #[test]
    fn guard_restores_on_drop_and_leak_keeps_the_hook() {
        let slot = Slot::new(0xAA);
        unsafe {
            {
                let guard = HookGuard::install(slot.addr(), 0xBB).expect("install");
                assert_eq!(guard.original(), 0xAA);
                assert_eq!(slot.value(), 0xBB);
            }
            assert_eq!(slot.value(), 0xAA);

            HookGuard::install(slot.addr(), 0xCC)
                .expect("install")
                .leak();
            assert_eq!(slot.value(), 0xCC);
        }
    }

    #[test]
    fn page_protection_survives_the_full_cycle() {
        let slot = Slot::new(1);
        let before = protection_of(slot.addr());
        unsafe {
            let mut patch = SlotPatch::backup(slot.addr()).expect("backup");
            patch.install(2).expect("install");
            assert_eq!(protection_of(slot.addr()), before, "after install");
            patch.restore().expect("restore");
        }
        assert_eq!(protection_of(slot.addr()), before, "after restore");
    }

    fn protection_of(addr: usize) -> String {
        let maps = std::fs::read_to_string("/proc/self/maps").unwrap();
        for line in maps.lines() {
            let mut fields = line.split_whitespace();
            let range = fields.next().unwrap();
            let perms = fields.next().unwrap();
            let (s, e) = range.split_once('-').unwrap();
            let s = usize::from_str_radix(s, 16).unwrap();
            let e = usize::from_str_radix(e, 16).unwrap();
            if addr >= s && addr < e {
                return perms.to_string();
            }
        }
        panic!("address {addr:#x} not found in maps");
    }
}
