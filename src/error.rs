use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PatchError {
    /// The kernel rejected an operation. `errno` is the raw error number,
    /// surfaced verbatim with no retry.
    #[error("kernel denied {op}: errno {errno}")]
    Kernel { op: &'static str, errno: i32 },

    /// Target address is null, misaligned for a word access, or unmapped.
    #[error("invalid target address {address:#x}")]
    AddressInvalid { address: usize },

    /// mprotect over the rounded page span failed; the protected operation
    /// was skipped entirely and no partial write occurred.
    #[error("protection change failed for {size} bytes at {address:#x}: errno {errno}")]
    ProtectionChangeFailed {
        address: usize,
        size: usize,
        errno: i32,
    },

    /// CAS-based install found the slot no longer holds the backed-up word.
    /// The target was left unchanged; retrying is the caller's decision.
    #[error("install conflict at {address:#x}: expected {expected:#x}, found {found:#x}")]
    InstallConflict {
        address: usize,
        expected: usize,
        found: usize,
    },

    /// A remote transfer moved fewer bytes than requested.
    #[error("short transfer at {address:#x}: moved {moved} of {requested} bytes")]
    ShortTransfer {
        address: usize,
        requested: usize,
        moved: usize,
    },

    /// A code blob does not fit the executable region it was destined for.
    #[error("copy of {requested} bytes exceeds region capacity {capacity}")]
    RegionOverflow { requested: usize, capacity: usize },
}

pub type Result<T> = std::result::Result<T, PatchError>;
