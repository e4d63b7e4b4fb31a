//! Cross-process memory transfer over the kernel's vectorized primitive.
//!
//! No shared memory and no ptrace attach: process_vm_readv/writev move the
//! bytes in one kernel transition. Some kernels restrict these by security
//! policy (Yama ptrace scope); denial surfaces as the verbatim errno.

use crate::error::{PatchError, Result};
use crate::sys;

/// Read `len` bytes from `remote_addr` in process `pid`.
///
/// A partial read is a [`PatchError::ShortTransfer`], never silently padded;
/// the caller decides whether to retry the remainder.
pub fn read_remote(pid: i32, remote_addr: usize, len: usize) -> Result<Vec<u8>> {
    if len == 0 {
        return Ok(Vec::new());
    }
    let mut buf = vec![0u8; len];
    // SAFETY: buf is a freshly allocated writable region of len bytes.
    let moved = unsafe { sys::process_vm_readv(pid, buf.as_mut_ptr(), remote_addr, len) }?;
    if moved != len {
        return Err(PatchError::ShortTransfer {
            address: remote_addr,
            requested: len,
            moved,
        });
    }
    Ok(buf)
}

/// Write `bytes` to `remote_addr` in process `pid`.
///
/// A partial write is a [`PatchError::ShortTransfer`]; whatever prefix the
/// kernel moved stays written.
pub fn write_remote(pid: i32, remote_addr: usize, bytes: &[u8]) -> Result<()> {
    if bytes.is_empty() {
        return Ok(());
    }
    // SAFETY: bytes is a valid readable region.
    let moved =
        unsafe { sys::process_vm_writev(pid, bytes.as_ptr(), remote_addr, bytes.len()) }?;
    if moved != bytes.len() {
        return Err(PatchError::ShortTransfer {
            address: remote_addr,
            requested: bytes.len(),
            moved,
        });
    }
    Ok(())
}
