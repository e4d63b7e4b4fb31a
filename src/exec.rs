//! Executable memory provisioning for injected code.

use crate::arch;
use crate::error::{PatchError, Result};
use crate::mem;
use crate::sys;

/// An anonymous, process-private read+write+execute mapping.
///
/// Owned by the caller until passed to [`free`]; there is deliberately no
/// `Drop`, because unmapping memory that injected code may still be
/// executing is a policy decision this layer cannot make. Use-after-free is
/// on the caller.
#[derive(Debug)]
pub struct ExecRegion {
    addr: *mut u8,
    size: usize,
}

// SAFETY: the region is a plain address/size pair; all mutation goes
// through unsafe entry points whose callers uphold exclusivity.
unsafe impl Send for ExecRegion {}
unsafe impl Sync for ExecRegion {}

impl ExecRegion {
    pub fn addr(&self) -> usize {
        self.addr as usize
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.addr
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// Map `size` bytes of anonymous RWX memory.
pub fn allocate_executable(size: usize) -> Result<ExecRegion> {
    if size == 0 {
        return Err(PatchError::AddressInvalid { address: 0 });
    }
    // SAFETY: fresh anonymous private mapping, no address hint.
    let addr = unsafe {
        sys::mmap(
            core::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    }?;
    Ok(ExecRegion { addr, size })
}

/// Place `code` at the start of `region` and make the instruction stream
/// coherent, so the region is immediately runnable with no further cache
/// maintenance from the caller.
///
/// # Safety
/// `region` must still be mapped and nothing may be executing inside the
/// overwritten range.
pub unsafe fn copy_into(region: &ExecRegion, code: &[u8]) -> Result<()> {
    if code.len() > region.size {
        return Err(PatchError::RegionOverflow {
            requested: code.len(),
            capacity: region.size,
        });
    }
    unsafe { mem::volatile_copy(region.addr, code.as_ptr(), code.len()) };
    arch::full_barrier();
    arch::cache_maintain(region.addr as usize, code.len());
    Ok(())
}

/// Unmap the region, consuming it.
pub fn free(region: ExecRegion) -> Result<()> {
    // SAFETY: region came from allocate_executable and is consumed here.
    unsafe { sys::munmap(region.addr, region.size) }
}
