//! Thin kernel gateway.
//!
//! Every function here is a single transition into the kernel with no retry
//! and no interpretation beyond errno capture. Failures carry the raw errno
//! verbatim; policy (retry, fallback, abort) belongs to the caller.

use crate::error::{PatchError, Result};
use core::ffi::c_void;
use std::ffi::CStr;

fn last_errno() -> i32 {
    // SAFETY: __errno_location always returns a valid thread-local pointer.
    unsafe { *libc::__errno_location() }
}

fn kernel(op: &'static str) -> PatchError {
    PatchError::Kernel {
        op,
        errno: last_errno(),
    }
}

pub fn open(path: &CStr, flags: i32, mode: u32) -> Result<i32> {
    // SAFETY: path is a valid NUL-terminated string for the duration of the call.
    let fd = unsafe { libc::open(path.as_ptr(), flags, mode as libc::c_uint) };
    if fd < 0 {
        return Err(kernel("open"));
    }
    Ok(fd)
}

pub fn read(fd: i32, buf: &mut [u8]) -> Result<usize> {
    // SAFETY: buf is a valid writable region of buf.len() bytes.
    let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut c_void, buf.len()) };
    if n < 0 {
        return Err(kernel("read"));
    }
    Ok(n as usize)
}

pub fn write(fd: i32, buf: &[u8]) -> Result<usize> {
    // SAFETY: buf is a valid readable region of buf.len() bytes.
    let n = unsafe { libc::write(fd, buf.as_ptr() as *const c_void, buf.len()) };
    if n < 0 {
        return Err(kernel("write"));
    }
    Ok(n as usize)
}

pub fn close(fd: i32) -> Result<()> {
    // SAFETY: plain fd close; an invalid fd is reported, not UB.
    if unsafe { libc::close(fd) } < 0 {
        return Err(kernel("close"));
    }
    Ok(())
}

/// Map `len` bytes. Returns the mapped base.
///
/// # Safety
/// The flag/prot/fd combination must be one the kernel can honor without
/// clobbering mappings the caller still relies on (MAP_FIXED in particular).
pub unsafe fn mmap(
    addr: *mut c_void,
    len: usize,
    prot: i32,
    flags: i32,
    fd: i32,
    offset: i64,
) -> Result<*mut u8> {
    let p = unsafe { libc::mmap(addr, len, prot, flags, fd, offset as libc::off_t) };
    if p == libc::MAP_FAILED {
        return Err(kernel("mmap"));
    }
    Ok(p as *mut u8)
}

/// # Safety
/// `[addr, addr + len)` must be a mapping owned by the caller; nothing may
/// reference it afterwards.
pub unsafe fn munmap(addr: *mut u8, len: usize) -> Result<()> {
    if unsafe { libc::munmap(addr as *mut c_void, len) } != 0 {
        return Err(kernel("munmap"));
    }
    Ok(())
}

/// Change protection over a page-aligned range.
///
/// # Safety
/// `addr` must be page-aligned and the range mapped; the new protection must
/// not revoke permissions other threads are concurrently relying on.
pub unsafe fn mprotect(addr: usize, len: usize, prot: i32) -> Result<()> {
    if unsafe { libc::mprotect(addr as *mut c_void, len, prot) } != 0 {
        return Err(kernel("mprotect"));
    }
    Ok(())
}

pub fn getpid() -> i32 {
    // SAFETY: getpid cannot fail.
    unsafe { libc::getpid() }
}

pub fn gettid() -> i32 {
    // No portable libc wrapper across glibc/bionic versions; raw syscall.
    // SAFETY: gettid cannot fail.
    unsafe { libc::syscall(libc::SYS_gettid) as i32 }
}

/// Read `len` bytes from `remote_addr` in process `pid` into `local`.
/// Returns the number of bytes actually moved, which may be short.
///
/// # Safety
/// `local` must be valid for `len` writable bytes.
pub unsafe fn process_vm_readv(
    pid: i32,
    local: *mut u8,
    remote_addr: usize,
    len: usize,
) -> Result<usize> {
    let local_iov = libc::iovec {
        iov_base: local as *mut c_void,
        iov_len: len,
    };
    let remote_iov = libc::iovec {
        iov_base: remote_addr as *mut c_void,
        iov_len: len,
    };
    let n = unsafe { libc::process_vm_readv(pid, &local_iov, 1, &remote_iov, 1, 0) };
    if n < 0 {
        return Err(kernel("process_vm_readv"));
    }
    Ok(n as usize)
}

/// Write `len` bytes from `local` to `remote_addr` in process `pid`.
/// Returns the number of bytes actually moved, which may be short.
///
/// # Safety
/// `local` must be valid for `len` readable bytes.
pub unsafe fn process_vm_writev(
    pid: i32,
    local: *const u8,
    remote_addr: usize,
    len: usize,
) -> Result<usize> {
    let local_iov = libc::iovec {
        iov_base: local as *mut c_void,
        iov_len: len,
    };
    let remote_iov = libc::iovec {
        iov_base: remote_addr as *mut c_void,
        iov_len: len,
    };
    let n = unsafe { libc::process_vm_writev(pid, &local_iov, 1, &remote_iov, 1, 0) };
    if n < 0 {
        return Err(kernel("process_vm_writev"));
    }
    Ok(n as usize)
}

/// Raw ptrace request.
///
/// Issued through the bare syscall, so PTRACE_PEEK* requests deliver their
/// result through `data` (kernel convention) rather than the glibc-emulated
/// return value.
///
/// # Safety
/// `addr`/`data` must be whatever the specific request requires.
pub unsafe fn ptrace(
    request: i32,
    pid: i32,
    addr: *mut c_void,
    data: *mut c_void,
) -> Result<libc::c_long> {
    let r = unsafe { libc::syscall(libc::SYS_ptrace, request, pid, addr, data) };
    if r < 0 {
        return Err(kernel("ptrace"));
    }
    Ok(r)
}

/// Process-control request (naming, capability bits, dumpable flag, ...).
pub fn prctl(option: i32, arg2: libc::c_ulong, arg3: libc::c_ulong, arg4: libc::c_ulong, arg5: libc::c_ulong) -> Result<i32> {
    // SAFETY: prctl validates its own arguments per option.
    let r = unsafe { libc::prctl(option, arg2, arg3, arg4, arg5) };
    if r < 0 {
        return Err(kernel("prctl"));
    }
    Ok(r)
}

/// arm32 has no userspace cache-maintenance instructions; the kernel flushes
/// on our behalf.
///
/// # Safety
/// `[start, end)` must be a mapped range of this process.
#[cfg(target_arch = "arm")]
pub unsafe fn cacheflush(start: usize, end: usize) -> Result<()> {
    const ARM_NR_CACHEFLUSH: libc::c_long = 0x0f0002;
    let r = unsafe { libc::syscall(ARM_NR_CACHEFLUSH, start, end, 0) };
    if r < 0 {
        return Err(kernel("cacheflush"));
    }
    Ok(())
}
