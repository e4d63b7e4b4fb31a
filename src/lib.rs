#![cfg(any(target_os = "linux", target_os = "android"))]
#![deny(unsafe_op_in_unsafe_fn)]

//! mempatch: cross-architecture patching of executable code and live data
//! in a running process.
//!
//! The crate covers the mechanics of safe code patching, not the policy of
//! what to hook: page-protection scoping with guaranteed restoration,
//! atomic pointer installation and rollback, the per-architecture
//! barrier/cache-maintenance sequences that make patched code visible to
//! instruction fetch, pattern search over raw memory, cross-process memory
//! transfer, and executable-memory provisioning.
//!
//! Supported: aarch64, arm, x86_64, x86 and riscv on Linux/Android. All
//! operations are synchronous, perform no implicit retries, and surface
//! kernel failures with the verbatim errno.

pub mod arch;
pub mod error;
pub mod exec;
pub mod hook;
pub mod mem;
pub mod pattern;
pub mod protect;
pub mod remote;
pub mod sys;

// Re-exports for convenience (flattened imports)
pub use arch::{capture_context, ExecutionContext};
pub use error::{PatchError, Result};
pub use exec::{allocate_executable, copy_into, free, ExecRegion};
pub use hook::{hook_pointer, HookGuard, SlotPatch};
pub use pattern::{find_pattern, find_pattern_all};
pub use protect::ProtectionGuard;
pub use remote::{read_remote, write_remote};
