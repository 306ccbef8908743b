// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! C-callable ABI.
//!
//! Thin wrappers translating the Rust facade into the stable integer
//! vocabulary so any host language can link the monitor. Contracts are
//! documented on the corresponding crate-root functions.

use std::os::raw::c_char;

use crate::verdict::{CheckMask, GuardError};

// ── Result codes ────────────────────────────────────────────────────────────

pub const SG_OK: i32 = 0;
pub const SG_ERR_INIT: i32 = -1;
pub const SG_ERR_NOT_INIT: i32 = -2;
pub const SG_ERR_ALREADY_INIT: i32 = -3;
pub const SG_ERR_INTERNAL: i32 = -4;

// ── Check mask bits ─────────────────────────────────────────────────────────

pub const SG_CHECK_DEBUGGER: u32 = 1;
pub const SG_CHECK_TIMING: u32 = 1 << 1;
pub const SG_CHECK_MEMORY: u32 = 1 << 2;
/// Reserved.
pub const SG_CHECK_STACK: u32 = 1 << 3;
pub const SG_CHECK_ALL: u32 = 0xFFFF_FFFF;

// ── Security states ─────────────────────────────────────────────────────────

pub const SG_SAFE: i32 = 0;
pub const SG_WARNING: i32 = 1;
pub const SG_COMPROMISED: i32 = 2;

fn result_code(res: Result<(), GuardError>) -> i32 {
    match res {
        Ok(()) => SG_OK,
        Err(e) => e.code(),
    }
}

// ── Entry points ────────────────────────────────────────────────────────────

/// Initialize the monitor. See [`crate::init`].
#[no_mangle]
pub extern "C" fn sg_init() -> i32 {
    result_code(crate::init())
}

/// Re-baseline the code digest. See [`crate::snapshot`].
#[no_mangle]
pub extern "C" fn sg_snapshot() -> i32 {
    result_code(crate::snapshot())
}

/// Run the selected probes. See [`crate::check_integrity`].
#[no_mangle]
pub extern "C" fn sg_check_integrity(mask: u32) -> i32 {
    result_code(crate::check_integrity(CheckMask(mask)))
}

/// Fast tracer-only probe. Returns 1 if traced, 0 if not, -1 if the monitor
/// is uninitialized or no mechanism exists.
#[no_mangle]
pub extern "C" fn sg_detect_debugger() -> i32 {
    crate::detect_debugger()
}

/// Lock-free verdict read; compromised when uninitialized.
#[no_mangle]
pub extern "C" fn sg_get_security_state() -> i32 {
    crate::security_state() as i32
}

/// Shut down and wipe the session. See [`crate::shutdown`].
#[no_mangle]
pub extern "C" fn sg_shutdown() -> i32 {
    result_code(crate::shutdown())
}

/// Static NUL-terminated label naming the compiled detection backend.
#[no_mangle]
pub extern "C" fn sg_get_implementation() -> *const c_char {
    #[cfg(target_arch = "x86_64")]
    const LABEL: &[u8] = b"x86_64-native\0";
    #[cfg(target_arch = "aarch64")]
    const LABEL: &[u8] = b"arm64-native\0";
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    const LABEL: &[u8] = b"c-fallback\0";

    LABEL.as_ptr().cast()
}

// ── Tests ───────────────────────────────────────────────────────────────────
//
// Lifecycle round-trips through the ABI live in `integration_tests` behind
// the singleton serialization lock; here only the pure pieces.

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn test_mask_constants_match_rust_vocabulary() {
        assert_eq!(SG_CHECK_DEBUGGER, CheckMask::DEBUGGER.bits());
        assert_eq!(SG_CHECK_TIMING, CheckMask::TIMING.bits());
        assert_eq!(SG_CHECK_MEMORY, CheckMask::MEMORY.bits());
        assert_eq!(SG_CHECK_STACK, CheckMask::STACK.bits());
        assert_eq!(SG_CHECK_ALL, CheckMask::ALL.bits());
    }

    #[test]
    fn test_result_code_mapping() {
        assert_eq!(result_code(Ok(())), SG_OK);
        assert_eq!(result_code(Err(GuardError::Init("x".into()))), SG_ERR_INIT);
        assert_eq!(result_code(Err(GuardError::NotInitialized)), SG_ERR_NOT_INIT);
        assert_eq!(
            result_code(Err(GuardError::AlreadyInitialized)),
            SG_ERR_ALREADY_INIT
        );
        assert_eq!(result_code(Err(GuardError::EmptyMask)), SG_ERR_INTERNAL);
    }

    #[test]
    fn test_implementation_label_is_nul_terminated_and_matches() {
        let ptr = sg_get_implementation();
        assert!(!ptr.is_null());
        let label = unsafe { CStr::from_ptr(ptr) };
        assert_eq!(label.to_str().expect("utf8"), crate::implementation());
    }
}
