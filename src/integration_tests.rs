// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! End-to-end scenarios exercising the facade, state manager, locator, and
//! probes together.
//!
//! The monitor is a process-wide singleton, so every test here serializes
//! on one lock and starts from a torn-down session with probe overrides
//! cleared. Module-local unit tests elsewhere never touch the singleton.

use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;

use crate::ffi;
use crate::probes::test_overrides;
use crate::verdict::{CheckMask, GuardError, SecurityState};

static SESSION_LOCK: Mutex<()> = Mutex::new(());

/// Take exclusive ownership of the singleton and reset it to the
/// uninitialized state.
fn exclusive_session() -> MutexGuard<'static, ()> {
    let lock = SESSION_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    test_overrides::clear();
    let _ = crate::shutdown();
    lock
}

// ── S1: clean run ───────────────────────────────────────────────────────────

#[test]
fn test_clean_run_stays_safe() {
    let _session = exclusive_session();

    crate::init().expect("init");
    assert_eq!(crate::security_state(), SecurityState::Safe);
    crate::snapshot().expect("snapshot");

    for round in 0..10 {
        crate::check_integrity(CheckMask::ALL)
            .unwrap_or_else(|e| panic!("check round {} failed: {}", round, e));
    }
    assert_eq!(crate::security_state(), SecurityState::Safe);

    crate::shutdown().expect("shutdown");
}

// ── S2: uninitialized access ────────────────────────────────────────────────

#[test]
fn test_uninitialized_access_is_rejected_and_fail_secure() {
    let _session = exclusive_session();

    assert_eq!(crate::snapshot(), Err(GuardError::NotInitialized));
    assert_eq!(
        crate::check_integrity(CheckMask::ALL),
        Err(GuardError::NotInitialized)
    );
    assert_eq!(crate::detect_debugger(), -1);
    assert_eq!(crate::security_state(), SecurityState::Compromised);
}

// ── S3: memory tamper ───────────────────────────────────────────────────────

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "android"))]
#[test]
fn test_memory_tamper_compromises_and_snapshot_does_not_launder() {
    let _session = exclusive_session();

    crate::init().expect("init");
    crate::snapshot().expect("snapshot");
    assert_eq!(crate::security_state(), SecurityState::Safe);

    // Simulate a patched code region: the stored baseline no longer
    // matches what the memory probe recomputes.
    crate::guard::corrupt_baseline_for_tests();

    // The check itself succeeds; the finding lands in the verdict.
    crate::check_integrity(CheckMask::MEMORY).expect("check");
    assert_eq!(crate::security_state(), SecurityState::Compromised);

    // Re-snapshotting repairs the baseline but must not repair the verdict.
    crate::snapshot().expect("snapshot after tamper");
    assert_eq!(crate::security_state(), SecurityState::Compromised);

    crate::shutdown().expect("shutdown");
}

// ── S4: timing anomaly only ─────────────────────────────────────────────────

#[test]
fn test_timing_anomaly_warns_without_downgrade() {
    let _session = exclusive_session();

    crate::init().expect("init");
    crate::snapshot().expect("snapshot");

    test_overrides::SLOW_TIMING.store(true, Ordering::Relaxed);
    crate::check_integrity(CheckMask::TIMING).expect("timing check");
    assert_eq!(crate::security_state(), SecurityState::Warning);
    test_overrides::SLOW_TIMING.store(false, Ordering::Relaxed);

    // A clean follow-up check leaves the warning in place.
    crate::check_integrity(CheckMask::MEMORY).expect("memory check");
    assert_eq!(crate::security_state(), SecurityState::Warning);

    crate::shutdown().expect("shutdown");
}

// ── S5: promotion to compromised ────────────────────────────────────────────

#[test]
fn test_warning_promotes_to_compromised_never_back() {
    let _session = exclusive_session();

    crate::init().expect("init");
    crate::snapshot().expect("snapshot");

    test_overrides::SLOW_TIMING.store(true, Ordering::Relaxed);
    crate::check_integrity(CheckMask::TIMING).expect("timing check");
    assert_eq!(crate::security_state(), SecurityState::Warning);
    test_overrides::SLOW_TIMING.store(false, Ordering::Relaxed);

    test_overrides::FORCE_TRACER.store(1, Ordering::Relaxed);
    crate::check_integrity(CheckMask::DEBUGGER).expect("debugger check");
    assert_eq!(crate::security_state(), SecurityState::Compromised);
    test_overrides::FORCE_TRACER.store(test_overrides::NO_OVERRIDE, Ordering::Relaxed);

    // Clean checks never move the verdict back down.
    crate::check_integrity(CheckMask::MEMORY).expect("memory check");
    assert_eq!(crate::security_state(), SecurityState::Compromised);

    crate::shutdown().expect("shutdown");
}

// ── S6: zero mask ───────────────────────────────────────────────────────────

#[test]
fn test_zero_mask_is_a_caller_error_and_leaves_verdict_alone() {
    let _session = exclusive_session();

    crate::init().expect("init");
    assert_eq!(
        crate::check_integrity(CheckMask(0)),
        Err(GuardError::EmptyMask)
    );
    assert_eq!(crate::security_state(), SecurityState::Safe);

    assert_eq!(ffi::sg_check_integrity(0), ffi::SG_ERR_INTERNAL);
    assert_eq!(crate::security_state(), SecurityState::Safe);

    crate::shutdown().expect("shutdown");
}

// ── S7: re-initialization round trip ────────────────────────────────────────

#[test]
fn test_reinit_yields_a_fresh_safe_session() {
    let _session = exclusive_session();

    crate::init().expect("first init");
    crate::shutdown().expect("first shutdown");
    assert_eq!(crate::security_state(), SecurityState::Compromised);

    crate::init().expect("second init");
    assert_eq!(crate::security_state(), SecurityState::Safe);
    crate::shutdown().expect("second shutdown");
}

// ── Lifecycle properties ────────────────────────────────────────────────────

#[test]
fn test_double_init_and_double_shutdown_are_rejected() {
    let _session = exclusive_session();

    crate::init().expect("init");
    assert_eq!(crate::init(), Err(GuardError::AlreadyInitialized));
    crate::shutdown().expect("shutdown");
    assert_eq!(crate::shutdown(), Err(GuardError::NotInitialized));
}

#[test]
fn test_concurrent_inits_admit_exactly_one_winner() {
    let _session = exclusive_session();

    let results: Vec<i32> = thread::scope(|s| {
        let handles: Vec<_> = (0..8).map(|_| s.spawn(|| ffi::sg_init())).collect();
        handles.into_iter().map(|h| h.join().expect("join")).collect()
    });

    assert_eq!(
        results.iter().filter(|&&r| r == ffi::SG_OK).count(),
        1,
        "exactly one init wins: {:?}",
        results
    );
    assert!(results
        .iter()
        .all(|&r| r == ffi::SG_OK || r == ffi::SG_ERR_ALREADY_INIT));

    assert_eq!(ffi::sg_shutdown(), ffi::SG_OK);
}

#[test]
fn test_verdict_sequence_is_monotone_within_a_session() {
    let _session = exclusive_session();

    crate::init().expect("init");
    crate::snapshot().expect("snapshot");

    let mut observed = vec![crate::security_state()];

    crate::check_integrity(CheckMask::MEMORY).expect("check");
    observed.push(crate::security_state());

    test_overrides::SLOW_TIMING.store(true, Ordering::Relaxed);
    crate::check_integrity(CheckMask::TIMING).expect("check");
    observed.push(crate::security_state());
    test_overrides::SLOW_TIMING.store(false, Ordering::Relaxed);

    test_overrides::FORCE_TRACER.store(1, Ordering::Relaxed);
    crate::check_integrity(CheckMask::DEBUGGER).expect("check");
    observed.push(crate::security_state());
    test_overrides::FORCE_TRACER.store(test_overrides::NO_OVERRIDE, Ordering::Relaxed);

    crate::check_integrity(CheckMask::ALL).expect("check");
    observed.push(crate::security_state());

    assert!(
        observed.windows(2).all(|w| w[0] <= w[1]),
        "verdict regressed: {:?}",
        observed
    );
    assert_eq!(*observed.last().expect("nonempty"), SecurityState::Compromised);

    crate::shutdown().expect("shutdown");
}

// ── Reserved bits and masks ─────────────────────────────────────────────────

#[test]
fn test_reserved_stack_bit_is_accepted_and_inert() {
    let _session = exclusive_session();

    crate::init().expect("init");
    crate::snapshot().expect("snapshot");
    crate::check_integrity(CheckMask::STACK).expect("stack-only check");
    assert_eq!(crate::security_state(), SecurityState::Safe);
    crate::shutdown().expect("shutdown");
}

// ── C ABI round trip ────────────────────────────────────────────────────────

#[test]
fn test_ffi_round_trip() {
    let _session = exclusive_session();

    assert_eq!(ffi::sg_get_security_state(), ffi::SG_COMPROMISED);
    assert_eq!(ffi::sg_init(), ffi::SG_OK);
    assert_eq!(ffi::sg_init(), ffi::SG_ERR_ALREADY_INIT);
    assert_eq!(ffi::sg_get_security_state(), ffi::SG_SAFE);
    assert_eq!(ffi::sg_snapshot(), ffi::SG_OK);
    assert_eq!(ffi::sg_check_integrity(ffi::SG_CHECK_MEMORY), ffi::SG_OK);

    let dbg = ffi::sg_detect_debugger();
    assert!(dbg == 0 || dbg == 1 || dbg == -1);

    assert_eq!(ffi::sg_shutdown(), ffi::SG_OK);
    assert_eq!(ffi::sg_get_security_state(), ffi::SG_COMPROMISED);
    assert_eq!(ffi::sg_snapshot(), ffi::SG_ERR_NOT_INIT);
    assert_eq!(ffi::sg_shutdown(), ffi::SG_ERR_NOT_INIT);
}
