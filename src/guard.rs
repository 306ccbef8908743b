// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Security state manager: the singleton session, its baseline record, and
//! the integrity-check orchestration.
//!
//! Locking discipline: every mutating operation holds the state mutex for
//! its whole read-modify-publish sequence, so two concurrent checks cannot
//! interleave partial findings. The verdict lives in a separate atomic,
//! published with release ordering and read lock-free with acquire ordering;
//! a thread observing a non-safe verdict therefore also observes the
//! baseline state that produced it.
//!
//! Verdict monotonicity: `Compromised` is stored unconditionally (it is the
//! maximum), `Warning` only via a `Safe -> Warning` compare-exchange. The
//! verdict never moves toward `Safe` except through a full re-init.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::codemap;
use crate::probes;
use crate::verdict::{CheckMask, GuardError, SecurityState};

// ── Baseline record ─────────────────────────────────────────────────────────

/// Per-session baseline. Created zeroed, written only under the state
/// mutex, wiped with a non-elidable write at shutdown and on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
struct Baseline {
    /// Rotate-XOR digest of the code region at snapshot time. Zero until
    /// the first `snapshot`, which is the default-deny posture: a memory
    /// check before any snapshot always trips.
    code_checksum: u32,
    /// Cycle value recorded at init. Informational; not compared anywhere
    /// in this revision.
    baseline_tsc: u64,
    /// Single-bit session guard.
    initialized: u8,
    /// Keeps the record's in-memory footprint aligned with no readable
    /// slack beyond what the wipe covers.
    _pad: [u8; 7],
}

impl Baseline {
    fn zeroed() -> Self {
        Baseline {
            code_checksum: 0,
            baseline_tsc: 0,
            initialized: 0,
            _pad: [0; 7],
        }
    }

    /// Digest of the record itself, used when no code region is available.
    ///
    /// The checksum slot is taken as zero so the stored digest is a fixed
    /// point of re-digesting: the value only changes when the other fields
    /// are corrupted. This is a tamper check on the record, not on code.
    fn self_digest(&self) -> u32 {
        let mut bytes = [0u8; 20];
        // bytes[0..4]: checksum slot, deliberately zero
        bytes[4..12].copy_from_slice(&self.baseline_tsc.to_le_bytes());
        bytes[12] = self.initialized;
        probes::checksum_bytes(&bytes)
    }
}

// ── Singleton session ───────────────────────────────────────────────────────

/// The one live manager per process, behind the state mutex.
struct GuardCore {
    baseline: Baseline,
}

static MANAGER: Mutex<Option<GuardCore>> = Mutex::new(None);

/// Current verdict. Defaults to compromised so reads before `init` and
/// after `shutdown` are fail-secure.
static VERDICT: AtomicU8 = AtomicU8::new(SecurityState::Compromised as u8);

/// A poisoned mutex means a host thread panicked mid-operation; the monitor
/// keeps serving rather than wedging into an unobservable state.
fn lock() -> MutexGuard<'static, Option<GuardCore>> {
    MANAGER.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Lifecycle ───────────────────────────────────────────────────────────────

pub(crate) fn init() -> Result<(), GuardError> {
    let mut slot = lock();
    if slot.is_some() {
        return Err(GuardError::AlreadyInitialized);
    }

    let mut core = GuardCore {
        baseline: Baseline::zeroed(),
    };
    core.baseline.baseline_tsc = probes::cycle_counter();
    core.baseline.initialized = 1;
    *slot = Some(core);

    // No checksum is taken here; the caller establishes the memory baseline
    // with `snapshot`.
    VERDICT.store(SecurityState::Safe as u8, Ordering::Release);
    debug!(backend = probes::implementation(), "integrity monitor initialized");
    Ok(())
}

pub(crate) fn shutdown() -> Result<(), GuardError> {
    let mut slot = lock();
    if slot.is_none() {
        return Err(GuardError::NotInitialized);
    }

    // Publish first: a concurrent reader racing past shutdown must observe
    // the fail-secure value, never a stale `Safe`.
    VERDICT.store(SecurityState::Compromised as u8, Ordering::Release);
    if let Some(mut core) = slot.take() {
        core.baseline.zeroize();
    }
    debug!("integrity monitor shut down");
    Ok(())
}

// ── Snapshot ────────────────────────────────────────────────────────────────

/// Re-baseline the code digest. Never touches the verdict: a process
/// already judged compromised cannot launder itself by re-snapshotting.
pub(crate) fn snapshot() -> Result<(), GuardError> {
    let mut slot = lock();
    let core = slot.as_mut().ok_or(GuardError::NotInitialized)?;

    core.baseline.code_checksum = match codemap::locate() {
        Some(region) => unsafe {
            probes::checksum_region(region.start as *const u8, region.len)
        },
        // Degraded environment: baseline the record itself.
        None => core.baseline.self_digest(),
    };
    debug!(checksum = core.baseline.code_checksum, "baseline snapshot taken");
    Ok(())
}

// ── Integrity check ─────────────────────────────────────────────────────────

pub(crate) fn check_integrity(mask: CheckMask) -> Result<(), GuardError> {
    let mut slot = lock();
    let core = slot.as_mut().ok_or(GuardError::NotInitialized)?;
    if mask.is_empty() {
        return Err(GuardError::EmptyMask);
    }

    let mut suspicious = false;
    let mut compromised = false;

    if mask.contains(CheckMask::DEBUGGER) && probes::tracer_check() > 0 {
        debug!("tracer attached to this process");
        compromised = true;
    }

    if mask.contains(CheckMask::TIMING) && probes::timing_check() > 0 {
        debug!("timing probe exceeded threshold");
        suspicious = true;
    }

    if mask.contains(CheckMask::MEMORY) {
        match codemap::locate() {
            Some(region) => {
                let current = unsafe {
                    probes::checksum_region(region.start as *const u8, region.len)
                };
                if current != core.baseline.code_checksum {
                    debug!(
                        expected = core.baseline.code_checksum,
                        actual = current,
                        "code region digest mismatch"
                    );
                    compromised = true;
                }
            }
            None => {
                // No code coverage here, so a mismatch is only a weak
                // signal against the record itself.
                if core.baseline.self_digest() != core.baseline.code_checksum {
                    debug!("baseline record digest mismatch (degraded check)");
                    suspicious = true;
                }
            }
        }
    }

    // CheckMask::STACK is reserved; no probe behind it yet.

    publish_findings(compromised, suspicious);
    Ok(())
}

/// Fold check findings into the verdict under the monotonicity rule.
fn publish_findings(compromised: bool, suspicious: bool) {
    if compromised {
        warn!("integrity check confirmed tampering");
        VERDICT.store(SecurityState::Compromised as u8, Ordering::Release);
    } else if suspicious {
        let raised = VERDICT.compare_exchange(
            SecurityState::Safe as u8,
            SecurityState::Warning as u8,
            Ordering::Release,
            Ordering::Relaxed,
        );
        if raised.is_ok() {
            warn!("suspicious activity observed; verdict raised to warning");
        }
    }
}

// ── Reads ───────────────────────────────────────────────────────────────────

/// Fast tracer-only probe. Does not consult or update the verdict.
pub(crate) fn detect_debugger() -> i32 {
    if lock().is_none() {
        return -1;
    }
    probes::tracer_check()
}

/// Lock-free verdict read. Out-of-range storage clamps to compromised.
pub(crate) fn security_state() -> SecurityState {
    SecurityState::from_raw(VERDICT.load(Ordering::Acquire))
}

// ── Test seams ──────────────────────────────────────────────────────────────

/// Corrupt the stored baseline digest, simulating a snapshot that no longer
/// matches the live code region.
#[cfg(test)]
pub(crate) fn corrupt_baseline_for_tests() {
    if let Some(core) = lock().as_mut() {
        core.baseline.code_checksum ^= 0xDEAD_BEEF;
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
//
// Everything touching the process-wide singleton lives in
// `integration_tests`, behind its serialization lock. Only the pure
// baseline record is tested here.
