// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Self-guarding runtime integrity monitor.
//!
//! A host application links this crate, takes a baseline snapshot of its own
//! executable code, and then periodically asks whether the process has been
//! tampered with: a tracer attached, code patched in memory, or execution
//! stretched by instrumentation. The answer is a coarse tri-valued verdict
//! ([`SecurityState`]) the host consults to decide whether to continue,
//! alert, or abort. The monitor itself never aborts the host; it only
//! mutates its verdict.
//!
//! Layering, dependencies pointing downward:
//!
//! * facade ([`init`], [`snapshot`], [`check_integrity`], ...) plus the
//!   C ABI mirror in [`ffi`]
//! * state manager (`guard`): singleton session, baseline record, verdict
//!   atomic, check orchestration
//! * code-region locator (`codemap`) and detection primitives (`probes`):
//!   pure, stateless, never call back upward
//!
//! The monitor is a passive library: it spawns no threads and keeps no
//! files, sockets, or environment state. All entry points are safe to call
//! from concurrent host threads. Verdict reads are lock-free.
//!
//! ```no_run
//! use selfguard::{CheckMask, SecurityState};
//!
//! selfguard::init()?;
//! selfguard::snapshot()?;
//!
//! // ... periodically, from any thread:
//! selfguard::check_integrity(CheckMask::ALL)?;
//! if selfguard::security_state() == SecurityState::Compromised {
//!     // the host decides; the monitor never kills the process
//! }
//!
//! selfguard::shutdown()?;
//! # Ok::<(), selfguard::GuardError>(())
//! ```

mod codemap;
pub mod ffi;
mod guard;
mod probes;
mod verdict;

#[cfg(test)]
mod integration_tests;

pub use verdict::{CheckMask, GuardError, SecurityState};

/// Start a monitoring session.
///
/// Records the baseline cycle value and publishes a `Safe` verdict. The
/// memory baseline is deliberately not taken here; call [`snapshot`] once
/// the process has finished loading. Until then the memory probe trips,
/// which is the intended default-deny posture.
///
/// Fails with [`GuardError::AlreadyInitialized`] if a session is live.
pub fn init() -> Result<(), GuardError> {
    guard::init()
}

/// Capture the code-region digest as the new baseline.
///
/// Replaces the stored digest with one of the current code region (or of
/// the baseline record itself where no region is discoverable). Does not
/// reset the verdict: a process already judged compromised must not launder
/// itself by re-snapshotting.
///
/// Fails with [`GuardError::NotInitialized`] outside a session.
pub fn snapshot() -> Result<(), GuardError> {
    guard::snapshot()
}

/// Run the probes selected by `mask` and fold the findings into the
/// verdict.
///
/// Success means the probes ran, not that they found nothing; read the
/// outcome separately via [`security_state`]. A zero mask is rejected with
/// [`GuardError::EmptyMask`] so a successful check always ran at least one
/// probe.
///
/// Fails with [`GuardError::NotInitialized`] outside a session.
pub fn check_integrity(mask: CheckMask) -> Result<(), GuardError> {
    guard::check_integrity(mask)
}

/// Fast debugger probe: 1 if a tracer is attached, 0 if not, -1 if the
/// monitor is uninitialized or the platform has no mechanism.
///
/// Does not update the verdict.
pub fn detect_debugger() -> i32 {
    guard::detect_debugger()
}

/// Current verdict, read lock-free.
///
/// Returns [`SecurityState::Compromised`] before [`init`], after
/// [`shutdown`], and for any out-of-range stored value.
pub fn security_state() -> SecurityState {
    guard::security_state()
}

/// End the session: publish a `Compromised` verdict, wipe the baseline with
/// a write the optimizer cannot elide, and release the singleton.
///
/// A fresh [`init`] afterwards starts a new session with a clean baseline.
///
/// Fails with [`GuardError::NotInitialized`] outside a session.
pub fn shutdown() -> Result<(), GuardError> {
    guard::shutdown()
}

/// Label of the compiled detection backend: `"x86_64-native"`,
/// `"arm64-native"`, or `"c-fallback"`.
pub fn implementation() -> &'static str {
    probes::implementation()
}
