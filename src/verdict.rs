// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

//! Verdict, check-mask, and error vocabulary shared by the whole monitor.
//!
//! The verdict is totally ordered (`Safe < Warning < Compromised`) and only
//! ever moves upward within a session; see [`crate::guard`] for the
//! transition rules that enforce this.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Security verdict ────────────────────────────────────────────────────────

/// Tri-valued integrity verdict.
///
/// The discriminants are part of the C ABI (`sg_get_security_state`) and
/// must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum SecurityState {
    /// All integrity checks passed.
    Safe = 0,
    /// Suspicious activity detected (weak signal).
    Warning = 1,
    /// Active tampering confirmed, or the monitor is not running.
    Compromised = 2,
}

impl SecurityState {
    /// Decode a raw stored value. Anything outside the enumerated range
    /// clamps to [`SecurityState::Compromised`] (fail-secure).
    pub(crate) fn from_raw(raw: u8) -> Self {
        match raw {
            0 => SecurityState::Safe,
            1 => SecurityState::Warning,
            _ => SecurityState::Compromised,
        }
    }
}

impl std::fmt::Display for SecurityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecurityState::Safe => write!(f, "safe"),
            SecurityState::Warning => write!(f, "warning"),
            SecurityState::Compromised => write!(f, "compromised"),
        }
    }
}

// ── Check selection mask ────────────────────────────────────────────────────

/// Bitmask selecting which probes an integrity check runs.
///
/// A zero mask is a caller error, not a no-op: a successful check must have
/// run at least one probe. `ALL` is the complement of zero so that bits
/// added later are on by default for existing callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckMask(pub u32);

impl CheckMask {
    /// Tracer / debugger attachment probe.
    pub const DEBUGGER: CheckMask = CheckMask(1);
    /// Execution-time anomaly probe.
    pub const TIMING: CheckMask = CheckMask(1 << 1);
    /// Code-region checksum probe.
    pub const MEMORY: CheckMask = CheckMask(1 << 2);
    /// Reserved. Accepted in masks, currently runs no probe.
    pub const STACK: CheckMask = CheckMask(1 << 3);
    /// Every probe, including ones added in later revisions.
    pub const ALL: CheckMask = CheckMask(u32::MAX);

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if any bit of `other` is selected.
    pub fn contains(self, other: CheckMask) -> bool {
        self.0 & other.0 != 0
    }
}

impl std::ops::BitOr for CheckMask {
    type Output = CheckMask;

    fn bitor(self, rhs: CheckMask) -> CheckMask {
        CheckMask(self.0 | rhs.0)
    }
}

impl From<u32> for CheckMask {
    fn from(bits: u32) -> Self {
        CheckMask(bits)
    }
}

// ── Errors ──────────────────────────────────────────────────────────────────

/// Monitor API errors. Each variant maps onto the stable integer result
/// vocabulary of the C ABI via [`GuardError::code`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    /// `init` was called while a session is already live.
    #[error("monitor is already initialized")]
    AlreadyInitialized,

    /// The operation requires a live session.
    #[error("monitor is not initialized")]
    NotInitialized,

    /// Session construction or the initial snapshot failed.
    #[error("monitor initialization failed: {0}")]
    Init(String),

    /// `check_integrity` was called with no probe selected.
    #[error("check mask selects no probes")]
    EmptyMask,

    /// An internal operation could not execute.
    #[error("internal monitor failure: {0}")]
    Internal(String),
}

impl GuardError {
    /// Stable C ABI result code for this error.
    pub fn code(&self) -> i32 {
        match self {
            GuardError::Init(_) => -1,
            GuardError::NotInitialized => -2,
            GuardError::AlreadyInitialized => -3,
            GuardError::EmptyMask | GuardError::Internal(_) => -4,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
