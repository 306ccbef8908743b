// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

#![allow(dead_code)]
//! Detection primitives: cycle counter, tracer check, timing probe, and the
//! memory checksum.
//!
//! All four are stateless and re-entrant. Each has one backend per build:
//! native on x86_64 (`rdtsc`) and aarch64 (`cntvct_el0`), and a portable
//! clock-based fallback everywhere else. Signatures are identical across
//! backends; only the counter source, the timing threshold, and the
//! implementation label differ.

use std::fs;
use std::path::Path;

// ── Backend selection ───────────────────────────────────────────────────────

#[cfg(target_arch = "x86_64")]
const IMPL_LABEL: &str = "x86_64-native";
#[cfg(target_arch = "aarch64")]
const IMPL_LABEL: &str = "arm64-native";
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
const IMPL_LABEL: &str = "c-fallback";

/// Timing anomaly threshold for [`timing_check`].
///
/// Native counters tick per cycle (or per fixed-rate virtual tick on ARM);
/// the portable backend measures nanoseconds on a coarser clock, so its
/// threshold is correspondingly wider.
#[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
const TIMING_THRESHOLD: u64 = 1_000;
#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
const TIMING_THRESHOLD: u64 = 100_000;

/// Label describing the compiled backend.
pub fn implementation() -> &'static str {
    IMPL_LABEL
}

// ── Cycle counter ───────────────────────────────────────────────────────────

/// High-resolution monotonic counter.
///
/// Absolute magnitude is backend-dependent; callers must only use deltas.
pub fn cycle_counter() -> u64 {
    #[cfg(target_arch = "x86_64")]
    {
        unsafe { core::arch::x86_64::_rdtsc() }
    }
    #[cfg(target_arch = "aarch64")]
    {
        let ticks: u64;
        unsafe {
            std::arch::asm!("mrs {t}, cntvct_el0", t = out(reg) ticks, options(nomem, nostack));
        }
        ticks
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        monotonic_nanos()
    }
}

/// Monotonic clock in nanoseconds, degrading through
/// `CLOCK_MONOTONIC_RAW` then `CLOCK_MONOTONIC` then `CLOCK_REALTIME`.
/// Returns 0 only if every clock read fails.
fn monotonic_nanos() -> u64 {
    #[cfg(any(target_os = "linux", target_os = "android", target_os = "macos"))]
    if let Some(ns) = clock_nanos(libc::CLOCK_MONOTONIC_RAW) {
        return ns;
    }
    clock_nanos(libc::CLOCK_MONOTONIC)
        .or_else(|| clock_nanos(libc::CLOCK_REALTIME))
        .unwrap_or(0)
}

fn clock_nanos(clock: libc::clockid_t) -> Option<u64> {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let rc = unsafe { libc::clock_gettime(clock, &mut ts) };
    if rc != 0 {
        return None;
    }
    Some((ts.tv_sec as u64).wrapping_mul(1_000_000_000).wrapping_add(ts.tv_nsec as u64))
}

// ── Tracer detection ────────────────────────────────────────────────────────

/// Check whether a tracer (ptrace-style debugger or instrumentation) is
/// attached to this process.
///
/// Returns `1` if a tracer is recorded, `0` if none, `-1` where no detection
/// mechanism exists. An unreadable status file degrades to `0`; the caller
/// treats both `0` and `-1` as not-suspicious.
pub fn tracer_check() -> i32 {
    #[cfg(test)]
    {
        let forced = test_overrides::FORCE_TRACER.load(std::sync::atomic::Ordering::Relaxed);
        if forced != test_overrides::NO_OVERRIDE {
            return forced;
        }
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        match tracer_pid_at(Path::new("/proc/self/status")) {
            Some(pid) => i32::from(pid != 0),
            None => 0,
        }
    }
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    {
        -1
    }
}

/// Read the `TracerPid:` field from a status pseudo-file.
fn tracer_pid_at(path: &Path) -> Option<i64> {
    let status = fs::read_to_string(path).ok()?;
    tracer_pid_from_status(&status)
}

fn tracer_pid_from_status(status: &str) -> Option<i64> {
    status.lines().find_map(|line| {
        line.strip_prefix("TracerPid:")
            .and_then(|rest| rest.trim().parse::<i64>().ok())
    })
}

// ── Timing probe ────────────────────────────────────────────────────────────

const WORKLOAD_ITERATIONS: u64 = 10;

/// Measure a fixed micro-workload against the backend threshold.
///
/// Returns `1` if the measured delta exceeds the threshold (single-stepping
/// and instrumentation stretch it by orders of magnitude), `0` otherwise.
/// The workload is identical on every call so the threshold stays
/// meaningful.
pub fn timing_check() -> i32 {
    #[cfg(test)]
    if test_overrides::SLOW_TIMING.load(std::sync::atomic::Ordering::Relaxed) {
        return timing_check_with(stalled_workload);
    }
    timing_check_with(busy_workload)
}

fn timing_check_with(workload: fn() -> u64) -> i32 {
    let t0 = cycle_counter();
    std::hint::black_box(workload());
    let t1 = cycle_counter();
    i32::from(t1.wrapping_sub(t0) > TIMING_THRESHOLD)
}

/// Fixed data-independent workload. `black_box` keeps the accumulation from
/// being folded away, which would collapse the delta to the bare counter
/// read cost.
fn busy_workload() -> u64 {
    let mut acc = 0u64;
    for i in 0..WORKLOAD_ITERATIONS {
        acc = std::hint::black_box(acc.wrapping_add(i));
    }
    acc
}

#[cfg(test)]
fn stalled_workload() -> u64 {
    std::thread::sleep(std::time::Duration::from_millis(5));
    busy_workload()
}

// ── Memory checksum ─────────────────────────────────────────────────────────

/// Rotate-XOR digest: `h = rotl(h, 1) ^ byte`, starting from zero.
///
/// Intentionally weak and fast. This is a tamper-evidence tripwire, not a
/// MAC: any single-byte flip changes the output, but an attacker who can
/// also recompute the digest defeats it by construction.
pub fn checksum_bytes(data: &[u8]) -> u32 {
    let mut h: u32 = 0;
    for &b in data {
        h = h.rotate_left(1) ^ u32::from(b);
    }
    h
}

/// Digest a raw memory region. Null start or zero length returns 0.
///
/// # Safety
///
/// `start..start + len` must be readable for the duration of the call.
pub unsafe fn checksum_region(start: *const u8, len: usize) -> u32 {
    if start.is_null() || len == 0 {
        return 0;
    }
    checksum_bytes(std::slice::from_raw_parts(start, len))
}

// ── Test seams ──────────────────────────────────────────────────────────────


// ── Tests ───────────────────────────────────────────────────────────────────
