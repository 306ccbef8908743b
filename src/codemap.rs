// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (c) 2025-2026 JR Morton

#![allow(dead_code)]
//! Executable code-region discovery.
//!
//! Finds the extent of the process's own `.text` so the memory probe can
//! digest it. Three environments, selected at build time: linker symbols on
//! Linux, Mach-O segment introspection on macOS, and `/proc/self/maps`
//! parsing on Android. Everywhere else the region is reported unavailable
//! and the caller degrades to a weaker self-check.
//!
//! Discovery is pure: no monitor state is touched, and the maps file handle
//! never outlives a single call.

use std::fs;
use std::path::Path;

use tracing::trace;

/// Contiguous in-memory range holding executable instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeRegion {
    /// Load address of the first byte.
    pub start: usize,
    /// Extent in bytes.
    pub len: usize,
}

/// Locate the executable code region of the running process.
///
/// Returns `None` where no discovery mechanism exists or the mechanism
/// reported an empty region. Safe to call repeatedly; every call re-reads
/// the environment.
pub fn locate() -> Option<CodeRegion> {
    let region = locate_impl();
    match region {
        Some(r) => trace!(start = r.start, len = r.len, "code region located"),
        None => trace!("code region unavailable on this platform"),
    }
    region
}

// ── Linker-symbol environment (Linux) ───────────────────────────────────────

/// The linker brackets the text segment with `__executable_start` and
/// `__etext`; the region is their difference.
#[cfg(target_os = "linux")]
fn locate_impl() -> Option<CodeRegion> {
    extern "C" {
        static __executable_start: u8;
        static __etext: u8;
    }
    let start = unsafe { &__executable_start as *const u8 as usize };
    let end = unsafe { &__etext as *const u8 as usize };
    if end <= start {
        // Nonsensical symbol layout. Report unavailable rather than hand
        // the checksum a bogus extent.
        return None;
    }
    Some(CodeRegion {
        start,
        len: end - start,
    })
}

// ── Segment-introspection environment (macOS) ───────────────────────────────

#[cfg(target_os = "macos")]
fn locate_impl() -> Option<CodeRegion> {
    use std::os::raw::{c_char, c_ulong};

    #[repr(C)]
    struct MachHeader64 {
        _opaque: [u8; 0],
    }

    extern "C" {
        fn _dyld_get_image_header(image_index: u32) -> *const MachHeader64;
        fn getsectiondata(
            header: *const MachHeader64,
            segname: *const c_char,
            sectname: *const c_char,
            size: *mut c_ulong,
        ) -> *const u8;
    }

    let header = unsafe { _dyld_get_image_header(0) };
    if header.is_null() {
        return None;
    }
    let mut size: c_ulong = 0;
    let text = unsafe {
        getsectiondata(
            header,
            b"__TEXT\0".as_ptr().cast(),
            b"__text\0".as_ptr().cast(),
            &mut size,
        )
    };
    if text.is_null() || size == 0 {
        return None;
    }
    Some(CodeRegion {
        start: text as usize,
        len: size as usize,
    })
}

// ── Memory-map environment (Android) ────────────────────────────────────────

#[cfg(target_os = "android")]
fn locate_impl() -> Option<CodeRegion> {
    executable_region_at(Path::new("/proc/self/maps"))
}

// ── No discovery mechanism ──────────────────────────────────────────────────

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "android")))]
fn locate_impl() -> Option<CodeRegion> {
    None
}

// ── Maps parsing ────────────────────────────────────────────────────────────
//
// Compiled on every platform so the parser stays covered by the portable
// test suite; only the Android build wires it into `locate`.

/// Upper bound on lines considered. A maps file longer than this is
/// pathological and the scan stops rather than running unbounded.
const MAX_MAP_LINES: usize = 4096;

/// Scan a maps pseudo-file for the first executable region.
fn executable_region_at(path: &Path) -> Option<CodeRegion> {
    let content = fs::read_to_string(path).ok()?;
    first_executable_region(&content)
}

/// First region whose permissions start with a readable bit and include an
/// execute bit (`r?x?`). Malformed lines are skipped.
fn first_executable_region(maps: &str) -> Option<CodeRegion> {
    maps.lines()
        .take(MAX_MAP_LINES)
        .filter_map(parse_maps_line)
        .find(|(_, perms)| is_executable_perms(perms))
        .map(|(region, _)| region)
}

/// Parse a `start-end perms ...` maps line into a region and its
/// permission string.
fn parse_maps_line(line: &str) -> Option<(CodeRegion, &str)> {
    let mut parts = line.split_whitespace();
    let range = parts.next()?;
    let perms = parts.next()?;

    let (start_str, end_str) = range.split_once('-')?;
    let start = usize::from_str_radix(start_str, 16).ok()?;
    let end = usize::from_str_radix(end_str, 16).ok()?;
    if end <= start {
        return None;
    }
    Some((
        CodeRegion {
            start,
            len: end - start,
        },
        perms,
    ))
}

fn is_executable_perms(perms: &str) -> bool {
    let bytes = perms.as_bytes();
    bytes.first() == Some(&b'r') && bytes.get(2) == Some(&b'x')
}

// ── Tests ───────────────────────────────────────────────────────────────────
