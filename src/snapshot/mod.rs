// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Snapshot writer (§4.10): serialize a running [`crate::Vm`]'s live
//! state back into a fresh bytecode image, resumable by
//! [`crate::loader::load`].
//!
//! The six immutable sections (`IMPORT_TABLE` through `ROM`) never
//! change at runtime, so they are copied out of the original image
//! verbatim. `GLOBALS` is fixed-length (the loader sizes it once from
//! the image and nothing grows it), so its byte length never changes
//! either. Only `HEAP` grows as the program allocates, which is why it
//! is the sole section whose size the new header must account for;
//! the same "heap offsets already match on-disk offsets" decision that
//! let the loader skip a relocation pass lets this skip one too — the
//! new `HEAP` section is a verbatim dump of every live bucket's bytes.


#[cfg(not(any(test, feature = "std")))]
use alloc::vec::Vec;

#[cfg(any(test, feature = "std"))]
use std::vec::Vec;

use crate::bytecode::{crc, BytecodeHeader, Section, CRC_COVERED_START, HEADER_FIXED_SIZE, SECTION_COUNT};
use crate::heap::Heap;
use crate::value::Value;
use crate::Error;

/// The largest value `bytecodeSize` (a `u16` header field) can hold.
const MAX_IMAGE_SIZE: usize = u16::MAX as usize;

/// Serialize `(image, header, globals, heap)` — the pieces [`crate::Vm`]
/// already validated and has been running against — into a new,
/// self-contained bytecode image.
pub fn create_snapshot(
    image: &[u8],
    header: &BytecodeHeader,
    globals: &[Value],
    heap: &Heap,
) -> Result<Vec<u8>, Error> {
    let heap_bytes = heap.to_bytes();
    let heap_offset = header.section_offset(Section::Heap);
    let new_bytecode_size = heap_offset as usize + heap_bytes.len();
    if new_bytecode_size > MAX_IMAGE_SIZE {
        return Err(Error::SnapshotTooLarge);
    }

    let mut out = Vec::with_capacity(new_bytecode_size);
    out.push(header.bytecode_version);
    out.push(header.header_size);
    out.extend_from_slice(&(new_bytecode_size as u16).to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // CRC placeholder, patched below
    out.extend_from_slice(&header.required_feature_flags.to_le_bytes());
    for i in 0..SECTION_COUNT {
        out.extend_from_slice(&header.section_offsets[i].to_le_bytes());
    }
    debug_assert_eq!(out.len(), HEADER_FIXED_SIZE + SECTION_COUNT * 2);

    // Everything between the header and GLOBALS is immutable at
    // runtime; copy it, then GLOBALS (re-serialized from live state,
    // same byte length as the image's), then the grown HEAP.
    let globals_offset = header.section_offset(Section::Globals) as usize;
    out.extend_from_slice(&image[out.len()..globals_offset]);
    for g in globals {
        out.extend_from_slice(&g.raw().to_le_bytes());
    }
    debug_assert_eq!(out.len(), heap_offset as usize);
    out.extend_from_slice(&heap_bytes);

    let crc_value = crc::crc16_ccitt(&out[CRC_COVERED_START..]);
    out[4..6].copy_from_slice(&crc_value.to_le_bytes());
    Ok(out)
}
