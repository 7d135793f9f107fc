// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Bytecode image loader (§4.4): validates a raw image, resolves its
//! imports against a host-supplied [`ImportResolver`], and assembles a
//! runnable [`Vm`].


#[cfg(not(any(test, feature = "std")))]
use alloc::boxed::Box;
#[cfg(not(any(test, feature = "std")))]
use alloc::vec::Vec;

#[cfg(any(test, feature = "std"))]
use std::vec::Vec;

use crate::bytecode::{crc, BytecodeHeader, Section, CRC_COVERED_START, HEADER_FIXED_SIZE, SECTION_COUNT};
use crate::heap::Heap;
use crate::host::{HostFunction, ImportResolver};
use crate::platform::HostPort;
use crate::value::Value;
use crate::vm::Vm;
use crate::{Error, VmConfig};

/// Adapts a resolver-borrowed [`HostFunction`] reference into an owned
/// trait object the [`Vm`]'s import slab can hold, without requiring
/// `ImportResolver` to hand out owned boxes itself.
struct ImportRef<'a>(&'a dyn HostFunction);

impl HostFunction for ImportRef<'_> {
    fn call(&self, args: &[Value], heap: &mut Heap) -> Result<Value, Error> {
        self.0.call(args, heap)
    }
}

/// Load `image` into a runnable [`Vm`] (§4.4, the 7-step load
/// procedure):
///
/// 1. Size/structural validation of the fixed header.
/// 2. CRC-16/CCITT validation over `image[CRC_COVERED_START..bytecodeSize]`.
/// 3. Version and `FF_FLOAT_SUPPORT` validation against `config`.
/// 4. Import resolution via `resolver`.
/// 5. Globals copy.
/// 6. Heap copy (verbatim; see [`crate::heap::Heap::from_image_bytes`]).
/// 7. Pointer validation: every container word that looks like a
///    pointer must resolve inside the heap, ROM, or globals it claims
///    to target (our `load_pointers` equivalent — see module docs for
///    why this is validation rather than rewriting).
pub fn load<'img, P: HostPort>(
    image: &'img [u8],
    resolver: &'img dyn ImportResolver,
    config: VmConfig,
    host_port: P,
) -> Result<Vm<'img, P>, Error> {
    let header = BytecodeHeader::parse(image).ok_or(Error::InvalidBytecode)?;
    let bytecode_size = header.bytecode_size as usize;
    if bytecode_size > image.len() || bytecode_size < CRC_COVERED_START {
        return Err(Error::InvalidBytecode);
    }
    let header_size = header.header_size as usize;
    let fixed_header_region = HEADER_FIXED_SIZE + SECTION_COUNT * 2;
    if header_size < fixed_header_region || bytecode_size < header_size {
        log::warn!(
            "rejecting bytecode image: header_size {header_size} inconsistent with bytecode_size {bytecode_size}"
        );
        return Err(Error::InvalidBytecode);
    }

    let covered = &image[CRC_COVERED_START..bytecode_size];
    if crc::crc16_ccitt(covered) != header.crc {
        log::warn!("rejecting bytecode image: CRC mismatch over {} covered bytes", covered.len());
        return Err(Error::BytecodeCrcFail);
    }

    if header.bytecode_version != 1 {
        log::warn!("rejecting bytecode image: unsupported version {}", header.bytecode_version);
        return Err(Error::InvalidBytecode);
    }
    if header.requires_float_support() && !config.support_float {
        log::warn!("rejecting bytecode image: requires float support this host did not enable");
        return Err(Error::BytecodeRequiresFloatSupport);
    }

    let imports = load_imports(image, &header, resolver)?;
    let rom_string_table = load_string_table(image, &header)?;
    let globals = load_globals(image, &header);
    let heap = load_heap(image, &header);

    validate_pointers(&heap, &header, globals.len())?;

    log::debug!("loaded bytecode image: {bytecode_size} bytes, {} globals, {} imports", globals.len(), imports.len());

    Ok(Vm::from_parts(
        image,
        header,
        globals,
        imports,
        rom_string_table,
        heap,
        config,
        host_port,
    ))
}

fn section_bytes<'img>(image: &'img [u8], header: &BytecodeHeader, section: Section) -> &'img [u8] {
    let start = header.section_offset(section) as usize;
    let size = header.section_size(section) as usize;
    &image[start..start + size]
}

fn load_imports<'img>(
    image: &'img [u8],
    header: &BytecodeHeader,
    resolver: &'img dyn ImportResolver,
) -> Result<Vec<Box<dyn HostFunction + 'img>>, Error> {
    let bytes = section_bytes(image, header, Section::ImportTable);
    let mut imports: Vec<Box<dyn HostFunction + 'img>> = Vec::new();
    for chunk in bytes.chunks_exact(2) {
        let id = u16::from_le_bytes([chunk[0], chunk[1]]);
        let f = resolver.resolve_import(id).ok_or_else(|| {
            log::warn!("rejecting bytecode image: host function {id} has no resolver entry");
            Error::UnresolvedImport
        })?;
        imports.push(Box::new(ImportRef(f)));
    }
    Ok(imports)
}

/// `STRING_TABLE` entries are `u16` image offsets, each naming a ROM
/// string literal stored as a 2-byte little-endian length prefix
/// followed by that many UTF-8 bytes (§4.9: the same position used as
/// the string's `BytecodeMappedPtr` identity elsewhere in the image).
/// Entries are trusted to already be sorted by content, as
/// [`crate::intern::find_in_rom_table`]'s binary search requires.
fn load_string_table<'img>(
    image: &'img [u8],
    header: &BytecodeHeader,
) -> Result<Vec<(&'img str, Value)>, Error> {
    let bytes = section_bytes(image, header, Section::StringTable);
    let mut table = Vec::new();
    for chunk in bytes.chunks_exact(2) {
        let entry_offset = u16::from_le_bytes([chunk[0], chunk[1]]) as usize;
        let len_bytes = image
            .get(entry_offset..entry_offset + 2)
            .ok_or(Error::InvalidBytecode)?;
        let len = u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;
        let str_bytes = image
            .get(entry_offset + 2..entry_offset + 2 + len)
            .ok_or(Error::InvalidBytecode)?;
        let s = core::str::from_utf8(str_bytes).map_err(|_| Error::InvalidBytecode)?;
        table.push((s, Value::bytecode_mapped_ptr(entry_offset as u16)));
    }
    Ok(table)
}

fn load_globals(image: &[u8], header: &BytecodeHeader) -> Vec<Value> {
    section_bytes(image, header, Section::Globals)
        .chunks_exact(2)
        .map(|c| Value::from_raw(u16::from_le_bytes([c[0], c[1]])))
        .collect()
}

fn load_heap(image: &[u8], header: &BytecodeHeader) -> Heap {
    Heap::from_image_bytes(section_bytes(image, header, Section::Heap))
}

/// Sanity-check every container word that looks like a pointer. Rather
/// than rewriting offsets (the on-disk `HEAP` section already matches
/// our runtime addressing — see [`crate::heap::Heap::from_image_bytes`]),
/// this plays the role of the reference loader's `load_pointers` pass:
/// reject an image whose pointers don't actually land somewhere valid,
/// rather than letting a later dereference panic.
fn validate_pointers(heap: &Heap, header: &BytecodeHeader, globals_len: usize) -> Result<(), Error> {
    let rom_start = header.section_offset(Section::Rom);
    let rom_end = rom_start + header.section_size(Section::Rom);
    let globals_start = header.section_offset(Section::Globals);
    let globals_end = globals_start + header.section_size(Section::Globals);
    let heap_size = heap.heap_size();

    for (offset, header_word) in heap.iter_allocations() {
        let type_code = crate::heap::header::type_code_of(header_word);
        if !type_code.is_container() {
            continue;
        }
        let size = crate::heap::header::size_of(header_word);
        for i in 0..size / 2 {
            let word = heap.read_value(offset + i * 2);
            if !pointer_is_plausible(word, heap_size, rom_start, rom_end, globals_start, globals_end, globals_len) {
                return Err(Error::InvalidBytecode);
            }
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn pointer_is_plausible(
    v: Value,
    heap_size: u16,
    rom_start: u16,
    rom_end: u16,
    globals_start: u16,
    globals_end: u16,
    globals_len: usize,
) -> bool {
    if v.is_int14() {
        return true;
    }
    if v.is_short_ptr() {
        return v.short_ptr_offset() < heap_size;
    }
    if v.is_wellknown() {
        return true;
    }
    let offset = v.bytecode_mapped_offset();
    (offset >= rom_start && offset < rom_end) || (offset >= globals_start && offset < globals_end && globals_len > 0)
}
