// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! End-to-end tests driving the public API the way a host would: build
//! an image, load it, call into it, and (for the snapshot test) resume
//! from a freshly written one.

use crate::bytecode::op::{self, Primary, Secondary};
use crate::bytecode::{crc, CRC_COVERED_START, HEADER_FIXED_SIZE, SECTION_COUNT};
use crate::host::{HostFunction, ImportResolver};
use crate::platform::MockHostPort;
use crate::{Error, Value, VmConfig};

struct NoImports;

impl ImportResolver for NoImports {
    fn resolve_import(&self, _host_function_id: u16) -> Option<&dyn HostFunction> {
        None
    }
}

/// Assemble a complete image around a single ROM function whose body is
/// `rom_bytes` (max-stack-depth byte included), every other section
/// empty, and an initial `GLOBALS` section seeded with `globals`.
fn build_image(rom_bytes: &[u8], globals: &[u16]) -> std::vec::Vec<u8> {
    let sections_start = HEADER_FIXED_SIZE as u16 + SECTION_COUNT as u16 * 2;
    let rom_offset = sections_start;
    let globals_offset = rom_offset + rom_bytes.len() as u16;
    let heap_offset = globals_offset + globals.len() as u16 * 2;
    let bytecode_size = heap_offset;

    let mut image = std::vec::Vec::new();
    image.push(1);
    image.push(HEADER_FIXED_SIZE as u8 + (SECTION_COUNT * 2) as u8);
    image.extend_from_slice(&bytecode_size.to_le_bytes());
    image.extend_from_slice(&0u16.to_le_bytes());
    image.extend_from_slice(&0u32.to_le_bytes());
    let offsets: [u16; SECTION_COUNT] = [
        sections_start,
        rom_offset,
        rom_offset,
        rom_offset,
        rom_offset,
        rom_offset,
        globals_offset,
        heap_offset,
    ];
    for offset in offsets {
        image.extend_from_slice(&offset.to_le_bytes());
    }
    image.extend_from_slice(rom_bytes);
    for g in globals {
        image.extend_from_slice(&g.to_le_bytes());
    }

    let crc_value = crc::crc16_ccitt(&image[CRC_COVERED_START..]);
    image[4..6].copy_from_slice(&crc_value.to_le_bytes());
    image
}

/// `arg[0]` is always the synthesized receiver (`undefined`); the real
/// arguments passed to `Vm::call` start at `arg[1]`.
fn add_two_args_function() -> std::vec::Vec<u8> {
    std::vec![
        4, // maxStackDepth
        op::pack(Primary::LoadArg1, 1),
        op::pack(Primary::LoadArg1, 2),
        op::pack(Primary::Extended, 0),
        Secondary::Add as u8,
        op::pack(Primary::Return, 0b0001),
    ]
}

#[test]
fn loads_an_image_and_adds_two_arguments() {
    let image = build_image(&add_two_args_function(), &[]);
    let resolver = NoImports;
    let mut vm = crate::loader::load(&image, &resolver, VmConfig::new(), MockHostPort::new()).unwrap();
    let entry = Value::bytecode_mapped_ptr(HEADER_FIXED_SIZE as u16 + SECTION_COUNT as u16 * 2);
    let result = vm.call(entry, &[Value::int14(3), Value::int14(4)]).unwrap();
    assert_eq!(result, Value::int14(7));
}

#[test]
fn snapshot_resumes_with_the_same_observable_state() {
    let image = build_image(&add_two_args_function(), &[Value::int14(9).raw()]);
    let resolver = NoImports;
    let vm = crate::loader::load(&image, &resolver, VmConfig::new(), MockHostPort::new()).unwrap();
    assert_eq!(vm.globals()[0], Value::int14(9));

    let snapshot = vm.create_snapshot().unwrap();
    let resumed = crate::loader::load(&snapshot, &resolver, VmConfig::new(), MockHostPort::new()).unwrap();
    assert_eq!(resumed.globals()[0], Value::int14(9));
}

#[test]
fn a_truncated_image_is_rejected_before_anything_runs() {
    let image = build_image(&add_two_args_function(), &[]);
    let resolver = NoImports;
    let err = crate::loader::load(&image[..4], &resolver, VmConfig::new(), MockHostPort::new()).unwrap_err();
    assert_eq!(err, Error::InvalidBytecode);
}
