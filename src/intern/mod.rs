// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! String interning (§4.9).
//!
//! Three tiers are searched in order: the two well-known atoms held
//! directly as `Value` constants, the sorted ROM string table (binary
//! search), and an unsorted RAM intern list built up as strings are first
//! interned. A string that is not found anywhere is promoted in place:
//! its allocation header is rewritten to `INTERNED_STRING` and it is
//! prepended to the RAM list.


use crate::heap::{Heap, TypeCode, header};
use crate::value::Value;

/// The RAM intern list: a singly-linked chain of `INTERNAL_CONTAINER`
/// cells, each `{ next: Value, target: Value }`, where `target` is the
/// interned string. Walked linearly since it is expected to stay small
/// relative to the ROM string table.
pub struct InternTable {
    head: Value,
}

impl Default for InternTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InternTable {
    #[must_use]
    pub const fn new() -> Self {
        Self { head: Value::NULL }
    }

    /// Mutable access to the RAM intern list's root, for [`crate::gc`] to
    /// treat as a collection root.
    pub fn root_mut(&mut self) -> &mut Value {
        &mut self.head
    }

    fn iter_ram<'a>(&self, heap: &'a Heap) -> RamInternIter<'a> {
        RamInternIter {
            heap,
            cursor: self.head,
        }
    }

    fn find_ram(&self, s: &str, heap: &Heap) -> Option<Value> {
        self.iter_ram(heap)
            .find(|&target| heap.read_str(target.short_ptr_offset()) == s)
    }

    /// Prepend `target` (an allocation just promoted to `INTERNED_STRING`)
    /// to the RAM list.
    fn push_ram(
        &mut self,
        target: Value,
        heap: &mut Heap,
        bucket_size: u16,
        max_heap_size: u16,
    ) -> Option<()> {
        let cell = heap.try_allocate(4, TypeCode::InternalContainer, bucket_size, max_heap_size)?;
        let offset = cell.short_ptr_offset();
        heap.write_value(offset, self.head);
        heap.write_value(offset + 2, target);
        self.head = cell;
        Some(())
    }
}

struct RamInternIter<'a> {
    heap: &'a Heap,
    cursor: Value,
}

impl Iterator for RamInternIter<'_> {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        if self.cursor == Value::NULL {
            return None;
        }
        let offset = self.cursor.short_ptr_offset();
        let target = self.heap.read_value(offset + 2);
        self.cursor = self.heap.read_value(offset);
        Some(target)
    }
}

/// Binary-search the (sorted, memcmp order) ROM string table for an exact
/// match. `entries` are the `BytecodeMappedPtr`-relative string contents,
/// resolved by the caller (the ROM is outside `Heap`).
#[must_use]
pub fn find_in_rom_table<'a>(s: &str, entries: &[(&'a str, Value)]) -> Option<Value> {
    entries
        .binary_search_by(|(candidate, _)| (*candidate).cmp(s))
        .ok()
        .map(|i| entries[i].1)
}

/// `intern(s)` (§4.9). `s` must currently be a `STRING` allocation (not
/// yet interned); returns the canonical interned `Value`, which may be
/// `s` itself (promoted in place), an existing RAM intern, a ROM string
/// table entry, or one of the two well-known atoms.
pub fn intern(
    s_value: Value,
    table: &mut InternTable,
    heap: &mut Heap,
    rom_table: &[(&str, Value)],
    bucket_size: u16,
    max_heap_size: u16,
) -> Option<Value> {
    let s = heap.read_str(s_value.short_ptr_offset());
    if s == "length" {
        return Some(Value::STR_LENGTH);
    }
    if s == "__proto__" {
        return Some(Value::STR_PROTO);
    }
    if let Some(hit) = find_in_rom_table(s, rom_table) {
        return Some(hit);
    }
    if let Some(hit) = table.find_ram(s, heap) {
        return Some(hit);
    }
    let offset = s_value.short_ptr_offset();
    let len = heap.payload_size_at(offset);
    heap.write_u16(offset - 2, header::pack(TypeCode::InternedString, len));
    table.push_ram(s_value, heap, bucket_size, max_heap_size)?;
    Some(s_value)
}

/// `to_property_name` (§4.7): normalize a value used as a property key.
/// Negative `Int14` indices are rejected; non-interned ROM strings are a
/// type error since the compiler is expected to have already interned
/// every string used as a key.
pub fn to_property_name(
    key: Value,
    table: &mut InternTable,
    heap: &mut Heap,
    rom_table: &[(&str, Value)],
    bucket_size: u16,
    max_heap_size: u16,
) -> Result<Value, crate::Error> {
    if key.is_int14() {
        return if key.decode_int14() >= 0 {
            Ok(key)
        } else {
            Err(crate::Error::RangeError)
        };
    }
    if key == Value::STR_LENGTH || key == Value::STR_PROTO {
        return Ok(key);
    }
    if key.is_short_ptr() {
        return match heap.type_code_at(key.short_ptr_offset()) {
            TypeCode::InternedString => Ok(key),
            TypeCode::String => intern(key, table, heap, rom_table, bucket_size, max_heap_size)
                .ok_or(crate::Error::OutOfMemory),
            _ => Err(crate::Error::TypeError),
        };
    }
    // A `BytecodeMappedPtr` into ROM that is not already one of the two
    // well-known atoms: the compiler guarantees every ROM key-shaped
    // string is pre-interned, so anything else here is a type error.
    Err(crate::Error::TypeError)
}
