// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Garbage collector (§4.3): a Cheney-style copying collector that moves
//! every reachable allocation into a fresh heap, compacting `ARRAY`
//! backing stores and folding `PROPERTY_LIST` chains along the way.
//!
//! [`collect`] takes ownership of the fromspace `Heap` and the mutable
//! root slots (globals, the value stack, the string-intern list head),
//! and returns a freshly built tospace `Heap` with every root rewritten
//! to point into it. The fromspace is dropped once collection finishes;
//! nothing outside the roots can still reference it.


use crate::heap::header::{self, TOMBSTONE_HEADER};
use crate::heap::{Heap, TypeCode};
use crate::value::Value;
use crate::Error;

#[cfg(any(test, feature = "std"))]
use std::vec::Vec;

#[cfg(not(any(test, feature = "std")))]
use alloc::vec::Vec;

/// `ARRAY` layout, shared with [`crate::property`].
const ARRAY_DATA: u16 = 0;
const ARRAY_LENGTH: u16 = 2;

/// `PROPERTY_LIST` layout, shared with [`crate::property`].
const PROP_LIST_NEXT: u16 = 0;
const PROP_LIST_PROTO: u16 = 2;
const PROP_LIST_PAIRS_START: u16 = 4;

/// Run a full collection (§4.3 `run_gc`).
///
/// `squeeze` selects the tospace's initial bucket sizing: `true` sizes
/// tightly to the heap's current used size (the caller expects most of
/// it to be garbage and wants the smallest possible result, at the cost
/// of a second bucket if that estimate undershoots); `false` sizes to
/// `bucket_size`, matching ordinary allocation growth.
pub fn collect(
    fromspace: Heap,
    globals: &mut [Value],
    stack: &mut [Value],
    intern_head: &mut Value,
    bucket_size: u16,
    max_heap_size: u16,
    squeeze: bool,
) -> Result<Heap, Error> {
    let mut from = fromspace;
    let initial_capacity = if squeeze {
        from.heap_size().max(header::MAX_PAYLOAD_SIZE.min(bucket_size))
    } else {
        bucket_size
    };
    let mut to = Heap::new();
    to.add_bucket(initial_capacity);

    log::trace!("gc: collecting {} live bytes (squeeze={squeeze})", from.heap_size());

    for slot in globals.iter_mut() {
        *slot = copy_value(*slot, &mut from, &mut to, bucket_size, max_heap_size)?;
    }
    for slot in stack.iter_mut() {
        *slot = copy_value(*slot, &mut from, &mut to, bucket_size, max_heap_size)?;
    }
    *intern_head = copy_value(*intern_head, &mut from, &mut to, bucket_size, max_heap_size)?;

    scan_tospace(&mut from, &mut to, bucket_size, max_heap_size)?;

    log::trace!("gc: survivors now occupy {} bytes", to.heap_size());
    Ok(to)
}

/// First payload offset of any heap: its first bucket always starts at
/// offset 0, and the 2-byte header of the first allocation occupies
/// `[0, 2)`.
const FIRST_PAYLOAD_OFFSET: u16 = 2;

/// Scan-cursor pass over `to` (§4.3 steps 4-5): walks every allocation
/// already copied into tospace in order and, for containers, translates
/// each payload word through [`copy_value`]. Copying a not-yet-seen
/// fromspace value appends a fresh allocation onto the end of `to`,
/// which the cursor reaches in its own turn — so the scan naturally
/// terminates once it catches up to `to`'s write end, without any
/// allocation ever being visited via native call-stack recursion.
fn scan_tospace(
    from: &mut Heap,
    to: &mut Heap,
    bucket_size: u16,
    max_heap_size: u16,
) -> Result<(), Error> {
    let mut cursor = FIRST_PAYLOAD_OFFSET;
    while cursor < to.heap_size() {
        let header_word = to.header_word_at(cursor);
        let type_code = header::type_code_of(header_word);
        let size = header::size_of(header_word);
        let next_cursor = cursor + header::size_including_header(size);

        if type_code.is_container() {
            let word_count = size / 2;
            for i in 0..word_count {
                let word = to.read_value(cursor + i * 2);
                let translated = copy_value(word, from, to, bucket_size, max_heap_size)?;
                to.write_value(cursor + i * 2, translated);
            }
        }

        cursor = next_cursor;
    }
    Ok(())
}

/// Copy one value's referent (if it has one) from `from` to `to`,
/// returning the value as seen from `to`. Non-pointer values pass
/// through unchanged. This is a *shallow* copy: it never follows a
/// container's own words into a recursive call. Already-copied
/// allocations are recognized by the [`TypeCode::Tombstone`] left behind
/// in `from` and resolved to their forwarding pointer instead of being
/// copied again — this is what keeps cyclic graphs (an object reachable
/// from itself) terminating, and untranslated words left behind by a
/// shallow copy are exactly what [`scan_tospace`] visits afterward.
fn copy_value(
    v: Value,
    from: &mut Heap,
    to: &mut Heap,
    bucket_size: u16,
    max_heap_size: u16,
) -> Result<Value, Error> {
    if !v.is_short_ptr() {
        return Ok(v);
    }
    let offset = v.short_ptr_offset();
    let type_code = from.type_code_at(offset);
    if type_code == TypeCode::Tombstone {
        return Ok(from.read_value(offset));
    }
    match type_code {
        TypeCode::Array => copy_array(offset, from, to, bucket_size, max_heap_size),
        TypeCode::PropertyList => copy_property_list(offset, from, to, bucket_size, max_heap_size),
        _ if type_code.is_container() => {
            copy_container(offset, type_code, from, to, bucket_size, max_heap_size)
        }
        _ => copy_opaque(offset, type_code, from, to, bucket_size, max_heap_size),
    }
}

fn tombstone(from: &mut Heap, offset: u16, forward_to: Value) {
    from.write_u16(offset - 2, TOMBSTONE_HEADER);
    from.write_value(offset, forward_to);
}

fn copy_opaque(
    offset: u16,
    type_code: TypeCode,
    from: &mut Heap,
    to: &mut Heap,
    bucket_size: u16,
    max_heap_size: u16,
) -> Result<Value, Error> {
    let size = from.payload_size_at(offset);
    let dest = to
        .try_allocate(size, type_code, bucket_size, max_heap_size)
        .ok_or(Error::OutOfMemory)?;
    let bytes = from.read_bytes(offset, size).to_vec();
    to.write_bytes(dest.short_ptr_offset(), &bytes);
    tombstone(from, offset, dest);
    Ok(dest)
}

/// Generic container copy (`CLOSURE`, `INTERNAL_CONTAINER`, and
/// `FIXED_LENGTH_ARRAY` when reached directly rather than through its
/// owning `ARRAY`): every payload word is a [`Value`] the GC must trace,
/// but this function only moves the raw words across — [`scan_tospace`]
/// is what later translates each one. Tombstoning before the copy lands
/// means a cycle reaching back into this allocation (discovered only
/// once the scan gets here) resolves to the already-reserved
/// destination instead of allocating a duplicate.
fn copy_container(
    offset: u16,
    type_code: TypeCode,
    from: &mut Heap,
    to: &mut Heap,
    bucket_size: u16,
    max_heap_size: u16,
) -> Result<Value, Error> {
    let size = from.payload_size_at(offset);
    let word_count = size / 2;
    let words: Vec<Value> = (0..word_count).map(|i| from.read_value(offset + i * 2)).collect();

    let dest = to
        .try_allocate(size, type_code, bucket_size, max_heap_size)
        .ok_or(Error::OutOfMemory)?;
    let dest_offset = dest.short_ptr_offset();
    tombstone(from, offset, dest);
    for (i, word) in words.into_iter().enumerate() {
        to.write_value(dest_offset + i as u16 * 2, word);
    }
    Ok(dest)
}

/// Copy an `ARRAY`, truncating its backing store to `length` slots (null
/// if `length` is zero) so dead trailing capacity from `grow_array`'s
/// doubling never survives a collection (§4.3 step 3). Backing-store
/// slots are moved across verbatim; [`scan_tospace`] translates any
/// pointers among them once the new backing store is itself visited.
fn copy_array(
    offset: u16,
    from: &mut Heap,
    to: &mut Heap,
    bucket_size: u16,
    max_heap_size: u16,
) -> Result<Value, Error> {
    let length_value = from.read_value(offset + ARRAY_LENGTH);
    let length = length_value.decode_int14().max(0) as u16;
    let data = from.read_value(offset + ARRAY_DATA);

    let dest = to
        .try_allocate(4, TypeCode::Array, bucket_size, max_heap_size)
        .ok_or(Error::OutOfMemory)?;
    let dest_offset = dest.short_ptr_offset();
    tombstone(from, offset, dest);

    let new_data = if data == Value::NULL || length == 0 {
        Value::NULL
    } else {
        let old_data_offset = data.short_ptr_offset();
        let needed = length * 2;
        let slots: Vec<Value> = (0..length)
            .map(|i| from.read_value(old_data_offset + i * 2))
            .collect();
        let new_backing = to
            .try_allocate(needed, TypeCode::FixedLengthArray, bucket_size, max_heap_size)
            .ok_or(Error::OutOfMemory)?;
        let new_backing_offset = new_backing.short_ptr_offset();
        tombstone(from, old_data_offset, new_backing);
        for (i, slot) in slots.into_iter().enumerate() {
            to.write_value(new_backing_offset + i as u16 * 2, slot);
        }
        new_backing
    };

    to.write_value(dest_offset + ARRAY_DATA, new_data);
    to.write_value(dest_offset + ARRAY_LENGTH, Value::int14(length as i16));
    Ok(dest)
}

/// Copy a `PROPERTY_LIST`, folding every group linked off `next` into one
/// contiguous record (§4.3 step 3): `set_property_list` appends a fresh
/// group each time the current one fills up, so a long-lived object can
/// accumulate a chain of small allocations that a collection should
/// re-flatten into a single block. `proto` and every key/value are moved
/// across verbatim; [`scan_tospace`] translates them once it reaches
/// this allocation.
fn copy_property_list(
    offset: u16,
    from: &mut Heap,
    to: &mut Heap,
    bucket_size: u16,
    max_heap_size: u16,
) -> Result<Value, Error> {
    let proto = from.read_value(offset + PROP_LIST_PROTO);

    let mut group_offsets = Vec::new();
    let mut pairs = Vec::new();
    let mut cursor = offset;
    loop {
        group_offsets.push(cursor);
        let payload_len = from.payload_size_at(cursor);
        let pair_count = (payload_len - PROP_LIST_PAIRS_START) / 4;
        for i in 0..pair_count {
            let pair_offset = cursor + PROP_LIST_PAIRS_START + i * 4;
            let key = from.read_value(pair_offset);
            let val = from.read_value(pair_offset + 2);
            pairs.push((key, val));
        }
        let next = from.read_value(cursor + PROP_LIST_NEXT);
        if next == Value::NULL {
            break;
        }
        cursor = next.short_ptr_offset();
    }

    let dest_size = PROP_LIST_PAIRS_START + pairs.len() as u16 * 4;
    let dest = to
        .try_allocate(dest_size, TypeCode::PropertyList, bucket_size, max_heap_size)
        .ok_or(Error::OutOfMemory)?;
    let dest_offset = dest.short_ptr_offset();
    for &group_offset in &group_offsets {
        tombstone(from, group_offset, dest);
    }

    to.write_value(dest_offset + PROP_LIST_NEXT, Value::NULL);
    to.write_value(dest_offset + PROP_LIST_PROTO, proto);
    for (i, (key, val)) in pairs.into_iter().enumerate() {
        let pair_offset = dest_offset + PROP_LIST_PAIRS_START + i as u16 * 4;
        to.write_value(pair_offset, key);
        to.write_value(pair_offset + 2, val);
    }
    Ok(dest)
}
