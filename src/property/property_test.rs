// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

use super::*;
use crate::heap::Heap;

const BUCKET: u16 = 128;
const MAX_HEAP: u16 = 4096;

fn new_object(heap: &mut Heap) -> Value {
    let v = heap
        .try_allocate(4, TypeCode::PropertyList, BUCKET, MAX_HEAP)
        .unwrap();
    heap.write_value(v.short_ptr_offset() + PROP_LIST_NEXT, Value::NULL);
    heap.write_value(v.short_ptr_offset() + PROP_LIST_PROTO, Value::NULL);
    v
}

fn new_empty_array(heap: &mut Heap) -> Value {
    let v = heap.try_allocate(4, TypeCode::Array, BUCKET, MAX_HEAP).unwrap();
    heap.write_value(v.short_ptr_offset() + ARRAY_DATA, Value::NULL);
    heap.write_value(v.short_ptr_offset() + ARRAY_LENGTH, Value::int14(0));
    v
}

#[test]
fn get_property_on_missing_key_returns_undefined() {
    let mut heap = Heap::new();
    let obj = new_object(&mut heap);
    assert_eq!(
        get_property(obj, Value::STR_LENGTH, &heap).unwrap(),
        Value::UNDEFINED
    );
}

#[test]
fn set_then_get_round_trips() {
    let mut heap = Heap::new();
    let obj = new_object(&mut heap);
    set_property_list(obj, Value::int14(1), Value::TRUE, &mut heap, BUCKET, MAX_HEAP).unwrap();
    assert_eq!(get_property(obj, Value::int14(1), &heap).unwrap(), Value::TRUE);
}

#[test]
fn set_overwrites_existing_key_in_place() {
    let mut heap = Heap::new();
    let obj = new_object(&mut heap);
    set_property_list(obj, Value::int14(1), Value::TRUE, &mut heap, BUCKET, MAX_HEAP).unwrap();
    set_property_list(obj, Value::int14(1), Value::FALSE, &mut heap, BUCKET, MAX_HEAP).unwrap();
    assert_eq!(get_property(obj, Value::int14(1), &heap).unwrap(), Value::FALSE);
}

#[test]
fn new_keys_chain_through_next_without_disturbing_old_ones() {
    let mut heap = Heap::new();
    let obj = new_object(&mut heap);
    set_property_list(obj, Value::int14(1), Value::TRUE, &mut heap, BUCKET, MAX_HEAP).unwrap();
    set_property_list(obj, Value::int14(2), Value::FALSE, &mut heap, BUCKET, MAX_HEAP).unwrap();
    assert_eq!(get_property(obj, Value::int14(1), &heap).unwrap(), Value::TRUE);
    assert_eq!(get_property(obj, Value::int14(2), &heap).unwrap(), Value::FALSE);
}

#[test]
fn array_length_starts_at_zero_and_get_out_of_range_is_undefined() {
    let mut heap = Heap::new();
    let arr = new_empty_array(&mut heap);
    assert_eq!(
        get_property(arr, Value::STR_LENGTH, &heap).unwrap(),
        Value::int14(0)
    );
    assert_eq!(
        get_property(arr, Value::int14(0), &heap).unwrap(),
        Value::UNDEFINED
    );
}

#[test]
fn setting_an_index_grows_the_array_and_bumps_length() {
    let mut heap = Heap::new();
    let arr = new_empty_array(&mut heap);
    set_property_array(arr, Value::int14(5), Value::int14(9), &mut heap, BUCKET, MAX_HEAP)
        .unwrap();
    assert_eq!(
        get_property(arr, Value::int14(5), &heap).unwrap(),
        Value::int14(9)
    );
    assert_eq!(
        get_property(arr, Value::STR_LENGTH, &heap).unwrap(),
        Value::int14(6)
    );
}

#[test]
fn shrinking_length_wipes_now_unreachable_slots() {
    let mut heap = Heap::new();
    let arr = new_empty_array(&mut heap);
    set_property_array(arr, Value::int14(3), Value::int14(1), &mut heap, BUCKET, MAX_HEAP)
        .unwrap();
    set_property_array(
        arr,
        Value::STR_LENGTH,
        Value::int14(1),
        &mut heap,
        BUCKET,
        MAX_HEAP,
    )
    .unwrap();
    let data = heap.read_value(arr.short_ptr_offset() + ARRAY_DATA);
    let slot = heap.read_value(data.short_ptr_offset() + 3 * 2);
    assert_eq!(slot, Value::DELETED);
}

#[test]
fn writing_proto_on_array_is_readonly() {
    let mut heap = Heap::new();
    let arr = new_empty_array(&mut heap);
    let err =
        set_property_array(arr, Value::STR_PROTO, Value::NULL, &mut heap, BUCKET, MAX_HEAP)
            .unwrap_err();
    assert_eq!(err, Error::ProtoIsReadonly);
}

#[test]
fn grow_array_doubles_and_fills_new_slots_with_deleted() {
    let mut heap = Heap::new();
    let grown = grow_array(Value::NULL, 1, &mut heap, BUCKET, MAX_HEAP).unwrap();
    let capacity = heap.payload_size_at(grown.short_ptr_offset()) / 2;
    assert_eq!(capacity, MIN_ARRAY_CAPACITY);
    for i in 0..capacity {
        assert_eq!(
            heap.read_value(grown.short_ptr_offset() + i * 2),
            Value::DELETED
        );
    }
}

#[test]
fn non_pointer_receiver_is_a_type_error() {
    let heap = Heap::new();
    let err = get_property(Value::int14(5), Value::STR_LENGTH, &heap).unwrap_err();
    assert_eq!(err, Error::TypeError);
}

#[test]
fn set_property_on_a_rom_object_is_rejected() {
    let mut heap = Heap::new();
    let mut table = InternTable::default();
    let rom_object = Value::bytecode_mapped_ptr(64);
    let err = set_property(
        rom_object,
        Value::STR_LENGTH,
        Value::int14(1),
        &mut table,
        &mut heap,
        &[],
        BUCKET,
        MAX_HEAP,
    )
    .unwrap_err();
    assert_eq!(err, Error::AttemptToWriteToRom);
}
