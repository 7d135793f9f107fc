// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Property protocol (§4.7): `get_property`/`set_property` dispatch by
//! receiver type, plus `grow_array`.

#[cfg(test)]
mod property_test;

use crate::heap::{Heap, TypeCode};
use crate::intern::{self, InternTable};
use crate::value::Value;
use crate::Error;

/// `PROPERTY_LIST` layout: `{ next: Value, proto: Value, (key, value)* }`.
const PROP_LIST_NEXT: u16 = 0;
const PROP_LIST_PROTO: u16 = 2;
const PROP_LIST_PAIRS_START: u16 = 4;

/// `ARRAY` layout: `{ data: Value, length: Value }`.
const ARRAY_DATA: u16 = 0;
const ARRAY_LENGTH: u16 = 2;

/// `CLOSURE` layout: `{ target: Value, scope: Value, props: Value, this_: Value }`.
const CLOSURE_PROPS: u16 = 4;

/// Minimum capacity (in slots) a freshly grown array backing store gets.
const MIN_ARRAY_CAPACITY: u16 = 4;

fn property_list_lookup(heap: &Heap, mut group: Value, key: Value) -> Option<Value> {
    loop {
        let offset = group.short_ptr_offset();
        let payload_len = heap.payload_size_at(offset);
        let pair_count = (payload_len - PROP_LIST_PAIRS_START) / 4;
        for i in 0..pair_count {
            let pair_offset = offset + PROP_LIST_PAIRS_START + i * 4;
            if heap.read_value(pair_offset) == key {
                return Some(heap.read_value(pair_offset + 2));
            }
        }
        let next = heap.read_value(offset + PROP_LIST_NEXT);
        if next == Value::NULL {
            return None;
        }
        group = next;
    }
}

fn property_list_head_proto(heap: &Heap, head: Value) -> Value {
    heap.read_value(head.short_ptr_offset() + PROP_LIST_PROTO)
}

/// `get_property(obj, key)` (§4.7 step 2). `key` must already be a
/// normalized property name (see [`crate::intern::to_property_name`]).
pub fn get_property(obj: Value, key: Value, heap: &Heap) -> Result<Value, Error> {
    if !obj.is_short_ptr() {
        return Err(Error::TypeError);
    }
    match heap.type_code_at(obj.short_ptr_offset()) {
        TypeCode::PropertyList => {
            if let Some(v) = property_list_lookup(heap, obj, key) {
                return Ok(v);
            }
            if key == Value::STR_PROTO {
                return Ok(Value::NULL);
            }
            let proto = property_list_head_proto(heap, obj);
            if proto == Value::NULL {
                return Ok(Value::UNDEFINED);
            }
            get_property(proto, key, heap)
        }
        TypeCode::Array => {
            if key == Value::STR_LENGTH {
                return Ok(heap.read_value(obj.short_ptr_offset() + ARRAY_LENGTH));
            }
            if key == Value::STR_PROTO {
                // Array.prototype is a builtin the loader resolves; callers
                // without a builtins table treat it as null, matching "no
                // further properties" rather than erroring.
                return Ok(Value::NULL);
            }
            if key.is_int14() && key.decode_int14() >= 0 {
                let index = key.decode_int14() as u16;
                let data = heap.read_value(obj.short_ptr_offset() + ARRAY_DATA);
                if data == Value::NULL {
                    return Ok(Value::UNDEFINED);
                }
                let capacity = heap.payload_size_at(data.short_ptr_offset()) / 2;
                if index >= capacity {
                    return Ok(Value::UNDEFINED);
                }
                let slot = heap.read_value(data.short_ptr_offset() + index * 2);
                return Ok(if slot == Value::DELETED {
                    Value::UNDEFINED
                } else {
                    slot
                });
            }
            Ok(Value::UNDEFINED)
        }
        TypeCode::Closure => {
            let props = heap.read_value(obj.short_ptr_offset() + CLOSURE_PROPS);
            get_property(props, key, heap)
        }
        _ => Err(Error::TypeError),
    }
}

/// `set_property(obj, key, val)` for `PROPERTY_LIST` (§4.7).
pub fn set_property_list(
    obj: Value,
    key: Value,
    val: Value,
    heap: &mut Heap,
    bucket_size: u16,
    max_heap_size: u16,
) -> Result<(), Error> {
    let mut group = obj;
    loop {
        let offset = group.short_ptr_offset();
        let payload_len = heap.payload_size_at(offset);
        let pair_count = (payload_len - PROP_LIST_PAIRS_START) / 4;
        for i in 0..pair_count {
            let pair_offset = offset + PROP_LIST_PAIRS_START + i * 4;
            if heap.read_value(pair_offset) == key {
                heap.write_value(pair_offset + 2, val);
                return Ok(());
            }
        }
        let next = heap.read_value(offset + PROP_LIST_NEXT);
        if next == Value::NULL {
            let cell = heap
                .try_allocate(
                    PROP_LIST_PAIRS_START + 4,
                    TypeCode::PropertyList,
                    bucket_size,
                    max_heap_size,
                )
                .ok_or(Error::OutOfMemory)?;
            let cell_offset = cell.short_ptr_offset();
            heap.write_value(cell_offset + PROP_LIST_NEXT, Value::NULL);
            heap.write_value(cell_offset + PROP_LIST_PROTO, Value::NULL);
            heap.write_value(cell_offset + PROP_LIST_PAIRS_START, key);
            heap.write_value(cell_offset + PROP_LIST_PAIRS_START + 2, val);
            heap.write_value(offset + PROP_LIST_NEXT, cell);
            return Ok(());
        }
        group = next;
    }
}

/// `grow_array`: doubles capacity (minimum [`MIN_ARRAY_CAPACITY`], at
/// least `needed`), filling new slots with [`Value::DELETED`]. Returns
/// the new backing-store `Value`.
pub fn grow_array(
    old_data: Value,
    needed: u16,
    heap: &mut Heap,
    bucket_size: u16,
    max_heap_size: u16,
) -> Result<Value, Error> {
    let old_capacity = if old_data == Value::NULL {
        0
    } else {
        heap.payload_size_at(old_data.short_ptr_offset()) / 2
    };
    let mut new_capacity = old_capacity.max(MIN_ARRAY_CAPACITY / 2).saturating_mul(2);
    new_capacity = new_capacity.max(needed).max(MIN_ARRAY_CAPACITY);
    let payload_size = new_capacity
        .checked_mul(2)
        .ok_or(Error::ArrayTooLong)?;
    let new_data = heap
        .try_allocate(
            payload_size,
            TypeCode::FixedLengthArray,
            bucket_size,
            max_heap_size,
        )
        .ok_or(Error::OutOfMemory)?;
    let new_offset = new_data.short_ptr_offset();
    for i in 0..old_capacity {
        let v = heap.read_value(old_data.short_ptr_offset() + i * 2);
        heap.write_value(new_offset + i * 2, v);
    }
    for i in old_capacity..new_capacity {
        heap.write_value(new_offset + i * 2, Value::DELETED);
    }
    Ok(new_data)
}

/// `set_property(obj, key, val)` for `ARRAY` (§4.7).
#[allow(clippy::too_many_arguments)]
pub fn set_property_array(
    obj: Value,
    key: Value,
    val: Value,
    heap: &mut Heap,
    bucket_size: u16,
    max_heap_size: u16,
) -> Result<(), Error> {
    let obj_offset = obj.short_ptr_offset();
    if key == Value::STR_PROTO {
        return Err(Error::ProtoIsReadonly);
    }
    if key == Value::STR_LENGTH {
        let new_len = if val.is_int14() && val.decode_int14() >= 0 {
            val.decode_int14() as u16
        } else {
            return Err(Error::TypeError);
        };
        let old_len_value = heap.read_value(obj_offset + ARRAY_LENGTH);
        let old_len = old_len_value.decode_int14().max(0) as u16;
        let data = heap.read_value(obj_offset + ARRAY_DATA);
        let capacity = if data == Value::NULL {
            0
        } else {
            heap.payload_size_at(data.short_ptr_offset()) / 2
        };
        if new_len < old_len {
            for i in new_len..old_len {
                heap.write_value(data.short_ptr_offset() + i * 2, Value::DELETED);
            }
        } else if new_len > capacity {
            let grown = grow_array(data, new_len, heap, bucket_size, max_heap_size)?;
            heap.write_value(obj_offset + ARRAY_DATA, grown);
        }
        heap.write_value(obj_offset + ARRAY_LENGTH, Value::int14(new_len as i16));
        return Ok(());
    }
    if key.is_int14() && key.decode_int14() >= 0 {
        let index = key.decode_int14() as u16;
        let data = heap.read_value(obj_offset + ARRAY_DATA);
        let capacity = if data == Value::NULL {
            0
        } else {
            heap.payload_size_at(data.short_ptr_offset()) / 2
        };
        let data = if index >= capacity {
            let grown = grow_array(data, index + 1, heap, bucket_size, max_heap_size)?;
            heap.write_value(obj_offset + ARRAY_DATA, grown);
            grown
        } else {
            data
        };
        heap.write_value(data.short_ptr_offset() + index * 2, val);
        let len_value = heap.read_value(obj_offset + ARRAY_LENGTH);
        if index as i16 >= len_value.decode_int14() {
            heap.write_value(obj_offset + ARRAY_LENGTH, Value::int14(index as i16 + 1));
        }
        return Ok(());
    }
    // Any other non-index, non-length property on an array is ignored.
    Ok(())
}

/// `set_property(obj, key, val)` dispatch by receiver type.
#[allow(clippy::too_many_arguments)]
pub fn set_property(
    obj: Value,
    key_raw: Value,
    val: Value,
    table: &mut InternTable,
    heap: &mut Heap,
    rom_table: &[(&str, Value)],
    bucket_size: u16,
    max_heap_size: u16,
) -> Result<(), Error> {
    if !obj.is_short_ptr() {
        if obj.is_handle_or_wellknown() && !obj.is_wellknown() {
            return Err(Error::AttemptToWriteToRom);
        }
        return Err(Error::TypeError);
    }
    let key = intern::to_property_name(key_raw, table, heap, rom_table, bucket_size, max_heap_size)?;
    match heap.type_code_at(obj.short_ptr_offset()) {
        TypeCode::PropertyList => set_property_list(obj, key, val, heap, bucket_size, max_heap_size),
        TypeCode::Array => set_property_array(obj, key, val, heap, bucket_size, max_heap_size),
        TypeCode::Closure => {
            let props = heap.read_value(obj.short_ptr_offset() + CLOSURE_PROPS);
            set_property_list(props, key, val, heap, bucket_size, max_heap_size)
        }
        _ => Err(Error::TypeError),
    }
}
