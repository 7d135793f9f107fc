// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

use super::*;
use crate::bytecode::op::{BitOp, NumOp};
use crate::bytecode::HEADER_FIXED_SIZE;
use crate::heap::TypeCode;
use crate::platform::MockHostPort;

fn empty_header() -> BytecodeHeader {
    BytecodeHeader {
        bytecode_version: 1,
        header_size: HEADER_FIXED_SIZE as u8,
        bytecode_size: HEADER_FIXED_SIZE as u16,
        crc: 0,
        required_feature_flags: 0,
        section_offsets: [HEADER_FIXED_SIZE as u16; crate::bytecode::SECTION_COUNT],
    }
}

fn test_vm(image: &[u8]) -> Vm<'_, MockHostPort> {
    Vm::from_parts(
        image,
        empty_header(),
        Vec::new(),
        Vec::new(),
        Vec::new(),
        Heap::new(),
        VmConfig::new(),
        MockHostPort::new(),
    )
}

struct DoubleItHost;

impl HostFunction for DoubleItHost {
    fn call(&self, args: &[Value], heap: &mut Heap) -> Result<Value, Error> {
        let n = arithmetic::apply_num_op(
            NumOp::Add,
            args[0],
            args[0],
            heap,
            DEFAULT_ALLOCATION_BUCKET_SIZE,
            DEFAULT_MAX_HEAP_SIZE,
        )?;
        Ok(n)
    }
}

use crate::config::{DEFAULT_ALLOCATION_BUCKET_SIZE, DEFAULT_MAX_HEAP_SIZE};

#[test]
fn push_pop_roundtrip() {
    let mut vm = test_vm(&[]);
    vm.push(Value::int14(42));
    assert_eq!(vm.pop().unwrap(), Value::int14(42));
    assert_eq!(vm.pop(), Err(Error::Unexpected));
}

#[test]
fn enter_frame_then_return_restores_caller_state() {
    // Function body: a single-byte maxStackDepth header (0) is all a
    // function needs to be a valid call target for this test; the
    // interpreter never fetches past it here since we drive `do_return`
    // directly rather than running the dispatch loop.
    let image = [0u8; 4];
    let mut vm = test_vm(&image);
    vm.push(Value::UNDEFINED); // callable slot (unused by enter_frame directly)
    vm.push(Value::int14(7)); // one argument
    let caller_pc = 3;
    vm.pc = caller_pc;
    vm.enter_frame(0, 1, caller_pc).unwrap();
    assert_eq!(vm.fp, 5); // 2 pre-pushed words + the 3-word saved triple
    vm.push(Value::int14(99)); // the "result" RETURN_1 would pop
    let outcome = vm
        .do_return(ReturnShape {
            pop_result: true,
            pop_function_ref: false,
        })
        .unwrap();
    assert_eq!(outcome, None); // caller_pc != PC_SENTINEL
    assert_eq!(vm.pc, caller_pc);
    assert_eq!(vm.pop().unwrap(), Value::int14(99));
}

#[test]
fn return_to_sentinel_stops_the_run_loop() {
    let image = [0u8; 4];
    let mut vm = test_vm(&image);
    vm.push(Value::UNDEFINED);
    vm.enter_frame(0, 0, PC_SENTINEL).unwrap();
    vm.push(Value::int14(5));
    let outcome = vm
        .do_return(ReturnShape {
            pop_result: true,
            pop_function_ref: false,
        })
        .unwrap();
    assert_eq!(outcome, Some(Value::int14(5)));
    assert_eq!(vm.pc, PC_SENTINEL);
}

#[test]
fn call_dispatches_to_a_vm_function_via_rom_bytecode_mapped_ptr() {
    // ROM section starts right after the header; a function living there
    // at offset `rom_start` whose body is RETURN_1 (pop a result, return).
    let rom_start = HEADER_FIXED_SIZE as u16;
    let mut header = empty_header();
    header.section_offsets[crate::bytecode::Section::Rom as usize] = rom_start;
    header.section_offsets[crate::bytecode::Section::Globals as usize] = rom_start + 4;
    header.bytecode_size = rom_start + 4;

    let mut image = vec![0u8; rom_start as usize];
    image.push(0); // maxStackDepth
    // arg[0] is the synthesized receiver (`undefined`); the real argument
    // sits at arg[1].
    image.push(op::pack(Primary::LoadArg1, 1));
    image.push(op::pack(Primary::Return, ReturnShape { pop_result: true, pop_function_ref: false }.to_nibble()));
    image.push(0); // pad up to Globals offset

    let mut vm = Vm::from_parts(
        &image,
        header,
        Vec::new(),
        Vec::new(),
        Vec::new(),
        Heap::new(),
        VmConfig::new(),
        MockHostPort::new(),
    );

    let func = Value::bytecode_mapped_ptr(rom_start);
    let result = vm.call(func, &[Value::int14(11)]).unwrap();
    assert_eq!(result, Value::int14(11));
}

#[test]
fn call_dispatches_to_a_host_function() {
    let mut vm = test_vm(&[]);
    vm.imports.push(Box::new(DoubleItHost));
    // Manually install a HOST_FUNC allocation so `classify_callable` sees
    // a TypeCode::HostFunc target at a ShortPtr.
    let host_ref = vm
        .heap
        .try_allocate(2, TypeCode::HostFunc, 64, 4096)
        .unwrap();
    vm.heap.write_u16(host_ref.short_ptr_offset(), 0);

    let result = vm.call(host_ref, &[Value::int14(21)]).unwrap();
    assert_eq!(result, Value::int14(42));
}

#[test]
fn closure_call_redirects_through_scope_and_target() {
    let mut vm = test_vm(&[]);
    vm.imports.push(Box::new(DoubleItHost));
    let host_ref = vm
        .heap
        .try_allocate(2, TypeCode::HostFunc, 64, 4096)
        .unwrap();
    vm.heap.write_u16(host_ref.short_ptr_offset(), 0);

    let closure = vm
        .heap
        .try_allocate(8, TypeCode::Closure, 64, 4096)
        .unwrap();
    let offset = closure.short_ptr_offset();
    vm.heap.write_value(offset, host_ref); // target
    vm.heap.write_value(offset + 2, Value::int14(0)); // scope
    vm.heap.write_value(offset + 4, Value::NULL); // props
    vm.heap.write_value(offset + 6, Value::NULL); // this_

    let result = vm.call(closure, &[Value::int14(5)]).unwrap();
    assert_eq!(result, Value::int14(10));
}

#[test]
fn num_op_add_takes_the_integer_fast_path() {
    let mut vm = test_vm(&[]);
    vm.push(Value::int14(2));
    vm.push(Value::int14(3));
    vm.num_op(NumOp::Add as u8).unwrap();
    assert_eq!(vm.pop().unwrap(), Value::int14(5));
}

#[test]
#[cfg(feature = "float")]
fn num_op_add_overflows_to_boxed_float() {
    let mut vm = test_vm(&[]);
    let big = vm.heap.alloc_int32(i32::MAX, 64, 4096).unwrap();
    vm.push(big);
    vm.push(Value::int14(1));
    vm.num_op(NumOp::Add as u8).unwrap();
    let result = vm.pop().unwrap();
    assert_eq!(vm.heap.type_code_at(result.short_ptr_offset()), TypeCode::Float64);
}

#[test]
fn num_op_divide_and_trunc_by_zero_yields_zero() {
    let mut vm = test_vm(&[]);
    vm.push(Value::int14(7));
    vm.push(Value::int14(0));
    vm.num_op(NumOp::DivideAndTrunc as u8).unwrap();
    assert_eq!(vm.pop().unwrap(), Value::int14(0));
}

#[test]
fn num_op_remainder_by_zero_yields_nan() {
    let mut vm = test_vm(&[]);
    vm.push(Value::int14(7));
    vm.push(Value::int14(0));
    vm.num_op(NumOp::Remainder as u8).unwrap();
    assert_eq!(vm.pop().unwrap(), Value::NAN);
}

#[test]
fn bit_op_and_or_xor_not() {
    let mut vm = test_vm(&[]);
    vm.push(Value::int14(0b110));
    vm.push(Value::int14(0b011));
    vm.bit_op(BitOp::And as u8).unwrap();
    assert_eq!(vm.pop().unwrap(), Value::int14(0b010));

    vm.push(Value::int14(5));
    vm.bit_op(BitOp::Not as u8).unwrap();
    assert_eq!(vm.pop().unwrap(), Value::int14(!5));
}

#[test]
fn to_bool_matches_falsy_and_truthy_rules() {
    let mut vm = test_vm(&[]);
    assert!(!vm.to_bool(Value::FALSE));
    assert!(!vm.to_bool(Value::UNDEFINED));
    assert!(!vm.to_bool(Value::NULL));
    assert!(!vm.to_bool(Value::NAN));
    assert!(!vm.to_bool(Value::NEG_ZERO));
    assert!(vm.to_bool(Value::TRUE));
    assert!(!vm.to_bool(Value::int14(0)));
    assert!(vm.to_bool(Value::int14(1)));

    let empty = vm.heap.alloc_string("", 64, 4096).unwrap();
    assert!(!vm.to_bool(empty));
    let nonempty = vm.heap.alloc_string("x", 64, 4096).unwrap();
    assert!(vm.to_bool(nonempty));
}

#[test]
fn add_concatenates_when_either_operand_is_a_string() {
    let mut vm = test_vm(&[]);
    let hello = vm.heap.alloc_string("hello ", 64, 4096).unwrap();
    let world = vm.heap.alloc_string("world", 64, 4096).unwrap();
    vm.push(hello);
    vm.push(world);
    vm.add().unwrap();
    let result = vm.pop().unwrap();
    assert_eq!(vm.heap.read_str(result.short_ptr_offset()), "hello world");
}

#[test]
fn object_new_set_get_roundtrip() {
    let mut vm = test_vm(&[]);
    vm.object_new().unwrap();
    let obj = vm.pop().unwrap();
    let key = vm.heap.alloc_string("x", 64, 4096).unwrap();
    vm.set_property_dispatch(obj, key, Value::int14(7)).unwrap();
    let key2 = vm.heap.alloc_string("x", 64, 4096).unwrap();
    let v = property::get_property(
        obj,
        vm.to_property_name(key2).unwrap(),
        &vm.heap,
    )
    .unwrap();
    assert_eq!(v, Value::int14(7));
}

#[test]
fn array_new_set_get_grows_backing_store() {
    let mut vm = test_vm(&[]);
    vm.array_new(0).unwrap();
    let arr = vm.pop().unwrap();
    vm.array_set_direct(arr, 5, Value::int14(9)).unwrap();
    let v = property::get_property(arr, Value::int14(5), &vm.heap).unwrap();
    assert_eq!(v, Value::int14(9));
    let len = property::get_property(arr, Value::STR_LENGTH, &vm.heap).unwrap();
    assert_eq!(len, Value::int14(6));
}

impl<'img, P: HostPort> Vm<'img, P> {
    /// Test helper: exercise `set_property_array` without going through
    /// the stack-based `ARRAY_SET_1` opcode plumbing.
    fn array_set_direct(&mut self, arr: Value, index: u16, val: Value) -> Result<(), Error> {
        self.set_property_dispatch(arr, Value::int14(index as i16), val)
    }
}

#[test]
fn logical_not_inverts_truthiness() {
    let mut vm = test_vm(&[]);
    vm.push(Value::TRUE);
    let v = vm.pop().unwrap();
    vm.push(Value::bool(!vm.to_bool(v)));
    assert_eq!(vm.pop().unwrap(), Value::FALSE);
}

#[test]
fn instruction_limit_exhausted_returns_dedicated_error() {
    let image = [op::pack(Primary::LoadSmallLiteral, 4)]; // push 0, loop forever below
    let mut vm = test_vm(&image);
    vm.config.instruction_limit = Some(0);
    vm.pc = 0;
    let err = vm.run().unwrap_err();
    assert_eq!(err, Error::InstructionCountExceeded);
}
