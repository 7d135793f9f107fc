// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Integer-fast-path / float-fallback arithmetic (§4.5 "Arithmetic").

use crate::bytecode::op::{BitOp, NumOp};
use crate::heap::{Heap, TypeCode};
use crate::value::{self, Value};
use crate::Error;

/// Decode a value to `f64` for the float fallback path. Any representable
/// number decodes cleanly; anything else is a type error.
fn as_f64(v: Value, heap: &Heap) -> Result<f64, Error> {
    if v.is_int14() {
        return Ok(f64::from(v.decode_int14()));
    }
    if v == Value::NAN {
        return Ok(f64::NAN);
    }
    if v == Value::NEG_ZERO {
        return Ok(-0.0);
    }
    if v.is_short_ptr() {
        return match heap.type_code_at(v.short_ptr_offset()) {
            TypeCode::Int32 => Ok(f64::from(heap.read_int32(v.short_ptr_offset()))),
            TypeCode::Float64 => Ok(heap.read_float64(v.short_ptr_offset())),
            _ => Err(Error::TypeError),
        };
    }
    Err(Error::TypeError)
}

/// Decode a value to an exact `i32`, for the integer fast path. Returns
/// `None` (not an error) when the value is numeric but not exactly
/// representable as `i32` (e.g. a non-integral float), signaling "fall
/// through to the float path" rather than "wrong type".
fn as_i32_exact(v: Value, heap: &Heap) -> Result<Option<i32>, Error> {
    if v.is_int14() {
        return Ok(Some(i32::from(v.decode_int14())));
    }
    if v.is_short_ptr() {
        return match heap.type_code_at(v.short_ptr_offset()) {
            TypeCode::Int32 => Ok(Some(heap.read_int32(v.short_ptr_offset()))),
            TypeCode::Float64 => {
                Ok(value::int32_fits_f64_exactly(heap.read_float64(v.short_ptr_offset())))
            }
            _ => Err(Error::TypeError),
        };
    }
    if v == Value::NAN || v == Value::NEG_ZERO {
        return Ok(None);
    }
    Err(Error::TypeError)
}

fn make_number(
    f: f64,
    heap: &mut Heap,
    bucket_size: u16,
    max_heap_size: u16,
) -> Result<Value, Error> {
    heap.make_number(f, bucket_size, max_heap_size)
        .ok_or(Error::OutOfMemory)
}

fn make_int32(
    n: i32,
    heap: &mut Heap,
    bucket_size: u16,
    max_heap_size: u16,
) -> Result<Value, Error> {
    heap.make_int32(n, bucket_size, max_heap_size)
        .ok_or(Error::OutOfMemory)
}

/// Apply a binary [`NumOp`] to two operands. Mirrors the reference
/// interpreter's two-pass dispatch: try the int32 fast path first
/// (masking overflow checks behind float availability, since a no-float
/// build never sees bytecode that could trigger them — the loader
/// rejects any image requiring float support), falling back to f64 only
/// when an operand isn't cleanly an integer or the op is inherently
/// float (`Divide`, `Power`).
pub fn apply_num_op(
    op: NumOp,
    a: Value,
    b: Value,
    heap: &mut Heap,
    bucket_size: u16,
    max_heap_size: u16,
) -> Result<Value, Error> {
    debug_assert!(!op.is_unary());
    let ints = match (as_i32_exact(a, heap)?, as_i32_exact(b, heap)?) {
        (Some(ia), Some(ib)) => Some((ia, ib)),
        _ => None,
    };
    match op {
        NumOp::LessThan | NumOp::GreaterThan | NumOp::LessEqual | NumOp::GreaterEqual => {
            let result = if let Some((ia, ib)) = ints {
                match op {
                    NumOp::LessThan => ia < ib,
                    NumOp::GreaterThan => ia > ib,
                    NumOp::LessEqual => ia <= ib,
                    NumOp::GreaterEqual => ia >= ib,
                    _ => unreachable!(),
                }
            } else {
                let (fa, fb) = (as_f64(a, heap)?, as_f64(b, heap)?);
                match op {
                    NumOp::LessThan => fa < fb,
                    NumOp::GreaterThan => fa > fb,
                    NumOp::LessEqual => fa <= fb,
                    NumOp::GreaterEqual => fa >= fb,
                    _ => unreachable!(),
                }
            };
            Ok(Value::bool(result))
        }
        NumOp::Add | NumOp::Subtract | NumOp::Multiply => {
            if let Some((ia, ib)) = ints {
                let checked = match op {
                    NumOp::Add => ia.checked_add(ib),
                    NumOp::Subtract => ia.checked_sub(ib),
                    NumOp::Multiply => ia.checked_mul(ib),
                    _ => unreachable!(),
                };
                match checked {
                    Some(n) => return make_int32(n, heap, bucket_size, max_heap_size),
                    None if !cfg!(feature = "float") => {
                        let wrapped = match op {
                            NumOp::Add => ia.wrapping_add(ib),
                            NumOp::Subtract => ia.wrapping_sub(ib),
                            NumOp::Multiply => ia.wrapping_mul(ib),
                            _ => unreachable!(),
                        };
                        return make_int32(wrapped, heap, bucket_size, max_heap_size);
                    }
                    None => {}
                }
            } else if !cfg!(feature = "float") {
                return Err(Error::OperationRequiresFloatSupport);
            }
            let (fa, fb) = (as_f64(a, heap)?, as_f64(b, heap)?);
            let result = match op {
                NumOp::Add => fa + fb,
                NumOp::Subtract => fa - fb,
                NumOp::Multiply => fa * fb,
                _ => unreachable!(),
            };
            make_number(result, heap, bucket_size, max_heap_size)
        }
        NumOp::Divide => {
            if !cfg!(feature = "float") {
                return Err(Error::OperationRequiresFloatSupport);
            }
            let (fa, fb) = (as_f64(a, heap)?, as_f64(b, heap)?);
            make_number(fa / fb, heap, bucket_size, max_heap_size)
        }
        NumOp::DivideAndTrunc => {
            if let Some((ia, ib)) = ints {
                let n = if ib == 0 { 0 } else { ia.wrapping_div(ib) };
                return make_int32(n, heap, bucket_size, max_heap_size);
            }
            if !cfg!(feature = "float") {
                return Err(Error::OperationRequiresFloatSupport);
            }
            let (fa, fb) = (as_f64(a, heap)?, as_f64(b, heap)?);
            let truncated = if fb == 0.0 { 0.0 } else { (fa / fb).trunc() };
            make_number(truncated, heap, bucket_size, max_heap_size)
        }
        NumOp::Remainder => {
            if let Some((ia, ib)) = ints {
                if ib == 0 {
                    return Ok(Value::NAN);
                }
                return make_int32(ia.wrapping_rem(ib), heap, bucket_size, max_heap_size);
            }
            if !cfg!(feature = "float") {
                return Err(Error::OperationRequiresFloatSupport);
            }
            let (fa, fb) = (as_f64(a, heap)?, as_f64(b, heap)?);
            if fb == 0.0 {
                return Ok(Value::NAN);
            }
            make_number(fa % fb, heap, bucket_size, max_heap_size)
        }
        NumOp::Power => {
            if !cfg!(feature = "float") {
                return Err(Error::OperationRequiresFloatSupport);
            }
            let (fa, fb) = (as_f64(a, heap)?, as_f64(b, heap)?);
            make_number(fa.powf(fb), heap, bucket_size, max_heap_size)
        }
        NumOp::Negate | NumOp::UnaryPlus => unreachable!("unary op passed to apply_num_op"),
    }
}

/// Apply a unary [`NumOp`] (`Negate`, `UnaryPlus`) to one operand.
pub fn apply_num_op_unary(
    op: NumOp,
    a: Value,
    heap: &mut Heap,
    bucket_size: u16,
    max_heap_size: u16,
) -> Result<Value, Error> {
    debug_assert!(op.is_unary());
    match op {
        NumOp::UnaryPlus => Ok(a),
        NumOp::Negate => {
            // Negating 0 or i32::MIN can't be represented as a plain
            // int32 (−0, or overflow): both require the float path.
            if let Some(ia) = as_i32_exact(a, heap)? {
                if ia != 0 && ia != i32::MIN {
                    return make_int32(-ia, heap, bucket_size, max_heap_size);
                }
                if !cfg!(feature = "float") {
                    return make_int32(ia.wrapping_neg(), heap, bucket_size, max_heap_size);
                }
            } else if !cfg!(feature = "float") {
                return Err(Error::OperationRequiresFloatSupport);
            }
            let fa = as_f64(a, heap)?;
            make_number(-fa, heap, bucket_size, max_heap_size)
        }
        _ => unreachable!("binary op passed to apply_num_op_unary"),
    }
}

/// Apply a binary [`BitOp`] to two operands; both decode to `i32` (no
/// implicit float coercion applies here outside the logical-shift
/// overflow case).
pub fn apply_bit_op(
    op: BitOp,
    a: Value,
    b: Value,
    heap: &mut Heap,
    bucket_size: u16,
    max_heap_size: u16,
) -> Result<Value, Error> {
    debug_assert!(!op.is_unary());
    let ia = as_i32_exact(a, heap)?.ok_or(Error::TypeError)?;
    let ib = as_i32_exact(b, heap)?.ok_or(Error::TypeError)?;
    let shift = (ib & 0x1F) as u32;
    match op {
        BitOp::ShrArithmetic => make_int32(ia >> shift, heap, bucket_size, max_heap_size),
        BitOp::Shl => make_int32(ia << shift, heap, bucket_size, max_heap_size),
        BitOp::Or => make_int32(ia | ib, heap, bucket_size, max_heap_size),
        BitOp::And => make_int32(ia & ib, heap, bucket_size, max_heap_size),
        BitOp::Xor => make_int32(ia ^ ib, heap, bucket_size, max_heap_size),
        BitOp::ShrLogical => {
            let result = (ia as u32) >> shift;
            if result <= i32::MAX as u32 {
                make_int32(result as i32, heap, bucket_size, max_heap_size)
            } else if cfg!(feature = "float") {
                make_number(f64::from(result), heap, bucket_size, max_heap_size)
            } else {
                Err(Error::OperationRequiresFloatSupport)
            }
        }
        BitOp::Not => unreachable!("unary op passed to apply_bit_op"),
    }
}

/// Apply the unary [`BitOp`] (`Not`) to one operand.
pub fn apply_bit_op_unary(
    op: BitOp,
    a: Value,
    heap: &mut Heap,
    bucket_size: u16,
    max_heap_size: u16,
) -> Result<Value, Error> {
    debug_assert!(op.is_unary());
    let ia = as_i32_exact(a, heap)?.ok_or(Error::TypeError)?;
    make_int32(!ia, heap, bucket_size, max_heap_size)
}
