// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Host-call trampoline (§4.6): marshaling between bytecode and
//! host-provided native functions.


use crate::heap::{Heap, TypeCode};
use crate::value::Value;
use crate::Error;

/// A resolved host function, as stored in the VM's import-table slab
/// after [`crate::loader`] resolves every `IMPORT_TABLE` entry.
///
/// Implementors may reenter the VM (e.g. via `Vm::call`) from within
/// `call`; the trampoline already saved the caller's frame before
/// invoking this.
pub trait HostFunction {
    /// Invoke the host function with already-sanitized arguments,
    /// producing a result value or a host-reported error.
    fn call(&self, args: &[Value], heap: &mut Heap) -> Result<Value, Error>;
}

/// Signature the loader uses to resolve each `IMPORT_TABLE` entry (§4.4
/// step 5) into a concrete host function.
pub trait ImportResolver {
    /// Resolve `host_function_id` to a callable, or `None` if this host
    /// doesn't provide it (maps to [`Error::UnresolvedImport`]).
    fn resolve_import(&self, host_function_id: u16) -> Option<&dyn HostFunction>;
}

/// Sanitize one argument before handing it to a host function (§4.6 step
/// 3): function/object/array values are replaced with `undefined` so
/// hosts never observe GC object identity through the host ABI.
#[must_use]
pub fn sanitize_arg(v: Value, heap: &Heap) -> Value {
    if !v.is_short_ptr() {
        return v;
    }
    match heap.type_code_at(v.short_ptr_offset()) {
        TypeCode::Function | TypeCode::PropertyList | TypeCode::Array | TypeCode::Closure => {
            Value::UNDEFINED
        }
        _ => v,
    }
}

/// Sanitize a full argument slice in place before a `CALL_HOST`
/// dispatch.
pub fn sanitize_args(args: &mut [Value], heap: &Heap) {
    for arg in args.iter_mut() {
        *arg = sanitize_arg(*arg, heap);
    }
}

/// Validate a value a host function returned (§7): a `ShortPtr` must
/// actually fall inside the live heap, guarding against a stale or
/// foreign `Value` leaking back from the host.
#[must_use]
pub fn validate_host_result(v: Value, heap: &Heap) -> Result<Value, Error> {
    if v.is_short_ptr() && v.short_ptr_offset() >= heap.heap_size() {
        return Err(Error::HostReturnedInvalidValue);
    }
    Ok(v)
}
