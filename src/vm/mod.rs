// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Interpreter core (§4.5): frame management and the fetch/dispatch loop
//! tying the heap, property, equality, intern, and host-call-trampoline
//! modules into a running VM.

mod arithmetic;
#[cfg(test)]
mod vm_test;

#[cfg(not(any(test, feature = "std")))]
use alloc::boxed::Box;
#[cfg(not(any(test, feature = "std")))]
use alloc::string::String;
#[cfg(not(any(test, feature = "std")))]
use alloc::vec::Vec;

use crate::bytecode::op::{self, Primary, ReturnShape, Secondary, SmallLiteral};
use crate::bytecode::{BytecodeHeader, Section};
use crate::equality;
use crate::heap::{Heap, TypeCode};
use crate::host::HostFunction;
use crate::intern::{self, InternTable};
use crate::platform::HostPort;
use crate::property;
use crate::value::Value;
use crate::{Error, VmConfig};

/// PC value denoting "outside the VM": the bytecode image's own base
/// offset. A `RETURN` that restores PC to this sentinel ends the run
/// loop (§4.5 "Frame layout"), and it is also the PC a host-call frame
/// is entered with so a nested `call` is recognized as a fresh entry
/// (§4.6).
pub const PC_SENTINEL: u16 = 0;

/// Number of stack words the frame-save triple occupies, per call.
const FRAME_SAVE_SIZE_WORDS: usize = 3;

/// `CLOSURE` layout offsets, shared with [`crate::property`].
const CLOSURE_TARGET: u16 = 0;
const CLOSURE_SCOPE: u16 = 2;

/// A resolved call target, after unwrapping any closure indirection
/// (§4.5 "Call dispatch").
enum CallTarget {
    /// A VM function: bytecode offset of its one-byte `maxStackDepth`
    /// header, instructions immediately following.
    Function(u16),
    /// An index into the VM's resolved import-table slab.
    Host(u16),
}

/// One short-call table entry (§6.3): a compressed call site reached
/// via `CALL_1`.
struct ShortCallEntry {
    /// VM function offset, or import-table index when `is_host`.
    target: u16,
    arg_count: u8,
    is_host: bool,
}

/// The running state of one VM instance: an immutable bytecode image
/// plus all of the mutable state a call into it can observe or touch.
///
/// Unlike the reference port's free functions over a `VM*`, this is a
/// stateful struct: the import-table slab, globals, and heap are VM
/// record fields per §4.4 step 4 rather than a separately threaded
/// context, so giving them a home on `Self` avoids re-deriving their
/// relationship to `image`/`header` at every call site.
pub struct Vm<'img, P: HostPort> {
    image: &'img [u8],
    header: BytecodeHeader,
    globals: Vec<Value>,
    imports: Vec<Box<dyn HostFunction + 'img>>,
    rom_string_table: Vec<(&'img str, Value)>,
    heap: Heap,
    stack: Vec<Value>,
    pc: u16,
    fp: u16,
    arg_count: u16,
    intern_table: InternTable,
    config: VmConfig,
    host_port: P,
}

impl<'img, P: HostPort> Vm<'img, P> {
    /// Assemble a `Vm` from already-validated, already-relocated parts.
    /// [`crate::loader`] produces these (image/CRC validation, import
    /// resolution, heap relocation); this constructor just wires them
    /// together into a runnable instance.
    #[must_use]
    pub(crate) fn from_parts(
        image: &'img [u8],
        header: BytecodeHeader,
        globals: Vec<Value>,
        imports: Vec<Box<dyn HostFunction + 'img>>,
        rom_string_table: Vec<(&'img str, Value)>,
        heap: Heap,
        config: VmConfig,
        host_port: P,
    ) -> Self {
        Self {
            image,
            header,
            globals,
            imports,
            rom_string_table,
            heap,
            stack: Vec::new(),
            pc: PC_SENTINEL,
            fp: 0,
            arg_count: 0,
            intern_table: InternTable::new(),
            config,
            host_port,
        }
    }

    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    #[must_use]
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    #[must_use]
    pub fn globals(&self) -> &[Value] {
        &self.globals
    }

    #[must_use]
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    #[must_use]
    pub fn host_port(&self) -> &P {
        &self.host_port
    }

    // --- image access -----------------------------------------------

    fn fetch_u8(&mut self) -> u8 {
        let b = self.image[self.pc as usize];
        self.pc = self.pc.wrapping_add(1);
        b
    }

    fn fetch_i8(&mut self) -> i16 {
        i16::from(self.fetch_u8() as i8)
    }

    fn fetch_u16(&mut self) -> u16 {
        let lo = self.fetch_u8();
        let hi = self.fetch_u8();
        u16::from_le_bytes([lo, hi])
    }

    fn fetch_i16(&mut self) -> i32 {
        i32::from(self.fetch_u16() as i16)
    }

    fn short_call_table(&self) -> &[u8] {
        let start = self.header.section_offset(Section::ShortCallTable) as usize;
        let size = self.header.section_size(Section::ShortCallTable) as usize;
        &self.image[start..start + size]
    }

    fn short_call_entry(&self, index: u16) -> Result<ShortCallEntry, Error> {
        const ENTRY_SIZE: usize = 3;
        let table = self.short_call_table();
        let at = index as usize * ENTRY_SIZE;
        let bytes = table.get(at..at + ENTRY_SIZE).ok_or(Error::InvalidBytecode)?;
        let raw_target = u16::from_le_bytes([bytes[0], bytes[1]]);
        Ok(ShortCallEntry {
            target: raw_target >> 1,
            arg_count: bytes[2],
            is_host: raw_target & 1 != 0,
        })
    }

    // --- stack helpers -------------------------------------------------

    fn push(&mut self, v: Value) {
        self.stack.push(v);
    }

    fn pop(&mut self) -> Result<Value, Error> {
        self.stack.pop().ok_or(Error::Unexpected)
    }

    fn pop_word(&mut self) -> Result<u16, Error> {
        Ok(self.pop()?.raw())
    }

    // --- frames ----------------------------------------------------

    /// Push the three-word saved-state triple and open a new frame
    /// (§4.5 "Frame layout"). `return_pc` is the caller's resume point;
    /// `entry_pc` is where the callee starts (bytecode offset of its
    /// `maxStackDepth` byte). Checks headroom against that byte.
    fn enter_frame(&mut self, entry_pc: u16, new_arg_count: u16, return_pc: u16) -> Result<(), Error> {
        let max_stack_depth = *self.image.get(entry_pc as usize).ok_or(Error::TargetIsNotAVmFunction)? as usize;
        let needed = max_stack_depth + FRAME_SAVE_SIZE_WORDS;
        let stack_word_budget = self.config.stack_size / 2;
        if self.stack.len() + needed > stack_word_budget {
            return Err(Error::StackOverflow);
        }
        self.push(Value::from_raw(self.fp));
        self.push(Value::from_raw(self.arg_count));
        self.push(Value::from_raw(return_pc));
        self.fp = self.stack.len() as u16;
        self.arg_count = new_arg_count;
        self.pc = entry_pc + 1;
        Ok(())
    }

    /// `RETURN_x` (§4.5): pop the result (or undefined), unwind to the
    /// caller's frame, pop this frame's own arguments (its pre-restore
    /// `arg_count`, matching the reference interpreter's `reg3 =
    /// argCount` captured before the restore), optionally pop the
    /// callable, and push the result. Returns `Some(result)` once PC is
    /// restored to [`PC_SENTINEL`] (the run loop should stop); `None` to
    /// keep executing in the caller.
    fn do_return(&mut self, shape: ReturnShape) -> Result<Option<Value>, Error> {
        let result = if shape.pop_result {
            self.pop()?
        } else {
            Value::UNDEFINED
        };
        self.stack.truncate(self.fp as usize);
        let this_frame_arg_count = self.arg_count;
        let saved_pc = self.pop_word()?;
        let saved_arg_count = self.pop_word()?;
        let saved_fp = self.pop_word()?;
        let new_len = self
            .stack
            .len()
            .checked_sub(this_frame_arg_count as usize)
            .ok_or(Error::Unexpected)?;
        self.stack.truncate(new_len);
        if shape.pop_function_ref {
            self.pop()?;
        }
        self.push(result);
        self.fp = saved_fp;
        self.arg_count = saved_arg_count;
        self.pc = saved_pc;
        if self.pc == PC_SENTINEL {
            Ok(Some(result))
        } else {
            Ok(None)
        }
    }

    // --- call dispatch -----------------------------------------------

    fn classify_callable(&self, v: Value) -> Result<CallTarget, Error> {
        if v.is_handle_or_wellknown() && !v.is_wellknown() {
            let offset = v.bytecode_mapped_offset();
            let rom_start = self.header.section_offset(Section::Rom);
            let rom_end = rom_start + self.header.section_size(Section::Rom);
            let globals_start = self.header.section_offset(Section::Globals);
            let globals_end = globals_start + self.header.section_size(Section::Globals);
            if offset >= rom_start && offset < rom_end {
                return Ok(CallTarget::Function(offset));
            }
            if offset >= globals_start && offset < globals_end {
                let slot = ((offset - globals_start) / 2) as usize;
                let indirect = *self.globals.get(slot).ok_or(Error::Unexpected)?;
                return self.classify_callable(indirect);
            }
            return Err(Error::TargetNotCallable);
        }
        if v.is_short_ptr() {
            let offset = v.short_ptr_offset();
            return match self.heap.type_code_at(offset) {
                TypeCode::HostFunc => Ok(CallTarget::Host(self.heap.read_u16(offset))),
                TypeCode::Function => Ok(CallTarget::Function(self.heap.read_u16(offset))),
                _ => Err(Error::TargetNotCallable),
            };
        }
        Err(Error::TargetNotCallable)
    }

    /// Dispatch a call whose callable sits at `stack[len - arg_count -
    /// 1]` (the `CALL_3` convention; also used by `CALL_1`/`CALL_2`
    /// after they've pushed/located the callable the same way).
    /// `CLOSURE` targets are unwrapped in place (closure's `scope`
    /// replaces the receiver, `target` replaces the callable) and
    /// retried, matching the reference interpreter's
    /// `goto LBL_OP2_CALL_3`.
    fn dispatch_call(&mut self, arg_count: u16, return_pc: u16) -> Result<(), Error> {
        let callable_index = self
            .stack
            .len()
            .checked_sub(arg_count as usize + 1)
            .ok_or(Error::Unexpected)?;
        let mut callable = self.stack[callable_index];
        loop {
            if callable.is_short_ptr() && self.heap.type_code_at(callable.short_ptr_offset()) == TypeCode::Closure {
                let offset = callable.short_ptr_offset();
                let scope = self.heap.read_value(offset + CLOSURE_SCOPE);
                callable = self.heap.read_value(offset + CLOSURE_TARGET);
                if arg_count == 0 {
                    return Err(Error::TargetNotCallable);
                }
                self.stack[callable_index + 1] = scope;
                continue;
            }
            break;
        }
        self.stack[callable_index] = callable;
        match self.classify_callable(callable)? {
            CallTarget::Function(entry_pc) => self.enter_frame(entry_pc, arg_count, return_pc),
            CallTarget::Host(import_index) => self.call_host(import_index, arg_count, return_pc),
        }
    }

    /// `CALL_HOST` (§4.6): run a resolved import. Always synchronous —
    /// no run-loop continuation is needed since the host function
    /// either returns a value/error directly or re-enters via
    /// [`Vm::call`].
    fn call_host(&mut self, import_index: u16, arg_count: u16, return_pc: u16) -> Result<(), Error> {
        self.push(Value::from_raw(self.fp));
        self.push(Value::from_raw(self.arg_count));
        self.push(Value::from_raw(return_pc));
        self.fp = self.stack.len() as u16;
        self.arg_count = arg_count.saturating_sub(1);
        self.pc = PC_SENTINEL;

        let args_start = self.fp as usize - FRAME_SAVE_SIZE_WORDS - arg_count as usize + 1;
        let args_end = self.fp as usize - FRAME_SAVE_SIZE_WORDS;
        let mut args: Vec<Value> = self.stack[args_start..args_end].to_vec();
        crate::host::sanitize_args(&mut args, &self.heap);

        let import = self
            .imports
            .get(import_index as usize)
            .ok_or(Error::UnresolvedImport)?;
        let result = import.call(&args, &mut self.heap)?;
        let result = crate::host::validate_host_result(result, &self.heap)?;

        self.stack.truncate(self.fp as usize);
        let saved_pc = self.pop_word()?;
        let saved_arg_count = self.pop_word()?;
        let saved_fp = self.pop_word()?;
        let new_len = self
            .stack
            .len()
            .checked_sub(arg_count as usize)
            .ok_or(Error::Unexpected)?;
        self.stack.truncate(new_len);
        self.push(result);
        self.fp = saved_fp;
        self.arg_count = saved_arg_count;
        self.pc = saved_pc;
        Ok(())
    }

    /// Host-initiated entry (`mvm_call`, §4.6): call `callable` with
    /// `args` (a receiver of `undefined` is synthesized), running the
    /// interpreter until control returns to this call.
    pub fn call(&mut self, callable: Value, args: &[Value]) -> Result<Value, Error> {
        let return_pc = self.pc;
        self.push(callable);
        self.push(Value::UNDEFINED);
        for &arg in args {
            self.push(arg);
        }
        let arg_count = 1 + args.len() as u16;
        self.dispatch_call(arg_count, return_pc)?;
        if self.pc == PC_SENTINEL {
            // `call_host` already ran synchronously and returned.
            return self.pop();
        }
        self.run()
    }

    /// Run a full collection in place (§4.3 `run_gc`), rewriting every
    /// live root (globals, the value stack, the intern list) to point
    /// into the freshly collected heap.
    ///
    /// Unlike the reference interpreter, this is not wired as an
    /// automatic retry inside allocation failures: an opcode body that
    /// has already popped operands off the stack before its allocating
    /// call cannot safely be re-executed from scratch, since the popped
    /// values are gone. A host seeing [`Error::OutOfMemory`] from
    /// [`Vm::call`] is expected to call this and retry the whole
    /// external call, mirroring the manual `mvm_runGC` + retry pattern
    /// exposed by the reference C API.
    pub fn collect_garbage(&mut self) -> Result<(), Error> {
        let heap = core::mem::take(&mut self.heap);
        let mut stack = core::mem::take(&mut self.stack);
        let mut globals = core::mem::take(&mut self.globals);
        let bucket_size = self.config.allocation_bucket_size;
        let max_heap_size = self.config.max_heap_size;
        let new_heap = crate::gc::collect(
            heap,
            &mut globals,
            &mut stack,
            self.intern_table.root_mut(),
            bucket_size,
            max_heap_size,
            false,
        )?;
        self.heap = new_heap;
        self.stack = stack;
        self.globals = globals;
        Ok(())
    }

    /// `create_snapshot` (§4.10): serialize the VM's current state into
    /// a fresh bytecode image, resumable later via [`crate::loader::load`].
    /// Only valid between external calls (`pc == PC_SENTINEL`); the value
    /// stack and call frames are not part of the image format.
    pub fn create_snapshot(&self) -> Result<Vec<u8>, Error> {
        crate::snapshot::create_snapshot(self.image, &self.header, &self.globals, &self.heap)
    }

    // --- run loop ----------------------------------------------------

    fn run(&mut self) -> Result<Value, Error> {
        loop {
            if let Some(limit) = self.config.instruction_limit {
                if limit == 0 {
                    return Err(Error::InstructionCountExceeded);
                }
                self.config.instruction_limit = Some(limit - 1);
            }
            let byte = self.fetch_u8();
            let (primary, low) = op::split(byte);
            if let Some(result) = self.step(primary, low)? {
                return Ok(result);
            }
        }
    }

    fn to_bool(&self, v: Value) -> bool {
        if v == Value::FALSE
            || v == Value::UNDEFINED
            || v == Value::NULL
            || v == Value::NAN
            || v == Value::NEG_ZERO
        {
            return false;
        }
        if v == Value::TRUE {
            return true;
        }
        if v.is_int14() {
            return v.decode_int14() != 0;
        }
        if v.is_short_ptr() {
            let offset = v.short_ptr_offset();
            return match self.heap.type_code_at(offset) {
                TypeCode::String | TypeCode::InternedString => self.heap.string_is_truthy(offset),
                _ => true,
            };
        }
        true
    }

    fn to_property_name(&mut self, key: Value) -> Result<Value, Error> {
        intern::to_property_name(
            key,
            &mut self.intern_table,
            &mut self.heap,
            &self.rom_string_table,
            self.config.allocation_bucket_size,
            self.config.max_heap_size,
        )
    }

    fn concat_strings(&mut self, a: Value, b: Value) -> Result<Value, Error> {
        let sa = self.read_value_as_string(a);
        let sb = self.read_value_as_string(b);
        let mut joined = String::with_capacity(sa.len() + sb.len());
        joined.push_str(&sa);
        joined.push_str(&sb);
        self.heap
            .alloc_string(&joined, self.config.allocation_bucket_size, self.config.max_heap_size)
            .ok_or(Error::OutOfMemory)
    }

    /// Render any value as its string form for `ADD`'s string-concat
    /// branch. Only the string-kind operand(s) actually route here;
    /// numbers already go through `make_number`'s numeric add.
    fn read_value_as_string(&self, v: Value) -> String {
        if v.is_short_ptr() {
            match self.heap.type_code_at(v.short_ptr_offset()) {
                TypeCode::String | TypeCode::InternedString => {
                    return self.heap.read_str(v.short_ptr_offset()).into();
                }
                _ => {}
            }
        }
        if v == Value::STR_LENGTH {
            return "length".into();
        }
        if v == Value::STR_PROTO {
            return "__proto__".into();
        }
        String::new()
    }

    fn is_string(&self, v: Value) -> bool {
        if v == Value::STR_LENGTH || v == Value::STR_PROTO {
            return true;
        }
        v.is_short_ptr()
            && matches!(
                self.heap.type_code_at(v.short_ptr_offset()),
                TypeCode::String | TypeCode::InternedString
            )
    }

    /// Execute one instruction. Returns `Some(result)` once the run
    /// loop should stop (a `RETURN` unwound past the sentinel, or
    /// `RETURN_ERROR` fired).
    fn step(&mut self, primary: Primary, low: u8) -> Result<Option<Value>, Error> {
        match primary {
            Primary::LoadSmallLiteral => {
                let lit = SmallLiteral::from_nibble(low).ok_or(Error::InvalidBytecode)?;
                self.push(small_literal_value(lit));
                Ok(None)
            }
            Primary::LoadVar1 => {
                self.load_var(u16::from(low))?;
                Ok(None)
            }
            Primary::LoadGlobal1 => {
                self.load_global(u16::from(low))?;
                Ok(None)
            }
            Primary::LoadArg1 => {
                self.load_arg(u16::from(low));
                Ok(None)
            }
            Primary::StoreVar1 => {
                self.store_var(u16::from(low))?;
                Ok(None)
            }
            Primary::StoreGlobal1 => {
                self.store_global(u16::from(low))?;
                Ok(None)
            }
            Primary::ArrayGet1 => {
                self.array_get(u16::from(low))?;
                Ok(None)
            }
            Primary::ArraySet1 => {
                self.array_set(u16::from(low))?;
                Ok(None)
            }
            Primary::Call1 => {
                self.call_1(low)?;
                Ok(None)
            }
            Primary::FixedArrayNew1 => {
                self.fixed_array_new(u16::from(low))?;
                Ok(None)
            }
            Primary::NumOp => {
                self.num_op(low)?;
                Ok(None)
            }
            Primary::BitOp => {
                self.bit_op(low)?;
                Ok(None)
            }
            Primary::Branch1 => {
                let offset = self.fetch_i8();
                self.branch(offset)?;
                Ok(None)
            }
            Primary::Jump1 => {
                let offset = self.fetch_i8();
                self.pc = (i32::from(self.pc) + i32::from(offset)) as u16;
                Ok(None)
            }
            Primary::Return => {
                let shape = ReturnShape::from_nibble(low);
                self.do_return(shape)
            }
            Primary::Extended => {
                let byte = self.fetch_u8();
                let secondary = Secondary::from_u8(byte).ok_or(Error::InvalidBytecode)?;
                self.step_secondary(secondary)
            }
        }
    }

    fn step_secondary(&mut self, secondary: Secondary) -> Result<Option<Value>, Error> {
        match secondary {
            Secondary::LoadVar2 => {
                let n = u16::from(self.fetch_u8());
                self.load_var(n)?;
            }
            Secondary::LoadGlobal2 => {
                let n = u16::from(self.fetch_u8());
                self.load_global(n)?;
            }
            Secondary::LoadGlobal3 => {
                let n = self.fetch_u16();
                self.load_global(n)?;
            }
            Secondary::LoadArg2 => {
                let n = u16::from(self.fetch_u8());
                self.load_arg(n);
            }
            Secondary::StoreVar2 => {
                let n = u16::from(self.fetch_u8());
                self.store_var(n)?;
            }
            Secondary::StoreGlobal2 => {
                let n = u16::from(self.fetch_u8());
                self.store_global(n)?;
            }
            Secondary::StoreGlobal3 => {
                let n = self.fetch_u16();
                self.store_global(n)?;
            }
            Secondary::Call2 => {
                let entry_pc = self.fetch_u16();
                let arg_count = u16::from(self.fetch_u8());
                let return_pc = self.pc;
                self.enter_frame(entry_pc, arg_count, return_pc)?;
            }
            Secondary::Call3 => {
                let arg_count = u16::from(self.fetch_u8());
                let return_pc = self.pc;
                self.dispatch_call(arg_count, return_pc)?;
            }
            Secondary::CallHost => {
                let arg_count = u16::from(self.fetch_u8());
                let import_index = u16::from(self.fetch_u8());
                let return_pc = self.pc;
                self.call_host(import_index, arg_count, return_pc)?;
            }
            Secondary::FixedArrayNew2 => {
                let n = u16::from(self.fetch_u8());
                self.fixed_array_new(n)?;
            }
            Secondary::ArrayNew => {
                let capacity = u16::from(self.fetch_u8());
                self.array_new(capacity)?;
            }
            Secondary::ObjectNew => self.object_new()?,
            Secondary::ObjectGet1 => {
                let key = self.pop()?;
                self.object_get(key)?;
            }
            Secondary::ObjectGet2 => {
                let offset = self.fetch_u16();
                self.object_get(Value::bytecode_mapped_ptr(offset))?;
            }
            Secondary::ObjectSet1 => {
                let val = self.pop()?;
                let key = self.pop()?;
                self.object_set(key, val)?;
            }
            Secondary::ObjectSet2 => {
                let offset = self.fetch_u16();
                let val = self.pop()?;
                self.object_set(Value::bytecode_mapped_ptr(offset), val)?;
            }
            Secondary::Add => self.add()?,
            Secondary::Equal => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::bool(equality::values_equal(a, b, &self.heap)));
            }
            Secondary::NotEqual => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::bool(!equality::values_equal(a, b, &self.heap)));
            }
            Secondary::LogicalNot => {
                let v = self.pop()?;
                self.push(Value::bool(!self.to_bool(v)));
            }
            Secondary::Branch2 => {
                let offset = self.fetch_i16();
                self.branch(offset as i16)?;
            }
            Secondary::Jump2 => {
                let offset = self.fetch_i16();
                self.pc = (i32::from(self.pc) + offset) as u16;
            }
            Secondary::LoadLiteral => {
                let raw = self.fetch_u16();
                self.push(Value::from_raw(raw));
            }
            Secondary::ReturnError => {
                let code = self.fetch_u8();
                return Ok(Some(Value::int14(i16::from(code))));
            }
            Secondary::Pop => {
                self.pop()?;
            }
            Secondary::PopN => {
                let n = self.fetch_u8() as usize;
                let new_len = self.stack.len().checked_sub(n).ok_or(Error::Unexpected)?;
                self.stack.truncate(new_len);
            }
        }
        Ok(None)
    }

    // --- individual opcode bodies --------------------------------------

    fn load_var(&mut self, n: u16) -> Result<(), Error> {
        let idx = self
            .stack
            .len()
            .checked_sub(1 + n as usize)
            .ok_or(Error::Unexpected)?;
        self.push(self.stack[idx]);
        Ok(())
    }

    fn store_var(&mut self, n: u16) -> Result<(), Error> {
        let v = self.pop()?;
        let idx = self
            .stack
            .len()
            .checked_sub(1 + n as usize)
            .ok_or(Error::Unexpected)?;
        self.stack[idx] = v;
        Ok(())
    }

    fn load_global(&mut self, n: u16) -> Result<(), Error> {
        let v = *self.globals.get(n as usize).ok_or(Error::Unexpected)?;
        self.push(v);
        Ok(())
    }

    fn store_global(&mut self, n: u16) -> Result<(), Error> {
        let v = self.pop()?;
        let slot = self.globals.get_mut(n as usize).ok_or(Error::Unexpected)?;
        *slot = v;
        Ok(())
    }

    fn load_arg(&mut self, n: u16) {
        if n < self.arg_count {
            let idx =
                self.fp as usize - FRAME_SAVE_SIZE_WORDS - self.arg_count as usize + n as usize;
            self.push(self.stack[idx]);
        } else {
            self.push(Value::UNDEFINED);
        }
    }

    fn array_get(&mut self, index: u16) -> Result<(), Error> {
        let obj = self.pop()?;
        let key = Value::int14(index as i16);
        let v = property::get_property(obj, key, &self.heap)?;
        self.push(v);
        Ok(())
    }

    fn array_set(&mut self, index: u16) -> Result<(), Error> {
        let val = self.pop()?;
        let obj = self.pop()?;
        let key = Value::int14(index as i16);
        self.set_property_dispatch(obj, key, val)
    }

    fn object_get(&mut self, key_raw: Value) -> Result<(), Error> {
        let obj = self.pop()?;
        let key = self.to_property_name(key_raw)?;
        let v = property::get_property(obj, key, &self.heap)?;
        self.push(v);
        Ok(())
    }

    fn object_set(&mut self, key_raw: Value, val: Value) -> Result<(), Error> {
        let obj = self.pop()?;
        self.set_property_dispatch(obj, key_raw, val)
    }

    fn set_property_dispatch(&mut self, obj: Value, key_raw: Value, val: Value) -> Result<(), Error> {
        property::set_property(
            obj,
            key_raw,
            val,
            &mut self.intern_table,
            &mut self.heap,
            &self.rom_string_table,
            self.config.allocation_bucket_size,
            self.config.max_heap_size,
        )
    }

    fn fixed_array_new(&mut self, len: u16) -> Result<(), Error> {
        let v = self
            .heap
            .try_allocate(
                len * 2,
                TypeCode::FixedLengthArray,
                self.config.allocation_bucket_size,
                self.config.max_heap_size,
            )
            .ok_or(Error::OutOfMemory)?;
        let offset = v.short_ptr_offset();
        for i in 0..len {
            self.heap.write_value(offset + i * 2, Value::DELETED);
        }
        self.push(v);
        Ok(())
    }

    fn array_new(&mut self, capacity: u16) -> Result<(), Error> {
        let data = if capacity == 0 {
            Value::NULL
        } else {
            property::grow_array(
                Value::NULL,
                capacity,
                &mut self.heap,
                self.config.allocation_bucket_size,
                self.config.max_heap_size,
            )?
        };
        let arr = self
            .heap
            .try_allocate(4, TypeCode::Array, self.config.allocation_bucket_size, self.config.max_heap_size)
            .ok_or(Error::OutOfMemory)?;
        let offset = arr.short_ptr_offset();
        self.heap.write_value(offset, data);
        self.heap.write_value(offset + 2, Value::int14(0));
        self.push(arr);
        Ok(())
    }

    fn object_new(&mut self) -> Result<(), Error> {
        let v = self
            .heap
            .try_allocate(4, TypeCode::PropertyList, self.config.allocation_bucket_size, self.config.max_heap_size)
            .ok_or(Error::OutOfMemory)?;
        let offset = v.short_ptr_offset();
        self.heap.write_value(offset, Value::NULL);
        self.heap.write_value(offset + 2, Value::NULL);
        self.push(v);
        Ok(())
    }

    fn add(&mut self) -> Result<(), Error> {
        let b = self.pop()?;
        let a = self.pop()?;
        if self.is_string(a) || self.is_string(b) {
            let v = self.concat_strings(a, b)?;
            self.push(v);
            return Ok(());
        }
        let v = arithmetic::apply_num_op(
            crate::bytecode::op::NumOp::Add,
            a,
            b,
            &mut self.heap,
            self.config.allocation_bucket_size,
            self.config.max_heap_size,
        )?;
        self.push(v);
        Ok(())
    }

    fn num_op(&mut self, nibble: u8) -> Result<(), Error> {
        let op = crate::bytecode::op::NumOp::from_nibble(nibble).ok_or(Error::InvalidBytecode)?;
        let top = self.pop()?;
        let result = if op.is_unary() {
            arithmetic::apply_num_op_unary(
                op,
                top,
                &mut self.heap,
                self.config.allocation_bucket_size,
                self.config.max_heap_size,
            )?
        } else {
            let a = self.pop()?;
            arithmetic::apply_num_op(
                op,
                a,
                top,
                &mut self.heap,
                self.config.allocation_bucket_size,
                self.config.max_heap_size,
            )?
        };
        self.push(result);
        Ok(())
    }

    fn bit_op(&mut self, nibble: u8) -> Result<(), Error> {
        let op = crate::bytecode::op::BitOp::from_nibble(nibble).ok_or(Error::InvalidBytecode)?;
        let top = self.pop()?;
        let result = if op.is_unary() {
            arithmetic::apply_bit_op_unary(
                op,
                top,
                &mut self.heap,
                self.config.allocation_bucket_size,
                self.config.max_heap_size,
            )?
        } else {
            let a = self.pop()?;
            arithmetic::apply_bit_op(
                op,
                a,
                top,
                &mut self.heap,
                self.config.allocation_bucket_size,
                self.config.max_heap_size,
            )?
        };
        self.push(result);
        Ok(())
    }

    fn branch(&mut self, offset: i16) -> Result<(), Error> {
        let cond = self.pop()?;
        if self.to_bool(cond) {
            self.pc = (i32::from(self.pc) + i32::from(offset)) as u16;
        }
        Ok(())
    }

    fn call_1(&mut self, index: u8) -> Result<(), Error> {
        let entry = self.short_call_entry(u16::from(index))?;
        let return_pc = self.pc;
        if entry.is_host {
            self.call_host(entry.target, u16::from(entry.arg_count), return_pc)
        } else {
            self.enter_frame(entry.target, u16::from(entry.arg_count), return_pc)
        }
    }
}

fn small_literal_value(lit: SmallLiteral) -> Value {
    match lit {
        SmallLiteral::Null => Value::NULL,
        SmallLiteral::Undefined => Value::UNDEFINED,
        SmallLiteral::False => Value::FALSE,
        SmallLiteral::True => Value::TRUE,
        SmallLiteral::Zero => Value::int14(0),
        SmallLiteral::One => Value::int14(1),
        SmallLiteral::Two => Value::int14(2),
        SmallLiteral::NegativeOne => Value::int14(-1),
    }
}
