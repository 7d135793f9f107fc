// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Host-tunable configuration constants (§6.1 of the abstract host port).
//!
//! A real port (`microvium_port.h` in the reference implementation) fixes
//! these as preprocessor constants. We keep them as runtime fields on
//! [`VmConfig`] so a single build can be reused across hosts with different
//! memory budgets, defaulting to the reference values.

/// Default size, in bytes, of the register block + value stack allocated
/// on first external call.
pub const DEFAULT_STACK_SIZE: usize = 256;

/// Default size, in bytes, of each heap bucket acquired from the host
/// allocator.
pub const DEFAULT_ALLOCATION_BUCKET_SIZE: u16 = 256;

/// Default ceiling on total live heap size before allocation fails with
/// [`crate::Error::OutOfMemory`].
pub const DEFAULT_MAX_HEAP_SIZE: u16 = 4096;

/// Runtime configuration for a [`crate::Vm`] instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmConfig {
    /// Size in bytes of the stack block (register block + value stack).
    pub stack_size: usize,
    /// Size in bytes of each bucket requested from the host allocator.
    pub allocation_bucket_size: u16,
    /// Ceiling on total heap size across all buckets.
    pub max_heap_size: u16,
    /// Whether float-fallback arithmetic is compiled in. Mirrors the
    /// `float` Cargo feature but is also exposed as a field so a host can
    /// report the capability mismatch against a loaded image's
    /// `FF_FLOAT_SUPPORT` flag without a second build.
    pub support_float: bool,
    /// Enables extra internal consistency assertions (`MVM_SAFE_MODE`).
    pub safe_mode: bool,
    /// Optional instruction budget. When `Some(n)`, the interpreter
    /// decrements this once per executed instruction and exits the run
    /// loop with [`crate::Error::InstructionCountExceeded`] once it
    /// reaches zero. `None` disables the check.
    pub instruction_limit: Option<u32>,
}

impl VmConfig {
    /// Configuration matching the reference port's defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            allocation_bucket_size: DEFAULT_ALLOCATION_BUCKET_SIZE,
            max_heap_size: DEFAULT_MAX_HEAP_SIZE,
            support_float: cfg!(feature = "float"),
            safe_mode: cfg!(debug_assertions),
            instruction_limit: None,
        }
    }
}

impl Default for VmConfig {
    fn default() -> Self {
        Self::new()
    }
}
