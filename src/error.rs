// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Error codes surfaced by the public API.
//!
//! Errors fall into two categories (see module docs on [`crate::host`] for
//! where the split is enforced): *reportable* errors are returned from the
//! API call that triggered them and leave the VM usable; *fatal* errors are
//! routed to the host's [`crate::platform::HostPort::fatal_error`] sink and
//! are not expected to return.

use core::fmt;

/// A single error enum covering every reportable and fatal condition the
/// core can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Operation completed normally. Not actually returned by fallible APIs;
    /// present so callers that store the last error code have a zero value.
    Success,
    /// Internal invariant broken in a way not covered by a more specific code.
    Unexpected,
    /// The host allocator returned `None`.
    MallocFail,
    /// A requested allocation exceeds the 4095-byte payload limit.
    AllocationTooLarge,
    /// An exported function lookup by ID found no match.
    FunctionNotFound,
    /// A handle was used after release, or never initialized.
    InvalidHandle,
    /// The value stack would overflow the function's declared max depth.
    StackOverflow,
    /// An import-table entry could not be resolved by the host callback.
    UnresolvedImport,
    /// Arguments passed across the C-compatible API were malformed.
    InvalidArguments,
    /// An operation received a value of the wrong type.
    TypeError,
    /// A `CALL` dispatched on a value that is not `FUNCTION`, `HOST_FUNC`,
    /// or `CLOSURE`.
    TargetNotCallable,
    /// A host function call itself failed.
    HostError,
    /// A feature named in this spec is recognized but not implemented by
    /// this build.
    NotImplemented,
    /// A host function returned a value that fails basic sanity checks.
    HostReturnedInvalidValue,
    /// An internal assertion failed in safe mode.
    AssertionFailed,
    /// The bytecode image failed structural validation.
    InvalidBytecode,
    /// `resolve_exports` was asked for an export ID absent from the table.
    UnresolvedExport,
    /// A value fell outside the domain an operation requires (e.g. a
    /// negative property-key index).
    RangeError,
    /// A short-call or `CALL_3` target resolved to a bytecode offset that
    /// is not a valid VM function header.
    TargetIsNotAVmFunction,
    /// The operation would need to represent `NaN` but this was an error
    /// context rather than a value context (e.g. integer remainder chain).
    Nan,
    /// As [`Error::Nan`] but for negative zero.
    NegZero,
    /// The operation needs the float fallback path but this build was
    /// compiled without the `float` feature.
    OperationRequiresFloatSupport,
    /// `BytecodeHeader::crc` did not match the computed CRC-16-CCITT of the
    /// image body.
    BytecodeCrcFail,
    /// The image declares `FF_FLOAT_SUPPORT` but this build lacks it.
    BytecodeRequiresFloatSupport,
    /// A write to `__proto__` was attempted; `__proto__` is read-only.
    ProtoIsReadonly,
    /// A snapshot would exceed the 16-bit `bytecodeSize` field.
    SnapshotTooLarge,
    /// An array grew past the maximum representable length.
    ArrayTooLong,
    /// The heap could not grow even after a collection.
    OutOfMemory,
    /// A `set_property` targeted a ROM (immutable) object.
    AttemptToWriteToRom,
    /// The configured instruction-count budget reached zero (§5
    /// "Cancellation/timeouts").
    InstructionCountExceeded,
}

impl Error {
    /// Whether this error is fatal: routed to the host sink, not returned.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(
            self,
            Self::Unexpected
                | Self::AssertionFailed
                | Self::MallocFail
                | Self::OutOfMemory
                | Self::SnapshotTooLarge
                | Self::AllocationTooLarge
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::Success => "success",
            Self::Unexpected => "unexpected internal error",
            Self::MallocFail => "host allocator returned no memory",
            Self::AllocationTooLarge => "allocation exceeds maximum payload size",
            Self::FunctionNotFound => "function not found",
            Self::InvalidHandle => "invalid or released handle",
            Self::StackOverflow => "stack overflow",
            Self::UnresolvedImport => "import could not be resolved",
            Self::InvalidArguments => "invalid arguments",
            Self::TypeError => "type error",
            Self::TargetNotCallable => "call target is not callable",
            Self::HostError => "host function returned an error",
            Self::NotImplemented => "not implemented",
            Self::HostReturnedInvalidValue => "host function returned an invalid value",
            Self::AssertionFailed => "internal assertion failed",
            Self::InvalidBytecode => "invalid bytecode image",
            Self::UnresolvedExport => "export not found",
            Self::RangeError => "value out of range",
            Self::TargetIsNotAVmFunction => "call target is not a VM function",
            Self::Nan => "NaN",
            Self::NegZero => "negative zero",
            Self::OperationRequiresFloatSupport => "operation requires float support",
            Self::BytecodeCrcFail => "bytecode CRC check failed",
            Self::BytecodeRequiresFloatSupport => "bytecode requires float support",
            Self::ProtoIsReadonly => "__proto__ is read-only",
            Self::SnapshotTooLarge => "snapshot exceeds maximum image size",
            Self::ArrayTooLong => "array exceeds maximum length",
            Self::OutOfMemory => "out of memory",
            Self::AttemptToWriteToRom => "attempt to write to a ROM object",
            Self::InstructionCountExceeded => "instruction count budget exhausted",
        };
        write!(f, "{msg}")
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
