// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Allocation headers (§3.2): a 16-bit word preceding every heap payload,
//! high 4 bits type code, low 12 bits payload size in bytes.

/// Maximum payload size a single allocation can declare.
pub const MAX_PAYLOAD_SIZE: u16 = 0x0FFF;

const SIZE_MASK: u16 = 0x0FFF;
const TYPE_SHIFT: u32 = 12;

/// The 4-bit type code of an allocation header.
///
/// Variants at or above [`TypeCode::InternalContainer`] are *container*
/// types: every word of their payload is itself a [`crate::Value`] and the
/// GC traces through them. Earlier variants are opaque to the GC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TypeCode {
    /// Boxed 32-bit integer (used when a number doesn't fit `Int14`).
    Int32 = 0,
    /// Boxed double-precision float.
    Float64 = 1,
    /// Raw UTF-8 string, plus a trailing NUL outside the reported size.
    String = 2,
    /// A string whose identity is its address; property-key-eligible.
    InternedString = 3,
    /// A VM function (bytecode offset, ROM-only in practice).
    Function = 4,
    /// Wraps an import-table index for a host function.
    HostFunc = 5,
    /// Reserved for arbitrary-precision integers (not implemented).
    BigInt = 6,
    /// Reserved for symbols (not implemented).
    Symbol = 7,
    /// Marks a moved allocation; first payload word is the forwarding
    /// pointer.
    Tombstone = 8,
    /// Linked cell used by the runtime string-intern table.
    InternalContainer = 9,
    /// A JS-style object: `{ next, proto, (key, value)* }`.
    PropertyList = 10,
    /// A JS-style dynamic array: `{ data, length }`.
    Array = 11,
    /// An array's backing store (also doubles as a plain tuple).
    FixedLengthArray = 12,
    /// `{ target, scope, props, this_ }`.
    Closure = 13,
}

impl TypeCode {
    /// The first container type code; `self as u8 >= CONTAINER_THRESHOLD`
    /// tells the GC to trace this allocation's words as `Value`s.
    pub const CONTAINER_THRESHOLD: u8 = Self::InternalContainer as u8;

    /// Whether allocations of this type hold `Value` words the GC must
    /// trace.
    #[inline]
    #[must_use]
    pub const fn is_container(self) -> bool {
        self as u8 >= Self::CONTAINER_THRESHOLD
    }

    /// Decode a type code from its raw 4-bit nibble. Returns `None` for
    /// the two reserved-but-unassigned nibbles (14, 15).
    #[must_use]
    pub const fn from_nibble(nibble: u8) -> Option<Self> {
        Some(match nibble {
            0 => Self::Int32,
            1 => Self::Float64,
            2 => Self::String,
            3 => Self::InternedString,
            4 => Self::Function,
            5 => Self::HostFunc,
            6 => Self::BigInt,
            7 => Self::Symbol,
            8 => Self::Tombstone,
            9 => Self::InternalContainer,
            10 => Self::PropertyList,
            11 => Self::Array,
            12 => Self::FixedLengthArray,
            13 => Self::Closure,
            _ => return None,
        })
    }
}

/// Pack a type code and payload size into a 16-bit header word.
///
/// `size` is truncated to 12 bits; callers are expected to have already
/// validated it against [`MAX_PAYLOAD_SIZE`].
#[inline]
#[must_use]
pub const fn pack(type_code: TypeCode, size: u16) -> u16 {
    ((type_code as u16) << TYPE_SHIFT) | (size & SIZE_MASK)
}

/// Extract the payload size (bytes) from a header word.
#[inline]
#[must_use]
pub const fn size_of(header_word: u16) -> u16 {
    header_word & SIZE_MASK
}

/// Total bytes an allocation of `payload_size` occupies including its
/// 2-byte header word (§4.2): the payload is padded to an even length,
/// then the header is added, with a 4-byte floor (an empty payload still
/// costs a full header-sized slot).
#[inline]
#[must_use]
pub const fn size_including_header(payload_size: u16) -> u16 {
    let padded = (payload_size + 3) & !1;
    if padded < 4 {
        4
    } else {
        padded
    }
}

/// Extract the type code from a header word. Panics (debug) on a reserved
/// nibble; in release this is only reachable from a corrupt heap, which is
/// itself a fatal condition by the time anyone reads a header.
#[must_use]
pub fn type_code_of(header_word: u16) -> TypeCode {
    let nibble = (header_word >> TYPE_SHIFT) as u8;
    TypeCode::from_nibble(nibble).expect("allocation header has a defined type code")
}

/// The fixed header word written into a tombstone: type code `Tombstone`,
/// payload size 2 (one word: the forwarding pointer).
pub const TOMBSTONE_HEADER: u16 = pack(TypeCode::Tombstone, 2);
