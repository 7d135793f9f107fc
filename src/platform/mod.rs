// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Abstract host port (§6.1): the embedder-supplied surface the core
//! needs beyond what `alloc`/`core` already provide. Byte allocation is
//! handled by `Vec` inside [`crate::heap`] rather than a raw `alloc`/
//! `free` pair (§9 design note on relying on the host's allocator
//! directly instead of a hand-rolled one), so the only thing a port must
//! still supply is the fatal-error sink.

#[cfg(test)]
mod mock_test;

#[cfg(any(test, feature = "std"))]
mod mock;

#[cfg(any(test, feature = "std"))]
pub use mock::MockHostPort;

use crate::Error;

/// The fatal-error sink every port must provide (§6.1). Called only for
/// [`Error::is_fatal`] conditions; implementations are not expected to
/// return, matching the reference port's `abort()`-style handler.
pub trait HostPort {
    /// Report a fatal error. May panic, abort, or reset the host;
    /// callers treat this as divergent.
    fn fatal_error(&self, error: Error) -> !;
}
