// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Mock host port for testing VM logic on the host system.

use super::HostPort;
use crate::Error;
use core::cell::Cell;

/// A [`HostPort`] that records the last fatal error instead of aborting,
/// so tests can assert on it.
#[derive(Debug, Default)]
pub struct MockHostPort {
    last_fatal: Cell<Option<Error>>,
}

impl MockHostPort {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last_fatal: Cell::new(None),
        }
    }

    /// The most recent error reported through [`HostPort::fatal_error`],
    /// if any.
    #[must_use]
    pub fn last_fatal(&self) -> Option<Error> {
        self.last_fatal.get()
    }
}

impl HostPort for MockHostPort {
    fn fatal_error(&self, error: Error) -> ! {
        self.last_fatal.set(Some(error));
        panic!("fatal VM error: {error}");
    }
}
