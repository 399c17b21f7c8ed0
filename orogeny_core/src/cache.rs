// Copyright 2026 the Orogeny Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dependency-tracked lazy memoization.
//!
//! A [`Cache`] is an invalidation domain: [`Cache::invalidate_all`] forces
//! every [`Memo`] read against it to recompute on its next read. A memo can
//! additionally be *coupled* to values outside its own cache by passing a
//! revision token at the read site. The memo recomputes whenever the token
//! differs from the one recorded at its last computation.
//!
//! Epochs and revisions are drawn from one process-wide monotonic counter
//! ([`next_revision`]). Any fresh revision is therefore greater than every
//! revision handed out before it, so the maximum over several upstream
//! revisions is itself a valid coupling token: it changes whenever any one of
//! them is recomputed.
//!
//! Coupling is explicit and is expected to be acyclic. Nothing here detects
//! cycles; a memo whose compute closure reads itself recurses without bound.

use core::cell::{Cell, RefCell};
use core::sync::atomic::{AtomicU64, Ordering};

static REVISION: AtomicU64 = AtomicU64::new(1);

/// Returns a revision number greater than every revision returned before.
#[inline]
#[must_use]
pub fn next_revision() -> u64 {
    REVISION.fetch_add(1, Ordering::Relaxed)
}

/// An invalidation domain shared by a group of [`Memo`]s.
#[derive(Debug)]
pub struct Cache {
    epoch: Cell<u64>,
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache {
    /// Creates a cache at a fresh epoch.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Cell::new(next_revision()),
        }
    }

    /// Marks every memo read against this cache as needing recomputation.
    ///
    /// Nothing is recomputed eagerly.
    #[inline]
    pub fn invalidate_all(&self) {
        self.epoch.set(next_revision());
    }

    /// The current epoch.
    ///
    /// The epoch changes on every [`invalidate_all`](Self::invalidate_all),
    /// so it can be passed as a coupling token to memos in *other* caches.
    #[inline]
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.get()
    }
}

/// A lazily computed value.
///
/// The stored value is cloned out on every read; memoized values in this
/// crate are small `Copy` math types or reference-counted slices.
#[derive(Debug)]
pub struct Memo<T> {
    value: RefCell<Option<T>>,
    needs_update: Cell<bool>,
    stamp: Cell<(u64, u64)>,
}

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Memo<T> {
    /// Creates an empty memo. The first read always computes.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: RefCell::new(None),
            needs_update: Cell::new(true),
            stamp: Cell::new((0, 0)),
        }
    }

    /// Flags this memo alone for recomputation.
    #[inline]
    pub fn invalidate(&self) {
        self.needs_update.set(true);
    }

    /// Returns `true` if this memo's own flag is set.
    ///
    /// Staleness caused by its cache or coupling token is only discovered at
    /// read time and is not reported here.
    #[inline]
    #[must_use]
    pub fn needs_update(&self) -> bool {
        self.needs_update.get()
    }
}

impl<T: Clone> Memo<T> {
    /// The last computed value, stale or not. Never computes.
    #[must_use]
    pub fn peek(&self) -> Option<T> {
        self.value.borrow().clone()
    }

    /// Reads the value, computing it if this memo or `cache` was invalidated.
    pub fn get(&self, cache: &Cache, compute: impl FnOnce() -> T) -> T {
        self.get_coupled(cache, 0, compute)
    }

    /// Reads the value, additionally recomputing when `token` differs from
    /// the token recorded at the last computation.
    ///
    /// No borrow is held while `compute` runs, so it may freely read other
    /// memos (but not this one).
    pub fn get_coupled(&self, cache: &Cache, token: u64, compute: impl FnOnce() -> T) -> T {
        let stamp = (cache.epoch(), token);
        if !self.needs_update.get() && self.stamp.get() == stamp {
            if let Some(value) = self.value.borrow().as_ref() {
                return value.clone();
            }
        }
        let value = compute();
        *self.value.borrow_mut() = Some(value.clone());
        self.needs_update.set(false);
        self.stamp.set(stamp);
        value
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
