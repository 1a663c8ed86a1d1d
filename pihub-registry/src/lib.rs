// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Thread-safe ordered collection of active client handles.
//!
//! Insertion order is acceptance order; iteration (used by broadcast and by
//! the `server status` command) walks the registry under a single lock, so a
//! handler invoked mid-iteration (e.g. a per-client write) can never race
//! with a concurrent `remove`.

use std::sync::Mutex;

/// Anything the registry can hold must expose a stable, comparable key (the
/// client's socket descriptor, in practice).
pub trait Keyed {
    type Key: PartialEq;

    fn key(&self) -> Self::Key;
}

/// Ordered collection of `T`, guarded by one lock.
///
/// Invariant: no two stored items share a key.
pub struct Registry<T> {
    clients: Mutex<Vec<T>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Keyed> Registry<T> {
    /// Append a handle to the registry. Caller is responsible for ensuring
    /// its key is not already present.
    pub fn push(&self, item: T) {
        self.clients.lock().unwrap().push(item);
    }

    /// Remove the first (and only, by invariant) item whose key matches.
    /// Returns the removed item, if any.
    pub fn remove(&self, key: &T::Key) -> Option<T> {
        let mut clients = self.clients.lock().unwrap();
        let pos = clients.iter().position(|c| c.key() == *key)?;
        Some(clients.remove(pos))
    }

    /// Apply `f` to each stored item in insertion order, holding the
    /// registry lock for the whole walk. `f` may itself take other locks
    /// (e.g. a per-client write lock) — that nesting is the one the lock
    /// ordering rules allow. Stops early if `f` returns `Err`.
    pub fn iterate<E>(&self, mut f: impl FnMut(&T) -> Result<(), E>) -> Result<(), E> {
        let clients = self.clients.lock().unwrap();
        for item in clients.iter() {
            f(item)?;
        }
        Ok(())
    }

    /// Snapshot copy of the stored items, for callers that need to release
    /// the registry lock before acting on the list (e.g. status reporting).
    pub fn snapshot(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.clients.lock().unwrap().clone()
    }
}
