// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::store::{Entries, KvStore};
use crate::BoxFuture;

/// Volatile store. Used in tests and when `--store-path` is `:memory:`.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<Entries>,
    writes: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store from a JSON object literal.
    pub fn with_entries(entries: Entries) -> Self {
        Self { entries: Mutex::new(entries), writes: AtomicU32::new(0) }
    }

    /// Copy of every stored entry.
    pub fn snapshot(&self) -> Entries {
        self.entries.lock().clone()
    }

    /// Number of `set` calls since creation.
    pub fn write_count(&self) -> u32 {
        self.writes.load(Ordering::Relaxed)
    }
}

impl KvStore for MemoryStore {
    fn get<'a>(&'a self, keys: &'a [&'a str]) -> BoxFuture<'a, anyhow::Result<Entries>> {
        let entries = self.entries.lock();
        let out = keys
            .iter()
            .filter_map(|k| entries.get(*k).map(|v| ((*k).to_owned(), v.clone())))
            .collect();
        Box::pin(async move { Ok(out) })
    }

    fn set(&self, batch: Entries) -> BoxFuture<'_, anyhow::Result<()>> {
        self.entries.lock().extend(batch);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Box::pin(async { Ok(()) })
    }

    fn remove<'a>(&'a self, keys: &'a [&'a str]) -> BoxFuture<'a, anyhow::Result<()>> {
        let mut entries = self.entries.lock();
        for key in keys {
            entries.remove(*key);
        }
        Box::pin(async { Ok(()) })
    }
}
