// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON-file backed store with atomic writes.

use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use crate::store::{Entries, KvStore};
use crate::BoxFuture;

/// Store persisted as a single JSON object on disk.
///
/// The whole object is cached in memory and rewritten on every mutation.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<Entries>,
}

impl FileStore {
    /// Open (or create) the store at `path`. A missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let entries = if path.exists() { load(&path)? } else { Entries::new() };
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                std::fs::create_dir_all(dir)?;
            }
        }
        Ok(Self { path, entries: Mutex::new(entries) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KvStore for FileStore {
    fn get<'a>(&'a self, keys: &'a [&'a str]) -> BoxFuture<'a, anyhow::Result<Entries>> {
        Box::pin(async move {
            let entries = self.entries.lock().await;
            Ok(keys
                .iter()
                .filter_map(|k| entries.get(*k).map(|v| ((*k).to_owned(), v.clone())))
                .collect())
        })
    }

    fn set(&self, batch: Entries) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            let mut next = entries.clone();
            next.extend(batch);
            save(&self.path, &next)?;
            *entries = next;
            Ok(())
        })
    }

    fn remove<'a>(&'a self, keys: &'a [&'a str]) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            if !keys.iter().any(|k| entries.contains_key(*k)) {
                return Ok(());
            }
            let mut next = entries.clone();
            for key in keys {
                next.remove(*key);
            }
            save(&self.path, &next)?;
            *entries = next;
            Ok(())
        })
    }
}

fn load(path: &Path) -> anyhow::Result<Entries> {
    let contents = std::fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Entries::new());
    }
    Ok(serde_json::from_str(&contents)?)
}

/// Write tmp + rename. The temp name carries PID and a counter so that two
/// stores pointed at the same path never share a temp file.
fn save(path: &Path, entries: &Entries) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let json = serde_json::to_string_pretty(entries)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
