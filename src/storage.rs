//! Purpose: Key/value persistence standing in for browser local/session storage.
//! Exports: `Store`, `MemoryStore`, `FileStore`, `StorageScope`.
//! Role: Injected persistence seam for the visitor counter.
//! Invariants: Values are plain strings; keys are never interpreted.
//! Invariants: `FileStore` read-modify-write cycles hold an exclusive lock.
//! Invariants: `FileStore` replaces its file atomically (write temp, then rename).
//! Invariants: Lock contention is retried a bounded number of times, then reported as `Busy`.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};

/// Where the counter flag and cached count are kept.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageScope {
    /// Survives until the store is cleared, like `localStorage`.
    #[default]
    Browser,
    /// Scoped to the invoking shell session, like `sessionStorage`.
    Session,
}

pub trait Store {
    fn get(&self, key: &str) -> Result<Option<String>, Error>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), Error>;
    fn remove(&mut self, key: &str) -> Result<(), Error>;
    fn clear(&mut self) -> Result<(), Error>;
    fn entries(&self) -> Result<BTreeMap<String, String>, Error>;
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, key: &str, value: &str) -> Self {
        self.entries.insert(key.to_string(), value.to_string());
        self
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), Error> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), Error> {
        self.entries.remove(key);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), Error> {
        self.entries.clear();
        Ok(())
    }

    fn entries(&self) -> Result<BTreeMap<String, String>, Error> {
        Ok(self.entries.clone())
    }
}

const LOCK_RETRIES: u32 = 40;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(25);

/// JSON-object file store; one file per storage scope.
#[derive(Clone, Debug)]
pub struct FileStore {
    path: PathBuf,
    lock_retries: u32,
    lock_retry_delay: Duration,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_retries: LOCK_RETRIES,
            lock_retry_delay: LOCK_RETRY_DELAY,
        }
    }

    /// How often, and how far apart, to retry a lock held by another process.
    pub fn with_lock_retry(mut self, retries: u32, delay: Duration) -> Self {
        self.lock_retries = retries;
        self.lock_retry_delay = delay;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        sibling_with_suffix(&self.path, ".lock")
    }

    fn lock(&self) -> Result<StoreLock, Error> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to create storage directory")
                    .with_path(parent)
                    .with_source(err)
            })?;
        }
        let lock_path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(|err| {
                Error::new(lock_error_kind(&err))
                    .with_message("failed to open storage lock")
                    .with_path(&lock_path)
                    .with_source(err)
            })?;
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(StoreLock { file }),
                Err(err) => {
                    let kind = lock_error_kind(&err);
                    if kind == ErrorKind::Busy && attempts <= self.lock_retries {
                        std::thread::sleep(self.lock_retry_delay);
                        continue;
                    }
                    return Err(Error::new(kind)
                        .with_message("failed to lock storage")
                        .with_path(&lock_path)
                        .with_source(err));
                }
            }
        }
    }

    /// Delete the store file and its lock file. A missing store is not an error.
    pub fn destroy(self) -> Result<(), Error> {
        let lock_path = self.lock_path();
        {
            let _lock = self.lock()?;
            remove_if_exists(&self.path)?;
            remove_if_exists(&sibling_with_suffix(&self.path, ".tmp"))?;
        }
        remove_if_exists(&lock_path)?;
        tracing::debug!(path = %self.path.display(), "storage removed");
        Ok(())
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, Error> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => {
                return Err(Error::new(ErrorKind::Io)
                    .with_message("failed to read storage file")
                    .with_path(&self.path)
                    .with_source(err));
            }
        };
        if text.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&text).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("storage file is not a JSON object of strings")
                .with_path(&self.path)
                .with_hint("Run `resumecount storage clear` to reset it.")
                .with_source(err)
        })
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), Error> {
        let encoded = serde_json::to_string_pretty(map).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode storage file")
                .with_source(err)
        })?;
        let tmp = sibling_with_suffix(&self.path, ".tmp");
        std::fs::write(&tmp, format!("{encoded}\n")).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to write storage file")
                .with_path(&tmp)
                .with_source(err)
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to replace storage file")
                .with_path(&self.path)
                .with_source(err)
        })?;
        tracing::debug!(path = %self.path.display(), keys = map.len(), "storage written");
        Ok(())
    }

    fn update(&mut self, apply: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<(), Error> {
        let _lock = self.lock()?;
        let mut map = self.read_map()?;
        apply(&mut map);
        self.write_map(&map)
    }
}

impl Store for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.read_map()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), Error> {
        self.update(|map| {
            map.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&mut self, key: &str) -> Result<(), Error> {
        self.update(|map| {
            map.remove(key);
        })
    }

    fn clear(&mut self) -> Result<(), Error> {
        self.update(BTreeMap::clear)
    }

    fn entries(&self) -> Result<BTreeMap<String, String>, Error> {
        self.read_map()
    }
}

struct StoreLock {
    file: File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

fn remove_if_exists(path: &Path) -> Result<(), Error> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(Error::new(ErrorKind::Io)
            .with_message("failed to remove storage file")
            .with_path(path)
            .with_source(err)),
    }
}

fn lock_error_kind(err: &io::Error) -> ErrorKind {
    match err.kind() {
        io::ErrorKind::WouldBlock => ErrorKind::Busy,
        _ if err.raw_os_error() == fs2::lock_contended_error().raw_os_error() => ErrorKind::Busy,
        _ => ErrorKind::Io,
    }
}
