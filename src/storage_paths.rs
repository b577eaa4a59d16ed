//! Purpose: Resolve where persisted counter state and config live on disk.
//! Exports: `default_storage_dir`, `default_config_path`, `store_path`.
//! Role: Keep CLI and library path semantics aligned from one source.
//! Invariants: Default storage directory remains `~/.resumecount`.
//! Invariants: Session-scoped files are keyed by the invoking shell's pid.

use std::path::{Path, PathBuf};

use crate::storage::StorageScope;

pub fn default_storage_dir() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home).join(".resumecount")
}

pub fn default_config_path() -> PathBuf {
    default_storage_dir().join("config.json")
}

pub fn store_path(scope: StorageScope, dir: &Path) -> PathBuf {
    match scope {
        StorageScope::Browser => dir.join("local.json"),
        StorageScope::Session => dir.join(format!("session-{}.json", session_id())),
    }
}

#[cfg(unix)]
fn session_id() -> u32 {
    std::os::unix::process::parent_id()
}

#[cfg(not(unix))]
fn session_id() -> u32 {
    std::process::id()
}
