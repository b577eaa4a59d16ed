//! Purpose: Library crate behind the `resumecount` CLI and its tests.
//! Exports: `counter`, `endpoint`, `storage`, `typewriter`, `page`, `config`, `notice`.
//! Role: Page-load behaviors of the résumé site with every side effect behind a trait.
//! Invariants: Counter logic never touches global state; storage and network are injected.
//! Invariants: Counting failures are recovered locally and never surface as errors.
pub mod config;
pub mod core;
pub mod counter;
pub mod endpoint;
pub mod notice;
pub mod page;
pub mod storage;
pub mod storage_paths;
pub mod typewriter;

pub use crate::core::error::{Error, ErrorKind, to_exit_code};
