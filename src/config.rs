//! Purpose: Site configuration (endpoint, storage scope, counter policy, typewriter timing).
//! Exports: `SiteConfig`, `StorageConfig`, `TypewriterConfig`, `load_config`.
//! Role: JSON file layer underneath CLI flags and env overrides.
//! Invariants: Every field has a default; an absent file yields `SiteConfig::default()`.
//! Invariants: Unknown fields are rejected so typos surface as `Usage` errors.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};
use crate::counter::CounterPolicy;
use crate::endpoint::HttpEndpoint;
use crate::storage::{FileStore, StorageScope};
use crate::storage_paths::{default_storage_dir, store_path};
use crate::typewriter::{DEFAULT_INITIAL_DELAY, DEFAULT_INTERVAL, DEFAULT_TEXT, Typewriter};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    pub endpoint: Option<String>,
    pub timeout_ms: Option<u64>,
    pub storage: StorageConfig,
    pub counter: CounterPolicy,
    pub typewriter: TypewriterConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub scope: StorageScope,
    pub dir: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TypewriterConfig {
    pub text: String,
    pub initial_delay_ms: u64,
    pub interval_ms: u64,
}

impl Default for TypewriterConfig {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEXT.to_string(),
            initial_delay_ms: DEFAULT_INITIAL_DELAY.as_millis() as u64,
            interval_ms: DEFAULT_INTERVAL.as_millis() as u64,
        }
    }
}

impl SiteConfig {
    pub fn parse(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid config: {err}"))
                .with_source(err)
        })
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.storage.dir.clone().unwrap_or_else(default_storage_dir)
    }

    pub fn store(&self) -> FileStore {
        FileStore::new(store_path(self.storage.scope, &self.storage_dir()))
    }

    pub fn typewriter(&self) -> Typewriter {
        Typewriter::new(self.typewriter.text.clone())
            .with_initial_delay(Duration::from_millis(self.typewriter.initial_delay_ms))
            .with_interval(Duration::from_millis(self.typewriter.interval_ms))
    }

    pub fn endpoint(&self) -> Result<HttpEndpoint, Error> {
        let Some(url) = self.endpoint.as_deref() else {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("no counting endpoint configured")
                .with_hint(
                    "Pass --endpoint <url>, set RESUMECOUNT_ENDPOINT, or add \"endpoint\" to the config file.",
                ));
        };
        let endpoint = HttpEndpoint::new(url)?;
        Ok(match self.timeout_ms {
            Some(ms) => endpoint.with_timeout(Duration::from_millis(ms)),
            None => endpoint,
        })
    }
}

/// Read `path` if given (it must exist), else the default path if it exists, else defaults.
pub fn load_config(path: Option<&Path>, default_path: &Path) -> Result<SiteConfig, Error> {
    let (path, required) = match path {
        Some(path) => (path, true),
        None => (default_path, false),
    };
    match std::fs::read_to_string(path) {
        Ok(text) => SiteConfig::parse(&text).map_err(|err| err.with_path(path)),
        Err(err) if !required && err.kind() == std::io::ErrorKind::NotFound => {
            Ok(SiteConfig::default())
        }
        Err(err) => Err(Error::new(ErrorKind::Usage)
            .with_message("failed to read config file")
            .with_path(path)
            .with_source(err)),
    }
}
