//! Purpose: Visitor counter page-load logic (flag check, one request, render, fallback).
//! Exports: `VisitorCounter`, `CounterPolicy`, `RepeatVisit`, `FirstVisitFailure`, `Visit`.
//! Role: Coordinates an injected `Store` and `CountingEndpoint`; owns no I/O itself.
//! Invariants: At most one endpoint call and at most two storage writes per load.
//! Invariants: Rendered text is always `Visitors: <n>`; `load` never fails.
//! Invariants: Fallback order is fresh value, then cached value, then `0`.
//! Invariants: An unreadable flag never leads to an increment.

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::endpoint::CountingEndpoint;
use crate::page::TextSlot;
use crate::storage::Store;

/// Storage key marking that this client already incremented the remote count.
pub const COUNTED_KEY: &str = "visitorCounted";
/// Storage key holding the last successfully observed count.
pub const COUNT_KEY: &str = "visitorCount";
const COUNTED_VALUE: &str = "true";
const DEFAULT_COUNT: u64 = 0;

/// What a load does once the counter flag is already set.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RepeatVisit {
    /// Read the current count from the endpoint.
    #[default]
    Refresh,
    /// Skip the network and show the cached count.
    Cached,
}

/// What happens to the counter flag when the first-visit increment fails.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FirstVisitFailure {
    /// Leave the flag unset so the next load tries to count again.
    #[default]
    Retry,
    /// Set the flag anyway; this client is never counted twice.
    MarkCounted,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct CounterPolicy {
    pub repeat_visit: RepeatVisit,
    pub first_visit_failure: FirstVisitFailure,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CountSource {
    Fresh,
    Cached,
    Default,
}

impl CountSource {
    pub fn as_str(self) -> &'static str {
        match self {
            CountSource::Fresh => "fresh",
            CountSource::Cached => "cached",
            CountSource::Default => "default",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RequestKind {
    Increment,
    Read,
    None,
}

impl RequestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestKind::Increment => "increment",
            RequestKind::Read => "read",
            RequestKind::None => "none",
        }
    }
}

/// Outcome of one page load of the counter.
#[derive(Debug)]
pub struct Visit {
    pub count: u64,
    pub source: CountSource,
    pub request: RequestKind,
    pub failure: Option<Error>,
}

impl Visit {
    pub fn display_text(&self) -> String {
        display_text(self.count)
    }
}

pub fn display_text(count: u64) -> String {
    format!("Visitors: {count}")
}

pub struct VisitorCounter<S, E> {
    store: S,
    endpoint: E,
    policy: CounterPolicy,
}

impl<S, E> VisitorCounter<S, E>
where
    S: Store,
    E: CountingEndpoint,
{
    pub fn new(store: S, endpoint: E) -> Self {
        Self {
            store,
            endpoint,
            policy: CounterPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: CounterPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    pub fn into_parts(self) -> (S, E) {
        (self.store, self.endpoint)
    }

    /// Run one page load and render the result into `slot`.
    pub async fn load_into(&mut self, slot: &mut impl TextSlot) -> Visit {
        let visit = self.load().await;
        slot.set_text(&visit.display_text());
        visit
    }

    /// Run one page load: decide the request from the flag, call the endpoint once,
    /// and fall back to cached state on failure.
    pub async fn load(&mut self) -> Visit {
        if !self.already_counted() {
            return match self.endpoint.increment().await {
                Ok(count) => {
                    self.write(COUNTED_KEY, COUNTED_VALUE);
                    self.write(COUNT_KEY, &count.to_string());
                    fresh(count, RequestKind::Increment)
                }
                Err(err) => {
                    tracing::warn!(error = %err, "error counting visitor");
                    if self.policy.first_visit_failure == FirstVisitFailure::MarkCounted {
                        self.write(COUNTED_KEY, COUNTED_VALUE);
                    }
                    self.fallback(RequestKind::Increment, Some(err))
                }
            };
        }

        match self.policy.repeat_visit {
            RepeatVisit::Cached => self.fallback(RequestKind::None, None),
            RepeatVisit::Refresh => match self.endpoint.read().await {
                Ok(count) => {
                    self.write(COUNT_KEY, &count.to_string());
                    fresh(count, RequestKind::Read)
                }
                Err(err) => {
                    tracing::warn!(error = %err, "error fetching visitor count");
                    self.fallback(RequestKind::Read, Some(err))
                }
            },
        }
    }

    fn already_counted(&self) -> bool {
        match self.store.get(COUNTED_KEY) {
            Ok(value) => value.is_some_and(|value| !value.is_empty()),
            // The flag could not be persisted either; counting now would count every load.
            Err(err) => {
                tracing::warn!(error = %err, "counter flag unreadable; treating as counted");
                true
            }
        }
    }

    fn cached_count(&self) -> Option<u64> {
        let raw = match self.store.get(COUNT_KEY) {
            Ok(raw) => raw?,
            Err(err) => {
                tracing::warn!(error = %err, "cached count unreadable");
                return None;
            }
        };
        match raw.trim().parse::<u64>() {
            Ok(count) => Some(count),
            Err(_) => {
                tracing::warn!(cached = %raw, "ignoring cached count that is not an integer");
                None
            }
        }
    }

    fn fallback(&self, request: RequestKind, failure: Option<Error>) -> Visit {
        let (count, source) = match self.cached_count() {
            Some(count) => (count, CountSource::Cached),
            None => (DEFAULT_COUNT, CountSource::Default),
        };
        Visit {
            count,
            source,
            request,
            failure,
        }
    }

    fn write(&mut self, key: &str, value: &str) {
        if let Err(err) = self.store.set(key, value) {
            tracing::warn!(key, error = %err, "failed to persist counter state");
        }
    }
}

fn fresh(count: u64, request: RequestKind) -> Visit {
    Visit {
        count,
        source: CountSource::Fresh,
        request,
        failure: None,
    }
}
