//! Purpose: Typewriter reveal of the job title, one character per step.
//! Exports: `Typewriter`, `RevealStep`, `Steps`, `Clock`, `TokioClock`, `VirtualClock`.
//! Role: Lazy step sequence plus a clock-driven player for the `job` element.
//! Invariants: First step waits `initial_delay`, every later step waits `interval`.
//! Invariants: Revealed prefixes end on UTF-8 character boundaries.
//! Invariants: `steps()` always restarts from the first character.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::page::TextSlot;

pub const DEFAULT_TEXT: &str = "IT Specialist";
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1500);
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

pub trait Clock {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Real time via the tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Advances virtual time instantly and remembers every requested sleep.
#[derive(Clone, Debug, Default)]
pub struct VirtualClock {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed(&self) -> Duration {
        self.sleeps().into_iter().sum()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        match self.sleeps.lock() {
            Ok(sleeps) => sleeps.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }
}

impl Clock for VirtualClock {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        match self.sleeps.lock() {
            Ok(mut sleeps) => sleeps.push(duration),
            Err(poison) => poison.into_inner().push(duration),
        }
        std::future::ready(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Typewriter {
    text: String,
    initial_delay: Duration,
    interval: Duration,
}

impl Default for Typewriter {
    fn default() -> Self {
        Self::new(DEFAULT_TEXT)
    }
}

/// One reveal: wait `delay`, then show `revealed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RevealStep<'a> {
    pub index: usize,
    pub delay: Duration,
    pub revealed: &'a str,
}

pub struct Steps<'a> {
    typewriter: &'a Typewriter,
    chars: std::str::CharIndices<'a>,
    index: usize,
}

impl Typewriter {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            initial_delay: DEFAULT_INITIAL_DELAY,
            interval: DEFAULT_INTERVAL,
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn steps(&self) -> Steps<'_> {
        Steps {
            typewriter: self,
            chars: self.text.char_indices(),
            index: 0,
        }
    }

    pub fn total_duration(&self) -> Duration {
        self.steps().map(|step| step.delay).sum()
    }

    /// Reveal every step into `slot`, sleeping on `clock` before each one.
    pub async fn play(&self, clock: &impl Clock, slot: &mut impl TextSlot) {
        for step in self.steps() {
            clock.sleep(step.delay).await;
            slot.set_text(step.revealed);
        }
        tracing::debug!(chars = self.text.chars().count(), "typewriter finished");
    }
}

impl<'a> Iterator for Steps<'a> {
    type Item = RevealStep<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (offset, ch) = self.chars.next()?;
        let end = offset + ch.len_utf8();
        let delay = if self.index == 0 {
            self.typewriter.initial_delay
        } else {
            self.typewriter.interval
        };
        let step = RevealStep {
            index: self.index,
            delay,
            revealed: &self.typewriter.text[..end],
        };
        self.index += 1;
        Some(step)
    }
}
