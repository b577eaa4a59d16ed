//! Purpose: The two page elements and the page-load routine that fills them.
//! Exports: `TextSlot`, `MemorySlot`, `TerminalSlot`, `load_page`, element ids.
//! Role: Runs the typewriter and the visitor counter side by side on one event loop.
//! Invariants: The two tasks share no mutable state; each writes only its own slot.
//! Invariants: Neither task can block or fail the other.

use std::io::{self, Write};

use crate::counter::{Visit, VisitorCounter};
use crate::endpoint::CountingEndpoint;
use crate::storage::Store;
use crate::typewriter::{Clock, Typewriter};

pub const JOB_ELEMENT: &str = "job";
pub const VISITOR_COUNT_ELEMENT: &str = "visitor-count";

/// A text-bearing page element.
pub trait TextSlot {
    fn set_text(&mut self, text: &str);
}

/// Holds the current text plus every value it has shown.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemorySlot {
    history: Vec<String>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        self.history.last().map(String::as_str).unwrap_or("")
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }
}

impl TextSlot for MemorySlot {
    fn set_text(&mut self, text: &str) {
        self.history.push(text.to_string());
    }
}

/// Redraws a single terminal line in place.
pub struct TerminalSlot<W: Write> {
    out: W,
    dirty: bool,
}

impl TerminalSlot<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalSlot<W> {
    pub fn new(out: W) -> Self {
        Self { out, dirty: false }
    }

    /// End the line so later output starts on a fresh one.
    pub fn finish(mut self) -> W {
        if self.dirty {
            let result = writeln!(self.out).and_then(|()| self.out.flush());
            log_write_error(result);
        }
        self.out
    }
}

impl<W: Write> TextSlot for TerminalSlot<W> {
    fn set_text(&mut self, text: &str) {
        // \r + clear-to-end-of-line keeps the redraw on one row.
        let result = write!(self.out, "\r\x1b[2K{text}").and_then(|()| self.out.flush());
        log_write_error(result);
        self.dirty = true;
    }
}

// Terminal output is cosmetic; a closed pipe must not stop the page load.
fn log_write_error(result: io::Result<()>) {
    if let Err(err) = result {
        tracing::debug!(error = %err, "terminal write failed");
    }
}

/// Load the page: animate the job title and resolve the visitor count concurrently.
pub async fn load_page<S, E, C, J, V>(
    typewriter: &Typewriter,
    clock: &C,
    job: &mut J,
    counter: &mut VisitorCounter<S, E>,
    visitors: &mut V,
) -> Visit
where
    S: Store,
    E: CountingEndpoint,
    C: Clock,
    J: TextSlot,
    V: TextSlot,
{
    let ((), visit) = tokio::join!(typewriter.play(clock, job), counter.load_into(visitors));
    tracing::debug!(
        element = VISITOR_COUNT_ELEMENT,
        count = visit.count,
        source = visit.source.as_str(),
        request = visit.request.as_str(),
        "page loaded"
    );
    visit
}
