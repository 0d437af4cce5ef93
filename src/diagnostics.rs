//! Collector for recoverable failures
//!
//! Every error that the pipeline absorbs (a file that would not parse, a
//! chunk that would not embed, a generation call that timed out) is also
//! pushed here so callers can inspect what went wrong after the fact.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Entries kept before the oldest are dropped
pub const DEFAULT_CAPACITY: usize = 1000;

/// Category of a recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Parse,
    Index,
    Retrieval,
    Generation,
    GenerationTimeout,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagnosticKind::Parse => "parse",
            DiagnosticKind::Index => "index",
            DiagnosticKind::Retrieval => "retrieval",
            DiagnosticKind::Generation => "generation",
            DiagnosticKind::GenerationTimeout => "generation_timeout",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Document, chunk or operation the failure concerns
    pub subject: String,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.subject, self.message)
    }
}

/// Thread-safe, bounded list of diagnostics.
///
/// Once `capacity` entries are held, recording a new one drops the oldest.
#[derive(Debug)]
pub struct Diagnostics {
    entries: Mutex<VecDeque<Diagnostic>>,
    capacity: usize,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A collector holding at most `capacity` entries (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    // A panic while holding the lock cannot leave the deque half-pushed.
    fn entries(&self) -> MutexGuard<'_, VecDeque<Diagnostic>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(
        &self,
        kind: DiagnosticKind,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) {
        let mut entries = self.entries();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(Diagnostic {
            kind,
            subject: subject.into(),
            message: message.into(),
            recorded_at: Utc::now(),
        });
    }

    /// Copy of everything held, oldest first.
    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.entries().iter().cloned().collect()
    }

    /// Take everything held, leaving the collector empty.
    pub fn drain(&self) -> Vec<Diagnostic> {
        Vec::from(std::mem::take(&mut *self.entries()))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Number of recorded diagnostics of `kind`.
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.entries().iter().filter(|d| d.kind == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_snapshot_drain() {
        let diagnostics = Diagnostics::new();
        assert!(diagnostics.is_empty());

        diagnostics.record(DiagnosticKind::Parse, "broken.json", "expected value");
        diagnostics.record(DiagnosticKind::GenerationTimeout, "generate_test_cases", "timed out");

        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics.count(DiagnosticKind::Parse), 1);
        assert_eq!(diagnostics.count(DiagnosticKind::Generation), 0);

        let snapshot = diagnostics.snapshot();
        assert_eq!(snapshot[0].subject, "broken.json");
        assert_eq!(diagnostics.len(), 2, "snapshot does not consume");

        let drained = diagnostics.drain();
        assert_eq!(drained.len(), 2);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn oldest_entries_are_dropped_at_capacity() {
        let diagnostics = Diagnostics::with_capacity(3);
        for i in 0..5 {
            diagnostics.record(DiagnosticKind::Parse, format!("doc-{i}.txt"), "unreadable");
        }

        assert_eq!(diagnostics.len(), 3);
        let subjects: Vec<String> = diagnostics.drain().into_iter().map(|d| d.subject).collect();
        assert_eq!(subjects, vec!["doc-2.txt", "doc-3.txt", "doc-4.txt"]);

        diagnostics.record(DiagnosticKind::Index, "doc-5.txt#0", "embedding failed");
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn default_capacity() {
        assert_eq!(Diagnostics::new().capacity(), DEFAULT_CAPACITY);
        assert_eq!(Diagnostics::with_capacity(0).capacity(), 1);
    }

    #[test]
    fn display_includes_kind_and_subject() {
        let diagnostics = Diagnostics::new();
        diagnostics.record(DiagnosticKind::Index, "pricing.md#0", "embedding failed");
        assert_eq!(
            diagnostics.snapshot()[0].to_string(),
            "[index] pricing.md#0: embedding failed"
        );
    }
}
