//! Progress event stream emitted by the pipeline.
//!
//! Events are facts about run progress, not commands. The binary renders
//! them on a spinner; library consumers can subscribe to the receiver
//! directly. A closed receiver is never an error for the emitting side.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Severity level of a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressLevel {
    /// Routine progress.
    Info,
    /// Recoverable oddity (empty result page, skipped job).
    Warn,
    /// A failure that was absorbed (per-job delivery error).
    Error,
    /// A milestone (login confirmed, job delivered).
    Success,
}

/// A single progress event with optional position counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Severity level.
    pub level: ProgressLevel,
    /// Human-readable message.
    pub message: String,
    /// Current position when the event is part of a counted sequence.
    pub current: Option<usize>,
    /// Total count when known.
    pub total: Option<usize>,
}

impl ProgressEvent {
    /// Creates an event without counters.
    #[must_use]
    pub fn new(level: ProgressLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            current: None,
            total: None,
        }
    }

    /// Attaches `current`/`total` counters.
    #[must_use]
    pub fn with_counts(mut self, current: usize, total: usize) -> Self {
        self.current = Some(current);
        self.total = Some(total);
        self
    }
}

/// Cloneable handle used by pipeline components to emit progress.
///
/// Emission is fire-and-forget: a dropped receiver silently discards
/// events instead of failing the run.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressReporter {
    /// Creates a reporter and the receiver end of its channel.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Creates a reporter that discards every event. Used by tests and
    /// by callers that do not render progress.
    #[must_use]
    pub fn sink() -> Self {
        Self { tx: None }
    }

    /// Emits an info-level event.
    pub fn info(&self, message: impl Into<String>) {
        self.emit(ProgressEvent::new(ProgressLevel::Info, message));
    }

    /// Emits a warn-level event.
    pub fn warn(&self, message: impl Into<String>) {
        self.emit(ProgressEvent::new(ProgressLevel::Warn, message));
    }

    /// Emits an error-level event.
    pub fn error(&self, message: impl Into<String>) {
        self.emit(ProgressEvent::new(ProgressLevel::Error, message));
    }

    /// Emits a success-level event.
    pub fn success(&self, message: impl Into<String>) {
        self.emit(ProgressEvent::new(ProgressLevel::Success, message));
    }

    /// Emits an info-level event with position counters.
    pub fn step(&self, message: impl Into<String>, current: usize, total: usize) {
        self.emit(ProgressEvent::new(ProgressLevel::Info, message).with_counts(current, total));
    }

    /// Sends the event, ignoring a closed receiver.
    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_event_with_counts() {
        let event = ProgressEvent::new(ProgressLevel::Info, "投递中").with_counts(3, 10);
        assert_eq!(event.current, Some(3));
        assert_eq!(event.total, Some(10));
    }

    #[test]
    fn test_event_serializes() {
        let event = ProgressEvent::new(ProgressLevel::Success, "登录成功");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("success"));
        assert!(json.contains("登录成功"));
    }

    #[test]
    fn test_event_roundtrip() {
        let event = ProgressEvent::new(ProgressLevel::Warn, "页面无结果").with_counts(1, 5);
        let json = serde_json::to_string(&event).unwrap();
        let parsed: ProgressEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.level, ProgressLevel::Warn);
        assert_eq!(parsed.message, "页面无结果");
        assert_eq!(parsed.current, Some(1));
    }

    #[test]
    fn test_reporter_delivers_in_order() {
        let (reporter, mut rx) = ProgressReporter::channel();
        reporter.info("first");
        reporter.success("second");

        let first = rx.try_recv().unwrap();
        assert_eq!(first.level, ProgressLevel::Info);
        assert_eq!(first.message, "first");
        let second = rx.try_recv().unwrap();
        assert_eq!(second.level, ProgressLevel::Success);
    }

    #[test]
    fn test_reporter_survives_dropped_receiver() {
        let (reporter, rx) = ProgressReporter::channel();
        drop(rx);
        reporter.error("nobody listening");
    }

    #[test]
    fn test_sink_discards() {
        let reporter = ProgressReporter::sink();
        reporter.step("quiet", 1, 2);
    }
}
