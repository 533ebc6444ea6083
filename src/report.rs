//! The XML run-report sink (external collaborator): only the push/pop/
//! emit/comment/flush contract lives here (spec.md §6), plus an
//! in-memory fake used by this crate's own tests and a stderr-mirroring
//! adapter used by the binary for `opt_report_read_errors`.

use std::sync::Mutex;

use crate::position::Position;
use crate::scanner::DiagnosticSink;

/// A single `name=value` report attribute.
pub type Attr<'a> = (&'a str, &'a str);

/// Sink for the run report. Implementations must be reentrant: workers
/// call `emit` concurrently via the scanner set's diagnostic channel,
/// while the driver itself writes `push`/`pop`/`comment`/`flush` from
/// its own (single) thread during setup and finalization.
pub trait ReportSink: Send + Sync {
    /// Open a named element, e.g. `push("runtime", &[("xmlns:debug", "...")])`.
    fn push(&self, tag: &str, attrs: &[Attr<'_>]);
    /// Close the most recently pushed element.
    fn pop(&self);
    /// Emit a leaf element with text content.
    fn emit(&self, tag: &str, text: &str, attrs: &[Attr<'_>]);
    fn comment(&self, text: &str);
    fn flush(&self);
}

/// In-memory recording sink used by tests.
#[derive(Default)]
pub struct InMemoryReportSink {
    events: Mutex<Vec<String>>,
}

impl InMemoryReportSink {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl ReportSink for InMemoryReportSink {
    fn push(&self, tag: &str, attrs: &[Attr<'_>]) {
        self.events.lock().unwrap().push(format!("push {tag} {attrs:?}"));
    }

    fn pop(&self) {
        self.events.lock().unwrap().push("pop".to_string());
    }

    fn emit(&self, tag: &str, text: &str, attrs: &[Attr<'_>]) {
        self.events
            .lock()
            .unwrap()
            .push(format!("emit {tag} {text:?} {attrs:?}"));
    }

    fn comment(&self, text: &str) {
        self.events.lock().unwrap().push(format!("comment {text:?}"));
    }

    fn flush(&self) {
        self.events.lock().unwrap().push("flush".to_string());
    }
}

/// Adapts any [`ReportSink`] into the [`DiagnosticSink`] the scanner set
/// writes to: every scanner exception becomes a `debug:exception` leaf
/// with the offending `Position` as an attribute (spec.md §6).
pub struct ReportDiagnosticSink<S: ReportSink> {
    report: std::sync::Arc<S>,
}

impl<S: ReportSink> ReportDiagnosticSink<S> {
    pub fn new(report: std::sync::Arc<S>) -> Self {
        Self { report }
    }
}

impl<S: ReportSink + 'static> DiagnosticSink for ReportDiagnosticSink<S> {
    fn exception(&self, name: &str, pos0: &Position, detail: &str) {
        let pos_str = pos0.as_key();
        self.report.emit(
            "debug:exception",
            detail,
            &[("name", name), ("pos0", pos_str.as_str())],
        );
    }
}
