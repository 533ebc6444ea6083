//! The scanner-set contract (external collaborator): only the shape
//! scanners must satisfy to plug into the pool is defined here, plus
//! small in-memory fakes for this crate's own tests.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::page::PageBuffer;
use crate::pool::WorkerPool;
use crate::position::Position;

/// Sink for scanner-set diagnostics: uncaught scanner panics and
/// recursion-depth rejections. Implementations must be reentrant — they
/// are called concurrently from every worker thread.
pub trait DiagnosticSink: Send + Sync {
    fn exception(&self, name: &str, pos0: &Position, detail: &str);
}

/// A content recognizer invoked against every page in registration order.
///
/// Scanners must be reentrant: the same scanner instance runs
/// concurrently on distinct pages (different worker threads) and
/// recursively on the same thread (via [`Recursor::recurse`]).
pub trait Scanner: Send + Sync {
    fn name(&self) -> &str;

    /// Inspect `page`. A scanner that finds a decodable substructure
    /// builds the derived page itself and calls `recursor.recurse(..)`.
    fn scan(&self, page: &PageBuffer, recursor: &Recursor<'_>);
}

/// Handle a scanner uses to submit a derived page back into the pool.
/// Borrowed for the duration of one `scan` call; recursion runs
/// synchronously from the scanner's point of view even though it may
/// enqueue the child for another worker to execute.
pub struct Recursor<'a> {
    scanner_set: &'a Arc<ScannerSet>,
    pool: &'a WorkerPool,
}

impl<'a> Recursor<'a> {
    pub fn recurse(&self, child: PageBuffer) {
        self.scanner_set.recurse(self.pool, child);
    }
}

/// Registry of scanners, invoked synchronously against one page at a
/// time. Shared read-only across all workers.
pub struct ScannerSet {
    scanners: Vec<Box<dyn Scanner>>,
    sink: Arc<dyn DiagnosticSink>,
    max_recursion_depth: usize,
}

impl ScannerSet {
    pub fn new(
        scanners: Vec<Box<dyn Scanner>>,
        sink: Arc<dyn DiagnosticSink>,
        max_recursion_depth: usize,
    ) -> Arc<Self> {
        Arc::new(Self { scanners, sink, max_recursion_depth })
    }

    /// Run every registered scanner against `page`, in registration
    /// order. A panicking scanner is caught and logged; it never
    /// poisons the worker or stops the remaining scanners.
    pub fn process(self: &Arc<Self>, page: &PageBuffer, pool: &WorkerPool) {
        let recursor = Recursor { scanner_set: self, pool };
        for scanner in &self.scanners {
            let result = catch_unwind(AssertUnwindSafe(|| scanner.scan(page, &recursor)));
            if let Err(panic) = result {
                let detail = panic_message(&panic);
                self.sink.exception(
                    &format!("scanner_panic[{}]", scanner.name()),
                    page.pos0(),
                    &detail,
                );
            }
        }
    }

    /// Enqueue a derived page as a new work unit, unless the recursion
    /// depth cap (`max_recursion_depth`) would be exceeded.
    fn recurse(self: &Arc<Self>, pool: &WorkerPool, child: PageBuffer) {
        if child.pos0().depth() > self.max_recursion_depth {
            self.sink.exception(
                "max_depth_exceeded",
                child.pos0(),
                &format!("depth {} exceeds cap {}", child.pos0().depth(), self.max_recursion_depth),
            );
            return;
        }
        pool.submit(crate::workunit::WorkUnit::new(self.clone(), child));
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
