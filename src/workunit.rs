//! One `(scanner-set, page)` task.

use std::sync::Arc;

use crate::page::PageBuffer;
use crate::pool::WorkerPool;
use crate::scanner::ScannerSet;

/// Exclusively owns one page buffer and a shared reference to the
/// scanner set it will run against. Created by the driver, or by
/// recursion from inside a scanner. Destroyed when `execute` returns.
pub struct WorkUnit {
    scanner_set: Arc<ScannerSet>,
    page: PageBuffer,
}

impl WorkUnit {
    pub fn new(scanner_set: Arc<ScannerSet>, page: PageBuffer) -> Self {
        Self { scanner_set, page }
    }

    /// Run every scanner against the owned page. `pool` is threaded
    /// through so a scanner can recurse by submitting a new work unit.
    pub fn execute(self, pool: &WorkerPool) {
        self.scanner_set.process(&self.page, pool);
        // `self.page` drops here: exactly once, after all scanners ran.
    }
}
