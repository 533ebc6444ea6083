//! Allocator-retry policy (spec.md §4.4).
//!
//! Grounded on the teacher's `core::MemoryArena`, which already
//! distinguishes an allocation failure (`DbError::OutOfMemory`) from
//! other errors and fails closed once a configured limit is exceeded.

use std::time::Duration;

use crate::error::EngineError;
use crate::image::ReadPageError;
use crate::position::Position;

pub struct AllocatorRetryPolicy {
    max_bad_alloc_errors: u32,
    retry_delay: Duration,
}

/// What the dispatch loop should do after attempting one read.
pub enum RetryOutcome<T> {
    /// Got a page.
    Done(T),
    /// A non-OOM read error: the dispatch loop records it and moves on.
    NonFatalError(String),
    /// The retry budget was exhausted: the caller must abort dispatch.
    Exhausted(EngineError),
}

impl AllocatorRetryPolicy {
    pub fn new(max_bad_alloc_errors: u32, retry_delay: Duration) -> Self {
        Self { max_bad_alloc_errors, retry_delay }
    }

    /// Attempt `read` up to `max_bad_alloc_errors + 1` times, retrying
    /// only on out-of-memory. `on_retry` is invoked once per OOM
    /// (before sleeping) so the caller can log it to stderr/report with
    /// the position and retry count (spec.md §4.4).
    pub fn read_with_retry<T>(
        &self,
        pos0: &Position,
        mut read: impl FnMut() -> Result<T, ReadPageError>,
        mut on_retry: impl FnMut(&Position, u32),
    ) -> RetryOutcome<T> {
        let mut attempt = 0u32;
        loop {
            match read() {
                Ok(page) => return RetryOutcome::Done(page),
                Err(ReadPageError::OutOfMemory(detail)) => {
                    attempt += 1;
                    if attempt > self.max_bad_alloc_errors {
                        return RetryOutcome::Exhausted(EngineError::RetryExhausted {
                            pos0: pos0.clone(),
                            attempts: attempt,
                        });
                    }
                    on_retry(pos0, attempt);
                    let _ = detail;
                    std::thread::sleep(self.retry_delay);
                }
                Err(ReadPageError::Other(detail)) => return RetryOutcome::NonFatalError(detail),
            }
        }
    }
}
