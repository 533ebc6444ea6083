use thiserror::Error;

use crate::position::Position;

/// Error taxonomy for the phase-1 scheduling and recursion engine.
///
/// Every variant here is fatal to a run (aborts `Phase1Driver::run`);
/// per-page failures that the dispatch loop recovers from (a transient
/// OOM, a bad read) are represented by `ReadPageError` and routed to the
/// report sink instead, never promoted to an `EngineError` unless the
/// retry budget is exhausted.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("allocator retry budget exhausted at {pos0} after {attempts} attempts")]
    RetryExhausted { pos0: Position, attempts: u32 },

    #[error("failed to build worker pool: {0}")]
    PoolBuild(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
