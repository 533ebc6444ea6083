//! Driver configuration (spec.md §6). Full CLI parsing and file-based
//! config loading are out of scope (spec.md §1); this is the validated
//! struct the driver actually consumes, mirroring the teacher's plain
//! `Config` + `Default` shape (`rusty-db`'s `lib.rs::Config`).

use std::time::Duration;

use crate::error::EngineError;
use crate::sampling;

#[derive(Debug, Clone)]
pub struct Config {
    pub num_threads: usize,
    pub max_bad_alloc_errors: u32,
    pub retry_seconds: f64,
    pub max_wait_time: Option<Duration>,

    pub offset_start: Option<u64>,
    pub offset_end: Option<u64>,
    pub page_start: Option<u64>,

    pub notify_rate: u64,
    pub quiet: bool,
    pub report_read_errors: bool,

    pub sampling_fraction: Option<f64>,
    pub sampling_passes: u32,

    pub enable_rolling_hash: bool,

    /// Recursion-depth cap (SPEC_FULL.md §9.6); the original's
    /// `SBUF_MAX_DEPTH` default.
    pub max_recursion_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_threads: 4,
            max_bad_alloc_errors: 2,
            retry_seconds: 1.0,
            max_wait_time: None,
            offset_start: None,
            offset_end: None,
            page_start: None,
            notify_rate: 100,
            quiet: false,
            report_read_errors: false,
            sampling_fraction: None,
            sampling_passes: 1,
            enable_rolling_hash: true,
            max_recursion_depth: 7,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.num_threads == 0 {
            return Err(EngineError::Configuration("num_threads must be >= 1".into()));
        }
        if self.retry_seconds < 0.0 {
            return Err(EngineError::Configuration("retry_seconds must be >= 0".into()));
        }
        if let Some(fraction) = self.sampling_fraction {
            sampling::validate_fraction(fraction)?;
            sampling::validate_passes(self.sampling_passes)?;
        }
        if let (Some(start), Some(end)) = (self.offset_start, self.offset_end) {
            if start > end {
                return Err(EngineError::Configuration(format!(
                    "offset_start ({start}) must be <= offset_end ({end})"
                )));
            }
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.retry_seconds.max(0.0))
    }

    pub fn is_sampling(&self) -> bool {
        self.sampling_fraction.is_some()
    }
}
