//! Phase-1 driver (spec.md §4.1–§4.2): the producer thread that paces
//! the image, gates and dedups candidates, acquires pages under the
//! allocator-retry policy, updates the rolling hash, and feeds the
//! worker pool.

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;

use crate::config::Config;
use crate::error::EngineError;
use crate::hash::RollingHash;
use crate::image::ImageIterator;
use crate::pool::{JoinOutcome, WorkerPool};
use crate::position::Position;
use crate::progress::ProgressReporter;
use crate::report::ReportSink;
use crate::retry::{AllocatorRetryPolicy, RetryOutcome};
use crate::sampling::SamplingPlan;
use crate::scanner::ScannerSet;
use crate::workunit::WorkUnit;

/// What finalization reports back to the caller.
#[derive(Debug)]
pub struct RunSummary {
    pub total_bytes: u64,
    pub pages_submitted: u64,
    pub hash_digest: Option<String>,
    pub join_outcome: JoinOutcome,
}

pub struct Phase1Driver {
    seen: HashSet<String>,
    rolling_hash: RollingHash,
    progress: ProgressReporter,
    retry_policy: AllocatorRetryPolicy,
    total_bytes: u64,
}

impl Phase1Driver {
    pub fn new(config: &Config) -> Self {
        Self {
            seen: HashSet::new(),
            rolling_hash: RollingHash::new(config.enable_rolling_hash),
            progress: ProgressReporter::new(config.notify_rate, config.quiet, config.is_sampling()),
            retry_policy: AllocatorRetryPolicy::new(config.max_bad_alloc_errors, config.retry_delay()),
            total_bytes: 0,
        }
    }

    /// Run one full phase-1 pass: build the pool, dispatch every
    /// candidate page, drain with a deadline, then finalize the report.
    pub fn run(
        mut self,
        image: &mut dyn ImageIterator,
        scanner_set: Arc<ScannerSet>,
        config: &Config,
        report: Arc<dyn ReportSink>,
    ) -> Result<RunSummary, EngineError> {
        config.validate()?;

        let pool = WorkerPool::new(config.num_threads, config.num_threads * 2)?;
        report.push("runtime", &[("xmlns:debug", "http://example.org/debug")]);

        let dispatch_result = self.dispatch_all(image, &scanner_set, &pool, config, &report);

        let join_outcome = pool.join(config.max_wait_time);
        if join_outcome == JoinOutcome::TimedOut {
            tracing::warn!("worker pool drain exceeded max_wait_time; finalizing anyway");
            report.comment("drain timed out before max_wait_time elapsed");
        }
        pool.stop();

        if let Err(e) = dispatch_result {
            report.pop();
            report.flush();
            return Err(e);
        }

        let hash_digest = self.rolling_hash.finalize();
        if let Some(digest) = &hash_digest {
            report.emit("source/hashdigest", digest, &[("type", "SHA1")]);
            tracing::info!(digest = %digest, "rolling hash emitted");
        }

        let stats = pool.stats();
        report.emit(
            "runtime/worker_stats",
            "",
            &[
                ("tasks_executed", &stats.tasks_executed.load(std::sync::atomic::Ordering::Relaxed).to_string()),
                ("idle_time_ns", &stats.idle_time_ns.load(std::sync::atomic::Ordering::Relaxed).to_string()),
                ("inline_recursions", &stats.inline_recursions.load(std::sync::atomic::Ordering::Relaxed).to_string()),
            ],
        );
        report.pop();
        report.flush();

        Ok(RunSummary {
            total_bytes: self.total_bytes,
            pages_submitted: self.seen.len() as u64,
            hash_digest,
            join_outcome,
        })
    }

    fn dispatch_all(
        &mut self,
        image: &mut dyn ImageIterator,
        scanner_set: &Arc<ScannerSet>,
        pool: &WorkerPool,
        config: &Config,
        report: &Arc<dyn ReportSink>,
    ) -> Result<(), EngineError> {
        match config.sampling_fraction {
            None => self.dispatch_sequential(image, scanner_set, pool, config, report),
            Some(fraction) => self.dispatch_sampling(image, scanner_set, pool, config, report, fraction),
        }
    }

    fn dispatch_sequential(
        &mut self,
        image: &mut dyn ImageIterator,
        scanner_set: &Arc<ScannerSet>,
        pool: &WorkerPool,
        config: &Config,
        report: &Arc<dyn ReportSink>,
    ) -> Result<(), EngineError> {
        if let Some(start) = config.offset_start {
            image.seek_raw(start);
        }

        while !image.is_done() {
            let raw_offset = image.raw_offset();
            if let Some(end) = config.offset_end {
                if raw_offset >= end {
                    break;
                }
            }
            let pos0 = image.get_pos0();
            let page_number = image.page_number();
            let fraction_done = image.fraction_done();

            if let ControlFlow::Break(e) = self.process_candidate(
                image, scanner_set, pool, config, report, pos0, raw_offset, page_number, fraction_done,
            ) {
                return Err(e);
            }
            image.advance();
        }
        Ok(())
    }

    fn dispatch_sampling(
        &mut self,
        image: &mut dyn ImageIterator,
        scanner_set: &Arc<ScannerSet>,
        pool: &WorkerPool,
        config: &Config,
        report: &Arc<dyn ReportSink>,
        fraction: f64,
    ) -> Result<(), EngineError> {
        let max_blocks = image.max_blocks();
        let mut rng = rand::rng();
        let plan = SamplingPlan::build(max_blocks, fraction, &mut rng)?;

        for _pass in 0..config.sampling_passes {
            for &block in plan.blocks() {
                image.seek_block(block);
                if image.is_done() {
                    continue;
                }
                let raw_offset = image.raw_offset();
                let pos0 = image.get_pos0();
                let page_number = image.page_number();
                let fraction_done = image.fraction_done();

                if let ControlFlow::Break(e) = self.process_candidate(
                    image, scanner_set, pool, config, report, pos0, raw_offset, page_number, fraction_done,
                ) {
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Shared steps 1–8 of spec.md §4.2 for one candidate page. The
    /// caller is responsible for advancing the iterator afterwards;
    /// this only decides whether to gate, dedup, read, and submit.
    #[allow(clippy::too_many_arguments)]
    fn process_candidate(
        &mut self,
        image: &mut dyn ImageIterator,
        scanner_set: &Arc<ScannerSet>,
        pool: &WorkerPool,
        config: &Config,
        report: &Arc<dyn ReportSink>,
        pos0: Position,
        raw_offset: u64,
        page_number: u64,
        fraction_done: f64,
    ) -> ControlFlow<EngineError> {
        let page_start = config.page_start.unwrap_or(0);
        let offset_start = config.offset_start.unwrap_or(0);
        if page_number < page_start || raw_offset < offset_start {
            return ControlFlow::Continue(());
        }

        let key = pos0.as_key();
        if !self.seen.insert(key.clone()) {
            return ControlFlow::Continue(());
        }

        let retry_policy = &self.retry_policy;
        let outcome = retry_policy.read_with_retry(
            &pos0,
            || image.read_page(),
            |p, count| {
                tracing::debug!(pos0 = %p, retry_count = count, "bad_alloc retry");
                report.emit(
                    "debug:exception",
                    "bad_alloc",
                    &[("name", "bad_alloc"), ("pos0", &p.as_key()), ("retry_count", &count.to_string())],
                );
            },
        );

        match outcome {
            RetryOutcome::Exhausted(e) => ControlFlow::Break(e),
            RetryOutcome::NonFatalError(detail) => {
                report.emit("debug:exception", &detail, &[("pos0", &key)]);
                if config.report_read_errors {
                    tracing::error!(pos0 = %key, "{detail}");
                }
                ControlFlow::Continue(())
            }
            RetryOutcome::Done(page) => {
                self.rolling_hash.observe(raw_offset, page.page());
                self.total_bytes += page.pagesize() as u64;

                let label = pos0.to_string();
                pool.submit(WorkUnit::new(scanner_set.clone(), page));
                self.progress.tick(&label, fraction_done);

                ControlFlow::Continue(())
            }
        }
    }
}
