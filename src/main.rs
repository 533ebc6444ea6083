//! Phase-1 engine smoke-run binary.
//!
//! Full argument parsing, image-source selection, and report-file
//! writing are out of scope for this core (spec.md §1); this binary
//! exists to wire the pieces together end to end against a trivial
//! in-memory image and print what the engine produced.

use std::sync::Arc;

use bytes::Bytes;
use extractor_phase1::config::Config;
use extractor_phase1::driver::Phase1Driver;
use extractor_phase1::image::ImageIterator;
use extractor_phase1::page::PageBuffer;
use extractor_phase1::position::Position;
use extractor_phase1::report::{InMemoryReportSink, ReportDiagnosticSink};
use extractor_phase1::scanner::{Recursor, Scanner, ScannerSet};
use extractor_phase1::Result;

/// A fixed-size-page in-memory image. Real image sources (disk image,
/// raw device, file) live outside this core; this is only enough to
/// drive one demonstration pass.
struct DemoImage {
    data: Vec<u8>,
    pagesize: usize,
    cursor_page: u64,
}

impl DemoImage {
    fn total_pages(&self) -> u64 {
        (self.data.len() as u64).div_ceil(self.pagesize as u64)
    }
}

impl ImageIterator for DemoImage {
    fn is_done(&self) -> bool {
        self.cursor_page >= self.total_pages()
    }

    fn advance(&mut self) {
        if !self.is_done() {
            self.cursor_page += 1;
        }
    }

    fn seek_block(&mut self, block: u64) {
        self.cursor_page = block;
    }

    fn seek_raw(&mut self, offset: u64) {
        self.cursor_page = offset / self.pagesize as u64;
    }

    fn max_blocks(&self) -> u64 {
        self.total_pages()
    }

    fn fraction_done(&self) -> f64 {
        let total = self.total_pages();
        if total == 0 {
            1.0
        } else {
            (self.cursor_page as f64 / total as f64).min(1.0)
        }
    }

    fn raw_offset(&self) -> u64 {
        self.cursor_page * self.pagesize as u64
    }

    fn page_number(&self) -> u64 {
        self.cursor_page
    }

    fn get_pos0(&self) -> Position {
        Position::from_offset(self.raw_offset())
    }

    fn read_page(&mut self) -> Result<PageBuffer, extractor_phase1::image::ReadPageError> {
        let start = (self.cursor_page as usize) * self.pagesize;
        let end = (start + self.pagesize).min(self.data.len());
        let pos0 = self.get_pos0();
        let bytes = Bytes::copy_from_slice(&self.data[start..end]);
        let pagesize = bytes.len();
        Ok(PageBuffer::new(pos0, bytes, pagesize))
    }
}

/// Reports the offset of every byte equal to 0xFF, and hands every page
/// to the recursor so nested structure (if any scanner found it) would
/// also be scanned; this demo never actually decodes anything.
struct FfByteScanner;

impl Scanner for FfByteScanner {
    fn name(&self) -> &str {
        "ff_byte"
    }

    fn scan(&self, page: &PageBuffer, _recursor: &Recursor<'_>) {
        let hits = page.page().iter().filter(|&&b| b == 0xFF).count();
        if hits > 0 {
            tracing::debug!(pos0 = %page.pos0(), hits, "ff_byte scanner hit");
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::default();

    let mut image = DemoImage { data: vec![0u8; 4096 * 16], pagesize: 4096 };
    image.data[4096 * 3 + 10] = 0xFF;
    image.data[4096 * 9] = 0xFF;

    let report = Arc::new(InMemoryReportSink::default());
    let scanner_set = ScannerSet::new(
        vec![Box::new(FfByteScanner)],
        Arc::new(ReportDiagnosticSink::new(report.clone())),
        config.max_recursion_depth,
    );

    let driver = Phase1Driver::new(&config);
    let summary = driver.run(&mut image, scanner_set, &config, report.clone())?;

    tracing::info!(
        total_bytes = summary.total_bytes,
        pages_submitted = summary.pages_submitted,
        digest = summary.hash_digest.as_deref().unwrap_or("<none>"),
        join_outcome = ?summary.join_outcome,
        "phase-1 run complete"
    );
    for event in report.events() {
        println!("{event}");
    }

    Ok(())
}
