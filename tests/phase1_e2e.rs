// End-to-end scenarios for the phase-1 engine (S1 through S6).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use extractor_phase1::config::Config;
use extractor_phase1::driver::Phase1Driver;
use extractor_phase1::image::{ImageIterator, ReadPageError};
use extractor_phase1::page::PageBuffer;
use extractor_phase1::pool::JoinOutcome;
use extractor_phase1::position::Position;
use extractor_phase1::report::InMemoryReportSink;
use extractor_phase1::scanner::{DiagnosticSink, Recursor, Scanner, ScannerSet};
use sha1::{Digest, Sha1};

/// Fixed-size-page in-memory image, with optional scripted out-of-memory
/// faults at specific page numbers.
struct FixedPageImage {
    data: Vec<u8>,
    pagesize: usize,
    cursor_page: u64,
    oom_faults: std::collections::HashMap<u64, u32>,
}

impl FixedPageImage {
    fn new(data: Vec<u8>, pagesize: usize) -> Self {
        Self { data, pagesize, cursor_page: 0, oom_faults: Default::default() }
    }

    fn with_oom_fault(mut self, page_number: u64, count: u32) -> Self {
        self.oom_faults.insert(page_number, count);
        self
    }

    fn total_pages(&self) -> u64 {
        (self.data.len() as u64).div_ceil(self.pagesize as u64)
    }
}

impl ImageIterator for FixedPageImage {
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

    fn read_page(&mut self) -> Result<PageBuffer, ReadPageError> {
        if let Some(remaining) = self.oom_faults.get_mut(&self.cursor_page) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ReadPageError::OutOfMemory(format!(
                    "page {} simulated allocation failure",
                    self.cursor_page
                )));
            }
        }
        let start = (self.cursor_page as usize) * self.pagesize;
        let end = (start + self.pagesize).min(self.data.len());
        let pos0 = self.get_pos0();
        let bytes = Bytes::copy_from_slice(&self.data[start..end]);
        let pagesize = bytes.len();
        Ok(PageBuffer::new(pos0, bytes, pagesize))
    }
}

struct NullSink;
impl DiagnosticSink for NullSink {
    fn exception(&self, _name: &str, _pos0: &Position, _detail: &str) {}
}

#[derive(Default)]
struct FirstByteScanner {
    seen: Mutex<Vec<(Position, u8)>>,
}

impl Scanner for FirstByteScanner {
    fn name(&self) -> &str {
        "first_byte"
    }

    fn scan(&self, page: &PageBuffer, _recursor: &Recursor<'_>) {
        let byte = page.page().first().copied().unwrap_or(0);
        self.seen.lock().unwrap().push((page.pos0().clone(), byte));
    }
}

fn config_with_threads(threads: usize) -> Config {
    Config { num_threads: threads, ..Config::default() }
}

#[test]
fn s1_sequential_full_pass() {
    let pagesize = 4096usize;
    let mut data = vec![0u8; pagesize * 10];
    for (i, chunk) in data.chunks_mut(pagesize).enumerate() {
        chunk[0] = i as u8;
    }
    let mut image = FixedPageImage::new(data.clone(), pagesize);

    let scanner = Arc::new(FirstByteScanner::default());
    let scanner_set = ScannerSet::new(vec![Box::new(FirstByteScannerHandle(scanner.clone()))], Arc::new(NullSink), 7);

    let config = config_with_threads(2);
    let report = Arc::new(InMemoryReportSink::default());
    let driver = Phase1Driver::new(&config);
    let summary = driver.run(&mut image, scanner_set, &config, report).unwrap();

    let mut seen = scanner.seen.lock().unwrap().clone();
    seen.sort_by_key(|(pos, _)| pos.root_offset());
    assert_eq!(seen.len(), 10);
    for (i, (_, byte)) in seen.iter().enumerate() {
        assert_eq!(*byte, i as u8);
    }

    let expected: String = {
        let mut hasher = Sha1::new();
        hasher.update(&data);
        hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
    };
    assert_eq!(summary.hash_digest.as_deref(), Some(expected.as_str()));
}

#[test]
fn s2_offset_gate_skips_hash() {
    let pagesize = 4096usize;
    let mut data = vec![0u8; pagesize * 10];
    for (i, chunk) in data.chunks_mut(pagesize).enumerate() {
        chunk[0] = i as u8;
    }
    let mut image = FixedPageImage::new(data, pagesize);

    let scanner = Arc::new(FirstByteScanner::default());
    let scanner_set = ScannerSet::new(vec![Box::new(FirstByteScannerHandle(scanner.clone()))], Arc::new(NullSink), 7);

    let mut config = config_with_threads(2);
    config.offset_start = Some(12288); // page 3
    let report = Arc::new(InMemoryReportSink::default());
    let driver = Phase1Driver::new(&config);
    let summary = driver.run(&mut image, scanner_set, &config, report).unwrap();

    assert_eq!(scanner.seen.lock().unwrap().len(), 7);
    assert!(summary.hash_digest.is_none());
}

#[test]
fn s3_sampling_cardinality_and_no_duplicates() {
    let pagesize = 512usize;
    let data = vec![0u8; pagesize * 1000];
    let mut image = FixedPageImage::new(data, pagesize);

    let scanner = Arc::new(FirstByteScanner::default());
    let scanner_set = ScannerSet::new(vec![Box::new(FirstByteScannerHandle(scanner.clone()))], Arc::new(NullSink), 7);

    let mut config = config_with_threads(2);
    config.sampling_fraction = Some(0.1);
    config.sampling_passes = 2;
    let report = Arc::new(InMemoryReportSink::default());
    let driver = Phase1Driver::new(&config);
    driver.run(&mut image, scanner_set, &config, report).unwrap();

    let seen = scanner.seen.lock().unwrap();
    let positions: std::collections::HashSet<_> = seen.iter().map(|(pos, _)| pos.as_key()).collect();
    assert_eq!(positions.len(), seen.len(), "no position should repeat across passes");
    assert_eq!(positions.len(), 100);
}

struct FakeDecoderScanner {
    child_pages: usize,
    child_pagesize: usize,
}

impl Scanner for FakeDecoderScanner {
    fn name(&self) -> &str {
        "fake_decoder"
    }

    fn scan(&self, page: &PageBuffer, recursor: &Recursor<'_>) {
        if page.pos0().depth() > 0 {
            return; // only decode the original leaf, not its own children
        }
        for i in 0..self.child_pages {
            let payload = Bytes::from(vec![i as u8; self.child_pagesize]);
            let child = page.derive("BLOB", Some((i * self.child_pagesize) as u64), payload);
            recursor.recurse(child);
        }
    }
}

#[test]
fn s4_recursion_tags_every_derived_position() {
    let pagesize = 4096usize;
    let mut image = FixedPageImage::new(vec![0u8; pagesize], pagesize);

    let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let seen_positions: Arc<Mutex<Vec<Position>>> = Arc::new(Mutex::new(Vec::new()));

    struct RecordingCounter {
        counter: Arc<std::sync::atomic::AtomicUsize>,
        positions: Arc<Mutex<Vec<Position>>>,
        decoder: FakeDecoderScanner,
    }
    impl Scanner for RecordingCounter {
        fn name(&self) -> &str {
            "recording_counter"
        }
        fn scan(&self, page: &PageBuffer, recursor: &Recursor<'_>) {
            self.counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.positions.lock().unwrap().push(page.pos0().clone());
            self.decoder.scan(page, recursor);
        }
    }

    let scanner = RecordingCounter {
        counter: counter.clone(),
        positions: seen_positions.clone(),
        decoder: FakeDecoderScanner { child_pages: 3, child_pagesize: 16 },
    };
    let scanner_set = ScannerSet::new(vec![Box::new(scanner)], Arc::new(NullSink), 7);

    let config = config_with_threads(1);
    let report = Arc::new(InMemoryReportSink::default());
    let driver = Phase1Driver::new(&config);
    let summary = driver.run(&mut image, scanner_set, &config, report).unwrap();
    assert_eq!(summary.join_outcome, JoinOutcome::Drained);

    assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 4); // 1 leaf + 3 derived
    let positions = seen_positions.lock().unwrap();
    let leaf = positions.iter().find(|p| p.depth() == 0).unwrap();
    for p in positions.iter().filter(|p| p.depth() > 0) {
        assert!(p.is_descendant_of(leaf));
    }
}

#[test]
fn s5_allocator_retry_succeeds_then_exhausts() {
    let pagesize = 4096usize;

    // max_bad_alloc_errors = 3: two faults then success.
    let mut image = FixedPageImage::new(vec![0u8; pagesize], pagesize).with_oom_fault(0, 2);
    let scanner = Arc::new(FirstByteScanner::default());
    let scanner_set = ScannerSet::new(vec![Box::new(FirstByteScannerHandle(scanner.clone()))], Arc::new(NullSink), 7);
    let mut config = config_with_threads(1);
    config.max_bad_alloc_errors = 3;
    let report = Arc::new(InMemoryReportSink::default());
    let driver = Phase1Driver::new(&config);
    driver.run(&mut image, scanner_set, &config, report.clone()).unwrap();
    assert_eq!(scanner.seen.lock().unwrap().len(), 1);
    let retry_events = report.events().iter().filter(|e| e.contains("bad_alloc")).count();
    assert_eq!(retry_events, 2);

    // max_bad_alloc_errors = 1: two faults exceeds the budget, run fails.
    let mut image2 = FixedPageImage::new(vec![0u8; pagesize], pagesize).with_oom_fault(0, 2);
    let scanner2 = Arc::new(FirstByteScanner::default());
    let scanner_set2 = ScannerSet::new(vec![Box::new(FirstByteScannerHandle(scanner2))], Arc::new(NullSink), 7);
    let mut config2 = config_with_threads(1);
    config2.max_bad_alloc_errors = 1;
    let report2 = Arc::new(InMemoryReportSink::default());
    let driver2 = Phase1Driver::new(&config2);
    let result = driver2.run(&mut image2, scanner_set2, &config2, report2).unwrap_err();
    assert!(matches!(result, extractor_phase1::EngineError::RetryExhausted { attempts: 2, .. }));
}

#[test]
fn s6_drain_timeout_still_finalizes() {
    struct SlowScanner {
        delay: Duration,
    }
    impl Scanner for SlowScanner {
        fn name(&self) -> &str {
            "slow"
        }
        fn scan(&self, _page: &PageBuffer, _recursor: &Recursor<'_>) {
            std::thread::sleep(self.delay);
        }
    }

    let pagesize = 4096usize;
    let mut image = FixedPageImage::new(vec![0u8; pagesize * 2], pagesize);
    let scanner_set = ScannerSet::new(
        vec![Box::new(SlowScanner { delay: Duration::from_millis(500) })],
        Arc::new(NullSink),
        7,
    );

    let mut config = config_with_threads(1);
    config.max_wait_time = Some(Duration::from_millis(20));
    let report = Arc::new(InMemoryReportSink::default());
    let driver = Phase1Driver::new(&config);
    let summary = driver.run(&mut image, scanner_set, &config, report.clone()).unwrap();

    assert_eq!(summary.join_outcome, JoinOutcome::TimedOut);
    let events = report.events();
    assert!(events.iter().any(|e| e == "flush"));
}

/// Adapter so a `&Arc<FirstByteScanner>` fake can sit in a `Box<dyn Scanner>`.
struct FirstByteScannerHandle(Arc<FirstByteScanner>);
impl Scanner for FirstByteScannerHandle {
    fn name(&self) -> &str {
        self.0.name()
    }
    fn scan(&self, page: &PageBuffer, recursor: &Recursor<'_>) {
        self.0.scan(page, recursor)
    }
}
