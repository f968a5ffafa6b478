//! Streaming filter engine.
//!
//! Drives a bounded read → decide → write loop over one source/sink pair,
//! tolerating a limited number of unreadable records, then reconciles the
//! accepted-record count into the sink's header.

use crate::error::{PhspError, Result};
use crate::filter::{evaluate, Decision, GeometryWindow};
use crate::stream::{RecordSink, RecordSource};
use serde::{Deserialize, Serialize};

/// Default number of processed records between progress notifications.
pub const DEFAULT_PROGRESS_INTERVAL: i64 = 1_000_000;

/// Outcome of one filter run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    /// Records read successfully and classified.
    pub processed: i64,
    pub accepted: i64,
    /// Unreadable records.
    pub errors: i64,
    /// The run stopped early because `errors` exceeded the threshold.
    pub aborted: bool,
    pub rejected_backward: i64,
    pub rejected_outside: i64,
}

impl RunResult {
    /// Records that failed the window test.
    pub fn rejected(&self) -> i64 {
        self.rejected_backward + self.rejected_outside
    }

    /// Fraction of processed records that were kept.
    pub fn acceptance(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.accepted as f64 / self.processed as f64
        }
    }
}

impl std::fmt::Display for RunResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Filter Run Result")?;
        writeln!(f, "  Records processed:  {}", self.processed)?;
        writeln!(f, "  Records accepted:   {}", self.accepted)?;
        writeln!(f, "  Rejected backward:  {}", self.rejected_backward)?;
        writeln!(f, "  Rejected outside:   {}", self.rejected_outside)?;
        writeln!(f, "  Read errors:        {}", self.errors)?;
        if self.aborted {
            writeln!(f, "  Aborted: too many read errors")?;
        }
        Ok(())
    }
}

/// Running counters for a single run.
#[derive(Debug, Default)]
struct FilterRunStats {
    processed: i64,
    accepted: i64,
    errors: i64,
    rejected_backward: i64,
    rejected_outside: i64,
}

impl FilterRunStats {
    fn record(&mut self, decision: Decision) {
        match decision {
            Decision::Accept => self.accepted += 1,
            Decision::RejectBackward => self.rejected_backward += 1,
            Decision::RejectOutsideWindow => self.rejected_outside += 1,
        }
        self.processed += 1;
    }

    fn into_result(self, aborted: bool) -> RunResult {
        RunResult {
            processed: self.processed,
            accepted: self.accepted,
            errors: self.errors,
            aborted,
            rejected_backward: self.rejected_backward,
            rejected_outside: self.rejected_outside,
        }
    }
}

/// Receives progress and diagnostics from a running engine.
///
/// All methods default to doing nothing.
pub trait RunObserver {
    /// A read failed at loop index `index`; `errors` is the running total.
    fn on_read_error(&mut self, _index: i64, _errors: i64, _error: &PhspError) {}

    /// `processed` records have been classified.
    fn on_progress(&mut self, _processed: i64) {}

    /// The error threshold was exceeded.
    fn on_abort(&mut self, _errors: i64) {}
}

/// Observer that reports through the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl RunObserver for LogObserver {
    fn on_read_error(&mut self, index: i64, errors: i64, error: &PhspError) {
        log::warn!(
            "Error reading particle at record {} (error count: {}): {}",
            index,
            errors,
            error
        );
    }

    fn on_progress(&mut self, processed: i64) {
        log::info!("Processed {} records.", processed);
    }

    fn on_abort(&mut self, errors: i64) {
        log::error!("Too many errors ({}). Aborting filtering.", errors);
    }
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl RunObserver for NullObserver {}

/// Window filter over a record stream.
///
/// Holds only immutable configuration, so one engine can drive any number of
/// runs and several differently-configured engines can coexist.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterEngine {
    window: GeometryWindow,
    error_threshold: i64,
    progress_interval: i64,
}

impl FilterEngine {
    /// Create an engine; the run aborts once more than `error_threshold`
    /// reads have failed.
    pub fn new(window: GeometryWindow, error_threshold: i64) -> Self {
        Self {
            window,
            error_threshold,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    /// Change how often progress is reported. Zero disables reporting.
    pub fn with_progress_interval(mut self, interval: i64) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn window(&self) -> &GeometryWindow {
        &self.window
    }

    pub fn error_threshold(&self) -> i64 {
        self.error_threshold
    }

    /// Make `expected_records` read attempts, forward accepted records to
    /// `sink`, then finalize the sink header.
    ///
    /// Exceeding the error threshold is not an error: the result comes back
    /// with `aborted` set and the header is still finalized. A rejected
    /// header update yields [`PhspError::Finalize`] carrying the counts; a
    /// failed record write yields [`PhspError::RecordWrite`].
    pub fn run<S, K, O>(
        &self,
        source: &mut S,
        sink: &mut K,
        expected_records: i64,
        observer: &mut O,
    ) -> Result<RunResult>
    where
        S: RecordSource + ?Sized,
        K: RecordSink + ?Sized,
        O: RunObserver + ?Sized,
    {
        let mut stats = FilterRunStats::default();
        let mut aborted = false;

        for index in 0..expected_records {
            let record = match source.read_record() {
                Ok(record) => record,
                Err(e) => {
                    stats.errors += 1;
                    observer.on_read_error(index, stats.errors, &e);
                    if stats.errors > self.error_threshold {
                        observer.on_abort(stats.errors);
                        aborted = true;
                        break;
                    }
                    continue;
                }
            };

            let decision = evaluate(&record, &self.window);
            if decision.is_accept() {
                sink.write_record(&record)
                    .map_err(|e| PhspError::RecordWrite {
                        index,
                        source: Box::new(e),
                    })?;
            }
            stats.record(decision);

            if self.progress_interval > 0 && stats.processed % self.progress_interval == 0 {
                observer.on_progress(stats.processed);
            }
        }

        let result = stats.into_result(aborted);
        match finalize(sink, result.accepted) {
            Ok(()) => Ok(result),
            Err(e) => Err(PhspError::Finalize {
                result,
                source: Box::new(e),
            }),
        }
    }
}

/// Write the accepted count into the sink header and commit it.
///
/// Sets values rather than adding to them, so calling it again with the same
/// count leaves the header unchanged.
pub fn finalize<K: RecordSink + ?Sized>(sink: &mut K, accepted: i64) -> Result<()> {
    sink.set_original_histories(accepted);
    sink.update_header()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ParticleRecord, ParticleType};
    use crate::stream::{MemorySink, MemorySource};

    fn photon(position: [f32; 3], direction: [f32; 3]) -> ParticleRecord {
        ParticleRecord::new(ParticleType::Photon, position, direction)
    }

    fn engine(threshold: i64) -> FilterEngine {
        FilterEngine::new(GeometryWindow::default(), threshold)
    }

    #[derive(Default)]
    struct Recorder {
        read_errors: Vec<(i64, i64)>,
        progress: Vec<i64>,
        aborts: Vec<i64>,
    }

    impl RunObserver for Recorder {
        fn on_read_error(&mut self, index: i64, errors: i64, _error: &PhspError) {
            self.read_errors.push((index, errors));
        }
        fn on_progress(&mut self, processed: i64) {
            self.progress.push(processed);
        }
        fn on_abort(&mut self, errors: i64) {
            self.aborts.push(errors);
        }
    }

    fn mixed_records() -> Vec<ParticleRecord> {
        vec![
            photon([0.0, 0.0, 50.0], [0.0, 0.0, 1.0]),    // accept
            photon([10.0, 0.0, 50.0], [0.0, 0.0, 1.0]),   // outside
            photon([1.0, 1.0, 50.0], [0.0, 0.0, -0.5]),   // backward
            photon([6.5, -6.5, 120.0], [0.0, 0.0, 0.3]),  // accept, past plane
            photon([-20.0, 0.0, 0.0], [0.2, 0.0, 0.98]),  // accept, drifts in
        ]
    }

    #[test]
    fn test_run_classifies_and_forwards() {
        let records = mixed_records();
        let mut source = MemorySource::from_records(records.clone());
        let mut sink = MemorySink::new();

        let result = engine(10)
            .run(&mut source, &mut sink, 5, &mut NullObserver)
            .unwrap();

        assert_eq!(result.processed, 5);
        assert_eq!(result.accepted, 3);
        assert_eq!(result.rejected_outside, 1);
        assert_eq!(result.rejected_backward, 1);
        assert_eq!(result.errors, 0);
        assert!(!result.aborted);
        assert_eq!(result.processed, result.accepted + result.rejected());

        // Accepted records are written unchanged and in input order.
        assert_eq!(
            sink.records(),
            &[records[0].clone(), records[3].clone(), records[4].clone()]
        );
        assert_eq!(sink.header().orig_histories, 3);
        assert_eq!(sink.header().particles, 3);
        assert_eq!(sink.header_updates(), 1);
    }

    #[test]
    fn test_run_stops_at_expected_bound() {
        let mut source = MemorySource::from_records(mixed_records());
        let mut sink = MemorySink::new();

        let result = engine(10)
            .run(&mut source, &mut sink, 2, &mut NullObserver)
            .unwrap();

        assert_eq!(result.processed, 2);
        assert_eq!(result.accepted, 1);
        assert_eq!(source.remaining(), 3);
    }

    #[test]
    fn test_read_errors_are_skipped() {
        let mut source = MemorySource::from_records(vec![photon([0.0; 3], [0.0, 0.0, 1.0])]);
        source.push_failure();
        source.push_record(photon([0.0; 3], [0.0, 0.0, 1.0]));
        source.push_failure();
        source.push_record(photon([50.0, 0.0, 0.0], [0.0, 0.0, 1.0]));
        let mut sink = MemorySink::new();
        let mut recorder = Recorder::default();

        let result = engine(2)
            .run(&mut source, &mut sink, 5, &mut recorder)
            .unwrap();

        assert_eq!(result.errors, 2);
        assert_eq!(result.processed, 3);
        assert_eq!(result.accepted, 2);
        assert!(!result.aborted);
        assert_eq!(recorder.read_errors, vec![(1, 1), (3, 2)]);
        assert!(recorder.aborts.is_empty());
    }

    #[test]
    fn test_threshold_abort_after_t_plus_one_failures() {
        for threshold in [0, 1, 5] {
            let mut source = MemorySource::failing(100);
            let mut sink = MemorySink::new();
            let mut recorder = Recorder::default();

            let result = engine(threshold)
                .run(&mut source, &mut sink, 100, &mut recorder)
                .unwrap();

            assert!(result.aborted);
            assert_eq!(result.errors, threshold + 1);
            assert_eq!(result.accepted, 0);
            assert_eq!(result.processed, 0);
            assert_eq!(recorder.aborts, vec![threshold + 1]);
            // Finalization still happens after an abort.
            assert_eq!(sink.header_updates(), 1);
            assert_eq!(sink.header().orig_histories, 0);
        }
    }

    #[test]
    fn test_errors_are_cumulative_not_consecutive() {
        // Failures separated by good reads still add up.
        let mut source = MemorySource::from_records(Vec::new());
        for _ in 0..3 {
            source.push_failure();
            source.push_record(photon([0.0; 3], [0.0, 0.0, 1.0]));
        }
        let mut sink = MemorySink::new();

        let result = engine(2)
            .run(&mut source, &mut sink, 6, &mut NullObserver)
            .unwrap();

        assert!(result.aborted);
        assert_eq!(result.errors, 3);
        assert_eq!(result.processed, 2);
        assert_eq!(sink.records().len(), 2);
        assert_eq!(sink.header().orig_histories, 2);
    }

    #[test]
    fn test_finalize_error_keeps_counts() {
        let mut source = MemorySource::from_records(mixed_records());
        let mut sink = MemorySink::rejecting_updates();

        let err = engine(10)
            .run(&mut source, &mut sink, 5, &mut NullObserver)
            .unwrap_err();

        match err {
            PhspError::Finalize { result, .. } => {
                assert_eq!(result.accepted, 3);
                assert_eq!(result.processed, 5);
            }
            other => panic!("unexpected error {:?}", other),
        }
        // Records already written are left alone.
        assert_eq!(sink.records().len(), 3);
    }

    #[test]
    fn test_write_failure_stops_run() {
        let mut source = MemorySource::from_records(mixed_records());
        let mut sink = MemorySink::rejecting_writes();

        let err = engine(10)
            .run(&mut source, &mut sink, 5, &mut NullObserver)
            .unwrap_err();

        assert!(matches!(err, PhspError::RecordWrite { index: 0, .. }));
        assert_eq!(sink.header_updates(), 0);
    }

    #[test]
    fn test_progress_interval() {
        let records: Vec<ParticleRecord> = (0..7)
            .map(|_| photon([0.0; 3], [0.0, 0.0, 1.0]))
            .collect();
        let mut source = MemorySource::from_records(records);
        let mut sink = MemorySink::new();
        let mut recorder = Recorder::default();

        engine(0)
            .with_progress_interval(3)
            .run(&mut source, &mut sink, 7, &mut recorder)
            .unwrap();

        assert_eq!(recorder.progress, vec![3, 6]);
    }

    #[test]
    fn test_zero_or_negative_bound_reads_nothing() {
        for bound in [0, -1] {
            let mut source = MemorySource::from_records(mixed_records());
            let mut sink = MemorySink::new();

            let result = engine(0)
                .run(&mut source, &mut sink, bound, &mut NullObserver)
                .unwrap();

            assert_eq!(result, RunResult::default());
            assert_eq!(source.remaining(), 5);
            assert_eq!(sink.header_updates(), 1);
        }
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut sink = MemorySink::new();
        sink.write_record(&photon([0.0; 3], [0.0, 0.0, 1.0])).unwrap();

        finalize(&mut sink, 1).unwrap();
        let once = sink.header().clone();
        finalize(&mut sink, 1).unwrap();

        assert_eq!(sink.header(), &once);
    }

    #[test]
    fn test_engines_with_different_windows() {
        let narrow_window = GeometryWindow::new(100.0, -1.0, 1.0, -1.0, 1.0).unwrap();
        let wide_window = GeometryWindow::new(100.0, -50.0, 50.0, -50.0, 50.0).unwrap();
        let narrow = FilterEngine::new(narrow_window, 0);
        let wide = FilterEngine::new(wide_window, 0);

        let mut narrow_sink = MemorySink::new();
        let mut wide_sink = MemorySink::new();
        let mut narrow_source = MemorySource::from_records(mixed_records());
        let mut wide_source = MemorySource::from_records(mixed_records());
        narrow
            .run(&mut narrow_source, &mut narrow_sink, 5, &mut NullObserver)
            .unwrap();
        wide
            .run(&mut wide_source, &mut wide_sink, 5, &mut NullObserver)
            .unwrap();

        assert_eq!(narrow_sink.records().len(), 2);
        assert_eq!(wide_sink.records().len(), 4);
    }

    #[test]
    fn test_acceptance() {
        let result = RunResult {
            processed: 4,
            accepted: 1,
            ..Default::default()
        };
        assert_eq!(result.acceptance(), 0.25);
        assert_eq!(RunResult::default().acceptance(), 0.0);
    }
}
