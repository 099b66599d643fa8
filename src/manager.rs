// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Build manager: runs a fixed pool of tile workers over one pyramid.
//!
//! ```text
//! worker 0: enumerator_0 ─┐                      ┌─ sink_0 (compressor_0) ─┐
//! worker 1: enumerator_1 ─┼─ SequentialCursor ───┼─ sink_1 (compressor_1) ─┼─→ TileStore
//! worker N: enumerator_N ─┘                      └─ sink_N (compressor_N) ─┘
//! ```
//!
//! Enumerators and sinks are built inside their worker thread from the
//! factories passed to [`BuildManager::run`], so per-thread state such as the
//! compressor never crosses a thread boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::cursor::SequentialCursor;
use crate::error::{Result, TilerError};
use crate::pyramid::{SerializeOptions, TileEnumerator};
use crate::sink::TileSink;
use crate::worker::{TileWorker, WorkerStats};

/// Summary of a finished run.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub stats: WorkerStats,
    /// Positions handed out by the cursor, including claims past the end.
    pub claimed: usize,
    pub threads: usize,
    pub elapsed: Duration,
    /// Whether the run ended early through [`CancelHandle::cancel`].
    pub cancelled: bool,
}

/// Stops a running build from another thread.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Top-level driver for one pyramid run.
///
/// The stop flag is never cleared: once cancelled, or aborted by a failing
/// tile, every later [`run`](Self::run) returns at once with `cancelled`
/// set. Build a new manager for each run.
pub struct BuildManager {
    threads: usize,
    options: SerializeOptions,
    abort_on_error: bool,
    stop: Arc<AtomicBool>,
}

impl BuildManager {
    /// `threads == 0` selects the host CPU count.
    pub fn new(threads: usize, options: SerializeOptions, abort_on_error: bool) -> Self {
        let threads = if threads == 0 { default_threads() } else { threads };
        Self { threads, options, abort_on_error, stop: Arc::new(AtomicBool::new(false)) }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.stop.clone())
    }

    /// Run every worker to completion.
    ///
    /// Each thread calls `make_enumerator` and `make_sink` once. The first
    /// worker error is returned after all threads have joined.
    pub fn run<E, S, FE, FS>(&self, make_enumerator: FE, make_sink: FS) -> Result<BuildReport>
    where
        E: TileEnumerator,
        S: TileSink,
        FE: Fn() -> Result<E> + Sync,
        FS: Fn() -> Result<S> + Sync,
    {
        let started = Instant::now();
        let cursor = SequentialCursor::new();
        info!(threads = self.threads, abort_on_error = self.abort_on_error, "Pyramid build started");

        let results: Vec<Result<WorkerStats>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..self.threads)
                .map(|id| {
                    let worker = TileWorker {
                        id,
                        cursor: &cursor,
                        stop: &self.stop,
                        options: self.options,
                        abort_on_error: self.abort_on_error,
                    };
                    let make_enumerator = &make_enumerator;
                    let make_sink = &make_sink;
                    scope.spawn(move || {
                        let outcome = make_enumerator()
                            .and_then(|e| make_sink().map(|s| (e, s)))
                            .and_then(|(e, s)| worker.run(e, s));
                        if outcome.is_err() && worker.abort_on_error {
                            worker.stop.store(true, Ordering::Relaxed);
                        }
                        outcome
                    })
                })
                .collect();

            handles
                .into_iter()
                .enumerate()
                .map(|(worker, h)| h.join().unwrap_or(Err(TilerError::WorkerPanic { worker })))
                .collect()
        });

        let mut report = BuildReport {
            claimed: cursor.claimed(),
            threads: self.threads,
            elapsed: started.elapsed(),
            cancelled: false,
            ..Default::default()
        };
        let mut first_error = None;
        for (worker, result) in results.into_iter().enumerate() {
            match result {
                Ok(stats) => report.stats.merge(stats),
                Err(e) => {
                    error!(worker, error = %e, "Worker failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        report.cancelled = self.stop.load(Ordering::Relaxed);
        if report.cancelled {
            warn!(written = report.stats.written, "Pyramid build cancelled");
        }
        info!(
            written = report.stats.written,
            skipped = report.stats.skipped,
            failed = report.stats.failed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Pyramid build finished"
        );
        Ok(report)
    }
}

/// Host CPU count, falling back to 4.
pub fn default_threads() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}
