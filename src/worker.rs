// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Tile worker.
//!
//! Each `TileWorker` loop:
//!  1. Claims the next global position through the shared [`SequentialCursor`],
//!     catching its private enumerator up to it.
//!  2. Asks the sink whether that coordinate still needs producing.
//!  3. If so, renders the tile and hands it to the sink, which compresses
//!     and stores it.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info, warn};

use crate::cursor::SequentialCursor;
use crate::error::Result;
use crate::pyramid::{SerializeOptions, TileEnumerator};
use crate::sink::TileSink;

/// Per-worker counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Tiles produced and stored.
    pub written: u64,
    /// Tiles the sink reported as already present.
    pub skipped: u64,
    /// Tiles that failed while `abort_on_error` was off.
    pub failed: u64,
}

impl WorkerStats {
    pub fn merge(&mut self, other: WorkerStats) {
        self.written += other.written;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// One thread's view of a pyramid run.
pub struct TileWorker<'a> {
    pub id: usize,
    pub cursor: &'a SequentialCursor,
    pub stop: &'a AtomicBool,
    pub options: SerializeOptions,
    pub abort_on_error: bool,
}

impl TileWorker<'_> {
    /// Drive `enumerator` into `sink` until the sequence is exhausted or the
    /// run is stopped.
    ///
    /// With `abort_on_error` the first failing tile raises the stop flag for
    /// every worker, the sink is still torn down, and the tile's error is
    /// returned. Otherwise failures are logged and counted.
    pub fn run<E, S>(&self, mut enumerator: E, mut sink: S) -> Result<WorkerStats>
    where
        E: TileEnumerator,
        S: TileSink,
    {
        info!(worker = self.id, "Tile worker started");
        let mut stats = WorkerStats::default();

        sink.start_serialization()?;

        let mut position = self.cursor.claim(&mut enumerator, 0);
        while let Some(coord) = enumerator.coordinate() {
            if self.stop.load(Ordering::Relaxed) {
                info!(worker = self.id, position, "Stop requested, leaving run");
                break;
            }

            if sink.must_serialize_coordinate(coord) {
                let outcome = enumerator
                    .current()
                    .and_then(|tile| sink.serialize_tile(&tile, &self.options));
                match outcome {
                    Ok(()) => {
                        stats.written += 1;
                        debug!(worker = self.id, position, tile = %coord, "Tile written");
                    }
                    Err(e) if self.abort_on_error => {
                        error!(worker = self.id, tile = %coord, error = %e, "Tile failed, aborting run");
                        self.stop.store(true, Ordering::Relaxed);
                        if let Err(end) = sink.end_serialization() {
                            warn!(worker = self.id, error = %end, "Sink teardown failed after abort");
                        }
                        return Err(e);
                    }
                    Err(e) => {
                        stats.failed += 1;
                        error!(worker = self.id, tile = %coord, error = %e, "Tile failed");
                    }
                }
            } else {
                stats.skipped += 1;
                debug!(worker = self.id, position, tile = %coord, "Tile already present, skipped");
            }

            position = self.cursor.claim(&mut enumerator, position);
        }

        sink.end_serialization()?;

        info!(
            worker = self.id,
            written = stats.written,
            skipped = stats.skipped,
            failed = stats.failed,
            "Tile worker finished"
        );
        Ok(stats)
    }
}
