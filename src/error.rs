use std::path::PathBuf;

use thiserror::Error;

use crate::coord::TileCoordinate;

#[derive(Debug, Error)]
pub enum TilerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The tile store could not be opened or its schema established.
    #[error("Cannot open tile store {path:?}: {reason}")]
    Open { path: PathBuf, reason: String },

    /// An insert or metadata write failed inside SQLite.
    #[error("Tile store error: {0}")]
    Store(String),

    #[error("Compression failed: {0}")]
    Compression(String),

    #[error("Tile store is closed")]
    StoreClosed,

    #[error("Tile {coord} could not be generated: {reason}")]
    Generate { coord: TileCoordinate, reason: String },

    #[error("Worker thread {worker} panicked")]
    WorkerPanic { worker: usize },
}

pub type Result<T> = std::result::Result<T, TilerError>;
