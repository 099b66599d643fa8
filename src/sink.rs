//! Tile sinks — where produced tiles end up.
//!
//! A sink decides whether a coordinate still needs producing and consumes
//! the tiles that do. Each worker thread owns exactly one sink, and with it
//! one [`StreamingCompressor`]; only the [`TileStore`] behind an
//! [`MbTilesSink`] is shared between threads.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::compress::StreamingCompressor;
use crate::coord::TileCoordinate;
use crate::error::{Result, TilerError};
use crate::pyramid::{SerializableTile, SerializeOptions};
use crate::storage::TileStore;

/// Capabilities the pyramid driver needs from an output.
pub trait TileSink {
    fn start_serialization(&mut self) -> Result<()> {
        Ok(())
    }

    /// Whether `coord` must be produced. Checked before any rendering or
    /// compression; `false` means skip the tile entirely.
    fn must_serialize_coordinate(&self, coord: TileCoordinate) -> bool;

    fn serialize_tile<T: SerializableTile>(&mut self, tile: &T, options: &SerializeOptions)
        -> Result<()>;

    fn end_serialization(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Gzip `tile` into `compressor`, leaving the finished stream in its buffer.
fn compress_tile<T: SerializableTile>(
    compressor: &mut StreamingCompressor,
    tile: &T,
    options: &SerializeOptions,
) -> Result<()> {
    compressor.reset();
    tile.write_to(compressor, options)
        .map_err(|e| TilerError::Compression(format!("tile {}: {e}", tile.coordinate())))?;
    compressor.finish()
}

// ─────────────────────────────── MBTiles ─────────────────────────────────────

/// Writes gzip blobs into a shared [`TileStore`].
pub struct MbTilesSink {
    store: Arc<TileStore>,
    resume: bool,
    compressor: StreamingCompressor,
}

impl MbTilesSink {
    pub fn new(store: Arc<TileStore>, resume: bool) -> Self {
        Self { store, resume, compressor: StreamingCompressor::new() }
    }
}

impl TileSink for MbTilesSink {
    fn must_serialize_coordinate(&self, coord: TileCoordinate) -> bool {
        !self.resume || !self.store.tile_exists(coord)
    }

    fn serialize_tile<T: SerializableTile>(
        &mut self,
        tile: &T,
        options: &SerializeOptions,
    ) -> Result<()> {
        compress_tile(&mut self.compressor, tile, options)?;
        self.store.insert_tile(tile.coordinate(), self.compressor.data())
    }
}

// ─────────────────────────────── Directory ───────────────────────────────────

/// Writes each tile as `<root>/<z>/<x>/<y>.<extension>`, gzip compressed.
pub struct DirectorySink {
    root: PathBuf,
    extension: String,
    resume: bool,
    compressor: StreamingCompressor,
}

impl DirectorySink {
    pub fn new(root: &Path, extension: &str, resume: bool) -> Self {
        Self {
            root: root.to_path_buf(),
            extension: extension.to_string(),
            resume,
            compressor: StreamingCompressor::new(),
        }
    }

    pub fn tile_path(&self, coord: TileCoordinate) -> PathBuf {
        self.root
            .join(coord.zoom.to_string())
            .join(coord.x.to_string())
            .join(format!("{}.{}", coord.y, self.extension))
    }
}

impl TileSink for DirectorySink {
    fn start_serialization(&mut self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    fn must_serialize_coordinate(&self, coord: TileCoordinate) -> bool {
        !self.resume || !self.tile_path(coord).exists()
    }

    fn serialize_tile<T: SerializableTile>(
        &mut self,
        tile: &T,
        options: &SerializeOptions,
    ) -> Result<()> {
        compress_tile(&mut self.compressor, tile, options)?;

        let path = self.tile_path(tile.coordinate());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, self.compressor.data())?;
        debug!(path = ?path, bytes = self.compressor.size(), "Tile file written");
        Ok(())
    }
}

// ─────────────────────────────── OutputSink ──────────────────────────────────

/// Sink chosen at runtime from the configured output format.
pub enum OutputSink {
    MbTiles(MbTilesSink),
    Directory(DirectorySink),
}

impl TileSink for OutputSink {
    fn start_serialization(&mut self) -> Result<()> {
        match self {
            OutputSink::MbTiles(s) => s.start_serialization(),
            OutputSink::Directory(s) => s.start_serialization(),
        }
    }

    fn must_serialize_coordinate(&self, coord: TileCoordinate) -> bool {
        match self {
            OutputSink::MbTiles(s) => s.must_serialize_coordinate(coord),
            OutputSink::Directory(s) => s.must_serialize_coordinate(coord),
        }
    }

    fn serialize_tile<T: SerializableTile>(
        &mut self,
        tile: &T,
        options: &SerializeOptions,
    ) -> Result<()> {
        match self {
            OutputSink::MbTiles(s) => s.serialize_tile(tile, options),
            OutputSink::Directory(s) => s.serialize_tile(tile, options),
        }
    }

    fn end_serialization(&mut self) -> Result<()> {
        match self {
            OutputSink::MbTiles(s) => s.end_serialization(),
            OutputSink::Directory(s) => s.end_serialization(),
        }
    }
}
