//! MBTiles tile store — one SQLite file shared by every worker thread.
//!
//! ## Schema
//!
//! ```text
//! metadata (name text, value text)          + UNIQUE INDEX name_index (name)
//! tiles    (zoom_level integer, tile_column integer,
//!           tile_row integer, tile_data blob)   -- no index
//! ```
//!
//! `tiles` deliberately carries no index so bulk inserts stay cheap. The
//! connection runs with `synchronous=0`, `journal_mode=OFF` and
//! `locking_mode=EXCLUSIVE`: a crash mid-run may corrupt the file, which is
//! accepted because a run can always be repeated from scratch.
//!
//! ## Concurrency
//!
//! SQLite is opened without its own mutex. Every statement goes through the
//! single connection mutex; the existence index has its own `RwLock` so
//! [`TileStore::tile_exists`] never waits on a write in progress.

use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info};

use crate::coord::TileCoordinate;
use crate::error::{Result, TilerError};
use crate::storage::index::ExistenceIndex;

const SCHEMA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS metadata (name text, value text);
    CREATE UNIQUE INDEX IF NOT EXISTS name_index ON metadata (name);
    CREATE TABLE IF NOT EXISTS tiles (zoom_level integer, tile_column integer, tile_row integer, tile_data blob);
";
const INSERT_TILE_SQL: &str =
    "INSERT INTO tiles (zoom_level, tile_column, tile_row, tile_data) VALUES (?1, ?2, ?3, ?4)";
const REPLACE_METADATA_SQL: &str = "REPLACE INTO metadata (name, value) VALUES (?1, ?2)";

/// Resumable, thread-safe MBTiles writer.
pub struct TileStore {
    path: PathBuf,
    /// `None` once [`close`](Self::close) has run.
    conn: Mutex<Option<Connection>>,
    index: RwLock<ExistenceIndex>,
}

impl TileStore {
    /// Open or create the container at `path` and load the existence index.
    pub fn open(path: &Path) -> Result<Self> {
        let open_err = |e: rusqlite::Error| TilerError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags).map_err(open_err)?;

        conn.pragma_update(None, "synchronous", 0).map_err(open_err)?;
        conn.pragma_update_and_check(None, "journal_mode", "OFF", |row| row.get::<_, String>(0))
            .map_err(open_err)?;
        conn.pragma_update_and_check(None, "locking_mode", "EXCLUSIVE", |row| {
            row.get::<_, String>(0)
        })
        .map_err(open_err)?;
        conn.execute_batch(SCHEMA_SQL).map_err(open_err)?;

        // Prime the statement cache so the hot path only binds and steps.
        conn.prepare_cached(INSERT_TILE_SQL).map_err(open_err)?;
        conn.prepare_cached(REPLACE_METADATA_SQL).map_err(open_err)?;

        let index = ExistenceIndex::load(&conn).map_err(|e| TilerError::Open {
            path: path.to_path_buf(),
            reason: format!("Could not fetch stored tiles: {e}"),
        })?;

        info!(path = ?path, existing_tiles = index.len(), "Tile store opened");

        Ok(Self {
            path: path.to_path_buf(),
            conn: Mutex::new(Some(conn)),
            index: RwLock::new(index),
        })
    }

    /// Like [`open`](Self::open), but fails instead of creating a new file.
    pub fn open_existing(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(TilerError::Open {
                path: path.to_path_buf(),
                reason: "no such tile store".into(),
            });
        }
        Self::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// O(1) check against the in-memory index.
    pub fn tile_exists(&self, coord: TileCoordinate) -> bool {
        self.index.read().contains(coord)
    }

    /// Append one tile row. Safe to call from any number of threads.
    ///
    /// The existence index is updated under the same lock as the insert, so
    /// later [`tile_exists`](Self::tile_exists) calls see the new tile.
    ///
    /// The insert itself is unconditional: `tiles` has no uniqueness
    /// constraint, and inserting a coordinate twice leaves two ambiguous
    /// rows. Callers gate inserts with `tile_exists` (see
    /// [`crate::sink::TileSink::must_serialize_coordinate`]).
    ///
    /// Coordinates outside the key bounds are rejected before any row is
    /// written.
    pub fn insert_tile(&self, coord: TileCoordinate, blob: &[u8]) -> Result<()> {
        if !coord.in_key_bounds() {
            return Err(TilerError::Store(format!("tile {coord} exceeds key bounds")));
        }
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or(TilerError::StoreClosed)?;

        let mut stmt = conn.prepare_cached(INSERT_TILE_SQL).map_err(store_err)?;
        stmt.execute(params![coord.zoom, coord.x, coord.y, blob])
            .map_err(store_err)?;
        drop(stmt);

        self.index.write().insert(coord);
        debug!(tile = %coord, bytes = blob.len(), "Tile inserted");
        Ok(())
    }

    /// Upsert one metadata entry. Meant for setup and teardown, outside the
    /// worker phase.
    pub fn set_metadata(&self, name: &str, value: &str) -> Result<()> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or(TilerError::StoreClosed)?;

        let mut stmt = conn.prepare_cached(REPLACE_METADATA_SQL).map_err(store_err)?;
        stmt.execute(params![name, value]).map_err(store_err)?;
        Ok(())
    }

    pub fn metadata(&self, name: &str) -> Result<Option<String>> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or(TilerError::StoreClosed)?;
        conn.query_row("SELECT value FROM metadata WHERE name = ?1", [name], |row| {
            row.get(0)
        })
        .optional()
        .map_err(store_err)
    }

    /// All metadata entries, sorted by name.
    pub fn metadata_entries(&self) -> Result<Vec<(String, String)>> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or(TilerError::StoreClosed)?;
        let mut stmt = conn
            .prepare("SELECT name, value FROM metadata ORDER BY name")
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(store_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(store_err)
    }

    /// Read back one stored blob. Full table scan: `tiles` has no index.
    pub fn tile_data(&self, coord: TileCoordinate) -> Result<Option<Vec<u8>>> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or(TilerError::StoreClosed)?;
        conn.query_row(
            "SELECT tile_data FROM tiles WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3 LIMIT 1",
            params![coord.zoom, coord.x, coord.y],
            |row| row.get(0),
        )
        .optional()
        .map_err(store_err)
    }

    /// Number of rows in `tiles`, duplicates included.
    pub fn row_count(&self) -> Result<u64> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or(TilerError::StoreClosed)?;
        conn.query_row("SELECT COUNT(*) FROM tiles", [], |row| row.get(0))
            .map_err(store_err)
    }

    /// Number of distinct tiles known to the existence index.
    pub fn tile_count(&self) -> usize {
        self.index.read().len()
    }

    /// Release cached statements and the connection. Later calls are no-ops.
    pub fn close(&self) -> Result<()> {
        let Some(conn) = self.conn.lock().take() else {
            return Ok(());
        };
        conn.flush_prepared_statement_cache();
        conn.close().map_err(|(_, e)| store_err(e))?;
        info!(path = ?self.path, tiles = self.tile_count(), "Tile store closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.conn.lock().is_none()
    }
}

fn store_err(e: rusqlite::Error) -> TilerError {
    TilerError::Store(e.to_string())
}
