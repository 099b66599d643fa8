// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Existence index — the set of tiles already present in the store.
//!
//! The index lives in memory only. On open the `tiles` table is scanned once
//! and every stored coordinate is packed into a [`TileKey`]; afterwards the
//! store keeps it in step with each successful insert. Lookups never touch
//! SQLite, which is what makes resuming a multi-million tile run cheap.

use std::collections::HashSet;

use rusqlite::Connection;

use crate::coord::{TileCoordinate, TileKey, MAX_KEY_AXIS, MAX_KEY_ZOOM};

/// In-memory set of stored tile keys.
#[derive(Debug, Default)]
pub struct ExistenceIndex {
    keys: HashSet<TileKey>,
}

impl ExistenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan every stored coordinate. One sequential pass over `tiles`.
    ///
    /// A row outside the key bounds fails the load instead of colliding with
    /// another tile.
    pub fn load(conn: &Connection) -> rusqlite::Result<Self> {
        let mut stmt = conn.prepare("SELECT zoom_level, tile_column, tile_row FROM tiles")?;
        let rows = stmt.query_map([], |row| {
            let coord = TileCoordinate::new(row.get(0)?, row.get(1)?, row.get(2)?);
            match out_of_bounds_column(coord) {
                None => Ok(coord),
                Some((idx, value)) => Err(rusqlite::Error::IntegralValueOutOfRange(idx, value)),
            }
        })?;

        let mut index = Self::new();
        for coord in rows {
            index.insert(coord?);
        }
        Ok(index)
    }

    /// Record `coord` as stored. Returns `false` if it was already known.
    pub fn insert(&mut self, coord: TileCoordinate) -> bool {
        self.keys.insert(coord.key())
    }

    pub fn contains(&self, coord: TileCoordinate) -> bool {
        self.keys.contains(&coord.key())
    }

    /// Number of distinct indexed tiles.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Indexed coordinates in no particular order.
    pub fn coordinates(&self) -> impl Iterator<Item = TileCoordinate> + '_ {
        self.keys.iter().map(TileKey::coordinate)
    }
}

/// First column of `coord` that does not fit the key packing.
fn out_of_bounds_column(coord: TileCoordinate) -> Option<(usize, i64)> {
    if coord.zoom > MAX_KEY_ZOOM {
        Some((0, coord.zoom.into()))
    } else if coord.x > MAX_KEY_AXIS {
        Some((1, coord.x.into()))
    } else if coord.y > MAX_KEY_AXIS {
        Some((2, coord.y.into()))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup() {
        let mut index = ExistenceIndex::new();
        assert!(index.is_empty());
        assert!(index.insert(TileCoordinate::new(2, 1, 3)));
        assert!(!index.insert(TileCoordinate::new(2, 1, 3)));
        assert!(index.contains(TileCoordinate::new(2, 1, 3)));
        assert!(!index.contains(TileCoordinate::new(2, 3, 1)));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn load_scans_existing_rows() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE tiles (zoom_level integer, tile_column integer, tile_row integer, tile_data blob);
             INSERT INTO tiles VALUES (0, 0, 0, x'00');
             INSERT INTO tiles VALUES (5, 17, 9, x'00');
             INSERT INTO tiles VALUES (5, 17, 9, x'01');",
        )
        .unwrap();

        let index = ExistenceIndex::load(&conn).unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.contains(TileCoordinate::new(5, 17, 9)));
        let mut coords: Vec<_> = index.coordinates().collect();
        coords.sort();
        assert_eq!(coords, vec![TileCoordinate::new(0, 0, 0), TileCoordinate::new(5, 17, 9)]);
    }

    #[test]
    fn load_rejects_rows_outside_key_bounds() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE tiles (zoom_level integer, tile_column integer, tile_row integer, tile_data blob);
             INSERT INTO tiles VALUES (0, 536870912, 0, x'00');",
        )
        .unwrap();

        let err = ExistenceIndex::load(&conn).unwrap_err();
        assert!(matches!(err, rusqlite::Error::IntegralValueOutOfRange(1, 536_870_912)));
    }
}
