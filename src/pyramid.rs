//! Pyramid interfaces consumed by the workers, plus a grid walker.
//!
//! Raster reading and tile rendering happen behind [`TileSource`]; the
//! workers only see a forward-only [`TileEnumerator`] per thread.

use std::io::Write;
use std::sync::Arc;

use serde::Deserialize;

use crate::coord::TileCoordinate;
use crate::error::{Result, TilerError};

/// Deepest zoom whose geodetic grid still fits the tile key packing.
pub const MAX_ZOOM: u8 = 28;

/// Switches passed through to [`SerializableTile::write_to`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Emit the water mask section where the payload format has one.
    pub water_mask: bool,
}

/// A produced tile that can write its own payload.
pub trait SerializableTile {
    fn coordinate(&self) -> TileCoordinate;

    fn write_to<W: Write>(&self, writer: &mut W, options: &SerializeOptions) -> std::io::Result<()>;
}

/// Forward-only walk over one logical tile sequence.
///
/// Several instances bound to the same dataset must yield the same sequence;
/// [`crate::cursor::SequentialCursor`] spreads that sequence over threads.
pub trait TileEnumerator {
    type Tile: SerializableTile;

    /// Step to the next position. No-op once exhausted.
    fn advance(&mut self);

    fn exhausted(&self) -> bool;

    /// Coordinate at the current position, without producing the payload.
    fn coordinate(&self) -> Option<TileCoordinate>;

    /// Produce the tile at the current position.
    fn current(&mut self) -> Result<Self::Tile>;
}

/// Renders the payload for one coordinate. Shared by all enumerators.
pub trait TileSource: Send + Sync {
    type Tile: SerializableTile;

    fn render(&self, coord: TileCoordinate) -> Result<Self::Tile>;
}

/// Tiling scheme of the pyramid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// EPSG:4326, two root tiles side by side.
    #[default]
    Geodetic,
    /// EPSG:3857, one root tile.
    Mercator,
}

impl Profile {
    /// `(columns, rows)` at `zoom`.
    pub fn grid_size(&self, zoom: u8) -> (u32, u32) {
        let rows = 1u32 << zoom;
        match self {
            Profile::Geodetic => (rows << 1, rows),
            Profile::Mercator => (rows, rows),
        }
    }

    pub fn tiles_at(&self, zoom: u8) -> u64 {
        let (cols, rows) = self.grid_size(zoom);
        cols as u64 * rows as u64
    }

    /// Total tiles in `[end_zoom, start_zoom]`.
    pub fn tiles_between(&self, start_zoom: u8, end_zoom: u8) -> u64 {
        (end_zoom..=start_zoom).map(|z| self.tiles_at(z)).sum()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Profile::Geodetic => "geodetic",
            Profile::Mercator => "mercator",
        }
    }
}

/// Walks every tile from `start_zoom` down to `end_zoom`, row by row, column
/// by column, rendering through a shared [`TileSource`].
pub struct GridEnumerator<S> {
    source: Arc<S>,
    profile: Profile,
    end_zoom: u8,
    current: Option<TileCoordinate>,
}

impl<S: TileSource> GridEnumerator<S> {
    pub fn new(source: Arc<S>, profile: Profile, start_zoom: u8, end_zoom: u8) -> Result<Self> {
        if start_zoom > MAX_ZOOM {
            return Err(TilerError::Config(format!(
                "start zoom {start_zoom} exceeds maximum {MAX_ZOOM}"
            )));
        }
        if end_zoom > start_zoom {
            return Err(TilerError::Config(format!(
                "end zoom {end_zoom} must not exceed start zoom {start_zoom}"
            )));
        }
        Ok(Self {
            source,
            profile,
            end_zoom,
            current: Some(TileCoordinate::new(start_zoom, 0, 0)),
        })
    }
}

impl<S: TileSource> TileEnumerator for GridEnumerator<S> {
    type Tile = S::Tile;

    fn advance(&mut self) {
        let Some(mut c) = self.current else { return };
        let (cols, rows) = self.profile.grid_size(c.zoom);

        c.x += 1;
        if c.x == cols {
            c.x = 0;
            c.y += 1;
        }
        if c.y == rows {
            if c.zoom == self.end_zoom {
                self.current = None;
                return;
            }
            c = TileCoordinate::new(c.zoom - 1, 0, 0);
        }
        self.current = Some(c);
    }

    fn exhausted(&self) -> bool {
        self.current.is_none()
    }

    fn coordinate(&self) -> Option<TileCoordinate> {
        self.current
    }

    fn current(&mut self) -> Result<Self::Tile> {
        let coord = self.current.ok_or_else(|| {
            TilerError::Config("tile requested from an exhausted enumerator".into())
        })?;
        self.source.render(coord)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    struct EchoTile(TileCoordinate);

    impl SerializableTile for EchoTile {
        fn coordinate(&self) -> TileCoordinate {
            self.0
        }

        fn write_to<W: Write>(&self, writer: &mut W, _: &SerializeOptions) -> std::io::Result<()> {
            write!(writer, "{}", self.0)
        }
    }

    impl TileSource for Echo {
        type Tile = EchoTile;

        fn render(&self, coord: TileCoordinate) -> Result<EchoTile> {
            Ok(EchoTile(coord))
        }
    }

    fn walk(profile: Profile, start: u8, end: u8) -> Vec<TileCoordinate> {
        let mut e = GridEnumerator::new(Arc::new(Echo), profile, start, end).unwrap();
        let mut out = Vec::new();
        while let Some(c) = e.coordinate() {
            assert_eq!(e.current().unwrap().coordinate(), c);
            out.push(c);
            e.advance();
        }
        assert!(e.exhausted());
        out
    }

    #[test]
    fn geodetic_walks_zoom_descending_then_row_then_column() {
        let tiles = walk(Profile::Geodetic, 1, 0);
        let expected: Vec<_> = [
            (1, 0, 0), (1, 1, 0), (1, 2, 0), (1, 3, 0),
            (1, 0, 1), (1, 1, 1), (1, 2, 1), (1, 3, 1),
            (0, 0, 0), (0, 1, 0),
        ]
        .into_iter()
        .map(|(z, x, y)| TileCoordinate::new(z, x, y))
        .collect();
        assert_eq!(tiles, expected);
    }

    #[test]
    fn counts_match_total() {
        for profile in [Profile::Geodetic, Profile::Mercator] {
            let tiles = walk(profile, 4, 2);
            assert_eq!(tiles.len() as u64, profile.tiles_between(4, 2));
            assert_eq!(tiles.first().unwrap().zoom, 4);
            assert_eq!(tiles.last().unwrap().zoom, 2);
        }
    }

    #[test]
    fn single_zoom_range() {
        assert_eq!(walk(Profile::Mercator, 0, 0), vec![TileCoordinate::new(0, 0, 0)]);
    }

    #[test]
    fn rejects_inverted_or_oversized_ranges() {
        assert!(GridEnumerator::new(Arc::new(Echo), Profile::Geodetic, 1, 2).is_err());
        assert!(GridEnumerator::new(Arc::new(Echo), Profile::Geodetic, MAX_ZOOM + 1, 0).is_err());
    }

    #[test]
    fn max_zoom_grid_fits_key_bounds() {
        let (cols, rows) = Profile::Geodetic.grid_size(MAX_ZOOM);
        assert!(TileCoordinate::new(MAX_ZOOM, cols - 1, rows - 1).checked_key().is_some());
    }

    #[test]
    fn advance_after_exhaustion_is_noop() {
        let mut e = GridEnumerator::new(Arc::new(Echo), Profile::Mercator, 0, 0).unwrap();
        e.advance();
        e.advance();
        assert!(e.exhausted());
        assert!(e.current().is_err());
    }
}
