//! Tile addressing and the packed 64-bit key used by the existence index.
//!
//! ```text
//!  63      58 57                    29 28                     0
//! [ zoom:6  ][        x:29           ][          y:29          ]
//! ```

use std::fmt;

pub const ZOOM_BITS: u32 = 6;
pub const AXIS_BITS: u32 = 29;

/// Largest zoom level representable in a [`TileKey`].
pub const MAX_KEY_ZOOM: u8 = (1 << ZOOM_BITS) - 1;
/// Largest column or row representable in a [`TileKey`].
pub const MAX_KEY_AXIS: u32 = (1 << AXIS_BITS) - 1;

/// One tile in a zoom pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoordinate {
    pub zoom: u8,
    /// Column.
    pub x: u32,
    /// Row (TMS scheme, 0 at the south edge).
    pub y: u32,
}

impl TileCoordinate {
    pub fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Whether this coordinate fits the key packing without colliding.
    pub fn in_key_bounds(&self) -> bool {
        self.zoom <= MAX_KEY_ZOOM && self.x <= MAX_KEY_AXIS && self.y <= MAX_KEY_AXIS
    }

    /// Pack into a [`TileKey`].
    ///
    /// Out-of-bounds coordinates silently collide with other tiles. Paths
    /// that must not collide go through [`checked_key`](Self::checked_key).
    pub fn key(&self) -> TileKey {
        TileKey(
            ((self.zoom as u64) << (2 * AXIS_BITS))
                | ((self.x as u64) << AXIS_BITS)
                | self.y as u64,
        )
    }

    pub fn checked_key(&self) -> Option<TileKey> {
        self.in_key_bounds().then(|| self.key())
    }
}

impl fmt::Display for TileCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Packed form of a [`TileCoordinate`] for set membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey(u64);

impl TileKey {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    pub fn coordinate(&self) -> TileCoordinate {
        let mask = MAX_KEY_AXIS as u64;
        TileCoordinate {
            zoom: (self.0 >> (2 * AXIS_BITS)) as u8,
            x: ((self.0 >> AXIS_BITS) & mask) as u32,
            y: (self.0 & mask) as u32,
        }
    }
}

impl From<TileCoordinate> for TileKey {
    fn from(coord: TileCoordinate) -> Self {
        coord.key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn key_matches_reference_packing() {
        let c = TileCoordinate::new(3, 5, 7);
        assert_eq!(c.key().raw(), (3u64 << 58) | (5u64 << 29) | 7);
    }

    #[test]
    fn key_unpacks_at_the_edges() {
        for c in [
            TileCoordinate::new(0, 0, 0),
            TileCoordinate::new(MAX_KEY_ZOOM, MAX_KEY_AXIS, MAX_KEY_AXIS),
            TileCoordinate::new(MAX_KEY_ZOOM, 0, MAX_KEY_AXIS),
            TileCoordinate::new(1, MAX_KEY_AXIS, 0),
            TileCoordinate::new(28, (1 << 29) - 1, (1 << 28) - 1),
        ] {
            assert_eq!(c.key().coordinate(), c, "{c}");
        }
    }

    #[test]
    fn distinct_coordinates_get_distinct_keys() {
        let mut seen = HashSet::new();
        for zoom in [0u8, 1, 2, 31, 63] {
            for x in [0u32, 1, 2, 1000, MAX_KEY_AXIS] {
                for y in [0u32, 1, 3, 77_777, MAX_KEY_AXIS] {
                    let coord = TileCoordinate::new(zoom, x, y);
                    assert!(seen.insert(coord.key()), "collision at {coord}");
                    assert_eq!(TileKey::from(coord).coordinate(), coord);
                }
            }
        }
    }

    #[test]
    fn checked_key_rejects_out_of_bounds() {
        assert!(TileCoordinate::new(64, 0, 0).checked_key().is_none());
        assert!(TileCoordinate::new(0, 1 << 29, 0).checked_key().is_none());
        assert!(TileCoordinate::new(0, 0, 1 << 29).checked_key().is_none());
        assert!(TileCoordinate::new(10, 12, 34).checked_key().is_some());
    }

    #[test]
    fn out_of_bounds_key_collides_without_panicking() {
        let wide = TileCoordinate::new(0, 1 << 29, 0);
        assert_eq!(wide.key(), TileCoordinate::new(1, 0, 0).key());
        assert_eq!(TileCoordinate::new(255, 0, 0).key().raw(), 255u64 << 58);
    }

    #[test]
    fn displays_as_zxy() {
        assert_eq!(TileCoordinate::new(4, 2, 9).to_string(), "4/2/9");
    }
}
