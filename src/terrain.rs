//! Heightmap terrain payload (heightmap-1.0 layout).
//!
//! ```text
//! [heights    : 65*65 u16 LE]  (metres + 1000) * 5, row-major, north row first
//! [child mask : u8]            SW=1 SE=2 NW=4 NE=8
//! [water mask : u8]            only with SerializeOptions::water_mask
//! ```

use std::io::{self, Write};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::coord::TileCoordinate;
use crate::error::Result;
use crate::pyramid::{SerializableTile, SerializeOptions, TileSource};

/// Samples per side of a heightmap tile.
pub const HEIGHTMAP_SIZE: usize = 65;

pub const CHILD_SW: u8 = 1;
pub const CHILD_SE: u8 = 2;
pub const CHILD_NW: u8 = 4;
pub const CHILD_NE: u8 = 8;
pub const ALL_CHILDREN: u8 = CHILD_SW | CHILD_SE | CHILD_NW | CHILD_NE;

/// One terrain tile of quantized heights.
#[derive(Debug, Clone)]
pub struct HeightmapTile {
    coord: TileCoordinate,
    heights: Vec<u16>,
    children: u8,
    /// 0 = all land, 255 = all water.
    water: u8,
}

impl HeightmapTile {
    /// Quantize `metres` the way the heightmap format expects.
    pub fn encode_height(metres: f64) -> u16 {
        ((metres + 1000.0) * 5.0).round().clamp(0.0, u16::MAX as f64) as u16
    }

    pub fn flat(coord: TileCoordinate, metres: f64, children: u8) -> Self {
        Self {
            coord,
            heights: vec![Self::encode_height(metres); HEIGHTMAP_SIZE * HEIGHTMAP_SIZE],
            children,
            water: 0,
        }
    }

    pub fn children(&self) -> u8 {
        self.children
    }

    pub fn heights(&self) -> &[u16] {
        &self.heights
    }
}

impl SerializableTile for HeightmapTile {
    fn coordinate(&self) -> TileCoordinate {
        self.coord
    }

    fn write_to<W: Write>(&self, writer: &mut W, options: &SerializeOptions) -> io::Result<()> {
        let mut raw = Vec::with_capacity(self.heights.len() * 2 + 2);
        for h in &self.heights {
            raw.write_u16::<LittleEndian>(*h)?;
        }
        raw.write_u8(self.children)?;
        if options.water_mask {
            raw.write_u8(self.water)?;
        }
        writer.write_all(&raw)
    }
}

/// Renders constant-elevation tiles across the whole pyramid.
#[derive(Debug, Clone)]
pub struct FlatTerrainSource {
    height: f64,
    /// Highest zoom rendered; tiles below it advertise all four children.
    max_zoom: u8,
}

impl FlatTerrainSource {
    pub fn new(height: f64, max_zoom: u8) -> Self {
        Self { height, max_zoom }
    }
}

impl TileSource for FlatTerrainSource {
    type Tile = HeightmapTile;

    fn render(&self, coord: TileCoordinate) -> Result<HeightmapTile> {
        let children = if coord.zoom < self.max_zoom { ALL_CHILDREN } else { 0 };
        Ok(HeightmapTile::flat(coord, self.height, children))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn height_quantization() {
        assert_eq!(HeightmapTile::encode_height(0.0), 5000);
        assert_eq!(HeightmapTile::encode_height(-1000.0), 0);
        assert_eq!(HeightmapTile::encode_height(-5000.0), 0);
        assert_eq!(HeightmapTile::encode_height(12.2), 5061);
    }

    #[test]
    fn payload_layout() {
        let tile = HeightmapTile::flat(TileCoordinate::new(0, 0, 0), 0.0, ALL_CHILDREN);
        let mut out = Vec::new();
        tile.write_to(&mut out, &SerializeOptions::default()).unwrap();
        assert_eq!(out.len(), HEIGHTMAP_SIZE * HEIGHTMAP_SIZE * 2 + 1);
        assert_eq!(&out[..2], &5000u16.to_le_bytes());
        assert_eq!(*out.last().unwrap(), ALL_CHILDREN);

        let mut with_mask = Vec::new();
        tile.write_to(&mut with_mask, &SerializeOptions { water_mask: true }).unwrap();
        assert_eq!(with_mask.len(), out.len() + 1);
        assert_eq!(*with_mask.last().unwrap(), 0);
    }

    #[test]
    fn leaf_tiles_have_no_children() {
        let source = FlatTerrainSource::new(100.0, 3);
        assert_eq!(source.render(TileCoordinate::new(3, 0, 0)).unwrap().children(), 0);
        assert_eq!(source.render(TileCoordinate::new(2, 0, 0)).unwrap().children(), ALL_CHILDREN);
    }
}
