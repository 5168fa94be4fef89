use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::math::{Rect, Vec2};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub col: i32,
    pub row: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileSize {
    pub width: f32,
    pub height: f32,
}

/// Read-only view of the water/ground tile layer.
pub trait TileOracle {
    fn is_water_at(&self, world_x: f32, world_y: f32) -> bool;

    fn tile_size(&self) -> TileSize;

    fn world_to_tile(&self, world_x: f32, world_y: f32) -> Option<TileCoord>;

    fn tile_center(&self, tile: TileCoord) -> Vec2 {
        let size = self.tile_size();
        Vec2 {
            x: (tile.col as f32 + 0.5) * size.width,
            y: (tile.row as f32 + 0.5) * size.height,
        }
    }

    fn is_water_tile(&self, tile: TileCoord) -> bool {
        let center = self.tile_center(tile);
        self.is_water_at(center.x, center.y)
    }
}

/// Read-only view of the tagged occlusion regions and their layer depths.
pub trait OcclusionOracle {
    fn region_tags_at(&self, world_x: f32, world_y: f32, tolerance: f32) -> BTreeSet<String>;

    /// Depth of the layer that should hide entities standing in `tags`.
    fn base_depth_for_tags(&self, tags: &BTreeSet<String>) -> Option<f32>;

    fn max_elevated_layer_depth(&self) -> Option<f32>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileKind {
    #[default]
    Ground,
    Water,
    Blocked,
}

impl TileKind {
    fn from_glyph(glyph: char) -> Option<Self> {
        match glyph {
            '.' => Some(Self::Ground),
            '~' => Some(Self::Water),
            '#' => Some(Self::Blocked),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TilemapError {
    #[error("tile count mismatch: expected {expected}, got {actual}")]
    TileCountMismatch { expected: usize, actual: usize },
    #[error("row {row} has {actual} tiles, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        actual: usize,
    },
    #[error("unknown tile glyph '{glyph}' at row {row}, column {col}")]
    UnknownGlyph { glyph: char, row: usize, col: usize },
}

/// Tile layer origin convention:
/// - `origin` is the world position of tile (0,0) top-left corner.
/// - The center of tile (c,r) is `origin + ((c + 0.5) * w, (r + 0.5) * h)`.
#[derive(Debug, Clone, PartialEq)]
pub struct WaterTilemap {
    width: u32,
    height: u32,
    origin: Vec2,
    tile_size: TileSize,
    tiles: Vec<TileKind>,
}

impl WaterTilemap {
    pub fn new(
        width: u32,
        height: u32,
        origin: Vec2,
        tile_size: TileSize,
        tiles: Vec<TileKind>,
    ) -> Result<Self, TilemapError> {
        let expected = width as usize * height as usize;
        let actual = tiles.len();
        if expected != actual {
            return Err(TilemapError::TileCountMismatch { expected, actual });
        }
        Ok(Self {
            width,
            height,
            origin,
            tile_size,
            tiles,
        })
    }

    /// Builds a layer from text rows: `.` ground, `~` water, `#` blocked.
    pub fn from_rows<S: AsRef<str>>(
        rows: &[S],
        origin: Vec2,
        tile_size: TileSize,
    ) -> Result<Self, TilemapError> {
        let width = rows
            .first()
            .map(|row| row.as_ref().chars().count())
            .unwrap_or(0);
        let mut tiles = Vec::with_capacity(width * rows.len());
        for (row_index, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            let actual = row.chars().count();
            if actual != width {
                return Err(TilemapError::RaggedRow {
                    row: row_index,
                    expected: width,
                    actual,
                });
            }
            for (col, glyph) in row.chars().enumerate() {
                let kind = TileKind::from_glyph(glyph).ok_or(TilemapError::UnknownGlyph {
                    glyph,
                    row: row_index,
                    col,
                })?;
                tiles.push(kind);
            }
        }
        Self::new(width as u32, rows.len() as u32, origin, tile_size, tiles)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    pub fn index_of(&self, tile: TileCoord) -> Option<usize> {
        if tile.col < 0 || tile.row < 0 {
            return None;
        }
        let (col, row) = (tile.col as u32, tile.row as u32);
        if col >= self.width || row >= self.height {
            return None;
        }
        Some(row as usize * self.width as usize + col as usize)
    }

    pub fn tile_at(&self, tile: TileCoord) -> Option<TileKind> {
        self.index_of(tile)
            .and_then(|index| self.tiles.get(index).copied())
    }

    pub fn set_tile(&mut self, tile: TileCoord, kind: TileKind) -> bool {
        let Some(index) = self.index_of(tile) else {
            return false;
        };
        self.tiles[index] = kind;
        true
    }

    fn tile_unchecked(&self, world_x: f32, world_y: f32) -> TileCoord {
        TileCoord {
            col: ((world_x - self.origin.x) / self.tile_size.width).floor() as i32,
            row: ((world_y - self.origin.y) / self.tile_size.height).floor() as i32,
        }
    }
}

impl TileOracle for WaterTilemap {
    fn is_water_at(&self, world_x: f32, world_y: f32) -> bool {
        let tile = self.tile_unchecked(world_x, world_y);
        self.tile_at(tile) == Some(TileKind::Water)
    }

    fn tile_size(&self) -> TileSize {
        self.tile_size
    }

    fn world_to_tile(&self, world_x: f32, world_y: f32) -> Option<TileCoord> {
        if !world_x.is_finite() || !world_y.is_finite() {
            return None;
        }
        let tile = self.tile_unchecked(world_x, world_y);
        self.index_of(tile)?;
        Some(tile)
    }

    fn tile_center(&self, tile: TileCoord) -> Vec2 {
        Vec2 {
            x: self.origin.x + (tile.col as f32 + 0.5) * self.tile_size.width,
            y: self.origin.y + (tile.row as f32 + 0.5) * self.tile_size.height,
        }
    }

    fn is_water_tile(&self, tile: TileCoord) -> bool {
        self.tile_at(tile) == Some(TileKind::Water)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcclusionRegion {
    pub tag: String,
    pub bounds: Rect,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionMap {
    regions: Vec<OcclusionRegion>,
    layer_depths: BTreeMap<String, f32>,
    elevated_layer_depth: Option<f32>,
}

impl RegionMap {
    pub fn add_region(&mut self, tag: impl Into<String>, bounds: Rect) {
        self.regions.push(OcclusionRegion {
            tag: tag.into(),
            bounds,
        });
    }

    pub fn set_layer_depth(&mut self, tag: impl Into<String>, depth: f32) {
        self.layer_depths.insert(tag.into(), depth);
    }

    pub fn set_elevated_layer_depth(&mut self, depth: Option<f32>) {
        self.elevated_layer_depth = depth;
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }
}

impl OcclusionOracle for RegionMap {
    fn region_tags_at(&self, world_x: f32, world_y: f32, tolerance: f32) -> BTreeSet<String> {
        let point = Vec2::new(world_x, world_y);
        self.regions
            .iter()
            .filter(|region| region.bounds.contains(point, tolerance))
            .map(|region| region.tag.clone())
            .collect()
    }

    fn base_depth_for_tags(&self, tags: &BTreeSet<String>) -> Option<f32> {
        tags.iter()
            .filter_map(|tag| self.layer_depths.get(tag).copied())
            .reduce(f32::min)
    }

    fn max_elevated_layer_depth(&self) -> Option<f32> {
        self.elevated_layer_depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TILE: TileSize = TileSize {
        width: 16.0,
        height: 16.0,
    };

    #[test]
    fn from_rows_parses_glyphs_and_queries_world_points() {
        let map = WaterTilemap::from_rows(&["..~", ".~~", "#~~"], Vec2::ZERO, TILE).expect("map");
        assert_eq!(map.width(), 3);
        assert_eq!(map.height(), 3);
        assert!(map.is_water_at(40.0, 8.0));
        assert!(!map.is_water_at(8.0, 8.0));
        assert!(!map.is_water_at(8.0, 40.0));
        assert!(!map.is_water_at(-4.0, 8.0));
        assert_eq!(
            map.world_to_tile(17.0, 33.0),
            Some(TileCoord { col: 1, row: 2 })
        );
        assert_eq!(map.world_to_tile(48.0, 0.0), None);
    }

    #[test]
    fn from_rows_rejects_ragged_rows_and_unknown_glyphs() {
        assert!(matches!(
            WaterTilemap::from_rows(&["..", "."], Vec2::ZERO, TILE),
            Err(TilemapError::RaggedRow { row: 1, .. })
        ));
        assert!(matches!(
            WaterTilemap::from_rows(&[".x"], Vec2::ZERO, TILE),
            Err(TilemapError::UnknownGlyph { glyph: 'x', .. })
        ));
    }

    #[test]
    fn new_rejects_mismatched_tile_count() {
        let result = WaterTilemap::new(2, 2, Vec2::ZERO, TILE, vec![TileKind::Ground; 3]);
        assert_eq!(
            result,
            Err(TilemapError::TileCountMismatch {
                expected: 4,
                actual: 3
            })
        );
    }

    #[test]
    fn tile_center_honours_origin() {
        let map = WaterTilemap::from_rows(&["~~"], Vec2::new(100.0, 50.0), TILE).expect("map");
        assert_eq!(
            map.tile_center(TileCoord { col: 1, row: 0 }),
            Vec2::new(124.0, 58.0)
        );
    }

    #[test]
    fn region_map_reports_tags_and_lowest_layer_depth() {
        let mut regions = RegionMap::default();
        regions.add_region(
            "roof",
            Rect {
                x: 0.0,
                y: 0.0,
                width: 50.0,
                height: 50.0,
            },
        );
        regions.add_region(
            "tree",
            Rect {
                x: 40.0,
                y: 40.0,
                width: 20.0,
                height: 20.0,
            },
        );
        regions.set_layer_depth("roof", 30.0);
        regions.set_layer_depth("tree", 25.0);

        let tags = regions.region_tags_at(45.0, 45.0, 0.0);
        assert_eq!(tags.len(), 2);
        assert_eq!(regions.base_depth_for_tags(&tags), Some(25.0));

        let outside = regions.region_tags_at(100.0, 100.0, 0.0);
        assert!(outside.is_empty());
        assert_eq!(regions.base_depth_for_tags(&outside), None);

        let near_edge = regions.region_tags_at(51.0, 10.0, 2.0);
        assert!(near_edge.contains("roof"));
    }
}
