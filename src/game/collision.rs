//! Tile collision index built from a Tiled JSON map
//!
//! A cell is blocked when any tile layer places a tile there whose tileset
//! definition carries `collideable = true`. Anything outside the map is
//! blocked. The index is built once at startup and never mutated.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use super::entity::Vec2;

/// Name of the boolean tile property that marks a tile as blocking
pub const COLLIDEABLE_PROPERTY: &str = "collideable";

/// Tiled stores flip/rotation flags in the top bits of each GID
const GID_FLAG_MASK: u32 = 0x1FFF_FFFF;

/// Immutable set of blocked tiles plus map geometry
#[derive(Debug, Clone)]
pub struct CollisionIndex {
    blocked: HashSet<(i32, i32)>,
    width: i32,
    height: i32,
    tile_width: f32,
    tile_height: f32,
}

impl CollisionIndex {
    /// Build directly from a set of blocked cells
    pub fn from_blocked(
        width: u32,
        height: u32,
        tile_width: f32,
        tile_height: f32,
        blocked: impl IntoIterator<Item = (i32, i32)>,
    ) -> Self {
        Self {
            blocked: blocked.into_iter().collect(),
            width: width as i32,
            height: height as i32,
            tile_width,
            tile_height,
        }
    }

    /// Load a Tiled JSON map from disk. External tilesets resolve relative
    /// to the map file.
    pub fn from_path(path: &Path) -> Result<Self, MapError> {
        let json = fs::read_to_string(path).map_err(|source| MapError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let index = Self::from_json_str(&json, path.parent())?;
        let world = index.world_size();
        info!(
            path = %path.display(),
            width = index.width,
            height = index.height,
            world_width = world.x,
            world_height = world.y,
            blocked = index.blocked_count(),
            "Collision index built"
        );
        Ok(index)
    }

    /// Parse a Tiled JSON map document
    pub fn from_json_str(json: &str, base_dir: Option<&Path>) -> Result<Self, MapError> {
        let map: TiledMap = serde_json::from_str(json).map_err(MapError::Parse)?;

        if map.infinite {
            return Err(MapError::Unsupported("infinite maps"));
        }
        if map.width == 0 || map.height == 0 || map.tilewidth == 0 || map.tileheight == 0 {
            return Err(MapError::InvalidDimensions);
        }

        let mut collideable: HashSet<u32> = HashSet::new();
        for tileset in &map.tilesets {
            let definition = tileset.resolve(base_dir)?;
            for tile in &definition.tiles {
                if tile.is_collideable() {
                    let gid = tileset
                        .firstgid
                        .checked_add(tile.id)
                        .ok_or(MapError::InvalidDimensions)?;
                    collideable.insert(gid);
                }
            }
        }
        debug!(count = collideable.len(), "Collideable tile ids");

        let mut tile_layers = Vec::new();
        collect_tile_layers(&map.layers, &mut tile_layers);

        let expected = map
            .width
            .checked_mul(map.height)
            .filter(|&cells| i32::try_from(cells).is_ok())
            .ok_or(MapError::InvalidDimensions)? as usize;
        let mut blocked = HashSet::new();
        for layer in tile_layers {
            let tiles = match &layer.data {
                Some(LayerData::Tiles(tiles)) => tiles,
                Some(LayerData::Encoded(_)) => {
                    return Err(MapError::Unsupported("encoded layer data"))
                }
                None => return Err(MapError::MissingLayerData(layer.name.clone())),
            };
            if tiles.len() != expected {
                return Err(MapError::LayerSize {
                    layer: layer.name.clone(),
                    expected,
                    actual: tiles.len(),
                });
            }

            for (i, raw) in tiles.iter().enumerate() {
                let gid = raw & GID_FLAG_MASK;
                if gid != 0 && collideable.contains(&gid) {
                    let x = (i as u32 % map.width) as i32;
                    let y = (i as u32 / map.width) as i32;
                    blocked.insert((x, y));
                }
            }
        }

        Ok(Self::from_blocked(
            map.width,
            map.height,
            map.tilewidth as f32,
            map.tileheight as f32,
            blocked,
        ))
    }

    /// Is the tile at (tile_x, tile_y) blocking? Out of bounds is always blocked.
    pub fn is_blocked(&self, tile_x: i32, tile_y: i32) -> bool {
        if tile_x < 0 || tile_y < 0 || tile_x >= self.width || tile_y >= self.height {
            return true;
        }
        self.blocked.contains(&(tile_x, tile_y))
    }

    /// Tile column containing a world x coordinate
    pub fn tile_x(&self, x: f32) -> i32 {
        (x / self.tile_width).floor() as i32
    }

    /// Tile row containing a world y coordinate
    pub fn tile_y(&self, y: f32) -> i32 {
        (y / self.tile_height).floor() as i32
    }

    pub fn tile_of(&self, point: Vec2) -> (i32, i32) {
        (self.tile_x(point.x), self.tile_y(point.y))
    }

    /// Is the tile under a world-space point blocking?
    pub fn is_blocked_at(&self, point: Vec2) -> bool {
        let (tx, ty) = self.tile_of(point);
        self.is_blocked(tx, ty)
    }

    /// Map size in tiles
    pub fn dimensions(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    /// Map size in world units
    pub fn world_size(&self) -> Vec2 {
        Vec2::new(
            self.width as f32 * self.tile_width,
            self.height as f32 * self.tile_height,
        )
    }

    /// Centre of a tile in world units
    pub fn tile_center(&self, tile_x: i32, tile_y: i32) -> Vec2 {
        Vec2::new(
            (tile_x as f32 + 0.5) * self.tile_width,
            (tile_y as f32 + 0.5) * self.tile_height,
        )
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked.len()
    }
}

fn collect_tile_layers<'a>(layers: &'a [TiledLayer], out: &mut Vec<&'a TiledLayer>) {
    for layer in layers {
        match layer.kind.as_str() {
            "tilelayer" => out.push(layer),
            "group" => collect_tile_layers(&layer.layers, out),
            _ => {}
        }
    }
}

#[derive(Debug, Deserialize)]
struct TiledMap {
    width: u32,
    height: u32,
    tilewidth: u32,
    tileheight: u32,
    #[serde(default)]
    infinite: bool,
    #[serde(default)]
    layers: Vec<TiledLayer>,
    #[serde(default)]
    tilesets: Vec<TiledTilesetRef>,
}

#[derive(Debug, Deserialize)]
struct TiledLayer {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    data: Option<LayerData>,
    /// Children of a group layer
    #[serde(default)]
    layers: Vec<TiledLayer>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LayerData {
    Tiles(Vec<u32>),
    Encoded(serde::de::IgnoredAny),
}

/// Tileset entry inside a map: either embedded or a pointer to a file
#[derive(Debug, Deserialize)]
struct TiledTilesetRef {
    firstgid: u32,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    tiles: Vec<TiledTile>,
}

impl TiledTilesetRef {
    fn resolve(&self, base_dir: Option<&Path>) -> Result<TiledTileset, MapError> {
        let Some(source) = &self.source else {
            return Ok(TiledTileset {
                tiles: self.tiles.clone(),
            });
        };

        let path = match base_dir {
            Some(dir) => dir.join(source),
            None => PathBuf::from(source),
        };
        let json = fs::read_to_string(&path).map_err(|source| MapError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&json).map_err(MapError::Parse)
    }
}

#[derive(Debug, Deserialize)]
struct TiledTileset {
    #[serde(default)]
    tiles: Vec<TiledTile>,
}

#[derive(Debug, Clone, Deserialize)]
struct TiledTile {
    id: u32,
    #[serde(default)]
    properties: Vec<TiledProperty>,
}

impl TiledTile {
    fn is_collideable(&self) -> bool {
        self.properties
            .iter()
            .any(|p| p.name == COLLIDEABLE_PROPERTY && p.value == serde_json::Value::Bool(true))
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TiledProperty {
    name: String,
    #[serde(default)]
    value: serde_json::Value,
}

/// Map loading errors. All of these are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed map JSON: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("Map dimensions or tile ids are zero or out of range")]
    InvalidDimensions,

    #[error("Layer '{0}' has no tile data")]
    MissingLayerData(String),

    #[error("Layer '{layer}' has {actual} tiles, expected {expected}")]
    LayerSize {
        layer: String,
        expected: usize,
        actual: usize,
    },

    #[error("Unsupported map feature: {0}")]
    Unsupported(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 4x3 map, 16px tiles. Tile id 1 (gid 2) is a wall; gid 1 is grass.
    const MAP: &str = r#"{
        "width": 4, "height": 3, "tilewidth": 16, "tileheight": 16,
        "layers": [
            { "type": "tilelayer", "name": "ground",
              "data": [1,1,1,1, 1,1,1,1, 1,1,1,1] },
            { "type": "group", "name": "deco", "layers": [
                { "type": "tilelayer", "name": "walls",
                  "data": [0,2,0,0, 0,0,0,0, 0,0,0,2147483650] }
            ]},
            { "type": "objectgroup", "name": "spawns", "objects": [] }
        ],
        "tilesets": [
            { "firstgid": 1, "tiles": [
                { "id": 0, "properties": [{ "name": "collideable", "type": "bool", "value": false }] },
                { "id": 1, "properties": [{ "name": "collideable", "type": "bool", "value": true }] }
            ]}
        ]
    }"#;

    #[test]
    fn collideable_tiles_are_blocked_on_any_layer() {
        let index = CollisionIndex::from_json_str(MAP, None).unwrap();
        assert!(index.is_blocked(1, 0));
        // Flipped GID still resolves to the wall tile
        assert!(index.is_blocked(3, 2));
        assert!(!index.is_blocked(0, 0));
        assert!(!index.is_blocked(2, 1));
        assert_eq!(index.blocked_count(), 2);
    }

    #[test]
    fn out_of_bounds_is_blocked() {
        let index = CollisionIndex::from_json_str(MAP, None).unwrap();
        assert!(index.is_blocked(-1, 0));
        assert!(index.is_blocked(0, -1));
        assert!(index.is_blocked(4, 0));
        assert!(index.is_blocked(0, 3));
    }

    #[test]
    fn world_coordinates_floor_to_tiles() {
        let index = CollisionIndex::from_json_str(MAP, None).unwrap();
        assert_eq!(index.tile_of(Vec2::new(15.9, 16.0)), (0, 1));
        assert_eq!(index.tile_of(Vec2::new(-0.1, 0.0)), (-1, 0));
        assert!(index.is_blocked_at(Vec2::new(20.0, 5.0)));
        assert_eq!(index.world_size(), Vec2::new(64.0, 48.0));
    }

    #[test]
    fn malformed_maps_are_rejected() {
        assert!(matches!(
            CollisionIndex::from_json_str("{ not json", None),
            Err(MapError::Parse(_))
        ));

        let short_layer = r#"{ "width": 2, "height": 2, "tilewidth": 16, "tileheight": 16,
            "layers": [{ "type": "tilelayer", "name": "g", "data": [1, 1, 1] }], "tilesets": [] }"#;
        assert!(matches!(
            CollisionIndex::from_json_str(short_layer, None),
            Err(MapError::LayerSize { expected: 4, actual: 3, .. })
        ));

        let encoded = r#"{ "width": 1, "height": 1, "tilewidth": 16, "tileheight": 16,
            "layers": [{ "type": "tilelayer", "name": "g", "data": "AQAAAA==" }], "tilesets": [] }"#;
        assert!(matches!(
            CollisionIndex::from_json_str(encoded, None),
            Err(MapError::Unsupported(_))
        ));
    }

    #[test]
    fn oversized_values_are_rejected_without_overflow() {
        let huge_map = r#"{ "width": 4294967295, "height": 2, "tilewidth": 16, "tileheight": 16,
            "layers": [], "tilesets": [] }"#;
        assert!(matches!(
            CollisionIndex::from_json_str(huge_map, None),
            Err(MapError::InvalidDimensions)
        ));

        let huge_gid = r#"{ "width": 1, "height": 1, "tilewidth": 16, "tileheight": 16,
            "layers": [],
            "tilesets": [{ "firstgid": 4294967295, "tiles": [
                { "id": 3, "properties": [{ "name": "collideable", "value": true }] }
            ]}] }"#;
        assert!(matches!(
            CollisionIndex::from_json_str(huge_gid, None),
            Err(MapError::InvalidDimensions)
        ));
    }

    #[test]
    fn external_tileset_resolves_relative_to_map() {
        let dir = std::env::temp_dir().join(format!("collision-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("walls.tsj"),
            r#"{ "tiles": [{ "id": 0, "properties": [{ "name": "collideable", "value": true }] }] }"#,
        )
        .unwrap();
        fs::write(
            dir.join("map.json"),
            r#"{ "width": 2, "height": 1, "tilewidth": 8, "tileheight": 8,
                "layers": [{ "type": "tilelayer", "name": "g", "data": [0, 5] }],
                "tilesets": [{ "firstgid": 5, "source": "walls.tsj" }] }"#,
        )
        .unwrap();

        let index = CollisionIndex::from_path(&dir.join("map.json")).unwrap();
        assert!(!index.is_blocked(0, 0));
        assert!(index.is_blocked(1, 0));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn bundled_map_leaves_default_spawn_walkable() {
        use crate::game::entity::DEFAULT_SPAWN;
        use crate::game::movement::MovementSystem;

        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("assets/map.json");
        let index = CollisionIndex::from_path(&path).unwrap();
        assert_eq!(index.dimensions(), (40, 30));
        assert!(index.is_blocked(0, 0));
        let probe = MovementSystem::probe_point(DEFAULT_SPAWN);
        assert!(!index.is_blocked_at(probe));
    }
}
