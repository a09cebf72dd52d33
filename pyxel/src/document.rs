use std::collections::BTreeMap;

use serde::Deserialize;

use crate::Error;

/// The parsed contents of `docData.json`.
///
/// Only the canvas and tileset are read; everything else PyxelEdit stores
/// there (palette, animations, ...) is ignored.
#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDocument {
    pub canvas: Canvas,
    pub tileset: Tileset,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub num_layers: Option<u32>,
    // PyxelEdit writes layers as an object keyed by position ("0", "1", ...).
    // Keying by the parsed number keeps "10" after "9".
    pub layers: BTreeMap<u32, Layer>,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Tileset {
    pub tile_width: u32,
    pub tile_height: u32,
    pub num_tiles: u32,
    pub tiles_wide: u32,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub name: String,
    #[serde(default = "opaque")]
    pub alpha: u8,
    #[serde(default)]
    pub hidden: bool,
    // INVARIANT (checked when rasterizing): 0 <= key < width * height, where
    // the key is a row-major cell offset. Absent keys are empty cells.
    #[serde(default)]
    pub tile_refs: BTreeMap<i64, TileRef>,
}

#[derive(Deserialize, Copy, Clone, PartialEq, Eq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TileRef {
    /// Raw PyxelEdit tile index, not yet offset.
    pub index: i64,
    #[serde(default)]
    pub rot: Rotation,
    #[serde(default)]
    pub flip_x: bool,
}

/// Clockwise quarter turns, as stored in a tile reference's `rot` code.
#[derive(Deserialize, Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
#[serde(try_from = "u8")]
pub enum Rotation {
    #[default]
    None = 0,
    Quarter = 1,
    Half = 2,
    ThreeQuarters = 3,
}

fn opaque() -> u8 {
    u8::MAX
}

impl ProjectDocument {
    pub fn from_slice(buf: &[u8]) -> Result<Self, Error> {
        Ok(serde_json::from_slice(buf)?)
    }

    /// Layers in document order.
    pub fn layers(&self) -> impl DoubleEndedIterator<Item = &Layer> {
        self.canvas.layers.values()
    }

    pub fn layer_count(&self) -> u32 {
        self.canvas
            .num_layers
            .unwrap_or(self.canvas.layers.len() as u32)
    }
}

impl Layer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alpha: opaque(),
            hidden: false,
            tile_refs: BTreeMap::new(),
        }
    }
}

impl TileRef {
    pub fn new(index: i64, rot: Rotation, flip_x: bool) -> Self {
        Self { index, rot, flip_x }
    }
}

impl Rotation {
    pub const ALL: [Rotation; 4] = [
        Rotation::None,
        Rotation::Quarter,
        Rotation::Half,
        Rotation::ThreeQuarters,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Rotation {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or(Error::InvalidRotation(code))
    }
}
