// Building Tiled (`.tmx`) maps out of PyxelEdit project documents.
//
// PyxelEdit keeps a sparse map of tile references per layer, each with its own
// rotation and flip. TMX wants a dense row-major array of global tile ids with
// the flips packed into the high bits, zlib-compressed and base64-encoded.

use std::io;

use thiserror::Error;

pub mod assemble;
pub mod encode;
pub mod layer;
pub mod tile;

pub use assemble::{assemble, AssembleOptions, MapDocument};
pub use encode::{decode, encode};
pub use layer::{rasterize, DenseLayerGrid};
pub use tile::{pack, OrdinalRule, PackedTile};

#[derive(Error, Debug)]
pub enum Error {
    // Bad input documents
    #[error("malformed metadata: {field} {reason}")]
    Malformed { field: &'static str, reason: String },
    #[error("layer {layer:?}: tile key {key} is outside the map ({cells} cells)")]
    CellOutOfRange {
        layer: String,
        key: i64,
        cells: usize,
    },
    #[error("layer {layer:?}: tile index {index} at key {key} is too large")]
    TileIndexOutOfRange { layer: String, key: i64, index: i64 },

    #[error("failed to compress layer {layer:?}")]
    Compression {
        layer: String,
        #[source]
        source: io::Error,
    },

    // Raised by [decode]
    #[error("layer data is not valid base64")]
    Base64Error(#[from] base64::DecodeError),
    #[error("layer data is not a valid zlib stream")]
    InflateError(#[source] io::Error),
    #[error("layer data is {0} bytes, expected a multiple of 4")]
    TruncatedLayerData(usize),
}
