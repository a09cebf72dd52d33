// Reading PyxelEdit `.pyxel` projects.
//
// A project is a zip container holding one `docData.json` document plus one
// PNG per tileset tile (`tile0.png`, `tile1.png`, ...). This crate parses the
// document and pulls the tile images out under names that sort in tile order.

use thiserror::Error;

pub mod archive;
pub mod document;

pub use archive::{Archive, Extraction};
pub use document::{Canvas, Layer, ProjectDocument, Rotation, TileRef, Tileset};

#[derive(Error, Debug)]
pub enum Error {
    #[error("archive has no {} entry", archive::METADATA_ENTRY)]
    MissingMetadata,
    #[error("invalid rotation code {0} (expected 0-3)")]
    InvalidRotation(u8),

    // Errors from other libraries
    #[error("malformed {}", archive::METADATA_ENTRY)]
    MalformedMetadata(#[from] serde_json::Error),
    #[error("error reading archive")]
    ZipError(#[from] zip::result::ZipError),
    #[error("error extracting {name}")]
    ExtractError {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("io error")]
    IoError(#[from] std::io::Error),
}
