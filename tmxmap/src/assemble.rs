use std::io::{self, Write};

use log::debug;
use pyxel::{Layer, ProjectDocument, Tileset};
use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Writer,
};
use rayon::prelude::*;

use crate::{
    encode::encode,
    layer::{cell_count, rasterize},
    tile::OrdinalRule,
    Error,
};

const MAP_VERSION: &str = "1.4";
const TILED_VERSION: &str = "1.4.1";

pub const TILESET_NAME: &str = "tiles";
pub const TILESET_IMAGE: &str = "./tileset.png";

#[derive(Clone, Debug)]
pub struct AssembleOptions {
    pub ordinal_rule: OrdinalRule,
    /// Path the tileset `<image>` points at, relative to the map file.
    pub tileset_source: String,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            ordinal_rule: OrdinalRule::default(),
            tileset_source: TILESET_IMAGE.to_string(),
        }
    }
}

/// A fully assembled map, ready to be rendered with [MapDocument::to_xml].
#[derive(Clone, Debug)]
pub struct MapDocument {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub next_layer_id: u32,
    pub tileset: TilesetDecl,
    // In output order (topmost last).
    pub layers: Vec<LayerBlock>,
}

#[derive(Clone, Debug)]
pub struct TilesetDecl {
    pub first_gid: u32,
    pub name: String,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tile_count: u32,
    pub columns: u32,
    pub image: ImageDecl,
}

#[derive(Clone, Debug)]
pub struct ImageDecl {
    pub source: String,
    pub width: u32,
    pub height: u32,
    /// Tile rows the image is laid out in (not written to the map).
    pub rows: u32,
}

#[derive(Clone, Debug)]
pub struct LayerBlock {
    pub id: u32,
    pub name: String,
    pub visible: bool,
    pub opacity: f64,
    pub width: u32,
    pub height: u32,
    /// base64 of the zlib-compressed cells
    pub data: String,
}

fn grid_dimension(
    canvas: u32,
    canvas_field: &'static str,
    tile: u32,
    tile_field: &'static str,
) -> Result<u32, Error> {
    if tile == 0 {
        return Err(Error::Malformed {
            field: tile_field,
            reason: "must be non-zero".to_string(),
        });
    }
    if canvas == 0 {
        return Err(Error::Malformed {
            field: canvas_field,
            reason: "must be non-zero".to_string(),
        });
    }
    if canvas % tile != 0 {
        return Err(Error::Malformed {
            field: canvas_field,
            reason: format!(
                "({canvas}) is not a multiple of {tile_field} ({tile})"
            ),
        });
    }

    Ok(canvas / tile)
}

/// Map size in tiles. The grid must fit in [crate::layer::MAX_CELLS].
pub fn grid_size(doc: &ProjectDocument) -> Result<(u32, u32), Error> {
    let width = grid_dimension(
        doc.canvas.width,
        "canvas.width",
        doc.tileset.tile_width,
        "tileset.tileWidth",
    )?;
    let height = grid_dimension(
        doc.canvas.height,
        "canvas.height",
        doc.tileset.tile_height,
        "tileset.tileHeight",
    )?;
    cell_count(width, height)?;
    Ok((width, height))
}

/// Rows the tileset image is declared with: `1 + round(tiles / columns)`.
///
/// This is one more row than strictly needed in most cases; the composed
/// image is sized from the same number so the two always agree. `None` if
/// `columns` is zero or the row count doesn't fit in a `u32`.
pub fn tileset_rows(num_tiles: u32, columns: u32) -> Option<u32> {
    if columns == 0 {
        return None;
    }
    let (n, c) = (num_tiles as u64, columns as u64);
    // round half up, in integers
    u32::try_from(1 + (2 * n + c) / (2 * c)).ok()
}

fn too_large(field: &'static str, what: &str) -> Error {
    Error::Malformed {
        field,
        reason: format!("makes the tileset image {what} overflow"),
    }
}

fn image_decl(tileset: &Tileset, source: &str) -> Result<ImageDecl, Error> {
    if tileset.tiles_wide == 0 {
        return Err(Error::Malformed {
            field: "tileset.tilesWide",
            reason: "must be non-zero".to_string(),
        });
    }

    let width = tileset
        .tiles_wide
        .checked_mul(tileset.tile_width)
        .ok_or_else(|| too_large("tileset.tilesWide", "width"))?;
    let rows = tileset_rows(tileset.num_tiles, tileset.tiles_wide)
        .ok_or_else(|| too_large("tileset.numTiles", "height"))?;
    let height = rows
        .checked_mul(tileset.tile_height)
        .ok_or_else(|| too_large("tileset.numTiles", "height"))?;

    Ok(ImageDecl {
        source: source.to_string(),
        width,
        height,
        rows,
    })
}

fn layer_block(
    layer: &Layer,
    width: u32,
    height: u32,
    rule: OrdinalRule,
) -> Result<LayerBlock, Error> {
    let grid = rasterize(layer, width, height, rule)?;
    let data = encode(&grid).map_err(|source| Error::Compression {
        layer: layer.name.clone(),
        source,
    })?;
    debug!("encoded layer {:?} ({} bytes)", layer.name, data.len());

    Ok(LayerBlock {
        id: 0,
        name: layer.name.clone(),
        visible: !layer.hidden,
        opacity: layer.alpha as f64 / 255.0,
        width,
        height,
        data,
    })
}

/// Build the TMX map for a project.
///
/// Layers are rasterized and encoded in parallel. Nothing is returned unless
/// every layer succeeds.
pub fn assemble(
    doc: &ProjectDocument,
    options: &AssembleOptions,
) -> Result<MapDocument, Error> {
    let (width, height) = grid_size(doc)?;
    let tileset = &doc.tileset;
    let image = image_decl(tileset, &options.tileset_source)?;

    let layers: Vec<&Layer> = doc.layers().collect();
    // Indexed collect keeps source order no matter which layer finishes first.
    let mut blocks = layers
        .par_iter()
        .map(|layer| layer_block(layer, width, height, options.ordinal_rule))
        .collect::<Result<Vec<_>, Error>>()?;

    // PyxelEdit lists the topmost layer first; TMX draws in document order.
    blocks.reverse();
    for (id, block) in blocks.iter_mut().enumerate() {
        block.id = id as u32;
    }

    Ok(MapDocument {
        width,
        height,
        tile_width: tileset.tile_width,
        tile_height: tileset.tile_height,
        next_layer_id: doc.layer_count().saturating_add(1),
        tileset: TilesetDecl {
            first_gid: 1,
            name: TILESET_NAME.to_string(),
            tile_width: tileset.tile_width,
            tile_height: tileset.tile_height,
            tile_count: tileset.num_tiles,
            columns: tileset.tiles_wide,
            image,
        },
        layers: blocks,
    })
}

fn start<'a>(name: &'a str, attrs: &[(&str, String)]) -> BytesStart<'a> {
    BytesStart::new(name)
        .with_attributes(attrs.iter().map(|(k, v)| (*k, v.as_str())))
}

impl MapDocument {
    fn write_tileset<W: Write>(
        &self,
        writer: &mut Writer<W>,
    ) -> io::Result<()> {
        let ts = &self.tileset;
        let attrs = [
            ("firstgid", ts.first_gid.to_string()),
            ("name", ts.name.clone()),
            ("tilewidth", ts.tile_width.to_string()),
            ("tileheight", ts.tile_height.to_string()),
            ("tilecount", ts.tile_count.to_string()),
            ("columns", ts.columns.to_string()),
        ];
        writer.write_event(Event::Start(start("tileset", &attrs)))?;

        let image = [
            ("source", ts.image.source.clone()),
            ("width", ts.image.width.to_string()),
            ("height", ts.image.height.to_string()),
        ];
        writer.write_event(Event::Empty(start("image", &image)))?;
        writer.write_event(Event::End(BytesEnd::new("tileset")))
    }

    fn write_layer<W: Write>(
        writer: &mut Writer<W>,
        layer: &LayerBlock,
    ) -> io::Result<()> {
        let attrs = [
            ("id", layer.id.to_string()),
            ("name", layer.name.clone()),
            ("visible", (layer.visible as u8).to_string()),
            ("opacity", layer.opacity.to_string()),
            ("width", layer.width.to_string()),
            ("height", layer.height.to_string()),
        ];
        writer.write_event(Event::Start(start("layer", &attrs)))?;

        let data = [
            ("encoding", "base64".to_string()),
            ("compression", "zlib".to_string()),
        ];
        writer.write_event(Event::Start(start("data", &data)))?;
        writer.write_event(Event::Text(BytesText::new(&layer.data)))?;
        writer.write_event(Event::End(BytesEnd::new("data")))?;

        writer.write_event(Event::End(BytesEnd::new("layer")))
    }

    /// Write the map as a TMX document.
    pub fn write_xml<W: Write>(&self, out: W) -> io::Result<()> {
        let mut writer = Writer::new_with_indent(out, b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new(
            "1.0",
            Some("UTF-8"),
            None,
        )))?;

        let attrs = [
            ("version", MAP_VERSION.to_string()),
            ("tiledversion", TILED_VERSION.to_string()),
            ("orientation", "orthogonal".to_string()),
            ("renderorder", "right-down".to_string()),
            ("width", self.width.to_string()),
            ("height", self.height.to_string()),
            ("tilewidth", self.tile_width.to_string()),
            ("tileheight", self.tile_height.to_string()),
            ("infinite", "0".to_string()),
            ("nextlayerid", self.next_layer_id.to_string()),
            ("nextobjectid", "1".to_string()),
        ];
        writer.write_event(Event::Start(start("map", &attrs)))?;
        self.write_tileset(&mut writer)?;
        for layer in self.layers.iter() {
            Self::write_layer(&mut writer, layer)?;
        }
        writer.write_event(Event::End(BytesEnd::new("map")))?;

        writer.into_inner().write_all(b"\n")
    }

    pub fn to_xml(&self) -> io::Result<String> {
        let mut buf = Vec::new();
        self.write_xml(&mut buf)?;
        String::from_utf8(buf)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }
}
