use log::trace;
use pyxel::Layer;

use crate::{
    tile::{pack, OrdinalRule, PackedTile, MAX_ORDINAL},
    Error,
};

/// Largest grid a layer may have. Each cell is four bytes per layer.
pub const MAX_CELLS: usize = 1 << 26;

/// Number of cells in a `width` by `height` grid, or an error if it is larger
/// than [MAX_CELLS].
pub fn cell_count(width: u32, height: u32) -> Result<usize, Error> {
    match (width as u64).checked_mul(height as u64) {
        Some(cells) if cells <= MAX_CELLS as u64 => Ok(cells as usize),
        _ => Err(Error::Malformed {
            field: "canvas.width",
            reason: format!(
                "{width}x{height} tiles is more than {MAX_CELLS} cells"
            ),
        }),
    }
}

/// A layer as TMX stores it: one packed tile per cell, row-major, starting at
/// the top left.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DenseLayerGrid {
    width: u32,
    height: u32,
    // INVARIANT: cells.len() = width * height
    cells: Vec<PackedTile>,
}

impl DenseLayerGrid {
    pub fn empty(width: u32, height: u32) -> Result<Self, Error> {
        Ok(Self {
            width,
            height,
            cells: vec![0; cell_count(width, height)?],
        })
    }

    pub fn cells(&self) -> &[PackedTile] {
        &self.cells
    }

    pub fn tile_at(&self, x: u32, y: u32) -> Option<PackedTile> {
        if x >= self.width || y >= self.height {
            return None;
        }

        self.cells
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }
}

/// Scatter a layer's sparse tile references into a dense grid.
///
/// Each key is a row-major cell offset. Keys outside the grid, and indices
/// too large to be packed, are reported rather than wrapped or dropped.
pub fn rasterize(
    layer: &Layer,
    width: u32,
    height: u32,
    rule: OrdinalRule,
) -> Result<DenseLayerGrid, Error> {
    let mut grid = DenseLayerGrid::empty(width, height)?;
    let cells = grid.cells.len();

    for (&key, tile) in layer.tile_refs.iter() {
        let offset = match usize::try_from(key) {
            Ok(offset) if offset < cells => offset,
            _ => {
                return Err(Error::CellOutOfRange {
                    layer: layer.name.clone(),
                    key,
                    cells,
                })
            }
        };

        if rule.ordinal(tile.index) > MAX_ORDINAL as i64 {
            return Err(Error::TileIndexOutOfRange {
                layer: layer.name.clone(),
                key,
                index: tile.index,
            });
        }

        grid.cells[offset] = pack(tile, rule);
    }

    trace!(
        "rasterized {:?}: {} of {} cells set",
        layer.name,
        layer.tile_refs.len(),
        cells
    );

    Ok(grid)
}
