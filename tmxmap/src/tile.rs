use pyxel::{Rotation, TileRef};

/// A TMX global tile id: 1-based ordinal in the low bits (0 = empty), flip
/// flags in the top three.
pub type PackedTile = u32;

pub const FLIPPED_HORIZONTALLY: u32 = 0x8000_0000;
pub const FLIPPED_VERTICALLY: u32 = 0x4000_0000;
pub const FLIPPED_DIAGONALLY: u32 = 0x2000_0000;

/// Largest ordinal that stays clear of every bit TMX reserves for flags
/// (including the hexagonal-rotation bit we never set).
pub const MAX_ORDINAL: u32 = 0x0FFF_FFFF;

const H: u32 = FLIPPED_HORIZONTALLY;
const V: u32 = FLIPPED_VERTICALLY;
const D: u32 = FLIPPED_DIAGONALLY;

/// Flag bits indexed by `[flip_x][rotation]`. TMX has no rotation, so each
/// quarter turn is expressed as a combination of the three flips.
pub const FLIP_TABLE: [[u32; 4]; 2] = [
    [0, H | D, H | V, V | D],
    [H, H | V | D, V, D],
];

/// How a raw PyxelEdit tile index becomes a 1-based TMX ordinal.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum OrdinalRule {
    /// `index + 1` for positive indices; zero and below are empty.
    #[default]
    SkipNonPositive,
    /// `index + 1` for every non-negative index, so index 0 is a real tile.
    /// Negative indices are still empty.
    OffsetAll,
}

impl OrdinalRule {
    pub fn ordinal(self, index: i64) -> i64 {
        let offset = match self {
            OrdinalRule::SkipNonPositive => index > 0,
            OrdinalRule::OffsetAll => index >= 0,
        };
        if offset {
            index.saturating_add(1)
        } else {
            0
        }
    }
}

pub fn flags(flip_x: bool, rot: Rotation) -> u32 {
    FLIP_TABLE[flip_x as usize][rot as usize]
}

/// Pack one tile reference into a TMX global tile id.
///
/// Ordinals past [MAX_ORDINAL] would bleed into the flag bits; callers that
/// take indices from untrusted documents check them first (see
/// [crate::rasterize]).
pub fn pack(tile: &TileRef, rule: OrdinalRule) -> PackedTile {
    let ordinal = rule.ordinal(tile.index) as u32 & MAX_ORDINAL;
    ordinal | flags(tile.flip_x, tile.rot)
}
