use std::io::{self, Read, Write};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use itertools::Itertools;

use crate::{layer::DenseLayerGrid, tile::PackedTile, Error};

/// Encode a grid the way TMX `<data encoding="base64" compression="zlib">`
/// expects: little-endian u32s, zlib stream, standard base64.
pub fn encode(grid: &DenseLayerGrid) -> io::Result<String> {
    let raw: Vec<u8> = grid
        .cells()
        .iter()
        .flat_map(|cell| cell.to_le_bytes())
        .collect();

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw)?;
    let compressed = encoder.finish()?;

    Ok(STANDARD.encode(compressed))
}

/// Inverse of [encode]. The grid's dimensions aren't stored in the data, so
/// this only gives back the cells.
pub fn decode(text: &str) -> Result<Vec<PackedTile>, Error> {
    let compressed = STANDARD.decode(text.trim())?;

    let mut raw = Vec::new();
    ZlibDecoder::new(&compressed[..])
        .read_to_end(&mut raw)
        .map_err(Error::InflateError)?;

    if raw.len() % 4 != 0 {
        return Err(Error::TruncatedLayerData(raw.len()));
    }

    Ok(raw
        .into_iter()
        .tuples::<(_, _, _, _)>()
        .map(|(a, b, c, d)| u32::from_le_bytes([a, b, c, d]))
        .collect())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pyxel::{Layer, Rotation, TileRef};
    use quickcheck_macros::quickcheck;

    use super::*;
    use crate::{rasterize, OrdinalRule};

    #[test]
    fn empty_grid() {
        let grid = DenseLayerGrid::empty(4, 4).unwrap();
        let text = encode(&grid).unwrap();
        assert_eq!(decode(&text).unwrap(), vec![0; 16]);
    }

    #[test]
    fn little_endian_zlib() {
        let mut layer = Layer::new("l");
        layer
            .tile_refs
            .insert(1, TileRef::new(5, Rotation::Half, true));
        let grid = rasterize(&layer, 2, 1, OrdinalRule::default()).unwrap();

        let compressed = STANDARD.decode(encode(&grid).unwrap()).unwrap();
        // zlib header, default compression
        assert_eq!(compressed[0], 0x78);

        let mut raw = Vec::new();
        ZlibDecoder::new(&compressed[..])
            .read_to_end(&mut raw)
            .unwrap();
        assert_eq!(raw, vec![0, 0, 0, 0, 0x06, 0, 0, 0x40]);
    }

    #[quickcheck]
    fn decode_inverts_encode(keys: Vec<(u16, u16)>) -> bool {
        let mut layer = Layer::new("l");
        layer.tile_refs = keys
            .into_iter()
            .map(|(k, i)| {
                (k as i64 % 100, TileRef::new(i as i64, Rotation::None, false))
            })
            .collect::<BTreeMap<_, _>>();
        let grid = rasterize(&layer, 10, 10, OrdinalRule::default()).unwrap();

        decode(&encode(&grid).unwrap()).unwrap() == grid.cells()
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(decode("!!!"), Err(Error::Base64Error(_))));
        assert!(matches!(
            decode(&STANDARD.encode(b"not zlib")),
            Err(Error::InflateError(_))
        ));

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&[1, 2, 3]).unwrap();
        let text = STANDARD.encode(encoder.finish().unwrap());
        assert!(matches!(decode(&text), Err(Error::TruncatedLayerData(3))));
    }
}
