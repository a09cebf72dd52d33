use std::{
    collections::BTreeMap,
    fs::File,
    io::{self, BufReader, BufWriter, Read, Seek, Write},
    path::{Path, PathBuf},
};

use log::{debug, warn};
use zip::ZipArchive;

use crate::{document::ProjectDocument, Error};

pub const METADATA_ENTRY: &str = "docData.json";

const TILE_PREFIX: &str = "tile";
const TILE_SUFFIX: &str = ".png";

/// Width extracted tile names are zero-padded to, so that sorting the
/// filenames sorts the tiles numerically.
pub const ORDINAL_WIDTH: usize = 8;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum EntryKind {
    Metadata,
    TileImage(u64),
    Other,
}

/// Classify an archive entry by name. Tile images are `tile<N>.png`.
pub fn classify(name: &str) -> EntryKind {
    let base = name.rsplit('/').next().unwrap_or(name);

    if base == METADATA_ENTRY {
        return EntryKind::Metadata;
    }

    let digits = match base
        .strip_prefix(TILE_PREFIX)
        .and_then(|s| s.strip_suffix(TILE_SUFFIX))
    {
        Some(digits) => digits,
        None => return EntryKind::Other,
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return EntryKind::Other;
    }

    match digits.parse() {
        Ok(ordinal) => EntryKind::TileImage(ordinal),
        Err(_) => {
            warn!("ignoring {name}: tile number out of range");
            EntryKind::Other
        }
    }
}

pub fn canonical_tile_name(ordinal: u64) -> String {
    format!("{:0width$}{}", ordinal, TILE_SUFFIX, width = ORDINAL_WIDTH)
}

/// Everything pulled out of a project archive.
pub struct Extraction {
    pub document: ProjectDocument,
    // Sorted by tile number.
    pub tiles: Vec<PathBuf>,
}

pub struct Archive<R> {
    zip: ZipArchive<R>,
}

impl Archive<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read + Seek> Archive<R> {
    pub fn new(reader: R) -> Result<Self, Error> {
        Ok(Self {
            zip: ZipArchive::new(reader)?,
        })
    }

    /// Walk the entries in archive order, parsing the metadata document and
    /// writing every tile image into `scratch` under its canonical name.
    ///
    /// Files already written to `scratch` are left there on error; the caller
    /// owns the directory and is expected to remove it.
    pub fn extract(&mut self, scratch: &Path) -> Result<Extraction, Error> {
        let mut document = None;
        let mut tiles = BTreeMap::new();

        for i in 0..self.zip.len() {
            let mut entry = self.zip.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_owned();

            match classify(&name) {
                EntryKind::Metadata => {
                    if document.is_some() {
                        warn!("duplicate {name}, using the last one");
                    }
                    let mut buf = Vec::with_capacity(entry.size() as usize);
                    entry.read_to_end(&mut buf).map_err(|source| {
                        Error::ExtractError {
                            name: name.clone(),
                            source,
                        }
                    })?;
                    document = Some(ProjectDocument::from_slice(&buf)?);
                }
                EntryKind::TileImage(ordinal) => {
                    let path = scratch.join(canonical_tile_name(ordinal));
                    write_entry(&mut entry, &path).map_err(|source| {
                        Error::ExtractError {
                            name: name.clone(),
                            source,
                        }
                    })?;
                    debug!("extracted {name} -> {}", path.display());
                    if tiles.insert(ordinal, path).is_some() {
                        warn!("duplicate tile {ordinal}, using {name}");
                    }
                }
                EntryKind::Other => debug!("skipping {name}"),
            }
        }

        let document = document.ok_or(Error::MissingMetadata)?;

        Ok(Extraction {
            document,
            tiles: tiles.into_values().collect(),
        })
    }
}

fn write_entry(entry: &mut impl Read, path: &Path) -> io::Result<()> {
    let mut sink = BufWriter::new(File::create(path)?);
    io::copy(entry, &mut sink)?;
    sink.flush()
}

#[cfg(test)]
mod tests {
    use std::{fs, io::Cursor};

    use quickcheck_macros::quickcheck;
    use zip::{write::SimpleFileOptions, ZipWriter};

    use super::*;

    const DOC: &str = r#"{
        "canvas": { "width": 16, "height": 16, "numLayers": 0, "layers": {} },
        "tileset": { "tileWidth": 8, "tileHeight": 8,
                     "numTiles": 3, "tilesWide": 2 }
    }"#;

    fn build_archive(entries: &[(&str, &[u8])]) -> Cursor<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        let mut cursor = zip.finish().unwrap();
        cursor.set_position(0);
        cursor
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn classifies_entries() {
        assert_eq!(classify("docData.json"), EntryKind::Metadata);
        assert_eq!(classify("tile0.png"), EntryKind::TileImage(0));
        assert_eq!(classify("tile42.png"), EntryKind::TileImage(42));
        assert_eq!(classify("tiles/tile7.png"), EntryKind::TileImage(7));
        assert_eq!(classify("layer0.png"), EntryKind::Other);
        assert_eq!(classify("tile.png"), EntryKind::Other);
        assert_eq!(classify("tile1a.png"), EntryKind::Other);
        assert_eq!(classify("tile+1.png"), EntryKind::Other);
        assert_eq!(classify("tile1.png.bak"), EntryKind::Other);
        assert_eq!(classify("mytile1.png"), EntryKind::Other);
        assert_eq!(
            classify("tile99999999999999999999999.png"),
            EntryKind::Other
        );
    }

    #[test]
    fn pads_tile_names() {
        assert_eq!(canonical_tile_name(0), "00000000.png");
        assert_eq!(canonical_tile_name(12), "00000012.png");
        assert_eq!(canonical_tile_name(123456789), "123456789.png");
    }

    #[quickcheck]
    fn padded_names_sort_numerically(a: u32, b: u32) -> bool {
        let (a, b) = (a as u64 % 100_000_000, b as u64 % 100_000_000);
        canonical_tile_name(a).cmp(&canonical_tile_name(b)) == a.cmp(&b)
    }

    #[test]
    fn extracts_tiles_in_numeric_order() {
        let scratch = tempfile::tempdir().unwrap();
        let reader = build_archive(&[
            ("tile3.png", b"three"),
            ("layer0.png", b"layer"),
            ("tile1.png", b"one"),
            (METADATA_ENTRY, DOC.as_bytes()),
            ("tile2.png", b"two"),
        ]);

        let extraction =
            Archive::new(reader).unwrap().extract(scratch.path()).unwrap();

        assert_eq!(
            file_names(scratch.path()),
            vec!["00000001.png", "00000002.png", "00000003.png"]
        );
        assert_eq!(
            extraction.tiles,
            vec![
                scratch.path().join("00000001.png"),
                scratch.path().join("00000002.png"),
                scratch.path().join("00000003.png"),
            ]
        );
        assert_eq!(fs::read(&extraction.tiles[0]).unwrap(), b"one");
        assert_eq!(fs::read(&extraction.tiles[2]).unwrap(), b"three");
        assert_eq!(extraction.document.tileset.num_tiles, 3);
    }

    #[test]
    fn metadata_after_tiles_is_found() {
        let scratch = tempfile::tempdir().unwrap();
        let reader = build_archive(&[
            ("tile10.png", b"ten"),
            ("tile9.png", b"nine"),
            (METADATA_ENTRY, DOC.as_bytes()),
        ]);

        let extraction =
            Archive::new(reader).unwrap().extract(scratch.path()).unwrap();

        assert_eq!(
            file_names(scratch.path()),
            vec!["00000009.png", "00000010.png"]
        );
        assert_eq!(extraction.document.canvas.width, 16);
    }

    #[test]
    fn missing_metadata() {
        let scratch = tempfile::tempdir().unwrap();
        let reader = build_archive(&[("tile0.png", b"zero")]);

        let err = Archive::new(reader)
            .unwrap()
            .extract(scratch.path())
            .err()
            .unwrap();

        assert!(matches!(err, Error::MissingMetadata));
        assert_eq!(err.to_string(), "archive has no docData.json entry");
    }

    #[test]
    fn malformed_metadata() {
        let scratch = tempfile::tempdir().unwrap();
        let reader = build_archive(&[(METADATA_ENTRY, b"{ not json")]);

        let err = Archive::new(reader)
            .unwrap()
            .extract(scratch.path())
            .err()
            .unwrap();

        assert!(matches!(err, Error::MalformedMetadata(_)));
    }

    #[test]
    fn not_a_zip() {
        let err = Archive::new(Cursor::new(b"plain text".to_vec()))
            .err()
            .unwrap();
        assert!(matches!(err, Error::ZipError(_)));
    }
}
