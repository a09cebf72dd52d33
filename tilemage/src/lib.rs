// Tileset image composition.
//
// Takes a directory of equally sized tile images whose filenames sort in tile
// order and lays them out left to right, top to bottom, in one image.

use std::{
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
    process::{Command, ExitStatus},
};

use image::{imageops, ImageFormat, ImageReader, RgbaImage};
use itertools::Itertools;
use log::{debug, warn};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{} is {width}x{height}, expected {expected_width}x{expected_height}", path.display())]
    BadTileSize {
        path: PathBuf,
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },
    #[error("tileset has no tiles to compose")]
    NoTiles,
    #[error("tileset geometry has a zero dimension")]
    EmptyGeometry,
    #[error("tileset image size overflows for {0:?}")]
    GeometryOverflow(TilesetGeometry),

    // External composer failures
    #[error("failed to run {}", program.display())]
    MontageSpawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} exited with {status}: {stderr}", program.display())]
    MontageFailed {
        program: PathBuf,
        status: ExitStatus,
        stderr: String,
    },

    // Errors from other libraries
    #[error("error processing image")]
    ImageError(#[from] image::ImageError),
    #[error("io error")]
    IoError(#[from] io::Error),
}

/// Layout of a tileset image, in tiles and per-tile pixels.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct TilesetGeometry {
    pub tile_width: u32,
    pub tile_height: u32,
    pub columns: u32,
    pub rows: u32,
}

impl TilesetGeometry {
    /// Image size in pixels, width then height.
    pub fn pixel_size(&self) -> Result<(u32, u32), Error> {
        let width = self.columns.checked_mul(self.tile_width);
        let height = self.rows.checked_mul(self.tile_height);
        match (width, height) {
            (Some(width), Some(height)) => Ok((width, height)),
            _ => Err(Error::GeometryOverflow(*self)),
        }
    }

    pub fn capacity(&self) -> usize {
        let cells = self.columns as u64 * self.rows as u64;
        usize::try_from(cells).unwrap_or(usize::MAX)
    }

    /// Checks the geometry describes a non-empty image, returning its size.
    pub fn validate(&self) -> Result<(u32, u32), Error> {
        if self.capacity() == 0 || self.tile_width == 0 || self.tile_height == 0
        {
            return Err(Error::EmptyGeometry);
        }
        self.pixel_size()
    }
}

/// Something that can turn a directory of tiles into one tileset image.
///
/// Implementations must produce exactly `geometry.pixel_size()` pixels, since
/// map files declare that size.
pub trait TilesetComposer {
    fn compose(
        &self,
        tiles_dir: &Path,
        geometry: &TilesetGeometry,
        output: &Path,
    ) -> Result<(), Error>;
}

/// The `.png` files in `dir`, sorted by filename.
pub fn tile_images(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_png = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
        if is_png && path.is_file() {
            paths.push(path);
        }
    }

    Ok(paths.into_iter().sorted().collect())
}

/// Composes in-process by pasting each tile into a transparent canvas.
#[derive(Copy, Clone, Default, Debug)]
pub struct GridComposer;

impl TilesetComposer for GridComposer {
    fn compose(
        &self,
        tiles_dir: &Path,
        geometry: &TilesetGeometry,
        output: &Path,
    ) -> Result<(), Error> {
        let (width, height) = geometry.validate()?;

        let tiles = tile_images(tiles_dir)?;
        if tiles.len() > geometry.capacity() {
            warn!(
                "{} tile images but room for {}, dropping the rest",
                tiles.len(),
                geometry.capacity()
            );
        }

        let mut canvas = RgbaImage::new(width, height);

        for (i, path) in tiles.iter().take(geometry.capacity()).enumerate() {
            let tile = ImageReader::open(path)?.decode()?.to_rgba8();
            if tile.dimensions() != (geometry.tile_width, geometry.tile_height)
            {
                return Err(Error::BadTileSize {
                    path: path.clone(),
                    width: tile.width(),
                    height: tile.height(),
                    expected_width: geometry.tile_width,
                    expected_height: geometry.tile_height,
                });
            }

            let column = i as u32 % geometry.columns;
            let row = i as u32 / geometry.columns;
            imageops::replace(
                &mut canvas,
                &tile,
                (column * geometry.tile_width) as i64,
                (row * geometry.tile_height) as i64,
            );
        }

        debug!(
            "composed {} tiles into {}x{}",
            tiles.len().min(geometry.capacity()),
            canvas.width(),
            canvas.height()
        );
        canvas.save_with_format(output, ImageFormat::Png)?;
        Ok(())
    }
}

/// Composes by running ImageMagick's `montage`.
#[derive(Clone, Debug)]
pub struct MontageComposer {
    pub program: PathBuf,
}

impl Default for MontageComposer {
    fn default() -> Self {
        Self {
            program: PathBuf::from("montage"),
        }
    }
}

impl MontageComposer {
    /// `montage` drops rows it has no tiles for, so the result is padded back
    /// out to the full geometry with `-extent`.
    pub fn args(
        tiles: &[PathBuf],
        geometry: &TilesetGeometry,
        output: &Path,
    ) -> Result<Vec<OsString>, Error> {
        let (width, height) = geometry.pixel_size()?;

        let mut args: Vec<OsString> =
            tiles.iter().map(|p| p.as_os_str().to_owned()).collect();
        args.extend(
            [
                "-tile".to_string(),
                format!("{}x{}", geometry.columns, geometry.rows),
                "-geometry".to_string(),
                format!("{}x{}+0+0", geometry.tile_width, geometry.tile_height),
                "-background".to_string(),
                "none".to_string(),
                "-gravity".to_string(),
                "NorthWest".to_string(),
                "-extent".to_string(),
                format!("{width}x{height}"),
            ]
            .map(OsString::from),
        );
        args.push(output.as_os_str().to_owned());
        Ok(args)
    }
}

impl TilesetComposer for MontageComposer {
    fn compose(
        &self,
        tiles_dir: &Path,
        geometry: &TilesetGeometry,
        output: &Path,
    ) -> Result<(), Error> {
        geometry.validate()?;

        let tiles = tile_images(tiles_dir)?;
        if tiles.is_empty() {
            return Err(Error::NoTiles);
        }

        let result = Command::new(&self.program)
            .args(Self::args(&tiles, geometry, output)?)
            .output()
            .map_err(|source| Error::MontageSpawn {
                program: self.program.clone(),
                source,
            })?;

        if !result.status.success() {
            return Err(Error::MontageFailed {
                program: self.program.clone(),
                status: result.status,
                stderr: String::from_utf8_lossy(&result.stderr)
                    .trim()
                    .to_string(),
            });
        }

        Ok(())
    }
}
