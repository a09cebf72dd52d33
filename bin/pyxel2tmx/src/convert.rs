use std::{
    ffi::OsString,
    io::Write,
    path::{Path, PathBuf},
};
#[cfg(unix)]
use std::{fs::Permissions, os::unix::fs::PermissionsExt};

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use pyxel::Archive;
use tempfile::TempDir;
use tilemage::{TilesetComposer, TilesetGeometry};
use tmxmap::AssembleOptions;

pub const TILESET_FILE: &str = "tileset.png";

const TMX_EXTENSION: &str = "tmx";

// Same as a plain `fs::write` under the usual umask.
#[cfg(unix)]
const OUTPUT_MODE: u32 = 0o644;

/// One conversion: a `.pyxel` in, a `.tmx` and a tileset image out.
pub struct Job {
    pub input: PathBuf,
    pub output: PathBuf,
    pub tileset: PathBuf,
    pub options: AssembleOptions,
    pub composer: Box<dyn TilesetComposer>,
    /// Where the scratch directory goes (system temp dir if absent)
    pub scratch_root: Option<PathBuf>,
}

/// `<input stem>.tmx`, in the current directory.
pub fn default_output(input: &Path) -> PathBuf {
    let mut name: OsString = input
        .file_stem()
        .unwrap_or(input.as_os_str())
        .to_os_string();
    name.push(".");
    name.push(TMX_EXTENSION);
    PathBuf::from(name)
}

pub fn sibling(path: &Path, file_name: &str) -> PathBuf {
    path.with_file_name(file_name)
}

fn scratch_dir(root: Option<&Path>) -> Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("pyxel2tmx-");
    let dir = match root {
        Some(root) => builder.tempdir_in(root),
        None => builder.tempdir(),
    }
    .context("failed to create scratch directory")?;

    debug!("scratch directory {}", dir.path().display());
    Ok(dir)
}

// Readers never see a half-written map: write beside the target, then rename.
fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut builder = tempfile::Builder::new();
    #[cfg(unix)]
    builder.permissions(Permissions::from_mode(OUTPUT_MODE));
    let mut file = builder.tempfile_in(dir)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path)?;
    Ok(())
}

impl Job {
    pub fn run(&self) -> Result<()> {
        if !self.input.exists() {
            bail!("{} does not exist!", self.input.display());
        }

        let scratch = scratch_dir(self.scratch_root.as_deref())?;
        let result = self.convert(scratch.path());

        // Dropping would remove it too, but silently.
        let scratch_path = scratch.path().to_owned();
        if let Err(err) = scratch.close() {
            warn!(
                "failed to remove scratch directory {}: {err}",
                scratch_path.display()
            );
        }

        result
    }

    fn convert(&self, scratch: &Path) -> Result<()> {
        let input = self.input.display();
        let extraction = Archive::open(&self.input)
            .and_then(|mut archive| archive.extract(scratch))
            .with_context(|| format!("failed to read {input}"))?;
        debug!("extracted {} tile images", extraction.tiles.len());

        let doc = &extraction.document;
        let map = tmxmap::assemble(doc, &self.options)
            .with_context(|| format!("failed to convert {input}"))?;

        let output = self.output.display();
        let xml = map.to_xml().context("failed to render tilemap")?;
        write_atomically(&self.output, xml.as_bytes())
            .with_context(|| format!("failed to write tilemap file {output}"))?;
        info!("Written tilemap file {output}.");

        // The map is already on disk; a tileset failure doesn't undo it.
        let geometry = TilesetGeometry {
            tile_width: map.tileset.tile_width,
            tile_height: map.tileset.tile_height,
            columns: map.tileset.columns,
            rows: map.tileset.image.rows,
        };

        self.composer
            .compose(scratch, &geometry, &self.tileset)
            .with_context(|| {
                format!(
                    "failed to write tileset image {} (tilemap file was kept)",
                    self.tileset.display()
                )
            })?;
        info!("Written tileset image {}.", self.tileset.display());

        Ok(())
    }
}
