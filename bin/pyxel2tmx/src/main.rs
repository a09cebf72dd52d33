use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, ValueEnum};
use log::{info, LevelFilter};
use tilemage::{GridComposer, MontageComposer, TilesetComposer};
use tmxmap::{AssembleOptions, OrdinalRule};

mod convert;

use convert::Job;

#[derive(ValueEnum, Copy, Clone, Debug)]
enum Composer {
    /// Paste tiles together in-process
    Grid,
    /// Run ImageMagick's `montage` (must be installed)
    Montage,
}

/// Convert PyxelEdit tile maps (*.pyxel) to Tiled maps (*.tmx)
#[derive(Parser, Debug)]
#[command(version, about, long_about = None, disable_help_flag = true)]
struct Args {
    /// Input PyxelEdit project file
    #[arg(short = 'f', long)]
    filename: PathBuf,
    /// Output tmx file (derived from input if absent)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Tileset image filename, written next to the output
    #[arg(long, default_value = convert::TILESET_FILE)]
    tileset_name: String,
    /// How to build the tileset image
    #[arg(long, value_enum, default_value_t = Composer::Grid)]
    composer: Composer,
    /// Treat tile index 0 as a real tile rather than an empty cell
    #[arg(long, action = ArgAction::SetTrue)]
    offset_all: bool,
    /// More logging (-v for debug, -vv for trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
    /// Print help information
    #[arg(long, global=true, action=clap::ArgAction::HelpLong)]
    help: Option<bool>,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    // RUST_LOG still wins if set
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .format_target(false)
        .init();
}

impl Args {
    fn into_job(self) -> Job {
        let output = self
            .output
            .unwrap_or_else(|| convert::default_output(&self.filename));

        let composer: Box<dyn TilesetComposer> = match self.composer {
            Composer::Grid => Box::new(GridComposer),
            Composer::Montage => Box::new(MontageComposer::default()),
        };

        let ordinal_rule = if self.offset_all {
            OrdinalRule::OffsetAll
        } else {
            OrdinalRule::SkipNonPositive
        };

        Job {
            tileset: convert::sibling(&output, &self.tileset_name),
            options: AssembleOptions {
                ordinal_rule,
                tileset_source: format!("./{}", self.tileset_name),
            },
            input: self.filename,
            output,
            composer,
            scratch_root: None,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    info!("Pyxel -> Tmx converter v{}", env!("CARGO_PKG_VERSION"));
    if let Composer::Montage = args.composer {
        info!("using ImageMagick `montage` for the tileset image");
    }

    args.into_job().run()
}
