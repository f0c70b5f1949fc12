//! `rusle`: run the soil-erosion pipeline on a scene file or a synthetic
//! demo scene, print the class table, optionally write PNG maps.

mod sinks;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rusle_core::{
    CancelToken, InMemorySource, RasterSource, RunConfig, RusleRunner, SyntheticScene, SyntheticSource,
};

use crate::sinks::{ConsoleReport, NullSink, PngSink};

#[derive(Parser, Debug)]
#[command(name = "rusle", about = "RUSLE soil-erosion risk for a river basin")]
struct Cli {
    /// Debug logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run on a JSON scene file.
    Run {
        /// Scene holding basins, images and collections.
        #[arg(short, long)]
        scene: PathBuf,

        #[command(flatten)]
        common: Common,
    },
    /// Run on a generated scene.
    Demo {
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Scene width and height in pixels.
        #[arg(long, default_value_t = 96)]
        size: usize,

        /// Also write the generated scene as JSON.
        #[arg(long)]
        write_scene: Option<PathBuf>,

        #[command(flatten)]
        common: Common,
    },
    /// Print the default configuration as JSON.
    Config,
}

#[derive(Args, Debug)]
struct Common {
    /// Run configuration JSON; missing fields take defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write one PNG per layer into this directory.
    #[arg(long)]
    png_dir: Option<PathBuf>,

    /// Print the run digest as JSON instead of the table.
    #[arg(long)]
    json: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "rusle_core=debug,rusle=debug" } else { "rusle_core=info" };
    let filter = tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| default.into()));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(path: Option<&Path>) -> Result<RunConfig> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
            RunConfig::from_json(&text).with_context(|| format!("loading config {}", path.display()))
        }
        None => Ok(RunConfig::default()),
    }
}

fn execute(source: &dyn RasterSource, config: RunConfig, common: &Common) -> Result<()> {
    let runner = RusleRunner::new(config).context("invalid run configuration")?;
    let cancel = CancelToken::new();
    let mut report = ConsoleReport { quiet: common.json };

    let output = match &common.png_dir {
        Some(dir) => {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
            let mut png = PngSink::new(dir);
            let output = runner.run(source, &mut png, &mut report, &cancel)?;
            for path in png.written() {
                tracing::info!(path = %path.display(), "wrote layer");
            }
            output
        }
        None => runner.run(source, &mut NullSink, &mut report, &cancel)?,
    };

    if common.json {
        println!("{}", serde_json::to_string_pretty(&output.digest())?);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run { scene, common } => {
            let config = load_config(common.config.as_deref())?;
            let text = fs::read_to_string(&scene).with_context(|| format!("reading scene {}", scene.display()))?;
            let source = InMemorySource::from_json(&text).with_context(|| format!("parsing scene {}", scene.display()))?;
            execute(&source, config, &common)
        }
        Command::Demo { seed, size, write_scene, common } => {
            let config = load_config(common.config.as_deref())?;
            let scene = SyntheticScene { width: size, height: size, ..SyntheticScene::with_seed(seed) };
            let source = SyntheticSource::new(scene, &config);
            if let Some(path) = write_scene {
                let json = serde_json::to_string(source.layers())?;
                fs::write(&path, json).with_context(|| format!("writing scene {}", path.display()))?;
                tracing::info!(path = %path.display(), "scene written");
            }
            execute(&source, config, &common)
        }
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&RunConfig::default())?);
            Ok(())
        }
    }
}
