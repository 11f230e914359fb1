//! tilecraft - inspect, split, compose and unpack 3D Tiles composite files.
//!
//! Usage:
//!   tilecraft info tileset.cmpt
//!   tilecraft split tileset.cmpt tiles/
//!   tilecraft make tiles/ output.cmpt
//!   tilecraft extract tileset.cmpt glb/

mod commands;
mod config;
mod convert;
mod fs;
mod progress;

use std::{io, path::PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, DEFAULT_PROGRESS_STEP};

#[derive(Parser, Debug)]
#[command(name = "tilecraft")]
#[command(about = "Inspect, split, compose and unpack 3D Tiles composite (cmpt) files")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// JSON file with extra schemas and tile kinds
    #[arg(long, global = true)]
    schemas: Option<PathBuf>,

    /// Minimum percent between two progress lines
    #[arg(long, global = true, default_value_t = DEFAULT_PROGRESS_STEP)]
    progress_step: u32,

    /// Worker threads for writing files
    #[arg(short, long, global = true)]
    jobs: Option<usize>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (no progress, warnings only)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the header of a file and of every tile it holds
    Info { input: PathBuf },
    /// Split a composite into one file per tile
    Split {
        input: PathBuf,
        #[arg(default_value = ".")]
        outdir: PathBuf,
    },
    /// Compose the tiles of a directory into one composite
    Make {
        #[arg(default_value = ".")]
        dir: PathBuf,
        #[arg(default_value = "output.cmpt")]
        output: PathBuf,
        /// File extensions to pick up
        #[arg(long, value_delimiter = ',', default_value = "b3dm,i3dm,pnts")]
        ext: Vec<String>,
    },
    /// Extract embedded glb models from a composite, b3dm or i3dm file
    Extract {
        input: PathBuf,
        #[arg(default_value = ".")]
        outdir: PathBuf,
    },
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => tracing::Level::WARN,
        (false, 0) => tracing::Level::INFO,
        (false, 1) => tracing::Level::DEBUG,
        (false, _) => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run(args: Args, config: &Config) -> anyhow::Result<()> {
    match args.command {
        Command::Info { input } => commands::info(config, &input, &mut io::stdout().lock()),
        Command::Split { input, outdir } => commands::split(config, &input, &outdir).map(drop),
        Command::Make { dir, output, ext } => commands::make(&dir, &output, &ext).map(drop),
        Command::Extract { input, outdir } => commands::extract(config, &input, &outdir).map(drop),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose, args.quiet);

    let mut config = Config {
        progress_step: args.progress_step,
        jobs: args.jobs,
        quiet: args.quiet,
        ..Config::default()
    };
    if let Some(path) = &args.schemas {
        config.load_schemas(path)?;
    }

    match config.jobs {
        Some(jobs) => rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()?
            .install(|| run(args, &config)),
        None => run(args, &config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["tilecraft", "make"]).unwrap();
        assert_eq!(args.progress_step, DEFAULT_PROGRESS_STEP);
        match args.command {
            Command::Make { dir, output, ext } => {
                assert_eq!(dir, PathBuf::from("."));
                assert_eq!(output, PathBuf::from("output.cmpt"));
                assert_eq!(ext, vec!["b3dm", "i3dm", "pnts"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "tilecraft", "split", "in.cmpt", "out", "--jobs", "2", "-vv", "--schemas", "defs.json",
        ])
        .unwrap();

        assert_eq!(args.jobs, Some(2));
        assert_eq!(args.verbose, 2);
        assert_eq!(args.schemas, Some(PathBuf::from("defs.json")));
        assert!(matches!(args.command, Command::Split { .. }));
    }

    #[test]
    fn test_args_are_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
