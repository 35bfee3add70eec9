//! `mp4chunk` — append selected chunks from one or more MP4 files onto
//! a destination, rewriting only what's necessary (spec §6).

use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use mp4chunk::cli;
use mp4chunk::driver::{self, PathSpec};

#[derive(Parser)]
#[command(name = "mp4chunk")]
#[command(about = "Append MP4 chunks onto a destination file in place")]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Enable verbose output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Maximum additional frames expected in the near future; sizes
    /// the free-atom headroom provisioned by a full rewrite
    #[arg(long, default_value_t = 1000)]
    future_frames: u64,

    /// Print chunk metadata and per-frame hex dumps for a single file,
    /// then exit
    #[arg(long)]
    dump_frames: bool,

    /// Destination (first) and source (rest) files, each optionally
    /// suffixed with a `[start:end]` chunk slice
    #[arg(required = true)]
    paths: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(level)
        .without_time()
        .with_target(cli.verbose >= 2)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), mp4chunk::Mp4Error> {
    let specs: Vec<PathSpec> =
        cli.paths.iter().map(|p| cli::parse_spec(p)).collect::<Result<_, _>>()?;

    if cli.dump_frames {
        let [only] = specs.as_slice() else {
            return Err(mp4chunk::Mp4Error::MalformedAtom(
                "--dump_frames takes exactly one file argument".into(),
            ));
        };
        return cli::dump_frames(only);
    }

    let (destination, sources) =
        specs.split_first().expect("clap enforces at least one path");
    driver::append(destination, sources, cli.future_frames)
}
