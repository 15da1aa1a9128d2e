use clap::Parser;
use pagediff::{Denylist, DiffEngine, PageDiffError, RunConfig};
use std::path::PathBuf;
use std::process::ExitCode;

/// Look for import and export regressions between PDF renderings of one
/// document, against an authoritative render and a previous run.
#[derive(Parser, Debug)]
#[command(name = "pagediff", version, about)]
struct Args {
    /// Document name including extension, e.g. "lorem ipsum.docx".
    #[arg(long = "base_file")]
    base_file: String,
    /// Root of a previous run's converted tree (the regression baseline).
    #[arg(long = "history_dir", default_value = ".")]
    history_dir: PathBuf,
    /// Compare at most this many pages per document.
    #[arg(long = "max_page", default_value_t = 10)]
    max_page: usize,
    /// Persist only force-saved regression pages.
    #[arg(long = "no_save_overlay")]
    no_save_overlay: bool,
    /// Raster DPI handed to the backend.
    #[arg(long, default_value_t = 75)]
    resolution: u32,
    /// Verbose tracing to stderr.
    #[arg(long)]
    debug: bool,
    /// Exclusion set of known false positives, one `filename # reason` per
    /// line. A missing file means nothing is excluded.
    #[arg(long = "exclude_list", default_value = "excluded-files.txt")]
    exclude_list: PathBuf,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{}", err);
            ExitCode::from(1)
        }
    }
}

fn run(args: Args) -> Result<ExitCode, PageDiffError> {
    let denylist = Denylist::load(&args.exclude_list)?;
    if let Some(reason) = denylist.reason(&args.base_file) {
        if reason.is_empty() {
            println!("SKIPPING FILE {}: excluded from testing", args.base_file);
        } else {
            println!("SKIPPING FILE {}: {}", args.base_file, reason);
        }
        return Ok(ExitCode::SUCCESS);
    }

    println!("Processing: {}", args.base_file);
    let mut config = RunConfig::new(args.base_file);
    config.history_dir = args.history_dir;
    config.max_pages = args.max_page;
    config.no_save_overlay = args.no_save_overlay;
    config.resolution = args.resolution;
    config.debug = args.debug;

    let engine = DiffEngine::new(config)?;
    engine.run()?;
    Ok(ExitCode::SUCCESS)
}
