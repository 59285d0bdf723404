//! Command line front end: print a section report for one PE image.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use pedis::logging;
use pedis::{load_image_with_limits, print_report, run_scan, Config, IcedDecoder, MappedFile};

#[derive(Parser)]
#[command(name = "pedis")]
#[command(about = "Recover control flow from a PE image and print a disassembly report")]
#[command(version)]
struct Cli {
    /// Input PE file
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Also decode bytes the scan did not reach, skipping only zero runs
    #[arg(long)]
    exhaustive: bool,

    /// Emit diagnostics as JSON
    #[arg(long)]
    json_logs: bool,

    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_json_file(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => Config::default(),
    };
    config.listing.exhaustive |= cli.exhaustive;
    config.logging.json |= cli.json_logs;
    logging::init_from_config(&config.logging);

    let mapped = MappedFile::open(&cli.input, &config.io)
        .with_context(|| format!("failed to open {}", cli.input.display()))?;
    let image = load_image_with_limits(mapped.bytes(), &config.io)
        .with_context(|| format!("failed to load {}", mapped.path().display()))?;

    let decoder = IcedDecoder::new(image.bitness());
    let outcome = run_scan(&image, &mapped, &decoder);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    print_report(
        &image,
        &mapped,
        &decoder,
        &outcome.code_map,
        config.listing,
        &mut out,
    )?;
    out.flush()?;
    Ok(())
}
