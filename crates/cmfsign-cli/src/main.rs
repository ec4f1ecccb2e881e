//! Command-line interface for inspecting and validating CMF bitstreams,
//! engineering certificates, keychains and bitstream zips.

use clap::{Parser, Subcommand};
use cmfsign::batch::{expand_paths, validate_files};
use cmfsign::{BitstreamFactory, BitstreamZip, Fragment};
use log::{error, info, LevelFilter};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "cmfsign")]
#[command(about = "FPGA bitstream signing object inspector")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the parsed structure of a file
    Info {
        file: PathBuf,

        /// Also print SHA-256 and SHA-384 of the file contents
        #[arg(long)]
        hashes: bool,
    },
    /// Validate files; directories are searched for .cmf, .cert, .qky and .zip
    Validate {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();
}

fn is_zip(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

fn run_info(file: &Path, hashes: bool) -> Result<(), Box<dyn std::error::Error>> {
    if is_zip(file) {
        let zip = BitstreamZip::load(file)?;
        for (name, bitstream) in zip.iter() {
            println!("{name}: {}", bitstream.kind());
            print!("{bitstream}");
        }
        return Ok(());
    }

    let bitstream = BitstreamFactory::load(file)?;
    println!("{}: {}", file.display(), bitstream.kind());
    print!("{bitstream}");
    if hashes {
        println!("SHA-256: {}", bitstream.sha256sum());
        println!("SHA-384: {}", hex::encode(bitstream.sha384()));
    }
    if bitstream.needs_signing()? {
        info!("{} is not signed yet", file.display());
    }
    Ok(())
}

fn run_validate(paths: &[PathBuf]) -> Result<(), Box<dyn std::error::Error>> {
    let files = expand_paths(paths)?;
    if files.is_empty() {
        return Err("no bitstream files found".into());
    }

    let reports = validate_files(&files);
    let mut failed = 0;
    for report in &reports {
        match &report.result {
            Ok(()) => println!("ok      {} ({})", report.path.display(), report.kind.unwrap_or("?")),
            Err(e) => {
                failed += 1;
                println!("FAILED  {}: {e}", report.path.display());
            }
        }
    }

    if failed > 0 {
        error!("{failed} of {} files failed validation", reports.len());
        return Err(format!("{failed} files failed validation").into());
    }
    info!("{} files validated", reports.len());
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Info { file, hashes } => run_info(&file, hashes),
        Command::Validate { paths } => run_validate(&paths),
    }
}
