use std::collections::BTreeSet;
use std::error::Error;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use clap::{ArgAction, Parser, Subcommand, ValueHint};

use birdmon::analysis::species::{leaderboard, LEADERBOARD_SIZE};
use birdmon::config::{Config, SourceKind};
use birdmon::export;
use birdmon::filter::DetectionFilter;
use birdmon::loader::{self, LoadWindow};
use birdmon::logging::{self, DataSource, LogLevel};
use birdmon::report;
use birdmon::verify;

#[derive(Parser, Debug)]
#[command(author, version, about = "Backyard bird detection reports", long_about = None)]
struct Cli {
    /// TOML configuration file (defaults to ./birdmon.toml when present)
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Detection source: sqlite, postgres, api or synthetic
    #[arg(long, global = true, value_parser = parse_source)]
    source: Option<SourceKind>,

    /// SQLite detections file
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    database: Option<PathBuf>,

    /// Base URL of the detection API
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// First day to include (YYYY-MM-DD)
    #[arg(long, global = true)]
    start: Option<NaiveDate>,

    /// Last day to include (YYYY-MM-DD)
    #[arg(long, global = true)]
    end: Option<NaiveDate>,

    /// Minimum confidence, 0.0 to 1.0
    #[arg(long, global = true)]
    min_confidence: Option<f64>,

    /// Only include this species (repeatable)
    #[arg(long = "species", global = true)]
    species: Vec<String>,

    /// Debug logging
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Totals, daily/hourly/weekday activity and confidence distribution
    Overview,
    /// Species snapshot and leaderboard
    Species {
        /// Leaderboard rows
        #[arg(long, default_value_t = LEADERBOARD_SIZE)]
        top: usize,
        /// Write the leaderboard as CSV to stdout instead
        #[arg(long, action = ArgAction::SetTrue)]
        csv: bool,
    },
    /// Deep dive into one species
    Focus {
        name: String,
        /// Also write the species' detections as CSV into this directory
        #[arg(long, value_hint = ValueHint::DirPath)]
        export: Option<PathBuf>,
    },
    /// New species and seasonal breakdown
    Discoveries,
    /// Filtered detections as CSV
    Export {
        /// Output file, or '-' for stdout (default: stamped file in the current directory)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Probe the configured sources and print a JSON report
    Check,
}

fn parse_source(s: &str) -> Result<SourceKind, String> {
    SourceKind::parse(s).ok_or_else(|| format!("unknown source '{}' (expected sqlite, postgres, api or synthetic)", s))
}

fn main() {
    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(kind) = cli.source {
        config.source.kind = kind;
    }
    if let Some(db) = &cli.database {
        config.source.database_file = db.clone();
    }
    if let Some(url) = &cli.api_url {
        config.api.base_url = url.clone();
    }
    if let Some(min) = cli.min_confidence {
        config.filters.min_confidence = min;
    }
    config.validate()?;

    let level = if cli.verbose { LogLevel::Debug } else { config.logging.min_level() };
    logging::init_logger(level, config.logging.file.as_deref(), config.logging.console_timestamps);

    let today = Local::now().date_naive();

    if let Command::Check = cli.command {
        let report = verify::run_full_verification(&config, today);
        println!("{}", serde_json::to_string_pretty(&report)?);
        eprintln!("{}", verify::render_summary(&report));
        return Ok(());
    }

    let window = LoadWindow::resolve(cli.start, cli.end, config.api.lookback_days, today);
    let outcome = loader::load(&config, window);
    eprint!("{}", report::render_source_banner(&outcome));

    let filter = DetectionFilter {
        min_confidence: config.filters.min_confidence,
        species: cli.species.iter().cloned().collect::<BTreeSet<_>>(),
        ..DetectionFilter::default()
    }
    .with_dates(cli.start, cli.end, outcome.dataset.date_bounds());
    let filtered = filter.apply(&outcome.dataset);
    logging::debug(
        DataSource::System,
        None,
        &format!("{} of {} detections pass the filters", filtered.len(), outcome.dataset.len()),
    );

    match cli.command {
        Command::Overview => print!("{}", report::render_overview(&filtered)),
        Command::Species { top, csv: false } => print!("{}", report::render_species(&filtered, top)),
        Command::Species { top, csv: true } => {
            export::write_leaderboard(&leaderboard(&filtered.detections, top), io::stdout().lock())?;
        }
        Command::Focus { name, export: dir } => {
            print!("{}", report::render_focus(&filtered, &name));
            if let Some(dir) = dir {
                let focus = filtered.subset(|d| d.common_name == name);
                if focus.is_empty() {
                    eprintln!("{}", report::EMPTY_WARNING);
                } else {
                    let path = export::export_to_dir(&focus, &dir, Some(&name), Local::now().naive_local())?;
                    eprintln!("Wrote {}", path.display());
                }
            }
        }
        Command::Discoveries => print!("{}", report::render_discoveries(&filtered)),
        Command::Export { output } => match output.as_deref() {
            Some("-") => {
                export::write_detections(&filtered, io::stdout().lock())?;
            }
            Some(path) => {
                let rows = export::write_detections(&filtered, File::create(path)?)?;
                eprintln!("Wrote {} detections to {}", rows, path);
            }
            None => {
                let species = match cli.species.as_slice() {
                    [only] => Some(only.as_str()),
                    _ => None,
                };
                let path = export::export_to_dir(&filtered, Path::new("."), species, Local::now().naive_local())?;
                eprintln!("Wrote {}", path.display());
            }
        },
        Command::Check => {}
    }

    Ok(())
}
