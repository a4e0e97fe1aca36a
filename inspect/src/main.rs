//! Summarize an LMP log and (optionally) split it into intervals.
//!
//! # Usage
//!
//! Print the size, number of entries, and time range of a log (building its index if missing):
//!
//! ```sh
//! cargo run --release --bin lmp-inspect -- drive.lmp
//! ```
//!
//! Write one index file per interval of `trials.tsv` (one `start<TAB>end` pair of seconds per
//! line) into `out/`, or extract each interval into a standalone log with `--extract`:
//!
//! ```sh
//! cargo run --release --bin lmp-inspect -- drive.lmp --splits trials.tsv --dest out --extract
//! ```

mod intervals;

use clap::{value_parser, Arg, ArgAction, Command};
use lmp_reader::{split, Config, Entries, FileCopier, Mode, Raw, Reader};
use std::{path::PathBuf, process::ExitCode};
use tracing::{error, info};

/// Flag for verbose output
const VERBOSE_FLAG: &str = "verbose";

fn main() -> ExitCode {
    // Parse arguments
    let matches = Command::new("lmp-inspect")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Summarize and split LMP log files.")
        .arg(
            Arg::new("logfile")
                .required(true)
                .help("Path to the log")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("splits")
                .long("splits")
                .required(false)
                .help("Tab separated file of intervals (in seconds)")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("dest")
                .long("dest")
                .required(false)
                .help("Directory to write intervals to (defaults to the directory of the log)")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("extract")
                .long("extract")
                .action(ArgAction::SetTrue)
                .help("Copy each interval into a new log instead of writing an index"),
        )
        .arg(
            Arg::new("channel")
                .long("channel")
                .required(false)
                .help("Channel to read"),
        )
        .arg(
            Arg::new(VERBOSE_FLAG)
                .short('v')
                .long(VERBOSE_FLAG)
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    // Create logger
    let level = if matches.get_flag(VERBOSE_FLAG) {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    // Open log
    let path = matches
        .get_one::<PathBuf>("logfile")
        .expect("Please provide a log");
    let mut config = Config::default();
    if let Some(channel) = matches.get_one::<String>("channel") {
        config.channel = channel.clone();
    }
    let reader = match Reader::open(path, config, Raw) {
        Ok(reader) => reader,
        Err(e) => {
            error!(error = ?e, path = %path.display(), "failed to open log");
            return ExitCode::FAILURE;
        }
    };

    // Summarize
    let timestamps = reader.index().timestamps();
    println!("path: {}", path.display());
    println!("channel: {}", reader.channel());
    println!("size: {} bytes", reader.size());
    println!("entries: {}", reader.len());
    if let (Some(first), Some(last)) = (timestamps.first(), timestamps.last()) {
        println!("first: {first}us");
        println!("last: {last}us");
        println!("duration: {:.6}s", (last - first) as f64 / 1e6);
    }

    // Split (if requested)
    let Some(splits) = matches.get_one::<PathBuf>("splits") else {
        return ExitCode::SUCCESS;
    };
    let intervals = match intervals::load(splits) {
        Ok(intervals) => intervals,
        Err(e) => {
            error!(error = ?e, path = %splits.display(), "failed to load intervals");
            return ExitCode::FAILURE;
        }
    };
    let dest = matches.get_one::<PathBuf>("dest").cloned().unwrap_or_else(|| {
        path.parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), PathBuf::from)
    });
    let mode = if matches.get_flag("extract") {
        Mode::Extract
    } else {
        Mode::IndexOnly
    };
    match split(reader.index(), path, &intervals, &dest, mode, &FileCopier) {
        Ok(splits) => {
            for split in splits {
                info!(
                    path = %split.path.display(),
                    start = split.start,
                    stop = split.stop,
                    bytes = split.span.end - split.span.start,
                    "wrote interval"
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = ?e, dest = %dest.display(), "failed to split log");
            ExitCode::FAILURE
        }
    }
}
