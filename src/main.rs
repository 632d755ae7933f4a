//! This program works on the Wikimedia hourly page view dumps, whose general
//! documentation you can find at
//! <https://dumps.wikimedia.org/other/pagecounts-raw/>.

mod config;
mod dataset;
mod extract;
mod input;
mod output;
mod progress;
mod spike;
mod top;

use crate::{config::Config, progress::ProgressReport};
use clap::Parser;
use log::LevelFilter;
use std::{fmt, num::NonZeroUsize, path::PathBuf};
#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

/// Find the largest day-over-day page view spike of every Wikipedia page
///
/// Input files must follow the `pagecounts-YYYYMMDD-HHmmss[.gz]` naming
/// convention of the hourly dumps, since the date and hour of each view count
/// are deduced from the file name. Only pages from projects with a two-letter
/// language code are considered.
#[derive(Parser, Debug)]
#[command(version, author)]
struct Args {
    /// Hourly dump files, directories of such files, or URLs to download
    /// them from
    #[arg(required = true)]
    inputs: Vec<Box<str>>,

    /// Write the results to this file instead of the standard output
    #[arg(short = 'O', long)]
    output: Option<PathBuf>,

    /// Max number of output pages
    ///
    /// If set, only the pages with the largest spikes are reported. Ties are
    /// broken in favor of the page which comes first in lexicographic order.
    #[arg(short = 'o', long)]
    max_outputs: Option<NonZeroUsize>,

    /// Sort output pages in order of decreasing spike magnitude
    ///
    /// By default, pages are emitted in order of increasing entity key, which
    /// is the order that an external sort-based grouping would produce.
    #[arg(short, long, default_value_t = false)]
    sort_by_magnitude: bool,

    /// In-memory dataset chunk size
    ///
    /// Pages that are resident in memory are sliced into chunks of a certain
    /// number of pages, which are processed in parallel. If this is set too
    /// low, the overhead of spawning parallel tasks is not amortized, and if it
    /// is set too high, load balancing suffers.
    #[arg(long, default_value = "500")]
    memory_chunk: NonZeroUsize,
}
//
impl Args {
    /// Decode and validate CLI arguments
    pub fn parse_and_check() -> Result<Self> {
        let args = Args::parse();
        for input in args.inputs.iter() {
            anyhow::ensure!(!input.trim().is_empty(), "input locations cannot be empty");
        }
        Ok(args)
    }
}
//
#[tokio::main]
async fn main() -> Result<()> {
    // Set up logging
    setup_logging().map_err(|e| anyhow::format_err!("{e}"))?;

    // Decode CLI arguments
    let args = Args::parse_and_check()?;
    let config = Config::new(args);

    // Set up progress reporting
    let report = ProgressReport::new();

    // Extract hourly view counts from the input files and group them by page
    let sources = input::resolve(&config.inputs).await?;
    let client = reqwest::Client::new();
    let dataset = input::read_and_collect(config.clone(), client, sources, &report).await?;

    // Find the largest spike of every page
    let spikes = top::pick_top_spikes(&config, &dataset, &report);

    // Emit the results
    output::write_spikes(config.output.as_deref(), &spikes).await?;
    Ok(())
}

/// Use anyhow for Result type erasure
pub use anyhow::Result;

/// Language code followed by page title, e.g. "enMain_Page"
pub type EntityKey = Box<str>;

/// Number of page views
///
/// Hourly counts of the most popular pages are in the millions, and they are
/// summed over days, so u32 would be uncomfortably tight.
pub type ViewCount = u64;

/// Hour of the day, from 0 to 23
pub type Hour = u8;

/// Calendar day, stored as the YYYYMMDD number from the dump file names
///
/// The numeric order of this representation matches chronological order.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Day(u32);
//
impl Day {
    /// Decode a YYYYMMDD day identifier
    ///
    /// Only the syntax is checked, not whether the date exists in the calendar.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        s.parse().ok().map(Self)
    }
}
//
impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08}", self.0)
    }
}

/// Hourly data about a page's views
///
/// The derived ordering is chronological, which is the order in which hourly
/// data must be fed to the spike detector.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct HourlyCount {
    /// Day on which the views were recorded
    pub day: Day,

    /// Hour of that day on which the views were recorded
    pub hour: Hour,

    /// Number of recorded views
    pub view_count: ViewCount,
}
//
impl HourlyCount {
    /// Time at which the data was recorded
    pub fn timestamp(&self) -> (Day, Hour) {
        (self.day, self.hour)
    }
}

/// Set up logging
fn setup_logging() -> syslog::Result<()> {
    syslog::init(
        syslog::Facility::LOG_USER,
        if cfg!(feature = "log-trace") {
            LevelFilter::Trace
        } else if cfg!(debug_assertions) {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        },
        None,
    )
}

/// Use jemalloc for improved multi-thread performance
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;
