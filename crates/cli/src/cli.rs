//! Command line definition.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "obflow")]
#[command(about = "Ocean color granule download and level-3 processing pipeline")]
#[command(version)]
pub struct Cli {
    /// Configuration file
    #[arg(long, global = true, env = "OBFLOW_CONFIG", default_value = "obflow.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

/// Inclusive date range; `--to` defaults to `--from`.
#[derive(Args, Debug, Clone)]
pub struct RangeArgs {
    /// First day (YYYY-MM-DD)
    #[arg(long)]
    pub from: NaiveDate,

    /// Last day (YYYY-MM-DD)
    #[arg(long)]
    pub to: Option<NaiveDate>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the store and the data directories, writing a default config if none exists
    Init,
    /// Queue catalog granules for download
    Queue {
        /// Mission letters: a=Aqua MODIS, t=Terra MODIS, j=NOAA-20 VIIRS, n=SNPP VIIRS, s=SeaWiFS
        #[arg(long, short)]
        missions: Option<String>,

        #[command(flatten)]
        range: RangeArgs,

        /// 1 (most urgent) to 5 (least urgent)
        #[arg(long, short, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=5))]
        priority: u8,

        /// Queue without asking for confirmation
        #[arg(long, short)]
        yes: bool,
    },
    /// Download queued products
    Download,
    /// Process downloaded products into level-3 targets
    Process,
    /// Reconcile the store with the files on disk
    Verify {
        /// Delete source files of products that were already processed
        #[arg(long)]
        purge_leftovers: bool,
    },
    /// Change the priority of products in a date range
    Priority {
        #[command(flatten)]
        range: RangeArgs,

        #[arg(long, short, value_parser = clap::value_parser!(u8).range(1..=5))]
        priority: u8,
    },
    /// Delete products in a date range, with their files
    Delete {
        #[command(flatten)]
        range: RangeArgs,
    },
    /// List level-3 targets in a date range
    Report {
        #[command(flatten)]
        range: RangeArgs,
    },
    /// Entity counts per status
    Stats,
    /// Print the effective configuration, secrets redacted
    ShowConfig,
}
