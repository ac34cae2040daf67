//! Command-line interface definitions for diskdex.
//!
//! The subcommand enum is the whole dispatch table: every command the
//! binary understands is a variant here, resolved at compile time, and an
//! unknown command is a typed clap error rather than a lookup failure.
//!
//! # Example
//!
//! ```bash
//! # Rebuild the mirror schema, destroying any existing index
//! diskdex prepare-db
//!
//! # Index two roots
//! diskdex update-db ~/media /mnt/backup
//!
//! # Interactive duplicate resolution: at least 1 MB, mp3 and flac only
//! diskdex duplicates 1 mp3 flac
//!
//! # Directories holding at least 500 MB
//! diskdex usage 500
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Filesystem mirror indexer with duplicate finding and usage reports.
///
/// diskdex mirrors directory trees into an embedded database, then answers
/// questions against the mirror: where files live, which files are
/// duplicated by name and size, and which directories hold the space.
#[derive(Debug, Parser)]
#[command(name = "diskdex")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to the mirror database
    ///
    /// Defaults to the configured location, or a platform-specific data
    /// directory when nothing is configured.
    #[arg(long, global = true, value_name = "PATH", env = "DISKDEX_DB")]
    pub db: Option<PathBuf>,

    /// Report errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for diskdex.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Drop and recreate the mirror tables (destructive, irreversible)
    PrepareDb,
    /// Index one or more directory roots into the mirror
    UpdateDb(UpdateDbArgs),
    /// Print indexed files whose name contains all given substrings
    Locate(LocateArgs),
    /// Find duplicate files and resolve them interactively
    Duplicates(DuplicatesArgs),
    /// Report per-directory disk usage from the mirror
    Usage(UsageArgs),
}

/// Arguments for the update-db subcommand.
#[derive(Debug, Args)]
pub struct UpdateDbArgs {
    /// Directory roots to index, each re-scanned in full
    #[arg(value_name = "DIR", required = true)]
    pub roots: Vec<PathBuf>,
}

/// Arguments for the locate subcommand.
#[derive(Debug, Args)]
pub struct LocateArgs {
    /// Substrings a file name must all contain (case-insensitive)
    #[arg(value_name = "NAME", required = true)]
    pub terms: Vec<String>,
}

/// Arguments for the duplicates subcommand.
#[derive(Debug, Args)]
pub struct DuplicatesArgs {
    /// Optional minimum size in megabytes, followed by extension filters
    ///
    /// The first argument is taken as the size threshold if it parses as
    /// a number; everything else is an extension suffix, e.g.:
    /// `duplicates 1 mp3 avi mp4`
    #[arg(value_name = "ARG")]
    pub args: Vec<String>,

    /// Move deleted files to the system trash instead of removing them
    #[arg(long)]
    pub trash: bool,
}

impl DuplicatesArgs {
    /// Split the positional arguments into the size threshold (MB) and
    /// the extension filters.
    #[must_use]
    pub fn split(&self) -> (u64, Vec<String>) {
        split_duplicate_args(&self.args)
    }
}

/// Arguments for the usage subcommand.
#[derive(Debug, Args)]
pub struct UsageArgs {
    /// Only report directories holding at least this many megabytes
    #[arg(value_name = "MIN_DIR_SIZE_MB", default_value = "0")]
    pub min_dir_size_mb: u64,
}

/// Interpret the positional arguments of `duplicates`: a leading numeric
/// argument is the minimum size in megabytes, the rest are extension
/// suffixes. Without a numeric lead, the threshold is 0.
#[must_use]
pub fn split_duplicate_args(args: &[String]) -> (u64, Vec<String>) {
    match args.split_first() {
        Some((first, rest)) => match first.parse::<u64>() {
            Ok(size) => (size, rest.to_vec()),
            Err(_) => (0, args.to_vec()),
        },
        None => (0, Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn leading_number_is_the_size_threshold() {
        let (size, exts) = split_duplicate_args(&strings(&["5", "mp3", "avi"]));
        assert_eq!(size, 5);
        assert_eq!(exts, strings(&["mp3", "avi"]));
    }

    #[test]
    fn missing_number_means_zero_threshold() {
        let (size, exts) = split_duplicate_args(&strings(&["mp3", "avi"]));
        assert_eq!(size, 0);
        assert_eq!(exts, strings(&["mp3", "avi"]));
    }

    #[test]
    fn no_arguments_at_all() {
        let (size, exts) = split_duplicate_args(&[]);
        assert_eq!(size, 0);
        assert!(exts.is_empty());
    }

    #[test]
    fn number_only_means_no_extension_filter() {
        let (size, exts) = split_duplicate_args(&strings(&["10"]));
        assert_eq!(size, 10);
        assert!(exts.is_empty());
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["diskdex", "update-db", "/data"]).unwrap();
        assert!(matches!(cli.command, Commands::UpdateDb(_)));

        let cli = Cli::try_parse_from(["diskdex", "-v", "duplicates", "1", "mp3"]).unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Duplicates(args) => {
                assert_eq!(args.split(), (1, vec!["mp3".to_string()]));
                assert!(!args.trash);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn unknown_commands_are_rejected() {
        assert!(Cli::try_parse_from(["diskdex", "frobnicate"]).is_err());
    }

    #[test]
    fn update_db_requires_at_least_one_root() {
        assert!(Cli::try_parse_from(["diskdex", "update-db"]).is_err());
    }
}
