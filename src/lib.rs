//! diskdex - Filesystem Mirror Indexer
//!
//! Mirrors directory trees into an embedded SQLite database, then answers
//! questions against the mirror: where files live (`locate`), which files
//! are duplicated by name and size (`duplicates`, with interactive
//! resolution), and which directories hold the space (`usage`).
//!
//! The mirror is refreshed by re-running `update-db`; in between runs it
//! is allowed to go stale, and every consumer guards against files that
//! vanished from disk since the last index.

pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod index;
pub mod logging;
pub mod progress;
pub mod store;
pub mod usage;

use anyhow::Context;

use crate::cli::{Cli, Commands};
use crate::config::Config;
use crate::duplicates::{ConsoleSource, DuplicateFilter, DuplicateFinder, ResolutionEngine};
use crate::error::ExitCode;
use crate::index::Indexer;
use crate::progress::ConsoleProgress;
use crate::store::MirrorStore;
use crate::usage::UsageReport;

/// Run the application with parsed CLI arguments.
///
/// Owns the store for the whole invocation: the connection is opened
/// once, handed by reference into every component, committed and released
/// on every exit path, including dispatch errors.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);

    let config = Config::load();
    let db_path = cli
        .db
        .clone()
        .unwrap_or_else(|| config.resolve_db_path());
    log::debug!("mirror database at {}", db_path.display());

    let store = MirrorStore::open(&db_path)
        .with_context(|| format!("opening mirror database {}", db_path.display()))?;

    let result = dispatch(&cli, &store, &config);

    // A failed command may leave a transaction open; drop its writes so
    // the connection closes clean either way.
    if result.is_err() {
        let _ = store.rollback();
    }
    let _ = store.commit();

    result
}

fn dispatch(cli: &Cli, store: &MirrorStore, config: &Config) -> anyhow::Result<ExitCode> {
    match &cli.command {
        Commands::PrepareDb => {
            store.prepare_db().context("recreating mirror schema")?;
            println!("Mirror schema recreated.");
            Ok(ExitCode::Success)
        }

        Commands::UpdateDb(args) => {
            let mut skipped = 0;
            for root in &args.roots {
                let progress = ConsoleProgress::new(cli.quiet);
                let indexer = Indexer::new(store, &progress)
                    .with_batching(config.flush_every, config.commit_every);
                let outcome = indexer
                    .index_root(root)
                    .with_context(|| format!("indexing {}", root.display()))?;
                progress.finish();
                skipped += outcome.skipped;
                println!(
                    "Total files in {}: {}. [OK] ({:.2}s)",
                    root.display(),
                    outcome.files,
                    outcome.elapsed.as_secs_f64()
                );
            }
            if skipped > 0 {
                log::warn!("{skipped} entries were skipped on I/O errors");
                Ok(ExitCode::PartialSuccess)
            } else {
                Ok(ExitCode::Success)
            }
        }

        Commands::Locate(args) => {
            for (dir, name) in store.locate(&args.terms).context("locating files")? {
                println!("{dir}{}{name}", std::path::MAIN_SEPARATOR);
            }
            Ok(ExitCode::Success)
        }

        Commands::Duplicates(args) => {
            let (min_size_mb, extensions) = args.split();
            let filter = DuplicateFilter::new(min_size_mb, extensions);
            let finder = DuplicateFinder::new(store);

            let mut source = ConsoleSource::new();
            let mut engine = ResolutionEngine::new(&mut source, args.trash);
            let stats = engine
                .run(&finder, &filter)
                .context("resolving duplicates")?;
            println!("{}", stats.summary());
            Ok(ExitCode::Success)
        }

        Commands::Usage(args) => {
            let rows = store
                .directory_usage(args.min_dir_size_mb)
                .context("aggregating directory usage")?;
            let total_mb = store.total_size_mb().context("totalling mirror size")?;
            print!("{}", UsageReport::build(rows, total_mb).render());
            Ok(ExitCode::Success)
        }
    }
}
