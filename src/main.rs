//! # parasort CLI
//!
//! The `parasort` binary classifies markdown notes into a PARA taxonomy,
//! moves them into `output/<category>/<subcategory>/`, and builds an index
//! and Map-of-Content hubs over the result.
//!
//! ## Usage
//!
//! ```bash
//! parasort --config ./config/parasort.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `parasort init` | Create the data directory and checkpoint store |
//! | `parasort categorize` | Classify and move every eligible note |
//! | `parasort reconcile` | Complete moves interrupted by a crash |
//! | `parasort status` | Checkpoint counts and recorded failures |
//! | `parasort index` | Build `notes_index.json` and `notes_stats.json` |
//! | `parasort moc` | Generate hub documents from the index |
//!
//! ## Examples
//!
//! ```bash
//! # Try the first ten notes without touching anything
//! parasort categorize --dry-run --limit 10
//!
//! # Start over, ignoring earlier checkpoints
//! parasort categorize --fresh
//!
//! # Statistics without writing the index
//! parasort index --stats
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use parasort::progress::ProgressMode;
use parasort::{config, index, moc, pipeline, status, store::SqliteCheckpointStore};

/// parasort: sort markdown notes into Areas / Resources / Archive.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/parasort.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "parasort",
    about = "Classify markdown notes into a PARA taxonomy with an LLM",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/parasort.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory and checkpoint store schema.
    ///
    /// Idempotent: running it again is safe.
    Init,

    /// Classify, annotate, and move notes from the input directory.
    ///
    /// Documents already recorded as succeeded are skipped unless `--fresh`
    /// is given. Failures are recorded and retried on the next run.
    Categorize {
        /// Classify and report where each note would go; write nothing.
        #[arg(long)]
        dry_run: bool,

        /// Process at most this many eligible notes (in path order).
        #[arg(long)]
        limit: Option<usize>,

        /// Skip notes that already succeeded (the default).
        #[arg(long, conflicts_with = "fresh")]
        resume: bool,

        /// Ignore prior checkpoint statuses and process every note in the input.
        #[arg(long)]
        fresh: bool,

        /// Progress output on stderr. Defaults to `human` on a TTY, else `off`.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Complete moves interrupted between file move and checkpoint write.
    Reconcile,

    /// Show checkpoint counts, failures, and store size.
    Status,

    /// Build the notes index and statistics.
    Index {
        /// Print statistics without writing the index files.
        #[arg(long)]
        stats: bool,

        /// Rebuild from the frontmatter of the output tree instead of the
        /// checkpoint store.
        #[arg(long)]
        rescan: bool,
    },

    /// Generate Map-of-Content hub files from the index.
    Moc {
        /// Print the beginning of each hub instead of writing files.
        #[arg(long)]
        preview: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            for dir in [&cfg.paths.input_dir, &cfg.paths.output_dir] {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }
            let db_path = cfg.paths.checkpoint_db();
            let store = SqliteCheckpointStore::open(&db_path).await?;
            store.close().await;
            println!("Checkpoint store initialized: {}", db_path.display());
        }
        Commands::Categorize {
            dry_run,
            limit,
            resume: _,
            fresh,
            progress,
        } => {
            let opts = pipeline::RunOptions {
                dry_run,
                limit,
                fresh,
            };
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            pipeline::run_categorize(&cfg, &opts, mode).await?;
        }
        Commands::Reconcile => {
            pipeline::run_reconcile(&cfg).await?;
        }
        Commands::Status => {
            status::run_status(&cfg).await?;
        }
        Commands::Index { stats, rescan } => {
            index::run_index(&cfg, stats, rescan).await?;
        }
        Commands::Moc { preview } => {
            moc::run_moc(&cfg, preview)?;
        }
    }

    Ok(())
}
