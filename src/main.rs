//! # reglex CLI
//!
//! ## Usage
//!
//! ```bash
//! reglex --config ./config/reglex.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `reglex init` | Create artifact directories and the index database |
//! | `reglex harvest` | Discover records from the configured listings |
//! | `reglex fetch` | Save document text for every record (HTML sources) |
//! | `reglex fetch-pdf` | Download PDFs for every record (PDF sources) |
//! | `reglex clean-pdfs` | Turn downloaded PDFs into raw text |
//! | `reglex process` | Categorize, sanitize and summarize raw texts |
//! | `reglex index` | Rebuild the similarity index from summaries |
//! | `reglex search "<query>"` | Show the most similar summary chunks |
//! | `reglex ask "<question>"` | Answer a question from the indexed summaries |
//! | `reglex records` | List stored records, newest first |
//! | `reglex run` | All pipeline steps in order |
//!
//! Every step skips work whose output already exists, so any command can be
//! re-run after an interruption.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reglex::ask::{self, AskOptions};
use reglex::config::{self, Config};
use reglex::progress::{ProgressMode, ProgressReporter};
use reglex::{fetch, harvest, index, migrate, pdf, search, stages, store};

/// Incremental harvesting, summarization and retrieval for legal regulation
/// corpora.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/reglex.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "reglex", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/reglex.toml")]
    config: PathBuf,

    /// Progress output on stderr: auto, human, json or off.
    #[arg(long, global = true, default_value = "auto")]
    progress: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the artifact directories and the index schema. Idempotent.
    Init,

    /// Page through the configured listings and merge new records.
    Harvest {
        /// Only this source (default: all, in declared order).
        #[arg(long)]
        source: Option<String>,
        /// Only this category of the selected source(s).
        #[arg(long)]
        category: Option<String>,
        /// Target year (default: `harvest.target_year`).
        #[arg(long)]
        year: Option<i32>,
        /// Stop after the first listing page.
        #[arg(long)]
        single_page: bool,
    },

    /// Save the text of every record that has no raw artifact yet.
    Fetch {
        #[arg(long)]
        source: Option<String>,
    },

    /// Download the PDF of every record of PDF-format sources.
    FetchPdf {
        #[arg(long)]
        source: Option<String>,
    },

    /// Extract and clean text from downloaded PDFs.
    CleanPdfs,

    /// Categorize, sanitize and summarize raw texts not yet summarized.
    Process,

    /// Rebuild the similarity index from every summary on disk.
    Index,

    /// Show the summary chunks most similar to a query.
    Search {
        query: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Answer a question from the indexed summaries.
    Ask {
        question: String,
        /// Restrict retrieval to this category.
        #[arg(long, conflicts_with = "detect")]
        category: Option<String>,
        /// Let the model pick the category first.
        #[arg(long)]
        detect: bool,
        /// Print the grounded answer without the formal rewrite.
        #[arg(long)]
        raw: bool,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List stored records, newest first.
    Records {
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Run harvest, fetch, fetch-pdf, clean-pdfs, process and index.
    Run {
        #[arg(long)]
        year: Option<i32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let progress = ProgressMode::from_flag(&cli.progress)?.reporter();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => migrate::run_init(&cfg).await?,
        Commands::Harvest {
            source,
            category,
            year,
            single_page,
        } => {
            harvest::run_harvest(
                &cfg,
                source.as_deref(),
                category.as_deref(),
                year,
                single_page,
                progress.as_ref(),
            )
            .await?
        }
        Commands::Fetch { source } => {
            fetch::run_fetch(&cfg, source.as_deref(), progress.as_ref()).await?
        }
        Commands::FetchPdf { source } => {
            pdf::run_fetch_pdf(&cfg, source.as_deref(), progress.as_ref()).await?
        }
        Commands::CleanPdfs => pdf::run_clean_pdfs(&cfg, progress.as_ref())?,
        Commands::Process => stages::run_process(&cfg, progress.as_ref()).await?,
        Commands::Index => index::run_index(&cfg, progress.as_ref()).await?,
        Commands::Search {
            query,
            category,
            limit,
        } => search::run_search(&cfg, &query, category.as_deref(), limit).await?,
        Commands::Ask {
            question,
            category,
            detect,
            raw,
            limit,
        } => {
            let options = AskOptions {
                category,
                detect,
                raw,
                limit,
            };
            ask::run_ask(&cfg, &question, &options).await?
        }
        Commands::Records { source, limit } => {
            store::run_records(&cfg, source.as_deref(), limit)?
        }
        Commands::Run { year } => run_all(&cfg, year, progress.as_ref()).await?,
    }

    Ok(())
}

/// Every step in order. Model-backed steps are skipped with a warning when
/// their provider is disabled.
async fn run_all(
    cfg: &Config,
    year: Option<i32>,
    progress: &dyn ProgressReporter,
) -> anyhow::Result<()> {
    harvest::run_harvest(cfg, None, None, year, false, progress).await?;
    fetch::run_fetch(cfg, None, progress).await?;
    pdf::run_fetch_pdf(cfg, None, progress).await?;
    pdf::run_clean_pdfs(cfg, progress)?;

    if cfg.llm.is_enabled() {
        stages::run_process(cfg, progress).await?;
    } else {
        warn!("llm provider is disabled; skipping process");
    }

    if cfg.embedding.is_enabled() {
        index::run_index(cfg, progress).await?;
    } else {
        warn!("embedding provider is disabled; skipping index");
    }
    Ok(())
}
