//! news-digest binary entrypoint.
//! Ingest feeds into daily record files, build weekly and range rollups,
//! and move digests to and from the blob store.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use news_digest::blob::{download_window, upload_replacing, LocalDirStore};
use news_digest::config::{load_feed_sources, load_hardened_urls, load_keywords, PipelineConfig};
use news_digest::ingest::fetch::TieredFetcher;
use news_digest::ingest::keywords::KeywordMatcher;
use news_digest::ingest::tier::HardenedList;
use news_digest::ingest::Pipeline;
use news_digest::metrics::Metrics;
use news_digest::records;
use news_digest::rollup::{self, RollupFormat, RollupReport};
use news_digest::FeedKind;

#[derive(Parser, Debug)]
#[command(name = "news-digest", version, about = "News feed ingestion and rollups")]
struct Cli {
    /// Config file (TOML or JSON). Defaults to $NEWS_DIGEST_CONFIG, then config/news_digest.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Csv,
    Json,
}

impl From<Format> for RollupFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Csv => RollupFormat::Csv,
            Format::Json => RollupFormat::Json,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch every configured feed and write today's record and error files.
    Ingest {
        /// rss | google
        #[arg(long, default_value = "rss")]
        kind: FeedKind,
        /// Run as if today were this date (YYYY-MM-DD).
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Saturday..Friday weekly rollup.
    Weekly {
        #[arg(long, default_value = "google")]
        kind: FeedKind,
        /// Defaults to the most recent Friday.
        #[arg(long)]
        week_ending: Option<NaiveDate>,
        #[arg(long)]
        input_dir: Option<PathBuf>,
    },
    /// Range rollup through today; incremental when --start is absent.
    Rollup {
        #[arg(long, default_value = "rss")]
        kind: FeedKind,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long, value_enum, default_value = "csv")]
        format: Format,
        #[arg(long)]
        input_dir: Option<PathBuf>,
        /// Defaults to the input directory.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Upload files, replacing same-named files in the target folder.
    Upload {
        #[arg(long)]
        store_root: PathBuf,
        #[arg(long)]
        folder: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Download daily files dated within [start, end].
    Download {
        #[arg(long)]
        store_root: PathBuf,
        #[arg(long)]
        folder: String,
        #[arg(long, default_value = "google")]
        kind: FeedKind,
        #[arg(long)]
        start: NaiveDate,
        /// Defaults to today.
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long)]
        dest: PathBuf,
    },
}

/// Compact logs by default; `LOG_FORMAT=json` for structured output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("news_digest=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::load_from(p),
        None => PipelineConfig::load_default(),
    }
}

async fn ingest(cfg: &PipelineConfig, kind: FeedKind, today: NaiveDate) -> Result<()> {
    let feeds_path = cfg.paths.feeds(kind);
    let feeds = load_feed_sources(&feeds_path, kind)
        .with_context(|| format!("loading feeds from {}", feeds_path.display()))?;

    let keywords = match kind {
        FeedKind::Rss => {
            let p = cfg.paths.keywords();
            let words = load_keywords(&p)
                .with_context(|| format!("loading keywords from {}", p.display()))?;
            KeywordMatcher::new(words)
        }
        FeedKind::GoogleAlerts => KeywordMatcher::default(),
    };

    let hardened = if kind.escalates() {
        let p = cfg.paths.hardened_feeds();
        HardenedList::from_urls(
            load_hardened_urls(&p)
                .with_context(|| format!("loading hardened list from {}", p.display()))?,
        )
    } else {
        HardenedList::default()
    };
    info!(
        target: "ingest",
        kind = ?kind,
        feeds = feeds.len(),
        keywords = keywords.len(),
        hardened = hardened.len(),
        %today,
        "starting ingest"
    );

    let fetcher = TieredFetcher::from_config(&cfg.fetch, hardened, kind.escalates())?;
    let pipeline = Pipeline::new(kind, cfg, fetcher, keywords);
    let out = pipeline.run(&feeds, today).await;

    records::write_articles(&cfg.paths.articles_dir(kind), kind, today, &out.articles)?;
    records::write_errors(&cfg.paths.errors_dir(kind), kind, today, &out.errors)?;
    if !out.errors.is_empty() {
        warn!(target: "ingest", errors = out.errors.len(), "some feeds failed; see error log");
    }
    Ok(())
}

fn log_report(label: &str, r: &RollupReport) {
    match &r.output {
        Some(path) => info!(
            target: "rollup",
            "[{label}] {} to {} | {} files | {} duplicates out of {} rows, {} unique saved to {}",
            r.start,
            r.end,
            r.inputs,
            r.counts.duplicates,
            r.counts.total,
            r.counts.unique,
            path.display()
        ),
        None => info!(target: "rollup", "[{label}] {} to {} | no input files", r.start, r.end),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_ref())?;
    let today = Local::now().date_naive();

    let metrics = match &cfg.metrics_path {
        Some(_) => Some(Metrics::init()?),
        None => None,
    };

    match cli.command {
        Command::Ingest { kind, date } => {
            ingest(&cfg, kind, date.unwrap_or(today)).await?;
        }
        Command::Weekly {
            kind,
            week_ending,
            input_dir,
        } => {
            let input = input_dir.unwrap_or_else(|| cfg.paths.articles_dir(kind));
            if !input.is_dir() {
                bail!("input directory does not exist: {}", input.display());
            }
            let r = rollup::run_weekly(&input, &cfg.paths.weekly_dir(), kind, week_ending, today)?;
            log_report("CSV", &r);
        }
        Command::Rollup {
            kind,
            start,
            format,
            input_dir,
            output_dir,
        } => {
            let input = input_dir.unwrap_or_else(|| cfg.paths.articles_dir(kind));
            let output = output_dir.unwrap_or_else(|| input.clone());
            let format = RollupFormat::from(format);
            let r = rollup::run_range(&input, &output, kind, format, start, today)?;
            log_report(&format.ext().to_ascii_uppercase(), &r);
        }
        Command::Upload {
            store_root,
            folder,
            files,
        } => {
            let store = LocalDirStore::new(store_root);
            for f in &files {
                upload_replacing(&store, &folder, f).await?;
            }
        }
        Command::Download {
            store_root,
            folder,
            kind,
            start,
            end,
            dest,
        } => {
            let store = LocalDirStore::new(store_root);
            let end = end.unwrap_or(today);
            let got =
                download_window(&store, &folder, kind.article_stem(), start, end, &dest).await?;
            info!(target: "blob", files = got.len(), dest = %dest.display(), "download finished");
        }
    }

    if let (Some(m), Some(path)) = (&metrics, &cfg.metrics_path) {
        m.write_snapshot(path)?;
    }
    Ok(())
}
