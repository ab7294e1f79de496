use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use abtest::model::{EventKind, Variant};

const DEFAULT_CACHE_ROOT: &str = ".cache/abtest";
const DB_FILENAME: &str = "abtest_events.sqlite";

#[derive(Parser, Debug)]
#[command(
    name = "abtest",
    version,
    about = "Landing-page A/B experiment event store and significance reports"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Record(RecordArgs),
    Import(ImportArgs),
    Report(ReportArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    #[arg(long, default_value = DEFAULT_CACHE_ROOT)]
    pub cache_root: PathBuf,

    #[arg(long)]
    pub db_path: Option<PathBuf>,
}

impl StoreArgs {
    pub fn resolve_db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.cache_root.join(DB_FILENAME))
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }
}

#[derive(Args, Debug, Clone)]
pub struct RecordArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    /// A or B (`variantA` is accepted too).
    #[arg(long)]
    pub variant: Variant,

    /// view or click.
    #[arg(long)]
    pub event: EventKind,

    /// Day the event is filed under; defaults to today (UTC).
    #[arg(long)]
    pub date: Option<NaiveDate>,

    #[arg(long, default_value_t = 1)]
    pub count: u64,
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub input: PathBuf,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ReportArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long)]
    pub start: Option<NaiveDate>,

    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Window length used when `--start` is omitted.
    #[arg(long, default_value_t = 7)]
    pub days: u32,

    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Also write a JSON report manifest to this path.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub store: StoreArgs,
}
