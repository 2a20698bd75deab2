//! Subcommands and their execution.

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anonymizer::admin::BulkDelete;
use anonymizer::{
    anonymize_all, BatchIterator, BundledSource, Database, DirectorySource, IdentityGenerator, LoginSuffix,
    RecordId, RecordKind, RecordOutcome, Summary, TablePrefix, WordListSource, WordLists,
};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::Settings;

#[derive(Parser, Debug)]
#[command(name = "anonymizer", author, version, about = "Replace personal data in a CMS database with fabricated identities", long_about = None)]
pub struct Cli {
    /// Path to the SQLite database
    #[arg(short, long, env = "ANONYMIZER_DB", global = true)]
    pub db: Option<PathBuf>,

    /// JSON settings file
    #[arg(short, long, env = "ANONYMIZER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Table prefix (default: wp_)
    #[arg(long, global = true)]
    pub table_prefix: Option<String>,

    /// Site ID on a multi-site install; site tables become <prefix><id>_
    #[arg(long, global = true)]
    pub site: Option<u32>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Anonymize user data and user meta data
    AnonymizeUsers {
        #[command(flatten)]
        generation: GenerationArgs,

        /// Comma-separated user IDs to leave untouched (replaces the configured list)
        #[arg(long, value_delimiter = ',')]
        exclude: Option<Vec<RecordId>>,
    },

    /// Anonymize comment author names, emails and URLs
    AnonymizeComments {
        #[command(flatten)]
        generation: GenerationArgs,
    },

    /// Delete all pending signups
    DeleteSignups(BulkArgs),

    /// Empty the activity-logging plugin's tables
    TruncateLogs(BulkArgs),

    /// Delete all form entries without printing any entry data
    DeleteFormEntries(BulkArgs),
}

#[derive(Args, Debug)]
pub struct GenerationArgs {
    /// First and last names share an initial, e.g. Hazy Heron
    #[arg(long)]
    pub alliterate: bool,

    /// Records per page
    #[arg(short, long)]
    pub batch_size: Option<u64>,

    /// How generated logins are kept distinct
    #[arg(long, value_enum)]
    pub login_suffix: Option<SuffixArg>,

    /// Seed the name generator for a reproducible run
    #[arg(long)]
    pub seed: Option<u64>,

    /// Directory holding adjectives.txt and nouns.txt (default: bundled lists)
    #[arg(long)]
    pub words_dir: Option<PathBuf>,

    /// Pause between pages in milliseconds
    #[arg(long)]
    pub pause_ms: Option<u64>,
}

#[derive(Args, Debug)]
pub struct BulkArgs {
    /// Rows deleted per statement
    #[arg(short, long)]
    pub batch_size: Option<u64>,

    /// Pause between delete batches in milliseconds
    #[arg(long)]
    pub pause_ms: Option<u64>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuffixArg {
    None,
    Timestamp,
    Random,
}

impl From<SuffixArg> for LoginSuffix {
    fn from(arg: SuffixArg) -> Self {
        match arg {
            SuffixArg::None => LoginSuffix::None,
            SuffixArg::Timestamp => LoginSuffix::Timestamp,
            SuffixArg::Random => LoginSuffix::Random,
        }
    }
}

/// How a completed command ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Clean,
    /// Finished, but at least one record could not be updated
    RecordsFailed,
}

fn pause(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl Cli {
    pub fn run(self) -> Result<RunStatus> {
        let stdout = io::stdout();
        self.run_with(&mut stdout.lock())
    }

    /// Run the command, writing the record-by-record report to `out`.
    pub fn run_with<W: Write>(self, out: &mut W) -> Result<RunStatus> {
        let settings = Settings::load(self.config.as_deref())?;
        let db = self.open_database(&settings)?;

        match self.command {
            Command::AnonymizeUsers { generation, exclude } => {
                let excluded = exclude.unwrap_or_else(|| settings.excluded_users.clone());
                anonymize(&db, &settings, &generation, RecordKind::User, excluded, out)
            }
            Command::AnonymizeComments { generation } => {
                anonymize(&db, &settings, &generation, RecordKind::Comment, Vec::new(), out)
            }
            Command::DeleteSignups(args) => {
                let deleted = bulk(&settings, &args).delete_signups(&db)?;
                writeln!(out, "Success: Deleted {} signups.", deleted)?;
                Ok(RunStatus::Clean)
            }
            Command::TruncateLogs(args) => {
                let deleted = bulk(&settings, &args).truncate_logs(&db, &settings.logging_tables)?;
                writeln!(out, "Success: Deleted {} log rows.", deleted)?;
                Ok(RunStatus::Clean)
            }
            Command::DeleteFormEntries(args) => {
                let deleted = bulk(&settings, &args).delete_form_entries(&db, &settings.form_entry_tables)?;
                writeln!(out, "Success: Deleted {} form entry rows.", deleted)?;
                Ok(RunStatus::Clean)
            }
        }
    }

    fn open_database(&self, settings: &Settings) -> Result<Database> {
        let Some(path) = self.db.clone().or_else(|| settings.db_path.clone()) else {
            bail!("No database given. Pass --db, set ANONYMIZER_DB, or add dbPath to the config file.");
        };
        if !path.exists() {
            bail!("Database {} does not exist", path.display());
        }
        let prefix_base = self.table_prefix.as_deref().unwrap_or(&settings.table_prefix);
        let prefix = TablePrefix::new(prefix_base, self.site.or(settings.site_id))?;
        Database::open(&path, prefix).with_context(|| format!("Failed to open {}", path.display()))
    }
}

fn bulk(settings: &Settings, args: &BulkArgs) -> BulkDelete {
    BulkDelete {
        batch_size: args.batch_size.unwrap_or(settings.delete_batch_size),
        pause: pause(args.pause_ms.unwrap_or(settings.pause_ms)),
    }
}

fn build_generator(settings: &Settings, args: &GenerationArgs) -> Result<IdentityGenerator<StdRng>> {
    let words_dir = args.words_dir.clone().or_else(|| settings.words_dir.clone());
    let source: Box<dyn WordListSource> = match words_dir {
        Some(dir) => Box::new(DirectorySource::new(dir)),
        None => Box::new(BundledSource),
    };
    let words = WordLists::load(&*source)?;

    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let suffix = args.login_suffix.map(LoginSuffix::from).unwrap_or(settings.login_suffix);

    Ok(IdentityGenerator::new(words, &settings.contact_methods, rng).with_login_suffix(suffix))
}

fn progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

fn anonymize<W: Write>(
    db: &Database,
    settings: &Settings,
    args: &GenerationArgs,
    kind: RecordKind,
    excluded: Vec<RecordId>,
    out: &mut W,
) -> Result<RunStatus> {
    let mut generator = build_generator(settings, args)?;
    let iterator = BatchIterator::new(args.batch_size.unwrap_or(settings.batch_size))?
        .with_excluded(excluded)
        .with_pause(pause(args.pause_ms.unwrap_or(settings.pause_ms)));

    let total = db.count_records(kind, iterator.excluded())?;
    writeln!(out, "Anonymizing {} {}s in batches of {}.", total, kind, iterator.batch_size())?;
    let pb = progress_bar(total);

    // The bar may be hidden (no terminal), so report lines go to `out` with the bar suspended.
    let mut write_error: Option<io::Error> = None;
    let summary = anonymize_all(db, &mut generator, &iterator, kind, args.alliterate, |outcome| {
        let line = match outcome {
            RecordOutcome::Updated { id } => format!("Success: Updated {}: {}.", kind, id),
            RecordOutcome::Failed { id, reason } => format!("Warning: Failed to update {} {}: {}", kind, id, reason),
        };
        if write_error.is_none() {
            if let Err(e) = pb.suspend(|| writeln!(out, "{}", line)) {
                write_error = Some(e);
            }
        }
        pb.inc(1);
    });
    pb.finish_and_clear();

    let summary: Summary = summary?;
    if let Some(e) = write_error {
        return Err(e).context("Failed to write the run report");
    }
    writeln!(
        out,
        "Complete. {} updated, {} failed across {} pages.",
        summary.succeeded, summary.failed, summary.pages
    )?;

    Ok(if summary.has_failures() {
        RunStatus::RecordsFailed
    } else {
        RunStatus::Clean
    })
}
