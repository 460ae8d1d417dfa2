use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::Receiver;
use fuse_model::WORKSHEET_FS_ITEM;
use fuse_reader::{
    CacheStrategy, CancelScope, DiskCache, FieldLocation, FieldMatcher, FieldRetrieval,
    HeaderSpec, QueryOptions, ResultField,
};
use serde::{Deserialize, Serialize};

/// Fields buffered between the query and stdout.
const OUTPUT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Parser)]
#[command(name = "fuse")]
#[command(about = "Locate items and retrieve fields in FUSE item workbooks.")]
struct Cli {
    /// Files scanned at once (default: one per logical core).
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Worksheet holding the item rows.
    #[arg(long, global = true, default_value = WORKSHEET_FS_ITEM)]
    sheet: String,

    /// Keep located header rows in a scratch directory for the duration of
    /// the run.
    #[arg(long, global = true)]
    disk_cache: bool,

    /// Log pipeline progress to stderr (`RUST_LOG` still applies).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print `<file>\t<row>` for the row holding an item id.
    Locate(LocateArgs),
    /// Print one JSON line per field selected by a spec file.
    Retrieve(RetrieveArgs),
}

#[derive(Debug, Parser)]
struct LocateArgs {
    /// Exact value of the `Item ID` column.
    item_id: String,

    /// Workbooks to search.
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[derive(Debug, Parser)]
struct RetrieveArgs {
    /// JSON document with `locations` and `retrievals` arrays.
    #[arg(long, value_name = "PATH")]
    spec: PathBuf,

    /// Workbooks to read.
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SpecFile {
    locations: Vec<LocationEntry>,
    retrievals: Vec<RetrievalEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HeaderEntry {
    key: String,
    #[serde(default)]
    others_in_group: Vec<String>,
    #[serde(default)]
    on_match: usize,
}

impl From<HeaderEntry> for HeaderSpec {
    fn from(entry: HeaderEntry) -> Self {
        HeaderSpec::new(entry.key, entry.others_in_group, entry.on_match)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum MatchRule {
    Exact(String),
    Contains(String),
    NonEmpty,
}

impl MatchRule {
    fn into_matcher(self, on_match: usize) -> FieldMatcher {
        let matcher = match self {
            MatchRule::Exact(expected) => FieldMatcher::exact(expected),
            MatchRule::Contains(needle) => FieldMatcher::contains(needle),
            MatchRule::NonEmpty => FieldMatcher::new(|value| !value.is_empty(), 1),
        };
        matcher.with_on_match(on_match)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LocationEntry {
    id: String,
    header: HeaderEntry,
    #[serde(rename = "match")]
    rule: MatchRule,
    #[serde(default)]
    on_match: usize,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RetrievalEntry {
    id: String,
    header: HeaderEntry,
    #[serde(rename = "match")]
    rule: MatchRule,
    #[serde(default)]
    on_match: usize,
    offsets: Vec<isize>,
}

#[derive(Debug, Serialize)]
struct FieldLine<'a> {
    spec: &'a str,
    item_id: &'a str,
    header: &'a str,
    value: &'a str,
    file: String,
    cell: String,
}

impl<'a> From<&'a ResultField> for FieldLine<'a> {
    fn from(field: &'a ResultField) -> Self {
        Self {
            spec: &field.spec_id,
            item_id: &field.item_id,
            header: &field.header,
            value: &field.value,
            file: field.file.display().to_string(),
            cell: field.address(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Owns the optional header cache; cancelling it removes the directory.
    let scope = CancelScope::new();
    let result = run(&cli, &scope);
    scope.cancel();
    result
}

fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();
}

fn run(cli: &Cli, scope: &CancelScope) -> Result<()> {
    let mut options = QueryOptions::default().with_sheet(cli.sheet.clone());
    if let Some(workers) = cli.workers {
        options = options.with_workers(workers);
    }
    if cli.disk_cache {
        let cache = DiskCache::new(scope).context("create header cache directory")?;
        log::debug!("caching header rows under {}", cache.path().display());
        options = options.with_cache(CacheStrategy::OnDisk(cache));
    }

    match &cli.command {
        Command::Locate(args) => locate(args, &options),
        Command::Retrieve(args) => retrieve(args, &options),
    }
}

fn locate(args: &LocateArgs, options: &QueryOptions) -> Result<()> {
    let location = fuse_reader::locate_item(&args.item_id, &args.files, options)
        .with_context(|| format!("locate item `{}`", args.item_id))?;
    println!("{}\t{}", location.file.display(), location.row());
    Ok(())
}

fn retrieve(args: &RetrieveArgs, options: &QueryOptions) -> Result<()> {
    let (locations, retrievals) = load_spec(&args.spec)?;

    let (tx, rx) = crossbeam_channel::bounded(OUTPUT_QUEUE_CAPACITY);
    let (query, written) = thread::scope(|scope| {
        let query = scope.spawn(move || {
            fuse_reader::retrieve_fields(&args.files, &locations, &retrievals, Some(&tx), options)
        });
        let written = write_fields(rx);
        match query.join() {
            Ok(query) => (query, written),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    });

    query.context("retrieve fields")?;
    let written = written.context("write fields to stdout")?;
    log::info!("wrote {written} field(s)");
    Ok(())
}

fn load_spec(path: &Path) -> Result<(Vec<FieldLocation>, Vec<FieldRetrieval>)> {
    let text =
        fs::read_to_string(path).with_context(|| format!("read spec file {}", path.display()))?;
    let spec: SpecFile = serde_json::from_str(&text)
        .with_context(|| format!("parse spec file {}", path.display()))?;

    let locations = spec
        .locations
        .into_iter()
        .map(|entry| {
            FieldLocation::new(
                entry.id,
                entry.header.into(),
                entry.rule.into_matcher(entry.on_match),
            )
        })
        .collect();
    let retrievals = spec
        .retrievals
        .into_iter()
        .map(|entry| {
            FieldRetrieval::new(
                entry.id,
                entry.header.into(),
                entry.rule.into_matcher(entry.on_match),
                entry.offsets,
            )
        })
        .collect();
    Ok((locations, retrievals))
}

/// Drains `fields` to stdout as JSON lines. Keeps draining after a write
/// failure so the query never blocks on a full queue; a closed stdout is not
/// an error.
fn write_fields(fields: Receiver<ResultField>) -> io::Result<usize> {
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    let mut failure: Option<io::Error> = None;
    let mut written = 0;

    for field in fields {
        if failure.is_some() {
            continue;
        }
        let line = serde_json::to_writer(&mut out, &FieldLine::from(&field))
            .map_err(io::Error::from)
            .and_then(|()| out.write_all(b"\n"));
        match line {
            Ok(()) => written += 1,
            Err(err) => failure = Some(err),
        }
    }
    if failure.is_none() {
        failure = out.flush().err();
    }

    match failure {
        Some(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(written),
        Some(err) => Err(err),
        None => Ok(written),
    }
}
