//! CLI argument parsing and command handlers

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::cleaner::Cleaner;
use crate::config::Config;
use crate::models::{MediaId, SortColumn, SortDirection, SortOrder};
use crate::output;
use crate::resolver::IdentityResolver;
use crate::search;
use crate::store::{RecordStore, MEDIA_DB, STORE_DIR};

/// Mediadex: stable identifiers and tag search for a media library
#[derive(Parser, Debug)]
#[command(
    name = "mdx",
    version,
    about = "Stable content-derived ids and tag search for a media library",
    long_about = "Mediadex maps every file in a media library to an identifier derived \
                  from its content, so tags survive renames, moves and edits. Tags and \
                  paths are searched with a small boolean query language.\n\n\
                  The store lives in <LIBRARY>/.mediadex/media.db."
)]
pub struct Cli {
    /// Enable verbose logging (can be repeated for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Library root holding the .mediadex/ store
    #[arg(short = 'L', long, global = true, default_value = ".")]
    pub library: PathBuf,

    /// Database file to use instead of <LIBRARY>/.mediadex/media.db
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Config file to use instead of the discovered config.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve every file under a directory and flag vanished ones
    Scan {
        /// Directory to scan (defaults to the library root)
        #[arg(value_name = "DIR")]
        path: Option<PathBuf>,

        /// Suppress progress bar and summary
        #[arg(short, long)]
        quiet: bool,
    },

    /// Print the identifier of each file
    Resolve {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Output format as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search by tags and filenames
    ///
    /// Terms:
    ///   f~x   -f~x    path contains / does not contain x
    ///   t~x   -t~x    a tag contains / no tag contains x
    ///   t=x   -t=x    a tag equals / no tag equals x
    ///   t<N   t>N     fewer than / more than N tags
    ///   dupes>N       content present at more than N+1 paths
    ///   x             path or tag contains x
    ///
    /// Join terms with AND / OR (upper case) and group with ( ). Terms
    /// without an operator are AND-ed. `^` and `$` anchor f~ and t~,
    /// `*` is a wildcard, quotes keep whitespace.
    ///
    /// Examples:
    ///   mdx search 't=foo AND ( f~bar OR -t~baz )'
    ///   mdx search 'f~.mkv$ t<1' --sort-by modified --order desc
    Search {
        /// Query string
        query: String,

        /// Maximum number of results (defaults to config search.default_limit)
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Skip this many results (for paging)
        #[arg(short, long, default_value_t = 0)]
        offset: usize,

        /// Return every match, ignoring --limit
        #[arg(short, long)]
        all: bool,

        /// Sort columns: file, file-size, modified (comma separated)
        #[arg(long, value_delimiter = ',')]
        sort_by: Vec<SortColumn>,

        /// One direction per sort column: asc, desc (comma separated)
        #[arg(long, value_delimiter = ',')]
        order: Vec<SortDirection>,

        /// Include each result's tags
        #[arg(short, long)]
        tags: bool,

        /// Output format as JSON
        #[arg(long)]
        json: bool,

        /// Pretty-print JSON output (only with --json)
        #[arg(long)]
        pretty: bool,
    },

    /// Count tags across the results of a query
    Tags {
        /// Query string (empty matches everything)
        #[arg(default_value = "")]
        query: String,

        #[arg(short = 'n', long)]
        limit: Option<usize>,

        #[arg(short, long, default_value_t = 0)]
        offset: usize,

        #[arg(long)]
        json: bool,

        #[arg(long)]
        pretty: bool,
    },

    /// Add, remove or list the tags of a file
    Tag {
        #[command(subcommand)]
        command: TagCommand,
    },

    /// Flag stored files that no longer exist on disk
    Clean {
        #[arg(long)]
        json: bool,
    },

    /// Show store statistics
    Stats {
        #[arg(long)]
        json: bool,

        #[arg(long)]
        pretty: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum TagCommand {
    /// Attach tags to a file's identifier
    Add {
        file: PathBuf,
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// Remove tags from a file's identifier
    Rm {
        file: PathBuf,
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// List the tags of a file's identifier
    List {
        file: PathBuf,

        /// Include deleted tags
        #[arg(long)]
        deleted: bool,

        #[arg(long)]
        json: bool,
    },
}

/// Store plus settings, opened once per command
struct Session {
    library: PathBuf,
    store: RecordStore,
    config: Config,
}

impl Session {
    fn resolver(&self) -> IdentityResolver {
        IdentityResolver::with_store(self.store.clone()).with_config(&self.config.resolver)
    }
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        let log_level = match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        // Already set when execute runs more than once in a process (tests)
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
            .try_init();

        let ctx = self.open_session()?;

        match self.command {
            Command::Scan { path, quiet } => {
                let root = path.unwrap_or_else(|| ctx.library.clone());
                handle_scan(&ctx, &root, quiet)
            }
            Command::Resolve { files, json } => handle_resolve(&ctx, &files, json),
            Command::Search { query, limit, offset, all, sort_by, order, tags, json, pretty } => {
                let limit = if all { None } else { Some(limit.unwrap_or(ctx.config.search.default_limit)) };
                handle_search(&ctx, &query, limit, offset, &sort_by, &order, tags, json, pretty)
            }
            Command::Tags { query, limit, offset, json, pretty } => {
                handle_tags(&ctx, &query, limit, offset, json, pretty)
            }
            Command::Tag { command } => match command {
                TagCommand::Add { file, tags } => handle_tag_edit(&ctx, &file, &tags, false),
                TagCommand::Rm { file, tags } => handle_tag_edit(&ctx, &file, &tags, true),
                TagCommand::List { file, deleted, json } => handle_tag_list(&ctx, &file, deleted, json),
            },
            Command::Clean { json } => handle_clean(&ctx, json),
            Command::Stats { json, pretty } => handle_stats(&ctx, json, pretty),
        }
    }

    fn open_session(&self) -> Result<Session> {
        let db_path = self
            .db
            .clone()
            .unwrap_or_else(|| self.library.join(STORE_DIR).join(MEDIA_DB));
        let db_path = std::path::absolute(&db_path)
            .with_context(|| format!("Invalid database path {}", db_path.display()))?;
        let store_dir = db_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.library.join(STORE_DIR));

        let config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::discover(&store_dir)?,
        };

        let store = RecordStore::open_with_timeout(&db_path, config.store.busy_timeout())
            .with_context(|| format!("Failed to open store at {}", db_path.display()))?;

        Ok(Session {
            library: self.library.clone(),
            store,
            config,
        })
    }
}

/// Print a value as JSON, compact or pretty
fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json_str = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", json_str);
    Ok(())
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Whether `path` is the database or one of its `-wal`/`-shm` companions
fn is_store_file(path: &Path, db_path: &Path) -> bool {
    let (Some(name), Some(db_name)) = (path.file_name(), db_path.file_name()) else {
        return false;
    };
    path.parent() == db_path.parent()
        && name.to_string_lossy().starts_with(db_name.to_string_lossy().as_ref())
}

/// Regular files under `root`, skipping store directories and the database
fn discover_files(root: &Path, db_path: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let walker = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.file_name() != STORE_DIR && !is_store_file(e.path(), db_path));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    files
}

fn handle_scan(ctx: &Session, root: &Path, quiet: bool) -> Result<()> {
    log::info!("Scanning {}", root.display());
    let start = Instant::now();

    let root = std::path::absolute(root)
        .with_context(|| format!("Invalid scan root {}", root.display()))?;
    let files = discover_files(&root, ctx.store.path());
    log::info!("Discovered {} files", files.len());
    if files.is_empty() && !quiet {
        output::info(&format!("No files found under {}.", root.display()));
    }

    let pb = if quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(files.len() as u64);
        pb.set_draw_target(ProgressDrawTarget::stderr());
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({percent}%)")
                .context("Invalid progress template")?
                .progress_chars("=>-"),
        );
        pb
    };

    let resolver = ctx.resolver();
    let results: Vec<(PathBuf, crate::error::Result<MediaId>)> = files
        .par_iter()
        .map(|path| {
            let result = resolver.resolve_file(path);
            pb.inc(1);
            (path.clone(), result)
        })
        .collect();
    pb.finish_and_clear();

    let mut ids = std::collections::HashSet::new();
    let mut failed = 0;
    for (path, result) in results {
        match result {
            Ok(id) => {
                ids.insert(id);
            }
            Err(e) => {
                log::warn!("Failed to resolve {}: {}", path.display(), e);
                failed += 1;
            }
        }
    }

    let marked_missing = Cleaner::new(&ctx.store).mark_missing_files()?;

    if !quiet {
        if failed > 0 {
            output::warn(&format!("{} files could not be read and were skipped.", failed));
        }
        println!("Scan complete!");
        println!("  Files resolved:  {}", files.len() - failed);
        println!("  Failed:          {}", failed);
        println!("  Distinct ids:    {}", ids.len());
        println!("  Marked missing:  {}", marked_missing);
        println!("  Duration:        {}ms", start.elapsed().as_millis());
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct Resolved {
    path: String,
    id: MediaId,
}

fn handle_resolve(ctx: &Session, files: &[PathBuf], json: bool) -> Result<()> {
    let resolver = ctx.resolver();
    let mut resolved = Vec::with_capacity(files.len());
    for file in files {
        let id = resolver
            .resolve_file(file)
            .with_context(|| format!("Failed to resolve {}", file.display()))?;
        resolved.push(Resolved {
            path: file.display().to_string(),
            id,
        });
    }

    if json {
        return print_json(&resolved, false);
    }
    for r in &resolved {
        println!("{}  {}", r.id, r.path);
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct SearchHit {
    id: MediaId,
    paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<Vec<String>>,
}

#[allow(clippy::too_many_arguments)]
fn handle_search(
    ctx: &Session,
    query: &str,
    limit: Option<usize>,
    offset: usize,
    sort_by: &[SortColumn],
    order: &[SortDirection],
    with_tags: bool,
    json: bool,
    pretty: bool,
) -> Result<()> {
    let sorts = if sort_by.is_empty() && order.is_empty() {
        Vec::new()
    } else {
        SortOrder::zip(sort_by, order)?
    };

    let compiled = search::compile(query);
    log::info!("Searching {:?}", compiled.terms());
    let ids = compiled.execute_sorted(&ctx.store, &sorts, limit, offset)?;

    let mut hits = Vec::with_capacity(ids.len());
    for id in ids {
        let paths = ctx.store.live_paths_for_id(&id)?;
        let tags = if with_tags {
            Some(ctx.store.get_tags(&id, false)?.into_iter().map(|t| t.tag).collect())
        } else {
            None
        };
        hits.push(SearchHit { id, paths, tags });
    }

    if json {
        return print_json(&hits, pretty);
    }

    if hits.is_empty() {
        println!("No matches.");
        return Ok(());
    }
    for hit in &hits {
        println!("{}", hit.id);
        for path in &hit.paths {
            println!("  {}", path);
        }
        if let Some(tags) = &hit.tags {
            if !tags.is_empty() {
                println!("  tags: {}", tags.join(", "));
            }
        }
    }
    Ok(())
}

fn handle_tags(
    ctx: &Session,
    query: &str,
    limit: Option<usize>,
    offset: usize,
    json: bool,
    pretty: bool,
) -> Result<()> {
    let frequencies = search::compile(query).tag_frequencies(&ctx.store, limit, offset)?;

    if json {
        return print_json(&frequencies, pretty);
    }
    if frequencies.is_empty() {
        println!("No tags.");
        return Ok(());
    }
    let width = frequencies.iter().map(|f| f.count.to_string().len()).max().unwrap_or(1);
    for f in &frequencies {
        println!("{:>width$}  {}", f.count, f.tag, width = width);
    }
    Ok(())
}

fn handle_tag_edit(ctx: &Session, file: &Path, tags: &[String], delete: bool) -> Result<()> {
    let id = ctx
        .resolver()
        .resolve_file(file)
        .with_context(|| format!("Failed to resolve {}", file.display()))?;
    let modified = now_millis();

    for tag in tags {
        let tag = tag.trim();
        if tag.is_empty() {
            continue;
        }
        let changed = if delete {
            ctx.store.set_tag_deleted(&id, tag, true, modified)?
        } else {
            ctx.store.add_tag(&id, tag, modified)?
        };
        match (delete, changed) {
            (false, true) => println!("+ {}", tag),
            (false, false) => println!("  {} (already tagged)", tag),
            (true, true) => println!("- {}", tag),
            (true, false) => println!("  {} (not changed)", tag),
        }
    }
    Ok(())
}

fn handle_tag_list(ctx: &Session, file: &Path, include_deleted: bool, json: bool) -> Result<()> {
    let id = ctx
        .resolver()
        .resolve_file(file)
        .with_context(|| format!("Failed to resolve {}", file.display()))?;
    let tags = ctx.store.get_tags(&id, include_deleted)?;

    if json {
        return print_json(&tags, false);
    }
    for tag in &tags {
        if tag.deleted {
            println!("{} (deleted)", tag.tag);
        } else {
            println!("{}", tag.tag);
        }
    }
    Ok(())
}

fn handle_clean(ctx: &Session, json: bool) -> Result<()> {
    log::info!("Flagging missing files");
    let marked = Cleaner::new(&ctx.store).mark_missing_files()?;

    if json {
        return print_json(&serde_json::json!({ "marked_missing": marked }), false);
    }
    println!("Marked {} missing files.", marked);
    Ok(())
}

fn handle_stats(ctx: &Session, json: bool, pretty: bool) -> Result<()> {
    let stats = ctx.store.stats()?;

    if json {
        return print_json(&stats, pretty);
    }
    println!("Mediadex Store Statistics");
    println!("=========================");
    println!("Store:           {}", ctx.store.path().display());
    println!("Files:           {}", stats.files);
    println!("Missing files:   {}", stats.missing_files);
    println!("Distinct hashes: {}", stats.distinct_hashes);
    println!("Canonical ids:   {}", stats.canonical_ids);
    println!("Live tags:       {}", stats.live_tags);
    Ok(())
}
