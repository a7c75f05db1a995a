mod init;
pub use init::cmd_init;

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, Utc};

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::io::config_io::{self, Workspace};
use crate::io::recovery;
use crate::io::watcher::NotesWatcher;
use crate::model::config::{RootConfig, RootKind};
use crate::model::document::DocRef;
use crate::model::item::ItemStatus;
use crate::ops::embed::backend_from_config;
use crate::ops::scan::{ScanMode, Scanner};
use crate::ops::search::{Retriever, SearchMode, SearchOptions};
use crate::ops::sync::{Mutation, SyncWriter};
use crate::parse::dates::resolve_date_expr;
use crate::store::{DocumentQuery, IndexStore, ItemQuery};

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Where the command runs and how it prints
struct Ctx {
    start: PathBuf,
    json: bool,
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli) -> CmdResult {
    let start = match &cli.dir {
        Some(dir) => std::fs::canonicalize(dir)
            .map_err(|e| format!("cannot resolve -C path '{}': {}", dir, e))?,
        None => std::env::current_dir()?,
    };
    let ctx = Ctx {
        start,
        json: cli.json,
    };

    match cli.command {
        Commands::Init(args) => cmd_init(&ctx.start, args),
        Commands::Roots(args) => cmd_roots(&ctx, args),
        Commands::Scan(args) => cmd_scan(&ctx, args),

        // Read commands
        Commands::Search(args) => cmd_search(&ctx, args),
        Commands::Items(args) => cmd_items(&ctx, args),
        Commands::Show(args) => cmd_show(&ctx, args),
        Commands::Links(args) => cmd_links(&ctx, args),
        Commands::Tags => cmd_tags(&ctx),
        Commands::Stats => cmd_stats(&ctx),

        // Write commands
        Commands::Done(args) => cmd_mutate(&ctx, &args.id, Mutation::SetStatus(ItemStatus::Completed), "done"),
        Commands::Start(args) => cmd_mutate(&ctx, &args.id, Mutation::SetStatus(ItemStatus::InProgress), "started"),
        Commands::Reopen(args) => cmd_mutate(&ctx, &args.id, Mutation::SetStatus(ItemStatus::Pending), "reopened"),
        Commands::Toggle(args) => cmd_mutate(&ctx, &args.id, Mutation::Toggle, "toggled"),
        Commands::Due(args) => {
            let due = if args.date.eq_ignore_ascii_case("none") {
                None
            } else {
                Some(parse_date_arg(&args.date)?)
            };
            cmd_mutate(&ctx, &args.id, Mutation::SetDue(due), "updated")
        }
        Commands::Priority(args) => {
            let priority = parse_priority_arg(&args.level)?;
            cmd_mutate(&ctx, &args.id, Mutation::SetPriority(priority), "updated")
        }
        Commands::Rm(args) => cmd_mutate(&ctx, &args.id, Mutation::Delete, "deleted"),
        Commands::Mv(args) => {
            let target = DocRef {
                notebook: args.notebook,
                path: args.path,
            };
            cmd_mutate(&ctx, &args.id, Mutation::MoveTo(target), "moved")
        }

        Commands::Watch(args) => cmd_watch(&ctx, args),
        Commands::Recovery(args) => cmd_recovery(&ctx, args),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_workspace(ctx: &Ctx) -> Result<Workspace, config_io::ConfigError> {
    let path = config_io::discover_config(&ctx.start)?;
    config_io::load_config(&path)
}

fn open_store(ws: &Workspace) -> Result<IndexStore, crate::store::StoreError> {
    IndexStore::open(ws.index_path())
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn parse_date_arg(s: &str) -> Result<NaiveDate, String> {
    resolve_date_expr(s, today()).ok_or_else(|| format!("could not understand date '{}'", s))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}

// ---------------------------------------------------------------------------
// Setup commands
// ---------------------------------------------------------------------------

fn cmd_roots(ctx: &Ctx, args: RootsCmd) -> CmdResult {
    match args.action {
        None | Some(RootsAction::List) => {
            let ws = load_workspace(ctx)?;
            if ctx.json {
                let roots: Vec<RootJson> = ws
                    .config
                    .roots
                    .iter()
                    .map(|r| RootJson {
                        root: r,
                        notebook_name: r.notebook_name(),
                        exists: r.path.exists(),
                    })
                    .collect();
                return print_json(&roots);
            }
            for root in &ws.config.roots {
                let mut flags = vec![root.kind.as_str()];
                if !root.recursive {
                    flags.push("flat");
                }
                if root.exclude_from_retrieval {
                    flags.push("excluded");
                }
                if root.read_only {
                    flags.push("read-only");
                }
                if !root.path.exists() {
                    flags.push("missing");
                }
                println!(
                    "{}  {} [{}]",
                    root.notebook_name(),
                    root.path.display(),
                    flags.join(", ")
                );
            }
            Ok(())
        }
        Some(RootsAction::Add(add)) => {
            let config_path = config_io::discover_config(&ctx.start)?;
            let kind = match add.kind.as_deref() {
                None | Some("internal") => RootKind::Internal,
                Some("external") => RootKind::External,
                Some("linked") => RootKind::Linked,
                Some(other) => {
                    return Err(format!(
                        "unknown root kind '{}' (expected: internal, external, linked)",
                        other
                    )
                    .into());
                }
            };
            let root = RootConfig {
                kind,
                notebook: add.notebook,
                recursive: !add.no_recursive,
                exclude_from_retrieval: add.exclude,
                read_only: add.read_only,
                ..RootConfig::new(&add.path)
            };
            config_io::add_root(&config_path, &root)?;
            println!("added root {}", add.path);
            Ok(())
        }
    }
}

fn cmd_scan(ctx: &Ctx, args: ScanArgs) -> CmdResult {
    let mut ws = load_workspace(ctx)?;
    if let Some(workers) = args.workers {
        ws.config.index.workers = workers.max(1);
    }
    let mut store = open_store(&ws)?;
    let backend = backend_from_config(&ws.config.embedding);

    let mut scanner = Scanner::new(&ws.config)?;
    if let Some(b) = backend.as_deref() {
        scanner = scanner.with_backend(b);
    }
    let mode = if args.full {
        ScanMode::Full
    } else {
        ScanMode::Incremental
    };
    let report = scanner.scan(&mut store, mode)?;

    if ctx.json {
        print_json(&report)
    } else {
        print_lines(&format_scan_report(&report));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Read commands
// ---------------------------------------------------------------------------

fn cmd_search(ctx: &Ctx, args: SearchArgs) -> CmdResult {
    let ws = load_workspace(ctx)?;
    let store = open_store(&ws)?;
    let backend = backend_from_config(&ws.config.embedding);

    let mut opts = SearchOptions::from_config(&ws.config.retrieval);
    if let Some(mode) = &args.mode {
        let mode = SearchMode::parse_mode(mode)
            .ok_or_else(|| format!("unknown mode '{}' (expected: lexical, vector, hybrid)", mode))?;
        opts = opts.with_mode(mode);
    }
    if let Some(limit) = args.limit {
        opts = opts.with_limit(limit);
    }
    if let Some(days) = args.recency {
        if days <= 0.0 {
            return Err("--recency must be positive".into());
        }
        opts = opts.with_recency(days);
    }
    if let Some(min) = args.min_score {
        opts = opts.with_min_score(min);
    }
    let filters = DocumentQuery {
        notebook: args.notebook,
        tag: args.tag,
        date_from: args.from.as_deref().map(parse_date_arg).transpose()?,
        date_to: args.to.as_deref().map(parse_date_arg).transpose()?,
        include_excluded: args.all,
    };

    let mut retriever = Retriever::new(&store);
    if let Some(b) = backend.as_deref() {
        retriever = retriever.with_backend(b);
    }
    let results = retriever.search(&args.query, &filters, &opts)?;

    if ctx.json {
        return print_json(&results);
    }
    if results.degraded && opts.mode != SearchMode::Lexical {
        eprintln!("note: vector search unavailable, showing lexical results");
    }
    if results.hits.is_empty() {
        println!("no results");
    }
    for (i, hit) in results.hits.iter().enumerate() {
        print_lines(&format_search_hit(i + 1, hit));
    }
    Ok(())
}

fn cmd_items(ctx: &Ctx, args: ItemsArgs) -> CmdResult {
    let ws = load_workspace(ctx)?;
    let store = open_store(&ws)?;
    let query = ItemQuery {
        status: args.status.as_deref().map(parse_status_arg).transpose()?,
        tag: args.tag,
        notebook: args.notebook,
        due_before: args.due_before.as_deref().map(parse_date_arg).transpose()?,
        overdue_as_of: args.overdue.then(today),
        text: args.text,
        limit: args.limit,
        ..Default::default()
    };
    let items = store.items(&query)?;
    if ctx.json {
        print_json(&items)
    } else {
        print_lines(&format_item_listing(&items));
        Ok(())
    }
}

fn cmd_show(ctx: &Ctx, args: IdArg) -> CmdResult {
    let ws = load_workspace(ctx)?;
    let store = open_store(&ws)?;
    let item = store
        .item(&args.id)?
        .ok_or_else(|| format!("item not found: {}", args.id))?;
    let children = store.descendants(&args.id)?;
    if ctx.json {
        print_json(&ItemDetailJson {
            item: &item,
            children: &children,
        })
    } else {
        print_lines(&format_item_detail(&item, &children));
        Ok(())
    }
}

fn cmd_links(ctx: &Ctx, args: LinksArgs) -> CmdResult {
    let ws = load_workspace(ctx)?;
    let store = open_store(&ws)?;
    let doc = store
        .document_by_ref(&args.notebook, &args.path)?
        .ok_or_else(|| format!("document not found: {}:{}", args.notebook, args.path))?;
    let outgoing = store.links_from(doc.id)?;
    let backlinks = store.backlinks(&doc)?;
    if ctx.json {
        return print_json(&LinksJson {
            outgoing: &outgoing,
            backlinks: &backlinks,
        });
    }
    println!("{} ({})", doc.title, doc.doc_ref());
    for link in &outgoing {
        let label = link.label.as_deref().map(|l| format!(" \"{}\"", l)).unwrap_or_default();
        println!("  -> {}{} (line {})", link.target, label, link.line);
    }
    for link in &backlinks {
        println!("{}", format_backlink(link));
    }
    Ok(())
}

fn cmd_tags(ctx: &Ctx) -> CmdResult {
    let ws = load_workspace(ctx)?;
    let store = open_store(&ws)?;
    let tags = store.tag_counts()?;
    if ctx.json {
        print_json(&tags)
    } else {
        print_lines(&format_tag_counts(&tags));
        Ok(())
    }
}

fn cmd_stats(ctx: &Ctx) -> CmdResult {
    let ws = load_workspace(ctx)?;
    let store = open_store(&ws)?;
    let stats = store.stats()?;
    if ctx.json {
        print_json(&stats)
    } else {
        print_lines(&format_stats(&stats));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Write commands
// ---------------------------------------------------------------------------

fn cmd_mutate(ctx: &Ctx, id: &str, mutation: Mutation, verb: &str) -> CmdResult {
    let ws = load_workspace(ctx)?;
    let mut store = open_store(&ws)?;
    let writer = SyncWriter::new(&ws.config, ws.index_dir());
    let outcome = writer.apply(&mut store, id, mutation)?;
    if ctx.json {
        print_json(&outcome)
    } else {
        println!("{}", format_outcome(verb, &outcome));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Watch
// ---------------------------------------------------------------------------

fn cmd_watch(ctx: &Ctx, args: WatchArgs) -> CmdResult {
    let ws = load_workspace(ctx)?;
    let mut store = open_store(&ws)?;
    let backend = backend_from_config(&ws.config.embedding);
    let mut scanner = Scanner::new(&ws.config)?;
    if let Some(b) = backend.as_deref() {
        scanner = scanner.with_backend(b);
    }

    // Catch up before watching so the first batch starts from a fresh index
    let report = scanner.scan(&mut store, ScanMode::Incremental)?;
    print_lines(&format_scan_report(&report));

    let roots: Vec<(PathBuf, bool)> = ws
        .config
        .roots
        .iter()
        .filter(|r| r.path.exists())
        .map(|r| (r.path.clone(), r.recursive))
        .collect();
    let watcher = NotesWatcher::start(&roots, ws.config.scan.extensions.clone(), ws.index_dir())?;
    eprintln!("watching {} roots (ctrl-c to stop)", roots.len());

    let debounce = Duration::from_millis(args.debounce_ms);
    while let Some(paths) = watcher.wait(debounce) {
        let report = scanner.sync_paths(&mut store, &paths)?;
        if report.indexed.is_empty() && report.removed.is_empty() && report.errors.is_empty() {
            continue;
        }
        if ctx.json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            print_lines(&format_scan_report(&report));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Recovery log
// ---------------------------------------------------------------------------

fn cmd_recovery(ctx: &Ctx, args: RecoveryCmd) -> CmdResult {
    let ws = load_workspace(ctx)?;
    let index_dir = ws.index_dir();
    match args.action {
        Some(RecoveryAction::Path) => {
            println!("{}", recovery::recovery_log_path(&index_dir).display());
            Ok(())
        }
        Some(RecoveryAction::Prune(prune)) => {
            let before = if prune.all {
                Some(Utc::now() + chrono::Duration::seconds(1))
            } else {
                prune.before.as_deref().map(parse_timestamp).transpose()?
            };
            let removed = recovery::prune_recovery(&index_dir, before)?;
            println!("pruned {} entries", removed);
            Ok(())
        }
        None => {
            let entries = recovery::read_recovery_entries(&index_dir, Some(args.limit.unwrap_or(10)));
            if ctx.json {
                let values: Vec<serde_json::Value> = entries.iter().map(|e| e.to_json()).collect();
                return print_json(&values);
            }
            if entries.is_empty() {
                println!("recovery log is empty");
            }
            for (i, entry) in entries.iter().enumerate() {
                if i > 0 {
                    println!();
                }
                print_lines(&format_recovery_entry(entry));
            }
            Ok(())
        }
    }
}

/// RFC 3339 timestamp or a plain `YYYY-MM-DD` (midnight UTC)
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("invalid timestamp '{}' (expected RFC 3339 or YYYY-MM-DD)", s))
}

