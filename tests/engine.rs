//! End-to-end tests for the library: scan a notes tree, query it, write
//! mutations back, and check the index and the files agree.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use chrono::{Datelike, NaiveDate, Weekday};
use pretty_assertions::assert_eq;
use quire::io::fingerprint::content_hash;
use quire::model::config::{EngineConfig, RootConfig};
use quire::model::item::ItemStatus;
use quire::ops::scan::{ScanMode, Scanner};
use quire::ops::search::{Retriever, SearchMode, SearchOptions};
use quire::ops::sync::{Mutation, SyncWriter};
use quire::store::{DocumentQuery, IndexStore, ItemQuery};
use tempfile::TempDir;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

fn write(root: &Path, rel: &str, text: &str) {
    let p = root.join("notes").join(rel);
    fs::create_dir_all(p.parent().unwrap()).unwrap();
    fs::write(p, text).unwrap();
}

fn config_for(root: &Path) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.index.path = root.join(".quire/index.db");
    config.roots = vec![RootConfig {
        notebook: Some("home".into()),
        ..RootConfig::new(root.join("notes"))
    }];
    config
}

fn scan(config: &EngineConfig, store: &mut IndexStore) -> quire::ops::scan::ScanReport {
    Scanner::new(config)
        .unwrap()
        .with_today(today())
        .scan(store, ScanMode::Incremental)
        .unwrap()
}

fn three_files(root: &Path) {
    write(
        root,
        "todo.md",
        "# Todo\n\n- [ ] buy milk @due(friday) #errand\n- [ ] call plumber\n",
    );
    write(
        root,
        "journal/2026-10-18.md",
        "# Sunday\n\nWalked to the market, forgot the milk again.\n",
    );
    write(
        root,
        "ideas.md",
        "---\ntitle: Ideas\ntags: [someday]\n---\n\nSee [[todo]] for errands.\n",
    );
}

#[test]
fn test_buy_milk_round_trip() {
    let tmp = TempDir::new().unwrap();
    three_files(tmp.path());
    let config = config_for(tmp.path());
    let mut store = IndexStore::open(&config.index.path).unwrap();

    let report = scan(&config, &mut store);
    assert_eq!(report.indexed.len(), 3);
    assert!(report.errors.is_empty());

    let errands = store
        .items(&ItemQuery {
            tag: Some("errand".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(errands.len(), 1);
    let milk = &errands[0];
    assert_eq!(milk.text, "buy milk");
    assert_eq!(milk.status, ItemStatus::Pending);
    let due = milk.due.unwrap();
    assert_eq!(due, NaiveDate::from_ymd_opt(2026, 10, 23).unwrap());
    assert_eq!(due.weekday(), Weekday::Fri);

    let writer = SyncWriter::new(&config, tmp.path().join(".quire")).with_today(today());
    let outcome = writer
        .apply(&mut store, &milk.id, Mutation::SetStatus(ItemStatus::Completed))
        .unwrap();
    assert_eq!(outcome.item_id, milk.id);
    assert_eq!(outcome.status, Some(ItemStatus::Completed));

    let text = fs::read_to_string(tmp.path().join("notes/todo.md")).unwrap();
    assert_eq!(
        text,
        "# Todo\n\n- [x] buy milk @due(friday) #errand\n- [ ] call plumber\n"
    );

    let item = store.item(&milk.id).unwrap().unwrap();
    assert_eq!(item.status, ItemStatus::Completed);
    let (_, fp) = store.fingerprint("home", "todo.md").unwrap().unwrap();
    assert_eq!(fp.content_hash, content_hash(text.as_bytes()));

    // The write was recorded; a scan right after has nothing to do
    let again = scan(&config, &mut store);
    assert!(again.indexed.is_empty());
}

#[test]
fn test_search_finds_documents_across_notebooks() {
    let tmp = TempDir::new().unwrap();
    three_files(tmp.path());
    let config = config_for(tmp.path());
    let mut store = IndexStore::open_in_memory().unwrap();
    scan(&config, &mut store);

    let opts = SearchOptions::default()
        .with_mode(SearchMode::Lexical)
        .with_today(today());
    let results = Retriever::new(&store)
        .search("milk", &DocumentQuery::default(), &opts)
        .unwrap();
    let mut hits: Vec<String> = results
        .hits
        .iter()
        .map(|h| h.document.doc_ref().to_string())
        .collect();
    hits.sort();
    assert_eq!(hits, vec!["home:todo.md", "journal:2026-10-18.md"]);

    let journal_only = Retriever::new(&store)
        .search(
            "milk",
            &DocumentQuery {
                notebook: Some("journal".into()),
                ..Default::default()
            },
            &opts,
        )
        .unwrap();
    assert_eq!(journal_only.hits.len(), 1);
    assert_eq!(
        journal_only.hits[0].document.date,
        NaiveDate::from_ymd_opt(2026, 10, 18)
    );
}

#[test]
fn test_backlinks_resolve_by_stem() {
    let tmp = TempDir::new().unwrap();
    three_files(tmp.path());
    let config = config_for(tmp.path());
    let mut store = IndexStore::open_in_memory().unwrap();
    scan(&config, &mut store);

    let todo = store.document_by_ref("home", "todo.md").unwrap().unwrap();
    let back = store.backlinks(&todo).unwrap();
    assert_eq!(back.len(), 1);
    assert_eq!(back[0].source.path, "ideas.md");
    assert_eq!(back[0].source_title, "Ideas");
}

#[test]
fn test_deleted_file_disappears_from_queries() {
    let tmp = TempDir::new().unwrap();
    three_files(tmp.path());
    let config = config_for(tmp.path());
    let mut store = IndexStore::open_in_memory().unwrap();
    scan(&config, &mut store);

    fs::remove_file(tmp.path().join("notes/todo.md")).unwrap();
    let report = scan(&config, &mut store);
    assert_eq!(report.removed.len(), 1);

    let items = store.items(&ItemQuery::default()).unwrap();
    assert!(items.is_empty());
    let results = Retriever::new(&store)
        .search(
            "plumber",
            &DocumentQuery::default(),
            &SearchOptions::default().with_mode(SearchMode::Lexical),
        )
        .unwrap();
    assert!(results.hits.is_empty());
}

#[test]
fn test_rescan_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    three_files(tmp.path());
    let config = config_for(tmp.path());
    let mut store = IndexStore::open_in_memory().unwrap();
    scan(&config, &mut store);
    let before = store.items(&ItemQuery::default()).unwrap();
    let stats = store.stats().unwrap();

    let report = scan(&config, &mut store);
    assert!(report.indexed.is_empty());
    assert_eq!(report.unchanged, 3);
    assert_eq!(store.items(&ItemQuery::default()).unwrap(), before);
    assert_eq!(store.stats().unwrap(), stats);
}

#[test]
fn test_touch_without_edit_keeps_item_ids() {
    let tmp = TempDir::new().unwrap();
    three_files(tmp.path());
    let config = config_for(tmp.path());
    let mut store = IndexStore::open_in_memory().unwrap();
    scan(&config, &mut store);
    let before = store.items(&ItemQuery::default()).unwrap();

    let file = fs::File::options()
        .write(true)
        .open(tmp.path().join("notes/todo.md"))
        .unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(60))
        .unwrap();

    let report = scan(&config, &mut store);
    assert!(report.indexed.is_empty());
    assert_eq!(report.touched, 1);
    assert_eq!(store.items(&ItemQuery::default()).unwrap(), before);
}

#[test]
fn test_full_rebuild_matches_incremental_index() {
    let tmp = TempDir::new().unwrap();
    three_files(tmp.path());
    let config = config_for(tmp.path());

    let mut incremental = IndexStore::open_in_memory().unwrap();
    scan(&config, &mut incremental);

    let mut rebuilt = IndexStore::open_in_memory().unwrap();
    Scanner::new(&config)
        .unwrap()
        .with_today(today())
        .scan(&mut rebuilt, ScanMode::Full)
        .unwrap();

    assert_eq!(
        incremental.items(&ItemQuery::default()).unwrap(),
        rebuilt.items(&ItemQuery::default()).unwrap()
    );
    assert_eq!(incremental.tag_counts().unwrap(), rebuilt.tag_counts().unwrap());
}

#[test]
fn test_writer_targets_the_indexed_item_among_lookalikes() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "week.md",
        "## Monday\n- [ ] standup\n\n## Tuesday\n- [ ] standup\n  - [ ] notes\nprose\n- [ ] standup\n",
    );
    let config = config_for(tmp.path());
    let mut store = IndexStore::open_in_memory().unwrap();
    scan(&config, &mut store);

    let items = store.items(&ItemQuery::default()).unwrap();
    let tuesday: Vec<_> = items
        .iter()
        .filter(|i| i.text == "standup" && i.section.as_deref() == Some("Tuesday"))
        .collect();
    assert_eq!(tuesday.len(), 2);
    let first = tuesday[0].id.clone();

    write(
        tmp.path(),
        "week.md",
        "## Monday\n- [ ] standup\n- [ ] retro\n\n## Tuesday\n- [ ] standup\n  - [ ] notes\nprose\n- [ ] standup\n",
    );
    let writer = SyncWriter::new(&config, tmp.path().join(".quire")).with_today(today());
    let outcome = writer
        .apply(&mut store, &first, Mutation::SetStatus(ItemStatus::Completed))
        .unwrap();
    assert_eq!(outcome.item_id, first);
    assert_eq!(outcome.cascaded, 1);
    assert_eq!(
        fs::read_to_string(tmp.path().join("notes/week.md")).unwrap(),
        "## Monday\n- [ ] standup\n- [ ] retro\n\n## Tuesday\n- [x] standup\n  - [x] notes\nprose\n- [ ] standup\n"
    );

    let again = scan(&config, &mut store);
    assert!(again.indexed.is_empty());
    assert!(again.errors.is_empty());
}
