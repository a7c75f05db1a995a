//! Integration tests for the `qr` CLI.
//!
//! Each test creates a temp workspace, runs `qr` as a subprocess,
//! and verifies stdout and/or file contents.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Get the path to the built `qr` binary.
fn qr_bin() -> PathBuf {
    // cargo test builds to target/debug/
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("qr");
    path
}

/// Create a workspace with one internal root and a few notes.
fn create_test_workspace(root: &Path) {
    fs::write(
        root.join("quire.toml"),
        r#"[index]
path = ".quire/index.db"

[[roots]]
path = "notes"
notebook = "home"

[embedding]
provider = "hashing"
"#,
    )
    .unwrap();

    let notes = root.join("notes");
    fs::create_dir_all(notes.join("work")).unwrap();
    fs::write(
        notes.join("todo.md"),
        "\
# Todo

- [ ] buy milk @due(2026-10-23) #errand
- [ ] plan trip #travel
  - [ ] book flights
  - [ ] pack bags
",
    )
    .unwrap();
    fs::write(
        notes.join("work/standup.md"),
        "\
---
title: Standup
tags: [meeting]
---

Discussed the migration plan. See [[todo]].

- [/] write migration script !!
",
    )
    .unwrap();
}

/// Run `qr` with the given args in the given directory, returning (stdout, stderr, success).
fn run_qr(dir: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(qr_bin())
        .args(args)
        .current_dir(dir)
        .env_remove("QUIRE_LOG")
        .output()
        .expect("failed to run qr");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Run `qr` expecting success, return stdout.
fn run_qr_ok(dir: &Path, args: &[&str]) -> String {
    let (stdout, stderr, success) = run_qr(dir, args);
    if !success {
        panic!(
            "qr {:?} failed:\nstdout: {}\nstderr: {}",
            args, stdout, stderr
        );
    }
    stdout
}

fn scanned_workspace() -> tempfile::TempDir {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_workspace(tmp.path());
    run_qr_ok(tmp.path(), &["scan"]);
    tmp
}

/// ID of the first item whose text matches
fn item_id(dir: &Path, text: &str) -> String {
    let out = run_qr_ok(dir, &["items", "--text", text, "--json"]);
    let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
    parsed[0]["id"].as_str().unwrap().to_string()
}

// ---------------------------------------------------------------------------
// Setup commands
// ---------------------------------------------------------------------------

#[test]
fn test_init_creates_config_and_notes() {
    let tmp = tempfile::TempDir::new().unwrap();
    let out = run_qr_ok(tmp.path(), &["init"]);
    assert!(out.contains("quire.toml"));
    assert!(tmp.path().join("quire.toml").is_file());
    assert!(tmp.path().join("notes/inbox.md").is_file());

    let scan = run_qr_ok(tmp.path(), &["scan"]);
    assert!(scan.contains("indexed 1"));
}

#[test]
fn test_init_twice_fails() {
    let tmp = tempfile::TempDir::new().unwrap();
    run_qr_ok(tmp.path(), &["init"]);
    let (_, stderr, success) = run_qr(tmp.path(), &["init"]);
    assert!(!success);
    assert!(stderr.contains("already exists"));
}

#[test]
fn test_missing_config_is_an_error() {
    let tmp = tempfile::TempDir::new().unwrap();
    let (_, stderr, success) = run_qr(tmp.path(), &["items"]);
    assert!(!success);
    assert!(stderr.starts_with("error: no quire.toml found"));
}

#[test]
fn test_config_found_from_subdirectory() {
    let tmp = scanned_workspace();
    let out = run_qr_ok(&tmp.path().join("notes/work"), &["items"]);
    assert!(out.contains("buy milk"));
}

#[test]
fn test_dir_flag() {
    let tmp = scanned_workspace();
    let other = tempfile::TempDir::new().unwrap();
    let dir = tmp.path().to_string_lossy().to_string();
    let out = run_qr_ok(other.path(), &["-C", &dir, "items"]);
    assert!(out.contains("buy milk"));
}

#[test]
fn test_roots_add_and_list() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_workspace(tmp.path());
    fs::create_dir_all(tmp.path().join("archive")).unwrap();

    run_qr_ok(
        tmp.path(),
        &["roots", "add", "archive", "--kind", "external", "--exclude", "--read-only"],
    );
    let toml = fs::read_to_string(tmp.path().join("quire.toml")).unwrap();
    assert!(toml.contains("[embedding]"));
    assert!(toml.contains("archive"));

    let out = run_qr_ok(tmp.path(), &["roots", "--json"]);
    let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
    let roots = parsed.as_array().unwrap();
    assert_eq!(roots.len(), 2);
    assert_eq!(roots[1]["kind"], "external");
    assert_eq!(roots[1]["read_only"], true);
    assert_eq!(roots[1]["notebook_name"], "archive");
    assert_eq!(roots[1]["exists"], true);
}

#[test]
fn test_roots_add_rejects_unknown_kind() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_workspace(tmp.path());
    let (_, stderr, success) = run_qr(tmp.path(), &["roots", "add", "x", "--kind", "mirror"]);
    assert!(!success);
    assert!(stderr.contains("unknown root kind"));
}

// ---------------------------------------------------------------------------
// Scan
// ---------------------------------------------------------------------------

#[test]
fn test_scan_reports_counts() {
    let tmp = tempfile::TempDir::new().unwrap();
    create_test_workspace(tmp.path());

    let out = run_qr_ok(tmp.path(), &["scan"]);
    assert!(out.starts_with("indexed 2, removed 0"));
    assert!(out.contains("+ home:todo.md"));
    assert!(out.contains("+ work:standup.md"));

    let again = run_qr_ok(tmp.path(), &["scan"]);
    assert!(again.starts_with("indexed 0, removed 0, touched 0, unchanged 2"));
}

#[test]
fn test_scan_json_and_removal() {
    let tmp = scanned_workspace();
    fs::remove_file(tmp.path().join("notes/work/standup.md")).unwrap();

    let out = run_qr_ok(tmp.path(), &["scan", "--json"]);
    let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(parsed["removed"][0]["notebook"], "work");
    assert_eq!(parsed["removed"][0]["path"], "standup.md");
    assert_eq!(parsed["errors"].as_array().unwrap().len(), 0);
}

#[test]
fn test_full_scan_with_workers() {
    let tmp = scanned_workspace();
    let out = run_qr_ok(tmp.path(), &["scan", "--full", "--workers", "2"]);
    assert!(out.starts_with("indexed 2"));
}

// ---------------------------------------------------------------------------
// Read commands
// ---------------------------------------------------------------------------

#[test]
fn test_items_listing_groups_by_document() {
    let tmp = scanned_workspace();
    let out = run_qr_ok(tmp.path(), &["items"]);
    assert!(out.contains("== home:todo.md =="));
    assert!(out.contains("== work:standup.md =="));
    assert!(out.contains("buy milk #errand  (due 2026-10-23)"));
}

#[test]
fn test_items_filters() {
    let tmp = scanned_workspace();

    let out = run_qr_ok(tmp.path(), &["items", "--tag", "errand", "--json"]);
    let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
    let items = parsed.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["text"], "buy milk");
    assert_eq!(items[0]["due"], "2026-10-23");
    assert_eq!(items[0]["status"], "pending");

    let out = run_qr_ok(tmp.path(), &["items", "--status", "in_progress", "--json"]);
    let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(parsed.as_array().unwrap().len(), 1);
    assert_eq!(parsed[0]["priority"], "medium");

    let out = run_qr_ok(tmp.path(), &["items", "--notebook", "work", "--json"]);
    let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(parsed.as_array().unwrap().len(), 1);
}

#[test]
fn test_items_rejects_unknown_status() {
    let tmp = scanned_workspace();
    let (_, stderr, success) = run_qr(tmp.path(), &["items", "--status", "blocked"]);
    assert!(!success);
    assert!(stderr.contains("unknown status"));
}

#[test]
fn test_show_includes_children() {
    let tmp = scanned_workspace();
    let id = item_id(tmp.path(), "plan trip");

    let out = run_qr_ok(tmp.path(), &["show", &id]);
    assert!(out.contains("file: home:todo.md (line 4)"));
    assert!(out.contains("children:"));
    assert!(out.contains("book flights"));
    assert!(out.contains("pack bags"));

    let json = run_qr_ok(tmp.path(), &["show", &id, "--json"]);
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed["id"], id.as_str());
    assert_eq!(parsed["children"].as_array().unwrap().len(), 2);
}

#[test]
fn test_show_unknown_id() {
    let tmp = scanned_workspace();
    let (_, stderr, success) = run_qr(tmp.path(), &["show", "0000000000000000"]);
    assert!(!success);
    assert!(stderr.contains("item not found"));
}

#[test]
fn test_search_lexical() {
    let tmp = scanned_workspace();
    let out = run_qr_ok(tmp.path(), &["search", "migration", "--mode", "lexical", "--json"]);
    let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(parsed["mode"], "lexical");
    let hits = parsed["hits"].as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["document"]["title"], "Standup");
}

#[test]
fn test_search_hybrid_text_output() {
    let tmp = scanned_workspace();
    let out = run_qr_ok(tmp.path(), &["search", "milk"]);
    assert!(out.contains(" 1. "));
    assert!(out.contains("home:todo.md"));
}

#[test]
fn test_search_rejects_unknown_mode() {
    let tmp = scanned_workspace();
    let (_, stderr, success) = run_qr(tmp.path(), &["search", "milk", "--mode", "fuzzy"]);
    assert!(!success);
    assert!(stderr.contains("unknown mode"));
}

#[test]
fn test_links_and_backlinks() {
    let tmp = scanned_workspace();
    let out = run_qr_ok(tmp.path(), &["links", "home", "todo.md", "--json"]);
    let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(parsed["outgoing"].as_array().unwrap().len(), 0);
    assert_eq!(parsed["backlinks"][0]["source"]["path"], "standup.md");
}

#[test]
fn test_tags_and_stats() {
    let tmp = scanned_workspace();
    let tags = run_qr_ok(tmp.path(), &["tags"]);
    assert!(tags.contains("#errand"));
    assert!(tags.contains("#meeting"));

    let out = run_qr_ok(tmp.path(), &["stats", "--json"]);
    let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(parsed["documents"], 2);
    assert_eq!(parsed["items"], 5);
    assert_eq!(parsed["in_progress"], 1);
}

// ---------------------------------------------------------------------------
// Write commands
// ---------------------------------------------------------------------------

#[test]
fn test_done_cascades_and_writes_file() {
    let tmp = scanned_workspace();
    let id = item_id(tmp.path(), "plan trip");

    let out = run_qr_ok(tmp.path(), &["done", &id]);
    assert!(out.starts_with(&format!("done {}", id)));
    assert!(out.contains("2 children completed"));

    let text = fs::read_to_string(tmp.path().join("notes/todo.md")).unwrap();
    assert!(text.contains("- [x] plan trip #travel\n  - [x] book flights\n  - [x] pack bags\n"));
    assert!(text.contains("- [ ] buy milk"));

    let again = run_qr_ok(tmp.path(), &["scan"]);
    assert!(again.starts_with("indexed 0"));
}

#[test]
fn test_start_reopen_toggle() {
    let tmp = scanned_workspace();
    let id = item_id(tmp.path(), "buy milk");
    let path = tmp.path().join("notes/todo.md");

    run_qr_ok(tmp.path(), &["start", &id]);
    assert!(fs::read_to_string(&path).unwrap().contains("- [>] buy milk"));
    run_qr_ok(tmp.path(), &["toggle", &id]);
    assert!(fs::read_to_string(&path).unwrap().contains("- [x] buy milk"));
    run_qr_ok(tmp.path(), &["reopen", &id]);
    assert!(fs::read_to_string(&path).unwrap().contains("- [ ] buy milk"));
}

#[test]
fn test_due_and_priority_edits() {
    let tmp = scanned_workspace();
    let id = item_id(tmp.path(), "buy milk");

    run_qr_ok(tmp.path(), &["due", &id, "2026-11-01"]);
    run_qr_ok(tmp.path(), &["priority", &id, "high"]);
    let text = fs::read_to_string(tmp.path().join("notes/todo.md")).unwrap();
    assert!(text.contains("buy milk @due(2026-11-01) #errand"));
    assert!(text.contains("@priority(high)") || text.contains("!!!"));

    let out = run_qr_ok(tmp.path(), &["show", &id, "--json"]);
    let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(parsed["due"], "2026-11-01");
    assert_eq!(parsed["priority"], "high");

    run_qr_ok(tmp.path(), &["due", &id, "none"]);
    let text = fs::read_to_string(tmp.path().join("notes/todo.md")).unwrap();
    assert!(!text.contains("@due("));
}

#[test]
fn test_rm_logs_recovery_entry() {
    let tmp = scanned_workspace();
    let id = item_id(tmp.path(), "plan trip");

    run_qr_ok(tmp.path(), &["rm", &id]);
    let text = fs::read_to_string(tmp.path().join("notes/todo.md")).unwrap();
    assert!(!text.contains("plan trip"));
    assert!(!text.contains("book flights"));

    let out = run_qr_ok(tmp.path(), &["recovery"]);
    assert!(out.contains("plan trip"));

    let path = run_qr_ok(tmp.path(), &["recovery", "path"]);
    assert!(Path::new(path.trim()).is_file());

    let pruned = run_qr_ok(tmp.path(), &["recovery", "prune", "--all"]);
    assert!(pruned.contains("pruned 1"));
}

#[test]
fn test_mv_creates_target_document() {
    let tmp = scanned_workspace();
    let id = item_id(tmp.path(), "buy milk");

    let out = run_qr_ok(tmp.path(), &["mv", &id, "work", "errands.md", "--json"]);
    let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(parsed["document"]["notebook"], "work");
    assert_eq!(parsed["document"]["path"], "errands.md");

    let moved = fs::read_to_string(tmp.path().join("notes/work/errands.md")).unwrap();
    assert!(moved.contains("- [ ] buy milk @due(2026-10-23) #errand"));
    let source = fs::read_to_string(tmp.path().join("notes/todo.md")).unwrap();
    assert!(!source.contains("buy milk"));
}

#[test]
fn test_mutation_on_stale_id_fails() {
    let tmp = scanned_workspace();
    let (_, stderr, success) = run_qr(tmp.path(), &["done", "ffffffffffffffff"]);
    assert!(!success);
    assert!(stderr.starts_with("error:"));
}
