use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// Watches note roots and reports changed document paths.
///
/// The watcher only reports; callers hand the paths to the scanner.
pub struct NotesWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<Vec<PathBuf>>,
}

fn is_relevant(path: &Path, extensions: &[String], index_dir: &Path) -> bool {
    if path.starts_with(index_dir) {
        return false;
    }
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'));
    if hidden {
        return false;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

impl NotesWatcher {
    /// Start watching `roots`. Files under `index_dir` and files without one
    /// of `extensions` are ignored.
    pub fn start(
        roots: &[(PathBuf, bool)],
        extensions: Vec<String>,
        index_dir: PathBuf,
    ) -> Result<Self, notify::Error> {
        let (tx, rx) = mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| {
                let event = match result {
                    Ok(e) => e,
                    Err(e) => {
                        tracing::warn!(error = %e, "watch error");
                        return;
                    }
                };
                if !matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) {
                    return;
                }
                let relevant: Vec<PathBuf> = event
                    .paths
                    .into_iter()
                    .filter(|p| is_relevant(p, &extensions, &index_dir))
                    .collect();
                if !relevant.is_empty() {
                    let _ = tx.send(relevant);
                }
            },
            Config::default(),
        )?;

        for (path, recursive) in roots {
            let mode = if *recursive {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            watcher.watch(path, mode)?;
        }

        Ok(NotesWatcher {
            _watcher: watcher,
            rx,
        })
    }

    /// Block until at least one change arrives, then keep collecting until
    /// the stream has been quiet for `debounce`. Returns `None` once the
    /// watcher has shut down.
    pub fn wait(&self, debounce: Duration) -> Option<Vec<PathBuf>> {
        let mut paths: BTreeSet<PathBuf> = self.rx.recv().ok()?.into_iter().collect();
        let mut deadline = Instant::now() + debounce;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(batch) => {
                    paths.extend(batch);
                    deadline = Instant::now() + debounce;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => break,
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
        Some(paths.into_iter().collect())
    }
}
