//! File discovery and change watching.

use crate::utils::paths::{normalize_path, split_glob};
use async_trait::async_trait;
use glob::{MatchOptions, Pattern};
use indexmap::IndexSet;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Delay after the last filesystem event before a batch is handled.
pub const WATCH_DEBOUNCE: Duration = Duration::from_millis(100);

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// An include pattern failed to compile.
#[derive(Debug, Error)]
#[error("Invalid include pattern {pattern:?}: {source}")]
pub struct PatternError {
    /// The pattern as configured.
    pub pattern: String,
    /// Compile error.
    #[source]
    pub source: glob::PatternError,
}

/// Include patterns compiled against a base directory.
#[derive(Debug, Clone)]
pub struct FileMatcher {
    cwd: PathBuf,
    patterns: Vec<Pattern>,
    bases: Vec<PathBuf>,
}

impl FileMatcher {
    /// Compiles `patterns`, which are relative to `cwd`.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern is invalid.
    pub fn new<S: AsRef<str>>(cwd: impl AsRef<Path>, patterns: &[S]) -> Result<Self, PatternError> {
        let cwd = normalize_path(cwd.as_ref());
        let mut compiled = Vec::with_capacity(patterns.len());
        let mut bases: Vec<PathBuf> = Vec::new();

        for pattern in patterns {
            let pattern = pattern.as_ref();
            let (base, rest) = split_glob(pattern);
            let base = normalize_path(&cwd.join(base));
            // Patterns match absolute paths so `..` and absolute bases work.
            let absolute = format!(
                "{}/{rest}",
                Pattern::escape(&base.to_string_lossy()).trim_end_matches('/')
            );
            compiled.push(Pattern::new(&absolute).map_err(|source| PatternError {
                pattern: pattern.to_string(),
                source,
            })?);

            if !bases.iter().any(|b| base.starts_with(b)) {
                bases.retain(|b| !b.starts_with(&base));
                bases.push(base);
            }
        }

        Ok(Self {
            cwd,
            patterns: compiled,
            bases,
        })
    }

    /// Directory the patterns are relative to.
    #[must_use]
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Non-glob base directories of the patterns, without nested duplicates.
    #[must_use]
    pub fn bases(&self) -> &[PathBuf] {
        &self.bases
    }

    /// Returns true if `filename` matches any pattern. Relative names are
    /// taken relative to [`FileMatcher::cwd`].
    #[must_use]
    pub fn matches(&self, filename: &Path) -> bool {
        let filename = normalize_path(&self.cwd.join(filename));
        self.patterns
            .iter()
            .any(|p| p.matches_path_with(&filename, MATCH_OPTIONS))
    }

    /// Walks the base directories and returns matching files, sorted by name
    /// within each base.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be read.
    pub fn find_files(&self) -> Result<Vec<PathBuf>, walkdir::Error> {
        let mut files = Vec::new();
        for base in &self.bases {
            if !base.exists() {
                debug!(base = %base.display(), "Skipping missing include base");
                continue;
            }
            for entry in WalkDir::new(base).sort_by_file_name() {
                let entry = entry?;
                if entry.file_type().is_file() && self.matches(entry.path()) {
                    files.push(normalize_path(entry.path()));
                }
            }
        }
        Ok(files)
    }
}

/// One debounced batch of file changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileChanges {
    /// Files created or modified.
    pub updated: Vec<PathBuf>,
    /// Files removed.
    pub deleted: Vec<PathBuf>,
}

/// Coalesces change events into updated and deleted sets.
///
/// The latest event for a path wins: a file that is deleted and recreated
/// within one batch is reported as updated.
#[derive(Debug, Default)]
pub struct ChangeAggregator {
    updated: IndexSet<PathBuf>,
    deleted: IndexSet<PathBuf>,
}

impl ChangeAggregator {
    /// Creates an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a created or modified file.
    pub fn updated(&mut self, path: PathBuf) {
        self.deleted.shift_remove(&path);
        self.updated.insert(path);
    }

    /// Records a removed file.
    pub fn deleted(&mut self, path: PathBuf) {
        self.updated.shift_remove(&path);
        self.deleted.insert(path);
    }

    /// Returns true if no change is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Takes all pending changes, or `None` if there are none.
    pub fn take(&mut self) -> Option<FileChanges> {
        if self.is_empty() {
            return None;
        }
        Some(FileChanges {
            updated: std::mem::take(&mut self.updated).into_iter().collect(),
            deleted: std::mem::take(&mut self.deleted).into_iter().collect(),
        })
    }
}

/// Errors reported to [`ChangeHandler::on_error`] or raised when starting a watch.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The filesystem watcher failed.
    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// A batch handler failed.
    #[error("Failed to handle file changes: {0}")]
    Handler(String),
}

/// Receives debounced change batches.
#[async_trait]
pub trait ChangeHandler: Send + 'static {
    /// Handles one batch. Batches never overlap.
    ///
    /// # Errors
    ///
    /// An error is passed to [`ChangeHandler::on_error`]; watching continues.
    async fn on_change(&mut self, changes: FileChanges) -> Result<(), WatchError>;

    /// Receives watcher and handler errors.
    fn on_error(&mut self, error: WatchError) {
        warn!(error = %error, "Watch error");
    }
}

/// A running watch. Dropping it stops watching.
pub struct WatchHandle {
    watcher: RecommendedWatcher,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("finished", &self.task.is_finished())
            .finish_non_exhaustive()
    }
}

impl WatchHandle {
    /// Stops watching and waits for the batch in progress, if any.
    pub async fn stop(self) {
        let Self {
            watcher,
            stop,
            task,
        } = self;
        drop(watcher);
        // The task may already have ended.
        let _ = stop.send(());
        if let Err(e) = task.await {
            warn!(error = %e, "Watch task ended abnormally");
        }
    }
}

/// Watches the files selected by `matcher` and delivers debounced batches.
///
/// Must be called within a tokio runtime.
///
/// # Errors
///
/// Returns an error if the filesystem watcher cannot be started.
pub fn watch_files(
    matcher: FileMatcher,
    mut handler: impl ChangeHandler,
) -> Result<WatchHandle, WatchError> {
    let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
        // The receiver is gone once the watch task has ended.
        let _ = tx.send(event);
    })?;

    for base in matcher.bases() {
        let target = existing_ancestor(base);
        debug!(path = %target.display(), "Watching");
        watcher.watch(&target, RecursiveMode::Recursive)?;
    }

    let (stop, mut stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        let mut changes = ChangeAggregator::new();
        loop {
            let event = tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
                _ = &mut stopped => break,
            };
            record_event(&matcher, &mut changes, &mut handler, event);
            let mut closed = false;
            loop {
                match tokio::time::timeout(WATCH_DEBOUNCE, rx.recv()).await {
                    Ok(Some(event)) => record_event(&matcher, &mut changes, &mut handler, event),
                    Ok(None) => {
                        closed = true;
                        break;
                    }
                    Err(_) => break,
                }
            }

            while let Some(batch) = changes.take() {
                debug!(
                    updated = batch.updated.len(),
                    deleted = batch.deleted.len(),
                    "Handling file changes"
                );
                if let Err(e) = handler.on_change(batch).await {
                    handler.on_error(e);
                }
                while let Ok(event) = rx.try_recv() {
                    record_event(&matcher, &mut changes, &mut handler, event);
                }
            }
            if closed {
                break;
            }
        }
        debug!("Watch stopped");
    });

    Ok(WatchHandle {
        watcher,
        stop,
        task,
    })
}

fn record_event(
    matcher: &FileMatcher,
    changes: &mut ChangeAggregator,
    handler: &mut impl ChangeHandler,
    event: notify::Result<Event>,
) {
    let event = match event {
        Ok(event) => event,
        Err(e) => {
            handler.on_error(e.into());
            return;
        }
    };
    if matches!(event.kind, EventKind::Access(_) | EventKind::Other) {
        return;
    }
    for path in event.paths {
        let path = normalize_path(&path);
        if !matcher.matches(&path) {
            continue;
        }
        if !matches!(event.kind, EventKind::Remove(_)) && path.is_file() {
            changes.updated(path);
        } else {
            changes.deleted(path);
        }
    }
}

fn existing_ancestor(path: &Path) -> PathBuf {
    path.ancestors()
        .find(|p| p.is_dir())
        .map_or_else(|| path.to_path_buf(), Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_matcher_relative_patterns() {
        let matcher = FileMatcher::new("/project", &["./src/**/*.html", "views/*.html"]).unwrap();
        assert!(matcher.matches(Path::new("/project/src/a.html")));
        assert!(matcher.matches(Path::new("/project/src/deep/nested/b.html")));
        assert!(matcher.matches(Path::new("src/c.html")));
        assert!(matcher.matches(Path::new("/project/views/v.html")));
        assert!(!matcher.matches(Path::new("/project/views/deep/v.html")));
        assert!(!matcher.matches(Path::new("/project/src/a.ts")));
        assert!(!matcher.matches(Path::new("/other/src/a.html")));
    }

    #[test]
    fn test_matcher_patterns_outside_cwd() {
        let matcher =
            FileMatcher::new("/repo/config", &["../shared/src/**/*.html", "/srv/views/*.html"])
                .unwrap();
        assert!(matcher.matches(Path::new("/repo/shared/src/a.html")));
        assert!(matcher.matches(Path::new("../shared/src/deep/b.html")));
        assert!(matcher.matches(Path::new("/srv/views/v.html")));
        assert!(!matcher.matches(Path::new("/repo/config/shared/src/a.html")));
        assert_eq!(
            matcher.bases(),
            &[PathBuf::from("/repo/shared/src"), PathBuf::from("/srv/views")]
        );
    }

    #[test]
    fn test_nested_bases_are_merged() {
        let matcher =
            FileMatcher::new("/p", &["src/app/**/*.html", "src/**/*.html", "lib/*.html"]).unwrap();
        assert_eq!(
            matcher.bases(),
            &[PathBuf::from("/p/src"), PathBuf::from("/p/lib")]
        );
    }

    #[test]
    fn test_invalid_pattern() {
        let error = FileMatcher::new("/p", &["./src/***"]).unwrap_err();
        assert_eq!(error.pattern, "./src/***");
    }

    #[test]
    fn test_find_files_sorted() {
        let dir = TempDir::new().unwrap();
        for name in ["src/b.html", "src/a/z.html", "src/a.html", "src/x.ts", "other/o.html"] {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "").unwrap();
        }

        let matcher = FileMatcher::new(dir.path(), &["src/**/*.html", "missing/*.html"]).unwrap();
        let files: Vec<PathBuf> = matcher
            .find_files()
            .unwrap()
            .into_iter()
            .map(|f| f.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            files,
            vec![
                PathBuf::from("src/a/z.html"),
                PathBuf::from("src/a.html"),
                PathBuf::from("src/b.html"),
            ]
        );
    }

    #[test]
    fn test_aggregator_latest_event_wins() {
        let mut changes = ChangeAggregator::new();
        assert_eq!(changes.take(), None);

        changes.updated("a".into());
        changes.updated("b".into());
        changes.deleted("a".into());
        changes.deleted("c".into());
        changes.updated("c".into());
        changes.updated("b".into());

        assert_eq!(
            changes.take(),
            Some(FileChanges {
                updated: vec!["b".into(), "c".into()],
                deleted: vec!["a".into()],
            })
        );
        assert!(changes.is_empty());
    }

    /// Fails its first batch after creating another file mid-batch.
    struct FailingOnce {
        late_file: PathBuf,
        batches: usize,
        events: mpsc::UnboundedSender<Result<FileChanges, String>>,
    }

    #[async_trait]
    impl ChangeHandler for FailingOnce {
        async fn on_change(&mut self, changes: FileChanges) -> Result<(), WatchError> {
            self.batches += 1;
            let _ = self.events.send(Ok(changes));
            if self.batches == 1 {
                fs::write(&self.late_file, "<p></p>").unwrap();
                tokio::time::sleep(Duration::from_millis(300)).await;
                return Err(WatchError::Handler("first batch".to_string()));
            }
            Ok(())
        }

        fn on_error(&mut self, error: WatchError) {
            let _ = self.events.send(Err(error.to_string()));
        }
    }

    #[tokio::test]
    async fn test_watch_continues_after_handler_error() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::create_dir_all(root.join("src")).unwrap();
        let first = root.join("src/first.html");
        let late = root.join("src/late.html");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler = FailingOnce {
            late_file: late.clone(),
            batches: 0,
            events: tx,
        };
        let matcher = FileMatcher::new(&root, &["src/**/*.html"]).unwrap();
        let handle = watch_files(matcher, handler).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        fs::write(&first, "<p></p>").unwrap();
        let mut seen = Vec::new();
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let event = rx.recv().await.unwrap();
                let done = matches!(&event, Ok(changes) if changes.updated.contains(&late));
                seen.push(event);
                if done {
                    break;
                }
            }
        })
        .await
        .unwrap();
        handle.stop().await;

        assert_eq!(
            seen.first(),
            Some(&Ok(FileChanges {
                updated: vec![first],
                deleted: Vec::new(),
            }))
        );
        assert_eq!(
            seen.get(1),
            Some(&Err("Failed to handle file changes: first batch".to_string()))
        );
    }
}
