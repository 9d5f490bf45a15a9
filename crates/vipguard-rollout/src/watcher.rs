//! Config change detection on the primary.
//!
//! `ConfigWatcher` polls the proxy's config directory and diffs file
//! modification times against the last value it saw. The first poll after
//! start only records a baseline, so a restart never triggers a rollout
//! by itself. Stored timestamps only move forward.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::WatchError;
use crate::sequencer::{RolloutOutcome, RolloutSequencer};

/// Last-seen modification time per config file. Single writer: the
/// detector loop that owns it.
#[derive(Debug)]
pub struct ConfigWatcher {
    dir: PathBuf,
    extensions: Vec<String>,
    seen: HashMap<PathBuf, SystemTime>,
    first_run: bool,
}

impl ConfigWatcher {
    /// Watch files directly inside `dir` whose extension is one of
    /// `extensions` (without the dot, compared case-insensitively).
    pub fn new(dir: impl Into<PathBuf>, extensions: &[String]) -> Self {
        Self {
            dir: dir.into(),
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            seen: HashMap::new(),
            first_run: true,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of files with a recorded timestamp.
    pub fn tracked(&self) -> usize {
        self.seen.len()
    }

    pub fn last_seen(&self, path: &Path) -> Option<SystemTime> {
        self.seen.get(path).copied()
    }

    /// Compare the directory against the stored timestamps.
    ///
    /// Returns the files that are new or strictly newer than last seen,
    /// sorted by path. Their stored time is updated before returning, so a
    /// write is reported exactly once even if the rollout it triggers is
    /// still running at the next tick. The first successful poll returns
    /// nothing and only records the baseline.
    pub fn poll(&mut self) -> Result<Vec<PathBuf>, WatchError> {
        let files = self.scan()?;
        let baseline = self.first_run;
        let mut changed = Vec::new();

        for (path, modified) in files {
            let previous = self.seen.get(&path).copied();
            if previous.is_some_and(|prev| modified <= prev) {
                continue;
            }
            self.seen.insert(path.clone(), modified);
            if baseline {
                continue;
            }
            debug!(path = %path.display(), new = previous.is_none(), "config file changed");
            changed.push(path);
        }

        if baseline {
            self.first_run = false;
            info!(dir = %self.dir.display(), files = self.seen.len(), "recorded config baseline");
        }

        changed.sort();
        Ok(changed)
    }

    fn scan(&self) -> Result<Vec<(PathBuf, SystemTime)>, WatchError> {
        let mut files = Vec::new();
        // Symlinked files (ConfigMap-style `dynamic.yml -> ..data/dynamic.yml`)
        // are tracked by their target's mtime.
        for entry in WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
        {
            let entry = entry?;
            if !entry.file_type().is_file() || !self.matches(entry.path()) {
                continue;
            }
            let modified = entry
                .metadata()
                .map_err(WatchError::from)?
                .modified()
                .map_err(|source| WatchError::Metadata {
                    path: entry.path().to_path_buf(),
                    source,
                })?;
            files.push((entry.into_path(), modified));
        }
        Ok(files)
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .is_some_and(|ext| self.extensions.contains(&ext))
    }
}

/// The primary's poll loop: watcher tick → one rollout per non-empty batch.
pub struct ConfigChangeDetector {
    watcher: ConfigWatcher,
    sequencer: Arc<RolloutSequencer>,
}

impl ConfigChangeDetector {
    pub fn new(watcher: ConfigWatcher, sequencer: Arc<RolloutSequencer>) -> Self {
        Self { watcher, sequencer }
    }

    pub fn watcher(&self) -> &ConfigWatcher {
        &self.watcher
    }

    /// Poll once and, if anything changed, run a single rollout for the
    /// whole batch.
    pub async fn tick(&mut self) -> Option<RolloutOutcome> {
        let changed = match self.watcher.poll() {
            Ok(changed) => changed,
            Err(e) => {
                warn!(error = %e, "config directory poll failed");
                return None;
            }
        };
        if changed.is_empty() {
            return None;
        }

        info!(
            files = ?changed.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
            "configuration changed, starting rollout"
        );
        Some(self.sequencer.execute(&changed).await)
    }

    /// Run until shutdown. A rollout in flight when shutdown arrives is
    /// allowed to finish; the loop exits before the next poll.
    pub async fn run(mut self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            dir = %self.watcher.dir().display(),
            interval_ms = interval.as_millis() as u64,
            "config change detector started"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // Shutdown wins over an overdue tick left behind by a long rollout.
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    info!("config change detector shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }
}
