//! Append-only item store backed by a single JSON data file.
//!
//! The file doubles as the flat export read by the static site generator:
//! `{"items": [...], "last_updated": ..., "last_run": ...}` with items kept
//! newest first. `url` is unique; inserting a known URL is a silent no-op.

use std::collections::{BTreeMap, HashSet};
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ingest::types::{Item, Source};

/// A lock file older than this belongs to a crashed run.
const STALE_LOCK_AFTER: Duration = Duration::from_secs(3600);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("data file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("run lock {path} is held by another run")]
    Locked { path: PathBuf },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DataFile {
    #[serde(default)]
    items: Vec<Item>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    last_run: Option<DateTime<Utc>>,
}

/// Totals served to the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total: usize,
    pub per_source: BTreeMap<String, usize>,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_run: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    data: DataFile,
    urls: HashSet<String>,
}

impl JsonStore {
    /// Load the data file; a missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let (data, urls) = load(&path)?;
        Ok(Self { path, data, urls })
    }

    /// Re-read the data file, dropping the in-memory copy.
    ///
    /// Another process (a cron `run_once` next to the service) may have
    /// appended since this store was opened. Call while holding the run lock
    /// so the next write starts from what is on disk.
    pub fn reload(&mut self) -> Result<(), StoreError> {
        let (data, urls) = load(&self.path)?;
        self.data = data;
        self.urls = urls;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept `item` unless its URL is already stored. Stamps `created_at`.
    pub fn insert(&mut self, item: Item) -> Result<bool, StoreError> {
        Ok(!self.insert_all([item])?.is_empty())
    }

    /// Accept every item whose URL is not stored yet, then write the file once.
    ///
    /// Returns the accepted items as stored. If the write fails nothing from
    /// the batch is kept.
    pub fn insert_all(&mut self, items: impl IntoIterator<Item = Item>) -> Result<Vec<Item>, StoreError> {
        let mut accepted = Vec::new();
        for mut item in items {
            if self.urls.contains(&item.url) {
                continue;
            }
            let now = Utc::now();
            // Keep created_at monotonic so "newest first" matches insertion order.
            item.created_at = match self.data.items.first() {
                Some(newest) if newest.created_at >= now => newest.created_at + chrono::Duration::microseconds(1),
                _ => now,
            };
            self.urls.insert(item.url.clone());
            self.data.items.insert(0, item.clone());
            accepted.push(item);
        }
        if accepted.is_empty() {
            return Ok(accepted);
        }

        let prev_updated = self.data.last_updated.replace(Utc::now());
        if let Err(e) = self.persist() {
            self.data.items.drain(..accepted.len());
            for it in &accepted {
                self.urls.remove(&it.url);
            }
            self.data.last_updated = prev_updated;
            return Err(e);
        }
        Ok(accepted)
    }

    /// All items, most recently ingested first.
    pub fn list_all(&self) -> Vec<Item> {
        let mut out = self.data.items.clone();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    pub fn list_by_source(&self, source: &Source) -> Vec<Item> {
        self.list_all()
            .into_iter()
            .filter(|it| &it.source == source)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.data.items.len()
    }

    pub fn count_by_source(&self) -> BTreeMap<String, usize> {
        let mut out = BTreeMap::new();
        for it in &self.data.items {
            *out.entry(it.source.to_string()).or_insert(0) += 1;
        }
        out
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    pub fn urls(&self) -> HashSet<String> {
        self.urls.clone()
    }

    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        self.data.last_run
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            total: self.count(),
            per_source: self.count_by_source(),
            last_updated: self.data.last_updated,
            last_run: self.data.last_run,
        }
    }

    /// Record the completion time of a run.
    pub fn mark_run(&mut self, at: DateTime<Utc>) -> Result<(), StoreError> {
        let prev = self.data.last_run.replace(at);
        if let Err(e) = self.persist() {
            self.data.last_run = prev;
            return Err(e);
        }
        Ok(())
    }

    /// Write to a sibling temp file, then rename over the data file.
    fn persist(&self) -> Result<(), StoreError> {
        ensure_parent(&self.path)?;
        let tmp = sibling(&self.path, ".tmp");
        let json = serde_json::to_vec_pretty(&self.data).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        let mut f = fs::File::create(&tmp).map_err(io_err(&tmp))?;
        f.write_all(&json).map_err(io_err(&tmp))?;
        f.sync_all().map_err(io_err(&tmp))?;
        fs::rename(&tmp, &self.path).map_err(io_err(&self.path))?;
        Ok(())
    }

    /// Take the cross-process run lock next to the data file.
    pub fn try_lock(&self) -> Result<RunLock, StoreError> {
        RunLock::acquire(sibling(&self.path, ".lock"))
    }
}

fn load(path: &Path) -> Result<(DataFile, HashSet<String>), StoreError> {
    let mut data = match fs::read_to_string(path) {
        Ok(s) if s.trim().is_empty() => DataFile::default(),
        Ok(s) => serde_json::from_str::<DataFile>(&s).map_err(|e| StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => DataFile::default(),
        Err(e) => return Err(io_err(path)(e)),
    };

    let mut urls = HashSet::with_capacity(data.items.len());
    let before = data.items.len();
    data.items.retain(|it| urls.insert(it.url.clone()));
    if data.items.len() != before {
        warn!(
            path = %path.display(),
            dropped = before - data.items.len(),
            "data file contained duplicate urls; keeping the newest copy"
        );
    }
    for it in &mut data.items {
        it.verdict = std::mem::take(&mut it.verdict).validated();
    }
    Ok((data, urls))
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

fn ensure_parent(path: &Path) -> Result<(), StoreError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(io_err(parent))
        }
        _ => Ok(()),
    }
}

/// Exclusive marker file; removed when dropped.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    fn acquire(path: PathBuf) -> Result<Self, StoreError> {
        ensure_parent(&path)?;
        for attempt in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut f) => {
                    let _ = writeln!(f, "pid={} at={}", std::process::id(), Utc::now().to_rfc3339());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if attempt == 0 && is_stale(&path) {
                        warn!(lock = %path.display(), "removing stale run lock");
                        let _ = fs::remove_file(&path);
                        continue;
                    }
                    return Err(StoreError::Locked { path });
                }
                Err(e) => return Err(io_err(&path)(e)),
            }
        }
        Err(StoreError::Locked { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_stale(path: &Path) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| SystemTime::now().duration_since(t).ok())
        .is_some_and(|age| age > STALE_LOCK_AFTER)
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
