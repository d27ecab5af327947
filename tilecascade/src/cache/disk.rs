//! On-disk tile store with background maintenance.
//!
//! Entries are stored one file per tile:
//!
//! ```text
//! {cache_dir}/{source}/{zoom}/{x}/{y}.tile
//! ```
//!
//! Each file is an encoded [`CacheEntry`]. Writes go to a uniquely named
//! temp file next to the target and are renamed into place, so concurrent
//! readers see either the previous entry or the new one. Writers of the
//! same tile take a per-path lock; writers of distinct tiles never wait on
//! each other. Temp files orphaned by a crash are swept by the purge.
//!
//! # Maintenance
//!
//! The store owns a maintenance daemon that periodically purges expired
//! entries and, when the store exceeds its size limit, evicts the oldest
//! files (by mtime) down to 90% of the limit.

use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant, SystemTime};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::entry::{CacheEntry, EntryHeader};
use super::gate::StoreGate;
use super::traits::{BoxFuture, PurgeResult, StoreError, TileStore};
use crate::coord::TileIndex;

/// Target percentage of limit after eviction (0.9 = 90%).
const EVICTION_TARGET_PERCENTAGE: f64 = 0.9;

/// File extension of stored entries.
const ENTRY_EXTENSION: &str = "tile";

/// File extension of in-progress writes.
const TEMP_EXTENSION: &str = "tmp";

/// Age after which a temp file is assumed orphaned.
const STALE_TEMP_AGE: Duration = Duration::from_secs(3600);

/// Configuration for [`DiskTileStore`].
#[derive(Debug, Clone)]
pub struct DiskStoreConfig {
    /// Root directory of the store.
    pub directory: PathBuf,
    /// Size limit in bytes. Zero disables size trimming.
    pub max_size_bytes: u64,
    /// Interval between maintenance cycles. Zero disables the daemon.
    pub maintenance_interval: Duration,
    /// How long expired entries are kept before purging.
    ///
    /// Expired entries still serve as stale fallbacks, so purging only
    /// removes entries that have been expired for longer than this.
    pub stale_retention: Duration,
}

impl DiskStoreConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            max_size_bytes: 2 * 1024 * 1024 * 1024,
            maintenance_interval: Duration::from_secs(300),
            stale_retention: Duration::ZERO,
        }
    }

    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size_bytes = bytes;
        self
    }

    pub fn with_maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }

    pub fn with_stale_retention(mut self, retention: Duration) -> Self {
        self.stale_retention = retention;
        self
    }
}

/// Entry count and total size of a store directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskStats {
    pub entries: u64,
    pub bytes: u64,
}

/// Persistent tile store backed by the filesystem.
pub struct DiskTileStore {
    directory: PathBuf,
    max_size_bytes: u64,
    stale_retention: Duration,

    /// Approximate stored size, corrected on every maintenance cycle.
    cached_size: AtomicU64,
    cached_count: AtomicU64,

    /// Distinguishes temp files of concurrent writers.
    write_seq: AtomicU64,
    /// Locks of paths with a write or remove in progress.
    path_locks: DashMap<PathBuf, Arc<AsyncMutex<()>>>,

    daemon: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
    gate: StoreGate,
}

impl DiskTileStore {
    /// Opens the store, creating its directory, and starts the
    /// maintenance daemon.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn start(config: DiskStoreConfig) -> Result<Arc<Self>, StoreError> {
        tokio::fs::create_dir_all(&config.directory).await?;

        let directory = config.directory.clone();
        let initial = tokio::task::spawn_blocking(move || disk_stats(&directory))
            .await
            .map_err(|e| StoreError::SpawnError(e.to_string()))?;

        let store = Arc::new(Self {
            directory: config.directory.clone(),
            max_size_bytes: config.max_size_bytes,
            stale_retention: config.stale_retention,
            cached_size: AtomicU64::new(initial.bytes),
            cached_count: AtomicU64::new(initial.entries),
            write_seq: AtomicU64::new(0),
            path_locks: DashMap::new(),
            daemon: Mutex::new(None),
            shutdown: CancellationToken::new(),
            gate: StoreGate::new(),
        });

        if !config.maintenance_interval.is_zero() {
            let weak = Arc::downgrade(&store);
            let token = store.shutdown.clone();
            let interval = config.maintenance_interval;
            let handle = tokio::spawn(run_maintenance_daemon(weak, token, interval));
            *store.daemon.lock() = Some(handle);
        }

        info!(
            dir = %config.directory.display(),
            max_bytes = config.max_size_bytes,
            entries = initial.entries,
            size = initial.bytes,
            interval_secs = config.maintenance_interval.as_secs(),
            "Disk tile store started"
        );

        Ok(store)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the file holding `index`.
    pub fn entry_path(&self, index: &TileIndex) -> PathBuf {
        self.directory
            .join(sanitize_component(index.source()))
            .join(index.zoom().to_string())
            .join(index.x().to_string())
            .join(format!("{}.{}", index.y(), ENTRY_EXTENSION))
    }

    /// Evicts the oldest entries while the store exceeds its size limit.
    pub async fn trim_to_size(&self) -> Result<PurgeResult, StoreError> {
        let _guard = self.gate.enter().await?;
        let directory = self.directory.clone();
        let max_bytes = self.max_size_bytes;

        let (result, remaining) =
            tokio::task::spawn_blocking(move || trim_blocking(&directory, max_bytes))
                .await
                .map_err(|e| StoreError::SpawnError(e.to_string()))?;

        self.cached_size.store(remaining.bytes, Ordering::Relaxed);
        self.cached_count.store(remaining.entries, Ordering::Relaxed);

        if result.entries_removed > 0 {
            info!(
                entries_removed = result.entries_removed,
                bytes_freed = result.bytes_freed,
                duration_ms = result.duration_ms,
                "Disk tile store trimmed"
            );
        }
        Ok(result)
    }

    /// Runs one maintenance cycle: purge, then trim.
    async fn run_maintenance_cycle(&self) {
        if let Err(e) = self.purge_expired().await {
            warn!(error = %e, "Expired entry purge failed");
        }
        if self.max_size_bytes > 0 {
            if let Err(e) = self.trim_to_size().await {
                warn!(error = %e, "Size trim failed");
            }
        }
    }

    /// Locks `path` against other writers in this store.
    async fn lock_path(&self, path: &Path) -> PathLock<'_> {
        let lock = Arc::clone(&*self.path_locks.entry(path.to_path_buf()).or_default());
        let guard = lock.lock_owned().await;
        PathLock {
            locks: &self.path_locks,
            path: path.to_path_buf(),
            guard: Some(guard),
        }
    }

    fn temp_path(&self, path: &Path) -> PathBuf {
        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let mut name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.{}.{}", std::process::id(), seq, TEMP_EXTENSION));
        path.with_file_name(name)
    }

    /// Writes `encoded` to `path`, returning the length of the file it
    /// replaced. The caller holds the path lock.
    async fn write_entry(&self, path: &Path, encoded: &[u8]) -> Result<Option<u64>, StoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let previous = tokio::fs::metadata(path).await.ok().map(|m| m.len());

        let temp_path = self.temp_path(path);
        if let Err(e) = tokio::fs::write(&temp_path, encoded).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&temp_path, path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(previous)
    }
}

/// Held while a path is written or removed. Drops the map entry once no
/// one else is waiting on it.
struct PathLock<'a> {
    locks: &'a DashMap<PathBuf, Arc<AsyncMutex<()>>>,
    path: PathBuf,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PathLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.path, |_, lock| Arc::strong_count(lock) == 1);
    }
}

async fn run_maintenance_daemon(
    store: Weak<DiskTileStore>,
    shutdown: CancellationToken,
    interval: Duration,
) {
    debug!(interval_secs = interval.as_secs(), "Disk store maintenance daemon started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("Disk store maintenance daemon shutting down");
                break;
            }
            _ = tokio::time::sleep(interval) => {
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.run_maintenance_cycle().await;
            }
        }
    }
}

impl TileStore for DiskTileStore {
    fn get<'a>(
        &'a self,
        index: &'a TileIndex,
    ) -> BoxFuture<'a, Result<Option<CacheEntry>, StoreError>> {
        Box::pin(async move {
            let _guard = self.gate.enter().await?;
            let path = self.entry_path(index);

            let raw = match tokio::fs::read(&path).await {
                Ok(raw) => raw,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => {
                    warn!(tile = %index, path = %path.display(), error = %e, "Unreadable cache entry");
                    return Ok(None);
                }
            };

            match CacheEntry::decode(index, &raw) {
                Some(entry) => Ok(Some(entry)),
                None => {
                    debug!(tile = %index, path = %path.display(), "Corrupt cache entry, treating as miss");
                    Ok(None)
                }
            }
        })
    }

    fn put(&self, entry: CacheEntry) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let _guard = self.gate.enter().await?;
            let path = self.entry_path(entry.index());
            let encoded = entry.encode()?;
            let new_len = encoded.len() as u64;

            let previous = {
                let _lock = self.lock_path(&path).await;
                self.write_entry(&path, &encoded).await?
            };
            match previous {
                Some(old_len) => {
                    let _ = self.cached_size.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |s| {
                        Some(s.saturating_sub(old_len) + new_len)
                    });
                }
                None => {
                    self.cached_size.fetch_add(new_len, Ordering::Relaxed);
                    self.cached_count.fetch_add(1, Ordering::Relaxed);
                }
            }

            debug!(tile = %entry.index(), bytes = new_len, "Cache entry written");
            Ok(())
        })
    }

    fn remove<'a>(&'a self, index: &'a TileIndex) -> BoxFuture<'a, Result<bool, StoreError>> {
        Box::pin(async move {
            let _guard = self.gate.enter().await?;
            let path = self.entry_path(index);
            let _lock = self.lock_path(&path).await;
            let len = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);

            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    decrement(&self.cached_size, len);
                    decrement(&self.cached_count, 1);
                    Ok(true)
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(StoreError::Io(e)),
            }
        })
    }

    fn purge_expired(&self) -> BoxFuture<'_, Result<PurgeResult, StoreError>> {
        Box::pin(async move {
            let _guard = self.gate.enter().await?;
            let directory = self.directory.clone();
            let retention = chrono::Duration::from_std(self.stale_retention)
                .unwrap_or_else(|_| chrono::Duration::zero());
            let cutoff = Utc::now() - retention;

            let result = tokio::task::spawn_blocking(move || purge_blocking(&directory, cutoff))
                .await
                .map_err(|e| StoreError::SpawnError(e.to_string()))?;

            decrement(&self.cached_size, result.bytes_freed);
            decrement(&self.cached_count, result.entries_removed as u64);

            if result.entries_removed > 0 {
                info!(
                    entries_removed = result.entries_removed,
                    bytes_freed = result.bytes_freed,
                    duration_ms = result.duration_ms,
                    "Expired cache entries purged"
                );
            }
            Ok(result)
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            self.shutdown.cancel();
            let handle = self.daemon.lock().take();
            if let Some(handle) = handle {
                let _ = handle.await;
            }

            if self.gate.close().await {
                info!(dir = %self.directory.display(), "Disk tile store closed");
            }
            Ok(())
        })
    }

    fn entry_count(&self) -> u64 {
        self.cached_count.load(Ordering::Relaxed)
    }

    fn size_bytes(&self) -> u64 {
        self.cached_size.load(Ordering::Relaxed)
    }
}

impl Drop for DiskTileStore {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn decrement(counter: &AtomicU64, by: u64) {
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
        Some(v.saturating_sub(by))
    });
}

/// Replaces characters that are unsafe in a path component.
fn sanitize_component(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    match sanitized.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => sanitized,
    }
}

fn is_entry_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION)
}

fn is_temp_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == TEMP_EXTENSION)
}

/// Collects all entry files with their mtime and size.
fn collect_entry_files(dir: &Path) -> Vec<(PathBuf, SystemTime, u64)> {
    let mut files = Vec::new();
    collect_files_recursive(dir, is_entry_file, &mut files);
    files
}

/// Collects all temp files with their mtime and size.
fn collect_temp_files(dir: &Path) -> Vec<(PathBuf, SystemTime, u64)> {
    let mut files = Vec::new();
    collect_files_recursive(dir, is_temp_file, &mut files);
    files
}

fn collect_files_recursive(
    dir: &Path,
    matches: fn(&Path) -> bool,
    files: &mut Vec<(PathBuf, SystemTime, u64)>,
) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "Failed to read directory during scan");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files_recursive(&path, matches, files);
        } else if matches(&path) {
            if let Ok(metadata) = entry.metadata() {
                let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                files.push((path, mtime, metadata.len()));
            }
        }
    }
}

/// Removes empty directories below `dir`, keeping `dir` itself.
fn cleanup_empty_dirs(dir: &Path) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            cleanup_empty_dirs(&path);
            // Fails while non-empty
            let _ = std::fs::remove_dir(&path);
        }
    }
}

/// Reads the expiration of an entry file without loading its payload.
///
/// Returns `None` if the header is unreadable.
fn read_expiry(path: &Path) -> Option<DateTime<Utc>> {
    let file = std::fs::File::open(path).ok()?;
    EntryHeader::read_from(BufReader::new(file))?.expires_at()
}

/// Deletes temp files older than [`STALE_TEMP_AGE`], left behind by
/// writes that never reached their rename. Returns how many went.
fn remove_stale_temp_files(directory: &Path) -> usize {
    let Some(threshold) = SystemTime::now().checked_sub(STALE_TEMP_AGE) else {
        return 0;
    };
    let mut removed = 0;
    for (path, mtime, _size) in collect_temp_files(directory) {
        if mtime > threshold {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Failed to remove stale temp file");
            }
        }
    }
    if removed > 0 {
        debug!(removed, "Stale temp files removed");
    }
    removed
}

/// Removes entries expired before `cutoff`, entries with corrupt headers
/// and orphaned temp files.
fn purge_blocking(directory: &Path, cutoff: DateTime<Utc>) -> PurgeResult {
    let start = Instant::now();
    let mut result = PurgeResult::default();
    let temp_removed = remove_stale_temp_files(directory);

    for (path, _mtime, size) in collect_entry_files(directory) {
        let expired = match read_expiry(&path) {
            Some(expires_at) => expires_at <= cutoff,
            None => true,
        };
        if !expired {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                result.entries_removed += 1;
                result.bytes_freed += size;
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Failed to remove expired entry");
            }
        }
    }

    if result.entries_removed > 0 || temp_removed > 0 {
        cleanup_empty_dirs(directory);
    }
    result.duration_ms = start.elapsed().as_millis() as u64;
    result
}

/// Evicts oldest entries until the directory is under 90% of `max_bytes`.
///
/// Returns the eviction result and the stats of what remains.
fn trim_blocking(directory: &Path, max_bytes: u64) -> (PurgeResult, DiskStats) {
    let start = Instant::now();
    let mut files = collect_entry_files(directory);
    let total_size: u64 = files.iter().map(|(_, _, size)| size).sum();
    let mut remaining = DiskStats {
        entries: files.len() as u64,
        bytes: total_size,
    };

    if max_bytes == 0 || total_size <= max_bytes {
        let result = PurgeResult {
            duration_ms: start.elapsed().as_millis() as u64,
            ..PurgeResult::default()
        };
        return (result, remaining);
    }

    let target_size = (max_bytes as f64 * EVICTION_TARGET_PERCENTAGE) as u64;
    info!(
        current_size = total_size,
        limit = max_bytes,
        target = target_size,
        "Disk tile store over limit, starting eviction"
    );

    files.sort_by_key(|(_, mtime, _)| *mtime);

    let mut result = PurgeResult::default();
    for (path, _mtime, size) in files {
        if remaining.bytes <= target_size {
            break;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                result.entries_removed += 1;
                result.bytes_freed += size;
                remaining.bytes = remaining.bytes.saturating_sub(size);
                remaining.entries = remaining.entries.saturating_sub(1);
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Failed to evict entry");
            }
        }
    }

    cleanup_empty_dirs(directory);
    result.duration_ms = start.elapsed().as_millis() as u64;
    (result, remaining)
}

/// Scans a store directory.
pub fn disk_stats(directory: &Path) -> DiskStats {
    let files = collect_entry_files(directory);
    DiskStats {
        entries: files.len() as u64,
        bytes: files.iter().map(|(_, _, size)| size).sum(),
    }
}

/// Deletes every entry and temp file under a store directory.
///
/// Must not be used on a directory an open store is writing to.
pub fn clear_directory(directory: &Path) -> PurgeResult {
    let start = Instant::now();
    let mut result = PurgeResult::default();
    for (path, _mtime, size) in collect_entry_files(directory) {
        if std::fs::remove_file(&path).is_ok() {
            result.entries_removed += 1;
            result.bytes_freed += size;
        }
    }
    for (path, _mtime, _size) in collect_temp_files(directory) {
        let _ = std::fs::remove_file(&path);
    }
    cleanup_empty_dirs(directory);
    result.duration_ms = start.elapsed().as_millis() as u64;
    result
}
