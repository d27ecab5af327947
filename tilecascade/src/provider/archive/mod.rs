//! Read-only tile archives.
//!
//! An [`ArchiveProvider`] holds any number of archives and queries them
//! in registration order; the first archive holding a tile wins. Archive
//! access is blocking and runs on the blocking thread pool.

mod directory;
mod mbtiles;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::types::{Lookup, ModuleKind, TileModule};
use crate::cache::BoxFuture;
use crate::coord::TileIndex;
use crate::error::TileError;

pub use directory::DirectoryArchive;
pub use mbtiles::MbTilesArchive;

/// Errors from archive access.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not an MBTiles archive: {0}")]
    NotMbTiles(String),

    #[error("Invalid archive pattern: {0}")]
    Pattern(String),

    #[error("Archive task failed: {0}")]
    Task(String),
}

/// A read-only container of tiles, looked up by key.
///
/// Lookups are blocking.
pub trait TileArchive: Send + Sync {
    /// Name for logging, usually the file name.
    fn name(&self) -> &str;

    /// Returns the tile bytes, or `None` if the archive does not hold it.
    fn get_tile(&self, index: &TileIndex) -> Result<Option<Vec<u8>>, ArchiveError>;
}

/// Serves tiles from a list of archives.
pub struct ArchiveProvider {
    archives: Arc<Vec<Box<dyn TileArchive>>>,
}

impl ArchiveProvider {
    pub fn new(archives: Vec<Box<dyn TileArchive>>) -> Self {
        Self {
            archives: Arc::new(archives),
        }
    }

    /// Serves every `*.mbtiles` file in `directory`.
    ///
    /// See [`discover_archives`].
    pub fn discover(directory: &Path) -> Result<Self, ArchiveError> {
        Ok(Self::new(discover_archives(directory)?))
    }

    pub fn len(&self) -> usize {
        self.archives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archives.is_empty()
    }

    pub fn archive_names(&self) -> Vec<String> {
        self.archives.iter().map(|a| a.name().to_string()).collect()
    }
}

/// Opens every `*.mbtiles` file in `directory`, sorted by path.
///
/// A missing directory yields no archives; files that fail to open are
/// skipped.
pub fn discover_archives(directory: &Path) -> Result<Vec<Box<dyn TileArchive>>, ArchiveError> {
    let mut paths = find_mbtiles(directory)?;
    paths.sort();

    let mut archives: Vec<Box<dyn TileArchive>> = Vec::with_capacity(paths.len());
    for path in paths {
        match MbTilesArchive::open(&path) {
            Ok(archive) => archives.push(Box::new(archive)),
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable archive"),
        }
    }

    info!(
        dir = %directory.display(),
        count = archives.len(),
        "Tile archives discovered"
    );
    Ok(archives)
}

fn find_mbtiles(directory: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    if !directory.is_dir() {
        return Ok(Vec::new());
    }
    let pattern = directory.join("*.mbtiles");
    let pattern = pattern.to_string_lossy();
    let entries = glob::glob(&pattern).map_err(|e| ArchiveError::Pattern(e.to_string()))?;
    Ok(entries.filter_map(Result::ok).collect())
}

/// Queries archives in order, logging and skipping archives that fail.
fn lookup_blocking(archives: &[Box<dyn TileArchive>], index: &TileIndex) -> Option<Vec<u8>> {
    for archive in archives {
        match archive.get_tile(index) {
            Ok(Some(data)) if !data.is_empty() => {
                debug!(tile = %index, archive = archive.name(), "Archive hit");
                return Some(data);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(tile = %index, archive = archive.name(), error = %e, "Archive lookup failed");
            }
        }
    }
    None
}

impl TileModule for ArchiveProvider {
    fn name(&self) -> &str {
        "archive"
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Archive
    }

    fn load<'a>(&'a self, index: &'a TileIndex) -> BoxFuture<'a, Result<Lookup, TileError>> {
        Box::pin(async move {
            if self.archives.is_empty() {
                return Ok(Lookup::Miss);
            }
            let archives = Arc::clone(&self.archives);
            let key = index.clone();
            let found = tokio::task::spawn_blocking(move || lookup_blocking(&archives, &key))
                .await
                .map_err(|e| ArchiveError::Task(e.to_string()))?;

            Ok(match found {
                Some(data) => Lookup::Exact(Bytes::from(data)),
                None => Lookup::Miss,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FixedArchive {
        name: String,
        tiles: HashMap<TileIndex, Vec<u8>>,
        fail: bool,
    }

    impl TileArchive for FixedArchive {
        fn name(&self) -> &str {
            &self.name
        }

        fn get_tile(&self, index: &TileIndex) -> Result<Option<Vec<u8>>, ArchiveError> {
            if self.fail {
                return Err(ArchiveError::Io(std::io::Error::other("broken")));
            }
            Ok(self.tiles.get(index).cloned())
        }
    }

    fn archive(name: &str, tiles: &[(TileIndex, &[u8])]) -> Box<dyn TileArchive> {
        Box::new(FixedArchive {
            name: name.to_string(),
            tiles: tiles.iter().map(|(k, v)| (k.clone(), v.to_vec())).collect(),
            fail: false,
        })
    }

    #[tokio::test]
    async fn test_first_registered_archive_wins() {
        let index = TileIndex::new("Mapnik", 3, 1, 1);
        let provider = ArchiveProvider::new(vec![
            archive("a", &[(index.clone(), b"first")]),
            archive("b", &[(index.clone(), b"second")]),
        ]);

        assert_eq!(
            provider.load(&index).await.unwrap(),
            Lookup::Exact(Bytes::from_static(b"first"))
        );
    }

    #[tokio::test]
    async fn test_failing_archive_is_skipped() {
        let index = TileIndex::new("Mapnik", 3, 1, 1);
        let provider = ArchiveProvider::new(vec![
            Box::new(FixedArchive {
                name: "broken".into(),
                tiles: HashMap::new(),
                fail: true,
            }),
            archive("good", &[(index.clone(), b"tile")]),
        ]);

        assert_eq!(
            provider.load(&index).await.unwrap(),
            Lookup::Exact(Bytes::from_static(b"tile"))
        );
    }

    #[tokio::test]
    async fn test_empty_provider_misses() {
        let provider = ArchiveProvider::new(Vec::new());
        let index = TileIndex::new("Mapnik", 0, 0, 0);
        assert!(provider.load(&index).await.unwrap().is_miss());
    }

    #[test]
    fn test_discover_missing_directory() {
        let provider = ArchiveProvider::discover(Path::new("/nonexistent/tilecascade")).unwrap();
        assert!(provider.is_empty());
    }

    #[test]
    fn test_discover_sorted_and_skips_bad_files() {
        let dir = tempfile::TempDir::new().unwrap();
        mbtiles::tests::create_mbtiles(&dir.path().join("b.mbtiles"), &[]);
        mbtiles::tests::create_mbtiles(&dir.path().join("a.mbtiles"), &[]);
        std::fs::write(dir.path().join("c.mbtiles"), b"not sqlite").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let provider = ArchiveProvider::discover(dir.path()).unwrap();
        assert_eq!(provider.archive_names(), vec!["a.mbtiles", "b.mbtiles"]);
    }
}
