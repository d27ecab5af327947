//! Plain directory archives laid out as `{root}/{source}/{z}/{x}/{y}{ext}`.

use std::path::PathBuf;
use std::sync::Arc;

use super::{ArchiveError, TileArchive};
use crate::coord::TileIndex;
use crate::source::TileSource;

/// Read-only tile tree on disk, e.g. an unpacked tile export.
pub struct DirectoryArchive {
    name: String,
    root: PathBuf,
    source: Arc<TileSource>,
}

impl DirectoryArchive {
    pub fn new(root: impl Into<PathBuf>, source: Arc<TileSource>) -> Self {
        let root = root.into();
        Self {
            name: root.display().to_string(),
            root,
            source,
        }
    }
}

impl TileArchive for DirectoryArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_tile(&self, index: &TileIndex) -> Result<Option<Vec<u8>>, ArchiveError> {
        if index.source() != self.source.name() {
            return Ok(None);
        }
        match std::fs::read(self.root.join(self.source.relative_path(index))) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_directory_lookup() {
        let dir = TempDir::new().unwrap();
        let tile_dir = dir.path().join("Mapnik/5/10");
        std::fs::create_dir_all(&tile_dir).unwrap();
        std::fs::write(tile_dir.join("12.png"), b"png").unwrap();

        let source = Arc::new(TileSource::mapnik());
        let archive = DirectoryArchive::new(dir.path(), Arc::clone(&source));

        assert_eq!(
            archive.get_tile(&source.index(5, 10, 12)).unwrap(),
            Some(b"png".to_vec())
        );
        assert_eq!(archive.get_tile(&source.index(5, 10, 13)).unwrap(), None);
    }
}
