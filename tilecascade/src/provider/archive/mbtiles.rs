//! MBTiles archives.
//!
//! An MBTiles file is an SQLite database with a `tiles` table keyed by
//! `(zoom_level, tile_column, tile_row)`. Rows use the TMS scheme, so the
//! row is flipped relative to XYZ: `tile_row = 2^zoom - 1 - y`.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::debug;

use super::{ArchiveError, TileArchive};
use crate::coord::TileIndex;

const TILE_QUERY: &str =
    "SELECT tile_data FROM tiles WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3";

/// Read-only MBTiles archive.
pub struct MbTilesArchive {
    name: String,
    conn: Mutex<Connection>,
}

impl MbTilesArchive {
    /// Opens an MBTiles file read-only.
    ///
    /// # Errors
    ///
    /// Fails if the file is not an SQLite database with a `tiles` table.
    pub fn open(path: &Path) -> Result<Self, ArchiveError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let has_tiles = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type IN ('table', 'view') AND name = 'tiles'",
                [],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !has_tiles {
            return Err(ArchiveError::NotMbTiles(path.display().to_string()));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        debug!(archive = %name, "MBTiles archive opened");

        Ok(Self {
            name,
            conn: Mutex::new(conn),
        })
    }
}

/// Converts an XYZ row to a TMS row.
fn tms_row(index: &TileIndex) -> i64 {
    (TileIndex::grid_size(index.zoom()) as i64) - 1 - index.y() as i64
}

impl TileArchive for MbTilesArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_tile(&self, index: &TileIndex) -> Result<Option<Vec<u8>>, ArchiveError> {
        let conn = self.conn.lock();
        let data = conn
            .query_row(
                TILE_QUERY,
                params![index.zoom() as i64, index.x() as i64, tms_row(index)],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(data)
    }
}

#[cfg(test)]
pub(super) mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Creates an MBTiles file holding `(zoom, column, tms_row, data)` rows.
    pub(crate) fn create_mbtiles(path: &Path, tiles: &[(u8, u32, u32, &[u8])]) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE metadata (name TEXT, value TEXT);
             CREATE TABLE tiles (zoom_level INTEGER, tile_column INTEGER, tile_row INTEGER, tile_data BLOB);",
        )
        .unwrap();
        for (zoom, column, row, data) in tiles {
            conn.execute(
                "INSERT INTO tiles (zoom_level, tile_column, tile_row, tile_data) VALUES (?1, ?2, ?3, ?4)",
                params![*zoom as i64, *column as i64, *row as i64, data.to_vec()],
            )
            .unwrap();
        }
    }

    #[test]
    fn test_lookup_flips_row() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("world.mbtiles");
        // XYZ (z=2, x=1, y=0) is TMS row 3
        create_mbtiles(&path, &[(2, 1, 3, b"north")]);

        let archive = MbTilesArchive::open(&path).unwrap();
        let tile = archive.get_tile(&TileIndex::new("Mapnik", 2, 1, 0)).unwrap();
        assert_eq!(tile.as_deref(), Some(&b"north"[..]));
        assert!(archive
            .get_tile(&TileIndex::new("Mapnik", 2, 1, 3))
            .unwrap()
            .is_none());
        assert_eq!(archive.name(), "world.mbtiles");
    }

    #[test]
    fn test_open_rejects_non_mbtiles() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.mbtiles");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE other (id INTEGER);")
            .unwrap();

        assert!(matches!(
            MbTilesArchive::open(&path),
            Err(ArchiveError::NotMbTiles(_))
        ));
    }

    #[test]
    fn test_open_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("garbage.mbtiles");
        std::fs::write(&path, b"definitely not sqlite, just some bytes padded out").unwrap();
        assert!(MbTilesArchive::open(&path).is_err());
    }

    #[test]
    fn test_tms_row() {
        assert_eq!(tms_row(&TileIndex::new("Mapnik", 0, 0, 0)), 0);
        assert_eq!(tms_row(&TileIndex::new("Mapnik", 3, 0, 0)), 7);
        assert_eq!(tms_row(&TileIndex::new("Mapnik", 3, 0, 7)), 0);
    }
}
