use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// The two on-disk schema layouts a store can be created with.
///
/// Existing data may exist in either, so both remain producible; the
/// caller picks one explicitly, nothing is chosen silently.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Generation {
    /// Legacy layout: a `styles` table plus `tiles(style_id, zoom, x, y,
    /// data)` with a unique index over all four key columns.
    A,
    /// MBTiles-style layout: `metadata(name, value)` plus
    /// `tiles(zoom_level, tile_column, tile_row, tile_data)`, one store
    /// file per style with the style name kept as a metadata row.
    B,
}

impl FromStr for Generation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "a" | "A" => Ok(Generation::A),
            "b" | "B" => Ok(Generation::B),
            other => Err(Error::InvalidConfig(format!(
                "unknown store generation '{other}', expected 'a' or 'b'"
            ))),
        }
    }
}

/// Counts reported by a directory ingestion walk.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct IngestReport {
    pub ingested: u64,
    pub skipped: u64,
}

/// Persistent key-value store mapping `(zoom, column, row)` to tile
/// image bytes, backed by SQLite.
pub struct TileStore {
    conn: Connection,
    generation: Generation,
    /// Lazily populated style-name to row-id map, generation A only.
    style_ids: HashMap<String, i64>,
}

impl TileStore {
    /// Opens (or creates) a store at `path` with the given schema
    /// generation. Tables are created if missing.
    pub fn open(path: &Path, generation: Generation) -> Result<Self> {
        let conn = Connection::open(path)?;
        match generation {
            Generation::A => conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS styles (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE
                );
                CREATE TABLE IF NOT EXISTS tiles (
                    id INTEGER PRIMARY KEY,
                    style_id INTEGER NOT NULL REFERENCES styles (id),
                    zoom INTEGER NOT NULL,
                    x INTEGER NOT NULL,
                    y INTEGER NOT NULL,
                    data BLOB NOT NULL
                );
                CREATE UNIQUE INDEX IF NOT EXISTS tile_index
                    ON tiles (style_id, zoom, x, y);",
            )?,
            Generation::B => conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS metadata (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL,
                    value TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS tiles (
                    id INTEGER PRIMARY KEY,
                    zoom_level INTEGER NOT NULL,
                    tile_column INTEGER NOT NULL,
                    tile_row INTEGER NOT NULL,
                    tile_data BLOB NOT NULL
                );
                CREATE UNIQUE INDEX IF NOT EXISTS tile_index
                    ON tiles (zoom_level, tile_column, tile_row);",
            )?,
        }

        Ok(Self {
            conn,
            generation,
            style_ids: HashMap::new(),
        })
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Inserts the tile or replaces its image bytes if the key exists.
    ///
    /// The key is `(zoom, column, row)`, additionally scoped by `style`
    /// for generation A stores; generation B stores are per-style files
    /// and ignore the style argument.
    pub fn upsert(&mut self, style: &str, zoom: u8, column: u32, row: u32, data: &[u8]) -> Result<()> {
        match self.generation {
            Generation::A => {
                let style_id = style_id(&self.conn, &mut self.style_ids, style)?;
                upsert_a(&self.conn, style_id, zoom, column, row, data)
            }
            Generation::B => upsert_b(&self.conn, zoom, column, row, data),
        }
    }

    /// Fetches the stored image bytes for a key, if present.
    pub fn get_tile(&self, style: &str, zoom: u8, column: u32, row: u32) -> Result<Option<Vec<u8>>> {
        let data = match self.generation {
            Generation::A => self
                .conn
                .query_row(
                    "SELECT t.data FROM tiles t
                     JOIN styles s ON s.id = t.style_id
                     WHERE s.name = ?1 AND t.zoom = ?2 AND t.x = ?3 AND t.y = ?4",
                    params![style, zoom, column, row],
                    |row| row.get(0),
                )
                .optional()?,
            Generation::B => self
                .conn
                .query_row(
                    "SELECT tile_data FROM tiles
                     WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3",
                    params![zoom, column, row],
                    |row| row.get(0),
                )
                .optional()?,
        };
        Ok(data)
    }

    /// Number of tile records in the store.
    pub fn tile_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tiles", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Reads a metadata value, last write wins. Generation B only.
    pub fn get_setting(&self, name: &str) -> Result<Option<String>> {
        if self.generation != Generation::B {
            return Err(Error::SettingsUnsupported);
        }
        setting_get(&self.conn, name)
    }

    /// Writes a metadata value, keeping one row per name. Generation B only.
    pub fn set_setting(&mut self, name: &str, value: &str) -> Result<()> {
        if self.generation != Generation::B {
            return Err(Error::SettingsUnsupported);
        }
        setting_set(&self.conn, name, value)
    }

    /// Walks a directory tree of downloaded tiles and upserts every file
    /// matching the `<style>/<zoom>/<x>/<y>.png` convention.
    ///
    /// Non-matching files are skipped (and logged). Each directory is
    /// committed as one transaction, so an interrupted walk loses at
    /// most the directory it was in.
    pub fn ingest(&mut self, root: &Path) -> Result<IngestReport> {
        let pattern = Regex::new(r"^.*/(?P<style>[a-z]+)/(?P<zoom>\d+)/(?P<x>\d+)/(?P<y>\d+)\.png$")
            .expect("valid tile path pattern");

        let mut report = IngestReport::default();

        let mut dirs = vec![root.to_path_buf()];
        for entry in WalkDir::new(root).min_depth(1) {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.file_type().is_dir() {
                dirs.push(entry.into_path());
            }
        }

        let generation = self.generation;
        let style_ids = &mut self.style_ids;
        let conn = &mut self.conn;

        for dir in dirs {
            let tx = conn.transaction()?;

            for entry in fs::read_dir(&dir)? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                let path = entry.path();
                let text = path.to_string_lossy();

                let Some(captures) = pattern.captures(&text) else {
                    debug!("skipping {text}");
                    report.skipped += 1;
                    continue;
                };

                // The pattern guarantees these parse; huge indices are a
                // malformed tree and skipped like any other mismatch.
                let style = &captures["style"];
                let (Ok(zoom), Ok(x), Ok(y)) = (
                    captures["zoom"].parse::<u8>(),
                    captures["x"].parse::<u32>(),
                    captures["y"].parse::<u32>(),
                ) else {
                    warn!("skipping {text}: tile index out of range");
                    report.skipped += 1;
                    continue;
                };

                let data = fs::read(&path)?;
                debug!("ingesting {text}");

                match generation {
                    Generation::A => {
                        let id = style_id(&tx, style_ids, style)?;
                        upsert_a(&tx, id, zoom, x, y, &data)?;
                    }
                    Generation::B => {
                        if setting_get(&tx, "name")?.is_none() {
                            setting_set(&tx, "name", style)?;
                        }
                        upsert_b(&tx, zoom, x, y, &data)?;
                    }
                }
                report.ingested += 1;
            }

            tx.commit()?;
        }

        info!(
            "ingested {} tile(s) from {}, skipped {}",
            report.ingested,
            root.display(),
            report.skipped
        );
        Ok(report)
    }
}

/// Resolves a style name to its row id, inserting on first sight. The
/// map is owned by the store and populated lazily.
fn style_id(conn: &Connection, cache: &mut HashMap<String, i64>, name: &str) -> Result<i64> {
    if let Some(&id) = cache.get(name) {
        return Ok(id);
    }

    let existing: Option<i64> = conn
        .query_row("SELECT id FROM styles WHERE name = ?1", params![name], |row| {
            row.get(0)
        })
        .optional()?;

    let id = match existing {
        Some(id) => id,
        None => {
            conn.execute("INSERT INTO styles (name) VALUES (?1)", params![name])?;
            conn.last_insert_rowid()
        }
    };

    cache.insert(name.to_owned(), id);
    Ok(id)
}

// The key columns carry a unique index, so upsert is update-if-exists-
// else-insert against a single record and never hits a conflict.

fn upsert_a(conn: &Connection, style_id: i64, zoom: u8, x: u32, y: u32, data: &[u8]) -> Result<()> {
    let updated = conn.execute(
        "UPDATE tiles SET data = ?5 WHERE style_id = ?1 AND zoom = ?2 AND x = ?3 AND y = ?4",
        params![style_id, zoom, x, y, data],
    )?;
    if updated == 0 {
        conn.execute(
            "INSERT INTO tiles (style_id, zoom, x, y, data) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![style_id, zoom, x, y, data],
        )?;
    }
    Ok(())
}

fn upsert_b(conn: &Connection, zoom: u8, column: u32, row: u32, data: &[u8]) -> Result<()> {
    let updated = conn.execute(
        "UPDATE tiles SET tile_data = ?4
         WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3",
        params![zoom, column, row, data],
    )?;
    if updated == 0 {
        conn.execute(
            "INSERT INTO tiles (zoom_level, tile_column, tile_row, tile_data)
             VALUES (?1, ?2, ?3, ?4)",
            params![zoom, column, row, data],
        )?;
    }
    Ok(())
}

fn setting_get(conn: &Connection, name: &str) -> Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM metadata WHERE name = ?1 ORDER BY id DESC LIMIT 1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

fn setting_set(conn: &Connection, name: &str, value: &str) -> Result<()> {
    let updated = conn.execute(
        "UPDATE metadata SET value = ?2 WHERE name = ?1",
        params![name, value],
    )?;
    if updated == 0 {
        conn.execute(
            "INSERT INTO metadata (name, value) VALUES (?1, ?2)",
            params![name, value],
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store(generation: Generation) -> (tempfile::TempDir, TileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = TileStore::open(&dir.path().join("tiles.db"), generation).unwrap();
        (dir, store)
    }

    #[test]
    fn upsert_is_idempotent_per_key() {
        for generation in [Generation::A, Generation::B] {
            let (_dir, mut store) = open_store(generation);

            store.upsert("atlas", 5, 3, 7, b"bytesA").unwrap();
            store.upsert("atlas", 5, 3, 7, b"bytesB").unwrap();

            assert_eq!(store.tile_count().unwrap(), 1, "{generation:?}");
            assert_eq!(
                store.get_tile("atlas", 5, 3, 7).unwrap().as_deref(),
                Some(&b"bytesB"[..])
            );
        }
    }

    #[test]
    fn distinct_keys_coexist() {
        let (_dir, mut store) = open_store(Generation::B);

        store.upsert("atlas", 5, 3, 7, b"a").unwrap();
        store.upsert("atlas", 5, 3, 8, b"b").unwrap();
        store.upsert("atlas", 6, 3, 7, b"c").unwrap();

        assert_eq!(store.tile_count().unwrap(), 3);
        assert_eq!(store.get_tile("atlas", 6, 3, 7).unwrap(), Some(b"c".to_vec()));
    }

    #[test]
    fn generation_a_scopes_by_style() {
        let (_dir, mut store) = open_store(Generation::A);

        store.upsert("atlas", 5, 3, 7, b"atlas-bytes").unwrap();
        store.upsert("cycle", 5, 3, 7, b"cycle-bytes").unwrap();

        assert_eq!(store.tile_count().unwrap(), 2);
        assert_eq!(
            store.get_tile("atlas", 5, 3, 7).unwrap(),
            Some(b"atlas-bytes".to_vec())
        );
        assert_eq!(
            store.get_tile("cycle", 5, 3, 7).unwrap(),
            Some(b"cycle-bytes".to_vec())
        );
    }

    #[test]
    fn settings_are_last_write_wins() {
        let (_dir, mut store) = open_store(Generation::B);

        assert_eq!(store.get_setting("name").unwrap(), None);
        store.set_setting("name", "atlas").unwrap();
        store.set_setting("name", "cycle").unwrap();

        assert_eq!(store.get_setting("name").unwrap(), Some("cycle".to_owned()));

        let rows: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM metadata WHERE name = 'name'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn settings_are_rejected_on_generation_a() {
        let (_dir, mut store) = open_store(Generation::A);
        assert!(matches!(
            store.get_setting("name").unwrap_err(),
            Error::SettingsUnsupported
        ));
        assert!(matches!(
            store.set_setting("name", "x").unwrap_err(),
            Error::SettingsUnsupported
        ));
    }

    #[test]
    fn ingest_matches_the_path_convention() {
        let (_dir, mut store) = open_store(Generation::B);

        let tree = tempfile::tempdir().unwrap();
        let tile_dir = tree.path().join("foo/atlas/8/12");
        fs::create_dir_all(&tile_dir).unwrap();
        fs::write(tile_dir.join("34.png"), b"tile-bytes").unwrap();
        fs::write(tree.path().join("foo/notatile.txt"), b"junk").unwrap();

        let report = store.ingest(tree.path()).unwrap();
        assert_eq!(report.ingested, 1);
        assert_eq!(report.skipped, 1);

        assert_eq!(
            store.get_tile("atlas", 8, 12, 34).unwrap(),
            Some(b"tile-bytes".to_vec())
        );
        assert_eq!(store.get_setting("name").unwrap(), Some("atlas".to_owned()));
    }

    #[test]
    fn ingest_overwrites_existing_tiles() {
        let (_dir, mut store) = open_store(Generation::A);

        let tree = tempfile::tempdir().unwrap();
        let tile_dir = tree.path().join("atlas/8/12");
        fs::create_dir_all(&tile_dir).unwrap();

        fs::write(tile_dir.join("34.png"), b"first").unwrap();
        store.ingest(tree.path()).unwrap();

        fs::write(tile_dir.join("34.png"), b"second").unwrap();
        let report = store.ingest(tree.path()).unwrap();

        assert_eq!(report.ingested, 1);
        assert_eq!(store.tile_count().unwrap(), 1);
        assert_eq!(
            store.get_tile("atlas", 8, 12, 34).unwrap(),
            Some(b"second".to_vec())
        );
    }

    #[test]
    fn ingest_skips_uppercase_styles() {
        let (_dir, mut store) = open_store(Generation::B);

        let tree = tempfile::tempdir().unwrap();
        let tile_dir = tree.path().join("Atlas/8/12");
        fs::create_dir_all(&tile_dir).unwrap();
        fs::write(tile_dir.join("34.png"), b"x").unwrap();

        let report = store.ingest(tree.path()).unwrap();
        assert_eq!(report.ingested, 0);
        assert_eq!(report.skipped, 1);
    }
}
