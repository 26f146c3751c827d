//! Archive-content cache (§4.5): a side-car rusqlite store per ROM root,
//! keyed by archive path, validated by (mtime, size), persisting per-member
//! hashes and detector results. Grounded on `cache.rs`'s `REPLACE INTO` /
//! `Connection::open` idiom, generalized from IGDB/hasheous lookup rows to
//! archive+member rows.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::config::FixOptions;
use crate::error::{Error, Result};
use crate::hashes::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedMember {
    pub name: String,
    pub size: u64,
    pub mtime: i64,
    pub hashes: HashSet,
    pub detector_hashes: Option<HashSet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub mtime: i64,
    pub size: u64,
    pub detector_id: String,
    pub members: Vec<CachedMember>,
}

pub struct Cache {
    conn: Connection,
}

fn mtime_secs(mtime: SystemTime) -> i64 {
    mtime
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl Cache {
    /// Opens (creating if absent) the side-car cache for one ROM root.
    pub fn open(cache_path: &Path) -> Result<Self> {
        if let Some(parent) = cache_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let conn = Connection::open(cache_path)
            .map_err(|e| Error::format(cache_path, format!("opening cache db: {e}")))?;
        let cache = Cache { conn };
        cache.init_schema(cache_path)?;
        Ok(cache)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::format(PathBuf::from(":memory:"), format!("{e}")))?;
        let cache = Cache { conn };
        cache.init_schema(Path::new(":memory:"))?;
        Ok(cache)
    }

    fn init_schema(&self, path: &Path) -> Result<()> {
        self.conn
            .execute_batch(
                "BEGIN;
                CREATE TABLE IF NOT EXISTS archives (
                    path TEXT PRIMARY KEY,
                    mtime INTEGER NOT NULL,
                    size INTEGER NOT NULL,
                    detector_id TEXT NOT NULL,
                    members_json TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                COMMIT;",
            )
            .map_err(|e| Error::format(path, format!("initializing cache schema: {e}")))?;
        Ok(())
    }

    /// A hit requires the stored (mtime, size) to equal the archive's current
    /// tuple and the detector id to match the active detector. Partial hash
    /// coverage is the caller's concern (they compare `requested` types
    /// against each member's populated hash types and trigger a re-scan on a
    /// miss); a full cache-row miss also discards the row on write-back.
    pub fn get(&self, archive_path: &Path, current_mtime: SystemTime, current_size: u64, detector_id: &str) -> Result<Option<CacheEntry>> {
        let key = archive_path.to_string_lossy();
        let row: Option<(i64, i64, String, String)> = self
            .conn
            .prepare("SELECT mtime, size, detector_id, members_json FROM archives WHERE path = ?1")
            .and_then(|mut stmt| {
                stmt.query_row(params![key.as_ref()], |r| {
                    Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
                })
                .optional()
            })
            .map_err(|e| Error::format(archive_path, format!("reading cache: {e}")))?;

        let Some((mtime, size, stored_detector, members_json)) = row else {
            return Ok(None);
        };

        if mtime != mtime_secs(current_mtime) || size as u64 != current_size || stored_detector != detector_id {
            // Stale: mtime/size changed, or the active detector differs. §4.5/§9:
            // no partial-hash migration on detector change — drop and rescan.
            self.invalidate(archive_path)?;
            return Ok(None);
        }

        let members: Vec<CachedMember> = serde_json::from_str(&members_json)
            .map_err(|e| Error::format(archive_path, format!("corrupt cache row: {e}")))?;

        Ok(Some(CacheEntry {
            mtime,
            size: size as u64,
            detector_id: stored_detector,
            members,
        }))
    }

    /// `check.integrity`-aware lookup: with the option set, every row is
    /// treated as a miss so the caller rehashes from disk instead of trusting
    /// the cache.
    pub fn lookup(
        &self,
        archive_path: &Path,
        current_mtime: SystemTime,
        current_size: u64,
        detector_id: &str,
        options: &FixOptions,
    ) -> Result<Option<CacheEntry>> {
        if options.check_integrity {
            return Ok(None);
        }
        self.get(archive_path, current_mtime, current_size, detector_id)
    }

    pub fn put(&self, archive_path: &Path, mtime: SystemTime, size: u64, detector_id: &str, members: &[CachedMember]) -> Result<()> {
        let key = archive_path.to_string_lossy();
        let members_json = serde_json::to_string(members)
            .map_err(|e| Error::format(archive_path, format!("serializing cache row: {e}")))?;
        let now = chrono::Utc::now().timestamp();
        self.conn
            .execute(
                "REPLACE INTO archives (path, mtime, size, detector_id, members_json, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![key.as_ref(), mtime_secs(mtime), size as i64, detector_id, members_json, now],
            )
            .map_err(|e| Error::format(archive_path, format!("writing cache: {e}")))?;
        Ok(())
    }

    /// Deletes the row on archive-corruption or when an archive becomes empty.
    pub fn invalidate(&self, archive_path: &Path) -> Result<()> {
        let key = archive_path.to_string_lossy();
        self.conn
            .execute("DELETE FROM archives WHERE path = ?1", params![key.as_ref()])
            .map_err(|e| Error::format(archive_path, format!("invalidating cache: {e}")))?;
        Ok(())
    }

    /// All cached rows, for populating the global file index at startup.
    pub fn all_entries(&self) -> Result<Vec<(PathBuf, CacheEntry)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT path, mtime, size, detector_id, members_json FROM archives")
            .map_err(|e| Error::format(Path::new("<cache>"), format!("{e}")))?;
        let rows = stmt
            .query_map([], |r| {
                let path: String = r.get(0)?;
                let mtime: i64 = r.get(1)?;
                let size: i64 = r.get(2)?;
                let detector_id: String = r.get(3)?;
                let members_json: String = r.get(4)?;
                Ok((path, mtime, size, detector_id, members_json))
            })
            .map_err(|e| Error::format(Path::new("<cache>"), format!("{e}")))?;

        let mut out = Vec::new();
        for row in rows {
            let (path, mtime, size, detector_id, members_json) =
                row.map_err(|e| Error::format(Path::new("<cache>"), format!("{e}")))?;
            let members: Vec<CachedMember> = match serde_json::from_str(&members_json) {
                Ok(m) => m,
                Err(_) => continue, // corrupt row: skip it, caller will rescan on demand
            };
            out.push((
                PathBuf::from(path),
                CacheEntry {
                    mtime,
                    size: size as u64,
                    detector_id,
                    members,
                },
            ));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashes::HashType;

    fn sample_members() -> Vec<CachedMember> {
        vec![CachedMember {
            name: "rom.bin".into(),
            size: 4,
            mtime: 0,
            hashes: HashSet::from_hex_string(HashType::Crc32, "12345678").unwrap(),
            detector_hashes: None,
        }]
    }

    #[test]
    fn hit_requires_matching_mtime_size_and_detector() {
        let cache = Cache::open_in_memory().unwrap();
        let path = Path::new("/roms/g1.zip");
        let mtime = UNIX_EPOCH + std::time::Duration::from_secs(1000);
        cache.put(path, mtime, 128, "det-a", &sample_members()).unwrap();

        assert!(cache.get(path, mtime, 128, "det-a").unwrap().is_some());
        assert!(cache.get(path, mtime, 129, "det-a").unwrap().is_none());
        assert!(cache.get(path, mtime, 128, "det-b").unwrap().is_none());
    }

    #[test]
    fn check_integrity_forces_a_cache_miss() {
        let cache = Cache::open_in_memory().unwrap();
        let path = Path::new("/roms/g1.zip");
        let mtime = UNIX_EPOCH + std::time::Duration::from_secs(1000);
        cache.put(path, mtime, 128, "det-a", &sample_members()).unwrap();

        let mut options = crate::config::FixOptions::default();
        assert!(cache.lookup(path, mtime, 128, "det-a", &options).unwrap().is_some());

        options.check_integrity = true;
        assert!(cache.lookup(path, mtime, 128, "det-a", &options).unwrap().is_none());
    }

    #[test]
    fn stale_hit_invalidates_row() {
        let cache = Cache::open_in_memory().unwrap();
        let path = Path::new("/roms/g1.zip");
        let mtime = UNIX_EPOCH + std::time::Duration::from_secs(1000);
        cache.put(path, mtime, 128, "det-a", &sample_members()).unwrap();

        let later = UNIX_EPOCH + std::time::Duration::from_secs(2000);
        assert!(cache.get(path, later, 128, "det-a").unwrap().is_none());
        // Row was dropped, so even the original tuple now misses.
        assert!(cache.get(path, mtime, 128, "det-a").unwrap().is_none());
    }
}
