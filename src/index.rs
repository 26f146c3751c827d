//! Global file index (§4.6): a content-addressed map from hash fingerprint to
//! every on-disk location known to hold matching bytes, spanning ROM roots
//! outside the active DAT's own archives (the "extra"/"needed" pools). Built
//! by walking cache rows rather than re-hashing, mirroring the teacher's
//! `cache.rs` read path; bucketing follows `catalog.rs::bucket_key`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::cache::Cache;
use crate::hashes::HashSet as FileHashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub archive_path: PathBuf,
    pub member_name: String,
    pub size: u64,
}

fn bucket_key(hashes: &FileHashSet) -> String {
    if let Some(h) = hashes.hex(crate::hashes::HashType::Sha256) {
        return h;
    }
    if let Some(h) = hashes.hex(crate::hashes::HashType::Sha1) {
        return h;
    }
    if let Some(h) = hashes.hex(crate::hashes::HashType::Md5) {
        return h;
    }
    if let Some(h) = hashes.hex(crate::hashes::HashType::Crc32) {
        return h;
    }
    match hashes.size {
        Some(size) => format!("size:{size}"),
        None => "unknown".to_string(),
    }
}

/// In-memory index over every known archive member, keyed by hash bucket.
/// Populated once per run from one or more caches and consulted by the
/// matcher when looking for files outside the current game's own archive.
#[derive(Debug, Clone, Default)]
pub struct FileIndex {
    buckets: HashMap<String, Vec<IndexEntry>>,
}

impl FileIndex {
    pub fn new() -> Self {
        FileIndex::default()
    }

    pub fn insert(&mut self, hashes: &FileHashSet, entry: IndexEntry) {
        self.buckets.entry(bucket_key(hashes)).or_default().push(entry);
    }

    pub fn remove(&mut self, hashes: &FileHashSet, archive_path: &Path, member_name: &str) {
        if let Some(bucket) = self.buckets.get_mut(&bucket_key(hashes)) {
            bucket.retain(|e| !(e.archive_path == archive_path && e.member_name == member_name));
        }
    }

    pub fn lookup(&self, hashes: &FileHashSet) -> &[IndexEntry] {
        self.buckets
            .get(&bucket_key(hashes))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rebuilds the index from a cache's stored rows, without re-hashing any
    /// file. Used at startup to seed the index over extra/needed roots whose
    /// caches are already populated from a prior run.
    pub fn load_from_cache(&mut self, cache: &Cache) -> crate::error::Result<()> {
        for (archive_path, entry) in cache.all_entries()? {
            for member in entry.members {
                self.insert(
                    &member.hashes,
                    IndexEntry {
                        archive_path: archive_path.clone(),
                        member_name: member.name,
                        size: member.size,
                    },
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashes::HashType;

    fn hashes_with_crc(crc: &str) -> FileHashSet {
        FileHashSet::from_hex_string(HashType::Crc32, crc).unwrap()
    }

    #[test]
    fn insert_and_lookup_roundtrip() {
        let mut index = FileIndex::new();
        let hashes = hashes_with_crc("deadbeef");
        index.insert(
            &hashes,
            IndexEntry {
                archive_path: PathBuf::from("/extra/g1.zip"),
                member_name: "rom.bin".into(),
                size: 10,
            },
        );
        let hits = index.lookup(&hashes);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].member_name, "rom.bin");
    }

    #[test]
    fn remove_drops_matching_entry_only() {
        let mut index = FileIndex::new();
        let hashes = hashes_with_crc("cafef00d");
        let entry_a = IndexEntry {
            archive_path: PathBuf::from("/extra/a.zip"),
            member_name: "r.bin".into(),
            size: 1,
        };
        let entry_b = IndexEntry {
            archive_path: PathBuf::from("/extra/b.zip"),
            member_name: "r.bin".into(),
            size: 1,
        };
        index.insert(&hashes, entry_a.clone());
        index.insert(&hashes, entry_b.clone());
        index.remove(&hashes, &entry_a.archive_path, &entry_a.member_name);
        let hits = index.lookup(&hashes);
        assert_eq!(hits, &[entry_b]);
    }

    #[test]
    fn size_only_bucket_used_when_no_hashes_known() {
        let mut hashes = FileHashSet::new();
        hashes.set_size(42);
        let mut index = FileIndex::new();
        index.insert(
            &hashes,
            IndexEntry {
                archive_path: PathBuf::from("/extra/g.zip"),
                member_name: "r.bin".into(),
                size: 42,
            },
        );
        assert_eq!(index.lookup(&hashes).len(), 1);
    }
}
