//! Reference catalog: read-only-in-spirit store of games with an inverted
//! hash→(game,index) lookup. The parser that fills one (CM/Logiqx XML/
//! RomCenter/directory-scrape) is out of scope (§1); this module defines the
//! collaborator interface plus an in-memory implementation useful for tests
//! and for callers who build the catalog themselves. Grounded on
//! `dat.rs::DatIndex`'s hash-indexing shape.

use std::collections::HashMap;

use crate::file::{File, FileKind};
use crate::game::Game;
use crate::hashes::HashSet as FileHashSet;

/// A (game-name, file-index-within-kind) pointer into the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileRef {
    pub game: String,
    pub kind: FileKind,
    pub index: usize,
}

pub trait Catalog {
    fn read_game(&self, name: &str) -> Option<&Game>;
    fn read_file_by_hash(&self, hashes: &FileHashSet) -> Vec<FileRef>;
    fn write_game(&mut self, game: Game);
    fn update_game_parent(&mut self, name: &str, parent: Option<String>);
    fn update_file_location(&mut self, file_ref: &FileRef, location: crate::file::Where);
    fn game_names(&self) -> Vec<String>;
}

/// In-memory catalog. The index key is a coarse bucket (CRC32 hex if present,
/// else a size-only bucket) so lookups stay O(candidates) like §4.6's global
/// index, not a full table scan.
#[derive(Default)]
pub struct MemoryCatalog {
    games: HashMap<String, Game>,
    index: HashMap<String, Vec<FileRef>>,
}

fn bucket_key(hashes: &FileHashSet) -> String {
    use crate::hashes::HashType;
    if let Some(crc) = hashes.hex(HashType::Crc32) {
        format!("crc:{crc}")
    } else if let Some(size) = hashes.size {
        format!("size:{size}")
    } else {
        "unknown".to_string()
    }
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn reindex_game(&mut self, name: &str) {
        self.index.retain(|_, refs| {
            refs.retain(|r| r.game != name);
            !refs.is_empty()
        });
        if let Some(game) = self.games.get(name) {
            for kind in [FileKind::Rom, FileKind::Disk, FileKind::Sample] {
                if let Some(files) = game.files.get(&kind) {
                    for (index, file) in files.iter().enumerate() {
                        let key = bucket_key(&file.hashes);
                        self.index.entry(key).or_default().push(FileRef {
                            game: name.to_string(),
                            kind,
                            index,
                        });
                    }
                }
            }
        }
    }
}

impl Catalog for MemoryCatalog {
    fn read_game(&self, name: &str) -> Option<&Game> {
        self.games.get(name)
    }

    fn read_file_by_hash(&self, hashes: &FileHashSet) -> Vec<FileRef> {
        let key = bucket_key(hashes);
        self.index
            .get(&key)
            .into_iter()
            .flatten()
            .filter(|r| {
                self.games
                    .get(&r.game)
                    .and_then(|g| g.files.get(&r.kind))
                    .and_then(|files| files.get(r.index))
                    .map(|f| f.hashes.compare(hashes) != crate::hashes::Comparison::Mismatch)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    fn write_game(&mut self, game: Game) {
        let name = game.name.clone();
        self.games.insert(name.clone(), game);
        self.reindex_game(&name);
    }

    fn update_game_parent(&mut self, name: &str, parent: Option<String>) {
        if let Some(game) = self.games.get_mut(name) {
            match parent {
                Some(p) => game.set_parent(p),
                None => game.cloneof[0].clear(),
            }
        }
    }

    fn update_file_location(&mut self, file_ref: &FileRef, location: crate::file::Where) {
        if let Some(game) = self.games.get_mut(&file_ref.game) {
            if let Some(files) = game.files.get_mut(&file_ref.kind) {
                if let Some(file) = files.get_mut(file_ref.index) {
                    file.location = location;
                }
            }
        }
    }

    fn game_names(&self) -> Vec<String> {
        self.games.keys().cloned().collect()
    }
}

pub fn resolve_file<'a>(catalog: &'a dyn Catalog, r: &FileRef) -> Option<&'a File> {
    catalog
        .read_game(&r.game)?
        .files
        .get(&r.kind)?
        .get(r.index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashes::HashType;

    fn hashed(crc: &str, size: u64) -> FileHashSet {
        let mut h = FileHashSet::from_hex_string(HashType::Crc32, crc).unwrap();
        h.set_size(size);
        h
    }

    #[test]
    fn read_file_by_hash_finds_inserted_rom() {
        let mut cat = MemoryCatalog::new();
        let mut g = Game::new("g1");
        g.roms_mut()
            .push(File::new("right.bin", Some(4), hashed("12345678", 4)));
        cat.write_game(g);

        let hits = cat.read_file_by_hash(&hashed("12345678", 4));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].game, "g1");
    }

    #[test]
    fn rewriting_a_game_drops_its_old_index_entries() {
        let mut cat = MemoryCatalog::new();
        let mut g = Game::new("g1");
        g.roms_mut()
            .push(File::new("a.bin", Some(4), hashed("aaaaaaaa", 4)));
        cat.write_game(g);

        let mut g2 = Game::new("g1");
        g2.roms_mut()
            .push(File::new("b.bin", Some(4), hashed("bbbbbbbb", 4)));
        cat.write_game(g2);

        assert!(cat.read_file_by_hash(&hashed("aaaaaaaa", 4)).is_empty());
        assert_eq!(cat.read_file_by_hash(&hashed("bbbbbbbb", 4)).len(), 1);
    }
}
