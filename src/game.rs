//! Game record: name, parent/grandparent (`cloneof`), description, expected
//! files by kind. Grounded on `dat.rs::DatRom`'s field shape, generalized from
//! a flat ROM record to the spec's per-game expected-file-set model.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::file::{File, FileKind};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Game {
    pub name: String,
    /// `[parent, grandparent]`; empty string means "no ancestor at that level".
    /// `cloneof[0] == name` is illegal and is normalized to empty by [`Game::new`].
    pub cloneof: [String; 2],
    pub description: String,
    pub files: HashMap<FileKind, Vec<File>>,
}

impl Game {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Game {
            name,
            cloneof: [String::new(), String::new()],
            description: String::new(),
            files: HashMap::new(),
        }
    }

    /// Normalizes `cloneof[0] == name` (a self-loop) to empty, per §3.
    pub fn set_parent(&mut self, parent: impl Into<String>) {
        let parent = parent.into();
        if parent != self.name {
            self.cloneof[0] = parent;
        }
    }

    pub fn set_grandparent(&mut self, grandparent: impl Into<String>) {
        let grandparent = grandparent.into();
        if grandparent != self.name {
            self.cloneof[1] = grandparent;
        }
    }

    pub fn parent(&self) -> Option<&str> {
        (!self.cloneof[0].is_empty()).then(|| self.cloneof[0].as_str())
    }

    pub fn grandparent(&self) -> Option<&str> {
        (!self.cloneof[1].is_empty()).then(|| self.cloneof[1].as_str())
    }

    pub fn roms(&self) -> &[File] {
        self.files.get(&FileKind::Rom).map_or(&[], |v| v.as_slice())
    }

    pub fn roms_mut(&mut self) -> &mut Vec<File> {
        self.files.entry(FileKind::Rom).or_default()
    }

    pub fn disks(&self) -> &[File] {
        self.files.get(&FileKind::Disk).map_or(&[], |v| v.as_slice())
    }

    pub fn disks_mut(&mut self) -> &mut Vec<File> {
        self.files.entry(FileKind::Disk).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_loop_parent_is_normalized_to_empty() {
        let mut g = Game::new("foo");
        g.set_parent("foo");
        assert_eq!(g.parent(), None);
    }

    #[test]
    fn unrelated_parent_is_kept() {
        let mut g = Game::new("foo");
        g.set_parent("bar");
        assert_eq!(g.parent(), Some("bar"));
    }
}
