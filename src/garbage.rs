//! Garbage/Needed staging (§4.12): `garbage/<basename>` archives sit beside
//! the working archive and are created lazily on first write, per
//! `original_source/src/garbage.c`; `needed/` is one well-known pool root
//! where files land under `<hash-prefix>-<original-name>` so a later game can
//! find them again by content rather than by a run-specific counter.

use std::path::{Path, PathBuf};

use crate::archive::{Archive, ArchiveKind, Location, OpenFlags};
use crate::error::Result;
use crate::hashes::{HashSet, HashType};

/// Lazily opens (and creates on first use) the garbage archive sibling to a
/// working archive at `<dir>/garbage/<basename>`.
pub struct GarbageStaging {
    kind: ArchiveKind,
    flags: OpenFlags,
    archive: Option<Archive>,
    path: PathBuf,
}

fn garbage_path_for(working_archive: &Path) -> PathBuf {
    let dir = working_archive.parent().unwrap_or_else(|| Path::new("."));
    let basename = working_archive
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("unknown"));
    dir.join("garbage").join(basename)
}

impl GarbageStaging {
    pub fn new(working_archive: &Path, kind: ArchiveKind) -> Self {
        GarbageStaging {
            kind,
            flags: OpenFlags {
                create: true,
                ..Default::default()
            },
            archive: None,
            path: garbage_path_for(working_archive),
        }
    }

    /// No archive appears on disk until the first write touches it.
    pub fn archive_for(&mut self) -> Result<&mut Archive> {
        if self.archive.is_none() {
            self.archive = Some(Archive::open(&self.path, self.kind, Location::Extra, self.flags)?);
        }
        Ok(self.archive.as_mut().unwrap())
    }

    pub fn was_opened(&self) -> bool {
        self.archive.is_some()
    }

    pub fn commit(&mut self) -> Result<()> {
        match self.archive.as_mut() {
            Some(a) => a.commit(),
            None => Ok(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The single `needed/` pool root; files land under
/// `<hash-prefix>-<original-name>` so they're findable by content across runs.
pub struct NeededStaging {
    root: PathBuf,
    kind: ArchiveKind,
    flags: OpenFlags,
}

fn hash_prefix(hashes: &HashSet) -> String {
    hashes
        .hex(HashType::Sha1)
        .or_else(|| hashes.hex(HashType::Md5))
        .or_else(|| hashes.hex(HashType::Crc32))
        .map(|h| h.chars().take(8).collect())
        .unwrap_or_else(|| "unhashed".to_string())
}

impl NeededStaging {
    pub fn new(root: impl Into<PathBuf>, kind: ArchiveKind) -> Self {
        NeededStaging {
            root: root.into(),
            kind,
            flags: OpenFlags {
                create: true,
                ..Default::default()
            },
        }
    }

    /// The unique name a file with these hashes and this original base name
    /// lands under in `needed/`.
    pub fn unique_name(&self, hashes: &HashSet, original_name: &str) -> String {
        format!("{}-{}", hash_prefix(hashes), original_name)
    }

    /// Opens (creating) the needed-pool archive for one basename. In practice
    /// `needed/` is addressed as a single archive per original container
    /// basename, mirroring how garbage is organized per working archive.
    pub fn archive_for(&self, basename: &str) -> Result<Archive> {
        Archive::open(self.root.join(basename), self.kind, Location::Needed, self.flags)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_path_sits_beside_working_archive() {
        let working = Path::new("/roms/pacman.zip");
        let path = garbage_path_for(working);
        assert_eq!(path, PathBuf::from("/roms/garbage/pacman.zip"));
    }

    #[test]
    fn garbage_archive_not_created_until_first_write() {
        let tmp = tempfile::tempdir().unwrap();
        let working = tmp.path().join("pacman");
        std::fs::create_dir_all(&working).unwrap();
        let mut staging = GarbageStaging::new(&working, ArchiveKind::Dir);
        assert!(!staging.was_opened());
        assert!(!staging.path().exists());

        staging.archive_for().unwrap().file_add_empty("junk.bin").unwrap();
        staging.commit().unwrap();
        assert!(staging.was_opened());
    }

    #[test]
    fn unique_name_prefixes_hash_before_original_name() {
        let staging = NeededStaging::new("/roms/needed", ArchiveKind::Dir);
        let mut h = HashSet::new();
        h.set(HashType::Sha1, &[0xDEu8; 20]);
        let name = staging.unique_name(&h, "mspacman.6e");
        assert_eq!(name, format!("{}-mspacman.6e", hash_prefix(&h)));
    }
}
