//! Backend-independent archive abstraction (§4.3). All mutating calls stage
//! in-memory changes and return success/failure synchronously; effects on
//! disk happen only at [`Archive::commit`]. Two backends — zip file and
//! filesystem directory — share this one surface, same split as
//! `archives.rs`'s `scan_zip_entries`/`scan_7z_entries` pair but unified
//! behind one handle type instead of free functions per container kind.

mod dir_backend;
mod zip_backend;

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::file::{File, Status, Where};
use crate::hashes::{HashSet, HashType, HashUpdater};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Dir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Romset,
    Needed,
    Superfluous,
    Extra,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    pub create: bool,
    pub check_integrity: bool,
    pub quiet: bool,
    pub no_cache: bool,
    pub read_only: bool,
    pub top_level_only: bool,
    pub keep_empty: bool,
}

#[derive(Debug, Clone)]
enum Content {
    /// Present on disk already, unmodified this transaction.
    Stored,
    /// New bytes to write at commit (covers add-empty, copy, copy-part, and rename-with-rewrite).
    Bytes(Vec<u8>),
    /// Tombstoned: removed from `files()` view, vanishes from disk on commit.
    Deleted,
}

#[derive(Debug, Clone)]
struct Slot {
    file: File,
    content: Content,
    /// Name this member had on disk before any staged rename, used for commit bookkeeping
    /// and for "should be in X, is in Y" style diagnostics.
    disk_name: Option<String>,
}

/// An open archive handle. `files()` reflects staged state (pre-commit view).
pub struct Archive {
    pub path: PathBuf,
    pub kind: ArchiveKind,
    pub location: Location,
    pub flags: OpenFlags,
    slots: Vec<Slot>,
}

impl Archive {
    pub fn open(path: impl Into<PathBuf>, kind: ArchiveKind, location: Location, flags: OpenFlags) -> Result<Self> {
        let path = path.into();
        let entries = match kind {
            ArchiveKind::Zip => {
                if flags.create && !path.exists() {
                    Vec::new()
                } else {
                    zip_backend::list_entries(&path)?
                }
            }
            ArchiveKind::Dir => dir_backend::list_entries(&path)?,
        };

        let slots = entries
            .into_iter()
            .map(|(name, size)| {
                let mut file = File::new(name.clone(), Some(size), HashSet::new());
                file.location = Where::Ingame;
                Slot {
                    file,
                    content: Content::Stored,
                    disk_name: Some(name),
                }
            })
            .collect();

        Ok(Archive {
            path,
            kind,
            location,
            flags,
            slots,
        })
    }

    /// Live (non-tombstoned) members, in declaration order.
    pub fn files(&self) -> impl Iterator<Item = (usize, &File)> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| !matches!(s.content, Content::Deleted))
            .map(|(i, s)| (i, &s.file))
    }

    pub fn file(&self, idx: usize) -> Option<&File> {
        self.slots.get(idx).and_then(|s| {
            if matches!(s.content, Content::Deleted) {
                None
            } else {
                Some(&s.file)
            }
        })
    }

    fn assert_writable(&self, op: &str) -> Result<()> {
        if self.flags.read_only {
            return Err(Error::ReadOnly {
                archive: self.path.clone(),
                op: op.to_string(),
            });
        }
        Ok(())
    }

    /// Ignores tombstones, as specified.
    pub fn file_index_by_name(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| {
            !matches!(s.content, Content::Deleted) && s.file.name.eq_ignore_ascii_case(name)
        })
    }

    pub fn file_index(&self, file: &File) -> Option<usize> {
        self.slots.iter().position(|s| {
            !matches!(s.content, Content::Deleted)
                && s.file.identity_key() == file.identity_key()
                && s.file.name.eq_ignore_ascii_case(&file.name)
        })
    }

    fn name_taken(&self, name: &str, except: Option<usize>) -> bool {
        self.slots.iter().enumerate().any(|(i, s)| {
            Some(i) != except
                && !matches!(s.content, Content::Deleted)
                && s.file.name.eq_ignore_ascii_case(name)
        })
    }

    pub fn file_add_empty(&mut self, name: &str) -> Result<usize> {
        self.assert_writable("add_empty")?;
        if self.name_taken(name, None) {
            return Err(Error::NameCollision {
                archive: self.path.clone(),
                name: name.to_string(),
            });
        }
        let mut file = File::new(name, Some(0), {
            let mut h = HashSet::new();
            h.set(HashType::Crc32, &[0, 0, 0, 0]);
            h.set_size(0);
            h
        });
        file.location = Where::Added;
        self.slots.push(Slot {
            file,
            content: Content::Bytes(Vec::new()),
            disk_name: None,
        });
        Ok(self.slots.len() - 1)
    }

    /// Reads a live member's full bytes (from disk if `Stored`, from the staged
    /// buffer otherwise).
    pub fn read_member(&self, idx: usize) -> Result<Vec<u8>> {
        let slot = self.slots.get(idx).ok_or_else(|| Error::State {
            archive: self.path.clone(),
            member: format!("#{idx}"),
            state: Where::Nowhere,
            op: "read".to_string(),
        })?;
        match &slot.content {
            Content::Stored => self.read_stored(slot.disk_name.as_deref().unwrap_or(&slot.file.name)),
            Content::Bytes(b) => Ok(b.clone()),
            Content::Deleted => Err(Error::State {
                archive: self.path.clone(),
                member: slot.file.name.clone(),
                state: Where::Deleted,
                op: "read".to_string(),
            }),
        }
    }

    fn read_stored(&self, name: &str) -> Result<Vec<u8>> {
        match self.kind {
            ArchiveKind::Zip => zip_backend::read_member(&self.path, name),
            ArchiveKind::Dir => dir_backend::read_member(&self.path, name),
        }
    }

    /// Stages a whole-member copy from already-read `bytes` under `dst_name`.
    pub fn file_copy(&mut self, bytes: Vec<u8>, dst_name: &str, expected: Option<&HashSet>) -> Result<usize> {
        self.assert_writable("copy")?;
        if self.name_taken(dst_name, None) {
            return Err(Error::NameCollision {
                archive: self.path.clone(),
                name: dst_name.to_string(),
            });
        }
        let hashes = expected.cloned().unwrap_or_else(|| hash_bytes(&bytes));
        let mut file = File::new(dst_name, Some(bytes.len() as u64), hashes);
        file.location = Where::Added;
        self.slots.push(Slot {
            file,
            content: Content::Bytes(bytes),
            disk_name: None,
        });
        Ok(self.slots.len() - 1)
    }

    /// Stages an extracted-subrange copy from a live member of *this* archive:
    /// reads `src_idx`'s bytes first (immutable), then stages the slice under
    /// `dst_name`. `length` absent means "to end".
    pub fn file_copy_part(
        &mut self,
        src_idx: usize,
        dst_name: &str,
        offset: u64,
        length: Option<u64>,
    ) -> Result<usize> {
        self.assert_writable("copy_part")?;
        let full = self.read_member(src_idx)?;
        let start = offset as usize;
        if start > full.len() {
            return Err(Error::format(&self.path, "copy_part offset beyond member end"));
        }
        let end = match length {
            Some(len) => (start + len as usize).min(full.len()),
            None => full.len(),
        };
        if start > end {
            return Err(Error::format(&self.path, "copy_part range invalid"));
        }
        let slice = full[start..end].to_vec();
        self.file_copy(slice, dst_name, None)
    }

    pub fn file_delete(&mut self, idx: usize) -> Result<()> {
        self.assert_writable("delete")?;
        let slot = self.slots.get_mut(idx).ok_or_else(|| Error::State {
            archive: self.path.clone(),
            member: format!("#{idx}"),
            state: Where::Nowhere,
            op: "delete".to_string(),
        })?;
        if !matches!(slot.file.location, Where::Ingame) {
            return Err(Error::State {
                archive: self.path.clone(),
                member: slot.file.name.clone(),
                state: slot.file.location,
                op: "delete".to_string(),
            });
        }
        slot.content = Content::Deleted;
        slot.file.location = Where::Deleted;
        Ok(())
    }

    pub fn file_rename(&mut self, idx: usize, new_name: &str) -> Result<()> {
        self.assert_writable("rename")?;
        if self.name_taken(new_name, Some(idx)) {
            return Err(Error::NameCollision {
                archive: self.path.clone(),
                name: new_name.to_string(),
            });
        }
        let bytes = self.read_member(idx)?;
        let slot = &mut self.slots[idx];
        slot.file.name = new_name.to_string();
        slot.content = Content::Bytes(bytes);
        Ok(())
    }

    /// Picks `base-NNN[.ext]` for `NNN` in `0..1000`, first name free of live,
    /// staged, and in-flight-rename members. Exhaustion is a hard error (§9
    /// Open Questions: the original silently aborts the member; this crate
    /// surfaces it as a diagnostic instead).
    pub fn file_rename_to_unique(&mut self, idx: usize) -> Result<String> {
        let base_name = self
            .file(idx)
            .ok_or_else(|| Error::format(&self.path, "no such member"))?
            .name
            .clone();
        let (stem, ext) = split_ext(&base_name);
        for n in 0..1000u32 {
            let candidate = match &ext {
                Some(e) => format!("{stem}-{n:03}.{e}"),
                None => format!("{stem}-{n:03}"),
            };
            if !self.name_taken(&candidate, Some(idx)) {
                self.file_rename(idx, &candidate)?;
                return Ok(candidate);
            }
        }
        Err(Error::NameCollision {
            archive: self.path.clone(),
            name: base_name,
        })
    }

    /// Reads a member and fills in missing hash types from `mask`. Read errors
    /// downgrade the member to `baddump` rather than propagating, per §7.
    pub fn file_compute_hashes(&mut self, idx: usize, mask: &[HashType]) -> Result<()> {
        let want: Vec<HashType> = mask
            .iter()
            .copied()
            .filter(|t| !self.slots[idx].file.hashes.has(*t))
            .collect();
        if want.is_empty() {
            return Ok(());
        }
        match self.read_member(idx) {
            Ok(bytes) => {
                let computed = hash_bytes_for(&bytes, &want);
                let slot = &mut self.slots[idx];
                for t in want {
                    if let Some(hex) = computed.hex(t) {
                        if t == HashType::Size {
                            slot.file.hashes.set_size(computed.size.unwrap());
                        } else if let Ok(raw) = hex::decode(&hex) {
                            slot.file.hashes.set(t, &raw);
                        }
                    }
                }
            }
            Err(_) => {
                self.slots[idx].file.status = Status::Baddump;
            }
        }
        Ok(())
    }

    /// Applies all staged changes atomically. On failure the archive remains
    /// usable via [`Archive::rollback`].
    pub fn commit(&mut self) -> Result<()> {
        self.assert_writable("commit")?;
        let deletes: Vec<String> = self
            .slots
            .iter()
            .filter(|s| matches!(s.content, Content::Deleted))
            .filter_map(|s| s.disk_name.clone())
            .collect();

        match self.kind {
            ArchiveKind::Dir => {
                let writes: Vec<dir_backend::PendingWrite> = self
                    .slots
                    .iter()
                    .filter(|s| matches!(s.content, Content::Bytes(_)))
                    .map(|s| dir_backend::PendingWrite {
                        name: s.file.name.clone(),
                        bytes: match &s.content {
                            Content::Bytes(b) => b.clone(),
                            _ => unreachable!(),
                        },
                    })
                    .collect();
                // Renamed members leave their old disk name behind; treat as delete+write.
                let mut all_deletes = deletes.clone();
                for s in &self.slots {
                    if let (Content::Bytes(_), Some(old)) = (&s.content, &s.disk_name) {
                        if old != &s.file.name {
                            all_deletes.push(old.clone());
                        }
                    }
                }
                dir_backend::commit(&self.path, &writes, &all_deletes, self.flags.keep_empty)?;
            }
            ArchiveKind::Zip => {
                let surviving: Vec<String> = self
                    .slots
                    .iter()
                    .filter(|s| matches!(s.content, Content::Stored))
                    .filter_map(|s| s.disk_name.clone())
                    .collect();
                let writes: Vec<zip_backend::PendingWrite> = self
                    .slots
                    .iter()
                    .filter(|s| matches!(s.content, Content::Bytes(_)))
                    .map(|s| zip_backend::PendingWrite {
                        name: s.file.name.clone(),
                        bytes: match &s.content {
                            Content::Bytes(b) => b.clone(),
                            _ => unreachable!(),
                        },
                    })
                    .collect();
                zip_backend::commit(&self.path, &surviving, &writes, self.flags.keep_empty)?;
            }
        }

        self.slots.retain(|s| !matches!(s.content, Content::Deleted));
        for slot in &mut self.slots {
            slot.content = Content::Stored;
            slot.disk_name = Some(slot.file.name.clone());
            if matches!(slot.file.location, Where::Added) {
                slot.file.location = Where::Ingame;
            }
        }
        Ok(())
    }

    /// Discards all staged changes, restoring the pre-staging view.
    pub fn rollback(&mut self) -> Result<()> {
        let fresh = Archive::open(&self.path, self.kind, self.location, self.flags)?;
        self.slots = fresh.slots;
        Ok(())
    }
}

fn split_ext(name: &str) -> (String, Option<String>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), Some(ext.to_string())),
        _ => (name.to_string(), None),
    }
}

fn hash_bytes(bytes: &[u8]) -> HashSet {
    hash_bytes_for(bytes, &[HashType::Crc32, HashType::Md5, HashType::Sha1, HashType::Sha256])
}

fn hash_bytes_for(bytes: &[u8], types: &[HashType]) -> HashSet {
    let mut updater = HashUpdater::new(types);
    updater.update(bytes);
    updater.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn dir_flags() -> OpenFlags {
        OpenFlags {
            create: true,
            ..Default::default()
        }
    }

    #[test]
    fn dir_backend_add_rename_delete_commit_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let archive_dir = tmp.path().join("game1");

        let mut a = Archive::open(&archive_dir, ArchiveKind::Dir, Location::Romset, dir_flags()).unwrap();
        let idx = a.file_copy(b"hello".to_vec(), "wrong.bin", None).unwrap();
        a.commit().unwrap();
        assert_eq!(a.file(idx).unwrap().name, "wrong.bin");

        let idx = a.file_index_by_name("wrong.bin").unwrap();
        a.file_rename(idx, "right.bin").unwrap();
        a.commit().unwrap();

        assert!(a.file_index_by_name("wrong.bin").is_none());
        let idx = a.file_index_by_name("right.bin").unwrap();
        assert_eq!(a.read_member(idx).unwrap(), b"hello");

        a.file_delete(idx).unwrap();
        a.commit().unwrap();
        assert!(archive_dir.exists() == false || dir_backend::list_entries(&archive_dir).unwrap().is_empty());
    }

    #[test]
    fn zip_backend_copy_part_extracts_subrange() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        {
            let f = std::fs::File::create(tmp.path()).unwrap();
            let mut w = zip::ZipWriter::new(f);
            let opts: zip::write::FileOptions<'_, ()> = zip::write::FileOptions::default();
            w.start_file::<_, ()>("rom.bin", opts).unwrap();
            let mut body = vec![0u8; 512];
            body.extend_from_slice(b"needle-bytes-here-0123456789");
            w.write_all(&body).unwrap();
            w.finish().unwrap();
        }

        let mut flags = OpenFlags::default();
        flags.create = false;
        let mut a = Archive::open(tmp.path(), ArchiveKind::Zip, Location::Romset, flags).unwrap();
        let idx = a.file_index_by_name("rom.bin").unwrap();
        let new_idx = a.file_copy_part(idx, "rom.bin.part", 512, Some(28)).unwrap();
        let extracted = a.read_member(new_idx).unwrap();
        assert_eq!(&extracted, b"needle-bytes-here-0123456789");
    }

    #[test]
    fn rename_to_unique_picks_first_free_suffix() {
        let tmp = tempfile::tempdir().unwrap();
        let archive_dir = tmp.path().join("g");
        let mut a = Archive::open(&archive_dir, ArchiveKind::Dir, Location::Romset, dir_flags()).unwrap();
        a.file_copy(b"a".to_vec(), "dup.bin", None).unwrap();
        a.file_copy(b"b".to_vec(), "dup-000.bin", None).unwrap();
        a.commit().unwrap();

        let idx = a.file_index_by_name("dup.bin").unwrap();
        let unique = a.file_rename_to_unique(idx).unwrap();
        assert_eq!(unique, "dup-001.bin");
    }

    #[test]
    fn read_only_archive_rejects_mutation() {
        let tmp = tempfile::tempdir().unwrap();
        let archive_dir = tmp.path().join("g");
        std::fs::create_dir_all(&archive_dir).unwrap();
        let flags = OpenFlags {
            read_only: true,
            ..Default::default()
        };
        let mut a = Archive::open(&archive_dir, ArchiveKind::Dir, Location::Romset, flags).unwrap();
        let err = a.file_add_empty("x.bin").unwrap_err();
        assert!(matches!(err, Error::ReadOnly { .. }));
    }
}
