//! File record: name, size, hashes, status, placement, merge-name. Grounded on
//! `types.rs::FileRecord`'s field shape and derive style, generalized to the
//! spec's ROM/DISK/SAMPLE identity-and-placement model instead of a flat
//! scanned-filesystem record.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::hashes::{Comparison, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Ok,
    Baddump,
    Nodump,
}

/// Where a file currently lives, or will live once a plan commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Where {
    Ingame,
    Cloneof,
    GrandCloneof,
    Romset,
    Needed,
    Superfluous,
    Extra,
    Old,
    Added,
    Deleted,
    Nowhere,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub name: String,
    pub size: Option<u64>,
    pub hashes: HashSet,
    pub status: Status,
    pub location: Where,
    pub merge_name: Option<String>,
    #[serde(skip)]
    pub mtime: Option<SystemTime>,
    pub detector_hashes: Option<HashSet>,
}

impl File {
    pub fn new(name: impl Into<String>, size: Option<u64>, hashes: HashSet) -> Self {
        File {
            name: name.into(),
            size,
            hashes,
            status: Status::Ok,
            location: Where::Nowhere,
            merge_name: None,
            mtime: None,
            detector_hashes: None,
        }
    }

    /// `status=nodump` implies hashes are unknown, not merely absent of CRC.
    pub fn is_nodump(&self) -> bool {
        matches!(self.status, Status::Nodump)
    }

    /// Case-insensitive name comparison except where a backend preserves case;
    /// backends opt into case sensitivity by calling `str::eq` directly instead.
    pub fn compare_name(&self, other: &str) -> bool {
        self.name.eq_ignore_ascii_case(other)
    }

    /// MATCH iff sizes agree (or either is unknown) and hashes.compare() is MATCH.
    pub fn compare_size_hashes(&self, other: &File) -> bool {
        let size_ok = match (self.size, other.size) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };
        size_ok && self.hashes.compare(&other.hashes) == Comparison::Match
    }

    /// True iff this file's (size, hashes) match `parent_file`'s, and either this
    /// file carries no explicit merge name or it names the parent's file.
    pub fn is_mergable(&self, parent_file: &File) -> bool {
        if !self.compare_size_hashes(parent_file) {
            return false;
        }
        match &self.merge_name {
            None => true,
            Some(name) => name.eq_ignore_ascii_case(&parent_file.name),
        }
    }

    pub fn identity_key(&self) -> (Option<u64>, &HashSet) {
        (self.size, &self.hashes)
    }
}

/// The three file kinds a game record tracks, per §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    Rom,
    Disk,
    Sample,
}
