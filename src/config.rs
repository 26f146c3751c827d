//! Fix options (§6): the exact options table the core recognizes. No file or
//! CLI parsing lives here — out of scope per §1 — mirroring how the teacher's
//! `Config` is only ever built by `Config::try_from(Cli)`, never loaded from
//! disk by the library itself. An embedding application constructs this
//! struct directly.

use serde::{Deserialize, Serialize};

use crate::archive::ArchiveKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixOptions {
    /// `fix.do`. True (dry-run) is the default: print planned mutations without applying them.
    pub dry_run: bool,
    /// `fix.move_unknown`. Default false: unknown files are deleted, not preserved in garbage.
    pub move_unknown: bool,
    /// `fix.move_long`. Default false: long files, after substring extraction, are deleted rather than kept.
    pub move_long: bool,
    /// `fix.delete_duplicate`. Default false (keep): members already satisfied elsewhere are left in place.
    pub delete_duplicate: bool,
    /// `fix.delete_extra`. Default false: extra-pool files are not swept into the delete list.
    pub delete_extra: bool,
    /// `fix.complete_only`. Default false (partial_ok): fixes apply even to games that stay incomplete.
    pub complete_only: bool,
    /// `fix.ignore_unknown`. Default false: unknown-file handling runs.
    pub ignore_unknown: bool,
    /// `check.integrity`. Default false: cached hashes are trusted; true forces a rehash from disk.
    pub check_integrity: bool,
    /// Default false: archives are ZIP containers; true treats each archive path as a directory.
    pub roms_unzipped: bool,
}

impl Default for FixOptions {
    fn default() -> Self {
        FixOptions {
            dry_run: true,
            move_unknown: false,
            move_long: false,
            delete_duplicate: false,
            delete_extra: false,
            complete_only: false,
            ignore_unknown: false,
            check_integrity: false,
            roms_unzipped: false,
        }
    }
}

impl FixOptions {
    /// The archive backend every open of a working/garbage/needed archive
    /// should use, per `roms_unzipped`.
    pub fn archive_kind(&self) -> ArchiveKind {
        if self.roms_unzipped {
            ArchiveKind::Dir
        } else {
            ArchiveKind::Zip
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let opts = FixOptions::default();
        assert!(opts.dry_run);
        assert!(!opts.move_unknown);
        assert!(!opts.move_long);
        assert!(!opts.delete_duplicate);
        assert!(!opts.complete_only);
        assert!(!opts.roms_unzipped);
    }

    #[test]
    fn archive_kind_follows_roms_unzipped() {
        let mut opts = FixOptions::default();
        assert_eq!(opts.archive_kind(), crate::archive::ArchiveKind::Zip);
        opts.roms_unzipped = true;
        assert_eq!(opts.archive_kind(), crate::archive::ArchiveKind::Dir);
    }
}
