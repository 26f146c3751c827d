//! Matcher (§4.8): for each expected file, rank every candidate member across
//! up to three archives plus the global index, then run the "marriage" pass
//! so no two expected files claim the same (archive, member). Grounded on
//! `candidates.rs::generate_candidates`'s scan-then-rank shape, with the
//! quality table and marriage algorithm taken from
//! `original_source/src/match.c`/`marry.c`.

use std::collections::{HashMap, VecDeque};

use crate::archive::Archive;
use crate::error::Result;
use crate::file::File;
use crate::hashes::{Comparison, HashType, HashUpdater};
use crate::index::{FileIndex, IndexEntry};

/// Ascending per spec §3: `UNKNOWN < OLD < NOHASH < COPIED < INZIP < NAMERR < LONG < OK`.
/// `Missing` (no candidate at all) ranks below everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Quality {
    Missing,
    Unknown,
    Old,
    Nohash,
    Copied,
    Inzip,
    Namerr,
    Long,
    Ok,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    SelfArchive,
    Parent,
    Grandparent,
    GlobalIndex,
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub quality: Quality,
    pub origin: Origin,
    /// Set for the three archive origins; the index into that archive's live members.
    pub member_index: Option<usize>,
    /// Set for `Origin::GlobalIndex`.
    pub index_entry: Option<IndexEntry>,
    /// Set when quality is `Long`: the offset of the matching subrange.
    pub byte_offset: Option<u64>,
}

impl Candidate {
    /// Identifies the concrete (archive, member) this candidate claims, so the
    /// marriage pass can detect two expected files wanting the same source.
    fn claim_key(&self) -> String {
        match self.origin {
            Origin::GlobalIndex => {
                let e = self.index_entry.as_ref().expect("GlobalIndex candidate carries an index_entry");
                format!("idx:{}:{}", e.archive_path.display(), e.member_name)
            }
            _ => format!("{:?}:{}", self.origin, self.member_index.expect("archive candidate carries a member_index")),
        }
    }
}

/// Table from §4.8, plus the nodump special case from the paragraph above it.
fn evaluate(expected: &File, member: &File) -> (Quality, bool) {
    let names_match = expected.compare_name(&member.name);

    if expected.is_nodump() {
        return if names_match { (Quality::Ok, true) } else { (Quality::Unknown, false) };
    }

    if names_match && expected.size == Some(0) {
        return (Quality::Ok, true);
    }

    if names_match {
        match (expected.size, member.size) {
            (Some(es), Some(ms)) if ms == es => match expected.hashes.compare(&member.hashes) {
                Comparison::Match => (Quality::Ok, true),
                Comparison::Mismatch => (Quality::Unknown, true), // CRCERR, effectively UNKNOWN
                Comparison::NoCommonTypes => (Quality::Nohash, true),
            },
            (Some(_), Some(_)) => (Quality::Unknown, true), // too long or too short; may upgrade to Long below
            _ => (Quality::Nohash, true),
        }
    } else if expected.compare_size_hashes(member) {
        (Quality::Namerr, false)
    } else {
        (Quality::Unknown, false)
    }
}

/// Slides a window of `len(expected_size)` across `bytes` looking for a byte
/// range whose hash matches every hash type `expected` carries. Returns the
/// first matching offset.
fn find_subrange(bytes: &[u8], expected_size: u64, expected: &crate::hashes::HashSet) -> Option<u64> {
    let window = expected_size as usize;
    if window == 0 || window > bytes.len() {
        return None;
    }
    let wanted: Vec<HashType> = HashType::ALL
        .into_iter()
        .filter(|t| *t != HashType::Size && expected.has(*t))
        .collect();
    if wanted.is_empty() {
        return None;
    }
    for start in 0..=(bytes.len() - window) {
        let mut updater = HashUpdater::new(&wanted);
        updater.update(&bytes[start..start + window]);
        let candidate_hashes = updater.finalize();
        if expected.compare(&candidate_hashes) == Comparison::Match {
            return Some(start as u64);
        }
    }
    None
}

/// Scans one archive's live members for candidates satisfying `expected`,
/// retrying a names-match/too-long miss as a subrange search.
pub fn scan_archive(expected: &File, archive: &Archive, origin: Origin) -> Result<Vec<Candidate>> {
    let mut out = Vec::new();
    for (idx, member) in archive.files() {
        let (quality, names_match) = evaluate(expected, member);
        let mut candidate = Candidate {
            quality,
            origin,
            member_index: Some(idx),
            index_entry: None,
            byte_offset: None,
        };

        if names_match && matches!(quality, Quality::Unknown) {
            if let (Some(es), Some(ms)) = (expected.size, member.size) {
                if ms > es && es > 0 {
                    let bytes = archive.read_member(idx)?;
                    if let Some(offset) = find_subrange(&bytes, es, &expected.hashes) {
                        candidate.quality = Quality::Long;
                        candidate.byte_offset = Some(offset);
                    }
                }
            }
        }
        out.push(candidate);
    }
    Ok(out)
}

/// Global-index hits become `Copied`-quality candidates (§4.8 step 2).
pub fn consult_index(expected: &File, index: &FileIndex) -> Vec<Candidate> {
    index
        .lookup(&expected.hashes)
        .iter()
        .map(|entry| Candidate {
            quality: Quality::Copied,
            origin: Origin::GlobalIndex,
            member_index: None,
            index_entry: Some(entry.clone()),
            byte_offset: None,
        })
        .collect()
}

/// Gathers ranked candidates for every expected file in one game, across up
/// to three present archives (0=self, 1=parent, 2=grandparent) plus the
/// global index.
pub fn compute_candidates(
    expected_files: &[File],
    archives: [Option<&Archive>; 3],
    index: &FileIndex,
) -> Result<Vec<(usize, Vec<Candidate>)>> {
    const ORIGINS: [Origin; 3] = [Origin::SelfArchive, Origin::Parent, Origin::Grandparent];
    let mut out = Vec::with_capacity(expected_files.len());
    for (i, expected) in expected_files.iter().enumerate() {
        let mut candidates = Vec::new();
        for (z, archive) in archives.iter().enumerate() {
            if let Some(a) = archive {
                candidates.extend(scan_archive(expected, a, ORIGINS[z])?);
            }
        }
        candidates.extend(consult_index(expected, index));
        out.push((i, candidates));
    }
    Ok(out)
}

/// The "marriage" pass (§4.8 step 3): each expected file (by declaration-order
/// index) picks its best unclaimed candidate; a weaker claimant is displaced
/// and re-queued to pick its next best. Returns `None` for an expected file
/// that exhausts its candidate list without ever holding a claim (quality
/// `Missing`).
pub fn marry(candidates: Vec<(usize, Vec<Candidate>)>) -> HashMap<usize, Option<Candidate>> {
    let mut queues: HashMap<usize, VecDeque<Candidate>> = candidates
        .into_iter()
        .map(|(idx, mut cands)| {
            cands.sort_by(|a, b| b.quality.cmp(&a.quality));
            (idx, cands.into())
        })
        .collect();

    let mut claims: HashMap<String, (usize, Quality)> = HashMap::new();
    let mut results: HashMap<usize, Option<Candidate>> = HashMap::new();
    let mut declared: Vec<usize> = queues.keys().copied().collect();
    declared.sort_unstable();
    let mut pending: VecDeque<usize> = declared.into();

    while let Some(idx) = pending.pop_front() {
        loop {
            let next = queues.get_mut(&idx).and_then(|q| q.pop_front());
            let candidate = match next {
                None => {
                    results.insert(idx, None);
                    break;
                }
                Some(c) => c,
            };
            let key = candidate.claim_key();
            match claims.get(&key).copied() {
                None => {
                    claims.insert(key, (idx, candidate.quality));
                    results.insert(idx, Some(candidate));
                    break;
                }
                Some((holder_idx, holder_quality)) if candidate.quality > holder_quality => {
                    claims.insert(key, (idx, candidate.quality));
                    results.insert(idx, Some(candidate));
                    results.remove(&holder_idx);
                    pending.push_back(holder_idx);
                    break;
                }
                Some(_) => continue, // weaker grip: back off to the next candidate
            }
        }
    }
    results
}

/// §9's resolved Open Question 1: a `merge` name with no matching file in the
/// parent is a warning, not an error — the file is treated as unmerged.
pub fn merge_without_parent(expected: &File, parent_files: &[File]) -> bool {
    match &expected.merge_name {
        None => false,
        Some(name) => !parent_files.iter().any(|f| f.compare_name(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveKind, Location, OpenFlags};
    use crate::hashes::HashSet as FileHashSet;

    fn hashed(crc: &str, size: u64) -> FileHashSet {
        let mut h = FileHashSet::from_hex_string(HashType::Crc32, crc).unwrap();
        h.set_size(size);
        h
    }

    #[test]
    fn exact_name_size_hash_match_is_ok() {
        let expected = File::new("rom.bin", Some(4), hashed("12345678", 4));
        let member = File::new("rom.bin", Some(4), hashed("12345678", 4));
        assert_eq!(evaluate(&expected, &member).0, Quality::Ok);
    }

    #[test]
    fn name_match_hash_mismatch_is_unknown() {
        let expected = File::new("rom.bin", Some(4), hashed("12345678", 4));
        let member = File::new("rom.bin", Some(4), hashed("aaaaaaaa", 4));
        assert_eq!(evaluate(&expected, &member).0, Quality::Unknown);
    }

    #[test]
    fn name_differs_but_hash_matches_is_namerr() {
        let expected = File::new("rom.bin", Some(4), hashed("12345678", 4));
        let member = File::new("other.bin", Some(4), hashed("12345678", 4));
        assert_eq!(evaluate(&expected, &member).0, Quality::Namerr);
    }

    #[test]
    fn nodump_satisfied_by_name_alone() {
        let mut expected = File::new("rom.bin", Some(4), FileHashSet::new());
        expected.status = crate::file::Status::Nodump;
        let member = File::new("rom.bin", Some(999), hashed("ffffffff", 999));
        assert_eq!(evaluate(&expected, &member).0, Quality::Ok);
    }

    #[test]
    fn find_subrange_locates_matching_window() {
        let mut data = vec![0u8; 100];
        data.extend_from_slice(b"needle-bytes");
        let mut expected = FileHashSet::new();
        let mut updater = HashUpdater::new(&[HashType::Crc32]);
        updater.update(b"needle-bytes");
        let h = updater.finalize();
        expected.set(HashType::Crc32, &h.crc32.unwrap());
        let offset = find_subrange(&data, 12, &expected).unwrap();
        assert_eq!(offset, 100);
    }

    #[test]
    fn marriage_displaces_weaker_claimant() {
        let strong = Candidate {
            quality: Quality::Ok,
            origin: Origin::SelfArchive,
            member_index: Some(0),
            index_entry: None,
            byte_offset: None,
        };
        let weak_same_source = Candidate {
            quality: Quality::Namerr,
            origin: Origin::SelfArchive,
            member_index: Some(0),
            index_entry: None,
            byte_offset: None,
        };
        let fallback = Candidate {
            quality: Quality::Nohash,
            origin: Origin::SelfArchive,
            member_index: Some(1),
            index_entry: None,
            byte_offset: None,
        };

        // Expected file 0 only sees the contested source; expected file 1 sees
        // it too (weaker) plus a fallback of its own.
        let candidates = vec![(0, vec![weak_same_source]), (1, vec![strong, fallback])];
        let results = marry(candidates);

        assert_eq!(results[&1].as_ref().unwrap().quality, Quality::Ok);
        assert_eq!(results[&0].as_ref().unwrap().quality, Quality::Nohash);
    }

    #[test]
    fn equal_quality_contention_resolves_by_declaration_order() {
        // Three expected files all want the same sole source at equal quality.
        // Declaration order (not HashMap iteration order) must decide the
        // winner: whichever index is processed first keeps the claim, since a
        // later arrival never outranks an equal-quality holder.
        let contested = || Candidate {
            quality: Quality::Ok,
            origin: Origin::SelfArchive,
            member_index: Some(0),
            index_entry: None,
            byte_offset: None,
        };
        let candidates = vec![(2, vec![contested()]), (0, vec![contested()]), (1, vec![contested()])];
        let results = marry(candidates);
        assert_eq!(results[&0].as_ref().unwrap().quality, Quality::Ok);
        assert!(results[&1].is_none());
        assert!(results[&2].is_none());
    }

    #[test]
    fn missing_when_candidate_list_exhausted() {
        let results = marry(vec![(0, vec![])]);
        assert!(results[&0].is_none());
    }

    #[test]
    fn scan_archive_finds_ok_candidate() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("g1");
        let flags = OpenFlags { create: true, ..Default::default() };
        let mut a = crate::archive::Archive::open(&dir, ArchiveKind::Dir, Location::Romset, flags).unwrap();
        a.file_copy(b"hello".to_vec(), "rom.bin", None).unwrap();
        a.commit().unwrap();

        let mut updater = HashUpdater::new(&[HashType::Crc32]);
        updater.update(b"hello");
        let h = updater.finalize();
        let mut expected_hashes = FileHashSet::new();
        expected_hashes.set(HashType::Crc32, &h.crc32.unwrap());
        let expected = File::new("rom.bin", Some(5), expected_hashes);

        let candidates = scan_archive(&expected, &a, Origin::SelfArchive).unwrap();
        assert!(candidates.iter().any(|c| c.quality == Quality::Ok));
    }

    #[test]
    fn merge_without_parent_flags_dangling_merge_name() {
        let mut expected = File::new("child.bin", Some(4), hashed("12345678", 4));
        expected.merge_name = Some("missing-in-parent.bin".into());
        assert!(merge_without_parent(&expected, &[File::new("other.bin", Some(4), hashed("aaaaaaaa", 4))]));
    }
}
