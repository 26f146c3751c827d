//! Planner/Fixer (§4.9): turns one game's matcher results into a sequence of
//! staged archive mutations and commits them. Grounded on
//! `actions.rs`'s action-dispatch shape and `original_source/src/fix.c`'s
//! step order (health check, member sweep, expected-file loop, commit,
//! disk sweep).

use std::collections::HashMap;
use std::path::Path;

use crate::archive::{Archive, ArchiveKind, Location, OpenFlags};
use crate::config::FixOptions;
use crate::delete_list::DeleteLists;
use crate::diagnostics::{DiagnosticSink, Subject, Verb};
use crate::disk;
use crate::error::{Error, Result};
use crate::file::{File, Status, Where};
use crate::garbage::{GarbageStaging, NeededStaging};
use crate::hashes::HashType;
use crate::matcher::{Candidate, Origin, Quality};

/// The state the member sweep (Step B) assigns to each live member of the
/// working archive, decided by the caller from matcher output before
/// invoking [`sweep_members`] (which hash/archive a member's content is
/// "needed" by belongs to cross-game bookkeeping the traversal owns, not the
/// planner itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberState {
    Used,
    Unknown,
    Duplicate,
    Superfluous,
    Needed,
}

/// A hash that was moved into `needed/`, so the traversal can recheck any
/// game whose missing files share it.
#[derive(Debug, Clone)]
pub struct RecheckSignal {
    pub hashes: crate::hashes::HashSet,
}

fn full_hash_mask() -> [HashType; 4] {
    [HashType::Crc32, HashType::Md5, HashType::Sha1, HashType::Sha256]
}

/// Step A: if `path` exists but fails to open cleanly, rename it aside under
/// `broken/<name>-<NNN>.<ext>` (counter scoped to the basename) and leave a
/// fresh archive for the caller to open at `path`.
pub fn quarantine_broken_archive(path: &Path, kind: ArchiveKind) -> Result<Option<std::path::PathBuf>> {
    let probe = Archive::open(path, kind, Location::Romset, OpenFlags::default());
    if probe.is_ok() {
        return Ok(None);
    }

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let broken_dir = dir.join("broken");
    std::fs::create_dir_all(&broken_dir).map_err(|e| Error::io(&broken_dir, e))?;

    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("archive");
    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((s, e)) if !s.is_empty() => (s.to_string(), Some(e.to_string())),
        _ => (file_name.to_string(), None),
    };

    for n in 0..1000u32 {
        let candidate_name = match &ext {
            Some(e) => format!("{stem}-{n:03}.{e}"),
            None => format!("{stem}-{n:03}"),
        };
        let candidate = broken_dir.join(&candidate_name);
        if !candidate.exists() {
            std::fs::rename(path, &candidate).map_err(|e| Error::io(path, e))?;
            return Ok(Some(candidate));
        }
    }
    Err(Error::NameCollision {
        archive: path.to_path_buf(),
        name: file_name.to_string(),
    })
}

/// The "make space" subroutine run before any mutation writes name `N` into
/// `archive`: an occupant that isn't the target of this operation is deleted
/// (if `baddump`) or renamed to a unique name. Returns the occupant's
/// original name, for diagnostics wording ("should be in X, is in Y").
fn make_space(archive: &mut Archive, target_name: &str, keep_idx: Option<usize>) -> Result<Option<String>> {
    let Some(occupant_idx) = archive.file_index_by_name(target_name) else {
        return Ok(None);
    };
    if Some(occupant_idx) == keep_idx {
        return Ok(None);
    }
    let original_name = archive
        .file(occupant_idx)
        .map(|f| f.name.clone())
        .unwrap_or_default();
    let is_baddump = archive.file(occupant_idx).map(|f| f.status == Status::Baddump).unwrap_or(false);
    if is_baddump {
        archive.file_delete(occupant_idx)?;
    } else {
        archive.file_rename_to_unique(occupant_idx)?;
    }
    Ok(Some(original_name))
}

/// Step B: the member sweep. `states` maps a live member's index (at call
/// time, before any mutation) to its matcher-assigned state.
pub fn sweep_members(
    archive: &mut Archive,
    states: &HashMap<usize, MemberState>,
    garbage: &mut GarbageStaging,
    needed: &NeededStaging,
    options: &FixOptions,
    sink: &mut dyn DiagnosticSink,
    game_name: &str,
) -> Result<Vec<RecheckSignal>> {
    let mut recheck = Vec::new();
    // Highest index first: deleting/renaming by index must not invalidate
    // indices of members not yet processed in this pass.
    let mut ordered: Vec<usize> = states.keys().copied().collect();
    ordered.sort_unstable_by(|a, b| b.cmp(a));

    for idx in ordered {
        let Some(state) = states.get(&idx).copied() else { continue };
        let Some(member) = archive.file(idx) else { continue };
        let member_name = member.name.clone();
        let archive_label = archive.path.display().to_string();

        match state {
            MemberState::Used => {}
            MemberState::Unknown if options.ignore_unknown => {}
            MemberState::Unknown => {
                if options.move_unknown {
                    let bytes = archive.read_member(idx)?;
                    garbage.archive_for()?.file_copy(bytes, &member_name, None)?;
                    sink.emit(
                        &Subject::Member { archive: archive_label, member: member_name.clone() },
                        &Verb::MoveUnknown(member_name),
                    );
                } else {
                    sink.emit(
                        &Subject::Member { archive: archive_label, member: member_name },
                        &Verb::Delete,
                    );
                }
                archive.file_delete(idx)?;
            }
            MemberState::Duplicate => {
                // §6 default is keep: a duplicate member is only swept once
                // `delete_duplicate` opts in.
                if options.delete_duplicate {
                    sink.emit(
                        &Subject::Member { archive: archive_label, member: member_name },
                        &Verb::Delete,
                    );
                    archive.file_delete(idx)?;
                }
            }
            MemberState::Superfluous => {
                sink.emit(
                    &Subject::Member { archive: archive_label, member: member_name },
                    &Verb::Delete,
                );
                archive.file_delete(idx)?;
            }
            MemberState::Needed => {
                let bytes = archive.read_member(idx)?;
                let mut hashes = member.hashes.clone();
                if !hashes.has(HashType::Sha1) {
                    let mut updater = crate::hashes::HashUpdater::new(&full_hash_mask());
                    updater.update(&bytes);
                    hashes = updater.finalize();
                }
                let unique_name = needed.unique_name(&hashes, &member_name);
                let basename = Path::new(&archive_label)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("pool")
                    .to_string();
                archive.file_delete(idx)?;
                sink.emit(
                    &Subject::Member { archive: archive_label, member: member_name },
                    &Verb::Delete,
                );
                if !options.dry_run {
                    let mut needed_archive = needed.archive_for(&basename)?;
                    needed_archive.file_copy(bytes, &unique_name, Some(&hashes))?;
                    needed_archive.commit()?;
                    recheck.push(RecheckSignal { hashes });
                }
            }
        }
    }
    let _ = game_name;
    Ok(recheck)
}

/// Step C: the expected-file loop. `matches` is keyed by the expected file's
/// declaration index into `expected_files`, as produced by
/// [`crate::matcher::marry`].
pub fn apply_expected_files(
    archive: &mut Archive,
    expected_files: &[File],
    matches: &HashMap<usize, Option<Candidate>>,
    garbage: &mut GarbageStaging,
    needed: &NeededStaging,
    options: &FixOptions,
    sink: &mut dyn DiagnosticSink,
    game_name: &str,
) -> Result<Vec<RecheckSignal>> {
    let mut recheck = Vec::new();
    let archive_label = archive.path.display().to_string();

    for (i, expected) in expected_files.iter().enumerate() {
        let candidate = matches.get(&i).and_then(|c| c.as_ref());
        let subject = Subject::Member {
            archive: archive_label.clone(),
            member: expected.name.clone(),
        };

        match candidate {
            None => {
                if expected.size == Some(0) {
                    make_space(archive, &expected.name, None)?;
                    archive.file_add_empty(&expected.name)?;
                    sink.emit(&subject, &Verb::Correct);
                } else {
                    sink.emit(&subject, &Verb::Missing);
                }
            }
            Some(c) if c.quality == Quality::Unknown => {
                sink.emit(&subject, &Verb::WrongCrc(expected.name.clone()));
            }
            Some(c) if c.quality == Quality::Long => {
                let src_idx = c.member_index.expect("Long candidate is archive-local");
                let offset = c.byte_offset.unwrap_or(0);
                let length = expected.size;

                if options.move_long && c.origin == Origin::SelfArchive {
                    let whole = archive.read_member(src_idx)?;
                    garbage.archive_for()?.file_copy(whole, &expected.name, None)?;
                }

                if c.origin == Origin::SelfArchive {
                    let source_name = archive.file(src_idx).map(|f| f.name.clone()).unwrap_or_default();
                    make_space(archive, &expected.name, Some(src_idx))?;
                    let new_idx = archive.file_copy_part(src_idx, &expected.name, offset, length)?;
                    if new_idx != src_idx {
                        archive.file_delete(src_idx)?;
                    }
                    if let Some(len) = length {
                        sink.emit(
                            &Subject::Archive(archive_label.clone()),
                            &Verb::ShrinkTo {
                                name: source_name,
                                as_name: expected.name.clone(),
                                to: len,
                                of: len,
                            },
                        );
                    }
                }
            }
            Some(c) if c.quality == Quality::Namerr && c.origin == Origin::SelfArchive => {
                let src_idx = c.member_index.expect("Namerr candidate is archive-local");
                let source_file = archive.file(src_idx).cloned();
                let saved_to_needed = source_file
                    .as_ref()
                    .map(|f| matches!(f.location, Where::Cloneof | Where::GrandCloneof))
                    .unwrap_or(false);

                if saved_to_needed {
                    if let Some(f) = &source_file {
                        if !options.dry_run {
                            let bytes = archive.read_member(src_idx)?;
                            let unique_name = needed.unique_name(&f.hashes, &f.name);
                            let basename = archive
                                .path
                                .file_name()
                                .and_then(|n| n.to_str())
                                .unwrap_or("pool")
                                .to_string();
                            let mut needed_archive = needed.archive_for(&basename)?;
                            needed_archive.file_copy(bytes, &unique_name, Some(&f.hashes))?;
                            needed_archive.commit()?;
                            recheck.push(RecheckSignal { hashes: f.hashes.clone() });
                        }
                    }
                } else {
                    let from_name = source_file.as_ref().map(|f| f.name.clone()).unwrap_or_default();
                    make_space(archive, &expected.name, Some(src_idx))?;
                    archive.file_rename(src_idx, &expected.name)?;
                    sink.emit(
                        &Subject::Archive(archive_label.clone()),
                        &Verb::RenameTo { from: from_name, to: expected.name.clone() },
                    );
                }
            }
            Some(c) if c.quality == Quality::Copied => {
                let entry = c.index_entry.as_ref().expect("Copied candidate carries an index_entry");
                let is_current_garbage = garbage.was_opened() && garbage.path() == archive.path.as_path();

                let source = Archive::open(
                    &entry.archive_path,
                    archive.kind,
                    Location::Romset,
                    OpenFlags { read_only: true, ..Default::default() },
                )?;
                let src_idx = source
                    .file_index_by_name(&entry.member_name)
                    .ok_or_else(|| Error::format(&entry.archive_path, "indexed member no longer present"))?;
                let bytes = source.read_member(src_idx)?;

                if is_current_garbage {
                    if !options.dry_run {
                        let basename = archive
                            .path
                            .file_name()
                            .and_then(|n| n.to_str())
                            .unwrap_or("pool")
                            .to_string();
                        let unique_name = needed.unique_name(&expected.hashes, &entry.member_name);
                        let mut needed_archive = needed.archive_for(&basename)?;
                        needed_archive.file_copy(bytes, &unique_name, Some(&expected.hashes))?;
                        needed_archive.commit()?;
                        recheck.push(RecheckSignal { hashes: expected.hashes.clone() });
                    }
                } else {
                    make_space(archive, &expected.name, None)?;
                    archive.file_copy(bytes, &expected.name, Some(&expected.hashes))?;
                    sink.emit(
                        &subject,
                        &Verb::AddFrom {
                            name: expected.name.clone(),
                            source: entry.archive_path.display().to_string(),
                        },
                    );
                }
            }
            Some(c) if c.quality == Quality::Ok => {
                sink.emit(&subject, &Verb::Correct);
                let _ = c;
            }
            Some(_) => {}
        }
    }
    let _ = game_name;
    Ok(recheck)
}

/// Runs Steps B-D for one game: member sweep, expected-file loop, then
/// commit, honoring the cross-cutting options (`delete_extra`,
/// `complete_only`) that apply to the game as a whole rather than to a single
/// member or expected file.
#[allow(clippy::too_many_arguments)]
pub fn fix_game(
    archive: &mut Archive,
    member_states: &HashMap<usize, MemberState>,
    expected_files: &[File],
    matches: &HashMap<usize, Option<Candidate>>,
    garbage: &mut GarbageStaging,
    needed: &NeededStaging,
    delete_lists: &mut DeleteLists,
    options: &FixOptions,
    sink: &mut dyn DiagnosticSink,
    game_name: &str,
) -> Result<Vec<RecheckSignal>> {
    let mut recheck = sweep_members(archive, member_states, garbage, needed, options, sink, game_name)?;

    if options.delete_extra {
        let archive_label = archive.path.display().to_string();
        for (&idx, state) in member_states {
            if *state == MemberState::Superfluous {
                delete_lists.extra.push(archive_label.clone(), idx);
            }
        }
    }

    recheck.extend(apply_expected_files(
        archive,
        expected_files,
        matches,
        garbage,
        needed,
        options,
        sink,
        game_name,
    )?);

    let complete = expected_files.iter().enumerate().all(|(i, f)| match matches.get(&i).and_then(|c| c.as_ref()) {
        Some(c) => c.quality != Quality::Unknown,
        None => f.size == Some(0),
    });

    if options.complete_only && !complete {
        return Ok(recheck);
    }

    commit_game(archive, garbage, options)?;
    Ok(recheck)
}

/// Step D: commit the garbage archive before the working archive, per §5's
/// ordering guarantee ("garbage-destination archives commit before their
/// source archive"). On working-archive commit failure both are rolled back
/// and the game's delete-list marks are unwound by the caller.
///
/// Under `options.dry_run` (§7: the default), nothing staged this game is
/// ever written to disk — every diagnostic line the caller already emitted
/// stays worded exactly as it would on a real run.
pub fn commit_game(archive: &mut Archive, garbage: &mut GarbageStaging, options: &FixOptions) -> Result<()> {
    if options.dry_run {
        return Ok(());
    }
    garbage.commit()?;
    if let Err(e) = archive.commit() {
        archive.rollback()?;
        return Err(e);
    }
    Ok(())
}

/// Step E: the disk sweep. Unlike archive members, disk images are single
/// files with no container; `expected` names the disk image this game wants,
/// `candidate_path` is where the matcher found a same-hash source (if any).
pub fn sweep_disk(
    dest_path: &Path,
    expected: &File,
    candidate_path: Option<&Path>,
    options: &FixOptions,
    sink: &mut dyn DiagnosticSink,
) -> Result<()> {
    let subject = Subject::Archive(dest_path.display().to_string());

    if dest_path.exists() {
        let probed = disk::probe(dest_path, &full_hash_mask())?;
        if probed.hashes.compare(&expected.hashes) == crate::hashes::Comparison::Match {
            sink.emit(&subject, &Verb::Correct);
            return Ok(());
        }
        if !options.dry_run {
            std::fs::remove_file(dest_path).map_err(|e| Error::io(dest_path, e))?;
        }
        sink.emit(&subject, &Verb::Delete);
    }

    match candidate_path {
        Some(src) => {
            if !options.dry_run {
                if let Some(parent) = dest_path.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
                }
                std::fs::copy(src, dest_path).map_err(|e| Error::io(dest_path, e))?;
            }
            sink.emit(
                &subject,
                &Verb::AddFrom {
                    name: expected.name.clone(),
                    source: src.display().to_string(),
                },
            );
        }
        None => sink.emit(&subject, &Verb::Missing),
    }
    Ok(())
}
