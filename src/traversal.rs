//! Traversal (§4.10): walks every game in the catalog, maintaining a
//! `checked` flag (has this node been processed yet this run) and a `check`
//! flag (was it in the caller's explicitly requested set, vs. pulled in only
//! by a recheck signal). Grounded on `original_source/src/tree.c`'s
//! worklist-plus-revisit shape, reimplemented as an explicit queue rather
//! than recursive descent so recheck requeuing is a plain push.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::catalog::Catalog;
use crate::error::Result;
use crate::hashes::HashSet as FileHashSet;
use crate::planner::RecheckSignal;

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

/// Maps a hash bucket to every game whose expected files (roms or disks)
/// carry it, so a recheck signal for that hash can find who to reprocess.
fn build_recheck_index(catalog: &dyn Catalog) -> HashMap<String, Vec<String>> {
    let mut index: HashMap<String, Vec<String>> = HashMap::new();
    for name in catalog.game_names() {
        let Some(game) = catalog.read_game(&name) else { continue };
        for files in game.files.values() {
            for file in files {
                index.entry(bucket_key(&file.hashes)).or_default().push(name.clone());
            }
        }
    }
    index
}

#[derive(Debug, Clone)]
pub struct GameOutcome {
    pub game: String,
    /// True if this visit was triggered by a recheck signal rather than the
    /// caller's original requested set.
    pub via_recheck: bool,
    pub result: std::result::Result<(), String>,
}

#[derive(Debug, Default)]
pub struct TraversalReport {
    pub outcomes: Vec<GameOutcome>,
    pub checked: HashSet<String>,
}

/// Runs `process_game` over every requested game (or every game in the
/// catalog if `requested` is `None`), requeuing any game whose expected
/// hashes match a [`RecheckSignal`] returned by an earlier visit. A game
/// already queued for this pass is not queued twice; a game is allowed to be
/// revisited after it completes if a later visit signals it again.
pub fn run<F>(catalog: &dyn Catalog, requested: Option<&[String]>, mut process_game: F) -> TraversalReport
where
    F: FnMut(&str) -> Result<Vec<RecheckSignal>>,
{
    let reverse_index = build_recheck_index(catalog);
    let check_set: HashSet<String> = match requested {
        Some(names) => names.iter().cloned().collect(),
        None => catalog.game_names().into_iter().collect(),
    };

    let mut queue: VecDeque<(String, bool)> = check_set.iter().cloned().map(|g| (g, false)).collect();
    let mut queued: HashSet<String> = check_set.clone();
    let mut report = TraversalReport::default();

    // Bounds the number of recheck-triggered revisits so a cyclic signal
    // (which §4.10's DAG-without-cycles guarantee should prevent) can't spin
    // forever; a healthy run converges long before this is ever reached.
    let max_visits = check_set.len().saturating_mul(4).max(16);
    let mut visits = 0usize;

    while let Some((game, via_recheck)) = queue.pop_front() {
        queued.remove(&game);
        report.checked.insert(game.clone());
        visits += 1;

        let result = process_game(&game);
        let outcome_result = result.as_ref().map(|_| ()).map_err(|e| e.to_string());

        if let Ok(signals) = &result {
            if visits < max_visits {
                for signal in signals {
                    if let Some(games) = reverse_index.get(&bucket_key(&signal.hashes)) {
                        for g in games {
                            if g != &game && !queued.contains(g) {
                                queued.insert(g.clone());
                                queue.push_back((g.clone(), true));
                            }
                        }
                    }
                }
            }
        }

        report.outcomes.push(GameOutcome {
            game,
            via_recheck,
            result: outcome_result,
        });
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::file::File;
    use crate::game::Game;
    use crate::hashes::HashType;

    fn hashed(crc: &str, size: u64) -> FileHashSet {
        let mut h = FileHashSet::from_hex_string(HashType::Crc32, crc).unwrap();
        h.set_size(size);
        h
    }

    #[test]
    fn visits_every_game_when_nothing_requested() {
        let mut cat = MemoryCatalog::new();
        let mut g1 = Game::new("g1");
        g1.roms_mut().push(File::new("a.bin", Some(4), hashed("11111111", 4)));
        cat.write_game(g1);
        let mut g2 = Game::new("g2");
        g2.roms_mut().push(File::new("b.bin", Some(4), hashed("22222222", 4)));
        cat.write_game(g2);

        let mut visited = Vec::new();
        let report = run(&cat, None, |name| {
            visited.push(name.to_string());
            Ok(Vec::new())
        });
        visited.sort();
        assert_eq!(visited, vec!["g1".to_string(), "g2".to_string()]);
        assert_eq!(report.outcomes.len(), 2);
    }

    #[test]
    fn recheck_signal_requeues_game_wanting_that_hash() {
        let mut cat = MemoryCatalog::new();
        let mut g1 = Game::new("g1");
        g1.roms_mut().push(File::new("a.bin", Some(4), hashed("aaaaaaaa", 4)));
        cat.write_game(g1);
        let mut g2 = Game::new("g2");
        g2.roms_mut().push(File::new("a.bin", Some(4), hashed("aaaaaaaa", 4)));
        cat.write_game(g2);

        let mut visits_per_game: HashMap<String, u32> = HashMap::new();
        let report = run(&cat, Some(&["g1".to_string()]), |name| {
            let count = visits_per_game.entry(name.to_string()).or_insert(0);
            *count += 1;
            if name == "g1" && *count == 1 {
                Ok(vec![RecheckSignal { hashes: hashed("aaaaaaaa", 4) }])
            } else {
                Ok(Vec::new())
            }
        });

        assert!(report.checked.contains("g1"));
        assert!(report.checked.contains("g2"));
        let g2_outcome = report.outcomes.iter().find(|o| o.game == "g2").unwrap();
        assert!(g2_outcome.via_recheck);
    }

    #[test]
    fn explicit_request_restricts_initial_queue() {
        let mut cat = MemoryCatalog::new();
        cat.write_game(Game::new("g1"));
        cat.write_game(Game::new("g2"));

        let mut visited = Vec::new();
        run(&cat, Some(&["g1".to_string()]), |name| {
            visited.push(name.to_string());
            Ok(Vec::new())
        });
        assert_eq!(visited, vec!["g1".to_string()]);
    }
}
