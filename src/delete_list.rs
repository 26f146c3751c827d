//! Delete lists (§4.11): `extra`, `needed`, `superfluous`, each a flat list
//! of (archive-name, member-index) entries with mark/rollback-to-mark so a
//! failed game's contributions can be unwound without disturbing entries
//! from games already committed. Grounded on
//! `original_source/src/delete_list.cc`'s mark/rollback/execute triad.

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DeleteEntry {
    pub archive_name: String,
    pub member_index: usize,
}

/// A single named list (extra/needed/superfluous share this implementation).
#[derive(Debug, Clone, Default)]
pub struct DeleteList {
    entries: Vec<DeleteEntry>,
}

impl DeleteList {
    pub fn new() -> Self {
        DeleteList::default()
    }

    pub fn push(&mut self, archive_name: impl Into<String>, member_index: usize) {
        self.entries.push(DeleteEntry {
            archive_name: archive_name.into(),
            member_index,
        });
    }

    /// Snapshots the current length; pair with [`DeleteList::rollback_to_mark`].
    pub fn mark(&self) -> usize {
        self.entries.len()
    }

    /// Drops every entry pushed since `mark`, used when a game's fixes fail commit.
    pub fn rollback_to_mark(&mut self, mark: usize) {
        self.entries.truncate(mark);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries grouped by archive name (sorted), so each archive is opened
    /// exactly once during execution, per §4.11.
    pub fn grouped_by_archive(&self) -> BTreeMap<String, Vec<usize>> {
        let mut grouped: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for entry in &self.entries {
            grouped.entry(entry.archive_name.clone()).or_default().push(entry.member_index);
        }
        for indices in grouped.values_mut() {
            // Descending so deleting by index doesn't invalidate later indices
            // in the same archive during execution.
            indices.sort_unstable_by(|a, b| b.cmp(a));
        }
        grouped
    }

    pub fn entries(&self) -> &[DeleteEntry] {
        &self.entries
    }
}

/// The three named lists the planner and traversal share for a run.
#[derive(Debug, Clone, Default)]
pub struct DeleteLists {
    pub extra: DeleteList,
    pub needed: DeleteList,
    pub superfluous: DeleteList,
}

/// Marks across all three lists, taken together so a game's rollback covers
/// every list at once.
#[derive(Debug, Clone, Copy)]
pub struct DeleteListMarks {
    pub extra: usize,
    pub needed: usize,
    pub superfluous: usize,
}

impl DeleteLists {
    pub fn new() -> Self {
        DeleteLists::default()
    }

    pub fn mark_all(&self) -> DeleteListMarks {
        DeleteListMarks {
            extra: self.extra.mark(),
            needed: self.needed.mark(),
            superfluous: self.superfluous.mark(),
        }
    }

    pub fn rollback_all(&mut self, marks: DeleteListMarks) {
        self.extra.rollback_to_mark(marks.extra);
        self.needed.rollback_to_mark(marks.needed);
        self.superfluous.rollback_to_mark(marks.superfluous);
    }

    /// Executes every list: opens each distinct archive once, deletes its
    /// marked members (highest index first), and commits. Errors for one
    /// archive don't stop the sweep over the others; the caller collects them.
    pub fn execute<F>(&self, mut delete_and_commit: F) -> Vec<(String, crate::error::Error)>
    where
        F: FnMut(&str, &[usize]) -> crate::error::Result<()>,
    {
        let mut errors = Vec::new();
        let mut all: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for list in [&self.extra, &self.needed, &self.superfluous] {
            for (archive, indices) in list.grouped_by_archive() {
                all.entry(archive).or_default().extend(indices);
            }
        }
        for indices in all.values_mut() {
            indices.sort_unstable_by(|a, b| b.cmp(a));
            indices.dedup();
        }
        for (archive, indices) in all {
            if let Err(e) = delete_and_commit(&archive, &indices) {
                errors.push((archive, e));
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_to_mark_drops_only_later_entries() {
        let mut list = DeleteList::new();
        list.push("a.zip", 0);
        let mark = list.mark();
        list.push("a.zip", 1);
        list.push("b.zip", 0);
        assert_eq!(list.len(), 3);
        list.rollback_to_mark(mark);
        assert_eq!(list.len(), 1);
        assert_eq!(list.entries()[0].archive_name, "a.zip");
    }

    #[test]
    fn grouped_by_archive_orders_indices_descending() {
        let mut list = DeleteList::new();
        list.push("a.zip", 0);
        list.push("a.zip", 3);
        list.push("a.zip", 1);
        let grouped = list.grouped_by_archive();
        assert_eq!(grouped["a.zip"], vec![3, 1, 0]);
    }

    #[test]
    fn mark_all_and_rollback_all_cover_every_list() {
        let mut lists = DeleteLists::new();
        let marks = lists.mark_all();
        lists.extra.push("a.zip", 0);
        lists.needed.push("b.zip", 1);
        lists.superfluous.push("c.zip", 2);
        lists.rollback_all(marks);
        assert!(lists.extra.is_empty());
        assert!(lists.needed.is_empty());
        assert!(lists.superfluous.is_empty());
    }

    #[test]
    fn execute_visits_each_distinct_archive_once() {
        let mut lists = DeleteLists::new();
        lists.extra.push("a.zip", 0);
        lists.needed.push("a.zip", 1);
        lists.superfluous.push("b.zip", 0);

        let mut visited = Vec::new();
        let errors = lists.execute(|archive, indices| {
            visited.push((archive.to_string(), indices.to_vec()));
            Ok(())
        });
        assert!(errors.is_empty());
        assert_eq!(visited.len(), 2);
    }
}
