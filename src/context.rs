//! Run context (§9 Design Notes): the caches, delete lists, and global index
//! a traversal needs are threaded explicitly through one struct instead of
//! living as process-global statics, unlike the teacher's `dat.rs` module
//! globals (`lazy_static`/`once_cell` IGDB caches). One `RunContext` is
//! built per invocation and passed by `&mut` down through traversal,
//! matcher, and planner calls.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::cache::Cache;
use crate::config::FixOptions;
use crate::delete_list::DeleteLists;
use crate::diagnostics::DiagnosticSink;
use crate::index::FileIndex;

/// Owns exactly one cache handle per root directory, per §5's "only one
/// handle per root is opened" shared-resource policy.
#[derive(Default)]
pub struct CacheRegistry {
    caches: HashMap<PathBuf, Cache>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        CacheRegistry::default()
    }

    pub fn get_or_open(&mut self, root: &Path) -> crate::error::Result<&Cache> {
        if !self.caches.contains_key(root) {
            let cache_path = root.join(".ckmame-cache.sqlite3");
            let cache = Cache::open(&cache_path)?;
            self.caches.insert(root.to_path_buf(), cache);
        }
        Ok(self.caches.get(root).unwrap())
    }
}

/// Everything a traversal needs beyond the catalog itself: the fix options,
/// the diagnostic sink, the cache registry, the global file index, and the
/// three delete lists.
pub struct RunContext<'a> {
    pub options: FixOptions,
    pub sink: &'a mut dyn DiagnosticSink,
    pub caches: CacheRegistry,
    pub index: FileIndex,
    pub delete_lists: DeleteLists,
}

impl<'a> RunContext<'a> {
    pub fn new(options: FixOptions, sink: &'a mut dyn DiagnosticSink) -> Self {
        RunContext {
            options,
            sink,
            caches: CacheRegistry::new(),
            index: FileIndex::new(),
            delete_lists: DeleteLists::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingSink;

    #[test]
    fn cache_registry_reuses_handle_per_root() {
        let tmp = tempfile::tempdir().unwrap();
        let mut registry = CacheRegistry::new();
        registry.get_or_open(tmp.path()).unwrap();
        assert_eq!(registry.caches.len(), 1);
        registry.get_or_open(tmp.path()).unwrap();
        assert_eq!(registry.caches.len(), 1);
    }

    #[test]
    fn run_context_starts_with_empty_index_and_lists() {
        let mut sink = RecordingSink::default();
        let ctx = RunContext::new(FixOptions::default(), &mut sink);
        assert!(ctx.index.is_empty());
        assert!(ctx.delete_lists.extra.is_empty());
    }
}
