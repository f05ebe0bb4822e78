//! Persistent root tracking
//!
//! Roots are starting points for collection besides the context globals.
//! Native code holding an object across calls registers it here.

use gibridge_sdk::{ObjectRef, RootId};
use rustc_hash::FxHashMap;

/// Root set for garbage collection
pub(crate) struct RootSet {
    roots: FxHashMap<RootId, (ObjectRef, &'static str)>,
    next_id: u64,
}

impl RootSet {
    /// Create a new root set
    pub fn new() -> Self {
        Self {
            roots: FxHashMap::default(),
            next_id: 1,
        }
    }

    /// Add a persistent root
    pub fn add(&mut self, obj: ObjectRef, name: &'static str) -> RootId {
        let id = RootId(self.next_id);
        self.next_id += 1;
        self.roots.insert(id, (obj, name));
        id
    }

    /// Remove a persistent root. Unknown ids are ignored.
    pub fn remove(&mut self, id: RootId) -> bool {
        self.roots.remove(&id).is_some()
    }

    /// Iterate over all rooted objects
    pub fn iter(&self) -> impl Iterator<Item = ObjectRef> + '_ {
        self.roots.values().map(|(obj, _)| *obj)
    }

    /// Drop every root
    pub fn clear(&mut self) {
        self.roots.clear();
    }

    /// Get total number of roots
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.roots.len()
    }
}

impl Default for RootSet {
    fn default() -> Self {
        Self::new()
    }
}
