//! Execution contexts
//!
//! Each context owns a global object and a separate global used for module
//! imports. A context is live from creation until it is destroyed; after
//! that its globals are no longer roots and get collected.

use gibridge_sdk::{ContextId, ObjectRef};

/// A live execution context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ExecutionContext {
    pub id: ContextId,
    pub global: ObjectRef,
    pub import_global: ObjectRef,
}

/// Registry of live contexts, in creation order
#[derive(Default)]
pub(crate) struct ContextRegistry {
    contexts: Vec<ExecutionContext>,
    next_id: u32,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the id for the next context
    pub fn next_id(&mut self) -> ContextId {
        self.next_id += 1;
        ContextId(self.next_id)
    }

    pub fn insert(&mut self, context: ExecutionContext) {
        self.contexts.push(context);
    }

    pub fn remove(&mut self, id: ContextId) -> Option<ExecutionContext> {
        let index = self.contexts.iter().position(|c| c.id == id)?;
        Some(self.contexts.remove(index))
    }

    pub fn get(&self, id: ContextId) -> Option<&ExecutionContext> {
        self.contexts.iter().find(|c| c.id == id)
    }

    pub fn ids(&self) -> Vec<ContextId> {
        self.contexts.iter().map(|c| c.id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExecutionContext> + '_ {
        self.contexts.iter()
    }

    /// Remove every context
    pub fn drain(&mut self) -> Vec<ExecutionContext> {
        std::mem::take(&mut self.contexts)
    }
}
