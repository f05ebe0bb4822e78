//! Live-object counters
//!
//! Process-wide counts of bridge objects, for leak hunting. Counts only move
//! in pairs (create/drop), so a steady non-zero value after teardown means
//! something was leaked.

use std::sync::atomic::{AtomicIsize, Ordering};

/// A named live-object counter
#[derive(Debug)]
pub struct Counter {
    name: &'static str,
    value: AtomicIsize,
}

impl Counter {
    /// Create a counter at zero
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            value: AtomicIsize::new(0),
        }
    }

    /// Record a creation
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a destruction
    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    /// Current count
    pub fn get(&self) -> isize {
        self.value.load(Ordering::Relaxed)
    }

    /// Counter name
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Live closures
pub static CLOSURE: Counter = Counter::new("closure");
/// Live keep-alive registries
pub static KEEP_ALIVE: Counter = Counter::new("keep_alive");
/// Live repo objects
pub static REPO: Counter = Counter::new("repo");
/// Live namespace objects
pub static NAMESPACE: Counter = Counter::new("namespace");
/// Live param wrappers
pub static PARAM: Counter = Counter::new("param");
/// Live error-domain prototypes
pub static ERROR_PROTOTYPE: Counter = Counter::new("gerror_prototype");
/// Live error-domain instances
pub static ERROR_INSTANCE: Counter = Counter::new("gerror_instance");

static ALL: [&Counter; 7] = [
    &CLOSURE,
    &KEEP_ALIVE,
    &REPO,
    &NAMESPACE,
    &PARAM,
    &ERROR_PROTOTYPE,
    &ERROR_INSTANCE,
];

/// Current value of every counter
pub fn snapshot() -> Vec<(&'static str, isize)> {
    ALL.iter().map(|c| (c.name(), c.get())).collect()
}

/// Log every counter at debug level
pub fn dump() {
    for (name, value) in snapshot() {
        tracing::debug!(target: "gibridge::gc", counter = name, value, "live objects");
    }
}
