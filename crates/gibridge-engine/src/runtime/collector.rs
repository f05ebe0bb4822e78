//! Mark-sweep garbage collector
//!
//! Marking starts from the live contexts' globals, persistent roots and the
//! pending exception. Private data is traced through [`ObjectPrivate::trace`]
//! and finalized after the sweep. No heap lock is held while private hooks
//! run, so finalizers may allocate and call back into the runtime.
//!
//! [`ObjectPrivate::trace`]: gibridge_sdk::ObjectPrivate::trace

use std::time::{Duration, Instant};

use gibridge_sdk::{ObjectRef, Tracer};

use super::Runtime;

/// Garbage collector statistics
#[derive(Debug, Clone, Default)]
pub struct GcStats {
    /// Total number of collections
    pub collections: usize,

    /// Total objects freed
    pub objects_freed: usize,

    /// Total pause time across all collections
    pub total_pause_time: Duration,

    /// Last collection duration
    pub last_pause_time: Duration,

    /// Objects marked in last collection
    pub last_marked_count: usize,

    /// Objects freed in last collection
    pub last_freed_count: usize,

    /// Live objects after last collection
    pub live_objects: usize,
}

impl GcStats {
    fn update(&mut self, pause_time: Duration, marked: usize, freed: usize, live_objects: usize) {
        self.collections += 1;
        self.objects_freed += freed;
        self.total_pause_time += pause_time;
        self.last_pause_time = pause_time;
        self.last_marked_count = marked;
        self.last_freed_count = freed;
        self.live_objects = live_objects;
    }

    /// Fraction of objects that survived the last collection (0.0 to 1.0)
    pub fn survival_rate(&self) -> f64 {
        let total = self.last_marked_count + self.last_freed_count;
        if total == 0 {
            return 0.0;
        }
        self.last_marked_count as f64 / total as f64
    }
}

struct MarkStack {
    gray: Vec<ObjectRef>,
}

impl Tracer for MarkStack {
    fn trace_object(&mut self, obj: ObjectRef, _name: &'static str) {
        self.gray.push(obj);
    }
}

/// Run one full collection. Returns the number of objects freed.
pub(crate) fn collect(runtime: &Runtime) -> usize {
    let start = Instant::now();

    // Mark phase
    let mut stack = MarkStack {
        gray: runtime.root_objects(),
    };
    let mut marked = 0;
    while let Some(obj) = stack.gray.pop() {
        let (children, private) = {
            let mut heap = runtime.heap.lock();
            if !heap.mark(obj) {
                continue;
            }
            match heap.get(obj) {
                Some(object) => (object.children(), object.private.clone()),
                None => continue,
            }
        };
        marked += 1;
        stack.gray.extend(children);
        if let Some(private) = private {
            private.trace(&mut stack);
        }
    }

    // Sweep phase
    let (dead, live_objects) = {
        let mut heap = runtime.heap.lock();
        let dead = heap.sweep();
        (dead, heap.live_count())
    };
    let freed = dead.len();

    // Finalize phase, outside the heap lock
    for (obj, object) in dead {
        if let Some(private) = object.private {
            private.finalize(runtime, obj);
        }
    }

    let pause = start.elapsed();
    runtime.stats.lock().update(pause, marked, freed, live_objects);
    tracing::trace!(
        target: "gibridge::gc",
        marked,
        freed,
        live_objects,
        pause_us = pause.as_micros() as u64,
        "collection finished"
    );
    freed
}
