//! Object heap
//!
//! Objects live in generation-checked slots. A freed slot is reused with a new
//! generation, so stale [`ObjectRef`]s never alias a newer object.

use std::sync::Arc;

use gibridge_sdk::{
    BridgeError, BridgeResult, NativeFunction, ObjectPrivate, ObjectRef, PropertyFlags, RootSlot,
    ScriptValue,
};
use rustc_hash::FxHashMap;

/// Value part of a property
#[derive(Clone)]
pub(crate) enum PropertyValue {
    Data(ScriptValue),
    Accessor(NativeFunction),
}

#[derive(Clone)]
pub(crate) struct Property {
    pub value: PropertyValue,
    pub flags: PropertyFlags,
}

/// Insertion-ordered property table
#[derive(Default)]
pub(crate) struct PropertyMap {
    entries: Vec<(String, Property)>,
    index: FxHashMap<String, usize>,
}

impl PropertyMap {
    pub fn get(&self, name: &str) -> Option<&Property> {
        self.index.get(name).map(|&i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Property> {
        match self.index.get(name) {
            Some(&i) => Some(&mut self.entries[i].1),
            None => None,
        }
    }

    /// Insert or replace. A replaced property keeps its position.
    pub fn insert(&mut self, name: &str, property: Property) {
        match self.index.get(name) {
            Some(&i) => self.entries[i].1 = property,
            None => {
                self.index.insert(name.to_string(), self.entries.len());
                self.entries.push((name.to_string(), property));
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Property> {
        let i = self.index.remove(name)?;
        let (_, property) = self.entries.remove(i);
        for slot in self.index.values_mut() {
            if *slot > i {
                *slot -= 1;
            }
        }
        Some(property)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Property)> + '_ {
        self.entries.iter().map(|(n, p)| (n.as_str(), p))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Native call behaviour of a function object
#[derive(Clone)]
pub(crate) struct Callable {
    pub name: String,
    pub nargs: u32,
    pub function: NativeFunction,
    /// Instance class for constructors; `None` for plain functions
    pub instance_class: Option<&'static str>,
}

pub(crate) struct HeapObject {
    pub class: &'static str,
    pub proto: Option<ObjectRef>,
    pub properties: PropertyMap,
    pub private: Option<Arc<dyn ObjectPrivate>>,
    pub callable: Option<Callable>,
    pub slots: FxHashMap<RootSlot, ScriptValue>,
    marked: bool,
}

impl HeapObject {
    pub fn new(class: &'static str, proto: Option<ObjectRef>) -> Self {
        Self {
            class,
            proto,
            properties: PropertyMap::default(),
            private: None,
            callable: None,
            slots: FxHashMap::default(),
            marked: false,
        }
    }

    /// Every object this one holds a strong edge to, excluding private data
    pub fn children(&self) -> Vec<ObjectRef> {
        let mut out = Vec::new();
        if let Some(proto) = self.proto {
            out.push(proto);
        }
        for (_, property) in self.properties.iter() {
            if let PropertyValue::Data(ScriptValue::Object(obj)) = &property.value {
                out.push(*obj);
            }
        }
        for value in self.slots.values() {
            if let ScriptValue::Object(obj) = value {
                out.push(*obj);
            }
        }
        out
    }
}

struct Slot {
    generation: u32,
    object: Option<HeapObject>,
}

pub(crate) struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    max_objects: Option<usize>,
    allocations_since_gc: usize,
}

impl Heap {
    pub fn new(max_objects: Option<usize>) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            max_objects,
            allocations_since_gc: 0,
        }
    }

    pub fn allocate(&mut self, object: HeapObject) -> BridgeResult<ObjectRef> {
        if let Some(max) = self.max_objects {
            if self.live >= max {
                return Err(BridgeError::Failed(format!(
                    "out of memory: heap limit of {} objects reached",
                    max
                )));
            }
        }
        self.live += 1;
        self.allocations_since_gc += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.object = Some(object);
            return Ok(ObjectRef::new(index, slot.generation));
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            object: Some(object),
        });
        Ok(ObjectRef::new(index, 0))
    }

    pub fn get(&self, obj: ObjectRef) -> Option<&HeapObject> {
        let slot = self.slots.get(obj.index() as usize)?;
        if slot.generation != obj.generation() {
            return None;
        }
        slot.object.as_ref()
    }

    pub fn get_mut(&mut self, obj: ObjectRef) -> Option<&mut HeapObject> {
        let slot = self.slots.get_mut(obj.index() as usize)?;
        if slot.generation != obj.generation() {
            return None;
        }
        slot.object.as_mut()
    }

    /// Like [`get`](Self::get), failing for collected objects
    pub fn expect(&self, obj: ObjectRef) -> BridgeResult<&HeapObject> {
        self.get(obj).ok_or_else(|| stale(obj))
    }

    /// Like [`get_mut`](Self::get_mut), failing for collected objects
    pub fn expect_mut(&mut self, obj: ObjectRef) -> BridgeResult<&mut HeapObject> {
        self.get_mut(obj).ok_or_else(|| stale(obj))
    }

    pub fn contains(&self, obj: ObjectRef) -> bool {
        self.get(obj).is_some()
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn allocations_since_gc(&self) -> usize {
        self.allocations_since_gc
    }

    /// Set the mark bit. Returns `true` if the object was live and unmarked.
    pub fn mark(&mut self, obj: ObjectRef) -> bool {
        match self.get_mut(obj) {
            Some(object) if !object.marked => {
                object.marked = true;
                true
            }
            _ => false,
        }
    }

    /// Remove every unmarked object and clear the marks of survivors.
    pub fn sweep(&mut self) -> Vec<(ObjectRef, HeapObject)> {
        let mut dead = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let keep = match slot.object.as_mut() {
                Some(object) if object.marked => {
                    object.marked = false;
                    true
                }
                Some(_) => false,
                None => continue,
            };
            if !keep {
                if let Some(object) = slot.object.take() {
                    dead.push((ObjectRef::new(index as u32, slot.generation), object));
                }
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
            }
        }
        self.live -= dead.len();
        self.allocations_since_gc = 0;
        dead
    }
}

fn stale(obj: ObjectRef) -> BridgeError {
    BridgeError::Failed(format!("use of collected object {:?}", obj))
}
