//! In-memory metadata oracle
//!
//! [`StaticRepository`] holds namespaces, infos and a type tree registered at
//! runtime. It backs the tests and benches and suits embedders whose bindings
//! are generated ahead of time.
//!
//! Infos are only visible through [`Repository::find_by_name`],
//! [`Repository::find_by_gtype`] and [`Repository::find_by_error_domain`]
//! once their namespace has been required.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use gibridge_sdk::{BaseInfo, GType, InfoRef, Quark, Repository, RepositoryError};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// First id handed out by [`StaticRepository::register_type`]
const FIRST_DYNAMIC_TYPE: usize = 4096;

#[derive(Debug, Clone)]
struct TypeNode {
    name: String,
    parent: Option<GType>,
    instantiatable: bool,
}

#[derive(Debug, Default)]
struct NamespaceEntry {
    versions: Vec<String>,
    infos: FxHashMap<String, InfoRef>,
}

#[derive(Debug, Default)]
struct State {
    types: FxHashMap<GType, TypeNode>,
    next_type: usize,
    namespaces: FxHashMap<String, NamespaceEntry>,
    loaded: FxHashMap<String, String>,
    by_gtype: FxHashMap<GType, InfoRef>,
    by_domain: FxHashMap<Quark, InfoRef>,
}

/// Metadata oracle over infos registered in memory
#[derive(Debug)]
pub struct StaticRepository {
    state: RwLock<State>,
    lookups: AtomicUsize,
}

impl StaticRepository {
    /// Create a repository knowing only the fundamental types
    pub fn new() -> Self {
        let mut state = State {
            next_type: FIRST_DYNAMIC_TYPE,
            ..State::default()
        };
        let fundamentals: [(GType, &str, bool); 20] = [
            (GType::NONE, "void", false),
            (GType::INTERFACE, "GInterface", false),
            (GType::CHAR, "gchar", false),
            (GType::UCHAR, "guchar", false),
            (GType::BOOLEAN, "gboolean", false),
            (GType::INT, "gint", false),
            (GType::UINT, "guint", false),
            (GType::LONG, "glong", false),
            (GType::ULONG, "gulong", false),
            (GType::INT64, "gint64", false),
            (GType::UINT64, "guint64", false),
            (GType::ENUM, "GEnum", false),
            (GType::FLAGS, "GFlags", false),
            (GType::FLOAT, "gfloat", false),
            (GType::DOUBLE, "gdouble", false),
            (GType::STRING, "gchararray", false),
            (GType::POINTER, "gpointer", false),
            (GType::BOXED, "GBoxed", false),
            (GType::PARAM, "GParam", true),
            (GType::OBJECT, "GObject", true),
        ];
        for (gtype, name, instantiatable) in fundamentals {
            state.types.insert(
                gtype,
                TypeNode {
                    name: name.to_string(),
                    parent: None,
                    instantiatable,
                },
            );
        }
        state.types.insert(
            GType::ERROR,
            TypeNode {
                name: "GError".to_string(),
                parent: Some(GType::BOXED),
                instantiatable: false,
            },
        );

        Self {
            state: RwLock::new(state),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Register a type deriving from `parent` and return its id.
    /// Instantiability is inherited from a fundamental parent when it has it.
    pub fn register_type(&self, name: &str, parent: GType, instantiatable: bool) -> GType {
        let mut state = self.state.write();
        let gtype = GType(state.next_type);
        state.next_type += 1;
        let inherited = state.types.get(&parent).is_some_and(|p| p.instantiatable);
        state.types.insert(
            gtype,
            TypeNode {
                name: name.to_string(),
                parent: Some(parent),
                instantiatable: instantiatable || inherited,
            },
        );
        tracing::trace!(target: "gibridge::repo", ?gtype, ?parent, name, "registered type");
        gtype
    }

    /// Make `namespace` loadable at `versions`. The last version listed is
    /// the one loaded when none is requested.
    pub fn add_namespace(&self, namespace: &str, versions: &[&str]) {
        let mut state = self.state.write();
        let entry = state.namespaces.entry(namespace.to_string()).or_default();
        for version in versions {
            if !entry.versions.iter().any(|v| v == version) {
                entry.versions.push(version.to_string());
            }
        }
    }

    /// Add `info` to its namespace, creating the namespace at version `1.0`
    /// if it is unknown. Infos without a namespace are only reachable by
    /// type.
    pub fn add_info(&self, info: BaseInfo) -> InfoRef {
        let info: InfoRef = Arc::new(info);
        let mut state = self.state.write();
        if let Some(namespace) = info.namespace() {
            let entry = state.namespaces.entry(namespace.to_string()).or_insert_with(|| NamespaceEntry {
                versions: vec!["1.0".to_string()],
                infos: FxHashMap::default(),
            });
            entry.infos.insert(info.name().to_string(), info.clone());
        }
        state.index(&info);
        info
    }

    /// Namespaces currently loaded, with their versions
    pub fn loaded_namespaces(&self) -> Vec<(String, String)> {
        let mut loaded: Vec<_> = self
            .state
            .read()
            .loaded
            .iter()
            .map(|(ns, v)| (ns.clone(), v.clone()))
            .collect();
        loaded.sort();
        loaded
    }

    /// Number of `find_*` queries answered so far
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    fn count_lookup(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for StaticRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    fn is_loaded(&self, info: &BaseInfo) -> bool {
        match info.namespace() {
            Some(namespace) => self.loaded.contains_key(namespace),
            None => true,
        }
    }

    fn index(&mut self, info: &InfoRef) {
        let gtype = info.gtype();
        if gtype != GType::NONE && !info.is_gtype_struct() {
            self.by_gtype.insert(gtype, info.clone());
        }
        if let Some(domain) = info.enum_info().and_then(|e| e.error_domain.as_deref()) {
            self.by_domain.insert(Quark::from_str(domain), info.clone());
        }
    }
}

impl Repository for StaticRepository {
    fn find_by_name(&self, namespace: &str, name: &str) -> Option<InfoRef> {
        self.count_lookup();
        let state = self.state.read();
        if !state.loaded.contains_key(namespace) {
            return None;
        }
        state.namespaces.get(namespace)?.infos.get(name).cloned()
    }

    fn find_by_gtype(&self, gtype: GType) -> Option<InfoRef> {
        self.count_lookup();
        let state = self.state.read();
        state.by_gtype.get(&gtype).filter(|info| state.is_loaded(info)).cloned()
    }

    fn find_by_error_domain(&self, domain: Quark) -> Option<InfoRef> {
        self.count_lookup();
        let state = self.state.read();
        state.by_domain.get(&domain).filter(|info| state.is_loaded(info)).cloned()
    }

    fn require(&self, namespace: &str, version: Option<&str>) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        let entry = state
            .namespaces
            .get(namespace)
            .ok_or_else(|| RepositoryError::NamespaceNotFound {
                namespace: namespace.to_string(),
            })?;

        let target = match version {
            Some(v) if entry.versions.iter().any(|known| known == v) => v.to_string(),
            Some(v) => {
                return Err(RepositoryError::VersionNotFound {
                    namespace: namespace.to_string(),
                    version: v.to_string(),
                })
            }
            None => match state.loaded.get(namespace) {
                Some(loaded) => loaded.clone(),
                None => entry.versions.last().cloned().ok_or_else(|| RepositoryError::NamespaceNotFound {
                    namespace: namespace.to_string(),
                })?,
            },
        };

        match state.loaded.get(namespace).cloned() {
            Some(loaded) if loaded != target => Err(RepositoryError::VersionConflict {
                namespace: namespace.to_string(),
                requested: target,
                loaded,
            }),
            Some(_) => Ok(()),
            None => {
                tracing::debug!(target: "gibridge::repo", namespace, version = %target, "loaded namespace");
                state.loaded.insert(namespace.to_string(), target);
                Ok(())
            }
        }
    }

    fn enumerate_versions(&self, namespace: &str) -> Vec<String> {
        self.state
            .read()
            .namespaces
            .get(namespace)
            .map(|entry| entry.versions.clone())
            .unwrap_or_default()
    }

    fn is_registered(&self, namespace: &str, version: Option<&str>) -> bool {
        match (self.state.read().loaded.get(namespace), version) {
            (Some(loaded), Some(v)) => loaded == v,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    fn type_name(&self, gtype: GType) -> Option<String> {
        self.state.read().types.get(&gtype).map(|node| node.name.clone())
    }

    fn type_parent(&self, gtype: GType) -> Option<GType> {
        self.state.read().types.get(&gtype).and_then(|node| node.parent)
    }

    fn type_is_instantiatable(&self, gtype: GType) -> bool {
        self.state.read().types.get(&gtype).is_some_and(|node| node.instantiatable)
    }
}
