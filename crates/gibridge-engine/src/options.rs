//! Runtime and bridge configuration

/// Allocations between automatic collections
pub const DEFAULT_GC_ALLOCATION_THRESHOLD: usize = 10_000;

/// Namespaces whose version is chosen when none is pinned explicitly
pub const DEFAULT_PINNED_VERSIONS: &[(&str, &str)] =
    &[("GLib", "2.0"), ("GObject", "2.0"), ("Gio", "2.0")];

/// Invalid option combinations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptionsError {
    /// A heap that can hold no objects cannot create a context
    #[error("max_objects must be at least 1")]
    ZeroHeapLimit,

    /// A zero threshold would collect on every allocation check
    #[error("gc_allocation_threshold must be at least 1 (use None to disable)")]
    ZeroGcThreshold,
}

/// Options for the reference runtime
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Maximum number of live heap objects; allocation beyond it fails
    pub max_objects: Option<usize>,
    /// Allocations between automatic collections; `None` disables them
    pub gc_allocation_threshold: Option<usize>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            max_objects: None,
            gc_allocation_threshold: Some(DEFAULT_GC_ALLOCATION_THRESHOLD),
        }
    }
}

impl RuntimeOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of live objects
    pub fn with_max_objects(mut self, max: usize) -> Self {
        self.max_objects = Some(max);
        self
    }

    /// Set or disable the automatic collection threshold
    pub fn with_gc_allocation_threshold(mut self, threshold: Option<usize>) -> Self {
        self.gc_allocation_threshold = threshold;
        self
    }

    /// Check the options for values that can never work
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.max_objects == Some(0) {
            return Err(OptionsError::ZeroHeapLimit);
        }
        if self.gc_allocation_threshold == Some(0) {
            return Err(OptionsError::ZeroGcThreshold);
        }
        Ok(())
    }
}

/// Options for the namespace definers
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// Initial contents of the repo's `versions` object
    pub pinned_versions: Vec<(String, String)>,
    /// Warn when a namespace has several versions and none is pinned
    pub warn_on_multiple_versions: bool,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            pinned_versions: DEFAULT_PINNED_VERSIONS
                .iter()
                .map(|(ns, v)| (ns.to_string(), v.to_string()))
                .collect(),
            warn_on_multiple_versions: true,
        }
    }
}

impl BridgeOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin `namespace` to `version`, replacing an earlier pin
    pub fn with_version(mut self, namespace: impl Into<String>, version: impl Into<String>) -> Self {
        let namespace = namespace.into();
        self.pinned_versions.retain(|(ns, _)| *ns != namespace);
        self.pinned_versions.push((namespace, version.into()));
        self
    }

    /// Enable or disable the multiple-version warning
    pub fn with_multiple_version_warning(mut self, warn: bool) -> Self {
        self.warn_on_multiple_versions = warn;
        self
    }

    /// Pinned version of `namespace`
    pub fn pinned_version(&self, namespace: &str) -> Option<&str> {
        self.pinned_versions
            .iter()
            .find(|(ns, _)| ns == namespace)
            .map(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pins() {
        let options = BridgeOptions::default();
        assert_eq!(options.pinned_version("GLib"), Some("2.0"));
        assert_eq!(options.pinned_version("Gio"), Some("2.0"));
        assert_eq!(options.pinned_version("Gtk"), None);
    }

    #[test]
    fn test_with_version_replaces() {
        let options = BridgeOptions::new().with_version("GLib", "3.0");
        assert_eq!(options.pinned_version("GLib"), Some("3.0"));
        assert_eq!(
            options.pinned_versions.iter().filter(|(ns, _)| ns == "GLib").count(),
            1
        );
    }

    #[test]
    fn test_validate() {
        assert!(RuntimeOptions::default().validate().is_ok());
        assert_eq!(
            RuntimeOptions::new().with_max_objects(0).validate(),
            Err(OptionsError::ZeroHeapLimit)
        );
        assert_eq!(
            RuntimeOptions::new()
                .with_gc_allocation_threshold(Some(0))
                .validate(),
            Err(OptionsError::ZeroGcThreshold)
        );
    }
}
