//! gibridge engine
//!
//! This crate provides the binding layer between introspected native
//! libraries and a script engine:
//! - **Runtime**: a reference in-process script runtime (`runtime` module)
//! - **Lifetime bridge**: callback closures and the keep-alive registry (`gi` module)
//! - **Definers**: repo, namespace, enum, error-domain and param objects (`gi` module)
//! - **Metadata**: an in-memory metadata oracle (`static_repo` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use gibridge_engine::{Bridge, Runtime, StaticRepository};
//! use gibridge_sdk::ScriptEngine;
//!
//! let repository = Arc::new(StaticRepository::new());
//! repository.add_namespace("Gdk", &["3.0"]);
//!
//! let runtime = Runtime::new();
//! let cx = runtime.create_context().unwrap();
//! let bridge = Arc::new(Bridge::new(repository));
//! let repo = bridge.define_repo(&runtime, cx).unwrap();
//!
//! // Loads Gdk and defines its namespace object
//! let gdk = runtime.get_property(repo, "Gdk").unwrap();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// Live-object counters
pub mod counters;

/// Introspection bridge: closures, keep-alive registry and definers
pub mod gi;

/// Runtime and bridge configuration
pub mod options;

/// Reference script runtime
pub mod runtime;

/// In-memory metadata oracle
pub mod static_repo;

// ============================================================================
// Re-exports
// ============================================================================

pub use gi::{
    BasicDefiners, Bridge, Closure, ErrorRecord, ExceptionPolicy, Invocation, KeepAlive, NativeInstance,
    ParamSpec, Rooting, TypeDefiners,
};
pub use options::{BridgeOptions, OptionsError, RuntimeOptions};
pub use runtime::{GcStats, Runtime};
pub use static_repo::StaticRepository;
