//! Closure lifetime bridge
//!
//! A [`Closure`] lets native code hold a script callable beyond the current
//! call and invoke it later. It is either valid (callable, context and
//! runtime all recorded) or invalid (none of them); invalid is terminal.
//!
//! A closure becomes invalid when:
//!
//! - its owner calls [`Closure::invalidate`],
//! - it is about to be invoked but its context is no longer live,
//! - the keep-alive registry anchoring it is finalized,
//! - its callable was collected (noticed on the next state query or invoke),
//! - the owner of a [`Rooting::Owner`] closure is finalized.
//!
//! Invoking an invalid closure does nothing.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use gibridge_sdk::{
    AutoContext, BridgeError, BridgeResult, ContextId, ObjectRef, RuntimeId, ScriptEngine,
    ScriptValue, Tracer,
};
use parking_lot::Mutex;

use super::keep_alive::{ChildData, KeepAlive};
use crate::counters;

/// How the callable is kept alive while the closure is valid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rooting {
    /// Anchored in the keep-alive registry of the context's global object.
    /// The registry entry owns one reference to the closure.
    KeepAlive,
    /// The owning wrapper object reports the callable from its own trace hook
    /// through [`Closure::trace`]
    Owner,
}

/// What to do with an exception thrown by the callable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionPolicy {
    /// Report it through the engine and return [`Invocation::Failed`]
    Log,
    /// Return it as [`Invocation::Raised`]
    Return,
}

/// Result of [`Closure::invoke`]
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// The callable returned a value
    Completed(ScriptValue),
    /// The callable threw and the policy is [`ExceptionPolicy::Return`]
    Raised(ScriptValue),
    /// The callable threw and the exception was reported
    Failed,
    /// The closure is invalid, or became invalid, and nothing was called
    Skipped,
}

#[derive(Debug, Clone, Copy)]
struct Target {
    callable: ObjectRef,
    context: ContextId,
    runtime: RuntimeId,
}

enum ClosureState {
    Valid(Target),
    Invalid,
}

/// Native handle to a script callable
pub struct Closure {
    state: Mutex<ClosureState>,
    description: String,
    rooting: Rooting,
    policy: ExceptionPolicy,
    awaiting_teardown: AtomicBool,
    self_ref: Mutex<Option<Arc<Closure>>>,
}

impl Closure {
    /// Wrap `callable`, which lives in context `cx`.
    ///
    /// With [`Rooting::KeepAlive`] the callable is registered with the
    /// keep-alive registry of `cx`'s global object, which is created if
    /// needed.
    pub fn new(
        engine: &dyn ScriptEngine,
        cx: ContextId,
        callable: ObjectRef,
        description: impl Into<String>,
        rooting: Rooting,
        policy: ExceptionPolicy,
    ) -> BridgeResult<Arc<Self>> {
        let description = description.into();
        if !engine.is_callable(&ScriptValue::Object(callable)) {
            return Err(BridgeError::TypeError(format!(
                "Callback for {} is not callable",
                description
            )));
        }
        let global = engine
            .global_object(cx)
            .ok_or_else(|| BridgeError::Failed(format!("Cannot create closure {}: context is not live", description)))?;

        let closure = Arc::new(Closure {
            state: Mutex::new(ClosureState::Valid(Target {
                callable,
                context: cx,
                runtime: engine.runtime_id(),
            })),
            description,
            rooting,
            policy,
            awaiting_teardown: AtomicBool::new(false),
            self_ref: Mutex::new(None),
        });
        counters::CLOSURE.inc();

        if rooting == Rooting::KeepAlive {
            KeepAlive::get_or_create_for_root(engine, global).add_child(
                global_context_finalized,
                callable,
                closure.registry_data(),
            );
        }
        tracing::debug!(
            target: "gibridge::closure",
            description = %closure.description,
            ?callable,
            ?rooting,
            "created closure"
        );
        Ok(closure)
    }

    fn registry_data(self: &Arc<Self>) -> ChildData {
        Some(Arc::clone(self) as _)
    }

    fn target(&self) -> Option<Target> {
        match &*self.state.lock() {
            ClosureState::Valid(target) => Some(*target),
            ClosureState::Invalid => None,
        }
    }

    fn take_target(&self) -> Option<Target> {
        match std::mem::replace(&mut *self.state.lock(), ClosureState::Invalid) {
            ClosureState::Valid(target) => Some(target),
            ClosureState::Invalid => None,
        }
    }

    /// Current target, after invalidating the closure if `engine` collected
    /// the callable. Targets recorded by another runtime are returned as is.
    fn live_target(self: &Arc<Self>, engine: &dyn ScriptEngine) -> Option<Target> {
        let target = self.target()?;
        if engine.runtime_id() == target.runtime && !engine.is_alive(target.callable) {
            tracing::debug!(
                target: "gibridge::closure",
                description = %self.description,
                callable = ?target.callable,
                "callable was collected"
            );
            self.invalidate(engine);
            return None;
        }
        Some(target)
    }

    /// Whether the closure can still be invoked
    pub fn is_valid(self: &Arc<Self>, engine: &dyn ScriptEngine) -> bool {
        self.live_target(engine).is_some()
    }

    /// Context of a valid closure
    pub fn context(self: &Arc<Self>, engine: &dyn ScriptEngine) -> Option<ContextId> {
        self.live_target(engine).map(|t| t.context)
    }

    /// Callable of a valid closure
    pub fn callable(self: &Arc<Self>, engine: &dyn ScriptEngine) -> Option<ObjectRef> {
        self.live_target(engine).map(|t| t.callable)
    }

    /// Human-readable origin, used in diagnostics
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Rooting mode
    pub fn rooting(&self) -> Rooting {
        self.rooting
    }

    /// Whether the closure was invalidated after its context died and is
    /// waiting for the registry teardown notification
    pub fn is_awaiting_teardown(&self) -> bool {
        self.awaiting_teardown.load(Ordering::Acquire)
    }

    /// Report the callable to the collector. Only [`Rooting::Owner`] closures
    /// need this.
    pub fn trace(&self, tracer: &mut dyn Tracer) {
        if let Some(target) = self.target() {
            tracer.trace_object(target.callable, "closure::callable");
        }
    }

    /// Finalize hook for the wrapper owning a [`Rooting::Owner`] closure.
    /// The callable is only reachable through the owner, so the closure is
    /// invalid from here on.
    pub fn owner_finalized(self: &Arc<Self>, engine: &dyn ScriptEngine) {
        self.invalidate(engine);
    }

    /// Make the closure invalid. Calling this on an invalid closure does
    /// nothing.
    ///
    /// If the closure's context is no longer live its keep-alive registry is
    /// being torn down and must not be touched; the closure then keeps itself
    /// alive until the registry's notification arrives.
    pub fn invalidate(self: &Arc<Self>, engine: &dyn ScriptEngine) {
        let Some(target) = self.take_target() else {
            return;
        };
        tracing::debug!(
            target: "gibridge::closure",
            description = %self.description,
            callable = ?target.callable,
            "invalidating closure"
        );
        if self.rooting != Rooting::KeepAlive {
            return;
        }

        let live_global = if engine.runtime_id() == target.runtime {
            engine
                .global_object(target.context)
                .filter(|_| engine.is_context_live(target.context))
        } else {
            None
        };
        match live_global {
            Some(global) => {
                if let Some(registry) = KeepAlive::get_if_exists_for_root(engine, global) {
                    registry.remove_child(global_context_finalized, target.callable, &self.registry_data());
                }
            }
            None => {
                tracing::debug!(
                    target: "gibridge::closure",
                    description = %self.description,
                    "context is gone, deferring cleanup to registry teardown"
                );
                *self.self_ref.lock() = Some(Arc::clone(self));
                self.awaiting_teardown.store(true, Ordering::Release);
            }
        }
    }

    /// Registry teardown: the closure is invalid from here on and drops the
    /// reference it may have kept on itself.
    fn teardown_notified(&self) {
        self.take_target();
        self.awaiting_teardown.store(false, Ordering::Release);
        let held = self.self_ref.lock().take();
        drop(held);
    }

    /// Call the callable with `this` and `args` inside the closure's context.
    pub fn invoke(
        self: &Arc<Self>,
        engine: &dyn ScriptEngine,
        this: ScriptValue,
        args: &[ScriptValue],
    ) -> Invocation {
        let Some(target) = self.target() else {
            tracing::trace!(target: "gibridge::closure", description = %self.description, "invoking invalid closure");
            return Invocation::Skipped;
        };
        if engine.runtime_id() != target.runtime {
            tracing::warn!(
                target: "gibridge::closure",
                description = %self.description,
                "closure invoked from a different runtime than the one that created it"
            );
            return Invocation::Skipped;
        }
        if !engine.is_context_live(target.context) {
            tracing::debug!(
                target: "gibridge::closure",
                description = %self.description,
                context = target.context.0,
                "context of closure is dead, invalidating instead of invoking"
            );
            self.invalidate(engine);
            return Invocation::Skipped;
        }
        let Some(target) = self.live_target(engine) else {
            return Invocation::Skipped;
        };
        let Some(_entered) = AutoContext::enter(engine, target.context) else {
            self.invalidate(engine);
            return Invocation::Skipped;
        };

        if engine.is_exception_pending() {
            tracing::warn!(
                target: "gibridge::closure",
                description = %self.description,
                "exception was pending before invoking callback; this is probably a bug in the caller"
            );
            engine.log_pending_exception();
        }

        let callee = ScriptValue::Object(target.callable);
        match engine.call_function(this, &callee, args) {
            Ok(value) => {
                if engine.is_exception_pending() {
                    tracing::warn!(
                        target: "gibridge::closure",
                        description = %self.description,
                        "closure invocation succeeded but an exception was set"
                    );
                    engine.log_pending_exception();
                }
                engine.schedule_gc_if_needed();
                Invocation::Completed(value)
            }
            Err(err) => {
                let thrown = engine.error_value(&err);
                match self.policy {
                    ExceptionPolicy::Return => Invocation::Raised(thrown),
                    ExceptionPolicy::Log => {
                        engine.report_exception(&thrown);
                        Invocation::Failed
                    }
                }
            }
        }
    }
}

/// Notify function of closures anchored in a keep-alive registry
fn global_context_finalized(_engine: &dyn ScriptEngine, child: ObjectRef, data: &ChildData) {
    let Some(closure) = data.clone().and_then(|d| d.downcast::<Closure>().ok()) else {
        return;
    };
    tracing::debug!(
        target: "gibridge::closure",
        description = %closure.description,
        ?child,
        awaiting_teardown = closure.is_awaiting_teardown(),
        "global context finalized, closure released"
    );
    closure.teardown_notified();
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("description", &self.description)
            .field("target", &self.target())
            .field("rooting", &self.rooting)
            .finish()
    }
}

impl Drop for Closure {
    fn drop(&mut self) {
        counters::CLOSURE.dec();
    }
}
