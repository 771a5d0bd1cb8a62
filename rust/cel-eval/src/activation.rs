//! Binding environments for a single eval call.
//!
//! Activations are read-only during evaluation. Parent chaining lets hosts
//! layer bindings; comprehension loops push their own internal frames on top.

use crate::attributes::AttributePattern;
use crate::registry::{JsonAdapter, TypeAdapter};
use cel_core::Value;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Name→value lookup. `resolve_name` covers the full chain: an implementation
/// consults its own bindings, then delegates to its parent.
pub trait Activation {
    fn resolve_name(&self, name: &str) -> Option<Value>;

    fn parent(&self) -> Option<&dyn Activation> {
        None
    }

    /// Unknown-attribute patterns for partial inputs.
    fn unknown_patterns(&self) -> &[AttributePattern] {
        match self.parent() {
            Some(p) => p.unknown_patterns(),
            None => &[],
        }
    }

    /// Checked by comprehension loops before each iteration.
    fn interrupted(&self) -> bool {
        self.parent().is_some_and(|p| p.interrupted())
    }
}

/// The activation with no bindings.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyActivation;

impl Activation for EmptyActivation {
    fn resolve_name(&self, _name: &str) -> Option<Value> {
        None
    }
}

/// Bindings backed by a name→value map.
#[derive(Debug, Default)]
pub struct MapActivation {
    vars: HashMap<String, Value>,
}

impl MapActivation {
    pub fn new() -> Self {
        MapActivation::default()
    }

    pub fn bind(mut self, name: impl Into<String>, value: Value) -> Self {
        self.vars.insert(name.into(), value);
        self
    }

    /// Adapt a JSON object into top-level bindings.
    pub fn from_json(json: &serde_json::Value) -> Self {
        let mut vars = HashMap::new();
        if let serde_json::Value::Object(fields) = json {
            for (k, v) in fields {
                vars.insert(k.clone(), JsonAdapter.native_to_value(v));
            }
        }
        MapActivation { vars }
    }
}

impl From<HashMap<String, Value>> for MapActivation {
    fn from(vars: HashMap<String, Value>) -> Self {
        MapActivation { vars }
    }
}

impl Activation for MapActivation {
    fn resolve_name(&self, name: &str) -> Option<Value> {
        self.vars.get(name).cloned()
    }
}

/// Child-over-parent layering; the child shadows.
pub struct HierarchicalActivation {
    parent: Rc<dyn Activation>,
    child: Rc<dyn Activation>,
}

impl HierarchicalActivation {
    pub fn new(parent: Rc<dyn Activation>, child: Rc<dyn Activation>) -> Self {
        HierarchicalActivation { parent, child }
    }
}

impl Activation for HierarchicalActivation {
    fn resolve_name(&self, name: &str) -> Option<Value> {
        self.child
            .resolve_name(name)
            .or_else(|| self.parent.resolve_name(name))
    }

    fn parent(&self) -> Option<&dyn Activation> {
        Some(self.parent.as_ref())
    }
}

/// A partial activation: bindings plus patterns naming the attributes the
/// caller could not supply. Matching attribute walks yield unknown values.
pub struct PartialActivation {
    inner: Rc<dyn Activation>,
    patterns: Vec<AttributePattern>,
}

impl PartialActivation {
    pub fn new(inner: Rc<dyn Activation>, patterns: Vec<AttributePattern>) -> Self {
        PartialActivation { inner, patterns }
    }
}

impl Activation for PartialActivation {
    fn resolve_name(&self, name: &str) -> Option<Value> {
        self.inner.resolve_name(name)
    }

    fn parent(&self) -> Option<&dyn Activation> {
        Some(self.inner.as_ref())
    }

    fn unknown_patterns(&self) -> &[AttributePattern] {
        &self.patterns
    }
}

/// Wraps an activation with a cancellation token. Comprehension bodies check
/// it before each iteration and return an `interrupted` error when set.
pub struct InterruptibleActivation {
    inner: Rc<dyn Activation>,
    token: Arc<AtomicBool>,
}

impl InterruptibleActivation {
    pub fn new(inner: Rc<dyn Activation>, token: Arc<AtomicBool>) -> Self {
        InterruptibleActivation { inner, token }
    }
}

impl Activation for InterruptibleActivation {
    fn resolve_name(&self, name: &str) -> Option<Value> {
        self.inner.resolve_name(name)
    }

    fn parent(&self) -> Option<&dyn Activation> {
        Some(self.inner.as_ref())
    }

    fn interrupted(&self) -> bool {
        self.token.load(Ordering::Relaxed) || self.inner.interrupted()
    }
}
