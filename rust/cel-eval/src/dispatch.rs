//! Function dispatch: overload-id and function-name tables.
//!
//! Checked call sites carry a single overload id resolved by the type
//! checker; unchecked sites dispatch at runtime over the candidates sharing
//! the function name. Non-strict operators (`&&`, `||`, `?:`) never go
//! through these tables.

use cel_core::{Capability, EvalError, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub type UnaryFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;
pub type BinaryFn = Arc<dyn Fn(&Value, &Value) -> Value + Send + Sync>;
pub type VariadicFn = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

#[derive(Clone)]
pub enum OverloadImpl {
    Unary(UnaryFn),
    Binary(BinaryFn),
    Function(VariadicFn),
}

/// One concrete implementation of a (possibly polymorphic) function.
#[derive(Clone)]
pub struct Overload {
    pub id: String,
    /// Capability the first argument must support for runtime dispatch.
    pub operand_trait: Option<Capability>,
    /// Strict overloads never see error or unknown arguments.
    pub strict: bool,
    pub implementation: OverloadImpl,
}

impl Overload {
    pub fn unary(
        id: impl Into<String>,
        f: impl Fn(&Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        Overload {
            id: id.into(),
            operand_trait: None,
            strict: true,
            implementation: OverloadImpl::Unary(Arc::new(f)),
        }
    }

    pub fn binary(
        id: impl Into<String>,
        f: impl Fn(&Value, &Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        Overload {
            id: id.into(),
            operand_trait: None,
            strict: true,
            implementation: OverloadImpl::Binary(Arc::new(f)),
        }
    }

    pub fn variadic(
        id: impl Into<String>,
        f: impl Fn(&[Value]) -> Value + Send + Sync + 'static,
    ) -> Self {
        Overload {
            id: id.into(),
            operand_trait: None,
            strict: true,
            implementation: OverloadImpl::Function(Arc::new(f)),
        }
    }

    pub fn with_trait(mut self, cap: Capability) -> Self {
        self.operand_trait = Some(cap);
        self
    }

    pub fn non_strict(mut self) -> Self {
        self.strict = false;
        self
    }

    fn arity_matches(&self, n: usize) -> bool {
        match self.implementation {
            OverloadImpl::Unary(_) => n == 1,
            OverloadImpl::Binary(_) => n == 2,
            OverloadImpl::Function(_) => true,
        }
    }

    fn guard_matches(&self, args: &[Value]) -> bool {
        match self.operand_trait {
            Some(cap) => args.first().is_some_and(|a| a.has_capability(cap)),
            None => true,
        }
    }

    /// Invoke with strictness applied: errors and unknowns in the arguments
    /// of a strict overload propagate without calling the implementation.
    pub fn invoke(&self, args: &[Value]) -> Value {
        if self.strict {
            if let Some(v) = Value::propagate_all(args) {
                return v;
            }
        }
        match &self.implementation {
            OverloadImpl::Unary(f) => match args {
                [a] => f(a),
                _ => arity_error(&self.id, 1, args.len()),
            },
            OverloadImpl::Binary(f) => match args {
                [a, b] => f(a, b),
                _ => arity_error(&self.id, 2, args.len()),
            },
            OverloadImpl::Function(f) => f(args),
        }
    }
}

fn arity_error(id: &str, want: usize, got: usize) -> Value {
    EvalError::invalid_argument(format!("{id} expects {want} argument(s), got {got}")).into()
}

/// Overload-id → implementation, plus function-name → candidate list for
/// runtime dispatch.
#[derive(Clone, Default)]
pub struct Dispatcher {
    overloads: HashMap<String, Arc<Overload>>,
    functions: HashMap<String, Vec<Arc<Overload>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher::default()
    }

    /// Register an overload under a function name and its own overload id.
    pub fn register(&mut self, function: &str, overload: Overload) {
        let ov = Arc::new(overload);
        self.overloads.insert(ov.id.clone(), Arc::clone(&ov));
        self.functions
            .entry(function.to_string())
            .or_default()
            .push(ov);
    }

    /// Make a checker-assigned overload id resolve to an already registered
    /// implementation.
    pub fn alias(&mut self, id: &str, canonical: &str) {
        if let Some(ov) = self.overloads.get(canonical).cloned() {
            self.overloads.insert(id.to_string(), ov);
        }
    }

    pub fn find_overload(&self, id: &str) -> Option<Arc<Overload>> {
        self.overloads.get(id).cloned()
    }

    pub fn has_function(&self, function: &str) -> bool {
        self.functions.contains_key(function)
    }

    /// Runtime dispatch by function name: the first candidate whose arity
    /// and operand trait match wins; a candidate answering `no_such_overload`
    /// lets the next one try.
    pub fn dispatch(&self, function: &str, args: &[Value]) -> Value {
        let Some(candidates) = self.functions.get(function) else {
            return no_such_signature(function, args);
        };
        for ov in candidates {
            if !ov.arity_matches(args.len()) || !ov.guard_matches(args) {
                continue;
            }
            let result = ov.invoke(args);
            if let Value::Error(e) = &result {
                if e.kind == cel_core::ErrorKind::NoSuchOverload {
                    continue;
                }
            }
            return result;
        }
        no_such_signature(function, args)
    }
}

fn no_such_signature(function: &str, args: &[Value]) -> Value {
    let kinds: Vec<String> = args.iter().map(|a| a.kind().to_string()).collect();
    EvalError::no_such_overload(format!("{}({})", function, kinds.join(", "))).into()
}
