//! AST → interpretable lowering.
//!
//! Select chains merge into single namespaced attributes, the non-strict
//! operators become dedicated nodes, and every planned node runs through the
//! decorator chain bottom-up. Unresolvable checked references are reported
//! synchronously rather than deferred to eval time.

use crate::ast::{CheckMetadata, CheckedExpr, Constant, Expr, ExprKind, Reference};
use crate::attributes::{
    namespace_candidates, Attribute, NamespacedAttribute, Qualifier, QualifierKey,
    RelativeAttribute,
};
use crate::decorators::Decorator;
use crate::dispatch::Dispatcher;
use crate::interpretable::{
    EvalAnd, EvalConditional, EvalFold, EvalList, EvalMap, EvalObject, EvalOr, EvalTestOnly,
    Interpretable, InterpretableAttribute, InterpretableCall, InterpretableConst,
};
use crate::registry::TypeRegistry;
use cel_core::{EvalError, Value};
use std::rc::Rc;
use thiserror::Error;

/// Errors the planner reports synchronously.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("unknown message type: '{0}'")]
    UnknownType(String),
    #[error("unknown overload id: '{0}'")]
    UnknownOverload(String),
    #[error("invalid expression: {0}")]
    InvalidAst(String),
    /// Constant folding under `optimize` evaluated to an error; the message
    /// is the one the unoptimized program would produce at runtime.
    #[error("{0}")]
    FoldedError(EvalError),
}

/// Lowers expressions against a dispatcher, registry, and container name.
pub struct Planner {
    dispatcher: Rc<Dispatcher>,
    registry: Rc<TypeRegistry>,
    container: String,
    decorators: Vec<Decorator>,
}

impl Planner {
    pub fn new(dispatcher: Rc<Dispatcher>, registry: Rc<TypeRegistry>) -> Self {
        Planner {
            dispatcher,
            registry,
            container: String::new(),
            decorators: Vec::new(),
        }
    }

    /// Set the namespace container, e.g. `"acme.api"`. Identifier candidate
    /// names are computed against it at plan time and frozen.
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = container.into();
        self
    }

    /// Append a decorator; decorators apply to each node bottom-up, in the
    /// order they were added.
    pub fn with_decorator(mut self, decorator: Decorator) -> Self {
        self.decorators.push(decorator);
        self
    }

    pub fn plan(&self, expr: &Expr) -> Result<Box<dyn Interpretable>, PlanError> {
        self.plan_expr(expr, &CheckMetadata::default())
    }

    pub fn plan_checked(&self, checked: &CheckedExpr) -> Result<Box<dyn Interpretable>, PlanError> {
        self.plan_expr(&checked.expr, &checked.metadata)
    }

    fn decorate(
        &self,
        mut node: Box<dyn Interpretable>,
    ) -> Result<Box<dyn Interpretable>, PlanError> {
        for d in &self.decorators {
            node = d(node)?;
        }
        Ok(node)
    }

    fn plan_expr(
        &self,
        expr: &Expr,
        md: &CheckMetadata,
    ) -> Result<Box<dyn Interpretable>, PlanError> {
        let node: Box<dyn Interpretable> = match &expr.kind {
            ExprKind::Const(c) => {
                Box::new(InterpretableConst::new(expr.id, const_value(c)))
            }
            ExprKind::Ident(_) | ExprKind::Select { test_only: false, .. } => {
                let attr = self.plan_attribute(expr, md)?;
                Box::new(InterpretableAttribute::new(expr.id, attr))
            }
            ExprKind::Select {
                operand,
                field,
                test_only: true,
            } => {
                let mut attr = self.plan_attribute(operand, md)?;
                attr.add_qualifier(Qualifier::field(field.clone()));
                Box::new(EvalTestOnly::new(expr.id, attr))
            }
            ExprKind::Call {
                function,
                target,
                args,
            } => return self.plan_call(expr, function, target.as_deref(), args, md),
            ExprKind::CreateList { elements } => {
                let elements = elements
                    .iter()
                    .map(|e| self.plan_expr(e, md))
                    .collect::<Result<Vec<_>, _>>()?;
                Box::new(EvalList {
                    id: expr.id,
                    elements,
                })
            }
            ExprKind::CreateMap { entries } => {
                let entries = entries
                    .iter()
                    .map(|(k, v)| Ok((self.plan_expr(k, md)?, self.plan_expr(v, md)?)))
                    .collect::<Result<Vec<_>, PlanError>>()?;
                Box::new(EvalMap {
                    id: expr.id,
                    entries,
                })
            }
            ExprKind::CreateStruct { type_name, entries } => {
                let descriptor = self.resolve_struct_type(expr.id, type_name, md)?;
                let mut field_names = Vec::with_capacity(entries.len());
                let mut values = Vec::with_capacity(entries.len());
                for (name, value) in entries {
                    field_names.push(name.clone());
                    values.push(self.plan_expr(value, md)?);
                }
                Box::new(EvalObject {
                    id: expr.id,
                    descriptor,
                    field_names,
                    values,
                    registry: Rc::clone(&self.registry),
                })
            }
            ExprKind::Comprehension {
                iter_var,
                iter_range,
                accu_var,
                accu_init,
                loop_cond,
                loop_step,
                result,
            } => Box::new(EvalFold {
                id: expr.id,
                iter_var: iter_var.clone(),
                iter_range: self.plan_expr(iter_range, md)?,
                accu_var: accu_var.clone(),
                accu_init: self.plan_expr(accu_init, md)?,
                loop_cond: self.plan_expr(loop_cond, md)?,
                loop_step: self.plan_expr(loop_step, md)?,
                result: self.plan_expr(result, md)?,
            }),
        };
        self.decorate(node)
    }

    fn plan_call(
        &self,
        expr: &Expr,
        function: &str,
        target: Option<&Expr>,
        args: &[Expr],
        md: &CheckMetadata,
    ) -> Result<Box<dyn Interpretable>, PlanError> {
        // The non-strict operators are built-in nodes, never dispatched.
        match (function, target, args) {
            ("_&&_", None, [lhs, rhs]) => {
                let node = Box::new(EvalAnd {
                    id: expr.id,
                    lhs: self.plan_expr(lhs, md)?,
                    rhs: self.plan_expr(rhs, md)?,
                });
                return self.decorate(node);
            }
            ("_||_", None, [lhs, rhs]) => {
                let node = Box::new(EvalOr {
                    id: expr.id,
                    lhs: self.plan_expr(lhs, md)?,
                    rhs: self.plan_expr(rhs, md)?,
                });
                return self.decorate(node);
            }
            ("_?_:_", None, [cond, truthy, falsy]) => {
                let node = Box::new(EvalConditional {
                    id: expr.id,
                    cond: self.plan_expr(cond, md)?,
                    truthy: self.plan_expr(truthy, md)?,
                    falsy: self.plan_expr(falsy, md)?,
                });
                return self.decorate(node);
            }
            // Indexing extends the attribute chain.
            ("_[_]", None, [_, _]) => {
                let attr = self.plan_attribute(expr, md)?;
                let node = Box::new(InterpretableAttribute::new(expr.id, attr));
                return self.decorate(node);
            }
            // dyn() is the identity at plan time.
            ("dyn", None, [arg]) => return self.plan_expr(arg, md),
            _ => {}
        }

        let mut planned = Vec::with_capacity(args.len() + 1);
        if let Some(t) = target {
            planned.push(self.plan_expr(t, md)?);
        }
        for a in args {
            planned.push(self.plan_expr(a, md)?);
        }
        let resolved = match md.references.get(&expr.id) {
            Some(Reference::Overload(id)) => Some(
                self.dispatcher
                    .find_overload(id)
                    .ok_or_else(|| PlanError::UnknownOverload(id.clone()))?,
            ),
            _ => None,
        };
        let node = Box::new(InterpretableCall::new(
            expr.id,
            function.to_string(),
            resolved,
            Rc::clone(&self.dispatcher),
            planned,
        ));
        self.decorate(node)
    }

    /// Build the merged attribute for an ident/select/index chain. Bases
    /// that are not name-rooted become relative attributes over the planned
    /// operand.
    fn plan_attribute(&self, expr: &Expr, md: &CheckMetadata) -> Result<Attribute, PlanError> {
        match &expr.kind {
            ExprKind::Ident(name) => {
                let candidates = match md.references.get(&expr.id) {
                    Some(Reference::Ident(resolved)) => vec![resolved.clone()],
                    _ => namespace_candidates(&self.container, name),
                };
                Ok(Attribute::Namespaced(NamespacedAttribute::new(
                    expr.id,
                    candidates,
                    Rc::clone(&self.registry),
                )))
            }
            ExprKind::Select {
                operand,
                field,
                test_only: false,
            } => {
                let mut attr = self.plan_attribute(operand, md)?;
                attr.add_qualifier(Qualifier::field(field.clone()));
                Ok(attr)
            }
            ExprKind::Call {
                function,
                target: None,
                args,
            } if function == "_[_]" && args.len() == 2 => {
                let mut attr = self.plan_attribute(&args[0], md)?;
                attr.add_qualifier(self.plan_qualifier(&args[1], md)?);
                Ok(attr)
            }
            _ => Ok(Attribute::Relative(RelativeAttribute::new(
                self.plan_expr(expr, md)?,
            ))),
        }
    }

    /// A literal index becomes a constant qualifier; anything else is a
    /// dynamic qualifier evaluated per activation.
    fn plan_qualifier(&self, expr: &Expr, md: &CheckMetadata) -> Result<Qualifier, PlanError> {
        if let ExprKind::Const(c) = &expr.kind {
            let key = match c {
                Constant::String(s) => Some(QualifierKey::String(s.clone())),
                Constant::Int(n) => Some(QualifierKey::Int(*n)),
                Constant::Uint(n) => Some(QualifierKey::Uint(*n)),
                Constant::Bool(b) => Some(QualifierKey::Bool(*b)),
                _ => None,
            };
            if let Some(key) = key {
                return Ok(Qualifier::Const(key));
            }
        }
        Ok(Qualifier::Dynamic(self.plan_expr(expr, md)?))
    }

    fn resolve_struct_type(
        &self,
        id: i64,
        type_name: &str,
        md: &CheckMetadata,
    ) -> Result<Rc<cel_core::MessageDescriptor>, PlanError> {
        let candidates = match md.references.get(&id) {
            Some(Reference::Type(resolved)) => vec![resolved.clone()],
            _ => namespace_candidates(&self.container, type_name),
        };
        for name in &candidates {
            if let Some(desc) = self.registry.find_message(name) {
                return Ok(desc);
            }
        }
        Err(PlanError::UnknownType(type_name.to_string()))
    }
}

fn const_value(c: &Constant) -> Value {
    match c {
        Constant::Null => Value::Null,
        Constant::Bool(b) => Value::Bool(*b),
        Constant::Int(n) => Value::Int(*n),
        Constant::Uint(n) => Value::Uint(*n),
        Constant::Double(f) => Value::Double(*f),
        Constant::String(s) => Value::string(s.clone()),
        Constant::Bytes(b) => Value::bytes(b.clone()),
    }
}
