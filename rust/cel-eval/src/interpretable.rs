//! Planned, directly evaluable nodes.
//!
//! An interpretable tree is immutable after planning and reusable across
//! activations. Every node reports a `(min, max)` cost estimate; estimates
//! are informational and never affect results.

use crate::activation::Activation;
use crate::attributes::Attribute;
use crate::dispatch::{Dispatcher, Overload};
use crate::registry::TypeRegistry;
use crate::state::EvalState;
use cel_core::{EvalError, MapKey, MessageDescriptor, Value};
use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

/// How many evaluation steps a node may take: a `(min, max)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostEstimate {
    pub min: u64,
    pub max: u64,
}

impl CostEstimate {
    pub const ZERO: CostEstimate = CostEstimate { min: 0, max: 0 };
    pub const ONE: CostEstimate = CostEstimate { min: 1, max: 1 };

    pub fn new(min: u64, max: u64) -> Self {
        CostEstimate { min, max }
    }

    pub fn add(self, other: CostEstimate) -> CostEstimate {
        CostEstimate {
            min: self.min.saturating_add(other.min),
            max: self.max.saturating_add(other.max),
        }
    }

    fn sum(nodes: &[Box<dyn Interpretable>]) -> CostEstimate {
        nodes
            .iter()
            .fold(CostEstimate::ZERO, |acc, n| acc.add(n.cost()))
    }
}

/// A planned node. `eval` returns exactly one value; errors and unknowns are
/// in-band values, never panics.
pub trait Interpretable {
    fn id(&self) -> i64;
    fn eval(&self, vars: &dyn Activation) -> Value;
    fn cost(&self) -> CostEstimate;

    /// The constant payload, for plan-time folding.
    fn as_constant(&self) -> Option<&Value> {
        None
    }

    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl std::fmt::Debug for dyn Interpretable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Interpretable(id={})", self.id())
    }
}

/// Attach the originating node id to an error that does not carry one yet.
fn tag(v: Value, id: i64) -> Value {
    match v {
        Value::Error(e) if e.id.is_none() => Value::Error(Rc::new((*e).clone().with_id(id))),
        v => v,
    }
}

// ── Constants and attributes ──

pub struct InterpretableConst {
    pub(crate) id: i64,
    pub(crate) value: Value,
}

impl InterpretableConst {
    pub fn new(id: i64, value: Value) -> Self {
        InterpretableConst { id, value }
    }
}

impl Interpretable for InterpretableConst {
    fn id(&self) -> i64 {
        self.id
    }

    fn eval(&self, _vars: &dyn Activation) -> Value {
        self.value.clone()
    }

    fn cost(&self) -> CostEstimate {
        CostEstimate::ZERO
    }

    fn as_constant(&self) -> Option<&Value> {
        Some(&self.value)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

pub struct InterpretableAttribute {
    pub(crate) id: i64,
    pub(crate) attr: Attribute,
}

impl InterpretableAttribute {
    pub fn new(id: i64, attr: Attribute) -> Self {
        InterpretableAttribute { id, attr }
    }
}

impl Interpretable for InterpretableAttribute {
    fn id(&self) -> i64 {
        self.id
    }

    fn eval(&self, vars: &dyn Activation) -> Value {
        tag(self.attr.resolve(vars), self.id)
    }

    fn cost(&self) -> CostEstimate {
        CostEstimate::ONE
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// `has(e.f)`: the attribute's final qualifier becomes a presence test.
pub struct EvalTestOnly {
    pub(crate) id: i64,
    pub(crate) attr: Attribute,
}

impl EvalTestOnly {
    pub fn new(id: i64, attr: Attribute) -> Self {
        EvalTestOnly { id, attr }
    }
}

impl Interpretable for EvalTestOnly {
    fn id(&self) -> i64 {
        self.id
    }

    fn eval(&self, vars: &dyn Activation) -> Value {
        tag(self.attr.resolve_test(vars), self.id)
    }

    fn cost(&self) -> CostEstimate {
        CostEstimate::ONE
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

// ── Function calls ──

pub struct InterpretableCall {
    pub(crate) id: i64,
    pub(crate) function: String,
    /// Pre-resolved overload for checked call sites.
    pub(crate) resolved: Option<Arc<Overload>>,
    pub(crate) dispatcher: Rc<Dispatcher>,
    pub(crate) args: Vec<Box<dyn Interpretable>>,
}

impl InterpretableCall {
    pub fn new(
        id: i64,
        function: String,
        resolved: Option<Arc<Overload>>,
        dispatcher: Rc<Dispatcher>,
        args: Vec<Box<dyn Interpretable>>,
    ) -> Self {
        InterpretableCall {
            id,
            function,
            resolved,
            dispatcher,
            args,
        }
    }
}

impl Interpretable for InterpretableCall {
    fn id(&self) -> i64 {
        self.id
    }

    fn eval(&self, vars: &dyn Activation) -> Value {
        let args: Vec<Value> = self.args.iter().map(|a| a.eval(vars)).collect();
        let result = match &self.resolved {
            Some(ov) => ov.invoke(&args),
            None => self.dispatcher.dispatch(&self.function, &args),
        };
        tag(result, self.id)
    }

    fn cost(&self) -> CostEstimate {
        CostEstimate::sum(&self.args).add(CostEstimate::ONE)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

// ── Short-circuit operators ──

/// The shared result rule for `&&`/`||` once both operand values are known:
/// the absorbing element wins, then errors (left first), then unknowns merge.
fn logical_result(op: &str, absorb: bool, l: Value, r: Value) -> Value {
    if l.as_bool() == Some(absorb) || r.as_bool() == Some(absorb) {
        return Value::Bool(absorb);
    }
    if l.as_bool() == Some(!absorb) && r.as_bool() == Some(!absorb) {
        return Value::Bool(!absorb);
    }
    if l.is_error() {
        return l;
    }
    if r.is_error() {
        return r;
    }
    match (&l, &r) {
        (Value::Unknown(a), Value::Unknown(b)) => Value::Unknown(Rc::new(a.merge(b))),
        (Value::Unknown(_), _) => l,
        (_, Value::Unknown(_)) => r,
        (l, r) => {
            EvalError::no_such_overload(format!("{} {} {}", l.kind(), op, r.kind())).into()
        }
    }
}

pub struct EvalAnd {
    pub(crate) id: i64,
    pub(crate) lhs: Box<dyn Interpretable>,
    pub(crate) rhs: Box<dyn Interpretable>,
}

impl Interpretable for EvalAnd {
    fn id(&self) -> i64 {
        self.id
    }

    fn eval(&self, vars: &dyn Activation) -> Value {
        let l = self.lhs.eval(vars);
        if l.as_bool() == Some(false) {
            return Value::Bool(false);
        }
        let r = self.rhs.eval(vars);
        tag(logical_result("&&", false, l, r), self.id)
    }

    fn cost(&self) -> CostEstimate {
        let (l, r) = (self.lhs.cost(), self.rhs.cost());
        CostEstimate::new(
            l.min.min(r.min),
            l.max.saturating_add(r.max).saturating_add(1),
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

pub struct EvalOr {
    pub(crate) id: i64,
    pub(crate) lhs: Box<dyn Interpretable>,
    pub(crate) rhs: Box<dyn Interpretable>,
}

impl Interpretable for EvalOr {
    fn id(&self) -> i64 {
        self.id
    }

    fn eval(&self, vars: &dyn Activation) -> Value {
        let l = self.lhs.eval(vars);
        if l.as_bool() == Some(true) {
            return Value::Bool(true);
        }
        let r = self.rhs.eval(vars);
        tag(logical_result("||", true, l, r), self.id)
    }

    fn cost(&self) -> CostEstimate {
        let (l, r) = (self.lhs.cost(), self.rhs.cost());
        CostEstimate::new(
            l.min.min(r.min),
            l.max.saturating_add(r.max).saturating_add(1),
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

pub struct EvalConditional {
    pub(crate) id: i64,
    pub(crate) cond: Box<dyn Interpretable>,
    pub(crate) truthy: Box<dyn Interpretable>,
    pub(crate) falsy: Box<dyn Interpretable>,
}

fn conditional_result(
    id: i64,
    cond: Value,
    truthy: impl FnOnce() -> Value,
    falsy: impl FnOnce() -> Value,
) -> Value {
    match cond {
        Value::Bool(true) => truthy(),
        Value::Bool(false) => falsy(),
        v @ (Value::Error(_) | Value::Unknown(_)) => v,
        other => tag(
            EvalError::no_such_overload(format!("{} ? _ : _", other.kind())).into(),
            id,
        ),
    }
}

impl Interpretable for EvalConditional {
    fn id(&self) -> i64 {
        self.id
    }

    fn eval(&self, vars: &dyn Activation) -> Value {
        let cond = self.cond.eval(vars);
        conditional_result(
            self.id,
            cond,
            || self.truthy.eval(vars),
            || self.falsy.eval(vars),
        )
    }

    fn cost(&self) -> CostEstimate {
        let (c, t, f) = (self.cond.cost(), self.truthy.cost(), self.falsy.cost());
        CostEstimate::new(
            c.min.saturating_add(t.min.min(f.min)),
            c.max.saturating_add(t.max.max(f.max)).saturating_add(1),
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

// ── Exhaustive rewrites ──
//
// Installed by the `exhaustive_eval` decorator: both operands (or both arms)
// always evaluate. With no short-circuit left to resolve them, errors and
// unknowns win outright, even against an absorbing boolean.

fn exhaustive_logical_result(op: &str, absorb: bool, l: Value, r: Value) -> Value {
    if l.is_error() {
        return l;
    }
    if r.is_error() {
        return r;
    }
    match (&l, &r) {
        (Value::Unknown(a), Value::Unknown(b)) => {
            return Value::Unknown(Rc::new(a.merge(b)));
        }
        (Value::Unknown(_), _) => return l,
        (_, Value::Unknown(_)) => return r,
        _ => {}
    }
    if l.as_bool() == Some(absorb) || r.as_bool() == Some(absorb) {
        return Value::Bool(absorb);
    }
    if l.as_bool() == Some(!absorb) && r.as_bool() == Some(!absorb) {
        return Value::Bool(!absorb);
    }
    EvalError::no_such_overload(format!("{} {} {}", l.kind(), op, r.kind())).into()
}

pub struct EvalExhaustiveAnd {
    pub(crate) id: i64,
    pub(crate) lhs: Box<dyn Interpretable>,
    pub(crate) rhs: Box<dyn Interpretable>,
}

impl Interpretable for EvalExhaustiveAnd {
    fn id(&self) -> i64 {
        self.id
    }

    fn eval(&self, vars: &dyn Activation) -> Value {
        let l = self.lhs.eval(vars);
        let r = self.rhs.eval(vars);
        tag(exhaustive_logical_result("&&", false, l, r), self.id)
    }

    fn cost(&self) -> CostEstimate {
        self.lhs
            .cost()
            .add(self.rhs.cost())
            .add(CostEstimate::ONE)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

pub struct EvalExhaustiveOr {
    pub(crate) id: i64,
    pub(crate) lhs: Box<dyn Interpretable>,
    pub(crate) rhs: Box<dyn Interpretable>,
}

impl Interpretable for EvalExhaustiveOr {
    fn id(&self) -> i64 {
        self.id
    }

    fn eval(&self, vars: &dyn Activation) -> Value {
        let l = self.lhs.eval(vars);
        let r = self.rhs.eval(vars);
        tag(exhaustive_logical_result("||", true, l, r), self.id)
    }

    fn cost(&self) -> CostEstimate {
        self.lhs
            .cost()
            .add(self.rhs.cost())
            .add(CostEstimate::ONE)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

pub struct EvalExhaustiveConditional {
    pub(crate) id: i64,
    pub(crate) cond: Box<dyn Interpretable>,
    pub(crate) truthy: Box<dyn Interpretable>,
    pub(crate) falsy: Box<dyn Interpretable>,
}

impl Interpretable for EvalExhaustiveConditional {
    fn id(&self) -> i64 {
        self.id
    }

    fn eval(&self, vars: &dyn Activation) -> Value {
        let cond = self.cond.eval(vars);
        let t = self.truthy.eval(vars);
        let f = self.falsy.eval(vars);
        conditional_result(self.id, cond, move || t, move || f)
    }

    fn cost(&self) -> CostEstimate {
        self.cond
            .cost()
            .add(self.truthy.cost())
            .add(self.falsy.cost())
            .add(CostEstimate::ONE)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

// ── Aggregate literals ──

pub struct EvalList {
    pub(crate) id: i64,
    pub(crate) elements: Vec<Box<dyn Interpretable>>,
}

impl Interpretable for EvalList {
    fn id(&self) -> i64 {
        self.id
    }

    fn eval(&self, vars: &dyn Activation) -> Value {
        let elems: Vec<Value> = self.elements.iter().map(|e| e.eval(vars)).collect();
        if let Some(v) = Value::propagate_all(&elems) {
            return v;
        }
        Value::list(elems)
    }

    fn cost(&self) -> CostEstimate {
        CostEstimate::sum(&self.elements).add(CostEstimate::ONE)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

pub struct EvalMap {
    pub(crate) id: i64,
    pub(crate) entries: Vec<(Box<dyn Interpretable>, Box<dyn Interpretable>)>,
}

impl Interpretable for EvalMap {
    fn id(&self) -> i64 {
        self.id
    }

    fn eval(&self, vars: &dyn Activation) -> Value {
        // Keys and values evaluate in source order.
        let mut flat = Vec::with_capacity(self.entries.len() * 2);
        for (k, v) in &self.entries {
            flat.push(k.eval(vars));
            flat.push(v.eval(vars));
        }
        if let Some(v) = Value::propagate_all(&flat) {
            return v;
        }
        let mut map = BTreeMap::new();
        let mut flat = flat.into_iter();
        while let (Some(k), Some(v)) = (flat.next(), flat.next()) {
            let key = match MapKey::from_value(&k) {
                Ok(key) => key,
                Err(e) => return tag(e.into(), self.id),
            };
            if map.insert(key.clone(), v).is_some() {
                return tag(EvalError::duplicate_key(key.to_string()).into(), self.id);
            }
        }
        Value::map(map)
    }

    fn cost(&self) -> CostEstimate {
        self.entries
            .iter()
            .fold(CostEstimate::ONE, |acc, (k, v)| {
                acc.add(k.cost()).add(v.cost())
            })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

pub struct EvalObject {
    pub(crate) id: i64,
    pub(crate) descriptor: Rc<MessageDescriptor>,
    pub(crate) field_names: Vec<String>,
    pub(crate) values: Vec<Box<dyn Interpretable>>,
    pub(crate) registry: Rc<TypeRegistry>,
}

impl Interpretable for EvalObject {
    fn id(&self) -> i64 {
        self.id
    }

    fn eval(&self, vars: &dyn Activation) -> Value {
        let values: Vec<Value> = self.values.iter().map(|v| v.eval(vars)).collect();
        if let Some(v) = Value::propagate_all(&values) {
            return v;
        }
        let entries = self
            .field_names
            .iter()
            .cloned()
            .zip(values)
            .collect::<Vec<_>>();
        tag(self.registry.new_message(&self.descriptor, entries), self.id)
    }

    fn cost(&self) -> CostEstimate {
        CostEstimate::sum(&self.values).add(CostEstimate::ONE)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

// ── Comprehensions ──

/// The per-iteration frame: the loop variable and accumulator shadow the
/// parent bindings for the duration of the fold.
struct FoldFrame<'a> {
    parent: &'a dyn Activation,
    iter_var: &'a str,
    iter_val: RefCell<Value>,
    accu_var: &'a str,
    accu_val: RefCell<Value>,
}

impl Activation for FoldFrame<'_> {
    fn resolve_name(&self, name: &str) -> Option<Value> {
        if name == self.iter_var {
            return Some(self.iter_val.borrow().clone());
        }
        if name == self.accu_var {
            return Some(self.accu_val.borrow().clone());
        }
        self.parent.resolve_name(name)
    }

    fn parent(&self) -> Option<&dyn Activation> {
        Some(self.parent)
    }
}

/// The generic fold every macro lowers to: init, continue-while condition,
/// step, result.
pub struct EvalFold {
    pub(crate) id: i64,
    pub(crate) iter_var: String,
    pub(crate) iter_range: Box<dyn Interpretable>,
    pub(crate) accu_var: String,
    pub(crate) accu_init: Box<dyn Interpretable>,
    pub(crate) loop_cond: Box<dyn Interpretable>,
    pub(crate) loop_step: Box<dyn Interpretable>,
    pub(crate) result: Box<dyn Interpretable>,
}

impl Interpretable for EvalFold {
    fn id(&self) -> i64 {
        self.id
    }

    fn eval(&self, vars: &dyn Activation) -> Value {
        let range = self.iter_range.eval(vars);
        let items: Vec<Value> = match &range {
            Value::List(l) => l.iter().cloned().collect(),
            Value::Map(m) => m.keys().map(|k| k.to_value()).collect(),
            Value::Error(_) | Value::Unknown(_) => return range,
            other => {
                return tag(
                    EvalError::no_such_overload(format!("{} is not iterable", other.kind()))
                        .into(),
                    self.id,
                )
            }
        };
        let frame = FoldFrame {
            parent: vars,
            iter_var: &self.iter_var,
            iter_val: RefCell::new(Value::Null),
            accu_var: &self.accu_var,
            accu_val: RefCell::new(self.accu_init.eval(vars)),
        };
        for item in items {
            if frame.interrupted() {
                return EvalError::interrupted().with_id(self.id).into();
            }
            *frame.iter_val.borrow_mut() = item;
            match self.loop_cond.eval(&frame) {
                Value::Bool(true) => {}
                Value::Bool(false) => break,
                v @ (Value::Error(_) | Value::Unknown(_)) => return v,
                other => {
                    return tag(
                        EvalError::no_such_overload(format!(
                            "{} as loop condition",
                            other.kind()
                        ))
                        .into(),
                        self.id,
                    )
                }
            }
            let next = self.loop_step.eval(&frame);
            *frame.accu_val.borrow_mut() = next;
        }
        self.result.eval(&frame)
    }

    fn cost(&self) -> CostEstimate {
        // Dynamic ranges saturate the upper bound.
        let (iters_min, iters_max) = match self.iter_range.as_constant() {
            Some(Value::List(l)) => (l.len() as u64, l.len() as u64),
            Some(Value::Map(m)) => (m.len() as u64, m.len() as u64),
            _ => (0, i64::MAX as u64),
        };
        let body = self.loop_cond.cost().add(self.loop_step.cost());
        let tail = self
            .iter_range
            .cost()
            .add(self.accu_init.cost())
            .add(self.result.cost());
        CostEstimate::new(
            iters_min.saturating_mul(body.min).saturating_add(tail.min),
            iters_max.saturating_mul(body.max).saturating_add(tail.max),
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

// ── Optimized nodes ──

/// `x in [c1, c2, ...]` specialized over an all-constant list of hashable
/// keys. Installed by the `optimize` decorator.
pub struct EvalSetMembership {
    pub(crate) id: i64,
    pub(crate) arg: Box<dyn Interpretable>,
    pub(crate) set: HashSet<MapKey>,
}

impl Interpretable for EvalSetMembership {
    fn id(&self) -> i64 {
        self.id
    }

    fn eval(&self, vars: &dyn Activation) -> Value {
        let v = self.arg.eval(vars);
        if matches!(v, Value::Error(_) | Value::Unknown(_)) {
            return v;
        }
        match MapKey::from_value(&v) {
            Ok(key) => Value::Bool(self.set.contains(&key)),
            Err(_) => Value::Bool(false),
        }
    }

    fn cost(&self) -> CostEstimate {
        self.arg.cost().add(CostEstimate::ONE)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Records the wrapped node's value into eval state after each evaluation.
/// Installed by `track_state` and `exhaustive_eval`.
pub struct EvalWatch {
    pub(crate) inner: Box<dyn Interpretable>,
    pub(crate) state: Rc<EvalState>,
}

impl Interpretable for EvalWatch {
    fn id(&self) -> i64 {
        self.inner.id()
    }

    fn eval(&self, vars: &dyn Activation) -> Value {
        let v = self.inner.eval(vars);
        self.state.set(self.inner.id(), v.clone());
        v
    }

    fn cost(&self) -> CostEstimate {
        self.inner.cost()
    }

    fn as_constant(&self) -> Option<&Value> {
        self.inner.as_constant()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::EmptyActivation;
    use cel_core::ErrorKind;

    fn konst(id: i64, v: Value) -> Box<dyn Interpretable> {
        Box::new(InterpretableConst::new(id, v))
    }

    #[test]
    fn test_and_short_circuits_errors() {
        let err: Value = EvalError::divide_by_zero().into();
        // false && error -> false
        let node = EvalAnd {
            id: 1,
            lhs: konst(2, Value::Bool(false)),
            rhs: konst(3, err.clone()),
        };
        assert_eq!(node.eval(&EmptyActivation), Value::Bool(false));
        // error && true -> error
        let node = EvalAnd {
            id: 1,
            lhs: konst(2, err.clone()),
            rhs: konst(3, Value::Bool(true)),
        };
        assert!(node.eval(&EmptyActivation).is_error());
    }

    #[test]
    fn test_or_absorbs_unknown_on_true() {
        let node = EvalOr {
            id: 1,
            lhs: konst(2, Value::unknown(7)),
            rhs: konst(3, Value::Bool(true)),
        };
        assert_eq!(node.eval(&EmptyActivation), Value::Bool(true));
    }

    #[test]
    fn test_logical_result_error_dominates_unknown() {
        let err: Value = EvalError::divide_by_zero().into();
        let v = logical_result("&&", false, Value::unknown(1), err.clone());
        assert_eq!(v, err);
        let Value::Unknown(u) =
            logical_result("||", true, Value::unknown(1), Value::unknown(2))
        else {
            panic!("expected unknown");
        };
        assert_eq!(u.ids(), &[1, 2]);
    }

    #[test]
    fn test_short_circuit_cost_bounds() {
        let node = EvalAnd {
            id: 1,
            lhs: konst(2, Value::Bool(false)),
            rhs: konst(3, Value::Bool(true)),
        };
        assert_eq!(node.cost(), CostEstimate::new(0, 1));
    }

    #[test]
    fn test_map_literal_duplicate_key() {
        let node = EvalMap {
            id: 1,
            entries: vec![
                (konst(2, Value::string("k")), konst(3, Value::Int(1))),
                (konst(4, Value::string("k")), konst(5, Value::Int(2))),
            ],
        };
        let v = node.eval(&EmptyActivation);
        assert_eq!(v.as_error().unwrap().kind, ErrorKind::DuplicateKey);
    }

    #[test]
    fn test_fold_cost_saturates_for_dynamic_range() {
        let range = Box::new(InterpretableAttribute::new(
            2,
            crate::attributes::Attribute::Namespaced(
                crate::attributes::NamespacedAttribute::new(
                    2,
                    vec!["xs".to_string()],
                    Rc::new(TypeRegistry::new()),
                ),
            ),
        ));
        let node = EvalFold {
            id: 1,
            iter_var: "x".to_string(),
            iter_range: range,
            accu_var: "__result__".to_string(),
            accu_init: konst(3, Value::Bool(true)),
            loop_cond: konst(4, Value::Bool(true)),
            loop_step: konst(5, Value::Bool(true)),
            result: konst(6, Value::Bool(true)),
        };
        assert_eq!(node.cost().max, i64::MAX as u64);
    }
}
