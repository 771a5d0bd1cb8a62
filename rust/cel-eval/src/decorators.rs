//! Plan-time tree rewrites.
//!
//! Decorators run bottom-up over each node as the planner produces it:
//! `optimize` folds constant subtrees and specializes constant in-list
//! membership, `exhaustive_eval` disables short-circuiting, `track_state`
//! records every intermediate value into an [`EvalState`].

use crate::activation::EmptyActivation;
use crate::interpretable::{
    EvalAnd, EvalConditional, EvalExhaustiveAnd, EvalExhaustiveConditional, EvalExhaustiveOr,
    EvalList, EvalMap, EvalOr, EvalSetMembership, EvalWatch, Interpretable, InterpretableCall,
    InterpretableConst,
};
use crate::planner::PlanError;
use crate::state::EvalState;
use cel_core::{MapKey, Value};
use std::collections::HashSet;
use std::rc::Rc;

/// A bottom-up rewrite applied to every planned node.
pub type Decorator =
    Rc<dyn Fn(Box<dyn Interpretable>) -> Result<Box<dyn Interpretable>, PlanError>>;

enum OptimizeAction {
    Fold,
    SpecializeIn,
    Keep,
}

/// Constant-fold subtrees whose inputs are all constants (a fold that
/// produces an error value aborts planning with the identical message the
/// unoptimized program would produce at runtime), and specialize
/// all-constant `@in` lists into set membership.
pub fn optimize() -> Decorator {
    Rc::new(|node: Box<dyn Interpretable>| {
        let action = classify_for_optimize(node.as_any());
        match action {
            OptimizeAction::Fold => {
                let id = node.id();
                let v = node.eval(&EmptyActivation);
                if let Value::Error(e) = &v {
                    return Err(PlanError::FoldedError((**e).clone()));
                }
                Ok(Box::new(InterpretableConst::new(id, v)))
            }
            OptimizeAction::SpecializeIn => {
                let mut call = node
                    .into_any()
                    .downcast::<InterpretableCall>()
                    .expect("classified as call");
                let Some(Value::List(elems)) = call.args[1].as_constant() else {
                    unreachable!("classified with constant list operand");
                };
                let set: HashSet<MapKey> = elems
                    .iter()
                    .map(|v| MapKey::from_value(v).expect("classified as hashable"))
                    .collect();
                let id = call.id;
                let arg = call.args.remove(0);
                Ok(Box::new(EvalSetMembership { id, arg, set }))
            }
            OptimizeAction::Keep => Ok(node),
        }
    })
}

fn classify_for_optimize(any: &dyn std::any::Any) -> OptimizeAction {
    if let Some(call) = any.downcast_ref::<InterpretableCall>() {
        if !call.args.is_empty() && call.args.iter().all(|a| a.as_constant().is_some()) {
            return OptimizeAction::Fold;
        }
        if call.function == "@in" && call.args.len() == 2 {
            if let Some(Value::List(elems)) = call.args[1].as_constant() {
                if !elems.is_empty()
                    && elems.iter().all(|v| MapKey::from_value(v).is_ok())
                {
                    return OptimizeAction::SpecializeIn;
                }
            }
        }
        return OptimizeAction::Keep;
    }
    if let Some(list) = any.downcast_ref::<EvalList>() {
        if list.elements.iter().all(|e| e.as_constant().is_some()) {
            return OptimizeAction::Fold;
        }
        return OptimizeAction::Keep;
    }
    if let Some(map) = any.downcast_ref::<EvalMap>() {
        if map
            .entries
            .iter()
            .all(|(k, v)| k.as_constant().is_some() && v.as_constant().is_some())
        {
            return OptimizeAction::Fold;
        }
        return OptimizeAction::Keep;
    }
    OptimizeAction::Keep
}

/// Rewrite short-circuit operators and the ternary to evaluate every operand
/// before applying the normal result rule, recording intermediate values
/// into `state`. Implies `track_state`; the two compose idempotently.
pub fn exhaustive_eval(state: Rc<EvalState>) -> Decorator {
    Rc::new(move |node: Box<dyn Interpretable>| {
        let node = rewrite_exhaustive(node);
        Ok(watch(node, Rc::clone(&state)))
    })
}

/// Record every node's value into `state` after it evaluates.
pub fn track_state(state: Rc<EvalState>) -> Decorator {
    Rc::new(move |node: Box<dyn Interpretable>| Ok(watch(node, Rc::clone(&state))))
}

fn rewrite_exhaustive(node: Box<dyn Interpretable>) -> Box<dyn Interpretable> {
    if node.as_any().is::<EvalAnd>() {
        let n = node
            .into_any()
            .downcast::<EvalAnd>()
            .expect("checked downcast");
        return Box::new(EvalExhaustiveAnd {
            id: n.id,
            lhs: n.lhs,
            rhs: n.rhs,
        });
    }
    if node.as_any().is::<EvalOr>() {
        let n = node
            .into_any()
            .downcast::<EvalOr>()
            .expect("checked downcast");
        return Box::new(EvalExhaustiveOr {
            id: n.id,
            lhs: n.lhs,
            rhs: n.rhs,
        });
    }
    if node.as_any().is::<EvalConditional>() {
        let n = node
            .into_any()
            .downcast::<EvalConditional>()
            .expect("checked downcast");
        return Box::new(EvalExhaustiveConditional {
            id: n.id,
            cond: n.cond,
            truthy: n.truthy,
            falsy: n.falsy,
        });
    }
    node
}

fn watch(node: Box<dyn Interpretable>, state: Rc<EvalState>) -> Box<dyn Interpretable> {
    if node.as_any().is::<EvalWatch>() {
        return node;
    }
    Box::new(EvalWatch { inner: node, state })
}
