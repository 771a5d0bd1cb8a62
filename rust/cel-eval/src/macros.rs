//! Macro-expanded fold shapes.
//!
//! The parser expands `all`, `exists`, `exists_one`, `map`, and `filter`
//! into the generic comprehension form; these builders produce the same
//! shapes for embedders and tests that construct ASTs directly. The
//! evaluator itself never special-cases a macro: short-circuit behavior
//! falls out of the `&&`/`||` nodes in the loop step and the
//! `@not_strictly_false` loop guard.

use crate::ast::{Expr, ExprKind, IdGen};

/// The accumulator variable every macro lowers to.
pub const ACCU_VAR: &str = "__result__";

fn fold(
    id: i64,
    iter_var: &str,
    iter_range: Expr,
    accu_init: Expr,
    loop_cond: Expr,
    loop_step: Expr,
    result: Expr,
) -> Expr {
    Expr::new(
        id,
        ExprKind::Comprehension {
            iter_var: iter_var.to_string(),
            iter_range: Box::new(iter_range),
            accu_var: ACCU_VAR.to_string(),
            accu_init: Box::new(accu_init),
            loop_cond: Box::new(loop_cond),
            loop_step: Box::new(loop_step),
            result: Box::new(result),
        },
    )
}

fn accu(ids: &mut IdGen) -> Expr {
    Expr::ident(ids.next_id(), ACCU_VAR)
}

/// `range.all(v, predicate)`: true unless some element fails the predicate.
pub fn expand_all(ids: &mut IdGen, range: Expr, iter_var: &str, predicate: Expr) -> Expr {
    let init = Expr::const_bool(ids.next_id(), true);
    let cond_arg = accu(ids);
    let cond = Expr::call(ids.next_id(), "@not_strictly_false", vec![cond_arg]);
    let step_accu = accu(ids);
    let step = Expr::call(ids.next_id(), "_&&_", vec![step_accu, predicate]);
    let result = accu(ids);
    fold(ids.next_id(), iter_var, range, init, cond, step, result)
}

/// `range.exists(v, predicate)`: true if some element passes.
pub fn expand_exists(ids: &mut IdGen, range: Expr, iter_var: &str, predicate: Expr) -> Expr {
    let init = Expr::const_bool(ids.next_id(), false);
    let not_accu = Expr::call(ids.next_id(), "!_", vec![accu(ids)]);
    let cond = Expr::call(ids.next_id(), "@not_strictly_false", vec![not_accu]);
    let step_accu = accu(ids);
    let step = Expr::call(ids.next_id(), "_||_", vec![step_accu, predicate]);
    let result = accu(ids);
    fold(ids.next_id(), iter_var, range, init, cond, step, result)
}

/// `range.exists_one(v, predicate)`: exactly one element passes. No
/// short-circuit: the count must be exact, so errors propagate.
pub fn expand_exists_one(ids: &mut IdGen, range: Expr, iter_var: &str, predicate: Expr) -> Expr {
    let init = Expr::const_int(ids.next_id(), 0);
    let cond = Expr::const_bool(ids.next_id(), true);
    let incremented = Expr::call(
        ids.next_id(),
        "_+_",
        vec![accu(ids), Expr::const_int(ids.next_id(), 1)],
    );
    let unchanged = accu(ids);
    let step = Expr::call(
        ids.next_id(),
        "_?_:_",
        vec![predicate, incremented, unchanged],
    );
    let result = Expr::call(
        ids.next_id(),
        "_==_",
        vec![accu(ids), Expr::const_int(ids.next_id(), 1)],
    );
    fold(ids.next_id(), iter_var, range, init, cond, step, result)
}

/// `range.map(v, transform)`: the transformed elements, in order.
pub fn expand_map(ids: &mut IdGen, range: Expr, iter_var: &str, transform: Expr) -> Expr {
    let init = Expr::list(ids.next_id(), vec![]);
    let cond = Expr::const_bool(ids.next_id(), true);
    let singleton = Expr::list(ids.next_id(), vec![transform]);
    let step = Expr::call(ids.next_id(), "_+_", vec![accu(ids), singleton]);
    let result = accu(ids);
    fold(ids.next_id(), iter_var, range, init, cond, step, result)
}

/// `range.filter(v, predicate)`: the elements that pass, in order.
pub fn expand_filter(ids: &mut IdGen, range: Expr, iter_var: &str, predicate: Expr) -> Expr {
    let init = Expr::list(ids.next_id(), vec![]);
    let cond = Expr::const_bool(ids.next_id(), true);
    let singleton = Expr::list(
        ids.next_id(),
        vec![Expr::ident(ids.next_id(), iter_var)],
    );
    let appended = Expr::call(ids.next_id(), "_+_", vec![accu(ids), singleton]);
    let unchanged = accu(ids);
    let step = Expr::call(
        ids.next_id(),
        "_?_:_",
        vec![predicate, appended, unchanged],
    );
    let result = accu(ids);
    fold(ids.next_id(), iter_var, range, init, cond, step, result)
}
