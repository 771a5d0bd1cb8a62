//! Decorator behavior end to end: constant folding, exhaustive evaluation,
//! state tracking, and the transparency properties that relate decorated
//! plans to undecorated ones.

use cel_core::{ErrorKind, Value};
use cel_eval::activation::{EmptyActivation, MapActivation};
use cel_eval::ast::{Expr, IdGen};
use cel_eval::decorators::{exhaustive_eval, optimize, track_state, Decorator};
use cel_eval::functions::standard_dispatcher;
use cel_eval::interpretable::CostEstimate;
use cel_eval::planner::Planner;
use cel_eval::registry::TypeRegistry;
use cel_eval::state::EvalState;
use std::rc::Rc;

fn planner_with(decorators: Vec<Decorator>) -> Planner {
    let mut p = Planner::new(
        Rc::new(standard_dispatcher()),
        Rc::new(TypeRegistry::new()),
    );
    for d in decorators {
        p = p.with_decorator(d);
    }
    p
}

/// `1/0 != 0 && false`: false under short-circuit, an error exhaustively.
fn guarded_division(ids: &mut IdGen) -> Expr {
    let div = Expr::call(
        ids.next_id(),
        "_/_",
        vec![
            Expr::const_int(ids.next_id(), 1),
            Expr::const_int(ids.next_id(), 0),
        ],
    );
    let ne = Expr::call(
        ids.next_id(),
        "_!=_",
        vec![div, Expr::const_int(ids.next_id(), 0)],
    );
    Expr::call(
        ids.next_id(),
        "_&&_",
        vec![ne, Expr::const_bool(ids.next_id(), false)],
    )
}

// ============================================================================
// OPTIMIZE
// ============================================================================

#[test]
fn test_timestamp_folds_to_constant() {
    // Scenario: timestamp('1986-04-26T01:23:40Z') under optimize becomes a
    // constant with cost (0, 0).
    let mut ids = IdGen::new();
    let e = Expr::call(
        ids.next_id(),
        "timestamp",
        vec![Expr::const_string(ids.next_id(), "1986-04-26T01:23:40Z")],
    );
    let node = planner_with(vec![optimize()]).plan(&e).unwrap();
    assert_eq!(node.cost(), CostEstimate::ZERO);
    let Some(Value::Timestamp(t)) = node.as_constant() else {
        panic!("expected a constant timestamp");
    };
    assert_eq!(t.timestamp(), 514862620);
}

#[test]
fn test_fold_error_message_matches_runtime() {
    // Scenario: uint(-1) errors identically at plan time under optimize and
    // at eval time without it.
    let mut ids = IdGen::new();
    let e = Expr::call(
        ids.next_id(),
        "uint",
        vec![Expr::const_int(ids.next_id(), -1)],
    );
    let plan_err = planner_with(vec![optimize()]).plan(&e).unwrap_err();
    let runtime = planner_with(vec![])
        .plan(&e)
        .unwrap()
        .eval(&EmptyActivation);
    assert_eq!(plan_err.to_string(), runtime.as_error().unwrap().to_string());
    assert_eq!(runtime.as_error().unwrap().kind, ErrorKind::Range);
}

#[test]
fn test_constant_concat_chain_collapses() {
    // 'a' + 'b' + 'c' folds bottom-up into one constant.
    let mut ids = IdGen::new();
    let ab = Expr::call(
        ids.next_id(),
        "_+_",
        vec![
            Expr::const_string(ids.next_id(), "a"),
            Expr::const_string(ids.next_id(), "b"),
        ],
    );
    let abc = Expr::call(
        ids.next_id(),
        "_+_",
        vec![ab, Expr::const_string(ids.next_id(), "c")],
    );
    let node = planner_with(vec![optimize()]).plan(&abc).unwrap();
    assert_eq!(node.as_constant(), Some(&Value::string("abc")));
}

#[test]
fn test_optimized_in_list_agrees_with_generic() {
    let build = || {
        let mut ids = IdGen::new();
        Expr::call(
            ids.next_id(),
            "@in",
            vec![
                Expr::ident(ids.next_id(), "ip"),
                Expr::list(
                    ids.next_id(),
                    vec![
                        Expr::const_string(ids.next_id(), "10.0.1.4"),
                        Expr::const_string(ids.next_id(), "10.0.1.5"),
                    ],
                ),
            ],
        )
    };
    let plain = planner_with(vec![]).plan(&build()).unwrap();
    let optimized = planner_with(vec![optimize()]).plan(&build()).unwrap();
    for ip in ["10.0.1.2", "10.0.1.4", "10.0.1.5"] {
        let vars = MapActivation::new().bind("ip", Value::string(ip));
        assert_eq!(plain.eval(&vars), optimized.eval(&vars));
    }
    // Cross-type candidates are simply absent from the set.
    let vars = MapActivation::new().bind("ip", Value::Int(7));
    assert_eq!(optimized.eval(&vars), Value::Bool(false));
}

// ============================================================================
// EXHAUSTIVE EVAL
// ============================================================================

#[test]
fn test_exhaustive_surfaces_short_circuited_error() {
    // Scenario: the same program that short-circuits to false evaluates to
    // divide_by_zero under exhaustive_eval.
    let mut ids = IdGen::new();
    let e = guarded_division(&mut ids);

    let plain = planner_with(vec![]).plan(&e).unwrap();
    assert_eq!(plain.eval(&EmptyActivation), Value::Bool(false));

    let state = EvalState::new();
    let exhaustive = planner_with(vec![exhaustive_eval(state)]).plan(&e).unwrap();
    let v = exhaustive.eval(&EmptyActivation);
    assert_eq!(v.as_error().unwrap().kind, ErrorKind::DivideByZero);
}

#[test]
fn test_exhaustive_agrees_on_error_free_programs() {
    let mut ids = IdGen::new();
    let e = Expr::call(
        ids.next_id(),
        "_||_",
        vec![
            Expr::ident(ids.next_id(), "a"),
            Expr::ident(ids.next_id(), "b"),
        ],
    );
    let plain = planner_with(vec![]).plan(&e).unwrap();
    let state = EvalState::new();
    let exhaustive = planner_with(vec![exhaustive_eval(state)]).plan(&e).unwrap();
    for (a, b) in [(false, false), (false, true), (true, false), (true, true)] {
        let vars = MapActivation::new()
            .bind("a", Value::Bool(a))
            .bind("b", Value::Bool(b));
        assert_eq!(plain.eval(&vars), exhaustive.eval(&vars));
    }
}

#[test]
fn test_exhaustive_records_both_ternary_arms() {
    let mut ids = IdGen::new();
    let t_id = ids.next_id();
    let f_id = ids.next_id();
    let e = Expr::call(
        ids.next_id(),
        "_?_:_",
        vec![
            Expr::const_bool(ids.next_id(), true),
            Expr::const_string(t_id, "yes"),
            Expr::const_string(f_id, "no"),
        ],
    );
    let state = EvalState::new();
    let node = planner_with(vec![exhaustive_eval(Rc::clone(&state))])
        .plan(&e)
        .unwrap();
    assert_eq!(node.eval(&EmptyActivation), Value::string("yes"));
    // The untaken arm still evaluated and was recorded.
    assert_eq!(state.value(f_id), Some(Value::string("no")));
}

// ============================================================================
// TRACK STATE AND TRANSPARENCY
// ============================================================================

#[test]
fn test_decorator_transparency_for_results() {
    // For an error-free program, optimize and track_state leave the result
    // unchanged.
    let mut ids = IdGen::new();
    let sum = Expr::call(
        ids.next_id(),
        "_+_",
        vec![
            Expr::ident(ids.next_id(), "x"),
            Expr::const_int(ids.next_id(), 5),
        ],
    );
    let e = Expr::call(
        ids.next_id(),
        "_*_",
        vec![sum, Expr::const_int(ids.next_id(), 2)],
    );
    let vars = MapActivation::new().bind("x", Value::Int(16));

    let plain = planner_with(vec![]).plan(&e).unwrap().eval(&vars);
    assert_eq!(plain, Value::Int(42));

    let optimized = planner_with(vec![optimize()]).plan(&e).unwrap().eval(&vars);
    assert_eq!(optimized, plain);

    let state = EvalState::new();
    let tracked = planner_with(vec![track_state(state)])
        .plan(&e)
        .unwrap()
        .eval(&vars);
    assert_eq!(tracked, plain);
}

#[test]
fn test_track_state_records_attribute_values() {
    let mut ids = IdGen::new();
    let ident_id = ids.next_id();
    let e = Expr::call(
        ids.next_id(),
        "_+_",
        vec![Expr::ident(ident_id, "x"), Expr::const_int(ids.next_id(), 1)],
    );
    let state = EvalState::new();
    let node = planner_with(vec![track_state(Rc::clone(&state))])
        .plan(&e)
        .unwrap();
    let vars = MapActivation::new().bind("x", Value::Int(9));
    assert_eq!(node.eval(&vars), Value::Int(10));
    assert_eq!(state.value(ident_id), Some(Value::Int(9)));
    assert_eq!(state.value(e.id), Some(Value::Int(10)));
}

#[test]
fn test_state_reset_between_evaluations() {
    let mut ids = IdGen::new();
    let e = Expr::call(
        ids.next_id(),
        "_+_",
        vec![
            Expr::ident(ids.next_id(), "x"),
            Expr::const_int(ids.next_id(), 1),
        ],
    );
    let state = EvalState::new();
    let node = planner_with(vec![track_state(Rc::clone(&state))])
        .plan(&e)
        .unwrap();
    node.eval(&MapActivation::new().bind("x", Value::Int(1)));
    state.reset();
    node.eval(&MapActivation::new().bind("x", Value::Int(2)));
    assert_eq!(state.value(e.id), Some(Value::Int(3)));
}
