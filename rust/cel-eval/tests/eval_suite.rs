//! End-to-end planner + evaluator tests: operators, containers, folds,
//! message construction, presence tests, and the concrete scenarios the
//! evaluator must satisfy.

use cel_core::{
    CelType, ErrorKind, FieldDescriptor, MessageDescriptor, ProtoSyntax, Value,
};
use cel_eval::activation::{EmptyActivation, InterruptibleActivation, MapActivation};
use cel_eval::ast::{Expr, IdGen};
use cel_eval::functions::standard_dispatcher;
use cel_eval::interpretable::Interpretable;
use cel_eval::macros;
use cel_eval::planner::Planner;
use cel_eval::registry::TypeRegistry;
use cel_eval::Activation;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn planner() -> Planner {
    Planner::new(
        Rc::new(standard_dispatcher()),
        Rc::new(TypeRegistry::new()),
    )
}

fn plan(e: &Expr) -> Box<dyn Interpretable> {
    planner().plan(e).expect("plan")
}

fn eval(e: &Expr, vars: &dyn Activation) -> Value {
    plan(e).eval(vars)
}

fn binary(ids: &mut IdGen, op: &str, lhs: Expr, rhs: Expr) -> Expr {
    Expr::call(ids.next_id(), op, vec![lhs, rhs])
}

// ============================================================================
// OPERATORS
// ============================================================================

#[test]
fn test_short_circuit_and() {
    // Scenario: false && true -> false, cost within [0, 1].
    let mut ids = IdGen::new();
    let lhs = Expr::const_bool(ids.next_id(), false);
    let rhs = Expr::const_bool(ids.next_id(), true);
    let e = binary(&mut ids, "_&&_", lhs, rhs);
    let node = plan(&e);
    assert_eq!(node.eval(&EmptyActivation), Value::Bool(false));
    let cost = node.cost();
    assert_eq!((cost.min, cost.max), (0, 1));
}

#[test]
fn test_short_circuit_hides_error() {
    // Scenario: 1/0 != 0 && false -> false under short-circuit.
    let mut ids = IdGen::new();
    let div_lhs = Expr::const_int(ids.next_id(), 1);
    let div_rhs = Expr::const_int(ids.next_id(), 0);
    let div = binary(&mut ids, "_/_", div_lhs, div_rhs);
    let ne_rhs = Expr::const_int(ids.next_id(), 0);
    let ne = binary(&mut ids, "_!=_", div, ne_rhs);
    let and_rhs = Expr::const_bool(ids.next_id(), false);
    let e = binary(&mut ids, "_&&_", ne, and_rhs);
    assert_eq!(eval(&e, &EmptyActivation), Value::Bool(false));
}

#[test]
fn test_error_wins_when_unresolved() {
    // 1/0 != 0 && true -> divide by zero.
    let mut ids = IdGen::new();
    let div_lhs = Expr::const_int(ids.next_id(), 1);
    let div_rhs = Expr::const_int(ids.next_id(), 0);
    let div = binary(&mut ids, "_/_", div_lhs, div_rhs);
    let ne_rhs = Expr::const_int(ids.next_id(), 0);
    let ne = binary(&mut ids, "_!=_", div, ne_rhs);
    let and_rhs = Expr::const_bool(ids.next_id(), true);
    let e = binary(&mut ids, "_&&_", ne, and_rhs);
    let v = eval(&e, &EmptyActivation);
    assert_eq!(v.as_error().unwrap().kind, ErrorKind::DivideByZero);
}

#[test]
fn test_ternary_picks_an_arm() {
    let mut ids = IdGen::new();
    let e = Expr::call(
        ids.next_id(),
        "_?_:_",
        vec![
            Expr::const_bool(ids.next_id(), true),
            Expr::const_string(ids.next_id(), "yes"),
            Expr::const_string(ids.next_id(), "no"),
        ],
    );
    assert_eq!(eval(&e, &EmptyActivation), Value::string("yes"));
}

#[test]
fn test_ternary_guard_error_propagates() {
    let mut ids = IdGen::new();
    let div_lhs = Expr::const_int(ids.next_id(), 1);
    let div_rhs = Expr::const_int(ids.next_id(), 0);
    let div = binary(&mut ids, "_/_", div_lhs, div_rhs);
    let e = Expr::call(
        ids.next_id(),
        "_?_:_",
        vec![
            div,
            Expr::const_int(ids.next_id(), 1),
            Expr::const_int(ids.next_id(), 2),
        ],
    );
    // A non-bool guard is an overload miss; an error guard propagates as-is.
    let v = eval(&e, &EmptyActivation);
    assert_eq!(v.as_error().unwrap().kind, ErrorKind::DivideByZero);
}

#[test]
fn test_arithmetic_end_to_end() {
    let mut ids = IdGen::new();
    // (3 * 4 + 2) % 5 == 4
    let mul_lhs = Expr::const_int(ids.next_id(), 3);
    let mul_rhs = Expr::const_int(ids.next_id(), 4);
    let mul = binary(&mut ids, "_*_", mul_lhs, mul_rhs);
    let add_rhs = Expr::const_int(ids.next_id(), 2);
    let add = binary(&mut ids, "_+_", mul, add_rhs);
    let rem_rhs = Expr::const_int(ids.next_id(), 5);
    let rem = binary(&mut ids, "_%_", add, rem_rhs);
    let eq_rhs = Expr::const_int(ids.next_id(), 4);
    let e = binary(&mut ids, "_==_", rem, eq_rhs);
    assert_eq!(eval(&e, &EmptyActivation), Value::Bool(true));
}

#[test]
fn test_determinism_same_plan_same_result() {
    let mut ids = IdGen::new();
    let lhs = Expr::ident(ids.next_id(), "x");
    let rhs = Expr::const_int(ids.next_id(), 1);
    let e = binary(&mut ids, "_+_", lhs, rhs);
    let node = plan(&e);
    let vars = MapActivation::new().bind("x", Value::Int(41));
    assert_eq!(node.eval(&vars), node.eval(&vars));
    assert_eq!(node.eval(&vars), Value::Int(42));
}

// ============================================================================
// CONTAINERS AND MEMBERSHIP
// ============================================================================

#[test]
fn test_membership_over_bound_map_field() {
    // Scenario: headers.ip in ["10.0.1.4", "10.0.1.5"] -> false.
    let mut ids = IdGen::new();
    let ip = Expr::select(ids.next_id(), Expr::ident(ids.next_id(), "headers"), "ip");
    let allow = Expr::list(
        ids.next_id(),
        vec![
            Expr::const_string(ids.next_id(), "10.0.1.4"),
            Expr::const_string(ids.next_id(), "10.0.1.5"),
        ],
    );
    let e = binary(&mut ids, "@in", ip, allow);
    let vars = MapActivation::from_json(&serde_json::json!({
        "headers": {"ip": "10.0.1.2", "path": "/admin/edit", "token": "admin"}
    }));
    assert_eq!(eval(&e, &vars), Value::Bool(false));
}

#[test]
fn test_membership_in_map_literal() {
    let mut ids = IdGen::new();
    let m = Expr::map(
        ids.next_id(),
        vec![(
            Expr::const_string(ids.next_id(), "k"),
            Expr::const_int(ids.next_id(), 1),
        )],
    );
    let key = Expr::const_string(ids.next_id(), "k");
    let e = binary(&mut ids, "@in", key, m);
    assert_eq!(eval(&e, &EmptyActivation), Value::Bool(true));
}

#[test]
fn test_map_literal_duplicate_key_errors() {
    let mut ids = IdGen::new();
    let e = Expr::map(
        ids.next_id(),
        vec![
            (
                Expr::const_string(ids.next_id(), "dup"),
                Expr::const_int(ids.next_id(), 1),
            ),
            (
                Expr::const_string(ids.next_id(), "dup"),
                Expr::const_int(ids.next_id(), 2),
            ),
        ],
    );
    let v = eval(&e, &EmptyActivation);
    assert_eq!(v.as_error().unwrap().kind, ErrorKind::DuplicateKey);
}

#[test]
fn test_index_chains() {
    // m["rows"][1] with m bound.
    let mut ids = IdGen::new();
    let rows = Expr::call(
        ids.next_id(),
        "_[_]",
        vec![
            Expr::ident(ids.next_id(), "m"),
            Expr::const_string(ids.next_id(), "rows"),
        ],
    );
    let e = Expr::call(
        ids.next_id(),
        "_[_]",
        vec![rows, Expr::const_int(ids.next_id(), 1)],
    );
    let vars = MapActivation::from_json(&serde_json::json!({"m": {"rows": [10, 20, 30]}}));
    assert_eq!(eval(&e, &vars), Value::Int(20));
}

#[test]
fn test_size_function() {
    let mut ids = IdGen::new();
    let e = Expr::call(
        ids.next_id(),
        "size",
        vec![Expr::const_string(ids.next_id(), "héllo")],
    );
    assert_eq!(eval(&e, &EmptyActivation), Value::Int(5));
}

// ============================================================================
// COMPREHENSIONS
// ============================================================================

fn int_list(ids: &mut IdGen, values: &[i64]) -> Expr {
    let elements = values
        .iter()
        .map(|n| Expr::const_int(ids.next_id(), *n))
        .collect();
    Expr::list(ids.next_id(), elements)
}

#[test]
fn test_map_macro() {
    // Scenario: [1,2,3].map(x, x*2) == [2,4,6] -> true.
    let mut ids = IdGen::new();
    let range = int_list(&mut ids, &[1, 2, 3]);
    let transform_lhs = Expr::ident(ids.next_id(), "x");
    let transform_rhs = Expr::const_int(ids.next_id(), 2);
    let transform = binary(&mut ids, "_*_", transform_lhs, transform_rhs);
    let mapped = macros::expand_map(&mut ids, range, "x", transform);
    let expected = int_list(&mut ids, &[2, 4, 6]);
    let e = binary(&mut ids, "_==_", mapped, expected);
    assert_eq!(eval(&e, &EmptyActivation), Value::Bool(true));
}

#[test]
fn test_filter_macro() {
    let mut ids = IdGen::new();
    let range = int_list(&mut ids, &[1, 2, 3, 4]);
    let predicate_lhs = Expr::ident(ids.next_id(), "x");
    let predicate_rhs = Expr::const_int(ids.next_id(), 2);
    let predicate = binary(&mut ids, "_>_", predicate_lhs, predicate_rhs);
    let filtered = macros::expand_filter(&mut ids, range, "x", predicate);
    let expected = int_list(&mut ids, &[3, 4]);
    let e = binary(&mut ids, "_==_", filtered, expected);
    assert_eq!(eval(&e, &EmptyActivation), Value::Bool(true));
}

#[test]
fn test_all_macro_short_circuits() {
    let mut ids = IdGen::new();
    let range = int_list(&mut ids, &[1, 2, 3]);
    let predicate_lhs = Expr::ident(ids.next_id(), "x");
    let predicate_rhs = Expr::const_int(ids.next_id(), 2);
    let predicate = binary(&mut ids, "_<_", predicate_lhs, predicate_rhs);
    let e = macros::expand_all(&mut ids, range, "x", predicate);
    assert_eq!(eval(&e, &EmptyActivation), Value::Bool(false));
}

#[test]
fn test_exists_macro_absorbs_earlier_error() {
    // exists(x, 10/x > 0) over [0, 2]: the x == 0 division errors, but a
    // later true resolves the fold.
    let mut ids = IdGen::new();
    let range = int_list(&mut ids, &[0, 2]);
    let div_lhs = Expr::const_int(ids.next_id(), 10);
    let div_rhs = Expr::ident(ids.next_id(), "x");
    let div = binary(&mut ids, "_/_", div_lhs, div_rhs);
    let predicate_rhs = Expr::const_int(ids.next_id(), 0);
    let predicate = binary(&mut ids, "_>_", div, predicate_rhs);
    let e = macros::expand_exists(&mut ids, range, "x", predicate);
    assert_eq!(eval(&e, &EmptyActivation), Value::Bool(true));
}

#[test]
fn test_all_macro_propagates_unresolved_error() {
    // all(x, 10/x > 0) over [1, 0]: no false result, so the error wins.
    let mut ids = IdGen::new();
    let range = int_list(&mut ids, &[1, 0]);
    let div_lhs = Expr::const_int(ids.next_id(), 10);
    let div_rhs = Expr::ident(ids.next_id(), "x");
    let div = binary(&mut ids, "_/_", div_lhs, div_rhs);
    let predicate_rhs = Expr::const_int(ids.next_id(), 0);
    let predicate = binary(&mut ids, "_>_", div, predicate_rhs);
    let e = macros::expand_all(&mut ids, range, "x", predicate);
    let v = eval(&e, &EmptyActivation);
    assert_eq!(v.as_error().unwrap().kind, ErrorKind::DivideByZero);
}

#[test]
fn test_exists_one_macro() {
    let mut ids = IdGen::new();
    let range = int_list(&mut ids, &[1, 2, 3]);
    let predicate_lhs = Expr::ident(ids.next_id(), "x");
    let predicate_rhs = Expr::const_int(ids.next_id(), 2);
    let predicate = binary(&mut ids, "_==_", predicate_lhs, predicate_rhs);
    let e = macros::expand_exists_one(&mut ids, range, "x", predicate);
    assert_eq!(eval(&e, &EmptyActivation), Value::Bool(true));

    let mut ids = IdGen::new();
    let range = int_list(&mut ids, &[1, 3, 5]);
    let mod_lhs = Expr::ident(ids.next_id(), "x");
    let mod_rhs = Expr::const_int(ids.next_id(), 2);
    let predicate = binary(&mut ids, "_%_", mod_lhs, mod_rhs);
    let eq_rhs = Expr::const_int(ids.next_id(), 1);
    let predicate = binary(&mut ids, "_==_", predicate, eq_rhs);
    let e = macros::expand_exists_one(&mut ids, range, "x", predicate);
    // Three odd elements: not exactly one.
    assert_eq!(eval(&e, &EmptyActivation), Value::Bool(false));
}

#[test]
fn test_loop_variable_shadows_outer_binding() {
    let mut ids = IdGen::new();
    let range = int_list(&mut ids, &[7]);
    let transform = Expr::ident(ids.next_id(), "x");
    let e = macros::expand_map(&mut ids, range, "x", transform);
    let vars = MapActivation::new().bind("x", Value::string("outer"));
    assert_eq!(eval(&e, &vars), Value::list(vec![Value::Int(7)]));
}

#[test]
fn test_comprehension_interrupt() {
    let mut ids = IdGen::new();
    let range = int_list(&mut ids, &[1, 2, 3]);
    let transform = Expr::ident(ids.next_id(), "x");
    let e = macros::expand_map(&mut ids, range, "x", transform);

    let token = Arc::new(AtomicBool::new(true));
    let vars = InterruptibleActivation::new(Rc::new(EmptyActivation), Arc::clone(&token));
    let v = eval(&e, &vars);
    assert_eq!(v.as_error().unwrap().kind, ErrorKind::Interrupted);

    token.store(false, Ordering::Relaxed);
    assert_eq!(
        eval(&e, &vars),
        Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
    );
}

// ============================================================================
// MESSAGES AND PRESENCE
// ============================================================================

fn message_registry() -> TypeRegistry {
    let mut r = TypeRegistry::new();
    r.register_message(MessageDescriptor::new(
        "acme.Request",
        ProtoSyntax::Proto3,
        vec![
            FieldDescriptor::new("path", CelType::String),
            FieldDescriptor::new("attempts", CelType::Int),
            FieldDescriptor::wrapper("limit", CelType::Int),
        ],
    ));
    r
}

#[test]
fn test_create_struct_and_select() {
    let mut ids = IdGen::new();
    let strukt = Expr::strukt(
        ids.next_id(),
        "acme.Request",
        vec![(
            "path".to_string(),
            Expr::const_string(ids.next_id(), "/admin"),
        )],
    );
    let e = Expr::select(ids.next_id(), strukt, "path");
    let p = Planner::new(
        Rc::new(standard_dispatcher()),
        Rc::new(message_registry()),
    );
    let node = p.plan(&e).unwrap();
    assert_eq!(node.eval(&EmptyActivation), Value::string("/admin"));
}

#[test]
fn test_has_on_message_fields() {
    let registry = Rc::new(message_registry());
    let p = Planner::new(Rc::new(standard_dispatcher()), Rc::clone(&registry));

    let desc = registry.find_message("acme.Request").unwrap();
    let msg = registry.new_message(
        &desc,
        vec![
            ("path".to_string(), Value::string("/admin")),
            ("attempts".to_string(), Value::Int(0)),
        ],
    );
    let vars = MapActivation::new().bind("req", msg);

    let check = |field: &str| {
        let mut ids = IdGen::new();
        let e = Expr::presence_test(ids.next_id(), Expr::ident(ids.next_id(), "req"), field);
        p.plan(&e).unwrap().eval(&vars)
    };
    assert_eq!(check("path"), Value::Bool(true));
    // proto3 primitive set to its zero value reads as absent.
    assert_eq!(check("attempts"), Value::Bool(false));
    // Unset wrapper is absent; its read would be null.
    assert_eq!(check("limit"), Value::Bool(false));
}

#[test]
fn test_has_on_maps() {
    let vars = MapActivation::from_json(&serde_json::json!({
        "headers": {"token": "admin"}
    }));
    let mut ids = IdGen::new();
    let e = Expr::presence_test(
        ids.next_id(),
        Expr::ident(ids.next_id(), "headers"),
        "token",
    );
    assert_eq!(eval(&e, &vars), Value::Bool(true));

    let mut ids = IdGen::new();
    let e = Expr::presence_test(
        ids.next_id(),
        Expr::ident(ids.next_id(), "headers"),
        "missing",
    );
    assert_eq!(eval(&e, &vars), Value::Bool(false));
}

// ============================================================================
// CONVERSIONS AND TYPE REFLECTION
// ============================================================================

#[test]
fn test_type_function() {
    let mut ids = IdGen::new();
    let e = Expr::call(
        ids.next_id(),
        "type",
        vec![Expr::const_int(ids.next_id(), 1)],
    );
    assert_eq!(eval(&e, &EmptyActivation), Value::Type(CelType::Int));
}

#[test]
fn test_type_names_resolve_as_idents() {
    // type(1) == int
    let mut ids = IdGen::new();
    let t = Expr::call(
        ids.next_id(),
        "type",
        vec![Expr::const_int(ids.next_id(), 1)],
    );
    let int_ident = Expr::ident(ids.next_id(), "int");
    let e = binary(&mut ids, "_==_", t, int_ident);
    assert_eq!(eval(&e, &EmptyActivation), Value::Bool(true));
}

#[test]
fn test_enum_constants_resolve_through_registry() {
    let mut registry = TypeRegistry::new();
    registry.register_enum("acme.Severity.FATAL", 3);
    let p = Planner::new(Rc::new(standard_dispatcher()), Rc::new(registry));
    let mut ids = IdGen::new();
    let sev = Expr::select(
        ids.next_id(),
        Expr::select(
            ids.next_id(),
            Expr::ident(ids.next_id(), "acme"),
            "Severity",
        ),
        "FATAL",
    );
    let node = p.plan(&sev).unwrap();
    assert_eq!(node.eval(&EmptyActivation), Value::Int(3));
}

#[test]
fn test_uint_of_negative_is_range_error_at_runtime() {
    // Scenario: uint(-1) -> range error.
    let mut ids = IdGen::new();
    let e = Expr::call(
        ids.next_id(),
        "uint",
        vec![Expr::const_int(ids.next_id(), -1)],
    );
    let v = eval(&e, &EmptyActivation);
    let err = v.as_error().unwrap();
    assert_eq!(err.kind, ErrorKind::Range);
    assert_eq!(err.to_string(), "int out of uint range");
}

#[test]
fn test_timestamp_parse_function() {
    let mut ids = IdGen::new();
    let ts = Expr::call(
        ids.next_id(),
        "timestamp",
        vec![Expr::const_string(ids.next_id(), "1986-04-26T01:23:40Z")],
    );
    let e = Expr::call(ids.next_id(), "int", vec![ts]);
    assert_eq!(eval(&e, &EmptyActivation), Value::Int(514862620));
}

#[test]
fn test_duration_arithmetic_via_functions() {
    // duration("1h") + duration("30m") == duration("90m")
    let mut ids = IdGen::new();
    let h = Expr::call(
        ids.next_id(),
        "duration",
        vec![Expr::const_string(ids.next_id(), "1h")],
    );
    let m = Expr::call(
        ids.next_id(),
        "duration",
        vec![Expr::const_string(ids.next_id(), "30m")],
    );
    let sum = binary(&mut ids, "_+_", h, m);
    let expected = Expr::call(
        ids.next_id(),
        "duration",
        vec![Expr::const_string(ids.next_id(), "90m")],
    );
    let e = binary(&mut ids, "_==_", sum, expected);
    assert_eq!(eval(&e, &EmptyActivation), Value::Bool(true));
}

#[test]
fn test_string_receiver_functions() {
    let mut ids = IdGen::new();
    let e = Expr::member_call(
        ids.next_id(),
        "startsWith",
        Expr::const_string(ids.next_id(), "/admin/edit"),
        vec![Expr::const_string(ids.next_id(), "/admin")],
    );
    assert_eq!(eval(&e, &EmptyActivation), Value::Bool(true));

    let mut ids = IdGen::new();
    let e = Expr::member_call(
        ids.next_id(),
        "matches",
        Expr::const_string(ids.next_id(), "v1.2.3"),
        vec![Expr::const_string(ids.next_id(), r"^v\d+\.\d+\.\d+$")],
    );
    assert_eq!(eval(&e, &EmptyActivation), Value::Bool(true));
}
