//! The standard function library.
//!
//! Operator families register one polymorphic implementation under a
//! canonical overload id, then alias the per-type ids the checker emits
//! (`add_int64`, `less_double`, ...) to it. The process-wide table is built
//! once and cloned per dispatcher user; it is immutable after startup.

use crate::dispatch::{Dispatcher, Overload};
use cel_core::{Capability, CelType, EvalError, Value};
use once_cell::sync::Lazy;
use std::cmp::Ordering;

static STANDARD: Lazy<Dispatcher> = Lazy::new(build_standard);

/// A dispatcher preloaded with the standard library.
pub fn standard_dispatcher() -> Dispatcher {
    STANDARD.clone()
}

fn build_standard() -> Dispatcher {
    let mut d = Dispatcher::new();

    // ── Arithmetic operators ──

    d.register(
        "_+_",
        Overload::binary("add", |l, r| l.add(r)).with_trait(Capability::Adder),
    );
    for id in [
        "add_int64",
        "add_uint64",
        "add_double",
        "add_string",
        "add_bytes",
        "add_list",
        "add_timestamp_duration",
        "add_duration_timestamp",
        "add_duration_duration",
    ] {
        d.alias(id, "add");
    }

    d.register(
        "_-_",
        Overload::binary("subtract", |l, r| l.sub(r)).with_trait(Capability::Subtractor),
    );
    for id in [
        "subtract_int64",
        "subtract_uint64",
        "subtract_double",
        "subtract_timestamp_timestamp",
        "subtract_timestamp_duration",
        "subtract_duration_duration",
    ] {
        d.alias(id, "subtract");
    }

    d.register(
        "_*_",
        Overload::binary("multiply", |l, r| l.mul(r)).with_trait(Capability::Multiplier),
    );
    for id in ["multiply_int64", "multiply_uint64", "multiply_double"] {
        d.alias(id, "multiply");
    }

    d.register(
        "_/_",
        Overload::binary("divide", |l, r| l.div(r)).with_trait(Capability::Divider),
    );
    for id in ["divide_int64", "divide_uint64", "divide_double"] {
        d.alias(id, "divide");
    }

    d.register(
        "_%_",
        Overload::binary("modulo", |l, r| l.rem(r)).with_trait(Capability::Modder),
    );
    for id in ["modulo_int64", "modulo_uint64"] {
        d.alias(id, "modulo");
    }

    d.register(
        "-_",
        Overload::unary("negate", |v| v.negate()).with_trait(Capability::Negater),
    );
    for id in ["negate_int64", "negate_double", "negate_duration"] {
        d.alias(id, "negate");
    }

    d.register(
        "!_",
        Overload::unary("logical_not", |v| match v {
            Value::Bool(b) => Value::Bool(!b),
            other => EvalError::no_such_overload(format!("!{}", other.kind())).into(),
        }),
    );

    // ── Equality and ordering ──

    d.register("_==_", Overload::binary("equals", |l, r| l.equal(r)));
    d.register(
        "_!=_",
        Overload::binary("not_equals", |l, r| match l.equal(r) {
            Value::Bool(b) => Value::Bool(!b),
            other => other,
        }),
    );

    register_ordering(&mut d, "_<_", "less", |o| o == Ordering::Less);
    register_ordering(&mut d, "_<=_", "less_equals", |o| o != Ordering::Greater);
    register_ordering(&mut d, "_>_", "greater", |o| o == Ordering::Greater);
    register_ordering(&mut d, "_>=_", "greater_equals", |o| o != Ordering::Less);

    // ── Containers ──

    d.register(
        "@in",
        Overload::binary("in", |elem, container| container.contains_value(elem)),
    );
    for id in ["in_list", "in_map"] {
        d.alias(id, "in");
    }

    d.register(
        "size",
        Overload::unary("size", |v| v.size()).with_trait(Capability::Sizer),
    );
    for id in ["size_string", "size_bytes", "size_list", "size_map"] {
        d.alias(id, "size");
    }

    // The comprehension loop guard: false stays false, everything else
    // (true, error, unknown) continues the loop. Deliberately non-strict.
    d.register(
        "@not_strictly_false",
        Overload::unary("not_strictly_false", |v| match v {
            Value::Bool(false) => Value::Bool(false),
            _ => Value::Bool(true),
        })
        .non_strict(),
    );

    // ── Type reflection and conversions ──

    d.register("type", Overload::unary("type", |v| match v {
        Value::Error(_) | Value::Unknown(_) => v.clone(),
        _ => Value::Type(v.kind()),
    }));

    register_conversion(&mut d, "int", "to_int64", CelType::Int, &[
        "uint64_to_int64",
        "double_to_int64",
        "string_to_int64",
        "timestamp_to_int64",
    ]);
    register_conversion(&mut d, "uint", "to_uint64", CelType::Uint, &[
        "int64_to_uint64",
        "double_to_uint64",
        "string_to_uint64",
    ]);
    register_conversion(&mut d, "double", "to_double", CelType::Double, &[
        "int64_to_double",
        "uint64_to_double",
        "string_to_double",
    ]);
    register_conversion(&mut d, "string", "to_string", CelType::String, &[
        "int64_to_string",
        "uint64_to_string",
        "double_to_string",
        "bool_to_string",
        "bytes_to_string",
        "duration_to_string",
        "timestamp_to_string",
    ]);
    register_conversion(&mut d, "bytes", "to_bytes", CelType::Bytes, &["string_to_bytes"]);
    register_conversion(&mut d, "bool", "to_bool", CelType::Bool, &["string_to_bool"]);
    register_conversion(&mut d, "duration", "to_duration", CelType::Duration, &[
        "string_to_duration",
    ]);
    register_conversion(&mut d, "timestamp", "to_timestamp", CelType::Timestamp, &[
        "string_to_timestamp",
        "int64_to_timestamp",
    ]);
    d.register("dyn", Overload::unary("to_dyn", |v| v.clone()));

    // ── String receiver functions ──

    d.register(
        "contains",
        Overload::binary("contains_string", |s, sub| match (s, sub) {
            (Value::String(s), Value::String(sub)) => Value::Bool(s.contains(sub.as_str())),
            (l, r) => no_such_member(l, "contains", r),
        })
        .with_trait(Capability::Receiver),
    );
    d.register(
        "startsWith",
        Overload::binary("starts_with_string", |s, prefix| match (s, prefix) {
            (Value::String(s), Value::String(p)) => Value::Bool(s.starts_with(p.as_str())),
            (l, r) => no_such_member(l, "startsWith", r),
        })
        .with_trait(Capability::Receiver),
    );
    d.register(
        "endsWith",
        Overload::binary("ends_with_string", |s, suffix| match (s, suffix) {
            (Value::String(s), Value::String(p)) => Value::Bool(s.ends_with(p.as_str())),
            (l, r) => no_such_member(l, "endsWith", r),
        })
        .with_trait(Capability::Receiver),
    );
    d.register(
        "matches",
        Overload::binary("matches_string", |s, pattern| match (s, pattern) {
            (Value::String(s), Value::String(p)) => match regex::Regex::new(p) {
                Ok(re) => Value::Bool(re.is_match(s)),
                Err(e) => {
                    EvalError::invalid_argument(format!("invalid matches pattern: {e}")).into()
                }
            },
            (l, r) => no_such_member(l, "matches", r),
        })
        .with_trait(Capability::Matcher),
    );

    // ── Duration accessors ──

    d.register(
        "getHours",
        Overload::unary("duration_to_hours", |v| match v {
            Value::Duration(d) => Value::Int(d.num_hours()),
            other => no_such_accessor(other, "getHours"),
        })
        .with_trait(Capability::Receiver),
    );
    d.register(
        "getMinutes",
        Overload::unary("duration_to_minutes", |v| match v {
            Value::Duration(d) => Value::Int(d.num_minutes()),
            other => no_such_accessor(other, "getMinutes"),
        })
        .with_trait(Capability::Receiver),
    );
    d.register(
        "getSeconds",
        Overload::unary("duration_to_seconds", |v| match v {
            Value::Duration(d) => Value::Int(d.num_seconds()),
            Value::Timestamp(t) => Value::Int(t.timestamp()),
            other => no_such_accessor(other, "getSeconds"),
        })
        .with_trait(Capability::Receiver),
    );
    d.register(
        "getMilliseconds",
        Overload::unary("duration_to_milliseconds", |v| match v {
            Value::Duration(d) => Value::Int(d.num_milliseconds()),
            other => no_such_accessor(other, "getMilliseconds"),
        })
        .with_trait(Capability::Receiver),
    );

    d
}

fn register_ordering(
    d: &mut Dispatcher,
    function: &str,
    canonical: &str,
    accept: impl Fn(Ordering) -> bool + Send + Sync + Copy + 'static,
) {
    d.register(
        function,
        Overload::binary(canonical, move |l, r| match l.try_order(r) {
            Ok(Some(ord)) => Value::Bool(accept(ord)),
            // NaN operands: IEEE unordered compares false under every
            // ordering operator.
            Ok(None) => Value::Bool(false),
            Err(e) => e.into(),
        })
        .with_trait(Capability::Comparer),
    );
    for ty in [
        "int64",
        "uint64",
        "double",
        "string",
        "bytes",
        "bool",
        "timestamp",
        "duration",
    ] {
        d.alias(&format!("{canonical}_{ty}"), canonical);
    }
}

fn register_conversion(
    d: &mut Dispatcher,
    function: &str,
    canonical: &str,
    target: CelType,
    aliases: &[&str],
) {
    d.register(
        function,
        Overload::unary(canonical, move |v| v.convert_to_type(&target)),
    );
    for id in aliases {
        d.alias(id, canonical);
    }
}

fn no_such_member(target: &Value, function: &str, arg: &Value) -> Value {
    EvalError::no_such_overload(format!("{}.{}({})", target.kind(), function, arg.kind())).into()
}

fn no_such_accessor(target: &Value, function: &str) -> Value {
    EvalError::no_such_overload(format!("{}.{}()", target.kind(), function)).into()
}
