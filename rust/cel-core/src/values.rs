//! The typed value algebra.
//!
//! Aggregate variants (List, Map, Object) are wrapped in `Rc` for cheap
//! cloning via reference counting; values are immutable once constructed.
//! Error and unknown are first-class variants that propagate through every
//! operator, which keeps evaluation single-channel: no out-of-band exceptions.

use crate::error::{ErrorKind, EvalError};
use crate::types::{Capability, CelType, MessageDescriptor, ProtoSyntax};
use base64::Engine;
use chrono::{DateTime, Datelike, Duration, SecondsFormat, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Map keys are restricted to the four hashable scalar kinds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapKey {
    Bool(bool),
    Int(i64),
    Uint(u64),
    String(Rc<String>),
}

impl MapKey {
    pub fn from_value(v: &Value) -> Result<MapKey, EvalError> {
        match v {
            Value::Bool(b) => Ok(MapKey::Bool(*b)),
            Value::Int(n) => Ok(MapKey::Int(*n)),
            Value::Uint(n) => Ok(MapKey::Uint(*n)),
            Value::String(s) => Ok(MapKey::String(Rc::clone(s))),
            other => Err(EvalError::invalid_argument(format!(
                "unsupported map key type: {}",
                other.kind()
            ))),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Bool(b) => Value::Bool(*b),
            MapKey::Int(n) => Value::Int(*n),
            MapKey::Uint(n) => Value::Uint(*n),
            MapKey::String(s) => Value::String(Rc::clone(s)),
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Bool(b) => write!(f, "{}", b),
            MapKey::Int(n) => write!(f, "{}", n),
            MapKey::Uint(n) => write!(f, "{}", n),
            MapKey::String(s) => write!(f, "{}", s),
        }
    }
}

/// The payload of an unknown value: the AST node ids whose attributes could
/// not be resolved. Unknowns union as they flow through operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSet {
    ids: Vec<i64>,
}

impl UnknownSet {
    pub fn new(mut ids: Vec<i64>) -> Self {
        ids.sort_unstable();
        ids.dedup();
        UnknownSet { ids }
    }

    pub fn single(id: i64) -> Self {
        UnknownSet { ids: vec![id] }
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn merge(&self, other: &UnknownSet) -> UnknownSet {
        let mut ids = self.ids.clone();
        ids.extend_from_slice(&other.ids);
        UnknownSet::new(ids)
    }
}

/// A message value: a descriptor plus the explicitly populated fields.
/// Unset fields read as their type default (wrappers read as null).
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectValue {
    pub descriptor: Rc<MessageDescriptor>,
    pub fields: BTreeMap<String, Value>,
}

impl ObjectValue {
    pub fn new(descriptor: Rc<MessageDescriptor>, fields: BTreeMap<String, Value>) -> Self {
        ObjectValue { descriptor, fields }
    }

    pub fn type_name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn get_field(&self, name: &str) -> Value {
        let Some(fd) = self.descriptor.field(name) else {
            return EvalError::no_such_field(name).into();
        };
        match self.fields.get(name) {
            Some(v) => v.clone(),
            None if fd.wrapper => Value::Null,
            None => Value::zero_of(&fd.ty),
        }
    }

    /// Field presence per the governing proto syntax.
    pub fn has_field(&self, name: &str) -> Value {
        let Some(fd) = self.descriptor.field(name) else {
            return EvalError::no_such_field(name).into();
        };
        let set = self.fields.get(name);
        let present = if fd.wrapper {
            set.is_some()
        } else {
            match &fd.ty {
                CelType::Message(_) => set.is_some(),
                CelType::List => matches!(set, Some(Value::List(l)) if !l.is_empty()),
                CelType::Map => matches!(set, Some(Value::Map(m)) if !m.is_empty()),
                _ => match self.descriptor.syntax {
                    ProtoSyntax::Proto2 => set.is_some(),
                    ProtoSyntax::Proto3 => {
                        set.map(|v| *v != Value::zero_of(&fd.ty)).unwrap_or(false)
                    }
                },
            }
        };
        Value::Bool(present)
    }
}

/// Runtime values: the closed CEL variant set.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Double(f64),
    String(Rc<String>),
    Bytes(Rc<Vec<u8>>),
    Duration(Duration),
    Timestamp(DateTime<Utc>),
    List(Rc<Vec<Value>>),
    Map(Rc<BTreeMap<MapKey, Value>>),
    Object(Rc<ObjectValue>),
    Type(CelType),
    Error(Rc<EvalError>),
    Unknown(Rc<UnknownSet>),
}

impl From<EvalError> for Value {
    fn from(e: EvalError) -> Self {
        Value::Error(Rc::new(e))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Uint(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Double(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}

impl Value {
    // -- Constructors (wrap inner data in Rc) --

    pub fn string(s: impl Into<String>) -> Self {
        Value::String(Rc::new(s.into()))
    }

    pub fn bytes(b: impl Into<Vec<u8>>) -> Self {
        Value::Bytes(Rc::new(b.into()))
    }

    pub fn list(v: Vec<Value>) -> Self {
        Value::List(Rc::new(v))
    }

    pub fn map(m: BTreeMap<MapKey, Value>) -> Self {
        Value::Map(Rc::new(m))
    }

    pub fn object(o: ObjectValue) -> Self {
        Value::Object(Rc::new(o))
    }

    pub fn unknown(id: i64) -> Self {
        Value::Unknown(Rc::new(UnknownSet::single(id)))
    }

    // -- Accessors --

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&EvalError> {
        match self {
            Value::Error(e) => Some(e),
            _ => None,
        }
    }

    /// The runtime type descriptor of this value.
    pub fn kind(&self) -> CelType {
        match self {
            Value::Null => CelType::Null,
            Value::Bool(_) => CelType::Bool,
            Value::Int(_) => CelType::Int,
            Value::Uint(_) => CelType::Uint,
            Value::Double(_) => CelType::Double,
            Value::String(_) => CelType::String,
            Value::Bytes(_) => CelType::Bytes,
            Value::Duration(_) => CelType::Duration,
            Value::Timestamp(_) => CelType::Timestamp,
            Value::List(_) => CelType::List,
            Value::Map(_) => CelType::Map,
            Value::Object(o) => CelType::message(o.type_name()),
            Value::Type(_) => CelType::Type,
            Value::Error(_) => CelType::Error,
            Value::Unknown(_) => CelType::Unknown,
        }
    }

    /// The default value for a declared type; unset message primitives read
    /// as this.
    pub fn zero_of(ty: &CelType) -> Value {
        match ty {
            CelType::Bool => Value::Bool(false),
            CelType::Int => Value::Int(0),
            CelType::Uint => Value::Uint(0),
            CelType::Double => Value::Double(0.0),
            CelType::String => Value::string(""),
            CelType::Bytes => Value::bytes(Vec::new()),
            CelType::Duration => Value::Duration(Duration::zero()),
            CelType::Timestamp => Value::Timestamp(DateTime::UNIX_EPOCH),
            CelType::List => Value::list(Vec::new()),
            CelType::Map => Value::map(BTreeMap::new()),
            _ => Value::Null,
        }
    }

    /// Which capability traits the variant supports.
    pub fn has_capability(&self, cap: Capability) -> bool {
        use Capability::*;
        match cap {
            Adder => matches!(
                self,
                Value::Int(_)
                    | Value::Uint(_)
                    | Value::Double(_)
                    | Value::String(_)
                    | Value::Bytes(_)
                    | Value::List(_)
                    | Value::Duration(_)
                    | Value::Timestamp(_)
            ),
            Subtractor => matches!(
                self,
                Value::Int(_)
                    | Value::Uint(_)
                    | Value::Double(_)
                    | Value::Duration(_)
                    | Value::Timestamp(_)
            ),
            Multiplier | Divider => {
                matches!(self, Value::Int(_) | Value::Uint(_) | Value::Double(_))
            }
            Modder => matches!(self, Value::Int(_) | Value::Uint(_)),
            Negater => matches!(self, Value::Int(_) | Value::Double(_) | Value::Duration(_)),
            Comparer => matches!(
                self,
                Value::Bool(_)
                    | Value::Int(_)
                    | Value::Uint(_)
                    | Value::Double(_)
                    | Value::String(_)
                    | Value::Bytes(_)
                    | Value::Duration(_)
                    | Value::Timestamp(_)
            ),
            Indexer | Container | Iterable => matches!(self, Value::List(_) | Value::Map(_)),
            Sizer => matches!(
                self,
                Value::String(_) | Value::Bytes(_) | Value::List(_) | Value::Map(_)
            ),
            Matcher => matches!(self, Value::String(_)),
            Receiver => matches!(
                self,
                Value::String(_) | Value::Duration(_) | Value::Timestamp(_)
            ),
            FieldTester => matches!(self, Value::Object(_) | Value::Map(_)),
        }
    }

    /// Strict propagation for a binary operator: the first error wins, then
    /// unknowns merge. `None` means both operands are ordinary values.
    pub fn propagate2(l: &Value, r: &Value) -> Option<Value> {
        if l.is_error() {
            return Some(l.clone());
        }
        if r.is_error() {
            return Some(r.clone());
        }
        match (l, r) {
            (Value::Unknown(a), Value::Unknown(b)) => {
                Some(Value::Unknown(Rc::new(a.merge(b))))
            }
            (Value::Unknown(_), _) => Some(l.clone()),
            (_, Value::Unknown(_)) => Some(r.clone()),
            _ => None,
        }
    }

    /// Strict propagation across an argument list.
    pub fn propagate_all(args: &[Value]) -> Option<Value> {
        if let Some(e) = args.iter().find(|v| v.is_error()) {
            return Some(e.clone());
        }
        let mut merged: Option<UnknownSet> = None;
        for v in args {
            if let Value::Unknown(u) = v {
                merged = Some(match merged {
                    Some(m) => m.merge(u),
                    None => (**u).clone(),
                });
            }
        }
        merged.map(|u| Value::Unknown(Rc::new(u)))
    }

    // -- Arithmetic --

    pub fn add(&self, other: &Value) -> Value {
        if let Some(v) = Value::propagate2(self, other) {
            return v;
        }
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => match a.checked_add(*b) {
                Some(n) => Value::Int(n),
                None => EvalError::overflow("integer").into(),
            },
            (Value::Uint(a), Value::Uint(b)) => match a.checked_add(*b) {
                Some(n) => Value::Uint(n),
                None => EvalError::overflow("unsigned integer").into(),
            },
            (Value::Double(a), Value::Double(b)) => Value::Double(a + b),
            (Value::String(a), Value::String(b)) => {
                let mut s = String::with_capacity(a.len() + b.len());
                s.push_str(a);
                s.push_str(b);
                Value::string(s)
            }
            (Value::Bytes(a), Value::Bytes(b)) => {
                let mut v = Vec::with_capacity(a.len() + b.len());
                v.extend_from_slice(a);
                v.extend_from_slice(b);
                Value::bytes(v)
            }
            (Value::List(a), Value::List(b)) => {
                let mut v = Vec::with_capacity(a.len() + b.len());
                v.extend(a.iter().cloned());
                v.extend(b.iter().cloned());
                Value::list(v)
            }
            (Value::Duration(a), Value::Duration(b)) => match a.checked_add(b) {
                Some(d) => Value::Duration(d),
                None => EvalError::overflow("duration").into(),
            },
            (Value::Timestamp(t), Value::Duration(d)) => timestamp_add(t, d),
            (Value::Duration(d), Value::Timestamp(t)) => timestamp_add(t, d),
            (l, r) => no_such_binary_overload(l, "+", r),
        }
    }

    pub fn sub(&self, other: &Value) -> Value {
        if let Some(v) = Value::propagate2(self, other) {
            return v;
        }
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => match a.checked_sub(*b) {
                Some(n) => Value::Int(n),
                None => EvalError::overflow("integer").into(),
            },
            (Value::Uint(a), Value::Uint(b)) => match a.checked_sub(*b) {
                Some(n) => Value::Uint(n),
                None => EvalError::overflow("unsigned integer").into(),
            },
            (Value::Double(a), Value::Double(b)) => Value::Double(a - b),
            (Value::Duration(a), Value::Duration(b)) => match a.checked_sub(b) {
                Some(d) => Value::Duration(d),
                None => EvalError::overflow("duration").into(),
            },
            (Value::Timestamp(a), Value::Timestamp(b)) => {
                Value::Duration(a.signed_duration_since(*b))
            }
            (Value::Timestamp(t), Value::Duration(d)) => match t.checked_sub_signed(*d) {
                Some(t) => checked_timestamp(t),
                None => EvalError::overflow("timestamp").into(),
            },
            (l, r) => no_such_binary_overload(l, "-", r),
        }
    }

    pub fn mul(&self, other: &Value) -> Value {
        if let Some(v) = Value::propagate2(self, other) {
            return v;
        }
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => match a.checked_mul(*b) {
                Some(n) => Value::Int(n),
                None => EvalError::overflow("integer").into(),
            },
            (Value::Uint(a), Value::Uint(b)) => match a.checked_mul(*b) {
                Some(n) => Value::Uint(n),
                None => EvalError::overflow("unsigned integer").into(),
            },
            (Value::Double(a), Value::Double(b)) => Value::Double(a * b),
            (l, r) => no_such_binary_overload(l, "*", r),
        }
    }

    pub fn div(&self, other: &Value) -> Value {
        if let Some(v) = Value::propagate2(self, other) {
            return v;
        }
        match (self, other) {
            (Value::Int(_), Value::Int(0)) => EvalError::divide_by_zero().into(),
            (Value::Int(a), Value::Int(b)) => match a.checked_div(*b) {
                Some(n) => Value::Int(n),
                None => EvalError::overflow("integer").into(),
            },
            (Value::Uint(_), Value::Uint(0)) => EvalError::divide_by_zero().into(),
            (Value::Uint(a), Value::Uint(b)) => Value::Uint(a / b),
            // IEEE semantics: x/0.0 is ±inf, not an error.
            (Value::Double(a), Value::Double(b)) => Value::Double(a / b),
            (l, r) => no_such_binary_overload(l, "/", r),
        }
    }

    pub fn rem(&self, other: &Value) -> Value {
        if let Some(v) = Value::propagate2(self, other) {
            return v;
        }
        match (self, other) {
            (Value::Int(_), Value::Int(0)) => EvalError::modulus_by_zero().into(),
            (Value::Int(a), Value::Int(b)) => match a.checked_rem(*b) {
                Some(n) => Value::Int(n),
                None => EvalError::overflow("integer").into(),
            },
            (Value::Uint(_), Value::Uint(0)) => EvalError::modulus_by_zero().into(),
            (Value::Uint(a), Value::Uint(b)) => Value::Uint(a % b),
            (l, r) => no_such_binary_overload(l, "%", r),
        }
    }

    pub fn negate(&self) -> Value {
        match self {
            Value::Error(_) | Value::Unknown(_) => self.clone(),
            Value::Int(n) => match n.checked_neg() {
                Some(n) => Value::Int(n),
                None => EvalError::overflow("integer").into(),
            },
            Value::Double(f) => Value::Double(-f),
            Value::Duration(d) => match Duration::zero().checked_sub(d) {
                Some(d) => Value::Duration(d),
                None => EvalError::overflow("duration").into(),
            },
            other => EvalError::no_such_overload(format!("-{}", other.kind())).into(),
        }
    }

    // -- Equality and ordering --

    /// CEL equality: errors and unknowns propagate, values of disjoint types
    /// compare unequal, doubles follow IEEE (NaN != NaN).
    pub fn equal(&self, other: &Value) -> Value {
        if let Some(v) = Value::propagate2(self, other) {
            return v;
        }
        match (self, other) {
            (Value::List(a), Value::List(b)) => {
                if a.len() != b.len() {
                    return Value::Bool(false);
                }
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.equal(y) {
                        Value::Bool(true) => {}
                        Value::Bool(false) => return Value::Bool(false),
                        other => return other,
                    }
                }
                Value::Bool(true)
            }
            (Value::Map(a), Value::Map(b)) => {
                if a.len() != b.len() {
                    return Value::Bool(false);
                }
                for (k, v) in a.iter() {
                    let Some(w) = b.get(k) else {
                        return Value::Bool(false);
                    };
                    match v.equal(w) {
                        Value::Bool(true) => {}
                        Value::Bool(false) => return Value::Bool(false),
                        other => return other,
                    }
                }
                Value::Bool(true)
            }
            (Value::Object(a), Value::Object(b)) => {
                if a.type_name() != b.type_name() {
                    return Value::Bool(false);
                }
                for fd in &a.descriptor.fields {
                    match a.get_field(&fd.name).equal(&b.get_field(&fd.name)) {
                        Value::Bool(true) => {}
                        Value::Bool(false) => return Value::Bool(false),
                        other => return other,
                    }
                }
                Value::Bool(true)
            }
            _ => Value::Bool(trivially_equal(self, other)),
        }
    }

    /// Ordering used by `<`, `<=`, `>`, `>=`. `Ok(None)` is the IEEE
    /// "unordered" outcome for NaN operands; the comparison operators lower
    /// it to false rather than an error.
    pub fn try_order(&self, other: &Value) -> Result<Option<Ordering>, EvalError> {
        match (self, other) {
            (Value::Error(e), _) => Err((**e).clone()),
            (_, Value::Error(e)) => Err((**e).clone()),
            (Value::Bool(a), Value::Bool(b)) => Ok(Some(a.cmp(b))),
            (Value::Int(a), Value::Int(b)) => Ok(Some(a.cmp(b))),
            (Value::Uint(a), Value::Uint(b)) => Ok(Some(a.cmp(b))),
            (Value::Double(a), Value::Double(b)) => Ok(a.partial_cmp(b)),
            (Value::String(a), Value::String(b)) => Ok(Some(a.cmp(b))),
            (Value::Bytes(a), Value::Bytes(b)) => Ok(Some(a.cmp(b))),
            (Value::Duration(a), Value::Duration(b)) => Ok(Some(a.cmp(b))),
            (Value::Timestamp(a), Value::Timestamp(b)) => Ok(Some(a.cmp(b))),
            (l, r) => Err(EvalError::no_such_overload(format!(
                "comparison of {} and {}",
                l.kind(),
                r.kind()
            ))),
        }
    }

    // -- Container operations --

    pub fn size(&self) -> Value {
        match self {
            Value::Error(_) | Value::Unknown(_) => self.clone(),
            Value::String(s) => Value::Int(s.chars().count() as i64),
            Value::Bytes(b) => Value::Int(b.len() as i64),
            Value::List(l) => Value::Int(l.len() as i64),
            Value::Map(m) => Value::Int(m.len() as i64),
            other => EvalError::no_such_overload(format!("size({})", other.kind())).into(),
        }
    }

    pub fn index(&self, key: &Value) -> Value {
        if let Some(v) = Value::propagate2(self, key) {
            return v;
        }
        match (self, key) {
            (Value::List(l), Value::Int(i)) => list_index(l, *i),
            (Value::List(l), Value::Uint(i)) => {
                if *i > i64::MAX as u64 {
                    EvalError::invalid_argument(format!("index out of range: {i}")).into()
                } else {
                    list_index(l, *i as i64)
                }
            }
            (Value::Map(m), k) => match MapKey::from_value(k) {
                Ok(key) => match m.get(&key) {
                    Some(v) => v.clone(),
                    None => EvalError::no_such_key(key.to_string()).into(),
                },
                Err(e) => e.into(),
            },
            (l, r) => no_such_binary_overload(l, "[", r),
        }
    }

    /// Membership test for `x in container`, with `self` as the container.
    /// A found match absorbs element errors; otherwise the first error (or a
    /// merged unknown) propagates.
    pub fn contains_value(&self, elem: &Value) -> Value {
        if let Some(v) = Value::propagate2(self, elem) {
            return v;
        }
        match self {
            Value::List(l) => {
                let mut first_error: Option<Value> = None;
                let mut unknowns: Option<UnknownSet> = None;
                for x in l.iter() {
                    match x.equal(elem) {
                        Value::Bool(true) => return Value::Bool(true),
                        Value::Bool(false) => {}
                        Value::Error(e) => {
                            first_error.get_or_insert(Value::Error(e));
                        }
                        Value::Unknown(u) => {
                            unknowns = Some(match unknowns {
                                Some(m) => m.merge(&u),
                                None => (*u).clone(),
                            });
                        }
                        other => {
                            first_error.get_or_insert(other);
                        }
                    }
                }
                if let Some(e) = first_error {
                    return e;
                }
                if let Some(u) = unknowns {
                    return Value::Unknown(Rc::new(u));
                }
                Value::Bool(false)
            }
            Value::Map(m) => match MapKey::from_value(elem) {
                Ok(key) => Value::Bool(m.contains_key(&key)),
                Err(_) => Value::Bool(false),
            },
            other => {
                EvalError::no_such_overload(format!("{} in {}", elem.kind(), other.kind())).into()
            }
        }
    }

    // -- Conversions --

    /// `type(v)`'s underlying operation plus every `int()`/`string()`/...
    /// conversion function. Converting to the value's own type is the
    /// identity; unsupported conversions yield a typed conversion error.
    pub fn convert_to_type(&self, target: &CelType) -> Value {
        if matches!(self, Value::Error(_) | Value::Unknown(_)) {
            return self.clone();
        }
        if *target == CelType::Dyn || self.kind() == *target {
            return self.clone();
        }
        if *target == CelType::Type {
            return Value::Type(self.kind());
        }
        match (self, target) {
            // int
            (Value::Uint(n), CelType::Int) => {
                if *n > i64::MAX as u64 {
                    EvalError::range("uint out of int range").into()
                } else {
                    Value::Int(*n as i64)
                }
            }
            (Value::Double(f), CelType::Int) => double_to_int(*f),
            (Value::String(s), CelType::Int) => match s.parse::<i64>() {
                Ok(n) => Value::Int(n),
                Err(_) => {
                    EvalError::new(
                        ErrorKind::TypeConversion,
                        format!("cannot convert string to int: '{s}'"),
                    )
                    .into()
                }
            },
            (Value::Timestamp(t), CelType::Int) => Value::Int(t.timestamp()),
            // uint
            (Value::Int(n), CelType::Uint) => {
                if *n < 0 {
                    EvalError::range("int out of uint range").into()
                } else {
                    Value::Uint(*n as u64)
                }
            }
            (Value::Double(f), CelType::Uint) => double_to_uint(*f),
            (Value::String(s), CelType::Uint) => match s.parse::<u64>() {
                Ok(n) => Value::Uint(n),
                Err(_) => {
                    EvalError::new(
                        ErrorKind::TypeConversion,
                        format!("cannot convert string to uint: '{s}'"),
                    )
                    .into()
                }
            },
            // double
            (Value::Int(n), CelType::Double) => Value::Double(*n as f64),
            (Value::Uint(n), CelType::Double) => Value::Double(*n as f64),
            (Value::String(s), CelType::Double) => match s.parse::<f64>() {
                Ok(f) => Value::Double(f),
                Err(_) => {
                    EvalError::new(
                        ErrorKind::TypeConversion,
                        format!("cannot convert string to double: '{s}'"),
                    )
                    .into()
                }
            },
            // string
            (Value::Int(n), CelType::String) => Value::string(n.to_string()),
            (Value::Uint(n), CelType::String) => Value::string(n.to_string()),
            (Value::Double(f), CelType::String) => Value::string(f.to_string()),
            (Value::Bool(b), CelType::String) => Value::string(b.to_string()),
            (Value::Bytes(b), CelType::String) => match std::str::from_utf8(b) {
                Ok(s) => Value::string(s),
                Err(_) => EvalError::new(
                    ErrorKind::TypeConversion,
                    "cannot convert bytes to string: invalid UTF-8",
                )
                .into(),
            },
            (Value::Duration(d), CelType::String) => Value::string(format_duration(d)),
            (Value::Timestamp(t), CelType::String) => {
                Value::string(t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            (Value::Type(t), CelType::String) => Value::string(t.name()),
            // bytes
            (Value::String(s), CelType::Bytes) => Value::bytes(s.as_bytes().to_vec()),
            // bool
            (Value::String(s), CelType::Bool) => match s.as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => EvalError::new(
                    ErrorKind::TypeConversion,
                    format!("cannot convert string to bool: '{s}'"),
                )
                .into(),
            },
            // duration / timestamp
            (Value::String(s), CelType::Duration) => parse_duration(s),
            (Value::String(s), CelType::Timestamp) => parse_timestamp(s),
            (Value::Int(n), CelType::Timestamp) => match DateTime::from_timestamp(*n, 0) {
                Some(t) => checked_timestamp(t),
                None => EvalError::range("timestamp out of range").into(),
            },
            (v, t) => EvalError::conversion(v.kind().name(), t.name()).into(),
        }
    }

    /// Convert to the JSON host representation.
    pub fn convert_to_json(&self) -> Result<serde_json::Value, EvalError> {
        use serde_json::Value as Json;
        Ok(match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(n) => Json::from(*n),
            Value::Uint(n) => Json::from(*n),
            Value::Double(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .ok_or_else(|| EvalError::conversion("double", "json"))?,
            Value::String(s) => Json::String(s.as_str().to_string()),
            Value::Bytes(b) => {
                Json::String(base64::engine::general_purpose::STANDARD.encode(b.as_slice()))
            }
            Value::Duration(d) => Json::String(format_duration(d)),
            Value::Timestamp(t) => Json::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::List(l) => Json::Array(
                l.iter()
                    .map(|v| v.convert_to_json())
                    .collect::<Result<_, _>>()?,
            ),
            Value::Map(m) => {
                let mut obj = serde_json::Map::new();
                for (k, v) in m.iter() {
                    obj.insert(k.to_string(), v.convert_to_json()?);
                }
                Json::Object(obj)
            }
            Value::Object(o) => {
                let mut obj = serde_json::Map::new();
                for (k, v) in &o.fields {
                    obj.insert(k.clone(), v.convert_to_json()?);
                }
                Json::Object(obj)
            }
            Value::Type(t) => Json::String(t.name().to_string()),
            Value::Error(e) => return Err((**e).clone()),
            Value::Unknown(_) => return Err(EvalError::conversion("unknown", "json")),
        })
    }
}

/// Same-variant scalar equality; disjoint types are unequal, never an error.
fn trivially_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Uint(a), Value::Uint(b)) => a == b,
        (Value::Double(a), Value::Double(b)) => a == b,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Bytes(a), Value::Bytes(b)) => a == b,
        (Value::Duration(a), Value::Duration(b)) => a == b,
        (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
        (Value::Type(a), Value::Type(b)) => a == b,
        _ => false,
    }
}

fn no_such_binary_overload(l: &Value, op: &str, r: &Value) -> Value {
    EvalError::no_such_overload(format!("{} {} {}", l.kind(), op, r.kind())).into()
}

fn list_index(l: &[Value], i: i64) -> Value {
    if i < 0 || i as usize >= l.len() {
        EvalError::invalid_argument(format!("index out of range: {i}")).into()
    } else {
        l[i as usize].clone()
    }
}

fn timestamp_add(t: &DateTime<Utc>, d: &Duration) -> Value {
    match t.checked_add_signed(*d) {
        Some(t) => checked_timestamp(t),
        None => EvalError::overflow("timestamp").into(),
    }
}

/// Timestamps are bounded to the years 0001-9999.
fn checked_timestamp(t: DateTime<Utc>) -> Value {
    if t.year() < 1 || t.year() > 9999 {
        EvalError::range("timestamp out of range").into()
    } else {
        Value::Timestamp(t)
    }
}

/// Round half away from zero; accept results strictly inside the int range.
fn double_to_int(f: f64) -> Value {
    let r = f.round();
    if r.is_nan() || r <= i64::MIN as f64 || r >= i64::MAX as f64 {
        EvalError::range("double out of int range").into()
    } else {
        Value::Int(r as i64)
    }
}

fn double_to_uint(f: f64) -> Value {
    let r = f.round();
    if r.is_nan() || r <= -1.0 || r >= u64::MAX as f64 {
        EvalError::range("double out of uint range").into()
    } else {
        Value::Uint(r as u64)
    }
}

/// Render a duration the way `string(duration)` does: decimal seconds with a
/// trailing `s`, trimming the fractional part when it is zero.
pub fn format_duration(d: &Duration) -> String {
    let secs = d.num_seconds();
    let nanos = d.subsec_nanos();
    if nanos == 0 {
        return format!("{}s", secs);
    }
    let neg = secs < 0 || nanos < 0;
    let abs_secs = secs.unsigned_abs();
    let abs_nanos = nanos.unsigned_abs();
    let frac = format!("{:09}", abs_nanos);
    let frac = frac.trim_end_matches('0');
    format!("{}{}.{}s", if neg { "-" } else { "" }, abs_secs, frac)
}

/// Parse the CEL duration string form: an optional sign followed by one or
/// more decimal numbers with `h`, `m`, `s`, `ms`, `us`, or `ns` units.
pub fn parse_duration(s: &str) -> Value {
    let invalid = || -> Value {
        EvalError::new(
            ErrorKind::TypeConversion,
            format!("invalid duration string: '{s}'"),
        )
        .into()
    };
    let (negative, mut rest) = match s.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    if rest.is_empty() {
        return invalid();
    }
    let mut total_nanos: i128 = 0;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        if digits == 0 {
            return invalid();
        }
        let (num, tail) = rest.split_at(digits);
        let Ok(magnitude) = num.parse::<f64>() else {
            return invalid();
        };
        let unit_len = if tail.starts_with("ms") || tail.starts_with("us") || tail.starts_with("ns")
        {
            2
        } else if tail.starts_with('h') || tail.starts_with('m') || tail.starts_with('s') {
            1
        } else {
            return invalid();
        };
        let (unit, tail) = tail.split_at(unit_len);
        let per_unit: f64 = match unit {
            "h" => 3_600_000_000_000.0,
            "m" => 60_000_000_000.0,
            "s" => 1_000_000_000.0,
            "ms" => 1_000_000.0,
            "us" => 1_000.0,
            _ => 1.0, // "ns"
        };
        total_nanos += (magnitude * per_unit) as i128;
        rest = tail;
    }
    if negative {
        total_nanos = -total_nanos;
    }
    if total_nanos > i64::MAX as i128 || total_nanos < i64::MIN as i128 {
        return EvalError::range("duration out of range").into();
    }
    Value::Duration(Duration::nanoseconds(total_nanos as i64))
}

/// Parse an RFC 3339 timestamp, normalized to UTC.
pub fn parse_timestamp(s: &str) -> Value {
    match DateTime::parse_from_rfc3339(s) {
        Ok(t) => checked_timestamp(t.with_timezone(&Utc)),
        Err(_) => EvalError::new(
            ErrorKind::TypeConversion,
            format!("invalid timestamp string: '{s}'"),
        )
        .into(),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Uint(n) => write!(f, "{}", n),
            Value::Double(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{}", s),
            Value::Bytes(b) => write!(f, "<bytes:{}>", b.len()),
            Value::Duration(d) => write!(f, "{}", format_duration(d)),
            Value::Timestamp(t) => {
                write!(f, "{}", t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Value::List(l) => {
                let items: Vec<String> = l.iter().map(|v| v.display_quoted()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Value::Map(m) => {
                let entries: Vec<String> = m
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v.display_quoted()))
                    .collect();
                write!(f, "{{{}}}", entries.join(", "))
            }
            Value::Object(o) => {
                let fields: Vec<String> = o
                    .fields
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v.display_quoted()))
                    .collect();
                write!(f, "{}{{{}}}", o.type_name(), fields.join(", "))
            }
            Value::Type(t) => write!(f, "{}", t.name()),
            Value::Error(e) => write!(f, "error: {}", e),
            Value::Unknown(u) => write!(f, "unknown{:?}", u.ids()),
        }
    }
}

impl Value {
    /// Display with quotes for strings (used inside containers).
    fn display_quoted(&self) -> String {
        match self {
            Value::String(s) => format!("\"{}\"", s),
            _ => self.to_string(),
        }
    }
}
