//! Attribute resolution: a base identifier plus an ordered qualifier chain.
//!
//! Nested selects merge at plan time into a single namespaced attribute.
//! String-field qualifiers also extend the candidate *names*, which is what
//! makes field subsumption work: `a.b.c` prefers a binding named `a.b.c` and
//! falls back to qualifier access into `a.b`.

use crate::activation::Activation;
use crate::interpretable::Interpretable;
use crate::registry::TypeRegistry;
use cel_core::{EvalError, MapKey, Value};
use std::rc::Rc;

/// A concrete qualifier key: the four types that can address a container.
#[derive(Debug, Clone, PartialEq)]
pub enum QualifierKey {
    String(String),
    Int(i64),
    Uint(u64),
    Bool(bool),
}

impl QualifierKey {
    pub fn from_value(v: &Value) -> Result<QualifierKey, EvalError> {
        match v {
            Value::String(s) => Ok(QualifierKey::String(s.as_str().to_string())),
            Value::Int(n) => Ok(QualifierKey::Int(*n)),
            Value::Uint(n) => Ok(QualifierKey::Uint(*n)),
            Value::Bool(b) => Ok(QualifierKey::Bool(*b)),
            other => Err(EvalError::invalid_argument(format!(
                "unsupported qualifier type: {}",
                other.kind()
            ))),
        }
    }

    fn to_map_key(&self) -> MapKey {
        match self {
            QualifierKey::String(s) => MapKey::String(Rc::new(s.clone())),
            QualifierKey::Int(n) => MapKey::Int(*n),
            QualifierKey::Uint(n) => MapKey::Uint(*n),
            QualifierKey::Bool(b) => MapKey::Bool(*b),
        }
    }
}

impl std::fmt::Display for QualifierKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualifierKey::String(s) => write!(f, "{}", s),
            QualifierKey::Int(n) => write!(f, "{}", n),
            QualifierKey::Uint(n) => write!(f, "{}", n),
            QualifierKey::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// One step in an attribute chain: a constant key known at plan time, or a
/// dynamic sub-expression evaluated per activation.
pub enum Qualifier {
    Const(QualifierKey),
    Dynamic(Box<dyn Interpretable>),
}

impl Qualifier {
    pub fn field(name: impl Into<String>) -> Self {
        Qualifier::Const(QualifierKey::String(name.into()))
    }
}

/// A single pattern step for partial-input matching.
#[derive(Debug, Clone, PartialEq)]
pub enum QualifierPattern {
    Wildcard,
    Key(QualifierKey),
}

impl QualifierPattern {
    fn matches(&self, qual: &Qualifier) -> bool {
        match self {
            QualifierPattern::Wildcard => true,
            QualifierPattern::Key(k) => match qual {
                Qualifier::Const(q) => k == q,
                // Dynamic keys are only covered by wildcards.
                Qualifier::Dynamic(_) => false,
            },
        }
    }
}

/// An unknown-attribute pattern: a base name plus qualifier steps, each a
/// concrete key or a wildcard. An attribute whose candidate name and leading
/// qualifiers match a pattern evaluates to an unknown value.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributePattern {
    base: String,
    quals: Vec<QualifierPattern>,
}

impl AttributePattern {
    pub fn new(base: impl Into<String>) -> Self {
        AttributePattern {
            base: base.into(),
            quals: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.quals
            .push(QualifierPattern::Key(QualifierKey::String(name.into())));
        self
    }

    pub fn key_int(mut self, n: i64) -> Self {
        self.quals.push(QualifierPattern::Key(QualifierKey::Int(n)));
        self
    }

    pub fn key_uint(mut self, n: u64) -> Self {
        self.quals
            .push(QualifierPattern::Key(QualifierKey::Uint(n)));
        self
    }

    pub fn key_bool(mut self, b: bool) -> Self {
        self.quals
            .push(QualifierPattern::Key(QualifierKey::Bool(b)));
        self
    }

    pub fn wildcard(mut self) -> Self {
        self.quals.push(QualifierPattern::Wildcard);
        self
    }

    /// True when this pattern covers the attribute: same base name and the
    /// pattern steps match a prefix of the attribute's qualifiers.
    fn matches_prefix(&self, name: &str, quals: &[Qualifier]) -> bool {
        self.base == name
            && self.quals.len() <= quals.len()
            && self.quals.iter().zip(quals.iter()).all(|(p, q)| p.matches(q))
    }
}

/// One resolvable name for a namespaced attribute. `skip` counts the leading
/// qualifiers already folded into the name.
struct CandidateName {
    name: String,
    skip: usize,
}

/// A namespaced attribute: frozen candidate names (longest container prefix
/// first) plus the qualifier chain.
pub struct NamespacedAttribute {
    id: i64,
    candidates: Vec<CandidateName>,
    qualifiers: Vec<Qualifier>,
    registry: Rc<TypeRegistry>,
}

/// Candidate names for `name` referenced inside `container`, longest prefix
/// first. A leading dot forces the absolute name.
pub fn namespace_candidates(container: &str, name: &str) -> Vec<String> {
    if let Some(absolute) = name.strip_prefix('.') {
        return vec![absolute.to_string()];
    }
    let mut out = Vec::new();
    if !container.is_empty() {
        let segments: Vec<&str> = container.split('.').collect();
        for i in (1..=segments.len()).rev() {
            out.push(format!("{}.{}", segments[..i].join("."), name));
        }
    }
    out.push(name.to_string());
    out
}

impl NamespacedAttribute {
    pub fn new(id: i64, candidate_names: Vec<String>, registry: Rc<TypeRegistry>) -> Self {
        NamespacedAttribute {
            id,
            candidates: candidate_names
                .into_iter()
                .map(|name| CandidateName { name, skip: 0 })
                .collect(),
            qualifiers: Vec::new(),
            registry,
        }
    }

    /// Append a qualifier. A constant string key also extends the candidate
    /// name list so that flat bindings of the dotted path win over qualifier
    /// access (field subsumption).
    pub fn add_qualifier(&mut self, qual: Qualifier) {
        if let Qualifier::Const(QualifierKey::String(f)) = &qual {
            let folded: Vec<CandidateName> = self
                .candidates
                .iter()
                .filter(|c| c.skip == self.qualifiers.len())
                .map(|c| CandidateName {
                    name: format!("{}.{}", c.name, f),
                    skip: c.skip + 1,
                })
                .collect();
            self.candidates.splice(0..0, folded);
        }
        self.qualifiers.push(qual);
    }

    /// The dotted display form of the reference, for error messages.
    fn display_path(&self) -> String {
        let mut path = self
            .candidates
            .last()
            .map(|c| c.name.clone())
            .unwrap_or_default();
        for q in &self.qualifiers {
            match q {
                Qualifier::Const(k) => path.push_str(&format!(".{k}")),
                Qualifier::Dynamic(_) => path.push_str(".<dyn>"),
            }
        }
        path
    }

    pub fn resolve(&self, vars: &dyn Activation) -> Value {
        let patterns = vars.unknown_patterns();
        for cand in &self.candidates {
            let remaining = &self.qualifiers[cand.skip..];
            if patterns
                .iter()
                .any(|p| p.matches_prefix(&cand.name, remaining))
            {
                return Value::unknown(self.id);
            }
            if let Some(base) = vars.resolve_name(&cand.name) {
                return walk_qualifiers(base, remaining, vars);
            }
        }
        for cand in &self.candidates {
            if let Some(base) = self.registry.find_ident(&cand.name) {
                return walk_qualifiers(base, &self.qualifiers[cand.skip..], vars);
            }
        }
        EvalError::no_such_attribute(self.display_path())
            .with_id(self.id)
            .into()
    }

    /// `has()` resolution: the final qualifier becomes a presence test.
    pub fn resolve_test(&self, vars: &dyn Activation) -> Value {
        let patterns = vars.unknown_patterns();
        for cand in &self.candidates {
            let remaining = &self.qualifiers[cand.skip..];
            if patterns
                .iter()
                .any(|p| p.matches_prefix(&cand.name, remaining))
            {
                return Value::unknown(self.id);
            }
            if remaining.is_empty() {
                // The tested path folded entirely into a bound name.
                if vars.resolve_name(&cand.name).is_some() {
                    return Value::Bool(true);
                }
                continue;
            }
            if let Some(base) = vars.resolve_name(&cand.name) {
                let (last, walked) = remaining.split_last().expect("non-empty qualifiers");
                let target = walk_qualifiers(base, walked, vars);
                return test_qualifier(&target, last, vars);
            }
        }
        EvalError::no_such_attribute(self.display_path())
            .with_id(self.id)
            .into()
    }
}

/// An attribute rooted at a computed value rather than a name, e.g.
/// `f(x).field` or `[1, 2][i]`. Unknown patterns do not apply: there is no
/// name to match against.
pub struct RelativeAttribute {
    pub operand: Box<dyn Interpretable>,
    pub qualifiers: Vec<Qualifier>,
}

impl RelativeAttribute {
    pub fn new(operand: Box<dyn Interpretable>) -> Self {
        RelativeAttribute {
            operand,
            qualifiers: Vec::new(),
        }
    }

    pub fn resolve(&self, vars: &dyn Activation) -> Value {
        let base = self.operand.eval(vars);
        walk_qualifiers(base, &self.qualifiers, vars)
    }

    pub fn resolve_test(&self, vars: &dyn Activation) -> Value {
        let Some((last, walked)) = self.qualifiers.split_last() else {
            return EvalError::internal("presence test without qualifiers").into();
        };
        let base = self.operand.eval(vars);
        let target = walk_qualifiers(base, walked, vars);
        test_qualifier(&target, last, vars)
    }
}

/// Either attribute form behind one interface.
pub enum Attribute {
    Namespaced(NamespacedAttribute),
    Relative(RelativeAttribute),
}

impl Attribute {
    pub fn resolve(&self, vars: &dyn Activation) -> Value {
        match self {
            Attribute::Namespaced(a) => a.resolve(vars),
            Attribute::Relative(a) => a.resolve(vars),
        }
    }

    pub fn resolve_test(&self, vars: &dyn Activation) -> Value {
        match self {
            Attribute::Namespaced(a) => a.resolve_test(vars),
            Attribute::Relative(a) => a.resolve_test(vars),
        }
    }

    pub fn add_qualifier(&mut self, qual: Qualifier) {
        match self {
            Attribute::Namespaced(a) => a.add_qualifier(qual),
            Attribute::Relative(a) => a.qualifiers.push(qual),
        }
    }
}

fn walk_qualifiers(mut cur: Value, quals: &[Qualifier], vars: &dyn Activation) -> Value {
    for qual in quals {
        if matches!(cur, Value::Error(_) | Value::Unknown(_)) {
            return cur;
        }
        let key = match qual {
            Qualifier::Const(k) => k.clone(),
            Qualifier::Dynamic(interp) => {
                let v = interp.eval(vars);
                if matches!(v, Value::Error(_) | Value::Unknown(_)) {
                    return v;
                }
                match QualifierKey::from_value(&v) {
                    Ok(k) => k,
                    Err(e) => return e.into(),
                }
            }
        };
        cur = apply_key(&cur, &key);
    }
    cur
}

fn apply_key(cur: &Value, key: &QualifierKey) -> Value {
    match (cur, key) {
        (Value::Object(o), QualifierKey::String(f)) => o.get_field(f),
        (Value::Map(m), key) => match m.get(&key.to_map_key()) {
            Some(v) => v.clone(),
            None => EvalError::no_such_key(key.to_string()).into(),
        },
        (Value::List(_), QualifierKey::Int(_) | QualifierKey::Uint(_)) => {
            cur.index(&key.to_map_key().to_value())
        }
        (v, k) => {
            EvalError::no_such_overload(format!("{}.{}", v.kind(), k)).into()
        }
    }
}

fn test_qualifier(target: &Value, last: &Qualifier, vars: &dyn Activation) -> Value {
    if matches!(target, Value::Error(_) | Value::Unknown(_)) {
        return target.clone();
    }
    let key = match last {
        Qualifier::Const(k) => k.clone(),
        Qualifier::Dynamic(interp) => {
            let v = interp.eval(vars);
            if matches!(v, Value::Error(_) | Value::Unknown(_)) {
                return v;
            }
            match QualifierKey::from_value(&v) {
                Ok(k) => k,
                Err(e) => return e.into(),
            }
        }
    };
    match (target, &key) {
        (Value::Map(m), key) => Value::Bool(m.contains_key(&key.to_map_key())),
        (Value::Object(o), QualifierKey::String(f)) => o.has_field(f),
        (v, k) => EvalError::no_such_overload(format!("has({}.{})", v.kind(), k)).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_candidates() {
        assert_eq!(
            namespace_candidates("a.b.c", "x"),
            vec!["a.b.c.x", "a.b.x", "a.x", "x"]
        );
        assert_eq!(namespace_candidates("", "x"), vec!["x"]);
        assert_eq!(namespace_candidates("a.b", ".x.y"), vec!["x.y"]);
    }

    #[test]
    fn test_string_qualifiers_fold_into_names() {
        let registry = Rc::new(TypeRegistry::new());
        let mut attr =
            NamespacedAttribute::new(1, namespace_candidates("", "a"), registry);
        attr.add_qualifier(Qualifier::field("b"));
        attr.add_qualifier(Qualifier::field("c"));
        let names: Vec<&str> = attr.candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a.b.c", "a.b", "a"]);
        assert_eq!(attr.candidates[0].skip, 2);
        assert_eq!(attr.candidates[1].skip, 1);
        assert_eq!(attr.candidates[2].skip, 0);
    }

    #[test]
    fn test_pattern_prefix_matching() {
        let p = AttributePattern::new("headers").wildcard();
        assert!(p.matches_prefix("headers", &[Qualifier::field("ip")]));
        assert!(!p.matches_prefix("headers", &[]));
        assert!(!p.matches_prefix("other", &[Qualifier::field("ip")]));

        let p = AttributePattern::new("req").field("auth");
        assert!(p.matches_prefix(
            "req",
            &[Qualifier::field("auth"), Qualifier::field("claims")]
        ));
        assert!(!p.matches_prefix("req", &[Qualifier::field("path")]));
    }
}
