//! Host-data adaption and the named-type registry.
//!
//! The adapter turns host-native data (JSON here) into values on demand; the
//! registry resolves message type names and enum constants and constructs
//! messages from literal field lists. Registration happens during setup;
//! planning and evaluation hold the registry behind `Rc`, read-only.

use cel_core::{CelType, EvalError, MapKey, MessageDescriptor, ObjectValue, Value};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// Converts host-native data into values, recursively.
pub trait TypeAdapter {
    fn native_to_value(&self, native: &serde_json::Value) -> Value;
}

/// The JSON host adapter. Numbers keep their JSON representation: integers
/// adapt to int/uint, everything else to double. Objects adapt to maps with
/// string keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonAdapter;

impl TypeAdapter for JsonAdapter {
    fn native_to_value(&self, native: &serde_json::Value) -> Value {
        use serde_json::Value as Json;
        match native {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::Uint(u)
                } else {
                    Value::Double(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Json::String(s) => Value::string(s.clone()),
            Json::Array(items) => {
                Value::list(items.iter().map(|v| self.native_to_value(v)).collect())
            }
            Json::Object(fields) => {
                let mut map = BTreeMap::new();
                for (k, v) in fields {
                    map.insert(
                        MapKey::String(Rc::new(k.clone())),
                        self.native_to_value(v),
                    );
                }
                Value::map(map)
            }
        }
    }
}

/// Message descriptors, enum constants, and type-name resolution.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    messages: HashMap<String, Rc<MessageDescriptor>>,
    enums: HashMap<String, i64>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    pub fn register_message(&mut self, descriptor: MessageDescriptor) {
        self.messages
            .insert(descriptor.name.clone(), Rc::new(descriptor));
    }

    /// Register a fully-qualified enum constant, e.g.
    /// `"acme.Severity.FATAL"`.
    pub fn register_enum(&mut self, name: impl Into<String>, value: i64) {
        self.enums.insert(name.into(), value);
    }

    pub fn find_message(&self, name: &str) -> Option<Rc<MessageDescriptor>> {
        self.messages.get(name).cloned()
    }

    /// Resolve an identifier the activation did not bind: simple type names,
    /// registered enum constants, then registered message type names.
    pub fn find_ident(&self, name: &str) -> Option<Value> {
        if let Some(ty) = CelType::by_name(name) {
            return Some(Value::Type(ty));
        }
        if let Some(v) = self.enums.get(name) {
            return Some(Value::Int(*v));
        }
        if self.messages.contains_key(name) {
            return Some(Value::Type(CelType::message(name)));
        }
        None
    }

    /// Construct a message from literal field values. Every key must name a
    /// declared field; values coerce to the declared field type.
    pub fn new_message(
        &self,
        descriptor: &Rc<MessageDescriptor>,
        entries: Vec<(String, Value)>,
    ) -> Value {
        let mut fields = BTreeMap::new();
        for (name, value) in entries {
            let Some(fd) = descriptor.field(&name) else {
                return EvalError::no_such_field(format!("{}.{}", descriptor.name, name)).into();
            };
            let coerced = if value.kind() == fd.ty {
                value
            } else {
                match value.convert_to_type(&fd.ty) {
                    Value::Error(e) => return Value::Error(e),
                    v => v,
                }
            };
            fields.insert(name, coerced);
        }
        Value::object(ObjectValue::new(Rc::clone(descriptor), fields))
    }
}
