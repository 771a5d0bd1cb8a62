//! Type descriptors for the closed CEL value set, capability traits, and
//! message (struct) descriptors with proto2/proto3 field metadata.

use std::fmt;
use std::sync::Arc;

/// Runtime type descriptor. `type(v)` yields one of these wrapped in a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CelType {
    Bool,
    Int,
    Uint,
    Double,
    String,
    Bytes,
    Duration,
    Timestamp,
    Null,
    List,
    Map,
    /// A named message type.
    Message(Arc<str>),
    /// The type of type values themselves.
    Type,
    Error,
    Unknown,
    /// The dynamic top type; conversion to dyn is the identity.
    Dyn,
}

impl CelType {
    pub fn message(name: impl AsRef<str>) -> Self {
        CelType::Message(Arc::from(name.as_ref()))
    }

    /// The display name used in error messages and by `string(type(v))`.
    pub fn name(&self) -> &str {
        match self {
            CelType::Bool => "bool",
            CelType::Int => "int",
            CelType::Uint => "uint",
            CelType::Double => "double",
            CelType::String => "string",
            CelType::Bytes => "bytes",
            CelType::Duration => "duration",
            CelType::Timestamp => "timestamp",
            CelType::Null => "null_type",
            CelType::List => "list",
            CelType::Map => "map",
            CelType::Message(name) => name,
            CelType::Type => "type",
            CelType::Error => "error",
            CelType::Unknown => "unknown",
            CelType::Dyn => "dyn",
        }
    }

    /// Resolve a simple type name (`"int"`, `"list"`, ...) to its descriptor.
    pub fn by_name(name: &str) -> Option<CelType> {
        Some(match name {
            "bool" => CelType::Bool,
            "int" => CelType::Int,
            "uint" => CelType::Uint,
            "double" => CelType::Double,
            "string" => CelType::String,
            "bytes" => CelType::Bytes,
            "duration" => CelType::Duration,
            "timestamp" => CelType::Timestamp,
            "null_type" => CelType::Null,
            "list" => CelType::List,
            "map" => CelType::Map,
            "type" => CelType::Type,
            "dyn" => CelType::Dyn,
            _ => return None,
        })
    }
}

impl fmt::Display for CelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Capability traits a value variant may support. Applying an unsupported
/// capability yields a `no_such_overload` error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Adder,
    Subtractor,
    Multiplier,
    Divider,
    Modder,
    Negater,
    Comparer,
    Indexer,
    Container,
    Sizer,
    Iterable,
    Matcher,
    Receiver,
    FieldTester,
}

// ── Message descriptors ──

/// Which protobuf syntax governs field presence for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtoSyntax {
    /// `has` on a primitive reports explicit assignment.
    Proto2,
    /// `has` on a primitive reports a non-zero value.
    Proto3,
}

/// One declared field of a message type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub ty: CelType,
    /// Wrapper fields are nullable: unset reads yield null and `has` reports
    /// population rather than zero-comparison.
    pub wrapper: bool,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, ty: CelType) -> Self {
        FieldDescriptor {
            name: name.into(),
            ty,
            wrapper: false,
        }
    }

    pub fn wrapper(name: impl Into<String>, ty: CelType) -> Self {
        FieldDescriptor {
            name: name.into(),
            ty,
            wrapper: true,
        }
    }
}

/// A named message type: ordered field list plus presence semantics.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDescriptor {
    pub name: String,
    pub syntax: ProtoSyntax,
    pub fields: Vec<FieldDescriptor>,
}

impl MessageDescriptor {
    pub fn new(
        name: impl Into<String>,
        syntax: ProtoSyntax,
        fields: Vec<FieldDescriptor>,
    ) -> Self {
        MessageDescriptor {
            name: name.into(),
            syntax,
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names_round_trip() {
        for ty in [
            CelType::Bool,
            CelType::Int,
            CelType::Uint,
            CelType::Double,
            CelType::String,
            CelType::Bytes,
            CelType::Duration,
            CelType::Timestamp,
            CelType::List,
            CelType::Map,
            CelType::Type,
            CelType::Dyn,
        ] {
            assert_eq!(CelType::by_name(ty.name()), Some(ty.clone()));
        }
        assert_eq!(CelType::by_name("no_such_type"), None);
    }

    #[test]
    fn test_message_field_lookup() {
        let desc = MessageDescriptor::new(
            "test.Msg",
            ProtoSyntax::Proto3,
            vec![FieldDescriptor::new("count", CelType::Int)],
        );
        assert_eq!(desc.field("count").map(|f| f.ty.clone()), Some(CelType::Int));
        assert!(desc.field("missing").is_none());
    }
}
