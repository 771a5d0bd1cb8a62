//! CEL Core
//!
//! The typed value algebra for the Common Expression Language evaluator:
//! value variants with polymorphic operators, type descriptors, message
//! field semantics, and the runtime error taxonomy.

pub mod error;
pub mod types;
pub mod values;

pub use error::{ErrorKind, EvalError};
pub use types::{Capability, CelType, FieldDescriptor, MessageDescriptor, ProtoSyntax};
pub use values::{MapKey, ObjectValue, UnknownSet, Value};
