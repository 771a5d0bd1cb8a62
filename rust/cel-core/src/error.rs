//! Evaluation error taxonomy. Errors are values: they flow through operators
//! rather than unwinding, and only short-circuit sites may recover from them.

use thiserror::Error;

/// The closed set of runtime error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ErrorKind {
    #[error("no_such_overload")]
    NoSuchOverload,
    #[error("no_such_field")]
    NoSuchField,
    #[error("no_such_attribute")]
    NoSuchAttribute,
    #[error("divide_by_zero")]
    DivideByZero,
    #[error("overflow")]
    Overflow,
    #[error("range")]
    Range,
    #[error("type_conversion")]
    TypeConversion,
    #[error("duplicate_key")]
    DuplicateKey,
    #[error("invalid_argument")]
    InvalidArgument,
    #[error("interrupted")]
    Interrupted,
    #[error("internal")]
    Internal,
}

/// A runtime evaluation error: a kind, a human-readable message, and the
/// originating AST node id when one is known.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EvalError {
    pub kind: ErrorKind,
    pub message: String,
    pub id: Option<i64>,
}

impl EvalError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        EvalError {
            kind,
            message: message.into(),
            id: None,
        }
    }

    /// Attach the originating node id, keeping an id set earlier.
    pub fn with_id(mut self, id: i64) -> Self {
        self.id.get_or_insert(id);
        self
    }

    pub fn no_such_overload(signature: impl AsRef<str>) -> Self {
        Self::new(
            ErrorKind::NoSuchOverload,
            format!("no such overload: {}", signature.as_ref()),
        )
    }

    pub fn no_such_key(key: impl AsRef<str>) -> Self {
        Self::new(
            ErrorKind::NoSuchField,
            format!("no such key: {}", key.as_ref()),
        )
    }

    pub fn no_such_field(field: impl AsRef<str>) -> Self {
        Self::new(
            ErrorKind::NoSuchField,
            format!("no such field: {}", field.as_ref()),
        )
    }

    pub fn no_such_attribute(name: impl AsRef<str>) -> Self {
        Self::new(
            ErrorKind::NoSuchAttribute,
            format!("no such attribute: '{}'", name.as_ref()),
        )
    }

    pub fn divide_by_zero() -> Self {
        Self::new(ErrorKind::DivideByZero, "divide by zero")
    }

    pub fn modulus_by_zero() -> Self {
        Self::new(ErrorKind::DivideByZero, "modulus by zero")
    }

    pub fn overflow(op: &str) -> Self {
        Self::new(ErrorKind::Overflow, format!("{op} overflow"))
    }

    pub fn range(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Range, message)
    }

    pub fn conversion(from: impl AsRef<str>, to: impl AsRef<str>) -> Self {
        Self::new(
            ErrorKind::TypeConversion,
            format!(
                "type conversion error from '{}' to '{}'",
                from.as_ref(),
                to.as_ref()
            ),
        )
    }

    pub fn duplicate_key(key: impl AsRef<str>) -> Self {
        Self::new(
            ErrorKind::DuplicateKey,
            format!("duplicate key in map literal: {}", key.as_ref()),
        )
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn interrupted() -> Self {
        Self::new(ErrorKind::Interrupted, "evaluation interrupted")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_id_keeps_first() {
        let e = EvalError::divide_by_zero().with_id(4).with_id(9);
        assert_eq!(e.id, Some(4));
    }

    #[test]
    fn test_display_is_message() {
        let e = EvalError::no_such_key("ip");
        assert_eq!(e.to_string(), "no such key: ip");
        assert_eq!(e.kind.to_string(), "no_such_field");
    }
}
