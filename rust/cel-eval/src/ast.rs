//! The input expression tree.
//!
//! The parser and macro expander live outside this crate; they hand over a
//! tree of [`Expr`] nodes, each carrying a stable 64-bit id. The optional
//! [`CheckedExpr`] wrapper adds the type checker's resolution metadata.

use cel_core::CelType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A literal constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
}

/// One AST node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub id: i64,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Const(Constant),
    Ident(String),
    Select {
        operand: Box<Expr>,
        field: String,
        /// `has(e.f)` parses to a test-only select.
        test_only: bool,
    },
    Call {
        function: String,
        target: Option<Box<Expr>>,
        args: Vec<Expr>,
    },
    CreateList {
        elements: Vec<Expr>,
    },
    CreateMap {
        entries: Vec<(Expr, Expr)>,
    },
    CreateStruct {
        type_name: String,
        entries: Vec<(String, Expr)>,
    },
    /// The generic fold form every list/map macro lowers to.
    Comprehension {
        iter_var: String,
        iter_range: Box<Expr>,
        accu_var: String,
        accu_init: Box<Expr>,
        loop_cond: Box<Expr>,
        loop_step: Box<Expr>,
        result: Box<Expr>,
    },
}

impl Expr {
    pub fn new(id: i64, kind: ExprKind) -> Self {
        Expr { id, kind }
    }

    pub fn const_null(id: i64) -> Self {
        Expr::new(id, ExprKind::Const(Constant::Null))
    }

    pub fn const_bool(id: i64, b: bool) -> Self {
        Expr::new(id, ExprKind::Const(Constant::Bool(b)))
    }

    pub fn const_int(id: i64, n: i64) -> Self {
        Expr::new(id, ExprKind::Const(Constant::Int(n)))
    }

    pub fn const_uint(id: i64, n: u64) -> Self {
        Expr::new(id, ExprKind::Const(Constant::Uint(n)))
    }

    pub fn const_double(id: i64, f: f64) -> Self {
        Expr::new(id, ExprKind::Const(Constant::Double(f)))
    }

    pub fn const_string(id: i64, s: impl Into<String>) -> Self {
        Expr::new(id, ExprKind::Const(Constant::String(s.into())))
    }

    pub fn const_bytes(id: i64, b: Vec<u8>) -> Self {
        Expr::new(id, ExprKind::Const(Constant::Bytes(b)))
    }

    pub fn ident(id: i64, name: impl Into<String>) -> Self {
        Expr::new(id, ExprKind::Ident(name.into()))
    }

    pub fn select(id: i64, operand: Expr, field: impl Into<String>) -> Self {
        Expr::new(
            id,
            ExprKind::Select {
                operand: Box::new(operand),
                field: field.into(),
                test_only: false,
            },
        )
    }

    pub fn presence_test(id: i64, operand: Expr, field: impl Into<String>) -> Self {
        Expr::new(
            id,
            ExprKind::Select {
                operand: Box::new(operand),
                field: field.into(),
                test_only: true,
            },
        )
    }

    pub fn call(id: i64, function: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::new(
            id,
            ExprKind::Call {
                function: function.into(),
                target: None,
                args,
            },
        )
    }

    pub fn member_call(
        id: i64,
        function: impl Into<String>,
        target: Expr,
        args: Vec<Expr>,
    ) -> Self {
        Expr::new(
            id,
            ExprKind::Call {
                function: function.into(),
                target: Some(Box::new(target)),
                args,
            },
        )
    }

    pub fn list(id: i64, elements: Vec<Expr>) -> Self {
        Expr::new(id, ExprKind::CreateList { elements })
    }

    pub fn map(id: i64, entries: Vec<(Expr, Expr)>) -> Self {
        Expr::new(id, ExprKind::CreateMap { entries })
    }

    pub fn strukt(id: i64, type_name: impl Into<String>, entries: Vec<(String, Expr)>) -> Self {
        Expr::new(
            id,
            ExprKind::CreateStruct {
                type_name: type_name.into(),
                entries,
            },
        )
    }
}

/// Resolution metadata attached to a node by the type checker.
#[derive(Debug, Clone, PartialEq)]
pub enum Reference {
    /// A call site resolved to a single overload id.
    Overload(String),
    /// An identifier resolved to a fully-qualified name.
    Ident(String),
    /// A struct literal resolved to a fully-qualified type name.
    Type(String),
}

/// An AST with optional type-check annotations, keyed by node id.
#[derive(Debug, Clone, Default)]
pub struct CheckMetadata {
    pub references: HashMap<i64, Reference>,
    pub types: HashMap<i64, CelType>,
}

#[derive(Debug, Clone)]
pub struct CheckedExpr {
    pub expr: Expr,
    pub metadata: CheckMetadata,
}

/// Monotonic id source for building macro-expanded subtrees and test ASTs.
#[derive(Debug, Default)]
pub struct IdGen {
    next: i64,
}

impl IdGen {
    pub fn new() -> Self {
        IdGen { next: 0 }
    }

    /// Start above the largest id already present in a parsed tree.
    pub fn starting_at(next: i64) -> Self {
        IdGen { next }
    }

    pub fn next_id(&mut self) -> i64 {
        self.next += 1;
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_assign_ids() {
        let mut ids = IdGen::new();
        let e = Expr::call(
            ids.next_id(),
            "_+_",
            vec![Expr::const_int(ids.next_id(), 1), Expr::const_int(ids.next_id(), 2)],
        );
        assert_eq!(e.id, 1);
        let ExprKind::Call { function, args, .. } = &e.kind else {
            panic!("expected call");
        };
        assert_eq!(function, "_+_");
        assert_eq!(args.len(), 2);
    }
}
