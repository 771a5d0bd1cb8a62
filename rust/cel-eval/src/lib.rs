//! CEL Eval
//!
//! The evaluator core for the Common Expression Language: planning from a
//! parsed (optionally type-checked) AST into a directly evaluable tree,
//! attribute resolution over heterogeneous host data, overload dispatch,
//! and the optimize / exhaustive-eval / state-tracking decorators.
//!
//! Data flow: AST → [`planner::Planner`] (with decorators and check
//! metadata) → [`interpretable::Interpretable`] tree →
//! `eval(activation)` → [`cel_core::Value`].

pub mod activation;
pub mod ast;
pub mod attributes;
pub mod decorators;
pub mod dispatch;
pub mod functions;
pub mod interpretable;
pub mod macros;
pub mod planner;
pub mod registry;
pub mod state;

pub use activation::{
    Activation, EmptyActivation, HierarchicalActivation, InterruptibleActivation, MapActivation,
    PartialActivation,
};
pub use ast::{CheckMetadata, CheckedExpr, Constant, Expr, ExprKind, IdGen, Reference};
pub use attributes::{namespace_candidates, AttributePattern, Qualifier, QualifierKey};
pub use decorators::{exhaustive_eval, optimize, track_state, Decorator};
pub use dispatch::{Dispatcher, Overload};
pub use functions::standard_dispatcher;
pub use interpretable::{CostEstimate, Interpretable};
pub use planner::{PlanError, Planner};
pub use registry::{JsonAdapter, TypeAdapter, TypeRegistry};
pub use state::EvalState;
