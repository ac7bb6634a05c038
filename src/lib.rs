//! Symbolic expression optimization and lowering for finite-domain
//! constraint backends.
//!
//! A caller builds an immutable [`Expr`] tree, checks it against concrete
//! bindings with [`evaluate`], simplifies it — syntactically with
//! [`simplify`], or by [equality saturation] over an [`EGraph`] with
//! cost-based extraction — and finally lowers it onto a [`Backend`] with
//! [`Compiler::compile`], which turns the tree into bounded integer and
//! boolean variables, linear rows, and reified comparisons.
//!
//! [equality saturation]: https://en.wikipedia.org/wiki/E-graph#Equality_saturation

#![warn(
  clippy::all,
  clippy::pedantic,
  anonymous_parameters,
  elided_lifetimes_in_paths,
  missing_copy_implementations,
  unreachable_pub,
  unused_lifetimes
)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod compile;
pub mod domain;
pub mod egraph;
pub mod eval;
pub mod expr;
pub mod extract;
pub mod simplify;
pub mod value;

pub use backend::{Backend, BoolLit, CmpOp, LinExpr, Recorder};
pub use compile::{CompileError, CompiledValue, Compiler, VarTable};
pub use domain::Domain;
pub use egraph::{
  ClassId, EClass, EGraph, ENode, EOp, LambdaId, Pattern, Rewrite,
  SaturationConfig, SaturationReport, StopReason, Subst,
  rules::standard_rules, saturate, saturate_and_extract,
};
pub use eval::{
  Bindings, EvalError, evaluate, evaluate_bool, evaluate_float, evaluate_int,
};
pub use expr::{Expr, ExprRef, Transform, VarId, VarKind};
pub use extract::{BackendCost, CostModel, ExtractError, Extractor, TreeSize};
pub use simplify::{simplify, simplify_to_fixpoint};
pub use value::Value;
