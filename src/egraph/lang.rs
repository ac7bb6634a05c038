//! The operation alphabet e-nodes range over, and loading of expression
//! trees into the graph.
//!
//! [`EOp`] mirrors the expression union variant for variant, with two
//! differences required for hash-consing: float literals are wrapped in
//! [`OrderedFloat`] so they can be hashed, and the opaque transforms of the
//! aggregate forms are replaced by [`LambdaId`]s into the graph's arena.
//! Closures have no structural equality, so two aggregates can only become
//! congruent when they carry the same closure allocation.

use super::{ClassId, EGraph, ENode, LambdaId};
use crate::expr::{Expr, ExprRef, VarId, VarKind};
use ordered_float::OrderedFloat;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// An e-node operation. Leaf payloads are part of the operation, so two
/// distinct literals never share a class by construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, strum::EnumCount)]
pub enum EOp {
  Int(i64),
  Float(OrderedFloat<f64>),
  Var(VarId, VarKind),
  IntArray(Vec<i64>),
  IntArray2(Vec<Vec<i64>>),
  List,
  Sum,
  Sub,
  Prod,
  Div,
  Mod,
  Neg,
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  And,
  Or,
  Xor,
  Not,
  If,
  Index,
  Index2,
  Count,
  Contains,
  Find,
  IndexOf,
  SetIntersect,
  SetUnion,
  Sort(Option<LambdaId>),
  Min,
  Max,
  SumOver(LambdaId),
  ProdOver(LambdaId),
  MinOver(LambdaId),
  MaxOver(LambdaId),
  ForAll(LambdaId),
  Exists(LambdaId),
  Abs,
  Sqrt,
  Exp,
  Ln,
  Log,
  Pow,
  InDomain(Vec<i64>),
  BoolCount,
  IndicatorSum,
}

impl EGraph {
  /// Loads a tree into the graph, returning its root class.
  ///
  /// Shared subtrees (same allocation) are visited once; structurally
  /// equal subtrees land in the same class through hash-consing either
  /// way.
  pub fn add_expr(&mut self, expr: &ExprRef) -> ClassId {
    let mut cache = FxHashMap::default();
    self.add_expr_cached(expr, &mut cache)
  }

  fn add_expr_cached(
    &mut self,
    expr: &ExprRef,
    cache: &mut FxHashMap<*const Expr, ClassId>,
  ) -> ClassId {
    let key = Arc::as_ptr(expr);
    if let Some(&id) = cache.get(&key) {
      return id;
    }
    let id = match &**expr {
      Expr::Int(v) => self.add(ENode::leaf(EOp::Int(*v))),
      Expr::Float(v) => {
        self.add(ENode::leaf(EOp::Float(OrderedFloat(*v))))
      }
      Expr::Var(id, kind) => self.add(ENode::leaf(EOp::Var(*id, *kind))),
      Expr::IntArray(vs) => {
        self.add(ENode::leaf(EOp::IntArray(vs.clone())))
      }
      Expr::IntArray2(rows) => {
        self.add(ENode::leaf(EOp::IntArray2(rows.clone())))
      }
      Expr::List(xs) => self.add_variadic(EOp::List, xs, cache),
      Expr::Sum(xs) => self.add_variadic(EOp::Sum, xs, cache),
      Expr::Prod(xs) => self.add_variadic(EOp::Prod, xs, cache),
      Expr::And(xs) => self.add_variadic(EOp::And, xs, cache),
      Expr::Or(xs) => self.add_variadic(EOp::Or, xs, cache),
      Expr::Xor(xs) => self.add_variadic(EOp::Xor, xs, cache),
      Expr::SetIntersect(xs) => {
        self.add_variadic(EOp::SetIntersect, xs, cache)
      }
      Expr::SetUnion(xs) => self.add_variadic(EOp::SetUnion, xs, cache),
      Expr::Min(xs) => self.add_variadic(EOp::Min, xs, cache),
      Expr::Max(xs) => self.add_variadic(EOp::Max, xs, cache),
      Expr::BoolCount(xs) => self.add_variadic(EOp::BoolCount, xs, cache),
      Expr::Sub(a, b) => self.add_binary(EOp::Sub, a, b, cache),
      Expr::Div(a, b) => self.add_binary(EOp::Div, a, b, cache),
      Expr::Mod(a, b) => self.add_binary(EOp::Mod, a, b, cache),
      Expr::Eq(a, b) => self.add_binary(EOp::Eq, a, b, cache),
      Expr::Ne(a, b) => self.add_binary(EOp::Ne, a, b, cache),
      Expr::Lt(a, b) => self.add_binary(EOp::Lt, a, b, cache),
      Expr::Le(a, b) => self.add_binary(EOp::Le, a, b, cache),
      Expr::Gt(a, b) => self.add_binary(EOp::Gt, a, b, cache),
      Expr::Ge(a, b) => self.add_binary(EOp::Ge, a, b, cache),
      Expr::Index(a, b) => self.add_binary(EOp::Index, a, b, cache),
      Expr::Count(a, b) => self.add_binary(EOp::Count, a, b, cache),
      Expr::Contains(a, b) => self.add_binary(EOp::Contains, a, b, cache),
      Expr::Find(a, b) => self.add_binary(EOp::Find, a, b, cache),
      Expr::IndexOf(a, b) => self.add_binary(EOp::IndexOf, a, b, cache),
      Expr::Log(a, b) => self.add_binary(EOp::Log, a, b, cache),
      Expr::Pow(a, b) => self.add_binary(EOp::Pow, a, b, cache),
      Expr::Neg(a) => self.add_unary(EOp::Neg, a, cache),
      Expr::Not(a) => self.add_unary(EOp::Not, a, cache),
      Expr::Abs(a) => self.add_unary(EOp::Abs, a, cache),
      Expr::Sqrt(a) => self.add_unary(EOp::Sqrt, a, cache),
      Expr::Exp(a) => self.add_unary(EOp::Exp, a, cache),
      Expr::Ln(a) => self.add_unary(EOp::Ln, a, cache),
      Expr::If(c, t, e) => {
        let c = self.add_expr_cached(c, cache);
        let t = self.add_expr_cached(t, cache);
        let e = self.add_expr_cached(e, cache);
        self.add(ENode::new(EOp::If, [c, t, e]))
      }
      Expr::Index2(a, i, j) => {
        let a = self.add_expr_cached(a, cache);
        let i = self.add_expr_cached(i, cache);
        let j = self.add_expr_cached(j, cache);
        self.add(ENode::new(EOp::Index2, [a, i, j]))
      }
      Expr::Sort(c, key) => {
        let lid = key.as_ref().map(|t| self.register_lambda(t));
        let c = self.add_expr_cached(c, cache);
        self.add(ENode::new(EOp::Sort(lid), [c]))
      }
      Expr::SumOver(c, t) => self.add_aggregate(EOp::SumOver, c, t, cache),
      Expr::ProdOver(c, t) => {
        self.add_aggregate(EOp::ProdOver, c, t, cache)
      }
      Expr::MinOver(c, t) => self.add_aggregate(EOp::MinOver, c, t, cache),
      Expr::MaxOver(c, t) => self.add_aggregate(EOp::MaxOver, c, t, cache),
      Expr::ForAll(c, t) => self.add_aggregate(EOp::ForAll, c, t, cache),
      Expr::Exists(c, t) => self.add_aggregate(EOp::Exists, c, t, cache),
      Expr::InDomain(x, values) => {
        let x = self.add_expr_cached(x, cache);
        self.add(ENode::new(EOp::InDomain(values.clone()), [x]))
      }
      Expr::IndicatorSum(pairs) => {
        // Pairs are laid out flat: [cond0, value0, cond1, value1, ...].
        let mut children = Vec::with_capacity(pairs.len() * 2);
        for (c, v) in pairs {
          children.push(self.add_expr_cached(c, cache));
          children.push(self.add_expr_cached(v, cache));
        }
        self.add(ENode::new(EOp::IndicatorSum, children))
      }
    };
    cache.insert(key, id);
    id
  }

  fn add_variadic(
    &mut self,
    op: EOp,
    xs: &[ExprRef],
    cache: &mut FxHashMap<*const Expr, ClassId>,
  ) -> ClassId {
    let mut children = Vec::with_capacity(xs.len());
    for x in xs {
      children.push(self.add_expr_cached(x, cache));
    }
    self.add(ENode::new(op, children))
  }

  fn add_unary(
    &mut self,
    op: EOp,
    a: &ExprRef,
    cache: &mut FxHashMap<*const Expr, ClassId>,
  ) -> ClassId {
    let a = self.add_expr_cached(a, cache);
    self.add(ENode::new(op, [a]))
  }

  fn add_binary(
    &mut self,
    op: EOp,
    a: &ExprRef,
    b: &ExprRef,
    cache: &mut FxHashMap<*const Expr, ClassId>,
  ) -> ClassId {
    let a = self.add_expr_cached(a, cache);
    let b = self.add_expr_cached(b, cache);
    self.add(ENode::new(op, [a, b]))
  }

  fn add_aggregate(
    &mut self,
    op: fn(LambdaId) -> EOp,
    collection: &ExprRef,
    transform: &crate::expr::Transform,
    cache: &mut FxHashMap<*const Expr, ClassId>,
  ) -> ClassId {
    let lid = self.register_lambda(transform);
    let c = self.add_expr_cached(collection, cache);
    self.add(ENode::new(op(lid), [c]))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use strum::EnumCount;

  #[test]
  fn alphabet_matches_the_expression_union() {
    // Every tree variant must be loadable; a new expression variant needs
    // a matching operation here.
    assert_eq!(Expr::COUNT, EOp::COUNT);
  }

  #[test]
  fn structurally_equal_subtrees_share_a_class() {
    let mut eg = EGraph::new();
    // Two separate allocations of the same leaf.
    let a = eg.add_expr(&Expr::int_var(0));
    let b = eg.add_expr(&Expr::int_var(0));
    assert_eq!(a, b);
    assert_eq!(eg.num_classes(), 1);
  }

  #[test]
  fn shared_subtrees_load_once() {
    let shared = Expr::sum(vec![Expr::int_var(0), Expr::int(1)]);
    let tree = Expr::sub(shared.clone(), shared);
    let mut eg = EGraph::new();
    let root = eg.add_expr(&tree);
    // x0, 1, the sum, and the sub node.
    assert_eq!(eg.num_classes(), 4);
    let class = eg.get_class(root).unwrap();
    let node = &class.nodes()[0];
    assert_eq!(node.op(), &EOp::Sub);
    assert_eq!(node.children()[0], node.children()[1]);
  }

  #[test]
  fn float_literals_hash_cons() {
    let mut eg = EGraph::new();
    let a = eg.add_expr(&Expr::float(1.5));
    let b = eg.add_expr(&Expr::float(1.5));
    assert_eq!(a, b);
  }

  #[test]
  fn aggregates_are_distinguished_by_their_closure() {
    let c = Expr::int_array(vec![1, 2, 3]);
    let double = crate::expr::Transform::new(|e: ExprRef| {
      Expr::prod(vec![Expr::int(2), e])
    });
    let shared_a = Arc::new(Expr::SumOver(c.clone(), double.clone()));
    let shared_b = Arc::new(Expr::SumOver(c.clone(), double));
    let other = Expr::sum_over(c, |e| Expr::prod(vec![Expr::int(2), e]));

    let mut eg = EGraph::new();
    let a = eg.add_expr(&shared_a);
    let b = eg.add_expr(&shared_b);
    let o = eg.add_expr(&other);
    assert_eq!(a, b, "same closure allocation, same operation");
    assert_ne!(a, o, "equal source text is still a different closure");
  }
}
