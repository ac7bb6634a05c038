//! Local, syntactic simplification.
//!
//! One pass works bottom-up over a tree and applies a fixed set of
//! rewrites: flattening of nested `Sum`/`And`/`Or`, integer constant
//! folding, boolean identity and absorption, `If` reduction, and the two
//! counting patterns that fuse sums of conditionals into
//! [`BoolCount`](Expr::BoolCount) and [`IndicatorSum`](Expr::IndicatorSum).
//! Global, equality-based rewriting lives in [`crate::egraph`]; this pass is
//! the cheap one that runs on every tree before compilation.
//!
//! Output ordering is deterministic: a simplified sum lists its folded
//! constant first, then the fused counting forms, then the remaining terms
//! in their original order.

use crate::expr::{Expr, ExprRef};
use std::sync::Arc;

const MAX_PASSES: usize = 8;

/// Applies one bottom-up simplification pass.
#[must_use]
pub fn simplify(expr: &ExprRef) -> ExprRef {
  match &**expr {
    Expr::Int(_)
    | Expr::Float(_)
    | Expr::Var(..)
    | Expr::IntArray(_)
    | Expr::IntArray2(_) => expr.clone(),
    Expr::Sum(terms) => simplify_sum(terms),
    Expr::Prod(factors) => simplify_prod(factors),
    Expr::And(ops) => simplify_connective(ops, true),
    Expr::Or(ops) => simplify_connective(ops, false),
    Expr::Xor(ops) => simplify_xor(ops),
    Expr::If(c, t, e) => simplify_if(c, t, e),
    _ => {
      let rebuilt = expr.map_children(|c| simplify(c));
      fold_node(&rebuilt).unwrap_or_else(|| Arc::new(rebuilt))
    }
  }
}

/// Re-applies [`simplify`] until the tree stops changing.
///
/// A single pass already reaches a fixpoint for most trees since it works
/// bottom-up; the loop catches rewrites uncovered by a previous pass, such
/// as constant folds deferred by overflow. Bounded by a small pass budget.
#[must_use]
pub fn simplify_to_fixpoint(expr: &ExprRef) -> ExprRef {
  let mut cur = expr.clone();
  for _ in 0..MAX_PASSES {
    let next = simplify(&cur);
    if next == cur {
      return cur;
    }
    cur = next;
  }
  log::debug!("simplification stopped before a fixpoint: {cur}");
  cur
}

fn int_const(e: &Expr) -> Option<i64> {
  if let Expr::Int(v) = e { Some(*v) } else { None }
}

fn is_int(e: &Expr, v: i64) -> bool {
  int_const(e) == Some(v)
}

/// A running numeric constant. Integer folding is checked; an addition or
/// multiplication that would overflow is left unfolded by the caller.
/// Integers never silently become floats, but one float operand makes the
/// whole constant a float.
enum Folded {
  Int(i64),
  Float(f64),
}

impl Folded {
  fn add_int(&mut self, v: i64) -> bool {
    match self {
      Self::Int(a) => match a.checked_add(v) {
        Some(s) => {
          *a = s;
          true
        }
        None => false,
      },
      Self::Float(a) => {
        *a += v as f64;
        true
      }
    }
  }

  fn add_float(&mut self, v: f64) {
    *self = match *self {
      Self::Int(a) => Self::Float(a as f64 + v),
      Self::Float(a) => Self::Float(a + v),
    };
  }

  fn mul_int(&mut self, v: i64) -> bool {
    match self {
      Self::Int(a) => match a.checked_mul(v) {
        Some(p) => {
          *a = p;
          true
        }
        None => false,
      },
      Self::Float(a) => {
        *a *= v as f64;
        true
      }
    }
  }

  fn mul_float(&mut self, v: f64) {
    *self = match *self {
      Self::Int(a) => Self::Float(a as f64 * v),
      Self::Float(a) => Self::Float(a * v),
    };
  }

  fn is_int_const(&self, v: i64) -> bool {
    matches!(self, Self::Int(a) if *a == v)
  }

  fn to_expr(&self) -> ExprRef {
    match self {
      Self::Int(v) => Expr::int(*v),
      Self::Float(v) => Expr::float(*v),
    }
  }
}

fn simplify_sum(terms: &[ExprRef]) -> ExprRef {
  // Flatten one level; deeper nesting was already flattened bottom-up.
  let mut flat = Vec::with_capacity(terms.len());
  for t in terms {
    let s = simplify(t);
    if let Expr::Sum(inner) = &*s {
      flat.extend(inner.iter().cloned());
    } else {
      flat.push(s);
    }
  }

  let mut acc = Folded::Int(0);
  let mut conds = Vec::new();
  let mut pairs = Vec::new();
  let mut rest = Vec::new();
  for t in flat {
    match &*t {
      Expr::Int(v) => {
        if !acc.add_int(*v) {
          rest.push(Expr::int(*v));
        }
      }
      Expr::Float(v) => acc.add_float(*v),
      Expr::BoolCount(cs) => conds.extend(cs.iter().cloned()),
      Expr::IndicatorSum(ps) => pairs.extend(ps.iter().cloned()),
      Expr::If(c, then, otherwise) if is_int(otherwise, 0) => {
        if is_int(then, 1) {
          conds.push(c.clone());
        } else {
          pairs.push((c.clone(), then.clone()));
        }
      }
      _ => rest.push(t.clone()),
    }
  }

  let mut out = Vec::new();
  if !acc.is_int_const(0) {
    out.push(acc.to_expr());
  }
  if !conds.is_empty() {
    out.push(Expr::bool_count(conds));
  }
  if !pairs.is_empty() {
    out.push(Expr::indicator_sum(pairs));
  }
  out.extend(rest);
  match out.as_slice() {
    [] => Expr::int(0),
    [single] => single.clone(),
    _ => Arc::new(Expr::Sum(out)),
  }
}

fn simplify_prod(factors: &[ExprRef]) -> ExprRef {
  let mut acc = Folded::Int(1);
  let mut rest = Vec::new();
  for f_ in factors {
    let s = simplify(f_);
    match &*s {
      Expr::Int(v) => {
        if !acc.mul_int(*v) {
          rest.push(Expr::int(*v));
        }
      }
      Expr::Float(v) => acc.mul_float(*v),
      _ => rest.push(s),
    }
  }
  // An integer zero factor absorbs the product. Float zero does not: it
  // could still produce -0.0 or NaN depending on the other factors.
  if acc.is_int_const(0) {
    return Expr::int(0);
  }
  let mut out = Vec::new();
  if !acc.is_int_const(1) {
    out.push(acc.to_expr());
  }
  out.extend(rest);
  match out.as_slice() {
    [] => Expr::int(1),
    [single] => single.clone(),
    _ => Arc::new(Expr::Prod(out)),
  }
}

fn simplify_connective(ops: &[ExprRef], is_and: bool) -> ExprRef {
  let mut flat = Vec::with_capacity(ops.len());
  for op in ops {
    let s = simplify(op);
    match &*s {
      Expr::And(inner) if is_and => flat.extend(inner.iter().cloned()),
      Expr::Or(inner) if !is_and => flat.extend(inner.iter().cloned()),
      _ => flat.push(s),
    }
  }

  let mut kept = Vec::new();
  for op in flat {
    match int_const(&op) {
      Some(v) => {
        // One false operand absorbs a conjunction, one true operand a
        // disjunction; identity constants drop out.
        if (v != 0) != is_and {
          return Expr::int(i64::from(v != 0));
        }
      }
      None => kept.push(op),
    }
  }
  match kept.as_slice() {
    [] => Expr::int(i64::from(is_and)),
    [single] => single.clone(),
    _ => Arc::new(if is_and {
      Expr::And(kept)
    } else {
      Expr::Or(kept)
    }),
  }
}

fn simplify_xor(ops: &[ExprRef]) -> ExprRef {
  let simplified: Vec<ExprRef> = ops.iter().map(simplify).collect();
  let mut parity = false;
  for op in &simplified {
    match int_const(op) {
      Some(v) => parity ^= v != 0,
      None => return Arc::new(Expr::Xor(simplified)),
    }
  }
  Expr::int(i64::from(parity))
}

fn simplify_if(c: &ExprRef, t: &ExprRef, e: &ExprRef) -> ExprRef {
  let c = simplify(c);
  let t = simplify(t);
  let e = simplify(e);
  if let Some(v) = int_const(&c) {
    return if v != 0 { t } else { e };
  }
  if t == e {
    return t;
  }
  Arc::new(Expr::If(c, t, e))
}

/// Folds a node whose relevant operands are integer constants. Returns
/// `None` when the node must be kept, including every case that would fail
/// at evaluation time (division by zero, out-of-bounds indexes, overflow).
fn fold_node(e: &Expr) -> Option<ExprRef> {
  match e {
    Expr::Sub(a, b) => {
      int_const(a)?.checked_sub(int_const(b)?).map(Expr::int)
    }
    Expr::Neg(a) => int_const(a)?.checked_neg().map(Expr::int),
    Expr::Abs(a) => int_const(a)?.checked_abs().map(Expr::int),
    Expr::Not(a) => Some(Expr::int(i64::from(int_const(a)? == 0))),
    Expr::Eq(a, b) => fold_cmp(a, b, |x, y| x == y),
    Expr::Ne(a, b) => fold_cmp(a, b, |x, y| x != y),
    Expr::Lt(a, b) => fold_cmp(a, b, |x, y| x < y),
    Expr::Le(a, b) => fold_cmp(a, b, |x, y| x <= y),
    Expr::Gt(a, b) => fold_cmp(a, b, |x, y| x > y),
    Expr::Ge(a, b) => fold_cmp(a, b, |x, y| x >= y),
    Expr::Div(a, b) => {
      let den = int_const(b)?;
      if den == 0 {
        return None;
      }
      int_const(a)?.checked_div(den).map(Expr::int)
    }
    Expr::Mod(a, b) => {
      let den = int_const(b)?;
      if den == 0 {
        return None;
      }
      int_const(a)?.checked_rem(den).map(Expr::int)
    }
    Expr::Min(xs) => fold_extremum(xs, Iterator::min),
    Expr::Max(xs) => fold_extremum(xs, Iterator::max),
    Expr::InDomain(x, values) => {
      Some(Expr::int(i64::from(values.contains(&int_const(x)?))))
    }
    Expr::Index(a, i) => {
      let Expr::IntArray(vs) = &**a else {
        return None;
      };
      let idx = usize::try_from(int_const(i)?).ok()?;
      vs.get(idx).map(|&v| Expr::int(v))
    }
    _ => None,
  }
}

fn fold_cmp(
  a: &ExprRef,
  b: &ExprRef,
  accept: fn(i64, i64) -> bool,
) -> Option<ExprRef> {
  Some(Expr::int(i64::from(accept(int_const(a)?, int_const(b)?))))
}

fn fold_extremum(
  xs: &[ExprRef],
  pick: fn(std::vec::IntoIter<i64>) -> Option<i64>,
) -> Option<ExprRef> {
  let consts: Vec<i64> =
    xs.iter().map(|x| int_const(x)).collect::<Option<_>>()?;
  pick(consts.into_iter()).map(Expr::int)
}
