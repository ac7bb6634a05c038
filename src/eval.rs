//! A tree-walking evaluator, used to test fixed instances and as the
//! reference semantics the optimizers must preserve.
//!
//! Evaluation is eager except for `If` and the indicator pairs, which only
//! evaluate the branch selected by their condition. Integer arithmetic is
//! checked; overflow is reported instead of wrapping.

use crate::{
  expr::{Expr, ExprRef, VarId},
  value::{NumPair, Value, num_cmp, promote},
};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use thiserror::Error;

/// All the ways evaluation can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
  #[error("variable {0} is unbound")]
  UnboundVariable(VarId),
  #[error("type mismatch: expected {expected}, found {found}")]
  TypeMismatch {
    expected: &'static str,
    found: &'static str,
  },
  #[error("index {index} out of bounds for length {len}")]
  IndexOutOfBounds { index: i64, len: usize },
  #[error("value {0} not found in collection")]
  ValueNotFound(i64),
  #[error("invalid operand for {op}: {reason}")]
  InvalidOperand {
    op: &'static str,
    reason: &'static str,
  },
  #[error("division by zero")]
  DivisionByZero,
}

/// An assignment of values to variables.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
  values: FxHashMap<VarId, Value>,
}

impl Bindings {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, id: VarId, value: Value) {
    self.values.insert(id, value);
  }

  /// Builder-style insertion.
  #[must_use]
  pub fn with(mut self, id: VarId, value: Value) -> Self {
    self.insert(id, value);
    self
  }

  #[must_use]
  pub fn with_int(self, id: u32, value: i64) -> Self {
    self.with(VarId(id), Value::Int(value))
  }

  #[must_use]
  pub fn with_float(self, id: u32, value: f64) -> Self {
    self.with(VarId(id), Value::Float(value))
  }

  #[must_use]
  pub fn with_list(self, id: u32, values: Vec<i64>) -> Self {
    self.with(VarId(id), Value::List(values))
  }

  #[must_use]
  pub fn get(&self, id: VarId) -> Option<&Value> {
    self.values.get(&id)
  }
}

/// Evaluates `expr` under `bindings`.
///
/// # Errors
///
/// Returns an [`EvalError`] for unbound variables, ill-typed operands,
/// out-of-bounds indexing, absent values, invalid operands (negative square
/// roots, empty extrema, integer overflow), and division by zero.
pub fn evaluate(expr: &Expr, bindings: &Bindings) -> Result<Value, EvalError> {
  match expr {
    Expr::Int(v) => Ok(Value::Int(*v)),
    Expr::Float(v) => Ok(Value::Float(*v)),
    Expr::Var(id, _) => bindings
      .get(*id)
      .cloned()
      .ok_or(EvalError::UnboundVariable(*id)),
    Expr::IntArray(vs) => Ok(Value::List(vs.clone())),
    Expr::IntArray2(_) => Err(EvalError::InvalidOperand {
      op: "array2",
      reason: "two-dimensional arrays are only readable through index2",
    }),
    Expr::List(xs) => {
      let mut out = Vec::with_capacity(xs.len());
      for x in xs {
        out.push(evaluate(x, bindings)?.as_int()?);
      }
      Ok(Value::List(out))
    }

    Expr::Sum(ts) => fold_arith(ts, bindings, Value::Int(0), add),
    Expr::Sub(a, b) => {
      sub(&evaluate(a, bindings)?, &evaluate(b, bindings)?)
    }
    Expr::Prod(fs) => fold_arith(fs, bindings, Value::Int(1), mul),
    Expr::Div(a, b) => {
      div(&evaluate(a, bindings)?, &evaluate(b, bindings)?)
    }
    Expr::Mod(a, b) => {
      rem(&evaluate(a, bindings)?, &evaluate(b, bindings)?)
    }
    Expr::Neg(a) => neg(&evaluate(a, bindings)?),

    Expr::Eq(a, b) => {
      cmp_values(a, b, bindings, |o| o == std::cmp::Ordering::Equal)
    }
    Expr::Ne(a, b) => {
      cmp_values(a, b, bindings, |o| o != std::cmp::Ordering::Equal)
    }
    Expr::Lt(a, b) => cmp_values(a, b, bindings, std::cmp::Ordering::is_lt),
    Expr::Le(a, b) => cmp_values(a, b, bindings, std::cmp::Ordering::is_le),
    Expr::Gt(a, b) => cmp_values(a, b, bindings, std::cmp::Ordering::is_gt),
    Expr::Ge(a, b) => cmp_values(a, b, bindings, std::cmp::Ordering::is_ge),

    Expr::And(xs) => {
      let mut all = true;
      for x in xs {
        all &= evaluate(x, bindings)?.truthy()?;
      }
      Ok(bool_value(all))
    }
    Expr::Or(xs) => {
      let mut any = false;
      for x in xs {
        any |= evaluate(x, bindings)?.truthy()?;
      }
      Ok(bool_value(any))
    }
    Expr::Xor(xs) => {
      let mut parity = false;
      for x in xs {
        parity ^= evaluate(x, bindings)?.truthy()?;
      }
      Ok(bool_value(parity))
    }
    Expr::Not(x) => Ok(bool_value(!evaluate(x, bindings)?.truthy()?)),
    Expr::If(c, t, e) => {
      // Only the taken branch is evaluated.
      if evaluate(c, bindings)?.truthy()? {
        evaluate(t, bindings)
      } else {
        evaluate(e, bindings)
      }
    }

    Expr::Index(a, i) => {
      let list = evaluate(a, bindings)?;
      let list = list.as_list()?;
      let idx = evaluate(i, bindings)?.as_int()?;
      lookup(list, idx)
    }
    Expr::Index2(a, i, j) => {
      let Expr::IntArray2(rows) = &**a else {
        return Err(EvalError::InvalidOperand {
          op: "index2",
          reason: "operand is not a two-dimensional array literal",
        });
      };
      let i = evaluate(i, bindings)?.as_int()?;
      let j = evaluate(j, bindings)?.as_int()?;
      let row = row_at(rows, i)?;
      lookup(row, j)
    }
    Expr::Count(c, x) => {
      let elems = evaluate(c, bindings)?.elements()?;
      let needle = evaluate(x, bindings)?.as_int()?;
      Ok(Value::Int(
        elems.iter().filter(|&&e| e == needle).count() as i64,
      ))
    }
    Expr::Contains(c, x) => {
      let elems = evaluate(c, bindings)?.elements()?;
      let needle = evaluate(x, bindings)?.as_int()?;
      Ok(bool_value(elems.contains(&needle)))
    }
    Expr::Find(c, x) => {
      let elems = evaluate(c, bindings)?.elements()?;
      let needle = evaluate(x, bindings)?.as_int()?;
      elems
        .iter()
        .copied()
        .find(|&e| e == needle)
        .map(Value::Int)
        .ok_or(EvalError::ValueNotFound(needle))
    }
    Expr::IndexOf(c, x) => {
      let elems = evaluate(c, bindings)?.elements()?;
      let needle = evaluate(x, bindings)?.as_int()?;
      let pos = elems
        .iter()
        .position(|&e| e == needle)
        .map_or(-1, |p| p as i64);
      Ok(Value::Int(pos))
    }
    Expr::SetIntersect(xs) => {
      let mut iter = xs.iter();
      let first = iter.next().ok_or(EvalError::InvalidOperand {
        op: "set_intersect",
        reason: "no operands",
      })?;
      let mut acc: BTreeSet<i64> =
        evaluate(first, bindings)?.elements()?.into_iter().collect();
      for x in iter {
        let next: BTreeSet<i64> =
          evaluate(x, bindings)?.elements()?.into_iter().collect();
        acc.retain(|v| next.contains(v));
      }
      Ok(Value::Set(acc))
    }
    Expr::SetUnion(xs) => {
      let mut acc = BTreeSet::new();
      for x in xs {
        acc.extend(evaluate(x, bindings)?.elements()?);
      }
      Ok(Value::Set(acc))
    }
    Expr::Sort(c, key) => {
      let mut elems = evaluate(c, bindings)?.elements()?;
      match key {
        None => elems.sort_unstable(),
        Some(key) => {
          let mut keyed = Vec::with_capacity(elems.len());
          for e in elems {
            let k = evaluate(&key.apply(Expr::int(e)), bindings)?;
            keyed.push((e, k));
          }
          // Stable, so elements with equal keys keep their order.
          let mut err = None;
          keyed.sort_by(|(_, a), (_, b)| {
            num_cmp(a, b).unwrap_or_else(|e| {
              err.get_or_insert(e);
              std::cmp::Ordering::Equal
            })
          });
          if let Some(e) = err {
            return Err(e);
          }
          elems = keyed.into_iter().map(|(e, _)| e).collect();
        }
      }
      Ok(Value::List(elems))
    }

    Expr::Min(xs) => extremum(xs, bindings, "min", std::cmp::Ordering::Less),
    Expr::Max(xs) => {
      extremum(xs, bindings, "max", std::cmp::Ordering::Greater)
    }

    Expr::SumOver(c, t) => {
      fold_over(c, t, bindings, Value::Int(0), add)
    }
    Expr::ProdOver(c, t) => {
      fold_over(c, t, bindings, Value::Int(1), mul)
    }
    Expr::MinOver(c, t) => {
      extremum_over(c, t, bindings, "min_over", std::cmp::Ordering::Less)
    }
    Expr::MaxOver(c, t) => {
      extremum_over(c, t, bindings, "max_over", std::cmp::Ordering::Greater)
    }
    Expr::ForAll(c, t) => {
      let mut all = true;
      for e in evaluate(c, bindings)?.elements()? {
        all &= evaluate(&t.apply(Expr::int(e)), bindings)?.truthy()?;
      }
      Ok(bool_value(all))
    }
    Expr::Exists(c, t) => {
      let mut any = false;
      for e in evaluate(c, bindings)?.elements()? {
        any |= evaluate(&t.apply(Expr::int(e)), bindings)?.truthy()?;
      }
      Ok(bool_value(any))
    }

    Expr::Abs(x) => match evaluate(x, bindings)? {
      Value::Int(v) => v.checked_abs().map(Value::Int).ok_or(
        EvalError::InvalidOperand {
          op: "abs",
          reason: "integer overflow",
        },
      ),
      Value::Float(v) => Ok(Value::Float(v.abs())),
      other => Err(EvalError::TypeMismatch {
        expected: "number",
        found: other.type_name(),
      }),
    },
    Expr::Sqrt(x) => {
      let v = evaluate(x, bindings)?.as_float()?;
      if v < 0.0 {
        return Err(EvalError::InvalidOperand {
          op: "sqrt",
          reason: "negative operand",
        });
      }
      Ok(Value::Float(v.sqrt()))
    }
    Expr::Exp(x) => {
      Ok(Value::Float(evaluate(x, bindings)?.as_float()?.exp()))
    }
    Expr::Ln(x) => {
      let v = evaluate(x, bindings)?.as_float()?;
      if v <= 0.0 {
        return Err(EvalError::InvalidOperand {
          op: "ln",
          reason: "non-positive operand",
        });
      }
      Ok(Value::Float(v.ln()))
    }
    Expr::Log(base, x) => {
      let base = evaluate(base, bindings)?.as_float()?;
      let v = evaluate(x, bindings)?.as_float()?;
      if base <= 0.0 || base == 1.0 {
        return Err(EvalError::InvalidOperand {
          op: "log",
          reason: "base must be positive and not one",
        });
      }
      if v <= 0.0 {
        return Err(EvalError::InvalidOperand {
          op: "log",
          reason: "non-positive operand",
        });
      }
      Ok(Value::Float(v.log(base)))
    }
    Expr::Pow(base, exp) => {
      pow(&evaluate(base, bindings)?, &evaluate(exp, bindings)?)
    }

    Expr::InDomain(x, values) => {
      let v = evaluate(x, bindings)?.as_int()?;
      Ok(bool_value(values.contains(&v)))
    }
    Expr::BoolCount(cs) => {
      let mut count = 0;
      for c in cs {
        if evaluate(c, bindings)?.truthy()? {
          count += 1;
        }
      }
      Ok(Value::Int(count))
    }
    Expr::IndicatorSum(pairs) => {
      let mut acc = Value::Int(0);
      for (c, v) in pairs {
        // The value side is only evaluated when the condition holds,
        // mirroring the `If(cond, value, 0)` it came from.
        if evaluate(c, bindings)?.truthy()? {
          acc = add(&acc, &evaluate(v, bindings)?)?;
        }
      }
      Ok(acc)
    }
  }
}

/// Evaluates an expression expected to produce an integer.
///
/// # Errors
///
/// Fails like [`evaluate`], or with a type mismatch if the result is not an
/// integer.
pub fn evaluate_int(
  expr: &Expr,
  bindings: &Bindings,
) -> Result<i64, EvalError> {
  evaluate(expr, bindings)?.as_int()
}

/// Evaluates an expression expected to produce a number, widening integers.
///
/// # Errors
///
/// Fails like [`evaluate`], or with a type mismatch if the result is not
/// numeric.
pub fn evaluate_float(
  expr: &Expr,
  bindings: &Bindings,
) -> Result<f64, EvalError> {
  evaluate(expr, bindings)?.as_float()
}

/// Evaluates an expression expected to produce a truth value.
///
/// # Errors
///
/// Fails like [`evaluate`], or with a type mismatch if the result is not an
/// integer.
pub fn evaluate_bool(
  expr: &Expr,
  bindings: &Bindings,
) -> Result<bool, EvalError> {
  evaluate(expr, bindings)?.truthy()
}

fn bool_value(b: bool) -> Value {
  Value::Int(i64::from(b))
}

fn lookup(list: &[i64], index: i64) -> Result<Value, EvalError> {
  usize::try_from(index)
    .ok()
    .and_then(|i| list.get(i))
    .map(|&v| Value::Int(v))
    .ok_or(EvalError::IndexOutOfBounds {
      index,
      len: list.len(),
    })
}

fn row_at(rows: &[Vec<i64>], index: i64) -> Result<&[i64], EvalError> {
  usize::try_from(index)
    .ok()
    .and_then(|i| rows.get(i))
    .map(Vec::as_slice)
    .ok_or(EvalError::IndexOutOfBounds {
      index,
      len: rows.len(),
    })
}

fn fold_arith(
  terms: &[ExprRef],
  bindings: &Bindings,
  init: Value,
  op: fn(&Value, &Value) -> Result<Value, EvalError>,
) -> Result<Value, EvalError> {
  let mut acc = init;
  for t in terms {
    acc = op(&acc, &evaluate(t, bindings)?)?;
  }
  Ok(acc)
}

fn fold_over(
  collection: &ExprRef,
  transform: &crate::expr::Transform,
  bindings: &Bindings,
  init: Value,
  op: fn(&Value, &Value) -> Result<Value, EvalError>,
) -> Result<Value, EvalError> {
  let mut acc = init;
  for e in evaluate(collection, bindings)?.elements()? {
    acc = op(&acc, &evaluate(&transform.apply(Expr::int(e)), bindings)?)?;
  }
  Ok(acc)
}

fn cmp_values(
  a: &ExprRef,
  b: &ExprRef,
  bindings: &Bindings,
  accept: fn(std::cmp::Ordering) -> bool,
) -> Result<Value, EvalError> {
  let av = evaluate(a, bindings)?;
  let bv = evaluate(b, bindings)?;
  Ok(bool_value(accept(num_cmp(&av, &bv)?)))
}

fn extremum(
  operands: &[ExprRef],
  bindings: &Bindings,
  op: &'static str,
  keep: std::cmp::Ordering,
) -> Result<Value, EvalError> {
  let mut best: Option<Value> = None;
  for x in operands {
    let v = evaluate(x, bindings)?;
    best = Some(pick(best, v, keep)?);
  }
  best.ok_or(EvalError::InvalidOperand {
    op,
    reason: "no operands",
  })
}

fn extremum_over(
  collection: &ExprRef,
  transform: &crate::expr::Transform,
  bindings: &Bindings,
  op: &'static str,
  keep: std::cmp::Ordering,
) -> Result<Value, EvalError> {
  let mut best: Option<Value> = None;
  for e in evaluate(collection, bindings)?.elements()? {
    let v = evaluate(&transform.apply(Expr::int(e)), bindings)?;
    best = Some(pick(best, v, keep)?);
  }
  best.ok_or(EvalError::InvalidOperand {
    op,
    reason: "empty collection",
  })
}

fn pick(
  best: Option<Value>,
  candidate: Value,
  keep: std::cmp::Ordering,
) -> Result<Value, EvalError> {
  match best {
    None => {
      // Force a numeric check even for the first operand.
      let _ = candidate.as_float()?;
      Ok(candidate)
    }
    Some(b) => {
      if num_cmp(&candidate, &b)? == keep {
        Ok(candidate)
      } else {
        Ok(b)
      }
    }
  }
}

fn add(a: &Value, b: &Value) -> Result<Value, EvalError> {
  match promote(a, b)? {
    NumPair::Ints(x, y) => x.checked_add(y).map(Value::Int).ok_or(
      EvalError::InvalidOperand {
        op: "sum",
        reason: "integer overflow",
      },
    ),
    NumPair::Floats(x, y) => Ok(Value::Float(x + y)),
  }
}

fn sub(a: &Value, b: &Value) -> Result<Value, EvalError> {
  match promote(a, b)? {
    NumPair::Ints(x, y) => x.checked_sub(y).map(Value::Int).ok_or(
      EvalError::InvalidOperand {
        op: "sub",
        reason: "integer overflow",
      },
    ),
    NumPair::Floats(x, y) => Ok(Value::Float(x - y)),
  }
}

fn mul(a: &Value, b: &Value) -> Result<Value, EvalError> {
  match promote(a, b)? {
    NumPair::Ints(x, y) => x.checked_mul(y).map(Value::Int).ok_or(
      EvalError::InvalidOperand {
        op: "prod",
        reason: "integer overflow",
      },
    ),
    NumPair::Floats(x, y) => Ok(Value::Float(x * y)),
  }
}

fn div(a: &Value, b: &Value) -> Result<Value, EvalError> {
  match promote(a, b)? {
    NumPair::Ints(_, 0) => Err(EvalError::DivisionByZero),
    NumPair::Ints(x, y) => x.checked_div(y).map(Value::Int).ok_or(
      EvalError::InvalidOperand {
        op: "div",
        reason: "integer overflow",
      },
    ),
    NumPair::Floats(x, y) => {
      if y == 0.0 {
        Err(EvalError::DivisionByZero)
      } else {
        Ok(Value::Float(x / y))
      }
    }
  }
}

fn rem(a: &Value, b: &Value) -> Result<Value, EvalError> {
  match promote(a, b)? {
    NumPair::Ints(_, 0) => Err(EvalError::DivisionByZero),
    NumPair::Ints(x, y) => x.checked_rem(y).map(Value::Int).ok_or(
      EvalError::InvalidOperand {
        op: "mod",
        reason: "integer overflow",
      },
    ),
    NumPair::Floats(x, y) => {
      if y == 0.0 {
        Err(EvalError::DivisionByZero)
      } else {
        Ok(Value::Float(x % y))
      }
    }
  }
}

fn neg(a: &Value) -> Result<Value, EvalError> {
  match a {
    Value::Int(v) => {
      v.checked_neg()
        .map(Value::Int)
        .ok_or(EvalError::InvalidOperand {
          op: "neg",
          reason: "integer overflow",
        })
    }
    Value::Float(v) => Ok(Value::Float(-v)),
    other => Err(EvalError::TypeMismatch {
      expected: "number",
      found: other.type_name(),
    }),
  }
}

fn pow(base: &Value, exp: &Value) -> Result<Value, EvalError> {
  match (base, exp) {
    (Value::Int(b), Value::Int(e)) if *e >= 0 => u32::try_from(*e)
      .ok()
      .and_then(|e| b.checked_pow(e))
      .map(Value::Int)
      .ok_or(EvalError::InvalidOperand {
        op: "pow",
        reason: "integer overflow",
      }),
    _ => Ok(Value::Float(base.as_float()?.powf(exp.as_float()?))),
  }
}
