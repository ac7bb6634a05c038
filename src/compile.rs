//! Lowering expression trees onto a [`Backend`].
//!
//! The compiler walks a tree bottom-up, turning every node into either a
//! compile-time constant or a backend variable constrained to equal the
//! node's value. Shared subtrees (same [`Arc`] allocation) lower exactly
//! once: results are cached by node address, and roots handed to
//! [`Compiler::compile`] are pinned so those addresses stay valid for the
//! compiler's lifetime.
//!
//! Integer interval arithmetic from [`Domain`] bounds every auxiliary
//! variable, so the backend never sees an unbounded int.

use std::sync::Arc;

use itertools::Itertools;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::{
  backend::{Backend, BoolLit, CmpOp, LinExpr},
  domain::Domain,
  expr::{Expr, ExprRef, VarId, VarKind},
};

/// Backend handles and domains for the caller's decision variables.
#[derive(Debug, Clone)]
pub struct VarTable<V> {
  entries: FxHashMap<VarId, (V, Domain)>,
}

impl<V: Copy> VarTable<V> {
  #[must_use]
  pub fn new() -> Self {
    Self {
      entries: FxHashMap::default(),
    }
  }

  pub fn insert(&mut self, var: VarId, handle: V, domain: Domain) {
    self.entries.insert(var, (handle, domain));
  }

  #[must_use]
  pub fn get(&self, var: VarId) -> Option<(V, Domain)> {
    self.entries.get(&var).copied()
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

impl<V: Copy> Default for VarTable<V> {
  fn default() -> Self {
    Self::new()
  }
}

/// What an expression lowered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompiledValue<V> {
  /// Known at compile time; no backend variable was allocated.
  Const(i64),
  /// A backend variable constrained to equal the expression.
  Var { handle: V, domain: Domain },
}

impl<V: Copy> CompiledValue<V> {
  #[must_use]
  pub fn domain(&self) -> Domain {
    match self {
      Self::Const(c) => Domain::singleton(*c),
      Self::Var { domain, .. } => *domain,
    }
  }

  #[must_use]
  pub fn as_const(&self) -> Option<i64> {
    match self {
      Self::Const(c) => Some(*c),
      Self::Var { .. } => None,
    }
  }

  fn is_bool(&self) -> bool {
    let d = self.domain();
    d.min >= 0 && d.max <= 1
  }
}

/// Errors raised while lowering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
  /// The tree refers to a variable the table does not know.
  #[error("variable {0} has no backend handle")]
  VariableNotFound(VarId),
  /// The operation has no finite-domain encoding.
  #[error("cannot lower {shape}: {reason}")]
  UnsupportedOperation {
    shape: &'static str,
    reason: &'static str,
  },
  /// An array or list appeared as a value instead of under an access.
  #[error("{shape} is only usable through an element access")]
  DirectArrayAccess { shape: &'static str },
  /// A jagged two-dimensional access needs its row index known.
  #[error("{shape} over rows of different lengths needs a constant index")]
  NonConstantIndex { shape: &'static str },
  /// A posted constraint folded to false.
  #[error("constraint is trivially false")]
  InfeasibleConstraint,
  /// A min/max over zero operands has no value to bound.
  #[error("{shape} needs at least one operand")]
  EmptyAggregation { shape: &'static str },
}

/// Lowers expressions onto a [`Backend`], one tree at a time.
pub struct Compiler<'a, B: Backend> {
  backend: &'a mut B,
  vars: &'a VarTable<B::Var>,
  /// One lowering per node allocation.
  cache: FxHashMap<*const Expr, CompiledValue<B::Var>>,
  /// Keeps compiled trees alive so cached addresses cannot be reused.
  roots: Vec<ExprRef>,
  next_aux: u32,
}

impl<'a, B: Backend> Compiler<'a, B> {
  pub fn new(backend: &'a mut B, vars: &'a VarTable<B::Var>) -> Self {
    Self {
      backend,
      vars,
      cache: FxHashMap::default(),
      roots: Vec::new(),
      next_aux: 0,
    }
  }

  /// Lowers `expr` to a constant or a constrained backend variable.
  pub fn compile(
    &mut self,
    expr: &ExprRef,
  ) -> Result<CompiledValue<B::Var>, CompileError> {
    self.roots.push(expr.clone());
    let value = self.cached(expr)?;
    log::debug!("compiled {} root to {value:?}", expr.shape_name());
    Ok(value)
  }

  /// Lowers `expr` and asserts that it holds.
  ///
  /// A constant nonzero value needs no constraint; a constant zero makes
  /// the model infeasible and is reported instead of posted.
  pub fn compile_constraint(
    &mut self,
    expr: &ExprRef,
  ) -> Result<(), CompileError> {
    match self.compile(expr)? {
      CompiledValue::Const(0) => Err(CompileError::InfeasibleConstraint),
      CompiledValue::Const(_) => Ok(()),
      value @ CompiledValue::Var { handle, .. } => {
        if value.is_bool() {
          self
            .backend
            .add_linear(LinExpr::term(1, handle), CmpOp::Eq, 1, None);
        } else {
          self
            .backend
            .add_linear(LinExpr::term(1, handle), CmpOp::Ne, 0, None);
        }
        Ok(())
      }
    }
  }

  fn cached(
    &mut self,
    expr: &ExprRef,
  ) -> Result<CompiledValue<B::Var>, CompileError> {
    let key = Arc::as_ptr(expr);
    if let Some(&value) = self.cache.get(&key) {
      return Ok(value);
    }
    let value = self.lower(expr)?;
    self.cache.insert(key, value);
    Ok(value)
  }

  fn lower(
    &mut self,
    expr: &ExprRef,
  ) -> Result<CompiledValue<B::Var>, CompileError> {
    match expr.as_ref() {
      Expr::Int(v) => Ok(CompiledValue::Const(*v)),
      Expr::Float(f) => {
        if f.is_finite()
          && f.fract() == 0.0
          && (i64::MIN as f64..=i64::MAX as f64).contains(f)
        {
          Ok(CompiledValue::Const(*f as i64))
        } else {
          Err(CompileError::UnsupportedOperation {
            shape: "float",
            reason: "only integral floats lower to constants",
          })
        }
      }
      Expr::Var(id, kind) => match kind {
        VarKind::Int | VarKind::Bool => {
          let (handle, domain) = self
            .vars
            .get(*id)
            .ok_or(CompileError::VariableNotFound(*id))?;
          Ok(CompiledValue::Var { handle, domain })
        }
        VarKind::Float | VarKind::List | VarKind::Set => {
          Err(CompileError::UnsupportedOperation {
            shape: "var",
            reason: "only integer and boolean variables exist in the backend",
          })
        }
      },
      Expr::IntArray(_) | Expr::IntArray2(_) | Expr::List(_) => {
        Err(CompileError::DirectArrayAccess {
          shape: expr.shape_name(),
        })
      }

      Expr::Sum(xs) => {
        let mut lin = LinExpr::new();
        let mut domain = Domain::singleton(0);
        for x in xs {
          let v = self.cached(x)?;
          domain = domain.add(v.domain());
          Self::accumulate(&mut lin, 1, v);
        }
        Ok(self.collapse_linear(lin, domain))
      }
      Expr::Sub(a, b) => {
        let av = self.cached(a)?;
        let bv = self.cached(b)?;
        if let (Some(x), Some(y)) = (av.as_const(), bv.as_const()) {
          return Ok(CompiledValue::Const(x.saturating_sub(y)));
        }
        let mut lin = LinExpr::new();
        Self::accumulate(&mut lin, 1, av);
        Self::accumulate(&mut lin, -1, bv);
        Ok(self.collapse_linear(lin, av.domain().sub(bv.domain())))
      }
      Expr::Neg(x) => {
        let v = self.cached(x)?;
        if let Some(c) = v.as_const() {
          return Ok(CompiledValue::Const(c.saturating_neg()));
        }
        let mut lin = LinExpr::new();
        Self::accumulate(&mut lin, -1, v);
        Ok(self.collapse_linear(lin, v.domain().neg()))
      }
      Expr::Prod(xs) => self.lower_product(xs),
      Expr::Div(a, b) => self.lower_division(a, b, true),
      Expr::Mod(a, b) => self.lower_division(a, b, false),

      Expr::Eq(a, b) => self.lower_cmp(CmpOp::Eq, a, b),
      Expr::Ne(a, b) => self.lower_cmp(CmpOp::Ne, a, b),
      Expr::Lt(a, b) => self.lower_cmp(CmpOp::Lt, a, b),
      Expr::Le(a, b) => self.lower_cmp(CmpOp::Le, a, b),
      Expr::Gt(a, b) => self.lower_cmp(CmpOp::Gt, a, b),
      Expr::Ge(a, b) => self.lower_cmp(CmpOp::Ge, a, b),

      Expr::And(xs) => self.lower_connective(xs, true),
      Expr::Or(xs) => self.lower_connective(xs, false),
      Expr::Xor(xs) => self.lower_xor(xs),
      Expr::Not(x) => {
        let v = self.cached(x)?;
        let b = self.booleanize(v);
        Ok(self.negate_bool(b))
      }
      Expr::If(c, t, e) => self.lower_conditional(c, t, e),

      Expr::Index(arr, idx) => {
        let iv = self.cached(idx)?;
        match arr.as_ref() {
          Expr::IntArray(values) => self.lower_array_index(values, iv),
          Expr::List(items) => self.lower_list_index(items, iv),
          _ => Err(CompileError::UnsupportedOperation {
            shape: "index",
            reason: "only literal arrays and lists are indexable",
          }),
        }
      }
      Expr::Index2(arr, i, j) => {
        let Expr::IntArray2(rows) = arr.as_ref() else {
          return Err(CompileError::UnsupportedOperation {
            shape: "index2",
            reason: "only literal two-dimensional arrays are indexable",
          });
        };
        let iv = self.cached(i)?;
        let jv = self.cached(j)?;
        self.lower_matrix_index(rows, iv, jv)
      }

      Expr::Min(xs) => self.lower_extremum(xs, true),
      Expr::Max(xs) => self.lower_extremum(xs, false),
      Expr::Abs(x) => {
        let v = self.cached(x)?;
        if let Some(c) = v.as_const() {
          return Ok(CompiledValue::Const(c.saturating_abs()));
        }
        let domain = v.domain().abs();
        let target = self.fresh_int(domain);
        let vh = self.handle_of(v);
        self.backend.add_abs_eq(target, vh);
        Ok(CompiledValue::Var {
          handle: target,
          domain,
        })
      }

      Expr::InDomain(x, values) => self.lower_in_domain(x, values),
      Expr::BoolCount(conds) => self.lower_bool_count(conds),
      Expr::IndicatorSum(pairs) => self.lower_indicator_sum(pairs),

      Expr::Sqrt(_) | Expr::Exp(_) | Expr::Ln(_) | Expr::Log(..) => {
        Err(CompileError::UnsupportedOperation {
          shape: expr.shape_name(),
          reason: "no finite-domain encoding for real functions",
        })
      }
      Expr::Pow(..) => Err(CompileError::UnsupportedOperation {
        shape: "pow",
        reason: "exponentiation is not a backend primitive",
      }),
      Expr::Count(..)
      | Expr::Contains(..)
      | Expr::Find(..)
      | Expr::IndexOf(..)
      | Expr::SetIntersect(_)
      | Expr::SetUnion(_)
      | Expr::Sort(..) => Err(CompileError::UnsupportedOperation {
        shape: expr.shape_name(),
        reason: "collection queries are evaluation-only",
      }),
      Expr::SumOver(..)
      | Expr::ProdOver(..)
      | Expr::MinOver(..)
      | Expr::MaxOver(..)
      | Expr::ForAll(..)
      | Expr::Exists(..) => Err(CompileError::UnsupportedOperation {
        shape: expr.shape_name(),
        reason: "aggregates must be expanded before lowering",
      }),
    }
  }

  fn lower_product(
    &mut self,
    xs: &[ExprRef],
  ) -> Result<CompiledValue<B::Var>, CompileError> {
    let values: Vec<_> = xs
      .iter()
      .map(|x| self.cached(x))
      .collect::<Result<_, _>>()?;
    let mut coeff = 1_i64;
    let mut factors: Vec<CompiledValue<B::Var>> = Vec::new();
    for v in values {
      match v.as_const() {
        Some(c) => coeff = coeff.saturating_mul(c),
        None => factors.push(v),
      }
    }
    if coeff == 0 {
      return Ok(CompiledValue::Const(0));
    }
    match factors.as_slice() {
      [] => Ok(CompiledValue::Const(coeff)),
      [single] => {
        if coeff == 1 {
          Ok(*single)
        } else {
          let mut lin = LinExpr::new();
          Self::accumulate(&mut lin, coeff, *single);
          Ok(self.collapse_linear(lin, single.domain().scale(coeff)))
        }
      }
      many => {
        let mut domain = many[0].domain();
        for v in &many[1..] {
          domain = domain.mul(v.domain());
        }
        let handles: Vec<B::Var> =
          many.iter().map(|&v| self.handle_of(v)).collect();
        let product = self.fresh_int(domain);
        self.backend.add_mul_eq(product, &handles);
        if coeff == 1 {
          Ok(CompiledValue::Var {
            handle: product,
            domain,
          })
        } else {
          let lin = LinExpr::term(coeff, product);
          Ok(self.collapse_linear(lin, domain.scale(coeff)))
        }
      }
    }
  }

  fn lower_division(
    &mut self,
    a: &ExprRef,
    b: &ExprRef,
    quotient: bool,
  ) -> Result<CompiledValue<B::Var>, CompileError> {
    let shape = if quotient { "div" } else { "mod" };
    let av = self.cached(a)?;
    let bv = self.cached(b)?;
    if let Some(d) = bv.as_const() {
      if d == 0 {
        return Err(CompileError::UnsupportedOperation {
          shape,
          reason: "constant zero divisor",
        });
      }
      if let Some(n) = av.as_const() {
        let folded = if quotient {
          n.checked_div(d).unwrap_or(i64::MAX)
        } else {
          n.checked_rem(d).unwrap_or(0)
        };
        return Ok(CompiledValue::Const(folded));
      }
    }
    let domain = if quotient {
      av.domain().quotient_bound()
    } else {
      bv.domain().remainder_bound()
    };
    let target = self.fresh_int(domain);
    let num = self.handle_of(av);
    let den = self.handle_of(bv);
    if quotient {
      self.backend.add_div_eq(target, num, den);
    } else {
      self.backend.add_mod_eq(target, num, den);
    }
    Ok(CompiledValue::Var {
      handle: target,
      domain,
    })
  }

  fn lower_cmp(
    &mut self,
    op: CmpOp,
    a: &ExprRef,
    b: &ExprRef,
  ) -> Result<CompiledValue<B::Var>, CompileError> {
    let av = self.cached(a)?;
    let bv = self.cached(b)?;
    if let (Some(x), Some(y)) = (av.as_const(), bv.as_const()) {
      return Ok(CompiledValue::Const(i64::from(op.holds(x, y))));
    }
    Ok(self.reify_cmp(op, av, bv))
  }

  fn lower_connective(
    &mut self,
    xs: &[ExprRef],
    all: bool,
  ) -> Result<CompiledValue<B::Var>, CompileError> {
    let mut values = Vec::with_capacity(xs.len());
    for x in xs {
      let v = self.cached(x)?;
      values.push(self.booleanize(v));
    }
    let mut handles = Vec::new();
    for v in values {
      match v {
        CompiledValue::Const(c) => {
          // A false operand decides a conjunction, a true one a
          // disjunction; the other polarity is the identity element.
          if (c != 0) != all {
            return Ok(CompiledValue::Const(i64::from(!all)));
          }
        }
        CompiledValue::Var { handle, .. } => handles.push(handle),
      }
    }
    match handles.as_slice() {
      [] => Ok(CompiledValue::Const(i64::from(all))),
      [single] => Ok(CompiledValue::Var {
        handle: *single,
        domain: Domain::BOOL,
      }),
      many => {
        let result = self.fresh_bool();
        let mut sum = LinExpr::new();
        for &h in many {
          sum.push(1, h);
        }
        let n = many.len() as i64;
        if all {
          self.backend.add_linear(
            sum.clone(),
            CmpOp::Eq,
            n,
            Some(BoolLit::if_true(result)),
          );
          self.backend.add_linear(
            sum,
            CmpOp::Le,
            n - 1,
            Some(BoolLit::if_false(result)),
          );
        } else {
          self.backend.add_linear(
            sum.clone(),
            CmpOp::Ge,
            1,
            Some(BoolLit::if_true(result)),
          );
          self.backend.add_linear(
            sum,
            CmpOp::Eq,
            0,
            Some(BoolLit::if_false(result)),
          );
        }
        Ok(CompiledValue::Var {
          handle: result,
          domain: Domain::BOOL,
        })
      }
    }
  }

  fn lower_xor(
    &mut self,
    xs: &[ExprRef],
  ) -> Result<CompiledValue<B::Var>, CompileError> {
    let mut parity = 0_i64;
    let mut handles = Vec::new();
    for x in xs {
      let v = self.cached(x)?;
      match self.booleanize(v) {
        CompiledValue::Const(c) => parity ^= c,
        CompiledValue::Var { handle, .. } => handles.push(handle),
      }
    }
    match handles.as_slice() {
      [] => Ok(CompiledValue::Const(parity)),
      [single] => {
        let v = CompiledValue::Var {
          handle: *single,
          domain: Domain::BOOL,
        };
        if parity == 0 {
          Ok(v)
        } else {
          Ok(self.negate_bool(v))
        }
      }
      many => {
        // sum(bits) + parity == 2k + result, so result is the parity bit.
        let n = many.len() as i64;
        let carries = self.fresh_int(Domain::new(0, (n + 1) / 2));
        let result = self.fresh_bool();
        let mut lin = LinExpr::new();
        for &h in many {
          lin.push(1, h);
        }
        lin.add_constant(parity);
        lin.push(-2, carries);
        lin.push(-1, result);
        self.backend.add_linear(lin, CmpOp::Eq, 0, None);
        Ok(CompiledValue::Var {
          handle: result,
          domain: Domain::BOOL,
        })
      }
    }
  }

  fn lower_conditional(
    &mut self,
    c: &ExprRef,
    t: &ExprRef,
    e: &ExprRef,
  ) -> Result<CompiledValue<B::Var>, CompileError> {
    let cond = self.cached(c)?;
    let cond = self.booleanize(cond);
    // A decided condition lowers only the taken branch, mirroring the
    // evaluator's laziness.
    if let Some(cv) = cond.as_const() {
      return self.cached(if cv != 0 { t } else { e });
    }
    let tv = self.cached(t)?;
    let ev = self.cached(e)?;
    if tv == ev {
      return Ok(tv);
    }
    let domain = tv.domain().hull(ev.domain());
    if let (Some(tc), Some(ec)) = (tv.as_const(), ev.as_const()) {
      // value == else + cond * (then - else), a single row.
      let mut lin = LinExpr::new();
      Self::accumulate(&mut lin, tc.saturating_sub(ec), cond);
      lin.add_constant(ec);
      return Ok(self.collapse_linear(lin, domain));
    }
    let target = self.fresh_int(domain);
    let th = self.handle_of(tv);
    let eh = self.handle_of(ev);
    let ch = self.handle_of(cond);
    self.backend.add_element_eq(target, ch, &[eh, th]);
    Ok(CompiledValue::Var {
      handle: target,
      domain,
    })
  }

  fn lower_array_index(
    &mut self,
    values: &[i64],
    idx: CompiledValue<B::Var>,
  ) -> Result<CompiledValue<B::Var>, CompileError> {
    if let Some(i) = idx.as_const() {
      return usize::try_from(i)
        .ok()
        .and_then(|i| values.get(i).copied())
        .map(CompiledValue::Const)
        .ok_or(CompileError::UnsupportedOperation {
          shape: "index",
          reason: "constant index out of bounds",
        });
    }
    let Some((lo, hi)) = values.iter().copied().minmax().into_option() else {
      return Err(CompileError::UnsupportedOperation {
        shape: "index",
        reason: "cannot index an empty array",
      });
    };
    let handles: Vec<B::Var> = values
      .iter()
      .map(|&v| self.backend.new_constant(v))
      .collect();
    let domain = Domain::new(lo, hi);
    let target = self.fresh_int(domain);
    let ih = self.handle_of(idx);
    self.backend.add_element_eq(target, ih, &handles);
    Ok(CompiledValue::Var {
      handle: target,
      domain,
    })
  }

  fn lower_list_index(
    &mut self,
    items: &[ExprRef],
    idx: CompiledValue<B::Var>,
  ) -> Result<CompiledValue<B::Var>, CompileError> {
    if let Some(i) = idx.as_const() {
      let item = usize::try_from(i).ok().and_then(|i| items.get(i)).ok_or(
        CompileError::UnsupportedOperation {
          shape: "index",
          reason: "constant index out of bounds",
        },
      )?;
      return self.cached(item);
    }
    let values: Vec<_> = items
      .iter()
      .map(|item| self.cached(item))
      .collect::<Result<_, _>>()?;
    let Some(domain) = values
      .iter()
      .map(CompiledValue::domain)
      .reduce(|a, b| a.hull(b))
    else {
      return Err(CompileError::UnsupportedOperation {
        shape: "index",
        reason: "cannot index an empty list",
      });
    };
    let handles: Vec<B::Var> =
      values.iter().map(|&v| self.handle_of(v)).collect();
    let target = self.fresh_int(domain);
    let ih = self.handle_of(idx);
    self.backend.add_element_eq(target, ih, &handles);
    Ok(CompiledValue::Var {
      handle: target,
      domain,
    })
  }

  fn lower_matrix_index(
    &mut self,
    rows: &[Vec<i64>],
    iv: CompiledValue<B::Var>,
    jv: CompiledValue<B::Var>,
  ) -> Result<CompiledValue<B::Var>, CompileError> {
    let out_of_bounds = CompileError::UnsupportedOperation {
      shape: "index2",
      reason: "constant index out of bounds",
    };
    match (iv.as_const(), jv.as_const()) {
      (Some(i), Some(j)) => usize::try_from(i)
        .ok()
        .and_then(|i| rows.get(i))
        .and_then(|row| usize::try_from(j).ok().and_then(|j| row.get(j)))
        .copied()
        .map(CompiledValue::Const)
        .ok_or(out_of_bounds),
      (Some(i), None) => {
        let row = usize::try_from(i)
          .ok()
          .and_then(|i| rows.get(i))
          .ok_or(out_of_bounds)?;
        self.lower_array_index(row, jv)
      }
      (None, Some(j)) => {
        // Gather column j; every row must reach it.
        let j = usize::try_from(j).ok().ok_or_else(|| out_of_bounds.clone())?;
        let column: Vec<i64> = rows
          .iter()
          .map(|row| row.get(j).copied())
          .collect::<Option<_>>()
          .ok_or(out_of_bounds)?;
        self.lower_array_index(&column, iv)
      }
      (None, None) => {
        let Some(width) = rows.first().map(Vec::len) else {
          return Err(CompileError::UnsupportedOperation {
            shape: "index2",
            reason: "cannot index an empty array",
          });
        };
        if width == 0 || rows.iter().any(|row| row.len() != width) {
          return Err(CompileError::NonConstantIndex { shape: "index2" });
        }
        // Row-major flattening, addressed by i * width + j.
        let flat: Vec<i64> = rows.iter().flatten().copied().collect();
        let mut lin = LinExpr::new();
        Self::accumulate(&mut lin, width as i64, iv);
        Self::accumulate(&mut lin, 1, jv);
        let bound = (flat.len() - 1) as i64;
        let flat_idx = self.collapse_linear(lin, Domain::new(0, bound));
        self.lower_array_index(&flat, flat_idx)
      }
    }
  }

  fn lower_extremum(
    &mut self,
    xs: &[ExprRef],
    is_min: bool,
  ) -> Result<CompiledValue<B::Var>, CompileError> {
    let shape = if is_min { "min" } else { "max" };
    let empty = CompileError::EmptyAggregation { shape };
    let values: Vec<_> = xs
      .iter()
      .map(|x| self.cached(x))
      .collect::<Result<_, _>>()?;
    if let [single] = values.as_slice() {
      return Ok(*single);
    }
    if let Some(consts) = values
      .iter()
      .map(CompiledValue::as_const)
      .collect::<Option<Vec<i64>>>()
    {
      let folded = if is_min {
        consts.into_iter().min()
      } else {
        consts.into_iter().max()
      };
      return folded.map(CompiledValue::Const).ok_or(empty);
    }
    let domains: Vec<Domain> =
      values.iter().map(CompiledValue::domain).collect();
    let domain = if is_min {
      Domain::min_of(&domains)
    } else {
      Domain::max_of(&domains)
    };
    let Some(domain) = domain else {
      return Err(empty);
    };
    let handles: Vec<B::Var> =
      values.iter().map(|&v| self.handle_of(v)).collect();
    let target = self.fresh_int(domain);
    if is_min {
      self.backend.add_min_eq(target, &handles);
    } else {
      self.backend.add_max_eq(target, &handles);
    }
    Ok(CompiledValue::Var {
      handle: target,
      domain,
    })
  }

  fn lower_in_domain(
    &mut self,
    x: &ExprRef,
    values: &[i64],
  ) -> Result<CompiledValue<B::Var>, CompileError> {
    let xv = self.cached(x)?;
    if let Some(c) = xv.as_const() {
      return Ok(CompiledValue::Const(i64::from(values.contains(&c))));
    }
    let domain = xv.domain();
    let feasible: Vec<i64> = values
      .iter()
      .copied()
      .filter(|&v| domain.contains(v))
      .unique()
      .collect();
    if feasible.is_empty() {
      return Ok(CompiledValue::Const(0));
    }
    let width = i128::from(domain.max) - i128::from(domain.min) + 1;
    if feasible.len() as i128 == width {
      return Ok(CompiledValue::Const(1));
    }
    let mut sum = LinExpr::new();
    for v in feasible {
      let b = self.reify_cmp(CmpOp::Eq, xv, CompiledValue::Const(v));
      Self::accumulate(&mut sum, 1, b);
    }
    let result = self.fresh_bool();
    self.backend.add_linear(
      sum.clone(),
      CmpOp::Ge,
      1,
      Some(BoolLit::if_true(result)),
    );
    self
      .backend
      .add_linear(sum, CmpOp::Eq, 0, Some(BoolLit::if_false(result)));
    Ok(CompiledValue::Var {
      handle: result,
      domain: Domain::BOOL,
    })
  }

  fn lower_bool_count(
    &mut self,
    conds: &[ExprRef],
  ) -> Result<CompiledValue<B::Var>, CompileError> {
    let mut fixed = 0_i64;
    let mut handles = Vec::new();
    for c in conds {
      let v = self.cached(c)?;
      match self.booleanize(v) {
        CompiledValue::Const(c) => fixed += c,
        CompiledValue::Var { handle, .. } => handles.push(handle),
      }
    }
    if handles.is_empty() {
      return Ok(CompiledValue::Const(fixed));
    }
    let mut lin = LinExpr::new();
    for &h in &handles {
      lin.push(1, h);
    }
    lin.add_constant(fixed);
    let domain = Domain::new(fixed, fixed + handles.len() as i64);
    Ok(self.collapse_linear(lin, domain))
  }

  fn lower_indicator_sum(
    &mut self,
    pairs: &[(ExprRef, ExprRef)],
  ) -> Result<CompiledValue<B::Var>, CompileError> {
    let mut lin = LinExpr::new();
    let mut domain = Domain::singleton(0);
    for (cond, value) in pairs {
      let cv = self.cached(cond)?;
      match self.booleanize(cv) {
        // A false condition contributes nothing; its value never lowers.
        CompiledValue::Const(0) => {}
        CompiledValue::Const(_) => {
          let v = self.cached(value)?;
          domain = domain.add(v.domain());
          Self::accumulate(&mut lin, 1, v);
        }
        CompiledValue::Var { handle: b, .. } => {
          let v = self.cached(value)?;
          let contribution = v.domain().hull(Domain::singleton(0));
          domain = domain.add(contribution);
          match v {
            CompiledValue::Const(c) => lin.push(c, b),
            CompiledValue::Var { .. } => {
              let channel = self.fresh_int(contribution);
              let vh = self.handle_of(v);
              self.backend.add_mul_eq(channel, &[b, vh]);
              lin.push(1, channel);
            }
          }
        }
      }
    }
    Ok(self.collapse_linear(lin, domain))
  }

  /// A fresh boolean equal to `lhs cmp rhs`, enforced in both directions.
  fn reify_cmp(
    &mut self,
    op: CmpOp,
    lhs: CompiledValue<B::Var>,
    rhs: CompiledValue<B::Var>,
  ) -> CompiledValue<B::Var> {
    let b = self.fresh_bool();
    let mut lin = LinExpr::new();
    Self::accumulate(&mut lin, 1, lhs);
    Self::accumulate(&mut lin, -1, rhs);
    self
      .backend
      .add_linear(lin.clone(), op, 0, Some(BoolLit::if_true(b)));
    self
      .backend
      .add_linear(lin, op.negate(), 0, Some(BoolLit::if_false(b)));
    CompiledValue::Var {
      handle: b,
      domain: Domain::BOOL,
    }
  }

  /// Coerces a value to a boolean, reifying truthiness for wider domains.
  fn booleanize(
    &mut self,
    value: CompiledValue<B::Var>,
  ) -> CompiledValue<B::Var> {
    match value {
      CompiledValue::Const(c) => CompiledValue::Const(i64::from(c != 0)),
      v if v.is_bool() => v,
      other => self.reify_cmp(CmpOp::Ne, other, CompiledValue::Const(0)),
    }
  }

  fn negate_bool(
    &mut self,
    value: CompiledValue<B::Var>,
  ) -> CompiledValue<B::Var> {
    match value.as_const() {
      Some(c) => CompiledValue::Const(i64::from(c == 0)),
      None => {
        let r = self.fresh_bool();
        let mut lin = LinExpr::term(1, r);
        Self::accumulate(&mut lin, 1, value);
        self.backend.add_linear(lin, CmpOp::Eq, 1, None);
        CompiledValue::Var {
          handle: r,
          domain: Domain::BOOL,
        }
      }
    }
  }

  /// Turns a linear combination into a value: a constant when no variables
  /// remain, the variable itself when the combination is a bare `1 * v`,
  /// and otherwise a fresh variable bound by one equality row.
  fn collapse_linear(
    &mut self,
    mut lin: LinExpr<B::Var>,
    domain: Domain,
  ) -> CompiledValue<B::Var> {
    if let Some(total) = lin.as_constant() {
      return CompiledValue::Const(total);
    }
    if lin.constant == 0 && lin.terms.len() == 1 && lin.terms[0].0 == 1 {
      return CompiledValue::Var {
        handle: lin.terms[0].1,
        domain,
      };
    }
    let aux = self.fresh_int(domain);
    lin.push(-1, aux);
    self.backend.add_linear(lin, CmpOp::Eq, 0, None);
    CompiledValue::Var {
      handle: aux,
      domain,
    }
  }

  fn accumulate(
    lin: &mut LinExpr<B::Var>,
    coeff: i64,
    value: CompiledValue<B::Var>,
  ) {
    match value {
      CompiledValue::Const(c) => lin.add_constant(coeff.saturating_mul(c)),
      CompiledValue::Var { handle, .. } => lin.push(coeff, handle),
    }
  }

  fn fresh_int(&mut self, domain: Domain) -> B::Var {
    let name = format!("aux{}", self.next_aux);
    self.next_aux += 1;
    self.backend.new_int_var(domain, &name)
  }

  fn fresh_bool(&mut self) -> B::Var {
    let name = format!("reif{}", self.next_aux);
    self.next_aux += 1;
    self.backend.new_bool_var(&name)
  }

  /// A handle for any value, materializing constants on demand.
  fn handle_of(&mut self, value: CompiledValue<B::Var>) -> B::Var {
    match value {
      CompiledValue::Const(c) => self.backend.new_constant(c),
      CompiledValue::Var { handle, .. } => handle,
    }
  }
}
