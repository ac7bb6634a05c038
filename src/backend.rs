//! The primitive-constraint interface the compiler lowers onto.
//!
//! A [`Backend`] exposes the operations a finite-domain solver can accept
//! directly: variable creation and a small closed set of constraints
//! (linear comparisons with optional enforcement literals, plus the
//! non-linear primitives for products, quotients, extrema, absolute value,
//! and array element access). The compiler never sees solver internals;
//! anything it produces goes through this trait.
//!
//! [`Recorder`] is the in-tree implementation used by tests: it stores
//! every call verbatim so a test can assert on the exact shape of the
//! lowered model.

use crate::domain::Domain;
use std::fmt::Debug;

/// Comparison operators usable in a linear constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum CmpOp {
  #[strum(to_string = "==")]
  Eq,
  #[strum(to_string = "!=")]
  Ne,
  #[strum(to_string = "<")]
  Lt,
  #[strum(to_string = "<=")]
  Le,
  #[strum(to_string = ">")]
  Gt,
  #[strum(to_string = ">=")]
  Ge,
}

impl CmpOp {
  /// The logical complement, used for the negated side of a reified pair.
  #[must_use]
  pub fn negate(self) -> Self {
    match self {
      Self::Eq => Self::Ne,
      Self::Ne => Self::Eq,
      Self::Lt => Self::Ge,
      Self::Le => Self::Gt,
      Self::Gt => Self::Le,
      Self::Ge => Self::Lt,
    }
  }

  #[must_use]
  pub fn holds(self, lhs: i64, rhs: i64) -> bool {
    match self {
      Self::Eq => lhs == rhs,
      Self::Ne => lhs != rhs,
      Self::Lt => lhs < rhs,
      Self::Le => lhs <= rhs,
      Self::Gt => lhs > rhs,
      Self::Ge => lhs >= rhs,
    }
  }
}

/// A linear combination `sum(coeff * var) + constant`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinExpr<V> {
  pub terms: Vec<(i64, V)>,
  pub constant: i64,
}

impl<V> LinExpr<V> {
  #[must_use]
  pub fn new() -> Self {
    Self {
      terms: Vec::new(),
      constant: 0,
    }
  }

  #[must_use]
  pub fn constant(c: i64) -> Self {
    Self {
      terms: Vec::new(),
      constant: c,
    }
  }

  #[must_use]
  pub fn term(coeff: i64, var: V) -> Self {
    Self {
      terms: vec![(coeff, var)],
      constant: 0,
    }
  }

  pub fn push(&mut self, coeff: i64, var: V) {
    self.terms.push((coeff, var));
  }

  pub fn add_constant(&mut self, c: i64) {
    self.constant = self.constant.saturating_add(c);
  }

  /// `Some` when no variables are referenced.
  #[must_use]
  pub fn as_constant(&self) -> Option<i64> {
    self.terms.is_empty().then_some(self.constant)
  }
}

impl<V> Default for LinExpr<V> {
  fn default() -> Self {
    Self::new()
  }
}

/// A literal over a boolean variable: the variable itself (`value: true`)
/// or its negation. Used as the enforcement side of a half-reified
/// constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoolLit<V> {
  pub var: V,
  pub value: bool,
}

impl<V> BoolLit<V> {
  pub fn if_true(var: V) -> Self {
    Self { var, value: true }
  }

  pub fn if_false(var: V) -> Self {
    Self { var, value: false }
  }
}

/// The constraint primitives a finite-domain solver accepts.
pub trait Backend {
  /// The solver's variable handle.
  type Var: Copy + Eq + Debug;

  fn new_int_var(&mut self, domain: Domain, name: &str) -> Self::Var;

  fn new_bool_var(&mut self, name: &str) -> Self::Var;

  /// A variable fixed to `value`, for positions that require a handle.
  fn new_constant(&mut self, value: i64) -> Self::Var;

  /// Posts `expr cmp rhs`, optionally only enforced when `enforce_if`
  /// holds.
  fn add_linear(
    &mut self,
    expr: LinExpr<Self::Var>,
    cmp: CmpOp,
    rhs: i64,
    enforce_if: Option<BoolLit<Self::Var>>,
  );

  /// Posts `target == product(factors)`.
  fn add_mul_eq(&mut self, target: Self::Var, factors: &[Self::Var]);

  /// Posts `target == num / den` (truncated division).
  fn add_div_eq(&mut self, target: Self::Var, num: Self::Var, den: Self::Var);

  /// Posts `target == num % den`.
  fn add_mod_eq(&mut self, target: Self::Var, num: Self::Var, den: Self::Var);

  fn add_min_eq(&mut self, target: Self::Var, operands: &[Self::Var]);

  fn add_max_eq(&mut self, target: Self::Var, operands: &[Self::Var]);

  fn add_abs_eq(&mut self, target: Self::Var, operand: Self::Var);

  /// Posts `target == array[index]`.
  fn add_element_eq(
    &mut self,
    target: Self::Var,
    index: Self::Var,
    array: &[Self::Var],
  );
}

/// Variable handle of the [`Recorder`] backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecVar(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordedVarKind {
  Int,
  Bool,
  Constant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedVar {
  pub name: String,
  pub domain: Domain,
  pub kind: RecordedVarKind,
}

/// One posted constraint, stored exactly as received.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
  Linear {
    expr: LinExpr<RecVar>,
    cmp: CmpOp,
    rhs: i64,
    enforce_if: Option<BoolLit<RecVar>>,
  },
  MulEq {
    target: RecVar,
    factors: Vec<RecVar>,
  },
  DivEq {
    target: RecVar,
    num: RecVar,
    den: RecVar,
  },
  ModEq {
    target: RecVar,
    num: RecVar,
    den: RecVar,
  },
  MinEq {
    target: RecVar,
    operands: Vec<RecVar>,
  },
  MaxEq {
    target: RecVar,
    operands: Vec<RecVar>,
  },
  AbsEq {
    target: RecVar,
    operand: RecVar,
  },
  ElementEq {
    target: RecVar,
    index: RecVar,
    array: Vec<RecVar>,
  },
}

/// A backend that records every call instead of solving.
#[derive(Debug, Default)]
pub struct Recorder {
  vars: Vec<RecordedVar>,
  constraints: Vec<Recorded>,
}

impl Recorder {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  #[must_use]
  pub fn vars(&self) -> &[RecordedVar] {
    &self.vars
  }

  #[must_use]
  pub fn constraints(&self) -> &[Recorded] {
    &self.constraints
  }

  #[must_use]
  pub fn var(&self, v: RecVar) -> &RecordedVar {
    &self.vars[v.0 as usize]
  }

  fn count_kind(&self, kind: RecordedVarKind) -> usize {
    self.vars.iter().filter(|v| v.kind == kind).count()
  }

  #[must_use]
  pub fn num_int_vars(&self) -> usize {
    self.count_kind(RecordedVarKind::Int)
  }

  #[must_use]
  pub fn num_bool_vars(&self) -> usize {
    self.count_kind(RecordedVarKind::Bool)
  }

  #[must_use]
  pub fn num_constants(&self) -> usize {
    self.count_kind(RecordedVarKind::Constant)
  }

  fn push_var(
    &mut self,
    name: String,
    domain: Domain,
    kind: RecordedVarKind,
  ) -> RecVar {
    let id = RecVar(self.vars.len() as u32);
    log::trace!("new {kind:?} var {name} {domain}");
    self.vars.push(RecordedVar { name, domain, kind });
    id
  }
}

impl Backend for Recorder {
  type Var = RecVar;

  fn new_int_var(&mut self, domain: Domain, name: &str) -> RecVar {
    self.push_var(name.to_owned(), domain, RecordedVarKind::Int)
  }

  fn new_bool_var(&mut self, name: &str) -> RecVar {
    self.push_var(name.to_owned(), Domain::BOOL, RecordedVarKind::Bool)
  }

  fn new_constant(&mut self, value: i64) -> RecVar {
    self.push_var(
      value.to_string(),
      Domain::singleton(value),
      RecordedVarKind::Constant,
    )
  }

  fn add_linear(
    &mut self,
    expr: LinExpr<RecVar>,
    cmp: CmpOp,
    rhs: i64,
    enforce_if: Option<BoolLit<RecVar>>,
  ) {
    self.constraints.push(Recorded::Linear {
      expr,
      cmp,
      rhs,
      enforce_if,
    });
  }

  fn add_mul_eq(&mut self, target: RecVar, factors: &[RecVar]) {
    self.constraints.push(Recorded::MulEq {
      target,
      factors: factors.to_vec(),
    });
  }

  fn add_div_eq(&mut self, target: RecVar, num: RecVar, den: RecVar) {
    self.constraints.push(Recorded::DivEq { target, num, den });
  }

  fn add_mod_eq(&mut self, target: RecVar, num: RecVar, den: RecVar) {
    self.constraints.push(Recorded::ModEq { target, num, den });
  }

  fn add_min_eq(&mut self, target: RecVar, operands: &[RecVar]) {
    self.constraints.push(Recorded::MinEq {
      target,
      operands: operands.to_vec(),
    });
  }

  fn add_max_eq(&mut self, target: RecVar, operands: &[RecVar]) {
    self.constraints.push(Recorded::MaxEq {
      target,
      operands: operands.to_vec(),
    });
  }

  fn add_abs_eq(&mut self, target: RecVar, operand: RecVar) {
    self.constraints.push(Recorded::AbsEq { target, operand });
  }

  fn add_element_eq(
    &mut self,
    target: RecVar,
    index: RecVar,
    array: &[RecVar],
  ) {
    self.constraints.push(Recorded::ElementEq {
      target,
      index,
      array: array.to_vec(),
    });
  }
}
