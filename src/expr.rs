//! The symbolic expression tree shared by the evaluator, the optimizers, and
//! the compiler.
//!
//! Trees are immutable and reference-counted: every child is an [`ExprRef`]
//! (an [`Arc<Expr>`]), so subtrees can be shared freely and identity of a
//! shared node is observable through its pointer. The compiler relies on that
//! to lower a shared subtree exactly once.

use std::{
  fmt::{self, Debug, Display, Formatter},
  sync::Arc,
};

/// A shared, immutable expression tree.
pub type ExprRef = Arc<Expr>;

/// Identifies a decision variable declared by the caller.
///
/// The expression layer never allocates these; they are handles into whatever
/// registry the caller keeps. The compiler resolves them through a
/// [`VarTable`](crate::compile::VarTable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

impl Display for VarId {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "v{}", self.0)
  }
}

/// The declared type of a decision variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum VarKind {
  Int,
  Bool,
  Float,
  List,
  Set,
}

impl VarKind {
  /// One-letter prefix used when printing variables.
  #[must_use]
  pub fn prefix(self) -> char {
    match self {
      Self::Int => 'x',
      Self::Bool => 'b',
      Self::Float => 'f',
      Self::List => 'l',
      Self::Set => 's',
    }
  }
}

/// An opaque element-wise function carried by the aggregate forms and by
/// keyed [`Sort`](Expr::Sort).
///
/// Two transforms compare equal only if they are the same allocation; there
/// is no structural equality on closures. Cloning is cheap and preserves
/// identity.
#[derive(Clone)]
pub struct Transform(Arc<dyn Fn(ExprRef) -> ExprRef + Send + Sync>);

impl Transform {
  pub fn new(f: impl Fn(ExprRef) -> ExprRef + Send + Sync + 'static) -> Self {
    Self(Arc::new(f))
  }

  /// Applies the transform to one element of a collection.
  #[must_use]
  pub fn apply(&self, element: ExprRef) -> ExprRef {
    (self.0)(element)
  }

  /// Address of the underlying closure, used as its identity.
  pub(crate) fn addr(&self) -> *const () {
    Arc::as_ptr(&self.0) as *const ()
  }
}

impl PartialEq for Transform {
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.0, &other.0)
  }
}

impl Debug for Transform {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "<fn@{:p}>", self.addr())
  }
}

/// A node of the expression tree.
///
/// Numeric leaves are 64-bit; booleans are integers restricted to `{0, 1}`
/// and any nonzero integer is truthy where a condition is expected.
/// Variadic operations (`Sum`, `Prod`, `And`, `Or`, `Xor`, `Min`, `Max`, the
/// set operations) take any number of operands.
#[derive(Debug, Clone, PartialEq, strum::EnumCount)]
pub enum Expr {
  // Leaves.
  Int(i64),
  Float(f64),
  Var(VarId, VarKind),
  /// A literal array of integers, indexable by [`Index`](Self::Index).
  IntArray(Vec<i64>),
  /// A literal two-dimensional array, indexable by [`Index2`](Self::Index2).
  /// Rows may have different lengths.
  IntArray2(Vec<Vec<i64>>),
  /// A list of arbitrary subexpressions, usable as an aggregate collection.
  List(Vec<ExprRef>),

  // Arithmetic.
  Sum(Vec<ExprRef>),
  Sub(ExprRef, ExprRef),
  Prod(Vec<ExprRef>),
  Div(ExprRef, ExprRef),
  Mod(ExprRef, ExprRef),
  Neg(ExprRef),

  // Comparisons, yielding 0 or 1.
  Eq(ExprRef, ExprRef),
  Ne(ExprRef, ExprRef),
  Lt(ExprRef, ExprRef),
  Le(ExprRef, ExprRef),
  Gt(ExprRef, ExprRef),
  Ge(ExprRef, ExprRef),

  // Boolean connectives over truthy integers.
  And(Vec<ExprRef>),
  Or(Vec<ExprRef>),
  Xor(Vec<ExprRef>),
  Not(ExprRef),
  /// `If(cond, then, else)`; the branches may be any type.
  If(ExprRef, ExprRef, ExprRef),

  // Collection access and queries.
  Index(ExprRef, ExprRef),
  Index2(ExprRef, ExprRef, ExprRef),
  /// Number of occurrences of a value in a collection.
  Count(ExprRef, ExprRef),
  Contains(ExprRef, ExprRef),
  /// First element equal to the needle; evaluation fails if absent.
  Find(ExprRef, ExprRef),
  /// Position of the first occurrence, or `-1` if absent.
  IndexOf(ExprRef, ExprRef),
  SetIntersect(Vec<ExprRef>),
  SetUnion(Vec<ExprRef>),
  /// Ascending sort of a collection, optionally by a key function.
  Sort(ExprRef, Option<Transform>),

  // Variadic extrema.
  Min(Vec<ExprRef>),
  Max(Vec<ExprRef>),

  // Aggregates over a collection, applying a transform per element.
  SumOver(ExprRef, Transform),
  ProdOver(ExprRef, Transform),
  MinOver(ExprRef, Transform),
  MaxOver(ExprRef, Transform),
  ForAll(ExprRef, Transform),
  Exists(ExprRef, Transform),

  // Math functions.
  Abs(ExprRef),
  Sqrt(ExprRef),
  Exp(ExprRef),
  Ln(ExprRef),
  /// `Log(base, x)`.
  Log(ExprRef, ExprRef),
  /// `Pow(base, exponent)`.
  Pow(ExprRef, ExprRef),

  /// Membership of an integer expression in an explicit value set.
  InDomain(ExprRef, Vec<i64>),

  /// The number of true conditions; produced by the optimizer from sums of
  /// `If(cond, 1, 0)` and lowered to a single linear constraint.
  BoolCount(Vec<ExprRef>),
  /// A sum of `cond * value` pairs; produced by the optimizer from sums of
  /// `If(cond, value, 0)`.
  IndicatorSum(Vec<(ExprRef, ExprRef)>),
}

impl Expr {
  /// A short, stable name for the node's shape, used in diagnostics.
  #[must_use]
  pub fn shape_name(&self) -> &'static str {
    match self {
      Self::Int(_) => "int",
      Self::Float(_) => "float",
      Self::Var(..) => "var",
      Self::IntArray(_) => "array",
      Self::IntArray2(_) => "array2",
      Self::List(_) => "list",
      Self::Sum(_) => "sum",
      Self::Sub(..) => "sub",
      Self::Prod(_) => "prod",
      Self::Div(..) => "div",
      Self::Mod(..) => "mod",
      Self::Neg(_) => "neg",
      Self::Eq(..) => "eq",
      Self::Ne(..) => "ne",
      Self::Lt(..) => "lt",
      Self::Le(..) => "le",
      Self::Gt(..) => "gt",
      Self::Ge(..) => "ge",
      Self::And(_) => "and",
      Self::Or(_) => "or",
      Self::Xor(_) => "xor",
      Self::Not(_) => "not",
      Self::If(..) => "if",
      Self::Index(..) => "index",
      Self::Index2(..) => "index2",
      Self::Count(..) => "count",
      Self::Contains(..) => "contains",
      Self::Find(..) => "find",
      Self::IndexOf(..) => "index_of",
      Self::SetIntersect(_) => "set_intersect",
      Self::SetUnion(_) => "set_union",
      Self::Sort(..) => "sort",
      Self::Min(_) => "min",
      Self::Max(_) => "max",
      Self::SumOver(..) => "sum_over",
      Self::ProdOver(..) => "prod_over",
      Self::MinOver(..) => "min_over",
      Self::MaxOver(..) => "max_over",
      Self::ForAll(..) => "for_all",
      Self::Exists(..) => "exists",
      Self::Abs(_) => "abs",
      Self::Sqrt(_) => "sqrt",
      Self::Exp(_) => "exp",
      Self::Ln(_) => "ln",
      Self::Log(..) => "log",
      Self::Pow(..) => "pow",
      Self::InDomain(..) => "in_domain",
      Self::BoolCount(_) => "bool_count",
      Self::IndicatorSum(_) => "indicator_sum",
    }
  }

  /// Rebuilds this node with every direct child replaced by `f(child)`.
  /// Leaves are cloned unchanged.
  #[must_use]
  pub fn map_children(&self, mut f: impl FnMut(&ExprRef) -> ExprRef) -> Self {
    match self {
      Self::Int(_)
      | Self::Float(_)
      | Self::Var(..)
      | Self::IntArray(_)
      | Self::IntArray2(_) => self.clone(),
      Self::List(xs) => Self::List(xs.iter().map(&mut f).collect()),
      Self::Sum(xs) => Self::Sum(xs.iter().map(&mut f).collect()),
      Self::Sub(a, b) => Self::Sub(f(a), f(b)),
      Self::Prod(xs) => Self::Prod(xs.iter().map(&mut f).collect()),
      Self::Div(a, b) => Self::Div(f(a), f(b)),
      Self::Mod(a, b) => Self::Mod(f(a), f(b)),
      Self::Neg(a) => Self::Neg(f(a)),
      Self::Eq(a, b) => Self::Eq(f(a), f(b)),
      Self::Ne(a, b) => Self::Ne(f(a), f(b)),
      Self::Lt(a, b) => Self::Lt(f(a), f(b)),
      Self::Le(a, b) => Self::Le(f(a), f(b)),
      Self::Gt(a, b) => Self::Gt(f(a), f(b)),
      Self::Ge(a, b) => Self::Ge(f(a), f(b)),
      Self::And(xs) => Self::And(xs.iter().map(&mut f).collect()),
      Self::Or(xs) => Self::Or(xs.iter().map(&mut f).collect()),
      Self::Xor(xs) => Self::Xor(xs.iter().map(&mut f).collect()),
      Self::Not(a) => Self::Not(f(a)),
      Self::If(c, t, e) => Self::If(f(c), f(t), f(e)),
      Self::Index(a, i) => Self::Index(f(a), f(i)),
      Self::Index2(a, i, j) => Self::Index2(f(a), f(i), f(j)),
      Self::Count(c, x) => Self::Count(f(c), f(x)),
      Self::Contains(c, x) => Self::Contains(f(c), f(x)),
      Self::Find(c, x) => Self::Find(f(c), f(x)),
      Self::IndexOf(c, x) => Self::IndexOf(f(c), f(x)),
      Self::SetIntersect(xs) => {
        Self::SetIntersect(xs.iter().map(&mut f).collect())
      }
      Self::SetUnion(xs) => Self::SetUnion(xs.iter().map(&mut f).collect()),
      Self::Sort(c, key) => Self::Sort(f(c), key.clone()),
      Self::Min(xs) => Self::Min(xs.iter().map(&mut f).collect()),
      Self::Max(xs) => Self::Max(xs.iter().map(&mut f).collect()),
      Self::SumOver(c, t) => Self::SumOver(f(c), t.clone()),
      Self::ProdOver(c, t) => Self::ProdOver(f(c), t.clone()),
      Self::MinOver(c, t) => Self::MinOver(f(c), t.clone()),
      Self::MaxOver(c, t) => Self::MaxOver(f(c), t.clone()),
      Self::ForAll(c, t) => Self::ForAll(f(c), t.clone()),
      Self::Exists(c, t) => Self::Exists(f(c), t.clone()),
      Self::Abs(a) => Self::Abs(f(a)),
      Self::Sqrt(a) => Self::Sqrt(f(a)),
      Self::Exp(a) => Self::Exp(f(a)),
      Self::Ln(a) => Self::Ln(f(a)),
      Self::Log(a, b) => Self::Log(f(a), f(b)),
      Self::Pow(a, b) => Self::Pow(f(a), f(b)),
      Self::InDomain(x, vs) => Self::InDomain(f(x), vs.clone()),
      Self::BoolCount(xs) => Self::BoolCount(xs.iter().map(&mut f).collect()),
      Self::IndicatorSum(ps) => Self::IndicatorSum(
        ps.iter().map(|(c, v)| (f(c), f(v))).collect(),
      ),
    }
  }
}

// Constructors. Every helper returns an `ExprRef` so trees compose without
// explicit `Arc::new` at the call site.
impl Expr {
  #[must_use]
  pub fn int(value: i64) -> ExprRef {
    Arc::new(Self::Int(value))
  }

  #[must_use]
  pub fn float(value: f64) -> ExprRef {
    Arc::new(Self::Float(value))
  }

  #[must_use]
  pub fn var(id: VarId, kind: VarKind) -> ExprRef {
    Arc::new(Self::Var(id, kind))
  }

  #[must_use]
  pub fn int_var(id: u32) -> ExprRef {
    Self::var(VarId(id), VarKind::Int)
  }

  #[must_use]
  pub fn bool_var(id: u32) -> ExprRef {
    Self::var(VarId(id), VarKind::Bool)
  }

  #[must_use]
  pub fn float_var(id: u32) -> ExprRef {
    Self::var(VarId(id), VarKind::Float)
  }

  #[must_use]
  pub fn list_var(id: u32) -> ExprRef {
    Self::var(VarId(id), VarKind::List)
  }

  #[must_use]
  pub fn set_var(id: u32) -> ExprRef {
    Self::var(VarId(id), VarKind::Set)
  }

  #[must_use]
  pub fn int_array(values: Vec<i64>) -> ExprRef {
    Arc::new(Self::IntArray(values))
  }

  #[must_use]
  pub fn int_array2(rows: Vec<Vec<i64>>) -> ExprRef {
    Arc::new(Self::IntArray2(rows))
  }

  #[must_use]
  pub fn list(items: Vec<ExprRef>) -> ExprRef {
    Arc::new(Self::List(items))
  }

  #[must_use]
  pub fn sum(terms: Vec<ExprRef>) -> ExprRef {
    Arc::new(Self::Sum(terms))
  }

  #[must_use]
  pub fn sub(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
    Arc::new(Self::Sub(lhs, rhs))
  }

  #[must_use]
  pub fn prod(factors: Vec<ExprRef>) -> ExprRef {
    Arc::new(Self::Prod(factors))
  }

  #[must_use]
  pub fn div(num: ExprRef, den: ExprRef) -> ExprRef {
    Arc::new(Self::Div(num, den))
  }

  #[must_use]
  pub fn modulo(num: ExprRef, den: ExprRef) -> ExprRef {
    Arc::new(Self::Mod(num, den))
  }

  #[must_use]
  pub fn neg(x: ExprRef) -> ExprRef {
    Arc::new(Self::Neg(x))
  }

  #[must_use]
  pub fn eq(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
    Arc::new(Self::Eq(lhs, rhs))
  }

  #[must_use]
  pub fn ne(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
    Arc::new(Self::Ne(lhs, rhs))
  }

  #[must_use]
  pub fn lt(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
    Arc::new(Self::Lt(lhs, rhs))
  }

  #[must_use]
  pub fn le(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
    Arc::new(Self::Le(lhs, rhs))
  }

  #[must_use]
  pub fn gt(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
    Arc::new(Self::Gt(lhs, rhs))
  }

  #[must_use]
  pub fn ge(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
    Arc::new(Self::Ge(lhs, rhs))
  }

  #[must_use]
  pub fn and(operands: Vec<ExprRef>) -> ExprRef {
    Arc::new(Self::And(operands))
  }

  #[must_use]
  pub fn or(operands: Vec<ExprRef>) -> ExprRef {
    Arc::new(Self::Or(operands))
  }

  #[must_use]
  pub fn xor(operands: Vec<ExprRef>) -> ExprRef {
    Arc::new(Self::Xor(operands))
  }

  #[must_use]
  pub fn not(x: ExprRef) -> ExprRef {
    Arc::new(Self::Not(x))
  }

  /// If-then-else.
  #[must_use]
  pub fn ite(cond: ExprRef, then: ExprRef, otherwise: ExprRef) -> ExprRef {
    Arc::new(Self::If(cond, then, otherwise))
  }

  #[must_use]
  pub fn index(array: ExprRef, i: ExprRef) -> ExprRef {
    Arc::new(Self::Index(array, i))
  }

  #[must_use]
  pub fn index2(array: ExprRef, i: ExprRef, j: ExprRef) -> ExprRef {
    Arc::new(Self::Index2(array, i, j))
  }

  #[must_use]
  pub fn count(collection: ExprRef, needle: ExprRef) -> ExprRef {
    Arc::new(Self::Count(collection, needle))
  }

  #[must_use]
  pub fn contains(collection: ExprRef, needle: ExprRef) -> ExprRef {
    Arc::new(Self::Contains(collection, needle))
  }

  #[must_use]
  pub fn find(collection: ExprRef, needle: ExprRef) -> ExprRef {
    Arc::new(Self::Find(collection, needle))
  }

  #[must_use]
  pub fn index_of(collection: ExprRef, needle: ExprRef) -> ExprRef {
    Arc::new(Self::IndexOf(collection, needle))
  }

  #[must_use]
  pub fn set_intersect(operands: Vec<ExprRef>) -> ExprRef {
    Arc::new(Self::SetIntersect(operands))
  }

  #[must_use]
  pub fn set_union(operands: Vec<ExprRef>) -> ExprRef {
    Arc::new(Self::SetUnion(operands))
  }

  #[must_use]
  pub fn sort(collection: ExprRef) -> ExprRef {
    Arc::new(Self::Sort(collection, None))
  }

  /// Sort by the key produced per element.
  #[must_use]
  pub fn sort_by(
    collection: ExprRef,
    key: impl Fn(ExprRef) -> ExprRef + Send + Sync + 'static,
  ) -> ExprRef {
    Arc::new(Self::Sort(collection, Some(Transform::new(key))))
  }

  #[must_use]
  pub fn min(operands: Vec<ExprRef>) -> ExprRef {
    Arc::new(Self::Min(operands))
  }

  #[must_use]
  pub fn max(operands: Vec<ExprRef>) -> ExprRef {
    Arc::new(Self::Max(operands))
  }

  #[must_use]
  pub fn sum_over(
    collection: ExprRef,
    f: impl Fn(ExprRef) -> ExprRef + Send + Sync + 'static,
  ) -> ExprRef {
    Arc::new(Self::SumOver(collection, Transform::new(f)))
  }

  #[must_use]
  pub fn prod_over(
    collection: ExprRef,
    f: impl Fn(ExprRef) -> ExprRef + Send + Sync + 'static,
  ) -> ExprRef {
    Arc::new(Self::ProdOver(collection, Transform::new(f)))
  }

  #[must_use]
  pub fn min_over(
    collection: ExprRef,
    f: impl Fn(ExprRef) -> ExprRef + Send + Sync + 'static,
  ) -> ExprRef {
    Arc::new(Self::MinOver(collection, Transform::new(f)))
  }

  #[must_use]
  pub fn max_over(
    collection: ExprRef,
    f: impl Fn(ExprRef) -> ExprRef + Send + Sync + 'static,
  ) -> ExprRef {
    Arc::new(Self::MaxOver(collection, Transform::new(f)))
  }

  #[must_use]
  pub fn for_all(
    collection: ExprRef,
    f: impl Fn(ExprRef) -> ExprRef + Send + Sync + 'static,
  ) -> ExprRef {
    Arc::new(Self::ForAll(collection, Transform::new(f)))
  }

  #[must_use]
  pub fn exists(
    collection: ExprRef,
    f: impl Fn(ExprRef) -> ExprRef + Send + Sync + 'static,
  ) -> ExprRef {
    Arc::new(Self::Exists(collection, Transform::new(f)))
  }

  #[must_use]
  pub fn abs(x: ExprRef) -> ExprRef {
    Arc::new(Self::Abs(x))
  }

  #[must_use]
  pub fn sqrt(x: ExprRef) -> ExprRef {
    Arc::new(Self::Sqrt(x))
  }

  #[must_use]
  pub fn exp(x: ExprRef) -> ExprRef {
    Arc::new(Self::Exp(x))
  }

  #[must_use]
  pub fn ln(x: ExprRef) -> ExprRef {
    Arc::new(Self::Ln(x))
  }

  #[must_use]
  pub fn log(base: ExprRef, x: ExprRef) -> ExprRef {
    Arc::new(Self::Log(base, x))
  }

  #[must_use]
  pub fn pow(base: ExprRef, exponent: ExprRef) -> ExprRef {
    Arc::new(Self::Pow(base, exponent))
  }

  #[must_use]
  pub fn in_domain(x: ExprRef, values: Vec<i64>) -> ExprRef {
    Arc::new(Self::InDomain(x, values))
  }

  #[must_use]
  pub fn bool_count(conditions: Vec<ExprRef>) -> ExprRef {
    Arc::new(Self::BoolCount(conditions))
  }

  #[must_use]
  pub fn indicator_sum(pairs: Vec<(ExprRef, ExprRef)>) -> ExprRef {
    Arc::new(Self::IndicatorSum(pairs))
  }
}

fn write_seq(
  f: &mut Formatter<'_>,
  name: &str,
  items: &[ExprRef],
) -> fmt::Result {
  write!(f, "({name}")?;
  for item in items {
    write!(f, " {item}")?;
  }
  write!(f, ")")
}

impl Display for Expr {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    match self {
      Self::Int(v) => write!(f, "{v}"),
      Self::Float(v) => write!(f, "{v:?}"),
      Self::Var(id, kind) => write!(f, "{}{}", kind.prefix(), id.0),
      Self::IntArray(vs) => {
        write!(f, "(array")?;
        for v in vs {
          write!(f, " {v}")?;
        }
        write!(f, ")")
      }
      Self::IntArray2(rows) => {
        write!(f, "(array2")?;
        for row in rows {
          write!(f, " (")?;
          for (i, v) in row.iter().enumerate() {
            if i > 0 {
              write!(f, " ")?;
            }
            write!(f, "{v}")?;
          }
          write!(f, ")")?;
        }
        write!(f, ")")
      }
      Self::List(xs)
      | Self::Sum(xs)
      | Self::Prod(xs)
      | Self::And(xs)
      | Self::Or(xs)
      | Self::Xor(xs)
      | Self::SetIntersect(xs)
      | Self::SetUnion(xs)
      | Self::Min(xs)
      | Self::Max(xs)
      | Self::BoolCount(xs) => write_seq(f, self.shape_name(), xs),
      Self::Sub(a, b)
      | Self::Div(a, b)
      | Self::Mod(a, b)
      | Self::Eq(a, b)
      | Self::Ne(a, b)
      | Self::Lt(a, b)
      | Self::Le(a, b)
      | Self::Gt(a, b)
      | Self::Ge(a, b)
      | Self::Index(a, b)
      | Self::Count(a, b)
      | Self::Contains(a, b)
      | Self::Find(a, b)
      | Self::IndexOf(a, b)
      | Self::Log(a, b)
      | Self::Pow(a, b) => {
        write!(f, "({} {a} {b})", self.shape_name())
      }
      Self::Neg(a)
      | Self::Not(a)
      | Self::Abs(a)
      | Self::Sqrt(a)
      | Self::Exp(a)
      | Self::Ln(a) => write!(f, "({} {a})", self.shape_name()),
      Self::If(c, t, e) => write!(f, "(if {c} {t} {e})"),
      Self::Index2(a, i, j) => write!(f, "(index2 {a} {i} {j})"),
      Self::Sort(c, None) => write!(f, "(sort {c})"),
      Self::Sort(c, Some(_)) => write!(f, "(sort {c} <fn>)"),
      Self::SumOver(c, _)
      | Self::ProdOver(c, _)
      | Self::MinOver(c, _)
      | Self::MaxOver(c, _)
      | Self::ForAll(c, _)
      | Self::Exists(c, _) => {
        write!(f, "({} {c} <fn>)", self.shape_name())
      }
      Self::InDomain(x, vs) => {
        write!(f, "(in_domain {x} {{")?;
        for (i, v) in vs.iter().enumerate() {
          if i > 0 {
            write!(f, " ")?;
          }
          write!(f, "{v}")?;
        }
        write!(f, "}})")
      }
      Self::IndicatorSum(pairs) => {
        write!(f, "(indicator_sum")?;
        for (c, v) in pairs {
          write!(f, " ({c} {v})")?;
        }
        write!(f, ")")
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_is_prefix_form() {
    let e = Expr::sum(vec![
      Expr::int(1),
      Expr::prod(vec![Expr::int_var(0), Expr::int(3)]),
    ]);
    assert_eq!(e.to_string(), "(sum 1 (prod x0 3))");

    let b = Expr::ite(Expr::bool_var(2), Expr::int(1), Expr::int(0));
    assert_eq!(b.to_string(), "(if b2 1 0)");
  }

  #[test]
  fn transforms_compare_by_identity() {
    let t = Transform::new(|e| Expr::neg(e));
    let u = Transform::new(|e| Expr::neg(e));
    assert_eq!(t, t.clone());
    assert_ne!(t, u);
  }

  #[test]
  fn shared_subtrees_keep_their_identity() {
    let shared = Expr::sum(vec![Expr::int_var(0), Expr::int(1)]);
    let tree = Expr::sub(shared.clone(), shared.clone());
    if let Expr::Sub(a, b) = &*tree {
      assert!(Arc::ptr_eq(a, b));
    } else {
      panic!("expected sub");
    }
  }

  #[test]
  fn map_children_rebuilds_one_level() {
    let e = Expr::sum(vec![Expr::int(1), Expr::int(2)]);
    let doubled =
      e.map_children(|c| Expr::prod(vec![Expr::int(2), c.clone()]));
    assert_eq!(
      Arc::new(doubled).to_string(),
      "(sum (prod 2 1) (prod 2 2))"
    );
  }
}
