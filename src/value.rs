//! Runtime values produced by evaluation.
//!
//! The value universe is deliberately small: 64-bit integers and floats,
//! plus integer lists and sets for the collection operations. Booleans are
//! integers restricted to `{0, 1}`.

use crate::eval::EvalError;
use std::{
  cmp::Ordering,
  collections::BTreeSet,
  fmt::{self, Display, Formatter},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Int(i64),
  Float(f64),
  List(Vec<i64>),
  /// An ordered integer set; iteration is always ascending.
  Set(BTreeSet<i64>),
}

impl Value {
  #[must_use]
  pub fn type_name(&self) -> &'static str {
    match self {
      Self::Int(_) => "int",
      Self::Float(_) => "float",
      Self::List(_) => "list",
      Self::Set(_) => "set",
    }
  }

  /// Boolean view: any nonzero integer is true.
  ///
  /// # Errors
  ///
  /// Fails with a type mismatch if the value is not an integer.
  pub fn truthy(&self) -> Result<bool, EvalError> {
    match self {
      Self::Int(v) => Ok(*v != 0),
      other => Err(EvalError::TypeMismatch {
        expected: "int",
        found: other.type_name(),
      }),
    }
  }

  /// # Errors
  ///
  /// Fails with a type mismatch if the value is not an integer.
  pub fn as_int(&self) -> Result<i64, EvalError> {
    match self {
      Self::Int(v) => Ok(*v),
      other => Err(EvalError::TypeMismatch {
        expected: "int",
        found: other.type_name(),
      }),
    }
  }

  /// Numeric view, widening integers to floats.
  ///
  /// # Errors
  ///
  /// Fails with a type mismatch if the value is not numeric.
  pub fn as_float(&self) -> Result<f64, EvalError> {
    match self {
      Self::Int(v) => Ok(*v as f64),
      Self::Float(v) => Ok(*v),
      other => Err(EvalError::TypeMismatch {
        expected: "number",
        found: other.type_name(),
      }),
    }
  }

  /// The elements of a collection; sets yield ascending order.
  ///
  /// # Errors
  ///
  /// Fails with a type mismatch if the value is not a list or a set.
  pub fn elements(&self) -> Result<Vec<i64>, EvalError> {
    match self {
      Self::List(vs) => Ok(vs.clone()),
      Self::Set(vs) => Ok(vs.iter().copied().collect()),
      other => Err(EvalError::TypeMismatch {
        expected: "collection",
        found: other.type_name(),
      }),
    }
  }

  /// # Errors
  ///
  /// Fails with a type mismatch if the value is not a list. Sets are not
  /// positionally indexable.
  pub fn as_list(&self) -> Result<&[i64], EvalError> {
    match self {
      Self::List(vs) => Ok(vs),
      other => Err(EvalError::TypeMismatch {
        expected: "list",
        found: other.type_name(),
      }),
    }
  }

  #[must_use]
  pub fn is_numeric(&self) -> bool {
    matches!(self, Self::Int(_) | Self::Float(_))
  }
}

impl Display for Value {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    match self {
      Self::Int(v) => write!(f, "{v}"),
      Self::Float(v) => write!(f, "{v:?}"),
      Self::List(vs) => write!(f, "{vs:?}"),
      Self::Set(vs) => {
        write!(f, "{{")?;
        for (i, v) in vs.iter().enumerate() {
          if i > 0 {
            write!(f, ", ")?;
          }
          write!(f, "{v}")?;
        }
        write!(f, "}}")
      }
    }
  }
}

/// A pair of numeric operands after promotion: integer arithmetic stays
/// exact, and mixing an integer with a float widens both to floats.
pub(crate) enum NumPair {
  Ints(i64, i64),
  Floats(f64, f64),
}

pub(crate) fn promote(a: &Value, b: &Value) -> Result<NumPair, EvalError> {
  match (a, b) {
    (Value::Int(x), Value::Int(y)) => Ok(NumPair::Ints(*x, *y)),
    _ => Ok(NumPair::Floats(a.as_float()?, b.as_float()?)),
  }
}

/// Total order on numeric values. Floats use IEEE total ordering, so the
/// comparison never fails on NaN.
pub(crate) fn num_cmp(a: &Value, b: &Value) -> Result<Ordering, EvalError> {
  match promote(a, b)? {
    NumPair::Ints(x, y) => Ok(x.cmp(&y)),
    NumPair::Floats(x, y) => Ok(x.total_cmp(&y)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn truthiness_is_nonzero_int() {
    assert!(Value::Int(2).truthy().unwrap());
    assert!(Value::Int(-1).truthy().unwrap());
    assert!(!Value::Int(0).truthy().unwrap());
    assert!(Value::Float(1.0).truthy().is_err());
  }

  #[test]
  fn promotion_widens_mixed_operands() {
    match promote(&Value::Int(3), &Value::Float(0.5)).unwrap() {
      NumPair::Floats(x, y) => {
        assert_eq!(x, 3.0);
        assert_eq!(y, 0.5);
      }
      NumPair::Ints(..) => panic!("expected float promotion"),
    }
    match promote(&Value::Int(3), &Value::Int(4)).unwrap() {
      NumPair::Ints(x, y) => assert_eq!((x, y), (3, 4)),
      NumPair::Floats(..) => panic!("ints must stay exact"),
    }
  }

  #[test]
  fn set_elements_are_ascending() {
    let set = Value::Set([3, 1, 2].into_iter().collect());
    assert_eq!(set.elements().unwrap(), vec![1, 2, 3]);
    assert_eq!(set.to_string(), "{1, 2, 3}");
  }

  #[test]
  fn numeric_ordering_spans_types() {
    assert_eq!(
      num_cmp(&Value::Int(1), &Value::Float(1.5)).unwrap(),
      Ordering::Less
    );
    assert_eq!(
      num_cmp(&Value::Int(2), &Value::Int(2)).unwrap(),
      Ordering::Equal
    );
    assert!(num_cmp(&Value::List(vec![]), &Value::Int(0)).is_err());
  }
}
