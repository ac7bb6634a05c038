//! Closed integer intervals.
//!
//! The compiler gives every auxiliary variable a finite domain inferred
//! from its operands. The arithmetic here is deliberately conservative:
//! results saturate at the `i64` range instead of overflowing, so an
//! inferred domain always contains every value the lowered expression can
//! take.

use std::fmt::{self, Display, Formatter};

/// A closed interval `[min, max]` of 64-bit integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Domain {
  pub min: i64,
  pub max: i64,
}

fn magnitude(v: i64) -> i64 {
  // |i64::MIN| does not fit; clamp to the saturated maximum.
  i64::try_from(v.unsigned_abs()).unwrap_or(i64::MAX)
}

impl Domain {
  /// The domain of a truth value.
  pub const BOOL: Self = Self { min: 0, max: 1 };

  /// # Panics
  ///
  /// Panics if `min > max`.
  #[must_use]
  pub fn new(min: i64, max: i64) -> Self {
    assert!(min <= max, "empty domain [{min}, {max}]");
    Self { min, max }
  }

  #[must_use]
  pub fn singleton(v: i64) -> Self {
    Self { min: v, max: v }
  }

  #[must_use]
  pub fn contains(self, v: i64) -> bool {
    self.min <= v && v <= self.max
  }

  #[must_use]
  pub fn as_singleton(self) -> Option<i64> {
    (self.min == self.max).then_some(self.min)
  }

  /// Smallest interval containing both operands.
  #[must_use]
  pub fn hull(self, other: Self) -> Self {
    Self {
      min: self.min.min(other.min),
      max: self.max.max(other.max),
    }
  }

  #[must_use]
  pub fn add(self, other: Self) -> Self {
    Self {
      min: self.min.saturating_add(other.min),
      max: self.max.saturating_add(other.max),
    }
  }

  #[must_use]
  pub fn sub(self, other: Self) -> Self {
    Self {
      min: self.min.saturating_sub(other.max),
      max: self.max.saturating_sub(other.min),
    }
  }

  #[must_use]
  pub fn neg(self) -> Self {
    Self {
      min: self.max.saturating_neg(),
      max: self.min.saturating_neg(),
    }
  }

  #[must_use]
  pub fn mul(self, other: Self) -> Self {
    let corners = [
      self.min.saturating_mul(other.min),
      self.min.saturating_mul(other.max),
      self.max.saturating_mul(other.min),
      self.max.saturating_mul(other.max),
    ];
    Self {
      min: corners.iter().copied().min().unwrap_or(0),
      max: corners.iter().copied().max().unwrap_or(0),
    }
  }

  #[must_use]
  pub fn scale(self, k: i64) -> Self {
    self.mul(Self::singleton(k))
  }

  #[must_use]
  pub fn abs(self) -> Self {
    if self.min >= 0 {
      self
    } else if self.max <= 0 {
      self.neg()
    } else {
      Self {
        min: 0,
        max: magnitude(self.min).max(magnitude(self.max)),
      }
    }
  }

  /// Bound for a quotient with this numerator: with any divisor of
  /// magnitude at least one, the quotient's magnitude never exceeds the
  /// numerator's.
  #[must_use]
  pub fn quotient_bound(self) -> Self {
    let m = magnitude(self.min).max(magnitude(self.max));
    Self { min: -m, max: m }
  }

  /// Bound for a remainder with this divisor: the remainder's magnitude
  /// stays strictly below the divisor's.
  #[must_use]
  pub fn remainder_bound(self) -> Self {
    let m = magnitude(self.min).max(magnitude(self.max));
    let b = (m - 1).max(0);
    Self { min: -b, max: b }
  }

  /// Interval of the pointwise minimum of the operands, or `None` when
  /// there are none.
  #[must_use]
  pub fn min_of(domains: &[Self]) -> Option<Self> {
    domains.iter().copied().reduce(|a, b| Self {
      min: a.min.min(b.min),
      max: a.max.min(b.max),
    })
  }

  /// Interval of the pointwise maximum of the operands.
  #[must_use]
  pub fn max_of(domains: &[Self]) -> Option<Self> {
    domains.iter().copied().reduce(|a, b| Self {
      min: a.min.max(b.min),
      max: a.max.max(b.max),
    })
  }
}

impl Display for Domain {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "[{}, {}]", self.min, self.max)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn interval_arithmetic() {
    let a = Domain::new(-2, 3);
    let b = Domain::new(1, 4);
    assert_eq!(a.add(b), Domain::new(-1, 7));
    assert_eq!(a.sub(b), Domain::new(-6, 2));
    assert_eq!(a.neg(), Domain::new(-3, 2));
    assert_eq!(a.mul(b), Domain::new(-8, 12));
    assert_eq!(a.scale(-2), Domain::new(-6, 4));
    assert_eq!(a.hull(b), Domain::new(-2, 4));
  }

  #[test]
  fn saturation_instead_of_overflow() {
    let big = Domain::new(i64::MIN, i64::MAX);
    assert_eq!(big.add(big), big);
    assert_eq!(big.mul(Domain::new(2, 2)), big);
    assert_eq!(big.abs(), Domain::new(0, i64::MAX));
  }

  #[test]
  fn quotient_and_remainder_bounds() {
    assert_eq!(Domain::new(-7, 3).quotient_bound(), Domain::new(-7, 7));
    assert_eq!(Domain::new(2, 5).remainder_bound(), Domain::new(-4, 4));
    assert_eq!(
      Domain::singleton(0).remainder_bound(),
      Domain::singleton(0)
    );
  }

  #[test]
  fn pointwise_extrema() {
    let ds = [Domain::new(0, 10), Domain::new(-5, 3)];
    assert_eq!(Domain::min_of(&ds), Some(Domain::new(-5, 3)));
    assert_eq!(Domain::max_of(&ds), Some(Domain::new(0, 10)));
    assert_eq!(Domain::min_of(&[]), None);
  }

  #[test]
  fn mixed_sign_abs() {
    assert_eq!(Domain::new(-7, 3).abs(), Domain::new(0, 7));
    assert_eq!(Domain::new(-7, -3).abs(), Domain::new(3, 7));
    assert_eq!(Domain::new(3, 7).abs(), Domain::new(3, 7));
  }
}
