//! The built-in rewrite rules.
//!
//! Patterns over the variadic operations are written with exactly two
//! operands and therefore only match two-operand e-nodes; wider sums and
//! products are flattened and folded by the syntactic pass before a tree
//! reaches saturation, so the binary forms are the ones that matter here.

use super::{EOp, Pattern, Rewrite};

fn v(name: &'static str) -> Pattern {
  Pattern::var(name)
}

fn n(op: EOp, children: Vec<Pattern>) -> Pattern {
  Pattern::node(op, children)
}

/// Algebraic and boolean identities that are sound for every binding.
#[must_use]
pub fn standard_rules() -> Vec<Rewrite> {
  vec![
    Rewrite::new(
      "add-comm",
      n(EOp::Sum, vec![v("a"), v("b")]),
      n(EOp::Sum, vec![v("b"), v("a")]),
    ),
    Rewrite::new("add-zero", n(EOp::Sum, vec![v("a"), Pattern::lit(0)]), v("a")),
    Rewrite::new(
      "mul-comm",
      n(EOp::Prod, vec![v("a"), v("b")]),
      n(EOp::Prod, vec![v("b"), v("a")]),
    ),
    Rewrite::new("mul-one", n(EOp::Prod, vec![v("a"), Pattern::lit(1)]), v("a")),
    Rewrite::new(
      "mul-zero",
      n(EOp::Prod, vec![v("a"), Pattern::lit(0)]),
      Pattern::lit(0),
    ),
    Rewrite::new("sub-zero", n(EOp::Sub, vec![v("a"), Pattern::lit(0)]), v("a")),
    Rewrite::new(
      "sub-self",
      n(EOp::Sub, vec![v("a"), v("a")]),
      Pattern::lit(0),
    ),
    Rewrite::new("neg-neg", n(EOp::Neg, vec![n(EOp::Neg, vec![v("a")])]), v("a")),
    Rewrite::new("not-not", n(EOp::Not, vec![n(EOp::Not, vec![v("a")])]), v("a")),
    Rewrite::new("and-idem", n(EOp::And, vec![v("a"), v("a")]), v("a")),
    Rewrite::new("or-idem", n(EOp::Or, vec![v("a"), v("a")]), v("a")),
    Rewrite::new("min-idem", n(EOp::Min, vec![v("a"), v("a")]), v("a")),
    Rewrite::new("max-idem", n(EOp::Max, vec![v("a"), v("a")]), v("a")),
    Rewrite::new(
      "if-same",
      n(EOp::If, vec![v("c"), v("a"), v("a")]),
      v("a"),
    ),
    Rewrite::new("eq-refl", n(EOp::Eq, vec![v("a"), v("a")]), Pattern::lit(1)),
    Rewrite::new(
      "ne-irrefl",
      n(EOp::Ne, vec![v("a"), v("a")]),
      Pattern::lit(0),
    ),
    Rewrite::new("le-refl", n(EOp::Le, vec![v("a"), v("a")]), Pattern::lit(1)),
    Rewrite::new("ge-refl", n(EOp::Ge, vec![v("a"), v("a")]), Pattern::lit(1)),
    Rewrite::new(
      "lt-irrefl",
      n(EOp::Lt, vec![v("a"), v("a")]),
      Pattern::lit(0),
    ),
    Rewrite::new(
      "gt-irrefl",
      n(EOp::Gt, vec![v("a"), v("a")]),
      Pattern::lit(0),
    ),
  ]
}

#[cfg(test)]
mod tests {
  use super::*;
  use itertools::Itertools;

  #[test]
  fn rule_names_are_unique() {
    let rules = standard_rules();
    let unique = rules.iter().map(Rewrite::name).unique().count();
    assert_eq!(unique, rules.len());
  }
}
