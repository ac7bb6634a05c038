//! Cost models for extraction

use crate::egraph::EOp;

/// Cost assigned to operations the backend cannot lower. High enough that
/// any lowerable alternative wins, while still letting a tree containing
/// such an operation be extracted when nothing better exists.
const NOT_LOWERABLE: usize = 1000;

/// Assigns a cost to choosing an e-node, given the best costs already
/// computed for its children.
pub trait CostModel {
  fn op_cost(&self, op: &EOp, child_costs: &[usize]) -> usize;
}

/// Plain tree size: every node costs one.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeSize;

impl CostModel for TreeSize {
  fn op_cost(&self, _op: &EOp, child_costs: &[usize]) -> usize {
    sum(child_costs).saturating_add(1)
  }
}

/// Approximates what lowering a node costs a finite-domain backend: the
/// rough number of auxiliary variables, reified booleans, and constraints
/// the compiler allocates for it. Reified comparisons and conditionals are
/// expensive; linear arithmetic is nearly free.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendCost;

impl CostModel for BackendCost {
  fn op_cost(&self, op: &EOp, child_costs: &[usize]) -> usize {
    let own = match op {
      EOp::Int(_)
      | EOp::Float(_)
      | EOp::Var(..)
      | EOp::IntArray(_)
      | EOp::IntArray2(_)
      | EOp::List => 1,
      // One linear constraint and one auxiliary variable.
      EOp::Sum | EOp::Sub | EOp::Neg | EOp::BoolCount => 2,
      // One product channel per pair on top of the linear sum.
      EOp::IndicatorSum => 4,
      EOp::Min | EOp::Max | EOp::Abs | EOp::Prod => 6,
      EOp::Div | EOp::Mod | EOp::Index | EOp::Index2 => 8,
      // A fresh boolean plus a reified pair of half-constraints.
      EOp::Eq
      | EOp::Ne
      | EOp::Lt
      | EOp::Le
      | EOp::Gt
      | EOp::Ge
      | EOp::And
      | EOp::Or
      | EOp::Xor
      | EOp::Not => 10,
      EOp::If => 14,
      EOp::InDomain(values) => 10_usize.saturating_add(4 * values.len()),
      EOp::Sort(_)
      | EOp::Count
      | EOp::Contains
      | EOp::Find
      | EOp::IndexOf
      | EOp::SetIntersect
      | EOp::SetUnion
      | EOp::SumOver(_)
      | EOp::ProdOver(_)
      | EOp::MinOver(_)
      | EOp::MaxOver(_)
      | EOp::ForAll(_)
      | EOp::Exists(_)
      | EOp::Sqrt
      | EOp::Exp
      | EOp::Ln
      | EOp::Log
      | EOp::Pow => NOT_LOWERABLE,
    };
    sum(child_costs).saturating_add(own)
  }
}

fn sum(costs: &[usize]) -> usize {
  costs.iter().fold(0_usize, |a, &c| a.saturating_add(c))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tree_size_counts_nodes() {
    let m = TreeSize;
    assert_eq!(m.op_cost(&EOp::Int(4), &[]), 1);
    assert_eq!(m.op_cost(&EOp::Sum, &[1, 3]), 5);
  }

  #[test]
  fn lowering_cost_prefers_fused_counting() {
    let m = BackendCost;
    // Counting a condition through BoolCount adds 2 in total, while the
    // equivalent If(cond, 1, 0) inside a sum pays for the conditional and
    // two literals on top of the sum itself.
    let cond = 10;
    let fused = m.op_cost(&EOp::BoolCount, &[cond]);
    let one = m.op_cost(&EOp::Int(1), &[]);
    let zero = m.op_cost(&EOp::Int(0), &[]);
    let branchy = m.op_cost(&EOp::If, &[cond, one, zero]);
    assert!(fused < m.op_cost(&EOp::Sum, &[branchy]));
  }

  #[test]
  fn unlowerable_operations_dominate() {
    let m = BackendCost;
    assert!(m.op_cost(&EOp::Sqrt, &[1]) > m.op_cost(&EOp::If, &[10, 10, 10]));
  }

  #[test]
  fn costs_saturate_instead_of_overflowing() {
    let m = TreeSize;
    assert_eq!(m.op_cost(&EOp::Sum, &[usize::MAX, 5]), usize::MAX);
  }
}
