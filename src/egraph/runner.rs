//! Driving rewrites to saturation.

use log::debug;

use super::{
  ClassId, EGraph,
  pattern::{Rewrite, Subst},
};
use crate::{
  expr::ExprRef,
  extract::{BackendCost, ExtractError, Extractor},
};

/// Budgets for a saturation run.
#[derive(Debug, Clone, Copy)]
pub struct SaturationConfig {
  /// Upper bound on rewrite iterations.
  pub iter_limit: usize,
  /// Stop once the graph holds more e-nodes than this.
  pub node_limit: usize,
}

impl Default for SaturationConfig {
  fn default() -> Self {
    Self {
      iter_limit: 30,
      node_limit: 10_000,
    }
  }
}

/// Why a saturation run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
  /// No rule produced a new union; the graph is closed under the rules.
  Saturated,
  /// The iteration budget ran out.
  IterLimit,
  /// The graph outgrew the node budget.
  NodeLimit,
}

/// Summary of a saturation run.
#[derive(Debug, Clone, Copy)]
pub struct SaturationReport {
  pub stop_reason: StopReason,
  pub iterations: usize,
  pub classes: usize,
  pub enodes: usize,
}

/// Applies `rules` to `egraph` until no rule changes anything or a budget
/// runs out.
///
/// Each iteration searches every class with every rule against a snapshot
/// of the class list, instantiates all right-hand sides, merges them with
/// the matched classes, and rebuilds once at the end.
pub fn saturate(
  egraph: &mut EGraph,
  rules: &[Rewrite],
  config: &SaturationConfig,
) -> SaturationReport {
  if egraph.needs_rebuild() {
    egraph.rebuild();
  }
  let mut iterations = 0;
  let stop_reason = loop {
    if iterations >= config.iter_limit {
      break StopReason::IterLimit;
    }

    let class_ids: Vec<ClassId> =
      egraph.classes().map(|class| class.id()).collect();
    let mut matches: Vec<(usize, ClassId, Subst)> = Vec::new();
    for (rule_idx, rule) in rules.iter().enumerate() {
      for &class in &class_ids {
        for subst in rule.lhs().search_class(egraph, class) {
          matches.push((rule_idx, class, subst));
        }
      }
    }

    let found = matches.len();
    let mut merges = 0;
    for (rule_idx, class, subst) in matches {
      let id = rules[rule_idx].rhs().instantiate(egraph, &subst);
      let (_, changed) = egraph.merge(class, id);
      if changed {
        merges += 1;
      }
    }
    egraph.rebuild();
    iterations += 1;
    debug!(
      "iteration {iterations}: {found} matches, {merges} merges, {} classes, {} e-nodes",
      egraph.num_classes(),
      egraph.total_enodes()
    );

    if merges == 0 {
      break StopReason::Saturated;
    }
    if egraph.total_enodes() > config.node_limit {
      break StopReason::NodeLimit;
    }
  };
  SaturationReport {
    stop_reason,
    iterations,
    classes: egraph.num_classes(),
    enodes: egraph.total_enodes(),
  }
}

/// Loads `expr`, saturates it with `rules`, and extracts the equivalent
/// tree that is cheapest to lower.
pub fn saturate_and_extract(
  expr: &ExprRef,
  rules: &[Rewrite],
  config: &SaturationConfig,
) -> Result<(ExprRef, SaturationReport), ExtractError> {
  let mut egraph = EGraph::new();
  let root = egraph.add_expr(expr);
  let report = saturate(&mut egraph, rules, config);
  let mut extractor = Extractor::new(&egraph, BackendCost);
  let best = extractor.extract(root)?;
  Ok((best, report))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::egraph::rules::standard_rules;
  use crate::expr::Expr;

  fn run(expr: &ExprRef) -> (ExprRef, SaturationReport) {
    saturate_and_extract(expr, &standard_rules(), &SaturationConfig::default())
      .unwrap()
  }

  #[test]
  fn multiplication_by_zero_collapses() {
    let expr = Expr::prod(vec![Expr::int_var(0), Expr::int(0)]);
    let (best, report) = run(&expr);
    assert_eq!(best.to_string(), "0");
    assert_eq!(report.stop_reason, StopReason::Saturated);
  }

  #[test]
  fn additive_identity_vanishes() {
    let expr = Expr::sum(vec![Expr::int_var(1), Expr::int(0)]);
    let (best, _) = run(&expr);
    assert_eq!(best.to_string(), "x1");
  }

  #[test]
  fn self_subtraction_cancels() {
    let x = Expr::int_var(0);
    let lhs = Expr::sum(vec![x.clone(), Expr::int(2)]);
    let rhs = Expr::sum(vec![x, Expr::int(2)]);
    let (best, _) = run(&Expr::sub(lhs, rhs));
    assert_eq!(best.to_string(), "0");
  }

  #[test]
  fn double_negation_unwinds() {
    let expr = Expr::neg(Expr::neg(Expr::int_var(2)));
    let (best, _) = run(&expr);
    assert_eq!(best.to_string(), "x2");
  }

  #[test]
  fn equal_branches_drop_the_conditional() {
    let t = Expr::int_var(1);
    let expr = Expr::ite(Expr::bool_var(0), t.clone(), t);
    let (best, _) = run(&expr);
    assert_eq!(best.to_string(), "x1");
  }

  #[test]
  fn unrelated_trees_are_preserved() {
    let expr = Expr::lt(Expr::int_var(0), Expr::int_var(1));
    let (best, report) = run(&expr);
    assert_eq!(best.to_string(), expr.to_string());
    assert_eq!(report.stop_reason, StopReason::Saturated);
  }

  #[test]
  fn zero_iteration_budget_stops_immediately() {
    let mut eg = EGraph::new();
    eg.add_expr(&Expr::sum(vec![Expr::int_var(0), Expr::int(0)]));
    let before = eg.total_enodes();
    let config = SaturationConfig {
      iter_limit: 0,
      ..SaturationConfig::default()
    };
    let report = saturate(&mut eg, &standard_rules(), &config);
    assert_eq!(report.stop_reason, StopReason::IterLimit);
    assert_eq!(report.iterations, 0);
    assert_eq!(report.enodes, before);
  }

  #[test]
  fn node_budget_stops_growth() {
    // Commutativity keeps proposing swapped operands for the nested sums,
    // so the first productive iteration already overflows a tiny budget.
    let expr = Expr::sum(vec![
      Expr::int_var(0),
      Expr::sum(vec![Expr::int_var(1), Expr::int_var(2)]),
    ]);
    let mut eg = EGraph::new();
    eg.add_expr(&expr);
    let config = SaturationConfig {
      iter_limit: 30,
      node_limit: 4,
    };
    let report = saturate(&mut eg, &standard_rules(), &config);
    assert_eq!(report.stop_reason, StopReason::NodeLimit);
    assert_eq!(report.iterations, 1);
  }
}
