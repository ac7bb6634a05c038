//! Patterns, substitutions, and rewrite rules.
//!
//! A pattern is a small tree over [`EOp`] with named holes. Matching a
//! pattern against an e-class explores every e-node of the class and every
//! combination of child matches, threading a [`Subst`] through so that a
//! repeated variable only matches when both occurrences land in the same
//! e-class.

use super::{ClassId, EGraph, ENode, EOp};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
  /// A hole that matches any class and binds it by name.
  Var(&'static str),
  /// An integer literal leaf.
  Lit(i64),
  /// An operation whose children match in order.
  Node(EOp, Vec<Pattern>),
}

impl Pattern {
  #[must_use]
  pub fn var(name: &'static str) -> Self {
    Self::Var(name)
  }

  #[must_use]
  pub fn lit(value: i64) -> Self {
    Self::Lit(value)
  }

  #[must_use]
  pub fn node(op: EOp, children: Vec<Self>) -> Self {
    Self::Node(op, children)
  }

  /// Names bound by this pattern, in first-occurrence order.
  #[must_use]
  pub fn vars(&self) -> Vec<&'static str> {
    let mut out = Vec::new();
    self.collect_vars(&mut out);
    out
  }

  fn collect_vars(&self, out: &mut Vec<&'static str>) {
    match self {
      Self::Var(name) => {
        if !out.contains(name) {
          out.push(name);
        }
      }
      Self::Lit(_) => {}
      Self::Node(_, children) => {
        for c in children {
          c.collect_vars(out);
        }
      }
    }
  }

  /// All substitutions under which this pattern matches `class`.
  #[must_use]
  pub fn search_class(&self, egraph: &EGraph, class: ClassId) -> Vec<Subst> {
    let mut out = Vec::new();
    match_class(egraph, self, egraph.find_ref(class), &Subst::default(), &mut out);
    out
  }

  /// Builds this pattern in the graph with its holes filled from `subst`,
  /// returning the class of the result.
  ///
  /// # Panics
  ///
  /// Panics if the pattern uses a variable `subst` does not bind.
  /// [`Rewrite::new`] rules this out for rewrite right-hand sides.
  pub fn instantiate(&self, egraph: &mut EGraph, subst: &Subst) -> ClassId {
    match self {
      Self::Var(name) => subst
        .get(name)
        .unwrap_or_else(|| panic!("unbound pattern variable ?{name}")),
      Self::Lit(value) => egraph.add(ENode::leaf(EOp::Int(*value))),
      Self::Node(op, children) => {
        let ids: Vec<ClassId> = children
          .iter()
          .map(|c| c.instantiate(egraph, subst))
          .collect();
        egraph.add(ENode::new(op.clone(), ids))
      }
    }
  }
}

/// A mapping from pattern variables to e-classes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subst {
  bindings: FxHashMap<&'static str, ClassId>,
}

impl Subst {
  #[must_use]
  pub fn get(&self, name: &str) -> Option<ClassId> {
    self.bindings.get(name).copied()
  }

  /// Binds `name`, or checks consistency when already bound.
  fn bind(&mut self, name: &'static str, class: ClassId) -> bool {
    match self.bindings.get(name) {
      Some(&existing) => existing == class,
      None => {
        self.bindings.insert(name, class);
        true
      }
    }
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.bindings.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.bindings.is_empty()
  }
}

fn match_class(
  egraph: &EGraph,
  pattern: &Pattern,
  class: ClassId,
  subst: &Subst,
  out: &mut Vec<Subst>,
) {
  match pattern {
    Pattern::Var(name) => {
      let mut s = subst.clone();
      if s.bind(name, class) {
        out.push(s);
      }
    }
    Pattern::Lit(value) => {
      let Some(eclass) = egraph.get_class(class) else {
        return;
      };
      let hit = eclass.nodes().iter().any(|n| {
        n.children().is_empty() && *n.op() == EOp::Int(*value)
      });
      if hit {
        out.push(subst.clone());
      }
    }
    Pattern::Node(op, pats) => {
      let Some(eclass) = egraph.get_class(class) else {
        return;
      };
      for node in eclass.nodes() {
        if node.op() != op || node.children().len() != pats.len() {
          continue;
        }
        // Thread the substitution across the children, keeping every
        // consistent combination.
        let mut partial = vec![subst.clone()];
        for (pat, &child) in pats.iter().zip(node.children()) {
          let child = egraph.find_ref(child);
          let mut next = Vec::new();
          for s in &partial {
            match_class(egraph, pat, child, s, &mut next);
          }
          partial = next;
          if partial.is_empty() {
            break;
          }
        }
        out.append(&mut partial);
      }
    }
  }
}

/// A named left-to-right rewrite rule.
#[derive(Debug, Clone)]
pub struct Rewrite {
  name: &'static str,
  lhs: Pattern,
  rhs: Pattern,
}

impl Rewrite {
  /// # Panics
  ///
  /// Panics if the right-hand side uses a variable the left-hand side does
  /// not bind; such a rule could never be instantiated.
  #[must_use]
  pub fn new(name: &'static str, lhs: Pattern, rhs: Pattern) -> Self {
    let bound = lhs.vars();
    for v in rhs.vars() {
      assert!(
        bound.contains(&v),
        "rewrite {name}: rhs variable ?{v} is not bound by the lhs"
      );
    }
    Self { name, lhs, rhs }
  }

  #[must_use]
  pub fn name(&self) -> &'static str {
    self.name
  }

  #[must_use]
  pub fn lhs(&self) -> &Pattern {
    &self.lhs
  }

  #[must_use]
  pub fn rhs(&self) -> &Pattern {
    &self.rhs
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::expr::Expr;

  #[test]
  fn a_variable_matches_and_binds() {
    let mut eg = EGraph::new();
    let root = eg.add_expr(&Expr::int(5));
    let subs = Pattern::var("a").search_class(&eg, root);
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].get("a"), Some(root));
  }

  #[test]
  fn literals_match_only_their_value() {
    let mut eg = EGraph::new();
    let root = eg.add_expr(&Expr::int(5));
    assert_eq!(Pattern::lit(5).search_class(&eg, root).len(), 1);
    assert!(Pattern::lit(6).search_class(&eg, root).is_empty());
  }

  #[test]
  fn repeated_variables_must_agree() {
    let mut eg = EGraph::new();
    let x = Expr::int_var(0);
    let same = eg.add_expr(&Expr::sum(vec![x.clone(), x.clone()]));
    let diff = eg.add_expr(&Expr::sum(vec![x, Expr::int_var(1)]));

    let pat = Pattern::node(
      EOp::Sum,
      vec![Pattern::var("a"), Pattern::var("a")],
    );
    assert_eq!(pat.search_class(&eg, same).len(), 1);
    assert!(pat.search_class(&eg, diff).is_empty());
  }

  #[test]
  fn merging_makes_new_matches_visible() {
    let mut eg = EGraph::new();
    let x = eg.add_expr(&Expr::int_var(0));
    let y = eg.add_expr(&Expr::int_var(1));
    let sum = eg.add(ENode::new(EOp::Sum, [x, y]));

    let pat = Pattern::node(
      EOp::Sum,
      vec![Pattern::var("a"), Pattern::var("a")],
    );
    assert!(pat.search_class(&eg, sum).is_empty());
    eg.merge(x, y);
    eg.rebuild();
    assert_eq!(pat.search_class(&eg, sum).len(), 1);
  }

  #[test]
  fn nested_patterns_descend() {
    let mut eg = EGraph::new();
    let tree = Expr::prod(vec![Expr::int_var(0), Expr::int(0)]);
    let root = eg.add_expr(&tree);
    let pat = Pattern::node(
      EOp::Prod,
      vec![Pattern::var("a"), Pattern::lit(0)],
    );
    let subs = pat.search_class(&eg, root);
    assert_eq!(subs.len(), 1);
  }

  #[test]
  fn instantiation_reuses_bound_classes() {
    let mut eg = EGraph::new();
    let x = eg.add_expr(&Expr::int_var(0));
    let pat = Pattern::node(EOp::Sum, vec![Pattern::var("a"), Pattern::lit(0)]);
    let subs = {
      let tree =
        eg.add_expr(&Expr::sum(vec![Expr::int_var(0), Expr::int(0)]));
      pat.search_class(&eg, tree)
    };
    let built = Pattern::var("a").instantiate(&mut eg, &subs[0]);
    assert_eq!(eg.find(built), eg.find(x));
  }

  #[test]
  #[should_panic(expected = "not bound by the lhs")]
  fn rewrites_reject_unbound_rhs_variables() {
    let _ = Rewrite::new(
      "bad",
      Pattern::var("a"),
      Pattern::node(EOp::Sum, vec![Pattern::var("a"), Pattern::var("b")]),
    );
  }
}
