//! Extracting the cheapest equivalent expression out of an e-graph.

pub mod cost;

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::{
  egraph::{ClassId, EGraph, ENode, EOp, LambdaId},
  expr::{Expr, ExprRef, Transform},
};

pub use cost::{BackendCost, CostModel, TreeSize};

/// Errors raised while picking a representative tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExtractError {
  /// The class holds no e-nodes at all.
  #[error("class {0} has no e-nodes")]
  EmptyClass(ClassId),
  /// Every e-node of the class leads back into a class still being costed,
  /// so no finite tree represents it.
  #[error("class {0} has no acyclic representative")]
  CyclicClass(ClassId),
  /// An aggregate e-node names a transform the graph never registered.
  #[error("transform {0} is not registered in this graph")]
  MissingTransform(LambdaId),
}

/// Chooses, per e-class, the e-node whose tree minimizes a [`CostModel`],
/// then rebuilds that tree as an [`ExprRef`].
///
/// Costs are memoized per canonical class, so one extractor can serve
/// several roots of the same graph.
pub struct Extractor<'a, C> {
  egraph: &'a EGraph,
  model: C,
  best: FxHashMap<ClassId, (usize, ENode)>,
  visiting: FxHashSet<ClassId>,
}

impl<'a, C: CostModel> Extractor<'a, C> {
  /// The graph must be clean: extraction reads classes through the memo
  /// and stale unions would make costs disagree with the class structure.
  pub fn new(egraph: &'a EGraph, model: C) -> Self {
    debug_assert!(!egraph.needs_rebuild(), "extracting from a dirty graph");
    Self {
      egraph,
      model,
      best: FxHashMap::default(),
      visiting: FxHashSet::default(),
    }
  }

  /// Extracts the cheapest tree rooted at `root`.
  pub fn extract(&mut self, root: ClassId) -> Result<ExprRef, ExtractError> {
    let root = self.egraph.find_ref(root);
    self.best_cost(root)?;
    let mut built = FxHashMap::default();
    self.build(root, &mut built)
  }

  /// The cost of the cheapest tree representing `class`.
  pub fn best_cost(&mut self, class: ClassId) -> Result<usize, ExtractError> {
    let class = self.egraph.find_ref(class);
    if let Some(&(cost, _)) = self.best.get(&class) {
      return Ok(cost);
    }
    let eclass = self
      .egraph
      .get_class(class)
      .ok_or(ExtractError::EmptyClass(class))?;
    if eclass.is_empty() {
      return Err(ExtractError::EmptyClass(class));
    }
    if !self.visiting.insert(class) {
      return Err(ExtractError::CyclicClass(class));
    }

    let mut best: Option<(usize, ENode)> = None;
    'nodes: for node in eclass.nodes() {
      let mut child_costs = Vec::with_capacity(node.children().len());
      for &child in node.children() {
        match self.best_cost(child) {
          Ok(cost) => child_costs.push(cost),
          // This e-node reaches back into a class still on the stack, so
          // it cannot head a finite tree. Another sibling still can.
          Err(ExtractError::CyclicClass(_)) => continue 'nodes,
          Err(other) => {
            self.visiting.remove(&class);
            return Err(other);
          }
        }
      }
      let total = self.model.op_cost(node.op(), &child_costs);
      if best.as_ref().map_or(true, |&(b, _)| total < b) {
        best = Some((total, node.clone()));
      }
    }
    self.visiting.remove(&class);

    match best {
      Some((cost, node)) => {
        self.best.insert(class, (cost, node));
        Ok(cost)
      }
      None => Err(ExtractError::CyclicClass(class)),
    }
  }

  fn build(
    &self,
    class: ClassId,
    built: &mut FxHashMap<ClassId, ExprRef>,
  ) -> Result<ExprRef, ExtractError> {
    let class = self.egraph.find_ref(class);
    if let Some(expr) = built.get(&class) {
      return Ok(expr.clone());
    }
    let (_, node) = self
      .best
      .get(&class)
      .expect("build only visits classes best_cost succeeded on");
    let mut children = Vec::with_capacity(node.children().len());
    for &child in node.children() {
      children.push(self.build(child, built)?);
    }
    let expr = self.node_to_expr(node, children)?;
    built.insert(class, expr.clone());
    Ok(expr)
  }

  fn node_to_expr(
    &self,
    node: &ENode,
    ch: Vec<ExprRef>,
  ) -> Result<ExprRef, ExtractError> {
    let expr = match node.op() {
      EOp::Int(v) => Expr::int(*v),
      EOp::Float(v) => Expr::float(v.into_inner()),
      EOp::Var(id, kind) => Expr::var(*id, *kind),
      EOp::IntArray(values) => Expr::int_array(values.clone()),
      EOp::IntArray2(rows) => Expr::int_array2(rows.clone()),
      EOp::List => Expr::list(ch),
      EOp::Sum => Expr::sum(ch),
      EOp::Prod => Expr::prod(ch),
      EOp::And => Expr::and(ch),
      EOp::Or => Expr::or(ch),
      EOp::Xor => Expr::xor(ch),
      EOp::Min => Expr::min(ch),
      EOp::Max => Expr::max(ch),
      EOp::SetIntersect => Expr::set_intersect(ch),
      EOp::SetUnion => Expr::set_union(ch),
      EOp::BoolCount => Expr::bool_count(ch),
      EOp::IndicatorSum => {
        debug_assert!(ch.len() % 2 == 0, "pairs are stored flattened");
        let pairs = ch
          .chunks_exact(2)
          .map(|pair| (pair[0].clone(), pair[1].clone()))
          .collect();
        Expr::indicator_sum(pairs)
      }
      EOp::Sub => {
        let [a, b] = take(ch);
        Expr::sub(a, b)
      }
      EOp::Div => {
        let [a, b] = take(ch);
        Expr::div(a, b)
      }
      EOp::Mod => {
        let [a, b] = take(ch);
        Expr::modulo(a, b)
      }
      EOp::Eq => {
        let [a, b] = take(ch);
        Expr::eq(a, b)
      }
      EOp::Ne => {
        let [a, b] = take(ch);
        Expr::ne(a, b)
      }
      EOp::Lt => {
        let [a, b] = take(ch);
        Expr::lt(a, b)
      }
      EOp::Le => {
        let [a, b] = take(ch);
        Expr::le(a, b)
      }
      EOp::Gt => {
        let [a, b] = take(ch);
        Expr::gt(a, b)
      }
      EOp::Ge => {
        let [a, b] = take(ch);
        Expr::ge(a, b)
      }
      EOp::Index => {
        let [a, i] = take(ch);
        Expr::index(a, i)
      }
      EOp::Count => {
        let [c, v] = take(ch);
        Expr::count(c, v)
      }
      EOp::Contains => {
        let [c, v] = take(ch);
        Expr::contains(c, v)
      }
      EOp::Find => {
        let [c, v] = take(ch);
        Expr::find(c, v)
      }
      EOp::IndexOf => {
        let [c, v] = take(ch);
        Expr::index_of(c, v)
      }
      EOp::Log => {
        let [b, x] = take(ch);
        Expr::log(b, x)
      }
      EOp::Pow => {
        let [b, e] = take(ch);
        Expr::pow(b, e)
      }
      EOp::Neg => {
        let [a] = take(ch);
        Expr::neg(a)
      }
      EOp::Not => {
        let [a] = take(ch);
        Expr::not(a)
      }
      EOp::Abs => {
        let [a] = take(ch);
        Expr::abs(a)
      }
      EOp::Sqrt => {
        let [a] = take(ch);
        Expr::sqrt(a)
      }
      EOp::Exp => {
        let [a] = take(ch);
        Expr::exp(a)
      }
      EOp::Ln => {
        let [a] = take(ch);
        Expr::ln(a)
      }
      EOp::If => {
        let [c, t, e] = take(ch);
        Expr::ite(c, t, e)
      }
      EOp::Index2 => {
        let [a, i, j] = take(ch);
        Expr::index2(a, i, j)
      }
      EOp::InDomain(values) => {
        let [x] = take(ch);
        Expr::in_domain(x, values.clone())
      }
      EOp::Sort(None) => {
        let [c] = take(ch);
        Expr::sort(c)
      }
      EOp::Sort(Some(lambda)) => {
        let key = self.lambda(*lambda)?;
        let [c] = take(ch);
        Arc::new(Expr::Sort(c, Some(key)))
      }
      EOp::SumOver(lambda) => {
        let f = self.lambda(*lambda)?;
        let [c] = take(ch);
        Arc::new(Expr::SumOver(c, f))
      }
      EOp::ProdOver(lambda) => {
        let f = self.lambda(*lambda)?;
        let [c] = take(ch);
        Arc::new(Expr::ProdOver(c, f))
      }
      EOp::MinOver(lambda) => {
        let f = self.lambda(*lambda)?;
        let [c] = take(ch);
        Arc::new(Expr::MinOver(c, f))
      }
      EOp::MaxOver(lambda) => {
        let f = self.lambda(*lambda)?;
        let [c] = take(ch);
        Arc::new(Expr::MaxOver(c, f))
      }
      EOp::ForAll(lambda) => {
        let f = self.lambda(*lambda)?;
        let [c] = take(ch);
        Arc::new(Expr::ForAll(c, f))
      }
      EOp::Exists(lambda) => {
        let f = self.lambda(*lambda)?;
        let [c] = take(ch);
        Arc::new(Expr::Exists(c, f))
      }
    };
    Ok(expr)
  }

  fn lambda(&self, id: LambdaId) -> Result<Transform, ExtractError> {
    self
      .egraph
      .lambda(id)
      .cloned()
      .ok_or(ExtractError::MissingTransform(id))
  }
}

fn take<const N: usize>(children: Vec<ExprRef>) -> [ExprRef; N] {
  let found = children.len();
  children
    .try_into()
    .unwrap_or_else(|_| panic!("expected {N} children, found {found}"))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::expr::Expr;

  fn extract_display(eg: &EGraph, root: ClassId) -> String {
    let mut ex = Extractor::new(eg, BackendCost);
    ex.extract(root).map(|e| e.to_string()).unwrap()
  }

  #[test]
  fn untouched_tree_survives_roundtrip() {
    let x = Expr::int_var(0);
    let expr = Expr::sum(vec![x.clone(), Expr::prod(vec![Expr::int(2), x])]);
    let mut eg = EGraph::new();
    let root = eg.add_expr(&expr);
    let out = extract_display(&eg, root);
    assert_eq!(out, expr.to_string());
  }

  #[test]
  fn cheaper_node_wins_after_merge() {
    let x = Expr::int_var(0);
    let mut eg = EGraph::new();
    let prod = eg.add_expr(&Expr::prod(vec![x, Expr::int(0)]));
    let zero = eg.add_expr(&Expr::int(0));
    eg.merge(prod, zero);
    eg.rebuild();
    assert_eq!(extract_display(&eg, prod), "0");
  }

  #[test]
  fn self_referential_nodes_are_skipped() {
    // Merging x + 0 with x leaves the class holding a sum whose first
    // child is the class itself. The variable leaf must win.
    let x = Expr::int_var(3);
    let mut eg = EGraph::new();
    let sum = eg.add_expr(&Expr::sum(vec![x.clone(), Expr::int(0)]));
    let var = eg.add_expr(&x);
    eg.merge(sum, var);
    eg.rebuild();
    assert_eq!(extract_display(&eg, sum), "x3");
  }

  #[test]
  fn costs_are_shared_across_roots() {
    let x = Expr::int_var(0);
    let inner = Expr::sum(vec![x.clone(), Expr::int(1)]);
    let mut eg = EGraph::new();
    let a = eg.add_expr(&inner);
    let b = eg.add_expr(&Expr::neg(inner.clone()));
    let mut ex = Extractor::new(&eg, TreeSize);
    let ca = ex.best_cost(a).unwrap();
    let cb = ex.best_cost(b).unwrap();
    assert_eq!(cb, ca + 1);
  }

  #[test]
  fn aggregates_reconstruct_their_transform() {
    let double = Transform::new(|e| Expr::prod(vec![e, Expr::int(2)]));
    let list = Expr::list(vec![Expr::int(1), Expr::int(2)]);
    let expr = Arc::new(Expr::SumOver(list, double.clone()));
    let mut eg = EGraph::new();
    let root = eg.add_expr(&expr);
    let mut ex = Extractor::new(&eg, BackendCost);
    let out = ex.extract(root).unwrap();
    match out.as_ref() {
      Expr::SumOver(_, f) => assert_eq!(f, &double),
      other => panic!("expected a sum aggregate, found {other:?}"),
    }
  }
}
