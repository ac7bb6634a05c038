//! A small e-graph for equality saturation over expression trees.
//!
//! The graph keeps three structures in sync: a union-find over e-class ids,
//! a hash-cons table mapping canonical e-nodes to their classes, and the
//! per-class node and parent lists. [`EGraph::merge`] only records the
//! union and defers congruence repair; [`EGraph::rebuild`] drains the
//! pending worklist, re-canonicalizing the parents of every touched class
//! and merging classes that have become congruent, until the invariants
//! hold again.
//!
//! Opaque transforms carried by the aggregate operations live in an arena
//! owned by the graph; e-nodes refer to them through [`LambdaId`], so two
//! aggregates are only ever congruent when they share the same closure.

pub mod lang;
pub mod pattern;
pub mod rules;
pub mod runner;

pub use lang::EOp;
pub use pattern::{Pattern, Rewrite, Subst};
pub use runner::{
  SaturationConfig, SaturationReport, StopReason, saturate,
  saturate_and_extract,
};

use crate::expr::Transform;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::fmt::{self, Display, Formatter};

/// Identifies an e-class. Only canonical ids (as returned by
/// [`EGraph::find`]) index the class table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl Display for ClassId {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "c{}", self.0)
  }
}

/// Index into the e-graph's transform arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LambdaId(u32);

impl Display for LambdaId {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "fn{}", self.0)
  }
}

/// An operation applied to e-class children.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ENode {
  op: EOp,
  children: SmallVec<[ClassId; 2]>,
}

impl ENode {
  #[must_use]
  pub fn new(op: EOp, children: impl IntoIterator<Item = ClassId>) -> Self {
    Self {
      op,
      children: children.into_iter().collect(),
    }
  }

  #[must_use]
  pub fn leaf(op: EOp) -> Self {
    Self {
      op,
      children: SmallVec::new(),
    }
  }

  #[must_use]
  pub fn op(&self) -> &EOp {
    &self.op
  }

  #[must_use]
  pub fn children(&self) -> &[ClassId] {
    &self.children
  }

  /// This node with every child replaced by its canonical class.
  #[must_use]
  pub fn canonicalize(&self, mut find: impl FnMut(ClassId) -> ClassId) -> Self {
    Self {
      op: self.op.clone(),
      children: self.children.iter().map(|&c| find(c)).collect(),
    }
  }
}

/// An equivalence class of e-nodes.
#[derive(Debug, Clone)]
pub struct EClass {
  id: ClassId,
  nodes: Vec<ENode>,
  /// E-nodes that use this class as a child, with the class each lives in.
  parents: Vec<(ENode, ClassId)>,
}

impl EClass {
  #[must_use]
  pub fn id(&self) -> ClassId {
    self.id
  }

  #[must_use]
  pub fn nodes(&self) -> &[ENode] {
    &self.nodes
  }

  #[must_use]
  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }
}

#[derive(Debug, Clone, Default)]
struct UnionFind {
  parents: Vec<u32>,
}

impl UnionFind {
  fn make_set(&mut self) -> ClassId {
    let id = self.parents.len() as u32;
    self.parents.push(id);
    ClassId(id)
  }

  /// Root of `id`, compressing the path behind it.
  fn find(&mut self, id: ClassId) -> ClassId {
    let mut root = id.0;
    while self.parents[root as usize] != root {
      root = self.parents[root as usize];
    }
    let mut cur = id.0;
    while cur != root {
      let next = self.parents[cur as usize];
      self.parents[cur as usize] = root;
      cur = next;
    }
    ClassId(root)
  }

  /// Root of `id` without path compression, usable through a shared
  /// reference.
  fn find_ref(&self, id: ClassId) -> ClassId {
    let mut root = id.0;
    while self.parents[root as usize] != root {
      root = self.parents[root as usize];
    }
    ClassId(root)
  }

  /// Unions two roots; the first argument stays canonical.
  fn union(&mut self, a: ClassId, b: ClassId) -> ClassId {
    self.parents[b.0 as usize] = a.0;
    a
  }
}

#[derive(Debug, Default)]
pub struct EGraph {
  unionfind: UnionFind,
  classes: indexmap::IndexMap<ClassId, EClass>,
  /// Canonical e-node to class. Entries may go stale between a merge and
  /// the next rebuild; values are canonicalized on every read.
  memo: FxHashMap<ENode, ClassId>,
  /// Classes whose parents need congruence repair.
  pending: Vec<ClassId>,
  lambdas: Vec<Transform>,
  lambda_ids: FxHashMap<*const (), LambdaId>,
}

impl EGraph {
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  pub fn find(&mut self, id: ClassId) -> ClassId {
    self.unionfind.find(id)
  }

  #[must_use]
  pub fn find_ref(&self, id: ClassId) -> ClassId {
    self.unionfind.find_ref(id)
  }

  /// The class containing `id`, if any.
  #[must_use]
  pub fn get_class(&self, id: ClassId) -> Option<&EClass> {
    self.classes.get(&self.find_ref(id))
  }

  pub fn classes(&self) -> impl Iterator<Item = &EClass> {
    self.classes.values()
  }

  #[must_use]
  pub fn num_classes(&self) -> usize {
    self.classes.len()
  }

  #[must_use]
  pub fn total_enodes(&self) -> usize {
    self.classes.values().map(EClass::len).sum()
  }

  /// True when merges have happened since the last [`rebuild`](Self::rebuild).
  #[must_use]
  pub fn needs_rebuild(&self) -> bool {
    !self.pending.is_empty()
  }

  /// Adds an e-node, returning the class of an existing congruent node if
  /// one is known.
  pub fn add(&mut self, node: ENode) -> ClassId {
    let canon = node.canonicalize(|c| self.unionfind.find(c));
    if let Some(&id) = self.memo.get(&canon) {
      return self.find(id);
    }
    let id = self.unionfind.make_set();
    for &child in canon.children() {
      if let Some(class) = self.classes.get_mut(&child) {
        class.parents.push((canon.clone(), id));
      }
    }
    self.classes.insert(
      id,
      EClass {
        id,
        nodes: vec![canon.clone()],
        parents: Vec::new(),
      },
    );
    self.memo.insert(canon, id);
    id
  }

  /// Unions the classes of `a` and `b`. Returns the surviving canonical id
  /// and whether anything changed. Congruence repair is deferred to
  /// [`rebuild`](Self::rebuild).
  pub fn merge(&mut self, a: ClassId, b: ClassId) -> (ClassId, bool) {
    let ra = self.find(a);
    let rb = self.find(b);
    if ra == rb {
      return (ra, false);
    }
    let root = self.unionfind.union(ra, rb);
    let loser = if root == ra { rb } else { ra };
    if let Some(mut lost) = self.classes.swap_remove(&loser) {
      if let Some(winner) = self.classes.get_mut(&root) {
        winner.nodes.append(&mut lost.nodes);
        winner.parents.append(&mut lost.parents);
      }
    }
    self.pending.push(root);
    (root, true)
  }

  /// Restores the congruence invariant, merging classes that pending
  /// unions have made equal. Returns the number of extra merges performed.
  pub fn rebuild(&mut self) -> usize {
    let mut merges = 0;
    while let Some(id) = self.pending.pop() {
      let root = self.find(id);
      let Some(class) = self.classes.get_mut(&root) else {
        continue;
      };
      let parents = std::mem::take(&mut class.parents);
      let mut repaired: FxHashMap<ENode, ClassId> = FxHashMap::default();
      for (pnode, pclass) in parents {
        // The stored node was the memo key when it was added; drop the
        // stale entry before re-inserting under the new canonical form.
        self.memo.remove(&pnode);
        let canon = pnode.canonicalize(|c| self.unionfind.find(c));
        let pclass = self.find(pclass);
        if let Some(prev) = self.memo.insert(canon.clone(), pclass) {
          let prev = self.find(prev);
          if prev != pclass {
            let (_, did) = self.merge(prev, pclass);
            if did {
              merges += 1;
            }
          }
        }
        repaired.insert(canon, self.find(pclass));
      }
      let root = self.find(root);
      if let Some(class) = self.classes.get_mut(&root) {
        class.parents.extend(repaired);
      }
    }
    self.dedup_class_nodes();
    log::debug!(
      "rebuild: {merges} congruence merges, {} classes, {} e-nodes",
      self.num_classes(),
      self.total_enodes()
    );
    merges
  }

  /// Canonicalizes and dedupes every class's node list. Only meaningful
  /// once the pending worklist is empty.
  fn dedup_class_nodes(&mut self) {
    let ids: Vec<ClassId> = self.classes.keys().copied().collect();
    for id in ids {
      let Some(class) = self.classes.get(&id) else {
        continue;
      };
      let mut seen = FxHashSet::default();
      let mut nodes = Vec::with_capacity(class.nodes.len());
      for node in &class.nodes {
        let canon = node.canonicalize(|c| self.unionfind.find_ref(c));
        if seen.insert(canon.clone()) {
          nodes.push(canon);
        }
      }
      if let Some(class) = self.classes.get_mut(&id) {
        class.nodes = nodes;
      }
    }
  }

  /// Interns a transform, reusing the id of an already-registered closure.
  pub(crate) fn register_lambda(&mut self, transform: &Transform) -> LambdaId {
    if let Some(&id) = self.lambda_ids.get(&transform.addr()) {
      return id;
    }
    let id = LambdaId(self.lambdas.len() as u32);
    self.lambda_ids.insert(transform.addr(), id);
    self.lambdas.push(transform.clone());
    id
  }

  #[must_use]
  pub fn lambda(&self, id: LambdaId) -> Option<&Transform> {
    self.lambdas.get(id.0 as usize)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn int(egraph: &mut EGraph, v: i64) -> ClassId {
    egraph.add(ENode::leaf(EOp::Int(v)))
  }

  #[test]
  fn identical_nodes_hash_cons() {
    let mut eg = EGraph::new();
    let a = int(&mut eg, 7);
    let b = int(&mut eg, 7);
    assert_eq!(a, b);
    assert_eq!(eg.num_classes(), 1);
    let c = int(&mut eg, 8);
    assert_ne!(a, c);
  }

  #[test]
  fn merge_then_find() {
    let mut eg = EGraph::new();
    let a = int(&mut eg, 1);
    let b = int(&mut eg, 2);
    assert!(!eg.needs_rebuild());
    let (root, changed) = eg.merge(a, b);
    assert!(changed);
    assert_eq!(eg.find(a), eg.find(b));
    assert_eq!(eg.find(a), root);
    let (_, again) = eg.merge(a, b);
    assert!(!again, "merging an already-merged pair is a no-op");
    eg.rebuild();
    assert_eq!(eg.num_classes(), 1);
    assert_eq!(eg.get_class(a).unwrap().len(), 2);
  }

  #[test]
  fn congruence_propagates_through_rebuild() {
    let mut eg = EGraph::new();
    let a = int(&mut eg, 1);
    let b = int(&mut eg, 2);
    let fa = eg.add(ENode::new(EOp::Neg, [a]));
    let fb = eg.add(ENode::new(EOp::Neg, [b]));
    assert_ne!(eg.find(fa), eg.find(fb));

    eg.merge(a, b);
    assert!(eg.needs_rebuild());
    let merges = eg.rebuild();
    assert_eq!(merges, 1, "neg(a) and neg(b) become congruent");
    assert_eq!(eg.find(fa), eg.find(fb));
    assert!(!eg.needs_rebuild());
  }

  #[test]
  fn congruence_cascades_upwards() {
    let mut eg = EGraph::new();
    let a = int(&mut eg, 1);
    let b = int(&mut eg, 2);
    let fa = eg.add(ENode::new(EOp::Neg, [a]));
    let fb = eg.add(ENode::new(EOp::Neg, [b]));
    let ffa = eg.add(ENode::new(EOp::Abs, [fa]));
    let ffb = eg.add(ENode::new(EOp::Abs, [fb]));

    eg.merge(a, b);
    let merges = eg.rebuild();
    assert_eq!(merges, 2);
    assert_eq!(eg.find(ffa), eg.find(ffb));
  }

  #[test]
  fn lookup_after_merge_reuses_the_class() {
    let mut eg = EGraph::new();
    let a = int(&mut eg, 1);
    let b = int(&mut eg, 2);
    let sum = eg.add(ENode::new(EOp::Sum, [a, b]));
    eg.merge(a, b);
    eg.rebuild();
    // The merged pair makes the stored node self-referential; adding the
    // canonical version finds the existing class.
    let again = eg.add(ENode::new(EOp::Sum, [eg.find_ref(a), eg.find_ref(b)]));
    assert_eq!(eg.find(again), eg.find(sum));
  }

  #[test]
  fn merged_away_ids_stay_resolvable() {
    let mut eg = EGraph::new();
    let a = int(&mut eg, 1);
    let b = int(&mut eg, 2);
    let c = int(&mut eg, 3);
    eg.merge(a, b);
    eg.merge(b, c);
    eg.rebuild();
    assert_eq!(eg.num_classes(), 1);
    let root = eg.find(c);
    assert_eq!(eg.get_class(a).unwrap().id(), root);
    assert_eq!(eg.get_class(b).unwrap().id(), root);
  }

  #[test]
  fn lambda_arena_interns_by_identity() {
    let mut eg = EGraph::new();
    let t = Transform::new(|e| e);
    let u = Transform::new(|e| e);
    let ta = eg.register_lambda(&t);
    let tb = eg.register_lambda(&t.clone());
    let ua = eg.register_lambda(&u);
    assert_eq!(ta, tb, "clones share the closure allocation");
    assert_ne!(ta, ua);
    assert!(eg.lambda(ta).is_some());
  }
}
