//! End-to-end runs of the whole pipeline: build a tree, simplify it,
//! saturate and extract, then lower onto the recording backend and check
//! the produced model shape against the evaluator.

use presolve::{
  Backend, Bindings, CompiledValue, Compiler, Domain, Expr, ExprRef,
  Recorder, SaturationConfig, VarId, VarTable,
  backend::{RecVar, Recorded},
  evaluate_int, saturate_and_extract, simplify, standard_rules,
};

fn init_logging() {
  let _ = env_logger::builder().is_test(true).try_init();
}

fn declare_int(
  rec: &mut Recorder,
  table: &mut VarTable<RecVar>,
  id: u32,
  lo: i64,
  hi: i64,
) -> ExprRef {
  let domain = Domain::new(lo, hi);
  let handle = rec.new_int_var(domain, &format!("x{id}"));
  table.insert(VarId(id), handle, domain);
  Expr::int_var(id)
}

fn declare_bool(
  rec: &mut Recorder,
  table: &mut VarTable<RecVar>,
  id: u32,
) -> ExprRef {
  let handle = rec.new_bool_var(&format!("b{id}"));
  table.insert(VarId(id), handle, Domain::BOOL);
  Expr::bool_var(id)
}

#[test]
fn counting_sum_compiles_to_one_bounded_row() {
  init_logging();
  let mut rec = Recorder::new();
  let mut table = VarTable::new();
  let x = declare_int(&mut rec, &mut table, 0, 0, 10);
  let b = declare_bool(&mut rec, &mut table, 1);
  let y = declare_int(&mut rec, &mut table, 2, 0, 10);

  let tree = Expr::sum(vec![
    Expr::ite(Expr::lt(x, Expr::int(3)), Expr::int(1), Expr::int(0)),
    Expr::ite(b, Expr::int(1), Expr::int(0)),
    Expr::ite(Expr::gt(y, Expr::int(7)), Expr::int(1), Expr::int(0)),
  ]);
  let fused = simplify(&tree);
  let Expr::BoolCount(conds) = &*fused else {
    panic!("expected the sum to fuse, got {fused}");
  };
  assert_eq!(conds.len(), 3);

  let mut compiler = Compiler::new(&mut rec, &table);
  let value = compiler.compile(&fused).unwrap();
  assert_eq!(value.domain(), Domain::new(0, 3));
  // Two comparisons reify (two booleans, four half-rows); the count itself
  // is one aux bound by one row. No element constraints anywhere.
  assert_eq!(rec.num_bool_vars(), 1 + 2);
  assert!(
    !rec
      .constraints()
      .iter()
      .any(|c| matches!(c, Recorded::ElementEq { .. })),
    "a fused count must not lower through conditionals"
  );
}

#[test]
fn indicator_sum_compiles_to_product_channels() {
  init_logging();
  let mut rec = Recorder::new();
  let mut table = VarTable::new();
  let b0 = declare_bool(&mut rec, &mut table, 0);
  let b1 = declare_bool(&mut rec, &mut table, 1);
  let w = declare_int(&mut rec, &mut table, 2, 1, 6);

  let tree = Expr::sum(vec![
    Expr::ite(b0, w, Expr::int(0)),
    Expr::ite(b1, Expr::int(5), Expr::int(0)),
  ]);
  let fused = simplify(&tree);
  assert!(matches!(&*fused, Expr::IndicatorSum(pairs) if pairs.len() == 2));

  let mut compiler = Compiler::new(&mut rec, &table);
  let value = compiler.compile(&fused).unwrap();
  // b0 contributes [0, 6], b1 contributes {0, 5}.
  assert_eq!(value.domain(), Domain::new(0, 11));
  let products: Vec<_> = rec
    .constraints()
    .iter()
    .filter(|c| matches!(c, Recorded::MulEq { .. }))
    .collect();
  assert_eq!(products.len(), 1, "only the variable-valued pair multiplies");
}

#[test]
fn saturation_erases_dead_terms_before_lowering() {
  init_logging();
  let mut rec = Recorder::new();
  let mut table = VarTable::new();
  let x = declare_int(&mut rec, &mut table, 0, 0, 10);

  // x * 0 + (x + 0) is just x; the lowered model needs no constraints.
  let tree = Expr::sum(vec![
    Expr::prod(vec![x.clone(), Expr::int(0)]),
    Expr::sum(vec![x, Expr::int(0)]),
  ]);
  let (best, _report) = saturate_and_extract(
    &tree,
    &standard_rules(),
    &SaturationConfig::default(),
  )
  .unwrap();
  assert_eq!(best.to_string(), "x0");

  let mut compiler = Compiler::new(&mut rec, &table);
  let value = compiler.compile(&best).unwrap();
  assert!(matches!(value, CompiledValue::Var { .. }));
  assert!(rec.constraints().is_empty());
  assert_eq!(rec.num_int_vars(), 1, "only the declared variable exists");
}

#[test]
fn inferred_domains_cover_every_reachable_value() {
  init_logging();
  let mut rec = Recorder::new();
  let mut table = VarTable::new();
  let x = declare_int(&mut rec, &mut table, 0, 0, 5);
  let y = declare_int(&mut rec, &mut table, 1, -3, 4);

  let trees = [
    Expr::sum(vec![x.clone(), y.clone(), Expr::int(2)]),
    Expr::sub(x.clone(), y.clone()),
    Expr::prod(vec![x.clone(), y.clone()]),
    Expr::abs(y.clone()),
    Expr::min(vec![x.clone(), y.clone()]),
    Expr::max(vec![x.clone(), y.clone()]),
    Expr::ite(Expr::lt(x.clone(), y.clone()), Expr::int(7), Expr::int(-2)),
    Expr::bool_count(vec![
      Expr::ge(x.clone(), Expr::int(2)),
      Expr::le(y.clone(), Expr::int(0)),
    ]),
  ];

  let mut compiler = Compiler::new(&mut rec, &table);
  for tree in &trees {
    let domain = compiler.compile(tree).unwrap().domain();
    for xv in 0..=5 {
      for yv in -3..=4 {
        let bindings = Bindings::new().with_int(0, xv).with_int(1, yv);
        let value = evaluate_int(tree, &bindings).unwrap();
        assert!(
          domain.contains(value),
          "{tree} = {value} outside {domain} at x={xv}, y={yv}"
        );
      }
    }
  }
}

#[test]
fn pipeline_agrees_with_the_evaluator_on_constants() {
  init_logging();
  // A tree of literals runs the whole pipeline without touching the
  // backend, and every stage agrees on the value.
  let tree = Expr::sum(vec![
    Expr::ite(
      Expr::lt(Expr::int(1), Expr::int(2)),
      Expr::int(1),
      Expr::int(0),
    ),
    Expr::prod(vec![Expr::int(3), Expr::int(4)]),
    Expr::neg(Expr::int(5)),
  ]);
  let expected = evaluate_int(&tree, &Bindings::new()).unwrap();
  assert_eq!(expected, 8);

  let fused = simplify(&tree);
  assert_eq!(evaluate_int(&fused, &Bindings::new()), Ok(expected));

  let (best, _) = saturate_and_extract(
    &fused,
    &standard_rules(),
    &SaturationConfig::default(),
  )
  .unwrap();
  assert_eq!(evaluate_int(&best, &Bindings::new()), Ok(expected));

  let mut rec = Recorder::new();
  let table: VarTable<RecVar> = VarTable::new();
  let mut compiler = Compiler::new(&mut rec, &table);
  assert_eq!(compiler.compile(&best), Ok(CompiledValue::Const(expected)));
  assert!(rec.vars().is_empty());
  assert!(rec.constraints().is_empty());
}
