//! Randomized evidence that both optimizers preserve evaluation: for any
//! generated tree and any bindings under which the original evaluates, the
//! optimized tree evaluates to the same value.
//!
//! Trees are generated two-sorted: integer-valued shapes and boolean-valued
//! shapes (comparisons and connectives), so that connectives only ever see
//! 0/1 operands — the unwrapping rules for `And`/`Or` assume that, exactly
//! as the compiler does.

use presolve::{
  Bindings, Expr, ExprRef, SaturationConfig, evaluate, saturate_and_extract,
  simplify_to_fixpoint, standard_rules,
};
use rand::{Rng, SeedableRng, rngs::StdRng};

const NUM_VARS: u32 = 4;
const VAR_RANGE: std::ops::RangeInclusive<i64> = -5..=5;

fn init_logging() {
  let _ = env_logger::builder().is_test(true).try_init();
}

fn gen_int(rng: &mut StdRng, depth: usize) -> ExprRef {
  if depth == 0 {
    return if rng.gen_bool(0.5) {
      Expr::int(rng.gen_range(-4..=4))
    } else {
      Expr::int_var(rng.gen_range(0..NUM_VARS))
    };
  }
  match rng.gen_range(0..12) {
    0 | 1 => {
      let n = rng.gen_range(2..=3);
      Expr::sum((0..n).map(|_| gen_int(rng, depth - 1)).collect())
    }
    2 => Expr::prod(vec![gen_int(rng, depth - 1), gen_int(rng, depth - 1)]),
    3 => Expr::sub(gen_int(rng, depth - 1), gen_int(rng, depth - 1)),
    4 => Expr::neg(gen_int(rng, depth - 1)),
    5 => Expr::abs(gen_int(rng, depth - 1)),
    6 => Expr::min(vec![gen_int(rng, depth - 1), gen_int(rng, depth - 1)]),
    7 => Expr::max(vec![gen_int(rng, depth - 1), gen_int(rng, depth - 1)]),
    8 => Expr::ite(
      gen_bool(rng, depth - 1),
      gen_int(rng, depth - 1),
      gen_int(rng, depth - 1),
    ),
    // The shape the counting rules fuse.
    9 => Expr::ite(gen_bool(rng, depth - 1), Expr::int(1), Expr::int(0)),
    10 => Expr::div(gen_int(rng, depth - 1), gen_int(rng, depth - 1)),
    _ => gen_int(rng, 0),
  }
}

fn gen_bool(rng: &mut StdRng, depth: usize) -> ExprRef {
  if depth == 0 {
    return Expr::int(i64::from(rng.gen_bool(0.5)));
  }
  match rng.gen_range(0..8) {
    0 => Expr::lt(gen_int(rng, depth - 1), gen_int(rng, depth - 1)),
    1 => Expr::le(gen_int(rng, depth - 1), gen_int(rng, depth - 1)),
    2 => Expr::eq(gen_int(rng, depth - 1), gen_int(rng, depth - 1)),
    3 => Expr::ne(gen_int(rng, depth - 1), gen_int(rng, depth - 1)),
    4 => Expr::and(vec![gen_bool(rng, depth - 1), gen_bool(rng, depth - 1)]),
    5 => Expr::or(vec![gen_bool(rng, depth - 1), gen_bool(rng, depth - 1)]),
    6 => Expr::not(gen_bool(rng, depth - 1)),
    _ => gen_bool(rng, 0),
  }
}

fn random_bindings(rng: &mut StdRng) -> Bindings {
  let mut b = Bindings::new();
  for id in 0..NUM_VARS {
    b = b.with_int(id, rng.gen_range(VAR_RANGE));
  }
  b
}

#[test]
fn local_simplification_preserves_evaluation() {
  init_logging();
  let mut rng = StdRng::seed_from_u64(0x5EED_0001);
  let mut checked = 0;
  for _ in 0..400 {
    let expr = gen_int(&mut rng, 3);
    let out = simplify_to_fixpoint(&expr);
    for _ in 0..4 {
      let bindings = random_bindings(&mut rng);
      // Division by zero makes some samples fail; the law only speaks
      // about bindings under which the original succeeds.
      let Ok(expected) = evaluate(&expr, &bindings) else {
        continue;
      };
      let actual = evaluate(&out, &bindings);
      assert_eq!(
        actual.as_ref(),
        Ok(&expected),
        "{expr} simplified to {out}"
      );
      checked += 1;
    }
  }
  assert!(checked > 500, "only {checked} samples were evaluable");
}

#[test]
fn saturation_preserves_evaluation() {
  init_logging();
  let rules = standard_rules();
  let config = SaturationConfig {
    iter_limit: 6,
    node_limit: 2_000,
  };
  let mut rng = StdRng::seed_from_u64(0x5EED_0002);
  let mut checked = 0;
  for _ in 0..120 {
    let expr = gen_int(&mut rng, 2);
    let (best, _report) =
      saturate_and_extract(&expr, &rules, &config).expect("extraction");
    for _ in 0..4 {
      let bindings = random_bindings(&mut rng);
      let Ok(expected) = evaluate(&expr, &bindings) else {
        continue;
      };
      let actual = evaluate(&best, &bindings);
      assert_eq!(
        actual.as_ref(),
        Ok(&expected),
        "{expr} extracted as {best}"
      );
      checked += 1;
    }
  }
  assert!(checked > 200, "only {checked} samples were evaluable");
}

#[test]
fn both_stages_compose() {
  init_logging();
  let rules = standard_rules();
  let config = SaturationConfig {
    iter_limit: 6,
    node_limit: 2_000,
  };
  let mut rng = StdRng::seed_from_u64(0x5EED_0003);
  for _ in 0..60 {
    let expr = gen_int(&mut rng, 2);
    let simplified = simplify_to_fixpoint(&expr);
    let (best, _) = saturate_and_extract(&simplified, &rules, &config)
      .expect("extraction");
    let bindings = random_bindings(&mut rng);
    if let Ok(expected) = evaluate(&expr, &bindings) {
      assert_eq!(evaluate(&best, &bindings), Ok(expected), "{expr} -> {best}");
    }
  }
}
