use pcache::config::{BackendKind, CacheOptions};
use pcache::expr::{ArrayCache, Expr, ExprRef};
use pcache::solver::{CachingSolver, Query, Solver, SolverError};
use utils::{byte, c, init, with_temp_dir, BruteForceSolver};

mod utils;

/// Queries that overlap heavily in their constraints, so exact, subset and
/// superset hits all occur. Only one constraint set mentions a second byte.
fn workload(arrays: &ArrayCache, name: &str) -> Vec<Query> {
    let x = byte(arrays, name);
    let y = byte(arrays, "y");

    let small = Expr::ult(&x, &c(8));
    let nonzero = Expr::ne(&x, &c(0));
    let above = Expr::ult(&c(200), &x);
    let linked = Expr::eq(&Expr::add(&x, &c(1)), &y);

    let goals: Vec<ExprRef> = vec![
        Expr::eq(&x, &c(3)),
        Expr::ult(&x, &c(100)),
        Expr::ule(&x, &c(5)),
        Expr::bool(false),
        Expr::bool(true),
    ];
    let constraint_sets = vec![
        vec![],
        vec![small.clone()],
        vec![small.clone(), nonzero.clone()],
        vec![small.clone(), nonzero.clone(), linked],
        vec![small.clone(), above.clone()],
        vec![small.clone(), above, nonzero.clone()],
        vec![nonzero],
        vec![small],
    ];

    constraint_sets
        .iter()
        .flat_map(|constraints| {
            goals
                .iter()
                .map(move |goal| Query::new(constraints.clone(), goal.clone()))
        })
        .collect()
}

/// Whether `value` is a value `query.goal` can take under the constraints.
fn is_possible_value(query: &Query, value: &ExprRef) -> bool {
    let mut reference = BruteForceSolver::new();
    let pinned = query.with_goal(Expr::ne(&query.goal, value));
    !reference.compute_truth(&pinned).unwrap()
}

fn check_transparency(options: &CacheOptions, name: &str) {
    let arrays = ArrayCache::new();
    let mut reference = BruteForceSolver::new();
    let mut cached =
        CachingSolver::from_options(BruteForceSolver::new(), options, &arrays).unwrap();

    // twice, so the second round is answered from the cache
    for round in 0..2 {
        for query in workload(&arrays, name) {
            assert_eq!(
                cached.compute_truth(&query).unwrap(),
                reference.compute_truth(&query).unwrap(),
                "truth of {} in round {}",
                query,
                round
            );
            assert_eq!(
                cached.compute_validity(&query).unwrap(),
                reference.compute_validity(&query).unwrap(),
                "validity of {} in round {}",
                query,
                round
            );
            match (cached.compute_value(&query), reference.compute_value(&query)) {
                (Ok(value), Ok(_)) => assert!(is_possible_value(&query, &value)),
                (Err(SolverError::Unsatisfiable), Err(SolverError::Unsatisfiable)) => {}
                (cached, reference) => panic!(
                    "value of {} differs: {:?} vs {:?}",
                    query, cached, reference
                ),
            }
        }
    }

    assert!(cached.stats().cache_hits > 0);
    assert!(cached.solver().calls() < reference.calls());
}

#[test]
fn exact_cache_is_transparent() {
    init();
    with_temp_dir(|dir| {
        let options = CacheOptions {
            path: dir.path().join("pcache"),
            ..CacheOptions::default()
        };
        check_transparency(&options, "x");
    });
}

#[test]
fn fuzzy_cache_is_transparent() {
    init();
    with_temp_dir(|dir| {
        let options = CacheOptions {
            path: dir.path().join("pcache"),
            backends: vec![BackendKind::Pmap, BackendKind::Trie],
            try_all: true,
            ..CacheOptions::default()
        };
        check_transparency(&options, "x");
    });
}

#[test]
fn normalizing_cache_is_transparent() {
    init();
    with_temp_dir(|dir| {
        let options = CacheOptions {
            path: dir.path().join("pcache"),
            try_all: true,
            name_normalization: true,
            algebra_normalization: true,
            ..CacheOptions::default()
        };
        check_transparency(&options, "x");
        check_transparency(&options, "renamed");
    });
}
