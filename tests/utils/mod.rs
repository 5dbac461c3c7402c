use log::trace;
use pcache::assignment::Assignment;
use pcache::expr::visitor::find_symbolic_objects;
use pcache::expr::{ArrayCache, ArrayRef, Expr, ExprRef};
use pcache::solver::{Query, Solver, SolverError};
use std::{
    cell::Cell,
    rc::Rc,
    sync::{Arc, Once},
};
use tempfile::{tempdir, TempDir};

static INIT_LOGGER: Once = Once::new();

pub fn init() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

pub fn with_temp_dir<F, R>(f: F) -> R
where
    F: FnOnce(Arc<TempDir>) -> R,
{
    let temp_dir = Arc::new(tempdir().unwrap());

    f(temp_dir)
}

/// Reference solver enumerating every assignment of the (at most two)
/// symbolic bytes a query mentions, lowest first.
pub struct BruteForceSolver {
    calls: Rc<Cell<usize>>,
}

#[allow(dead_code)]
impl BruteForceSolver {
    pub fn new() -> Self {
        Self {
            calls: Rc::new(Cell::new(0)),
        }
    }

    /// Handle that keeps counting after the solver was moved away.
    pub fn counter(&self) -> Rc<Cell<usize>> {
        self.calls.clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    /// Some assignment satisfying the constraints under which the goal is
    /// false.
    fn model(&self, query: &Query) -> Option<Assignment> {
        self.calls.set(self.calls.get() + 1);

        let objects = find_symbolic_objects(query.constraints.iter().chain([&query.goal]));
        let bytes: u64 = objects.iter().map(|o| o.size()).sum();
        assert!(bytes <= 2, "brute force over {} bytes is too slow", bytes);

        (0..(1u64 << (8 * bytes))).find_map(|candidate| {
            let assignment = split(&objects, candidate);
            let goal_false = assignment
                .evaluate(&query.goal)
                .map_or(false, |goal| goal.is_false());

            if goal_false && assignment.satisfies(&query.constraints) {
                trace!("brute force found {}", assignment);
                Some(assignment)
            } else {
                None
            }
        })
    }
}

impl Solver for BruteForceSolver {
    fn name(&self) -> &'static str {
        "brute-force"
    }

    fn compute_truth(&mut self, query: &Query) -> Result<bool, SolverError> {
        Ok(self.model(query).is_none())
    }

    fn compute_value(&mut self, query: &Query) -> Result<ExprRef, SolverError> {
        let model = self
            .model(&query.with_false())
            .ok_or(SolverError::Unsatisfiable)?;

        Ok(model.evaluate(&query.goal)?)
    }

    fn compute_initial_values(
        &mut self,
        query: &Query,
        objects: &[ArrayRef],
    ) -> Result<Option<Vec<Vec<u8>>>, SolverError> {
        Ok(self.model(query).map(|model| model.values_for(objects)))
    }
}

fn split(objects: &[ArrayRef], mut candidate: u64) -> Assignment {
    let values = objects
        .iter()
        .map(|object| {
            (0..object.size())
                .map(|_| {
                    let byte = candidate as u8;
                    candidate >>= 8;
                    byte
                })
                .collect()
        })
        .collect();

    Assignment::new(objects, values, false).unwrap()
}

/// Read of a one-byte symbolic array.
#[allow(dead_code)]
pub fn byte(arrays: &ArrayCache, name: &str) -> ExprRef {
    Expr::read_at(&arrays.create_array(name, 1, None, Expr::INT32, Expr::INT8), 0)
}

#[allow(dead_code)]
pub fn c(value: u64) -> ExprRef {
    Expr::constant_u64(value, Expr::INT8)
}
