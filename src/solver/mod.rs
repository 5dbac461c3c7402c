pub mod caching;

pub use self::caching::CachingSolver;

use crate::assignment::AssignmentError;
use crate::expr::{ArrayRef, Expr, ExprRef};
use log::debug;
use std::{convert::From, fmt, io, time::Duration};
use thiserror::Error;

/// A set of path constraints together with the goal expression whose
/// validity, truth or value is asked for.
#[derive(Debug, Clone)]
pub struct Query {
    pub constraints: Vec<ExprRef>,
    pub goal: ExprRef,
}

impl Query {
    pub fn new(constraints: Vec<ExprRef>, goal: ExprRef) -> Self {
        Self { constraints, goal }
    }

    pub fn with_goal(&self, goal: ExprRef) -> Self {
        Self::new(self.constraints.clone(), goal)
    }

    /// Same constraints, goal `false`. Initial values for this query satisfy
    /// the constraints alone.
    pub fn with_false(&self) -> Self {
        self.with_goal(Expr::bool(false))
    }

    pub fn negate_goal(&self) -> Self {
        self.with_goal(Expr::is_zero(&self.goal))
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "(query")?;
        for constraint in &self.constraints {
            writeln!(f, "  {}", constraint)?;
        }
        write!(f, "  goal {})", self.goal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    True,
    False,
    Unknown,
}

/// Decision procedure protocol. `compute_initial_values` answers for the
/// constraints conjoined with the negated goal and returns `None` when no
/// such assignment exists.
pub trait Solver {
    fn name(&self) -> &'static str;

    /// Whether the goal holds under every assignment satisfying the
    /// constraints.
    fn compute_truth(&mut self, query: &Query) -> Result<bool, SolverError>;

    fn compute_validity(&mut self, query: &Query) -> Result<Validity, SolverError> {
        debug!("deriving validity with {} solver", self.name());

        if self.compute_truth(query)? {
            Ok(Validity::True)
        } else if self.compute_truth(&query.negate_goal())? {
            Ok(Validity::False)
        } else {
            Ok(Validity::Unknown)
        }
    }

    /// Some value the goal can take under the constraints.
    fn compute_value(&mut self, query: &Query) -> Result<ExprRef, SolverError>;

    fn compute_initial_values(
        &mut self,
        query: &Query,
        objects: &[ArrayRef],
    ) -> Result<Option<Vec<Vec<u8>>>, SolverError>;

    fn constraint_log(&self, query: &Query) -> String {
        query.to_string()
    }

    fn set_timeout(&mut self, _timeout: Option<Duration>) {}
}

#[derive(Debug, Error, Clone)]
pub enum SolverError {
    #[error("failed to compute satisfiability within the given limits")]
    SatUnknown,

    #[error("could not find a satisfiable assignment before timing out")]
    Timeout,

    #[error("solver failed with IO error")]
    IoError(String),

    #[error("constraints are unsatisfiable, no value exists")]
    Unsatisfiable,

    #[error("failed to evaluate cached assignment: {0}")]
    Evaluation(#[from] AssignmentError),

    #[error("backend solver failed: {0}")]
    Backend(String),
}

impl From<io::Error> for SolverError {
    fn from(err: io::Error) -> Self {
        SolverError::IoError(err.to_string())
    }
}
