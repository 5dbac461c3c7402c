use super::{Query, Solver, SolverError, Validity};
use crate::assignment::Assignment;
use crate::config::{build_finder, CacheOptions};
use crate::expr::visitor::find_symbolic_objects;
use crate::expr::{ArrayCache, ArrayRef, Expr, ExprRef};
use crate::normalize::AlgebraNormalizer;
use crate::pcache::{Answer, CacheKey, Finder};
use crate::stats::CacheStats;
use log::{debug, trace, warn};
use std::rc::Rc;
use std::time::Duration;

/// Answers queries from a finder pipeline and asks the wrapped solver only
/// on a miss. Every solver answer is inserted before it is returned.
pub struct CachingSolver<S: Solver> {
    solver: S,
    finder: Box<dyn Finder>,
    algebra_normalization: bool,
    dirty: bool,
    stats: CacheStats,
}

impl<S: Solver> CachingSolver<S> {
    pub fn new(solver: S, finder: Box<dyn Finder>) -> Self {
        Self {
            solver,
            finder,
            algebra_normalization: false,
            dirty: false,
            stats: CacheStats::new(),
        }
    }

    /// Wraps `solver` into the finder pipeline and key normalizations
    /// selected by `options`.
    pub fn from_options(
        solver: S,
        options: &CacheOptions,
        arrays: &ArrayCache,
    ) -> anyhow::Result<Self> {
        let finder = build_finder(options, arrays)?;
        Ok(Self::new(solver, finder).with_algebra_normalization(options.algebra_normalization))
    }

    pub fn with_algebra_normalization(mut self, enabled: bool) -> Self {
        self.algebra_normalization = enabled;
        self
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn report(&self) -> String {
        format!("{}\n{}", self.stats, self.finder.report())
    }

    /// Flushes the finder pipeline. Also done on drop when needed.
    pub fn persist(&mut self) -> anyhow::Result<()> {
        self.finder.persist()?;
        self.dirty = false;
        Ok(())
    }

    /// Answer for the constraints conjoined with the negated goal: an
    /// assignment satisfying both, or `None` if there is none.
    pub fn get_assignment(&mut self, query: &Query) -> Result<Answer, SolverError> {
        self.stats.queries += 1;
        let (result, took) = time!({ self.lookup_or_solve(query) });
        self.stats.total_time += took;
        result
    }
}

impl<S: Solver> Solver for CachingSolver<S> {
    fn name(&self) -> &'static str {
        "caching"
    }

    fn compute_truth(&mut self, query: &Query) -> Result<bool, SolverError> {
        Ok(self.get_assignment(query)?.is_none())
    }

    fn compute_validity(&mut self, query: &Query) -> Result<Validity, SolverError> {
        if query.goal.is_true() {
            return Ok(Validity::True);
        }

        let model = match self.get_assignment(&query.with_false())? {
            Some(model) => model,
            // nothing satisfies the constraints, so everything follows
            None => return Ok(Validity::True),
        };

        if model.evaluate(&query.goal)?.is_true() {
            match self.get_assignment(query)? {
                None => Ok(Validity::True),
                Some(_) => Ok(Validity::Unknown),
            }
        } else {
            match self.get_assignment(&query.negate_goal())? {
                None => Ok(Validity::False),
                Some(_) => Ok(Validity::Unknown),
            }
        }
    }

    fn compute_value(&mut self, query: &Query) -> Result<ExprRef, SolverError> {
        match self.get_assignment(&query.with_false())? {
            Some(model) => Ok(model.evaluate(&query.goal)?),
            None => Err(SolverError::Unsatisfiable),
        }
    }

    fn compute_initial_values(
        &mut self,
        query: &Query,
        objects: &[ArrayRef],
    ) -> Result<Option<Vec<Vec<u8>>>, SolverError> {
        Ok(self
            .get_assignment(query)?
            .map(|model| model.values_for(objects)))
    }

    fn constraint_log(&self, query: &Query) -> String {
        self.solver.constraint_log(query)
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.solver.set_timeout(timeout)
    }
}

impl<S: Solver> Drop for CachingSolver<S> {
    fn drop(&mut self) {
        if self.dirty {
            if let Err(e) = self.persist() {
                warn!("failed to persist cache: {:#}", e);
            }
        }
    }
}

//
// Private Implementation
//

impl<S: Solver> CachingSolver<S> {
    fn lookup_or_solve(&mut self, query: &Query) -> Result<Answer, SolverError> {
        let negated = Expr::is_zero(&query.goal);
        if negated.is_false() {
            trace!("goal is a tautology, negation has no model");
            return Ok(None);
        }

        let mut exprs = query.constraints.clone();
        if !negated.is_true() {
            exprs.push(negated);
        }
        let key = CacheKey::new(exprs);
        if key.is_empty() {
            return Ok(Some(Rc::new(Assignment::empty(true))));
        }

        let lookup_key = if self.algebra_normalization {
            CacheKey::new(AlgebraNormalizer::new().normalize_all(key.exprs()))
        } else {
            key.clone()
        };

        self.finder.prefetch(&lookup_key);
        let (found, took) = time!({ self.finder.find(&lookup_key) });
        self.stats.looked_up(took);

        match found {
            Some(None) => {
                debug!("cache proves {} constraints unsatisfiable", key.len());
                self.stats.hit();
                return Ok(None);
            }
            Some(Some(model)) if model.satisfies(key.exprs()) => {
                debug!("cache provides a model for {} constraints", key.len());
                self.stats.hit();
                return Ok(Some(model));
            }
            Some(Some(_)) => {
                warn!("cached model does not satisfy its key, asking the solver");
            }
            None => {}
        }
        self.stats.miss();

        let objects = find_symbolic_objects(key.exprs());
        self.stats.solver_calls += 1;
        let answer = match self.solver.compute_initial_values(query, &objects)? {
            Some(values) => Some(Rc::new(Assignment::new(&objects, values, true)?)),
            None => None,
        };

        let ((), took) = time!({ self.finder.insert(&lookup_key, &answer) });
        self.stats.inserted(took);
        self.dirty = true;

        Ok(answer)
    }
}
