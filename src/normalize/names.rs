use crate::assignment::{Assignment, AssignmentError};
use crate::expr::visitor::{find_array_names, ExprVisitor, VisitMemo};
use crate::expr::{ArrayCache, ArrayRef, ExprRef};
use indexmap::IndexMap;
use log::{trace, warn};
use std::collections::HashMap;

//
// Public Interface
//

/// Alpha-renames the arrays of one constraint set to `VAR0`, `VAR1`, ...
/// in the order a pre-order traversal first meets them.
pub struct NameNormalizer {
    arrays: ArrayCache,
    to_canonical: IndexMap<String, String>,
    from_canonical: HashMap<String, String>,
}

impl NameNormalizer {
    pub fn new<'a, I>(arrays: &ArrayCache, exprs: I) -> Self
    where
        I: IntoIterator<Item = &'a ExprRef>,
    {
        let mut to_canonical = IndexMap::new();
        let mut from_canonical = HashMap::new();
        for (i, name) in find_array_names(exprs).into_iter().enumerate() {
            let canonical = format!("VAR{}", i);
            trace!("normalizing array {} to {}", name, canonical);
            from_canonical.insert(canonical.clone(), name.clone());
            to_canonical.insert(name, canonical);
        }

        Self {
            arrays: arrays.clone(),
            to_canonical,
            from_canonical,
        }
    }

    /// Original to canonical names in discovery order.
    pub fn mappings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.to_canonical
            .iter()
            .map(|(from, to)| (from.as_str(), to.as_str()))
    }

    pub fn is_canonical(&self, name: &str) -> bool {
        self.from_canonical.contains_key(name)
    }

    pub fn normalize_exprs<'a, I>(&self, exprs: I) -> Vec<ExprRef>
    where
        I: IntoIterator<Item = &'a ExprRef>,
    {
        let mut renamer = Renamer {
            normalizer: self,
            inverse: false,
            memo: VisitMemo::new(),
        };
        exprs.into_iter().map(|expr| renamer.visit(expr)).collect()
    }

    pub fn denormalize_exprs<'a, I>(&self, exprs: I) -> Vec<ExprRef>
    where
        I: IntoIterator<Item = &'a ExprRef>,
    {
        let mut renamer = Renamer {
            normalizer: self,
            inverse: true,
            memo: VisitMemo::new(),
        };
        exprs.into_iter().map(|expr| renamer.visit(expr)).collect()
    }

    /// Arrays that do not occur in the normalized set keep their name.
    pub fn normalize_array(&self, array: &ArrayRef) -> ArrayRef {
        match self.to_canonical.get(array.name()) {
            Some(canonical) => self.renamed(array, canonical),
            None => array.clone(),
        }
    }

    /// `None` if `array` does not carry a name handed out by this normalizer.
    pub fn denormalize_array(&self, array: &ArrayRef) -> Option<ArrayRef> {
        self.from_canonical
            .get(array.name())
            .map(|original| self.renamed(array, original))
    }

    pub fn normalize_assignment(
        &self,
        assignment: &Assignment,
    ) -> Result<Assignment, AssignmentError> {
        self.map_assignment(assignment, |array| Some(self.normalize_array(array)))
    }

    /// Bindings of arrays this normalizer never renamed are dropped, a
    /// superset entry may bind arrays the current set does not mention.
    pub fn denormalize_assignment(
        &self,
        assignment: &Assignment,
    ) -> Result<Assignment, AssignmentError> {
        self.map_assignment(assignment, |array| self.denormalize_array(array))
    }
}

//
// Private Implementation
//

impl NameNormalizer {
    fn renamed(&self, array: &ArrayRef, name: &str) -> ArrayRef {
        let constants = if array.is_constant() {
            Some(array.constant_values())
        } else {
            None
        };
        self.arrays.create_array(
            name,
            array.size(),
            constants,
            array.domain(),
            array.range(),
        )
    }

    fn map_assignment<F>(
        &self,
        assignment: &Assignment,
        rename: F,
    ) -> Result<Assignment, AssignmentError>
    where
        F: Fn(&ArrayRef) -> Option<ArrayRef>,
    {
        let mut mapped = Assignment::empty(assignment.allow_free_values());
        for (array, bytes) in assignment.bindings() {
            match rename(array) {
                Some(renamed) => mapped.bind(renamed, bytes.to_vec())?,
                None => trace!("dropping binding of foreign array {}", array.name()),
            }
        }
        Ok(mapped)
    }
}

struct Renamer<'a> {
    normalizer: &'a NameNormalizer,
    inverse: bool,
    memo: VisitMemo,
}

impl<'a> ExprVisitor for Renamer<'a> {
    fn memo(&mut self) -> &mut VisitMemo {
        &mut self.memo
    }

    fn visit_array(&mut self, array: &ArrayRef) -> ArrayRef {
        if self.inverse {
            self.normalizer.denormalize_array(array).unwrap_or_else(|| {
                warn!("array {} was never produced by name normalization", array.name());
                array.clone()
            })
        } else {
            self.normalizer.normalize_array(array)
        }
    }
}
