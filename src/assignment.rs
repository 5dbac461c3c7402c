use crate::bitvec::BitVector;
use crate::expr::serialize::{encode_array, ArrayRecord, DecodeError, Decoder};
use crate::expr::visitor::rebuild;
use crate::expr::{Array, ArrayRef, Expr, ExprRef, HashableExprRef, Node, UpdateList};
use indexmap::IndexMap;
use log::trace;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

//
// Public Interface
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssignmentError {
    #[error("free variable {array} encountered during evaluation")]
    FreeVariable { array: String },

    #[error("expression does not evaluate to a constant")]
    NotConstant,

    #[error("binding of {array} holds {actual} bytes but the array has {expected}")]
    BindingSize {
        array: String,
        expected: u64,
        actual: usize,
    },
}

/// Concrete values for symbolic arrays, one byte vector per array.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Assignment {
    allow_free_values: bool,
    bindings: IndexMap<ArrayRef, Vec<u8>>,
}

impl Assignment {
    pub fn new(
        objects: &[ArrayRef],
        values: Vec<Vec<u8>>,
        allow_free_values: bool,
    ) -> Result<Self, AssignmentError> {
        assert_eq!(objects.len(), values.len(), "one value vector per object");

        let mut assignment = Self::empty(allow_free_values);
        for (array, bytes) in objects.iter().zip(values) {
            assignment.bind(array.clone(), bytes)?;
        }
        Ok(assignment)
    }

    pub fn empty(allow_free_values: bool) -> Self {
        Self {
            allow_free_values,
            bindings: IndexMap::new(),
        }
    }

    pub fn bind(&mut self, array: ArrayRef, bytes: Vec<u8>) -> Result<(), AssignmentError> {
        if bytes.len() as u64 != array.size() {
            return Err(AssignmentError::BindingSize {
                array: array.name().to_string(),
                expected: array.size(),
                actual: bytes.len(),
            });
        }
        self.bindings.insert(array, bytes);
        Ok(())
    }

    pub fn get(&self, array: &Array) -> Option<&[u8]> {
        self.bindings.get(array).map(Vec::as_slice)
    }

    pub fn bindings(&self) -> impl Iterator<Item = (&ArrayRef, &[u8])> {
        self.bindings.iter().map(|(array, bytes)| (array, bytes.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn allow_free_values(&self) -> bool {
        self.allow_free_values
    }

    /// Bytes for each of `objects`, zero-filled where unbound.
    pub fn values_for(&self, objects: &[ArrayRef]) -> Vec<Vec<u8>> {
        objects
            .iter()
            .map(|array| {
                self.get(array)
                    .map(<[u8]>::to_vec)
                    .unwrap_or_else(|| vec![0; array.size() as usize])
            })
            .collect()
    }

    /// Substitutes the bound values into `expr` and folds it to a constant.
    pub fn evaluate(&self, expr: &ExprRef) -> Result<ExprRef, AssignmentError> {
        let mut memo = HashMap::new();
        let result = self.eval(expr, &mut memo)?;
        if result.is_constant() {
            Ok(result)
        } else {
            Err(AssignmentError::NotConstant)
        }
    }

    /// True iff every expression evaluates to constant true. Stops at the
    /// first one that does not.
    pub fn satisfies<'a, I>(&self, exprs: I) -> bool
    where
        I: IntoIterator<Item = &'a ExprRef>,
    {
        exprs.into_iter().all(|expr| match self.evaluate(expr) {
            Ok(value) => value.is_true(),
            Err(e) => {
                trace!("assignment cannot decide {}: {}", expr, e);
                false
            }
        })
    }

    /// The assignment itself as constraints `Read(array, i) == byte`.
    pub fn create_constraints(&self) -> Vec<ExprRef> {
        let mut constraints = Vec::new();
        for (array, bytes) in &self.bindings {
            for (position, byte) in bytes.iter().enumerate() {
                constraints.push(Expr::eq(
                    &Expr::read_at(array, position as u64),
                    &Expr::constant_u64(u64::from(*byte), array.range()),
                ));
            }
        }
        constraints
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (array, bytes)) in self.bindings.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {:?}", array.name(), bytes)?;
        }
        write!(f, "}}")
    }
}

/// Persisted form of a cached answer. `no_binding` marks a proven
/// unsatisfiable key, which is distinct from an assignment without bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    #[serde(default)]
    pub no_binding: bool,
    #[serde(default)]
    pub allow_free_values: bool,
    #[serde(default)]
    pub bindings: Vec<BindingRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingRecord {
    pub array: ArrayRecord,
    pub values: Vec<u8>,
}

impl AssignmentRecord {
    pub fn encode(answer: Option<&Assignment>) -> Self {
        match answer {
            None => Self {
                no_binding: true,
                allow_free_values: false,
                bindings: vec![],
            },
            Some(assignment) => Self {
                no_binding: false,
                allow_free_values: assignment.allow_free_values,
                bindings: assignment
                    .bindings
                    .iter()
                    .map(|(array, values)| BindingRecord {
                        array: encode_array(array),
                        values: values.clone(),
                    })
                    .collect(),
            },
        }
    }

    pub fn decode(&self, decoder: &Decoder) -> Result<Option<Assignment>, DecodeError> {
        if self.no_binding {
            return Ok(None);
        }

        let mut assignment = Assignment::empty(self.allow_free_values);
        for binding in &self.bindings {
            let array = decoder.decode_array(&binding.array)?;
            if binding.values.len() as u64 != array.size() {
                return Err(DecodeError::BindingSize {
                    array: array.name().to_string(),
                    expected: array.size(),
                    actual: binding.values.len(),
                });
            }
            assignment.bindings.insert(array, binding.values.clone());
        }
        Ok(Some(assignment))
    }
}

//
// Private Implementation
//

type EvalMemo = HashMap<HashableExprRef, ExprRef>;

impl Assignment {
    fn eval(&self, expr: &ExprRef, memo: &mut EvalMemo) -> Result<ExprRef, AssignmentError> {
        if expr.is_constant() {
            return Ok(expr.clone());
        }
        let key = HashableExprRef::from(expr);
        if let Some(done) = memo.get(&key) {
            return Ok(done.clone());
        }

        let result = match expr.node() {
            Node::NotOptimized(inner) => self.eval(inner, memo)?,
            Node::Read { updates, index } => {
                let index = self.eval(index, memo)?;
                self.eval_read(updates, &index, memo)?
            }
            _ => {
                let kids = expr
                    .kids()
                    .into_iter()
                    .map(|kid| self.eval(kid, memo))
                    .collect::<Result<Vec<_>, _>>()?;
                rebuild(expr, &kids)
            }
        };

        memo.insert(key, result.clone());
        Ok(result)
    }

    fn eval_read(
        &self,
        updates: &UpdateList,
        index: &ExprRef,
        memo: &mut EvalMemo,
    ) -> Result<ExprRef, AssignmentError> {
        let position = index.as_constant().ok_or(AssignmentError::NotConstant)?;

        for update in updates.iter() {
            let written = self.eval(update.index(), memo)?;
            match written.as_constant() {
                Some(at) if at == position => return self.eval(update.value(), memo),
                Some(_) => {}
                None => return Err(AssignmentError::NotConstant),
            }
        }

        let root = updates.root();
        let range = root.range();
        let offset = position.to_u64().filter(|p| *p < root.size());

        if root.is_constant() {
            return Ok(match offset {
                Some(p) => root.constant_values()[p as usize].clone(),
                None => Expr::zero(range),
            });
        }

        match self.get(root) {
            Some(bytes) => Ok(match offset {
                Some(p) => Expr::constant(BitVector::from_u64(u64::from(bytes[p as usize]), range)),
                None => Expr::zero(range),
            }),
            None if self.allow_free_values => Ok(Expr::zero(range)),
            None => Err(AssignmentError::FreeVariable {
                array: root.name().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ArrayCache;

    fn byte_array(cache: &ArrayCache, name: &str, size: u64) -> ArrayRef {
        cache.create_array(name, size, None, Expr::INT32, Expr::INT8)
    }

    #[test]
    fn evaluation_sees_through_not_optimized() {
        let cache = ArrayCache::new();
        let array = byte_array(&cache, "simple_array", 1);
        let assignment = Assignment::new(&[array.clone()], vec![vec![128]], false).unwrap();

        let read = Expr::not_optimized(&Expr::read_at(&array, 0));
        let value = assignment.evaluate(&read).unwrap();

        assert_eq!(value, Expr::constant_u64(128, Expr::INT8));
    }

    #[test]
    fn writes_shadow_bound_values() {
        let cache = ArrayCache::new();
        let mem = byte_array(&cache, "mem", 4);
        let idx = byte_array(&cache, "idx", 1);
        let assignment =
            Assignment::new(&[mem.clone(), idx.clone()], vec![vec![1, 2, 3, 4], vec![2]], false)
                .unwrap();

        let mut updates = UpdateList::from(mem);
        updates.extend(Expr::constant_u64(2, Expr::INT32), Expr::constant_u64(99, Expr::INT8));
        let at = Expr::zext(&Expr::read_at(&idx, 0), Expr::INT32);
        let shadowed = Expr::read(updates.clone(), at);
        let untouched = Expr::read(updates, Expr::constant_u64(3, Expr::INT32));

        assert_eq!(
            assignment.evaluate(&shadowed).unwrap(),
            Expr::constant_u64(99, Expr::INT8)
        );
        assert_eq!(
            assignment.evaluate(&untouched).unwrap(),
            Expr::constant_u64(4, Expr::INT8)
        );
    }

    #[test]
    fn free_variables_are_an_error_unless_allowed() {
        let cache = ArrayCache::new();
        let x = byte_array(&cache, "x", 1);
        let read = Expr::read_at(&x, 0);

        assert_eq!(
            Assignment::empty(false).evaluate(&read),
            Err(AssignmentError::FreeVariable {
                array: "x".to_string()
            })
        );
        assert_eq!(
            Assignment::empty(true).evaluate(&read).unwrap(),
            Expr::zero(Expr::INT8)
        );
    }

    #[test]
    fn out_of_range_reads_evaluate_to_zero() {
        let cache = ArrayCache::new();
        let x = byte_array(&cache, "x", 2);
        let assignment = Assignment::new(&[x.clone()], vec![vec![5, 6]], false).unwrap();

        assert_eq!(
            assignment.evaluate(&Expr::read_at(&x, 7)).unwrap(),
            Expr::zero(Expr::INT8)
        );
    }

    #[test]
    fn binding_size_has_to_match_the_array() {
        let cache = ArrayCache::new();
        let x = byte_array(&cache, "x", 2);

        assert!(matches!(
            Assignment::new(&[x], vec![vec![1]], false),
            Err(AssignmentError::BindingSize { .. })
        ));
    }

    #[test]
    fn satisfies_checks_every_constraint() {
        let cache = ArrayCache::new();
        let x = Expr::read_at(&byte_array(&cache, "x", 1), 0);
        let ten = Expr::constant_u64(10, Expr::INT8);
        let twenty = Expr::constant_u64(20, Expr::INT8);
        let array = byte_array(&cache, "x", 1);
        let assignment = Assignment::new(&[array], vec![vec![10]], false).unwrap();

        assert!(assignment.satisfies(&[Expr::eq(&x, &ten), Expr::ult(&x, &twenty)]));
        assert!(!assignment.satisfies(&[Expr::eq(&x, &ten), Expr::ult(&twenty, &x)]));
        assert!(assignment.satisfies(&assignment.create_constraints()));
    }

    #[test]
    fn decoded_assignment_evaluates_like_the_original() {
        let cache = ArrayCache::new();
        let a = byte_array(&cache, "a", 2);
        let b = byte_array(&cache, "b", 1);
        let assignment = Assignment::new(&[a.clone(), b.clone()], vec![vec![3, 4], vec![7]], false)
            .unwrap();
        let expr = Expr::add(
            &Expr::concat_bytes(&[Expr::read_at(&a, 0), Expr::read_at(&a, 1)]),
            &Expr::zext(&Expr::read_at(&b, 0), Expr::INT16),
        );

        let json = serde_json::to_string(&AssignmentRecord::encode(Some(&assignment))).unwrap();
        let record: AssignmentRecord = serde_json::from_str(&json).unwrap();
        let decoded = record.decode(&Decoder::new(&cache)).unwrap().unwrap();

        assert_eq!(decoded, assignment);
        assert_eq!(decoded.evaluate(&expr), assignment.evaluate(&expr));
        assert_eq!(
            decoded.evaluate(&expr).unwrap(),
            Expr::constant_u64(0x0403 + 7, Expr::INT16)
        );
    }

    #[test]
    fn no_binding_is_distinct_from_an_empty_assignment() {
        let cache = ArrayCache::new();
        let decoder = Decoder::new(&cache);
        let unsat = AssignmentRecord::encode(None);
        let empty = AssignmentRecord::encode(Some(&Assignment::empty(true)));

        assert_ne!(unsat, empty);
        assert_eq!(unsat.decode(&decoder), Ok(None));
        assert_eq!(empty.decode(&decoder), Ok(Some(Assignment::empty(true))));
    }

    #[test]
    fn decoding_rejects_bindings_of_the_wrong_size() {
        let cache = ArrayCache::new();
        let x = byte_array(&cache, "x", 2);
        let mut record = AssignmentRecord::encode(Some(
            &Assignment::new(&[x], vec![vec![1, 2]], false).unwrap(),
        ));
        record.bindings[0].values.push(3);

        assert!(matches!(
            record.decode(&Decoder::new(&cache)),
            Err(DecodeError::BindingSize { .. })
        ));
    }
}
