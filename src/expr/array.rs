use super::{Expr, ExprRef, Width};
use crate::util::{hash_str, MAGIC_HASH_CONSTANT};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

pub type ArrayRef = Rc<Array>;

/// Named symbolic memory object. Arrays with constant values are fully
/// concrete, all others are symbolic.
#[derive(Debug)]
pub struct Array {
    name: String,
    size: u64,
    domain: Width,
    range: Width,
    constant_values: Vec<ExprRef>,
    hash: u32,
}

impl Array {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn domain(&self) -> Width {
        self.domain
    }

    pub fn range(&self) -> Width {
        self.range
    }

    pub fn constant_values(&self) -> &[ExprRef] {
        &self.constant_values
    }

    pub fn is_symbolic(&self) -> bool {
        self.constant_values.is_empty()
    }

    pub fn is_constant(&self) -> bool {
        !self.is_symbolic()
    }

    /// Derived from name and size only.
    pub fn structural_hash(&self) -> u32 {
        self.hash
    }

    pub fn compare(&self, other: &Array) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.size.cmp(&other.size))
            .then_with(|| self.domain.cmp(&other.domain))
            .then_with(|| self.range.cmp(&other.range))
            .then_with(|| self.constant_values.cmp(&other.constant_values))
    }
}

impl PartialEq for Array {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for Array {}

impl Hash for Array {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl fmt::Display for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}] : w{} -> w{}",
            self.name, self.size, self.domain, self.range
        )
    }
}

/// Deduplicates arrays by their attributes. Cloning yields another handle
/// to the same cache; handles are confined to a single thread.
#[derive(Debug, Clone, Default)]
pub struct ArrayCache {
    arrays: Rc<RefCell<HashSet<ArrayRef>>>,
}

impl ArrayCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached array with these attributes, creating it if
    /// absent. `constant_values` must hold exactly `size` constants of
    /// width `range` when given.
    pub fn create_array(
        &self,
        name: &str,
        size: u64,
        constant_values: Option<&[ExprRef]>,
        domain: Width,
        range: Width,
    ) -> ArrayRef {
        let constant_values = constant_values.map(<[ExprRef]>::to_vec).unwrap_or_default();
        assert!(
            constant_values.is_empty() || constant_values.len() as u64 == size,
            "constant initializer of {} has {} values for size {}",
            name,
            constant_values.len(),
            size
        );
        assert!(
            constant_values
                .iter()
                .all(|c| c.is_constant() && c.width() == range),
            "initializer of {} has to consist of w{} constants",
            name,
            range
        );

        let hash = hash_str(name)
            .wrapping_mul(MAGIC_HASH_CONSTANT)
            .wrapping_add(size as u32);
        let candidate = Array {
            name: name.to_string(),
            size,
            domain,
            range,
            constant_values,
            hash,
        };

        let mut arrays = self.arrays.borrow_mut();
        if let Some(existing) = arrays.get(&candidate) {
            return existing.clone();
        }
        let array = Rc::new(candidate);
        arrays.insert(array.clone());
        array
    }

    pub fn len(&self) -> usize {
        self.arrays.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One point write of an update list.
#[derive(Debug)]
pub struct UpdateNode {
    index: ExprRef,
    value: ExprRef,
    next: Option<Rc<UpdateNode>>,
    hash: u32,
    size: usize,
}

impl UpdateNode {
    pub fn index(&self) -> &ExprRef {
        &self.index
    }

    pub fn value(&self) -> &ExprRef {
        &self.value
    }

    pub fn next(&self) -> Option<&Rc<UpdateNode>> {
        self.next.as_ref()
    }
}

/// Persistent list of writes on top of a root array, newest write first.
#[derive(Debug, Clone)]
pub struct UpdateList {
    root: ArrayRef,
    head: Option<Rc<UpdateNode>>,
}

impl UpdateList {
    pub fn new(root: ArrayRef, head: Option<Rc<UpdateNode>>) -> Self {
        Self { root, head }
    }

    pub fn root(&self) -> &ArrayRef {
        &self.root
    }

    pub fn head(&self) -> Option<&Rc<UpdateNode>> {
        self.head.as_ref()
    }

    pub fn len(&self) -> usize {
        self.head.as_ref().map_or(0, |head| head.size)
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Records a write in front of all previous ones. Lists sharing the old
    /// head are unaffected.
    pub fn extend(&mut self, index: ExprRef, value: ExprRef) {
        assert_eq!(index.width(), self.root.domain(), "update index width mismatch");
        assert_eq!(value.width(), self.root.range(), "update value width mismatch");

        let next = self.head.take();
        // Plain xor: two identical writes cancel each other out. Persisted
        // cache keys are built from this exact mix, keep it stable.
        let hash = index.structural_hash()
            ^ value.structural_hash()
            ^ next.as_ref().map_or(0, |n| n.hash);
        let size = 1 + next.as_ref().map_or(0, |n| n.size);
        self.head = Some(Rc::new(UpdateNode {
            index,
            value,
            next,
            hash,
            size,
        }));
    }

    /// Iterates the writes from newest to oldest.
    pub fn iter(&self) -> UpdateIter<'_> {
        UpdateIter {
            current: self.head.as_deref(),
        }
    }

    pub fn structural_hash(&self) -> u32 {
        let mut res = self.root.structural_hash();
        if let Some(head) = &self.head {
            res ^= head.hash;
        }
        res
    }

    pub fn compare(&self, other: &UpdateList) -> Ordering {
        let order = self
            .root
            .compare(&other.root)
            .then_with(|| self.len().cmp(&other.len()));
        if order != Ordering::Equal {
            return order;
        }

        for (a, b) in self.iter().zip(other.iter()) {
            if std::ptr::eq(a, b) {
                // the remaining tails are shared
                return Ordering::Equal;
            }
            let order = a
                .index
                .compare(&b.index)
                .then_with(|| a.value.compare(&b.value));
            if order != Ordering::Equal {
                return order;
            }
        }
        Ordering::Equal
    }
}

pub struct UpdateIter<'a> {
    current: Option<&'a UpdateNode>,
}

impl<'a> Iterator for UpdateIter<'a> {
    type Item = &'a UpdateNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current?;
        self.current = node.next.as_deref();
        Some(node)
    }
}

impl From<ArrayRef> for UpdateList {
    fn from(root: ArrayRef) -> Self {
        Self::new(root, None)
    }
}

impl Expr {
    /// Reads a byte of `array` at a constant position.
    pub fn read_at(array: &ArrayRef, index: u64) -> ExprRef {
        Expr::read(
            UpdateList::from(array.clone()),
            Expr::constant_u64(index, array.domain()),
        )
    }
}
