//! Persistent answer cache for constraint sets.
//!
//! A cached answer is either an assignment (the key is satisfiable) or
//! `None` (the key is proven unsatisfiable). A finder returning `None` from
//! a lookup has no entry at all, so lookups yield `Option<Answer>`.

pub mod chain;
pub mod map_of_sets;
pub mod remote;
pub mod shards;
pub mod trie;
pub mod trie_finder;

pub use chain::{ChainingFinder, CollectingFinder, NameNormalizingFinder};
pub use map_of_sets::{MapOfSets, MapOfSetsFinder};
pub use remote::{KeyMode, KeyValueStore, MemoryStore, RedisStore, RemoteFinder};
pub use trie::Trie;
pub use trie_finder::TrieFinder;

use crate::assignment::Assignment;
use crate::expr::ExprRef;
use std::fmt;
use std::rc::Rc;

//
// Public Interface
//

pub type Answer = Option<Rc<Assignment>>;

/// Constraint set in canonical order: sorted by structural hash, ties broken
/// by structural comparison, without duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    exprs: Vec<ExprRef>,
}

impl CacheKey {
    pub fn new<I>(exprs: I) -> Self
    where
        I: IntoIterator<Item = ExprRef>,
    {
        let mut exprs: Vec<ExprRef> = exprs.into_iter().collect();
        exprs.sort_by(|a, b| {
            a.structural_hash()
                .cmp(&b.structural_hash())
                .then_with(|| a.compare(b))
        });
        exprs.dedup_by(|a, b| a == b);
        Self { exprs }
    }

    pub fn exprs(&self) -> &[ExprRef] {
        &self.exprs
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    /// The branching sequence used by the set indices.
    pub fn hashes(&self) -> Vec<u32> {
        self.exprs.iter().map(|e| e.structural_hash()).collect()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, expr) in self.exprs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", expr)?;
        }
        write!(f, "]")
    }
}

pub fn is_unsat(answer: &Answer) -> bool {
    answer.is_none()
}

pub fn is_sat(answer: &Answer) -> bool {
    answer.is_some()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinderStats {
    pub hits: u64,
    pub misses: u64,
    pub special_hits: u64,
    pub special_misses: u64,
}

impl FinderStats {
    pub fn record(&mut self, found: &Option<Answer>) {
        if found.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
    }

    pub fn record_special(&mut self, found: &Option<Answer>) {
        if found.is_some() {
            self.special_hits += 1;
        } else {
            self.special_misses += 1;
        }
    }
}

impl fmt::Display for FinderStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits: {}, misses: {}, special hits: {}, special misses: {}",
            self.hits, self.misses, self.special_hits, self.special_misses
        )
    }
}

/// A cache backend or a composition of backends.
pub trait Finder {
    fn name(&self) -> &str;

    /// Exact lookup.
    fn find(&mut self, key: &CacheKey) -> Option<Answer>;

    /// Lookup that may also answer from stored subsets or supersets.
    fn find_special(&mut self, key: &CacheKey) -> Option<Answer> {
        self.find(key)
    }

    fn insert(&mut self, key: &CacheKey, answer: &Answer);

    /// Flushes to durable storage.
    fn persist(&mut self) -> anyhow::Result<()>;

    /// Announces an upcoming lookup so slow backends can start early.
    fn prefetch(&mut self, _key: &CacheKey) {}

    fn stats(&self) -> FinderStats;

    fn report(&self) -> String {
        format!("{}: {}", self.name(), self.stats())
    }
}

/// Set index over hash sequences, shared by the trie and the map-of-sets.
/// `key` is sorted ascending and may repeat a hash.
pub trait SetIndex {
    fn lookup(&self, key: &[u32]) -> Option<&Answer>;

    /// Some stored subset of `key` whose answer passes `pred`.
    fn find_subset(&self, key: &[u32], pred: &dyn Fn(&Answer) -> bool) -> Option<&Answer>;

    /// Some stored superset of `key` whose answer passes `pred`.
    fn find_superset(&self, key: &[u32], pred: &dyn Fn(&Answer) -> bool) -> Option<&Answer>;
}

/// Answers `key` from related entries: an unsatisfiable subset, a
/// satisfiable superset, or a subset whose assignment happens to satisfy
/// the whole key.
pub fn find_fuzzy<S>(index: &S, key: &CacheKey) -> Option<Answer>
where
    S: SetIndex + ?Sized,
{
    let hashes = key.hashes();

    if let Some(found) = index.find_subset(&hashes, &is_unsat) {
        return Some(found.clone());
    }
    if let Some(found) = index.find_superset(&hashes, &is_sat) {
        return Some(found.clone());
    }
    let satisfies_key = |answer: &Answer| match answer {
        Some(assignment) => assignment.satisfies(key.exprs()),
        None => false,
    };
    index.find_subset(&hashes, &satisfies_key).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{ArrayCache, Expr};

    #[test]
    fn keys_are_sorted_and_deduplicated() {
        let cache = ArrayCache::new();
        let x = Expr::read_at(&cache.create_array("x", 1, None, Expr::INT32, Expr::INT8), 0);
        let a = Expr::eq(&x, &Expr::constant_u64(1, Expr::INT8));
        let b = Expr::ult(&x, &Expr::constant_u64(9, Expr::INT8));
        let a_again = Expr::eq(&x, &Expr::constant_u64(1, Expr::INT8));

        let key = CacheKey::new(vec![b.clone(), a.clone(), a_again]);
        let reversed = CacheKey::new(vec![a, b]);

        assert_eq!(key.len(), 2);
        assert_eq!(key, reversed);
        let hashes = key.hashes();
        assert!(hashes.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn stats_count_hits_and_misses_separately() {
        let mut stats = FinderStats::default();
        stats.record(&Some(None));
        stats.record(&None);
        stats.record_special(&None);

        assert_eq!(
            stats,
            FinderStats {
                hits: 1,
                misses: 1,
                special_hits: 0,
                special_misses: 1,
            }
        );
    }
}
