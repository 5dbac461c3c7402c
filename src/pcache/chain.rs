use super::{Answer, CacheKey, Finder, FinderStats};
use crate::expr::ArrayCache;
use crate::normalize::NameNormalizer;
use anyhow::Result;
use log::{debug, trace, warn};
use std::rc::Rc;

/// Consults backends in priority order. A hit is promoted into every
/// earlier backend that missed; inserts go to all backends.
pub struct ChainingFinder {
    finders: Vec<Box<dyn Finder>>,
    try_all: bool,
    stats: FinderStats,
}

impl ChainingFinder {
    pub fn new(finders: Vec<Box<dyn Finder>>, try_all: bool) -> Self {
        Self {
            finders,
            try_all,
            stats: FinderStats::default(),
        }
    }

    pub fn finders(&self) -> &[Box<dyn Finder>] {
        &self.finders
    }

    fn search<F>(&mut self, key: &CacheKey, mut lookup: F) -> Option<Answer>
    where
        F: FnMut(&mut dyn Finder, &CacheKey) -> Option<Answer>,
    {
        for position in 0..self.finders.len() {
            if let Some(answer) = lookup(self.finders[position].as_mut(), key) {
                debug!(
                    "{} answered a key of {} constraints",
                    self.finders[position].name(),
                    key.len()
                );
                for earlier in &mut self.finders[..position] {
                    trace!("promoting answer into {}", earlier.name());
                    earlier.insert(key, &answer);
                }
                return Some(answer);
            }
        }
        None
    }
}

impl Finder for ChainingFinder {
    fn name(&self) -> &str {
        "chain"
    }

    fn find(&mut self, key: &CacheKey) -> Option<Answer> {
        let mut found = self.search(key, |finder, key| finder.find(key));
        self.stats.record(&found);

        if found.is_none() && self.try_all {
            found = self.find_special(key);
        }
        found
    }

    fn find_special(&mut self, key: &CacheKey) -> Option<Answer> {
        let found = self.search(key, |finder, key| finder.find_special(key));
        self.stats.record_special(&found);
        found
    }

    fn insert(&mut self, key: &CacheKey, answer: &Answer) {
        for finder in &mut self.finders {
            finder.insert(key, answer);
        }
    }

    fn persist(&mut self) -> Result<()> {
        for finder in &mut self.finders {
            finder.persist()?;
        }
        Ok(())
    }

    fn prefetch(&mut self, key: &CacheKey) {
        for finder in &mut self.finders {
            finder.prefetch(key);
        }
    }

    fn stats(&self) -> FinderStats {
        self.stats
    }

    fn report(&self) -> String {
        let mut lines = vec![format!("{}: {}", self.name(), self.stats)];
        lines.extend(self.finders.iter().map(|f| format!("  {}", f.report())));
        lines.join("\n")
    }
}

/// Records every insert but never answers, used to build a cache without
/// letting it influence the run.
pub struct CollectingFinder {
    inner: Box<dyn Finder>,
    stats: FinderStats,
}

impl CollectingFinder {
    pub fn new(inner: Box<dyn Finder>) -> Self {
        Self {
            inner,
            stats: FinderStats::default(),
        }
    }
}

impl Finder for CollectingFinder {
    fn name(&self) -> &str {
        "collect"
    }

    fn find(&mut self, _key: &CacheKey) -> Option<Answer> {
        self.stats.record(&None);
        None
    }

    fn find_special(&mut self, _key: &CacheKey) -> Option<Answer> {
        self.stats.record_special(&None);
        None
    }

    fn insert(&mut self, key: &CacheKey, answer: &Answer) {
        self.inner.insert(key, answer);
    }

    fn persist(&mut self) -> Result<()> {
        self.inner.persist()
    }

    fn stats(&self) -> FinderStats {
        self.stats
    }

    fn report(&self) -> String {
        format!("{}: {}\n  {}", self.name(), self.stats, self.inner.report())
    }
}

/// Alpha-renames keys before they reach `inner` and maps answers back.
pub struct NameNormalizingFinder {
    inner: Box<dyn Finder>,
    arrays: ArrayCache,
}

impl NameNormalizingFinder {
    pub fn new(inner: Box<dyn Finder>, arrays: &ArrayCache) -> Self {
        Self {
            inner,
            arrays: arrays.clone(),
        }
    }

    fn normalize(&self, key: &CacheKey) -> (NameNormalizer, CacheKey) {
        let normalizer = NameNormalizer::new(&self.arrays, key.exprs());
        let normalized = CacheKey::new(normalizer.normalize_exprs(key.exprs()));
        (normalizer, normalized)
    }

    fn denormalize(normalizer: &NameNormalizer, found: Option<Answer>) -> Option<Answer> {
        match found? {
            None => Some(None),
            Some(assignment) => match normalizer.denormalize_assignment(&assignment) {
                Ok(own) => Some(Some(Rc::new(own))),
                Err(e) => {
                    warn!("ignoring cached model that cannot be renamed back: {}", e);
                    None
                }
            },
        }
    }
}

impl Finder for NameNormalizingFinder {
    fn name(&self) -> &str {
        "normalize-names"
    }

    fn find(&mut self, key: &CacheKey) -> Option<Answer> {
        let (normalizer, normalized) = self.normalize(key);
        let found = self.inner.find(&normalized);
        Self::denormalize(&normalizer, found)
    }

    fn find_special(&mut self, key: &CacheKey) -> Option<Answer> {
        let (normalizer, normalized) = self.normalize(key);
        let found = self.inner.find_special(&normalized);
        Self::denormalize(&normalizer, found)
    }

    fn insert(&mut self, key: &CacheKey, answer: &Answer) {
        let (normalizer, normalized) = self.normalize(key);
        let answer = match answer {
            Some(assignment) => match normalizer.normalize_assignment(assignment) {
                Ok(renamed) => Some(Rc::new(renamed)),
                Err(e) => {
                    warn!("not caching a model that cannot be renamed: {}", e);
                    return;
                }
            },
            None => None,
        };
        self.inner.insert(&normalized, &answer);
    }

    fn persist(&mut self) -> Result<()> {
        self.inner.persist()
    }

    fn prefetch(&mut self, key: &CacheKey) {
        let (_, normalized) = self.normalize(key);
        self.inner.prefetch(&normalized);
    }

    fn stats(&self) -> FinderStats {
        self.inner.stats()
    }

    fn report(&self) -> String {
        self.inner.report()
    }
}
