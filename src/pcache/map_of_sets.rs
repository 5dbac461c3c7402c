use super::shards::{read_shards, replace_shards};
use super::{find_fuzzy, Answer, CacheKey, Finder, FinderStats, SetIndex};
use crate::assignment::AssignmentRecord;
use crate::expr::serialize::Decoder;
use crate::expr::ArrayCache;
use anyhow::Result;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub const MAP_SHARD_PREFIX: &str = "cache";

/// Answers keyed by the set of structural hashes of a constraint set.
/// Subset and superset queries scan all entries.
#[derive(Debug, Default)]
pub struct MapOfSets {
    entries: BTreeMap<Vec<u32>, Answer>,
}

impl MapOfSets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, key: &[u32], answer: Answer) {
        let set = as_set(key);
        if !set.is_empty() {
            self.entries.insert(set, answer);
        }
    }

    pub fn get(&self, key: &[u32]) -> Option<&Answer> {
        self.entries.get(&as_set(key))
    }

    pub fn to_record(&self) -> MapOfSetsRecord {
        MapOfSetsRecord {
            entries: self
                .entries
                .iter()
                .map(|(key, answer)| EntryRecord {
                    key: key.clone(),
                    assignment: AssignmentRecord::encode(answer.as_deref()),
                })
                .collect(),
        }
    }

    /// Merges a snapshot, dropping entries that cannot be decoded.
    pub fn load_record(&mut self, record: &MapOfSetsRecord, decoder: &Decoder) {
        let mut dropped = 0;
        for entry in &record.entries {
            match entry.assignment.decode(decoder) {
                Ok(answer) => self.insert(&entry.key, answer.map(Rc::new)),
                Err(e) => {
                    debug!("skipping map-of-sets entry: {}", e);
                    dropped += 1;
                }
            }
        }
        if dropped > 0 {
            warn!("dropped {} undecodable map-of-sets entries", dropped);
        }
    }
}

impl SetIndex for MapOfSets {
    fn lookup(&self, key: &[u32]) -> Option<&Answer> {
        self.get(key)
    }

    fn find_subset(&self, key: &[u32], pred: &dyn Fn(&Answer) -> bool) -> Option<&Answer> {
        let set = as_set(key);
        self.entries
            .iter()
            .find(|(stored, answer)| is_subset(stored, &set) && pred(answer))
            .map(|(_, answer)| answer)
    }

    fn find_superset(&self, key: &[u32], pred: &dyn Fn(&Answer) -> bool) -> Option<&Answer> {
        let set = as_set(key);
        if set.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .find(|(stored, answer)| is_subset(&set, stored) && pred(answer))
            .map(|(_, answer)| answer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MapOfSetsRecord {
    #[serde(default)]
    pub entries: Vec<EntryRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub key: Vec<u32>,
    pub assignment: AssignmentRecord,
}

/// Map-of-sets backend persisted to `cache<N>.json` shards.
pub struct MapOfSetsFinder {
    map: MapOfSets,
    dir: PathBuf,
    dirty: bool,
    stats: FinderStats,
}

impl MapOfSetsFinder {
    pub fn load(dir: &Path, arrays: &ArrayCache) -> Self {
        let mut map = MapOfSets::new();
        let decoder = Decoder::new(arrays);

        time_debug!("loaded map-of-sets shards", {
            for record in read_shards::<MapOfSetsRecord>(dir, MAP_SHARD_PREFIX) {
                map.load_record(&record, &decoder);
            }
        });
        info!("map-of-sets cache at {} holds {} sets", dir.display(), map.len());

        Self {
            map,
            dir: dir.to_path_buf(),
            dirty: false,
            stats: FinderStats::default(),
        }
    }

    pub fn map(&self) -> &MapOfSets {
        &self.map
    }
}

impl Finder for MapOfSetsFinder {
    fn name(&self) -> &str {
        "pmap"
    }

    fn find(&mut self, key: &CacheKey) -> Option<Answer> {
        let found = if key.is_empty() {
            None
        } else {
            self.map.get(&key.hashes()).cloned()
        };
        self.stats.record(&found);
        found
    }

    fn find_special(&mut self, key: &CacheKey) -> Option<Answer> {
        let found = if key.is_empty() {
            None
        } else {
            find_fuzzy(&self.map, key)
        };
        self.stats.record_special(&found);
        found
    }

    fn insert(&mut self, key: &CacheKey, answer: &Answer) {
        if key.is_empty() {
            return;
        }
        self.map.insert(&key.hashes(), answer.clone());
        self.dirty = true;
    }

    fn persist(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        time_debug!("persisted map-of-sets", {
            replace_shards(&self.dir, MAP_SHARD_PREFIX, &self.map.to_record())
        })?;
        self.dirty = false;
        info!("persisted {} sets to {}", self.map.len(), self.dir.display());
        Ok(())
    }

    fn stats(&self) -> FinderStats {
        self.stats
    }
}

//
// Private Implementation
//

fn as_set(key: &[u32]) -> Vec<u32> {
    let mut set = key.to_vec();
    set.sort_unstable();
    set.dedup();
    set
}

/// Both slices sorted and free of duplicates.
fn is_subset(small: &[u32], large: &[u32]) -> bool {
    let mut rest = large.iter();
    small
        .iter()
        .all(|hash| rest.by_ref().any(|candidate| candidate == hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::Assignment;
    use crate::pcache::{is_sat, is_unsat};
    use tempfile::tempdir;

    fn sat() -> Answer {
        Some(Rc::new(Assignment::empty(true)))
    }

    #[test]
    fn keys_are_treated_as_sets() {
        let mut map = MapOfSets::new();
        map.insert(&[9, 3, 3, 1], None);

        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&[1, 3, 9]), Some(&None));
        assert_eq!(map.get(&[1, 9]), None);
    }

    #[test]
    fn scans_find_subsets_and_supersets() {
        let mut map = MapOfSets::new();
        map.insert(&[2, 4], None);
        map.insert(&[1, 2, 3, 4, 5], sat());

        assert!(map.find_subset(&[1, 2, 4], &is_unsat).is_some());
        assert!(map.find_subset(&[1, 2], &is_unsat).is_none());
        assert!(map.find_superset(&[3, 5], &is_sat).is_some());
        assert!(map.find_superset(&[3, 6], &is_sat).is_none());
    }

    #[test]
    fn subset_check_on_sorted_sets() {
        assert!(is_subset(&[], &[1]));
        assert!(is_subset(&[2, 5], &[1, 2, 3, 5]));
        assert!(!is_subset(&[2, 6], &[1, 2, 3, 5]));
        assert!(!is_subset(&[1], &[]));
    }

    #[test]
    fn persisted_sets_are_reloaded() {
        let dir = tempdir().unwrap();
        let arrays = ArrayCache::new();
        let mut finder = MapOfSetsFinder::load(dir.path(), &arrays);
        let mut map = MapOfSets::new();
        map.insert(&[4, 8], None);
        map.insert(&[4, 9], sat());
        finder.map = map;
        finder.dirty = true;
        finder.persist().unwrap();

        let reloaded = MapOfSetsFinder::load(dir.path(), &arrays);
        assert_eq!(reloaded.map().len(), 2);
        assert_eq!(reloaded.map().get(&[8, 4]), Some(&None));
        assert!(matches!(reloaded.map().get(&[4, 9]), Some(Some(_))));
    }
}
