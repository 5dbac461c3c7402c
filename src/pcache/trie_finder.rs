use super::shards::{read_shards, replace_shards};
use super::trie::{Trie, TrieNodeRecord};
use super::{find_fuzzy, Answer, CacheKey, Finder, FinderStats};
use crate::expr::serialize::Decoder;
use crate::expr::ArrayCache;
use anyhow::Result;
use log::{debug, info, trace};
use std::path::{Path, PathBuf};

pub const TRIE_SHARD_PREFIX: &str = "trie";

/// In-memory trie mirrored to `trie<N>.json` shards in a directory.
pub struct TrieFinder {
    trie: Trie,
    dir: PathBuf,
    dirty: bool,
    stats: FinderStats,
}

impl TrieFinder {
    /// Loads every readable shard below `dir`. A missing directory yields an
    /// empty trie.
    pub fn load(dir: &Path, arrays: &ArrayCache) -> Self {
        let mut trie = Trie::new();
        let decoder = Decoder::new(arrays);

        time_debug!("loaded trie shards", {
            for record in read_shards::<TrieNodeRecord>(dir, TRIE_SHARD_PREFIX) {
                trie.load_record(&record, &decoder);
            }
        });
        info!("trie cache at {} holds {} keys", dir.display(), trie.len());

        Self {
            trie,
            dir: dir.to_path_buf(),
            dirty: false,
            stats: FinderStats::default(),
        }
    }

    pub fn trie(&self) -> &Trie {
        &self.trie
    }

    pub fn len(&self) -> usize {
        self.trie.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trie.is_empty()
    }
}

impl Finder for TrieFinder {
    fn name(&self) -> &str {
        "trie"
    }

    fn find(&mut self, key: &CacheKey) -> Option<Answer> {
        let found = self.trie.get(&key.hashes()).cloned();
        trace!("trie lookup of {} keys: {}", key.len(), found.is_some());
        self.stats.record(&found);
        found
    }

    fn find_special(&mut self, key: &CacheKey) -> Option<Answer> {
        let found = find_fuzzy(&self.trie, key);
        self.stats.record_special(&found);
        found
    }

    fn insert(&mut self, key: &CacheKey, answer: &Answer) {
        if key.is_empty() {
            return;
        }
        self.trie.insert(&key.hashes(), answer.clone());
        self.dirty = true;
    }

    fn persist(&mut self) -> Result<()> {
        if !self.dirty {
            debug!("trie cache unchanged, nothing to persist");
            return Ok(());
        }
        time_debug!("persisted trie", {
            replace_shards(&self.dir, TRIE_SHARD_PREFIX, &self.trie.to_record())
        })?;
        self.dirty = false;
        info!("persisted {} trie keys to {}", self.trie.len(), self.dir.display());
        Ok(())
    }

    fn stats(&self) -> FinderStats {
        self.stats
    }
}
