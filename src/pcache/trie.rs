use super::{Answer, SetIndex};
use crate::assignment::AssignmentRecord;
use crate::expr::serialize::Decoder;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::rc::Rc;

//
// Public Interface
//

/// Prefix tree over hash-sorted keys. A node holding a value terminates a
/// stored key; its value is the answer for that key.
#[derive(Debug, Default)]
pub struct Trie {
    root: TrieNode,
    len: usize,
}

#[derive(Debug, Default)]
struct TrieNode {
    children: BTreeMap<u32, TrieNode>,
    value: Option<Answer>,
}

impl Trie {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stores `answer` under `key`, replacing an earlier one. Empty keys are
    /// not stored.
    pub fn insert(&mut self, key: &[u32], answer: Answer) {
        if key.is_empty() {
            return;
        }
        let node = key.iter().fold(&mut self.root, |node, hash| {
            node.children.entry(*hash).or_default()
        });
        if node.value.is_none() {
            self.len += 1;
        }
        node.value = Some(answer);
    }

    pub fn get(&self, key: &[u32]) -> Option<&Answer> {
        if key.is_empty() || self.is_empty() {
            return None;
        }
        let mut node = &self.root;
        for hash in key {
            node = node.children.get(hash)?;
        }
        node.value.as_ref()
    }

    /// Every stored answer whose key is a subset of `key`.
    pub fn subsets(&self, key: &[u32]) -> Vec<&Answer> {
        let mut found = Vec::new();
        if !self.is_empty() {
            walk_subsets(&self.root, key, &mut |answer| {
                found.push(answer);
                false
            });
        }
        found
    }

    /// Every stored answer whose key is a superset of `key`.
    pub fn supersets(&self, key: &[u32]) -> Vec<&Answer> {
        let mut found = Vec::new();
        if !self.is_empty() && !key.is_empty() {
            walk_supersets(&self.root, key, &mut |answer| {
                found.push(answer);
                false
            });
        }
        found
    }

    /// Indented listing of the tree, one node per line.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        dump_node(&self.root, 0, &mut out);
        out
    }

    /// Pre-order snapshot of the whole tree.
    pub fn to_record(&self) -> TrieNodeRecord {
        node_to_record(&self.root)
    }

    /// Merges a snapshot into this trie. Entries whose assignment cannot be
    /// decoded are dropped, their descendants are kept.
    pub fn load_record(&mut self, record: &TrieNodeRecord, decoder: &Decoder) {
        let mut path = Vec::new();
        let mut dropped = 0;
        self.load_node(record, decoder, &mut path, &mut dropped);
        if dropped > 0 {
            warn!("dropped {} undecodable trie entries", dropped);
        }
        debug!("trie holds {} keys after loading", self.len);
    }
}

impl SetIndex for Trie {
    fn lookup(&self, key: &[u32]) -> Option<&Answer> {
        self.get(key)
    }

    fn find_subset(&self, key: &[u32], pred: &dyn Fn(&Answer) -> bool) -> Option<&Answer> {
        if self.is_empty() {
            return None;
        }
        let mut found = None;
        walk_subsets(&self.root, key, &mut |answer| {
            if pred(answer) {
                found = Some(answer);
                true
            } else {
                false
            }
        });
        found
    }

    fn find_superset(&self, key: &[u32], pred: &dyn Fn(&Answer) -> bool) -> Option<&Answer> {
        if self.is_empty() || key.is_empty() {
            return None;
        }
        let mut found = None;
        walk_supersets(&self.root, key, &mut |answer| {
            if pred(answer) {
                found = Some(answer);
                true
            } else {
                false
            }
        });
        found
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrieNodeRecord {
    #[serde(default)]
    pub terminal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<AssignmentRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TrieChildRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrieChildRecord {
    pub hash: u32,
    pub node: TrieNodeRecord,
}

//
// Private Implementation
//

/// Calls `visit` on terminal nodes whose path is a subset of `key` until it
/// returns true. Each child is entered at most once, through the first key
/// position carrying its hash.
fn walk_subsets<'a, F>(node: &'a TrieNode, key: &[u32], visit: &mut F) -> bool
where
    F: FnMut(&'a Answer) -> bool,
{
    if let Some(answer) = &node.value {
        if visit(answer) {
            return true;
        }
    }
    for (i, hash) in key.iter().enumerate() {
        if i > 0 && key[i - 1] == *hash {
            continue;
        }
        if let Some(child) = node.children.get(hash) {
            if walk_subsets(child, &key[i + 1..], visit) {
                return true;
            }
        }
    }
    false
}

/// Calls `visit` on terminal nodes whose path contains all of `key` until
/// it returns true. Paths are ascending, so only children up to the next
/// key hash can lead to a match.
fn walk_supersets<'a, F>(node: &'a TrieNode, key: &[u32], visit: &mut F) -> bool
where
    F: FnMut(&'a Answer) -> bool,
{
    match key.split_first() {
        None => {
            if let Some(answer) = &node.value {
                if visit(answer) {
                    return true;
                }
            }
            node.children
                .values()
                .any(|child| walk_supersets(child, key, visit))
        }
        Some((next, rest)) => node.children.range(..=*next).any(|(hash, child)| {
            if hash == next {
                walk_supersets(child, rest, visit)
            } else {
                walk_supersets(child, key, visit)
            }
        }),
    }
}

fn dump_node(node: &TrieNode, depth: usize, out: &mut String) {
    for (hash, child) in &node.children {
        let marker = match &child.value {
            None => "",
            Some(None) => " => unsat",
            Some(Some(_)) => " => sat",
        };
        let _ = writeln!(out, "{:indent$}{:#010x}{}", "", hash, marker, indent = depth * 2);
        dump_node(child, depth + 1, out);
    }
}

fn node_to_record(node: &TrieNode) -> TrieNodeRecord {
    TrieNodeRecord {
        terminal: node.value.is_some(),
        value: node
            .value
            .as_ref()
            .map(|answer| AssignmentRecord::encode(answer.as_deref())),
        children: node
            .children
            .iter()
            .map(|(hash, child)| TrieChildRecord {
                hash: *hash,
                node: node_to_record(child),
            })
            .collect(),
    }
}

impl Trie {
    fn load_node(
        &mut self,
        record: &TrieNodeRecord,
        decoder: &Decoder,
        path: &mut Vec<u32>,
        dropped: &mut usize,
    ) {
        if record.terminal {
            match record.value.as_ref().map(|value| value.decode(decoder)) {
                Some(Ok(answer)) => self.insert(path, answer.map(Rc::new)),
                Some(Err(e)) => {
                    debug!("skipping trie entry: {}", e);
                    *dropped += 1;
                }
                None => *dropped += 1,
            }
        }
        for child in &record.children {
            path.push(child.hash);
            self.load_node(&child.node, decoder, path, dropped);
            path.pop();
        }
    }
}
