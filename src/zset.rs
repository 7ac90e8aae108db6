//! Sorted sets: a member -> score map kept in lockstep with a skip list.

use std::collections::HashMap;

use crate::keyspace::Keyspace;
use crate::skiplist::SkipList;

#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<String, f64>,
    ranked: SkipList,
}

impl SortedSet {
    /// Inserts a new member; an existing member keeps its original score.
    fn add(&mut self, member: &str, score: f64) -> bool {
        if self.scores.contains_key(member) {
            return false;
        }
        self.scores.insert(member.to_string(), score);
        self.ranked.insert(score, member.to_string());
        true
    }

    fn rank(&self, member: &str) -> Option<usize> {
        let score = *self.scores.get(member)?;
        match self.ranked.rank(score, member) {
            0 => None,
            rank => Some(rank - 1),
        }
    }
}

#[derive(Clone, Default)]
pub struct ZSetStore {
    data: Keyspace<SortedSet>,
}

impl ZSetStore {
    pub fn new() -> Self {
        ZSetStore::default()
    }

    /// Returns 1 if `member` was inserted, 0 if it was already in the set.
    pub fn add(&self, key: &str, member: &str, score: f64) -> u8 {
        u8::from(self.data.upsert(key, SortedSet::default, |set| set.add(member, score)))
    }

    /// 0-based position of `member` in score order.
    pub fn rank(&self, key: &str, member: &str) -> Option<usize> {
        self.data.read(key, |set| set.rank(member)).flatten()
    }

    /// Members and scores between two 0-based inclusive positions; negative
    /// positions count from the end.
    pub fn range(&self, key: &str, start: i64, end: i64) -> Vec<(String, f64)> {
        self.data
            .read(key, |set| set.ranked.range(start, end))
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn card(&self, key: &str) -> usize {
        self.data.read(key, |set| set.scores.len()).unwrap_or(0)
    }

    /// Returns 1 when the set exists and now expires in `seconds`, 0 otherwise.
    pub fn expire(&self, key: &str, seconds: i64) -> u8 {
        u8::from(self.data.expire(key, seconds))
    }
}
