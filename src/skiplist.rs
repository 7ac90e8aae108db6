//! Indexable skip list over `(score, member)` pairs.
//!
//! Nodes live in an arena (`Vec<Node>`) and point at each other by index.
//! Every forward link carries a span: the number of level-0 hops it jumps
//! over. Summing spans along a search path yields a node's 1-based rank,
//! which makes rank lookups and positional ranges O(log n) expected.

use std::cmp::Ordering;

use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const MAX_LEVEL: usize = 25;

const HEADER: usize = 0;

#[derive(Debug, Clone, Copy, Default)]
struct Link {
    next: Option<usize>,
    span: usize,
}

#[derive(Debug)]
struct Node {
    member: String,
    score: f64,
    links: Vec<Link>,
}

impl Node {
    /// Orders this node against a `(score, member)` pair: score first, then
    /// member bytes.
    fn cmp_to(&self, score: f64, member: &str) -> Ordering {
        (OrderedFloat(self.score), self.member.as_str()).cmp(&(OrderedFloat(score), member))
    }
}

#[derive(Debug)]
pub struct SkipList {
    nodes: Vec<Node>,
    level: usize,
    len: usize,
    rng: StdRng,
}

impl Default for SkipList {
    fn default() -> Self {
        SkipList::with_rng(StdRng::from_entropy())
    }
}

impl SkipList {
    pub fn new() -> Self {
        SkipList::default()
    }

    /// Deterministic level choice, for reproducible tests.
    pub fn with_seed(seed: u64) -> Self {
        SkipList::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        let header = Node {
            member: String::new(),
            score: 0.0,
            links: vec![Link::default(); MAX_LEVEL],
        };
        SkipList {
            nodes: vec![header],
            level: 1,
            len: 0,
            rng,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn random_level(&mut self) -> usize {
        let mut level = 1;
        while level < MAX_LEVEL && self.rng.gen_bool(0.5) {
            level += 1;
        }
        level
    }

    /// Inserts the pair. The caller guarantees the pair is not present yet.
    pub fn insert(&mut self, score: f64, member: String) {
        let mut update = [HEADER; MAX_LEVEL];
        let mut rank = [0usize; MAX_LEVEL];

        let mut cursor = HEADER;
        for i in (0..self.level).rev() {
            rank[i] = if i == self.level - 1 { 0 } else { rank[i + 1] };
            while let Some(next) = self.nodes[cursor].links[i].next {
                if self.nodes[next].cmp_to(score, &member) != Ordering::Less {
                    break;
                }
                rank[i] += self.nodes[cursor].links[i].span;
                cursor = next;
            }
            update[i] = cursor;
        }

        let level = self.random_level();
        if level > self.level {
            for i in self.level..level {
                rank[i] = 0;
                update[i] = HEADER;
                self.nodes[HEADER].links[i].span = self.len;
            }
            self.level = level;
        }

        let id = self.nodes.len();
        let mut links = vec![Link::default(); level];
        for (i, link) in links.iter_mut().enumerate() {
            let prev = &mut self.nodes[update[i]].links[i];
            link.next = prev.next;
            link.span = prev.span - (rank[0] - rank[i]);
            prev.next = Some(id);
            prev.span = rank[0] - rank[i] + 1;
        }

        // Levels above the new node now jump over one more node.
        for i in level..self.level {
            self.nodes[update[i]].links[i].span += 1;
        }

        self.nodes.push(Node {
            member,
            score,
            links,
        });
        self.len += 1;
    }

    /// 1-based rank of the exact pair, or 0 when it is not in the list.
    pub fn rank(&self, score: f64, member: &str) -> usize {
        let mut rank = 0;
        let mut cursor = HEADER;
        for i in (0..self.level).rev() {
            while let Some(next) = self.nodes[cursor].links[i].next {
                if self.nodes[next].cmp_to(score, member) == Ordering::Greater {
                    break;
                }
                rank += self.nodes[cursor].links[i].span;
                cursor = next;
            }
            if cursor != HEADER && self.nodes[cursor].cmp_to(score, member) == Ordering::Equal {
                return rank;
            }
        }
        0
    }

    fn index_at_rank(&self, rank: usize) -> Option<usize> {
        if rank == 0 || rank > self.len {
            return None;
        }

        let mut travelled = 0;
        let mut cursor = HEADER;
        for i in (0..self.level).rev() {
            while let Some(next) = self.nodes[cursor].links[i].next {
                let span = self.nodes[cursor].links[i].span;
                if travelled + span > rank {
                    break;
                }
                travelled += span;
                cursor = next;
            }
            if travelled == rank {
                return Some(cursor);
            }
        }
        None
    }

    /// Member and score at the 1-based `rank`.
    pub fn node_at_rank(&self, rank: usize) -> Option<(&str, f64)> {
        self.index_at_rank(rank).map(|id| {
            let node = &self.nodes[id];
            (node.member.as_str(), node.score)
        })
    }

    /// Members with scores between 0-based inclusive positions. Negative
    /// positions count from the end of the list.
    pub fn range(&self, start: i64, end: i64) -> Vec<(String, f64)> {
        let len = self.len as i64;
        let mut start = if start < 0 { start + len } else { start };
        let end = if end < 0 { end + len } else { end };
        if start < 0 {
            start = 0;
        }
        if start > end || start >= len {
            return Vec::new();
        }

        let mut out = Vec::new();
        let mut cursor = self.index_at_rank(start as usize + 1);
        let mut pos = start;
        while let Some(id) = cursor {
            if pos > end {
                break;
            }
            let node = &self.nodes[id];
            out.push((node.member.clone(), node.score));
            cursor = node.links[0].next;
            pos += 1;
        }
        out
    }

    /// Walks level 0 in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        let mut cursor = self.nodes[HEADER].links[0].next;
        std::iter::from_fn(move || {
            let id = cursor?;
            let node = &self.nodes[id];
            cursor = node.links[0].next;
            Some((node.member.as_str(), node.score))
        })
    }

    /// Checks that every level's spans add up to level-0 ranks.
    #[cfg(test)]
    fn assert_spans_consistent(&self) {
        let mut rank_of = std::collections::HashMap::new();
        let mut cursor = self.nodes[HEADER].links[0].next;
        let mut rank = 0;
        while let Some(id) = cursor {
            rank += 1;
            rank_of.insert(id, rank);
            cursor = self.nodes[id].links[0].next;
        }
        assert_eq!(rank, self.len);

        for level in 0..self.level {
            let mut at = HEADER;
            let mut sum = 0;
            loop {
                let link = self.nodes[at].links[level];
                sum += link.span;
                match link.next {
                    Some(next) => {
                        assert_eq!(sum, rank_of[&next], "level {level} span drift");
                        at = next;
                    }
                    None => {
                        assert_eq!(sum, self.len, "level {level} tail span");
                        break;
                    }
                }
            }
        }
    }
}
