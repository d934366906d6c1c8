//! Bounded top-K collection with optional per-group limiting.
//!
//! Entries compare by their three sort keys (already sign-adjusted for
//! direction), lexicographically descending, with higher seq_id winning
//! ties. With a group limit G, each distinct key keeps its own best-G
//! entries and only the best-in-group competes in the outer ranking.

use ahash::AHashMap;
use std::cmp::Ordering;

/// A scored candidate inside the heap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub seq_id: u32,
    pub distinct_key: u64,
    pub scores: [i64; 3],
    pub match_score_index: usize,
    pub field_id: u8,
    pub query_index: u16,
}

impl Hit {
    /// Ranking order: greater = better.
    pub fn ranking_cmp(&self, other: &Self) -> Ordering {
        self.scores
            .cmp(&other.scores)
            .then_with(|| self.seq_id.cmp(&other.seq_id))
    }
}

/// Bounded ranked set keyed by seq_id (or group key when grouping).
#[derive(Debug, Default)]
pub struct TopK {
    capacity: usize,
    group_limit: usize,
    /// seq_id (or distinct key) -> best hit for that key
    entries: AHashMap<u64, Hit>,
    /// distinct key -> per-group inner top-K (group mode only)
    groups: AHashMap<u64, TopK>,
}

impl TopK {
    pub fn new(capacity: usize, group_limit: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            group_limit,
            entries: AHashMap::new(),
            groups: AHashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn add(&mut self, hit: Hit) {
        if self.group_limit > 0 {
            let group_limit = self.group_limit;
            let group = self
                .groups
                .entry(hit.distinct_key)
                .or_insert_with(|| TopK::new(group_limit, 0));
            group.add(hit.clone());

            // the group's best entry represents it in the outer ranking
            self.add_keyed(hit.distinct_key, hit);
        } else {
            self.add_keyed(hit.seq_id as u64, hit);
        }
    }

    fn add_keyed(&mut self, key: u64, hit: Hit) {
        if let Some(existing) = self.entries.get_mut(&key) {
            if hit.ranking_cmp(existing) == Ordering::Greater {
                *existing = hit;
            }
            return;
        }

        if self.entries.len() < self.capacity {
            self.entries.insert(key, hit);
            return;
        }

        // full: evict the current worst if the newcomer beats it
        let worst_key = self
            .entries
            .iter()
            .min_by(|a, b| a.1.ranking_cmp(b.1))
            .map(|(&k, _)| k)
            .expect("capacity is at least 1");
        if hit.ranking_cmp(&self.entries[&worst_key]) == Ordering::Greater {
            self.entries.remove(&worst_key);
            self.entries.insert(key, hit);
        }
    }

    /// Every contained hit (all group members in group mode), unordered.
    pub fn iter_all(&self) -> Vec<&Hit> {
        if self.group_limit > 0 {
            self.groups
                .values()
                .flat_map(|g| g.entries.values())
                .collect()
        } else {
            self.entries.values().collect()
        }
    }

    /// Drain into a ranked vector, best first.
    pub fn into_sorted(self) -> Vec<Hit> {
        let mut hits: Vec<Hit> = self.entries.into_values().collect();
        hits.sort_by(|a, b| b.ranking_cmp(a));
        hits
    }
}
