//! Merging partial searcher results into a ranked top-k.
//!
//! Fan-out probes run in parallel and drain into one [`ResultMerger`]. The
//! merger keys accumulators by entity ID, combines per-searcher similarities
//! into an L2 composite, and yields a bounded top-k through a min-heap.

use crate::model::types::Entity;
use parking_lot::Mutex;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

/// Per-entity accumulator of searcher similarities within one search call.
#[derive(Debug, Clone)]
pub struct EntitySim {
    entity: Entity,
    similarities: HashMap<&'static str, f64>,
    /// L2 sufficient statistic: running sum of squared similarities.
    suff_stat: f64,
}

impl EntitySim {
    fn new(entity: Entity) -> Self {
        Self {
            entity,
            similarities: HashMap::new(),
            suff_stat: 0.0,
        }
    }

    fn add(&mut self, searcher: &'static str, similarity: f64) {
        self.similarities.insert(searcher, similarity);
        self.suff_stat += similarity * similarity;
    }

    /// Composite similarity over all observed searchers: the L2 norm of the
    /// per-searcher scores. Monotone non-decreasing in the observation set,
    /// so multi-searcher hits outrank single-searcher hits of the same
    /// per-searcher strength.
    pub fn similarity(&self) -> f64 {
        self.suff_stat.sqrt()
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn into_entity(self) -> Entity {
        self.entity
    }

    pub fn similarities(&self) -> &HashMap<&'static str, f64> {
        &self.similarities
    }
}

/// Heap ordering: composite similarity, then entity ID ascending on ties.
struct Ranked(EntitySim);

impl Ranked {
    fn cmp_key(&self, other: &Self) -> Ordering {
        self.0
            .similarity()
            .total_cmp(&other.0.similarity())
            .then_with(|| other.0.entity.entity_id.cmp(&self.0.entity.entity_id))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp_key(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_key(other)
    }
}

/// Concurrency-safe accumulator for one search call.
#[derive(Default)]
pub struct ResultMerger {
    sims: Mutex<HashMap<String, EntitySim>>,
}

impl ResultMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one searcher's scored rows. Rows are fetched by the caller
    /// beforehand; the lock covers only lookup-or-insert plus the score
    /// update, and one searcher's batch lands atomically.
    pub fn merge(&self, rows: Vec<(Entity, f64)>, searcher: &'static str) {
        let mut sims = self.sims.lock();
        for (entity, similarity) in rows {
            sims.entry(entity.entity_id.clone())
                .or_insert_with(|| EntitySim::new(entity))
                .add(searcher, similarity);
        }
    }

    /// At most `n` accumulators, composite similarity descending. Uses a
    /// bounded min-heap so the merge costs O(candidates · log n).
    pub fn top(&self, n: usize) -> Vec<EntitySim> {
        let sims = self.sims.lock();
        let mut heap: BinaryHeap<Reverse<Ranked>> = BinaryHeap::with_capacity(n + 1);
        for sim in sims.values() {
            let candidate = Reverse(Ranked(sim.clone()));
            if heap.len() < n {
                heap.push(candidate);
            } else if let Some(root) = heap.peek() {
                if candidate < *root {
                    heap.push(candidate);
                    heap.pop();
                }
            }
        }
        heap.into_sorted_vec()
            .into_iter()
            .map(|Reverse(ranked)| ranked.0)
            .collect()
    }
}
