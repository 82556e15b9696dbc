//! Hand-rolled HNSW (Hierarchical Navigable Small World) graph, one per
//! (index, field), providing approximate top-k cosine search in sub-linear
//! time (spec §4.5).
//!
//! The neighbour graph is cyclic, so nodes live in a dense-integer-id arena
//! (`NodeId` into a `Vec<Node>`) rather than as owned references; neighbour
//! lists are `Vec<NodeId>` per layer and tombstones live in a separate
//! bitset. This mirrors the arena-plus-bitset shape spec §8 calls out, and
//! the soft-delete / persistence split follows the surrounding-API shape of
//! a JSON-metadata-sidecar HNSW wrapper seen in the example corpus.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use search_sim_types::config::HnswConfig;
use search_sim_types::{SearchError, SearchResult};
use serde::{Deserialize, Serialize};

use crate::document::DocKey;
use crate::vector_store::cosine_similarity;

/// Dense integer id into the node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u32);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Node {
    vector: Vec<f32>,
    /// Neighbour lists, one `Vec<NodeId>` per layer the node participates in
    /// (layer 0 first).
    layers: Vec<Vec<NodeId>>,
}

/// Candidate entry used in both greedy descent and best-first search;
/// ordered by similarity so a max-heap pops the closest candidate first.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ScoredNode {
    node: NodeId,
    similarity: f32,
}

impl Eq for ScoredNode {}

impl Ord for ScoredNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.similarity
            .partial_cmp(&other.similarity)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for ScoredNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Reverse-ordered wrapper so a `BinaryHeap` can act as a min-heap over
/// similarity, used to keep only the best `ef` candidates during search.
#[derive(Debug, Clone, Copy, PartialEq)]
struct MinScoredNode(ScoredNode);

impl Eq for MinScoredNode {}

impl Ord for MinScoredNode {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.cmp(&self.0)
    }
}

impl PartialOrd for MinScoredNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Persisted on-disk shape for a graph: arena, tombstones, and the
/// bidirectional key<->id mapping (spec §4.5 "Persistence").
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedGraph {
    dimension: u32,
    nodes: Vec<Node>,
    tombstones: Vec<bool>,
    id_to_key: Vec<DocKey>,
    entry_point: Option<NodeId>,
    top_layer: usize,
}

/// An HNSW graph over one (index, field). Tombstoned nodes stay in the
/// arena until a rebuild compacts them out.
#[derive(Debug, Clone)]
pub struct HnswIndex {
    config: HnswConfig,
    dimension: u32,
    nodes: Vec<Node>,
    tombstones: Vec<bool>,
    key_to_id: HashMap<DocKey, NodeId>,
    id_to_key: Vec<DocKey>,
    entry_point: Option<NodeId>,
    top_layer: usize,
    rng: StdRng,
    live_count: usize,
}

const FILENAME: &str = "graph.json";

impl HnswIndex {
    #[must_use]
    pub fn new(dimension: u32, config: HnswConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.random_seed);
        Self {
            config,
            dimension,
            nodes: Vec::new(),
            tombstones: Vec::new(),
            key_to_id: HashMap::new(),
            id_to_key: Vec::new(),
            entry_point: None,
            top_layer: 0,
            rng,
            live_count: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.live_count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live_count == 0
    }

    #[must_use]
    pub fn tombstone_fraction(&self) -> f64 {
        if self.nodes.is_empty() {
            return 0.0;
        }
        let dead = self.tombstones.iter().filter(|t| **t).count();
        dead as f64 / self.nodes.len() as f64
    }

    #[must_use]
    pub fn should_rebuild(&self) -> bool {
        self.tombstone_fraction() >= self.config.rebuild_tombstone_fraction
    }

    /// Probabilistic layer assignment: geometrically decaying distribution
    /// with base `1 / ln(M)` (spec §4.5 step 1).
    fn sample_layer(&mut self) -> usize {
        let m_l = 1.0 / (self.config.m as f64).ln().max(1e-9);
        let unit: f64 = self.rng.gen_range(f64::EPSILON..1.0);
        (-unit.ln() * m_l).floor() as usize
    }

    /// Inserts or replaces the vector for `key`. A replace tombstones the
    /// previous node and inserts a fresh one (spec §4.5 "Updates and
    /// deletes": a vector change inserts a new node, it never mutates an
    /// existing one in place).
    pub fn insert(&mut self, key: DocKey, vector: Vec<f32>) -> SearchResult<()> {
        if vector.len() as u32 != self.dimension {
            return Err(SearchError::SchemaViolation(format!(
                "vector for key '{key}' has dimension {}, expected {}",
                vector.len(),
                self.dimension
            )));
        }

        if let Some(&old_id) = self.key_to_id.get(&key) {
            self.tombstones[old_id.0 as usize] = true;
            self.live_count = self.live_count.saturating_sub(1);
        }

        let node_layer = self.sample_layer();
        let new_id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            vector: vector.clone(),
            layers: vec![Vec::new(); node_layer + 1],
        });
        self.tombstones.push(false);
        self.id_to_key.push(key.clone());
        self.key_to_id.insert(key, new_id);
        self.live_count += 1;

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(new_id);
            self.top_layer = node_layer;
            return Ok(());
        };

        // Greedy descent from the current entry point down to the layer
        // above the new node's layer, to find a good seed (step 2).
        let mut seed = entry;
        if node_layer < self.top_layer {
            for layer in (node_layer + 1..=self.top_layer).rev() {
                seed = self.greedy_closest(seed, &vector, layer);
            }
        }

        // For each layer from the node's layer downward, search with a
        // bounded candidate list, select M diverse neighbours, link both
        // ways, and prune over-degree neighbours the same way (step 3).
        let mut current_seeds = vec![seed];
        for layer in (0..=node_layer.min(self.top_layer)).rev() {
            let candidates =
                self.search_layer(&current_seeds, &vector, layer, self.config.ef_construction);
            let selected = self.select_neighbours(&vector, &candidates, self.config.m);

            for &neighbour in &selected {
                self.link(new_id, neighbour, layer);
                self.link(neighbour, new_id, layer);
                self.prune_neighbours(neighbour, layer);
            }

            current_seeds = selected;
            if current_seeds.is_empty() {
                current_seeds = vec![seed];
            }
        }

        if node_layer > self.top_layer {
            self.top_layer = node_layer;
            self.entry_point = Some(new_id);
        }

        Ok(())
    }

    /// Tombstones the node for `key` without reclaiming arena storage
    /// (spec §4.5 "Deletes tombstone only").
    pub fn delete(&mut self, key: &str) -> bool {
        if let Some(&id) = self.key_to_id.get(key) {
            if !self.tombstones[id.0 as usize] {
                self.tombstones[id.0 as usize] = true;
                self.live_count = self.live_count.saturating_sub(1);
            }
            self.key_to_id.remove(key);
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.key_to_id.contains_key(key)
    }

    fn is_live(&self, id: NodeId) -> bool {
        !self.tombstones[id.0 as usize]
    }

    fn vector_of(&self, id: NodeId) -> &[f32] {
        &self.nodes[id.0 as usize].vector
    }

    fn neighbours_of(&self, id: NodeId, layer: usize) -> &[NodeId] {
        self.nodes[id.0 as usize]
            .layers
            .get(layer)
            .map_or(&[], Vec::as_slice)
    }

    fn link(&mut self, from: NodeId, to: NodeId, layer: usize) {
        let node = &mut self.nodes[from.0 as usize];
        if layer >= node.layers.len() {
            return;
        }
        if !node.layers[layer].contains(&to) {
            node.layers[layer].push(to);
        }
    }

    /// Re-runs neighbour selection for `id` at `layer` against its current
    /// neighbour set plus itself, keeping only the top `m` by the same
    /// diversity heuristic (over-degree pruning, spec §4.5 step 3).
    fn prune_neighbours(&mut self, id: NodeId, layer: usize) {
        let current = self.neighbours_of(id, layer).to_vec();
        if current.len() <= self.config.m {
            return;
        }
        let vector = self.vector_of(id).to_vec();
        let candidates: Vec<ScoredNode> = current
            .iter()
            .map(|&n| ScoredNode {
                node: n,
                similarity: cosine_similarity(&vector, self.vector_of(n)),
            })
            .collect();
        let selected = self.select_neighbours(&vector, &candidates, self.config.m);
        if layer < self.nodes[id.0 as usize].layers.len() {
            self.nodes[id.0 as usize].layers[layer] = selected;
        }
    }

    /// Heuristic neighbour selection favouring diverse directions: greedily
    /// keep a candidate only if it is closer to the probe than to every
    /// neighbour already chosen (spec §4.5 step 3).
    fn select_neighbours(&self, probe: &[f32], candidates: &[ScoredNode], m: usize) -> Vec<NodeId> {
        let mut sorted = candidates.to_vec();
        sorted.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(Ordering::Equal));

        let mut selected: Vec<NodeId> = Vec::with_capacity(m);
        for candidate in sorted {
            if selected.len() >= m {
                break;
            }
            let to_probe = candidate.similarity;
            let dominated = selected.iter().any(|&chosen| {
                cosine_similarity(self.vector_of(candidate.node), self.vector_of(chosen)) >= to_probe
            });
            if !dominated {
                selected.push(candidate.node);
            }
        }
        // Backfill with the closest remaining candidates if the diversity
        // heuristic rejected more than it should have left unfilled.
        if selected.len() < m {
            for candidate in candidates {
                if selected.len() >= m {
                    break;
                }
                if !selected.contains(&candidate.node) {
                    selected.push(candidate.node);
                }
            }
        }
        selected
    }

    /// Greedy single-step descent: from `from`, repeatedly move to the
    /// neighbour closest to `target` within `layer` until no neighbour
    /// improves on the current node (spec §4.5 step 2 / query step 1).
    fn greedy_closest(&self, from: NodeId, target: &[f32], layer: usize) -> NodeId {
        let mut current = from;
        let mut current_sim = cosine_similarity(target, self.vector_of(current));
        loop {
            let mut improved = false;
            for &neighbour in self.neighbours_of(current, layer) {
                if !self.is_live(neighbour) {
                    continue;
                }
                let sim = cosine_similarity(target, self.vector_of(neighbour));
                if sim > current_sim {
                    current = neighbour;
                    current_sim = sim;
                    improved = true;
                }
            }
            if !improved {
                return current;
            }
        }
    }

    /// Best-first search within a single layer, bounded to `ef` candidates
    /// (spec §4.5 step 3 / query step 2).
    fn search_layer(&self, seeds: &[NodeId], target: &[f32], layer: usize, ef: usize) -> Vec<ScoredNode> {
        let mut visited: HashSet<NodeId> = seeds.iter().copied().collect();
        let mut candidates: BinaryHeap<ScoredNode> = BinaryHeap::new();
        let mut results: BinaryHeap<MinScoredNode> = BinaryHeap::new();

        for &seed in seeds {
            if !self.is_live(seed) {
                continue;
            }
            let similarity = cosine_similarity(target, self.vector_of(seed));
            let scored = ScoredNode { node: seed, similarity };
            candidates.push(scored);
            results.push(MinScoredNode(scored));
        }

        while let Some(current) = candidates.pop() {
            if let Some(worst) = results.peek() {
                if results.len() >= ef && current.similarity < worst.0.similarity {
                    break;
                }
            }
            for &neighbour in self.neighbours_of(current.node, layer) {
                if !visited.insert(neighbour) || !self.is_live(neighbour) {
                    continue;
                }
                let similarity = cosine_similarity(target, self.vector_of(neighbour));
                let scored = ScoredNode { node: neighbour, similarity };
                let should_push = results.len() < ef
                    || results.peek().is_some_and(|worst| similarity > worst.0.similarity);
                if should_push {
                    candidates.push(scored);
                    results.push(MinScoredNode(scored));
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut out: Vec<ScoredNode> = results.into_iter().map(|m| m.0).collect();
        out.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(Ordering::Equal));
        out
    }

    /// Approximate top-k query (spec §4.5 "Query"): greedy descent through
    /// upper layers, best-first search at layer 0 with `ef = max(ef_search,
    /// k)`, tombstoned nodes excluded throughout.
    pub fn search(&self, probe: &[f32], k: usize) -> SearchResult<Vec<(DocKey, f32)>> {
        if probe.len() as u32 != self.dimension {
            return Err(SearchError::SchemaViolation(format!(
                "probe vector has dimension {}, expected {}",
                probe.len(),
                self.dimension
            )));
        }
        let Some(entry) = self.entry_point else {
            return Ok(Vec::new());
        };

        let mut seed = entry;
        for layer in (1..=self.top_layer).rev() {
            seed = self.greedy_closest(seed, probe, layer);
        }

        let ef = self.config.ef_search.max(k);
        let found = self.search_layer(&[seed], probe, 0, ef);
        Ok(found
            .into_iter()
            .take(k)
            .map(|scored| (self.id_to_key[scored.node.0 as usize].clone(), scored.similarity))
            .collect())
    }

    /// Filtered query (spec §4.5 "Filtered query"): oversamples by
    /// `oversampleMultiplier`, post-filters against `permitted`, and grows
    /// the oversample geometrically if too few survive, up to a bound.
    pub fn search_filtered(
        &self,
        probe: &[f32],
        k: usize,
        permitted: &HashSet<DocKey>,
    ) -> SearchResult<Vec<(DocKey, f32)>> {
        if probe.len() as u32 != self.dimension {
            return Err(SearchError::SchemaViolation(format!(
                "probe vector has dimension {}, expected {}",
                probe.len(),
                self.dimension
            )));
        }
        let Some(entry) = self.entry_point else {
            return Ok(Vec::new());
        };

        let mut seed = entry;
        for layer in (1..=self.top_layer).rev() {
            seed = self.greedy_closest(seed, probe, layer);
        }

        let max_oversample = (self.live_count.max(1) * 4).max(k * 16);
        let mut oversample = k.saturating_mul(self.config.oversample_multiplier).max(k);
        loop {
            let ef = self.config.ef_search.max(oversample);
            let found = self.search_layer(&[seed], probe, 0, ef);
            let filtered: Vec<(DocKey, f32)> = found
                .into_iter()
                .filter_map(|scored| {
                    let key = &self.id_to_key[scored.node.0 as usize];
                    permitted.contains(key).then(|| (key.clone(), scored.similarity))
                })
                .take(k)
                .collect();

            if filtered.len() >= k || oversample >= max_oversample {
                return Ok(filtered);
            }
            oversample = (oversample * 2).min(max_oversample);
        }
    }

    /// Rebuilds a fresh, compact graph from the live nodes only, discarding
    /// tombstoned ones, then swaps it in atomically in place (spec §4.5
    /// "a background rebuild triggers when tombstone fraction crosses a
    /// configured threshold").
    pub fn rebuild(&mut self) -> SearchResult<()> {
        let live: Vec<(DocKey, Vec<f32>)> = self
            .id_to_key
            .iter()
            .enumerate()
            .filter(|(idx, _)| !self.tombstones[*idx])
            .map(|(idx, key)| (key.clone(), self.nodes[idx].vector.clone()))
            .collect();

        let mut fresh = Self::new(self.dimension, self.config.clone());
        for (key, vector) in live {
            fresh.insert(key, vector)?;
        }
        *self = fresh;
        Ok(())
    }

    /// Writes the graph arena, tombstones, and key mapping to
    /// `<dir>/graph.json` (spec §4.5 "Persistence").
    pub fn save_to_dir(&self, dir: &Path) -> SearchResult<()> {
        std::fs::create_dir_all(dir)?;
        let persisted = PersistedGraph {
            dimension: self.dimension,
            nodes: self.nodes.clone(),
            tombstones: self.tombstones.clone(),
            id_to_key: self.id_to_key.clone(),
            entry_point: self.entry_point,
            top_layer: self.top_layer,
        };
        let json = serde_json::to_string(&persisted)?;
        std::fs::write(dir.join(FILENAME), json)?;
        Ok(())
    }

    /// Rehydrates a graph previously written by [`Self::save_to_dir`]. On
    /// any corruption or absence the caller should fall back to the
    /// brute-force [`crate::vector_store::VectorStore`] path and log once
    /// (spec §4.5 "Failure model") rather than propagate the error.
    pub fn load_from_dir(dir: &Path, config: HnswConfig) -> SearchResult<Self> {
        let path = dir.join(FILENAME);
        let json = std::fs::read_to_string(path)?;
        let persisted: PersistedGraph = serde_json::from_str(&json)?;

        let mut key_to_id = HashMap::new();
        let mut live_count = 0;
        for (idx, key) in persisted.id_to_key.iter().enumerate() {
            key_to_id.insert(key.clone(), NodeId(idx as u32));
            if !persisted.tombstones[idx] {
                live_count += 1;
            }
        }

        Ok(Self {
            rng: StdRng::seed_from_u64(config.random_seed),
            config,
            dimension: persisted.dimension,
            nodes: persisted.nodes,
            tombstones: persisted.tombstones,
            key_to_id,
            id_to_key: persisted.id_to_key,
            entry_point: persisted.entry_point,
            top_layer: persisted.top_layer,
            live_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> HnswConfig {
        HnswConfig {
            m: 8,
            ef_construction: 64,
            ef_search: 32,
            oversample_multiplier: 2,
            random_seed: 42,
            rebuild_tombstone_fraction: 0.2,
        }
    }

    #[test]
    fn insert_and_search_finds_nearest() {
        let mut index = HnswIndex::new(3, test_config());
        index.insert("a".to_owned(), vec![1.0, 0.0, 0.0]).unwrap();
        index.insert("b".to_owned(), vec![0.0, 1.0, 0.0]).unwrap();
        index.insert("c".to_owned(), vec![0.9, 0.1, 0.0]).unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 2).unwrap();
        let keys: Vec<&str> = results.iter().map(|(k, _)| k.as_str()).collect();
        assert!(keys.contains(&"a"));
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn delete_excludes_node_from_results() {
        let mut index = HnswIndex::new(2, test_config());
        for i in 0..50 {
            let angle = i as f32 * 0.01;
            index
                .insert(format!("v{i}"), vec![1.0 - angle, angle])
                .unwrap();
        }
        for i in 0..10 {
            index.delete(&format!("v{i}"));
        }

        let results = index.search(&[1.0, 0.0], 50).unwrap();
        assert_eq!(results.len(), 40);
        for (key, _) in &results {
            let idx: usize = key[1..].parse().unwrap();
            assert!(idx >= 10);
        }
    }

    #[test]
    fn rejects_dimension_mismatch_on_insert_and_search() {
        let mut index = HnswIndex::new(4, test_config());
        assert!(index.insert("x".to_owned(), vec![1.0, 2.0]).is_err());
        index.insert("y".to_owned(), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert!(index.search(&[1.0], 1).is_err());
    }

    #[test]
    fn tombstone_fraction_and_rebuild_compact_graph() {
        let mut index = HnswIndex::new(2, test_config());
        for i in 0..10 {
            index.insert(format!("v{i}"), vec![i as f32, 1.0]).unwrap();
        }
        for i in 0..3 {
            index.delete(&format!("v{i}"));
        }
        assert!(index.tombstone_fraction() > 0.0);
        assert!(index.should_rebuild());

        index.rebuild().unwrap();
        assert_eq!(index.len(), 7);
        assert_eq!(index.tombstone_fraction(), 0.0);
    }

    #[test]
    fn filtered_search_oversamples_and_respects_permitted_set() {
        let mut index = HnswIndex::new(2, test_config());
        for i in 0..100 {
            let angle = i as f32 * 0.001;
            index
                .insert(format!("v{i}"), vec![1.0 - angle, angle])
                .unwrap();
        }

        let permitted: HashSet<DocKey> = (90..100).map(|i| format!("v{i}")).collect();
        let results = index.search_filtered(&[1.0, 0.0], 5, &permitted).unwrap();
        assert!(results.len() <= 5);
        for (key, _) in &results {
            assert!(permitted.contains(key));
        }
    }

    #[test]
    fn save_and_load_roundtrip_preserves_search_results() {
        let mut index = HnswIndex::new(2, test_config());
        for i in 0..20 {
            index.insert(format!("v{i}"), vec![i as f32, 1.0]).unwrap();
        }
        let tmp = tempfile::tempdir().unwrap();
        index.save_to_dir(tmp.path()).unwrap();

        let reloaded = HnswIndex::load_from_dir(tmp.path(), test_config()).unwrap();
        assert_eq!(reloaded.len(), index.len());
        let before = index.search(&[5.0, 1.0], 3).unwrap();
        let after = reloaded.search(&[5.0, 1.0], 3).unwrap();
        assert_eq!(before, after);
    }
}
