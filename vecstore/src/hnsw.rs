use std::collections::{BTreeSet, BinaryHeap, HashSet};

use crate::cosine::cosine_distance;
use crate::error::VecError;
use crate::index::{check_probe, check_slot, check_vector, rank, QueryResult, SlotIndex};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// HnswConfig configures a new HNSW index.
#[derive(Debug, Clone)]
pub struct HnswConfig {
    /// Vector dimension. Required; must be positive.
    pub dim: usize,
    /// Max connections per node per layer (except layer 0 which allows 2*M).
    /// Default: 16.
    pub m: usize,
    /// Size of the dynamic candidate list during index building.
    /// Default: 200.
    pub ef_construction: usize,
    /// Default size of the dynamic candidate list during search.
    /// Default: 50.
    pub ef_search: usize,
}

impl HnswConfig {
    fn set_defaults(&mut self) {
        if self.m < 2 {
            self.m = 16;
        }
        if self.ef_construction == 0 {
            self.ef_construction = 200;
        }
        if self.ef_search == 0 {
            self.ef_search = 50;
        }
    }

    fn max_conns(&self, layer: usize) -> usize {
        if layer == 0 { self.m * 2 } else { self.m }
    }
}

// ---------------------------------------------------------------------------
// Internal priority-queue types
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct DistItem {
    id: u32,
    dist: f32,
}

/// Min-heap: closest first.
impl Ord for DistItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.dist.total_cmp(&self.dist)
    }
}
impl PartialOrd for DistItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl PartialEq for DistItem {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist && self.id == other.id
    }
}
impl Eq for DistItem {}

/// Reversed for max-heap usage: farthest first.
#[derive(Clone)]
struct MaxDistItem {
    id: u32,
    dist: f32,
}

impl Ord for MaxDistItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.dist.total_cmp(&other.dist)
    }
}
impl PartialOrd for MaxDistItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl PartialEq for MaxDistItem {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist && self.id == other.id
    }
}
impl Eq for MaxDistItem {}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

struct HnswNode {
    vector: Vec<f32>,
    level: usize,
    friends: Vec<Vec<u32>>, // friends[layer] = neighbor slots
}

// ---------------------------------------------------------------------------
// HNSW
// ---------------------------------------------------------------------------

/// Hnsw is a Hierarchical Navigable Small World graph implementing
/// [`SlotIndex`].
///
/// Node `i` is slot `i`. Soft-deleted nodes stay in the graph as routing
/// waypoints and are filtered out of results. Updating a slot keeps its
/// level, drops its old edges and relinks it in place.
///
/// Candidates found by the graph walk are re-ranked by exact distance. If
/// the walk yields fewer live candidates than requested (possible after
/// many in-place updates detach nodes), the query falls back to an exact
/// scan.
pub struct Hnsw {
    cfg: HnswConfig,
    nodes: Vec<HnswNode>,
    deleted: BTreeSet<usize>,
    entry: Option<u32>,
    max_level: usize,
    level_mul: f64,
}

impl Hnsw {
    /// Create an empty HNSW index with the given configuration.
    /// Panics if `cfg.dim` is not positive.
    pub fn new(mut cfg: HnswConfig) -> Self {
        assert!(cfg.dim > 0, "vecstore: HnswConfig.dim must be positive");
        cfg.set_defaults();
        let level_mul = 1.0 / (cfg.m as f64).ln();
        Self {
            cfg,
            nodes: Vec::new(),
            deleted: BTreeSet::new(),
            entry: None,
            max_level: 0,
            level_mul,
        }
    }

    /// Adjust the search-time candidate list size.
    pub fn set_ef_search(&mut self, ef: usize) {
        self.cfg.ef_search = ef.max(1);
    }

    fn random_level(&self) -> usize {
        let mut rng = rand::thread_rng();
        let r: f64 = rand::Rng::r#gen::<f64>(&mut rng).max(f64::MIN_POSITIVE);
        let level = (-r.ln() * self.level_mul) as usize;
        level.min(31)
    }

    fn dist(&self, query: &[f32], id: u32) -> f32 {
        cosine_distance(query, &self.nodes[id as usize].vector)
    }

    fn search_layer(
        &self,
        query: &[f32],
        entry_points: &[u32],
        ef: usize,
        layer: usize,
    ) -> Vec<u32> {
        let mut visited = HashSet::with_capacity(ef * 2);
        let mut candidates: BinaryHeap<DistItem> = BinaryHeap::new();
        let mut results: BinaryHeap<MaxDistItem> = BinaryHeap::new();

        for &ep in entry_points {
            if visited.insert(ep) {
                let d = self.dist(query, ep);
                candidates.push(DistItem { id: ep, dist: d });
                results.push(MaxDistItem { id: ep, dist: d });
            }
        }

        while let Some(closest) = candidates.pop() {
            if results.len() >= ef {
                if let Some(farthest) = results.peek() {
                    if closest.dist > farthest.dist {
                        break;
                    }
                }
            }

            let nd = &self.nodes[closest.id as usize];
            let Some(friends) = nd.friends.get(layer) else {
                continue;
            };
            for &f_id in friends {
                if !visited.insert(f_id) {
                    continue;
                }
                let d = self.dist(query, f_id);
                let should_add =
                    results.len() < ef || results.peek().is_none_or(|far| d < far.dist);
                if should_add {
                    candidates.push(DistItem { id: f_id, dist: d });
                    results.push(MaxDistItem { id: f_id, dist: d });
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        results.into_iter().map(|item| item.id).collect()
    }

    fn select_closest(&self, query: &[f32], candidates: &[u32], max_n: usize) -> Vec<u32> {
        if candidates.len() <= max_n {
            return candidates.to_vec();
        }

        let mut items: Vec<(u32, f32)> = candidates
            .iter()
            .map(|&c_id| (c_id, self.dist(query, c_id)))
            .collect();

        items.sort_by(|a, b| a.1.total_cmp(&b.1));
        items.truncate(max_n);
        items.into_iter().map(|(id, _)| id).collect()
    }

    /// Greedy descent from `start` through layers `(to, from]`, returning the
    /// closest node found.
    fn descend(&self, query: &[f32], start: u32, from: usize, to: usize) -> u32 {
        let mut cur = start;
        let mut cur_dist = self.dist(query, cur);
        for lev in (to + 1..=from).rev() {
            let mut changed = true;
            while changed {
                changed = false;
                let Some(friends) = self.nodes[cur as usize].friends.get(lev) else {
                    break;
                };
                for &f_id in friends {
                    let d = self.dist(query, f_id);
                    if d < cur_dist {
                        cur = f_id;
                        cur_dist = d;
                        changed = true;
                    }
                }
            }
        }
        cur
    }

    /// Pick a node other than `idx` to start linking from, with the top
    /// layer to descend from.
    fn entry_excluding(&self, idx: u32) -> Option<(u32, usize)> {
        match self.entry {
            Some(e) if e != idx => Some((e, self.max_level)),
            _ => self
                .nodes
                .iter()
                .enumerate()
                .filter(|(i, _)| *i as u32 != idx)
                .max_by_key(|(i, nd)| (nd.level, std::cmp::Reverse(*i)))
                .map(|(i, nd)| (i as u32, nd.level)),
        }
    }

    /// Connect node `idx` (already placed, with empty friend lists) into the
    /// graph.
    fn link(&mut self, idx: u32) {
        let level = self.nodes[idx as usize].level;
        let query = self.nodes[idx as usize].vector.clone();

        let Some((start, top)) = self.entry_excluding(idx) else {
            self.entry = Some(idx);
            self.max_level = level;
            return;
        };

        // Phase 1: Greedy descent from top layer to level+1.
        let cur = self.descend(&query, start, top, level);

        // Phase 2: Beam search + connect at each layer.
        let top_insert = level.min(top);
        let ef_construction = self.cfg.ef_construction;

        let mut ep = vec![cur];
        for lev in (0..=top_insert).rev() {
            let mut candidates = self.search_layer(&query, &ep, ef_construction, lev);
            candidates.retain(|&c| c != idx);
            let max_c = self.cfg.max_conns(lev);
            let neighbors = self.select_closest(&query, &candidates, max_c);

            self.nodes[idx as usize].friends[lev] = neighbors.clone();

            // Bidirectional connections + pruning.
            for &n_id in &neighbors {
                let needs_prune = match self.nodes[n_id as usize].friends.get_mut(lev) {
                    Some(friends) => {
                        friends.push(idx);
                        friends.len() > max_c
                    }
                    None => false,
                };
                if needs_prune {
                    let nn = &self.nodes[n_id as usize];
                    let pruned = self.select_closest(&nn.vector, &nn.friends[lev], max_c);
                    self.nodes[n_id as usize].friends[lev] = pruned;
                }
            }

            if !candidates.is_empty() {
                ep = candidates;
            }
        }

        if self.entry.is_none() || level > self.max_level {
            self.entry = Some(idx);
            self.max_level = level;
        }
    }

    /// Drop every edge into and out of node `idx`.
    fn unlink(&mut self, idx: u32) {
        // Pruning leaves one-way edges, so scan every node, not only friends.
        for nd in &mut self.nodes {
            for layer in &mut nd.friends {
                layer.retain(|&x| x != idx);
            }
        }
        let level = self.nodes[idx as usize].level;
        self.nodes[idx as usize].friends = vec![Vec::new(); level + 1];
    }

    fn push_node(&mut self, vector: &[f32]) -> usize {
        let level = self.random_level();
        self.nodes.push(HnswNode {
            vector: vector.to_vec(),
            level,
            friends: vec![Vec::new(); level + 1],
        });
        let idx = self.nodes.len() - 1;
        self.link(idx as u32);
        idx
    }

    fn exact_scan(&self, probe: &[f32], k: usize) -> QueryResult {
        let hits = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(slot, _)| !self.deleted.contains(slot))
            .map(|(slot, nd)| (slot, cosine_distance(probe, &nd.vector)))
            .collect();
        rank(hits, k)
    }
}

impl SlotIndex for Hnsw {
    fn dim(&self) -> usize {
        self.cfg.dim
    }

    fn bulk_load(&mut self, vectors: &[Vec<f32>]) -> Result<(), VecError> {
        for v in vectors {
            check_vector(self.cfg.dim, v)?;
        }
        self.nodes = Vec::with_capacity(vectors.len());
        self.deleted.clear();
        self.entry = None;
        self.max_level = 0;
        for v in vectors {
            self.push_node(v);
        }
        Ok(())
    }

    fn add_item(&mut self, vector: &[f32]) -> Result<usize, VecError> {
        check_vector(self.cfg.dim, vector)?;
        Ok(self.push_node(vector))
    }

    fn update_item(&mut self, slot: usize, vector: &[f32]) -> Result<(), VecError> {
        check_slot(slot, self.nodes.len())?;
        check_vector(self.cfg.dim, vector)?;

        self.unlink(slot as u32);
        self.nodes[slot].vector = vector.to_vec();
        self.link(slot as u32);
        self.deleted.remove(&slot);
        Ok(())
    }

    fn mark_deleted(&mut self, slot: usize) -> Result<(), VecError> {
        check_slot(slot, self.nodes.len())?;
        self.deleted.insert(slot);
        Ok(())
    }

    fn is_deleted(&self, slot: usize) -> bool {
        self.deleted.contains(&slot)
    }

    fn deleted_slots(&self) -> Vec<usize> {
        self.deleted.iter().copied().collect()
    }

    fn vector(&self, slot: usize) -> Option<&[f32]> {
        self.nodes.get(slot).map(|nd| nd.vector.as_slice())
    }

    fn query(&self, probe: &[f32], k: usize) -> Result<QueryResult, VecError> {
        check_probe(self.cfg.dim, probe)?;
        let live = self.live_len();
        if live == 0 {
            return Err(VecError::EmptyIndex);
        }
        if k == 0 {
            return Ok(QueryResult::default());
        }
        let want = k.min(live);

        let Some(entry) = self.entry else {
            return Ok(self.exact_scan(probe, want));
        };

        // Deleted nodes occupy beam slots, so widen the beam by their count.
        let ef = self.cfg.ef_search.max(want) + self.deleted.len();

        // Phase 1: Greedy descent from top layer to layer 1.
        let cur = self.descend(probe, entry, self.max_level, 0);

        // Phase 2: Beam search at layer 0.
        let hits: Vec<(usize, f32)> = self
            .search_layer(probe, &[cur], ef, 0)
            .into_iter()
            .map(|id| id as usize)
            .filter(|slot| !self.deleted.contains(slot))
            .map(|slot| (slot, cosine_distance(probe, &self.nodes[slot].vector)))
            .collect();

        if hits.len() < want {
            return Ok(self.exact_scan(probe, want));
        }
        Ok(rank(hits, want))
    }

    fn size(&self) -> usize {
        self.nodes.len()
    }

    fn live_len(&self) -> usize {
        self.nodes.len() - self.deleted.len()
    }
}
