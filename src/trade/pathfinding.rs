//! Deterministic route discovery over the region graph, with a bounded memo cache.
//!
//! The search is A* over `(region, hops)` states so the hop bound never hides a
//! cheaper-but-longer path. Ties are broken by hop count and then region id, and
//! neighbour lists are sorted, so identical inputs always produce identical output.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use super::calculator::MIN_ROUTE_SAFETY;
use super::config::PathfindingConfig;
use crate::model::{PathFeatures, RegionGraph, RegionId, Resource, TradeGood};

type PathKey = (RegionId, RegionId, Resource);
type LinkKey = (RegionId, RegionId);

fn link_key(a: RegionId, b: RegionId) -> LinkKey {
    if a <= b { (a, b) } else { (b, a) }
}

/// One candidate path with the figures the route builder needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathResult {
    /// Every region on the path, both endpoints included.
    pub path: Vec<RegionId>,
    pub distance_km: f64,
    pub features: PathFeatures,
    /// Product of link safeties, clamped to [0.1, 1].
    pub safety: f64,
    /// Search cost (distance plus safety, congestion and terrain penalties).
    pub cost: f64,
}

/// Best path plus ranked alternatives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSearch {
    pub best: PathResult,
    pub alternatives: Vec<PathResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

struct CacheEntry {
    generation: u64,
    result: Option<Arc<RouteSearch>>,
}

/// Size-bounded memo; evicts in first-insertion order.
struct PathCache {
    entries: BTreeMap<PathKey, CacheEntry>,
    order: VecDeque<PathKey>,
    capacity: usize,
    hits: u64,
    misses: u64,
}

impl PathCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
            hits: 0,
            misses: 0,
        }
    }

    fn lookup(&mut self, key: &PathKey, generation: u64) -> Option<Option<Arc<RouteSearch>>> {
        match self.entries.get(key) {
            Some(entry) if entry.generation == generation => {
                self.hits += 1;
                Some(entry.result.clone())
            }
            _ => {
                self.misses += 1;
                None
            }
        }
    }

    fn store(&mut self, key: PathKey, generation: u64, result: Option<Arc<RouteSearch>>) {
        if let Some(entry) = self.entries.get_mut(&key) {
            // Refresh in place; keeps its original eviction slot.
            if generation >= entry.generation {
                entry.generation = generation;
                entry.result = result;
            }
            return;
        }
        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
        self.entries.insert(key, CacheEntry { generation, result });
        self.order.push_back(key);
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

// ---------------------------------------------------------------------------
// Congestion
// ---------------------------------------------------------------------------

/// Active route counts per link. Only band changes (count / band size) affect search
/// results, so only they bump the generation.
struct Congestion {
    counts: BTreeMap<LinkKey, u32>,
    bands: Arc<BTreeMap<LinkKey, u32>>,
    generation: u64,
    band_size: u32,
}

impl Congestion {
    fn adjust(&mut self, path: &[RegionId], add: bool) {
        let mut changed = false;
        for pair in path.windows(2) {
            let key = link_key(pair[0], pair[1]);
            let count = self.counts.entry(key).or_insert(0);
            let old_band = *count / self.band_size;
            *count = if add {
                count.saturating_add(1)
            } else {
                count.saturating_sub(1)
            };
            let new_band = *count / self.band_size;
            if *count == 0 {
                self.counts.remove(&key);
            }
            if new_band != old_band {
                let bands = Arc::make_mut(&mut self.bands);
                if new_band == 0 {
                    bands.remove(&key);
                } else {
                    bands.insert(key, new_band);
                }
                changed = true;
            }
        }
        if changed {
            self.generation += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Search state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Frontier {
    priority: f64,
    cost: f64,
    hops: usize,
    region: RegionId,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    // Reversed: BinaryHeap pops the cheapest, fewest-hop, lowest-id state first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| other.hops.cmp(&self.hops))
            .then_with(|| other.region.cmp(&self.region))
    }
}

// ---------------------------------------------------------------------------
// Route finder
// ---------------------------------------------------------------------------

pub struct RouteFinder {
    graph: Arc<RegionGraph>,
    config: PathfindingConfig,
    cache: Mutex<PathCache>,
    congestion: Mutex<Congestion>,
}

impl RouteFinder {
    pub fn new(graph: Arc<RegionGraph>, config: PathfindingConfig) -> Self {
        let capacity = config.cache_capacity;
        let band_size = config.congestion_band_size.max(1);
        Self {
            graph,
            config,
            cache: Mutex::new(PathCache::new(capacity)),
            congestion: Mutex::new(Congestion {
                counts: BTreeMap::new(),
                bands: Arc::new(BTreeMap::new()),
                generation: 0,
                band_size,
            }),
        }
    }

    pub fn graph(&self) -> &RegionGraph {
        &self.graph
    }

    fn congestion_snapshot(&self) -> (u64, Arc<BTreeMap<LinkKey, u32>>) {
        let congestion = self
            .congestion
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        (congestion.generation, Arc::clone(&congestion.bands))
    }

    /// Best path and alternatives, served from the cache when possible.
    ///
    /// `None` means no path exists within the hop and distance bounds.
    pub fn find(
        &self,
        source: RegionId,
        destination: RegionId,
        resource: Resource,
    ) -> Option<Arc<RouteSearch>> {
        let key = (source, destination, resource);
        let (generation, bands) = self.congestion_snapshot();

        if let Some(hit) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .lookup(&key, generation)
        {
            return hit;
        }

        let result = self
            .search(source, destination, resource, &bands)
            .map(Arc::new);
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .store(key, generation, result.clone());
        result
    }

    /// Same as [`find`](Self::find) but never reads or writes the cache.
    pub fn search_uncached(
        &self,
        source: RegionId,
        destination: RegionId,
        resource: Resource,
    ) -> Option<RouteSearch> {
        let (_, bands) = self.congestion_snapshot();
        self.search(source, destination, resource, &bands)
    }

    pub fn cache_stats(&self) -> CacheStats {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        CacheStats {
            hits: cache.hits,
            misses: cache.misses,
            entries: cache.entries.len(),
            capacity: cache.capacity,
        }
    }

    pub fn clear_cache(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Count a committed route against every link on its path.
    pub fn record_route(&self, path: &[RegionId]) {
        self.congestion
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .adjust(path, true);
    }

    pub fn release_route(&self, path: &[RegionId]) {
        self.congestion
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .adjust(path, false);
    }

    /// Replace all congestion counts with the given route paths.
    pub fn reset_congestion<'a>(&self, paths: impl IntoIterator<Item = &'a [RegionId]>) {
        let mut congestion = self
            .congestion
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        congestion.counts.clear();
        congestion.bands = Arc::new(BTreeMap::new());
        congestion.generation += 1;
        for path in paths {
            congestion.adjust(path, true);
        }
    }

    /// Active routes counted on the link between two regions.
    pub fn link_load(&self, a: RegionId, b: RegionId) -> u32 {
        self.congestion
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .counts
            .get(&link_key(a, b))
            .copied()
            .unwrap_or(0)
    }

    fn search(
        &self,
        source: RegionId,
        destination: RegionId,
        resource: Resource,
        bands: &BTreeMap<LinkKey, u32>,
    ) -> Option<RouteSearch> {
        if source == destination
            || !self.graph.contains(source)
            || !self.graph.contains(destination)
        {
            return None;
        }
        let good = resource.properties();
        let best = self.shortest(source, destination, &good, bands, &BTreeSet::new())?;

        let mut alternatives: Vec<PathResult> = Vec::new();
        for pair in best.path.windows(2) {
            let banned = BTreeSet::from([link_key(pair[0], pair[1])]);
            let Some(candidate) = self.shortest(source, destination, &good, bands, &banned)
            else {
                continue;
            };
            if candidate.path != best.path && !alternatives.iter().any(|a| a.path == candidate.path)
            {
                alternatives.push(candidate);
            }
        }
        alternatives.sort_by(|a, b| a.cost.total_cmp(&b.cost).then_with(|| a.path.cmp(&b.path)));
        alternatives.truncate(self.config.max_alternatives);

        Some(RouteSearch { best, alternatives })
    }

    fn link_cost(&self, distance_km: f64, safety: f64, mountain_pass: bool, band: u32, good: &TradeGood) -> f64 {
        let cfg = &self.config;
        let mut cost = distance_km * cfg.distance_weight
            + distance_km * (1.0 - safety) * cfg.safety_weight
            + f64::from(band) * cfg.congestion_km_per_band * cfg.congestion_weight;
        if mountain_pass && good.bulk_factor > 1.0 {
            cost += distance_km * cfg.mountain_bulk_penalty * (good.bulk_factor - 1.0);
        }
        cost
    }

    fn heuristic(&self, region: RegionId, destination: RegionId) -> f64 {
        self.graph
            .straight_line_km(region, destination)
            .map_or(0.0, |km| km * self.config.distance_weight)
    }

    fn shortest(
        &self,
        source: RegionId,
        destination: RegionId,
        good: &TradeGood,
        bands: &BTreeMap<LinkKey, u32>,
        banned: &BTreeSet<LinkKey>,
    ) -> Option<PathResult> {
        let max_hops = self.config.max_hops;
        let max_distance = self.config.max_distance_km;

        // (region, hops) -> (cost, distance, predecessor)
        let mut settled: BTreeMap<(RegionId, usize), (f64, f64, Option<RegionId>)> =
            BTreeMap::new();
        let mut heap = BinaryHeap::new();

        settled.insert((source, 0), (0.0, 0.0, None));
        heap.push(Frontier {
            priority: self.heuristic(source, destination),
            cost: 0.0,
            hops: 0,
            region: source,
        });

        while let Some(current) = heap.pop() {
            let Some(&(best_cost, distance, _)) = settled.get(&(current.region, current.hops))
            else {
                continue;
            };
            if current.cost > best_cost {
                continue;
            }
            if current.region == destination {
                return Some(self.assemble(&settled, destination, current.hops));
            }
            if current.hops >= max_hops {
                continue;
            }

            for link in self.graph.neighbors(current.region) {
                let key = link_key(current.region, link.to);
                if banned.contains(&key) {
                    continue;
                }
                let next_distance = distance + link.spec.distance_km;
                if next_distance > max_distance {
                    continue;
                }
                let band = bands.get(&key).copied().unwrap_or(0);
                let next_cost = current.cost
                    + self.link_cost(
                        link.spec.distance_km,
                        link.spec.safety,
                        link.spec.mountain_pass,
                        band,
                        good,
                    );
                let next_hops = current.hops + 1;

                // Dominated if some state at this region with no more hops is no dearer.
                let dominated = (0..=next_hops).any(|h| {
                    settled
                        .get(&(link.to, h))
                        .is_some_and(|(c, _, _)| *c <= next_cost)
                });
                if dominated {
                    continue;
                }

                settled.insert(
                    (link.to, next_hops),
                    (next_cost, next_distance, Some(current.region)),
                );
                heap.push(Frontier {
                    priority: next_cost + self.heuristic(link.to, destination),
                    cost: next_cost,
                    hops: next_hops,
                    region: link.to,
                });
            }
        }
        None
    }

    fn assemble(
        &self,
        settled: &BTreeMap<(RegionId, usize), (f64, f64, Option<RegionId>)>,
        destination: RegionId,
        hops: usize,
    ) -> PathResult {
        let mut path = vec![destination];
        let mut cursor = (destination, hops);
        while let Some(&(_, _, Some(prev))) = settled.get(&cursor) {
            path.push(prev);
            cursor = (prev, cursor.1 - 1);
        }
        path.reverse();

        let cost = settled
            .get(&(destination, hops))
            .map_or(0.0, |(c, _, _)| *c);
        let mut distance_km = 0.0;
        let mut safety = 1.0;
        let mut features = PathFeatures::default();
        for pair in path.windows(2) {
            if let Some(spec) = self.graph.link(pair[0], pair[1]) {
                distance_km += spec.distance_km;
                safety *= spec.safety;
                features.coastal |= spec.coastal;
                features.river |= spec.river;
                features.mountain_pass |= spec.mountain_pass;
            }
        }

        PathResult {
            path,
            distance_km,
            features,
            safety: safety.clamp(MIN_ROUTE_SAFETY, 1.0),
            cost,
        }
    }
}
