use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::region::RegionId;

/// A region as seen by the pathfinder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionNode {
    pub id: RegionId,
    pub name: String,
    /// Map position in kilometres.
    pub position: (f64, f64),
}

/// Properties of a connection between two neighbouring regions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkSpec {
    pub distance_km: f64,
    pub river: bool,
    pub coastal: bool,
    pub mountain_pass: bool,
    /// 0.0 (lawless) to 1.0 (patrolled).
    pub safety: f64,
}

impl Default for LinkSpec {
    fn default() -> Self {
        Self {
            distance_km: 0.0,
            river: false,
            coastal: false,
            mountain_pass: false,
            safety: 0.95,
        }
    }
}

/// One directed half of a link, stored in the neighbour list of its origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionLink {
    pub to: RegionId,
    pub spec: LinkSpec,
}

/// Region adjacency graph: bidirectional links, neighbour lists sorted by id.
///
/// BTreeMap for deterministic iteration.
#[derive(Debug, Clone, Default)]
pub struct RegionGraph {
    nodes: BTreeMap<RegionId, RegionNode>,
    links: BTreeMap<RegionId, Vec<RegionLink>>,
}

impl RegionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_region(&mut self, id: RegionId, name: impl Into<String>, position: (f64, f64)) {
        self.nodes.insert(
            id,
            RegionNode {
                id,
                name: name.into(),
                position,
            },
        );
        self.links.entry(id).or_default();
    }

    /// Add (or replace) a bidirectional link.
    ///
    /// The stored distance is never shorter than the straight line between the two
    /// regions, which keeps the A* heuristic admissible.
    pub fn connect(&mut self, a: RegionId, b: RegionId, spec: LinkSpec) {
        if a == b {
            return;
        }
        let straight = self.straight_line_km(a, b).unwrap_or(0.0);
        let spec = LinkSpec {
            distance_km: spec.distance_km.max(straight),
            safety: spec.safety.clamp(0.0, 1.0),
            ..spec
        };
        Self::insert_half(self.links.entry(a).or_default(), RegionLink { to: b, spec });
        Self::insert_half(self.links.entry(b).or_default(), RegionLink { to: a, spec });
    }

    fn insert_half(list: &mut Vec<RegionLink>, link: RegionLink) {
        match list.binary_search_by(|l| l.to.cmp(&link.to)) {
            Ok(pos) => list[pos] = link,
            Err(pos) => list.insert(pos, link),
        }
    }

    pub fn contains(&self, region: RegionId) -> bool {
        self.nodes.contains_key(&region)
    }

    pub fn node(&self, region: RegionId) -> Option<&RegionNode> {
        self.nodes.get(&region)
    }

    pub fn regions(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.nodes.keys().copied()
    }

    /// Sorted outgoing links of a region.
    pub fn neighbors(&self, region: RegionId) -> &[RegionLink] {
        self.links.get(&region).map_or(&[], |v| v.as_slice())
    }

    pub fn link(&self, a: RegionId, b: RegionId) -> Option<&LinkSpec> {
        let list = self.links.get(&a)?;
        list.binary_search_by(|l| l.to.cmp(&b))
            .ok()
            .map(|pos| &list[pos].spec)
    }

    pub fn are_adjacent(&self, a: RegionId, b: RegionId) -> bool {
        self.link(a, b).is_some()
    }

    pub fn straight_line_km(&self, a: RegionId, b: RegionId) -> Option<f64> {
        let (ax, ay) = self.nodes.get(&a)?.position;
        let (bx, by) = self.nodes.get(&b)?.position;
        Some(((ax - bx).powi(2) + (ay - by).powi(2)).sqrt())
    }

    /// Regions reachable within `hops` links, including `origin`, in ascending id order.
    pub fn within_hops(&self, origin: RegionId, hops: usize) -> Vec<RegionId> {
        let mut seen: BTreeMap<RegionId, usize> = BTreeMap::new();
        let mut frontier = vec![origin];
        seen.insert(origin, 0);
        for depth in 1..=hops {
            let mut next = Vec::new();
            for region in frontier {
                for link in self.neighbors(region) {
                    if !seen.contains_key(&link.to) {
                        seen.insert(link.to, depth);
                        next.push(link.to);
                    }
                }
            }
            frontier = next;
        }
        seen.into_keys().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> RegionGraph {
        let mut g = RegionGraph::new();
        g.add_region(RegionId(1), "A", (0.0, 0.0));
        g.add_region(RegionId(2), "B", (100.0, 0.0));
        g.add_region(RegionId(3), "C", (200.0, 0.0));
        g
    }

    #[test]
    fn connect_is_bidirectional_and_sorted() {
        let mut g = graph();
        g.connect(RegionId(2), RegionId(3), LinkSpec::default());
        g.connect(RegionId(2), RegionId(1), LinkSpec::default());
        let ids: Vec<_> = g.neighbors(RegionId(2)).iter().map(|l| l.to).collect();
        assert_eq!(ids, vec![RegionId(1), RegionId(3)]);
        assert!(g.are_adjacent(RegionId(3), RegionId(2)));
        assert!(!g.are_adjacent(RegionId(1), RegionId(3)));
    }

    #[test]
    fn link_distance_never_below_straight_line() {
        let mut g = graph();
        g.connect(
            RegionId(1),
            RegionId(2),
            LinkSpec {
                distance_km: 10.0,
                ..LinkSpec::default()
            },
        );
        assert_eq!(g.link(RegionId(1), RegionId(2)).unwrap().distance_km, 100.0);
    }

    #[test]
    fn self_links_are_ignored() {
        let mut g = graph();
        g.connect(RegionId(1), RegionId(1), LinkSpec::default());
        assert!(g.neighbors(RegionId(1)).is_empty());
    }

    #[test]
    fn within_hops_expands_rings() {
        let mut g = graph();
        g.connect(RegionId(1), RegionId(2), LinkSpec::default());
        g.connect(RegionId(2), RegionId(3), LinkSpec::default());
        assert_eq!(g.within_hops(RegionId(1), 1), vec![RegionId(1), RegionId(2)]);
        assert_eq!(
            g.within_hops(RegionId(1), 2),
            vec![RegionId(1), RegionId(2), RegionId(3)]
        );
    }
}
