//! Radio-range neighbor computation.
//!
//! Two vehicles are neighbors when they are within a given range of each
//! other (DSRC range for radio links, boundary detection range for
//! inter-cluster visibility). The relation is symmetric.
//!
//! [`NeighborTable`] is built once per tick from a consistent snapshot of
//! positions, so every phase of the tick sees the same adjacency.

use std::collections::BTreeMap;

use crate::{NodeId, Position};

/// Check if two positions are within `range` of each other (inclusive).
pub fn within_range(a: Position, b: Position, range: f64) -> bool {
    a.distance_squared(&b) <= range * range
}

/// Arithmetic mean of a set of positions. `None` for an empty set.
pub fn centroid<I>(points: I) -> Option<Position>
where
    I: IntoIterator<Item = Position>,
{
    let mut count = 0usize;
    let mut sum = Position::ORIGIN;
    for p in points {
        sum = sum + p;
        count += 1;
    }
    if count == 0 {
        return None;
    }
    let n = count as f64;
    Some(Position::new(sum.x / n, sum.y / n))
}

/// Largest distance from `center` to any of the points. Zero for an empty set.
pub fn radius<I>(points: I, center: Position) -> f64
where
    I: IntoIterator<Item = Position>,
{
    points
        .into_iter()
        .map(|p| p.distance(&center))
        .fold(0.0, f64::max)
}

/// The two points farthest apart, lowest ids first on ties.
///
/// Used to seed a two-way spatial partition. `None` with fewer than two points.
pub fn farthest_pair(points: &[(NodeId, Position)]) -> Option<(NodeId, NodeId)> {
    let mut best: Option<(NodeId, NodeId, f64)> = None;
    for (i, &(a, pa)) in points.iter().enumerate() {
        for &(b, pb) in &points[i + 1..] {
            let d = pa.distance_squared(&pb);
            match best {
                Some((_, _, best_d)) if d <= best_d => {}
                _ => best = Some((a, b, d)),
            }
        }
    }
    best.map(|(a, b, _)| if a <= b { (a, b) } else { (b, a) })
}

/// Symmetric adjacency of nodes within a fixed range.
#[derive(Debug, Clone, Default)]
pub struct NeighborTable {
    range: f64,
    positions: BTreeMap<NodeId, Position>,
    adjacency: BTreeMap<NodeId, Vec<NodeId>>,
}

impl NeighborTable {
    /// Build the table for a snapshot of positions.
    ///
    /// Neighbor lists are sorted by id.
    pub fn build<I>(nodes: I, range: f64) -> Self
    where
        I: IntoIterator<Item = (NodeId, Position)>,
    {
        let positions: BTreeMap<NodeId, Position> = nodes.into_iter().collect();
        let ordered: Vec<(NodeId, Position)> = positions.iter().map(|(&id, &p)| (id, p)).collect();
        let mut adjacency: BTreeMap<NodeId, Vec<NodeId>> =
            ordered.iter().map(|&(id, _)| (id, Vec::new())).collect();

        for (i, &(a, pa)) in ordered.iter().enumerate() {
            for &(b, pb) in &ordered[i + 1..] {
                if within_range(pa, pb, range) {
                    if let Some(list) = adjacency.get_mut(&a) {
                        list.push(b);
                    }
                    if let Some(list) = adjacency.get_mut(&b) {
                        list.push(a);
                    }
                }
            }
        }

        Self {
            range,
            positions,
            adjacency,
        }
    }

    /// The range this table was built with.
    pub fn range(&self) -> f64 {
        self.range
    }

    /// Position of a node in the snapshot.
    pub fn position(&self, id: NodeId) -> Option<Position> {
        self.positions.get(&id).copied()
    }

    /// Neighbors of a node (empty for unknown nodes).
    pub fn neighbors(&self, id: NodeId) -> &[NodeId] {
        self.adjacency.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of neighbors of a node.
    pub fn degree(&self, id: NodeId) -> usize {
        self.neighbors(id).len()
    }

    /// Check whether two nodes are neighbors.
    pub fn are_neighbors(&self, a: NodeId, b: NodeId) -> bool {
        self.neighbors(a).binary_search(&b).is_ok()
    }

    /// Count how many of a node's neighbors satisfy a predicate.
    ///
    /// Used for connectivity within a cluster: the predicate is membership.
    pub fn count_present_neighbors<F>(&self, id: NodeId, is_present: F) -> usize
    where
        F: Fn(NodeId) -> bool,
    {
        self.neighbors(id).iter().filter(|&&n| is_present(n)).count()
    }

    /// Number of nodes in the table.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn line(n: u64, spacing: f64) -> Vec<(NodeId, Position)> {
        (0..n)
            .map(|i| (NodeId(i), Position::new(i as f64 * spacing, 0.0)))
            .collect()
    }

    #[test]
    fn range_is_inclusive() {
        assert!(within_range(Position::ORIGIN, Position::new(100.0, 0.0), 100.0));
        assert!(!within_range(Position::ORIGIN, Position::new(100.1, 0.0), 100.0));
    }

    #[test]
    fn centroid_of_square() {
        let c = centroid([
            Position::new(0.0, 0.0),
            Position::new(2.0, 0.0),
            Position::new(2.0, 2.0),
            Position::new(0.0, 2.0),
        ])
        .unwrap();
        assert_eq!(c, Position::new(1.0, 1.0));
    }

    #[test]
    fn centroid_empty_is_none() {
        assert!(centroid(std::iter::empty()).is_none());
    }

    #[test]
    fn radius_is_max_distance() {
        let pts = [Position::new(3.0, 4.0), Position::new(1.0, 0.0)];
        assert!((radius(pts, Position::ORIGIN) - 5.0).abs() < 1e-9);
        assert_eq!(radius(std::iter::empty(), Position::ORIGIN), 0.0);
    }

    #[test]
    fn farthest_pair_on_line() {
        let pts = line(5, 10.0);
        assert_eq!(farthest_pair(&pts), Some((NodeId(0), NodeId(4))));
        assert_eq!(farthest_pair(&pts[..1]), None);
    }

    #[test]
    fn line_adjacency() {
        let table = NeighborTable::build(line(4, 100.0), 150.0);
        assert_eq!(table.neighbors(NodeId(0)), &[NodeId(1)]);
        assert_eq!(table.neighbors(NodeId(1)), &[NodeId(0), NodeId(2)]);
        assert_eq!(table.degree(NodeId(3)), 1);
        assert!(table.are_neighbors(NodeId(2), NodeId(3)));
        assert!(!table.are_neighbors(NodeId(0), NodeId(2)));
    }

    #[test]
    fn unknown_node_has_no_neighbors() {
        let table = NeighborTable::build(line(2, 1.0), 5.0);
        assert!(table.neighbors(NodeId(99)).is_empty());
        assert!(table.position(NodeId(99)).is_none());
    }

    #[test]
    fn count_neighbors_partial() {
        let table = NeighborTable::build(line(5, 10.0), 100.0);
        // Everyone sees everyone; only even ids are "present"
        let count = table.count_present_neighbors(NodeId(1), |n| n.0 % 2 == 0);
        assert_eq!(count, 3);
    }

    proptest! {
        #[test]
        fn neighbor_relation_symmetric(coords in proptest::collection::vec((-500f64..500.0, -500f64..500.0), 1..30)) {
            let nodes: Vec<_> = coords
                .iter()
                .enumerate()
                .map(|(i, &(x, y))| (NodeId(i as u64), Position::new(x, y)))
                .collect();
            let table = NeighborTable::build(nodes.clone(), 200.0);
            for &(a, _) in &nodes {
                for &b in table.neighbors(a) {
                    prop_assert!(table.are_neighbors(b, a));
                    prop_assert_ne!(a, b);
                }
            }
        }
    }
}
