//! Exact nearest-neighbor indexes over feature coefficients.
//!
//! Both indexes copy the coefficient vectors of a [`FeatureStore`] into one
//! contiguous buffer at build time and never change afterwards. Standard
//! deviations play no part here. A changed store needs a fresh index.

use std::collections::BinaryHeap;
use std::time::Instant;

use crate::config::validate_top_k;
use crate::search::euclidean_distance;
use crate::store::FeatureStore;
use crate::types::{SearchMatch, VisionError, VisionResult};

/// Maximum number of points held by a leaf.
const DEFAULT_LEAF_SIZE: usize = 16;

/// Relative slack applied before pruning a ball, absorbing rounding in the
/// triangle-inequality bound.
const PRUNE_SLACK: f64 = 1e-9;

/// Exact k-nearest-neighbor search over a frozen set of vectors.
pub trait NeighborIndex: Send + Sync {
    /// Up to `k` matches, ascending by distance, ties by store position.
    fn query(&self, vector: &[f64], k: usize) -> VisionResult<Vec<SearchMatch>>;

    /// Number of indexed vectors.
    fn len(&self) -> usize;

    /// Coefficient length of indexed vectors.
    fn dim(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Contiguous row-major copy of a store's coefficients.
#[derive(Debug, Clone)]
struct Points {
    data: Vec<f64>,
    dim: usize,
    count: usize,
}

impl Points {
    fn from_store(store: &FeatureStore) -> VisionResult<Self> {
        let dim = store.dim().ok_or_else(|| {
            VisionError::EmptyInput("cannot build an index over an empty store".to_string())
        })?;
        let mut data = Vec::with_capacity(dim * store.len());
        for v in store.vectors() {
            data.extend_from_slice(&v.coefficients);
        }
        Ok(Self {
            data,
            dim,
            count: store.len(),
        })
    }

    fn get(&self, idx: usize) -> &[f64] {
        let start = idx * self.dim;
        &self.data[start..start + self.dim]
    }

    fn check(&self, vector: &[f64], k: usize) -> VisionResult<()> {
        validate_top_k(k)?;
        if vector.len() != self.dim {
            return Err(VisionError::Dimension(format!(
                "query has {} coefficients, index holds {}",
                vector.len(),
                self.dim
            )));
        }
        Ok(())
    }
}

/// Heap entry ordered by `(distance, index)` so the worst candidate is on top.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate(SearchMatch);

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.rank_cmp(&other.0)
    }
}

/// Bounded max-heap keeping the `k` best matches seen so far.
struct TopK {
    k: usize,
    heap: BinaryHeap<Candidate>,
}

impl TopK {
    fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(1024)),
        }
    }

    fn offer(&mut self, m: SearchMatch) {
        if self.heap.len() < self.k {
            self.heap.push(Candidate(m));
        } else if let Some(worst) = self.heap.peek() {
            if m.rank_cmp(&worst.0).is_lt() {
                self.heap.pop();
                self.heap.push(Candidate(m));
            }
        }
    }

    /// Current pruning radius: the worst kept distance once full.
    fn bound(&self) -> f64 {
        if self.heap.len() < self.k {
            f64::INFINITY
        } else {
            self.heap.peek().map_or(f64::INFINITY, |c| c.0.distance)
        }
    }

    fn into_sorted(self) -> Vec<SearchMatch> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|c| c.0)
            .collect()
    }
}

/// Exhaustive scan of every indexed vector.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    points: Points,
}

impl FlatIndex {
    pub fn build(store: &FeatureStore) -> VisionResult<Self> {
        Ok(Self {
            points: Points::from_store(store)?,
        })
    }
}

impl NeighborIndex for FlatIndex {
    fn query(&self, vector: &[f64], k: usize) -> VisionResult<Vec<SearchMatch>> {
        self.points.check(vector, k)?;
        let mut top = TopK::new(k);
        for index in 0..self.points.count {
            top.offer(SearchMatch {
                index,
                distance: euclidean_distance(vector, self.points.get(index)),
            });
        }
        Ok(top.into_sorted())
    }

    fn len(&self) -> usize {
        self.points.count
    }

    fn dim(&self) -> usize {
        self.points.dim
    }
}

/// Ball tree parameters.
#[derive(Debug, Clone)]
pub struct BallTreeParams {
    /// Maximum points in a leaf.
    pub leaf_size: usize,
}

impl Default for BallTreeParams {
    fn default() -> Self {
        Self {
            leaf_size: DEFAULT_LEAF_SIZE,
        }
    }
}

enum BallNode {
    Internal {
        center: Vec<f64>,
        radius: f64,
        left: Box<BallNode>,
        right: Box<BallNode>,
    },
    Leaf {
        center: Vec<f64>,
        radius: f64,
        indices: Vec<usize>,
    },
}

impl BallNode {
    fn ball(&self) -> (&[f64], f64) {
        match self {
            BallNode::Internal { center, radius, .. } | BallNode::Leaf { center, radius, .. } => {
                (center.as_slice(), *radius)
            }
        }
    }
}

/// Ball tree: nested hyperspheres, each bounding the points below it.
///
/// Search descends the nearer child first and skips any ball whose closest
/// possible point is farther than the current k-th best distance, so results
/// are identical to an exhaustive scan.
pub struct BallTreeIndex {
    points: Points,
    root: BallNode,
}

impl BallTreeIndex {
    pub fn build(store: &FeatureStore) -> VisionResult<Self> {
        Self::build_with(store, BallTreeParams::default())
    }

    pub fn build_with(store: &FeatureStore, params: BallTreeParams) -> VisionResult<Self> {
        let start = Instant::now();
        let points = Points::from_store(store)?;
        let mut indices: Vec<usize> = (0..points.count).collect();
        let root = build_node(&points, &mut indices, params.leaf_size.max(1));
        tracing::info!(
            vectors = points.count,
            dim = points.dim,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Built ball tree index"
        );
        Ok(Self { points, root })
    }

    fn search(&self, node: &BallNode, query: &[f64], top: &mut TopK) {
        match node {
            BallNode::Leaf {
                center,
                radius,
                indices,
            } => {
                if can_prune(query, center, *radius, top.bound()) {
                    return;
                }
                for &index in indices {
                    top.offer(SearchMatch {
                        index,
                        distance: euclidean_distance(query, self.points.get(index)),
                    });
                }
            }
            BallNode::Internal {
                center,
                radius,
                left,
                right,
            } => {
                if can_prune(query, center, *radius, top.bound()) {
                    return;
                }
                let (lc, lr) = left.ball();
                let (rc, rr) = right.ball();
                let left_min = euclidean_distance(query, lc) - lr;
                let right_min = euclidean_distance(query, rc) - rr;
                if left_min <= right_min {
                    self.search(left, query, top);
                    self.search(right, query, top);
                } else {
                    self.search(right, query, top);
                    self.search(left, query, top);
                }
            }
        }
    }
}

impl NeighborIndex for BallTreeIndex {
    fn query(&self, vector: &[f64], k: usize) -> VisionResult<Vec<SearchMatch>> {
        self.points.check(vector, k)?;
        let mut top = TopK::new(k.min(self.points.count));
        self.search(&self.root, vector, &mut top);
        Ok(top.into_sorted())
    }

    fn len(&self) -> usize {
        self.points.count
    }

    fn dim(&self) -> usize {
        self.points.dim
    }
}

impl std::fmt::Debug for BallTreeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BallTreeIndex")
            .field("len", &self.points.count)
            .field("dim", &self.points.dim)
            .finish_non_exhaustive()
    }
}

/// A ball may hold a point at distance `bound` only if
/// `dist(query, center) - radius <= bound`; ties must still be visited.
fn can_prune(query: &[f64], center: &[f64], radius: f64, bound: f64) -> bool {
    if bound.is_infinite() {
        return false;
    }
    let min_possible = euclidean_distance(query, center) - radius;
    min_possible > bound + PRUNE_SLACK * (1.0 + bound + radius)
}

fn build_node(points: &Points, indices: &mut [usize], leaf_size: usize) -> BallNode {
    let center = centroid(points, indices);
    let radius = indices
        .iter()
        .map(|&i| euclidean_distance(points.get(i), &center))
        .fold(0.0, f64::max);

    if indices.len() <= leaf_size || radius == 0.0 {
        return BallNode::Leaf {
            center,
            radius,
            indices: indices.to_vec(),
        };
    }

    // Seeds: the point farthest from the centroid, then the point farthest from it.
    let far_a = farthest_from(points, indices, &center);
    let far_b = farthest_from(points, indices, points.get(far_a));
    let (seed_a, seed_b) = (points.get(far_a), points.get(far_b));

    // Partition in place: points closer to seed_a go first.
    let mut split = 0;
    for i in 0..indices.len() {
        let p = points.get(indices[i]);
        if euclidean_distance(p, seed_a) <= euclidean_distance(p, seed_b) {
            indices.swap(i, split);
            split += 1;
        }
    }
    if split == 0 || split == indices.len() {
        split = indices.len() / 2;
    }

    let (left, right) = indices.split_at_mut(split);
    BallNode::Internal {
        left: Box::new(build_node(points, left, leaf_size)),
        right: Box::new(build_node(points, right, leaf_size)),
        center,
        radius,
    }
}

fn centroid(points: &Points, indices: &[usize]) -> Vec<f64> {
    let mut center = vec![0.0; points.dim];
    for &i in indices {
        for (c, v) in center.iter_mut().zip(points.get(i)) {
            *c += v;
        }
    }
    let n = indices.len() as f64;
    center.iter_mut().for_each(|c| *c /= n);
    center
}

fn farthest_from(points: &Points, indices: &[usize], origin: &[f64]) -> usize {
    let mut best = indices[0];
    let mut best_dist = f64::NEG_INFINITY;
    for &i in indices {
        let d = euclidean_distance(points.get(i), origin);
        if d > best_dist {
            best_dist = d;
            best = i;
        }
    }
    best
}
