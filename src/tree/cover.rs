//! Cover tree (metric tree), generic over the distance function.
//!
//! Levels are indexed by powers of a configurable base; the first point of
//! the dataset becomes the root. Every node keeps a self-child covering the
//! points closest to its own center, so each point surfaces in exactly one
//! leaf at the bottom of its self-chain. Because only the metric is needed,
//! the same construction serves Euclidean nearest-neighbor search and
//! max-kernel search through the kernel-induced metric.

use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::metric::Metric;
use crate::tree::{BuildError, SpaceTree};

#[derive(Debug, Clone)]
struct CoverNode {
    /// Point id of the node's center (dataset order; the cover tree never
    /// permutes its points).
    center: usize,
    /// Level of this node; `i32::MIN` marks a leaf.
    scale: i32,
    /// Upper bound on the distance from `center` to any descendant point.
    furthest: f64,
    /// The self-child (same center, lower level) is always first.
    children: Vec<usize>,
}

#[derive(Debug)]
pub struct CoverTree<M: Metric> {
    data: Array2<f64>,
    metric: M,
    base: f64,
    nodes: Vec<CoverNode>,
    root: usize,
}

impl<M: Metric> CoverTree<M> {
    /// Build a cover tree over `data` (rows are points).
    ///
    /// The returned permutation is always the identity: cover trees address
    /// points by id and never reorder the dataset.
    pub fn build(
        data: ArrayView2<'_, f64>,
        metric: M,
        base: f64,
    ) -> Result<(CoverTree<M>, Vec<usize>), BuildError> {
        if !(base > 1.0) {
            return Err(BuildError::InvalidBase(base));
        }
        let n = data.nrows();
        if n == 0 {
            return Err(BuildError::EmptyPointSet);
        }

        let mut tree = CoverTree {
            data: data.to_owned(),
            metric,
            base,
            nodes: Vec::with_capacity(2 * n),
            root: 0,
        };

        let near: Vec<(usize, f64)> = (1..n)
            .map(|i| (i, tree.metric.distance(data.row(0), data.row(i))))
            .collect();
        tree.root = tree.construct(0, near);
        tree.compute_radii();

        Ok((tree, (0..n).collect()))
    }

    /// Recursively build the node centered at `center` covering `near`
    /// (point, distance-to-center) pairs. Children are allocated before
    /// their parent, so node ids arrive in post-order.
    fn construct(&mut self, center: usize, near: Vec<(usize, f64)>) -> usize {
        if near.is_empty() {
            self.nodes.push(CoverNode {
                center,
                scale: i32::MIN,
                furthest: 0.0,
                children: Vec::new(),
            });
            return self.nodes.len() - 1;
        }

        let max_d = near.iter().fold(0.0f64, |m, &(_, d)| m.max(d));

        if max_d == 0.0 {
            // Coincident points: attach each duplicate as a direct leaf so
            // construction terminates instead of descending forever.
            let mut children = Vec::with_capacity(near.len() + 1);
            children.push(self.construct(center, Vec::new()));
            for (p, _) in near {
                children.push(self.construct(p, Vec::new()));
            }
            self.nodes.push(CoverNode {
                center,
                scale: i32::MIN + 1,
                furthest: 0.0,
                children,
            });
            return self.nodes.len() - 1;
        }

        // Pick the level so that base^(scale-1) < max_d <= base^scale.
        let mut scale = (max_d.ln() / self.base.ln()).ceil() as i32;
        let mut child_radius = self.base.powi(scale - 1);
        if child_radius >= max_d {
            scale -= 1;
            child_radius /= self.base;
        }

        let mut self_near = Vec::new();
        let mut far = Vec::new();
        for (p, d) in near {
            if d <= child_radius {
                self_near.push((p, d));
            } else {
                far.push(p);
            }
        }

        let mut children = Vec::new();
        children.push(self.construct(center, self_near));

        // Greedily peel off new child centers from the remaining points, in
        // dataset order for determinism.
        while let Some(new_center) = first_remaining(&far) {
            let mut child_near = Vec::new();
            let mut rest = Vec::new();
            for p in far.into_iter().filter(|&p| p != new_center) {
                let d = self
                    .metric
                    .distance(self.data.row(new_center), self.data.row(p));
                if d <= child_radius {
                    child_near.push((p, d));
                } else {
                    rest.push(p);
                }
            }
            children.push(self.construct(new_center, child_near));
            far = rest;
        }

        self.nodes.push(CoverNode {
            center,
            scale,
            furthest: 0.0,
            children,
        });
        self.nodes.len() - 1
    }

    /// Propagate descendant radii bottom-up: a node's furthest-descendant
    /// bound is the max over children of (distance to the child's center
    /// plus the child's own bound). Node ids are post-ordered, so a single
    /// forward pass suffices.
    fn compute_radii(&mut self) {
        for node in 0..self.nodes.len() {
            let center = self.nodes[node].center;
            let mut furthest = 0.0f64;
            for i in 0..self.nodes[node].children.len() {
                let child = self.nodes[node].children[i];
                let d = self
                    .metric
                    .distance(self.data.row(center), self.data.row(self.nodes[child].center));
                furthest = furthest.max(d + self.nodes[child].furthest);
            }
            self.nodes[node].furthest = furthest;
        }
    }

    /// Point id of the node's center.
    pub fn center(&self, node: usize) -> usize {
        self.nodes[node].center
    }

    /// Upper bound on the distance from the node's center to any point in
    /// its subtree.
    pub fn furthest_descendant(&self, node: usize) -> f64 {
        self.nodes[node].furthest
    }

    pub fn scale(&self, node: usize) -> i32 {
        self.nodes[node].scale
    }

    pub fn base(&self) -> f64 {
        self.base
    }
}

fn first_remaining(far: &[usize]) -> Option<usize> {
    far.iter().copied().min()
}

impl<M: Metric> SpaceTree for CoverTree<M> {
    fn root(&self) -> usize {
        self.root
    }

    fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    fn num_points(&self) -> usize {
        self.data.nrows()
    }

    fn data(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    fn children(&self, node: usize) -> &[usize] {
        &self.nodes[node].children
    }

    fn points(&self, node: usize) -> &[usize] {
        let n = &self.nodes[node];
        if n.children.is_empty() {
            std::slice::from_ref(&n.center)
        } else {
            &[]
        }
    }

    fn min_distance_to_point(&self, node: usize, point: ArrayView1<'_, f64>) -> f64 {
        let n = &self.nodes[node];
        let d = self.metric.distance(point, self.data.row(n.center));
        (d - n.furthest).max(0.0)
    }

    fn min_distance_between(&self, node: usize, other: &Self, other_node: usize) -> f64 {
        let a = &self.nodes[node];
        let b = &other.nodes[other_node];
        let d = self
            .metric
            .distance(self.data.row(a.center), other.data.row(b.center));
        (d - a.furthest - b.furthest).max(0.0)
    }
}
