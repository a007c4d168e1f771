//! Pruning rules: the scoring and base-case logic the drivers invoke.
//!
//! A rule owns everything a traversal mutates: the candidate lists, the
//! per-query-node bound cache used for dual-tree pruning, and the memo that
//! guards against re-evaluating the same point pair twice in a row. The
//! trees themselves stay read-only, so one tree can serve many searches.
//!
//! Scores double as traversal priorities with the convention that smaller
//! is more promising; `None` means the subtree (pair) cannot improve any
//! candidate list and is pruned.

use ndarray::ArrayView2;

use crate::kernel::Kernel;
use crate::metric::{Euclidean, IpMetric, Metric};
use crate::search::candidates::{CandidateSet, MaxKernelSort, NearestSort};
use crate::tree::{CoverTree, SpaceTree};

/// What a traversal driver needs from a search-specific rule.
pub trait TraversalRule {
    /// Exact comparison of one query point against one reference point;
    /// offers the result to the candidate list and returns it.
    fn base_case(&mut self, query: usize, reference: usize) -> f64;

    /// Bound for (query point, reference node). `None` prunes; otherwise a
    /// priority where smaller is more promising.
    fn score(&mut self, query: usize, ref_node: usize) -> Option<f64>;

    /// Re-check a previously computed point-node score against bounds that
    /// may have tightened since.
    fn rescore(&mut self, query: usize, ref_node: usize, old_score: f64) -> Option<f64>;

    /// Bound for (query node, reference node), valid for every query point
    /// in the query subtree at once.
    fn score_nodes(&mut self, query_node: usize, ref_node: usize) -> Option<f64>;

    /// Re-check a previously computed node-node score.
    fn rescore_nodes(&mut self, query_node: usize, ref_node: usize, old_score: f64)
        -> Option<f64>;
}

/// Nearest-neighbor rule, generic over the reference tree kind.
///
/// Prunes a reference node when its lower-bound distance exceeds the
/// query's current k-th best distance; in the dual-tree case the bound is
/// compared against the worst k-th best across the whole query subtree,
/// cached per query node.
pub struct NeighborRule<'a, 'b, T: SpaceTree> {
    reference_data: ArrayView2<'a, f64>,
    reference_tree: Option<&'a T>,
    query: ArrayView2<'b, f64>,
    query_tree: Option<&'b T>,
    metric: Euclidean,
    pub candidates: CandidateSet<NearestSort>,
    /// Per query-node upper bound on any descendant's k-th best distance;
    /// starts at infinity (never prune) and only tightens.
    node_bounds: Vec<f64>,
    last_query: usize,
    last_ref: usize,
    last_value: f64,
}

impl<'a, 'b, T: SpaceTree> NeighborRule<'a, 'b, T> {
    /// Rule for naive search: no trees, base cases only.
    pub fn naive(
        reference_data: ArrayView2<'a, f64>,
        query: ArrayView2<'b, f64>,
        k: usize,
        exclude_self: bool,
    ) -> Self {
        NeighborRule {
            reference_data,
            reference_tree: None,
            query,
            query_tree: None,
            metric: Euclidean,
            candidates: CandidateSet::new(query.nrows(), k, exclude_self),
            node_bounds: Vec::new(),
            last_query: usize::MAX,
            last_ref: usize::MAX,
            last_value: 0.0,
        }
    }

    /// Rule for single-tree search over `reference`; queries are visited in
    /// the order of `query`'s rows.
    pub fn single(
        reference: &'a T,
        query: ArrayView2<'b, f64>,
        k: usize,
        exclude_self: bool,
    ) -> Self {
        NeighborRule {
            reference_data: reference.data(),
            reference_tree: Some(reference),
            query,
            query_tree: None,
            metric: Euclidean,
            candidates: CandidateSet::new(query.nrows(), k, exclude_self),
            node_bounds: Vec::new(),
            last_query: usize::MAX,
            last_ref: usize::MAX,
            last_value: 0.0,
        }
    }

    /// Rule for dual-tree search. For a monochromatic search pass the same
    /// tree twice and set `exclude_self`.
    pub fn dual(reference: &'a T, query_tree: &'b T, k: usize, exclude_self: bool) -> Self {
        NeighborRule {
            reference_data: reference.data(),
            reference_tree: Some(reference),
            query: query_tree.data(),
            query_tree: Some(query_tree),
            metric: Euclidean,
            candidates: CandidateSet::new(query_tree.num_points(), k, exclude_self),
            node_bounds: vec![f64::INFINITY; query_tree.num_nodes()],
            last_query: usize::MAX,
            last_ref: usize::MAX,
            last_value: 0.0,
        }
    }

    /// Worst (largest) current k-th best distance over every query point in
    /// the subtree of `query_node`: the threshold a reference node must
    /// beat to be worth visiting for *any* of them. Leaf values are exact;
    /// interior nodes combine their children's cached values, which can
    /// only lag behind (never undercut) the true bound, so pruning stays
    /// safe.
    fn update_node_bound(&mut self, query_node: usize) -> f64 {
        let tree = self.query_tree.expect("node bounds need a query tree");
        let children = tree.children(query_node);
        let fresh = if children.is_empty() {
            tree.points(query_node)
                .iter()
                .map(|&q| self.candidates.worst_bound(q))
                .fold(f64::NEG_INFINITY, f64::max)
        } else {
            children
                .iter()
                .map(|&c| self.node_bounds[c])
                .fold(f64::NEG_INFINITY, f64::max)
        };
        let bound = fresh.min(self.node_bounds[query_node]);
        self.node_bounds[query_node] = bound;
        bound
    }
}

impl<'a, 'b, T: SpaceTree> TraversalRule for NeighborRule<'a, 'b, T> {
    fn base_case(&mut self, query: usize, reference: usize) -> f64 {
        if query == self.last_query && reference == self.last_ref {
            return self.last_value;
        }
        let d = self
            .metric
            .distance(self.query.row(query), self.reference_data.row(reference));
        self.candidates.insert(query, reference, d);
        self.last_query = query;
        self.last_ref = reference;
        self.last_value = d;
        d
    }

    fn score(&mut self, query: usize, ref_node: usize) -> Option<f64> {
        let tree = self.reference_tree.expect("single-tree score needs a tree");
        let lower = tree.min_distance_to_point(ref_node, self.query.row(query));
        if lower > self.candidates.worst_bound(query) {
            None
        } else {
            Some(lower)
        }
    }

    fn rescore(&mut self, query: usize, _ref_node: usize, old_score: f64) -> Option<f64> {
        if old_score > self.candidates.worst_bound(query) {
            None
        } else {
            Some(old_score)
        }
    }

    fn score_nodes(&mut self, query_node: usize, ref_node: usize) -> Option<f64> {
        let rtree = self.reference_tree.expect("dual score needs trees");
        let qtree = self.query_tree.expect("dual score needs trees");
        let lower = rtree.min_distance_between(ref_node, qtree, query_node);
        if lower > self.update_node_bound(query_node) {
            None
        } else {
            Some(lower)
        }
    }

    fn rescore_nodes(
        &mut self,
        query_node: usize,
        _ref_node: usize,
        old_score: f64,
    ) -> Option<f64> {
        if old_score > self.update_node_bound(query_node) {
            None
        } else {
            Some(old_score)
        }
    }
}

/// Max-kernel rule over cover trees built in the kernel-induced metric.
///
/// The point-node bound is `K(q, c) + lambda * |phi(q)|` where `c` is the
/// node's center, `lambda` its furthest-descendant distance, and `|phi(q)|
/// = sqrt(K(q, q))` the query's feature-space norm: by Cauchy-Schwarz no
/// descendant can exceed it. The node-node bound extends this with the
/// query side's own radius.
pub struct MaxKernelRule<'a, 'b, K: Kernel> {
    reference_data: ArrayView2<'a, f64>,
    reference_tree: Option<&'a CoverTree<IpMetric<K>>>,
    query: ArrayView2<'b, f64>,
    query_tree: Option<&'b CoverTree<IpMetric<K>>>,
    kernel: K,
    query_norms: Vec<f64>,
    reference_norms: Vec<f64>,
    pub candidates: CandidateSet<MaxKernelSort>,
    /// Per query-node lower bound on any descendant's k-th best kernel
    /// value; starts at -infinity (never prune) and only rises.
    node_bounds: Vec<f64>,
    last_query: usize,
    last_ref: usize,
    last_value: f64,
}

fn feature_norms<K: Kernel>(kernel: &K, data: ArrayView2<'_, f64>) -> Vec<f64> {
    (0..data.nrows())
        .map(|i| kernel.evaluate(data.row(i), data.row(i)).max(0.0).sqrt())
        .collect()
}

impl<'a, 'b, K: Kernel + Clone> MaxKernelRule<'a, 'b, K> {
    pub fn naive(
        reference_data: ArrayView2<'a, f64>,
        query: ArrayView2<'b, f64>,
        kernel: K,
        k: usize,
        exclude_self: bool,
    ) -> Self {
        MaxKernelRule {
            reference_data,
            reference_tree: None,
            query,
            query_tree: None,
            kernel,
            query_norms: Vec::new(),
            reference_norms: Vec::new(),
            candidates: CandidateSet::new(query.nrows(), k, exclude_self),
            node_bounds: Vec::new(),
            last_query: usize::MAX,
            last_ref: usize::MAX,
            last_value: 0.0,
        }
    }

    pub fn single(
        reference: &'a CoverTree<IpMetric<K>>,
        query: ArrayView2<'b, f64>,
        kernel: K,
        k: usize,
        exclude_self: bool,
    ) -> Self {
        let query_norms = feature_norms(&kernel, query);
        MaxKernelRule {
            reference_data: reference.data(),
            reference_tree: Some(reference),
            query,
            query_tree: None,
            kernel,
            query_norms,
            reference_norms: Vec::new(),
            candidates: CandidateSet::new(query.nrows(), k, exclude_self),
            node_bounds: Vec::new(),
            last_query: usize::MAX,
            last_ref: usize::MAX,
            last_value: 0.0,
        }
    }

    pub fn dual(
        reference: &'a CoverTree<IpMetric<K>>,
        query_tree: &'b CoverTree<IpMetric<K>>,
        kernel: K,
        k: usize,
        exclude_self: bool,
    ) -> Self {
        let query_norms = feature_norms(&kernel, query_tree.data());
        let reference_norms = feature_norms(&kernel, reference.data());
        MaxKernelRule {
            reference_data: reference.data(),
            reference_tree: Some(reference),
            query: query_tree.data(),
            query_tree: Some(query_tree),
            kernel,
            query_norms,
            reference_norms,
            candidates: CandidateSet::new(query_tree.num_points(), k, exclude_self),
            node_bounds: vec![f64::NEG_INFINITY; query_tree.num_nodes()],
            last_query: usize::MAX,
            last_ref: usize::MAX,
            last_value: 0.0,
        }
    }

    /// Smallest current k-th best kernel value across the query subtree;
    /// a reference node whose upper bound stays below it cannot help any
    /// query point down there.
    fn update_node_bound(&mut self, query_node: usize) -> f64 {
        let tree = self.query_tree.expect("node bounds need a query tree");
        let children = tree.children(query_node);
        let fresh = if children.is_empty() {
            tree.points(query_node)
                .iter()
                .map(|&q| self.candidates.worst_bound(q))
                .fold(f64::INFINITY, f64::min)
        } else {
            children
                .iter()
                .map(|&c| self.node_bounds[c])
                .fold(f64::INFINITY, f64::min)
        };
        let bound = fresh.max(self.node_bounds[query_node]);
        self.node_bounds[query_node] = bound;
        bound
    }
}

impl<'a, 'b, K: Kernel + Clone> TraversalRule for MaxKernelRule<'a, 'b, K> {
    fn base_case(&mut self, query: usize, reference: usize) -> f64 {
        if query == self.last_query && reference == self.last_ref {
            return self.last_value;
        }
        let value = self
            .kernel
            .evaluate(self.query.row(query), self.reference_data.row(reference));
        self.candidates.insert(query, reference, value);
        self.last_query = query;
        self.last_ref = reference;
        self.last_value = value;
        value
    }

    fn score(&mut self, query: usize, ref_node: usize) -> Option<f64> {
        let tree = self.reference_tree.expect("single-tree score needs a tree");
        let center = tree.center(ref_node);
        let k_qc = self
            .kernel
            .evaluate(self.query.row(query), self.reference_data.row(center));
        let upper = k_qc + tree.furthest_descendant(ref_node) * self.query_norms[query];
        if upper < self.candidates.worst_bound(query) {
            None
        } else {
            Some(-upper)
        }
    }

    fn rescore(&mut self, query: usize, _ref_node: usize, old_score: f64) -> Option<f64> {
        if -old_score < self.candidates.worst_bound(query) {
            None
        } else {
            Some(old_score)
        }
    }

    fn score_nodes(&mut self, query_node: usize, ref_node: usize) -> Option<f64> {
        let rtree = self.reference_tree.expect("dual score needs trees");
        let qtree = self.query_tree.expect("dual score needs trees");
        let qc = qtree.center(query_node);
        let rc = rtree.center(ref_node);
        let k_cc = self
            .kernel
            .evaluate(self.query.row(qc), self.reference_data.row(rc));
        let lq = qtree.furthest_descendant(query_node);
        let lr = rtree.furthest_descendant(ref_node);
        let upper =
            k_cc + lq * self.reference_norms[rc] + lr * self.query_norms[qc] + lq * lr;
        if upper < self.update_node_bound(query_node) {
            None
        } else {
            Some(-upper)
        }
    }

    fn rescore_nodes(
        &mut self,
        query_node: usize,
        _ref_node: usize,
        old_score: f64,
    ) -> Option<f64> {
        if -old_score < self.update_node_bound(query_node) {
            None
        } else {
            Some(old_score)
        }
    }
}
