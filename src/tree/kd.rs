//! kd-tree with hyper-rectangle node bounds.
//!
//! Splits recursively along the dimension of maximum spread, pivoting at
//! the median, until leaves hold at most `leaf_size` points. Construction
//! permutes a private copy of the data so each leaf covers a contiguous
//! index range; the old-from-new permutation is returned to the caller for
//! remapping results.

use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::bound::HRectBound;
use crate::tree::{BuildError, SpaceTree};

#[derive(Debug, Clone)]
struct KdNode {
    bound: HRectBound,
    /// Empty for leaves, `[left, right]` for interior nodes.
    children: Vec<usize>,
    /// Contiguous range of tree-internal point ids covered by this node.
    start: usize,
    end: usize,
}

#[derive(Debug)]
pub struct KdTree {
    data: Array2<f64>,
    nodes: Vec<KdNode>,
    /// Identity array backing the `points()` leaf slices.
    point_ids: Vec<usize>,
}

impl KdTree {
    /// Build a kd-tree over `data` (rows are points).
    ///
    /// Returns the tree and the old-from-new permutation: entry `i` is the
    /// original row index of the point now stored at row `i`.
    pub fn build(
        data: ArrayView2<'_, f64>,
        leaf_size: usize,
    ) -> Result<(KdTree, Vec<usize>), BuildError> {
        if leaf_size < 1 {
            return Err(BuildError::InvalidLeafSize(leaf_size));
        }
        let n = data.nrows();
        if n == 0 {
            return Err(BuildError::EmptyPointSet);
        }

        let mut order: Vec<usize> = (0..n).collect();
        let mut nodes = Vec::new();
        build_recursive(data, &mut order, 0, n, leaf_size, &mut nodes);

        // Materialize the permuted copy so leaves are contiguous in memory.
        let mut permuted = Array2::zeros((n, data.ncols()));
        for (new_pos, &old_pos) in order.iter().enumerate() {
            permuted.row_mut(new_pos).assign(&data.row(old_pos));
        }

        let tree = KdTree {
            data: permuted,
            nodes,
            point_ids: (0..n).collect(),
        };
        Ok((tree, order))
    }

    pub fn bound(&self, node: usize) -> &HRectBound {
        &self.nodes[node].bound
    }
}

/// Build the subtree for `order[start..end]`, returning its node id.
/// Bounds are assembled bottom-up: leaves grow over their points, interior
/// nodes take the union of their children.
fn build_recursive(
    data: ArrayView2<'_, f64>,
    order: &mut [usize],
    start: usize,
    end: usize,
    leaf_size: usize,
    nodes: &mut Vec<KdNode>,
) -> usize {
    let count = end - start;
    let dim = data.ncols();

    if count <= leaf_size {
        let mut bound = HRectBound::empty(dim);
        for &idx in &order[start..end] {
            bound.grow(data.row(idx));
        }
        let node_idx = nodes.len();
        nodes.push(KdNode {
            bound,
            children: Vec::new(),
            start,
            end,
        });
        return node_idx;
    }

    let split_dim = pick_split_dim(data, &order[start..end]);
    let median_pos = start + count / 2;
    nth_element(data, order, start, end, median_pos, split_dim);

    let node_idx = nodes.len();
    nodes.push(KdNode {
        bound: HRectBound::empty(dim),
        children: Vec::new(),
        start,
        end,
    });

    let left = build_recursive(data, order, start, median_pos, leaf_size, nodes);
    let right = build_recursive(data, order, median_pos, end, leaf_size, nodes);

    let mut bound = nodes[left].bound.clone();
    bound.grow_bound(&nodes[right].bound);
    nodes[node_idx].bound = bound;
    nodes[node_idx].children = vec![left, right];

    node_idx
}

fn pick_split_dim(data: ArrayView2<'_, f64>, order: &[usize]) -> usize {
    let mut best_dim = 0;
    let mut best_spread = f64::NEG_INFINITY;

    for d in 0..data.ncols() {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for &idx in order {
            let v = data[[idx, d]];
            if v < lo {
                lo = v;
            }
            if v > hi {
                hi = v;
            }
        }
        let spread = hi - lo;
        if spread > best_spread {
            best_spread = spread;
            best_dim = d;
        }
    }

    best_dim
}

/// Partial quickselect with median-of-three pivoting; places the k-th
/// smallest element (along `dim`) at position `k` of `order`.
fn nth_element(
    data: ArrayView2<'_, f64>,
    order: &mut [usize],
    mut lo: usize,
    mut hi: usize,
    k: usize,
    dim: usize,
) {
    while hi - lo > 1 {
        let mid = lo + (hi - lo) / 2;
        let a = data[[order[lo], dim]];
        let b = data[[order[mid], dim]];
        let c = data[[order[hi - 1], dim]];
        let pivot_idx = if (a <= b && b <= c) || (c <= b && b <= a) {
            mid
        } else if (b <= a && a <= c) || (c <= a && a <= b) {
            lo
        } else {
            hi - 1
        };
        order.swap(pivot_idx, hi - 1);
        let pivot_val = data[[order[hi - 1], dim]];

        let mut store = lo;
        for i in lo..hi - 1 {
            if data[[order[i], dim]] < pivot_val {
                order.swap(i, store);
                store += 1;
            }
        }
        order.swap(store, hi - 1);

        if store == k {
            return;
        } else if k < store {
            hi = store;
        } else {
            lo = store + 1;
        }
    }
}

impl SpaceTree for KdTree {
    fn root(&self) -> usize {
        0
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
            &self.point_ids[n.start..n.end]
        } else {
            &[]
        }
    }

    fn min_distance_to_point(&self, node: usize, point: ArrayView1<'_, f64>) -> f64 {
        self.nodes[node].bound.min_distance(point)
    }

    fn min_distance_between(&self, node: usize, other: &Self, other_node: usize) -> f64 {
        self.nodes[node]
            .bound
            .min_distance_bound(&other.nodes[other_node].bound)
    }
}
