//! R*-tree over points, with forced reinsertion and margin-based splits.
//!
//! Points are inserted one at a time. Subtree choice minimizes overlap
//! enlargement above leaves and volume enlargement elsewhere; the first
//! overflow of a leaf during an insertion evicts the entries furthest from
//! the node center and reinserts them from the top, and genuine overflows
//! are resolved by the R* axis/index split. The dataset is never permuted,
//! so the old-from-new map is the identity.

use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::bound::HRectBound;
use crate::tree::{BuildError, SpaceTree};

/// Objective used to pick the split index once the split axis is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitOrder {
    /// Minimize the overlap volume of the two groups (classic R*).
    MinOverlap,
    /// Minimize the summed volume of the two groups.
    MinVolume,
}

#[derive(Debug, Clone)]
pub struct RStarConfig {
    /// Maximum points per leaf.
    pub leaf_size: usize,
    /// Minimum children per interior node (also the minimum fill of a
    /// freshly split node).
    pub min_fanout: usize,
    /// Maximum children per interior node.
    pub max_fanout: usize,
    /// Entries evicted and reinserted on the first leaf overflow of an
    /// insertion; 0 disables forced reinsertion.
    pub reinsert_count: usize,
    pub split_order: SplitOrder,
}

impl Default for RStarConfig {
    fn default() -> Self {
        RStarConfig {
            leaf_size: 20,
            min_fanout: 2,
            max_fanout: 8,
            reinsert_count: 2,
            split_order: SplitOrder::MinOverlap,
        }
    }
}

#[derive(Debug, Clone)]
struct RNode {
    bound: HRectBound,
    leaf: bool,
    children: Vec<usize>,
    points: Vec<usize>,
}

impl RNode {
    fn leaf(dim: usize) -> Self {
        RNode {
            bound: HRectBound::empty(dim),
            leaf: true,
            children: Vec::new(),
            points: Vec::new(),
        }
    }
}

enum Outcome {
    Done,
    /// The child split; here is the new sibling's id.
    Split(usize),
}

#[derive(Debug)]
pub struct RStarTree {
    data: Array2<f64>,
    nodes: Vec<RNode>,
    root: usize,
    config: RStarConfig,
}

impl RStarTree {
    pub fn build(
        data: ArrayView2<'_, f64>,
        config: &RStarConfig,
    ) -> Result<(RStarTree, Vec<usize>), BuildError> {
        if config.leaf_size < 1 {
            return Err(BuildError::InvalidLeafSize(config.leaf_size));
        }
        if config.min_fanout < 1 || config.max_fanout < 2 * config.min_fanout {
            return Err(BuildError::InvalidFanout {
                min: config.min_fanout,
                max: config.max_fanout,
            });
        }
        let n = data.nrows();
        if n == 0 {
            return Err(BuildError::EmptyPointSet);
        }

        let dim = data.ncols();
        let mut tree = RStarTree {
            data: data.to_owned(),
            nodes: vec![RNode::leaf(dim)],
            root: 0,
            config: config.clone(),
        };

        for p in 0..n {
            tree.insert(p);
        }

        Ok((tree, (0..n).collect()))
    }

    fn insert(&mut self, point: usize) {
        let mut pending = vec![point];
        let mut reinserted = false;
        while let Some(p) = pending.pop() {
            match self.insert_rec(self.root, p, &mut reinserted, &mut pending) {
                Outcome::Done => {}
                Outcome::Split(sibling) => {
                    let old_root = self.root;
                    let mut bound = self.nodes[old_root].bound.clone();
                    bound.grow_bound(&self.nodes[sibling].bound);
                    self.nodes.push(RNode {
                        bound,
                        leaf: false,
                        children: vec![old_root, sibling],
                        points: Vec::new(),
                    });
                    self.root = self.nodes.len() - 1;
                }
            }
        }
    }

    fn insert_rec(
        &mut self,
        node: usize,
        point: usize,
        reinserted: &mut bool,
        pending: &mut Vec<usize>,
    ) -> Outcome {
        let row = self.data.row(point).to_owned();
        self.nodes[node].bound.grow(row.view());

        if self.nodes[node].leaf {
            self.nodes[node].points.push(point);
            if self.nodes[node].points.len() <= self.config.leaf_size {
                return Outcome::Done;
            }
            if !*reinserted && node != self.root && self.config.reinsert_count > 0 {
                *reinserted = true;
                self.evict_furthest(node, pending);
                return Outcome::Done;
            }
            return Outcome::Split(self.split_leaf(node));
        }

        let child = self.choose_subtree(node, row.view());
        match self.insert_rec(child, point, reinserted, pending) {
            Outcome::Done => Outcome::Done,
            Outcome::Split(sibling) => {
                self.nodes[node].children.push(sibling);
                if self.nodes[node].children.len() <= self.config.max_fanout {
                    Outcome::Done
                } else {
                    Outcome::Split(self.split_interior(node))
                }
            }
        }
    }

    /// R* subtree choice: overlap enlargement when the children are leaves,
    /// volume enlargement otherwise; all ties broken toward smaller volume
    /// and then lower node id for determinism.
    fn choose_subtree(&self, node: usize, point: ArrayView1<'_, f64>) -> usize {
        let children = &self.nodes[node].children;
        let leaf_level = self.nodes[children[0]].leaf;

        let mut best = children[0];
        let mut best_key = (f64::INFINITY, f64::INFINITY, f64::INFINITY);
        for &c in children {
            let mut grown = self.nodes[c].bound.clone();
            grown.grow(point);
            let vol_enlarge = grown.volume() - self.nodes[c].bound.volume();

            let overlap_enlarge = if leaf_level {
                let mut before = 0.0;
                let mut after = 0.0;
                for &o in children {
                    if o == c {
                        continue;
                    }
                    before += self.nodes[c].bound.overlap_volume(&self.nodes[o].bound);
                    after += grown.overlap_volume(&self.nodes[o].bound);
                }
                after - before
            } else {
                0.0
            };

            let key = (overlap_enlarge, vol_enlarge, self.nodes[c].bound.volume());
            if key < best_key {
                best_key = key;
                best = c;
            }
        }
        best
    }

    /// Drop the `reinsert_count` points furthest from the leaf's center and
    /// queue them for reinsertion from the root.
    fn evict_furthest(&mut self, node: usize, pending: &mut Vec<usize>) {
        let center = self.nodes[node].bound.center();
        let center = ndarray::Array1::from_vec(center);
        let mut scored: Vec<(f64, usize)> = self.nodes[node]
            .points
            .iter()
            .map(|&p| {
                (
                    crate::metric::Euclidean.distance_sq(center.view(), self.data.row(p)),
                    p,
                )
            })
            .collect();
        // Furthest first; ties toward the higher point id so the kept set is
        // deterministic.
        scored.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

        let count = self.config.reinsert_count.min(scored.len() - 1);
        let evicted: Vec<usize> = scored[..count].iter().map(|&(_, p)| p).collect();
        self.nodes[node].points.retain(|p| !evicted.contains(p));
        pending.extend(evicted);

        let mut bound = HRectBound::empty(self.data.ncols());
        for &p in &self.nodes[node].points {
            bound.grow(self.data.row(p));
        }
        self.nodes[node].bound = bound;
    }

    fn split_leaf(&mut self, node: usize) -> usize {
        let entries = std::mem::take(&mut self.nodes[node].points);
        let rects: Vec<HRectBound> = entries
            .iter()
            .map(|&p| {
                let mut b = HRectBound::empty(self.data.ncols());
                b.grow(self.data.row(p));
                b
            })
            .collect();
        let min_fill = self.config.min_fanout.min(entries.len() / 2).max(1);
        let (left, right) = split_entries(&rects, min_fill, self.config.split_order);

        let (lb, li): (Vec<_>, Vec<_>) = partition_by(&entries, &rects, &left);
        let (rb, ri): (Vec<_>, Vec<_>) = partition_by(&entries, &rects, &right);

        self.nodes[node].points = li;
        self.nodes[node].bound = union_of(&lb, self.data.ncols());

        self.nodes.push(RNode {
            bound: union_of(&rb, self.data.ncols()),
            leaf: true,
            children: Vec::new(),
            points: ri,
        });
        self.nodes.len() - 1
    }

    fn split_interior(&mut self, node: usize) -> usize {
        let entries = std::mem::take(&mut self.nodes[node].children);
        let rects: Vec<HRectBound> = entries.iter().map(|&c| self.nodes[c].bound.clone()).collect();
        let (left, right) = split_entries(&rects, self.config.min_fanout, self.config.split_order);

        let (lb, li): (Vec<_>, Vec<_>) = partition_by(&entries, &rects, &left);
        let (rb, ri): (Vec<_>, Vec<_>) = partition_by(&entries, &rects, &right);

        self.nodes[node].children = li;
        self.nodes[node].bound = union_of(&lb, self.data.ncols());

        self.nodes.push(RNode {
            bound: union_of(&rb, self.data.ncols()),
            leaf: false,
            children: ri,
            points: Vec::new(),
        });
        self.nodes.len() - 1
    }

    pub fn bound(&self, node: usize) -> &HRectBound {
        &self.nodes[node].bound
    }

    pub fn is_leaf(&self, node: usize) -> bool {
        self.nodes[node].leaf
    }
}

fn union_of(bounds: &[HRectBound], dim: usize) -> HRectBound {
    let mut out = HRectBound::empty(dim);
    for b in bounds {
        out.grow_bound(b);
    }
    out
}

fn partition_by<T: Copy>(
    entries: &[T],
    rects: &[HRectBound],
    picked: &[usize],
) -> (Vec<HRectBound>, Vec<T>) {
    let bounds = picked.iter().map(|&i| rects[i].clone()).collect();
    let items = picked.iter().map(|&i| entries[i]).collect();
    (bounds, items)
}

/// R* split: pick the axis with the smallest summed margin over all legal
/// distributions (entries sorted by rectangle center along the axis), then
/// the distribution optimizing the configured objective. Returns the entry
/// positions of the two groups.
fn split_entries(
    rects: &[HRectBound],
    min_fill: usize,
    order: SplitOrder,
) -> (Vec<usize>, Vec<usize>) {
    let count = rects.len();
    let dim = rects[0].dim();
    let min_fill = min_fill.min(count / 2).max(1);

    let mut best_margin = f64::INFINITY;
    let mut best_sorted: Vec<usize> = Vec::new();

    for axis in 0..dim {
        let mut sorted: Vec<usize> = (0..count).collect();
        sorted.sort_by(|&a, &b| {
            let ca = (rects[a].lo[axis] + rects[a].hi[axis]) / 2.0;
            let cb = (rects[b].lo[axis] + rects[b].hi[axis]) / 2.0;
            ca.partial_cmp(&cb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });

        let mut margin_sum = 0.0;
        for split in min_fill..=(count - min_fill) {
            let left = union_of_indexed(rects, &sorted[..split]);
            let right = union_of_indexed(rects, &sorted[split..]);
            margin_sum += left.margin() + right.margin();
        }

        if margin_sum < best_margin {
            best_margin = margin_sum;
            best_sorted = sorted;
        }
    }

    let mut best_split = min_fill;
    let mut best_key = (f64::INFINITY, f64::INFINITY);
    for split in min_fill..=(count - min_fill) {
        let left = union_of_indexed(rects, &best_sorted[..split]);
        let right = union_of_indexed(rects, &best_sorted[split..]);
        let key = match order {
            SplitOrder::MinOverlap => (left.overlap_volume(&right), left.volume() + right.volume()),
            SplitOrder::MinVolume => (left.volume() + right.volume(), left.overlap_volume(&right)),
        };
        if key < best_key {
            best_key = key;
            best_split = split;
        }
    }

    (
        best_sorted[..best_split].to_vec(),
        best_sorted[best_split..].to_vec(),
    )
}

fn union_of_indexed(rects: &[HRectBound], picked: &[usize]) -> HRectBound {
    let mut out = HRectBound::empty(rects[0].dim());
    for &i in picked {
        out.grow_bound(&rects[i]);
    }
    out
}

impl SpaceTree for RStarTree {
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
        &self.nodes[node].points
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
