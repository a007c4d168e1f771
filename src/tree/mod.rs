//! Space-partitioning trees over dense point sets.
//!
//! Each tree kind partitions a point set into nested bounded regions. The
//! search drivers and pruning rules only see the [`SpaceTree`] trait: node
//! topology plus min-distance queries against the node regions, so one
//! traversal implementation serves every tree kind.

use std::fmt;

use ndarray::{ArrayView1, ArrayView2};

pub mod cover;
pub mod kd;
pub mod rstar;

pub use cover::CoverTree;
pub use kd::KdTree;
pub use rstar::RStarTree;

/// Rejected construction parameters. Reported before any partitioning work.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildError {
    EmptyPointSet,
    InvalidLeafSize(usize),
    InvalidBase(f64),
    InvalidFanout { min: usize, max: usize },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::EmptyPointSet => write!(f, "point set is empty"),
            BuildError::InvalidLeafSize(s) => {
                write!(f, "invalid leaf size {s}; must be at least 1")
            }
            BuildError::InvalidBase(b) => {
                write!(f, "invalid cover tree base {b}; must be greater than 1")
            }
            BuildError::InvalidFanout { min, max } => write!(
                f,
                "invalid fanout bounds (min {min}, max {max}); need min >= 1 and max >= 2*min"
            ),
        }
    }
}

impl std::error::Error for BuildError {}

/// Read-only view of a built tree, sufficient to drive a search.
///
/// Node ids are dense `usize` values; the tree is immutable once built, so
/// the same tree can serve any number of independent searches. Points held
/// directly by a node are reported only at leaves; internal nodes return an
/// empty slice.
pub trait SpaceTree {
    fn root(&self) -> usize;

    fn num_nodes(&self) -> usize;

    fn num_points(&self) -> usize;

    /// The (possibly permuted) point matrix this tree was built over.
    fn data(&self) -> ArrayView2<'_, f64>;

    fn children(&self, node: usize) -> &[usize];

    /// Point ids held directly in `node`; empty unless `node` is a leaf.
    fn points(&self, node: usize) -> &[usize];

    /// Lower bound on the distance from `point` to any point in `node`'s
    /// region.
    fn min_distance_to_point(&self, node: usize, point: ArrayView1<'_, f64>) -> f64;

    /// Lower bound on the distance between any point of `node`'s region and
    /// any point of `other_node`'s region (in a tree of the same kind).
    fn min_distance_between(&self, node: usize, other: &Self, other_node: usize) -> f64;
}
