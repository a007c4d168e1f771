//! Search engine entry points.
//!
//! [`all_knn`] finds the k nearest reference points per query under
//! Euclidean distance over a kd-tree, cover tree, or R*-tree;
//! [`max_kernel_search`] finds the k reference points with the largest
//! kernel value using a cover tree built in the kernel-induced metric.
//! Both validate parameters before any construction work, run one of the
//! three traversal strategies, and hand back results indexed in original
//! dataset order.

use std::fmt;

use ndarray::{Array2, ArrayView2};

use crate::kernel::Kernel;
use crate::metric::{Euclidean, IpMetric};
use crate::tree::rstar::RStarConfig;
use crate::tree::{BuildError, CoverTree, KdTree, RStarTree, SpaceTree};

pub mod candidates;
pub mod rules;
pub mod traverse;
pub mod unmap;

use candidates::UNFILLED;
use rules::{MaxKernelRule, NeighborRule};

/// Traversal strategy. Naive is the exhaustive baseline; the tree modes
/// prune with node bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Naive,
    SingleTree,
    DualTree,
}

/// Which space-partitioning tree organizes the reference (and, for
/// dual-tree search, the query) points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeKind {
    Kd,
    Cover,
    RStar,
}

/// Configuration for nearest-neighbor search.
#[derive(Debug, Clone)]
pub struct KnnConfig {
    pub mode: SearchMode,
    pub tree: TreeKind,
    /// Maximum points per leaf (kd-tree and R*-tree).
    pub leaf_size: usize,
    /// Cover-tree expansion base.
    pub base: f64,
    /// R*-tree shape; its `leaf_size` field is overridden by the one above.
    pub rstar: RStarConfig,
}

impl Default for KnnConfig {
    fn default() -> Self {
        KnnConfig {
            mode: SearchMode::DualTree,
            tree: TreeKind::Kd,
            leaf_size: 20,
            base: 1.3,
            rstar: RStarConfig::default(),
        }
    }
}

/// Configuration for max-kernel search (always cover trees).
#[derive(Debug, Clone)]
pub struct FastmksConfig {
    pub mode: SearchMode,
    /// Cover-tree expansion base.
    pub base: f64,
}

impl Default for FastmksConfig {
    fn default() -> Self {
        FastmksConfig {
            mode: SearchMode::DualTree,
            base: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchError {
    /// k exceeds the number of reference points.
    InvalidK { k: usize, references: usize },
    Build(BuildError),
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchError::InvalidK { k, references } => write!(
                f,
                "invalid k: {k}; must be at most the number of reference points ({references})"
            ),
            SearchError::Build(e) => write!(f, "tree construction failed: {e}"),
        }
    }
}

impl std::error::Error for SearchError {}

impl From<BuildError> for SearchError {
    fn from(e: BuildError) -> Self {
        SearchError::Build(e)
    }
}

/// Search results: row j, column i holds the i-th best value (distance or
/// kernel) and the matching reference index for query j, in original
/// dataset order. Slots that could not be filled (reference set smaller
/// than k after self-exclusion) hold the sort sentinel and
/// [`candidates::UNFILLED`]; the caller decides whether to reject or pad.
#[derive(Debug, Clone)]
pub struct SearchOutput {
    pub values: Array2<f64>,
    pub indices: Array2<usize>,
}

fn empty_output(num_queries: usize) -> SearchOutput {
    SearchOutput {
        values: Array2::zeros((num_queries, 0)),
        indices: Array2::from_elem((num_queries, 0), UNFILLED),
    }
}

fn validate(reference: ArrayView2<'_, f64>, k: usize) -> Result<(), SearchError> {
    if reference.nrows() == 0 {
        return Err(BuildError::EmptyPointSet.into());
    }
    if k > reference.nrows() {
        return Err(SearchError::InvalidK {
            k,
            references: reference.nrows(),
        });
    }
    Ok(())
}

/// All-k-nearest-neighbors under Euclidean distance.
///
/// With `query = None` the reference set queries itself and self-matches
/// are excluded from the results.
pub fn all_knn<'a>(
    reference: ArrayView2<'a, f64>,
    query: Option<ArrayView2<'a, f64>>,
    k: usize,
    config: &KnnConfig,
) -> Result<SearchOutput, SearchError> {
    validate(reference, k)?;
    let num_queries = query.map_or(reference.nrows(), |q| q.nrows());
    if k == 0 {
        return Ok(empty_output(num_queries));
    }

    if config.mode == SearchMode::Naive {
        let qview = query.unwrap_or(reference);
        let mut rule: NeighborRule<'_, '_, KdTree> =
            NeighborRule::naive(reference, qview, k, query.is_none());
        traverse::naive(&mut rule, num_queries, reference.nrows());
        let (values, indices) = rule.candidates.finalize();
        return Ok(SearchOutput { values, indices });
    }

    match config.tree {
        TreeKind::Kd => knn_with_tree(reference, query, k, config.mode, |d| {
            KdTree::build(d, config.leaf_size)
        }),
        TreeKind::Cover => knn_with_tree(reference, query, k, config.mode, |d| {
            CoverTree::build(d, Euclidean, config.base)
        }),
        TreeKind::RStar => {
            let rstar = RStarConfig {
                leaf_size: config.leaf_size,
                ..config.rstar.clone()
            };
            knn_with_tree(reference, query, k, config.mode, move |d| {
                RStarTree::build(d, &rstar)
            })
        }
    }
}

/// Shared single/dual-tree plumbing, generic over the tree kind.
///
/// Monochromatic searches run against the tree's own (possibly permuted)
/// point copy so self-matches can be recognized by index, then remap both
/// axes through the construction permutation, exactly as the original
/// search tool does.
fn knn_with_tree<'a, T, B>(
    reference: ArrayView2<'a, f64>,
    query: Option<ArrayView2<'a, f64>>,
    k: usize,
    mode: SearchMode,
    build: B,
) -> Result<SearchOutput, SearchError>
where
    T: SpaceTree + 'a,
    B: Fn(ArrayView2<'a, f64>) -> Result<(T, Vec<usize>), BuildError>,
{
    let (ref_tree, ref_map) = build(reference)?;

    let (raw_values, raw_indices, query_map) = match (mode, query) {
        (SearchMode::SingleTree, Some(q)) => {
            let mut rule = NeighborRule::single(&ref_tree, q, k, false);
            traverse::single_tree(&ref_tree, &mut rule, q.nrows());
            let (v, i) = rule.candidates.finalize();
            (v, i, None)
        }
        (SearchMode::SingleTree, None) => {
            let mut rule = NeighborRule::single(&ref_tree, ref_tree.data(), k, true);
            traverse::single_tree(&ref_tree, &mut rule, ref_tree.num_points());
            let (v, i) = rule.candidates.finalize();
            (v, i, Some(ref_map.clone()))
        }
        (SearchMode::DualTree, Some(q)) => {
            let (query_tree, query_map) = build(q)?;
            let mut rule = NeighborRule::dual(&ref_tree, &query_tree, k, false);
            traverse::dual_tree(&query_tree, &ref_tree, &mut rule);
            let (v, i) = rule.candidates.finalize();
            (v, i, Some(query_map))
        }
        (SearchMode::DualTree, None) => {
            let mut rule = NeighborRule::dual(&ref_tree, &ref_tree, k, true);
            traverse::dual_tree(&ref_tree, &ref_tree, &mut rule);
            let (v, i) = rule.candidates.finalize();
            (v, i, Some(ref_map.clone()))
        }
        (SearchMode::Naive, _) => unreachable!("naive mode is handled before tree construction"),
    };

    let (values, indices) = match query_map {
        Some(qmap) => unmap::unmap_all(&raw_values, &raw_indices, &ref_map, &qmap),
        None => unmap::unmap_references(&raw_values, &raw_indices, &ref_map),
    };
    Ok(SearchOutput { values, indices })
}

/// Max-kernel search: per query, the k reference points with the largest
/// kernel value. Runs on cover trees built in the kernel-induced metric
/// (naive mode needs no tree). Cover trees never permute their points, so
/// no remapping is required.
pub fn max_kernel_search<'a, K: Kernel + Clone + 'a>(
    reference: ArrayView2<'a, f64>,
    query: Option<ArrayView2<'a, f64>>,
    k: usize,
    kernel: K,
    config: &FastmksConfig,
) -> Result<SearchOutput, SearchError> {
    validate(reference, k)?;
    let num_queries = query.map_or(reference.nrows(), |q| q.nrows());
    if k == 0 {
        return Ok(empty_output(num_queries));
    }

    let (values, indices) = match config.mode {
        SearchMode::Naive => {
            let qview = query.unwrap_or(reference);
            let mut rule =
                MaxKernelRule::naive(reference, qview, kernel, k, query.is_none());
            traverse::naive(&mut rule, num_queries, reference.nrows());
            rule.candidates.finalize()
        }
        SearchMode::SingleTree => {
            let metric = IpMetric::new(kernel.clone());
            let (tree, _) = CoverTree::build(reference, metric, config.base)?;
            let qview = query.unwrap_or(reference);
            let mut rule = MaxKernelRule::single(&tree, qview, kernel, k, query.is_none());
            traverse::single_tree(&tree, &mut rule, num_queries);
            rule.candidates.finalize()
        }
        SearchMode::DualTree => {
            let (ref_tree, _) =
                CoverTree::build(reference, IpMetric::new(kernel.clone()), config.base)?;
            match query {
                Some(q) => {
                    let (query_tree, _) =
                        CoverTree::build(q, IpMetric::new(kernel.clone()), config.base)?;
                    let mut rule =
                        MaxKernelRule::dual(&ref_tree, &query_tree, kernel, k, false);
                    traverse::dual_tree(&query_tree, &ref_tree, &mut rule);
                    rule.candidates.finalize()
                }
                None => {
                    let mut rule = MaxKernelRule::dual(&ref_tree, &ref_tree, kernel, k, true);
                    traverse::dual_tree(&ref_tree, &ref_tree, &mut rule);
                    rule.candidates.finalize()
                }
            }
        }
    };

    Ok(SearchOutput { values, indices })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{GaussianKernel, LinearKernel};
    use ndarray::{array, Array2};

    fn xorshift(state: &mut u64) -> f64 {
        *state ^= *state << 13;
        *state ^= *state >> 7;
        *state ^= *state << 17;
        (*state as f64) / (u64::MAX as f64)
    }

    fn random_data(n: usize, dim: usize, seed: u64) -> Array2<f64> {
        let mut state = seed;
        Array2::from_shape_fn((n, dim), |_| xorshift(&mut state))
    }

    fn config(mode: SearchMode, tree: TreeKind) -> KnnConfig {
        KnnConfig {
            mode,
            tree,
            leaf_size: 5,
            base: 1.3,
            rstar: RStarConfig {
                leaf_size: 5,
                min_fanout: 2,
                max_fanout: 5,
                reinsert_count: 1,
                ..RStarConfig::default()
            },
        }
    }

    fn assert_same_output(a: &SearchOutput, b: &SearchOutput) {
        assert_eq!(a.indices, b.indices);
        assert_eq!(a.values, b.values);
    }

    #[test]
    fn strategies_agree_for_every_tree_kind() {
        let reference = random_data(120, 3, 42);
        let query = random_data(35, 3, 99);
        let k = 5;

        let naive = all_knn(
            reference.view(),
            Some(query.view()),
            k,
            &config(SearchMode::Naive, TreeKind::Kd),
        )
        .unwrap();

        for tree in [TreeKind::Kd, TreeKind::Cover, TreeKind::RStar] {
            for mode in [SearchMode::SingleTree, SearchMode::DualTree] {
                let out = all_knn(
                    reference.view(),
                    Some(query.view()),
                    k,
                    &config(mode, tree),
                )
                .unwrap();
                assert_same_output(&naive, &out);
            }
        }
    }

    #[test]
    fn strategies_agree_monochromatic() {
        let reference = random_data(90, 3, 7);
        let k = 4;

        let naive = all_knn(
            reference.view(),
            None,
            k,
            &config(SearchMode::Naive, TreeKind::Kd),
        )
        .unwrap();

        for tree in [TreeKind::Kd, TreeKind::Cover, TreeKind::RStar] {
            for mode in [SearchMode::SingleTree, SearchMode::DualTree] {
                let out = all_knn(reference.view(), None, k, &config(mode, tree)).unwrap();
                assert_same_output(&naive, &out);
            }
        }
    }

    #[test]
    fn monochromatic_search_never_reports_self() {
        let reference = random_data(60, 2, 5);
        for tree in [TreeKind::Kd, TreeKind::Cover, TreeKind::RStar] {
            for mode in [SearchMode::Naive, SearchMode::SingleTree, SearchMode::DualTree] {
                let out = all_knn(reference.view(), None, 3, &config(mode, tree)).unwrap();
                for q in 0..60 {
                    for rank in 0..3 {
                        assert_ne!(out.indices[[q, rank]], q, "self-match at query {q}");
                    }
                }
            }
        }
    }

    #[test]
    fn distinct_query_set_keeps_exact_matches() {
        // Example from the design discussion: self at distance zero is a
        // legitimate result when the query set is separate.
        let reference = array![[0.0, 0.0], [1.0, 0.0], [5.0, 5.0]];
        let query = array![[0.0, 0.0]];
        let out = all_knn(
            reference.view(),
            Some(query.view()),
            2,
            &config(SearchMode::DualTree, TreeKind::Kd),
        )
        .unwrap();
        assert_eq!(out.indices.row(0).to_vec(), vec![0, 1]);
        assert_eq!(out.values.row(0).to_vec(), vec![0.0, 1.0]);
    }

    #[test]
    fn max_kernel_and_nearest_run_in_opposite_directions() {
        let reference = array![[0.0, 0.0], [1.0, 0.0], [5.0, 5.0]];
        let query = array![[1.0, 1.0]];

        let nn = all_knn(
            reference.view(),
            Some(query.view()),
            1,
            &config(SearchMode::DualTree, TreeKind::Kd),
        )
        .unwrap();
        // Nearest by distance is (1, 0).
        assert_eq!(nn.indices[[0, 0]], 1);

        let mk = max_kernel_search(
            reference.view(),
            Some(query.view()),
            1,
            LinearKernel,
            &FastmksConfig::default(),
        )
        .unwrap();
        // Largest dot product is (5, 5) at 10.0, not the nearest point.
        assert_eq!(mk.indices[[0, 0]], 2);
        assert!((mk.values[[0, 0]] - 10.0).abs() < 1e-12);
        assert_ne!(nn.indices[[0, 0]], mk.indices[[0, 0]]);
    }

    #[test]
    fn max_kernel_strategies_agree() {
        let reference = random_data(70, 3, 11);
        let query = random_data(20, 3, 23);
        let k = 3;

        for kernel in [GaussianKernel { bandwidth: 0.7 }] {
            let naive = max_kernel_search(
                reference.view(),
                Some(query.view()),
                k,
                kernel,
                &FastmksConfig {
                    mode: SearchMode::Naive,
                    base: 2.0,
                },
            )
            .unwrap();
            for mode in [SearchMode::SingleTree, SearchMode::DualTree] {
                let out = max_kernel_search(
                    reference.view(),
                    Some(query.view()),
                    k,
                    kernel,
                    &FastmksConfig { mode, base: 2.0 },
                )
                .unwrap();
                assert_same_output(&naive, &out);
            }
        }
    }

    #[test]
    fn max_kernel_strategies_agree_monochromatic() {
        let reference = random_data(50, 3, 31);
        let naive = max_kernel_search(
            reference.view(),
            None,
            2,
            LinearKernel,
            &FastmksConfig {
                mode: SearchMode::Naive,
                base: 2.0,
            },
        )
        .unwrap();
        for mode in [SearchMode::SingleTree, SearchMode::DualTree] {
            let out = max_kernel_search(
                reference.view(),
                None,
                2,
                LinearKernel,
                &FastmksConfig { mode, base: 2.0 },
            )
            .unwrap();
            assert_same_output(&naive, &out);
            for q in 0..50 {
                assert_ne!(out.indices[[q, 0]], q);
            }
        }
    }

    #[test]
    fn k_equal_to_reference_size_returns_everything_sorted() {
        let reference = random_data(12, 2, 3);
        let query = random_data(4, 2, 19);
        let out = all_knn(
            reference.view(),
            Some(query.view()),
            12,
            &config(SearchMode::DualTree, TreeKind::Kd),
        )
        .unwrap();
        for q in 0..4 {
            let mut seen: Vec<usize> = out.indices.row(q).to_vec();
            for rank in 1..12 {
                assert!(out.values[[q, rank - 1]] <= out.values[[q, rank]]);
            }
            seen.sort_unstable();
            assert_eq!(seen, (0..12).collect::<Vec<_>>());
        }
    }

    #[test]
    fn k_one_returns_the_single_closest_point() {
        let reference = random_data(40, 3, 55);
        let query = random_data(10, 3, 77);
        let naive = all_knn(
            reference.view(),
            Some(query.view()),
            1,
            &config(SearchMode::Naive, TreeKind::Kd),
        )
        .unwrap();
        let single = all_knn(
            reference.view(),
            Some(query.view()),
            1,
            &config(SearchMode::SingleTree, TreeKind::Kd),
        )
        .unwrap();
        assert_same_output(&naive, &single);
    }

    #[test]
    fn k_zero_yields_empty_lists_without_running() {
        let reference = random_data(10, 2, 1);
        let out = all_knn(
            reference.view(),
            None,
            0,
            &config(SearchMode::DualTree, TreeKind::Kd),
        )
        .unwrap();
        assert_eq!(out.values.dim(), (10, 0));
        assert_eq!(out.indices.dim(), (10, 0));
    }

    #[test]
    fn invalid_parameters_are_rejected_before_any_work() {
        let reference = random_data(10, 2, 1);
        let err = all_knn(
            reference.view(),
            None,
            11,
            &config(SearchMode::DualTree, TreeKind::Kd),
        )
        .unwrap_err();
        assert_eq!(
            err,
            SearchError::InvalidK {
                k: 11,
                references: 10
            }
        );

        let empty = Array2::<f64>::zeros((0, 2));
        let err = all_knn(
            empty.view(),
            None,
            1,
            &config(SearchMode::Naive, TreeKind::Kd),
        )
        .unwrap_err();
        assert_eq!(err, SearchError::Build(BuildError::EmptyPointSet));

        let mut bad_leaf = config(SearchMode::SingleTree, TreeKind::Kd);
        bad_leaf.leaf_size = 0;
        let err = all_knn(reference.view(), None, 2, &bad_leaf).unwrap_err();
        assert_eq!(err, SearchError::Build(BuildError::InvalidLeafSize(0)));
    }

    #[test]
    fn identical_points_degenerate_to_zero_bounds() {
        let reference = Array2::from_elem((15, 3), 4.0);
        for tree in [TreeKind::Kd, TreeKind::Cover, TreeKind::RStar] {
            let out = all_knn(
                reference.view(),
                None,
                2,
                &config(SearchMode::DualTree, tree),
            )
            .unwrap();
            for q in 0..15 {
                for rank in 0..2 {
                    assert_eq!(out.values[[q, rank]], 0.0);
                    assert_ne!(out.indices[[q, rank]], q);
                }
            }
        }
    }

    #[test]
    fn unfilled_slots_surface_to_the_caller() {
        // Monochromatic with k equal to the reference count: after
        // self-exclusion only k-1 candidates exist per query.
        let reference = random_data(5, 2, 13);
        let out = all_knn(
            reference.view(),
            None,
            5,
            &config(SearchMode::Naive, TreeKind::Kd),
        )
        .unwrap();
        for q in 0..5 {
            assert_eq!(out.indices[[q, 4]], UNFILLED);
            assert!(out.values[[q, 4]].is_infinite());
        }
    }

    #[test]
    fn results_are_deterministic_across_runs() {
        let reference = random_data(80, 3, 1000);
        let query = random_data(25, 3, 2000);
        for tree in [TreeKind::Kd, TreeKind::Cover, TreeKind::RStar] {
            let a = all_knn(
                reference.view(),
                Some(query.view()),
                4,
                &config(SearchMode::DualTree, tree),
            )
            .unwrap();
            let b = all_knn(
                reference.view(),
                Some(query.view()),
                4,
                &config(SearchMode::DualTree, tree),
            )
            .unwrap();
            assert_same_output(&a, &b);
        }
    }

    #[test]
    fn larger_leaves_do_not_change_results() {
        let reference = random_data(100, 3, 321);
        let query = random_data(30, 3, 654);
        let baseline = all_knn(
            reference.view(),
            Some(query.view()),
            3,
            &config(SearchMode::Naive, TreeKind::Kd),
        )
        .unwrap();
        for leaf_size in [1, 2, 17, 200] {
            let mut cfg = config(SearchMode::DualTree, TreeKind::Kd);
            cfg.leaf_size = leaf_size;
            let out = all_knn(reference.view(), Some(query.view()), 3, &cfg).unwrap();
            assert_same_output(&baseline, &out);
        }
    }

    #[test]
    fn cover_tree_base_does_not_change_results() {
        let reference = random_data(60, 3, 8);
        let query = random_data(15, 3, 88);
        let baseline = all_knn(
            reference.view(),
            Some(query.view()),
            3,
            &config(SearchMode::Naive, TreeKind::Kd),
        )
        .unwrap();
        for base in [1.3, 1.5, 2.0] {
            let mut cfg = config(SearchMode::DualTree, TreeKind::Cover);
            cfg.base = base;
            let out = all_knn(reference.view(), Some(query.view()), 3, &cfg).unwrap();
            assert_same_output(&baseline, &out);
        }
    }
}
