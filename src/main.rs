use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;

use clap::{Parser, Subcommand};
use ndarray::Array2;

use proxima::basis::{apply_basis, random_orthonormal_basis};
use proxima::io::{load_matrix, save_index_matrix, save_matrix};
use proxima::kernel::{
    CosineKernel, EpanechnikovKernel, GaussianKernel, HyptanKernel, Kernel, LinearKernel,
    PolynomialKernel, TriangularKernel,
};
use proxima::search::{
    all_knn, max_kernel_search, FastmksConfig, KnnConfig, SearchMode, SearchOutput, TreeKind,
};
use proxima::tree::rstar::{RStarConfig, SplitOrder};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Parser)]
#[command(name = "proxima", about = "Exact nearest-neighbor and max-kernel search")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find the k nearest neighbors of every query point.
    ///
    /// Row i, column j of the neighbors output holds the index of the j-th
    /// nearest reference point for query i; the distances file is laid out
    /// the same way.
    Knn {
        /// File containing the reference dataset.
        #[arg(short = 'r', long)]
        reference_file: PathBuf,

        /// File containing query points (optional; defaults to the
        /// reference set, excluding self-matches).
        #[arg(short = 'q', long)]
        query_file: Option<PathBuf>,

        /// Number of nearest neighbors to find.
        #[arg(short)]
        k: usize,

        /// File to write distances into.
        #[arg(short = 'd', long)]
        distances_file: PathBuf,

        /// File to write neighbor indices into.
        #[arg(short = 'n', long)]
        neighbors_file: PathBuf,

        /// Leaf size for tree building.
        #[arg(short = 'l', long, default_value = "20")]
        leaf_size: usize,

        /// Use O(n^2) naive search instead of a tree.
        #[arg(short = 'N', long)]
        naive: bool,

        /// Use single-tree search (as opposed to dual-tree).
        #[arg(short = 'S', long)]
        single_mode: bool,

        /// Use a cover tree instead of a kd-tree.
        #[arg(short = 'c', long)]
        cover_tree: bool,

        /// Use an R*-tree instead of a kd-tree.
        #[arg(short = 'T', long)]
        r_tree: bool,

        /// Base for cover tree construction.
        #[arg(short = 'b', long, default_value = "1.3")]
        base: f64,

        /// Minimum fanout of R*-tree interior nodes.
        #[arg(long, default_value = "2")]
        min_fanout: usize,

        /// Maximum fanout of R*-tree interior nodes.
        #[arg(long, default_value = "8")]
        max_fanout: usize,

        /// Entries reinserted on the first R*-tree leaf overflow.
        #[arg(long, default_value = "2")]
        reinsert_count: usize,

        /// R*-tree split objective: 'overlap' or 'volume'.
        #[arg(long, default_value = "overlap")]
        split_order: String,

        /// Project the data onto a random orthonormal basis before
        /// tree building.
        #[arg(short = 'R', long)]
        random_basis: bool,

        /// Random seed (0 uses OS entropy).
        #[arg(short = 's', long, default_value = "0")]
        seed: u64,
    },

    /// Find the k maximum kernel values of every query point.
    ///
    /// Row i, column j of the indices output holds the reference point with
    /// the j-th largest kernel value against query i.
    Fastmks {
        /// File containing the reference dataset.
        #[arg(short = 'r', long)]
        reference_file: PathBuf,

        /// File containing the query dataset (optional; defaults to the
        /// reference set, excluding self-matches).
        #[arg(short = 'q', long)]
        query_file: Option<PathBuf>,

        /// Number of maximum kernels to find.
        #[arg(short)]
        k: usize,

        /// File to save kernel values into.
        #[arg(short = 'p', long)]
        kernels_file: Option<PathBuf>,

        /// File to save the indices of the kernel values into.
        #[arg(short = 'i', long)]
        indices_file: Option<PathBuf>,

        /// Kernel type: 'linear', 'polynomial', 'cosine', 'gaussian',
        /// 'epanechnikov', 'triangular', 'hyptan'.
        #[arg(short = 'K', long, default_value = "linear")]
        kernel: String,

        /// Use O(n^2) naive search instead of a tree.
        #[arg(short = 'N', long)]
        naive: bool,

        /// Use single-tree search (as opposed to dual-tree).
        #[arg(short = 'S', long)]
        single: bool,

        /// Base for cover tree construction.
        #[arg(short = 'b', long, default_value = "2.0")]
        base: f64,

        /// Degree of the polynomial kernel.
        #[arg(short = 'd', long, default_value = "2.0")]
        degree: f64,

        /// Offset of the kernel (polynomial and hyptan).
        #[arg(short = 'o', long, default_value = "0.0")]
        offset: f64,

        /// Bandwidth (gaussian, epanechnikov, and triangular).
        #[arg(short = 'w', long, default_value = "1.0")]
        bandwidth: f64,

        /// Scale of the kernel (hyptan).
        #[arg(long, default_value = "1.0")]
        scale: f64,
    },
}

fn load_or_exit(path: &Path, what: &str) -> Array2<f64> {
    match load_matrix(path) {
        Ok(m) => {
            eprintln!(
                "Loaded {what} data from '{}' ({} x {}).",
                path.display(),
                m.nrows(),
                m.ncols()
            );
            m
        }
        Err(e) => {
            eprintln!("Failed to load {what} data from '{}': {e}", path.display());
            process::exit(1);
        }
    }
}

fn load_datasets(
    reference_file: &Path,
    query_file: Option<&PathBuf>,
) -> (Array2<f64>, Option<Array2<f64>>) {
    let reference = load_or_exit(reference_file, "reference");
    let query = query_file.map(|p| load_or_exit(p, "query"));

    if let Some(q) = &query {
        if q.ncols() != reference.ncols() {
            eprintln!(
                "Dimensionality mismatch: reference has {} columns, query has {}.",
                reference.ncols(),
                q.ncols()
            );
            process::exit(1);
        }
    } else {
        eprintln!("Using reference dataset as query dataset (no query file given).");
    }

    (reference, query)
}

#[allow(clippy::too_many_arguments)]
fn cmd_knn(
    reference_file: &Path,
    query_file: Option<&PathBuf>,
    k: usize,
    distances_file: &Path,
    neighbors_file: &Path,
    leaf_size: usize,
    naive: bool,
    single_mode: bool,
    cover_tree: bool,
    r_tree: bool,
    base: f64,
    rstar: RStarConfig,
    random_basis: bool,
    seed: u64,
) {
    let (mut reference, mut query) = load_datasets(reference_file, query_file);

    // Naive mode overrides single mode.
    if naive && single_mode {
        eprintln!("Warning: --single-mode ignored because --naive is present.");
    }
    // Cover tree overrides R*-tree.
    if cover_tree && r_tree {
        eprintln!("Warning: --cover-tree overrides --r-tree.");
    }

    if random_basis {
        let mut rng = if seed == 0 {
            StdRng::from_entropy()
        } else {
            StdRng::seed_from_u64(seed)
        };
        let q = random_orthonormal_basis(reference.ncols(), &mut rng);
        reference = apply_basis(&q, reference.view());
        query = query.map(|m| apply_basis(&q, m.view()));
        eprintln!("Projected data onto a random orthonormal basis.");
    }

    let mode = if naive {
        SearchMode::Naive
    } else if single_mode {
        SearchMode::SingleTree
    } else {
        SearchMode::DualTree
    };
    let tree = if cover_tree {
        TreeKind::Cover
    } else if r_tree {
        TreeKind::RStar
    } else {
        TreeKind::Kd
    };

    let config = KnnConfig {
        mode,
        tree,
        leaf_size,
        base,
        rstar,
    };

    eprintln!("Computing {k} nearest neighbors...");
    let start = Instant::now();
    let output = match all_knn(reference.view(), query.as_ref().map(|m| m.view()), k, &config) {
        Ok(out) => out,
        Err(e) => {
            eprintln!("Search failed: {e}");
            process::exit(1);
        }
    };
    eprintln!(
        "Neighbors computed in {:.3} s.",
        start.elapsed().as_secs_f64()
    );

    if let Err(e) = save_matrix(distances_file, &output.values) {
        eprintln!("Failed to write '{}': {e}", distances_file.display());
        process::exit(1);
    }
    if let Err(e) = save_index_matrix(neighbors_file, &output.indices) {
        eprintln!("Failed to write '{}': {e}", neighbors_file.display());
        process::exit(1);
    }
}

fn run_fastmks<K: Kernel + Clone>(
    reference: &Array2<f64>,
    query: Option<&Array2<f64>>,
    k: usize,
    kernel: K,
    config: &FastmksConfig,
) -> SearchOutput {
    match max_kernel_search(reference.view(), query.map(|m| m.view()), k, kernel, config) {
        Ok(out) => out,
        Err(e) => {
            eprintln!("Search failed: {e}");
            process::exit(1);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_fastmks(
    reference_file: &Path,
    query_file: Option<&PathBuf>,
    k: usize,
    kernels_file: Option<&PathBuf>,
    indices_file: Option<&PathBuf>,
    kernel: &str,
    naive: bool,
    single: bool,
    base: f64,
    degree: f64,
    offset: f64,
    bandwidth: f64,
    scale: f64,
) {
    let (reference, query) = load_datasets(reference_file, query_file);

    if naive && single {
        eprintln!("Warning: --single ignored because --naive is present.");
    }

    let mode = if naive {
        SearchMode::Naive
    } else if single {
        SearchMode::SingleTree
    } else {
        SearchMode::DualTree
    };
    let config = FastmksConfig { mode, base };

    eprintln!("Computing {k} maximum kernel values ({kernel} kernel)...");
    let start = Instant::now();
    let query_ref = query.as_ref();
    let output = match kernel {
        "linear" => run_fastmks(&reference, query_ref, k, LinearKernel, &config),
        "polynomial" => run_fastmks(
            &reference,
            query_ref,
            k,
            PolynomialKernel { degree, offset },
            &config,
        ),
        "cosine" => run_fastmks(&reference, query_ref, k, CosineKernel, &config),
        "gaussian" => run_fastmks(
            &reference,
            query_ref,
            k,
            GaussianKernel { bandwidth },
            &config,
        ),
        "epanechnikov" => run_fastmks(
            &reference,
            query_ref,
            k,
            EpanechnikovKernel { bandwidth },
            &config,
        ),
        "triangular" => run_fastmks(
            &reference,
            query_ref,
            k,
            TriangularKernel { bandwidth },
            &config,
        ),
        "hyptan" => run_fastmks(
            &reference,
            query_ref,
            k,
            HyptanKernel { scale, offset },
            &config,
        ),
        other => {
            eprintln!(
                "Invalid kernel type '{other}'; must be one of linear, polynomial, cosine, \
                 gaussian, epanechnikov, triangular, hyptan."
            );
            process::exit(1);
        }
    };
    eprintln!(
        "Kernels computed in {:.3} s.",
        start.elapsed().as_secs_f64()
    );

    if let Some(path) = kernels_file {
        if let Err(e) = save_matrix(path, &output.values) {
            eprintln!("Failed to write '{}': {e}", path.display());
            process::exit(1);
        }
    }
    if let Some(path) = indices_file {
        if let Err(e) = save_index_matrix(path, &output.indices) {
            eprintln!("Failed to write '{}': {e}", path.display());
            process::exit(1);
        }
    }
}

fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Knn {
            reference_file,
            query_file,
            k,
            distances_file,
            neighbors_file,
            leaf_size,
            naive,
            single_mode,
            cover_tree,
            r_tree,
            base,
            min_fanout,
            max_fanout,
            reinsert_count,
            split_order,
            random_basis,
            seed,
        } => {
            let split_order = match split_order.as_str() {
                "overlap" => SplitOrder::MinOverlap,
                "volume" => SplitOrder::MinVolume,
                other => {
                    eprintln!("Invalid split order '{other}'; must be 'overlap' or 'volume'.");
                    process::exit(1);
                }
            };
            let rstar = RStarConfig {
                leaf_size: *leaf_size,
                min_fanout: *min_fanout,
                max_fanout: *max_fanout,
                reinsert_count: *reinsert_count,
                split_order,
            };
            cmd_knn(
                reference_file,
                query_file.as_ref(),
                *k,
                distances_file,
                neighbors_file,
                *leaf_size,
                *naive,
                *single_mode,
                *cover_tree,
                *r_tree,
                *base,
                rstar,
                *random_basis,
                *seed,
            );
        }
        Commands::Fastmks {
            reference_file,
            query_file,
            k,
            kernels_file,
            indices_file,
            kernel,
            naive,
            single,
            base,
            degree,
            offset,
            bandwidth,
            scale,
        } => {
            cmd_fastmks(
                reference_file,
                query_file.as_ref(),
                *k,
                kernels_file.as_ref(),
                indices_file.as_ref(),
                kernel,
                *naive,
                *single,
                *base,
                *degree,
                *offset,
                *bandwidth,
                *scale,
            );
        }
    }
}
