//! Random orthonormal basis projection.
//!
//! Projecting both point sets onto a random orthonormal basis before tree
//! building decorrelates the coordinate axes the kd-tree splits on, which
//! can help on datasets with pathological axis alignment. The projection
//! is an isometry, so distances and inner products (and therefore search
//! results) are preserved exactly up to rounding.

use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::Rng;

/// Generate a random `dim` x `dim` orthonormal matrix: Gaussian entries
/// orthonormalized by modified Gram-Schmidt, retrying in the (measure-zero)
/// event of rank deficiency.
pub fn random_orthonormal_basis(dim: usize, rng: &mut StdRng) -> Array2<f64> {
    loop {
        let candidate = Array2::from_shape_fn((dim, dim), |_| standard_normal(rng));
        if let Some(q) = orthonormalize(&candidate) {
            return q;
        }
    }
}

/// Box-Muller transform over the generator's uniform output.
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Modified Gram-Schmidt over the rows; `None` if a row degenerates.
fn orthonormalize(m: &Array2<f64>) -> Option<Array2<f64>> {
    let dim = m.nrows();
    let mut q = m.clone();
    for i in 0..dim {
        for j in 0..i {
            let proj: f64 = (0..dim).map(|d| q[[i, d]] * q[[j, d]]).sum();
            for d in 0..dim {
                q[[i, d]] -= proj * q[[j, d]];
            }
        }
        let norm: f64 = (0..dim).map(|d| q[[i, d]] * q[[i, d]]).sum::<f64>().sqrt();
        if norm < 1e-10 {
            return None;
        }
        for d in 0..dim {
            q[[i, d]] /= norm;
        }
    }
    Some(q)
}

/// Apply the basis to a point set (rows are points): each point `x`
/// becomes `Q x`.
pub fn apply_basis(basis: &Array2<f64>, data: ArrayView2<'_, f64>) -> Array2<f64> {
    data.dot(&basis.t())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{Euclidean, Metric};
    use ndarray::Array2;
    use rand::SeedableRng;

    #[test]
    fn basis_is_orthonormal() {
        let mut rng = StdRng::seed_from_u64(12345);
        for dim in [2, 3, 7] {
            let q = random_orthonormal_basis(dim, &mut rng);
            let product = q.dot(&q.t());
            for i in 0..dim {
                for j in 0..dim {
                    let expected = if i == j { 1.0 } else { 0.0 };
                    assert!(
                        (product[[i, j]] - expected).abs() < 1e-10,
                        "Q Q^T [{i},{j}] = {}",
                        product[[i, j]]
                    );
                }
            }
        }
    }

    #[test]
    fn same_seed_same_basis() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        let qa = random_orthonormal_basis(4, &mut a);
        let qb = random_orthonormal_basis(4, &mut b);
        assert_eq!(qa, qb);
    }

    #[test]
    fn projection_preserves_distances() {
        let mut rng = StdRng::seed_from_u64(7);
        let q = random_orthonormal_basis(3, &mut rng);

        let mut state = 991u64;
        let mut xorshift = || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state as f64) / (u64::MAX as f64)
        };
        let data = Array2::from_shape_fn((20, 3), |_| xorshift());
        let projected = apply_basis(&q, data.view());

        for i in 0..20 {
            for j in 0..20 {
                let before = Euclidean.distance(data.row(i), data.row(j));
                let after = Euclidean.distance(projected.row(i), projected.row(j));
                assert!((before - after).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn projected_search_matches_unprojected() {
        use crate::search::{all_knn, KnnConfig};

        let mut state = 31u64;
        let mut xorshift = || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state as f64) / (u64::MAX as f64)
        };
        let reference = Array2::from_shape_fn((50, 3), |_| xorshift());
        let query = Array2::from_shape_fn((10, 3), |_| xorshift());

        let mut rng = StdRng::seed_from_u64(99);
        let q = random_orthonormal_basis(3, &mut rng);
        let ref_proj = apply_basis(&q, reference.view());
        let query_proj = apply_basis(&q, query.view());

        let config = KnnConfig::default();
        let plain = all_knn(reference.view(), Some(query.view()), 3, &config).unwrap();
        let projected = all_knn(ref_proj.view(), Some(query_proj.view()), 3, &config).unwrap();

        assert_eq!(plain.indices, projected.indices);
        for (a, b) in plain.values.iter().zip(projected.values.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }
}
