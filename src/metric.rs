//! Distance functions over dense points.
//!
//! A [`Metric`] is a symmetric, non-negative binary function of two points
//! satisfying the triangle inequality; the trees use it both for exact
//! point-to-point evaluation and (via node radii) to derive pruning bounds.

use ndarray::ArrayView1;

use crate::kernel::Kernel;

/// A distance function usable for tree construction and search.
pub trait Metric {
    fn distance(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64;
}

/// Standard Euclidean (L2) distance.
#[derive(Debug, Clone, Copy, Default)]
pub struct Euclidean;

impl Euclidean {
    /// Squared L2 distance; avoids the square root in hot comparison loops.
    pub fn distance_sq(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        let mut sum = 0.0;
        for (x, y) in a.iter().zip(b.iter()) {
            let d = x - y;
            sum += d * d;
        }
        sum
    }
}

impl Metric for Euclidean {
    fn distance(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        self.distance_sq(a, b).sqrt()
    }
}

/// The metric induced by a kernel in its feature space:
/// `d(a, b) = sqrt(K(a,a) - 2 K(a,b) + K(b,b))`.
///
/// For a positive-definite kernel this satisfies the triangle inequality,
/// which lets a cover tree built with it prune max-kernel searches exactly.
#[derive(Debug, Clone)]
pub struct IpMetric<K: Kernel> {
    pub kernel: K,
}

impl<K: Kernel> IpMetric<K> {
    pub fn new(kernel: K) -> Self {
        IpMetric { kernel }
    }
}

impl<K: Kernel> Metric for IpMetric<K> {
    fn distance(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        let aa = self.kernel.evaluate(a, a);
        let bb = self.kernel.evaluate(b, b);
        let ab = self.kernel.evaluate(a, b);
        // Rounding can push the squared distance slightly negative for
        // near-identical points.
        (aa - 2.0 * ab + bb).max(0.0).sqrt()
    }
}
