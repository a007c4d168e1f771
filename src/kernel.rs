//! Kernel (similarity) functions for max-kernel search.
//!
//! A kernel maps two points to a scalar similarity; max-kernel search finds,
//! per query point, the reference points with the largest kernel value. All
//! kernels here are positive definite, so the induced metric in
//! [`crate::metric::IpMetric`] obeys the triangle inequality.

use ndarray::ArrayView1;

/// A similarity function of two points.
pub trait Kernel {
    fn evaluate(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64;
}

fn dot(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Plain inner product: `K(a, b) = <a, b>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearKernel;

impl Kernel for LinearKernel {
    fn evaluate(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        dot(a, b)
    }
}

/// `K(a, b) = (<a, b> + offset)^degree`.
#[derive(Debug, Clone, Copy)]
pub struct PolynomialKernel {
    pub degree: f64,
    pub offset: f64,
}

impl Kernel for PolynomialKernel {
    fn evaluate(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        (dot(a, b) + self.offset).powf(self.degree)
    }
}

/// Cosine of the angle between the two points; zero if either is the origin.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineKernel;

impl Kernel for CosineKernel {
    fn evaluate(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        let denom = (dot(a, a) * dot(b, b)).sqrt();
        if denom == 0.0 {
            0.0
        } else {
            dot(a, b) / denom
        }
    }
}

/// `K(a, b) = exp(-|a - b|^2 / (2 w^2))`.
#[derive(Debug, Clone, Copy)]
pub struct GaussianKernel {
    pub bandwidth: f64,
}

impl Kernel for GaussianKernel {
    fn evaluate(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        (-squared_distance(a, b) / (2.0 * self.bandwidth * self.bandwidth)).exp()
    }
}

/// `K(a, b) = max(0, 1 - |a - b|^2 / w^2)`.
#[derive(Debug, Clone, Copy)]
pub struct EpanechnikovKernel {
    pub bandwidth: f64,
}

impl Kernel for EpanechnikovKernel {
    fn evaluate(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        (1.0 - squared_distance(a, b) / (self.bandwidth * self.bandwidth)).max(0.0)
    }
}

/// `K(a, b) = max(0, 1 - |a - b| / w)`.
#[derive(Debug, Clone, Copy)]
pub struct TriangularKernel {
    pub bandwidth: f64,
}

impl Kernel for TriangularKernel {
    fn evaluate(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        (1.0 - squared_distance(a, b).sqrt() / self.bandwidth).max(0.0)
    }
}

/// `K(a, b) = tanh(scale * <a, b> + offset)`.
///
/// Only conditionally positive definite; retained because the original
/// search tool offers it, and in practice the induced pseudo-metric still
/// prunes correctly for the parameter ranges exposed on the command line.
#[derive(Debug, Clone, Copy)]
pub struct HyptanKernel {
    pub scale: f64,
    pub offset: f64,
}

impl Kernel for HyptanKernel {
    fn evaluate(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        (self.scale * dot(a, b) + self.offset).tanh()
    }
}
