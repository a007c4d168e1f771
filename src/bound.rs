//! Axis-aligned hyper-rectangle bounds.
//!
//! Both the kd-tree and the R*-tree describe node regions with these
//! rectangles; the min-distance queries below are what makes subtree
//! pruning possible.

use ndarray::ArrayView1;

/// An axis-aligned hyper-rectangle `[lo_d, hi_d]` per dimension.
///
/// A freshly-created bound is empty (`lo = +inf`, `hi = -inf`); growing it
/// over points or other bounds produces the minimal enclosing rectangle.
#[derive(Debug, Clone, PartialEq)]
pub struct HRectBound {
    pub lo: Vec<f64>,
    pub hi: Vec<f64>,
}

impl HRectBound {
    pub fn empty(dim: usize) -> Self {
        HRectBound {
            lo: vec![f64::INFINITY; dim],
            hi: vec![f64::NEG_INFINITY; dim],
        }
    }

    pub fn dim(&self) -> usize {
        self.lo.len()
    }

    /// Expand to include a point.
    pub fn grow(&mut self, point: ArrayView1<'_, f64>) {
        for (d, &v) in point.iter().enumerate() {
            if v < self.lo[d] {
                self.lo[d] = v;
            }
            if v > self.hi[d] {
                self.hi[d] = v;
            }
        }
    }

    /// Expand to include another rectangle.
    pub fn grow_bound(&mut self, other: &HRectBound) {
        for d in 0..self.lo.len() {
            if other.lo[d] < self.lo[d] {
                self.lo[d] = other.lo[d];
            }
            if other.hi[d] > self.hi[d] {
                self.hi[d] = other.hi[d];
            }
        }
    }

    pub fn contains(&self, point: ArrayView1<'_, f64>) -> bool {
        point
            .iter()
            .enumerate()
            .all(|(d, &v)| v >= self.lo[d] && v <= self.hi[d])
    }

    /// Smallest Euclidean distance from `point` to any point of the
    /// rectangle; zero if the point lies inside.
    pub fn min_distance(&self, point: ArrayView1<'_, f64>) -> f64 {
        let mut sum = 0.0;
        for (d, &v) in point.iter().enumerate() {
            let gap = if v < self.lo[d] {
                self.lo[d] - v
            } else if v > self.hi[d] {
                v - self.hi[d]
            } else {
                0.0
            };
            sum += gap * gap;
        }
        sum.sqrt()
    }

    /// Smallest Euclidean distance between any two points of the
    /// rectangles; zero if they overlap.
    pub fn min_distance_bound(&self, other: &HRectBound) -> f64 {
        let mut sum = 0.0;
        for d in 0..self.lo.len() {
            let gap = if other.hi[d] < self.lo[d] {
                self.lo[d] - other.hi[d]
            } else if other.lo[d] > self.hi[d] {
                other.lo[d] - self.hi[d]
            } else {
                0.0
            };
            sum += gap * gap;
        }
        sum.sqrt()
    }

    /// Product of side lengths. Empty bounds report zero.
    pub fn volume(&self) -> f64 {
        let mut v = 1.0;
        for d in 0..self.lo.len() {
            let side = self.hi[d] - self.lo[d];
            if side <= 0.0 {
                return 0.0;
            }
            v *= side;
        }
        v
    }

    /// Sum of side lengths (the R*-split margin criterion).
    pub fn margin(&self) -> f64 {
        self.lo
            .iter()
            .zip(self.hi.iter())
            .map(|(l, h)| (h - l).max(0.0))
            .sum()
    }

    /// Volume of the intersection with `other`; zero when disjoint.
    pub fn overlap_volume(&self, other: &HRectBound) -> f64 {
        let mut v = 1.0;
        for d in 0..self.lo.len() {
            let lo = self.lo[d].max(other.lo[d]);
            let hi = self.hi[d].min(other.hi[d]);
            if hi <= lo {
                return 0.0;
            }
            v *= hi - lo;
        }
        v
    }

    /// Volume the rectangle would gain by growing over `other`.
    pub fn enlargement(&self, other: &HRectBound) -> f64 {
        let mut grown = self.clone();
        grown.grow_bound(other);
        grown.volume() - self.volume()
    }

    pub fn center(&self) -> Vec<f64> {
        self.lo
            .iter()
            .zip(self.hi.iter())
            .map(|(l, h)| (l + h) / 2.0)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn rect(lo: &[f64], hi: &[f64]) -> HRectBound {
        HRectBound {
            lo: lo.to_vec(),
            hi: hi.to_vec(),
        }
    }

    #[test]
    fn grow_over_points() {
        let mut b = HRectBound::empty(2);
        b.grow(array![1.0, 2.0].view());
        b.grow(array![-1.0, 5.0].view());
        assert_eq!(b.lo, vec![-1.0, 2.0]);
        assert_eq!(b.hi, vec![1.0, 5.0]);
        assert!(b.contains(array![0.0, 3.0].view()));
        assert!(!b.contains(array![0.0, 6.0].view()));
    }

    #[test]
    fn min_distance_point_inside_is_zero() {
        let b = rect(&[0.0, 0.0], &[2.0, 2.0]);
        assert_eq!(b.min_distance(array![1.0, 1.0].view()), 0.0);
    }

    #[test]
    fn min_distance_point_outside() {
        let b = rect(&[0.0, 0.0], &[2.0, 2.0]);
        // Closest corner is (2, 2); point at (5, 6) is 5 away.
        let d = b.min_distance(array![5.0, 6.0].view());
        assert!((d - 5.0).abs() < 1e-12);
    }

    #[test]
    fn min_distance_between_rects() {
        let a = rect(&[0.0, 0.0], &[1.0, 1.0]);
        let b = rect(&[4.0, 5.0], &[6.0, 7.0]);
        // Gap of 3 in x, 4 in y.
        assert!((a.min_distance_bound(&b) - 5.0).abs() < 1e-12);

        let c = rect(&[0.5, 0.5], &[2.0, 2.0]);
        assert_eq!(a.min_distance_bound(&c), 0.0);
    }

    #[test]
    fn volume_margin_overlap() {
        let a = rect(&[0.0, 0.0], &[2.0, 3.0]);
        assert!((a.volume() - 6.0).abs() < 1e-12);
        assert!((a.margin() - 5.0).abs() < 1e-12);

        let b = rect(&[1.0, 1.0], &[3.0, 2.0]);
        assert!((a.overlap_volume(&b) - 1.0).abs() < 1e-12);
        assert_eq!(a.overlap_volume(&rect(&[5.0, 5.0], &[6.0, 6.0])), 0.0);
    }

    #[test]
    fn enlargement_of_containing_rect_is_zero() {
        let a = rect(&[0.0, 0.0], &[10.0, 10.0]);
        let b = rect(&[1.0, 1.0], &[2.0, 2.0]);
        assert_eq!(a.enlargement(&b), 0.0);
        assert!(b.enlargement(&a) > 0.0);
    }

    #[test]
    fn degenerate_zero_extent() {
        // All points identical: bound collapses to a single point.
        let mut b = HRectBound::empty(3);
        for _ in 0..4 {
            b.grow(array![1.0, 1.0, 1.0].view());
        }
        assert_eq!(b.volume(), 0.0);
        assert_eq!(b.min_distance(array![1.0, 1.0, 1.0].view()), 0.0);
    }
}
