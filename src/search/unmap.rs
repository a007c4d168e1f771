//! Translation of tree-internal result indices back to dataset order.
//!
//! Tree construction may permute its point copy (the kd-tree does; cover
//! and R* trees do not). The raw search output is therefore indexed by
//! tree-internal ids on both axes; exactly one of three shapes applies:
//! both sets permuted (dual-tree), reference only (single-tree over an
//! unpermuted query set), or neither (naive, where remapping is a no-op
//! and is simply skipped).

use ndarray::Array2;

use crate::search::candidates::UNFILLED;

/// Remap both axes: query row `t` of the raw output belongs to original
/// query `old_from_new_queries[t]`, and every stored reference id is
/// translated through `old_from_new_refs`. Unfilled slots pass through.
pub fn unmap_all(
    values: &Array2<f64>,
    indices: &Array2<usize>,
    old_from_new_refs: &[usize],
    old_from_new_queries: &[usize],
) -> (Array2<f64>, Array2<usize>) {
    let (nq, k) = indices.dim();
    let mut out_values = Array2::zeros((nq, k));
    let mut out_indices = Array2::from_elem((nq, k), UNFILLED);

    for t in 0..nq {
        let orig = old_from_new_queries[t];
        for rank in 0..k {
            out_values[[orig, rank]] = values[[t, rank]];
            let r = indices[[t, rank]];
            out_indices[[orig, rank]] = if r == UNFILLED {
                UNFILLED
            } else {
                old_from_new_refs[r]
            };
        }
    }

    (out_values, out_indices)
}

/// Remap reference ids only; query rows are already in original order.
pub fn unmap_references(
    values: &Array2<f64>,
    indices: &Array2<usize>,
    old_from_new_refs: &[usize],
) -> (Array2<f64>, Array2<usize>) {
    let (nq, k) = indices.dim();
    let mut out_indices = Array2::from_elem((nq, k), UNFILLED);
    for t in 0..nq {
        for rank in 0..k {
            let r = indices[[t, rank]];
            if r != UNFILLED {
                out_indices[[t, rank]] = old_from_new_refs[r];
            }
        }
    }
    (values.clone(), out_indices)
}
