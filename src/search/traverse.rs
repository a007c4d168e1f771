//! Traversal drivers: naive, single-tree, and dual-tree.
//!
//! The tree drivers run depth-first with an explicit work stack instead of
//! language-level recursion, so pathological trees cannot exhaust the call
//! stack. Children are pushed worst-first, which makes the most promising
//! sibling pop first; a stacked entry is re-scored when popped, because the
//! candidate bounds may have tightened while it waited, and a failed
//! re-score counts as a prune.

use crate::search::rules::TraversalRule;
use crate::tree::SpaceTree;

/// Exhaustive O(|Q|·|R|) comparison; the correctness baseline.
pub fn naive<R: TraversalRule>(rule: &mut R, num_queries: usize, num_references: usize) {
    for q in 0..num_queries {
        for r in 0..num_references {
            rule.base_case(q, r);
        }
    }
}

/// Depth-first traversal of the reference tree, independently per query
/// point.
pub fn single_tree<T, R>(tree: &T, rule: &mut R, num_queries: usize)
where
    T: SpaceTree,
    R: TraversalRule,
{
    let mut stack: Vec<(usize, f64)> = Vec::new();
    for q in 0..num_queries {
        stack.clear();
        if let Some(score) = rule.score(q, tree.root()) {
            stack.push((tree.root(), score));
        }
        while let Some((node, score)) = stack.pop() {
            if rule.rescore(q, node, score).is_none() {
                continue;
            }
            for &r in tree.points(node) {
                rule.base_case(q, r);
            }
            let start = stack.len();
            for &child in tree.children(node) {
                if let Some(s) = rule.score(q, child) {
                    stack.push((child, s));
                }
            }
            // Most promising (smallest score) last, so it pops first.
            stack[start..].sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.0.cmp(&a.0))
            });
        }
    }
}

/// Simultaneous depth-first traversal of the query and reference trees.
///
/// Unpruned pairs expand into the Cartesian product of children; a leaf on
/// either side is held fixed while the other side descends, and base cases
/// run when both sides are leaves. Each pair is visited at most once.
pub fn dual_tree<T, R>(query_tree: &T, reference_tree: &T, rule: &mut R)
where
    T: SpaceTree,
    R: TraversalRule,
{
    let mut stack: Vec<(usize, usize, f64)> = Vec::new();
    if let Some(score) = rule.score_nodes(query_tree.root(), reference_tree.root()) {
        stack.push((query_tree.root(), reference_tree.root(), score));
    }

    while let Some((qnode, rnode, score)) = stack.pop() {
        if rule.rescore_nodes(qnode, rnode, score).is_none() {
            continue;
        }

        let q_children = query_tree.children(qnode);
        let r_children = reference_tree.children(rnode);

        if q_children.is_empty() && r_children.is_empty() {
            for &q in query_tree.points(qnode) {
                for &r in reference_tree.points(rnode) {
                    rule.base_case(q, r);
                }
            }
            continue;
        }

        let q_list: &[usize] = if q_children.is_empty() {
            std::slice::from_ref(&qnode)
        } else {
            q_children
        };
        let r_list: &[usize] = if r_children.is_empty() {
            std::slice::from_ref(&rnode)
        } else {
            r_children
        };

        let mut pairs: Vec<(usize, usize, f64)> = Vec::with_capacity(q_list.len() * r_list.len());
        for &qc in q_list {
            for &rc in r_list {
                if let Some(s) = rule.score_nodes(qc, rc) {
                    pairs.push((qc, rc, s));
                }
            }
        }
        pairs.sort_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then((b.0, b.1).cmp(&(a.0, a.1)))
        });
        stack.extend(pairs);
    }
}
