//! CART classification tree grown on Gini impurity.
//!
//! Nodes live in one array; children are indices into it. Features at or
//! below a split threshold go left.
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::bands::BAND_COUNT;

pub type Features = [f64; BAND_COUNT];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Terminal node holding a class index into the forest's class list.
    Leaf { class: usize },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Growth limits for one tree.
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    /// Candidate features examined per split before falling back to the rest.
    pub features_per_split: usize,
    pub min_leaf_population: usize,
    pub n_classes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Grow a tree on the rows of `x`/`y` listed in `rows` (duplicates allowed).
    pub fn fit(x: &[Features], y: &[usize], rows: Vec<usize>, params: &TreeParams, rng: &mut StdRng) -> Self {
        let mut nodes = vec![Node::Leaf { class: 0 }];
        let mut pending = vec![(0usize, rows)];
        let mut order: Vec<usize> = (0..BAND_COUNT).collect();

        while let Some((slot, rows)) = pending.pop() {
            let counts = class_counts(y, &rows, params.n_classes);
            let majority = argmax_lowest(&counts);
            let pure = counts.iter().filter(|&&n| n > 0).count() <= 1;
            if pure || rows.len() < 2 * params.min_leaf_population.max(1) {
                nodes[slot] = Node::Leaf { class: majority };
                continue;
            }

            order.shuffle(rng);
            let mtry = params.features_per_split.clamp(1, BAND_COUNT);
            let mut best = best_split(x, y, &rows, &order[..mtry], params);
            if best.is_none() {
                best = best_split(x, y, &rows, &order[mtry..], params);
            }
            let Some(split) = best else {
                nodes[slot] = Node::Leaf { class: majority };
                continue;
            };

            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
                rows.into_iter().partition(|&i| x[i][split.feature] <= split.threshold);
            let left = nodes.len();
            let right = left + 1;
            nodes.push(Node::Leaf { class: majority });
            nodes.push(Node::Leaf { class: majority });
            nodes[slot] = Node::Split { feature: split.feature, threshold: split.threshold, left, right };
            pending.push((right, right_rows));
            pending.push((left, left_rows));
        }
        Self { nodes }
    }

    /// Class index predicted for `f`.
    pub fn predict(&self, f: &Features) -> usize {
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { class } => return *class,
                Node::Split { feature, threshold, left, right } => {
                    idx = if f[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| matches!(n, Node::Leaf { .. })).count()
    }

    /// Longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        let mut max = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((idx, d)) = stack.pop() {
            match &self.nodes[idx] {
                Node::Leaf { .. } => max = max.max(d),
                Node::Split { left, right, .. } => {
                    stack.push((*left, d + 1));
                    stack.push((*right, d + 1));
                }
            }
        }
        max
    }
}

// ── Split search ──────────────────────────────────────────────────────────────

struct Split {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

fn class_counts(y: &[usize], rows: &[usize], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0usize; n_classes];
    for &i in rows {
        counts[y[i]] += 1;
    }
    counts
}

/// Index of the largest count; ties go to the lowest index.
pub(crate) fn argmax_lowest(counts: &[usize]) -> usize {
    let mut best = 0;
    for (i, &n) in counts.iter().enumerate() {
        if n > counts[best] {
            best = i;
        }
    }
    best
}

/// `n × gini` of a node with the given class counts.
fn weighted_gini(counts: &[usize], n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let sq: f64 = counts.iter().map(|&c| (c * c) as f64).sum();
    n as f64 - sq / n as f64
}

fn best_split(x: &[Features], y: &[usize], rows: &[usize], features: &[usize], params: &TreeParams) -> Option<Split> {
    let min_leaf = params.min_leaf_population.max(1);
    let n = rows.len();
    let total = class_counts(y, rows, params.n_classes);
    let mut best: Option<Split> = None;
    let mut sorted = rows.to_vec();

    for &feature in features {
        sorted.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));
        let mut left = vec![0usize; params.n_classes];
        for pos in 0..n - 1 {
            left[y[sorted[pos]]] += 1;
            let (lo, hi) = (x[sorted[pos]][feature], x[sorted[pos + 1]][feature]);
            let nl = pos + 1;
            let nr = n - nl;
            if lo == hi || nl < min_leaf || nr < min_leaf {
                continue;
            }
            let right: Vec<usize> = total.iter().zip(&left).map(|(t, l)| t - l).collect();
            let impurity = weighted_gini(&left, nl) + weighted_gini(&right, nr);
            if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                let mid = lo + (hi - lo) / 2.0;
                let threshold = if mid < hi { mid } else { lo };
                best = Some(Split { feature, threshold, impurity });
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn row(v: f64) -> Features {
        let mut f = [0.0; BAND_COUNT];
        f[1] = v;
        f
    }

    fn params() -> TreeParams {
        TreeParams { features_per_split: BAND_COUNT, min_leaf_population: 1, n_classes: 2 }
    }

    #[test]
    fn single_threshold_is_learned_at_midpoint() {
        let x: Vec<Features> = [1.0, 2.0, 3.0, 10.0, 11.0, 12.0].map(row).to_vec();
        let y = vec![0, 0, 0, 1, 1, 1];
        let mut rng = StdRng::seed_from_u64(7);
        let tree = DecisionTree::fit(&x, &y, (0..6).collect(), &params(), &mut rng);
        assert_eq!(tree.nodes()[0], Node::Split { feature: 1, threshold: 6.5, left: 1, right: 2 });
        assert_eq!(tree.predict(&row(6.5)), 0);
        assert_eq!(tree.predict(&row(6.6)), 1);
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn pure_node_is_a_leaf() {
        let x: Vec<Features> = [1.0, 2.0, 3.0].map(row).to_vec();
        let tree = DecisionTree::fit(&x, &[1, 1, 1], (0..3).collect(), &params(), &mut StdRng::seed_from_u64(1));
        assert_eq!(tree.nodes(), &[Node::Leaf { class: 1 }]);
    }

    #[test]
    fn indistinguishable_rows_vote_lowest_on_tie() {
        let x: Vec<Features> = [5.0, 5.0].map(row).to_vec();
        let tree = DecisionTree::fit(&x, &[1, 0], vec![0, 1], &params(), &mut StdRng::seed_from_u64(1));
        assert_eq!(tree.predict(&row(5.0)), 0);
    }

    #[test]
    fn min_leaf_population_limits_growth() {
        let x: Vec<Features> = [1.0, 2.0, 3.0, 4.0].map(row).to_vec();
        let y = vec![0, 1, 0, 1];
        let p = TreeParams { min_leaf_population: 2, ..params() };
        let tree = DecisionTree::fit(&x, &y, (0..4).collect(), &p, &mut StdRng::seed_from_u64(3));
        assert!(tree.n_leaves() <= 2);
    }

    #[test]
    fn falls_back_to_remaining_features_when_sampled_ones_are_constant() {
        // Only feature 1 varies; with one candidate per split the tree must still split.
        let x: Vec<Features> = [1.0, 2.0, 8.0, 9.0].map(row).to_vec();
        let y = vec![0, 0, 1, 1];
        let p = TreeParams { features_per_split: 1, ..params() };
        for seed in 0..8 {
            let tree = DecisionTree::fit(&x, &y, (0..4).collect(), &p, &mut StdRng::seed_from_u64(seed));
            assert_eq!(tree.predict(&row(1.5)), 0);
            assert_eq!(tree.predict(&row(8.5)), 1);
        }
    }
}
