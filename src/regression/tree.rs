use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeConfig {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 6,
            min_samples_leaf: 2,
        }
    }
}

/// Regression tree node. Rows whose split feature is NaN follow
/// `missing_left`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        missing_left: bool,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    pub fn predict(&self, features: &[f64]) -> f64 {
        let mut node = self;
        loop {
            match node {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    missing_left,
                    left,
                    right,
                } => {
                    let value = features.get(*feature).copied().unwrap_or(f64::NAN);
                    let go_left = if value.is_nan() {
                        *missing_left
                    } else {
                        value <= *threshold
                    };
                    node = if go_left { left } else { right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            Node::Leaf { .. } => 0,
            Node::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    feature: usize,
    threshold: f64,
    missing_left: bool,
    gain: f64,
}

/// Least-squares CART fitted on a fixed feature matrix.
pub struct CartBuilder<'a> {
    features: &'a [Vec<f64>],
    config: TreeConfig,
}

impl<'a> CartBuilder<'a> {
    pub fn new(features: &'a [Vec<f64>], config: TreeConfig) -> Self {
        Self { features, config }
    }

    /// Fit a tree to `targets` over all rows.
    pub fn build(&self, targets: &[f64]) -> Node {
        let rows: Vec<usize> = (0..targets.len()).collect();
        self.grow(&rows, targets, 0)
    }

    fn grow(&self, rows: &[usize], targets: &[f64], depth: usize) -> Node {
        let value = mean(rows.iter().map(|&i| targets[i]));

        if depth >= self.config.max_depth || rows.len() < 2 * self.config.min_samples_leaf.max(1) {
            return Node::Leaf { value };
        }

        let n_features = self.features.first().map(Vec::len).unwrap_or(0);
        let best = (0..n_features)
            .into_par_iter()
            .filter_map(|feature| self.best_split(rows, targets, feature))
            .reduce_with(|a, b| {
                // Lower feature index wins ties so fits are reproducible
                if b.gain > a.gain || (b.gain == a.gain && b.feature < a.feature) {
                    b
                } else {
                    a
                }
            });

        let Some(split) = best.filter(|c| c.gain > 1e-12) else {
            return Node::Leaf { value };
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows.iter().partition(|&&i| {
            let v = self.features[i][split.feature];
            if v.is_nan() {
                split.missing_left
            } else {
                v <= split.threshold
            }
        });

        Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            missing_left: split.missing_left,
            left: Box::new(self.grow(&left_rows, targets, depth + 1)),
            right: Box::new(self.grow(&right_rows, targets, depth + 1)),
        }
    }

    fn best_split(&self, rows: &[usize], targets: &[f64], feature: usize) -> Option<Candidate> {
        let mut present: Vec<(f64, f64)> = Vec::with_capacity(rows.len());
        let (mut missing_sum, mut missing_n) = (0.0, 0usize);
        for &i in rows {
            let v = self.features[i][feature];
            if v.is_nan() {
                missing_sum += targets[i];
                missing_n += 1;
            } else {
                present.push((v, targets[i]));
            }
        }
        if present.len() < 2 {
            return None;
        }
        present.sort_by(|a, b| a.0.total_cmp(&b.0));

        let total_sum: f64 = present.iter().map(|p| p.1).sum::<f64>() + missing_sum;
        let total_n = rows.len();
        let parent_score = total_sum * total_sum / total_n as f64;
        let min_leaf = self.config.min_samples_leaf.max(1);

        let mut best: Option<Candidate> = None;
        let mut left_sum = 0.0;

        for k in 0..present.len() - 1 {
            left_sum += present[k].1;
            if present[k].0 == present[k + 1].0 {
                continue;
            }
            let left_n = k + 1;
            let threshold = (present[k].0 + present[k + 1].0) / 2.0;

            for missing_left in [false, true] {
                let (l_sum, l_n) = if missing_left {
                    (left_sum + missing_sum, left_n + missing_n)
                } else {
                    (left_sum, left_n)
                };
                let (r_sum, r_n) = (total_sum - l_sum, total_n - l_n);
                if l_n < min_leaf || r_n < min_leaf {
                    continue;
                }

                let gain = l_sum * l_sum / l_n as f64 + r_sum * r_sum / r_n as f64 - parent_score;
                if best.map_or(true, |b| gain > b.gain) {
                    best = Some(Candidate {
                        feature,
                        threshold,
                        missing_left,
                        gain,
                    });
                }
                if missing_n == 0 {
                    break;
                }
            }
        }

        best
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}
