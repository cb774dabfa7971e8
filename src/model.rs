use crate::config::ForestConfig;
use crate::error::{PipelineError, Result};
use rand::{seq::index::sample, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Point-in-time regressor with a `fit(X, y)` / `predict(X)` contract.
pub trait Regressor: Send + Sync {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()>;

    fn predict_row(&self, row: &[f64]) -> Result<f64>;

    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        x.iter().map(|row| self.predict_row(row)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// CART regression tree stored as a flat node array; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

struct TreeParams {
    max_depth: usize,
    min_samples_leaf: usize,
    max_features: usize,
}

impl RegressionTree {
    fn fit(x: &[Vec<f64>], y: &[f64], rows: Vec<usize>, params: &TreeParams, rng: &mut ChaCha8Rng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(x, y, rows, 0, params, rng);
        tree
    }

    fn grow(
        &mut self,
        x: &[Vec<f64>],
        y: &[f64],
        rows: Vec<usize>,
        depth: usize,
        params: &TreeParams,
        rng: &mut ChaCha8Rng,
    ) -> usize {
        let id = self.nodes.len();
        let mean = rows.iter().map(|&r| y[r]).sum::<f64>() / rows.len().max(1) as f64;
        self.nodes.push(Node::Leaf { value: mean });

        if depth >= params.max_depth || rows.len() < 2 * params.min_samples_leaf.max(1) {
            return id;
        }
        let Some((feature, threshold)) = best_split(x, y, &rows, params, rng) else {
            return id;
        };

        let (l_rows, r_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| x[r][feature] <= threshold);
        let left = self.grow(x, y, l_rows, depth + 1, params, rng);
        let right = self.grow(x, y, r_rows, depth + 1, params, rng);
        self.nodes[id] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        id
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut i = 0;
        loop {
            match &self.nodes[i] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    i = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }
}

/// Variance-reduction split over a random feature subset.
fn best_split(
    x: &[Vec<f64>],
    y: &[f64],
    rows: &[usize],
    params: &TreeParams,
    rng: &mut ChaCha8Rng,
) -> Option<(usize, f64)> {
    let n_features = x[rows[0]].len();
    if n_features == 0 {
        return None;
    }
    let k = params.max_features.clamp(1, n_features);
    let n = rows.len() as f64;
    let total: f64 = rows.iter().map(|&r| y[r]).sum();
    let parent_score = total * total / n;

    let mut best: Option<(usize, f64, f64)> = None;
    let mut sorted = rows.to_vec();
    for feature in sample(rng, n_features, k).into_iter() {
        sorted.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));
        let mut left_sum = 0.0;
        for i in 0..sorted.len() - 1 {
            left_sum += y[sorted[i]];
            let n_left = i + 1;
            let n_right = sorted.len() - n_left;
            if n_left < params.min_samples_leaf || n_right < params.min_samples_leaf {
                continue;
            }
            let (here, next) = (x[sorted[i]][feature], x[sorted[i + 1]][feature]);
            if here == next {
                continue;
            }
            let right_sum = total - left_sum;
            let score = left_sum * left_sum / n_left as f64 + right_sum * right_sum / n_right as f64;
            if score > parent_score + 1e-12 && best.map_or(true, |(_, _, s)| score > s) {
                best = Some((feature, here + (next - here) / 2.0, score));
            }
        }
    }
    best.map(|(f, t, _)| (f, t))
}

/// Bagged ensemble of regression trees. Deterministic for a fixed seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_trees: usize,
    max_depth: usize,
    min_samples_leaf: usize,
    seed: u64,
    n_features: usize,
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    pub fn new(cfg: &ForestConfig) -> Self {
        Self {
            n_trees: cfg.n_trees.max(1),
            max_depth: cfg.max_depth,
            min_samples_leaf: cfg.min_samples_leaf.max(1),
            seed: cfg.seed,
            n_features: 0,
            trees: Vec::new(),
        }
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }
}

impl Regressor for RandomForest {
    fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<()> {
        if x.is_empty() {
            return Err(PipelineError::InsufficientData("cannot fit on zero rows".into()));
        }
        if x.len() != y.len() {
            return Err(PipelineError::Data(format!(
                "row count mismatch: {} feature rows, {} targets",
                x.len(),
                y.len()
            )));
        }
        let n_features = x[0].len();
        if let Some(bad) = x.iter().find(|r| r.len() != n_features) {
            return Err(PipelineError::FeatureMismatch(format!(
                "ragged feature matrix: got {}, expected {}",
                bad.len(),
                n_features
            )));
        }

        let params = TreeParams {
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
            max_features: n_features.div_ceil(3),
        };
        let n = x.len();
        self.trees = (0..self.n_trees)
            .map(|t| {
                let mut rng = ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(t as u64));
                let rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit(x, y, rows, &params, &mut rng)
            })
            .collect();
        self.n_features = n_features;
        tracing::debug!(
            trees = self.trees.len(),
            rows = n,
            features = n_features,
            nodes = self.trees.iter().map(RegressionTree::n_nodes).sum::<usize>(),
            "random forest fitted"
        );
        Ok(())
    }

    fn predict_row(&self, row: &[f64]) -> Result<f64> {
        if !self.is_fitted() {
            return Err(PipelineError::InsufficientData("model has not been fitted".into()));
        }
        if row.len() != self.n_features {
            return Err(PipelineError::FeatureMismatch(format!(
                "feature length mismatch: got {}, expected {}",
                row.len(),
                self.n_features
            )));
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict(row)).sum();
        Ok(sum / self.trees.len() as f64)
    }
}
