//! Bagged regression trees.
//!
//! Each tree is grown on a bootstrap sample with histogram splits: feature
//! values are bucketed once into at most `max_bins` quantile bins, and a node
//! evaluates every bin boundary of every feature by its squared-error
//! reduction. Trees are fitted in parallel; tree `i` draws its bootstrap from
//! its own seed stream, so the ensemble is identical for a given seed no
//! matter how many threads are used.

use rand::Rng;
use rayon::prelude::*;

use crate::error::AppError;
use crate::features::FeatureTable;
use crate::math::{rmse, stream_rng};

/// Share of the (chronologically last) rows held out for evaluation.
const HOLDOUT_FRACTION: f64 = 0.2;

/// Fewest training rows a lag forest is fitted on.
const MIN_TRAIN_ROWS: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub max_bins: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 200,
            max_depth: 12,
            min_samples_leaf: 2,
            max_bins: 64,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict(&self, x: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf(v) => return *v,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

/// A fitted ensemble.
#[derive(Debug, Clone)]
pub struct ForestModel {
    trees: Vec<Tree>,
    n_features: usize,
}

impl ForestModel {
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Mean of the tree predictions. Returns `None` on a feature-width mismatch.
    pub fn predict(&self, x: &[f64]) -> Option<f64> {
        if x.len() != self.n_features || self.trees.is_empty() {
            return None;
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict(x)).sum();
        Some(sum / self.trees.len() as f64)
    }
}

/// Per-feature bin boundaries (ascending). A value falls in bin
/// `#{cuts < x}`, so "bin ≤ b" is equivalent to "x ≤ cuts[b]".
struct Binning {
    cuts: Vec<Vec<f64>>,
    /// `bins[feature][row]`
    bins: Vec<Vec<u8>>,
}

impl Binning {
    fn new(x: &[Vec<f64>], n_features: usize, max_bins: usize) -> Self {
        let max_bins = max_bins.clamp(2, 256);
        let mut cuts = Vec::with_capacity(n_features);
        let mut bins = Vec::with_capacity(n_features);
        for f in 0..n_features {
            let mut col: Vec<f64> = x.iter().map(|row| row[f]).collect();
            col.sort_by(f64::total_cmp);
            col.dedup();
            let feature_cuts: Vec<f64> = if col.len() <= max_bins {
                col.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
            } else {
                let mut c: Vec<f64> = (1..max_bins)
                    .map(|i| col[i * col.len() / max_bins])
                    .collect();
                c.dedup();
                c
            };
            let feature_bins = x
                .iter()
                .map(|row| feature_cuts.partition_point(|&c| c < row[f]) as u8)
                .collect();
            cuts.push(feature_cuts);
            bins.push(feature_bins);
        }
        Self { cuts, bins }
    }
}

struct Grower<'a> {
    binning: &'a Binning,
    y: &'a [f64],
    params: &'a ForestParams,
    nodes: Vec<Node>,
}

impl Grower<'_> {
    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let n = rows.len();
        let sum: f64 = rows.iter().map(|&r| self.y[r]).sum();
        let leaf_value = if n == 0 { 0.0 } else { sum / n as f64 };

        let split = if depth < self.params.max_depth && n >= 2 * self.params.min_samples_leaf {
            self.best_split(&rows, sum)
        } else {
            None
        };

        let Some((feature, bin)) = split else {
            self.nodes.push(Node::Leaf(leaf_value));
            return self.nodes.len() - 1;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| self.binning.bins[feature][r] as usize <= bin);

        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf(leaf_value));
        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[idx] = Node::Split {
            feature,
            threshold: self.binning.cuts[feature][bin],
            left,
            right,
        };
        idx
    }

    /// Best `(feature, bin)` by squared-error reduction, if any improves.
    fn best_split(&self, rows: &[usize], total_sum: f64) -> Option<(usize, usize)> {
        let n = rows.len() as f64;
        let parent_score = total_sum * total_sum / n;
        let min_leaf = self.params.min_samples_leaf.max(1);
        let mut best: Option<(f64, usize, usize)> = None;

        for (feature, cuts) in self.binning.cuts.iter().enumerate() {
            if cuts.is_empty() {
                continue;
            }
            let n_bins = cuts.len() + 1;
            let mut counts = vec![0usize; n_bins];
            let mut sums = vec![0.0f64; n_bins];
            let col = &self.binning.bins[feature];
            for &r in rows {
                let b = col[r] as usize;
                counts[b] += 1;
                sums[b] += self.y[r];
            }

            let mut n_left = 0usize;
            let mut s_left = 0.0;
            for bin in 0..cuts.len() {
                n_left += counts[bin];
                s_left += sums[bin];
                let n_right = rows.len() - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }
                let s_right = total_sum - s_left;
                let score = s_left * s_left / n_left as f64 + s_right * s_right / n_right as f64;
                let gain = score - parent_score;
                if gain > 1e-12 && best.is_none_or(|(g, _, _)| gain > g) {
                    best = Some((gain, feature, bin));
                }
            }
        }

        best.map(|(_, f, b)| (f, b))
    }
}

/// Fit the ensemble on a dense feature matrix.
pub fn fit_forest(x: &[Vec<f64>], y: &[f64], params: &ForestParams) -> Result<ForestModel, AppError> {
    if x.is_empty() || x.len() != y.len() {
        return Err(AppError::fit("Forest needs a non-empty, aligned training set."));
    }
    let n_features = x[0].len();
    if n_features == 0 || x.iter().any(|row| row.len() != n_features) {
        return Err(AppError::fit("Forest feature rows have inconsistent widths."));
    }
    if x.iter().flatten().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(AppError::fit("Forest training data contains non-finite values."));
    }
    if params.n_trees == 0 {
        return Err(AppError::invalid("Forest needs at least one tree."));
    }

    let binning = Binning::new(x, n_features, params.max_bins);
    let n = x.len();

    let trees: Vec<Tree> = (0..params.n_trees)
        .into_par_iter()
        .map(|i| {
            let mut rng = stream_rng(params.seed, i as u64);
            let rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let mut grower = Grower {
                binning: &binning,
                y,
                params,
                nodes: Vec::new(),
            };
            grower.grow(rows, 0);
            Tree { nodes: grower.nodes }
        })
        .collect();

    Ok(ForestModel { trees, n_features })
}

/// Forest over lag features plus the layout and held-out diagnostics.
#[derive(Debug, Clone)]
pub struct LagForest {
    pub forest: ForestModel,
    pub variables: Vec<String>,
    pub target_index: usize,
    pub lags: usize,
    pub n_train: usize,
    pub holdout_rmse: Option<f64>,
    /// `actual - predicted` on the held-out rows, oldest first.
    pub holdout_residuals: Vec<f64>,
}

/// Fit on the first 80% of the rows (no shuffling) and evaluate on the rest.
pub fn fit_lag_forest(table: &FeatureTable, params: &ForestParams) -> Result<LagForest, AppError> {
    let n = table.len();
    let n_test = (n as f64 * HOLDOUT_FRACTION).ceil() as usize;
    let n_train = n - n_test;
    if n_train < MIN_TRAIN_ROWS {
        return Err(AppError::fit(format!(
            "Too few complete lag-feature rows: {n_train} training rows < {MIN_TRAIN_ROWS}."
        )));
    }

    let (train, test) = table.rows.split_at(n_train);
    let x: Vec<Vec<f64>> = train.iter().map(|r| r.features.clone()).collect();
    let y: Vec<f64> = train.iter().map(|r| r.target).collect();
    let forest = fit_forest(&x, &y, params)?;

    let mut holdout_residuals = Vec::with_capacity(test.len());
    for row in test {
        let pred = forest
            .predict(&row.features)
            .ok_or_else(|| AppError::fit("Held-out row width does not match the forest."))?;
        holdout_residuals.push(row.target - pred);
    }

    Ok(LagForest {
        forest,
        variables: table.variables.clone(),
        target_index: table.target_index,
        lags: table.lags,
        n_train,
        holdout_rmse: rmse(&holdout_residuals),
        holdout_residuals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..200).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let y: Vec<f64> = x.iter().map(|r| if r[0] < 100.0 { 1.0 } else { 5.0 }).collect();
        (x, y)
    }

    #[test]
    fn learns_a_step_function() {
        let (x, y) = step_data();
        let params = ForestParams {
            n_trees: 20,
            ..ForestParams::default()
        };
        let m = fit_forest(&x, &y, &params).unwrap();
        assert!((m.predict(&[10.0, 0.0]).unwrap() - 1.0).abs() < 0.2);
        assert!((m.predict(&[190.0, 1.0]).unwrap() - 5.0).abs() < 0.2);
        assert_eq!(m.predict(&[1.0]), None);
    }

    #[test]
    fn same_seed_same_predictions() {
        let (x, y) = step_data();
        let params = ForestParams {
            n_trees: 10,
            seed: 9,
            ..ForestParams::default()
        };
        let a = fit_forest(&x, &y, &params).unwrap();
        let b = fit_forest(&x, &y, &params).unwrap();
        for x in [[0.0, 0.0], [99.5, 2.0], [150.0, 1.0]] {
            assert_eq!(a.predict(&x), b.predict(&x));
        }
    }

    #[test]
    fn lag_forest_holds_out_the_most_recent_rows() {
        use crate::domain::{MultivariateTable, TimeSeries};
        use crate::features::build_lag_features;
        use chrono::NaiveDate;

        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let t: Vec<Option<f64>> = (0..120).map(|i| Some(10.0 + (i % 5) as f64)).collect();
        let table = MultivariateTable::align(vec![("T2M".into(), TimeSeries::new(start, t))]).unwrap();
        let features = build_lag_features(&table, 7, "T2M").unwrap();
        let params = ForestParams {
            n_trees: 15,
            seed: 3,
            ..ForestParams::default()
        };
        let lf = fit_lag_forest(&features, &params).unwrap();

        // 112 rows: 23 held out, 89 for training.
        assert_eq!(lf.holdout_residuals.len(), 23);
        assert_eq!(lf.n_train, 89);
        assert!(lf.holdout_rmse.unwrap() < 0.5, "rmse={:?}", lf.holdout_rmse);
    }

    #[test]
    fn rejects_ragged_input() {
        let x = vec![vec![1.0, 2.0], vec![1.0]];
        assert!(fit_forest(&x, &[1.0, 2.0], &ForestParams::default()).is_err());
    }
}
