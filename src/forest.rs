pub mod loss;
pub mod sampling;

use ndarray::{Array1, ArrayView1};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::tree::{BinnedData, Tree, TreeBuilder, TreeParams};
use crate::FitResult;

use self::sampling::RowSampler;

/// Boosted ensemble of trees sharing one global shrinkage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forest {
    shrinkage: f64,
    transform_to_probability: bool,
    trees: Vec<Tree>,
}

impl Forest {
    pub fn new(shrinkage: f64, transform_to_probability: bool) -> Self {
        Self {
            shrinkage,
            transform_to_probability,
            trees: Vec::new(),
        }
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn shrinkage(&self) -> f64 {
        self.shrinkage
    }

    pub fn transform_to_probability(&self) -> bool {
        self.transform_to_probability
    }

    /// Shrinkage-scaled sum of the leaf outputs reached by `row`.
    pub fn raw_score(&self, row: ArrayView1<u32>) -> f64 {
        self.trees
            .iter()
            .fold(0.0, |score, tree| score + self.shrinkage * tree.predict_binned(row))
    }

    /// Raw score, squashed into [0, 1] when calibration is enabled.
    pub fn predict(&self, row: ArrayView1<u32>) -> f64 {
        let score = self.raw_score(row);
        if self.transform_to_probability {
            loss::probability(score)
        } else {
            score
        }
    }

    pub(crate) fn validate(&self, n_bins: &[usize]) -> Result<(), String> {
        if !(self.shrinkage > 0.0 && self.shrinkage <= 1.0) {
            return Err(format!("shrinkage {} outside (0, 1]", self.shrinkage));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(n_bins).map_err(|e| format!("tree {i}: {e}"))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoostingParams {
    pub n_trees: usize,
    pub shrinkage: f64,
    pub subsample: f64,
    pub transform_to_probability: bool,
    pub seed: u64,
    pub tree_params: TreeParams,
}

/// Runs `n_trees` boosting rounds on a binned training set.
///
/// Every round draws a fresh row subsample, recomputes pseudo-residuals from
/// the scores accumulated so far (all zero before the first tree) and grows
/// one tree on them.
pub fn fit(data: BinnedData, params: &BoostingParams) -> (FitResult, Forest) {
    let n_rows = data.bins.nrows();
    let labels = data.labels.to_vec();
    let weights = data.weights.to_vec();

    let mut rng = StdRng::seed_from_u64(params.seed);
    let sampler = RowSampler::new(params.subsample);
    let mut forest = Forest::new(params.shrinkage, params.transform_to_probability);

    let mut scores = vec![0.0; n_rows];
    let mut gradients = vec![0.0; n_rows];
    let mut hessians = vec![0.0; n_rows];

    info!(
        rows = n_rows,
        features = data.bins.ncols(),
        trees = params.n_trees,
        depth = params.tree_params.max_depth,
        "Fitting forest"
    );

    for round in 0..params.n_trees {
        let rows = sampler.sample(&mut rng, n_rows);
        let n_sampled = rows.len();
        loss::compute_gradients(&labels, &scores, &weights, &mut gradients, &mut hessians);

        let tree = TreeBuilder::new(data, &params.tree_params, &gradients, &hessians).grow(rows);
        if tree.n_leaves() == 1 && params.tree_params.max_depth > 0 {
            warn!(round, "Tree did not split; the root is a single leaf");
        }
        debug!(
            round,
            sampled = n_sampled,
            leaves = tree.n_leaves(),
            depth = tree.depth(),
            "Grew tree"
        );

        for (score, row) in scores.iter_mut().zip(data.bins.rows()) {
            *score += params.shrinkage * tree.predict_binned(row);
        }
        forest.trees.push(tree);
    }

    let err = loss::mean_deviance(&labels, &scores, &weights);
    let y_hat: Array1<f64> = data.bins.rows().into_iter().map(|row| forest.predict(row)).collect();
    let residuals: Array1<f64> = labels
        .iter()
        .zip(&y_hat)
        .map(|(&label, &p)| f64::from(u8::from(label)) - p)
        .collect();

    info!(trees = forest.trees.len(), deviance = err, "Finished fitting forest");

    (
        FitResult {
            err,
            residuals,
            y_hat,
        },
        forest,
    )
}
