use serde::{Deserialize, Serialize};

use crate::binning::{DEFAULT_BITS, MAX_BITS, MIN_BITS};
use crate::error::{config_error, Result};
use crate::forest::BoostingParams;
use crate::tree::{FlatnessParams, TreeParams};

/// Hyperparameters of a [`Classifier`](super::Classifier), fixed before `fit`.
///
/// Empty `binning` or `purity_transformation` vectors stand for the
/// per-feature defaults (8 bits, no purity transformation). The fitted model
/// stores the resolved per-feature vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierParams {
    pub n_trees: usize,
    pub depth: usize,
    pub shrinkage: f64,
    pub subsample: f64,
    pub binning: Vec<u32>,
    pub purity_transformation: Vec<bool>,
    /// Use the supplied row weights; otherwise every row weighs 1.0.
    pub s_plot: bool,
    /// The last `n_flatness_features` columns are flatness features.
    pub n_flatness_features: usize,
    /// Uniformity penalty strength; values `<= 0` disable it.
    pub flatness_loss: f64,
    pub transform_to_probability: bool,
    pub seed: u64,
}

// Builder for ClassifierParams
#[derive(Debug, Clone)]
pub struct ClassifierParamsBuilder {
    n_trees: usize,
    depth: usize,
    shrinkage: f64,
    subsample: f64,
    binning: Vec<u32>,
    purity_transformation: Vec<bool>,
    s_plot: bool,
    n_flatness_features: usize,
    flatness_loss: f64,
    transform_to_probability: bool,
    seed: u64,
}

impl ClassifierParamsBuilder {
    pub fn new() -> Self {
        Self {
            n_trees: 100,
            depth: 3,
            shrinkage: 0.1,
            subsample: 0.5,
            binning: Vec::new(),
            purity_transformation: Vec::new(),
            s_plot: false,
            n_flatness_features: 0,
            flatness_loss: -1.0,
            transform_to_probability: true,
            seed: 42,
        }
    }

    pub fn n_trees(mut self, n_trees: usize) -> Self {
        self.n_trees = n_trees;
        self
    }

    pub fn depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn shrinkage(mut self, shrinkage: f64) -> Self {
        self.shrinkage = shrinkage;
        self
    }

    pub fn subsample(mut self, subsample: f64) -> Self {
        self.subsample = subsample;
        self
    }

    pub fn binning(mut self, binning: Vec<u32>) -> Self {
        self.binning = binning;
        self
    }

    pub fn purity_transformation(mut self, purity_transformation: Vec<bool>) -> Self {
        self.purity_transformation = purity_transformation;
        self
    }

    pub fn s_plot(mut self, s_plot: bool) -> Self {
        self.s_plot = s_plot;
        self
    }

    pub fn n_flatness_features(mut self, n_flatness_features: usize) -> Self {
        self.n_flatness_features = n_flatness_features;
        self
    }

    pub fn flatness_loss(mut self, flatness_loss: f64) -> Self {
        self.flatness_loss = flatness_loss;
        self
    }

    pub fn transform_to_probability(mut self, transform_to_probability: bool) -> Self {
        self.transform_to_probability = transform_to_probability;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn build(self) -> ClassifierParams {
        ClassifierParams {
            n_trees: self.n_trees,
            depth: self.depth,
            shrinkage: self.shrinkage,
            subsample: self.subsample,
            binning: self.binning,
            purity_transformation: self.purity_transformation,
            s_plot: self.s_plot,
            n_flatness_features: self.n_flatness_features,
            flatness_loss: self.flatness_loss,
            transform_to_probability: self.transform_to_probability,
            seed: self.seed,
        }
    }
}

impl Default for ClassifierParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for ClassifierParams {
    fn default() -> Self {
        ClassifierParamsBuilder::new().build()
    }
}

impl ClassifierParams {
    /// Validates the parameters for `n_features` columns and returns a copy
    /// with the per-feature vectors filled in.
    pub fn resolve(&self, n_features: usize) -> Result<Self> {
        if self.n_trees == 0 {
            return Err(config_error("number of trees must be positive"));
        }
        if !(self.shrinkage > 0.0 && self.shrinkage <= 1.0) {
            return Err(config_error(format!("shrinkage {} outside (0, 1]", self.shrinkage)));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(config_error(format!("subsample {} outside (0, 1]", self.subsample)));
        }
        if !self.flatness_loss.is_finite() {
            return Err(config_error("flatness loss must be finite"));
        }
        if n_features == 0 {
            return Err(config_error("training data has no features"));
        }

        let binning = if self.binning.is_empty() {
            vec![DEFAULT_BITS; n_features]
        } else if self.binning.len() == n_features {
            self.binning.clone()
        } else {
            return Err(config_error(format!(
                "binning configured for {} features, data has {n_features}",
                self.binning.len()
            )));
        };
        if let Some(bits) = binning.iter().find(|&&b| !(MIN_BITS..=MAX_BITS).contains(&b)) {
            return Err(config_error(format!(
                "bin bit width {bits} outside {MIN_BITS}..={MAX_BITS}"
            )));
        }

        let purity_transformation = if self.purity_transformation.is_empty() {
            vec![false; n_features]
        } else if self.purity_transformation.len() == n_features {
            self.purity_transformation.clone()
        } else {
            return Err(config_error(format!(
                "purity transformation configured for {} features, data has {n_features}",
                self.purity_transformation.len()
            )));
        };

        if self.n_flatness_features >= n_features {
            return Err(config_error(format!(
                "{} flatness features leave no split feature among {n_features}",
                self.n_flatness_features
            )));
        }
        let n_split_features = n_features - self.n_flatness_features;
        if purity_transformation[n_split_features..].iter().any(|&p| p) {
            return Err(config_error(
                "purity transformation cannot be enabled on a flatness feature",
            ));
        }

        Ok(Self {
            binning,
            purity_transformation,
            ..self.clone()
        })
    }

    /// Number of leading columns that are split candidates.
    pub fn n_split_features(&self, n_features: usize) -> usize {
        n_features - self.n_flatness_features
    }

    pub fn flatness_active(&self) -> bool {
        self.n_flatness_features > 0 && self.flatness_loss > 0.0
    }

    pub(crate) fn boosting_params(&self, n_features: usize) -> BoostingParams {
        let n_split_features = self.n_split_features(n_features);
        let flatness = self.flatness_active().then(|| FlatnessParams {
            features: (n_split_features..n_features).collect(),
            loss: self.flatness_loss,
        });
        BoostingParams {
            n_trees: self.n_trees,
            shrinkage: self.shrinkage,
            subsample: self.subsample,
            transform_to_probability: self.transform_to_probability,
            seed: self.seed,
            tree_params: TreeParams {
                max_depth: self.depth,
                n_split_features,
                flatness,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FastBdtError;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let params = ClassifierParams::default();
        assert_eq!(params.n_trees, 100);
        assert_eq!(params.depth, 3);
        assert_eq!(params.shrinkage, 0.1);
        assert_eq!(params.subsample, 0.5);
        assert!(!params.s_plot);
        assert_eq!(params.n_flatness_features, 0);
        assert_eq!(params.flatness_loss, -1.0);
        assert!(params.transform_to_probability);

        let resolved = params.resolve(4).unwrap();
        assert_eq!(resolved.binning, vec![8; 4]);
        assert_eq!(resolved.purity_transformation, vec![false; 4]);
    }

    #[test]
    fn test_flatness_features_are_trailing_columns() {
        let params = ClassifierParamsBuilder::new()
            .n_flatness_features(2)
            .flatness_loss(0.5)
            .build()
            .resolve(5)
            .unwrap();
        let boosting = params.boosting_params(5);
        assert_eq!(boosting.tree_params.n_split_features, 3);
        assert_eq!(
            boosting.tree_params.flatness,
            Some(FlatnessParams {
                features: vec![3, 4],
                loss: 0.5
            })
        );

        let disabled = ClassifierParamsBuilder::new().n_flatness_features(2).build();
        let boosting = disabled.boosting_params(5);
        assert_eq!(boosting.tree_params.n_split_features, 3);
        assert!(boosting.tree_params.flatness.is_none());
    }

    #[rstest]
    #[case(ClassifierParamsBuilder::new().n_trees(0).build())]
    #[case(ClassifierParamsBuilder::new().shrinkage(0.0).build())]
    #[case(ClassifierParamsBuilder::new().shrinkage(1.5).build())]
    #[case(ClassifierParamsBuilder::new().subsample(f64::NAN).build())]
    #[case(ClassifierParamsBuilder::new().binning(vec![5, 5, 5]).build())]
    #[case(ClassifierParamsBuilder::new().binning(vec![5, 0, 5, 5]).build())]
    #[case(ClassifierParamsBuilder::new().binning(vec![5, 17, 5, 5]).build())]
    #[case(ClassifierParamsBuilder::new().purity_transformation(vec![true]).build())]
    #[case(ClassifierParamsBuilder::new().n_flatness_features(4).build())]
    #[case(ClassifierParamsBuilder::new()
        .n_flatness_features(1)
        .purity_transformation(vec![false, false, false, true])
        .build())]
    fn test_invalid_params_rejected(#[case] params: ClassifierParams) {
        assert!(matches!(params.resolve(4), Err(FastBdtError::Configuration(_))));
    }
}
