pub mod binning;
pub mod classifier;
pub mod dataset;
pub mod error;
pub mod forest;
pub mod logging;
pub mod persist;
pub mod purity;
pub mod test_data;
pub mod tree;

use ndarray::{Array1, ArrayView2};

pub use classifier::{Classifier, ClassifierParams, ClassifierParamsBuilder};
pub use error::{FastBdtError, Result};
pub use persist::ModelFormat;

/// Training summary returned next to a fitted model.
#[derive(Debug)]
pub struct FitResult {
    /// Weighted mean binomial deviance on the training set.
    pub err: f64,
    pub residuals: Array1<f64>,
    pub y_hat: Array1<f64>,
}

pub trait FittedModel {
    /// Scores every row of `x`.
    fn predict_batch(&self, x: ArrayView2<f64>) -> Result<Array1<f64>>;
}
