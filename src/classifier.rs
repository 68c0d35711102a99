mod params;

pub use params::{ClassifierParams, ClassifierParamsBuilder};

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use itertools::Itertools;
use ndarray::{aview1, Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::binning::BinningScheme;
use crate::error::{config_error, FastBdtError, Result};
use crate::forest::{self, loss, Forest};
use crate::persist::{self, FormatError, ModelFormat};
use crate::purity::PurityTransformation;
use crate::tree::BinnedData;
use crate::{FitResult, FittedModel};

/// A fitted binary classifier: binning, optional purity mappings and the
/// boosted forest, plus the resolved parameters it was trained with.
///
/// Immutable once constructed; `predict` takes `&self` and may be called
/// from many threads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classifier {
    params: ClassifierParams,
    binning: BinningScheme,
    purity: Vec<Option<PurityTransformation>>,
    forest: Forest,
}

impl Classifier {
    /// Fits a classifier on `x` (rows by features) with boolean targets `y`.
    ///
    /// `w` is only read when `params.s_plot` is set; otherwise every row
    /// weighs 1.0. A supplied `w` must still have one entry per row.
    pub fn fit(
        x: ArrayView2<f64>,
        y: ArrayView1<bool>,
        w: Option<ArrayView1<f64>>,
        params: &ClassifierParams,
    ) -> Result<(FitResult, Self)> {
        let (n_rows, n_features) = x.dim();
        if n_rows == 0 {
            return Err(config_error("training data has no rows"));
        }
        let params = params.resolve(n_features)?;
        if y.len() != n_rows {
            return Err(config_error(format!(
                "{} labels for {n_rows} training rows",
                y.len()
            )));
        }
        let weights = effective_weights(n_rows, w, params.s_plot)?;

        let binning = BinningScheme::fit(x, &params.binning);
        let n_bins = binning.n_bins();
        let mut bins = binning.transform(x);

        let purity: Vec<Option<PurityTransformation>> = params
            .purity_transformation
            .iter()
            .enumerate()
            .map(|(feature, &enabled)| {
                enabled.then(|| {
                    PurityTransformation::fit(bins.column(feature), y, weights.view(), n_bins[feature])
                })
            })
            .collect();
        for (feature, mapping) in purity.iter().enumerate() {
            if let Some(mapping) = mapping {
                bins.column_mut(feature).mapv_inplace(|bin| mapping.apply(bin));
            }
        }

        let data = BinnedData {
            bins: bins.view(),
            n_bins: &n_bins,
            labels: y.view(),
            weights: weights.view(),
        };
        let (fit_result, forest) = forest::fit(data, &params.boosting_params(n_features));

        Ok((
            fit_result,
            Self {
                params,
                binning,
                purity,
                forest,
            },
        ))
    }

    pub fn params(&self) -> &ClassifierParams {
        &self.params
    }

    pub fn binning(&self) -> &BinningScheme {
        &self.binning
    }

    pub fn purity(&self) -> &[Option<PurityTransformation>] {
        &self.purity
    }

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    pub fn n_features(&self) -> usize {
        self.binning.n_features()
    }

    /// Score of one query point; a probability in [0, 1] when the model was
    /// fitted with `transform_to_probability`, the raw score otherwise.
    pub fn predict(&self, point: &[f64]) -> Result<f64> {
        let raw = self.predict_raw(point)?;
        Ok(if self.forest.transform_to_probability() {
            loss::probability(raw)
        } else {
            raw
        })
    }

    /// Shrinkage-weighted sum of leaf outputs, without calibration.
    pub fn predict_raw(&self, point: &[f64]) -> Result<f64> {
        let bins = self.bin_point(point)?;
        Ok(self.forest.raw_score(aview1(&bins)))
    }

    fn bin_point(&self, point: &[f64]) -> Result<Vec<u32>> {
        let expected = self.n_features();
        if point.len() != expected {
            return Err(FastBdtError::Dimension {
                expected,
                got: point.len(),
            });
        }
        let mut bins = self.binning.bin_point(point);
        for (bin, mapping) in bins.iter_mut().zip(&self.purity) {
            if let Some(mapping) = mapping {
                *bin = mapping.apply(*bin);
            }
        }
        Ok(bins)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(persist::encode_binary(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let model: Self = persist::decode_binary(bytes)?;
        model.checked()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(persist::encode_json(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let model: Self = persist::decode_json(text)?;
        model.checked()
    }

    pub fn write_to<W: Write>(&self, writer: &mut W, format: ModelFormat) -> Result<()> {
        match format {
            ModelFormat::Binary => persist::write_binary(writer, self)?,
            ModelFormat::Json => {
                writer.write_all(self.to_json()?.as_bytes())?;
                writer.flush()?;
            }
        }
        Ok(())
    }

    /// Reads a model in either format, detected from the leading bytes.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        match ModelFormat::detect(&bytes) {
            ModelFormat::Binary => Self::from_bytes(&bytes),
            ModelFormat::Json => {
                let text = std::str::from_utf8(&bytes).map_err(|_| FormatError::NotAModel)?;
                Self::from_json(text)
            }
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P, format: ModelFormat) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        self.write_to(&mut writer, format)?;
        info!(path = %path.as_ref().display(), ?format, "Saved model");
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path.as_ref())?);
        let model = Self::read_from(&mut reader)?;
        info!(path = %path.as_ref().display(), trees = model.forest.trees().len(), "Loaded model");
        Ok(model)
    }

    fn checked(self) -> Result<Self> {
        self.validate()
            .map_err(|e| FastBdtError::Serialization(FormatError::CorruptPayload(e)))?;
        Ok(self)
    }

    /// Structural consistency of a decoded model.
    fn validate(&self) -> std::result::Result<(), String> {
        let n_features = self.n_features();
        let resolved = self
            .params
            .resolve(n_features)
            .map_err(|e| format!("invalid parameters: {e}"))?;
        if resolved != self.params {
            return Err("parameters are not resolved per feature".into());
        }

        let n_bins = self.binning.n_bins();
        for (feature, (binning, &bits)) in self.binning.features().iter().zip(&self.params.binning).enumerate() {
            binning.validate().map_err(|e| format!("feature {feature}: {e}"))?;
            if binning.n_bits() != bits {
                return Err(format!("feature {feature} binned with {} bits, expected {bits}", binning.n_bits()));
            }
        }

        if self.purity.len() != n_features {
            return Err(format!("{} purity entries for {n_features} features", self.purity.len()));
        }
        for (feature, (mapping, &enabled)) in self.purity.iter().zip(&self.params.purity_transformation).enumerate() {
            match mapping {
                Some(mapping) if enabled => mapping
                    .validate(n_bins[feature])
                    .map_err(|e| format!("feature {feature}: {e}"))?,
                None if !enabled => {}
                _ => return Err(format!("feature {feature}: purity mapping disagrees with parameters")),
            }
        }

        if self.forest.shrinkage() != self.params.shrinkage
            || self.forest.transform_to_probability() != self.params.transform_to_probability
        {
            return Err("forest settings disagree with parameters".into());
        }
        let split_features = self.params.n_split_features(n_features);
        self.forest.validate(&n_bins[..split_features])?;

        let n_trees = self.forest.trees().len();
        if n_trees != self.params.n_trees {
            return Err(format!("{n_trees} trees stored, expected {}", self.params.n_trees));
        }
        if let Some((idx, tree)) = self
            .forest
            .trees()
            .iter()
            .enumerate()
            .find(|(_, tree)| tree.depth() > self.params.depth)
        {
            return Err(format!(
                "tree {idx} has depth {}, limit is {}",
                tree.depth(),
                self.params.depth
            ));
        }
        Ok(())
    }
}

fn effective_weights(n_rows: usize, w: Option<ArrayView1<f64>>, s_plot: bool) -> Result<Array1<f64>> {
    if let Some(w) = w {
        if w.len() != n_rows {
            return Err(config_error(format!("{} weights for {n_rows} training rows", w.len())));
        }
        if s_plot {
            if let Some(bad) = w.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
                return Err(config_error(format!("invalid row weight {bad}")));
            }
            if w.sum() <= 0.0 {
                return Err(config_error("row weights sum to zero"));
            }
            return Ok(w.to_owned());
        }
    }
    Ok(Array1::ones(n_rows))
}

impl FittedModel for Classifier {
    fn predict_batch(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        x.rows()
            .into_iter()
            .map(|row| self.predict(&row.to_vec()))
            .collect()
    }
}

impl fmt::Display for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.params;
        writeln!(f, "FastBDT classifier")?;
        writeln!(
            f,
            "  trees: {}, depth: {}, shrinkage: {}, subsample: {}, seed: {}",
            p.n_trees, p.depth, p.shrinkage, p.subsample, p.seed
        )?;
        writeln!(f, "  binning (bits): [{}]", p.binning.iter().join(", "))?;
        writeln!(
            f,
            "  purity transformation: [{}]",
            p.purity_transformation.iter().map(|&b| u8::from(b)).join(", ")
        )?;
        writeln!(
            f,
            "  weighted: {}, flatness features: {}, flatness loss: {}, probability: {}",
            p.s_plot, p.n_flatness_features, p.flatness_loss, p.transform_to_probability
        )?;
        for (i, tree) in self.forest.trees().iter().enumerate() {
            writeln!(f, "  tree {i}: depth {}, {} leaves", tree.depth(), tree.n_leaves())?;
        }
        Ok(())
    }
}
