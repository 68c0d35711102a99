//! Equal-frequency discretisation of continuous features.
//!
//! Each feature gets `2^n_bits` ordered bins separated by `2^n_bits - 1`
//! non-decreasing boundaries. A value lands in the bin equal to the number of
//! boundaries less than or equal to it, so a boundary value belongs to the
//! upper bin. The boundaries are computed once from the training column and
//! stored with the model; prediction re-bins through the same function.

use itertools::Itertools;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

pub const MIN_BITS: u32 = 1;
pub const MAX_BITS: u32 = 16;
pub const DEFAULT_BITS: u32 = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBinning {
    n_bits: u32,
    boundaries: Vec<f64>,
}

impl FeatureBinning {
    /// Computes boundaries for one training column.
    ///
    /// Columns with no more distinct finite values than bins get one bin per
    /// distinct value (boundaries at midpoints, padded with the maximum).
    /// Larger columns are cut at equal-frequency quantiles. NaN and infinite
    /// values do not contribute to the boundaries.
    pub fn fit(column: ArrayView1<f64>, n_bits: u32) -> Self {
        let n_bins = 1usize << n_bits;
        let n_boundaries = n_bins - 1;

        let mut sorted: Vec<f64> = column.iter().copied().filter(|v| v.is_finite()).collect();
        sorted.sort_by(f64::total_cmp);

        if sorted.is_empty() {
            return Self {
                n_bits,
                boundaries: vec![0.0; n_boundaries],
            };
        }

        let distinct: Vec<f64> = sorted.iter().copied().dedup().collect();
        let boundaries = if distinct.len() <= n_bins {
            let max = distinct[distinct.len() - 1];
            let mut boundaries: Vec<f64> = distinct
                .iter()
                .tuple_windows()
                .map(|(&a, &b)| a + (b - a) / 2.0)
                .collect();
            boundaries.resize(n_boundaries, max);
            boundaries
        } else {
            let n = sorted.len();
            (1..n_bins).map(|k| sorted[k * n / n_bins]).collect()
        };

        Self { n_bits, boundaries }
    }

    /// Rebuilds a binning from stored parts, checking its invariants.
    pub fn from_parts(n_bits: u32, boundaries: Vec<f64>) -> Result<Self, String> {
        let binning = Self { n_bits, boundaries };
        binning.validate()?;
        Ok(binning)
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if !(MIN_BITS..=MAX_BITS).contains(&self.n_bits) {
            return Err(format!("bit width {} outside {MIN_BITS}..={MAX_BITS}", self.n_bits));
        }
        if self.boundaries.len() != self.n_bins() - 1 {
            return Err(format!(
                "expected {} boundaries for {} bits, found {}",
                self.n_bins() - 1,
                self.n_bits,
                self.boundaries.len()
            ));
        }
        if self.boundaries.iter().any(|b| b.is_nan()) {
            return Err("NaN bin boundary".into());
        }
        if self.boundaries.iter().tuple_windows().any(|(a, b)| a > b) {
            return Err("bin boundaries are not non-decreasing".into());
        }
        Ok(())
    }

    #[inline]
    pub fn n_bits(&self) -> u32 {
        self.n_bits
    }

    #[inline]
    pub fn n_bins(&self) -> usize {
        1usize << self.n_bits
    }

    pub fn boundaries(&self) -> &[f64] {
        &self.boundaries
    }

    /// Maps a raw value to its bin. NaN goes to bin 0.
    #[inline]
    pub fn value_to_bin(&self, value: f64) -> u32 {
        if value.is_nan() {
            return 0;
        }
        self.boundaries.partition_point(|&b| b <= value) as u32
    }
}

/// Per-feature binnings of a whole feature matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinningScheme {
    features: Vec<FeatureBinning>,
}

impl BinningScheme {
    /// Fits one binning per column; `n_bits` must have one entry per column.
    pub fn fit(x: ArrayView2<f64>, n_bits: &[u32]) -> Self {
        debug_assert_eq!(x.ncols(), n_bits.len());
        let features = x
            .axis_iter(Axis(1))
            .zip(n_bits)
            .map(|(column, &bits)| FeatureBinning::fit(column, bits))
            .collect();
        Self { features }
    }

    pub fn from_features(features: Vec<FeatureBinning>) -> Self {
        Self { features }
    }

    pub fn features(&self) -> &[FeatureBinning] {
        &self.features
    }

    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    pub fn n_bins(&self) -> Vec<usize> {
        self.features.iter().map(FeatureBinning::n_bins).collect()
    }

    /// Bins every row of `x`; the column count must equal `n_features`.
    pub fn transform(&self, x: ArrayView2<f64>) -> Array2<u32> {
        let mut bins = Array2::zeros((x.nrows(), x.ncols()));
        for (j, binning) in self.features.iter().enumerate() {
            bins.column_mut(j)
                .iter_mut()
                .zip(x.column(j))
                .for_each(|(bin, &value)| *bin = binning.value_to_bin(value));
        }
        bins
    }

    pub fn bin_point(&self, point: &[f64]) -> Vec<u32> {
        self.features
            .iter()
            .zip(point)
            .map(|(binning, &value)| binning.value_to_bin(value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn test_few_distinct_values_get_own_bins() {
        let column = array![5.1, 7.0, 6.3];
        let binning = FeatureBinning::fit(column.view(), 8);

        assert_eq!(binning.boundaries().len(), 255);
        assert_eq!(binning.value_to_bin(5.1), 0);
        assert_eq!(binning.value_to_bin(6.3), 1);
        assert_eq!(binning.value_to_bin(7.0), 255);
        assert_eq!(binning.value_to_bin(-100.0), 0);
        assert_eq!(binning.value_to_bin(100.0), 255);
    }

    #[test]
    fn test_boundary_belongs_to_upper_bin() {
        let column = array![1.0, 2.0, 3.0, 4.0];
        let binning = FeatureBinning::fit(column.view(), 2);
        assert_eq!(binning.boundaries(), &[1.5, 2.5, 3.5]);
        assert_eq!(binning.value_to_bin(1.5), 1);
        assert_eq!(binning.value_to_bin(1.4999), 0);
        assert_eq!(binning.value_to_bin(3.5), 3);
    }

    #[test]
    fn test_equal_frequency_bins() {
        let column = Array1::from_iter((0..1000).map(|i| i as f64));
        let binning = FeatureBinning::fit(column.view(), 2);
        assert_eq!(binning.boundaries(), &[250.0, 500.0, 750.0]);

        let mut counts = [0usize; 4];
        for &v in column.iter() {
            counts[binning.value_to_bin(v) as usize] += 1;
        }
        assert_eq!(counts, [250, 250, 250, 250]);
    }

    #[test]
    fn test_binning_is_monotonic_and_covers_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let column = Array1::from_iter((0..500).map(|_| rng.gen_range(-3.0..3.0_f64).powi(3)));
        let binning = FeatureBinning::fit(column.view(), 4);

        let mut values: Vec<f64> = column.to_vec();
        values.extend([-1e9, 1e9, 0.0]);
        values.sort_by(f64::total_cmp);
        let bins: Vec<u32> = values.iter().map(|&v| binning.value_to_bin(v)).collect();

        assert!(bins.windows(2).all(|w| w[0] <= w[1]));
        assert!(bins.iter().all(|&b| (b as usize) < binning.n_bins()));
    }

    #[test]
    fn test_constant_and_empty_columns() {
        let constant = array![2.0, 2.0, 2.0];
        let binning = FeatureBinning::fit(constant.view(), 3);
        assert!(binning.boundaries().iter().all(|&b| b == 2.0));
        assert_eq!(binning.value_to_bin(2.0), 7);
        assert_eq!(binning.value_to_bin(1.0), 0);

        let empty = array![f64::NAN, f64::NAN];
        let binning = FeatureBinning::fit(empty.view(), 1);
        assert_eq!(binning.boundaries(), &[0.0]);
        assert_eq!(binning.value_to_bin(f64::NAN), 0);
    }

    #[test]
    fn test_from_parts_rejects_broken_boundaries() {
        assert!(FeatureBinning::from_parts(1, vec![0.5]).is_ok());
        assert!(FeatureBinning::from_parts(2, vec![0.5]).is_err());
        assert!(FeatureBinning::from_parts(2, vec![0.5, 0.4, 0.6]).is_err());
        assert!(FeatureBinning::from_parts(0, vec![]).is_err());
    }

    #[test]
    fn test_scheme_transform_matches_point_binning() {
        let x = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0], [4.0, 40.0]];
        let scheme = BinningScheme::fit(x.view(), &[1, 2]);
        let bins = scheme.transform(x.view());

        for (i, row) in x.rows().into_iter().enumerate() {
            let point = row.to_vec();
            assert_eq!(scheme.bin_point(&point), bins.row(i).to_vec());
        }
        assert_eq!(scheme.n_bins(), vec![2, 4]);
    }
}
