use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

/// Purity of a bin that received no training weight.
const EMPTY_BIN_PURITY: f64 = 0.5;

/// Reorders the bins of one feature by ascending weighted signal purity.
///
/// `permutation[bin]` is the rank of `bin` once all bins are sorted by the
/// fraction of positive-class weight they hold. Ties keep the original bin
/// order. The mapping is captured at training time and reused verbatim for
/// prediction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurityTransformation {
    permutation: Vec<u32>,
}

impl PurityTransformation {
    pub fn fit(
        bins: ArrayView1<u32>,
        labels: ArrayView1<bool>,
        weights: ArrayView1<f64>,
        n_bins: usize,
    ) -> Self {
        let mut signal = vec![0.0; n_bins];
        let mut total = vec![0.0; n_bins];
        for ((&bin, &label), &w) in bins.iter().zip(labels).zip(weights) {
            total[bin as usize] += w;
            if label {
                signal[bin as usize] += w;
            }
        }

        let purity: Vec<f64> = signal
            .iter()
            .zip(&total)
            .map(|(&s, &t)| if t > 0.0 { s / t } else { EMPTY_BIN_PURITY })
            .collect();

        let mut order: Vec<usize> = (0..n_bins).collect();
        order.sort_by(|&a, &b| purity[a].total_cmp(&purity[b]));

        let mut permutation = vec![0u32; n_bins];
        for (rank, &bin) in order.iter().enumerate() {
            permutation[bin] = rank as u32;
        }
        Self { permutation }
    }

    /// Rebuilds a transformation from a stored permutation, which must be a
    /// bijection over `0..n_bins`.
    pub fn from_permutation(permutation: Vec<u32>, n_bins: usize) -> Result<Self, String> {
        let transformation = Self { permutation };
        transformation.validate(n_bins)?;
        Ok(transformation)
    }

    pub(crate) fn validate(&self, n_bins: usize) -> Result<(), String> {
        if self.permutation.len() != n_bins {
            return Err(format!(
                "purity permutation has {} entries, expected {n_bins}",
                self.permutation.len()
            ));
        }
        let mut seen = vec![false; n_bins];
        for &target in &self.permutation {
            match seen.get_mut(target as usize) {
                Some(slot) if !*slot => *slot = true,
                _ => return Err(format!("purity permutation is not a bijection at {target}")),
            }
        }
        Ok(())
    }

    pub fn permutation(&self) -> &[u32] {
        &self.permutation
    }

    #[inline]
    pub fn apply(&self, bin: u32) -> u32 {
        self.permutation[bin as usize]
    }
}
