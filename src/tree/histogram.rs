//! Per-node gradient histograms and the cumulative threshold scan.

use std::ops::{AddAssign, Sub};

use ndarray::ArrayView1;

/// Children whose curvature sum falls below this are not split off.
const MIN_HESSIAN: f64 = 1e-12;

/// Accumulated weighted pseudo-residuals, curvatures and row count of a bin.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct BinStats {
    pub grad: f64,
    pub hess: f64,
    pub count: u32,
}

impl BinStats {
    #[inline]
    fn score(&self) -> f64 {
        self.grad * self.grad / self.hess
    }
}

impl AddAssign for BinStats {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.grad += rhs.grad;
        self.hess += rhs.hess;
        self.count += rhs.count;
    }
}

impl Sub for BinStats {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self {
            grad: self.grad - rhs.grad,
            hess: self.hess - rhs.hess,
            count: self.count - rhs.count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SplitCandidate {
    pub feature: usize,
    pub threshold: u32,
    pub gain: f64,
}

pub(crate) fn node_stats(rows: &[usize], gradients: &[f64], hessians: &[f64]) -> BinStats {
    let mut stats = BinStats::default();
    for &row in rows {
        stats += BinStats {
            grad: gradients[row],
            hess: hessians[row],
            count: 1,
        };
    }
    stats
}

pub(crate) fn build_histogram(
    column: ArrayView1<u32>,
    rows: &[usize],
    gradients: &[f64],
    hessians: &[f64],
    n_bins: usize,
) -> Vec<BinStats> {
    let mut histogram = vec![BinStats::default(); n_bins];
    for &row in rows {
        histogram[column[row] as usize] += BinStats {
            grad: gradients[row],
            hess: hessians[row],
            count: 1,
        };
    }
    histogram
}

/// Second-order loss reduction of splitting `parent` into `left` and `right`.
#[inline]
pub(crate) fn split_gain(left: BinStats, right: BinStats, parent: BinStats) -> f64 {
    0.5 * (left.score() + right.score() - parent.score())
}

/// Scans thresholds in ascending order and keeps the first one reaching the
/// highest positive gain. `penalties[t]`, when given, is subtracted from the
/// gain of threshold `t`.
pub(crate) fn best_threshold(
    feature: usize,
    histogram: &[BinStats],
    parent: BinStats,
    penalties: Option<&[f64]>,
) -> Option<SplitCandidate> {
    let mut best: Option<SplitCandidate> = None;
    let mut left = BinStats::default();

    for (threshold, bin) in histogram.iter().enumerate().take(histogram.len().saturating_sub(1)) {
        left += *bin;
        let right = parent - left;
        if left.count == 0 || right.count == 0 {
            continue;
        }
        if left.hess <= MIN_HESSIAN || right.hess <= MIN_HESSIAN {
            continue;
        }

        let mut gain = split_gain(left, right, parent);
        if let Some(penalties) = penalties {
            gain -= penalties[threshold];
        }
        if gain > 0.0 && best.map_or(true, |b| gain > b.gain) {
            best = Some(SplitCandidate {
                feature,
                threshold: threshold as u32,
                gain,
            });
        }
    }
    best
}
