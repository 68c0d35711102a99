//! Uniformity penalty for uniform boosting.
//!
//! A split is penalised when, for either class, the distribution of a child
//! over the bins of a flatness feature drifts away from the parent's
//! distribution. The drift is the L1 distance between the two cumulative
//! distributions averaged over the flatness feature's bins, weighted by the
//! child's share of the class weight.

use ndarray::{ArrayView1, ArrayView2};

/// Flatness features are never used as split candidates.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatnessParams {
    /// Column indices of the flatness features.
    pub features: Vec<usize>,
    /// Strength of the penalty relative to the node's curvature sum.
    pub loss: f64,
}

impl FlatnessParams {
    /// Penalty per threshold of `feature` for a node holding `rows`.
    ///
    /// Entry `t` refers to the split `bin <= t`; the result has
    /// `n_feature_bins - 1` entries and is not yet scaled by `loss`.
    /// Memory stays linear in the bin counts: rows are visited in split-bin
    /// order while one running histogram tracks the left child.
    pub(crate) fn penalties(
        &self,
        bins: ArrayView2<u32>,
        n_bins: &[usize],
        labels: ArrayView1<bool>,
        weights: ArrayView1<f64>,
        rows: &[usize],
        feature: usize,
    ) -> Vec<f64> {
        let n_thresholds = n_bins[feature].saturating_sub(1);
        let mut penalties = vec![0.0; n_thresholds];

        for &flat in &self.features {
            for class in [false, true] {
                let mut cells: Vec<FlatCell> = rows
                    .iter()
                    .filter(|&&row| labels[row] == class)
                    .map(|&row| FlatCell {
                        split_bin: bins[[row, feature]],
                        flat_bin: bins[[row, flat]],
                        weight: weights[row],
                    })
                    .collect();
                cells.sort_by_key(|cell| cell.split_bin);
                accumulate_class_penalty(&cells, n_bins[flat], &mut penalties);
            }
        }
        penalties
    }
}

/// One row of a single class, seen through the split and flatness features.
#[derive(Debug, Clone, Copy)]
struct FlatCell {
    split_bin: u32,
    flat_bin: u32,
    weight: f64,
}

/// Adds the cumulative-distribution drift of one class and one flatness
/// feature to `penalties`. `cells` must be sorted by split bin.
fn accumulate_class_penalty(cells: &[FlatCell], n_flat_bins: usize, penalties: &mut [f64]) {
    let mut parent = vec![0.0; n_flat_bins];
    for cell in cells {
        parent[cell.flat_bin as usize] += cell.weight;
    }
    let total: f64 = parent.iter().sum();
    if total <= 0.0 {
        return;
    }
    let parent_cdf = cumulative(&parent);
    let parent_norm: Vec<f64> = parent_cdf.iter().map(|c| c / total).collect();

    let mut left = vec![0.0; n_flat_bins];
    let mut next = 0;
    let mut drift = 0.0;
    let mut stale = true;
    for (threshold, penalty) in penalties.iter_mut().enumerate() {
        while let Some(cell) = cells.get(next).filter(|cell| cell.split_bin as usize <= threshold) {
            left[cell.flat_bin as usize] += cell.weight;
            next += 1;
            stale = true;
        }
        // thresholds between occupied split bins share the previous partition
        if stale {
            drift = partition_drift(&left, &parent_cdf, &parent_norm, total);
            stale = false;
        }
        *penalty += drift;
    }
}

/// Child-share weighted drift of the partition whose left child holds `left`.
fn partition_drift(left: &[f64], parent_cdf: &[f64], parent_norm: &[f64], total: f64) -> f64 {
    let left_cdf = cumulative(left);
    let left_total = left_cdf[left_cdf.len() - 1];
    let right_total = total - left_total;

    let mut drift = 0.0;
    if left_total > 0.0 {
        drift += left_total * mean_abs_diff(left_cdf.iter().map(|c| c / left_total), parent_norm);
    }
    if right_total > total * 1e-12 {
        let right_cdf = parent_cdf.iter().zip(&left_cdf).map(|(p, l)| (p - l) / right_total);
        drift += right_total * mean_abs_diff(right_cdf, parent_norm);
    }
    drift / total
}

fn cumulative(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .scan(0.0, |acc, &v| {
            *acc += v;
            Some(*acc)
        })
        .collect()
}

fn mean_abs_diff(cdf: impl Iterator<Item = f64>, reference: &[f64]) -> f64 {
    let sum: f64 = cdf.zip(reference).map(|(a, b)| (a - b).abs()).sum();
    sum / reference.len() as f64
}
