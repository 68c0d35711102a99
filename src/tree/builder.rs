use std::collections::VecDeque;

use ndarray::{ArrayView1, ArrayView2};

#[cfg(feature = "use-rayon")]
use rayon::prelude::*;

use super::flatness::FlatnessParams;
use super::histogram::{best_threshold, build_histogram, node_stats, BinStats, SplitCandidate};
use super::{Node, Tree};

/// Binned training set shared by every tree of one boosting run.
#[derive(Debug, Clone, Copy)]
pub struct BinnedData<'a> {
    pub bins: ArrayView2<'a, u32>,
    pub n_bins: &'a [usize],
    pub labels: ArrayView1<'a, bool>,
    pub weights: ArrayView1<'a, f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeParams {
    pub max_depth: usize,
    /// Features `0..n_split_features` are split candidates.
    pub n_split_features: usize,
    /// Set only when the uniformity penalty is active.
    pub flatness: Option<FlatnessParams>,
}

struct PendingNode {
    idx: usize,
    rows: Vec<usize>,
    depth: usize,
}

/// Grows one tree on weighted pseudo-residuals.
///
/// `gradients[i]` and `hessians[i]` hold the weighted pseudo-residual and
/// curvature of training row `i`; only rows handed to [`TreeBuilder::grow`]
/// are read.
///
/// `'d` borrows the binned data for the whole boosting run, `'g` the
/// gradient buffers of a single round.
pub struct TreeBuilder<'d, 'g> {
    data: BinnedData<'d>,
    params: &'g TreeParams,
    gradients: &'g [f64],
    hessians: &'g [f64],
}

impl<'d, 'g> TreeBuilder<'d, 'g> {
    pub fn new(
        data: BinnedData<'d>,
        params: &'g TreeParams,
        gradients: &'g [f64],
        hessians: &'g [f64],
    ) -> Self {
        Self {
            data,
            params,
            gradients,
            hessians,
        }
    }

    pub fn grow(&self, rows: Vec<usize>) -> Tree {
        let mut nodes = vec![Node::Leaf { value: 0.0 }];
        let mut pending = VecDeque::from([PendingNode {
            idx: 0,
            rows,
            depth: 0,
        }]);

        while let Some(PendingNode { idx, rows, depth }) = pending.pop_front() {
            let stats = node_stats(&rows, self.gradients, self.hessians);
            let leaf = Node::Leaf {
                value: leaf_value(stats),
            };

            if depth >= self.params.max_depth || rows.is_empty() || self.is_homogeneous(&rows) {
                nodes[idx] = leaf;
                continue;
            }

            let Some(split) = self.find_best_split(&rows, stats) else {
                nodes[idx] = leaf;
                continue;
            };

            let column = self.data.bins.column(split.feature);
            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
                .iter()
                .partition(|&&row| column[row] <= split.threshold);

            let left = nodes.len();
            let right = left + 1;
            nodes.push(Node::Leaf { value: 0.0 });
            nodes.push(Node::Leaf { value: 0.0 });
            nodes[idx] = Node::Split {
                feature: split.feature as u32,
                threshold: split.threshold,
                left: left as u32,
                right: right as u32,
            };

            pending.push_back(PendingNode {
                idx: left,
                rows: left_rows,
                depth: depth + 1,
            });
            pending.push_back(PendingNode {
                idx: right,
                rows: right_rows,
                depth: depth + 1,
            });
        }

        Tree::from_nodes(nodes)
    }

    fn is_homogeneous(&self, rows: &[usize]) -> bool {
        let first = self.data.labels[rows[0]];
        rows.iter().all(|&row| self.data.labels[row] == first)
    }

    /// Best split over all candidate features; ties go to the lowest feature
    /// index, then the lowest threshold.
    fn find_best_split(&self, rows: &[usize], parent: BinStats) -> Option<SplitCandidate> {
        let features = 0..self.params.n_split_features;

        #[cfg(not(feature = "use-rayon"))]
        let per_feature: Vec<Option<SplitCandidate>> = features
            .map(|feature| self.best_split_for_feature(feature, rows, parent))
            .collect();

        #[cfg(feature = "use-rayon")]
        let per_feature: Vec<Option<SplitCandidate>> = features
            .into_par_iter()
            .map(|feature| self.best_split_for_feature(feature, rows, parent))
            .collect();

        per_feature
            .into_iter()
            .flatten()
            .fold(None, |best, candidate| match best {
                Some(best) if best.gain >= candidate.gain => Some(best),
                _ => Some(candidate),
            })
    }

    fn best_split_for_feature(
        &self,
        feature: usize,
        rows: &[usize],
        parent: BinStats,
    ) -> Option<SplitCandidate> {
        let histogram = build_histogram(
            self.data.bins.column(feature),
            rows,
            self.gradients,
            self.hessians,
            self.data.n_bins[feature],
        );

        let penalties = self.params.flatness.as_ref().map(|flatness| {
            let scale = flatness.loss * parent.hess;
            let mut penalties = flatness.penalties(
                self.data.bins,
                self.data.n_bins,
                self.data.labels,
                self.data.weights,
                rows,
                feature,
            );
            penalties.iter_mut().for_each(|p| *p *= scale);
            penalties
        });

        best_threshold(feature, &histogram, parent, penalties.as_deref())
    }
}

/// Newton step for the node: weighted pseudo-residual sum over curvature sum.
fn leaf_value(stats: BinStats) -> f64 {
    if stats.hess > 0.0 {
        stats.grad / stats.hess
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, aview1, Array1};

    fn builder_fixture(max_depth: usize) -> (ndarray::Array2<u32>, Array1<bool>, Array1<f64>, TreeParams) {
        let bins = array![[0u32, 1], [1, 0], [2, 1], [3, 0]];
        let labels = array![false, false, true, true];
        let weights = Array1::ones(4);
        let params = TreeParams {
            max_depth,
            n_split_features: 2,
            flatness: None,
        };
        (bins, labels, weights, params)
    }

    #[test]
    fn test_grow_stump_splits_classes() {
        let (bins, labels, weights, params) = builder_fixture(1);
        let n_bins = [4, 2];
        let data = BinnedData {
            bins: bins.view(),
            n_bins: &n_bins,
            labels: labels.view(),
            weights: weights.view(),
        };
        let gradients = [-1.0, -1.0, 1.0, 1.0];
        let hessians = [1.0; 4];
        let tree = TreeBuilder::new(data, &params, &gradients, &hessians).grow(vec![0, 1, 2, 3]);

        assert_eq!(
            tree.nodes()[0],
            Node::Split {
                feature: 0,
                threshold: 1,
                left: 1,
                right: 2
            }
        );
        assert_relative_eq!(tree.predict_binned(aview1(&[0, 0])), -1.0);
        assert_relative_eq!(tree.predict_binned(aview1(&[3, 0])), 1.0);
    }

    #[test]
    fn test_depth_zero_is_single_leaf() {
        let (bins, labels, weights, params) = builder_fixture(0);
        let n_bins = [4, 2];
        let data = BinnedData {
            bins: bins.view(),
            n_bins: &n_bins,
            labels: labels.view(),
            weights: weights.view(),
        };
        let gradients = [-1.0, -1.0, 1.0, 2.0];
        let hessians = [1.0; 4];
        let tree = TreeBuilder::new(data, &params, &gradients, &hessians).grow(vec![0, 1, 2, 3]);

        assert_eq!(tree.nodes().len(), 1);
        assert_relative_eq!(tree.predict_binned(aview1(&[0, 0])), 0.25);
    }

    #[test]
    fn test_homogeneous_node_stays_leaf() {
        let (bins, _, weights, params) = builder_fixture(3);
        let labels = array![true, true, true, true];
        let n_bins = [4, 2];
        let data = BinnedData {
            bins: bins.view(),
            n_bins: &n_bins,
            labels: labels.view(),
            weights: weights.view(),
        };
        let gradients = [1.0, 0.5, 1.0, 0.5];
        let hessians = [1.0; 4];
        let tree = TreeBuilder::new(data, &params, &gradients, &hessians).grow(vec![0, 1, 2, 3]);
        assert_eq!(tree.n_leaves(), 1);
    }

    #[test]
    fn test_depth_bound_and_arena_order() {
        let n = 64;
        let bins = ndarray::Array2::from_shape_fn((n, 3), |(i, j)| ((i * (j + 3)) % 16) as u32);
        let labels = Array1::from_iter((0..n).map(|i| (i * 5) % 7 < 3));
        let weights = Array1::ones(n);
        let gradients: Vec<f64> = labels.iter().map(|&l| if l { 1.0 } else { -1.0 }).collect();
        let hessians = vec![1.0; n];
        let n_bins = [16, 16, 16];
        let data = BinnedData {
            bins: bins.view(),
            n_bins: &n_bins,
            labels: labels.view(),
            weights: weights.view(),
        };

        for max_depth in 0..5 {
            let params = TreeParams {
                max_depth,
                n_split_features: 3,
                flatness: None,
            };
            let tree = TreeBuilder::new(data, &params, &gradients, &hessians).grow((0..n).collect());
            assert!(tree.depth() <= max_depth);
            assert!(tree.validate(&n_bins).is_ok());
        }
    }

    #[test]
    fn test_flatness_features_excluded_and_penalty_applied() {
        // feature 1 is a perfect copy of the label but is a flatness feature
        let bins = array![[0u32, 0], [1, 0], [0, 1], [1, 1]];
        let labels = array![false, false, true, true];
        let weights = Array1::ones(4);
        let n_bins = [2, 2];
        let data = BinnedData {
            bins: bins.view(),
            n_bins: &n_bins,
            labels: labels.view(),
            weights: weights.view(),
        };
        let gradients = [-1.0, -1.0, 1.0, 1.0];
        let hessians = [1.0; 4];
        let params = TreeParams {
            max_depth: 2,
            n_split_features: 1,
            flatness: Some(FlatnessParams {
                features: vec![1],
                loss: 1.0,
            }),
        };
        let tree = TreeBuilder::new(data, &params, &gradients, &hessians).grow(vec![0, 1, 2, 3]);

        // feature 0 carries no signal, feature 1 may not be used
        assert_eq!(tree.n_leaves(), 1);
    }
    fn duplicated_columns() -> (ndarray::Array2<u32>, Array1<bool>, Array1<f64>, Vec<f64>, Vec<f64>) {
        // columns 0 and 2 are identical, so every split on 0 ties with 2
        let n = 96;
        let bins = ndarray::Array2::from_shape_fn((n, 3), |(i, j)| match j {
            1 => ((i * 7) % 16) as u32,
            _ => (i % 16) as u32,
        });
        let labels = Array1::from_iter((0..n).map(|i| i % 16 >= 6));
        let weights = Array1::ones(n);
        let gradients: Vec<f64> = labels.iter().map(|&l| if l { 1.0 } else { -1.0 }).collect();
        let hessians = vec![1.0; n];
        (bins, labels, weights, gradients, hessians)
    }

    #[test]
    fn test_ties_across_features_pick_lowest_index() {
        let (bins, labels, weights, gradients, hessians) = duplicated_columns();
        let n_bins = [16, 16, 16];
        let data = BinnedData {
            bins: bins.view(),
            n_bins: &n_bins,
            labels: labels.view(),
            weights: weights.view(),
        };
        let params = TreeParams {
            max_depth: 1,
            n_split_features: 3,
            flatness: None,
        };
        let tree = TreeBuilder::new(data, &params, &gradients, &hessians).grow((0..96).collect());
        assert_eq!(
            tree.nodes()[0],
            Node::Split {
                feature: 0,
                threshold: 5,
                left: 1,
                right: 2
            }
        );
    }

    #[cfg(feature = "use-rayon")]
    #[test]
    fn test_parallel_split_search_matches_sequential_scan() {
        let (bins, labels, weights, gradients, hessians) = duplicated_columns();
        let n_bins = [16, 16, 16];
        let data = BinnedData {
            bins: bins.view(),
            n_bins: &n_bins,
            labels: labels.view(),
            weights: weights.view(),
        };
        let params = TreeParams {
            max_depth: 3,
            n_split_features: 3,
            flatness: None,
        };
        let builder = TreeBuilder::new(data, &params, &gradients, &hessians);

        let subsets: [Vec<usize>; 3] = [
            (0..96).collect(),
            (0..96).step_by(2).collect(),
            (0..96).filter(|i| i % 3 != 1).collect(),
        ];
        for rows in subsets {
            let parent = node_stats(&rows, &gradients, &hessians);
            let sequential = (0..3)
                .filter_map(|feature| builder.best_split_for_feature(feature, &rows, parent))
                .fold(None, |best: Option<SplitCandidate>, candidate| match best {
                    Some(best) if best.gain >= candidate.gain => Some(best),
                    _ => Some(candidate),
                });
            assert_eq!(builder.find_best_split(&rows, parent), sequential);
        }
    }
}
