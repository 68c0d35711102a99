use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

pub mod builder;
mod flatness;
mod histogram;

pub use builder::{BinnedData, TreeBuilder, TreeParams};
pub use flatness::FlatnessParams;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Rows with `bin <= threshold` on `feature` go left, the rest go right.
    Split {
        feature: u32,
        threshold: u32,
        left: u32,
        right: u32,
    },
    Leaf { value: f64 },
}

/// A decision tree stored as a flat arena. Node 0 is the root and children
/// always live at higher indices than their parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn leaf(value: f64) -> Self {
        Self {
            nodes: vec![Node::Leaf { value }],
        }
    }

    pub(crate) fn from_nodes(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node, Node::Leaf { .. }))
            .count()
    }

    /// Length of the longest root-to-leaf path, in edges.
    pub fn depth(&self) -> usize {
        let mut depths = vec![0usize; self.nodes.len()];
        let mut max_depth = 0;
        for (idx, node) in self.nodes.iter().enumerate() {
            max_depth = max_depth.max(depths[idx]);
            if let Node::Split { left, right, .. } = *node {
                depths[left as usize] = depths[idx] + 1;
                depths[right as usize] = depths[idx] + 1;
            }
        }
        max_depth
    }

    /// Walks the tree for one binned row.
    #[inline]
    pub fn predict_binned(&self, row: ArrayView1<u32>) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[feature as usize] <= threshold {
                        left as usize
                    } else {
                        right as usize
                    };
                }
                Node::Leaf { value } => return value,
            }
        }
    }

    /// Checks the arena invariants against the binning it will be used with.
    pub(crate) fn validate(&self, n_bins: &[usize]) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".into());
        }
        let mut referenced = vec![false; self.nodes.len()];
        for (idx, node) in self.nodes.iter().enumerate() {
            match *node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let bins = n_bins
                        .get(feature as usize)
                        .ok_or_else(|| format!("node {idx} splits on unknown feature {feature}"))?;
                    if threshold as usize >= *bins {
                        return Err(format!("node {idx} threshold {threshold} out of range"));
                    }
                    for child in [left, right] {
                        let child = child as usize;
                        if child <= idx || child >= self.nodes.len() {
                            return Err(format!("node {idx} has invalid child {child}"));
                        }
                        if std::mem::replace(&mut referenced[child], true) {
                            return Err(format!("node {child} has more than one parent"));
                        }
                    }
                }
                Node::Leaf { value } => {
                    if !value.is_finite() {
                        return Err(format!("leaf {idx} has non-finite value"));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::aview1;

    fn stump() -> Tree {
        Tree::from_nodes(vec![
            Node::Split {
                feature: 1,
                threshold: 3,
                left: 1,
                right: 2,
            },
            Node::Leaf { value: -1.0 },
            Node::Leaf { value: 2.0 },
        ])
    }

    #[test]
    fn test_predict_binned() {
        let tree = stump();
        assert_eq!(tree.predict_binned(aview1(&[9, 3])), -1.0);
        assert_eq!(tree.predict_binned(aview1(&[0, 4])), 2.0);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(Tree::leaf(0.5).depth(), 0);
    }

    #[test]
    fn test_validate() {
        assert!(stump().validate(&[4, 4]).is_ok());
        assert!(stump().validate(&[4, 3]).is_err());
        assert!(stump().validate(&[4]).is_err());

        let cyclic = Tree::from_nodes(vec![
            Node::Split {
                feature: 0,
                threshold: 0,
                left: 0,
                right: 1,
            },
            Node::Leaf { value: 0.0 },
        ]);
        assert!(cyclic.validate(&[2]).is_err());

        let shared = Tree::from_nodes(vec![
            Node::Split {
                feature: 0,
                threshold: 0,
                left: 1,
                right: 1,
            },
            Node::Leaf { value: 0.0 },
        ]);
        assert!(shared.validate(&[2]).is_err());
        assert!(Tree::from_nodes(vec![]).validate(&[2]).is_err());
    }
}
