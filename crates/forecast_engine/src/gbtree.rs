//! Gradient-boosted tree ensemble read from an XGBoost JSON dump.
//!
//! The file is either the bare array written by
//! `booster.dump_model(path, dump_format="json")` or an object
//! `{"base_score": .., "feature_names": [..], "trees": [..]}`.
//! Prediction is `base_score + Σ leaf` (the `reg:squarederror` link).

use std::collections::HashMap;
use std::path::Path;

use common::{Error, Result};
use ndarray::ArrayView1;
use serde::Deserialize;

use crate::model::ReturnRegressor;

const DEFAULT_BASE_SCORE: f64 = 0.5;

#[derive(Debug, Clone, Deserialize)]
struct RawNode {
    nodeid: usize,
    #[serde(default)]
    split: Option<String>,
    #[serde(default)]
    split_condition: Option<f64>,
    #[serde(default)]
    yes: Option<usize>,
    #[serde(default)]
    no: Option<usize>,
    #[serde(default)]
    missing: Option<usize>,
    #[serde(default)]
    leaf: Option<f64>,
    #[serde(default)]
    children: Vec<RawNode>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DumpFile {
    Wrapped {
        #[serde(default = "default_base_score")]
        base_score: f64,
        #[serde(default)]
        feature_names: Option<Vec<String>>,
        trees: Vec<RawNode>,
    },
    Bare(Vec<RawNode>),
}

fn default_base_score() -> f64 {
    DEFAULT_BASE_SCORE
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        yes: usize,
        no: usize,
        missing: usize,
    },
    Leaf(f64),
}

/// One regression tree, nodes indexed by `nodeid`.
#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn from_raw(root: RawNode, names: &HashMap<String, usize>, tree_idx: usize) -> Result<Self> {
        let mut slots: Vec<Option<Node>> = Vec::new();
        let mut stack = vec![root];

        while let Some(raw) = stack.pop() {
            let id = raw.nodeid;
            let node = match raw.leaf {
                Some(value) => Node::Leaf(value),
                None => {
                    let bad = |what: &str| {
                        Error::Model(format!("tree {tree_idx} node {id}: missing {what}"))
                    };
                    let split = raw.split.as_deref().ok_or_else(|| bad("split"))?;
                    let yes = raw.yes.ok_or_else(|| bad("yes"))?;
                    let no = raw.no.ok_or_else(|| bad("no"))?;
                    Node::Split {
                        feature: resolve_feature(split, names).ok_or_else(|| {
                            Error::Model(format!(
                                "tree {tree_idx} node {id}: unknown feature {split:?}"
                            ))
                        })?,
                        threshold: raw.split_condition.ok_or_else(|| bad("split_condition"))?,
                        yes,
                        no,
                        missing: raw.missing.unwrap_or(yes),
                    }
                }
            };

            if slots.len() <= id {
                slots.resize(id + 1, None);
            }
            if slots[id].replace(node).is_some() {
                return Err(Error::Model(format!(
                    "tree {tree_idx}: duplicate node id {id}"
                )));
            }
            stack.extend(raw.children);
        }

        let nodes = slots
            .into_iter()
            .enumerate()
            .map(|(id, n)| {
                n.ok_or_else(|| Error::Model(format!("tree {tree_idx}: node {id} missing")))
            })
            .collect::<Result<Vec<_>>>()?;

        for node in &nodes {
            if let Node::Split {
                yes, no, missing, ..
            } = node
            {
                if [*yes, *no, *missing].iter().any(|c| *c >= nodes.len()) {
                    return Err(Error::Model(format!(
                        "tree {tree_idx}: child id out of range"
                    )));
                }
            }
        }

        Ok(Self { nodes })
    }

    fn leaf_value(&self, features: ArrayView1<'_, f64>) -> Result<f64> {
        let mut id = 0;
        // A well-formed tree reaches a leaf in at most `nodes.len()` hops.
        for _ in 0..=self.nodes.len() {
            match &self.nodes[id] {
                Node::Leaf(v) => return Ok(*v),
                Node::Split {
                    feature,
                    threshold,
                    yes,
                    no,
                    missing,
                } => {
                    let x = *features.get(*feature).ok_or_else(|| {
                        Error::shape(
                            format!("at least {} features", feature + 1),
                            format!("{}", features.len()),
                        )
                    })?;
                    id = if x.is_nan() {
                        *missing
                    } else if x < *threshold {
                        *yes
                    } else {
                        *no
                    };
                }
            }
        }
        Err(Error::Model("tree walk did not terminate".into()))
    }

    fn max_feature(&self) -> Option<usize> {
        self.nodes
            .iter()
            .filter_map(|n| match n {
                Node::Split { feature, .. } => Some(*feature),
                Node::Leaf(_) => None,
            })
            .max()
    }
}

fn resolve_feature(split: &str, names: &HashMap<String, usize>) -> Option<usize> {
    names.get(split).copied().or_else(|| {
        split
            .strip_prefix('f')
            .and_then(|idx| idx.parse::<usize>().ok())
    })
}

/// Boosted ensemble of regression trees.
#[derive(Debug, Clone)]
pub struct TreeEnsemble {
    base_score: f64,
    trees: Vec<Tree>,
}

impl TreeEnsemble {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let (base_score, feature_names, roots) = match serde_json::from_str::<DumpFile>(raw)? {
            DumpFile::Wrapped {
                base_score,
                feature_names,
                trees,
            } => (base_score, feature_names.unwrap_or_default(), trees),
            DumpFile::Bare(trees) => (DEFAULT_BASE_SCORE, Vec::new(), trees),
        };
        if roots.is_empty() {
            return Err(Error::Model("ensemble has no trees".into()));
        }

        let names: HashMap<String, usize> = feature_names
            .into_iter()
            .enumerate()
            .map(|(i, n)| (n, i))
            .collect();
        let trees = roots
            .into_iter()
            .enumerate()
            .map(|(i, root)| Tree::from_raw(root, &names, i))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { base_score, trees })
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }
}

impl ReturnRegressor for TreeEnsemble {
    fn predict(&self, features: ArrayView1<'_, f64>) -> Result<f64> {
        let mut sum = self.base_score;
        for tree in &self.trees {
            sum += tree.leaf_value(features)?;
        }
        Ok(sum)
    }

    fn max_feature_index(&self) -> Option<usize> {
        self.trees.iter().filter_map(Tree::max_feature).max()
    }
}
