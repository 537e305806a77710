//! Oblivious decision-tree ensembles read from the project's JSON artifact.
//!
//! Every tree applies one split per level to all nodes of that level, so a
//! tree of depth `d` is just `d` splits and `2^d` leaf values. The leaf index
//! is built from the split outcomes with split `i` contributing bit `i`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::errors::{SayariceError, SayariceResult};
use crate::predictor::contract::{FeatureContract, FeatureKind, ModelInput, ModelValue};

/// Deeper trees than this are rejected as corrupt.
pub const MAX_TREE_DEPTH: usize = 16;

// ---------------------------------------------------------------------------
// Artifact format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SplitSpec {
    /// True when the value is strictly greater than `border`. Missing is false.
    Border { feature: String, border: f64 },
    /// True when the category text equals `category`.
    Category { feature: String, category: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSpec {
    pub splits: Vec<SplitSpec>,
    pub leaf_values: Vec<f64>,
}

fn default_scale() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleArtifact {
    pub trees: Vec<TreeSpec>,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub bias: f64,
}

// ---------------------------------------------------------------------------
// Bound ensemble
// ---------------------------------------------------------------------------

/// Anything that maps a prepared feature vector to a log-price.
pub trait LogPriceModel: Send + Sync {
    fn predict_log_price(&self, input: &ModelInput) -> SayariceResult<f64>;

    /// Identifies the artifact in the prediction log.
    fn fingerprint(&self) -> Option<&str> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
enum BoundSplit {
    Border { index: usize, border: f64 },
    Category { index: usize, category: String },
}

#[derive(Debug, Clone, PartialEq)]
struct BoundTree {
    splits: Vec<BoundSplit>,
    leaf_values: Vec<f64>,
}

/// An ensemble whose splits have been resolved to contract positions.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeEnsemble {
    trees: Vec<BoundTree>,
    scale: f64,
    bias: f64,
    width: usize,
    sha256: String,
}

impl TreeEnsemble {
    /// Read, fingerprint, parse, and bind an artifact file.
    pub fn load(path: impl AsRef<Path>, contract: &FeatureContract) -> SayariceResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            SayariceError::Model(format!(
                "{} model not readable at {}: {}",
                contract.powertrain,
                path.display(),
                e
            ))
        })?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let sha256 = format!("{:x}", hasher.finalize());

        let artifact: EnsembleArtifact = serde_json::from_slice(&bytes).map_err(|e| {
            SayariceError::Model(format!("{} is not a valid model artifact: {}", path.display(), e))
        })?;
        let ensemble = Self::bind(&artifact, contract, sha256)?;
        info!(
            "Loaded {} model from {} ({} trees, sha256={})",
            contract.powertrain,
            path.display(),
            ensemble.trees.len(),
            &ensemble.sha256[..12]
        );
        Ok(ensemble)
    }

    /// Resolve every split feature against `contract` and check tree shapes.
    pub fn bind(
        artifact: &EnsembleArtifact,
        contract: &FeatureContract,
        sha256: String,
    ) -> SayariceResult<Self> {
        if !artifact.scale.is_finite() || !artifact.bias.is_finite() {
            return Err(SayariceError::Model("scale and bias must be finite".to_string()));
        }

        let mut trees = Vec::with_capacity(artifact.trees.len());
        for (t, tree) in artifact.trees.iter().enumerate() {
            let depth = tree.splits.len();
            if depth > MAX_TREE_DEPTH {
                return Err(SayariceError::Model(format!(
                    "tree {t} has depth {depth}, limit is {MAX_TREE_DEPTH}"
                )));
            }
            if tree.leaf_values.len() != 1usize << depth {
                return Err(SayariceError::Model(format!(
                    "tree {t} has {} leaves, depth {depth} needs {}",
                    tree.leaf_values.len(),
                    1usize << depth
                )));
            }
            if tree.leaf_values.iter().any(|v| !v.is_finite()) {
                return Err(SayariceError::Model(format!("tree {t} has a non-finite leaf")));
            }

            let splits = tree
                .splits
                .iter()
                .map(|split| bind_split(split, contract))
                .collect::<SayariceResult<Vec<_>>>()?;
            trees.push(BoundTree {
                splits,
                leaf_values: tree.leaf_values.clone(),
            });
        }

        Ok(Self {
            trees,
            scale: artifact.scale,
            bias: artifact.bias,
            width: contract.len(),
            sha256,
        })
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

fn bind_split(split: &SplitSpec, contract: &FeatureContract) -> SayariceResult<BoundSplit> {
    let (feature, wanted) = match split {
        SplitSpec::Border { feature, .. } => (feature, FeatureKind::Numeric),
        SplitSpec::Category { feature, .. } => (feature, FeatureKind::Categorical),
    };
    let index = contract.index_of(feature).ok_or_else(|| {
        SayariceError::Model(format!(
            "model splits on '{feature}', which the {} feature list does not contain",
            contract.powertrain
        ))
    })?;
    if contract.kind(feature) != wanted {
        return Err(SayariceError::Model(format!(
            "model treats '{feature}' as {wanted:?}, the feature list says {:?}",
            contract.kind(feature)
        )));
    }
    Ok(match split {
        SplitSpec::Border { border, .. } => BoundSplit::Border {
            index,
            border: *border,
        },
        SplitSpec::Category { category, .. } => BoundSplit::Category {
            index,
            category: category.clone(),
        },
    })
}

impl BoundTree {
    fn leaf(&self, input: &ModelInput) -> f64 {
        let mut leaf = 0usize;
        for (bit, split) in self.splits.iter().enumerate() {
            let goes_right = match split {
                BoundSplit::Border { index, border } => {
                    matches!(input.get(*index), Some(ModelValue::Number(Some(v))) if v > border)
                }
                BoundSplit::Category { index, category } => {
                    matches!(input.get(*index), Some(ModelValue::Category(c)) if c == category)
                }
            };
            if goes_right {
                leaf |= 1 << bit;
            }
        }
        self.leaf_values[leaf]
    }
}

impl LogPriceModel for TreeEnsemble {
    fn predict_log_price(&self, input: &ModelInput) -> SayariceResult<f64> {
        if input.len() != self.width {
            return Err(SayariceError::Model(format!(
                "expected {} features, got {}",
                self.width,
                input.len()
            )));
        }
        let sum: f64 = self.trees.iter().map(|tree| tree.leaf(input)).sum();
        Ok(self.scale * sum + self.bias)
    }

    fn fingerprint(&self) -> Option<&str> {
        Some(&self.sha256)
    }
}
