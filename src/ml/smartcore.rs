//! SmartCore random-forest wrapper
//!
//! The fitted forest and its metadata are persisted together as one bincode
//! blob.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ::smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use ::smartcore::linalg::basic::matrix::DenseMatrix;

use super::{
    models::Predictor, training::calculate_metrics, FeatureVector, ModelMetadata, FEATURE_COUNT,
    FEATURE_NAMES, FEATURE_SCHEMA_VERSION,
};

type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Random-forest hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: u16,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` means all of them
    pub features_per_split: Option<usize>,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
            features_per_split: None,
            seed: 42,
        }
    }
}

impl ForestParams {
    fn to_smartcore(self, n_features: usize) -> RandomForestRegressorParameters {
        RandomForestRegressorParameters {
            max_depth: Some(self.max_depth),
            min_samples_leaf: self.min_samples_leaf,
            min_samples_split: self.min_samples_split,
            n_trees: self.n_trees,
            m: Some(self.features_per_split.unwrap_or(n_features).clamp(1, n_features)),
            keep_samples: false,
            seed: self.seed,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ForestModel {
    metadata: ModelMetadata,
    forest: Forest,
}

impl ForestModel {
    /// Fits a forest on rows laid out in schema order.
    pub fn fit(
        device_id: Uuid,
        x: &[Vec<f64>],
        y: &[f64],
        params: ForestParams,
        trained_at: DateTime<Utc>,
    ) -> Result<Self> {
        if x.is_empty() {
            anyhow::bail!("cannot train on an empty dataset");
        }
        if x.len() != y.len() {
            anyhow::bail!(
                "feature and target count mismatch: {} rows, {} targets",
                x.len(),
                y.len()
            );
        }

        let n_samples = x.len();
        let mut flat = Vec::with_capacity(n_samples * FEATURE_COUNT);
        for row in x {
            if row.len() != FEATURE_COUNT {
                anyhow::bail!(
                    "feature row has {} values, expected {FEATURE_COUNT}",
                    row.len()
                );
            }
            flat.extend_from_slice(row);
        }

        let x_matrix = DenseMatrix::new(n_samples, FEATURE_COUNT, flat, false);
        let y_vec = y.to_vec();

        let forest = Forest::fit(&x_matrix, &y_vec, params.to_smartcore(FEATURE_COUNT))
            .map_err(|e| anyhow::anyhow!("random forest training failed: {:?}", e))?;

        let fitted = forest
            .predict(&x_matrix)
            .map_err(|e| anyhow::anyhow!("in-sample prediction failed: {:?}", e))?;
        let metrics = calculate_metrics(&fitted, y)?;

        let metadata = ModelMetadata {
            model_id: Uuid::new_v4(),
            device_id,
            schema_version: FEATURE_SCHEMA_VERSION,
            trained_at,
            training_samples: n_samples,
            metrics,
            params,
            feature_names: FEATURE_NAMES.iter().map(|n| n.to_string()).collect(),
        };

        Ok(Self { metadata, forest })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).context("failed to serialize model")
    }

    /// Decodes a persisted model, rejecting other feature schema versions.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let model: Self = bincode::deserialize(bytes).context("failed to deserialize model")?;
        if model.metadata.schema_version != FEATURE_SCHEMA_VERSION {
            anyhow::bail!(
                "model {} uses feature schema v{}, running v{FEATURE_SCHEMA_VERSION}",
                model.metadata.model_id,
                model.metadata.schema_version
            );
        }
        Ok(model)
    }
}

impl Predictor for ForestModel {
    fn predict(&self, features: &FeatureVector) -> Result<f64> {
        if features.len() != FEATURE_COUNT {
            anyhow::bail!(
                "feature count mismatch: expected {FEATURE_COUNT}, got {}",
                features.len()
            );
        }

        let x = DenseMatrix::new(1, FEATURE_COUNT, features.features.clone(), false);
        let predictions = self
            .forest
            .predict(&x)
            .map_err(|e| anyhow::anyhow!("prediction failed: {:?}", e))?;

        predictions
            .first()
            .copied()
            .context("model returned no prediction")
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}
