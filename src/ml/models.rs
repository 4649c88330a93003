use super::{FeatureVector, ModelMetadata};
use anyhow::Result;

/// A trained water-deficit model
pub trait Predictor: Send + Sync {
    /// Predicted water deficit for one feature vector.
    fn predict(&self, features: &FeatureVector) -> Result<f64>;

    fn metadata(&self) -> &ModelMetadata;
}
