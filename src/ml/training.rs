//! Model training pipeline

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::{ForestModel, ForestParams, Predictor, TrainingSample, ValidationMetrics};
use crate::error::{IrrigationError, IrrigationResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub params: ForestParams,
    /// Fewer labelled days than this is rejected
    pub min_samples: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            params: ForestParams::default(),
            min_samples: 10,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelTrainer {
    config: TrainingConfig,
}

impl ModelTrainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Fits a fresh model on the samples. CPU bound; callers on the async
    /// runtime run it through `spawn_blocking`.
    pub fn train(
        &self,
        device_id: Uuid,
        samples: &[TrainingSample],
        trained_at: DateTime<Utc>,
    ) -> IrrigationResult<ForestModel> {
        if samples.len() < self.config.min_samples {
            return Err(IrrigationError::InsufficientTrainingData {
                device_id,
                available: samples.len(),
                required: self.config.min_samples,
            });
        }

        let x: Vec<Vec<f64>> = samples.iter().map(|s| s.features.features.clone()).collect();
        let y: Vec<f64> = samples.iter().map(|s| s.label).collect();

        let model = ForestModel::fit(device_id, &x, &y, self.config.params, trained_at)
            .map_err(IrrigationError::model)?;

        let metrics = model.metadata().metrics;
        info!(
            %device_id,
            samples = samples.len(),
            mae = metrics.mae,
            rmse = metrics.rmse,
            r2 = metrics.r2,
            "model trained"
        );
        Ok(model)
    }
}

/// MAE, RMSE and R² of predictions against targets.
pub fn calculate_metrics(predictions: &[f64], targets: &[f64]) -> Result<ValidationMetrics> {
    if predictions.len() != targets.len() {
        anyhow::bail!("prediction and target count mismatch");
    }
    if predictions.is_empty() {
        anyhow::bail!("no predictions to evaluate");
    }

    let n = predictions.len() as f64;
    let pairs = || predictions.iter().zip(targets.iter());

    let mae = pairs().map(|(p, t)| (p - t).abs()).sum::<f64>() / n;
    let mse = pairs().map(|(p, t)| (p - t).powi(2)).sum::<f64>() / n;

    let mean_target = targets.iter().sum::<f64>() / n;
    let ss_tot: f64 = targets.iter().map(|t| (t - mean_target).powi(2)).sum();
    let ss_res: f64 = pairs().map(|(p, t)| (t - p).powi(2)).sum();
    let r2 = if ss_tot.abs() < 1e-10 {
        0.0
    } else {
        1.0 - ss_res / ss_tot
    };

    Ok(ValidationMetrics {
        mae,
        rmse: mse.sqrt(),
        r2,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::water_deficit;
    use crate::ml::{feature_index, FeatureVector, FEATURE_COUNT};
    use chrono::{Duration, NaiveDate};

    const TARGET: f64 = 60.0;

    fn row(soil_moisture: f64, rainfall: f64) -> Vec<f64> {
        let mut row = vec![0.0; FEATURE_COUNT];
        let mut set = |name: &str, value: f64| row[feature_index(name).unwrap()] = value;
        set("temperature_1h", 29.0);
        set("humidity_1h", 75.0);
        set("soil_moisture_1h", soil_moisture);
        set("light_1h", 400.0);
        set("temperature_1d", 28.0);
        set("humidity_1d", 78.0);
        set("soil_moisture_1d", soil_moisture);
        set("light_1d", 350.0);
        set("temperature_1w", 28.0);
        set("humidity_1w", 80.0);
        set("soil_moisture_1w", soil_moisture);
        set("light_1w", 330.0);
        set("forecast_rainfall_mm", rainfall);
        set("forecast_temperature_c", 30.0);
        set("target_soil_moisture", TARGET);
        row
    }

    fn synthetic_samples() -> Vec<TrainingSample> {
        let base = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let mut samples = Vec::new();
        for sm in (20..=70).step_by(2) {
            for rain in 0..=10 {
                let (sm, rain) = (sm as f64, rain as f64);
                samples.push(TrainingSample {
                    date: base + Duration::days(samples.len() as i64),
                    features: FeatureVector::new(row(sm, rain), vec![]).unwrap(),
                    label: water_deficit(TARGET, sm, rain),
                });
            }
        }
        samples
    }

    #[test]
    fn test_learns_the_deficit_rule() {
        let trainer = ModelTrainer::new(TrainingConfig {
            params: ForestParams {
                n_trees: 30,
                ..ForestParams::default()
            },
            min_samples: 10,
        });
        let model = trainer
            .train(Uuid::new_v4(), &synthetic_samples(), Utc::now())
            .unwrap();

        let probe = FeatureVector::new(row(40.0, 5.0), vec![]).unwrap();
        let predicted = model.predict(&probe).unwrap();
        assert!(
            (predicted - 15.0).abs() <= 3.0,
            "predicted {predicted}, expected 15 ± 3"
        );

        let saturated = FeatureVector::new(row(70.0, 10.0), vec![]).unwrap();
        assert!(model.predict(&saturated).unwrap() < 3.0);
    }

    #[test]
    fn test_rejects_too_few_samples() {
        let trainer = ModelTrainer::default();
        let samples: Vec<_> = synthetic_samples().into_iter().take(9).collect();
        let device_id = Uuid::new_v4();

        let err = trainer.train(device_id, &samples, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            IrrigationError::InsufficientTrainingData {
                available: 9,
                required: 10,
                ..
            }
        ));
    }

    #[test]
    fn test_calculate_metrics() {
        let predictions = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let targets = vec![1.1, 2.1, 2.9, 4.2, 4.8];

        let metrics = calculate_metrics(&predictions, &targets).unwrap();

        assert!(metrics.mae < 0.3);
        assert!(metrics.rmse < 0.4);
        assert!(metrics.r2 > 0.9);
        assert!(calculate_metrics(&[], &[]).is_err());
        assert!(calculate_metrics(&[1.0], &[1.0, 2.0]).is_err());
    }
}
