//! Serialized model + schema, written by the offline `pretrain` binary and
//! optionally loaded by the service instead of training at startup.

use crate::model::RandomForest;
use crate::schema::FeatureSchema;
use crate::trainer::{TrainedModel, TrainingMetrics};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub schema: FeatureSchema,
    pub forest: RandomForest,
    pub metrics: TrainingMetrics,
    pub trained_at: DateTime<Utc>,
}

impl ModelArtifact {
    pub fn from_trained(trained: TrainedModel) -> Self {
        Self {
            schema: trained.schema,
            forest: trained.model,
            metrics: trained.metrics,
            trained_at: Utc::now(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let txt = serde_json::to_string(self).context("failed to serialize model artifact")?;
        fs::write(path, txt).with_context(|| format!("failed to write artifact to {}", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let txt = fs::read_to_string(path)
            .with_context(|| format!("failed to read artifact at {}", path.display()))?;
        let artifact: Self = serde_json::from_str(&txt)
            .with_context(|| format!("failed to parse artifact {}", path.display()))?;

        if !artifact.forest.is_fitted() {
            bail!("artifact {} holds an unfitted model", path.display());
        }
        if artifact.forest.n_features() != artifact.schema.width() {
            bail!(
                "artifact {}: model expects {} features but schema lists {}",
                path.display(),
                artifact.forest.n_features(),
                artifact.schema.width()
            );
        }
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ForestConfig;
    use crate::model::Regressor;
    use std::collections::BTreeMap;

    fn artifact(width: usize) -> ModelArtifact {
        let x: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64, (i % 4) as f64]).collect();
        let y: Vec<f64> = (0..40).map(|i| if i < 20 { 1.0 } else { 5.0 }).collect();
        let mut forest = RandomForest::new(&ForestConfig {
            n_trees: 3,
            ..ForestConfig::default()
        });
        forest.fit(&x, &y).unwrap();
        ModelArtifact {
            schema: FeatureSchema {
                target: "PM25".into(),
                columns: (0..width).map(|i| format!("f{}", i)).collect(),
                stations: vec![],
                lags: vec![],
                defaults: BTreeMap::new(),
            },
            forest,
            metrics: TrainingMetrics {
                target: "PM25".into(),
                train_rows: 40,
                test_rows: 0,
                test_year: None,
                train_r2: Some(0.9),
                test_r2: None,
                rmse: None,
            },
            trained_at: Utc::now(),
        }
    }

    #[test]
    fn test_save_then_load() {
        let path = std::env::temp_dir().join(format!("aqi_artifact_{}.json", std::process::id()));
        let saved = artifact(2);
        saved.save(&path).unwrap();
        let loaded = ModelArtifact::load(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(loaded.schema, saved.schema);
        assert_eq!(loaded.metrics, saved.metrics);
        for row in [[3.0, 1.0], [35.0, 2.0]] {
            let a = saved.forest.predict_row(&row).unwrap();
            let b = loaded.forest.predict_row(&row).unwrap();
            assert!((a - b).abs() < 1e-9, "{} vs {}", a, b);
        }
        println!("✓ Artifact reloaded, {} features", loaded.forest.n_features());
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let path = std::env::temp_dir().join(format!("aqi_artifact_bad_{}.json", std::process::id()));
        artifact(3).save(&path).unwrap();
        let err = ModelArtifact::load(&path);
        let _ = fs::remove_file(&path);
        assert!(err.is_err());
    }
}
