//! Process-wide trained state: built once, shared read-only by handlers.

use crate::artifact::ModelArtifact;
use crate::config::{ForestConfig, PipelineConfig};
use crate::error::Result;
use crate::forecast::ForecastEngine;
use crate::model::Regressor;
use crate::pipeline::{build_features, FeatureTable};
use crate::schema::FeatureSchema;
use crate::trainer::{self, TrainingMetrics};
use crate::types::RawTable;
use parking_lot::RwLock;
use std::sync::Arc;

/// Immutable snapshot of everything a forecast needs.
pub struct TrainedState {
    pub table: FeatureTable,
    pub schema: FeatureSchema,
    pub model: Arc<dyn Regressor>,
    pub metrics: Option<TrainingMetrics>,
}

impl TrainedState {
    /// Validates that `schema` can be fed from `table`.
    pub fn new(
        table: FeatureTable,
        schema: FeatureSchema,
        model: Arc<dyn Regressor>,
        metrics: Option<TrainingMetrics>,
    ) -> Result<Self> {
        schema.validate_table(&table)?;
        Ok(Self {
            table,
            schema,
            model,
            metrics,
        })
    }

    pub fn rows(&self) -> usize {
        self.table.len()
    }

    pub fn engine(&self) -> ForecastEngine<'_> {
        ForecastEngine::new(&self.table, self.model.as_ref(), &self.schema)
    }
}

/// Build features and train from scratch.
pub fn train_state(raw: &RawTable, pipeline: &PipelineConfig, forest: &ForestConfig) -> Result<TrainedState> {
    let table = build_features(raw, pipeline)?;
    let trained = trainer::train(&table, pipeline, forest)?;
    TrainedState::new(
        table,
        trained.schema,
        Arc::new(trained.model),
        Some(trained.metrics),
    )
}

/// Build features for lag history, but take model and schema from a saved
/// artifact. The artifact's target and lag layout win over `pipeline`.
pub fn state_from_artifact(raw: &RawTable, pipeline: &PipelineConfig, artifact: ModelArtifact) -> Result<TrainedState> {
    let pipeline = PipelineConfig {
        target: artifact.schema.target.clone(),
        lags: artifact.schema.lags.clone(),
        ..pipeline.clone()
    };
    let table = build_features(raw, &pipeline)?;
    TrainedState::new(
        table,
        artifact.schema,
        Arc::new(artifact.forest),
        Some(artifact.metrics),
    )
}

/// Shared slot for the current `TrainedState`. Readers clone the `Arc` and
/// drop the lock before doing any work; `install` swaps the whole snapshot.
#[derive(Clone, Default)]
pub struct StateHolder {
    inner: Arc<RwLock<Option<Arc<TrainedState>>>>,
}

impl StateHolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Option<Arc<TrainedState>> {
        self.inner.read().clone()
    }

    pub fn install(&self, state: TrainedState) {
        let rows = state.rows();
        *self.inner.write() = Some(Arc::new(state));
        tracing::info!(rows, "trained state installed");
    }
}
