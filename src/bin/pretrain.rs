//! Offline training: ingest, build features, fit, and write the artifact
//! the service picks up through MODEL_PATH.

use aqi_forecast::artifact::ModelArtifact;
use aqi_forecast::ingest::{JsonFileSource, ReadingSource};
use aqi_forecast::{build_features, trainer, ServiceConfig};
use anyhow::Context;
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "aqi_forecast=info".into()),
        )
        .init();

    let cfg = ServiceConfig::from_env()?;
    let data_path = cfg.data_path.clone().context("DATA_PATH not set")?;
    let out = cfg
        .model_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("model_artifact.json"));

    let raw = JsonFileSource::new(&data_path).fetch(cfg.max_rows)?;
    let table = build_features(&raw, &cfg.pipeline)?;
    let trained = trainer::train(&table, &cfg.pipeline, &cfg.forest)?;
    tracing::info!(metrics = ?trained.metrics, "training finished");

    ModelArtifact::from_trained(trained).save(&out)?;
    tracing::info!(path = %out.display(), "wrote model artifact");
    Ok(())
}
