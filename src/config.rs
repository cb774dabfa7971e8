use anyhow::{Context, Result};
use serde::Deserialize;
use std::{env, fs, net::SocketAddr, path::PathBuf};

pub const DEFAULT_TARGET: &str = "PM25";

/// Settings for the feature pipeline.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Canonical name of the pollutant being predicted.
    pub target: String,
    /// How many later years the gap filler may look ahead.
    pub max_years: i32,
    /// Lag offsets in hours, as (column name, hours).
    pub lags: Vec<(String, i64)>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.to_string(),
            max_years: 7,
            lags: vec![
                ("lag_1d".to_string(), 24),
                ("lag_2d".to_string(), 48),
                ("lag_3d".to_string(), 72),
            ],
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &str) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read pipeline config at {}", path))?;
        serde_json::from_str(&data).with_context(|| format!("invalid pipeline config JSON in {}", path))
    }
}

/// Hyperparameters for the random forest regressor.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: 12,
            min_samples_leaf: 2,
            seed: 42,
        }
    }
}

/// Process-level settings, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub data_path: Option<PathBuf>,
    pub max_rows: usize,
    pub model_path: Option<PathBuf>,
    pub max_forecast_hours: usize,
    pub log_forecast: bool,
    pub pipeline: PipelineConfig,
    pub forest: ForestConfig,
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_path(name: &str) -> Option<PathBuf> {
    env::var(name).ok().filter(|v| !v.trim().is_empty()).map(PathBuf::from)
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        let port = match env::var("PORT") {
            Ok(p) => p.parse::<u16>().with_context(|| format!("PORT must be a valid number, got {:?}", p))?,
            Err(_) => 8000,
        };

        let mut pipeline = match env::var("PIPELINE_CONFIG") {
            Ok(path) => PipelineConfig::load(&path)?,
            Err(_) => PipelineConfig::default(),
        };
        if let Ok(target) = env::var("TARGET_COLUMN") {
            pipeline.target = target;
        }

        let defaults = ForestConfig::default();
        let forest = ForestConfig {
            n_trees: env_usize("FOREST_TREES", defaults.n_trees),
            max_depth: env_usize("FOREST_MAX_DEPTH", defaults.max_depth),
            min_samples_leaf: env_usize("FOREST_MIN_LEAF", defaults.min_samples_leaf),
            seed: env_u64("FOREST_SEED", defaults.seed),
        };

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            data_path: env_path("DATA_PATH"),
            max_rows: env_usize("MAX_ROWS", 50_000),
            model_path: env_path("MODEL_PATH"),
            max_forecast_hours: env_usize("MAX_FORECAST_HOURS", 720),
            log_forecast: env::var("LOG_FORECAST").ok().as_deref() == Some("1"),
            pipeline,
            forest,
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid HOST:PORT configuration {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_pipeline_config_uses_defaults() {
        let cfg: PipelineConfig = serde_json::from_str(r#"{"target": "PM10"}"#).unwrap();
        assert_eq!(cfg.target, "PM10");
        assert_eq!(cfg.max_years, 7);
        assert_eq!(cfg.lags, PipelineConfig::default().lags);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let err = PipelineConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("failed to read pipeline config"));
    }
}
