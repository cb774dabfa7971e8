//! Hourly air-quality forecasting: feature pipeline, random forest trainer,
//! recursive forecast engine and an axum serving shell.

pub mod artifact;
pub mod config;
pub mod error;
pub mod forecast;
pub mod ingest;
pub mod model;
pub mod pipeline;
pub mod schema;
pub mod server;
pub mod state;
pub mod trainer;
pub mod types;

pub use config::{ForestConfig, PipelineConfig, ServiceConfig};
pub use error::{PipelineError, Result};
pub use forecast::{ForecastEngine, LagBuffer};
pub use model::{RandomForest, Regressor};
pub use pipeline::{build_features, FeatureTable};
pub use schema::FeatureSchema;
pub use state::{StateHolder, TrainedState};
pub use types::{ForecastPoint, RawReading, RawTable};
