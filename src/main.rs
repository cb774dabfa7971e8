use aqi_forecast::artifact::ModelArtifact;
use aqi_forecast::ingest::{JsonFileSource, ReadingSource};
use aqi_forecast::server::{build_router, AppState};
use aqi_forecast::state::{self, StateHolder, TrainedState};
use aqi_forecast::types::RawTable;
use aqi_forecast::ServiceConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn prepare_state(cfg: &ServiceConfig, raw: &RawTable) -> anyhow::Result<TrainedState> {
    match &cfg.model_path {
        Some(path) if path.exists() => {
            let artifact = ModelArtifact::load(path)?;
            tracing::info!(path = %path.display(), trained_at = %artifact.trained_at, "using saved model artifact");
            Ok(state::state_from_artifact(raw, &cfg.pipeline, artifact)?)
        }
        _ => Ok(state::train_state(raw, &cfg.pipeline, &cfg.forest)?),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aqi_forecast=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = ServiceConfig::from_env()?;

    let raw = match &cfg.data_path {
        Some(path) => JsonFileSource::new(path).fetch(cfg.max_rows)?,
        None => {
            tracing::warn!("DATA_PATH not set; serving without a model");
            RawTable::default()
        }
    };

    let holder = StateHolder::new();
    let mut app_state = AppState::new(holder.clone(), cfg.max_forecast_hours);
    app_state.log_forecast = cfg.log_forecast;
    let app = build_router(app_state);

    let addr = cfg.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", addr);

    if raw.is_empty() {
        tracing::warn!("no raw readings available; /forecast will answer 503");
    } else {
        let cfg = cfg.clone();
        tokio::task::spawn_blocking(move || match prepare_state(&cfg, &raw) {
            Ok(trained) => holder.install(trained),
            Err(e) => tracing::error!(error = %e, "model preparation failed; staying degraded"),
        });
    }

    axum::serve(listener, app).await?;
    Ok(())
}
