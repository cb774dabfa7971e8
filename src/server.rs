use crate::error::PipelineError;
use crate::state::StateHolder;
use crate::types::ForecastPoint;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

// ---------- Request/Response types ----------

fn default_hours() -> i64 {
    72
}

#[derive(Deserialize, Debug)]
pub struct ForecastRequest {
    pub station: String,
    #[serde(default = "default_hours")]
    pub hours: i64,
    /// Defaults to the current hour; the first point is one hour later.
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct HealthOut {
    pub ok: bool,
    pub rows: usize,
}

#[derive(Serialize, Debug)]
pub struct ForecastOut {
    pub station: String,
    pub start_time: String,
    pub forecast: Vec<ForecastPoint>,
}

type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": msg.into() })))
}

fn status_for(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::UnknownStation(_) => StatusCode::NOT_FOUND,
        PipelineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<PipelineError> for (StatusCode, Json<Value>) {
    fn from(err: PipelineError) -> Self {
        api_error(status_for(&err), err.to_string())
    }
}

// ---------- Server state ----------

#[derive(Clone)]
pub struct AppState {
    pub trained: StateHolder,
    pub max_forecast_hours: usize,
    pub log_forecast: bool,
}

impl AppState {
    pub fn new(trained: StateHolder, max_forecast_hours: usize) -> Self {
        Self {
            trained,
            max_forecast_hours,
            log_forecast: false,
        }
    }
}

// ---------- Handlers ----------

async fn health(State(state): State<AppState>) -> Json<HealthOut> {
    let snapshot = state.trained.snapshot();
    Json(HealthOut {
        ok: snapshot.is_some(),
        rows: snapshot.map(|s| s.rows()).unwrap_or(0),
    })
}

fn validate_hours(hours: i64, max: usize) -> Result<usize, PipelineError> {
    usize::try_from(hours)
        .ok()
        .filter(|h| *h <= max)
        .ok_or_else(|| PipelineError::InvalidRequest(format!("hours must be between 0 and {}, got {}", max, hours)))
}

async fn forecast(
    State(state): State<AppState>,
    payload: Result<Json<ForecastRequest>, JsonRejection>,
) -> Result<Json<ForecastOut>, ApiError> {
    let Json(req) = payload.map_err(|e| api_error(StatusCode::BAD_REQUEST, e.body_text()))?;
    let Some(trained) = state.trained.snapshot() else {
        return Err(api_error(StatusCode::SERVICE_UNAVAILABLE, "Model not trained yet"));
    };
    if req.station.trim().is_empty() {
        return Err(PipelineError::InvalidRequest("station is required".into()).into());
    }
    let hours = validate_hours(req.hours, state.max_forecast_hours)?;

    let start_time = match req.start_time {
        Some(t) => t,
        None => {
            let now = Utc::now();
            now.duration_trunc(TimeDelta::hours(1)).unwrap_or(now)
        }
    };

    let points = trained
        .engine()
        .with_row_logging(state.log_forecast)
        .forecast(&req.station, start_time, hours)
        .map_err(|e| {
            match &e {
                PipelineError::UnknownStation(_) | PipelineError::InvalidRequest(_) => {
                    tracing::warn!(station = %req.station, error = %e, "forecast rejected")
                }
                _ => tracing::error!(station = %req.station, error = %e, "forecast failed"),
            }
            ApiError::from(e)
        })?;

    tracing::info!(
        station = %req.station,
        hours,
        first = ?points.first().map(|p| p.predicted),
        last = ?points.last().map(|p| p.predicted),
        "forecast served"
    );
    Ok(Json(ForecastOut {
        station: req.station,
        start_time: start_time.to_rfc3339(),
        forecast: points,
    }))
}

async fn model_info(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let Some(trained) = state.trained.snapshot() else {
        return Err(api_error(StatusCode::SERVICE_UNAVAILABLE, "Model not trained yet"));
    };
    Ok(Json(json!({
        "target": trained.schema.target,
        "feature_columns": trained.schema.columns,
        "stations": trained.schema.stations,
        "metrics": trained.metrics,
    })))
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/forecast", post(forecast))
        .route("/model", get(model_info))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hours_validation() {
        assert_eq!(validate_hours(0, 10).unwrap(), 0);
        assert_eq!(validate_hours(10, 10).unwrap(), 10);
        assert!(validate_hours(-1, 10).is_err());
        assert!(validate_hours(11, 10).is_err());
    }

    #[test]
    fn test_request_defaults_to_72_hours() {
        let req: ForecastRequest = serde_json::from_str(r#"{"station": "A"}"#).unwrap();
        assert_eq!(req.hours, 72);
        assert!(req.start_time.is_none());
    }
}
