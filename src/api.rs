//! HTTP surface: health probe and the forecast endpoint.

use std::sync::{Arc, Mutex};

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use common::config::ForecastConfig;
use forecast_engine::{Forecast, ModelContext};

pub const HEALTH_STATUS: &str = "API is running successfully 🚀";

pub struct AppState {
    pub context: Arc<ModelContext>,
    pub horizon_days: usize,
    /// Shared deterministic noise source when a seed is configured.
    seeded_rng: Option<Mutex<StdRng>>,
}

impl AppState {
    pub fn new(context: Arc<ModelContext>, forecast: &ForecastConfig) -> Self {
        Self {
            context,
            horizon_days: forecast.horizon_days,
            seeded_rng: forecast.seed.map(|seed| Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    /// Run one forecast starting the day after `today`.
    pub fn run_forecast(&self, today: NaiveDate) -> common::Result<Forecast> {
        match &self.seeded_rng {
            Some(rng) => {
                let mut rng = rng
                    .lock()
                    .map_err(|_| common::Error::Other("noise source lock poisoned".into()))?;
                self.context.forecast(self.horizon_days, today, &mut *rng)
            }
            None => self
                .context
                .forecast(self.horizon_days, today, &mut rand::thread_rng()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug)]
pub enum ApiError {
    Forecast(String),
}

impl From<common::Error> for ApiError {
    fn from(err: common::Error) -> Self {
        ApiError::Forecast(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ApiError::Forecast(message) = self;
        error!(%message, "Forecast request failed");
        let body = Json(json!({
            "error": "forecast_failed",
            "message": message,
        }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: HEALTH_STATUS.to_string(),
    })
}

pub async fn forecast(State(state): State<Arc<AppState>>) -> Result<Json<Forecast>, ApiError> {
    let today = chrono::Local::now().date_naive();
    let forecast = tokio::task::spawn_blocking(move || state.run_forecast(today))
        .await
        .map_err(|e| ApiError::Forecast(format!("forecast task failed: {e}")))??;
    Ok(Json(forecast))
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(health_check))
        .route("/forecast", get(forecast))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
