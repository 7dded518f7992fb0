//! Service configuration types.

use serde::{Deserialize, Serialize};

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Socket address the HTTP server binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Where the trained artifacts live and what they are called.
    #[serde(default)]
    pub artifacts: ArtifactConfig,

    /// Forecast loop parameters.
    #[serde(default)]
    pub forecast: ForecastConfig,
}

/// Artifact locations. File names are resolved relative to `dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Base directory holding every artifact.
    #[serde(default = "default_artifacts_dir")]
    pub dir: String,

    /// Sequence (trend) model. `.json` layer export, or `.onnx` with the `onnx` feature.
    #[serde(default = "default_sequence_model")]
    pub sequence_model: String,

    /// Gradient-boosted residual regressor (XGBoost JSON dump).
    #[serde(default = "default_regressor")]
    pub regressor: String,

    /// Input feature scaler.
    #[serde(default = "default_scaler_x")]
    pub scaler_x: String,

    /// Output (return) scaler.
    #[serde(default = "default_scaler_y")]
    pub scaler_y: String,

    /// Last known feature window, L rows of F features.
    #[serde(default = "default_last_sequence")]
    pub last_sequence: String,

    /// Volatility estimate (single JSON number).
    #[serde(default = "default_volatility")]
    pub volatility: String,

    /// Price history CSV with a `Price` column.
    #[serde(default = "default_price_history")]
    pub price_history: String,
}

/// Forecast loop parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Number of days to simulate per request.
    #[serde(default = "default_horizon_days")]
    pub horizon_days: usize,

    /// Window length L.
    #[serde(default = "default_look_back")]
    pub look_back: usize,

    /// Features per window row F.
    #[serde(default = "default_features")]
    pub features: usize,

    /// Column overwritten with the scaled regressor output on each step.
    #[serde(default = "default_price_feature_index")]
    pub price_feature_index: usize,

    /// Noise std-dev as a fraction of volatility.
    #[serde(default = "default_noise_scale")]
    pub noise_scale: f64,

    /// Seed for a shared deterministic noise source. Unset means thread RNG.
    #[serde(default)]
    pub seed: Option<u64>,
}

// ── Defaults ──────────────────────────────────────────────────────────

fn default_bind_addr() -> String {
    "0.0.0.0:8000".into()
}

fn default_artifacts_dir() -> String {
    "artifacts".into()
}
fn default_sequence_model() -> String {
    "lstm_model.json".into()
}
fn default_regressor() -> String {
    "xgb_model.json".into()
}
fn default_scaler_x() -> String {
    "scaler_x.json".into()
}
fn default_scaler_y() -> String {
    "scaler_y.json".into()
}
fn default_last_sequence() -> String {
    "last_sequence.json".into()
}
fn default_volatility() -> String {
    "model_volatility.json".into()
}
fn default_price_history() -> String {
    "price_data.csv".into()
}

fn default_horizon_days() -> usize {
    15
}
fn default_look_back() -> usize {
    60
}
fn default_features() -> usize {
    5
}
fn default_price_feature_index() -> usize {
    1
}
fn default_noise_scale() -> f64 {
    0.5
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            dir: default_artifacts_dir(),
            sequence_model: default_sequence_model(),
            regressor: default_regressor(),
            scaler_x: default_scaler_x(),
            scaler_y: default_scaler_y(),
            last_sequence: default_last_sequence(),
            volatility: default_volatility(),
            price_history: default_price_history(),
        }
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon_days: default_horizon_days(),
            look_back: default_look_back(),
            features: default_features(),
            price_feature_index: default_price_feature_index(),
            noise_scale: default_noise_scale(),
            seed: None,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            artifacts: ArtifactConfig::default(),
            forecast: ForecastConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_deployment() {
        let cfg = ServiceConfig::default();
        assert_eq!(cfg.forecast.horizon_days, 15);
        assert_eq!(cfg.forecast.look_back, 60);
        assert_eq!(cfg.forecast.features, 5);
        assert_eq!(cfg.forecast.price_feature_index, 1);
        assert!((cfg.forecast.noise_scale - 0.5).abs() < f64::EPSILON);
        assert!(cfg.forecast.seed.is_none());
    }

    #[test]
    fn test_partial_toml_like_json_keeps_defaults() {
        let cfg: ServiceConfig =
            serde_json::from_str(r#"{"forecast": {"horizon_days": 7}}"#).unwrap();
        assert_eq!(cfg.forecast.horizon_days, 7);
        assert_eq!(cfg.forecast.look_back, 60);
        assert_eq!(cfg.artifacts.price_history, "price_data.csv");
        assert_eq!(cfg.bind_addr, "0.0.0.0:8000");
    }
}
