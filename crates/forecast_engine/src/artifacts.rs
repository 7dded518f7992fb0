//! Load-once model context.
//!
//! Every trained artifact is read from the base directory at startup and
//! kept immutable afterwards; requests only borrow it.

use std::fs;
use std::path::Path;

use common::config::{ArtifactConfig, ForecastConfig};
use common::{Error, Result};
use serde::Deserialize;
use tracing::info;

use crate::gbtree::TreeEnsemble;
use crate::lstm::KerasSequenceModel;
use crate::model::{ReturnRegressor, SequenceModel};
use crate::scaler::Scaler;
use crate::window::FeatureWindow;

const PRICE_COLUMN: &str = "Price";

/// Models, scalers and persisted inputs shared by every forecast.
pub struct ModelContext {
    pub(crate) sequence_model: Box<dyn SequenceModel>,
    pub(crate) regressor: Box<dyn ReturnRegressor>,
    pub(crate) input_scaler: Scaler,
    pub(crate) output_scaler: Scaler,
    pub(crate) window: FeatureWindow,
    pub(crate) volatility: f64,
    pub(crate) last_price: f64,
    pub(crate) price_feature_index: usize,
    pub(crate) noise_scale: f64,
}

impl std::fmt::Debug for ModelContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelContext")
            .field("window", &(self.window.look_back(), self.window.features()))
            .field("volatility", &self.volatility)
            .field("last_price", &self.last_price)
            .field("price_feature_index", &self.price_feature_index)
            .field("noise_scale", &self.noise_scale)
            .finish_non_exhaustive()
    }
}

/// Input parts for [`ModelContext::from_parts`].
pub struct ContextParts {
    pub sequence_model: Box<dyn SequenceModel>,
    pub regressor: Box<dyn ReturnRegressor>,
    pub input_scaler: Scaler,
    pub output_scaler: Scaler,
    pub window: FeatureWindow,
    pub volatility: f64,
    pub last_price: f64,
}

impl ModelContext {
    /// Read every artifact under `artifacts.dir`. Any missing or malformed
    /// artifact fails the whole load.
    pub fn load(artifacts: &ArtifactConfig, forecast: &ForecastConfig) -> Result<Self> {
        let dir = Path::new(&artifacts.dir);
        let path = |name: &str| dir.join(name);

        let sequence_model = load_sequence_model(&path(&artifacts.sequence_model))?;
        let regressor = load_with(&path(&artifacts.regressor), |p| {
            TreeEnsemble::from_json_file(p)
        })?;
        let input_scaler: Scaler = read_json(&path(&artifacts.scaler_x))?;
        let output_scaler: Scaler = read_json(&path(&artifacts.scaler_y))?;

        let rows: Vec<Vec<f64>> = read_json(&path(&artifacts.last_sequence))?;
        let window = FeatureWindow::from_rows(&rows, forecast.look_back, forecast.features)
            .map_err(|e| Error::artifact(&artifacts.last_sequence, e))?;

        let volatility: f64 = read_json(&path(&artifacts.volatility))?;
        let last_price = read_last_price(&path(&artifacts.price_history))?;

        info!(
            dir = %dir.display(),
            look_back = window.look_back(),
            features = window.features(),
            trees = regressor.num_trees(),
            last_price,
            volatility,
            "Loaded forecast artifacts"
        );

        Self::from_parts(
            ContextParts {
                sequence_model,
                regressor: Box::new(regressor),
                input_scaler,
                output_scaler,
                window,
                volatility,
                last_price,
            },
            forecast,
        )
    }

    /// Assemble a context from already-built parts, applying the same
    /// consistency checks as [`ModelContext::load`].
    pub fn from_parts(parts: ContextParts, forecast: &ForecastConfig) -> Result<Self> {
        let features = parts.window.features();
        if parts.window.look_back() != forecast.look_back || features != forecast.features {
            return Err(Error::shape(
                format!("{}x{} window", forecast.look_back, forecast.features),
                format!("{}x{features}", parts.window.look_back()),
            ));
        }

        if !parts.volatility.is_finite() || parts.volatility < 0.0 {
            return Err(Error::artifact(
                "volatility",
                format!("must be a finite number >= 0, got {}", parts.volatility),
            ));
        }
        if !parts.last_price.is_finite() {
            return Err(Error::artifact("price_history", "last price is not finite"));
        }
        if forecast.price_feature_index >= features {
            return Err(Error::Config(format!(
                "price_feature_index {} out of range for {features} features",
                forecast.price_feature_index
            )));
        }
        if !forecast.noise_scale.is_finite() || forecast.noise_scale < 0.0 {
            return Err(Error::Config("noise_scale must be a finite number >= 0".into()));
        }

        parts
            .input_scaler
            .validate()
            .map_err(|e| Error::artifact("scaler_x", e))?;
        if parts.input_scaler.width() != features {
            return Err(Error::artifact(
                "scaler_x",
                format!(
                    "fitted on {} columns, window has {features}",
                    parts.input_scaler.width()
                ),
            ));
        }
        parts
            .output_scaler
            .validate()
            .map_err(|e| Error::artifact("scaler_y", e))?;
        if parts.output_scaler.width() != 1 {
            return Err(Error::artifact(
                "scaler_y",
                format!("fitted on {} columns, expected 1", parts.output_scaler.width()),
            ));
        }
        if let Some(width) = parts.sequence_model.input_features() {
            if width != features {
                return Err(Error::artifact(
                    "sequence_model",
                    format!("expects {width} features, window has {features}"),
                ));
            }
        }
        if let Some(max) = parts.regressor.max_feature_index() {
            if max > features {
                return Err(Error::artifact(
                    "regressor",
                    format!(
                        "reads feature {max}, hybrid input has {} features",
                        features + 1
                    ),
                ));
            }
        }

        Ok(Self {
            sequence_model: parts.sequence_model,
            regressor: parts.regressor,
            input_scaler: parts.input_scaler,
            output_scaler: parts.output_scaler,
            window: parts.window,
            volatility: parts.volatility,
            last_price: parts.last_price,
            price_feature_index: forecast.price_feature_index,
            noise_scale: forecast.noise_scale,
        })
    }

    pub fn window(&self) -> &FeatureWindow {
        &self.window
    }

    pub fn volatility(&self) -> f64 {
        self.volatility
    }

    pub fn last_price(&self) -> f64 {
        self.last_price
    }

    /// Scaler the window features were fitted with.
    pub fn input_scaler(&self) -> &Scaler {
        &self.input_scaler
    }
}

fn load_sequence_model(path: &Path) -> Result<Box<dyn SequenceModel>> {
    #[cfg(feature = "onnx")]
    if path.extension().is_some_and(|ext| ext == "onnx") {
        let model = load_with(path, crate::onnx::OnnxSequenceModel::from_file)?;
        return Ok(Box::new(model));
    }

    let model = load_with(path, KerasSequenceModel::from_json_file)?;
    Ok(Box::new(model))
}

/// Run a loader, tagging any failure with the artifact path.
fn load_with<T>(path: &Path, loader: impl FnOnce(&Path) -> Result<T>) -> Result<T> {
    if !path.is_file() {
        return Err(Error::artifact(display(path), "file not found"));
    }
    loader(path).map_err(|e| match e {
        Error::Artifact { .. } => e,
        other => Error::artifact(display(path), other),
    })
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    load_with(path, |p| {
        let raw = fs::read_to_string(p)?;
        Ok(serde_json::from_str(&raw)?)
    })
}

fn read_last_price(path: &Path) -> Result<f64> {
    load_with(path, |p| {
        let mut reader = csv::Reader::from_path(p)?;
        let column = reader
            .headers()?
            .iter()
            .position(|h| h.trim() == PRICE_COLUMN)
            .ok_or_else(|| Error::Other(format!("no {PRICE_COLUMN:?} column")))?;

        let mut last: Option<String> = None;
        for record in reader.records() {
            let record = record?;
            if let Some(value) = record.get(column) {
                last = Some(value.to_string());
            }
        }
        let raw = last.ok_or_else(|| Error::Other("price history is empty".into()))?;
        parse_price(&raw)
    })
}

/// Parse a price cell, tolerating thousands separators.
fn parse_price(raw: &str) -> Result<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    cleaned
        .parse::<f64>()
        .map_err(|_| Error::Other(format!("unparseable price {raw:?}")))
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
