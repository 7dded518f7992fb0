//! Feature scalers exported from scikit-learn.
//!
//! `min_max` mirrors `MinMaxScaler` (`x * scale + min`), `standard`
//! mirrors `StandardScaler` (`(x - mean) / scale`).

use common::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scaler {
    MinMax { min: Vec<f64>, scale: Vec<f64> },
    Standard { mean: Vec<f64>, scale: Vec<f64> },
}

impl Scaler {
    /// Number of columns the scaler was fitted on.
    pub fn width(&self) -> usize {
        match self {
            Scaler::MinMax { min, .. } => min.len(),
            Scaler::Standard { mean, .. } => mean.len(),
        }
    }

    /// Reject mismatched parameter lengths and zero scales.
    pub fn validate(&self) -> Result<()> {
        let (offset, scale) = match self {
            Scaler::MinMax { min, scale } => (min, scale),
            Scaler::Standard { mean, scale } => (mean, scale),
        };
        if offset.is_empty() || offset.len() != scale.len() {
            return Err(Error::shape(
                format!("{} scale entries", offset.len()),
                format!("{}", scale.len()),
            ));
        }
        if scale.iter().any(|s| *s == 0.0 || !s.is_finite()) {
            return Err(Error::InvalidInput("scaler has a zero or non-finite scale".into()));
        }
        Ok(())
    }

    pub fn transform(&self, row: &[f64]) -> Result<Vec<f64>> {
        self.check_width(row.len())?;
        Ok(match self {
            Scaler::MinMax { min, scale } => row
                .iter()
                .zip(min.iter().zip(scale))
                .map(|(x, (m, s))| x * s + m)
                .collect(),
            Scaler::Standard { mean, scale } => row
                .iter()
                .zip(mean.iter().zip(scale))
                .map(|(x, (m, s))| (x - m) / s)
                .collect(),
        })
    }

    pub fn inverse_transform(&self, row: &[f64]) -> Result<Vec<f64>> {
        self.check_width(row.len())?;
        Ok(match self {
            Scaler::MinMax { min, scale } => row
                .iter()
                .zip(min.iter().zip(scale))
                .map(|(x, (m, s))| (x - m) / s)
                .collect(),
            Scaler::Standard { mean, scale } => row
                .iter()
                .zip(mean.iter().zip(scale))
                .map(|(x, (m, s))| x * s + m)
                .collect(),
        })
    }

    /// Inverse-transform a single-column value.
    pub fn inverse_scalar(&self, value: f64) -> Result<f64> {
        let out = self.inverse_transform(&[value])?;
        Ok(out[0])
    }

    fn check_width(&self, got: usize) -> Result<()> {
        if got != self.width() {
            return Err(Error::shape(
                format!("{} columns", self.width()),
                format!("{got} columns"),
            ));
        }
        Ok(())
    }
}
