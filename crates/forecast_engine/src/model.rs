//! Predictor seams.
//!
//! The trained models are opaque to the forecast loop: it only needs a
//! scalar trend from the window and a scalar scaled return from the
//! hybrid vector.

use common::Result;
use ndarray::{ArrayView1, ArrayView2};

/// Trend model over the full L×F window.
pub trait SequenceModel: Send + Sync {
    fn predict(&self, window: ArrayView2<'_, f64>) -> Result<f64>;

    /// Feature width the model was trained on, if known.
    fn input_features(&self) -> Option<usize> {
        None
    }
}

/// Residual-return model over the hybrid vector (last row ++ trend).
pub trait ReturnRegressor: Send + Sync {
    fn predict(&self, features: ArrayView1<'_, f64>) -> Result<f64>;

    /// Highest feature index the model reads, if known.
    fn max_feature_index(&self) -> Option<usize> {
        None
    }
}
