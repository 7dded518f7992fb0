//! Hybrid sequence-model + gradient-boosted forecast engine.
//!
//! Loads trained artifacts once into a [`ModelContext`] and runs the
//! iterative multi-day forecast over it.

pub mod artifacts;
pub mod engine;
pub mod gbtree;
pub mod lstm;
pub mod model;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod scaler;
pub mod window;

pub use artifacts::ModelContext;
pub use engine::{best_trade_day, forecast_dates, BestTradeDay, Forecast, BEST_DAY_REASON};
pub use gbtree::TreeEnsemble;
pub use lstm::KerasSequenceModel;
pub use model::{ReturnRegressor, SequenceModel};
pub use scaler::Scaler;
pub use window::FeatureWindow;
