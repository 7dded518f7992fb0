//! Iterative hybrid forecast.
//!
//! Each step asks the sequence model for a trend, feeds the last window
//! row plus that trend to the regressor for a scaled return, converts it
//! to a price delta, adds market noise, and slides the window forward.

use chrono::{Days, NaiveDate};
use common::{Error, Result};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::artifacts::ModelContext;

pub const BEST_DAY_REASON: &str = "Recommended Price for minimum loss";

/// Forecast response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub dates: Vec<String>,
    pub predicted_prices: Vec<f64>,
    pub upper_risk: Vec<f64>,
    pub lower_risk: Vec<f64>,
    pub best_trade_day: BestTradeDay,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestTradeDay {
    pub date: String,
    pub price: f64,
    pub reason: String,
}

impl ModelContext {
    /// Simulate `horizon_days` steps starting from the persisted window and
    /// last known price. Dates start the day after `today`.
    pub fn forecast<R: Rng + ?Sized>(
        &self,
        horizon_days: usize,
        today: NaiveDate,
        rng: &mut R,
    ) -> Result<Forecast> {
        if horizon_days == 0 {
            return Err(Error::InvalidInput("horizon_days must be > 0".into()));
        }
        let dates = forecast_dates(today, horizon_days)?;
        let noise = Normal::new(0.0, self.volatility * self.noise_scale)
            .map_err(|e| Error::Model(format!("noise distribution: {e}")))?;

        let mut window = self.window.clone();
        let mut price = self.last_price;
        let mut predicted_prices = Vec::with_capacity(horizon_days);
        let mut upper_risk = Vec::with_capacity(horizon_days);
        let mut lower_risk = Vec::with_capacity(horizon_days);

        for step in 0..horizon_days {
            let trend = finite(self.sequence_model.predict(window.view())?, "sequence model")?;

            let hybrid = window.hybrid_input(trend);
            let scaled_return = finite(self.regressor.predict(hybrid.view())?, "regressor")?;
            let delta = finite(
                self.output_scaler.inverse_scalar(scaled_return)?,
                "output scaler",
            )?;

            let next_price = price + delta + noise.sample(rng);
            predicted_prices.push(next_price);

            // Random-walk uncertainty: grows with sqrt(days ahead).
            let half_width = self.volatility * ((step + 1) as f64).sqrt();
            upper_risk.push(next_price + half_width);
            lower_risk.push(next_price - half_width);

            window.slide(self.price_feature_index, scaled_return)?;
            price = next_price;
        }

        let best_trade_day = best_trade_day(&predicted_prices, &dates)
            .ok_or_else(|| Error::Other("empty forecast".into()))?;

        debug!(
            horizon_days,
            best_date = %best_trade_day.date,
            best_price = best_trade_day.price,
            "Forecast complete"
        );

        Ok(Forecast {
            dates,
            predicted_prices,
            upper_risk,
            lower_risk,
            best_trade_day,
        })
    }
}

/// `count` consecutive ISO dates starting the day after `today`.
pub fn forecast_dates(today: NaiveDate, count: usize) -> Result<Vec<String>> {
    (1..=count as u64)
        .map(|offset| {
            today
                .checked_add_days(Days::new(offset))
                .map(|d| d.format("%Y-%m-%d").to_string())
                .ok_or_else(|| Error::InvalidInput("forecast date out of range".into()))
        })
        .collect()
}

/// Day whose price sits closest to the middle of the forecast range.
/// Ties resolve to the earliest day.
pub fn best_trade_day(prices: &[f64], dates: &[String]) -> Option<BestTradeDay> {
    let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
    let mid = (max + min) / 2.0;

    let mut best: Option<(usize, f64)> = None;
    for (idx, price) in prices.iter().enumerate() {
        let distance = (price - mid).abs();
        match best {
            Some((_, d)) if distance >= d => {}
            _ => best = Some((idx, distance)),
        }
    }

    let (idx, _) = best?;
    Some(BestTradeDay {
        date: dates.get(idx)?.clone(),
        price: round_cents(prices[idx]),
        reason: BEST_DAY_REASON.to_string(),
    })
}

/// Round to two decimals, exact halves to the even cent (83.125 -> 83.12).
fn round_cents(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

fn finite(value: f64, source: &str) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(Error::Model(format!("{source} produced a non-finite value")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::ContextParts;
    use crate::model::{ReturnRegressor, SequenceModel};
    use crate::scaler::Scaler;
    use crate::window::FeatureWindow;
    use common::config::ForecastConfig;
    use ndarray::{ArrayView1, ArrayView2};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Trend = mean of the price column.
    struct MeanTrend;

    impl SequenceModel for MeanTrend {
        fn predict(&self, window: ArrayView2<'_, f64>) -> Result<f64> {
            Ok(window.column(1).mean().unwrap_or(0.0))
        }
    }

    /// Constant scaled return; records every hybrid input it sees.
    struct RecordingRegressor {
        value: f64,
        seen: Mutex<Vec<Vec<f64>>>,
    }

    impl ReturnRegressor for RecordingRegressor {
        fn predict(&self, features: ArrayView1<'_, f64>) -> Result<f64> {
            self.seen.lock().unwrap().push(features.to_vec());
            Ok(self.value)
        }
    }

    struct FailAfter {
        calls: AtomicUsize,
        limit: usize,
    }

    impl SequenceModel for FailAfter {
        fn predict(&self, _window: ArrayView2<'_, f64>) -> Result<f64> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.limit {
                Err(Error::Model("model not loaded".into()))
            } else {
                Ok(0.0)
            }
        }
    }

    struct NanRegressor;

    impl ReturnRegressor for NanRegressor {
        fn predict(&self, _features: ArrayView1<'_, f64>) -> Result<f64> {
            Ok(f64::NAN)
        }
    }

    fn window() -> FeatureWindow {
        let rows: Vec<Vec<f64>> = (0..60)
            .map(|i| {
                let x = i as f64 / 60.0;
                vec![x, 0.5 + x / 10.0, 1.0 - x, x * x, 0.25]
            })
            .collect();
        FeatureWindow::from_rows(&rows, 60, 5).unwrap()
    }

    fn context(
        sequence_model: Box<dyn SequenceModel>,
        regressor: Box<dyn ReturnRegressor>,
        volatility: f64,
    ) -> ModelContext {
        ModelContext::from_parts(
            ContextParts {
                sequence_model,
                regressor,
                input_scaler: Scaler::MinMax {
                    min: vec![0.0; 5],
                    scale: vec![1.0; 5],
                },
                // Scaled return r maps back to a delta of 2r.
                output_scaler: Scaler::Standard {
                    mean: vec![0.0],
                    scale: vec![2.0],
                },
                window: window(),
                volatility,
                last_price: 83.0,
            },
            &ForecastConfig::default(),
        )
        .unwrap()
    }

    fn recording(value: f64) -> RecordingRegressor {
        RecordingRegressor {
            value,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 12, 25).unwrap()
    }

    #[test]
    fn test_fifteen_day_shape_and_bands() {
        let ctx = context(Box::new(MeanTrend), Box::new(recording(0.01)), 0.4);
        let mut rng = StdRng::seed_from_u64(7);
        let fc = ctx.forecast(15, today(), &mut rng).unwrap();

        assert_eq!(fc.dates.len(), 15);
        assert_eq!(fc.predicted_prices.len(), 15);
        assert_eq!(fc.upper_risk.len(), 15);
        assert_eq!(fc.lower_risk.len(), 15);

        let mut prev_width = 0.0;
        for i in 0..15 {
            assert!(fc.upper_risk[i] >= fc.predicted_prices[i]);
            assert!(fc.predicted_prices[i] >= fc.lower_risk[i]);
            let width = fc.upper_risk[i] - fc.lower_risk[i];
            assert!(width > prev_width, "band must widen at step {i}");
            let expected = 2.0 * 0.4 * ((i + 1) as f64).sqrt();
            assert!((width - expected).abs() < 1e-9);
            prev_width = width;
        }
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let ctx = context(Box::new(MeanTrend), Box::new(recording(0.01)), 0.4);
        let a = ctx
            .forecast(15, today(), &mut StdRng::seed_from_u64(42))
            .unwrap();
        let b = ctx
            .forecast(15, today(), &mut StdRng::seed_from_u64(42))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_volatility_is_deterministic_drift() {
        let ctx = context(Box::new(MeanTrend), Box::new(recording(0.25)), 0.0);
        let fc = ctx
            .forecast(5, today(), &mut StdRng::seed_from_u64(1))
            .unwrap();
        // Each step adds inverse-scaled 0.25 -> 0.5.
        for (i, p) in fc.predicted_prices.iter().enumerate() {
            assert!((p - (83.0 + 0.5 * (i + 1) as f64)).abs() < 1e-9);
        }
        assert_eq!(fc.upper_risk, fc.predicted_prices);
        assert_eq!(fc.lower_risk, fc.predicted_prices);
    }

    #[test]
    fn test_hybrid_input_and_window_feedback() {
        let regressor = std::sync::Arc::new(recording(0.9));
        struct Shared(std::sync::Arc<RecordingRegressor>);
        impl ReturnRegressor for Shared {
            fn predict(&self, features: ArrayView1<'_, f64>) -> Result<f64> {
                self.0.predict(features)
            }
        }

        let ctx = context(Box::new(MeanTrend), Box::new(Shared(regressor.clone())), 0.0);
        ctx.forecast(3, today(), &mut StdRng::seed_from_u64(3))
            .unwrap();

        let seen = regressor.seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        let last_row = window().last_row().to_vec();

        // Step 0: persisted last row plus trend.
        assert_eq!(seen[0].len(), 6);
        assert_eq!(&seen[0][..5], &last_row[..]);

        // Step 1: same row, price column replaced by the raw scaled output.
        let mut expected = last_row.clone();
        expected[1] = 0.9;
        assert_eq!(&seen[1][..5], &expected[..]);
        assert_eq!(&seen[2][..5], &expected[..]);

        // The persisted window is untouched.
        assert_eq!(ctx.window(), &window());
    }

    #[test]
    fn test_predictor_failure_propagates() {
        let ctx = context(
            Box::new(FailAfter {
                calls: AtomicUsize::new(0),
                limit: 4,
            }),
            Box::new(recording(0.0)),
            0.3,
        );
        let err = ctx
            .forecast(15, today(), &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(err, Error::Model(_)));
    }

    #[test]
    fn test_non_finite_output_is_error() {
        let ctx = context(Box::new(MeanTrend), Box::new(NanRegressor), 0.3);
        assert!(ctx
            .forecast(2, today(), &mut StdRng::seed_from_u64(0))
            .is_err());
    }

    #[test]
    fn test_zero_horizon_rejected() {
        let ctx = context(Box::new(MeanTrend), Box::new(recording(0.0)), 0.3);
        assert!(matches!(
            ctx.forecast(0, today(), &mut StdRng::seed_from_u64(0)),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_dates_start_tomorrow_and_cross_year() {
        let dates = forecast_dates(today(), 15).unwrap();
        assert_eq!(dates.len(), 15);
        assert_eq!(dates[0], "2024-12-26");
        assert_eq!(dates[6], "2025-01-01");
        assert_eq!(dates[14], "2025-01-09");
        assert!(dates.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_best_day_closest_to_mid_range() {
        let prices = [10.0, 14.0, 12.4, 20.0, 15.2];
        let dates: Vec<String> = (1..=5).map(|d| format!("2024-01-0{d}")).collect();
        // mid = 15.0 -> 15.2 is closest.
        let best = best_trade_day(&prices, &dates).unwrap();
        assert_eq!(best.date, "2024-01-05");
        assert_eq!(best.price, 15.2);
        assert_eq!(best.reason, BEST_DAY_REASON);
    }

    #[test]
    fn test_best_day_tie_takes_first() {
        let prices = [1.0, 3.0, 2.0, 4.0, 2.0];
        let dates: Vec<String> = (1..=5).map(|d| format!("d{d}")).collect();
        // mid = 2.5 -> 2.0 and 3.0 both sit 0.5 away; index 1 comes first.
        let best = best_trade_day(&prices, &dates).unwrap();
        assert_eq!(best.date, "d2");
        assert_eq!(best.price, 3.0);
    }

    #[test]
    fn test_best_day_rounds_to_cents() {
        let prices = [83.123_456];
        let dates = vec!["2024-01-01".to_string()];
        let best = best_trade_day(&prices, &dates).unwrap();
        assert_eq!(best.price, 83.12);
        assert!(best_trade_day(&[], &[]).is_none());
    }

    #[test]
    fn test_best_day_half_cent_rounds_to_even() {
        let dates: Vec<String> = (1..=3).map(|d| format!("d{d}")).collect();
        // mid = 83.125, which is exact in binary.
        let best = best_trade_day(&[83.0, 83.125, 83.25], &dates).unwrap();
        assert_eq!(best.date, "d2");
        assert_eq!(best.price, 83.12);

        assert_eq!(round_cents(83.375), 83.38);
        assert_eq!(round_cents(-0.125), -0.12);
    }
}
