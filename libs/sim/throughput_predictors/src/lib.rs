// This file is part of Abr360.
//
// Abr360 is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Abr360 is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Abr360.  If not, see <http://www.gnu.org/licenses/>.
//! Throughput predictors (C3): `Update(sample)` then `Predict() -> mbps`.
use std::collections::VecDeque;

use abr_error::{AbrError, AbrResult};
use serde::{Deserialize, Serialize};

pub trait ThroughputPredictor {
    fn update(&mut self, sample_mbps: f64);
    fn predict(&self) -> f64;
}

fn sanitize_sample(sample_mbps: f64) -> f64 {
    if sample_mbps.is_finite() {
        sample_mbps.max(0.0)
    } else {
        0.0
    }
}

/// Arithmetic mean over the last `window_count` samples; unfilled history
/// averages what exists.
pub struct MovingAveragePredictor {
    window_count: usize,
    history: VecDeque<f64>,
}

impl MovingAveragePredictor {
    pub fn new(window_count: usize) -> AbrResult<Self> {
        if window_count == 0 {
            return Err(AbrError::configuration(
                "moving-average window count must be >= 1",
            ));
        }
        Ok(Self {
            window_count,
            history: VecDeque::with_capacity(window_count),
        })
    }
}

impl ThroughputPredictor for MovingAveragePredictor {
    fn update(&mut self, sample_mbps: f64) {
        if self.history.len() == self.window_count {
            self.history.pop_front();
        }
        self.history.push_back(sanitize_sample(sample_mbps));
    }

    fn predict(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        self.history.iter().sum::<f64>() / self.history.len() as f64
    }
}

/// `s <- alpha * sample + (1 - alpha) * s`, initialized to the first sample.
pub struct EmaPredictor {
    alpha: f64,
    state: Option<f64>,
}

impl EmaPredictor {
    pub fn new(alpha: f64) -> AbrResult<Self> {
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(AbrError::configuration(format!(
                "EMA alpha must be in (0, 1], got {alpha}"
            )));
        }
        Ok(Self { alpha, state: None })
    }
}

impl ThroughputPredictor for EmaPredictor {
    fn update(&mut self, sample_mbps: f64) {
        let sample = sanitize_sample(sample_mbps);
        self.state = Some(match self.state {
            Some(prev) => self.alpha * sample + (1.0 - self.alpha) * prev,
            None => sample,
        });
    }

    fn predict(&self) -> f64 {
        self.state.unwrap_or(0.0)
    }
}

/// Tagged-union options for the two recognized throughput predictor
/// variants (§6), externally tagged for `serde_json` round-tripping.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ThroughputPredictorOptions {
    #[serde(rename = "EMA")]
    Ema { alpha: f64 },
    MovingAverage { window_count: usize },
}

pub fn build(options: ThroughputPredictorOptions) -> AbrResult<Box<dyn ThroughputPredictor + Send>> {
    match options {
        ThroughputPredictorOptions::Ema { alpha } => Ok(Box::new(EmaPredictor::new(alpha)?)),
        ThroughputPredictorOptions::MovingAverage { window_count } => {
            Ok(Box::new(MovingAveragePredictor::new(window_count)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn moving_average_averages_whatever_history_exists() {
        let mut predictor = MovingAveragePredictor::new(3).unwrap();
        predictor.update(10.0);
        assert_abs_diff_eq!(predictor.predict(), 10.0, epsilon = 1e-12);
        predictor.update(20.0);
        assert_abs_diff_eq!(predictor.predict(), 15.0, epsilon = 1e-12);
        predictor.update(30.0);
        predictor.update(40.0); // window is full, oldest (10) drops off.
        assert_abs_diff_eq!(predictor.predict(), 30.0, epsilon = 1e-12);
    }

    #[test]
    fn ema_initializes_to_first_sample_then_blends() {
        let mut predictor = EmaPredictor::new(0.5).unwrap();
        predictor.update(10.0);
        assert_abs_diff_eq!(predictor.predict(), 10.0, epsilon = 1e-12);
        predictor.update(20.0);
        assert_abs_diff_eq!(predictor.predict(), 15.0, epsilon = 1e-12);
    }

    #[test]
    fn ema_rejects_alpha_out_of_range() {
        assert!(EmaPredictor::new(0.0).is_err());
        assert!(EmaPredictor::new(1.5).is_err());
        assert!(EmaPredictor::new(1.0).is_ok());
    }

    #[test]
    fn non_finite_samples_clamp_to_zero() {
        let mut predictor = EmaPredictor::new(1.0).unwrap();
        predictor.update(f64::NAN);
        assert_abs_diff_eq!(predictor.predict(), 0.0, epsilon = 1e-12);
        predictor.update(f64::INFINITY);
        assert_abs_diff_eq!(predictor.predict(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn build_dispatches_on_the_tagged_variant() {
        let predictor = build(ThroughputPredictorOptions::Ema { alpha: 0.3 }).unwrap();
        assert_abs_diff_eq!(predictor.predict(), 0.0, epsilon = 1e-12);
    }
}
