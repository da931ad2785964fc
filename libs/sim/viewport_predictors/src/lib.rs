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
//! Viewport predictors (C4): `Update(observed_poses)` then
//! `PredictPositions(horizon_seconds) -> Vec<SphericalPosition>`.
//!
//! Every predictor is constructed with the session's segment duration and
//! returns one pose per segment boundary inside the horizon, i.e.
//! `round(horizon_seconds / segment_seconds)` poses spaced `segment_seconds`
//! apart, the first at one segment ahead of the most recent observation.
use std::collections::VecDeque;

use abr_error::{AbrError, AbrResult};
use geodesy::{normalize_longitude_deg, shortest_arc_delta_deg, SphericalPosition};
use serde::{Deserialize, Serialize};

pub trait ViewportPredictor {
    fn update(&mut self, observed_poses: &[SphericalPosition]);
    fn predict_positions(&self, horizon_seconds: f64) -> Vec<SphericalPosition>;
}

fn horizon_steps(horizon_seconds: f64, segment_seconds: f64) -> usize {
    (horizon_seconds / segment_seconds).round().max(0.0) as usize
}

/// Repeats the last observed pose for the whole horizon (§4.4).
pub struct StaticPredictor {
    segment_seconds: f64,
    last_pose: SphericalPosition,
}

impl StaticPredictor {
    pub fn new(segment_seconds: f64) -> AbrResult<Self> {
        if !(segment_seconds > 0.0) {
            return Err(AbrError::configuration(
                "segment seconds must be positive for a viewport predictor",
            ));
        }
        Ok(Self {
            segment_seconds,
            last_pose: SphericalPosition::default(),
        })
    }
}

impl ViewportPredictor for StaticPredictor {
    fn update(&mut self, observed_poses: &[SphericalPosition]) {
        if let Some(&pose) = observed_poses.last() {
            self.last_pose = pose.finite_or_zero();
        }
    }

    fn predict_positions(&self, horizon_seconds: f64) -> Vec<SphericalPosition> {
        vec![self.last_pose; horizon_steps(horizon_seconds, self.segment_seconds)]
    }
}

fn least_squares(xs: &[f64], ys: &[f64]) -> (f64, f64) {
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (&x, &y) in xs.iter().zip(ys) {
        numerator += (x - mean_x) * (y - mean_y);
        denominator += (x - mean_x) * (x - mean_x);
    }
    if denominator.abs() < 1e-12 {
        return (0.0, mean_y);
    }
    let slope = numerator / denominator;
    (slope, mean_y - slope * mean_x)
}

/// Fits a line through the poses observed in the last `history_seconds` and
/// extrapolates it forward (§4.4). Longitude is unwrapped across samples via
/// shortest-arc deltas before fitting, so an antimeridian crossing in the
/// history doesn't look like a reversal.
///
/// Every pose handed to `update` is treated as a new sample exactly
/// `segment_seconds` after the previous one, regardless of how many arrive
/// in a single call; a call batching several poses at once is read as
/// catch-up across that many segment boundaries.
pub struct LinearPredictor {
    segment_seconds: f64,
    history_seconds: f64,
    samples: VecDeque<(f64, SphericalPosition)>,
    next_time: f64,
}

impl LinearPredictor {
    pub fn new(segment_seconds: f64, history_seconds: f64) -> AbrResult<Self> {
        if !(segment_seconds > 0.0) {
            return Err(AbrError::configuration(
                "segment seconds must be positive for a viewport predictor",
            ));
        }
        if !(history_seconds > 0.0) {
            return Err(AbrError::configuration(format!(
                "linear predictor history seconds must be positive, got {history_seconds}"
            )));
        }
        Ok(Self {
            segment_seconds,
            history_seconds,
            samples: VecDeque::new(),
            next_time: 0.0,
        })
    }
}

impl ViewportPredictor for LinearPredictor {
    fn update(&mut self, observed_poses: &[SphericalPosition]) {
        for &pose in observed_poses {
            self.samples.push_back((self.next_time, pose.finite_or_zero()));
            self.next_time += self.segment_seconds;
        }
        if let Some(&(latest, _)) = self.samples.back() {
            let cutoff = latest - self.history_seconds;
            while let Some(&(t, _)) = self.samples.front() {
                if t < cutoff {
                    self.samples.pop_front();
                } else {
                    break;
                }
            }
        }
    }

    fn predict_positions(&self, horizon_seconds: f64) -> Vec<SphericalPosition> {
        let steps = horizon_steps(horizon_seconds, self.segment_seconds);
        if self.samples.len() < 2 {
            let last = self.samples.back().map(|&(_, p)| p).unwrap_or_default();
            return vec![last; steps];
        }
        let now = self.samples.back().unwrap().0;
        let times: Vec<f64> = self.samples.iter().map(|&(t, _)| t).collect();
        let lats: Vec<f64> = self.samples.iter().map(|&(_, p)| p.latitude_deg).collect();
        let mut unwrapped_lons = Vec::with_capacity(self.samples.len());
        let mut running_lon = self.samples[0].1.longitude_deg;
        unwrapped_lons.push(running_lon);
        for window in self.samples.iter().collect::<Vec<_>>().windows(2) {
            let delta = shortest_arc_delta_deg(window[0].1.longitude_deg, window[1].1.longitude_deg);
            running_lon += delta;
            unwrapped_lons.push(running_lon);
        }
        let (lat_slope, lat_intercept) = least_squares(&times, &lats);
        let (lon_slope, lon_intercept) = least_squares(&times, &unwrapped_lons);
        (1..=steps)
            .map(|step| {
                let t = now + step as f64 * self.segment_seconds;
                let lat = (lat_slope * t + lat_intercept).clamp(-90.0, 90.0);
                let lon = normalize_longitude_deg(lon_slope * t + lon_intercept);
                SphericalPosition::new(lat, lon)
            })
            .collect()
    }
}

/// Blends an exponentially decayed average of recent poses toward a fixed
/// attractor pose (§4.4's "alternative motion models"). The decayed average
/// is computed on unit vectors so antipodal history doesn't cancel out to a
/// degenerate zero vector the way an angle average would.
pub struct GravitationalPredictor {
    segment_seconds: f64,
    decay: f64,
    attractor: SphericalPosition,
    attractor_weight: f64,
    history: VecDeque<SphericalPosition>,
}

const GRAVITATIONAL_HISTORY_CAP: usize = 64;

impl GravitationalPredictor {
    pub fn new(
        segment_seconds: f64,
        decay: f64,
        attractor: SphericalPosition,
        attractor_weight: f64,
    ) -> AbrResult<Self> {
        if !(segment_seconds > 0.0) {
            return Err(AbrError::configuration(
                "segment seconds must be positive for a viewport predictor",
            ));
        }
        if !(decay > 0.0 && decay <= 1.0) {
            return Err(AbrError::configuration(format!(
                "gravitational predictor decay must be in (0, 1], got {decay}"
            )));
        }
        if !(0.0..=1.0).contains(&attractor_weight) {
            return Err(AbrError::configuration(format!(
                "gravitational predictor attractor weight must be in [0, 1], got {attractor_weight}"
            )));
        }
        Ok(Self {
            segment_seconds,
            decay,
            attractor: attractor.finite_or_zero(),
            attractor_weight,
            history: VecDeque::new(),
        })
    }

    fn settled_pose(&self) -> SphericalPosition {
        if self.history.is_empty() {
            return self.attractor;
        }
        let mut weighted = nalgebra::Vector3::zeros();
        let mut weight = 1.0;
        for &pose in self.history.iter().rev() {
            weighted += pose.to_unit_vector() * weight;
            weight *= self.decay;
        }
        let history_pose = SphericalPosition::from_unit_vector(weighted);
        geodesy::great_circle_interpolate(history_pose, self.attractor, self.attractor_weight)
    }
}

impl ViewportPredictor for GravitationalPredictor {
    fn update(&mut self, observed_poses: &[SphericalPosition]) {
        for &pose in observed_poses {
            if self.history.len() == GRAVITATIONAL_HISTORY_CAP {
                self.history.pop_front();
            }
            self.history.push_back(pose.finite_or_zero());
        }
    }

    fn predict_positions(&self, horizon_seconds: f64) -> Vec<SphericalPosition> {
        vec![self.settled_pose(); horizon_steps(horizon_seconds, self.segment_seconds)]
    }
}

/// One canonical trajectory: the recent motion it matches against, and the
/// future poses to return when that motion is the closest match.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NavGraphTrajectory {
    pub key_motion: Vec<SphericalPosition>,
    pub future: Vec<SphericalPosition>,
}

/// Matches recent motion against a small library of precomputed
/// trajectories and returns the closest match's future poses (§4.4's
/// "graph of canonical motions"). Falls back to holding the last pose when
/// no trajectory is configured or there isn't enough history yet to match
/// against one.
pub struct NavGraphPredictor {
    segment_seconds: f64,
    trajectories: Vec<NavGraphTrajectory>,
    recent: VecDeque<SphericalPosition>,
}

impl NavGraphPredictor {
    pub fn new(segment_seconds: f64, trajectories: Vec<NavGraphTrajectory>) -> AbrResult<Self> {
        if !(segment_seconds > 0.0) {
            return Err(AbrError::configuration(
                "segment seconds must be positive for a viewport predictor",
            ));
        }
        Ok(Self {
            segment_seconds,
            trajectories,
            recent: VecDeque::new(),
        })
    }

    fn best_match(&self) -> Option<&NavGraphTrajectory> {
        self.trajectories
            .iter()
            .filter(|t| t.key_motion.len() <= self.recent.len() && !t.key_motion.is_empty())
            .min_by(|a, b| {
                let cost_a = motion_distance(&self.recent, &a.key_motion);
                let cost_b = motion_distance(&self.recent, &b.key_motion);
                cost_a.partial_cmp(&cost_b).unwrap_or(std::cmp::Ordering::Equal)
            })
    }
}

fn motion_distance(recent: &VecDeque<SphericalPosition>, key_motion: &[SphericalPosition]) -> f64 {
    let tail_start = recent.len() - key_motion.len();
    recent
        .iter()
        .skip(tail_start)
        .zip(key_motion)
        .map(|(&a, &b)| {
            let cos_angle = a.to_unit_vector().dot(&b.to_unit_vector()).clamp(-1.0, 1.0);
            cos_angle.acos()
        })
        .sum()
}

impl ViewportPredictor for NavGraphPredictor {
    fn update(&mut self, observed_poses: &[SphericalPosition]) {
        for &pose in observed_poses {
            if self.recent.len() == GRAVITATIONAL_HISTORY_CAP {
                self.recent.pop_front();
            }
            self.recent.push_back(pose.finite_or_zero());
        }
    }

    fn predict_positions(&self, horizon_seconds: f64) -> Vec<SphericalPosition> {
        let steps = horizon_steps(horizon_seconds, self.segment_seconds);
        let fallback = self.recent.back().copied().unwrap_or_default();
        match self.best_match() {
            Some(trajectory) => (0..steps)
                .map(|i| {
                    trajectory
                        .future
                        .get(i)
                        .copied()
                        .unwrap_or_else(|| trajectory.future.last().copied().unwrap_or(fallback))
                })
                .collect(),
            None => vec![fallback; steps],
        }
    }
}

/// Returns poses straight from a precomputed oracle trajectory, indexed by
/// how many poses `update` has consumed so far (§4.4's "offline" variant,
/// used to bound the other predictors against ground truth).
pub struct OfflinePredictor {
    segment_seconds: f64,
    trajectory: Vec<SphericalPosition>,
    consumed: usize,
}

impl OfflinePredictor {
    pub fn new(segment_seconds: f64, trajectory: Vec<SphericalPosition>) -> AbrResult<Self> {
        if !(segment_seconds > 0.0) {
            return Err(AbrError::configuration(
                "segment seconds must be positive for a viewport predictor",
            ));
        }
        Ok(Self {
            segment_seconds,
            trajectory,
            consumed: 0,
        })
    }
}

impl ViewportPredictor for OfflinePredictor {
    fn update(&mut self, observed_poses: &[SphericalPosition]) {
        self.consumed += observed_poses.len();
    }

    fn predict_positions(&self, horizon_seconds: f64) -> Vec<SphericalPosition> {
        let steps = horizon_steps(horizon_seconds, self.segment_seconds);
        let fallback = self
            .trajectory
            .get(self.consumed.saturating_sub(1))
            .copied()
            .unwrap_or_default();
        (0..steps)
            .map(|i| self.trajectory.get(self.consumed + i).copied().unwrap_or(fallback))
            .collect()
    }
}

/// Tagged-union options for the five recognized viewport predictor variants
/// (§6), externally tagged for `serde_json` round-tripping.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ViewportPredictorOptions {
    Static,
    Linear {
        history_seconds: f64,
    },
    Gravitational {
        decay: f64,
        attractor_latitude_deg: f64,
        attractor_longitude_deg: f64,
        attractor_weight: f64,
    },
    NavGraph {
        trajectories: Vec<NavGraphTrajectory>,
    },
    Offline {
        trajectory: Vec<SphericalPosition>,
    },
}

pub fn build(
    segment_seconds: f64,
    options: ViewportPredictorOptions,
) -> AbrResult<Box<dyn ViewportPredictor + Send>> {
    match options {
        ViewportPredictorOptions::Static => Ok(Box::new(StaticPredictor::new(segment_seconds)?)),
        ViewportPredictorOptions::Linear { history_seconds } => {
            Ok(Box::new(LinearPredictor::new(segment_seconds, history_seconds)?))
        }
        ViewportPredictorOptions::Gravitational {
            decay,
            attractor_latitude_deg,
            attractor_longitude_deg,
            attractor_weight,
        } => Ok(Box::new(GravitationalPredictor::new(
            segment_seconds,
            decay,
            SphericalPosition::new(attractor_latitude_deg, attractor_longitude_deg),
            attractor_weight,
        )?)),
        ViewportPredictorOptions::NavGraph { trajectories } => {
            Ok(Box::new(NavGraphPredictor::new(segment_seconds, trajectories)?))
        }
        ViewportPredictorOptions::Offline { trajectory } => {
            Ok(Box::new(OfflinePredictor::new(segment_seconds, trajectory)?))
        }
    }
}
