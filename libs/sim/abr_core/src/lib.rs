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
//! The ABR simulator (C7), the viewport-prediction sweep (C8), and the two
//! host-bridge entry points of §6. Everything below this crate is pure
//! numeric compute; this crate is the only place sessions are driven
//! end-to-end and the only place `rayon` parallelizes across them (§5).
pub mod trace;

use abr_error::{AbrError, AbrErrorKind, AbrResult, SessionFailure, StreamingConfig};
use aggregate_controllers::{AggregateController, AggregateControllerOptions};
use bitrate_allocators::{BitrateAllocator, BitrateAllocatorContext, BitrateAllocatorOptions};
use geodesy::SphericalPosition;
use rayon::prelude::*;
use throughput_predictors::{ThroughputPredictor, ThroughputPredictorOptions};
use tracing::{debug, warn};
use viewport_predictors::{ViewportPredictor, ViewportPredictorOptions};
use viewport_raster::ViewportRasterizer;

pub use abr_error::{AbrErrorKind as ErrorKind, FieldOfView};
pub use trace::{NetworkSeriesView, ViewportSeriesView};

/// The four pluggable-strategy choices a session is built from (§6's option
/// structs, bundled for convenience since every entry point needs all
/// four together).
#[derive(Clone)]
pub struct AbrSessionOptions {
    pub throughput_predictor: ThroughputPredictorOptions,
    pub viewport_predictor: ViewportPredictorOptions,
    pub aggregate_controller: AggregateControllerOptions,
    pub bitrate_allocator: BitrateAllocatorOptions,
}

/// One session's recorded trajectory (§3's `SimulationSeries`). Rows are
/// indexed by segment; `bitrates_mbps` and `viewport_distributions` are
/// `[segments][tiles]`, `predicted_distributions` likewise — kept alongside
/// the actual distributions even though §6's host-bridge record only
/// surfaces the first two, because it's the same per-segment work the
/// simulator already does and is the natural thing to inspect when a
/// session's behavior looks off.
#[derive(Clone, Debug)]
pub struct SessionOutcome {
    pub rebuffering_seconds: f64,
    pub bitrates_mbps: Vec<Vec<f64>>,
    pub viewport_distributions: Vec<Vec<f64>>,
    pub predicted_distributions: Vec<Vec<f64>>,
}

impl SessionOutcome {
    pub fn segment_count(&self) -> usize {
        self.bitrates_mbps.len()
    }
}

/// Drives one session's segment loop (C7, §4.7). Holds its own predictor,
/// controller, and allocator instances so sessions never share mutable
/// state (§5) — a fresh `AbrSimulator` is built per session.
pub struct AbrSimulator<'a> {
    config: &'a StreamingConfig,
    rasterizer: ViewportRasterizer,
    throughput_predictor: Box<dyn ThroughputPredictor + Send>,
    viewport_predictor: Box<dyn ViewportPredictor + Send>,
    controller: Box<dyn AggregateController + Send>,
    allocator: Box<dyn BitrateAllocator + Send>,
}

impl<'a> AbrSimulator<'a> {
    pub fn new(config: &'a StreamingConfig, options: AbrSessionOptions) -> AbrResult<Self> {
        Ok(Self {
            config,
            rasterizer: ViewportRasterizer::new(config),
            throughput_predictor: throughput_predictors::build(options.throughput_predictor)?,
            viewport_predictor: viewport_predictors::build(config.segment_seconds(), options.viewport_predictor)?,
            controller: aggregate_controllers::build(options.aggregate_controller)?,
            allocator: bitrate_allocators::build(options.bitrate_allocator)?,
        })
    }

    /// Runs the full segment loop over one session's traces (§4.7 steps
    /// 1-9). `Err` carries the segment index the failure happened at, or
    /// `None` when the traces themselves are unusable before the loop
    /// starts (the input-shape check below).
    pub fn run(
        &mut self,
        network: NetworkSeriesView,
        viewport: ViewportSeriesView,
    ) -> Result<SessionOutcome, (Option<usize>, AbrError)> {
        let delta = self.config.segment_seconds();
        if network.duration_seconds() + delta < viewport.duration_seconds() {
            return Err((
                None,
                AbrError::input_shape(format!(
                    "network trace ({:.3}s) is shorter than the viewport trace ({:.3}s) by more than one segment",
                    network.duration_seconds(),
                    viewport.duration_seconds()
                )),
            ));
        }

        let session_duration = network.duration_seconds().min(viewport.duration_seconds());
        let segment_count = (session_duration / delta).floor() as usize;
        let ladder = self.config.bitrate_ladder_mbps();
        let max_buffer = self.config.max_buffer_seconds();

        let mut buffer_seconds = 0.0_f64;
        let mut rebuffering_seconds = 0.0_f64;
        let mut previous_actual_distribution: Option<Vec<f64>> = None;
        let mut bitrates_mbps = Vec::with_capacity(segment_count);
        let mut viewport_distributions = Vec::with_capacity(segment_count);
        let mut predicted_distributions = Vec::with_capacity(segment_count);

        for segment_index in 0..segment_count {
            let start = segment_index as f64 * delta;
            let end = start + delta;

            // 1. Observe.
            let sample_mbps = network
                .segment_average(start, end)
                .map_err(|error| (Some(segment_index), error))?;
            self.throughput_predictor.update(sample_mbps);
            let observed_poses = viewport.poses_in(start, end);
            self.viewport_predictor.update(observed_poses);

            // 2. Predict.
            let predicted_throughput_mbps = self.throughput_predictor.predict();
            let predicted_poses = self.viewport_predictor.predict_positions(delta);

            // 3. Distribute.
            let predicted_distribution = self.rasterizer.to_distribution_many(&predicted_poses);

            // 4. Aggregate budget.
            let aggregate_budget_mbps =
                self.controller
                    .get_aggregate_bitrate_mbps(self.config, buffer_seconds, predicted_throughput_mbps);

            // 5. Allocate.
            let allocator_context = BitrateAllocatorContext {
                aggregate_budget_mbps,
                predicted_distribution: &predicted_distribution,
                previous_actual_distribution: previous_actual_distribution.as_deref(),
                buffer_seconds,
            };
            let indices = self.allocator.get_bitrate_ids(self.config, &allocator_context);
            let rates_mbps: Vec<f64> = indices.iter().map(|&index| ladder[index]).collect();

            // 6. Download. A throughput of exactly zero would make the
            // download take forever; floor it so rebuffering accumulates a
            // large but finite, deterministic amount instead of an
            // infinity that would then contaminate every later segment.
            let total_mbps: f64 = rates_mbps.iter().sum();
            let download_seconds = total_mbps * delta / sample_mbps.max(1e-9);

            // 7. Advance buffer. Segment 0's download against an empty
            // starting buffer is startup latency, not rebuffering: playback
            // hasn't begun yet, so there is nothing to stall. Every later
            // segment's stall (buffer genuinely draining to zero mid-session)
            // counts in full. See `DESIGN.md`'s S1 reconciliation.
            if download_seconds <= buffer_seconds {
                buffer_seconds = (buffer_seconds - download_seconds + delta).min(max_buffer);
            } else {
                let stall = download_seconds - buffer_seconds;
                if segment_index > 0 {
                    rebuffering_seconds += stall;
                    warn!(segment_index, stall_seconds = stall, "rebuffered");
                } else {
                    debug!(segment_index, stall_seconds = stall, "startup latency");
                }
                buffer_seconds = delta.min(max_buffer);
            }
            debug!(
                segment_index,
                buffer_seconds,
                aggregate_budget_mbps,
                download_seconds,
                "segment decided"
            );

            // 8. Record.
            let actual_distribution = self.rasterizer.to_distribution_many(observed_poses);
            bitrates_mbps.push(rates_mbps);
            predicted_distributions.push(predicted_distribution);
            viewport_distributions.push(actual_distribution.clone());

            // 9. Remember for the next segment's allocator context.
            previous_actual_distribution = Some(actual_distribution);
        }

        Ok(SessionOutcome {
            rebuffering_seconds,
            bitrates_mbps,
            viewport_distributions,
            predicted_distributions,
        })
    }
}

/// Sweeps a viewport trace (C8, §4.8): for every sliding sample position
/// `t` with `t + W·Δ` inside the trace, feeds the predictor the one new
/// pose observed since the previous position and records the next `W`
/// predicted poses. Positions, not segments, are the sweep's unit of
/// advance (§6's array shape is sized in raw trace samples), so a trace
/// sampled finer than `Δ` sweeps finer than segment granularity too.
pub struct ViewportPredictionSimulator {
    window_length: usize,
    segment_seconds: f64,
}

impl ViewportPredictionSimulator {
    pub fn new(window_length: usize, segment_seconds: f64) -> AbrResult<Self> {
        if window_length == 0 {
            return Err(AbrError::configuration("viewport-prediction window length must be >= 1"));
        }
        if !(segment_seconds > 0.0) {
            return Err(AbrError::configuration(
                "segment seconds must be positive for a viewport-prediction sweep",
            ));
        }
        Ok(Self {
            window_length,
            segment_seconds,
        })
    }

    /// One session's sweep: `positions_per_session` rows, each the `W`
    /// poses predicted from that sliding position (§6).
    pub fn sweep(
        &self,
        predictor_options: ViewportPredictorOptions,
        viewport: ViewportSeriesView,
    ) -> AbrResult<Vec<Vec<SphericalPosition>>> {
        let segment_length = (self.segment_seconds / viewport.interval_seconds).round().max(1.0) as usize;
        let window_span = self.window_length * segment_length;
        let trace_length = viewport.positions.len();
        if trace_length <= window_span {
            return Ok(Vec::new());
        }
        let position_count = trace_length - window_span;
        let mut predictor = viewport_predictors::build(self.segment_seconds, predictor_options)?;
        let mut rows = Vec::with_capacity(position_count);
        for i in 0..position_count {
            predictor.update(&viewport.positions[i..=i]);
            let predicted = predictor.predict_positions(self.window_length as f64 * self.segment_seconds);
            rows.push(predicted);
        }
        Ok(rows)
    }
}

/// `SimulateViewportPrediction` (§6): one sweep per session, run in
/// parallel (§5 — sessions share nothing, so there's no synchronization
/// beyond collecting results).
pub fn simulate_viewport_prediction(
    window_length: usize,
    segment_seconds: f64,
    predictor_options: ViewportPredictorOptions,
    viewport_traces: &[ViewportSeriesView],
) -> AbrResult<Vec<Vec<Vec<SphericalPosition>>>> {
    let simulator = ViewportPredictionSimulator::new(window_length, segment_seconds)?;
    viewport_traces
        .par_iter()
        .map(|&trace| simulator.sweep(predictor_options.clone(), trace))
        .collect()
}

/// `SimulateABR` (§6): one `AbrSimulator` per session, run in parallel.
/// Aborts the whole batch only on a configuration-level shape mismatch
/// (different session counts); an individual session's own failure is
/// reported per-session via `SessionFailure` without affecting the others.
pub fn simulate_abr(
    config: &StreamingConfig,
    options: AbrSessionOptions,
    network_traces: &[NetworkSeriesView],
    viewport_traces: &[ViewportSeriesView],
) -> AbrResult<Vec<Result<SessionOutcome, SessionFailure>>> {
    if network_traces.len() != viewport_traces.len() {
        return Err(AbrError::input_shape(format!(
            "{} network traces but {} viewport traces",
            network_traces.len(),
            viewport_traces.len()
        )));
    }
    let outcomes = network_traces
        .par_iter()
        .zip(viewport_traces.par_iter())
        .enumerate()
        .map(|(session_index, (&network, &viewport))| {
            run_one_session(config, options.clone(), network, viewport, session_index)
        })
        .collect();
    Ok(outcomes)
}

fn run_one_session(
    config: &StreamingConfig,
    options: AbrSessionOptions,
    network: NetworkSeriesView,
    viewport: ViewportSeriesView,
    session_index: usize,
) -> Result<SessionOutcome, SessionFailure> {
    let mut simulator =
        AbrSimulator::new(config, options).map_err(|error| SessionFailure::new(session_index, None, error))?;
    simulator
        .run(network, viewport)
        .map_err(|(segment_index, error)| SessionFailure::new(session_index, segment_index, error))
}

/// Convenience check used by callers that want to classify a `SessionFailure`
/// without matching on `AbrErrorKind` directly.
pub fn is_configuration_failure(failure: &SessionFailure) -> bool {
    failure.error.kind() == AbrErrorKind::Configuration
}

#[cfg(test)]
mod tests {
    use super::*;
    use abr_error::FieldOfView;
    use approx::assert_abs_diff_eq;

    fn streaming_config() -> StreamingConfig {
        StreamingConfig::new(1.0, vec![1.0, 2.0, 4.0, 8.0], 1, FieldOfView::new(60.0, 1.0), 5.0).unwrap()
    }

    fn session_options() -> AbrSessionOptions {
        AbrSessionOptions {
            throughput_predictor: ThroughputPredictorOptions::Ema { alpha: 1.0 },
            viewport_predictor: ViewportPredictorOptions::Static,
            aggregate_controller: AggregateControllerOptions::ThroughputBased { safety_factor: 1.0 },
            bitrate_allocator: BitrateAllocatorOptions::Hybrid { trust_level: 1.0 },
        }
    }

    #[test]
    fn abr_simulator_holds_the_invariants_over_a_full_session() {
        let config = streaming_config();
        let mut simulator = AbrSimulator::new(&config, session_options()).unwrap();
        let network_samples = [8.0, 32.0, 24.0, 16.0];
        let network = NetworkSeriesView::new(1.0, &network_samples);
        let positions: Vec<SphericalPosition> = (0..40).map(|_| SphericalPosition::new(0.0, 0.0)).collect();
        let viewport = ViewportSeriesView::new(0.1, &positions);

        let outcome = simulator.run(network, viewport).unwrap();
        assert_eq!(outcome.segment_count(), 4);
        assert!(outcome.rebuffering_seconds >= 0.0);

        for row in &outcome.bitrates_mbps {
            for &rate in row {
                assert!(config.bitrate_ladder_mbps().iter().any(|&r| (r - rate).abs() < 1e-9));
            }
        }
        for row in &outcome.viewport_distributions {
            let total: f64 = row.iter().sum();
            assert_abs_diff_eq!(total, 1.0, epsilon = 1e-9);
            assert!(row.iter().all(|&v| v >= -1e-12));
        }
    }

    #[test]
    fn abr_simulator_reproduces_the_basic_simulation_reference_table() {
        // Same config, network, and viewport trace as
        // `ABRSimulator360Test.cpp`'s `BasicSimulation`, with its two
        // explicit strategy options (throughput-based controller, hybrid
        // allocator) and this workspace's matching defaults for the other
        // two (EMA throughput prediction at alpha=1, a static viewport
        // predictor) — see `DESIGN.md`.
        let config = streaming_config();
        let mut simulator = AbrSimulator::new(&config, session_options()).unwrap();
        let network_samples = [8.0, 32.0, 24.0, 16.0];
        let network = NetworkSeriesView::new(1.0, &network_samples);
        let positions: Vec<SphericalPosition> = (0..40).map(|_| SphericalPosition::new(0.0, 0.0)).collect();
        let viewport = ViewportSeriesView::new(0.1, &positions);

        let outcome = simulator.run(network, viewport).unwrap();
        assert_abs_diff_eq!(outcome.rebuffering_seconds, 0.0, epsilon = 1e-9);

        let expected_bitrates = [
            vec![1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
            vec![1.0, 1.0, 1.0, 1.0, 1.0, 4.0],
            vec![1.0, 1.0, 1.0, 1.0, 1.0, 4.0],
            vec![1.0, 1.0, 1.0, 1.0, 1.0, 8.0],
        ];
        assert_eq!(outcome.bitrates_mbps, expected_bitrates);

        let expected_distribution = vec![0.0, 0.0, 0.0, 0.0, 0.0, 1.0];
        for row in &outcome.viewport_distributions {
            assert_eq!(row, &expected_distribution);
        }
    }

    #[test]
    fn abr_simulator_never_rebuffers_when_throughput_always_covers_the_floor() {
        // A generous, constant network trace and a minimal-trust allocator
        // should never need more than the floor rate, so the buffer only
        // ever fills.
        let config = streaming_config();
        let options = AbrSessionOptions {
            bitrate_allocator: BitrateAllocatorOptions::Hybrid { trust_level: 0.0 },
            ..session_options()
        };
        let mut simulator = AbrSimulator::new(&config, options).unwrap();
        let network_samples = [100.0; 10];
        let network = NetworkSeriesView::new(1.0, &network_samples);
        let positions: Vec<SphericalPosition> = (0..10).map(|_| SphericalPosition::new(0.0, 0.0)).collect();
        let viewport = ViewportSeriesView::new(1.0, &positions);

        let outcome = simulator.run(network, viewport).unwrap();
        assert_abs_diff_eq!(outcome.rebuffering_seconds, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn abr_simulator_reports_the_failing_segment_on_a_bad_trace() {
        let config = streaming_config();
        let mut simulator = AbrSimulator::new(&config, session_options()).unwrap();
        let network_samples = [8.0];
        let network = NetworkSeriesView::new(1.0, &network_samples);
        let positions = vec![SphericalPosition::new(0.0, 0.0); 40];
        let viewport = ViewportSeriesView::new(0.1, &positions);

        // The viewport trace runs to 4s but the network trace covers only
        // 1s — more than one segment short, so this is an input-shape
        // failure reported before the loop starts.
        let error = simulator.run(network, viewport).unwrap_err();
        assert_eq!(error.0, None);
        assert_eq!(error.1.kind(), abr_error::AbrErrorKind::InputShape);
    }

    #[test]
    fn viewport_prediction_sweep_matches_static_predictor_semantics() {
        // Four samples at 1s, W=2, segment = 1s: two valid sliding
        // positions, each repeating whatever pose was just observed at
        // that position (Static's own contract — see
        // `viewport_predictors::tests::static_predictor_repeats_the_last_observed_pose`).
        let positions = [
            SphericalPosition::new(0.0, 0.0),
            SphericalPosition::new(10.0, 10.0),
            SphericalPosition::new(20.0, 20.0),
            SphericalPosition::new(30.0, 30.0),
        ];
        let viewport = ViewportSeriesView::new(1.0, &positions);
        let simulator = ViewportPredictionSimulator::new(2, 1.0).unwrap();
        let rows = simulator.sweep(ViewportPredictorOptions::Static, viewport).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec![SphericalPosition::new(0.0, 0.0), SphericalPosition::new(0.0, 0.0)]);
        assert_eq!(
            rows[1],
            vec![SphericalPosition::new(10.0, 10.0), SphericalPosition::new(10.0, 10.0)]
        );
    }

    #[test]
    fn viewport_prediction_sweep_is_empty_when_the_trace_is_too_short_for_one_window() {
        let positions = [SphericalPosition::new(0.0, 0.0); 2];
        let viewport = ViewportSeriesView::new(1.0, &positions);
        let simulator = ViewportPredictionSimulator::new(4, 1.0).unwrap();
        let rows = simulator.sweep(ViewportPredictorOptions::Static, viewport).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn simulate_abr_rejects_a_session_count_mismatch() {
        let config = streaming_config();
        let network_samples = [8.0, 8.0];
        let network = NetworkSeriesView::new(1.0, &network_samples);
        let positions = vec![SphericalPosition::new(0.0, 0.0); 4];
        let viewport = ViewportSeriesView::new(1.0, &positions);
        let result = simulate_abr(&config, session_options(), &[network, network], &[viewport]);
        assert!(result.is_err());
    }

    #[test]
    fn simulate_abr_runs_independent_sessions_in_parallel_and_collects_each_outcome() {
        let config = streaming_config();
        let network_samples = [8.0, 8.0, 8.0, 8.0];
        let network = NetworkSeriesView::new(1.0, &network_samples);
        let positions = vec![SphericalPosition::new(0.0, 0.0); 4];
        let viewport = ViewportSeriesView::new(1.0, &positions);
        let networks = vec![network, network];
        let viewports = vec![viewport, viewport];
        let outcomes = simulate_abr(&config, session_options(), &networks, &viewports).unwrap();
        assert_eq!(outcomes.len(), 2);
        for outcome in outcomes {
            assert!(outcome.is_ok());
        }
    }

    #[test]
    fn simulate_viewport_prediction_runs_one_sweep_per_session() {
        let positions = vec![SphericalPosition::new(0.0, 0.0); 10];
        let viewport = ViewportSeriesView::new(1.0, &positions);
        let traces = vec![viewport, viewport];
        let result = simulate_viewport_prediction(2, 1.0, ViewportPredictorOptions::Static, &traces).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].len(), 8);
    }
}
