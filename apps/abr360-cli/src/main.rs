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
use std::{fs, path::PathBuf};

use abr_core::{simulate_abr, simulate_viewport_prediction, AbrSessionOptions, NetworkSeriesView, ViewportSeriesView};
use abr_error::{FieldOfView, StreamingConfig};
use aggregate_controllers::AggregateControllerOptions;
use anyhow::{Context, Result};
use bitrate_allocators::BitrateAllocatorOptions;
use geodesy::SphericalPosition;
use serde::{de::DeserializeOwned, Deserialize};
use structopt::StructOpt;
use throughput_predictors::ThroughputPredictorOptions;
use viewport_predictors::ViewportPredictorOptions;

/// Drives the ABR360 simulation engine over JSON trace files on disk.
#[derive(Debug, StructOpt)]
enum Opt {
    /// Run full ABR sessions end to end and print each session's summary.
    Abr {
        /// StreamingConfig fields, as JSON.
        #[structopt(long)]
        config: PathBuf,
        /// The four pluggable-strategy options, as JSON.
        #[structopt(long)]
        session: PathBuf,
        /// A JSON array of `{interval_seconds, samples}` network traces.
        #[structopt(long)]
        network_traces: PathBuf,
        /// A JSON array of `{interval_seconds, positions}` viewport traces.
        #[structopt(long)]
        viewport_traces: PathBuf,
    },
    /// Sweep a viewport predictor over recorded traces.
    ViewportPrediction {
        /// Prediction horizon, in segments.
        #[structopt(long)]
        window_length: usize,
        #[structopt(long)]
        segment_seconds: f64,
        /// A single `ViewportPredictorOptions` variant, as JSON.
        #[structopt(long)]
        predictor: PathBuf,
        /// A JSON array of `{interval_seconds, positions}` viewport traces.
        #[structopt(long)]
        viewport_traces: PathBuf,
    },
}

#[derive(Deserialize)]
struct ConfigFile {
    segment_seconds: f64,
    bitrate_ladder_mbps: Vec<f64>,
    tiling_count: usize,
    default_fov: FieldOfView,
    max_buffer_seconds: f64,
}

#[derive(Deserialize)]
struct SessionOptionsFile {
    throughput_predictor: ThroughputPredictorOptions,
    viewport_predictor: ViewportPredictorOptions,
    aggregate_controller: AggregateControllerOptions,
    bitrate_allocator: BitrateAllocatorOptions,
}

#[derive(Deserialize)]
struct NetworkTraceFile {
    interval_seconds: f64,
    samples: Vec<f64>,
}

#[derive(Deserialize)]
struct ViewportTraceFile {
    interval_seconds: f64,
    positions: Vec<SphericalPosition>,
}

fn read_json<T: DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    match Opt::from_args() {
        Opt::Abr {
            config,
            session,
            network_traces,
            viewport_traces,
        } => run_abr(config, session, network_traces, viewport_traces),
        Opt::ViewportPrediction {
            window_length,
            segment_seconds,
            predictor,
            viewport_traces,
        } => run_viewport_prediction(window_length, segment_seconds, predictor, viewport_traces),
    }
}

fn run_abr(config_path: PathBuf, session_path: PathBuf, network_path: PathBuf, viewport_path: PathBuf) -> Result<()> {
    let config_file: ConfigFile = read_json(&config_path)?;
    let config = StreamingConfig::new(
        config_file.segment_seconds,
        config_file.bitrate_ladder_mbps,
        config_file.tiling_count,
        config_file.default_fov,
        config_file.max_buffer_seconds,
    )?;

    let session_file: SessionOptionsFile = read_json(&session_path)?;
    let options = AbrSessionOptions {
        throughput_predictor: session_file.throughput_predictor,
        viewport_predictor: session_file.viewport_predictor,
        aggregate_controller: session_file.aggregate_controller,
        bitrate_allocator: session_file.bitrate_allocator,
    };

    let network_files: Vec<NetworkTraceFile> = read_json(&network_path)?;
    let viewport_files: Vec<ViewportTraceFile> = read_json(&viewport_path)?;
    let network_traces: Vec<NetworkSeriesView> = network_files
        .iter()
        .map(|trace| NetworkSeriesView::new(trace.interval_seconds, &trace.samples))
        .collect();
    let viewport_traces: Vec<ViewportSeriesView> = viewport_files
        .iter()
        .map(|trace| ViewportSeriesView::new(trace.interval_seconds, &trace.positions))
        .collect();

    let outcomes = simulate_abr(&config, options, &network_traces, &viewport_traces)?;
    for (session_index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(outcome) => {
                tracing::info!(
                    session_index,
                    segments = outcome.segment_count(),
                    rebuffering_seconds = outcome.rebuffering_seconds,
                    "session complete"
                );
                println!(
                    "session {session_index}: {} segments, {:.3}s rebuffering",
                    outcome.segment_count(),
                    outcome.rebuffering_seconds
                );
            }
            Err(failure) => {
                tracing::warn!(session_index, %failure, "session aborted");
                println!("session {session_index}: {failure}");
            }
        }
    }
    Ok(())
}

fn run_viewport_prediction(
    window_length: usize,
    segment_seconds: f64,
    predictor_path: PathBuf,
    viewport_path: PathBuf,
) -> Result<()> {
    let predictor_options: ViewportPredictorOptions = read_json(&predictor_path)?;
    let viewport_files: Vec<ViewportTraceFile> = read_json(&viewport_path)?;
    let viewport_traces: Vec<ViewportSeriesView> = viewport_files
        .iter()
        .map(|trace| ViewportSeriesView::new(trace.interval_seconds, &trace.positions))
        .collect();

    let sweeps = simulate_viewport_prediction(window_length, segment_seconds, predictor_options, &viewport_traces)?;
    for (session_index, rows) in sweeps.iter().enumerate() {
        println!("session {session_index}: {} predicted positions", rows.len());
    }
    Ok(())
}
