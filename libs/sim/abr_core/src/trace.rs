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
//! Regularly sampled trace views (§3): a network trace is samples of
//! throughput (Mbps), a viewport trace is samples of head pose. Sample
//! intervals need not divide the segment duration; §4.7's straddling rule
//! is implemented here as a linear time-weighted average (§9 Open
//! Question iii).
use abr_error::{AbrError, AbrResult};
use geodesy::SphericalPosition;

/// A non-owning view over one session's network trace.
#[derive(Clone, Copy)]
pub struct NetworkSeriesView<'a> {
    pub interval_seconds: f64,
    pub samples: &'a [f64],
}

impl<'a> NetworkSeriesView<'a> {
    pub fn new(interval_seconds: f64, samples: &'a [f64]) -> Self {
        Self {
            interval_seconds,
            samples,
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 * self.interval_seconds
    }

    /// Time-weighted average throughput over `[start, end)`, clamping
    /// non-finite samples to zero and holding the last sample for a tail
    /// shortfall of less than one segment (the caller is responsible for
    /// rejecting a trace that is short by more, per §7's input-shape
    /// error).
    pub fn segment_average(&self, start: f64, end: f64) -> AbrResult<f64> {
        if self.samples.is_empty() {
            return Err(AbrError::input_shape("network trace has no samples"));
        }
        if start >= self.duration_seconds() {
            return Err(AbrError::input_shape(format!(
                "network trace ends at {:.3}s, segment starting at {start:.3}s has no coverage",
                self.duration_seconds()
            )));
        }
        let interval = self.interval_seconds;
        let mut index = (start / interval).floor().max(0.0) as usize;
        let mut cursor = start;
        let mut weighted_sum = 0.0;
        let mut covered = 0.0;
        while cursor < end {
            let sample = if index < self.samples.len() {
                sanitize(self.samples[index])
            } else {
                sanitize(*self.samples.last().expect("checked non-empty"))
            };
            let sample_end = (index + 1) as f64 * interval;
            let segment_end = sample_end.min(end);
            let width = (segment_end - cursor).max(0.0);
            weighted_sum += sample * width;
            covered += width;
            cursor = segment_end;
            index += 1;
        }
        if covered <= 0.0 {
            return Err(AbrError::input_shape(
                "no overlap between the requested window and the network trace",
            ));
        }
        Ok(weighted_sum / covered)
    }
}

fn sanitize(sample: f64) -> f64 {
    if sample.is_finite() {
        sample.max(0.0)
    } else {
        0.0
    }
}

/// A non-owning view over one session's viewport trace.
#[derive(Clone, Copy)]
pub struct ViewportSeriesView<'a> {
    pub interval_seconds: f64,
    pub positions: &'a [SphericalPosition],
}

impl<'a> ViewportSeriesView<'a> {
    pub fn new(interval_seconds: f64, positions: &'a [SphericalPosition]) -> Self {
        Self {
            interval_seconds,
            positions,
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        self.positions.len() as f64 * self.interval_seconds
    }

    /// Poses sampled at `i * interval_seconds` for every `i` with
    /// `start <= i * interval_seconds < end`.
    pub fn poses_in(&self, start: f64, end: f64) -> &'a [SphericalPosition] {
        let interval = self.interval_seconds;
        let eps = interval * 1e-9;
        let first = (((start / interval) - eps).ceil().max(0.0)) as usize;
        let last_exclusive = (((end / interval) - eps).ceil().max(0.0)) as usize;
        let first = first.min(self.positions.len());
        let last_exclusive = last_exclusive.min(self.positions.len());
        if first >= last_exclusive {
            &[]
        } else {
            &self.positions[first..last_exclusive]
        }
    }

}
