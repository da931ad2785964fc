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
//! `StreamingConfig`, the session-wide configuration every pluggable
//! component (predictors, controllers, allocators, rasterizer) reads.
//! Colocated with `AbrError` because every component crate needs both and
//! neither may depend on the others, mirroring how the original sources'
//! `Base` module carried config alongside error/context types.
use crate::{AbrError, AbrResult};
use serde::{Deserialize, Serialize};

/// Horizontal and vertical field-of-view, in degrees, of the rasterized
/// viewport window (§3).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldOfView {
    pub width_deg: f64,
    pub height_deg: f64,
}

impl FieldOfView {
    pub fn new(width_deg: f64, height_deg: f64) -> Self {
        Self {
            width_deg,
            height_deg,
        }
    }
}

/// Immutable for the lifetime of a session (§3). Field order follows the
/// aggregate-initializer order used throughout the original test sources:
/// `{segmentSeconds, bitrateLadder, tilingCount, defaultFov, maxBufferSeconds}`.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamingConfig {
    segment_seconds: f64,
    bitrate_ladder_mbps: Vec<f64>,
    tiling_count: usize,
    default_fov: FieldOfView,
    max_buffer_seconds: f64,
}

impl StreamingConfig {
    pub fn new(
        segment_seconds: f64,
        bitrate_ladder_mbps: Vec<f64>,
        tiling_count: usize,
        default_fov: FieldOfView,
        max_buffer_seconds: f64,
    ) -> AbrResult<Self> {
        if !(segment_seconds > 0.0) {
            return Err(AbrError::configuration(format!(
                "segment seconds must be positive, got {segment_seconds}"
            )));
        }
        if bitrate_ladder_mbps.is_empty() {
            return Err(AbrError::configuration("bitrate ladder must not be empty"));
        }
        if bitrate_ladder_mbps.windows(2).any(|pair| pair[1] <= pair[0]) {
            return Err(AbrError::configuration(
                "bitrate ladder must be strictly increasing",
            ));
        }
        if tiling_count == 0 {
            return Err(AbrError::configuration("tiling count must be >= 1"));
        }
        if !(max_buffer_seconds > 0.0) {
            return Err(AbrError::configuration(format!(
                "max buffer seconds must be positive, got {max_buffer_seconds}"
            )));
        }
        Ok(Self {
            segment_seconds,
            bitrate_ladder_mbps,
            tiling_count,
            default_fov,
            max_buffer_seconds,
        })
    }

    pub fn segment_seconds(&self) -> f64 {
        self.segment_seconds
    }

    pub fn bitrate_ladder_mbps(&self) -> &[f64] {
        &self.bitrate_ladder_mbps
    }

    pub fn min_rate_mbps(&self) -> f64 {
        self.bitrate_ladder_mbps[0]
    }

    pub fn max_rate_mbps(&self) -> f64 {
        *self.bitrate_ladder_mbps.last().expect("non-empty ladder")
    }

    pub fn tiling_count(&self) -> usize {
        self.tiling_count
    }

    pub fn tiles_per_face(&self) -> usize {
        self.tiling_count * self.tiling_count
    }

    /// `6 * T^2`, the number of tiles in a segment (§3).
    pub fn tile_count(&self) -> usize {
        6 * self.tiles_per_face()
    }

    pub fn default_fov(&self) -> FieldOfView {
        self.default_fov
    }

    pub fn max_buffer_seconds(&self) -> f64 {
        self.max_buffer_seconds
    }

    /// Aggregate bitrate bound `6 * T^2 * rate` for the given per-tile rate.
    pub fn aggregate_bound_mbps(&self, per_tile_rate_mbps: f64) -> f64 {
        self.tile_count() as f64 * per_tile_rate_mbps
    }

    /// Snaps a per-tile rate down to the nearest ladder index not
    /// exceeding it (tie-breaking toward the lower index, invariant 5).
    pub fn ladder_index_not_exceeding(&self, rate_mbps: f64) -> usize {
        match self
            .bitrate_ladder_mbps
            .iter()
            .rposition(|&rate| rate <= rate_mbps)
        {
            Some(index) => index,
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fov() -> FieldOfView {
        FieldOfView::new(60.0, 1.0)
    }

    #[test]
    fn rejects_non_increasing_ladder() {
        let err = StreamingConfig::new(1.0, vec![1.0, 1.0], 1, fov(), 5.0).unwrap_err();
        assert_eq!(err.kind(), crate::AbrErrorKind::Configuration);
    }

    #[test]
    fn rejects_zero_tiling_count() {
        assert!(StreamingConfig::new(1.0, vec![1.0, 2.0], 0, fov(), 5.0).is_err());
    }

    #[test]
    fn tile_count_is_six_t_squared() {
        let config = StreamingConfig::new(1.0, vec![1.0, 2.0, 4.0, 8.0], 2, fov(), 5.0).unwrap();
        assert_eq!(config.tile_count(), 24);
        assert_eq!(config.aggregate_bound_mbps(1.0), 24.0);
    }

    #[test]
    fn ladder_index_not_exceeding_rounds_down() {
        let config = StreamingConfig::new(1.0, vec![1.0, 2.0, 4.0, 8.0], 1, fov(), 5.0).unwrap();
        assert_eq!(config.ladder_index_not_exceeding(3.9), 1);
        assert_eq!(config.ladder_index_not_exceeding(0.5), 0);
        assert_eq!(config.ladder_index_not_exceeding(100.0), 3);
    }
}
