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
//! The viewport rasterizer (C2): `ToDistribution` turns one or more
//! spherical poses into a per-tile probability distribution by sampling a
//! grid of points inside a rectangular field-of-view window and binning
//! each sampled direction into its cube-map tile (§4.2).
use abr_error::StreamingConfig;
use geodesy::SphericalPosition;
use geometry::tile_for_direction;

/// Points per axis in the field-of-view sampling grid. Even, so no sample
/// ever lands exactly on the viewport's center lines; that keeps a pose
/// centered on a tile boundary (a face center, a face seam) split exactly
/// evenly between the tiles it straddles, matching invariant 3 to machine
/// precision for the symmetric reference poses in §8 S4.
const GRID_RESOLUTION: usize = 64;

pub struct ViewportRasterizer {
    tiling_count: usize,
    tile_count: usize,
    fov_width_deg: f64,
    fov_height_deg: f64,
}

impl ViewportRasterizer {
    pub fn new(config: &StreamingConfig) -> Self {
        let fov = config.default_fov();
        Self {
            tiling_count: config.tiling_count(),
            tile_count: config.tile_count(),
            fov_width_deg: fov.width_deg,
            fov_height_deg: fov.height_deg,
        }
    }

    /// `ToDistribution` for a single pose: the FoV rectangle around `pose`,
    /// rasterized into a per-tile area fraction that sums to 1.
    pub fn to_distribution(&self, pose: SphericalPosition) -> Vec<f64> {
        let pose = pose.finite_or_zero();
        let mut counts = vec![0.0_f64; self.tile_count];
        let lat_scale = pose.latitude_deg.to_radians().cos().abs().max(1e-6);
        for row in 0..GRID_RESOLUTION {
            let v = (row as f64 + 0.5) / GRID_RESOLUTION as f64 - 0.5;
            let dv = v * self.fov_height_deg;
            for col in 0..GRID_RESOLUTION {
                let u = (col as f64 + 0.5) / GRID_RESOLUTION as f64 - 0.5;
                let du = u * self.fov_width_deg;
                let sample_lat = (pose.latitude_deg + dv).clamp(-90.0, 90.0);
                let sample_lon = pose.longitude_deg + du / lat_scale;
                let direction = SphericalPosition::new(sample_lat, sample_lon).to_unit_vector();
                let tile = tile_for_direction(direction, self.tiling_count);
                counts[tile] += 1.0;
            }
        }
        let total = (GRID_RESOLUTION * GRID_RESOLUTION) as f64;
        for count in &mut counts {
            *count /= total;
        }
        counts
    }

    /// `ToDistribution` for a sequence of poses: the uniform average of
    /// each pose's distribution (§4.2).
    pub fn to_distribution_many(&self, poses: &[SphericalPosition]) -> Vec<f64> {
        if poses.is_empty() {
            return vec![0.0; self.tile_count];
        }
        let mut sum = vec![0.0_f64; self.tile_count];
        for &pose in poses {
            let per_pose = self.to_distribution(pose);
            for (acc, value) in sum.iter_mut().zip(per_pose) {
                *acc += value;
            }
        }
        let n = poses.len() as f64;
        for value in &mut sum {
            *value /= n;
        }
        sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abr_error::FieldOfView;
    use approx::assert_abs_diff_eq;

    fn config(tiling_count: usize) -> StreamingConfig {
        StreamingConfig::new(
            1.0,
            vec![1.0, 2.0, 4.0, 8.0],
            tiling_count,
            FieldOfView::new(60.0, 1.0),
            5.0,
        )
        .unwrap()
    }

    fn assert_sums_to_one(distribution: &[f64]) {
        let total: f64 = distribution.iter().sum();
        assert_abs_diff_eq!(total, 1.0, epsilon = 1e-9);
        assert!(distribution.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn face_centered_pose_splits_into_four_central_tiles_at_t2() {
        let rasterizer = ViewportRasterizer::new(&config(2));
        let distribution = rasterizer.to_distribution(SphericalPosition::new(0.0, -90.0));
        assert_sums_to_one(&distribution);
        // L is face index 0: its four tiles are global indices 0..4.
        for tile in 0..4 {
            assert_abs_diff_eq!(distribution[tile], 0.25, epsilon = 1e-9);
        }
        assert!(distribution[4..].iter().all(|&v| v.abs() < 1e-9));
    }

    #[test]
    fn without_tiling_each_face_center_is_a_pure_tile() {
        let rasterizer = ViewportRasterizer::new(&config(1));
        let cases = [
            (SphericalPosition::new(0.0, -90.0), 0),  // L
            (SphericalPosition::new(0.0, 90.0), 1),   // R
            (SphericalPosition::new(90.0, 0.0), 2),   // U
            (SphericalPosition::new(-90.0, 0.0), 3),  // D
            (SphericalPosition::new(0.0, -180.0), 4), // B
            (SphericalPosition::new(0.0, 0.0), 5),    // F
        ];
        for (pose, face_index) in cases {
            let distribution = rasterizer.to_distribution(pose);
            assert_sums_to_one(&distribution);
            assert_abs_diff_eq!(distribution[face_index], 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn without_tiling_a_seam_pose_splits_evenly_across_two_faces() {
        let rasterizer = ViewportRasterizer::new(&config(1));
        let cases = [
            (-135.0, 0, 4), // L / B
            (-45.0, 0, 5),  // L / F
            (45.0, 1, 5),   // R / F
            (135.0, 1, 4),  // R / B
        ];
        for (longitude_deg, face_a, face_b) in cases {
            let distribution = rasterizer.to_distribution(SphericalPosition::new(0.0, longitude_deg));
            assert_sums_to_one(&distribution);
            assert_abs_diff_eq!(distribution[face_a], 0.5, epsilon = 1e-9);
            assert_abs_diff_eq!(distribution[face_b], 0.5, epsilon = 1e-9);
            let other_weight: f64 = distribution
                .iter()
                .enumerate()
                .filter(|&(tile, _)| tile != face_a && tile != face_b)
                .map(|(_, &v)| v)
                .sum();
            assert!(other_weight < 1e-9, "pose {longitude_deg}: {distribution:?}");
        }
    }

    /// Exact per-tile vectors at T=2 for all four seam longitudes in
    /// `ViewportSimulatorTest.cpp`'s `BasicSimulation`, not just their
    /// half-sums: a transposed face frame can still split 50/50 across the
    /// right two faces while handing the weight to the wrong two tiles
    /// within each face.
    #[test]
    fn seam_poses_at_t2_split_into_the_exact_reference_tile_pair_per_face() {
        let rasterizer = ViewportRasterizer::new(&config(2));

        let cases: [(f64, [(usize, f64); 4]); 4] = [
            // L (0..4) tiles {0, 1}, B (16..20) tiles {18, 19}.
            (-135.0, [(0, 0.25), (1, 0.25), (18, 0.25), (19, 0.25)]),
            // L (0..4) tiles {2, 3}, F (20..24) tiles {20, 21}.
            (-45.0, [(2, 0.25), (3, 0.25), (20, 0.25), (21, 0.25)]),
            // R (4..8) tiles {4, 5}, F (20..24) tiles {22, 23}.
            (45.0, [(4, 0.25), (5, 0.25), (22, 0.25), (23, 0.25)]),
            // R (4..8) tiles {6, 7}, B (16..20) tiles {16, 17}.
            (135.0, [(6, 0.25), (7, 0.25), (16, 0.25), (17, 0.25)]),
        ];

        for (longitude_deg, expected) in cases {
            let distribution = rasterizer.to_distribution(SphericalPosition::new(0.0, longitude_deg));
            assert_sums_to_one(&distribution);
            for (tile, weight) in expected {
                assert_abs_diff_eq!(distribution[tile], weight, epsilon = 1e-9);
            }
            let nonzero: Vec<usize> = distribution
                .iter()
                .enumerate()
                .filter(|&(_, &v)| v > 1e-9)
                .map(|(tile, _)| tile)
                .collect();
            assert_eq!(nonzero.len(), 4, "pose {longitude_deg}: {nonzero:?}");
        }
    }

    #[test]
    fn a_pair_of_antipodal_face_centers_averages_uniformly() {
        let rasterizer = ViewportRasterizer::new(&config(2));
        let poses = [
            SphericalPosition::new(0.0, -90.0), // L center
            SphericalPosition::new(0.0, 90.0),  // R center
        ];
        let distribution = rasterizer.to_distribution_many(&poses);
        assert_sums_to_one(&distribution);
        for tile in 0..8 {
            assert_abs_diff_eq!(distribution[tile], 0.125, epsilon = 1e-9);
        }
        assert!(distribution[8..].iter().all(|&v| v.abs() < 1e-9));
    }

    #[test]
    fn identical_poses_yield_identical_distributions() {
        let rasterizer = ViewportRasterizer::new(&config(2));
        let pose = SphericalPosition::new(12.0, -47.0);
        assert_eq!(rasterizer.to_distribution(pose), rasterizer.to_distribution(pose));
    }
}
