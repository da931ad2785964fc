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
//! Spherical head-pose positions and the small amount of great-circle
//! arithmetic the viewport predictors and rasterizer build on.
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A viewer head pose on the unit sphere, latitude/longitude in degrees.
///
/// Latitude is in `[-90, 90]`; longitude is in `(-180, 180]`. Per the data
/// model, angles are stored exactly as given on construction (no implicit
/// wrap) and are only normalized when an operation here needs it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SphericalPosition {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
}

impl SphericalPosition {
    pub fn new(latitude_deg: f64, longitude_deg: f64) -> Self {
        Self {
            latitude_deg,
            longitude_deg,
        }
    }

    /// Non-finite inputs are clamped to the pose's safest fallback: zero.
    /// Used at trace-ingestion boundaries per the failure semantics in §4.7.
    pub fn finite_or_zero(self) -> Self {
        Self {
            latitude_deg: if self.latitude_deg.is_finite() {
                self.latitude_deg
            } else {
                0.0
            },
            longitude_deg: if self.longitude_deg.is_finite() {
                self.longitude_deg
            } else {
                0.0
            },
        }
    }

    pub fn normalized(self) -> Self {
        Self {
            latitude_deg: self.latitude_deg.clamp(-90.0, 90.0),
            longitude_deg: normalize_longitude_deg(self.longitude_deg),
        }
    }

    /// Direction on the unit sphere in a right-handed frame where `+Z` is
    /// `(lat=0, lon=0)`, `+X` is `(lat=0, lon=90)`, and `+Y` is the north
    /// pole (`lat=90`). This is the frame the cube-face geometry in
    /// `geometry` projects against.
    pub fn to_unit_vector(self) -> Vector3<f64> {
        let lat = self.latitude_deg.to_radians();
        let lon = self.longitude_deg.to_radians();
        Vector3::new(lat.cos() * lon.sin(), lat.sin(), lat.cos() * lon.cos())
    }

    pub fn from_unit_vector(v: Vector3<f64>) -> Self {
        let v = v.normalize();
        let latitude_deg = v.y.clamp(-1.0, 1.0).asin().to_degrees();
        let longitude_deg = v.x.atan2(v.z).to_degrees();
        Self {
            latitude_deg,
            longitude_deg,
        }
    }
}

impl fmt::Display for SphericalPosition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({:.4}, {:.4})", self.latitude_deg, self.longitude_deg)
    }
}

/// Wraps a longitude in degrees into `(-180, 180]`.
pub fn normalize_longitude_deg(lon_deg: f64) -> f64 {
    let wrapped = (lon_deg + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped <= -180.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}

/// Signed shortest-arc delta `to - from`, in `(-180, 180]` degrees.
///
/// Used by the linear viewport predictor so a longitude crossing the
/// antimeridian doesn't look like a 350-degree jump.
pub fn shortest_arc_delta_deg(from_deg: f64, to_deg: f64) -> f64 {
    normalize_longitude_deg(to_deg - from_deg)
}

/// Great-circle interpolation between two poses. `t = 0` yields `a`, `t = 1`
/// yields `b`; values outside `[0, 1]` continue the rotation along the same
/// great circle, which is what a constant-angular-velocity extrapolation
/// needs.
pub fn great_circle_interpolate(a: SphericalPosition, b: SphericalPosition, t: f64) -> SphericalPosition {
    let va = a.to_unit_vector();
    let vb = b.to_unit_vector();
    let cos_angle = va.dot(&vb).clamp(-1.0, 1.0);
    let angle = cos_angle.acos();
    if angle.abs() < 1e-12 {
        return a;
    }
    let sin_angle = angle.sin();
    let wa = ((1.0 - t) * angle).sin() / sin_angle;
    let wb = (t * angle).sin() / sin_angle;
    SphericalPosition::from_unit_vector(va * wa + vb * wb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn normalize_longitude_wraps_into_range() {
        assert_abs_diff_eq!(normalize_longitude_deg(180.0), 180.0, epsilon = 1e-9);
        assert_abs_diff_eq!(normalize_longitude_deg(-180.0), 180.0, epsilon = 1e-9);
        assert_abs_diff_eq!(normalize_longitude_deg(181.0), -179.0, epsilon = 1e-9);
        assert_abs_diff_eq!(normalize_longitude_deg(-181.0), 179.0, epsilon = 1e-9);
        assert_abs_diff_eq!(normalize_longitude_deg(0.0), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn shortest_arc_delta_prefers_the_short_way() {
        assert_abs_diff_eq!(shortest_arc_delta_deg(150.0, -160.0), 50.0, epsilon = 1e-9);
        assert_abs_diff_eq!(shortest_arc_delta_deg(0.0, 10.0), 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(shortest_arc_delta_deg(10.0, 0.0), -10.0, epsilon = 1e-9);
    }

    #[test]
    fn unit_vector_round_trip() {
        for &(lat, lon) in &[(0.0, 0.0), (45.0, 90.0), (-30.0, -135.0), (89.0, 179.0)] {
            let p = SphericalPosition::new(lat, lon);
            let back = SphericalPosition::from_unit_vector(p.to_unit_vector());
            assert_abs_diff_eq!(back.latitude_deg, lat, epsilon = 1e-9);
            assert_abs_diff_eq!(back.longitude_deg, lon, epsilon = 1e-9);
        }
    }

    #[test]
    fn great_circle_interpolate_identity_at_endpoints() {
        let a = SphericalPosition::new(0.0, -90.0);
        let b = SphericalPosition::new(0.0, 90.0);
        let mid = great_circle_interpolate(a, b, 0.5);
        // Equidistant from both poles along the equator: either antipodal
        // crossing point is a valid great-circle midpoint.
        assert_abs_diff_eq!(mid.latitude_deg, 0.0, epsilon = 1e-6);
    }
}
