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
//! Spherical-to-cube-face mapping and row-major tile indexing (C1).
//!
//! Each cube face is an orthonormal `(right, up, normal)` frame so that
//! the gnomonic projection of a direction vector onto its dominant face is
//! a pair of dot products scaled by `1 / dot(direction, normal)`.
use geodesy::SphericalPosition;
use nalgebra::Vector3;

/// One of the six cube faces a sphere is projected onto. Face order is
/// fixed at `[L, R, U, D, B, F]`, matching the data model's tile ordering.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CubeFace {
    L,
    R,
    U,
    D,
    B,
    F,
}

pub const FACE_ORDER: [CubeFace; 6] = [
    CubeFace::L,
    CubeFace::R,
    CubeFace::U,
    CubeFace::D,
    CubeFace::B,
    CubeFace::F,
];

impl CubeFace {
    /// Position in `FACE_ORDER`, i.e. the face's contribution to a global
    /// tile index (`face.index() * tiles_per_face(t)`).
    pub fn index(self) -> usize {
        match self {
            CubeFace::L => 0,
            CubeFace::R => 1,
            CubeFace::U => 2,
            CubeFace::D => 3,
            CubeFace::B => 4,
            CubeFace::F => 5,
        }
    }

    /// Outward face normal, matching the face centers in §4.1:
    /// `L=(-90,0)`, `R=(90,0)`, `U=(0,90)`, `D=(0,-90)`, `B=(180,0)`, `F=(0,0)`.
    pub fn normal(self) -> Vector3<f64> {
        match self {
            CubeFace::L => Vector3::new(-1.0, 0.0, 0.0),
            CubeFace::R => Vector3::new(1.0, 0.0, 0.0),
            CubeFace::U => Vector3::new(0.0, 1.0, 0.0),
            CubeFace::D => Vector3::new(0.0, -1.0, 0.0),
            CubeFace::B => Vector3::new(0.0, 0.0, -1.0),
            CubeFace::F => Vector3::new(0.0, 0.0, 1.0),
        }
    }

    /// Face-local "east" axis, oriented so a viewer standing at the origin
    /// and looking along `normal()` sees `right()` to their right.
    pub fn right(self) -> Vector3<f64> {
        self.up().cross(&self.normal())
    }

    /// Face-local "north" axis; row 0 of the tiling sits at `+up()`. Each
    /// side face (`L`, `R`, `B`, `F`) walks this axis one quarter turn
    /// around the ring rather than sharing world `+Y`. That keeps
    /// `right()` at world `+Y` for all four of them, so latitude (not
    /// longitude) drives the column split and longitude drives the row
    /// split consistently on both faces either side of a seam — matching
    /// which axis a seam-crossing pose splits along in §8 S4. Sharing
    /// world `+Y` for `up()` instead would make `right()` swing between
    /// `+Z` and `-Z` around the ring, flipping that axis face to face.
    pub fn up(self) -> Vector3<f64> {
        match self {
            CubeFace::U => Vector3::new(0.0, 0.0, -1.0),
            CubeFace::D => Vector3::new(0.0, 0.0, 1.0),
            CubeFace::L => Vector3::new(0.0, 0.0, -1.0),
            CubeFace::R => Vector3::new(0.0, 0.0, 1.0),
            CubeFace::B => Vector3::new(1.0, 0.0, 0.0),
            CubeFace::F => Vector3::new(-1.0, 0.0, 0.0),
        }
    }
}

pub fn tiles_per_face(tiling_count: usize) -> usize {
    tiling_count * tiling_count
}

pub fn total_tiles(tiling_count: usize) -> usize {
    6 * tiles_per_face(tiling_count)
}

/// Global tile index for a `(face, row, col)` triple, row-major from the
/// face-local top-left.
pub fn tile_index(face: CubeFace, row: usize, col: usize, tiling_count: usize) -> usize {
    face.index() * tiles_per_face(tiling_count) + row * tiling_count + col
}

/// Gnomonic projection of `direction` (need not be unit length) onto its
/// dominant cube face. Returns the face and face-local `(u, v)` in
/// `[-1, 1]`, `u` along `right()` and `v` along `up()`.
pub fn project_to_face(direction: Vector3<f64>) -> (CubeFace, f64, f64) {
    let d = direction.normalize();
    let (face, dot_n) = FACE_ORDER
        .iter()
        .map(|&face| (face, d.dot(&face.normal())))
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .expect("FACE_ORDER is non-empty");
    let scale = 1.0 / dot_n.max(1e-12);
    let u = (d.dot(&face.right()) * scale).clamp(-1.0, 1.0);
    let v = (d.dot(&face.up()) * scale).clamp(-1.0, 1.0);
    (face, u, v)
}

/// Row/column a direction falls into under a `tiling_count x tiling_count`
/// subdivision of its dominant face.
pub fn face_local_tile(direction: Vector3<f64>, tiling_count: usize) -> (CubeFace, usize, usize) {
    let (face, u, v) = project_to_face(direction);
    let t = tiling_count as f64;
    let col = (((u + 1.0) * 0.5) * t).floor().clamp(0.0, t - 1.0) as usize;
    let row = (((1.0 - v) * 0.5) * t).floor().clamp(0.0, t - 1.0) as usize;
    (face, row, col)
}

/// Global tile index a direction vector falls into.
pub fn tile_for_direction(direction: Vector3<f64>, tiling_count: usize) -> usize {
    let (face, row, col) = face_local_tile(direction, tiling_count);
    tile_index(face, row, col, tiling_count)
}

/// Global tile index a spherical pose falls into.
pub fn tile_for_position(position: SphericalPosition, tiling_count: usize) -> usize {
    tile_for_direction(position.to_unit_vector(), tiling_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn face_center_tile(face: CubeFace, tiling_count: usize) -> usize {
        tile_for_direction(face.normal(), tiling_count)
    }

    #[test]
    fn face_centers_land_on_the_expected_face_index() {
        for &face in &FACE_ORDER {
            assert_eq!(face_center_tile(face, 1), face.index());
        }
    }

    #[test]
    fn right_up_normal_form_an_orthonormal_right_handed_frame() {
        for &face in &FACE_ORDER {
            let (r, u, n) = (face.right(), face.up(), face.normal());
            assert_abs_diff_eq!(r.dot(&u), 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(r.dot(&n), 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(u.dot(&n), 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!((r.cross(&u) - n).norm(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn positions_without_tiling_pick_exactly_one_face() {
        let positions = [
            (SphericalPosition::new(0.0, -90.0), CubeFace::L),
            (SphericalPosition::new(0.0, 90.0), CubeFace::R),
            (SphericalPosition::new(90.0, 0.0), CubeFace::U),
            (SphericalPosition::new(-90.0, 0.0), CubeFace::D),
            (SphericalPosition::new(0.0, -180.0), CubeFace::B),
            (SphericalPosition::new(0.0, 0.0), CubeFace::F),
        ];
        for (pos, face) in positions {
            assert_eq!(tile_for_position(pos, 1), face.index());
        }
    }

    #[test]
    fn face_center_lands_in_the_middle_tile_for_odd_tiling() {
        let (_, row, col) = face_local_tile(CubeFace::F.normal(), 3);
        assert_eq!((row, col), (1, 1));
    }

    #[test]
    fn tiles_per_face_and_total_tiles_scale_with_t_squared() {
        assert_eq!(tiles_per_face(2), 4);
        assert_eq!(total_tiles(2), 24);
        assert_eq!(total_tiles(1), 6);
    }
}
