//! Surface normals from forward elevation differences.

use glam::Vec3;

use crate::heightfield::Heightfield;
use crate::tilemap::Tilemap;

/// Squared length below which a cross product is treated as degenerate.
const DEGENERATE_LENGTH_SQ: f32 = 1e-20;

/// One unit normal per heightfield cell.
#[derive(Clone, Debug)]
pub struct NormalField {
    normals: Tilemap<Vec3>,
}

impl NormalField {
    /// Estimate normals for every cell of `heightfield`.
    ///
    /// For cell (x, y): `dx = (s, 0, e(x+1, y) - e)`, `dy = (0, s, e(x, y+1) - e)`
    /// and `n = normalize(dx × dy)`. Neighbors past the edge clamp to the edge
    /// cell, so the last column and row see a zero difference along that axis.
    pub fn estimate(heightfield: &Heightfield) -> Self {
        let (width, height) = heightfield.dimensions();
        let normals = Tilemap::par_from_fn(width, height, |x, y| normal_at(heightfield, x, y));
        Self { normals }
    }

    #[inline]
    pub fn at(&self, x: usize, y: usize) -> Vec3 {
        *self.normals.get(x, y)
    }

    pub fn dimensions(&self) -> (usize, usize) {
        self.normals.dimensions()
    }

    pub fn as_tilemap(&self) -> &Tilemap<Vec3> {
        &self.normals
    }
}

/// Normal of a single cell.
pub fn normal_at(heightfield: &Heightfield, x: usize, y: usize) -> Vec3 {
    let s = heightfield.pixel_scale();
    let (xi, yi) = (x as i64, y as i64);
    let p0 = heightfield.at_clamped(xi, yi);
    let px = heightfield.at_clamped(xi + 1, yi);
    let py = heightfield.at_clamped(xi, yi + 1);

    let dx = Vec3::new(s, 0.0, px - p0);
    let dy = Vec3::new(0.0, s, py - p0);
    let n = dx.cross(dy);

    // Tiny pixel scales combined with extreme slopes can underflow; fall back to up.
    let len_sq = n.length_squared();
    if !(len_sq > DEGENERATE_LENGTH_SQ) || !len_sq.is_finite() {
        return Vec3::Z;
    }
    n / len_sq.sqrt()
}
