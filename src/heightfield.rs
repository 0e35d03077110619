//! Validated elevation grid.
//!
//! A `Heightfield` pairs an elevation `Tilemap<f32>` (meters) with the ground
//! distance one cell covers. Cell `(x, y)` has `x` growing east and `y`
//! growing north, so raster row `r` lands at `y = height - 1 - r`.

use crate::error::{RelightError, Result};
use crate::tilemap::Tilemap;

#[derive(Clone, Debug)]
pub struct Heightfield {
    elevation: Tilemap<f32>,
    pixel_scale: f32,
}

impl Heightfield {
    /// Validate and wrap an elevation grid.
    ///
    /// Rejects empty grids, non-positive or non-finite pixel scales, and any
    /// non-finite elevation.
    pub fn new(elevation: Tilemap<f32>, pixel_scale: f32) -> Result<Self> {
        if elevation.is_empty() {
            return Err(RelightError::invalid("heightfield has no cells"));
        }
        if !pixel_scale.is_finite() || pixel_scale <= 0.0 {
            return Err(RelightError::invalid(format!(
                "pixel scale must be a positive finite number, got {pixel_scale}"
            )));
        }
        if let Some((x, y, v)) = elevation.iter().find(|(_, _, v)| !v.is_finite()) {
            return Err(RelightError::invalid(format!(
                "non-finite elevation {v} at cell ({x}, {y})"
            )));
        }
        Ok(Self { elevation, pixel_scale })
    }

    /// Constant-elevation heightfield.
    pub fn flat(width: usize, height: usize, elevation: f32, pixel_scale: f32) -> Result<Self> {
        Self::new(Tilemap::new_with(width, height, elevation), pixel_scale)
    }

    pub fn width(&self) -> usize {
        self.elevation.width
    }

    pub fn height(&self) -> usize {
        self.elevation.height
    }

    pub fn dimensions(&self) -> (usize, usize) {
        self.elevation.dimensions()
    }

    /// Ground meters per cell.
    pub fn pixel_scale(&self) -> f32 {
        self.pixel_scale
    }

    pub fn elevation(&self) -> &Tilemap<f32> {
        &self.elevation
    }

    #[inline]
    pub fn at(&self, x: usize, y: usize) -> f32 {
        *self.elevation.get(x, y)
    }

    /// Elevation with clamp-to-edge addressing.
    #[inline]
    pub fn at_clamped(&self, x: i64, y: i64) -> f32 {
        *self.elevation.get_clamped(x, y)
    }
}
