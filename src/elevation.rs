//! Terrain-RGB elevation decoding.
//!
//! Each pixel packs a 24-bit integer into its R, G and B channels:
//! `elevation = -10000 + (R * 65536 + G * 256 + B) * 0.1` meters.

use image::{Rgb, RgbImage};

use crate::error::{RelightError, Result};
use crate::heightfield::Heightfield;
use crate::tilemap::Tilemap;

/// Elevation of the all-zero pixel.
pub const ELEVATION_OFFSET: f64 = -10_000.0;
/// Meters per encoded unit.
pub const ELEVATION_QUANTUM: f64 = 0.1;

const MAX_ENCODED: u32 = 0x00FF_FFFF;

/// Decode one terrain-RGB pixel to meters.
#[inline]
pub fn decode_pixel(rgb: [u8; 3]) -> f64 {
    let packed = (rgb[0] as u32) * 65_536 + (rgb[1] as u32) * 256 + rgb[2] as u32;
    ELEVATION_OFFSET + packed as f64 * ELEVATION_QUANTUM
}

/// Encode meters into a terrain-RGB pixel, rounding to the 0.1 m quantum and
/// clamping to the representable range.
pub fn encode_elevation(elevation: f64) -> [u8; 3] {
    let units = ((elevation - ELEVATION_OFFSET) / ELEVATION_QUANTUM).round();
    let packed = units.clamp(0.0, MAX_ENCODED as f64) as u32;
    [(packed >> 16) as u8, (packed >> 8) as u8, packed as u8]
}

/// Converts terrain-RGB rasters into validated heightfields.
#[derive(Clone, Copy, Debug)]
pub struct ElevationDecoder {
    /// Vertical exaggeration applied after decoding (1.0 = true meters)
    pub elevation_scale: f32,
}

impl Default for ElevationDecoder {
    fn default() -> Self {
        Self { elevation_scale: 1.0 }
    }
}

impl ElevationDecoder {
    pub fn new(elevation_scale: f32) -> Self {
        Self { elevation_scale }
    }

    /// Decode `raster` into a heightfield of exactly `expected` (width, height) cells.
    pub fn decode(
        &self,
        raster: &RgbImage,
        expected: (usize, usize),
        pixel_scale: f32,
    ) -> Result<Heightfield> {
        let actual = (raster.width() as usize, raster.height() as usize);
        RelightError::check_dimensions("elevation raster", expected, actual)?;
        if !self.elevation_scale.is_finite() {
            return Err(RelightError::invalid("elevation scale must be finite"));
        }

        let (width, height) = actual;
        let scale = self.elevation_scale as f64;
        let elevation = Tilemap::par_from_fn(width, height, |x, y| {
            let row = (height - 1 - y) as u32;
            let Rgb(rgb) = *raster.get_pixel(x as u32, row);
            (decode_pixel(rgb) * scale) as f32
        });

        Heightfield::new(elevation, pixel_scale)
    }

    /// Decode a raster, taking the grid size from the raster itself.
    pub fn decode_any(&self, raster: &RgbImage, pixel_scale: f32) -> Result<Heightfield> {
        let dims = (raster.width() as usize, raster.height() as usize);
        self.decode(raster, dims, pixel_scale)
    }
}

/// Render a heightfield back into terrain-RGB, undoing any vertical exaggeration.
pub fn encode_heightfield(heightfield: &Heightfield, elevation_scale: f32) -> RgbImage {
    let (width, height) = heightfield.dimensions();
    let scale = if elevation_scale != 0.0 { elevation_scale as f64 } else { 1.0 };
    RgbImage::from_fn(width as u32, height as u32, |px, row| {
        let y = height - 1 - row as usize;
        Rgb(encode_elevation(heightfield.at(px as usize, y) as f64 / scale))
    })
}
