//! Synthetic terrain for demos, debugging and tests.

use image::RgbImage;
use noise::{NoiseFn, Perlin};

use crate::elevation::encode_heightfield;
use crate::error::Result;
use crate::heightfield::Heightfield;
use crate::tilemap::Tilemap;

/// Procedural terrain shapes. Elevations are in meters; `y` grows northward.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SyntheticTerrain {
    Flat { elevation: f32 },
    /// Rises linearly from 0 at the south edge to `rise` at the north edge
    Ramp { rise: f32 },
    /// Flat ground with a north-south wall one cell wide at column `x`
    Wall { x: usize, height: f32 },
    /// Gaussian bump centered on the grid; `sigma` in cells
    Hill { peak: f32, sigma: f32 },
    /// Multi-octave Perlin terrain around `base`
    Fractal { seed: u32, base: f32, amplitude: f32, frequency: f64, octaves: u32 },
}

impl SyntheticTerrain {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Flat { .. } => "flat",
            Self::Ramp { .. } => "ramp",
            Self::Wall { .. } => "wall",
            Self::Hill { .. } => "hill",
            Self::Fractal { .. } => "fractal",
        }
    }

    /// A rugged default with valleys deep enough to cast long shadows.
    pub fn mountains(seed: u32) -> Self {
        Self::Fractal { seed, base: 1500.0, amplitude: 1200.0, frequency: 0.02, octaves: 6 }
    }

    pub fn generate(&self, width: usize, height: usize) -> Tilemap<f32> {
        match *self {
            Self::Flat { elevation } => Tilemap::new_with(width, height, elevation),
            Self::Ramp { rise } => {
                let span = height.saturating_sub(1).max(1) as f32;
                Tilemap::from_fn(width, height, |_, y| rise * y as f32 / span)
            }
            Self::Wall { x: wall_x, height: wall } => {
                Tilemap::from_fn(width, height, |x, _| if x == wall_x { wall } else { 0.0 })
            }
            Self::Hill { peak, sigma } => {
                let cx = (width as f32 - 1.0) / 2.0;
                let cy = (height as f32 - 1.0) / 2.0;
                let two_sigma_sq = 2.0 * sigma * sigma;
                Tilemap::from_fn(width, height, |x, y| {
                    let dx = x as f32 - cx;
                    let dy = y as f32 - cy;
                    peak * (-(dx * dx + dy * dy) / two_sigma_sq).exp()
                })
            }
            Self::Fractal { seed, base, amplitude, frequency, octaves } => {
                let noise = Perlin::new(seed);
                Tilemap::par_from_fn(width, height, |x, y| {
                    let n = fbm(&noise, x as f64 * frequency, y as f64 * frequency, octaves, 0.5, 2.0);
                    base + amplitude * n as f32
                })
            }
        }
    }

    pub fn heightfield(&self, width: usize, height: usize, pixel_scale: f32) -> Result<Heightfield> {
        Heightfield::new(self.generate(width, height), pixel_scale)
    }

    /// Encode as a terrain-RGB raster, ready for the decoder.
    pub fn raster(&self, width: usize, height: usize, pixel_scale: f32) -> Result<RgbImage> {
        Ok(encode_heightfield(&self.heightfield(width, height, pixel_scale)?, 1.0))
    }
}

/// Fractional Brownian motion, normalized to roughly [-1, 1].
pub fn fbm(noise: &Perlin, x: f64, y: f64, octaves: u32, persistence: f64, lacunarity: f64) -> f64 {
    let mut total = 0.0;
    let mut amplitude = 1.0;
    let mut frequency = 1.0;
    let mut max_value = 0.0;

    for _ in 0..octaves.max(1) {
        total += amplitude * noise.get([x * frequency, y * frequency]);
        max_value += amplitude;
        amplitude *= persistence;
        frequency *= lacunarity;
    }

    total / max_value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_rises_north() {
        let map = SyntheticTerrain::Ramp { rise: 90.0 }.generate(4, 10);
        assert_eq!(*map.get(2, 0), 0.0);
        assert!((*map.get(2, 9) - 90.0).abs() < 1e-4);
        assert!(map.get(0, 5) > map.get(0, 4));
    }

    #[test]
    fn test_wall_column() {
        let map = SyntheticTerrain::Wall { x: 3, height: 50.0 }.generate(8, 2);
        assert_eq!(*map.get(3, 1), 50.0);
        assert_eq!(*map.get(2, 1), 0.0);
        assert_eq!(*map.get(4, 0), 0.0);
    }

    #[test]
    fn test_hill_peaks_in_the_middle() {
        let map = SyntheticTerrain::Hill { peak: 300.0, sigma: 4.0 }.generate(9, 9);
        assert!((*map.get(4, 4) - 300.0).abs() < 1e-3);
        let (min, max) = map.min_max();
        assert_eq!(max, *map.get(4, 4));
        assert_eq!(min, *map.get(0, 0));
    }

    #[test]
    fn test_fractal_is_seeded_and_bounded() {
        let a = SyntheticTerrain::mountains(7).generate(32, 24);
        let b = SyntheticTerrain::mountains(7).generate(32, 24);
        let c = SyntheticTerrain::mountains(8).generate(32, 24);
        assert_eq!(a.as_slice(), b.as_slice());
        assert_ne!(a.as_slice(), c.as_slice());

        let (min, max) = a.min_max();
        assert!(min >= 1500.0 - 1200.0 - 1.0);
        assert!(max <= 1500.0 + 1200.0 + 1.0);
        assert!(max > min);
    }

    #[test]
    fn test_raster_matches_requested_size() {
        let raster = SyntheticTerrain::Hill { peak: 100.0, sigma: 3.0 }.raster(12, 7, 30.0).unwrap();
        assert_eq!(raster.dimensions(), (12, 7));
    }
}
