//! Final image assembly.
//!
//! Combines the accumulated soft shadow and ambient terms with a base color
//! raster:
//!
//! ```text
//! linear = (shadow_weight * shadow + ambient_weight * ambient) * base^2
//! output = linear^(1 / gamma)
//! ```
//!
//! Squaring the gamma-encoded base color roughly linearizes it; the final
//! power re-encodes for display. Values past 1.0 clip when quantized.
//! Also hosts the grayscale previews (direct light, elevation, single term).

use glam::Vec3;
use image::{Rgb, RgbImage, Rgba, RgbaImage};

use crate::config::RelightConfig;
use crate::error::{RelightError, Result};
use crate::heightfield::Heightfield;
use crate::normals::NormalField;
use crate::tilemap::Tilemap;

/// Blend weights and display gamma.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Compositor {
    pub shadow_weight: f32,
    pub ambient_weight: f32,
    pub gamma: f32,
}

impl Default for Compositor {
    fn default() -> Self {
        Self {
            shadow_weight: 4.0,
            ambient_weight: 0.25,
            gamma: 2.2,
        }
    }
}

impl Compositor {
    pub fn from_config(config: &RelightConfig) -> Self {
        Self {
            shadow_weight: config.shadow_weight,
            ambient_weight: config.ambient_weight,
            gamma: config.gamma,
        }
    }

    /// Shade one cell. `base` is the gamma-encoded color in [0, 1]; the
    /// result is gamma-encoded and not yet clamped.
    pub fn shade(&self, shadow: f32, ambient: f32, base: [f32; 3]) -> [f32; 3] {
        let light = self.shadow_weight * shadow + self.ambient_weight * ambient;
        let inv_gamma = 1.0 / self.gamma;
        base.map(|c| (light * c * c).max(0.0).powf(inv_gamma))
    }

    /// Composite full grids over `base`, which uses image row order.
    pub fn composite(
        &self,
        shadow: &Tilemap<f32>,
        ambient: &Tilemap<f32>,
        base: &RgbImage,
    ) -> Result<RgbaImage> {
        let dims = shadow.dimensions();
        RelightError::check_dimensions("ambient term", dims, ambient.dimensions())?;
        RelightError::check_dimensions(
            "base color raster",
            dims,
            (base.width() as usize, base.height() as usize),
        )?;

        Ok(grid_image(dims, |x, y, row| {
            let Rgb(px) = *base.get_pixel(x as u32, row);
            let color = px.map(|c| c as f32 / 255.0);
            let [r, g, b] = self.shade(*shadow.get(x, y), *ambient.get(x, y), color);
            [to_byte(r), to_byte(g), to_byte(b)]
        }))
    }
}

/// Quantize a display value to 8 bits, clipping to [0, 1].
#[inline]
pub fn to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Build an opaque image from a north-up grid; `f` receives the cell and the
/// image row it lands on.
fn grid_image(
    (width, height): (usize, usize),
    f: impl Fn(usize, usize, u32) -> [u8; 3],
) -> RgbaImage {
    RgbaImage::from_fn(width as u32, height as u32, |px, row| {
        let x = px as usize;
        let y = height - 1 - row as usize;
        let [r, g, b] = f(x, y, row);
        Rgba([r, g, b, 255])
    })
}

fn gray(v: f32) -> [u8; 3] {
    let b = to_byte(v);
    [b, b, b]
}

/// Lambert preview against a single light: `0.5 * dot(n, l) + 0.5`.
pub fn render_direct(normals: &NormalField, sun_direction: Vec3) -> RgbaImage {
    let l = sun_direction.normalize_or(Vec3::Z);
    grid_image(normals.dimensions(), |x, y, _| gray(0.5 * normals.at(x, y).dot(l) + 0.5))
}

/// Elevation preview: meters times `scale`, clipped to [0, 1].
pub fn render_elevation(heightfield: &Heightfield, scale: f32) -> RgbaImage {
    grid_image(heightfield.dimensions(), |x, y, _| gray(heightfield.at(x, y) * scale))
}

/// Grayscale view of one accumulated term.
pub fn render_term(term: &Tilemap<f32>) -> RgbaImage {
    grid_image(term.dimensions(), |x, y, _| gray(*term.get(x, y)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_light_mid_gray() {
        let c = Compositor::default().shade(1.0, 1.0, [0.5; 3]);
        // (4.0 + 0.25) * 0.25 = 1.0625
        for v in c {
            assert!((v - 1.0625f32.powf(1.0 / 2.2)).abs() < 1e-5);
            assert!((v - 1.02794).abs() < 1e-4);
        }
        assert_eq!(to_byte(c[0]), 255);
    }

    #[test]
    fn test_dark_and_partial_light() {
        let comp = Compositor::default();
        assert_eq!(comp.shade(0.0, 0.0, [0.8, 0.3, 0.1]), [0.0; 3]);

        // shadow 0.25 alone gives light 1.0, so the base passes through squared then re-encoded.
        let c = comp.shade(0.25, 0.0, [0.5, 0.5, 0.5]);
        assert!((c[0] - 0.25f32.powf(1.0 / 2.2)).abs() < 1e-5);
        assert_eq!(to_byte(c[0]), 136);
    }

    #[test]
    fn test_composite_flips_rows_and_is_opaque() {
        let mut shadow = Tilemap::new_with(2, 2, 0.0f32);
        let ambient = Tilemap::new_with(2, 2, 0.0f32);
        // Northern row (y = 1) is lit.
        shadow.set(0, 1, 0.25);
        shadow.set(1, 1, 0.25);
        let base = RgbImage::from_pixel(2, 2, Rgb([255, 255, 255]));

        let out = Compositor::default().composite(&shadow, &ambient, &base).unwrap();
        assert_eq!(out.get_pixel(0, 0), &Rgba([255, 255, 255, 255]));
        assert_eq!(out.get_pixel(1, 1), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_composite_rejects_mismatched_inputs() {
        let shadow = Tilemap::new_with(3, 2, 0.0f32);
        let ambient = Tilemap::new_with(3, 2, 0.0f32);
        let base = RgbImage::new(2, 3);
        let err = Compositor::default().composite(&shadow, &ambient, &base).unwrap_err();
        assert!(err.is_input_error());

        let small = Tilemap::new_with(2, 2, 0.0f32);
        assert!(Compositor::default()
            .composite(&shadow, &small, &RgbImage::new(3, 2))
            .is_err());
    }

    #[test]
    fn test_previews() {
        let hf = Heightfield::flat(3, 3, 1000.0, 10.0).unwrap();
        let normals = NormalField::estimate(&hf);

        let direct = render_direct(&normals, Vec3::Z);
        assert_eq!(direct.get_pixel(1, 1), &Rgba([255, 255, 255, 255]));
        let grazing = render_direct(&normals, Vec3::X);
        assert_eq!(grazing.get_pixel(1, 1)[0], 128);

        let elevation = render_elevation(&hf, 0.0005);
        assert_eq!(elevation.get_pixel(0, 0)[0], 128);

        let term = render_term(&Tilemap::new_with(3, 3, 1.0f32));
        assert_eq!(term.get_pixel(2, 2), &Rgba([255, 255, 255, 255]));
    }
}
