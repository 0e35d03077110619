//! Debug tool for inspecting the relighting passes visually
//! Renders synthetic terrains through every mode and tiles the panels into one image

use image::{imageops, DynamicImage, ImageBuffer, Rgb, RgbImage};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use terrain_relight::synthetic::SyntheticTerrain;
use terrain_relight::tilemap::Tilemap;
use terrain_relight::{RelightConfig, Relighter, RenderMode};

const SIZE: usize = 128;
const PIXEL_SCALE: f32 = 30.0;
const SEED: u64 = 42;

fn main() {
    let terrains = [
        SyntheticTerrain::Hill { peak: 1200.0, sigma: 16.0 },
        SyntheticTerrain::Wall { x: SIZE / 2, height: 400.0 },
        SyntheticTerrain::mountains(SEED as u32),
    ];
    let modes = [
        RenderMode::Elevation,
        RenderMode::Direct,
        RenderMode::Shadow,
        RenderMode::Ambient,
        RenderMode::Final,
    ];

    let config = RelightConfig {
        pixel_scale: PIXEL_SCALE,
        elevation_preview_scale: 1.0 / 3000.0,
        ..RelightConfig::fast()
    };
    let relighter = match Relighter::new(config) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let mut panels: Vec<RgbImage> = Vec::new();
    for terrain in &terrains {
        println!("  Processing: {}", terrain.name());
        let elevation = terrain.generate(SIZE, SIZE);
        let raster = match terrain.raster(SIZE, SIZE, PIXEL_SCALE) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("Failed to build {} terrain: {}", terrain.name(), e);
                std::process::exit(1);
            }
        };
        let base = hypsometric_tint(&elevation);

        for &mode in &modes {
            let mut rng = ChaCha8Rng::seed_from_u64(SEED);
            match relighter.render(mode, &raster, Some(&base), &mut rng) {
                Ok(out) => {
                    println!(
                        "    {:<10} {:>6} ms, cap hits {}",
                        mode.to_string(),
                        out.stats.elapsed.as_millis(),
                        out.stats.cap_hits
                    );
                    panels.push(DynamicImage::ImageRgba8(out.image).to_rgb8());
                }
                Err(e) => {
                    eprintln!("Failed to render {} / {}: {}", terrain.name(), mode, e);
                    std::process::exit(1);
                }
            }
        }
    }

    let grid = create_grid(&panels, modes.len(), terrains.len());
    grid.save("relight_debug.png").expect("Failed to save grid");

    println!("Saved relight_debug.png");
    println!("Columns: {}", modes.map(|m| m.to_string()).join(", "));
    println!("Rows: {}", terrains.map(|t| t.name()).join(", "));
}

/// Base color by elevation band, in image row order.
fn hypsometric_tint(elevation: &Tilemap<f32>) -> RgbImage {
    let (min_h, max_h) = elevation.min_max();
    let range = (max_h - min_h).max(1.0);
    let height = elevation.height;

    ImageBuffer::from_fn(elevation.width as u32, height as u32, |x, row| {
        let y = height - 1 - row as usize;
        let t = (*elevation.get(x as usize, y) - min_h) / range;
        if t < 0.3 {
            Rgb([90, 140, 70])
        } else if t < 0.7 {
            let k = (t - 0.3) / 0.4;
            Rgb([(90.0 + k * 80.0) as u8, (140.0 - k * 40.0) as u8, (70.0 - k * 10.0) as u8])
        } else {
            Rgb([200, 195, 190])
        }
    })
}

fn create_grid(images: &[RgbImage], cols: usize, rows: usize) -> RgbImage {
    if images.is_empty() {
        return ImageBuffer::new(1, 1);
    }

    let gap = 4u32;
    let cell_width = images[0].width() + gap;
    let cell_height = images[0].height() + gap;

    let mut grid: RgbImage =
        ImageBuffer::from_pixel(cell_width * cols as u32, cell_height * rows as u32, Rgb([40, 40, 40]));

    for (idx, img) in images.iter().enumerate() {
        let col = idx % cols;
        let row = idx / cols;
        if row >= rows {
            break;
        }
        let x_offset = (col as u32 * cell_width + gap / 2) as i64;
        let y_offset = (row as u32 * cell_height + gap / 2) as i64;
        imageops::replace(&mut grid, img, x_offset, y_offset);
    }

    grid
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_grid_places_panels_row_major() {
        let panels = [
            RgbImage::from_pixel(2, 2, Rgb([10, 10, 10])),
            RgbImage::from_pixel(2, 2, Rgb([20, 20, 20])),
        ];
        let grid = create_grid(&panels, 2, 1);

        assert_eq!(grid.dimensions(), (12, 6));
        assert_eq!(grid.get_pixel(2, 2), &Rgb([10, 10, 10]));
        assert_eq!(grid.get_pixel(8, 3), &Rgb([20, 20, 20]));
        assert_eq!(grid.get_pixel(0, 0), &Rgb([40, 40, 40]));
    }
}
