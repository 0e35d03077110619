//! Assembling neighbouring tiles into one raster.

use std::path::Path;

use image::{imageops, RgbImage};
use tracing::debug;

use crate::error::{RelightError, Result};
use crate::geo::TileCoord;

/// Place `tiles` (row-major, `columns` per row) edge to edge.
///
/// Every tile must have the same size as the first one.
pub fn stitch_tiles(tiles: &[RgbImage], columns: usize) -> Result<RgbImage> {
    if tiles.is_empty() || columns == 0 {
        return Err(RelightError::invalid("no tiles to stitch"));
    }
    if tiles.len() % columns != 0 {
        return Err(RelightError::invalid(format!(
            "{} tiles do not fill rows of {}",
            tiles.len(),
            columns
        )));
    }

    let tile_w = tiles[0].width();
    let tile_h = tiles[0].height();
    for tile in &tiles[1..] {
        RelightError::check_dimensions(
            "tile",
            (tile_w as usize, tile_h as usize),
            (tile.width() as usize, tile.height() as usize),
        )?;
    }

    let rows = tiles.len() / columns;
    let mut canvas = RgbImage::new(tile_w * columns as u32, tile_h * rows as u32);
    for (idx, tile) in tiles.iter().enumerate() {
        let col = (idx % columns) as i64;
        let row = (idx / columns) as i64;
        imageops::replace(&mut canvas, tile, col * tile_w as i64, row * tile_h as i64);
    }
    Ok(canvas)
}

/// Load the `(2 * radius + 1)^2` tiles around `center` from disk and stitch them.
///
/// `template` is a path with `{z}`, `{x}` and `{y}` placeholders.
pub fn load_region(template: &str, center: TileCoord, radius: i64) -> Result<RgbImage> {
    let coords = center.neighbourhood(radius);
    let mut tiles = Vec::with_capacity(coords.len());
    for coord in &coords {
        let path = coord.url(template);
        debug!(path = %path, "loading tile");
        tiles.push(load_rgb(&path)?);
    }
    stitch_tiles(&tiles, (2 * radius + 1) as usize)
}

/// Open any supported image file as 8-bit RGB.
pub fn load_rgb(path: impl AsRef<Path>) -> Result<RgbImage> {
    Ok(image::open(path)?.to_rgb8())
}
