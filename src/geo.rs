//! Slippy-map tile geodesy.
//!
//! Web-Mercator tile addressing plus the ground distance covered by one pixel
//! of a stitched raster, used to derive the heightfield's pixel scale.

use std::f64::consts::PI;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS: f64 = 6_371_000.0;

/// Fractional tile column containing a longitude.
pub fn lon_to_tile(lon: f64, zoom: u32) -> f64 {
    (lon + 180.0) / 360.0 * tiles_at(zoom)
}

/// Fractional tile row containing a latitude.
pub fn lat_to_tile(lat: f64, zoom: u32) -> f64 {
    let rad = lat.to_radians();
    (1.0 - (rad.tan() + 1.0 / rad.cos()).ln() / PI) / 2.0 * tiles_at(zoom)
}

/// Longitude of a tile column's western edge.
pub fn tile_to_lon(x: f64, zoom: u32) -> f64 {
    x / tiles_at(zoom) * 360.0 - 180.0
}

/// Latitude of a tile row's northern edge.
pub fn tile_to_lat(y: f64, zoom: u32) -> f64 {
    let n = PI * (1.0 - 2.0 * y / tiles_at(zoom));
    n.sinh().atan().to_degrees()
}

#[inline]
fn tiles_at(zoom: u32) -> f64 {
    2f64.powi(zoom as i32)
}

/// Integer tile address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub zoom: u32,
    pub x: i64,
    pub y: i64,
}

impl TileCoord {
    /// Tile containing a (lat, lon) point.
    pub fn containing(lat: f64, lon: f64, zoom: u32) -> Self {
        Self {
            zoom,
            x: lon_to_tile(lon, zoom).floor() as i64,
            y: lat_to_tile(lat, zoom).floor() as i64,
        }
    }

    /// Square block of tiles centered on this one, row-major from the north-west
    /// corner. `radius` 1 gives the 3x3 neighbourhood.
    pub fn neighbourhood(&self, radius: i64) -> Vec<TileCoord> {
        let mut tiles = Vec::with_capacity(((2 * radius + 1) * (2 * radius + 1)) as usize);
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                tiles.push(TileCoord { zoom: self.zoom, x: self.x + dx, y: self.y + dy });
            }
        }
        tiles
    }

    /// Fill a URL template containing `{z}`, `{x}` and `{y}` placeholders.
    pub fn url(&self, template: &str) -> String {
        template
            .replace("{z}", &self.zoom.to_string())
            .replace("{x}", &self.x.to_string())
            .replace("{y}", &self.y.to_string())
    }
}

/// Ground meters per pixel for a raster spanning tile columns `x0..x1`
/// across `raster_width` pixels, measured along the equator.
pub fn pixel_scale_for_tiles(x0: i64, x1: i64, zoom: u32, raster_width: u32) -> f32 {
    let lon0 = tile_to_lon(x0 as f64, zoom);
    let lon1 = tile_to_lon(x1 as f64, zoom);
    let meters = EARTH_RADIUS * (lon1 - lon0) * 2.0 * PI / 360.0;
    (meters / raster_width.max(1) as f64) as f32
}
