//! Terrain relighting library
//!
//! Decodes terrain-RGB elevation tiles and renders stochastic soft shadows
//! and ambient occlusion over a base color raster. Re-exports modules for use
//! by binaries and tools.

pub mod accumulate;
pub mod composite;
pub mod config;
pub mod elevation;
pub mod error;
pub mod geo;
pub mod heightfield;
pub mod normals;
pub mod pipeline;
pub mod raymarch;
pub mod sampling;
pub mod stitch;
pub mod synthetic;
pub mod tilemap;

pub use accumulate::{AmbientAccumulator, CancelFlag, ShadowAccumulator};
pub use composite::Compositor;
pub use config::{RelightConfig, RelightPreset};
pub use elevation::ElevationDecoder;
pub use error::{RelightError, Result};
pub use heightfield::Heightfield;
pub use normals::NormalField;
pub use pipeline::{relight, RelightOutput, Relighter, RenderMode};
pub use raymarch::{MarchOutcome, RayMarcher};
pub use sampling::SunDisk;
pub use tilemap::Tilemap;
