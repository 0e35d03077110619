//! End-to-end relighting.
//!
//! Algorithm:
//! 1. Validate configuration and raster sizes (fails before any compute)
//! 2. Decode terrain-RGB into a heightfield
//! 3. Estimate normals
//! 4. Accumulate soft shadows, then ambient occlusion, from one seeded RNG
//! 5. Composite over the base color

use std::time::{Duration, Instant};

use image::{RgbImage, RgbaImage};
use rand::Rng;
use tracing::{info, info_span};

use crate::accumulate::{
    Accumulation, Accumulator, AmbientAccumulator, CancelFlag, ShadowAccumulator, VisibilityPass,
};
use crate::composite::{render_direct, render_elevation, render_term, Compositor};
use crate::config::RelightConfig;
use crate::elevation::ElevationDecoder;
use crate::error::{RelightError, Result};
use crate::heightfield::Heightfield;
use crate::normals::NormalField;
use crate::tilemap::Tilemap;

/// Which image the pipeline produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Shadows and ambient occlusion over the base color
    #[default]
    Final,
    /// Lambert shading from `RelightConfig::direct_light`, no visibility
    Direct,
    /// Grayscale elevation
    Elevation,
    /// Soft shadow term only
    Shadow,
    /// Ambient occlusion term only
    Ambient,
}

impl RenderMode {
    pub fn all() -> &'static [Self] {
        &[Self::Final, Self::Direct, Self::Elevation, Self::Shadow, Self::Ambient]
    }

    /// Whether this mode composites over a base color raster.
    pub fn needs_base_color(&self) -> bool {
        matches!(self, Self::Final)
    }
}

impl std::fmt::Display for RenderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Final => write!(f, "final"),
            Self::Direct => write!(f, "direct"),
            Self::Elevation => write!(f, "elevation"),
            Self::Shadow => write!(f, "shadow"),
            Self::Ambient => write!(f, "ambient"),
        }
    }
}

impl std::str::FromStr for RenderMode {
    type Err = RelightError;

    fn from_str(s: &str) -> Result<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|mode| mode.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| RelightError::config(format!("unknown render mode '{s}'")))
    }
}

/// Summary of one run.
#[derive(Clone, Debug, Default)]
pub struct RelightStats {
    pub width: usize,
    pub height: usize,
    pub min_elevation: f32,
    pub max_elevation: f32,
    pub mean_shadow: Option<f32>,
    pub mean_ambient: Option<f32>,
    /// Rays that exhausted the step cap, summed over both passes
    pub cap_hits: u64,
    pub elapsed: Duration,
}

/// Result of a run: the image plus the intermediate terms that were computed.
#[derive(Clone, Debug)]
pub struct RelightOutput {
    pub image: RgbaImage,
    pub shadow: Option<Tilemap<f32>>,
    pub ambient: Option<Tilemap<f32>>,
    pub stats: RelightStats,
}

/// Runs the pipeline with a fixed configuration.
#[derive(Clone, Debug)]
pub struct Relighter {
    config: RelightConfig,
    cancel: Option<CancelFlag>,
}

impl Relighter {
    pub fn new(config: RelightConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, cancel: None })
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Decode and derive normals for a raster of the given size.
    pub fn prepare(
        &self,
        elevation: &RgbImage,
        expected: (usize, usize),
    ) -> Result<(Heightfield, NormalField)> {
        let _span = info_span!("prepare").entered();
        let decoder = ElevationDecoder::new(self.config.elevation_scale);
        let heightfield = decoder.decode(elevation, expected, self.config.pixel_scale)?;
        let normals = NormalField::estimate(&heightfield);
        Ok((heightfield, normals))
    }

    /// Shadows plus ambient occlusion composited over `base_color`.
    pub fn relight<R: Rng + ?Sized>(
        &self,
        elevation: &RgbImage,
        base_color: &RgbImage,
        rng: &mut R,
    ) -> Result<RelightOutput> {
        self.render(RenderMode::Final, elevation, Some(base_color), rng)
    }

    /// Produce the image for `mode`. `base_color` is required for `Final`
    /// and sets the expected grid size whenever it is given.
    pub fn render<R: Rng + ?Sized>(
        &self,
        mode: RenderMode,
        elevation: &RgbImage,
        base_color: Option<&RgbImage>,
        rng: &mut R,
    ) -> Result<RelightOutput> {
        let start = Instant::now();
        let _span = info_span!("relight", %mode).entered();

        let expected = match base_color {
            Some(base) => (base.width() as usize, base.height() as usize),
            None if mode.needs_base_color() => {
                return Err(RelightError::invalid(format!("{mode} rendering needs a base color raster")));
            }
            None => (elevation.width() as usize, elevation.height() as usize),
        };

        let (heightfield, normals) = self.prepare(elevation, expected)?;
        let (min_elevation, max_elevation) = heightfield.elevation().min_max();
        info!(
            width = expected.0,
            height = expected.1,
            min_elevation,
            max_elevation,
            pixel_scale = heightfield.pixel_scale(),
            "heightfield ready"
        );

        let mut stats = RelightStats {
            width: expected.0,
            height: expected.1,
            min_elevation,
            max_elevation,
            ..Default::default()
        };

        let mut shadow = None;
        let mut ambient = None;
        let image = match mode {
            RenderMode::Final => {
                let base = base_color.ok_or_else(|| {
                    RelightError::invalid("final rendering needs a base color raster")
                })?;
                let s = self.shadow(&heightfield, &normals, rng)?;
                let a = self.ambient(&heightfield, &normals, rng)?;
                let image = Compositor::from_config(&self.config).composite(&s.values, &a.values, base)?;
                shadow = Some(s);
                ambient = Some(a);
                image
            }
            RenderMode::Shadow => {
                let s = self.shadow(&heightfield, &normals, rng)?;
                let image = render_term(&s.values);
                shadow = Some(s);
                image
            }
            RenderMode::Ambient => {
                let a = self.ambient(&heightfield, &normals, rng)?;
                let image = render_term(&a.values);
                ambient = Some(a);
                image
            }
            RenderMode::Direct => render_direct(&normals, self.config.direct_light),
            RenderMode::Elevation => {
                render_elevation(&heightfield, self.config.elevation_preview_scale)
            }
        };
        for term in [&shadow, &ambient].into_iter().flatten() {
            stats.cap_hits += term.cap_hits;
        }
        stats.mean_shadow = shadow.as_ref().map(|s| s.values.mean());
        stats.mean_ambient = ambient.as_ref().map(|a| a.values.mean());

        stats.elapsed = start.elapsed();
        info!(
            elapsed_ms = stats.elapsed.as_millis() as u64,
            mean_shadow = ?stats.mean_shadow,
            mean_ambient = ?stats.mean_ambient,
            cap_hits = stats.cap_hits,
            "relight complete"
        );

        Ok(RelightOutput {
            image,
            shadow: shadow.map(|s| s.values),
            ambient: ambient.map(|a| a.values),
            stats,
        })
    }

    fn shadow<R: Rng + ?Sized>(
        &self,
        heightfield: &Heightfield,
        normals: &NormalField,
        rng: &mut R,
    ) -> Result<Accumulation> {
        let acc = ShadowAccumulator::shadow(
            heightfield,
            normals,
            self.config.sun(),
            self.config.shadow_iterations,
        )?;
        self.configure(acc).run(rng)
    }

    fn ambient<R: Rng + ?Sized>(
        &self,
        heightfield: &Heightfield,
        normals: &NormalField,
        rng: &mut R,
    ) -> Result<Accumulation> {
        let acc = AmbientAccumulator::ambient(heightfield, normals, self.config.ambient_iterations)?;
        self.configure(acc).run(rng)
    }

    fn configure<'a, P: VisibilityPass>(
        &self,
        mut acc: Accumulator<'a, P>,
    ) -> Accumulator<'a, P> {
        if let Some(cap) = self.config.step_cap {
            acc = acc.with_step_cap(cap);
        }
        if let Some(cancel) = &self.cancel {
            acc = acc.with_cancel_flag(cancel.clone());
        }
        acc
    }
}

/// Relight with `config`, returning only the final image.
pub fn relight<R: Rng + ?Sized>(
    elevation: &RgbImage,
    base_color: &RgbImage,
    config: &RelightConfig,
    rng: &mut R,
) -> Result<RgbaImage> {
    Ok(Relighter::new(config.clone())?.relight(elevation, base_color, rng)?.image)
}
