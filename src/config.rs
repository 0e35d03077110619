//! Relighting parameters and configuration

use std::fs;
use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{RelightError, Result};
use crate::geo;
use crate::sampling::{SunDisk, SUN_DISTANCE, SUN_RADIUS, SUN_RADIUS_EXAGGERATION};

/// Quality preset
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RelightPreset {
    /// Few samples - noisy but quick previews
    Draft,
    /// Default sample count
    #[default]
    Normal,
    /// Many samples - smooth penumbrae
    High,
}

impl RelightPreset {
    pub fn all() -> &'static [Self] {
        &[Self::Draft, Self::Normal, Self::High]
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Draft => "Quick noisy preview",
            Self::Normal => "Balanced quality",
            Self::High => "Smooth shadows and occlusion",
        }
    }
}

impl std::fmt::Display for RelightPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Relighting pipeline parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelightConfig {
    // =========================================================================
    // Sampling
    // =========================================================================

    /// Soft shadow samples (default: 128)
    pub shadow_iterations: usize,

    /// Ambient occlusion samples (default: 128)
    pub ambient_iterations: usize,

    /// Overrides the ray marcher's derived step cap when set
    pub step_cap: Option<usize>,

    // =========================================================================
    // Light
    // =========================================================================

    /// Direction toward the sun, x east, y north, z up (normalized on use)
    pub sun_direction: Vec3,

    /// Distance to the light in meters
    pub sun_distance: f32,

    /// Radius of the light in meters; together with the distance this sets
    /// how soft shadow edges get
    pub sun_radius: f32,

    /// Light for the direct-lighting preview; independent of the sun
    pub direct_light: Vec3,

    // =========================================================================
    // Terrain
    // =========================================================================

    /// Ground meters covered by one cell
    pub pixel_scale: f32,

    /// Vertical exaggeration applied to decoded elevations
    pub elevation_scale: f32,

    // =========================================================================
    // Compositing
    // =========================================================================

    /// Weight of the soft shadow term
    pub shadow_weight: f32,

    /// Weight of the ambient term
    pub ambient_weight: f32,

    /// Display gamma
    pub gamma: f32,

    /// Multiplier mapping meters to gray in the elevation preview
    pub elevation_preview_scale: f32,
}

impl Default for RelightConfig {
    fn default() -> Self {
        Self {
            shadow_iterations: 128,
            ambient_iterations: 128,
            step_cap: None,

            sun_direction: Vec3::new(1.0, 1.0, 0.5),
            sun_distance: SUN_DISTANCE,
            sun_radius: SUN_RADIUS * SUN_RADIUS_EXAGGERATION,
            direct_light: Vec3::ONE,

            // One 256 px tile at zoom 10
            pixel_scale: geo::pixel_scale_for_tiles(0, 1, 10, 256),
            elevation_scale: 1.0,

            shadow_weight: 4.0,
            ambient_weight: 0.25,
            gamma: 2.2,
            elevation_preview_scale: 0.0005,
        }
    }
}

impl RelightConfig {
    /// Create a fast configuration for testing (fewer samples)
    pub fn fast() -> Self {
        Self {
            shadow_iterations: 16,
            ambient_iterations: 16,
            ..Default::default()
        }
    }

    /// Create a high-quality configuration (more samples)
    pub fn high_quality() -> Self {
        Self {
            shadow_iterations: 512,
            ambient_iterations: 512,
            ..Default::default()
        }
    }

    /// Create parameters from a preset
    pub fn from_preset(preset: RelightPreset) -> Self {
        match preset {
            RelightPreset::Draft => Self::fast(),
            RelightPreset::Normal => Self::default(),
            RelightPreset::High => Self::high_quality(),
        }
    }

    /// The configured light source.
    pub fn sun(&self) -> SunDisk {
        SunDisk::new(self.sun_direction, self.sun_distance, self.sun_radius)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.shadow_iterations == 0 || self.ambient_iterations == 0 {
            return Err(RelightError::config("iteration counts must be at least 1"));
        }
        if self.step_cap == Some(0) {
            return Err(RelightError::config("step cap must be at least 1"));
        }
        if !self.sun_direction.is_finite() || self.sun_direction.length_squared() == 0.0 {
            return Err(RelightError::config(format!(
                "sun direction must be a finite non-zero vector, got {}",
                self.sun_direction
            )));
        }
        if !self.direct_light.is_finite() || self.direct_light.length_squared() == 0.0 {
            return Err(RelightError::config(format!(
                "direct light must be a finite non-zero vector, got {}",
                self.direct_light
            )));
        }
        if !(self.sun_distance > 0.0) || !self.sun_distance.is_finite() {
            return Err(RelightError::config("sun distance must be positive"));
        }
        if !(self.sun_radius >= 0.0) || !self.sun_radius.is_finite() {
            return Err(RelightError::config("sun radius must be non-negative"));
        }
        if !(self.pixel_scale > 0.0) || !self.pixel_scale.is_finite() {
            return Err(RelightError::invalid(format!(
                "pixel scale must be positive, got {}",
                self.pixel_scale
            )));
        }
        if !self.elevation_scale.is_finite() {
            return Err(RelightError::config("elevation scale must be finite"));
        }
        for (name, weight) in [("shadow", self.shadow_weight), ("ambient", self.ambient_weight)] {
            if !(weight >= 0.0) || !weight.is_finite() {
                return Err(RelightError::config(format!("{name} weight must be non-negative")));
            }
        }
        if !(self.gamma > 0.0) || !self.gamma.is_finite() {
            return Err(RelightError::config("gamma must be positive"));
        }
        Ok(())
    }

    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Write as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }
}
