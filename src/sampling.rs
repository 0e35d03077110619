//! Random sampling directions for the accumulation passes.
//!
//! All samplers draw from a caller-supplied `Rng`, so a seeded
//! `ChaCha8Rng` reproduces a run exactly.

use glam::Vec3;
use rand::Rng;

/// Mean Earth-Sun distance in meters.
pub const SUN_DISTANCE: f32 = 149_600_000_000.0;
/// Solar radius in meters.
pub const SUN_RADIUS: f32 = 695_508_000.0;
/// Enlargement applied to the solar radius so shadows soften visibly.
pub const SUN_RADIUS_EXAGGERATION: f32 = 100.0;

/// Random point on the surface of a sphere of `radius` centered at the origin.
///
/// Uniform in azimuth and in height, which is uniform over the sphere surface.
pub fn random_on_sphere<R: Rng + ?Sized>(rng: &mut R, radius: f32) -> Vec3 {
    let azimuth = rng.gen::<f32>() * std::f32::consts::TAU;
    let z = rng.gen::<f32>() * 2.0 - 1.0;
    let ring = (1.0 - z * z).max(0.0).sqrt() * radius;
    Vec3::new(azimuth.cos() * ring, azimuth.sin() * ring, z * radius)
}

/// Uniformly random unit direction over the full sphere.
pub fn uniform_sphere_direction<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    random_on_sphere(rng, 1.0)
}

/// `normalize(normal + random)`, leaning samples into the normal's hemisphere.
///
/// When the two cancel the normal itself is returned.
#[inline]
pub fn hemisphere_biased(normal: Vec3, random: Vec3) -> Vec3 {
    (normal + random).normalize_or(normal)
}

/// Extended light source: a sphere of `radius` at `distance` along `direction`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SunDisk {
    direction: Vec3,
    distance: f32,
    radius: f32,
}

impl SunDisk {
    /// `direction` need not be normalized but must be non-zero.
    pub fn new(direction: Vec3, distance: f32, radius: f32) -> Self {
        Self {
            direction: direction.normalize_or(Vec3::Z),
            distance,
            radius,
        }
    }

    /// Center direction of the disk.
    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    /// Angular radius of the disk in radians.
    pub fn angular_radius(&self) -> f32 {
        if self.distance <= 0.0 {
            return std::f32::consts::PI;
        }
        (self.radius / self.distance).clamp(0.0, 1.0).asin()
    }

    /// Draw a unit direction toward a random point on the light's surface.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec3 {
        let offset = random_on_sphere(rng, self.radius);
        (self.direction * self.distance + offset).normalize_or(self.direction)
    }
}

impl Default for SunDisk {
    fn default() -> Self {
        Self::new(
            Vec3::new(1.0, 1.0, 0.5),
            SUN_DISTANCE,
            SUN_RADIUS * SUN_RADIUS_EXAGGERATION,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_sphere_points_have_requested_radius() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..1000 {
            let p = random_on_sphere(&mut rng, 3.5);
            assert!((p.length() - 3.5).abs() < 1e-4);
        }
    }

    #[test]
    fn test_uniform_directions_average_out() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let n = 20_000;
        let mut sum = Vec3::ZERO;
        for _ in 0..n {
            sum += uniform_sphere_direction(&mut rng);
        }
        let mean = sum / n as f32;
        assert!(mean.length() < 0.03, "{mean:?}");
    }

    #[test]
    fn test_sun_samples_stay_within_disk() {
        let sun = SunDisk::default();
        let limit = sun.angular_radius().cos() - 1e-4;
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..2000 {
            let d = sun.sample(&mut rng);
            assert!((d.length() - 1.0).abs() < 1e-5);
            assert!(d.dot(sun.direction()) >= limit);
        }
    }

    #[test]
    fn test_point_light_has_no_spread() {
        let sun = SunDisk::new(Vec3::new(0.0, 0.0, 2.0), 1.0e6, 0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert_eq!(sun.sample(&mut rng), Vec3::Z);
        assert_eq!(sun.angular_radius(), 0.0);
    }

    #[test]
    fn test_hemisphere_bias_handles_cancellation() {
        let n = Vec3::Z;
        assert_eq!(hemisphere_biased(n, -Vec3::Z), Vec3::Z);
        let d = hemisphere_biased(n, Vec3::X);
        assert!((d - Vec3::new(1.0, 0.0, 1.0).normalize()).length() < 1e-6);
    }

    #[test]
    fn test_same_seed_same_samples() {
        let sun = SunDisk::default();
        let mut a = ChaCha8Rng::seed_from_u64(99);
        let mut b = ChaCha8Rng::seed_from_u64(99);
        for _ in 0..16 {
            assert_eq!(sun.sample(&mut a), sun.sample(&mut b));
            assert_eq!(uniform_sphere_direction(&mut a), uniform_sphere_direction(&mut b));
        }
    }
}
