//! Stochastic soft shadow and ambient occlusion accumulation.
//!
//! Each pass runs K iterations. An iteration draws one random direction on
//! the driving thread, then every cell marches a ray in parallel and adds
//! `weight / K` to its running total when the ray escapes.
//!
//! The running totals live in a two-slot ping-pong buffer: an iteration reads
//! only the front slot and writes only the back slot, then the slots swap.
//! The rayon join that ends the parallel loop is the barrier between
//! iterations, so no cell ever reads a value written in the same iteration.
//!
//! Parallelization: Uses rayon, one task per grid row.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use glam::Vec3;
use rand::Rng;
use rayon::prelude::*;
use tracing::{debug, info_span, warn};

use crate::error::{RelightError, Result};
use crate::heightfield::Heightfield;
use crate::normals::NormalField;
use crate::raymarch::{MarchOutcome, RayMarcher};
use crate::sampling::{hemisphere_biased, uniform_sphere_direction, SunDisk};
use crate::tilemap::Tilemap;

/// Two same-sized grids, one readable (front) and one being written (back).
#[derive(Clone, Debug)]
pub struct PingPong {
    slots: [Tilemap<f32>; 2],
    front: usize,
}

impl PingPong {
    /// Both slots zeroed.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            slots: [Tilemap::new_with(width, height, 0.0), Tilemap::new_with(width, height, 0.0)],
            front: 0,
        }
    }

    pub fn front(&self) -> &Tilemap<f32> {
        &self.slots[self.front]
    }

    /// Borrow the front for reading and the back for writing.
    pub fn split(&mut self) -> (&Tilemap<f32>, &mut Tilemap<f32>) {
        let (first, second) = self.slots.split_at_mut(1);
        if self.front == 0 {
            (&first[0], &mut second[0])
        } else {
            (&second[0], &mut first[0])
        }
    }

    /// Make the back the new front.
    pub fn swap(&mut self) {
        self.front = 1 - self.front;
    }

    pub fn into_front(self) -> Tilemap<f32> {
        let [a, b] = self.slots;
        if self.front == 0 { a } else { b }
    }
}

/// Cooperative stop request, honoured only between iterations.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Where an accumulator is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccumulationState {
    /// Buffer zeroed, no iteration run yet
    Empty,
    /// `iteration` iterations completed, more to go
    Sampling { iteration: usize },
    /// All iterations completed; the front buffer is final
    Converged,
    /// Stopped at an iteration boundary
    Cancelled { completed: usize },
}

/// What one pass samples and how much an escaped ray is worth.
pub trait VisibilityPass: Sync {
    /// Short name for logs.
    const NAME: &'static str;

    /// Draw the random direction shared by every cell this iteration.
    fn draw_sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec3;

    /// Direction actually marched from a cell with `normal`.
    fn ray_direction(&self, normal: Vec3, sample: Vec3) -> Vec3;

    /// Contribution of an unoccluded ray, in [0, 1].
    fn weight(&self, normal: Vec3, ray: Vec3) -> f32;
}

/// Sun visibility weighted by the Lambert cosine.
#[derive(Clone, Copy, Debug)]
pub struct ShadowPass {
    pub sun: SunDisk,
}

impl VisibilityPass for ShadowPass {
    const NAME: &'static str = "shadow";

    fn draw_sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec3 {
        self.sun.sample(rng)
    }

    fn ray_direction(&self, _normal: Vec3, sample: Vec3) -> Vec3 {
        sample
    }

    fn weight(&self, normal: Vec3, ray: Vec3) -> f32 {
        normal.dot(ray).clamp(0.0, 1.0)
    }
}

/// Sky visibility over the normal's hemisphere.
#[derive(Clone, Copy, Debug, Default)]
pub struct AmbientPass;

impl VisibilityPass for AmbientPass {
    const NAME: &'static str = "ambient";

    fn draw_sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec3 {
        uniform_sphere_direction(rng)
    }

    fn ray_direction(&self, normal: Vec3, sample: Vec3) -> Vec3 {
        hemisphere_biased(normal, sample)
    }

    fn weight(&self, _normal: Vec3, _ray: Vec3) -> f32 {
        1.0
    }
}

/// Finished accumulation.
#[derive(Clone, Debug)]
pub struct Accumulation {
    /// Per-cell result in [0, 1]
    pub values: Tilemap<f32>,
    pub iterations: usize,
    /// Rays that exhausted the step cap (counted as unoccluded)
    pub cap_hits: u64,
}

/// Drives one `VisibilityPass` over a heightfield.
pub struct Accumulator<'a, P: VisibilityPass> {
    pass: P,
    marcher: RayMarcher<'a>,
    normals: &'a NormalField,
    iterations: usize,
    buffer: PingPong,
    state: AccumulationState,
    cap_hits: AtomicU64,
    cancel: Option<CancelFlag>,
}

pub type ShadowAccumulator<'a> = Accumulator<'a, ShadowPass>;
pub type AmbientAccumulator<'a> = Accumulator<'a, AmbientPass>;

impl<'a> ShadowAccumulator<'a> {
    pub fn shadow(
        heightfield: &'a Heightfield,
        normals: &'a NormalField,
        sun: SunDisk,
        iterations: usize,
    ) -> Result<Self> {
        Accumulator::new(ShadowPass { sun }, heightfield, normals, iterations)
    }
}

impl<'a> AmbientAccumulator<'a> {
    pub fn ambient(
        heightfield: &'a Heightfield,
        normals: &'a NormalField,
        iterations: usize,
    ) -> Result<Self> {
        Accumulator::new(AmbientPass, heightfield, normals, iterations)
    }
}

impl<'a, P: VisibilityPass> Accumulator<'a, P> {
    pub fn new(
        pass: P,
        heightfield: &'a Heightfield,
        normals: &'a NormalField,
        iterations: usize,
    ) -> Result<Self> {
        RelightError::check_dimensions("normal field", heightfield.dimensions(), normals.dimensions())?;
        if iterations == 0 {
            return Err(RelightError::config("iteration count must be at least 1"));
        }
        let (width, height) = heightfield.dimensions();
        Ok(Self {
            pass,
            marcher: RayMarcher::new(heightfield),
            normals,
            iterations,
            buffer: PingPong::new(width, height),
            state: AccumulationState::Empty,
            cap_hits: AtomicU64::new(0),
            cancel: None,
        })
    }

    /// Override the ray marcher's derived step cap.
    pub fn with_step_cap(mut self, step_cap: usize) -> Self {
        self.marcher = self.marcher.with_step_cap(step_cap);
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn state(&self) -> AccumulationState {
        self.state
    }

    /// Current readable result (the front buffer).
    pub fn current(&self) -> &Tilemap<f32> {
        self.buffer.front()
    }

    fn completed(&self) -> usize {
        match self.state {
            AccumulationState::Empty => 0,
            AccumulationState::Sampling { iteration } => iteration,
            AccumulationState::Converged => self.iterations,
            AccumulationState::Cancelled { completed } => completed,
        }
    }

    /// Run one iteration. Does nothing once converged.
    pub fn step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<AccumulationState> {
        let completed = self.completed();
        match self.state {
            AccumulationState::Converged => return Ok(self.state),
            AccumulationState::Cancelled { completed } => {
                return Err(RelightError::Cancelled { completed, total: self.iterations });
            }
            _ => {}
        }
        if self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
            self.state = AccumulationState::Cancelled { completed };
            return Err(RelightError::Cancelled { completed, total: self.iterations });
        }

        let sample = self.pass.draw_sample(rng);
        let increment = 1.0 / self.iterations as f32;

        let pass = &self.pass;
        let marcher = &self.marcher;
        let normals = self.normals;
        let cap_hits = &self.cap_hits;
        let (front, back) = self.buffer.split();
        let width = front.width;

        back.as_mut_slice()
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, out) in row.iter_mut().enumerate() {
                    let normal = normals.at(x, y);
                    let ray = pass.ray_direction(normal, sample);
                    let weight = pass.weight(normal, ray);
                    let visible = if weight > 0.0 {
                        match marcher.march(x, y, ray) {
                            MarchOutcome::Occluded => 0.0,
                            MarchOutcome::CapReached => {
                                cap_hits.fetch_add(1, Ordering::Relaxed);
                                weight
                            }
                            MarchOutcome::Escaped | MarchOutcome::Vertical => weight,
                        }
                    } else {
                        0.0
                    };
                    *out = (*front.get(x, y) + increment * visible).min(1.0);
                }
            });
        self.buffer.swap();

        let iteration = completed + 1;
        self.state = if iteration >= self.iterations {
            AccumulationState::Converged
        } else {
            AccumulationState::Sampling { iteration }
        };
        debug!(pass = P::NAME, iteration, total = self.iterations, "accumulation step");
        Ok(self.state)
    }

    /// Run all remaining iterations and hand back the result.
    pub fn run<R: Rng + ?Sized>(mut self, rng: &mut R) -> Result<Accumulation> {
        let _span = info_span!("accumulate", pass = P::NAME, iterations = self.iterations).entered();
        while self.state != AccumulationState::Converged {
            self.step(rng)?;
        }
        Ok(self.finish())
    }

    fn finish(self) -> Accumulation {
        let cap_hits = self.cap_hits.load(Ordering::Relaxed);
        if cap_hits > 0 {
            warn!(pass = P::NAME, cap_hits, "ray march step cap reached; rays treated as unoccluded");
        }
        Accumulation {
            values: self.buffer.into_front(),
            iterations: self.iterations,
            cap_hits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn flat(width: usize, height: usize) -> (Heightfield, NormalField) {
        let hf = Heightfield::flat(width, height, 100.0, 30.0).unwrap();
        let normals = NormalField::estimate(&hf);
        (hf, normals)
    }

    #[test]
    fn test_ping_pong_swaps_without_copying() {
        let mut buffer = PingPong::new(2, 2);
        {
            let (front, back) = buffer.split();
            assert_eq!(*front.get(0, 0), 0.0);
            back.set(0, 0, 5.0);
        }
        assert_eq!(*buffer.front().get(0, 0), 0.0);
        buffer.swap();
        assert_eq!(*buffer.front().get(0, 0), 5.0);
        {
            let (front, back) = buffer.split();
            assert_eq!(*front.get(0, 0), 5.0);
            assert_eq!(*back.get(0, 0), 0.0);
        }
        assert_eq!(*buffer.into_front().get(0, 0), 5.0);
    }

    #[test]
    fn test_flat_shadow_matches_cosine_of_samples() {
        let (hf, normals) = flat(12, 9);
        let sun = SunDisk::default();
        let iterations = 128;

        let result = ShadowAccumulator::shadow(&hf, &normals, sun, iterations)
            .unwrap()
            .run(&mut ChaCha8Rng::seed_from_u64(42))
            .unwrap();

        // Replay the same draws to get the exact expected value.
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let increment = 1.0 / iterations as f32;
        let mut expected = 0.0f32;
        for _ in 0..iterations {
            let l = sun.sample(&mut rng);
            expected = (expected + increment * l.z.clamp(0.0, 1.0)).min(1.0);
        }

        for (x, y, &v) in result.values.iter() {
            assert!((v - expected).abs() < 1e-6, "({x}, {y}) = {v}, expected {expected}");
        }
        // Close to the cosine of the disk center, 0.5 / 1.5.
        assert!((expected - 1.0 / 3.0).abs() < 0.1);
        assert_eq!(result.cap_hits, 0);
    }

    #[test]
    fn test_flat_ambient_sees_whole_sky() {
        let (hf, normals) = flat(10, 10);
        let result = AmbientAccumulator::ambient(&hf, &normals, 128)
            .unwrap()
            .run(&mut ChaCha8Rng::seed_from_u64(5))
            .unwrap();
        for (_, _, &v) in result.values.iter() {
            assert!((v - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_pit_floor_is_darker_than_open_ground() {
        // 1000 m ring wall two cells around the center of a 21x21 grid.
        let grid = Tilemap::from_fn(21, 21, |x, y| {
            let r = (x as i64 - 10).abs().max((y as i64 - 10).abs());
            if r == 2 { 1000.0 } else { 0.0 }
        });
        let hf = Heightfield::new(grid, 10.0).unwrap();
        let normals = NormalField::estimate(&hf);
        let result = AmbientAccumulator::ambient(&hf, &normals, 64)
            .unwrap()
            .run(&mut ChaCha8Rng::seed_from_u64(11))
            .unwrap();

        let center = *result.values.get(10, 10);
        let corner = *result.values.get(0, 0);
        assert!(center < 0.05, "center {center}");
        assert!(corner > center + 0.3, "corner {corner}");
    }

    #[test]
    fn test_slope_facing_away_from_sun_stays_dark() {
        // Steep slope falling toward the south-west, sun in the north-east behind it.
        let grid = Tilemap::from_fn(8, 8, |x, y| (x + y) as f32 * 100.0);
        let hf = Heightfield::new(grid, 1.0).unwrap();
        let normals = NormalField::estimate(&hf);
        let sun = SunDisk::new(Vec3::new(1.0, 1.0, 0.1), 1.0e6, 0.0);
        let result = ShadowAccumulator::shadow(&hf, &normals, sun, 8)
            .unwrap()
            .run(&mut ChaCha8Rng::seed_from_u64(1))
            .unwrap();
        assert_eq!(*result.values.get(3, 3), 0.0);
    }

    #[test]
    fn test_values_never_decrease_between_steps() {
        let grid = Tilemap::from_fn(16, 16, |x, y| ((x * 7 + y * 13) % 5) as f32 * 40.0);
        let hf = Heightfield::new(grid, 10.0).unwrap();
        let normals = NormalField::estimate(&hf);
        let mut acc = AmbientAccumulator::ambient(&hf, &normals, 10).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        assert_eq!(acc.state(), AccumulationState::Empty);
        let mut previous = acc.current().clone();
        for i in 1..=10 {
            let state = acc.step(&mut rng).unwrap();
            if i < 10 {
                assert_eq!(state, AccumulationState::Sampling { iteration: i });
            } else {
                assert_eq!(state, AccumulationState::Converged);
            }
            for ((_, _, &now), (_, _, &before)) in acc.current().iter().zip(previous.iter()) {
                assert!(now >= before);
                assert!((0.0..=1.0).contains(&now));
            }
            previous = acc.current().clone();
        }
        // Stepping a converged accumulator changes nothing.
        assert_eq!(acc.step(&mut rng).unwrap(), AccumulationState::Converged);
        assert_eq!(acc.current(), &previous);
    }

    #[test]
    fn test_cancel_stops_at_iteration_boundary() {
        let (hf, normals) = flat(6, 6);
        let cancel = CancelFlag::new();
        let mut acc = AmbientAccumulator::ambient(&hf, &normals, 16)
            .unwrap()
            .with_cancel_flag(cancel.clone());
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        for _ in 0..3 {
            acc.step(&mut rng).unwrap();
        }
        cancel.cancel();
        let err = acc.step(&mut rng).unwrap_err();
        assert!(matches!(err, RelightError::Cancelled { completed: 3, total: 16 }));
        assert_eq!(acc.state(), AccumulationState::Cancelled { completed: 3 });
        // Three full increments were kept.
        assert!((*acc.current().get(2, 2) - 3.0 / 16.0).abs() < 1e-6);
    }

    #[test]
    fn test_cap_hits_are_counted_and_fail_open() {
        let (hf, normals) = flat(8, 8);
        let result = AmbientAccumulator::ambient(&hf, &normals, 4)
            .unwrap()
            .with_step_cap(1)
            .run(&mut ChaCha8Rng::seed_from_u64(9))
            .unwrap();
        assert!(result.cap_hits > 0);
        for (_, _, &v) in result.values.iter() {
            assert!((v - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_same_seed_is_bit_identical() {
        let grid = Tilemap::from_fn(20, 14, |x, y| ((x * x + 3 * y) % 17) as f32 * 25.0);
        let hf = Heightfield::new(grid, 15.0).unwrap();
        let normals = NormalField::estimate(&hf);
        let run = |seed| {
            ShadowAccumulator::shadow(&hf, &normals, SunDisk::default(), 32)
                .unwrap()
                .run(&mut ChaCha8Rng::seed_from_u64(seed))
                .unwrap()
                .values
        };
        assert_eq!(run(77), run(77));
    }

    #[test]
    fn test_rejects_mismatched_normals_and_zero_iterations() {
        let (hf, _) = flat(4, 4);
        let (_, other_normals) = flat(5, 4);
        assert!(AmbientAccumulator::ambient(&hf, &other_normals, 8).is_err());
        let normals = NormalField::estimate(&hf);
        assert!(AmbientAccumulator::ambient(&hf, &normals, 0).is_err());
    }
}
