//! Heightfield visibility test.
//!
//! A ray leaves the center of an origin cell, is projected onto the grid
//! plane, and walks the cells it crosses using an Amanatides–Woo digital
//! differential analyzer. At every visited cell the ray's height is predicted
//! from the traveled distance; terrain above that height blocks the ray.
//!
//! Leaving the grid counts as unoccluded, even right next to the border. That
//! slightly over-lights edge cells and is kept as-is.

use glam::{Vec2, Vec3};

use crate::heightfield::Heightfield;

/// Planar direction length below which a ray is treated as vertical.
pub const VERTICAL_EPSILON: f32 = 1e-6;

/// Extra steps allowed beyond the longest possible walk across the grid.
const STEP_CAP_MARGIN: usize = 16;

/// Step cap for a grid of the given size.
///
/// Every DDA step moves one cell away from the origin along x or y, so no walk
/// stays inside a `width x height` grid for more than `width + height` steps.
pub fn step_cap_for(width: usize, height: usize) -> usize {
    2 * (width + height) + STEP_CAP_MARGIN
}

/// A cell visited by the traversal, with the distance (in cells) from the
/// origin cell's center to this cell's center.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisitedCell {
    pub x: i64,
    pub y: i64,
    pub t: f32,
}

/// Unbounded walk over the cells crossed by a planar ray, origin excluded.
///
/// The iterator never ends on its own; callers bound it by grid exit or by
/// `take`.
#[derive(Clone, Debug)]
pub struct GridTraversal {
    origin: (i64, i64),
    cell: (i64, i64),
    step: (i64, i64),
    t_max: Vec2,
    t_delta: Vec2,
}

impl GridTraversal {
    /// Start at the center of `origin` heading along `dir`, which must be a
    /// unit planar vector.
    pub fn new(origin: (i64, i64), dir: Vec2) -> Self {
        let step = (axis_step(dir.x), axis_step(dir.y));
        // Starting from a cell center, the first boundary is half a cell away on both axes.
        // A zero component divides to +inf, so that axis is never chosen.
        let abs = dir.abs();
        let t_delta = Vec2::new(1.0 / abs.x, 1.0 / abs.y);
        let t_max = t_delta * 0.5;
        Self {
            origin,
            cell: origin,
            step,
            t_max,
            t_delta,
        }
    }
}

#[inline]
fn axis_step(component: f32) -> i64 {
    if component > 0.0 {
        1
    } else if component < 0.0 {
        -1
    } else {
        0
    }
}

impl Iterator for GridTraversal {
    type Item = VisitedCell;

    fn next(&mut self) -> Option<VisitedCell> {
        if self.t_max.x < self.t_max.y {
            self.t_max.x += self.t_delta.x;
            self.cell.0 += self.step.0;
        } else {
            self.t_max.y += self.t_delta.y;
            self.cell.1 += self.step.1;
        }
        let dx = (self.cell.0 - self.origin.0) as f32;
        let dy = (self.cell.1 - self.origin.1) as f32;
        Some(VisitedCell {
            x: self.cell.0,
            y: self.cell.1,
            t: (dx * dx + dy * dy).sqrt(),
        })
    }
}

/// How a march ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarchOutcome {
    /// Terrain rose above the ray
    Occluded,
    /// The ray left the grid without hitting terrain
    Escaped,
    /// No planar component to walk along
    Vertical,
    /// The step cap ran out first; counted as unoccluded
    CapReached,
}

impl MarchOutcome {
    pub fn is_occluded(self) -> bool {
        self == MarchOutcome::Occluded
    }
}

/// Visibility queries against one heightfield.
#[derive(Clone, Copy, Debug)]
pub struct RayMarcher<'a> {
    heightfield: &'a Heightfield,
    step_cap: usize,
}

impl<'a> RayMarcher<'a> {
    pub fn new(heightfield: &'a Heightfield) -> Self {
        let (width, height) = heightfield.dimensions();
        Self {
            heightfield,
            step_cap: step_cap_for(width, height),
        }
    }

    /// Override the derived step cap.
    pub fn with_step_cap(mut self, step_cap: usize) -> Self {
        self.step_cap = step_cap;
        self
    }

    pub fn step_cap(&self) -> usize {
        self.step_cap
    }

    /// Walk from the center of cell (x, y) along `direction` and report what stopped the ray.
    ///
    /// The predicted ray height at distance `t` cells is
    /// `e0 + t * pixel_scale * direction.z`.
    pub fn march(&self, x: usize, y: usize, direction: Vec3) -> MarchOutcome {
        let planar = direction.truncate();
        let planar_len = planar.length();
        if !(planar_len > VERTICAL_EPSILON) {
            return MarchOutcome::Vertical;
        }
        let dir = planar / planar_len;

        let hf = self.heightfield;
        let e0 = hf.at(x, y);
        let rise = hf.pixel_scale() * direction.z;

        for cell in GridTraversal::new((x as i64, y as i64), dir).take(self.step_cap) {
            if !hf.elevation().in_bounds(cell.x, cell.y) {
                return MarchOutcome::Escaped;
            }
            let z = e0 + cell.t * rise;
            if hf.at(cell.x as usize, cell.y as usize) > z {
                return MarchOutcome::Occluded;
            }
        }
        MarchOutcome::CapReached
    }

    /// True if terrain blocks `direction` as seen from cell (x, y).
    pub fn occluded(&self, x: usize, y: usize, direction: Vec3) -> bool {
        self.march(x, y, direction).is_occluded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tilemap::Tilemap;
    use std::collections::HashSet;

    fn cells(origin: (i64, i64), dir: Vec2, n: usize) -> Vec<(i64, i64)> {
        GridTraversal::new(origin, dir.normalize())
            .take(n)
            .map(|c| (c.x, c.y))
            .collect()
    }

    #[test]
    fn test_axis_aligned_walk() {
        assert_eq!(cells((0, 0), Vec2::X, 3), vec![(1, 0), (2, 0), (3, 0)]);
        assert_eq!(cells((5, 5), -Vec2::Y, 2), vec![(5, 4), (5, 3)]);
    }

    #[test]
    fn test_diagonal_ties_advance_y_first() {
        assert_eq!(
            cells((0, 0), Vec2::new(1.0, 1.0), 4),
            vec![(0, 1), (1, 1), (1, 2), (2, 2)]
        );
    }

    #[test]
    fn test_shallow_ray_crosses_expected_cells() {
        // Slope 1/4: two x steps before the first y step.
        let visited = cells((0, 0), Vec2::new(4.0, 1.0), 6);
        assert_eq!(visited[0], (1, 0));
        assert_eq!(visited[1], (2, 0));
        assert_eq!(visited[2], (2, 1));
        assert!(visited.iter().all(|&(_, y)| y <= 2));
    }

    #[test]
    fn test_distance_strictly_increases_and_cells_unique() {
        let directions = [
            Vec2::new(1.0, 0.3),
            Vec2::new(-0.2, 1.0),
            Vec2::new(-1.0, -1.0),
            Vec2::new(0.7, -0.9),
            Vec2::new(0.0, -1.0),
            Vec2::new(0.123, 0.987),
        ];
        for dir in directions {
            let mut seen = HashSet::new();
            let mut last_t = 0.0f32;
            for cell in GridTraversal::new((10, 10), dir.normalize()).take(200) {
                assert!(cell.t > last_t, "{dir:?}: {} <= {}", cell.t, last_t);
                assert!(seen.insert((cell.x, cell.y)), "{dir:?} revisited a cell");
                last_t = cell.t;
            }
        }
    }

    #[test]
    fn test_flat_terrain_is_never_occluded() {
        let hf = Heightfield::flat(32, 24, 250.0, 30.0).unwrap();
        let marcher = RayMarcher::new(&hf);
        let directions = [
            Vec3::new(1.0, 1.0, 0.5),
            Vec3::new(-1.0, 0.2, 0.1),
            Vec3::new(0.3, -1.0, 0.0),
            Vec3::new(0.5, 0.5, -0.01),
        ];
        for dir in directions {
            let dir = dir.normalize();
            for (x, y) in [(0, 0), (31, 23), (16, 12), (5, 20)] {
                let outcome = marcher.march(x, y, dir);
                if dir.z >= 0.0 {
                    assert_eq!(outcome, MarchOutcome::Escaped, "{dir:?} from ({x}, {y})");
                }
            }
        }
    }

    #[test]
    fn test_vertical_ray_is_unoccluded() {
        // A pit: every horizontal ray is blocked immediately.
        let mut grid = Tilemap::new_with(5, 5, 1000.0f32);
        grid.set(2, 2, 0.0);
        let hf = Heightfield::new(grid, 1.0).unwrap();
        let marcher = RayMarcher::new(&hf);
        assert_eq!(marcher.march(2, 2, Vec3::Z), MarchOutcome::Vertical);
        assert!(!marcher.occluded(2, 2, Vec3::new(1e-9, 0.0, 1.0)));
    }

    #[test]
    fn test_wall_blocks_low_ray_but_not_high_ray() {
        // 20 m wall three cells east of the origin, 10 m cells.
        let grid = Tilemap::from_fn(16, 4, |x, _| if x == 5 { 20.0 } else { 0.0 });
        let hf = Heightfield::new(grid, 10.0).unwrap();
        let marcher = RayMarcher::new(&hf);

        // At t = 3 the low ray is about 5.9 m high, the steep one about 29.9 m.
        let low = Vec3::new(1.0, 0.0, 0.2).normalize();
        assert!(marcher.occluded(2, 1, low));

        let high = Vec3::new(0.1, 0.0, 1.0).normalize();
        assert!(!marcher.occluded(2, 1, high));

        // Looking away from the wall is unobstructed.
        let west = Vec3::new(-1.0, 0.0, 0.2).normalize();
        assert_eq!(marcher.march(2, 1, west), MarchOutcome::Escaped);
    }

    #[test]
    fn test_derived_cap_always_resolves() {
        let hf = Heightfield::flat(40, 3, 0.0, 1.0).unwrap();
        let marcher = RayMarcher::new(&hf);
        assert_eq!(marcher.step_cap(), step_cap_for(40, 3));
        assert_eq!(step_cap_for(40, 3), 2 * (40 + 3) + 16);
        for i in 0..64 {
            let angle = i as f32 * std::f32::consts::TAU / 64.0;
            let dir = Vec3::new(angle.cos(), angle.sin(), 0.05);
            for (x, y) in [(0, 0), (39, 2), (20, 1)] {
                assert_ne!(marcher.march(x, y, dir), MarchOutcome::CapReached);
            }
        }
    }

    #[test]
    fn test_cap_reached_fails_open() {
        let hf = Heightfield::flat(64, 64, 0.0, 1.0).unwrap();
        let marcher = RayMarcher::new(&hf).with_step_cap(2);
        let dir = Vec3::new(1.0, 0.0, 0.5).normalize();
        assert_eq!(marcher.march(10, 10, dir), MarchOutcome::CapReached);
        assert!(!marcher.occluded(10, 10, dir));
    }
}
