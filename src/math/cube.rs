use super::{Point3d, Vector3d};
use crate::util::Interval;
use cgmath::prelude::*;

/// An axis-aligned box.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cube {
    /// The extents along x, y and z.
    pub d: [Interval<f64>; 3],
}

impl Cube {
    /// Creates a box from its extents along each axis.
    pub const fn new(x: Interval<f64>, y: Interval<f64>, z: Interval<f64>) -> Self {
        Self { d: [x, y, z] }
    }

    /// Creates the smallest box containing both points.
    pub fn from_points(a: Point3d, b: Point3d) -> Self {
        let d = [0, 1, 2].map(|i| Interval::new(f64::min(a[i], b[i]), f64::max(a[i], b[i])));
        Self { d }
    }

    /// A box centred on `centre` with the given half extents.
    pub fn from_centre(centre: Point3d, half: Vector3d) -> Self {
        let d = [0, 1, 2].map(|i| Interval::disc(centre[i], half[i]));
        Self { d }
    }

    /// The degenerate box with every coordinate zero.
    pub const fn all_zeros() -> Self {
        let zero = Interval::new(0.0, 0.0);
        Self::new(zero, zero, zero)
    }

    /// Whether every coordinate of the box is zero.
    pub fn is_all_zeros(&self) -> bool {
        self.d.iter().all(|i| i.min == 0.0 && i.max == 0.0)
    }

    pub fn z1(&self) -> f64 {
        self.d[2].min
    }

    pub fn z2(&self) -> f64 {
        self.d[2].max
    }

    pub fn center(&self) -> Point3d {
        Point3d::new(self.d[0].midpoint(), self.d[1].midpoint(), self.d[2].midpoint())
    }

    /// The size of the box along `dim`.
    pub fn size(&self, dim: usize) -> f64 {
        self.d[dim].length()
    }

    pub fn intersects(&self, other: &Cube) -> bool {
        self.d.iter().zip(&other.d).all(|(a, b)| a.overlaps(b))
    }

    pub fn intersects_xy(&self, other: &Cube) -> bool {
        self.d[0].overlaps(&other.d[0]) && self.d[1].overlaps(&other.d[1])
    }

    pub fn contains_pt_xy(&self, p: Point3d) -> bool {
        self.d[0].contains(p.x) && self.d[1].contains(p.y)
    }

    /// Moves the box by `val` along `dim`.
    pub fn translate_dim(&mut self, dim: usize, val: f64) {
        self.d[dim] = self.d[dim] + val;
    }

    /// Grows the box by `amount` along `dim` only.
    pub fn expand_in_dim(&self, dim: usize, amount: f64) -> Cube {
        let mut c = *self;
        c.d[dim] = c.d[dim].expand(amount);
        c
    }

    /// Grows the box by `amount` in every direction.
    pub fn expand_by(&self, amount: f64) -> Cube {
        Cube {
            d: self.d.map(|i| i.expand(amount)),
        }
    }

    /// The smallest box containing both boxes.
    pub fn union(&self, other: &Cube) -> Cube {
        Cube {
            d: [0, 1, 2].map(|i| self.d[i].union(&other.d[i])),
        }
    }

    /// The point of the box nearest to `p`.
    pub fn closest_pt(&self, p: Point3d) -> Point3d {
        Point3d::new(self.d[0].clamp(p.x), self.d[1].clamp(p.y), self.d[2].clamp(p.z))
    }

    /// Squared distance from `p` to the box; zero when `p` is inside.
    pub fn closest_dist_sq(&self, p: Point3d) -> f64 {
        (p - self.closest_pt(p)).magnitude2()
    }

    /// Intersects the line segment `p1 -> p2` with the box.
    /// Returns the parametric position of the first hit along the segment.
    pub fn line_intersect(&self, p1: Point3d, p2: Point3d) -> Option<f64> {
        let dir = p2 - p1;
        let (mut t_enter, mut t_exit) = (0.0f64, 1.0f64);

        for i in 0..3 {
            let range = self.d[i];
            if dir[i].abs() < f64::EPSILON {
                if !range.contains(p1[i]) {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / dir[i];
            let (mut t0, mut t1) = ((range.min - p1[i]) * inv, (range.max - p1[i]) * inv);
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_enter = t_enter.max(t0);
            t_exit = t_exit.min(t1);
            if t_enter > t_exit {
                return None;
            }
        }
        Some(t_enter)
    }

    /// Pushes a sphere at `pos` out of the box.
    /// Returns the collision normal if the sphere was touching the box.
    ///
    /// # Parameters
    /// * `pos` - The sphere centre, updated in place
    /// * `p_last` - The sphere centre on the previous frame
    /// * `radius` - The sphere radius
    pub fn sphere_push_out(&self, pos: &mut Point3d, p_last: Point3d, radius: f64) -> Option<Vector3d> {
        let closest = self.closest_pt(*pos);
        let delta = *pos - closest;
        let dist_sq = delta.magnitude2();

        if dist_sq >= radius * radius {
            return None;
        }
        if dist_sq > 0.0 {
            let normal = delta / dist_sq.sqrt();
            *pos = closest + normal * radius;
            return Some(normal);
        }

        // The centre is inside the box; leave through the face with the least penetration,
        // preferring the side the sphere came from.
        let (dim, dir) = (0..3)
            .flat_map(|dim| [(dim, false), (dim, true)])
            .min_by(|a, b| {
                let pen = |&(dim, dir): &(usize, bool)| {
                    let face = self.d[dim].end(dir);
                    let came_from = if dir { p_last[dim] >= face } else { p_last[dim] <= face };
                    (face - pos[dim]).abs() - if came_from { radius } else { 0.0 }
                };
                pen(a).total_cmp(&pen(b))
            })
            .expect("three dimensions");
        let mut normal = Vector3d::new(0.0, 0.0, 0.0);
        normal[dim] = if dir { 1.0 } else { -1.0 };
        pos[dim] = self.d[dim].end(dir) + normal[dim] * radius;
        Some(normal)
    }
}
