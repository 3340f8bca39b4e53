use glam::DVec3;

use crate::Aabb;

/// Bounding sphere in f64 world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingSphere {
    pub center: DVec3,
    pub radius: f64,
}

impl BoundingSphere {
    pub fn new(center: DVec3, radius: f64) -> Self {
        Self {
            center,
            radius: radius.abs(),
        }
    }

    /// Returns true if every corner of `aabb` lies inside the sphere.
    pub fn contains_aabb(&self, aabb: &Aabb) -> bool {
        let r2 = self.radius * self.radius;
        corners(aabb)
            .iter()
            .all(|c| c.distance_squared(self.center) <= r2)
    }

    /// Sphere/box overlap test via the closest point on the box.
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        let closest = self.center.clamp(aabb.min, aabb.max);
        closest.distance_squared(self.center) <= self.radius * self.radius
    }
}

fn corners(aabb: &Aabb) -> [DVec3; 8] {
    let (lo, hi) = (aabb.min, aabb.max);
    [
        DVec3::new(lo.x, lo.y, lo.z),
        DVec3::new(hi.x, lo.y, lo.z),
        DVec3::new(lo.x, hi.y, lo.z),
        DVec3::new(hi.x, hi.y, lo.z),
        DVec3::new(lo.x, lo.y, hi.z),
        DVec3::new(hi.x, lo.y, hi.z),
        DVec3::new(lo.x, hi.y, hi.z),
        DVec3::new(hi.x, hi.y, hi.z),
    ]
}
