use glam::DVec3;

/// Axis-Aligned Bounding Box in f64 world space (meters).
///
/// Invariant: min.x <= max.x, min.y <= max.y, min.z <= max.z.
/// The constructor enforces this by swapping components if needed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    /// Create an AABB from two corners. Automatically sorts
    /// components so that min <= max on every axis.
    pub fn new(a: DVec3, b: DVec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Returns true if the point lies inside or on the boundary.
    pub fn contains_point(&self, p: DVec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// Returns true if `other` lies entirely inside this box
    /// (touching faces count as inside).
    pub fn contains(&self, other: &Aabb) -> bool {
        self.contains_point(other.min) && self.contains_point(other.max)
    }

    /// Returns true if this AABB overlaps with other
    /// (including touching edges/faces).
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    /// Overlapping region of the two boxes, or `None` if they are disjoint.
    pub fn intersection(&self, other: &Aabb) -> Option<Aabb> {
        if !self.intersects(other) {
            return None;
        }
        Some(Aabb {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        })
    }

    /// Returns the smallest AABB enclosing both self and other.
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Volume in cubic meters. Degenerate boxes have zero volume.
    pub fn volume(&self) -> f64 {
        let size = self.size();
        size.x * size.y * size.z
    }

    /// Returns the center point of the AABB.
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Half the diagonal length: radius of the sphere circumscribing the box.
    pub fn radius(&self) -> f64 {
        self.size().length() * 0.5
    }

    /// Returns the size along each axis.
    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube(min: f64, max: f64) -> Aabb {
        Aabb::new(DVec3::splat(min), DVec3::splat(max))
    }

    #[test]
    fn test_contains_point_on_edge() {
        let aabb = cube(0.0, 10.0);
        assert!(aabb.contains_point(DVec3::ZERO));
        assert!(aabb.contains_point(DVec3::splat(10.0)));
        assert!(aabb.contains_point(DVec3::new(10.0, 5.0, 5.0)));
        assert!(!aabb.contains_point(DVec3::new(10.5, 5.0, 5.0)));
    }

    #[test]
    fn test_contains_box() {
        let outer = cube(0.0, 10.0);
        assert!(outer.contains(&cube(2.0, 8.0)));
        assert!(outer.contains(&outer));
        assert!(!outer.contains(&cube(5.0, 15.0)));
    }

    #[test]
    fn test_intersects_touching() {
        let a = cube(0.0, 10.0);
        let b = Aabb::new(DVec3::new(10.0, 0.0, 0.0), DVec3::new(20.0, 10.0, 10.0));
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
    }

    #[test]
    fn test_intersects_disjoint() {
        let a = cube(0.0, 10.0);
        let b = cube(20.0, 30.0);
        assert!(!a.intersects(&b));
        assert!(a.intersection(&b).is_none());
    }

    #[test]
    fn test_intersection_volume() {
        let a = cube(0.0, 10.0);
        let b = cube(5.0, 15.0);
        let overlap = a.intersection(&b).unwrap();
        assert_eq!(overlap, cube(5.0, 10.0));
        assert_eq!(overlap.volume(), 125.0);
    }

    #[test]
    fn test_union_encloses_both() {
        let a = cube(0.0, 5.0);
        let b = cube(3.0, 10.0);
        let u = a.union(&b);
        assert!(u.contains(&a));
        assert!(u.contains(&b));
        assert_eq!(u, cube(0.0, 10.0));
    }

    #[test]
    fn test_volume_and_radius() {
        let aabb = Aabb::new(DVec3::ZERO, DVec3::new(10.0, 20.0, 30.0));
        assert_eq!(aabb.volume(), 6000.0);
        let unit = cube(0.0, 2.0);
        assert!((unit.radius() - 3f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_constructor_auto_sorts() {
        let aabb = Aabb::new(DVec3::splat(10.0), DVec3::ZERO);
        assert_eq!(aabb.min, DVec3::ZERO);
        assert_eq!(aabb.max, DVec3::splat(10.0));
    }

    #[test]
    fn test_flat_box_has_no_volume() {
        let flat = Aabb::new(DVec3::new(0.0, 5.0, 0.0), DVec3::new(10.0, 5.0, 10.0));
        assert_eq!(flat.volume(), 0.0);
    }
}
