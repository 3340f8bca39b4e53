//! f64 world-space bounding volumes used by the HLOD builder.

mod aabb;
mod sphere;

pub use aabb::Aabb;
pub use sphere::BoundingSphere;
