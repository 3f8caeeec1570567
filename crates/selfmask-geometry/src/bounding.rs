//! Bounding spheres and their aggregation.
//!
//! Every body reports a sphere enclosing it in its current pose.  Merging
//! those spheres gives one sphere around the whole robot, which the self
//! filter uses to reject far-away points before any per-body test.

use crate::transform::Vec3;

/// A sphere guaranteed to enclose one or more bodies.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f64,
}

impl BoundingSphere {
    pub fn new(center: Vec3, radius: f64) -> Self {
        Self { center, radius }
    }

    pub fn radius_squared(&self) -> f64 {
        self.radius * self.radius
    }

    /// True unless `p` lies strictly farther from the center than the radius.
    pub fn may_contain(&self, p: Vec3) -> bool {
        p.distance_squared(self.center) <= self.radius_squared()
    }

    /// True when `other` lies entirely within this sphere.
    pub fn encloses(&self, other: &BoundingSphere) -> bool {
        self.center.distance_squared(other.center).sqrt() + other.radius <= self.radius
    }
}

/// Compute a sphere enclosing every sphere in `spheres`.
///
/// The result is not minimal.  Starting from the first sphere, each further
/// sphere is either already enclosed, encloses the running sphere, or the
/// running sphere is grown just enough along the line joining both centers.
/// An empty slice yields a zero-radius sphere at the origin.
pub fn merge_bounding_spheres(spheres: &[BoundingSphere]) -> BoundingSphere {
    let Some((&first, rest)) = spheres.split_first() else {
        return BoundingSphere::default();
    };

    rest.iter().fold(first, |merged, next| {
        if merged.encloses(next) {
            merged
        } else if next.encloses(&merged) {
            *next
        } else {
            let offset = next.center - merged.center;
            // distance > |R - r| >= 0 here, so the division is safe.
            let distance = offset.norm();
            let radius = (distance + merged.radius + next.radius) * 0.5;
            let center = merged.center + offset * ((radius - merged.radius) / distance);
            BoundingSphere::new(center, radius)
        }
    })
}
