//! [`BodyRegistry`] – the ordered set of robot bodies checked by the mask.
//!
//! Each requested link becomes a [`TrackedBody`] holding two independent
//! copies of the link's collision solid: one inflated by the link's scale
//! and padding, one at its nominal size.  Both copies always share the same
//! pose.
//!
//! # Ordering
//!
//! Bodies are sorted by decreasing inflated volume (ties by name) once per
//! configuration.  Large bodies are the likeliest to contain a point, so
//! the first-hit scans of the mask engine terminate early more often.  The
//! order never affects which label a point receives.

use std::cmp::Ordering;

use selfmask_geometry::bodies::Body;
use selfmask_geometry::bounding::BoundingSphere;
use selfmask_geometry::transform::Transform3D;
use selfmask_types::{Diagnostic, LinkInfo, MaskError};
use tracing::{debug, info, warn};

use crate::description::{GeometrySource, LinkGeometry};

/// One robot link as seen by the self filter.
#[derive(Debug, Clone)]
pub struct TrackedBody {
    name: String,
    body: Body,
    unscaled_body: Body,
    static_offset: Transform3D,
    solid_volume: f64,
    bounding_sphere: BoundingSphere,
}

impl TrackedBody {
    /// Link (and transform frame) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The solid with scale and padding applied.
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// The solid at its nominal size.
    pub fn unscaled_body(&self) -> &Body {
        &self.unscaled_body
    }

    /// Offset of the collision geometry from the link frame.
    pub fn static_offset(&self) -> Transform3D {
        self.static_offset
    }

    /// Volume of the inflated solid, computed at configuration time.
    pub fn solid_volume(&self) -> f64 {
        self.solid_volume
    }

    /// Sphere enclosing the inflated solid in its current pose.
    pub fn bounding_sphere(&self) -> BoundingSphere {
        self.bounding_sphere
    }

    /// Place the link frame at `link_pose`; the static offset is applied on
    /// top and both solids move together.
    pub(crate) fn set_link_pose(&mut self, link_pose: Transform3D) {
        let pose = link_pose.compose(self.static_offset);
        self.body.set_pose(pose);
        self.unscaled_body.set_pose(pose);
        self.bounding_sphere = self.body.bounding_sphere();
    }
}

fn by_volume_then_name(a: &TrackedBody, b: &TrackedBody) -> Ordering {
    b.solid_volume
        .total_cmp(&a.solid_volume)
        .then_with(|| a.name.cmp(&b.name))
}

fn validate(link: &LinkInfo) -> Result<(), MaskError> {
    let invalid = |details: String| MaskError::InvalidLink {
        name: link.name.clone(),
        details,
    };
    if link.name.is_empty() {
        return Err(invalid("link name is empty".to_string()));
    }
    if !(link.scale.is_finite() && link.scale >= 0.0) {
        return Err(invalid(format!("scale must be >= 0, got {}", link.scale)));
    }
    if !(link.padding.is_finite() && link.padding >= 0.0) {
        return Err(invalid(format!("padding must be >= 0, got {}", link.padding)));
    }
    Ok(())
}

/// Ordered collection of [`TrackedBody`] values.
#[derive(Debug, Clone, Default)]
pub struct BodyRegistry {
    bodies: Vec<TrackedBody>,
}

impl BodyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry for `links` using collision geometry from `source`.
    ///
    /// Links that are unknown to `source`, have no collision geometry, or
    /// whose shape cannot be built are skipped and reported as
    /// [`Diagnostic`]s.  An empty result is valid and reported as
    /// [`Diagnostic::NoBodies`].
    ///
    /// # Errors
    ///
    /// Returns [`MaskError::InvalidLink`] when a descriptor has an empty name
    /// or a negative/non-finite scale or padding.
    pub fn configure(
        links: &[LinkInfo],
        source: &dyn GeometrySource,
    ) -> Result<(Self, Vec<Diagnostic>), MaskError> {
        for link in links {
            validate(link)?;
        }

        let mut diagnostics = Vec::new();
        let mut missing = Vec::new();
        let mut bodies = Vec::with_capacity(links.len());

        for link in links {
            let (shape, origin) = match source.link_geometry(&link.name) {
                LinkGeometry::Missing => {
                    missing.push(link.name.clone());
                    continue;
                }
                LinkGeometry::NoCollision => {
                    diagnostics.push(Diagnostic::MissingCollisionGeometry {
                        link: link.name.clone(),
                    });
                    continue;
                }
                LinkGeometry::Found { shape, origin } => (shape, origin),
            };

            let built = Body::from_shape(shape).and_then(|scaled| {
                Body::from_shape(shape).map(|unscaled| (scaled, unscaled))
            });
            let (mut body, unscaled_body) = match built {
                Ok(pair) => pair,
                Err(e) => {
                    diagnostics.push(Diagnostic::UnconstructibleShape {
                        link: link.name.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            body.set_scale(link.scale);
            body.set_padding(link.padding);
            let solid_volume = body.volume();
            debug!(
                link = %link.name,
                shape = shape.kind(),
                scale = link.scale,
                padding = link.padding,
                volume = solid_volume,
                "self mask body created"
            );

            let mut tracked = TrackedBody {
                name: link.name.clone(),
                bounding_sphere: body.bounding_sphere(),
                body,
                unscaled_body,
                static_offset: origin,
                solid_volume,
            };
            tracked.set_link_pose(Transform3D::identity());
            bodies.push(tracked);
        }

        if !missing.is_empty() {
            diagnostics.push(Diagnostic::MissingLinks(missing));
        }
        if bodies.is_empty() {
            diagnostics.push(Diagnostic::NoBodies);
        }
        for d in &diagnostics {
            warn!(diagnostic = %d, "self mask configuration");
        }

        bodies.sort_by(by_volume_then_name);
        info!(bodies = bodies.len(), requested = links.len(), "self mask configured");
        Ok((Self { bodies }, diagnostics))
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Bodies in check order.
    pub fn bodies(&self) -> &[TrackedBody] {
        &self.bodies
    }

    pub(crate) fn bodies_mut(&mut self) -> &mut [TrackedBody] {
        &mut self.bodies
    }

    /// Link names in check order.
    pub fn link_names(&self) -> Vec<String> {
        self.bodies.iter().map(|b| b.name.clone()).collect()
    }

    /// Current bounding sphere of every body, in check order.
    pub fn bounding_spheres(&self) -> Vec<BoundingSphere> {
        self.bodies.iter().map(|b| b.bounding_sphere).collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::RobotDescription;
    use selfmask_geometry::transform::Vec3;

    const ROBOT: &str = r#"
[[links]]
name = "torso"
[links.collision]
geometry = { type = "box", size = [0.6, 0.6, 1.0] }

[[links]]
name = "head"
[links.collision]
origin = { xyz = [0.0, 0.0, 0.1] }
geometry = { type = "sphere", radius = 0.15 }

[[links]]
name = "forearm"
[links.collision]
geometry = { type = "cylinder", radius = 0.05, length = 0.3 }

[[links]]
name = "left_finger"
[links.collision]
geometry = { type = "sphere", radius = 0.02 }

[[links]]
name = "right_finger"
[links.collision]
geometry = { type = "sphere", radius = 0.02 }

[[links]]
name = "tool_frame"

[[links]]
name = "broken"
[links.collision]
geometry = { type = "sphere", radius = -1.0 }
"#;

    fn robot() -> RobotDescription {
        RobotDescription::from_toml_str(ROBOT).unwrap()
    }

    fn links(names: &[&str]) -> Vec<LinkInfo> {
        names.iter().map(|n| LinkInfo::new(*n, 1.0, 0.0)).collect()
    }

    #[test]
    fn bodies_sorted_by_decreasing_volume() {
        let (reg, _) =
            BodyRegistry::configure(&links(&["forearm", "head", "torso"]), &robot()).unwrap();
        assert_eq!(reg.link_names(), vec!["torso", "head", "forearm"]);
        let volumes: Vec<f64> = reg.bodies().iter().map(|b| b.solid_volume()).collect();
        assert!(volumes.windows(2).all(|w| w[0] >= w[1]), "{volumes:?}");
    }

    #[test]
    fn order_is_independent_of_descriptor_order() {
        let names = ["right_finger", "forearm", "left_finger", "torso", "head"];
        let (a, _) = BodyRegistry::configure(&links(&names), &robot()).unwrap();
        let mut reversed = names;
        reversed.reverse();
        let (b, _) = BodyRegistry::configure(&links(&reversed), &robot()).unwrap();
        assert_eq!(a.link_names(), b.link_names());
        // Equal-volume fingers fall back to name order.
        assert_eq!(&a.link_names()[3..], &["left_finger", "right_finger"]);
    }

    #[test]
    fn missing_links_are_reported_not_fatal() {
        let (reg, diags) =
            BodyRegistry::configure(&links(&["torso", "ghost", "phantom"]), &robot()).unwrap();
        assert_eq!(reg.len(), 1);
        assert!(diags.contains(&Diagnostic::MissingLinks(vec![
            "ghost".to_string(),
            "phantom".to_string()
        ])));
    }

    #[test]
    fn collision_free_and_broken_links_are_skipped() {
        let (reg, diags) =
            BodyRegistry::configure(&links(&["tool_frame", "broken", "head"]), &robot()).unwrap();
        assert_eq!(reg.link_names(), vec!["head"]);
        assert!(diags.contains(&Diagnostic::MissingCollisionGeometry {
            link: "tool_frame".to_string()
        }));
        assert!(diags
            .iter()
            .any(|d| matches!(d, Diagnostic::UnconstructibleShape { link, .. } if link == "broken")));
    }

    #[test]
    fn empty_result_is_degraded_but_ok() {
        let (reg, diags) = BodyRegistry::configure(&links(&["ghost"]), &robot()).unwrap();
        assert!(reg.is_empty());
        assert!(diags.contains(&Diagnostic::NoBodies));

        let (reg, diags) = BodyRegistry::configure(&[], &robot()).unwrap();
        assert!(reg.is_empty());
        assert_eq!(diags, vec![Diagnostic::NoBodies]);
    }

    #[test]
    fn negative_padding_is_rejected() {
        let err = BodyRegistry::configure(&[LinkInfo::new("torso", 1.0, -0.1)], &robot())
            .unwrap_err();
        assert!(matches!(err, MaskError::InvalidLink { ref name, .. } if name == "torso"));
    }

    #[test]
    fn scale_and_padding_apply_to_scaled_body_only() {
        let (reg, _) =
            BodyRegistry::configure(&[LinkInfo::new("head", 2.0, 0.05)], &robot()).unwrap();
        let head = &reg.bodies()[0];
        // Static offset puts the sphere center at z = 0.1.
        let p = Vec3::new(0.0, 0.0, 0.1 + 0.3);
        assert!(head.body().contains_point(p));
        assert!(!head.unscaled_body().contains_point(p));
        assert!((head.bounding_sphere().radius - 0.35).abs() < 1e-12);
    }

    #[test]
    fn link_pose_composes_with_static_offset() {
        let (mut reg, _) = BodyRegistry::configure(&links(&["head"]), &robot()).unwrap();
        reg.bodies_mut()[0].set_link_pose(Transform3D::from_translation(Vec3::new(1.0, 0.0, 0.0)));
        let head = &reg.bodies()[0];
        assert_eq!(head.body().pose(), head.unscaled_body().pose());
        let c = head.bounding_sphere().center;
        assert!((c - Vec3::new(1.0, 0.0, 0.1)).norm() < 1e-12);
    }
}
