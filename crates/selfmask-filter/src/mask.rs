//! [`SelfMask`] – labels point-cloud points relative to the robot's body.
//!
//! Two classifications are offered:
//!
//! - **containment** – a point is [`MaskLabel::Inside`] when any inflated
//!   body contains it, otherwise [`MaskLabel::Outside`];
//! - **intersection** – additionally, a point whose line of sight to the
//!   sensor passes through a body is [`MaskLabel::Shadow`].  Such a return
//!   is probably an artefact of the robot occluding the scene.
//!
//! Before a cloud is classified the engine resolves every body into the
//! cloud's frame at the cloud's stamp (see [`crate::frame`]).  The resulting
//! [`FrameSnapshot`] is replaced wholesale on each resolution, and the
//! single-point queries read it without resolving anything.
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use selfmask_filter::{SelfMask, SensorOrigin};
//! use selfmask_geometry::tf_buffer::TfBuffer;
//! use selfmask_geometry::transform::{Transform3D, Vec3};
//! use selfmask_types::{LinkInfo, MaskLabel, Point3, PointCloud};
//!
//! let tf = TfBuffer::new();
//! tf.set_static_transform("odom", "base", Transform3D::identity());
//! tf.set_static_transform("odom", "camera", Transform3D::from_translation(Vec3::new(0.0, 0.0, 20.0)));
//!
//! let mut mask = SelfMask::new(tf);
//! mask.configure_from_toml(
//!     &[LinkInfo::new("base", 1.0, 0.0)],
//!     "[[links]]\nname = \"base\"\n[links.collision]\ngeometry = { type = \"box\", size = [1.0, 1.0, 1.0] }\n",
//! )
//! .unwrap();
//!
//! let cloud = PointCloud::new(
//!     "odom",
//!     Utc::now(),
//!     vec![Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 0.0, -10.0)],
//! );
//! let mut shadows = Vec::new();
//! let labels = mask.mask_intersection(&cloud, &SensorOrigin::frame("camera"), 0.05, |hit| shadows.push(hit));
//! assert_eq!(labels, vec![MaskLabel::Inside, MaskLabel::Shadow]);
//! assert_eq!(shadows.len(), 1);
//! ```

use std::time::Duration;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use selfmask_geometry::bounding::{BoundingSphere, merge_bounding_spheres};
use selfmask_geometry::tf_buffer::TransformSource;
use selfmask_geometry::transform::Vec3;
use selfmask_types::{Diagnostic, LinkInfo, MaskError, MaskLabel, Point3, PointCloud};
use tracing::debug;

use crate::description::{GeometrySource, RobotDescription};
use crate::frame::{self, SensorOrigin, SensorState};
use crate::registry::{BodyRegistry, TrackedBody};

/// How long a single transform lookup may wait for data by default.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_millis(100);

/// State produced by the most recent frame resolution.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameSnapshot {
    /// Frame the bodies are currently posed in; empty before the first
    /// resolution.
    pub frame_id: String,
    pub stamp: Option<DateTime<Utc>>,
    pub sensor: SensorState,
    /// Sphere enclosing every inflated body.
    pub bound: BoundingSphere,
}

/// Outcome of a successful [`SelfMask::configure`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigureReport {
    pub body_count: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl ConfigureReport {
    /// True when no body could be built; every point will be
    /// [`MaskLabel::Outside`].
    pub fn is_degraded(&self) -> bool {
        self.body_count == 0
    }
}

/// Robot self filter over a [`TransformSource`].
pub struct SelfMask<T> {
    tf: T,
    registry: BodyRegistry,
    snapshot: FrameSnapshot,
    lookup_timeout: Duration,
    diagnostics: Vec<Diagnostic>,
}

impl<T: TransformSource> SelfMask<T> {
    /// Create an unconfigured mask.  Until [`configure`](Self::configure)
    /// succeeds every point is classified as outside.
    pub fn new(tf: T) -> Self {
        Self {
            tf,
            registry: BodyRegistry::new(),
            snapshot: FrameSnapshot::default(),
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            diagnostics: Vec::new(),
        }
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// (Re)build the body set for `links`.
    ///
    /// Previously configured bodies are always dropped and the sensor state
    /// is reset, even when this call fails.
    ///
    /// # Errors
    ///
    /// Returns [`MaskError::InvalidLink`] for a malformed descriptor.
    pub fn configure(
        &mut self,
        links: &[LinkInfo],
        source: &dyn GeometrySource,
    ) -> Result<ConfigureReport, MaskError> {
        self.reset();
        let (registry, diagnostics) = BodyRegistry::configure(links, source)?;
        self.registry = registry;
        self.diagnostics = diagnostics.clone();
        Ok(ConfigureReport {
            body_count: self.registry.len(),
            diagnostics,
        })
    }

    /// Parse a TOML robot description and [`configure`](Self::configure)
    /// from it.
    ///
    /// # Errors
    ///
    /// Returns [`MaskError::DescriptionParse`] when the text is not a valid
    /// description; the mask is then left unconfigured.
    pub fn configure_from_toml(
        &mut self,
        links: &[LinkInfo],
        description: &str,
    ) -> Result<ConfigureReport, MaskError> {
        self.reset();
        let robot = RobotDescription::from_toml_str(description)?;
        self.configure(links, &robot)
    }

    fn reset(&mut self) {
        self.registry = BodyRegistry::new();
        self.snapshot = FrameSnapshot::default();
        self.diagnostics.clear();
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn link_names(&self) -> Vec<String> {
        self.registry.link_names()
    }

    pub fn bodies(&self) -> &[TrackedBody] {
        self.registry.bodies()
    }

    pub fn snapshot(&self) -> &FrameSnapshot {
        &self.snapshot
    }

    pub fn sensor_state(&self) -> SensorState {
        self.snapshot.sensor
    }

    /// Diagnostics raised by the last configuration or frame resolution.
    pub fn last_diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn transform_source(&self) -> &T {
        &self.tf
    }

    // ── Frame resolution ──────────────────────────────────────────────────

    /// Pose every body in `frame_id` at `stamp`.  The sensor state is kept.
    pub fn assume_frame(&mut self, frame_id: &str, stamp: DateTime<Utc>) -> &[Diagnostic] {
        self.resolve(frame_id, stamp, None);
        &self.diagnostics
    }

    /// Pose every body and the sensor in `frame_id` at `stamp`.
    pub fn assume_frame_with_sensor(
        &mut self,
        frame_id: &str,
        stamp: DateTime<Utc>,
        sensor: &SensorOrigin,
        min_sensor_distance: f64,
    ) -> &[Diagnostic] {
        self.resolve(frame_id, stamp, Some((sensor, min_sensor_distance)));
        &self.diagnostics
    }

    fn resolve(
        &mut self,
        frame_id: &str,
        stamp: DateTime<Utc>,
        sensor: Option<(&SensorOrigin, f64)>,
    ) {
        let mut diagnostics = frame::resolve_frame(
            &mut self.registry,
            &self.tf,
            frame_id,
            stamp,
            self.lookup_timeout,
        );
        let sensor = match sensor {
            Some((origin, min_distance)) => {
                let (state, diagnostic) = frame::resolve_sensor(
                    &self.tf,
                    frame_id,
                    stamp,
                    origin,
                    min_distance,
                    self.lookup_timeout,
                );
                diagnostics.extend(diagnostic);
                state
            }
            None => self.snapshot.sensor,
        };
        self.snapshot = FrameSnapshot {
            frame_id: frame_id.to_string(),
            stamp: Some(stamp),
            sensor,
            bound: merge_bounding_spheres(&self.registry.bounding_spheres()),
        };
        self.diagnostics = diagnostics;
    }

    // ── Bulk classification ───────────────────────────────────────────────

    /// Resolve the cloud's frame and classify each point by containment.
    pub fn mask_containment(&mut self, cloud: &PointCloud) -> Vec<MaskLabel> {
        if self.registry.is_empty() {
            return vec![MaskLabel::Outside; cloud.len()];
        }
        self.assume_frame(&cloud.header.frame_id, cloud.header.stamp);
        let labels = self.classify_containment(&cloud.points);
        log_counts("containment", &labels);
        labels
    }

    /// Resolve the cloud's frame and the sensor, then classify each point
    /// by containment and line of sight.
    ///
    /// `on_shadow` receives the body surface point of every
    /// [`MaskLabel::Shadow`] result, in input order.  A sensor frame with an
    /// empty name falls back to [`mask_containment`](Self::mask_containment)
    /// and leaves the sensor at the origin.
    pub fn mask_intersection(
        &mut self,
        cloud: &PointCloud,
        sensor: &SensorOrigin,
        min_sensor_distance: f64,
        on_shadow: impl FnMut(Vec3),
    ) -> Vec<MaskLabel> {
        if self.registry.is_empty() {
            return vec![MaskLabel::Outside; cloud.len()];
        }
        if matches!(sensor, SensorOrigin::Frame(name) if name.is_empty()) {
            let labels = self.mask_containment(cloud);
            self.snapshot.sensor = SensorState {
                position: Vec3::zero(),
                min_sensor_distance,
            };
            return labels;
        }
        self.assume_frame_with_sensor(
            &cloud.header.frame_id,
            cloud.header.stamp,
            sensor,
            min_sensor_distance,
        );
        let labels = self.classify_intersection(&cloud.points, on_shadow);
        log_counts("intersection", &labels);
        labels
    }

    /// Classify `points` by containment against the current snapshot.
    pub fn classify_containment(&self, points: &[Point3]) -> Vec<MaskLabel> {
        let bodies = self.registry.bodies();
        if bodies.is_empty() {
            return vec![MaskLabel::Outside; points.len()];
        }
        let bound = self.snapshot.bound;
        points
            .par_iter()
            .map(|p| containment_label(bodies, Some(&bound), Vec3::from(*p)))
            .collect()
    }

    /// Classify `points` by line of sight against the current snapshot.
    pub fn classify_intersection(
        &self,
        points: &[Point3],
        mut on_shadow: impl FnMut(Vec3),
    ) -> Vec<MaskLabel> {
        let bodies = self.registry.bodies();
        if bodies.is_empty() {
            return vec![MaskLabel::Outside; points.len()];
        }
        let bound = self.snapshot.bound;
        let sensor = self.snapshot.sensor;
        let results: Vec<(MaskLabel, Option<Vec3>)> = points
            .par_iter()
            .map(|p| intersection_label(bodies, Some(&bound), &sensor, Vec3::from(*p)))
            .collect();

        results
            .into_iter()
            .map(|(label, hit)| {
                if let Some(hit) = hit {
                    on_shadow(hit);
                }
                label
            })
            .collect()
    }

    // ── Single-point queries ──────────────────────────────────────────────

    /// Containment label of `p` in the current frame.  No frame resolution
    /// and no bounding-sphere rejection is performed.
    pub fn get_mask_containment(&self, p: Vec3) -> MaskLabel {
        containment_label(self.registry.bodies(), None, p)
    }

    /// Line-of-sight label of `p` for the given sensor state.
    pub fn get_mask_intersection(
        &self,
        p: Vec3,
        sensor: &SensorState,
        mut on_shadow: impl FnMut(Vec3),
    ) -> MaskLabel {
        let (label, hit) = intersection_label(self.registry.bodies(), None, sensor, p);
        if let Some(hit) = hit {
            on_shadow(hit);
        }
        label
    }
}

impl<T: TransformSource + Default> Default for SelfMask<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Per-point classification
// ────────────────────────────────────────────────────────────────────────────

fn within(bound: Option<&BoundingSphere>, p: Vec3) -> bool {
    bound.is_none_or(|b| b.may_contain(p))
}

fn containment_label(bodies: &[TrackedBody], bound: Option<&BoundingSphere>, p: Vec3) -> MaskLabel {
    if within(bound, p) && bodies.iter().any(|b| b.body().contains_point(p)) {
        MaskLabel::Inside
    } else {
        MaskLabel::Outside
    }
}

/// Label plus, for shadows, the surface point where the line of sight
/// enters the occluding body.
fn intersection_label(
    bodies: &[TrackedBody],
    bound: Option<&BoundingSphere>,
    sensor: &SensorState,
    p: Vec3,
) -> (MaskLabel, Option<Vec3>) {
    let inside_bound = within(bound, p);
    if inside_bound && bodies.iter().any(|b| b.unscaled_body().contains_point(p)) {
        return (MaskLabel::Inside, None);
    }

    let to_sensor = sensor.position - p;
    if to_sensor.norm() < sensor.min_sensor_distance {
        return (MaskLabel::Inside, None);
    }

    // First body in check order whose surface lies between p and the sensor.
    if let Some(dir) = to_sensor.try_normalize() {
        let hit = bodies.iter().find_map(|b| {
            b.body()
                .intersects_ray(p, dir, 1)
                .first()
                .copied()
                .filter(|hit| dir.dot(sensor.position - *hit) >= 0.0)
        });
        if let Some(hit) = hit {
            return (MaskLabel::Shadow, Some(hit));
        }
    }

    if inside_bound && bodies.iter().any(|b| b.body().contains_point(p)) {
        (MaskLabel::Inside, None)
    } else {
        (MaskLabel::Outside, None)
    }
}

fn log_counts(mode: &str, labels: &[MaskLabel]) {
    let count = |l: MaskLabel| labels.iter().filter(|x| **x == l).count();
    debug!(
        mode,
        points = labels.len(),
        inside = count(MaskLabel::Inside),
        outside = count(MaskLabel::Outside),
        shadow = count(MaskLabel::Shadow),
        "cloud masked"
    );
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
