//! Frame resolution: placing bodies and the sensor in a target frame.
//!
//! Before a cloud is classified, every body is moved to its pose in the
//! cloud's frame at the cloud's stamp, and the sensor origin is expressed in
//! that same frame.  Lookups that fail are not fatal; the affected body (or
//! the sensor) falls back to the identity placement and a [`Diagnostic`] is
//! returned so the caller can decide how much to trust the result.

use std::time::Duration;

use chrono::{DateTime, Utc};
use selfmask_geometry::tf_buffer::TransformSource;
use selfmask_geometry::transform::{Transform3D, Vec3};
use selfmask_types::Diagnostic;
use tracing::warn;

use crate::registry::BodyRegistry;

/// Where the sensor that produced a cloud is located.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorOrigin {
    /// Origin of a named frame, resolved through the transform source.
    Frame(String),
    /// A position already expressed in the cloud's frame.
    Position(Vec3),
}

impl SensorOrigin {
    pub fn frame(name: impl Into<String>) -> Self {
        Self::Frame(name.into())
    }
}

/// Sensor position in the current target frame plus the distance below
/// which points are treated as belonging to the robot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorState {
    pub position: Vec3,
    pub min_sensor_distance: f64,
}

/// Pose every body of `registry` in `target_frame` at `stamp`.
///
/// All lookups complete before any pose is written.  A failed lookup leaves
/// the link frame at the identity transform and yields a
/// [`Diagnostic::TransformUnavailable`].
pub fn resolve_frame<T: TransformSource + ?Sized>(
    registry: &mut BodyRegistry,
    tf: &T,
    target_frame: &str,
    stamp: DateTime<Utc>,
    timeout: Duration,
) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let poses: Vec<Transform3D> = registry
        .bodies()
        .iter()
        .map(|b| {
            tf.lookup_transform(target_frame, b.name(), stamp, timeout)
                .unwrap_or_else(|e| {
                    warn!(
                        link = %b.name(),
                        target = %target_frame,
                        error = %e,
                        "link transform unavailable, using identity"
                    );
                    diagnostics.push(Diagnostic::TransformUnavailable {
                        source_frame: b.name().to_string(),
                        target_frame: target_frame.to_string(),
                        reason: e.to_string(),
                    });
                    Transform3D::identity()
                })
        })
        .collect();

    for (body, pose) in registry.bodies_mut().iter_mut().zip(poses) {
        body.set_link_pose(pose);
    }
    diagnostics
}

/// Express `origin` in `target_frame` at `stamp`.
///
/// A frame origin whose lookup fails resolves to the zero vector together
/// with a [`Diagnostic::SensorUnavailable`].
pub fn resolve_sensor<T: TransformSource + ?Sized>(
    tf: &T,
    target_frame: &str,
    stamp: DateTime<Utc>,
    origin: &SensorOrigin,
    min_sensor_distance: f64,
    timeout: Duration,
) -> (SensorState, Option<Diagnostic>) {
    let (position, diagnostic) = match origin {
        SensorOrigin::Position(p) => (*p, None),
        SensorOrigin::Frame(sensor_frame) => {
            match tf.lookup_transform(target_frame, sensor_frame, stamp, timeout) {
                Ok(t) => (t.translation, None),
                Err(e) => {
                    warn!(
                        sensor = %sensor_frame,
                        target = %target_frame,
                        error = %e,
                        "sensor transform unavailable, using origin"
                    );
                    (
                        Vec3::zero(),
                        Some(Diagnostic::SensorUnavailable {
                            sensor_frame: sensor_frame.clone(),
                            target_frame: target_frame.to_string(),
                            reason: e.to_string(),
                        }),
                    )
                }
            }
        }
    };
    (
        SensorState {
            position,
            min_sensor_distance,
        },
        diagnostic,
    )
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
