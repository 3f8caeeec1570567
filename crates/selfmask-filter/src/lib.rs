//! `selfmask-filter` – classifies point-cloud points against the robot body.
//!
//! # Modules
//!
//! - [`description`] – [`RobotDescription`][description::RobotDescription]:
//!   per-link collision geometry behind the
//!   [`GeometrySource`][description::GeometrySource] interface.
//! - [`registry`] – [`BodyRegistry`][registry::BodyRegistry]: the ordered
//!   set of scaled/unscaled body pairs built for the requested links.
//! - [`frame`] – poses bodies and the sensor in a cloud's frame through a
//!   [`TransformSource`][selfmask_geometry::TransformSource].
//! - [`mask`] – [`SelfMask`][mask::SelfMask]: containment and
//!   line-of-sight classification of whole clouds or single points.

pub mod description;
pub mod frame;
pub mod mask;
pub mod registry;

pub use description::{GeometrySource, LinkGeometry, RobotDescription};
pub use frame::{SensorOrigin, SensorState, resolve_frame, resolve_sensor};
pub use mask::{ConfigureReport, DEFAULT_LOOKUP_TIMEOUT, FrameSnapshot, SelfMask};
pub use registry::{BodyRegistry, TrackedBody};
