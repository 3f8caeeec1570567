//! `selfmask-geometry` – geometric primitives for robot self filtering.
//!
//! # Modules
//!
//! - [`transform`] – [`Vec3`][transform::Vec3], [`Quaternion`][transform::Quaternion]
//!   and [`Transform3D`][transform::Transform3D]: rigid-body math.
//! - [`tf_buffer`] – [`TfBuffer`][tf_buffer::TfBuffer]: a time-stamped graph
//!   of named frames behind the [`TransformSource`][tf_buffer::TransformSource]
//!   lookup interface.
//! - [`bodies`] – [`Body`][bodies::Body]: posed sphere, box, cylinder and
//!   convex-mesh solids with scale/padding, point inclusion and ray casting.
//! - [`bounding`] – [`BoundingSphere`][bounding::BoundingSphere] and
//!   [`merge_bounding_spheres`][bounding::merge_bounding_spheres].

pub mod bodies;
pub mod bounding;
pub mod tf_buffer;
pub mod transform;

pub use bodies::{Body, Shape, ShapeError};
pub use bounding::{BoundingSphere, merge_bounding_spheres};
pub use tf_buffer::{TfBuffer, TransformSource};
pub use transform::{Quaternion, Transform3D, Vec3};
