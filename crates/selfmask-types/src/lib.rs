use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification assigned to every point of a masked cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskLabel {
    /// The point lies on or inside one of the robot's bodies.
    Inside,
    /// The point belongs to free or external space.
    Outside,
    /// The point lies behind a robot body as seen from the sensor.
    Shadow,
}

impl MaskLabel {
    /// Numeric code used on the wire (`Inside = 0`, `Outside = 1`, `Shadow = 2`).
    pub fn code(self) -> u8 {
        match self {
            MaskLabel::Inside => 0,
            MaskLabel::Outside => 1,
            MaskLabel::Shadow => 2,
        }
    }

    /// Inverse of [`MaskLabel::code`].
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(MaskLabel::Inside),
            1 => Some(MaskLabel::Outside),
            2 => Some(MaskLabel::Shadow),
            _ => None,
        }
    }
}

impl std::fmt::Display for MaskLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaskLabel::Inside => write!(f, "inside"),
            MaskLabel::Outside => write!(f, "outside"),
            MaskLabel::Shadow => write!(f, "shadow"),
        }
    }
}

/// A robot link to include in the self mask, with its inflation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkInfo {
    /// Link name; also the name of the link's transform frame.
    pub name: String,
    /// Multiplicative scale applied to the link's collision geometry.
    #[serde(default = "default_scale")]
    pub scale: f64,
    /// Padding (metres) added on top of the scaled geometry.
    #[serde(default)]
    pub padding: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl LinkInfo {
    pub fn new(name: impl Into<String>, scale: f64, padding: f64) -> Self {
        Self {
            name: name.into(),
            scale,
            padding,
        }
    }
}

/// A single range measurement, as delivered by the sensor driver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Frame and acquisition time shared by every point of a cloud.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// e.g. "base_link", "head_mount_kinect"
    pub frame_id: String,
    pub stamp: DateTime<Utc>,
}

/// An unordered set of points expressed in `header.frame_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloud {
    pub header: Header,
    pub points: Vec<Point3>,
}

impl PointCloud {
    pub fn new(frame_id: impl Into<String>, stamp: DateTime<Utc>, points: Vec<Point3>) -> Self {
        Self {
            header: Header {
                frame_id: frame_id.into(),
                stamp,
            },
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Non-fatal condition recorded while configuring or resolving frames.
///
/// Diagnostics degrade the quality of a mask but never abort a call.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Diagnostic {
    #[error("links requested for the self mask do not exist in the robot description: {}", .0.join(", "))]
    MissingLinks(Vec<String>),

    #[error("no collision geometry specified for link '{link}'")]
    MissingCollisionGeometry { link: String },

    #[error("unable to construct collision body for link '{link}': {reason}")]
    UnconstructibleShape { link: String, reason: String },

    #[error("no robot links will be checked for self mask")]
    NoBodies,

    #[error("unable to look up transform from '{source_frame}' to '{target_frame}': {reason}")]
    TransformUnavailable {
        source_frame: String,
        target_frame: String,
        reason: String,
    },

    #[error("unable to locate sensor frame '{sensor_frame}' in '{target_frame}': {reason}")]
    SensorUnavailable {
        sensor_frame: String,
        target_frame: String,
        reason: String,
    },
}

/// Failure of a transform lookup against a [`TransformSource`]-style collaborator.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LookupError {
    #[error("frame '{0}' does not exist")]
    UnknownFrame(String),

    #[error("frames '{source_frame}' and '{target_frame}' are not connected")]
    NoPath {
        source_frame: String,
        target_frame: String,
    },

    #[error("transform {parent} -> {child} not yet available at {requested} (latest {latest})")]
    NotYetAvailable {
        parent: String,
        child: String,
        requested: DateTime<Utc>,
        latest: DateTime<Utc>,
    },

    #[error("transform {parent} -> {child} requested at {requested}, before oldest data {oldest}")]
    ExtrapolationPast {
        parent: String,
        child: String,
        requested: DateTime<Utc>,
        oldest: DateTime<Utc>,
    },

    #[error("timed out after {waited_ms} ms waiting for {source_frame} -> {target_frame}: {reason}")]
    Timeout {
        source_frame: String,
        target_frame: String,
        waited_ms: u64,
        reason: String,
    },
}

impl LookupError {
    /// Whether waiting for more data could turn this failure into a success.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LookupError::UnknownFrame(_)
                | LookupError::NoPath { .. }
                | LookupError::NotYetAvailable { .. }
        )
    }
}

/// Errors that abort a self-mask configuration.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MaskError {
    #[error("Robot description unavailable: {0}")]
    DescriptionUnavailable(String),

    #[error("Unable to parse robot description: {0}")]
    DescriptionParse(String),

    #[error("Invalid link '{name}': {details}")]
    InvalidLink { name: String, details: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_label_codes_roundtrip() {
        for label in [MaskLabel::Inside, MaskLabel::Outside, MaskLabel::Shadow] {
            assert_eq!(MaskLabel::from_code(label.code()), Some(label));
        }
        assert_eq!(MaskLabel::Inside.code(), 0);
        assert_eq!(MaskLabel::Outside.code(), 1);
        assert_eq!(MaskLabel::Shadow.code(), 2);
        assert_eq!(MaskLabel::from_code(7), None);
    }

    #[test]
    fn mask_label_serializes_lowercase() {
        let json = serde_json::to_string(&MaskLabel::Shadow).unwrap();
        assert_eq!(json, "\"shadow\"");
    }

    #[test]
    fn link_info_defaults_scale_and_padding() {
        let link: LinkInfo = serde_json::from_str(r#"{"name":"r_gripper"}"#).unwrap();
        assert_eq!(link.name, "r_gripper");
        assert!((link.scale - 1.0).abs() < f64::EPSILON);
        assert!(link.padding.abs() < f64::EPSILON);
    }

    #[test]
    fn point_cloud_roundtrip() {
        let cloud = PointCloud::new(
            "base_link",
            Utc::now(),
            vec![Point3::new(1.0, 2.0, 3.0), Point3::new(0.0, 0.0, 0.0)],
        );
        let json = serde_json::to_string(&cloud).unwrap();
        let back: PointCloud = serde_json::from_str(&json).unwrap();
        assert_eq!(cloud, back);
        assert_eq!(back.len(), 2);
    }

    #[test]
    fn diagnostic_display_lists_missing_links() {
        let d = Diagnostic::MissingLinks(vec!["a".to_string(), "b".to_string()]);
        assert!(d.to_string().contains("a, b"));
    }

    #[test]
    fn lookup_error_retryability() {
        assert!(LookupError::UnknownFrame("x".into()).is_retryable());
        let past = LookupError::ExtrapolationPast {
            parent: "a".into(),
            child: "b".into(),
            requested: Utc::now(),
            oldest: Utc::now(),
        };
        assert!(!past.is_retryable());
    }

    #[test]
    fn mask_error_display() {
        let err = MaskError::InvalidLink {
            name: "torso".to_string(),
            details: "negative padding".to_string(),
        };
        assert!(err.to_string().contains("torso"));
        assert!(err.to_string().contains("negative padding"));
    }
}
