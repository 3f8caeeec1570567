//! Robot description: the collision geometry of every link.
//!
//! The self filter only needs, per link, a collision [`Shape`] and the
//! offset of that shape from the link frame.  [`GeometrySource`] is the
//! lookup interface; [`RobotDescription`] is a TOML-backed implementation.
//!
//! ```toml
//! name = "pr2_arm"
//!
//! [[links]]
//! name = "r_forearm_link"
//! [links.collision]
//! origin = { xyz = [0.2, 0.0, 0.0], rpy = [0.0, 1.5708, 0.0] }
//! geometry = { type = "cylinder", radius = 0.05, length = 0.3 }
//!
//! [[links]]
//! name = "base_footprint"   # no collision block: skipped by the mask
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use selfmask_geometry::bodies::Shape;
use selfmask_geometry::transform::Transform3D;
use selfmask_types::MaskError;
use serde::{Deserialize, Serialize};

/// Result of asking a [`GeometrySource`] about one link.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkGeometry<'a> {
    /// The link does not exist in the description.
    Missing,
    /// The link exists but has no collision geometry.
    NoCollision,
    /// Collision shape and its fixed offset from the link frame.
    Found {
        shape: &'a Shape,
        origin: Transform3D,
    },
}

/// Provides collision geometry by link name.
pub trait GeometrySource {
    fn link_geometry(&self, link: &str) -> LinkGeometry<'_>;
}

/// Offset of a collision shape from its link frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Origin {
    #[serde(default)]
    pub xyz: [f64; 3],
    #[serde(default)]
    pub rpy: [f64; 3],
}

impl Origin {
    pub fn to_transform(self) -> Transform3D {
        Transform3D::from_xyz_rpy(self.xyz, self.rpy)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collision {
    #[serde(default)]
    pub origin: Origin,
    pub geometry: Shape,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkDescription {
    pub name: String,
    #[serde(default)]
    pub collision: Option<Collision>,
}

/// Parsed robot description.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RobotDescription {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub links: Vec<LinkDescription>,
}

impl RobotDescription {
    /// Parse a TOML description.
    ///
    /// # Errors
    ///
    /// Returns [`MaskError::DescriptionParse`] for malformed TOML, unknown
    /// geometry types, or duplicate link names.
    pub fn from_toml_str(text: &str) -> Result<Self, MaskError> {
        let description: RobotDescription =
            toml::from_str(text).map_err(|e| MaskError::DescriptionParse(e.to_string()))?;
        let mut seen = HashSet::new();
        for link in &description.links {
            if !seen.insert(link.name.as_str()) {
                return Err(MaskError::DescriptionParse(format!(
                    "link '{}' is defined more than once",
                    link.name
                )));
            }
        }
        Ok(description)
    }

    /// Read and parse a description file.
    ///
    /// # Errors
    ///
    /// Returns [`MaskError::DescriptionUnavailable`] when the file cannot be
    /// read, otherwise the errors of [`RobotDescription::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self, MaskError> {
        let text = fs::read_to_string(path).map_err(|e| {
            MaskError::DescriptionUnavailable(format!("{}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn link(&self, name: &str) -> Option<&LinkDescription> {
        self.links.iter().find(|l| l.name == name)
    }
}

impl GeometrySource for RobotDescription {
    fn link_geometry(&self, link: &str) -> LinkGeometry<'_> {
        match self.link(link) {
            None => LinkGeometry::Missing,
            Some(LinkDescription {
                collision: None, ..
            }) => LinkGeometry::NoCollision,
            Some(LinkDescription {
                collision: Some(c), ..
            }) => LinkGeometry::Found {
                shape: &c.geometry,
                origin: c.origin.to_transform(),
            },
        }
    }
}
