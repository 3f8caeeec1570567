//! Cloud files in, mask results out (JSON).

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use selfmask_geometry::transform::Vec3;
use selfmask_types::{MaskLabel, Point3, PointCloud};
use serde::{Deserialize, Serialize};

/// On-disk cloud: `{"frame_id": …, "stamp": "<RFC 3339>", "points": [[x, y, z], …]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudFile {
    pub frame_id: String,
    pub stamp: DateTime<Utc>,
    #[serde(default)]
    pub points: Vec<[f32; 3]>,
}

impl From<CloudFile> for PointCloud {
    fn from(file: CloudFile) -> Self {
        let points = file
            .points
            .into_iter()
            .map(|[x, y, z]| Point3::new(x, y, z))
            .collect();
        PointCloud::new(file.frame_id, file.stamp, points)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LabelCounts {
    pub inside: usize,
    pub outside: usize,
    pub shadow: usize,
}

impl LabelCounts {
    pub fn tally(labels: &[MaskLabel]) -> Self {
        labels.iter().fold(Self::default(), |mut c, l| {
            match l {
                MaskLabel::Inside => c.inside += 1,
                MaskLabel::Outside => c.outside += 1,
                MaskLabel::Shadow => c.shadow += 1,
            }
            c
        })
    }
}

/// Result document written by the `selfmask` binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskOutput {
    /// One code per input point: 0 inside, 1 outside, 2 shadow.
    pub labels: Vec<u8>,
    /// Body surface points that occluded shadowed points, in input order.
    pub shadow_points: Vec<[f64; 3]>,
    pub counts: LabelCounts,
}

impl MaskOutput {
    pub fn new(labels: &[MaskLabel], shadow_points: Vec<Vec3>) -> Self {
        Self {
            labels: labels.iter().map(|l| l.code()).collect(),
            shadow_points: shadow_points.into_iter().map(<[f64; 3]>::from).collect(),
            counts: LabelCounts::tally(labels),
        }
    }
}

pub fn read_cloud(path: &Path) -> Result<PointCloud, String> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read cloud at {}: {}", path.display(), e))?;
    let file: CloudFile =
        serde_json::from_str(&raw).map_err(|e| format!("Failed to parse cloud: {}", e))?;
    Ok(file.into())
}

/// Serialize `output`; written to `path` when given, returned otherwise.
pub fn write_output(output: &MaskOutput, path: Option<&Path>) -> Result<Option<String>, String> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| format!("Failed to serialize result: {}", e))?;
    match path {
        Some(path) => {
            fs::write(path, json)
                .map_err(|e| format!("Failed to write result at {}: {}", path.display(), e))?;
            Ok(None)
        }
        None => Ok(Some(json)),
    }
}
