//! Filter configuration – reads `~/.selfmask/config.toml`.
//!
//! ```toml
//! description = "pr2.toml"        # relative paths resolve next to this file
//! sensor_frame = "head_mount_kinect_rgb_link"
//! min_sensor_distance = 0.05
//! lookup_timeout_ms = 100
//!
//! [[links]]
//! name = "r_forearm_link"
//! padding = 0.02
//!
//! [[transforms]]
//! parent = "base_link"
//! child = "r_forearm_link"
//! xyz = [0.5, -0.2, 0.8]
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use selfmask_filter::SensorOrigin;
use selfmask_geometry::tf_buffer::TfBuffer;
use selfmask_geometry::transform::{Transform3D, Vec3};
use selfmask_types::LinkInfo;
use serde::{Deserialize, Serialize};

/// A fixed parent → child transform loaded into the transform buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticTransform {
    pub parent: String,
    pub child: String,
    #[serde(default)]
    pub xyz: [f64; 3],
    #[serde(default)]
    pub rpy: [f64; 3],
}

/// Persisted filter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Path of the TOML robot description.
    #[serde(default)]
    pub description: PathBuf,

    /// Links to filter; empty means every link of the description.
    #[serde(default)]
    pub links: Vec<LinkInfo>,

    /// Frame of the sensor that produced the clouds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_frame: Option<String>,

    /// Sensor position in the cloud frame; used when no sensor frame is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_position: Option<[f64; 3]>,

    /// Points closer than this to the sensor are treated as the robot.
    #[serde(default = "default_min_sensor_distance")]
    pub min_sensor_distance: f64,

    /// Upper bound on the wait for a single transform lookup.
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,

    #[serde(default)]
    pub transforms: Vec<StaticTransform>,
}

fn default_min_sensor_distance() -> f64 {
    0.05
}
fn default_lookup_timeout_ms() -> u64 {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            description: PathBuf::new(),
            links: Vec::new(),
            sensor_frame: None,
            sensor_position: None,
            min_sensor_distance: default_min_sensor_distance(),
            lookup_timeout_ms: default_lookup_timeout_ms(),
            transforms: Vec::new(),
        }
    }
}

impl Config {
    /// Sensor origin to mask against, or `None` for containment only.
    pub fn sensor_origin(&self) -> Option<SensorOrigin> {
        match (&self.sensor_frame, self.sensor_position) {
            (Some(frame), _) => Some(SensorOrigin::frame(frame.clone())),
            (None, Some(p)) => Some(SensorOrigin::Position(Vec3::from(p))),
            (None, None) => None,
        }
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    /// Resolve the description path against the directory holding the
    /// config file.
    pub fn description_path(&self, config_dir: Option<&Path>) -> PathBuf {
        match config_dir {
            Some(dir) if self.description.is_relative() => dir.join(&self.description),
            _ => self.description.clone(),
        }
    }

    /// Build a transform buffer holding every configured static transform.
    pub fn transform_buffer(&self) -> TfBuffer {
        let tf = TfBuffer::new();
        for t in &self.transforms {
            tf.set_static_transform(&t.parent, &t.child, Transform3D::from_xyz_rpy(t.xyz, t.rpy));
        }
        tf
    }
}

/// Return the path to `~/.selfmask/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".selfmask").join("config.toml")
}

/// Load the config from a specific path.  Returns `None` if the file does
/// not exist.  Environment overrides are not applied here.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Load the config at `path` (or the default location), fall back to
/// defaults when the default file is absent, then apply environment
/// overrides.  Also returns the directory relative paths resolve against.
pub fn load(path: Option<&Path>) -> Result<(Config, Option<PathBuf>), String> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
    let mut cfg = match load_from(&path)? {
        Some(cfg) => cfg,
        None if path == config_path() => Config::default(),
        None => return Err(format!("Config not found at {}", path.display())),
    };
    apply_env_overrides(&mut cfg);
    Ok((cfg, path.parent().map(Path::to_path_buf)))
}

/// Apply `SELFMASK_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SELFMASK_DESCRIPTION` | `description` |
/// | `SELFMASK_SENSOR_FRAME` | `sensor_frame` |
/// | `SELFMASK_MIN_SENSOR_DISTANCE` | `min_sensor_distance` |
/// | `SELFMASK_LOOKUP_TIMEOUT_MS` | `lookup_timeout_ms` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("SELFMASK_DESCRIPTION") {
        cfg.description = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("SELFMASK_SENSOR_FRAME") {
        cfg.sensor_frame = Some(v);
    }
    if let Ok(v) = std::env::var("SELFMASK_MIN_SENSOR_DISTANCE")
        && let Ok(d) = v.parse::<f64>()
        && d >= 0.0
    {
        cfg.min_sensor_distance = d;
    }
    if let Ok(v) = std::env::var("SELFMASK_LOOKUP_TIMEOUT_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.lookup_timeout_ms = ms;
    }
}
