//! Monopod configuration file (TOML).
//!
//! Describes the task mode and per-joint calibration, safety limits and
//! controller settings applied by
//! [`Monopod::initialize_with_config`][crate::monopod::Monopod::initialize_with_config].
//!
//! ```toml
//! mode = "free"
//!
//! [joints.hip_joint]
//! zero_angle = 0.1
//! reverse_polarity = true
//! position_limit = { min = -1.5, max = 1.5 }
//! max_torque_target = 2.0
//! pid = { p = 10.0, i = 0.0, d = 0.1 }
//! ```
//!
//! Joints are keyed by the names of [`joint_names`]; an unknown name is a
//! [`ConfigError::UnknownJoint`].

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use monopod_types::{JointId, JointLimit, Mode, Pid, joint_names};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors raised while loading, parsing or saving a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("unknown joint name '{0}'")]
    UnknownJoint(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Config types
// ─────────────────────────────────────────────────────────────────────────────

/// Settings of one joint.  Every field is optional; absent fields keep the
/// defaults the registry builds joints with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JointConfig {
    /// Overrides the default gear ratio (1.0 for encoders, 9.0 for motors).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gear_ratio: Option<f64>,
    #[serde(default)]
    pub zero_angle: f64,
    #[serde(default)]
    pub reverse_polarity: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_limit: Option<JointLimit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity_limit: Option<JointLimit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceleration_limit: Option<JointLimit>,
    /// Ignored for joints without a motor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_torque_target: Option<f64>,
    /// Ignored for joints without a motor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<Pid>,
}

/// Whole-robot configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonopodConfig {
    #[serde(default)]
    pub mode: Mode,
    /// Per-joint settings keyed by joint name (e.g. `"knee_joint"`).
    #[serde(default)]
    pub joints: BTreeMap<String, JointConfig>,
}

impl MonopodConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let cfg: MonopodConfig = toml::from_str(raw)?;
        cfg.resolve_joints()?;
        Ok(cfg)
    }

    /// Joint settings keyed by [`JointId`].
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownJoint`] for a key that is not a joint name.
    pub fn resolve_joints(&self) -> Result<BTreeMap<JointId, &JointConfig>, ConfigError> {
        let names = joint_names();
        self.joints
            .iter()
            .map(|(name, joint)| {
                names
                    .get(name.as_str())
                    .and_then(|&index| JointId::try_from(index).ok())
                    .map(|id| (id, joint))
                    .ok_or_else(|| ConfigError::UnknownJoint(name.clone()))
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Persistence
// ─────────────────────────────────────────────────────────────────────────────

/// Load the configuration at `path`.  Returns `Ok(None)` if the file does
/// not exist.  `MONOPOD_*` environment overrides are applied.
pub fn load_from(path: &Path) -> Result<Option<MonopodConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)?;
    let mut cfg = MonopodConfig::from_toml_str(&raw)?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Write `cfg` to `path`, creating parent directories as needed.
pub fn save_to(cfg: &MonopodConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let raw = toml::to_string_pretty(cfg)?;
    fs::write(path, raw)?;
    Ok(())
}

/// Apply `MONOPOD_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `MONOPOD_MODE` | `mode` (e.g. `fixed`, `encoder_board`) |
pub fn apply_env_overrides(cfg: &mut MonopodConfig) {
    if let Ok(v) = std::env::var("MONOPOD_MODE") {
        match Mode::from_name(&v) {
            Some(mode) => cfg.mode = mode,
            None => warn!(value = %v, "ignoring unknown MONOPOD_MODE"),
        }
    }
}
