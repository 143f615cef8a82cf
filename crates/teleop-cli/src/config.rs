//! Configuration Vault – reads/writes `~/.teleop/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use teleop_core::DriverConfig;
use teleop_core::driver::{DEFAULT_CYCLE_PERIOD, DEFAULT_PLANNING_GROUP};
use teleop_types::{PlannerSettings, TeleopError};

/// Persisted bridge configuration stored in `~/.teleop/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Sensitivity factor applied to every incoming delta.
    #[serde(default = "default_scale")]
    pub scale: f64,

    /// Control-cycle period in milliseconds.
    #[serde(default = "default_cycle_period_ms")]
    pub cycle_period_ms: u64,

    /// Joint model group handed to the IK solver.
    #[serde(default = "default_planning_group")]
    pub planning_group: String,

    /// IK time budget in milliseconds (0 = solver default).
    #[serde(default)]
    pub ik_timeout_ms: u64,

    /// Per-topic buffer size of the event bus.
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,

    /// Scaling and tolerances enforced by the planner.
    #[serde(default)]
    pub planner: PlannerSettings,
}

fn default_scale() -> f64 {
    1.0
}
fn default_cycle_period_ms() -> u64 {
    DEFAULT_CYCLE_PERIOD.as_millis() as u64
}
fn default_planning_group() -> String {
    DEFAULT_PLANNING_GROUP.to_string()
}
fn default_bus_capacity() -> usize {
    256
}

/// Largest accepted per-topic bus buffer.
pub const MAX_BUS_CAPACITY: usize = 65_536;

impl Default for Config {
    fn default() -> Self {
        Self {
            scale: default_scale(),
            cycle_period_ms: default_cycle_period_ms(),
            planning_group: default_planning_group(),
            ik_timeout_ms: 0,
            bus_capacity: default_bus_capacity(),
            planner: PlannerSettings::default(),
        }
    }
}

impl Config {
    /// Reject values the bridge cannot run with.
    pub fn validate(&self) -> Result<(), TeleopError> {
        if !self.scale.is_finite() {
            return Err(TeleopError::InvalidConfig(format!(
                "scale must be finite, got {}",
                self.scale
            )));
        }
        if !(1..=MAX_BUS_CAPACITY).contains(&self.bus_capacity) {
            return Err(TeleopError::InvalidConfig(format!(
                "bus_capacity must be between 1 and {MAX_BUS_CAPACITY}, got {}",
                self.bus_capacity
            )));
        }
        self.planner.validate()?;
        self.driver_config().validate()
    }

    /// The planning-loop slice of this configuration.
    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            period: Duration::from_millis(self.cycle_period_ms),
            planning_group: self.planning_group.clone(),
            ik_timeout: Duration::from_millis(self.ik_timeout_ms),
        }
    }
}

/// Return the path to `~/.teleop/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".teleop").join("config.toml")
}

/// Load the config from a specific path.  Returns `None` if the file does not
/// exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, TeleopError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        TeleopError::Io(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let cfg: Config = toml::from_str(&raw)
        .map_err(|e| TeleopError::InvalidConfig(format!("failed to parse config: {e}")))?;
    Ok(Some(cfg))
}

/// Apply `TELEOP_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `TELEOP_SCALE` | `scale` |
/// | `TELEOP_CYCLE_PERIOD_MS` | `cycle_period_ms` |
/// | `TELEOP_PLANNING_GROUP` | `planning_group` |
///
/// Values that fail to parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("TELEOP_SCALE")
        && let Ok(scale) = v.parse::<f64>()
    {
        cfg.scale = scale;
    }
    if let Ok(v) = std::env::var("TELEOP_CYCLE_PERIOD_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.cycle_period_ms = ms;
    }
    if let Ok(v) = std::env::var("TELEOP_PLANNING_GROUP") {
        cfg.planning_group = v;
    }
}

/// Save the config to a specific path, creating the parent directory if
/// necessary.
///
/// Only a directory created here is restricted to its owner; an existing
/// parent keeps its permissions.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), TeleopError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty())
        && !parent.exists()
    {
        fs::create_dir_all(parent)
            .map_err(|e| TeleopError::Io(format!("failed to create config directory: {e}")))?;
        // Restrict the new config directory to the owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                TeleopError::Io(format!("failed to set config directory permissions: {e}"))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| TeleopError::InvalidConfig(format!("failed to serialize config: {e}")))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| {
                TeleopError::Io(format!("failed to write config at {}: {e}", path.display()))
            })?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| {
        TeleopError::Io(format!("failed to write config at {}: {e}", path.display()))
    })?;
    Ok(())
}
