//! Runtime configuration for the planner, driver, and device adapter.
//!
//! Loaded from a TOML file (see [`load_config`]); every field carries a
//! default so a missing file still yields a usable [`Config::default`].
//!
//! ```toml
//! [machine]
//! width_in = 12.0
//! height_in = 8.5
//! steps_per_inch = 2032.0
//!
//! [pen]
//! up_position = 28000.0
//! down_position = 7500.0
//! servo_speed = 150.0
//!
//! [motion]
//! speed_pen_up = 18712.5
//! speed_pen_down = 6237.5
//!
//! [device]
//! serial_port = "/dev/ttyACM0"
//! baud = 9600
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Minimum duration for any emitted `StepMove`, and the floor used by the
/// interpolator's constant/stopped-short fallback cases.
pub const MIN_MOVE_MS: u32 = 30;
/// Upper clamp applied to the interpolator's linear/constant fallback cases.
pub const MAX_FALLBACK_MOVE_MS: u32 = 200;
/// Per-axis step rate below which a slice's motor delta is suppressed as
/// floating-point noise rather than emitted as a move.
pub const MIN_STEP_RATE: f64 = 0.002;
/// Floating-point tolerance used for acos-argument clamping and invariant
/// assertions.
pub const EPSILON: f64 = 2e-6;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MachineConfig {
    #[serde(default = "default_width_in")]
    pub width_in: f64,
    #[serde(default = "default_height_in")]
    pub height_in: f64,
    #[serde(default = "default_steps_per_inch")]
    pub steps_per_inch: f64,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            width_in: default_width_in(),
            height_in: default_height_in(),
            steps_per_inch: default_steps_per_inch(),
        }
    }
}

fn default_width_in() -> f64 {
    12.0
}
fn default_height_in() -> f64 {
    8.5
}
fn default_steps_per_inch() -> f64 {
    2032.0
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PenConfig {
    #[serde(default = "default_pen_up_position")]
    pub up_position: f64,
    #[serde(default = "default_pen_down_position")]
    pub down_position: f64,
    #[serde(default = "default_servo_speed")]
    pub servo_speed: f64,
    #[serde(default = "default_extra_pen_up_delay")]
    pub extra_pen_up_delay_ms: u32,
    #[serde(default = "default_extra_pen_down_delay")]
    pub extra_pen_down_delay_ms: u32,
}

impl Default for PenConfig {
    fn default() -> Self {
        Self {
            up_position: default_pen_up_position(),
            down_position: default_pen_down_position(),
            servo_speed: default_servo_speed(),
            extra_pen_up_delay_ms: default_extra_pen_up_delay(),
            extra_pen_down_delay_ms: default_extra_pen_down_delay(),
        }
    }
}

fn default_pen_up_position() -> f64 {
    28000.0
}
fn default_pen_down_position() -> f64 {
    7500.0
}
fn default_servo_speed() -> f64 {
    150.0
}
fn default_extra_pen_up_delay() -> u32 {
    0
}
fn default_extra_pen_down_delay() -> u32 {
    0
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MotionConfig {
    #[serde(default = "default_speed_pen_up")]
    pub speed_pen_up: f64,
    #[serde(default = "default_speed_pen_down")]
    pub speed_pen_down: f64,
    #[serde(default = "default_accel_time_pen_up")]
    pub accel_time_pen_up: f64,
    #[serde(default = "default_accel_time_pen_down")]
    pub accel_time_pen_down: f64,
    #[serde(default = "default_short_threshold")]
    pub short_threshold_in: f64,
    #[serde(default = "default_time_slice")]
    pub time_slice_ms: f64,
    #[serde(default = "default_min_step_rate")]
    pub min_step_rate: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            speed_pen_up: default_speed_pen_up(),
            speed_pen_down: default_speed_pen_down(),
            accel_time_pen_up: default_accel_time_pen_up(),
            accel_time_pen_down: default_accel_time_pen_down(),
            short_threshold_in: default_short_threshold(),
            time_slice_ms: default_time_slice(),
            min_step_rate: default_min_step_rate(),
        }
    }
}

// SPEED_SCALE = 24950; pen-down speed is 0.25 * SPEED_SCALE, pen-up is 0.75.
fn default_speed_pen_up() -> f64 {
    18712.5
}
fn default_speed_pen_down() -> f64 {
    6237.5
}
fn default_accel_time_pen_up() -> f64 {
    1.0
}
fn default_accel_time_pen_down() -> f64 {
    0.25
}
fn default_short_threshold() -> f64 {
    1.0
}
fn default_time_slice() -> f64 {
    30.0
}
fn default_min_step_rate() -> f64 {
    MIN_STEP_RATE
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DeviceConfig {
    #[serde(default = "default_serial_port")]
    pub serial_port: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            serial_port: default_serial_port(),
            baud: default_baud(),
            read_timeout_ms: default_read_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_serial_port() -> String {
    "/dev/ttyACM0".to_string()
}
fn default_baud() -> u32 {
    9600
}
fn default_read_timeout_ms() -> u64 {
    1000
}
fn default_max_retries() -> u32 {
    100
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub machine: MachineConfig,
    #[serde(default)]
    pub pen: PenConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub device: DeviceConfig,
}

impl Config {
    /// Checks that every numeric field is physically sane. Called by
    /// [`load_config`]; exposed separately so callers constructing a
    /// `Config` in-process (tests, the mock CLI path) can validate too.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.machine.width_in <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "machine.width_in",
                reason: "must be positive".into(),
            });
        }
        if self.machine.height_in <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "machine.height_in",
                reason: "must be positive".into(),
            });
        }
        if self.machine.steps_per_inch <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "machine.steps_per_inch",
                reason: "must be positive".into(),
            });
        }
        if self.pen.up_position <= self.pen.down_position {
            return Err(ConfigError::Invalid {
                field: "pen.up_position",
                reason: "must be greater than pen.down_position".into(),
            });
        }
        if self.pen.servo_speed <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "pen.servo_speed",
                reason: "must be positive".into(),
            });
        }
        if self.motion.speed_pen_up <= 0.0 || self.motion.speed_pen_down <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "motion.speed_pen_up/speed_pen_down",
                reason: "must be positive".into(),
            });
        }
        if self.motion.accel_time_pen_up <= 0.0 || self.motion.accel_time_pen_down <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "motion.accel_time_pen_up/accel_time_pen_down",
                reason: "must be positive".into(),
            });
        }
        if self.motion.time_slice_ms <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "motion.time_slice_ms",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    pub fn accel_pen_up(&self) -> f64 {
        self.motion.speed_pen_up / self.motion.accel_time_pen_up
    }

    pub fn accel_pen_down(&self) -> f64 {
        self.motion.speed_pen_down / self.motion.accel_time_pen_down
    }
}

/// Loads and validates a [`Config`] from a TOML file, logging and
/// propagating any failure.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "failed to read config file");
        ConfigError::Io(e)
    })?;
    let config: Config = toml::from_str(&text).map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "failed to parse config file");
        ConfigError::Parse(e)
    })?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string(&config).expect("serialize");
        let parsed: Config = toml::from_str(&text).expect("parse");
        assert_eq!(config, parsed);
    }

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().expect("default must validate");
    }

    #[test]
    fn rejects_non_positive_steps_per_inch() {
        let mut config = Config::default();
        config.machine.steps_per_inch = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_pen_up_not_above_pen_down() {
        let mut config = Config::default();
        config.pen.up_position = config.pen.down_position;
        assert!(config.validate().is_err());
    }
}
