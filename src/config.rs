// Thresholds, timings, and the loadable runtime configuration
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// Command shaping (values are direction intents in -100..=100)
pub const DEADZONE: i32 = 15; // joystick noise floor
pub const TANK_ENTER_THRESHOLD: i32 = 25;
pub const TANK_EXIT_THRESHOLD: i32 = 40;
pub const MIN_COMMAND_SPEED: i32 = 20; // below this on both sides -> stop
pub const ACTUATION_DEADBAND: i32 = 10; // motor layer treats |v| <= 10 as stop

// Watchdog
pub const WATCHDOG_PERIOD: Duration = Duration::from_millis(50);
pub const CMD_TIMEOUT: Duration = Duration::from_millis(800);

// Obstacle avoidance
pub const OBSTACLE_DETECT_CM: i32 = 20;
pub const OBSTACLE_CRITICAL_CM: i32 = 10;
pub const FORWARD_MOTION_THRESHOLD: i32 = 15;
pub const AVOID_DRIVE_MAGNITUDE: i32 = 90;
pub const AVOID_STOP_MS: u64 = 150;
pub const AVOID_BACKUP_MS: u64 = 600;
pub const AVOID_BACKUP_PAUSE_MS: u64 = 100;
pub const AVOID_TURN_MS: u64 = 1200; // roughly 180 degrees, open loop
pub const AVOID_SETTLE_MS: u64 = 300; // lets the driver release the stick
pub const SONAR_CHECK_INTERVAL_MS: u64 = 200;
pub const DIRECTION_CHANGE_COOLDOWN_MS: u64 = 1000;

// Ultrasonic sensor (HC-SR04 class)
pub const ECHO_MAX_POLLS: u32 = 10_000;
pub const TRIGGER_PULSE_US: u32 = 10;
pub const TRIGGER_SETTLE_US: u32 = 2;
pub const SPEED_OF_SOUND_CM_PER_US: f32 = 0.0343;
pub const MIN_VALID_CM: i32 = 2;
pub const MAX_VALID_CM: i32 = 400;
pub const SELF_TEST_SAMPLES: usize = 5;
pub const SELF_TEST_INTERVAL: Duration = Duration::from_millis(300);

// Server
pub const DEFAULT_BIND: &str = "0.0.0.0:5000";
pub const RECEIVE_TIMEOUT: Duration = Duration::from_millis(50);

// Zenoh telemetry topics
pub const TOPIC_DRIVE: &str = "fourwd/state/drive";
pub const TOPIC_HEALTH: &str = "fourwd/state/health";
pub const TELEMETRY_HZ: u64 = 10;

/// Errors raised while loading a configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Command shaping thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MotionConfig {
    pub deadzone: i32,
    pub tank_enter_threshold: i32,
    pub tank_exit_threshold: i32,
    pub min_command_speed: i32,
    pub actuation_deadband: i32,
    pub command_timeout_ms: u64,
    pub watchdog_period_ms: u64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            deadzone: DEADZONE,
            tank_enter_threshold: TANK_ENTER_THRESHOLD,
            tank_exit_threshold: TANK_EXIT_THRESHOLD,
            min_command_speed: MIN_COMMAND_SPEED,
            actuation_deadband: ACTUATION_DEADBAND,
            command_timeout_ms: CMD_TIMEOUT.as_millis() as u64,
            watchdog_period_ms: WATCHDOG_PERIOD.as_millis() as u64,
        }
    }
}

impl MotionConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn watchdog_period(&self) -> Duration {
        Duration::from_millis(self.watchdog_period_ms)
    }
}

/// Obstacle detection and the timed avoidance manoeuvre
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AvoidanceConfig {
    pub detect_cm: i32,
    pub critical_cm: i32,
    pub forward_threshold: i32,
    pub drive_magnitude: i32,
    pub stop_ms: u64,
    pub backup_ms: u64,
    pub backup_pause_ms: u64,
    pub turn_ms: u64,
    pub settle_ms: u64,
    pub check_interval_ms: u64,
    pub direction_change_cooldown_ms: u64,
}

impl Default for AvoidanceConfig {
    fn default() -> Self {
        Self {
            detect_cm: OBSTACLE_DETECT_CM,
            critical_cm: OBSTACLE_CRITICAL_CM,
            forward_threshold: FORWARD_MOTION_THRESHOLD,
            drive_magnitude: AVOID_DRIVE_MAGNITUDE,
            stop_ms: AVOID_STOP_MS,
            backup_ms: AVOID_BACKUP_MS,
            backup_pause_ms: AVOID_BACKUP_PAUSE_MS,
            turn_ms: AVOID_TURN_MS,
            settle_ms: AVOID_SETTLE_MS,
            check_interval_ms: SONAR_CHECK_INTERVAL_MS,
            direction_change_cooldown_ms: DIRECTION_CHANGE_COOLDOWN_MS,
        }
    }
}

impl AvoidanceConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.direction_change_cooldown_ms)
    }

    /// Total time the manoeuvre keeps user control disabled
    pub fn sequence_duration(&self) -> Duration {
        Duration::from_millis(
            self.stop_ms + self.backup_ms + self.backup_pause_ms + self.turn_ms + self.settle_ms,
        )
    }
}

/// Ultrasonic rangefinder timing and validity window
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SensorConfig {
    pub echo_max_polls: u32,
    pub min_valid_cm: i32,
    pub max_valid_cm: i32,
    pub speed_of_sound_cm_per_us: f32,
    pub self_test_samples: usize,
    pub self_test_interval_ms: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            echo_max_polls: ECHO_MAX_POLLS,
            min_valid_cm: MIN_VALID_CM,
            max_valid_cm: MAX_VALID_CM,
            speed_of_sound_cm_per_us: SPEED_OF_SOUND_CM_PER_US,
            self_test_samples: SELF_TEST_SAMPLES,
            self_test_interval_ms: SELF_TEST_INTERVAL.as_millis() as u64,
        }
    }
}

impl SensorConfig {
    pub fn self_test_interval(&self) -> Duration {
        Duration::from_millis(self.self_test_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub receive_timeout_ms: u64,
    pub telemetry_hz: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            receive_timeout_ms: RECEIVE_TIMEOUT.as_millis() as u64,
            telemetry_hz: TELEMETRY_HZ,
        }
    }
}

impl ServerConfig {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }
}

/// Full runtime configuration. Every field falls back to the constants above.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub motion: MotionConfig,
    pub avoidance: AvoidanceConfig,
    pub sensor: SensorConfig,
    pub server: ServerConfig,
}

impl Config {
    /// Load a JSON config file and validate it
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.motion;
        if m.tank_exit_threshold <= m.tank_enter_threshold {
            return Err(ConfigError::Invalid(format!(
                "tank exit threshold ({}) must exceed enter threshold ({})",
                m.tank_exit_threshold, m.tank_enter_threshold
            )));
        }
        if m.watchdog_period_ms == 0 || m.command_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "watchdog period and command timeout must be non-zero".to_string(),
            ));
        }
        if !(0..=100).contains(&self.avoidance.drive_magnitude)
            || self.avoidance.drive_magnitude <= m.actuation_deadband
        {
            return Err(ConfigError::Invalid(format!(
                "avoidance drive magnitude {} must lie in ({}, 100]",
                self.avoidance.drive_magnitude, m.actuation_deadband
            )));
        }
        let s = &self.sensor;
        if s.min_valid_cm >= s.max_valid_cm {
            return Err(ConfigError::Invalid(format!(
                "sensor range {}..={} cm is empty",
                s.min_valid_cm, s.max_valid_cm
            )));
        }
        if s.echo_max_polls == 0 || s.speed_of_sound_cm_per_us <= 0.0 {
            return Err(ConfigError::Invalid(
                "echo poll budget and speed of sound must be positive".to_string(),
            ));
        }
        if self.server.telemetry_hz == 0 {
            return Err(ConfigError::Invalid("telemetry rate must be non-zero".to_string()));
        }
        Ok(())
    }
}
